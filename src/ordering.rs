use std::cmp::Ordering;

use crate::{
    config::{ServiceConfig, USE_METADATA_KEY_ORDER_MARKER},
    entity::PropertyAccess,
    error::{MalformedQuery, ODataError, UnsupportedFeature, UnsupportedOrdering},
    model::{EntitySet, EntityType, Model, PropertyDef},
    query::OrderByItem,
    value::{EdmType, Value},
};

///////////////////////////////////////////////////////////////////////////////

/// One component of the effective ordering.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderingKey {
    pub path: Vec<String>,
    pub descending: bool,
    /// `None` for dynamic properties of open types
    pub typ: Option<EdmType>,
}

impl OrderingKey {
    pub fn value_of<'e>(&self, entity: &'e dyn PropertyAccess) -> &'e Value {
        let mut segments = self.path.iter();
        let Some(head) = segments.next() else {
            return &Value::Null;
        };
        let mut current = entity.value(head).unwrap_or(&Value::Null);
        for seg in segments {
            current = match current {
                Value::Complex(c) => c.get(seg).unwrap_or(&Value::Null),
                _ => &Value::Null,
            };
        }
        current
    }
}

/// Total order imposed on a collection: the explicit `$orderby` items followed
/// by every key property not already named.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveOrdering {
    pub keys: Vec<OrderingKey>,
}

impl EffectiveOrdering {
    pub fn resolve(
        model: &Model,
        config: &ServiceConfig,
        entity_set: &str,
        order_by: Option<&[OrderByItem]>,
    ) -> Result<Self, ODataError> {
        let set = model.entity_set(entity_set)?;
        let typ = model.entity_type_of(set)?;

        let mut keys = Vec::new();
        for item in order_by.unwrap_or_default() {
            let typ = resolve_path(model, typ, &item.path)?;
            keys.push(OrderingKey {
                path: item.path.clone(),
                descending: item.descending,
                typ,
            });
        }

        for prop in key_properties(model, config, set)? {
            if !prop.typ.is_orderable() {
                return Err(UnsupportedOrdering::new(&prop.name, prop.typ.edm_name()).into());
            }
            if keys.iter().any(|k| k.path.len() == 1 && k.path[0] == prop.name) {
                continue;
            }
            keys.push(OrderingKey {
                path: vec![prop.name.clone()],
                descending: false,
                typ: Some(prop.typ.clone()),
            });
        }

        Ok(Self { keys })
    }

    pub fn values(&self, entity: &dyn PropertyAccess) -> Vec<Value> {
        self.keys
            .iter()
            .map(|k| k.value_of(entity).clone())
            .collect()
    }

    pub fn compare(&self, a: &dyn PropertyAccess, b: &dyn PropertyAccess) -> Ordering {
        for key in &self.keys {
            let ord = key.value_of(a).compare(key.value_of(b));
            let ord = if key.descending { ord.reverse() } else { ord };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }

    /// Position of `entity` relative to previously captured key values.
    pub fn compare_to_values(&self, entity: &dyn PropertyAccess, values: &[Value]) -> Ordering {
        for (key, value) in self.keys.iter().zip(values) {
            let ord = key.value_of(entity).compare(value);
            let ord = if key.descending { ord.reverse() } else { ord };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }

    /// Stable sort, ties keep the source order.
    pub fn sort<T: PropertyAccess>(&self, items: &mut [T]) {
        items.sort_by(|a, b| self.compare(a, b));
    }
}

///////////////////////////////////////////////////////////////////////////////

/// Whether key properties of `entity_set` keep their declared order. The most
/// specific setting present wins:
///
/// 1. explicit per-set setter in [`crate::config::EntitySetConfig`]
/// 2. per-set custom state entry `UseMetadataKeyOrder` (booleans only)
/// 3. the model's entity set declaration
/// 4. provider-level default in [`ServiceConfig`]
///
/// With none of them present keys are ordered alphabetically.
pub fn uses_declared_key_order(config: &ServiceConfig, entity_set: &EntitySet) -> bool {
    let set_config = config.entity_set(&entity_set.name);

    if let Some(explicit) = set_config.and_then(|c| c.use_metadata_key_order) {
        return explicit;
    }

    let marker = set_config
        .and_then(|c| c.custom_state.get(USE_METADATA_KEY_ORDER_MARKER))
        .and_then(serde_json::Value::as_bool);
    if let Some(marker) = marker {
        return marker;
    }

    entity_set
        .declared_key_order
        .or(config.use_metadata_key_order)
        .unwrap_or(false)
}

pub fn key_properties<'m>(
    model: &'m Model,
    config: &ServiceConfig,
    entity_set: &EntitySet,
) -> Result<Vec<&'m PropertyDef>, ODataError> {
    let typ = model.entity_type_of(entity_set)?;

    let mut props = Vec::with_capacity(typ.key.len());
    for name in &typ.key {
        let prop = typ.property(name).ok_or_else(|| {
            ODataError::internal(format!("Key {name} of {} is not a property", typ.name))
        })?;
        props.push(prop);
    }

    if !uses_declared_key_order(config, entity_set) {
        props.sort_by_key(|p| p.name.to_lowercase());
    }
    Ok(props)
}

fn resolve_path(
    model: &Model,
    typ: &EntityType,
    path: &[String],
) -> Result<Option<EdmType>, ODataError> {
    let Some((head, rest)) = path.split_first() else {
        return Err(MalformedQuery::new("Empty $orderby path").into());
    };

    if typ.navigation(head).is_some() {
        return Err(UnsupportedFeature::new("$orderby through navigation properties").into());
    }

    let Some(prop) = typ.property(head) else {
        if typ.open && rest.is_empty() {
            return Ok(None);
        }
        return Err(MalformedQuery::new(format!(
            "{} has no property {}",
            typ.name,
            path.join("/")
        ))
        .into());
    };

    let mut current = prop.typ.clone();
    let mut name = prop.name.clone();
    for seg in rest {
        let EdmType::Complex(type_name) = &current else {
            return Err(MalformedQuery::new(format!("{name} has no member {seg}")).into());
        };
        let complex = model.complex_type(type_name).ok_or_else(|| {
            ODataError::internal(format!("Unknown complex type {type_name}"))
        })?;
        let member = complex
            .properties
            .iter()
            .find(|p| p.name == *seg)
            .ok_or_else(|| MalformedQuery::new(format!("{name} has no member {seg}")))?;
        current = member.typ.clone();
        name = format!("{name}/{seg}");
    }

    if !current.is_orderable() {
        return Err(UnsupportedOrdering::new(name, current.edm_name()).into());
    }
    Ok(Some(current))
}

///////////////////////////////////////////////////////////////////////////////
