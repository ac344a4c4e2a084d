use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use crate::{
    entity::{Entity, PropertyAccess},
    model::Model,
    value::Value,
};

///////////////////////////////////////////////////////////////////////////////

#[derive(thiserror::Error, Debug, Clone)]
#[error("{msg}")]
pub struct ProviderError {
    pub msg: String,
}

impl ProviderError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self { msg: msg.into() }
    }
}

pub type EntityIter<'a> = Box<dyn Iterator<Item = Result<Entity, ProviderError>> + 'a>;

///////////////////////////////////////////////////////////////////////////////

/// Backing store the materializer enumerates.
///
/// Iterators are consumed lazily and at most once per request.
pub trait DataSource: Send + Sync {
    /// Identifies the provider in verbose diagnostics
    fn name(&self) -> &str;

    fn scan(&self, entity_set: &str) -> Result<EntityIter<'_>, ProviderError>;

    /// Entities reachable from `entity` (a member of `entity_set`) through
    /// `navigation`. Single-valued navigations yield at most one item.
    fn navigate(
        &self,
        entity_set: &str,
        entity: &Entity,
        navigation: &str,
    ) -> Result<EntityIter<'_>, ProviderError>;
}

///////////////////////////////////////////////////////////////////////////////

type LinkKey = (String, String, String);

pub struct InMemoryDataSource {
    model: Arc<Model>,
    sets: BTreeMap<String, Vec<Entity>>,
    links: HashMap<LinkKey, Vec<String>>,
}

impl InMemoryDataSource {
    pub fn new(model: Arc<Model>) -> Self {
        Self {
            model,
            sets: BTreeMap::new(),
            links: HashMap::new(),
        }
    }

    pub fn with_entities(
        mut self,
        entity_set: impl Into<String>,
        entities: impl IntoIterator<Item = Entity>,
    ) -> Self {
        self.sets
            .entry(entity_set.into())
            .or_default()
            .extend(entities);
        self
    }

    pub fn insert(&mut self, entity_set: impl Into<String>, entity: Entity) {
        self.sets.entry(entity_set.into()).or_default().push(entity);
    }

    /// Links the entity keyed `source_key` in `entity_set` to the entity keyed
    /// `target_key` in the navigation's target set.
    pub fn with_link(
        self,
        entity_set: &str,
        source_key: impl Into<Value>,
        navigation: &str,
        target_key: impl Into<Value>,
    ) -> Self {
        self.with_composite_link(
            entity_set,
            &[source_key.into()],
            navigation,
            &[target_key.into()],
        )
    }

    pub fn with_composite_link(
        mut self,
        entity_set: &str,
        source_key: &[Value],
        navigation: &str,
        target_key: &[Value],
    ) -> Self {
        let source = literal_key(source_key.iter());
        let target = literal_key(target_key.iter());
        self.links
            .entry((entity_set.to_string(), source, navigation.to_string()))
            .or_default()
            .push(target);
        self
    }

    fn key_of(&self, entity_set: &str, entity: &Entity) -> Result<String, ProviderError> {
        let set = self
            .model
            .entity_set(entity_set)
            .map_err(|e| ProviderError::new(e.to_string()))?;
        let typ = self
            .model
            .entity_type_of(set)
            .map_err(|e| ProviderError::new(e.to_string()))?;
        let values: Vec<&Value> = typ
            .key
            .iter()
            .map(|k| entity.value(k).unwrap_or(&Value::Null))
            .collect();
        Ok(literal_key(values.into_iter()))
    }
}

fn literal_key<'a>(values: impl Iterator<Item = &'a Value>) -> String {
    values
        .map(|v| v.to_literal().unwrap_or_default())
        .collect::<Vec<_>>()
        .join(",")
}

impl DataSource for InMemoryDataSource {
    fn name(&self) -> &str {
        "InMemoryDataSource"
    }

    fn scan(&self, entity_set: &str) -> Result<EntityIter<'_>, ProviderError> {
        let entities = self.sets.get(entity_set).map(Vec::as_slice).unwrap_or(&[]);
        Ok(Box::new(entities.iter().cloned().map(Ok)))
    }

    fn navigate(
        &self,
        entity_set: &str,
        entity: &Entity,
        navigation: &str,
    ) -> Result<EntityIter<'_>, ProviderError> {
        let set = self
            .model
            .entity_set(entity_set)
            .map_err(|e| ProviderError::new(e.to_string()))?;
        let typ = self
            .model
            .entity_type_of(set)
            .map_err(|e| ProviderError::new(e.to_string()))?;
        let nav = typ.navigation(navigation).ok_or_else(|| {
            ProviderError::new(format!("{} has no navigation {navigation}", typ.name))
        })?;

        let source = self.key_of(entity_set, entity)?;
        let Some(targets) = self.links.get(&(
            entity_set.to_string(),
            source,
            navigation.to_string(),
        )) else {
            return Ok(Box::new(std::iter::empty()));
        };

        let target_set = nav.target_set.clone();
        let candidates = self.sets.get(&target_set).map(Vec::as_slice).unwrap_or(&[]);

        let mut related = Vec::with_capacity(targets.len());
        for target in targets {
            for candidate in candidates {
                if self.key_of(&target_set, candidate)? == *target {
                    related.push(candidate.clone());
                }
            }
        }

        Ok(Box::new(related.into_iter().map(Ok)))
    }
}
