use crate::{
    error::{CollectionNotFound, ODataError},
    value::EdmType,
};

///////////////////////////////////////////////////////////////////////////////

pub const DEFAULT_NAMESPACE: &str = "default";

///////////////////////////////////////////////////////////////////////////////

/// Static description of the service: entity types, complex types and the
/// entity sets exposing them.
#[derive(Debug, Clone)]
pub struct Model {
    pub namespace: String,
    entity_types: Vec<EntityType>,
    complex_types: Vec<ComplexType>,
    entity_sets: Vec<EntitySet>,
}

impl Default for Model {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE)
    }
}

impl Model {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            entity_types: Vec::new(),
            complex_types: Vec::new(),
            entity_sets: Vec::new(),
        }
    }

    pub fn with_entity_type(mut self, entity_type: EntityType) -> Self {
        self.entity_types.push(entity_type);
        self
    }

    pub fn with_complex_type(mut self, complex_type: ComplexType) -> Self {
        self.complex_types.push(complex_type);
        self
    }

    pub fn with_entity_set(mut self, entity_set: EntitySet) -> Self {
        self.entity_sets.push(entity_set);
        self
    }

    pub fn entity_types(&self) -> &[EntityType] {
        &self.entity_types
    }

    pub fn complex_types(&self) -> &[ComplexType] {
        &self.complex_types
    }

    pub fn entity_sets(&self) -> &[EntitySet] {
        &self.entity_sets
    }

    pub fn entity_set(&self, name: &str) -> Result<&EntitySet, ODataError> {
        self.entity_sets
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| CollectionNotFound::new(name).into())
    }

    pub fn entity_type(&self, name: &str) -> Option<&EntityType> {
        self.entity_types.iter().find(|t| t.name == name)
    }

    pub fn complex_type(&self, name: &str) -> Option<&ComplexType> {
        let name = name
            .strip_prefix(&self.namespace)
            .and_then(|n| n.strip_prefix('.'))
            .unwrap_or(name);
        self.complex_types.iter().find(|t| t.name == name)
    }

    pub fn entity_type_of(&self, entity_set: &EntitySet) -> Result<&EntityType, ODataError> {
        self.entity_type(&entity_set.entity_type).ok_or_else(|| {
            ODataError::internal(format!(
                "Entity set {} refers to unknown type {}",
                entity_set.name, entity_set.entity_type
            ))
        })
    }

    pub fn qualified(&self, type_name: &str) -> String {
        if type_name.contains('.') {
            type_name.to_string()
        } else {
            format!("{}.{type_name}", self.namespace)
        }
    }
}

///////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone)]
pub struct EntityType {
    pub name: String,
    /// Key properties in declared metadata order
    pub key: Vec<String>,
    pub properties: Vec<PropertyDef>,
    pub navigations: Vec<NavigationDef>,
    /// Open types accept dynamic properties beyond the declared ones
    pub open: bool,
}

impl EntityType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key: Vec::new(),
            properties: Vec::new(),
            navigations: Vec::new(),
            open: false,
        }
    }

    pub fn with_key(mut self, key: &[&str]) -> Self {
        self.key = key.iter().map(|k| k.to_string()).collect();
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, typ: EdmType, nullable: bool) -> Self {
        self.properties.push(PropertyDef {
            name: name.into(),
            typ,
            nullable,
        });
        self
    }

    pub fn with_navigation(
        mut self,
        name: impl Into<String>,
        target_set: impl Into<String>,
        multiplicity: Multiplicity,
    ) -> Self {
        self.navigations.push(NavigationDef {
            name: name.into(),
            target_set: target_set.into(),
            multiplicity,
        });
        self
    }

    pub fn open(mut self) -> Self {
        self.open = true;
        self
    }

    pub fn property(&self, name: &str) -> Option<&PropertyDef> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn navigation(&self, name: &str) -> Option<&NavigationDef> {
        self.navigations.iter().find(|n| n.name == name)
    }

    pub fn key_properties(&self) -> impl Iterator<Item = &PropertyDef> + '_ {
        self.key.iter().filter_map(|k| self.property(k))
    }
}

///////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone)]
pub struct ComplexType {
    pub name: String,
    pub properties: Vec<PropertyDef>,
}

impl ComplexType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: Vec::new(),
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, typ: EdmType, nullable: bool) -> Self {
        self.properties.push(PropertyDef {
            name: name.into(),
            typ,
            nullable,
        });
        self
    }
}

///////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone)]
pub struct PropertyDef {
    pub name: String,
    pub typ: EdmType,
    pub nullable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Multiplicity {
    One,
    Many,
}

#[derive(Debug, Clone)]
pub struct NavigationDef {
    pub name: String,
    pub target_set: String,
    pub multiplicity: Multiplicity,
}

impl NavigationDef {
    pub fn is_collection(&self) -> bool {
        self.multiplicity == Multiplicity::Many
    }
}

///////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone)]
pub struct EntitySet {
    pub name: String,
    pub entity_type: String,
    /// Model-level request to order keys as declared rather than alphabetically
    pub declared_key_order: Option<bool>,
}

impl EntitySet {
    pub fn new(name: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entity_type: entity_type.into(),
            declared_key_order: None,
        }
    }

    pub fn with_declared_key_order(mut self, declared: bool) -> Self {
        self.declared_key_order = Some(declared);
        self
    }
}
