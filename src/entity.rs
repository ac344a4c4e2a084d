use std::collections::{BTreeMap, HashMap};

use crate::value::Value;

///////////////////////////////////////////////////////////////////////////////

/// Property lookup over an instance whose shape may extend its declared type.
pub trait PropertyAccess {
    fn declared_value(&self, name: &str) -> Option<&Value>;

    fn dynamic_value(&self, name: &str) -> Option<&Value>;

    fn dynamic_names(&self) -> Box<dyn Iterator<Item = &str> + '_>;

    /// Declared properties win over dynamic ones of the same name.
    fn value(&self, name: &str) -> Option<&Value> {
        self.declared_value(name)
            .or_else(|| self.dynamic_value(name))
    }
}

///////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    /// Per-instance type, may differ from the entity set's declared type
    pub type_name: String,
    declared: BTreeMap<String, Value>,
    dynamic: HashMap<String, Value>,
}

impl Entity {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            declared: BTreeMap::new(),
            dynamic: HashMap::new(),
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.declared.insert(name.into(), value.into());
        self
    }

    pub fn with_dynamic(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.dynamic.insert(name.into(), value.into());
        self
    }
}

impl PropertyAccess for Entity {
    fn declared_value(&self, name: &str) -> Option<&Value> {
        self.declared.get(name)
    }

    fn dynamic_value(&self, name: &str) -> Option<&Value> {
        self.dynamic.get(name)
    }

    fn dynamic_names(&self) -> Box<dyn Iterator<Item = &str> + '_> {
        Box::new(self.dynamic.keys().map(String::as_str))
    }
}

///////////////////////////////////////////////////////////////////////////////
