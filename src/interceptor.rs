use std::{collections::HashMap, sync::Arc};

use crate::entity::PropertyAccess;

///////////////////////////////////////////////////////////////////////////////

/// Provider-supplied predicate applied transparently to every query touching
/// the entity set it is registered for.
pub trait QueryInterceptor: Send + Sync {
    fn admits(&self, entity: &dyn PropertyAccess) -> bool;
}

impl<F> QueryInterceptor for F
where
    F: Fn(&dyn PropertyAccess) -> bool + Send + Sync,
{
    fn admits(&self, entity: &dyn PropertyAccess) -> bool {
        self(entity)
    }
}

///////////////////////////////////////////////////////////////////////////////

#[derive(Default, Clone)]
pub struct InterceptorRegistry {
    by_set: HashMap<String, Vec<Arc<dyn QueryInterceptor>>>,
}

impl InterceptorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(
        mut self,
        entity_set: impl Into<String>,
        interceptor: impl QueryInterceptor + 'static,
    ) -> Self {
        self.by_set
            .entry(entity_set.into())
            .or_default()
            .push(Arc::new(interceptor));
        self
    }

    fn for_set(&self, entity_set: &str) -> &[Arc<dyn QueryInterceptor>] {
        self.by_set.get(entity_set).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn admits(&self, entity_set: &str, entity: &dyn PropertyAccess) -> bool {
        self.for_set(entity_set).iter().all(|i| i.admits(entity))
    }
}

impl std::fmt::Debug for InterceptorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut sets: Vec<_> = self
            .by_set
            .iter()
            .map(|(k, v)| (k.as_str(), v.len()))
            .collect();
        sets.sort();
        f.debug_struct("InterceptorRegistry")
            .field("by_set", &sets)
            .finish()
    }
}
