use std::collections::BTreeMap;

use crate::error::ODataError;

///////////////////////////////////////////////////////////////////////////////

/// Name of the custom-state entry that toggles declared key ordering for an
/// entity set.
pub const USE_METADATA_KEY_ORDER_MARKER: &str = "UseMetadataKeyOrder";

pub const DEFAULT_MAX_FILTER_DEPTH: usize = 100;
pub const DEFAULT_MAX_EXPAND_DEPTH: usize = 12;

///////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadFormat {
    #[default]
    Atom,
    Json,
}

///////////////////////////////////////////////////////////////////////////////

/// Process-wide service configuration.
///
/// Built once at startup and shared read-only between requests.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceConfig {
    pub entity_sets: BTreeMap<String, EntitySetConfig>,
    /// Provider-level default for declared key ordering
    pub use_metadata_key_order: Option<bool>,
    pub max_filter_depth: usize,
    pub max_expand_depth: usize,
    pub max_top: Option<u64>,
    pub verbose_errors: bool,
    pub default_format: PayloadFormat,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            entity_sets: BTreeMap::new(),
            use_metadata_key_order: None,
            max_filter_depth: DEFAULT_MAX_FILTER_DEPTH,
            max_expand_depth: DEFAULT_MAX_EXPAND_DEPTH,
            max_top: None,
            verbose_errors: false,
            default_format: PayloadFormat::Atom,
        }
    }
}

impl ServiceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_str(s: &str) -> Result<Self, ODataError> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn with_page_size(mut self, entity_set: impl Into<String>, page_size: usize) -> Self {
        self.entity_sets.entry(entity_set.into()).or_default().page_size = page_size;
        self
    }

    /// Explicit per-set switch; overrides the custom-state marker.
    pub fn with_set_key_order(mut self, entity_set: impl Into<String>, declared: bool) -> Self {
        self.entity_sets
            .entry(entity_set.into())
            .or_default()
            .use_metadata_key_order = Some(declared);
        self
    }

    pub fn with_custom_state(
        mut self,
        entity_set: impl Into<String>,
        name: impl Into<String>,
        value: serde_json::Value,
    ) -> Self {
        self.entity_sets
            .entry(entity_set.into())
            .or_default()
            .custom_state
            .insert(name.into(), value);
        self
    }

    pub fn with_default_key_order(mut self, declared: bool) -> Self {
        self.use_metadata_key_order = Some(declared);
        self
    }

    pub fn with_max_filter_depth(mut self, depth: usize) -> Self {
        self.max_filter_depth = depth;
        self
    }

    pub fn with_max_expand_depth(mut self, depth: usize) -> Self {
        self.max_expand_depth = depth;
        self
    }

    pub fn with_max_top(mut self, max_top: u64) -> Self {
        self.max_top = Some(max_top);
        self
    }

    pub fn with_verbose_errors(mut self, verbose: bool) -> Self {
        self.verbose_errors = verbose;
        self
    }

    pub fn with_default_format(mut self, format: PayloadFormat) -> Self {
        self.default_format = format;
        self
    }

    pub fn entity_set(&self, name: &str) -> Option<&EntitySetConfig> {
        self.entity_sets.get(name)
    }

    /// Page size of the entity set, `None` when paging is disabled.
    pub fn page_size(&self, entity_set: &str) -> Option<usize> {
        self.entity_set(entity_set)
            .map(|c| c.page_size)
            .filter(|size| *size > 0)
    }
}

///////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EntitySetConfig {
    /// Zero disables server-driven paging
    pub page_size: usize,
    pub use_metadata_key_order: Option<bool>,
    pub custom_state: BTreeMap<String, serde_json::Value>,
}

///////////////////////////////////////////////////////////////////////////////
