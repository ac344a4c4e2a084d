use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::{
    config::ServiceConfig, datasource::DataSource, interceptor::InterceptorRegistry, model::Model,
};

///////////////////////////////////////////////////////////////////////////////

/// Everything a request needs to be evaluated. Implementations are shared
/// between requests and must not change once serving.
#[async_trait::async_trait]
pub trait ServiceContext: Send + Sync {
    /// Absolute URL ending with `/`
    fn service_base_url(&self) -> String;

    fn model(&self) -> &Model;

    fn config(&self) -> &ServiceConfig;

    fn data_source(&self) -> &dyn DataSource;

    fn interceptors(&self) -> &InterceptorRegistry;

    async fn last_updated_time(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

///////////////////////////////////////////////////////////////////////////////

pub struct ODataContext {
    service_base_url: String,
    model: Arc<Model>,
    config: Arc<ServiceConfig>,
    data_source: Arc<dyn DataSource>,
    interceptors: InterceptorRegistry,
    updated_time: Option<DateTime<Utc>>,
}

impl ODataContext {
    pub fn new(
        service_base_url: impl Into<String>,
        model: Arc<Model>,
        config: Arc<ServiceConfig>,
        data_source: Arc<dyn DataSource>,
    ) -> Self {
        let mut service_base_url = service_base_url.into();
        if !service_base_url.ends_with('/') {
            service_base_url.push('/');
        }

        Self {
            service_base_url,
            model,
            config,
            data_source,
            interceptors: InterceptorRegistry::new(),
            updated_time: None,
        }
    }

    pub fn with_interceptors(mut self, interceptors: InterceptorRegistry) -> Self {
        self.interceptors = interceptors;
        self
    }

    /// Pins the `<updated>` timestamp of payloads
    pub fn with_updated_time(mut self, updated_time: DateTime<Utc>) -> Self {
        self.updated_time = Some(updated_time);
        self
    }
}

#[async_trait::async_trait]
impl ServiceContext for ODataContext {
    fn service_base_url(&self) -> String {
        self.service_base_url.clone()
    }

    fn model(&self) -> &Model {
        &self.model
    }

    fn config(&self) -> &ServiceConfig {
        &self.config
    }

    fn data_source(&self) -> &dyn DataSource {
        self.data_source.as_ref()
    }

    fn interceptors(&self) -> &InterceptorRegistry {
        &self.interceptors
    }

    async fn last_updated_time(&self) -> DateTime<Utc> {
        self.updated_time.unwrap_or_else(Utc::now)
    }
}
