use std::string::FromUtf8Error;

///////////////////////////////////////////////////////////////////////////////

#[derive(thiserror::Error, Debug)]
pub enum ODataError {
    #[error(transparent)]
    MalformedQuery(#[from] MalformedQuery),
    #[error(transparent)]
    RecursionLimitExceeded(#[from] RecursionLimitExceeded),
    #[error(transparent)]
    UnsupportedOrdering(#[from] UnsupportedOrdering),
    #[error(transparent)]
    SkipTokenSupportedOnPagedSetsOnly(#[from] SkipTokenSupportedOnPagedSetsOnly),
    #[error(transparent)]
    NotApplicable(#[from] NotApplicable),
    #[error(transparent)]
    NotFound(#[from] ResourceNotFound),
    #[error(transparent)]
    CollectionNotFound(#[from] CollectionNotFound),
    #[error(transparent)]
    FilterParsingError(#[from] FilterParsingError),
    #[error(transparent)]
    UnsupportedFeature(#[from] UnsupportedFeature),
    #[error(transparent)]
    ProviderFailure(#[from] ProviderFailure),
    #[error(transparent)]
    FromUtf8Error(#[from] FromUtf8Error),
    #[error(transparent)]
    Internal(InternalError),
}

impl ODataError {
    pub fn internal(error: impl Into<Box<dyn std::error::Error + Send + Sync + 'static>>) -> Self {
        Self::Internal(InternalError::new(error))
    }

    pub fn status_code(&self) -> http::StatusCode {
        match self {
            Self::MalformedQuery(_)
            | Self::RecursionLimitExceeded(_)
            | Self::UnsupportedOrdering(_)
            | Self::SkipTokenSupportedOnPagedSetsOnly(_)
            | Self::NotApplicable(_)
            | Self::FilterParsingError(_) => http::StatusCode::BAD_REQUEST,
            Self::NotFound(_) | Self::CollectionNotFound(_) => http::StatusCode::NOT_FOUND,
            Self::UnsupportedFeature(_) => http::StatusCode::NOT_IMPLEMENTED,
            Self::ProviderFailure(_) | Self::FromUtf8Error(_) | Self::Internal(_) => {
                http::StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl axum::response::IntoResponse for ODataError {
    fn into_response(self) -> axum::response::Response {
        match self {
            Self::Internal(_) | Self::FromUtf8Error(_) => {
                (http::StatusCode::INTERNAL_SERVER_ERROR, "Internal error").into_response()
            }
            Self::MalformedQuery(e) => e.into_response(),
            Self::RecursionLimitExceeded(e) => e.into_response(),
            Self::UnsupportedOrdering(e) => e.into_response(),
            Self::SkipTokenSupportedOnPagedSetsOnly(e) => e.into_response(),
            Self::NotApplicable(e) => e.into_response(),
            Self::NotFound(e) => e.into_response(),
            Self::CollectionNotFound(e) => e.into_response(),
            Self::FilterParsingError(e) => e.into_response(),
            Self::UnsupportedFeature(e) => e.into_response(),
            Self::ProviderFailure(e) => e.into_response(),
        }
    }
}

///////////////////////////////////////////////////////////////////////////////

#[derive(thiserror::Error, Debug)]
#[error("Internal error")]
pub struct InternalError {
    #[source]
    pub source: Box<dyn std::error::Error + Send + Sync + 'static>,
}

impl InternalError {
    pub fn new(error: impl Into<Box<dyn std::error::Error + Send + Sync + 'static>>) -> Self {
        Self {
            source: error.into(),
        }
    }
}

///////////////////////////////////////////////////////////////////////////////

#[derive(thiserror::Error, Debug)]
#[error("Malformed query: {msg}")]
pub struct MalformedQuery {
    pub msg: String,
}

impl MalformedQuery {
    pub fn new(msg: impl Into<String>) -> Self {
        Self { msg: msg.into() }
    }
}

impl axum::response::IntoResponse for MalformedQuery {
    fn into_response(self) -> axum::response::Response {
        (http::StatusCode::BAD_REQUEST, self.to_string()).into_response()
    }
}

///////////////////////////////////////////////////////////////////////////////

#[derive(thiserror::Error, Debug)]
#[error("Recursion limit of {limit} exceeded in {option}")]
pub struct RecursionLimitExceeded {
    pub option: String,
    pub limit: usize,
}

impl RecursionLimitExceeded {
    pub fn new(option: impl Into<String>, limit: usize) -> Self {
        Self {
            option: option.into(),
            limit,
        }
    }
}

impl axum::response::IntoResponse for RecursionLimitExceeded {
    fn into_response(self) -> axum::response::Response {
        (http::StatusCode::BAD_REQUEST, self.to_string()).into_response()
    }
}

///////////////////////////////////////////////////////////////////////////////

#[derive(thiserror::Error, Debug)]
#[error("Property {property} of type {type_name} cannot be used for ordering")]
pub struct UnsupportedOrdering {
    pub property: String,
    pub type_name: String,
}

impl UnsupportedOrdering {
    pub fn new(property: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            type_name: type_name.into(),
        }
    }
}

impl axum::response::IntoResponse for UnsupportedOrdering {
    fn into_response(self) -> axum::response::Response {
        (http::StatusCode::BAD_REQUEST, self.to_string()).into_response()
    }
}

///////////////////////////////////////////////////////////////////////////////

#[derive(thiserror::Error, Debug)]
#[error("$skiptoken is supported only on paged sets, {entity_set} is not paged")]
pub struct SkipTokenSupportedOnPagedSetsOnly {
    pub entity_set: String,
}

impl SkipTokenSupportedOnPagedSetsOnly {
    pub fn new(entity_set: impl Into<String>) -> Self {
        Self {
            entity_set: entity_set.into(),
        }
    }
}

impl axum::response::IntoResponse for SkipTokenSupportedOnPagedSetsOnly {
    fn into_response(self) -> axum::response::Response {
        (http::StatusCode::BAD_REQUEST, self.to_string()).into_response()
    }
}

///////////////////////////////////////////////////////////////////////////////

#[derive(thiserror::Error, Debug)]
#[error("Query option {option} is not applicable to {target}")]
pub struct NotApplicable {
    pub option: String,
    pub target: String,
}

impl NotApplicable {
    pub fn new(option: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            option: option.into(),
            target: target.into(),
        }
    }
}

impl axum::response::IntoResponse for NotApplicable {
    fn into_response(self) -> axum::response::Response {
        (http::StatusCode::BAD_REQUEST, self.to_string()).into_response()
    }
}

///////////////////////////////////////////////////////////////////////////////

#[derive(thiserror::Error, Debug)]
#[error("Resource not found for the segment {segment}")]
pub struct ResourceNotFound {
    pub segment: String,
}

impl ResourceNotFound {
    pub fn new(segment: impl Into<String>) -> Self {
        Self {
            segment: segment.into(),
        }
    }
}

impl axum::response::IntoResponse for ResourceNotFound {
    fn into_response(self) -> axum::response::Response {
        (http::StatusCode::NOT_FOUND, self.to_string()).into_response()
    }
}

///////////////////////////////////////////////////////////////////////////////

#[derive(thiserror::Error, Debug)]
#[error("Collection {collection} not found")]
pub struct CollectionNotFound {
    pub collection: String,
}

impl CollectionNotFound {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
        }
    }
}

impl axum::response::IntoResponse for CollectionNotFound {
    fn into_response(self) -> axum::response::Response {
        (http::StatusCode::NOT_FOUND, self.to_string()).into_response()
    }
}

///////////////////////////////////////////////////////////////////////////////

#[derive(thiserror::Error, Debug)]
#[error("Filter parsing error: {msg}")]
pub struct FilterParsingError {
    pub msg: String,
}

impl FilterParsingError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self { msg: msg.into() }
    }
}

impl axum::response::IntoResponse for FilterParsingError {
    fn into_response(self) -> axum::response::Response {
        (http::StatusCode::BAD_REQUEST, self.to_string()).into_response()
    }
}

impl From<odata_params::filters::ParseError> for ODataError {
    fn from(error: odata_params::filters::ParseError) -> Self {
        ODataError::FilterParsingError(FilterParsingError::new(error.to_string()))
    }
}

///////////////////////////////////////////////////////////////////////////////

#[derive(thiserror::Error, Debug)]
#[error("Unsupported feature: {feature}")]
pub struct UnsupportedFeature {
    pub feature: String,
}

impl UnsupportedFeature {
    pub fn new(feature: impl Into<String>) -> Self {
        Self {
            feature: feature.into(),
        }
    }
}

impl axum::response::IntoResponse for UnsupportedFeature {
    fn into_response(self) -> axum::response::Response {
        (http::StatusCode::NOT_IMPLEMENTED, self.to_string()).into_response()
    }
}

///////////////////////////////////////////////////////////////////////////////

/// Failure reported by a [`crate::datasource::DataSource`] while materializing.
///
/// Provider details reach the client only when the service runs with
/// verbose errors enabled.
#[derive(thiserror::Error, Debug)]
#[error("Provider {provider} failed: {msg}")]
pub struct ProviderFailure {
    pub provider: String,
    pub msg: String,
    pub verbose: bool,
}

impl ProviderFailure {
    pub fn new(provider: impl Into<String>, msg: impl Into<String>, verbose: bool) -> Self {
        Self {
            provider: provider.into(),
            msg: msg.into(),
            verbose,
        }
    }
}

impl axum::response::IntoResponse for ProviderFailure {
    fn into_response(self) -> axum::response::Response {
        if self.verbose {
            (http::StatusCode::INTERNAL_SERVER_ERROR, self.to_string()).into_response()
        } else {
            (http::StatusCode::INTERNAL_SERVER_ERROR, "Internal error").into_response()
        }
    }
}

///////////////////////////////////////////////////////////////////////////////

impl From<quick_xml::Error> for ODataError {
    fn from(error: quick_xml::Error) -> Self {
        ODataError::Internal(InternalError::new(error))
    }
}

impl From<serde_json::Error> for ODataError {
    fn from(error: serde_json::Error) -> Self {
        ODataError::Internal(InternalError::new(error))
    }
}
