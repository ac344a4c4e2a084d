use std::sync::Arc;

use axum::{
    extract::{Path, RawQuery},
    response::Response,
    routing::get,
    Extension,
};

use crate::{
    atom::AtomWriter,
    collection::ResourcePath,
    config::PayloadFormat,
    context::ServiceContext,
    error::ODataError,
    executor::{execute, ResourceResult},
    metadata::Edmx,
    query::{ParseLimits, QueryOptions},
    service::Service,
};

///////////////////////////////////////////////////////////////////////////////

pub const MEDIA_TYPE_ATOM: &str = "application/atom+xml;type=feed;charset=utf-8";
pub const MEDIA_TYPE_ATOM_ENTRY: &str = "application/atom+xml;type=entry;charset=utf-8";
pub const MEDIA_TYPE_XML: &str = "application/xml;charset=utf-8";
pub const MEDIA_TYPE_JSON: &str = "application/json;odata=verbose;charset=utf-8";

const DEFAULT_RESPONSE_SIZE: usize = 64_000;

///////////////////////////////////////////////////////////////////////////////

/// Routes `/`, `/$metadata` and every resource path to their handlers.
pub fn router(ctx: Arc<dyn ServiceContext>) -> axum::Router {
    axum::Router::new()
        .route("/", get(odata_service_handler))
        .route("/$metadata", get(odata_metadata_handler))
        .route("/*path", get(odata_resource_handler))
        .layer(Extension(ctx))
}

///////////////////////////////////////////////////////////////////////////////

pub async fn odata_service_handler(
    Extension(odata_ctx): Extension<Arc<dyn ServiceContext>>,
) -> Result<Response<String>, ODataError> {
    let service = Service::from_model(odata_ctx.service_base_url(), odata_ctx.model());

    let xml = write_object_to_xml("service", &service)?;

    Response::builder()
        .header(http::header::CONTENT_TYPE.as_str(), MEDIA_TYPE_XML)
        .body(xml)
        .map_err(ODataError::internal)
}

///////////////////////////////////////////////////////////////////////////////

pub async fn odata_metadata_handler(
    Extension(odata_ctx): Extension<Arc<dyn ServiceContext>>,
) -> Result<Response<String>, ODataError> {
    let metadata = Edmx::from_model(odata_ctx.model());

    let xml = write_object_to_xml("edmx:Edmx", &metadata)?;

    Response::builder()
        .header(http::header::CONTENT_TYPE.as_str(), MEDIA_TYPE_XML)
        .body(xml)
        .map_err(ODataError::internal)
}

///////////////////////////////////////////////////////////////////////////////

pub async fn odata_resource_handler(
    Extension(ctx): Extension<Arc<dyn ServiceContext>>,
    Path(path): Path<String>,
    RawQuery(raw_query): RawQuery,
    headers: axum::http::HeaderMap,
) -> Result<Response<String>, ODataError> {
    let path = ResourcePath::decode(&path)?;
    let query = QueryOptions::parse(
        raw_query.as_deref().unwrap_or_default(),
        &ParseLimits::from(ctx.config()),
    )?;
    tracing::debug!(%path, ?query, "Decoded query");

    let format = negotiate_format(&query, &headers, ctx.config().default_format);
    let result = execute(ctx.as_ref(), &path, &query)?;

    let service_base_url = ctx.service_base_url();

    let (media_type, body) = match format {
        PayloadFormat::Json => {
            let doc = match &result {
                ResourceResult::Feed(feed) => crate::json::feed_document(feed, &service_base_url),
                ResourceResult::Entry(entry) => {
                    crate::json::entry_document(entry, &service_base_url)
                }
                ResourceResult::Property { name, value, .. } => {
                    crate::json::property_document(name, value)
                }
            };
            (MEDIA_TYPE_JSON, serde_json::to_string(&doc)?)
        }
        PayloadFormat::Atom => {
            let mut writer =
                quick_xml::Writer::new(Vec::<u8>::with_capacity(DEFAULT_RESPONSE_SIZE));
            let mut atom =
                AtomWriter::new(&mut writer, &service_base_url, ctx.last_updated_time().await);

            let media_type = match &result {
                ResourceResult::Feed(feed) => {
                    atom.write_feed_document(feed)?;
                    MEDIA_TYPE_ATOM
                }
                ResourceResult::Entry(entry) => {
                    atom.write_entry_document(entry)?;
                    MEDIA_TYPE_ATOM_ENTRY
                }
                ResourceResult::Property { name, typ, value } => {
                    atom.write_property_document(name, typ.as_ref(), value)?;
                    MEDIA_TYPE_XML
                }
            };

            (media_type, String::from_utf8(writer.into_inner())?)
        }
    };

    tracing::debug!(media_type, body_bytes = body.len(), "Prepared a response");

    Response::builder()
        .header(http::header::CONTENT_TYPE.as_str(), media_type)
        .body(body)
        .map_err(ODataError::internal)
}

/// `$format` wins over `Accept`, which wins over the configured default.
fn negotiate_format(
    query: &QueryOptions,
    headers: &axum::http::HeaderMap,
    default: PayloadFormat,
) -> PayloadFormat {
    if let Some(format) = query.format {
        return format;
    }

    let accept = headers
        .get(http::header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if accept.contains("application/json") {
        PayloadFormat::Json
    } else if accept.contains("application/atom+xml") {
        PayloadFormat::Atom
    } else {
        default
    }
}

///////////////////////////////////////////////////////////////////////////////

fn write_object_to_xml<T>(tag: &str, object: &T) -> Result<String, ODataError>
where
    T: serde::ser::Serialize,
{
    let mut writer = quick_xml::Writer::new(Vec::<u8>::with_capacity(DEFAULT_RESPONSE_SIZE));

    writer
        .write_event(quick_xml::events::Event::Decl(
            quick_xml::events::BytesDecl::new("1.0", Some("utf-8"), None),
        ))
        .map_err(ODataError::internal)?;

    writer
        .write_serializable(tag, object)
        .map_err(ODataError::internal)?;

    Ok(String::from_utf8(writer.into_inner())?)
}
