#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Utc};
use odata_sdp::{
    collection::ResourcePath,
    config::ServiceConfig,
    context::{ODataContext, ServiceContext},
    datasource::InMemoryDataSource,
    entity::Entity,
    error::ODataError,
    executor::{execute, ResourceResult},
    interceptor::InterceptorRegistry,
    materializer::{NavigationContent, ProjectedEntity, ProjectedFeed},
    model::{ComplexType, EntitySet, EntityType, Model, Multiplicity},
    query::{ParseLimits, QueryOptions},
    value::{ComplexValue, EdmType, Value},
};

///////////////////////////////////////////////////////////////////////////////

pub const BASE_URL: &str = "http://example.com/odata/";

pub fn model() -> Model {
    Model::new("Northwind")
        .with_complex_type(
            ComplexType::new("Address")
                .with_property("City", EdmType::String, true)
                .with_property("Zip", EdmType::String, true),
        )
        .with_entity_type(
            EntityType::new("Customer")
                .with_key(&["ID"])
                .with_property("ID", EdmType::Int32, false)
                .with_property("Name", EdmType::String, true)
                .with_property(
                    "Address",
                    EdmType::Complex("Northwind.Address".to_string()),
                    true,
                )
                .with_navigation("Orders", "Orders", Multiplicity::Many)
                .with_navigation("BestFriend", "Customers", Multiplicity::One),
        )
        .with_entity_type(
            EntityType::new("Order")
                .with_key(&["ID"])
                .with_property("ID", EdmType::Int32, false)
                .with_property("DollarAmount", EdmType::Double, false)
                .with_navigation("Customer", "Customers", Multiplicity::One),
        )
        .with_entity_type(
            EntityType::new("Product")
                .with_key(&["ProductID"])
                .with_property("ProductID", EdmType::Int32, false)
                .with_property("Name", EdmType::String, false)
                .with_property("Discontinued", EdmType::Boolean, false),
        )
        .with_entity_type(
            EntityType::new("Region")
                .with_key(&["Zone", "Code"])
                .with_property("Zone", EdmType::String, false)
                .with_property("Code", EdmType::Int32, false),
        )
        .with_entity_type(
            EntityType::new("OpenElement")
                .with_key(&["ID"])
                .with_property("ID", EdmType::Int32, false)
                .with_property("Name", EdmType::String, true)
                .open(),
        )
        .with_entity_set(EntitySet::new("Customers", "Customer"))
        .with_entity_set(EntitySet::new("Orders", "Order"))
        .with_entity_set(EntitySet::new("Products", "Product"))
        .with_entity_set(EntitySet::new("Regions", "Region"))
        .with_entity_set(EntitySet::new("OpenElements", "OpenElement"))
}

/// Three customers; customer 1 owns orders 1-3, customer 2 owns 4-5,
/// customer 3 has neither orders nor a best friend.
pub fn data_source(model: Arc<Model>) -> InMemoryDataSource {
    let customers = (1..=3).map(|id| {
        let address = if id == 1 {
            Value::Complex(
                ComplexValue::new("Northwind.Address")
                    .with("City", "Redmond")
                    .with("Zip", "98052"),
            )
        } else {
            Value::Null
        };
        Entity::new("Customer")
            .with("ID", id)
            .with("Name", format!("Customer {id}"))
            .with("Address", address)
    });

    let orders = (1..=6).map(|id| {
        Entity::new("Order")
            .with("ID", id)
            .with("DollarAmount", f64::from(id) * 10.5)
    });

    let products = [
        (1, "Bread", false),
        (2, "Milk", true),
        (3, "Wine", false),
        (4, "Cheese", true),
        (5, "Eggs", false),
    ]
    .into_iter()
    .map(|(id, name, discontinued)| {
        Entity::new("Product")
            .with("ProductID", id)
            .with("Name", name)
            .with("Discontinued", discontinued)
    });

    let regions = [("North", 2), ("North", 1), ("South", 1)]
        .into_iter()
        .map(|(zone, code)| Entity::new("Region").with("Zone", zone).with("Code", code));

    let open_elements = vec![
        Entity::new("OpenElement")
            .with("ID", 1)
            .with("Name", "First")
            .with_dynamic("Color", "red")
            .with_dynamic("Size", 3),
        Entity::new("OpenElement")
            .with("ID", 2)
            .with("Name", "Second")
            .with_dynamic("Color", "blue"),
        Entity::new("OpenElement").with("ID", 3).with("Name", "Third"),
    ];

    InMemoryDataSource::new(model)
        .with_entities("Customers", customers)
        .with_entities("Orders", orders)
        .with_entities("Products", products)
        .with_entities("Regions", regions)
        .with_entities("OpenElements", open_elements)
        .with_link("Customers", 1, "Orders", 1)
        .with_link("Customers", 1, "Orders", 2)
        .with_link("Customers", 1, "Orders", 3)
        .with_link("Customers", 2, "Orders", 4)
        .with_link("Customers", 2, "Orders", 5)
        .with_link("Orders", 1, "Customer", 1)
        .with_link("Orders", 2, "Customer", 1)
        .with_link("Orders", 3, "Customer", 1)
        .with_link("Orders", 4, "Customer", 2)
        .with_link("Orders", 5, "Customer", 2)
        .with_link("Customers", 1, "BestFriend", 2)
        .with_link("Customers", 2, "BestFriend", 1)
}

pub fn paged_config() -> ServiceConfig {
    ServiceConfig::new()
        .with_page_size("Customers", 2)
        .with_page_size("Orders", 2)
        .with_page_size("Products", 2)
        .with_page_size("Regions", 2)
}

pub fn updated_time() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2023-01-01T00:00:00Z")
        .unwrap()
        .into()
}

pub fn fixture() -> Arc<dyn ServiceContext> {
    fixture_with(paged_config(), InterceptorRegistry::new())
}

pub fn fixture_with(
    config: ServiceConfig,
    interceptors: InterceptorRegistry,
) -> Arc<dyn ServiceContext> {
    let model = Arc::new(model());
    let source = data_source(model.clone());
    Arc::new(
        ODataContext::new(BASE_URL, model, Arc::new(config), Arc::new(source))
            .with_interceptors(interceptors)
            .with_updated_time(updated_time()),
    )
}

///////////////////////////////////////////////////////////////////////////////

pub fn run(
    ctx: &Arc<dyn ServiceContext>,
    path: &str,
    query: &str,
) -> Result<ResourceResult, ODataError> {
    let path = ResourcePath::decode(path)?;
    let options = QueryOptions::parse(query, &ParseLimits::from(ctx.config()))?;
    execute(ctx.as_ref(), &path, &options)
}

pub fn feed(ctx: &Arc<dyn ServiceContext>, path: &str, query: &str) -> ProjectedFeed {
    match run(ctx, path, query).unwrap() {
        ResourceResult::Feed(feed) => feed,
        other => panic!("Expected a feed, got {other:?}"),
    }
}

pub fn entry(ctx: &Arc<dyn ServiceContext>, path: &str, query: &str) -> ProjectedEntity {
    match run(ctx, path, query).unwrap() {
        ResourceResult::Entry(entry) => entry,
        other => panic!("Expected an entry, got {other:?}"),
    }
}

/// Key predicates of the entries, e.g. `["(1)", "(2)"]`
pub fn keys(feed: &ProjectedFeed) -> Vec<String> {
    feed.entries.iter().map(|e| e.key.clone()).collect()
}

pub fn property<'a>(entry: &'a ProjectedEntity, name: &str) -> Option<&'a Value> {
    entry
        .properties
        .iter()
        .find(|p| p.name == name)
        .map(|p| &p.value)
}

pub fn property_names(entry: &ProjectedEntity) -> Vec<&str> {
    entry.properties.iter().map(|p| p.name.as_str()).collect()
}

pub fn navigation<'a>(entry: &'a ProjectedEntity, name: &str) -> Option<&'a NavigationContent> {
    entry
        .navigations
        .iter()
        .find(|n| n.name == name)
        .map(|n| &n.content)
}

/// Decoded query pairs of a continuation link
pub fn link_query(link: &str) -> Vec<(String, String)> {
    let (_, query) = link.split_once('?').unwrap();
    url::form_urlencoded::parse(query.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

/// Follows continuation links until exhausted, returning every page.
pub fn all_pages(ctx: &Arc<dyn ServiceContext>, path: &str, query: &str) -> Vec<ProjectedFeed> {
    let mut pages = vec![feed(ctx, path, query)];
    while let Some(next) = pages.last().and_then(|p| p.next_link.clone()) {
        let rest = next.strip_prefix(BASE_URL).unwrap();
        let (path, query) = rest.split_once('?').unwrap();
        pages.push(feed(ctx, path, query));
    }
    pages
}
