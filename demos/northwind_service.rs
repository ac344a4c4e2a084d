use std::sync::Arc;

use odata_sdp::{
    config::ServiceConfig,
    context::ODataContext,
    datasource::InMemoryDataSource,
    entity::{Entity, PropertyAccess},
    handlers::router,
    interceptor::InterceptorRegistry,
    model::{EntitySet, EntityType, Model, Multiplicity},
    value::{EdmType, Value},
};

const CONFIG: &str = r#"{
    "entitySets": {
        "Customers": { "pageSize": 2 },
        "Orders": { "pageSize": 3, "customState": { "UseMetadataKeyOrder": true } }
    },
    "maxExpandDepth": 4
}"#;

///////////////////////////////////////////////////////////////////////////////

fn model() -> Model {
    Model::new("Northwind")
        .with_entity_type(
            EntityType::new("Customer")
                .with_key(&["ID"])
                .with_property("ID", EdmType::Int32, false)
                .with_property("Name", EdmType::String, true)
                .with_navigation("Orders", "Orders", Multiplicity::Many),
        )
        .with_entity_type(
            EntityType::new("Order")
                .with_key(&["ID"])
                .with_property("ID", EdmType::Int32, false)
                .with_property("DollarAmount", EdmType::Double, false)
                .with_property("Archived", EdmType::Boolean, false)
                .with_navigation("Customer", "Customers", Multiplicity::One),
        )
        .with_entity_set(EntitySet::new("Customers", "Customer"))
        .with_entity_set(EntitySet::new("Orders", "Order"))
}

fn data_source(model: Arc<Model>) -> InMemoryDataSource {
    let mut source = InMemoryDataSource::new(model).with_entities(
        "Customers",
        (1..=5).map(|id| {
            Entity::new("Customer")
                .with("ID", id)
                .with("Name", format!("Customer {id}"))
        }),
    );

    for id in 1..=20i32 {
        let owner = id % 5 + 1;
        source.insert(
            "Orders",
            Entity::new("Order")
                .with("ID", id)
                .with("DollarAmount", f64::from(id) * 12.25)
                .with("Archived", id % 7 == 0),
        );
        source = source
            .with_link("Customers", owner, "Orders", id)
            .with_link("Orders", id, "Customer", owner);
    }

    source
}

///////////////////////////////////////////////////////////////////////////////

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    tracing::info!("Initializing");

    let config = ServiceConfig::from_json_str(CONFIG).unwrap();
    let model = Arc::new(model());
    let source = data_source(model.clone());

    // Archived orders never leave the service
    let interceptors = InterceptorRegistry::new().with("Orders", |e: &dyn PropertyAccess| {
        e.value("Archived") != Some(&Value::Boolean(true))
    });

    let ctx = ODataContext::new(
        "http://localhost:3000/",
        model,
        Arc::new(config),
        Arc::new(source),
    )
    .with_interceptors(interceptors);

    let app = router(Arc::new(ctx))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(vec![http::Method::GET])
                .allow_headers(tower_http::cors::Any),
        );

    let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();

    tracing::info!("Running");
    if let Err(err) = axum::serve(listener, app).await {
        eprintln!("server error: {}", err);
    }
}
