mod shared;

use std::sync::Arc;

use axum::{
    extract::{Path, RawQuery},
    Extension,
};
use indoc::indoc;
use odata_sdp::{
    config::ServiceConfig,
    context::{ODataContext, ServiceContext},
    datasource::InMemoryDataSource,
    handlers::*,
    model::{ComplexType, EntitySet, EntityType, Model, Multiplicity},
    value::EdmType,
};

use shared::{fixture, updated_time};

///////////////////////////////////////////////////////////////////////////////

async fn get(ctx: Arc<dyn ServiceContext>, path: &str, query: &str) -> String {
    let resp = odata_resource_handler(
        Extension(ctx),
        Path(path.to_string()),
        RawQuery(Some(query.to_string())),
        axum::http::HeaderMap::new(),
    )
    .await
    .unwrap();
    resp.into_body()
}

///////////////////////////////////////////////////////////////////////////////

#[tokio::test]
async fn test_service() {
    let ctx = fixture();
    let resp = odata_service_handler(Extension(ctx)).await.unwrap();
    assert_eq!(
        resp.headers()[http::header::CONTENT_TYPE],
        MEDIA_TYPE_XML
    );
    assert_eq!(
        *resp.body(),
        indoc!(
            r#"
            <?xml version="1.0" encoding="utf-8"?>
            <service xml:base="http://example.com/odata/"
             xmlns="http://www.w3.org/2007/app"
             xmlns:atom="http://www.w3.org/2005/Atom">
            <workspace>
            <atom:title>Default</atom:title>
            <collection href="Customers">
            <atom:title>Customers</atom:title>
            </collection>
            <collection href="Orders">
            <atom:title>Orders</atom:title>
            </collection>
            <collection href="Products">
            <atom:title>Products</atom:title>
            </collection>
            <collection href="Regions">
            <atom:title>Regions</atom:title>
            </collection>
            <collection href="OpenElements">
            <atom:title>OpenElements</atom:title>
            </collection>
            </workspace>
            </service>
            "#
        )
        .replace('\n', "")
    );
}

///////////////////////////////////////////////////////////////////////////////

#[tokio::test]
async fn test_metadata() {
    let model = Arc::new(
        Model::new("Demo")
            .with_complex_type(
                ComplexType::new("Address").with_property("City", EdmType::String, true),
            )
            .with_entity_type(
                EntityType::new("Element")
                    .with_key(&["ID"])
                    .with_property("ID", EdmType::Int32, false)
                    .with_property("Address", EdmType::Complex("Demo.Address".to_string()), true)
                    .with_navigation("Parent", "Elements", Multiplicity::One)
                    .open(),
            )
            .with_entity_set(EntitySet::new("Elements", "Element")),
    );
    let source = InMemoryDataSource::new(model.clone());
    let ctx: Arc<dyn ServiceContext> = Arc::new(
        ODataContext::new(
            "http://example.com/odata",
            model,
            Arc::new(ServiceConfig::new()),
            Arc::new(source),
        )
        .with_updated_time(updated_time()),
    );

    let resp = odata_metadata_handler(Extension(ctx)).await.unwrap();
    assert_eq!(
        *resp.body(),
        indoc!(
            r#"
            <?xml version="1.0" encoding="utf-8"?>
            <edmx:Edmx xmlns:edmx="http://schemas.microsoft.com/ado/2007/06/edmx" Version="1.0">
            <edmx:DataServices xmlns:m="http://schemas.microsoft.com/ado/2007/08/dataservices/metadata" m:DataServiceVersion="3.0" m:MaxDataServiceVersion="3.0">
            <Schema Namespace="Demo" xmlns="http://schemas.microsoft.com/ado/2009/11/edm">
            <EntityType Name="Element" OpenType="true">
            <Key><PropertyRef Name="ID"/></Key>
            <Property Name="ID" Type="Edm.Int32" Nullable="false"/>
            <Property Name="Address" Type="Demo.Address" Nullable="true"/>
            <NavigationProperty Name="Parent" Relationship="Demo.Element_Parent" FromRole="Element" ToRole="Parent"/>
            </EntityType>
            <ComplexType Name="Address">
            <Property Name="City" Type="Edm.String" Nullable="true"/>
            </ComplexType>
            <Association Name="Element_Parent">
            <End Type="Demo.Element" Role="Element" Multiplicity="*"/>
            <End Type="Demo.Element" Role="Parent" Multiplicity="0..1"/>
            </Association>
            <EntityContainer Name="Demo" m:IsDefaultEntityContainer="true">
            <EntitySet Name="Elements" EntityType="Demo.Element"/>
            <AssociationSet Name="Elements_Parent" Association="Demo.Element_Parent">
            <End Role="Element" EntitySet="Elements"/>
            <End Role="Parent" EntitySet="Elements"/>
            </AssociationSet>
            </EntityContainer>
            </Schema>
            </edmx:DataServices>
            </edmx:Edmx>
            "#
        )
        .replace('\n', "")
    );
}

///////////////////////////////////////////////////////////////////////////////

#[tokio::test]
async fn test_entry() {
    let body = get(fixture(), "Customers(1)", "$select=ID,Name").await;
    assert_eq!(
        body,
        indoc!(
            r#"
            <?xml version="1.0" encoding="utf-8"?>
            <entry
             xml:base="http://example.com/odata/"
             xmlns="http://www.w3.org/2005/Atom"
             xmlns:d="http://schemas.microsoft.com/ado/2007/08/dataservices"
             xmlns:m="http://schemas.microsoft.com/ado/2007/08/dataservices/metadata">
            <id>http://example.com/odata/Customers(1)</id>
            <category scheme="http://schemas.microsoft.com/ado/2007/08/dataservices/scheme" term="Northwind.Customer"/>
            <link rel="edit" title="Customers" href="Customers(1)"/>
            <title/>
            <updated>2023-01-01T00:00:00.000Z</updated>
            <author><name/></author>
            <content type="application/xml">
            <m:properties>
            <d:ID m:type="Edm.Int32">1</d:ID>
            <d:Name m:type="Edm.String">Customer 1</d:Name>
            </m:properties>
            </content>
            </entry>
            "#
        )
        .replace('\n', "")
    );
}

///////////////////////////////////////////////////////////////////////////////

#[tokio::test]
async fn test_paged_feed() {
    let body = get(fixture(), "Customers", "$select=ID").await;
    assert_eq!(
        body,
        indoc!(
            r#"
            <?xml version="1.0" encoding="utf-8"?>
            <feed
             xml:base="http://example.com/odata/"
             xmlns="http://www.w3.org/2005/Atom"
             xmlns:d="http://schemas.microsoft.com/ado/2007/08/dataservices"
             xmlns:m="http://schemas.microsoft.com/ado/2007/08/dataservices/metadata">
            <id>http://example.com/odata/Customers</id>
            <title type="text">Customers</title>
            <updated>2023-01-01T00:00:00.000Z</updated>
            <link rel="self" title="Customers" href="Customers"/>
            <entry>
            <id>http://example.com/odata/Customers(1)</id>
            <category scheme="http://schemas.microsoft.com/ado/2007/08/dataservices/scheme" term="Northwind.Customer"/>
            <link rel="edit" title="Customers" href="Customers(1)"/>
            <title/>
            <updated>2023-01-01T00:00:00.000Z</updated>
            <author><name/></author>
            <content type="application/xml">
            <m:properties>
            <d:ID m:type="Edm.Int32">1</d:ID>
            </m:properties>
            </content>
            </entry>
            <entry>
            <id>http://example.com/odata/Customers(2)</id>
            <category scheme="http://schemas.microsoft.com/ado/2007/08/dataservices/scheme" term="Northwind.Customer"/>
            <link rel="edit" title="Customers" href="Customers(2)"/>
            <title/>
            <updated>2023-01-01T00:00:00.000Z</updated>
            <author><name/></author>
            <content type="application/xml">
            <m:properties>
            <d:ID m:type="Edm.Int32">2</d:ID>
            </m:properties>
            </content>
            </entry>
            <link rel="next" href="http://example.com/odata/Customers?$select=ID&amp;$skiptoken=2"/>
            </feed>
            "#
        )
        .replace('\n', "")
    );
}

///////////////////////////////////////////////////////////////////////////////

#[tokio::test]
async fn test_null_single_navigation_is_inline_empty() {
    let body = get(fixture(), "Customers(3)", "$select=ID,BestFriend&$expand=BestFriend").await;
    assert_eq!(
        body,
        indoc!(
            r#"
            <?xml version="1.0" encoding="utf-8"?>
            <entry
             xml:base="http://example.com/odata/"
             xmlns="http://www.w3.org/2005/Atom"
             xmlns:d="http://schemas.microsoft.com/ado/2007/08/dataservices"
             xmlns:m="http://schemas.microsoft.com/ado/2007/08/dataservices/metadata">
            <id>http://example.com/odata/Customers(3)</id>
            <category scheme="http://schemas.microsoft.com/ado/2007/08/dataservices/scheme" term="Northwind.Customer"/>
            <link rel="edit" title="Customers" href="Customers(3)"/>
            <link
             rel="http://schemas.microsoft.com/ado/2007/08/dataservices/related/BestFriend"
             type="application/atom+xml;type=entry"
             title="BestFriend"
             href="Customers(3)/BestFriend">
            <m:inline/>
            </link>
            <title/>
            <updated>2023-01-01T00:00:00.000Z</updated>
            <author><name/></author>
            <content type="application/xml">
            <m:properties>
            <d:ID m:type="Edm.Int32">3</d:ID>
            </m:properties>
            </content>
            </entry>
            "#
        )
        .replace('\n', "")
    );
}

///////////////////////////////////////////////////////////////////////////////

#[tokio::test]
async fn test_deferred_links_and_complex_values() {
    let body = get(fixture(), "Customers(1)", "").await;
    assert!(body.contains(
        r#"<link rel="http://schemas.microsoft.com/ado/2007/08/dataservices/related/Orders" type="application/atom+xml;type=feed" title="Orders" href="Customers(1)/Orders"/>"#
    ));
    assert!(body.contains(
        r#"<d:Address m:type="Northwind.Address"><d:City m:type="Edm.String">Redmond</d:City><d:Zip m:type="Edm.String">98052</d:Zip></d:Address>"#
    ));

    let body = get(fixture(), "Customers(2)", "").await;
    assert!(body.contains(r#"<d:Address m:type="Northwind.Address" m:null="true"/>"#));
}

///////////////////////////////////////////////////////////////////////////////

#[tokio::test]
async fn test_property_document() {
    let body = get(fixture(), "Customers(2)/Name", "").await;
    assert_eq!(
        body,
        indoc!(
            r#"
            <?xml version="1.0" encoding="utf-8"?>
            <d:Name
             xmlns:d="http://schemas.microsoft.com/ado/2007/08/dataservices"
             xmlns:m="http://schemas.microsoft.com/ado/2007/08/dataservices/metadata"
             m:type="Edm.String">Customer 2</d:Name>
            "#
        )
        .replace('\n', "")
    );
}

///////////////////////////////////////////////////////////////////////////////

#[tokio::test]
async fn test_json_format() {
    let resp = odata_resource_handler(
        Extension(fixture()),
        Path("Customers".to_string()),
        RawQuery(Some("$select=ID,Name&$top=1&$count=true&$format=json".to_string())),
        axum::http::HeaderMap::new(),
    )
    .await
    .unwrap();
    assert_eq!(
        resp.headers()[http::header::CONTENT_TYPE],
        MEDIA_TYPE_JSON
    );

    let doc: serde_json::Value = serde_json::from_str(resp.body()).unwrap();
    assert_eq!(
        doc,
        serde_json::json!({
            "d": {
                "results": [{
                    "__metadata": {
                        "uri": "http://example.com/odata/Customers(1)",
                        "type": "Northwind.Customer"
                    },
                    "ID": 1,
                    "Name": "Customer 1"
                }],
                "__count": "3"
            }
        })
    );
}

#[tokio::test]
async fn test_accept_header_selects_json() {
    let mut headers = axum::http::HeaderMap::new();
    headers.insert(
        http::header::ACCEPT,
        "application/json".parse().unwrap(),
    );
    let resp = odata_resource_handler(
        Extension(fixture()),
        Path("Products(2)".to_string()),
        RawQuery(None),
        headers,
    )
    .await
    .unwrap();

    let doc: serde_json::Value = serde_json::from_str(resp.body()).unwrap();
    assert_eq!(doc["d"]["Name"], "Milk");
    assert_eq!(doc["d"]["Discontinued"], true);
}

#[tokio::test]
async fn test_router() {
    use tower::ServiceExt;

    async fn call(uri: &str) -> (http::StatusCode, String, String) {
        let resp = router(fixture())
            .oneshot(
                http::Request::builder()
                    .uri(uri)
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = resp.status();
        let content_type = resp.headers()[http::header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .to_string();
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, content_type, String::from_utf8(body.to_vec()).unwrap())
    }

    let (status, content_type, body) = call("/").await;
    assert_eq!(status, http::StatusCode::OK);
    assert_eq!(content_type, MEDIA_TYPE_XML);
    assert!(body.contains("<collection href=\"Customers\">"));

    let (status, _, body) = call("/$metadata").await;
    assert_eq!(status, http::StatusCode::OK);
    assert!(body.contains("<edmx:Edmx"));

    let (status, content_type, body) = call("/Customers(1)?$select=ID").await;
    assert_eq!(status, http::StatusCode::OK);
    assert_eq!(content_type, MEDIA_TYPE_ATOM_ENTRY);
    assert!(body.contains(r#"<d:ID m:type="Edm.Int32">1</d:ID>"#));

    let (status, _, _) = call("/Customers(99)").await;
    assert_eq!(status, http::StatusCode::NOT_FOUND);

    let (status, _, _) = call("/Customers?$top=-1").await;
    assert_eq!(status, http::StatusCode::BAD_REQUEST);
}
