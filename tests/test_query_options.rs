mod shared;

use odata_sdp::{
    error::ODataError,
    executor::ResourceResult,
    interceptor::InterceptorRegistry,
    value::{ComplexValue, EdmType, Value},
};

use shared::*;

///////////////////////////////////////////////////////////////////////////////

fn malformed(path: &str, query: &str) {
    let ctx = fixture();
    let err = run(&ctx, path, query).unwrap_err();
    assert!(
        matches!(err, ODataError::MalformedQuery(_)),
        "{path}?{query}: {err:?}"
    );
}

///////////////////////////////////////////////////////////////////////////////

#[test]
fn test_option_names() {
    malformed("Customers", "$foo=1");
    malformed("Customers", "$top=1&$top=2");
    malformed("Customers", "$format=csv");

    // Non-system options belong to the provider
    let ctx = fixture();
    assert_eq!(keys(&feed(&ctx, "Customers", "foo=bar&$top=1")), vec!["(1)"]);
}

#[test]
fn test_count_values() {
    let ctx = fixture();

    assert_eq!(keys(&feed(&ctx, "Orders", "$top=0x1")), vec!["(1)"]);
    assert_eq!(keys(&feed(&ctx, "Orders", "$top=1&$skip=0x1")), vec!["(2)"]);
    assert!(feed(&ctx, "Orders", "$top=0").entries.is_empty());

    malformed("Orders", "$skip=0x2");
    malformed("Orders", "$top=-1");
    malformed("Orders", "$top=+1");
    malformed("Orders", "$top=01");
    malformed("Orders", "$top=2147483648");
    malformed("Orders", "$count=yes");
}

#[test]
fn test_max_top() {
    let ctx = fixture_with(paged_config().with_max_top(2), InterceptorRegistry::new());
    assert!(run(&ctx, "Customers", "$top=2").is_ok());

    let err = run(&ctx, "Customers", "$top=3").unwrap_err();
    assert!(matches!(err, ODataError::MalformedQuery(_)), "{err:?}");
}

#[test]
fn test_select_syntax() {
    let ctx = fixture();

    // A single trailing comma is tolerated
    let customer = entry(&ctx, "Customers(1)", "$select=ID,");
    assert_eq!(property_names(&customer), vec!["ID"]);

    malformed("Customers", "$select=ID,,Name");
    malformed("Customers", "$select=,ID");
    malformed("Customers", "$select=/ID");
    malformed("Customers", "$select=*/ID");
    malformed("Customers", "$expand=*");
    malformed("Customers", "$select=ID($top=1)");
}

///////////////////////////////////////////////////////////////////////////////

#[test]
fn test_filter_and_orderby() {
    let ctx = fixture();

    let result = feed(&ctx, "Customers", "$filter=Name eq 'Customer 2'");
    assert_eq!(keys(&result), vec!["(2)"]);

    let result = feed(&ctx, "Orders", "$filter=DollarAmount gt 30 and DollarAmount lt 50");
    assert_eq!(keys(&result), vec!["(3)", "(4)"]);

    let result = feed(&ctx, "Customers", "$orderby=Name desc");
    assert_eq!(keys(&result), vec!["(3)", "(2)"]);

    malformed("Customers", "$orderby=Name up");
    malformed("Customers", "$orderby=Nope");
    malformed("Customers", "$filter=");
}

#[test]
fn test_orderby_complex_member_with_nulls() {
    let ctx = fixture();

    // Customers without an address sort first
    let first = feed(&ctx, "Customers", "$orderby=Address/City");
    assert_eq!(keys(&first), vec!["(2)", "(3)"]);
    assert_eq!(
        link_query(first.next_link.as_deref().unwrap()),
        vec![
            ("$orderby".to_string(), "Address/City".to_string()),
            ("$skiptoken".to_string(), "null,3".to_string()),
        ]
    );

    let pages = all_pages(&ctx, "Customers", "$orderby=Address/City");
    assert_eq!(keys(&pages[1]), vec!["(1)"]);
}

#[test]
fn test_unorderable_properties() {
    let ctx = fixture();

    let err = run(&ctx, "Customers", "$orderby=Address").unwrap_err();
    assert!(matches!(err, ODataError::UnsupportedOrdering(_)), "{err:?}");

    let err = run(&ctx, "Customers", "$orderby=Orders").unwrap_err();
    assert!(matches!(err, ODataError::UnsupportedFeature(_)), "{err:?}");
}

///////////////////////////////////////////////////////////////////////////////

#[test]
fn test_options_on_single_targets() {
    let ctx = fixture();

    for query in ["$filter=ID eq 1", "$orderby=Name", "$top=1", "$skip=1", "$count=true"] {
        let err = run(&ctx, "Customers(1)", query).unwrap_err();
        assert!(matches!(err, ODataError::NotApplicable(_)), "{query}: {err:?}");
    }

    let err = run(&ctx, "Orders(1)/Customer", "$top=1").unwrap_err();
    assert!(matches!(err, ODataError::NotApplicable(_)), "{err:?}");

    for query in ["$select=City", "$expand=Orders", "$top=1"] {
        let err = run(&ctx, "Customers(1)/Address", query).unwrap_err();
        assert!(matches!(err, ODataError::NotApplicable(_)), "{query}: {err:?}");
    }
}

#[test]
fn test_resource_paths() {
    let ctx = fixture();

    match run(&ctx, "Customers(1)/Address", "").unwrap() {
        ResourceResult::Property { name, typ, value } => {
            assert_eq!(name, "Address");
            assert_eq!(typ, Some(EdmType::Complex("Northwind.Address".to_string())));
            assert_eq!(
                value,
                Value::Complex(
                    ComplexValue::new("Northwind.Address")
                        .with("City", "Redmond")
                        .with("Zip", "98052")
                )
            );
        }
        other => panic!("Expected a property, got {other:?}"),
    }

    assert_eq!(entry(&ctx, "Orders(4)/Customer", "").key, "(2)");
    assert_eq!(entry(&ctx, "Customers(1)/BestFriend/BestFriend", "").key, "(1)");

    for path in ["Customers(99)", "Orders(6)/Customer", "Customers(1)/Nope", "Suppliers"] {
        let err = run(&ctx, path, "").unwrap_err();
        assert!(
            matches!(
                err,
                ODataError::NotFound(_) | ODataError::CollectionNotFound(_)
            ),
            "{path}: {err:?}"
        );
    }

    malformed("Customers('x')", "");
    malformed("Customers(1)/Name/Length", "");
}

#[test]
fn test_composite_keys() {
    let ctx = fixture();

    let region = entry(&ctx, "Regions(Zone='North',Code=2)", "");
    assert_eq!(region.key, "(Zone='North',Code=2)");
    let region = entry(&ctx, "Regions(Code=1,Zone='South')", "");
    assert_eq!(region.key, "(Zone='South',Code=1)");

    malformed("Regions('North')", "");
    malformed("Regions(Zone='North')", "");
}

///////////////////////////////////////////////////////////////////////////////

fn region_tokens(config: odata_sdp::config::ServiceConfig) -> (Vec<String>, String) {
    let ctx = fixture_with(config, InterceptorRegistry::new());
    let first = feed(&ctx, "Regions", "");
    let token = link_query(first.next_link.as_deref().unwrap())
        .into_iter()
        .find(|(k, _)| k == "$skiptoken")
        .map(|(_, v)| v)
        .unwrap();
    (keys(&first), token)
}

#[test]
fn test_key_order_precedence() {
    let alphabetical = (
        vec![
            "(Zone='North',Code=1)".to_string(),
            "(Zone='South',Code=1)".to_string(),
        ],
        "1,'South'".to_string(),
    );
    let declared = (
        vec![
            "(Zone='North',Code=1)".to_string(),
            "(Zone='North',Code=2)".to_string(),
        ],
        "'North',2".to_string(),
    );

    assert_eq!(region_tokens(paged_config()), alphabetical);
    assert_eq!(
        region_tokens(paged_config().with_default_key_order(true)),
        declared
    );
    assert_eq!(
        region_tokens(paged_config().with_custom_state(
            "Regions",
            "UseMetadataKeyOrder",
            serde_json::Value::Bool(true)
        )),
        declared
    );
    // Non-boolean marker values are ignored
    assert_eq!(
        region_tokens(paged_config().with_custom_state(
            "Regions",
            "UseMetadataKeyOrder",
            serde_json::Value::String("yes".to_string())
        )),
        alphabetical
    );
    // The explicit setter beats the marker
    assert_eq!(
        region_tokens(
            paged_config()
                .with_custom_state("Regions", "UseMetadataKeyOrder", serde_json::Value::Bool(true))
                .with_set_key_order("Regions", false)
        ),
        alphabetical
    );
    // The marker beats the provider default
    assert_eq!(
        region_tokens(
            paged_config()
                .with_default_key_order(true)
                .with_custom_state("Regions", "UseMetadataKeyOrder", serde_json::Value::Bool(false))
        ),
        alphabetical
    );
}

#[test]
fn test_resume_with_composite_token() {
    let ctx = fixture();

    let pages = all_pages(&ctx, "Regions", "");
    assert_eq!(pages.len(), 2);
    assert_eq!(keys(&pages[1]), vec!["(Zone='North',Code=2)"]);

    let err = run(&ctx, "Regions", "$skiptoken='South',1").unwrap_err();
    assert!(matches!(err, ODataError::MalformedQuery(_)), "{err:?}");
}
