mod shared;

use odata_sdp::{
    entity::PropertyAccess,
    error::ODataError,
    interceptor::InterceptorRegistry,
    materializer::{NavigationContent, ProjectedEntity},
    value::Value,
};

use shared::*;

///////////////////////////////////////////////////////////////////////////////

fn navigation_names(entry: &ProjectedEntity) -> Vec<&str> {
    entry.navigations.iter().map(|n| n.name.as_str()).collect()
}

fn inline_entry<'a>(entry: &'a ProjectedEntity, nav: &str) -> &'a ProjectedEntity {
    match navigation(entry, nav) {
        Some(NavigationContent::Entry(Some(target))) => target.as_ref(),
        other => panic!("{nav} is not an inline entry: {other:?}"),
    }
}

///////////////////////////////////////////////////////////////////////////////

#[test]
fn test_default_projection() {
    let ctx = fixture();
    let customer = entry(&ctx, "Customers(1)", "");

    assert_eq!(property_names(&customer), vec!["ID", "Name", "Address"]);
    assert_eq!(navigation_names(&customer), vec!["Orders", "BestFriend"]);
    assert!(customer
        .navigations
        .iter()
        .all(|n| n.content == NavigationContent::Deferred));
}

#[test]
fn test_select_restricts_properties_and_links() {
    let ctx = fixture();

    let customer = entry(&ctx, "Customers(1)", "$select=Name");
    assert_eq!(property_names(&customer), vec!["Name"]);
    assert!(customer.navigations.is_empty());

    let customer = entry(&ctx, "Customers(1)", "$select=Name,Orders,Name");
    assert_eq!(property_names(&customer), vec!["Name"]);
    assert_eq!(navigation_names(&customer), vec!["Orders"]);
    assert_eq!(customer.navigations[0].content, NavigationContent::Deferred);
}

#[test]
fn test_star_keeps_navigations_deferred() {
    let ctx = fixture();

    let customer = entry(&ctx, "Customers(1)", "$select=*");
    assert_eq!(property_names(&customer), vec!["ID", "Name", "Address"]);
    assert_eq!(navigation_names(&customer), vec!["Orders", "BestFriend"]);
    assert!(customer
        .navigations
        .iter()
        .all(|n| n.content == NavigationContent::Deferred));

    let customer = entry(&ctx, "Customers(1)", "$select=*,BestFriend");
    assert_eq!(navigation_names(&customer), vec!["Orders", "BestFriend"]);
    assert_eq!(
        navigation(&customer, "BestFriend"),
        Some(&NavigationContent::Deferred)
    );

    // Only `$expand` inlines under `*`
    let customer = entry(&ctx, "Customers(2)", "$select=*&$expand=BestFriend");
    assert_eq!(inline_entry(&customer, "BestFriend").key, "(1)");
    assert_eq!(
        navigation(&customer, "Orders"),
        Some(&NavigationContent::Deferred)
    );
}

///////////////////////////////////////////////////////////////////////////////

#[test]
fn test_multi_level_expand() {
    let ctx = fixture();
    let customer = entry(&ctx, "Customers(1)", "$expand=Orders/Customer");

    let Some(NavigationContent::Feed(orders)) = navigation(&customer, "Orders") else {
        panic!("Orders not expanded");
    };
    assert_eq!(keys(orders), vec!["(1)", "(2)"]);
    for order in &orders.entries {
        let owner = inline_entry(order, "Customer");
        assert_eq!(owner.key, "(1)");
        assert_eq!(property(owner, "Name"), Some(&Value::from("Customer 1")));
        // The innermost level is not expanded any further
        assert!(owner
            .navigations
            .iter()
            .all(|n| n.content == NavigationContent::Deferred));
    }

    // BestFriend stays a deferred link on the top level
    assert_eq!(
        navigation(&customer, "BestFriend"),
        Some(&NavigationContent::Deferred)
    );
}

#[test]
fn test_nested_select_in_expand() {
    let ctx = fixture();
    let customer = entry(&ctx, "Customers(2)", "$expand=BestFriend($select=Name)");

    let friend = inline_entry(&customer, "BestFriend");
    assert_eq!(friend.key, "(1)");
    assert_eq!(property_names(friend), vec!["Name"]);
    assert!(friend.navigations.is_empty());
}

#[test]
fn test_select_path_through_expanded_navigation() {
    let ctx = fixture();
    let customer = entry(&ctx, "Customers(1)", "$select=ID,Orders/DollarAmount&$expand=Orders");

    assert_eq!(property_names(&customer), vec!["ID"]);
    let Some(NavigationContent::Feed(orders)) = navigation(&customer, "Orders") else {
        panic!("Orders not expanded");
    };
    for order in &orders.entries {
        assert_eq!(property_names(order), vec!["DollarAmount"]);
        assert!(order.navigations.is_empty());
    }

    // The nested projection is carried over to the continuation link
    assert_eq!(
        link_query(orders.next_link.as_deref().unwrap()),
        vec![
            ("$select".to_string(), "DollarAmount".to_string()),
            ("$skiptoken".to_string(), "2".to_string()),
        ]
    );
}

#[test]
fn test_expanded_but_unselected_navigation_is_dropped() {
    let ctx = fixture();
    let customer = entry(&ctx, "Customers(1)", "$select=Name&$expand=Orders");
    assert_eq!(property_names(&customer), vec!["Name"]);
    assert!(customer.navigations.is_empty());
}

#[test]
fn test_null_single_navigation() {
    let ctx = fixture();
    let customer = entry(&ctx, "Customers(3)", "$expand=BestFriend");
    assert_eq!(
        navigation(&customer, "BestFriend"),
        Some(&NavigationContent::Entry(None))
    );
}

#[test]
fn test_interceptor_hides_expanded_entry() {
    let interceptors = InterceptorRegistry::new().with("Customers", |e: &dyn PropertyAccess| {
        e.value("ID") != Some(&Value::Int32(2))
    });
    let ctx = fixture_with(paged_config(), interceptors);

    let customer = entry(&ctx, "Customers(1)", "$expand=BestFriend");
    assert_eq!(
        navigation(&customer, "BestFriend"),
        Some(&NavigationContent::Entry(None))
    );

    let err = run(&ctx, "Customers(2)", "").unwrap_err();
    assert!(matches!(err, ODataError::NotFound(_)), "{err:?}");
}

///////////////////////////////////////////////////////////////////////////////

#[test]
fn test_invalid_projections() {
    let ctx = fixture();

    for query in [
        "$select=Nope",
        "$select=Orders/ID",
        "$select=Name/Length",
        "$expand=Name",
        "$expand=Nope",
        "$select=Name&$expand=Orders($select=ID)",
        "$expand=BestFriend($top=1)",
        "$expand=Orders($filter=Nope eq 1)",
    ] {
        let err = run(&ctx, "Customers(1)", query).unwrap_err();
        assert!(matches!(err, ODataError::MalformedQuery(_)), "{query}: {err:?}");
    }
}

#[test]
fn test_expand_depth_limit() {
    let ctx = fixture_with(
        paged_config().with_max_expand_depth(1),
        InterceptorRegistry::new(),
    );

    assert!(run(&ctx, "Customers(1)", "$expand=Orders($select=ID)").is_ok());

    let err = run(
        &ctx,
        "Customers(1)",
        "$expand=Orders($expand=Customer($select=ID))",
    )
    .unwrap_err();
    assert!(matches!(err, ODataError::RecursionLimitExceeded(_)), "{err:?}");
}

#[test]
fn test_expand_path_depth_limit() {
    let ctx = fixture_with(
        paged_config().with_max_expand_depth(1),
        InterceptorRegistry::new(),
    );
    assert!(run(&ctx, "Customers(1)", "$expand=BestFriend").is_ok());
    let err = run(&ctx, "Customers(1)", "$expand=BestFriend/BestFriend").unwrap_err();
    assert!(matches!(err, ODataError::RecursionLimitExceeded(_)), "{err:?}");
    // The terminal property of a select path is not a navigation step
    assert!(run(&ctx, "Customers(1)", "$select=BestFriend/Name&$expand=BestFriend").is_ok());

    // Rejected up front, long before the tree would be walked
    let ctx = fixture();
    let deep = vec!["BestFriend"; 2000].join("/");
    let err = run(&ctx, "Customers(1)", &format!("$expand={deep}")).unwrap_err();
    assert!(matches!(err, ODataError::RecursionLimitExceeded(_)), "{err:?}");
}
