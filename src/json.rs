use serde_json::{json, Map, Value as Json};

use crate::{
    materializer::{NavigationContent, ProjectedEntity, ProjectedFeed},
    value::{EdmType, Value},
};

///////////////////////////////////////////////////////////////////////////////

// Verbose JSON:
//
// {"d": {
//   "results": [
//     {"__metadata": {"uri": "http://example.com/odata/Customers(1)", "type": "default.Customer"},
//      "ID": 1,
//      "Orders": {"__deferred": {"uri": "http://example.com/odata/Customers(1)/Orders"}}}
//   ],
//   "__count": "3",
//   "__next": "http://example.com/odata/Customers?$skiptoken=1"
// }}
pub fn feed_document(feed: &ProjectedFeed, service_base_url: &str) -> Json {
    json!({ "d": feed_object(feed, service_base_url) })
}

pub fn entry_document(entry: &ProjectedEntity, service_base_url: &str) -> Json {
    json!({ "d": entry_object(entry, service_base_url) })
}

pub fn property_document(name: &str, value: &Value) -> Json {
    let mut obj = Map::new();
    obj.insert(name.to_string(), encode_value(value));
    json!({ "d": obj })
}

fn feed_object(feed: &ProjectedFeed, base: &str) -> Json {
    let mut obj = Map::new();
    obj.insert(
        "results".to_string(),
        Json::Array(feed.entries.iter().map(|e| entry_object(e, base)).collect()),
    );
    if let Some(count) = feed.count {
        obj.insert("__count".to_string(), Json::String(count.to_string()));
    }
    if let Some(next) = &feed.next_link {
        obj.insert("__next".to_string(), Json::String(next.clone()));
    }
    Json::Object(obj)
}

fn entry_object(entry: &ProjectedEntity, base: &str) -> Json {
    let href = entry.href();
    let mut obj = Map::new();
    obj.insert(
        "__metadata".to_string(),
        json!({ "uri": format!("{base}{href}"), "type": entry.type_name }),
    );

    for prop in &entry.properties {
        obj.insert(prop.name.clone(), encode_value(&prop.value));
    }

    for nav in &entry.navigations {
        let value = match &nav.content {
            NavigationContent::Deferred => {
                json!({ "__deferred": { "uri": format!("{base}{href}/{}", nav.name) } })
            }
            NavigationContent::Entry(None) => Json::Null,
            NavigationContent::Entry(Some(target)) => entry_object(target, base),
            NavigationContent::Feed(feed) => feed_object(feed, base),
        };
        obj.insert(nav.name.clone(), value);
    }

    Json::Object(obj)
}

/// Int64 travels as a string and DateTime as `/Date(ms)/` in verbose JSON.
pub fn encode_value(value: &Value) -> Json {
    match value {
        Value::Null => Json::Null,
        Value::Boolean(v) => Json::Bool(*v),
        Value::Byte(v) => json!(v),
        Value::Int16(v) => json!(v),
        Value::Int32(v) => json!(v),
        Value::Int64(v) => Json::String(v.to_string()),
        Value::Single(v) => json!(v),
        Value::Double(v) => json!(v),
        Value::String(v) => Json::String(v.clone()),
        Value::Guid(v) => Json::String(v.to_string()),
        Value::DateTime(v) => Json::String(format!("/Date({})/", v.timestamp_millis())),
        Value::Complex(c) => {
            let mut obj = Map::new();
            obj.insert("__metadata".to_string(), json!({ "type": c.type_name }));
            for (name, member) in &c.properties {
                obj.insert(name.clone(), encode_value(member));
            }
            Json::Object(obj)
        }
        Value::Collection(items) => {
            let item_type = items
                .iter()
                .find_map(Value::edm_type)
                .map(|t| EdmType::Collection(Box::new(t)).edm_name());
            let mut obj = Map::new();
            if let Some(t) = item_type {
                obj.insert("__metadata".to_string(), json!({ "type": t }));
            }
            obj.insert(
                "results".to_string(),
                Json::Array(items.iter().map(encode_value).collect()),
            );
            Json::Object(obj)
        }
    }
}

///////////////////////////////////////////////////////////////////////////////
