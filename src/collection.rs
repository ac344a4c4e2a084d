use std::sync::OnceLock;

use regex::Regex;

use crate::{
    entity::PropertyAccess,
    error::{MalformedQuery, ODataError, ResourceNotFound},
    model::{EntityType, PropertyDef},
    query::cached_regex,
    value::Value,
};

///////////////////////////////////////////////////////////////////////////////

/// Key predicate as written in the URI, literals not yet typed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyPredicate {
    /// `(1)`, `('ALFKI')`
    Single(String),
    /// `(A=1,B='x')`
    Named(Vec<(String, String)>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSegment {
    pub name: String,
    pub key: Option<KeyPredicate>,
}

/// Decoded resource path, e.g. `Customers(1)/Orders`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourcePath {
    pub segments: Vec<PathSegment>,
}

impl ResourcePath {
    pub fn decode(path: &str) -> Result<Self, ODataError> {
        let path = path.trim_matches('/');
        if path.is_empty() {
            return Err(MalformedQuery::new("Empty resource path").into());
        }

        static SEGMENT: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
        let segment_re = cached_regex(&SEGMENT, r"^([A-Za-z_][A-Za-z0-9_.]*)(?:\((.*)\))?$")?;

        let mut segments = Vec::new();
        for raw in split_segments(path)? {
            let caps = segment_re
                .captures(raw)
                .ok_or_else(|| ResourceNotFound::new(raw))?;
            let name = caps[1].to_string();
            let key = match caps.get(2) {
                None => None,
                Some(m) => Some(decode_key(m.as_str())?),
            };
            segments.push(PathSegment { name, key });
        }

        Ok(Self { segments })
    }
}

impl std::fmt::Display for ResourcePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self
            .segments
            .iter()
            .map(|s| match &s.key {
                None => s.name.clone(),
                Some(KeyPredicate::Single(lit)) => format!("{}({lit})", s.name),
                Some(KeyPredicate::Named(pairs)) => {
                    let kv: Vec<String> = pairs.iter().map(|(k, v)| format!("{k}={v}")).collect();
                    format!("{}({})", s.name, kv.join(","))
                }
            })
            .collect();
        write!(f, "{}", parts.join("/"))
    }
}

/// Splits on `/` outside quoted literals.
fn split_segments(path: &str) -> Result<Vec<&str>, ODataError> {
    let mut parts = Vec::new();
    let mut in_str = false;
    let mut start = 0;
    for (i, c) in path.char_indices() {
        match c {
            '\'' => in_str = !in_str,
            '/' if !in_str => {
                parts.push(&path[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&path[start..]);

    if parts.iter().any(|p| p.is_empty()) {
        return Err(MalformedQuery::new(format!("Empty segment in resource path {path}")).into());
    }
    Ok(parts)
}

fn decode_key(inner: &str) -> Result<KeyPredicate, ODataError> {
    let parts = crate::query::split_top_level(inner, ',')?;
    static NAMED: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    let named_re = cached_regex(&NAMED, r"^\s*([A-Za-z_][A-Za-z0-9_]*)\s*=\s*(.+?)\s*$")?;

    if parts.len() == 1 && !named_re.is_match(parts[0]) {
        let lit = inner.trim();
        if lit.is_empty() {
            return Err(MalformedQuery::new("Empty key predicate").into());
        }
        return Ok(KeyPredicate::Single(lit.to_string()));
    }

    let mut pairs = Vec::with_capacity(parts.len());
    for part in parts {
        let caps = named_re
            .captures(part)
            .ok_or_else(|| MalformedQuery::new(format!("Invalid key predicate ({inner})")))?;
        pairs.push((caps[1].to_string(), caps[2].to_string()));
    }
    Ok(KeyPredicate::Named(pairs))
}

///////////////////////////////////////////////////////////////////////////////

impl KeyPredicate {
    /// Types the literals against the key of `typ`, in declared key order.
    pub fn resolve(&self, typ: &EntityType) -> Result<Vec<(String, Value)>, ODataError> {
        let key: Vec<&PropertyDef> = typ.key_properties().collect();

        match self {
            KeyPredicate::Single(lit) => {
                let [prop] = key.as_slice() else {
                    return Err(MalformedQuery::new(format!(
                        "{} has a composite key, use named key values",
                        typ.name
                    ))
                    .into());
                };
                Ok(vec![(prop.name.clone(), Value::parse_literal(lit, &prop.typ)?)])
            }
            KeyPredicate::Named(pairs) => {
                if pairs.len() != key.len() {
                    return Err(MalformedQuery::new(format!(
                        "Key predicate for {} needs {} values",
                        typ.name,
                        key.len()
                    ))
                    .into());
                }
                let mut values = Vec::with_capacity(key.len());
                for prop in key {
                    let (_, lit) = pairs.iter().find(|(k, _)| *k == prop.name).ok_or_else(|| {
                        MalformedQuery::new(format!("Key predicate misses {}", prop.name))
                    })?;
                    values.push((prop.name.clone(), Value::parse_literal(lit, &prop.typ)?));
                }
                Ok(values)
            }
        }
    }
}

/// Canonical key predicate of an instance: `(1)` for single keys,
/// `(A=1,B='x')` for composite ones.
pub fn key_predicate(typ: &EntityType, entity: &dyn PropertyAccess) -> Result<String, ODataError> {
    let mut parts = Vec::with_capacity(typ.key.len());
    for name in &typ.key {
        let value = entity.value(name).unwrap_or(&Value::Null);
        parts.push((name, value.to_literal()?));
    }

    if let [(_, lit)] = parts.as_slice() {
        return Ok(format!("({lit})"));
    }
    let kv: Vec<String> = parts.iter().map(|(k, v)| format!("{k}={v}")).collect();
    Ok(format!("({})", kv.join(",")))
}

pub fn matches_key(entity: &dyn PropertyAccess, key: &[(String, Value)]) -> bool {
    key.iter().all(|(name, value)| {
        entity
            .value(name)
            .is_some_and(|v| v.compare(value) == std::cmp::Ordering::Equal)
    })
}

///////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{entity::Entity, value::EdmType};

    #[test]
    fn test_decode_paths() {
        let path = ResourcePath::decode("Customers").unwrap();
        assert_eq!(path.segments.len(), 1);
        assert_eq!(path.segments[0].key, None);

        let path = ResourcePath::decode("Customers('AL/FKI')/Orders").unwrap();
        assert_eq!(
            path.segments[0].key,
            Some(KeyPredicate::Single("'AL/FKI'".to_string()))
        );
        assert_eq!(path.segments[1].name, "Orders");

        let path = ResourcePath::decode("Lines(OrderID=1,Line='a,b')").unwrap();
        assert_eq!(
            path.segments[0].key,
            Some(KeyPredicate::Named(vec![
                ("OrderID".to_string(), "1".to_string()),
                ("Line".to_string(), "'a,b'".to_string()),
            ]))
        );
        assert_eq!(path.to_string(), "Lines(OrderID=1,Line='a,b')");

        assert!(ResourcePath::decode("Customers//Orders").is_err());
    }

    #[test]
    fn test_key_predicate_format() {
        let single = EntityType::new("Customer")
            .with_key(&["ID"])
            .with_property("ID", EdmType::Int32, false);
        let composite = EntityType::new("Line")
            .with_key(&["OrderID", "Line"])
            .with_property("OrderID", EdmType::Int32, false)
            .with_property("Line", EdmType::String, false);

        let e = Entity::new("Customer").with("ID", 7);
        assert_eq!(key_predicate(&single, &e).unwrap(), "(7)");

        let e = Entity::new("Line").with("OrderID", 1).with("Line", "O'x");
        assert_eq!(
            key_predicate(&composite, &e).unwrap(),
            "(OrderID=1,Line='O''x')"
        );

        let key = KeyPredicate::Named(vec![
            ("Line".to_string(), "'O''x'".to_string()),
            ("OrderID".to_string(), "1".to_string()),
        ])
        .resolve(&composite)
        .unwrap();
        assert!(matches_key(&e, &key));
    }
}
