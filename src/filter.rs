use std::sync::Arc;

use chrono::{Datelike, Timelike};
use odata_params::filters as odata_filters;

use crate::{
    entity::PropertyAccess,
    error::*,
    model::{EntityType, Model},
    value::{parse_date_time, EdmType, Value},
};

///////////////////////////////////////////////////////////////////////////////

/// Parsed `$filter` expression, keeping the raw text so that continuation
/// links can carry it forward verbatim.
#[derive(Debug, Clone)]
pub struct ODataFilter {
    raw: String,
    expr: Arc<odata_filters::Expr>,
}

impl PartialEq for ODataFilter {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl std::fmt::Display for ODataFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

///////////////////////////////////////////////////////////////////////////////

impl ODataFilter {
    /// Parses a filter, rejecting expressions nested deeper than `max_depth`
    /// before the recursive parser gets to see them.
    pub fn parse(s: &str, max_depth: usize) -> Result<Self, ODataError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(MalformedQuery::new("$filter must not be empty").into());
        }

        if paren_depth(s) > max_depth {
            return Err(RecursionLimitExceeded::new("$filter", max_depth).into());
        }

        let expr = odata_filters::parse_str(s)?;

        if expr_depth(&expr) > max_depth {
            return Err(RecursionLimitExceeded::new("$filter", max_depth).into());
        }

        Ok(Self {
            raw: s.to_string(),
            expr: Arc::new(expr),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Checks that every identifier names a property of `entity_type`.
    /// Open types accept any leading segment.
    pub fn validate(&self, model: &Model, entity_type: &EntityType) -> Result<(), ODataError> {
        let mut identifiers = Vec::new();
        collect_identifiers(&self.expr, &mut identifiers);

        for ident in identifiers {
            let mut segments = ident.split('/');
            let head = segments.next().unwrap_or_default();

            if entity_type.navigation(head).is_some() {
                return Err(UnsupportedFeature::new(format!(
                    "Navigation property {head} within the filter is not supported"
                ))
                .into());
            }

            let Some(prop) = entity_type.property(head) else {
                if entity_type.open {
                    continue;
                }
                return Err(MalformedQuery::new(format!(
                    "No property {head} on type {}",
                    entity_type.name
                ))
                .into());
            };

            let mut typ = &prop.typ;
            for seg in segments {
                let EdmType::Complex(name) = typ else {
                    return Err(MalformedQuery::new(format!(
                        "Property path {ident} traverses a primitive value"
                    ))
                    .into());
                };
                let next = model
                    .complex_type(name)
                    .and_then(|c| c.properties.iter().find(|p| p.name == seg));
                match next {
                    Some(p) => typ = &p.typ,
                    None => {
                        return Err(
                            MalformedQuery::new(format!("No property {seg} on {name}")).into()
                        )
                    }
                }
            }
        }

        Ok(())
    }

    pub fn matches(&self, entity: &dyn PropertyAccess) -> Result<bool, ODataError> {
        Ok(matches!(eval(&self.expr, entity)?, Value::Boolean(true)))
    }
}

///////////////////////////////////////////////////////////////////////////////

/// Deepest parenthesis nesting outside of string literals.
fn paren_depth(s: &str) -> usize {
    let mut depth = 0usize;
    let mut max = 0usize;
    let mut in_str = false;
    for c in s.chars() {
        match c {
            '\'' => in_str = !in_str,
            '(' if !in_str => {
                depth += 1;
                max = max.max(depth);
            }
            ')' if !in_str => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    max
}

fn expr_depth(e: &odata_filters::Expr) -> usize {
    use odata_filters::Expr;
    match e {
        Expr::Value(_) | Expr::Identifier(_) => 1,
        Expr::Not(x) => 1 + expr_depth(x),
        Expr::And(a, b) | Expr::Or(a, b) | Expr::Compare(a, _, b) => {
            1 + expr_depth(a).max(expr_depth(b))
        }
        Expr::In(a, list) => 1 + list.iter().map(expr_depth).fold(expr_depth(a), usize::max),
        Expr::Function(_, args) => 1 + args.iter().map(expr_depth).max().unwrap_or(0),
    }
}

fn collect_identifiers<'a>(e: &'a odata_filters::Expr, out: &mut Vec<&'a str>) {
    use odata_filters::Expr;
    match e {
        Expr::Identifier(s) => out.push(s),
        Expr::Value(_) => {}
        Expr::Not(x) => collect_identifiers(x, out),
        Expr::And(a, b) | Expr::Or(a, b) | Expr::Compare(a, _, b) => {
            collect_identifiers(a, out);
            collect_identifiers(b, out);
        }
        Expr::In(a, list) => {
            collect_identifiers(a, out);
            list.iter().for_each(|x| collect_identifiers(x, out));
        }
        Expr::Function(_, args) => args.iter().for_each(|x| collect_identifiers(x, out)),
    }
}

///////////////////////////////////////////////////////////////////////////////

fn eval(e: &odata_filters::Expr, entity: &dyn PropertyAccess) -> Result<Value, ODataError> {
    use odata_filters::Expr;
    match e {
        Expr::Or(l, r) => Ok(Value::Boolean(
            is_true(&eval(l, entity)?) || is_true(&eval(r, entity)?),
        )),
        Expr::And(l, r) => Ok(Value::Boolean(
            is_true(&eval(l, entity)?) && is_true(&eval(r, entity)?),
        )),
        Expr::Not(x) => match eval(x, entity)? {
            Value::Null => Ok(Value::Null),
            v => Ok(Value::Boolean(!is_true(&v))),
        },
        Expr::Compare(l, op, r) => {
            let l = eval(l, entity)?;
            let r = eval(r, entity)?;
            Ok(Value::Boolean(compare(&l, op, &r)))
        }
        Expr::In(i, list) => {
            let v = eval(i, entity)?;
            for item in list {
                let item = eval(item, entity)?;
                if compare(&v, &odata_filters::CompareOperator::Equal, &item) {
                    return Ok(Value::Boolean(true));
                }
            }
            Ok(Value::Boolean(false))
        }
        Expr::Identifier(s) => Ok(resolve_path(entity, s)),
        Expr::Value(v) => odata_value_to_value(v),
        Expr::Function(name, args) => {
            let args = args
                .iter()
                .map(|a| eval(a, entity))
                .collect::<Result<Vec<_>, _>>()?;
            call_function(name, args)
        }
    }
}

fn is_true(v: &Value) -> bool {
    matches!(v, Value::Boolean(true))
}

fn resolve_path(entity: &dyn PropertyAccess, path: &str) -> Value {
    let mut segments = path.split('/');
    let Some(mut current) = segments.next().and_then(|head| entity.value(head)) else {
        return Value::Null;
    };
    for seg in segments {
        match current {
            Value::Complex(c) => match c.get(seg) {
                Some(v) => current = v,
                None => return Value::Null,
            },
            _ => return Value::Null,
        }
    }
    current.clone()
}

fn compare(l: &Value, op: &odata_filters::CompareOperator, r: &Value) -> bool {
    use odata_filters::CompareOperator;
    use std::cmp::Ordering;

    if l.is_null() || r.is_null() {
        let both = l.is_null() && r.is_null();
        return match op {
            CompareOperator::Equal => both,
            CompareOperator::NotEqual => !both,
            _ => false,
        };
    }

    let comparable = matches!(
        (l.edm_type(), r.edm_type()),
        (Some(a), Some(b)) if a == b || (l.as_f64().is_some() && r.as_f64().is_some())
    );
    if !comparable {
        return matches!(op, CompareOperator::NotEqual);
    }

    let ord = l.compare(r);
    match op {
        CompareOperator::Equal => ord == Ordering::Equal,
        CompareOperator::NotEqual => ord != Ordering::Equal,
        CompareOperator::LessThan => ord == Ordering::Less,
        CompareOperator::GreaterThan => ord == Ordering::Greater,
        CompareOperator::LessOrEqual => ord != Ordering::Greater,
        CompareOperator::GreaterOrEqual => ord != Ordering::Less,
    }
}

fn odata_value_to_value(v: &odata_filters::Value) -> Result<Value, ODataError> {
    match v {
        odata_filters::Value::String(s) => Ok(Value::String(s.clone())),
        odata_filters::Value::Bool(b) => Ok(Value::Boolean(*b)),
        odata_filters::Value::Null => Ok(Value::Null),
        odata_filters::Value::Number(d) => {
            let d = d.to_string();
            if let Ok(i) = d.parse::<i64>() {
                Ok(Value::Int64(i))
            } else {
                d.parse::<f64>()
                    .map(Value::Double)
                    .map_err(|_| MalformedQuery::new("Filter contains invalid number").into())
            }
        }
        odata_filters::Value::DateTime(d) => Ok(Value::DateTime(*d)),
        odata_filters::Value::Date(d) => {
            let d = parse_date_time(&format!("{d}T00:00:00"))
                .ok_or(MalformedQuery::new("Filter contains invalid date"))?;
            Ok(Value::DateTime(d))
        }
        odata_filters::Value::Uuid(u) => uuid::Uuid::parse_str(&u.to_string())
            .map(Value::Guid)
            .map_err(|_| MalformedQuery::new("Filter contains invalid guid").into()),
        odata_filters::Value::Time(_) => {
            Err(UnsupportedFeature::new("Time value in filter is not supported").into())
        }
    }
}

///////////////////////////////////////////////////////////////////////////////

fn call_function(name: &str, args: Vec<Value>) -> Result<Value, ODataError> {
    let arity = |n: usize| -> Result<(), ODataError> {
        if args.len() == n {
            Ok(())
        } else {
            Err(MalformedQuery::new(format!(
                "Function {name} expects {n} argument(s), got {}",
                args.len()
            ))
            .into())
        }
    };

    // Null in, null out
    if args.iter().any(Value::is_null) && name != "concat" {
        return Ok(Value::Null);
    }

    match name {
        "length" => {
            arity(1)?;
            Ok(Value::Int32(str_arg(name, &args[0])?.chars().count() as i32))
        }
        "tolower" => {
            arity(1)?;
            Ok(Value::String(str_arg(name, &args[0])?.to_lowercase()))
        }
        "toupper" => {
            arity(1)?;
            Ok(Value::String(str_arg(name, &args[0])?.to_uppercase()))
        }
        "trim" => {
            arity(1)?;
            Ok(Value::String(str_arg(name, &args[0])?.trim().to_string()))
        }
        "concat" => {
            arity(2)?;
            Ok(Value::String(format!(
                "{}{}",
                args[0].to_text(),
                args[1].to_text()
            )))
        }
        "substring" => {
            if args.len() == 2 {
                arity(2)?;
            } else {
                arity(3)?;
            }
            let s: Vec<char> = str_arg(name, &args[0])?.chars().collect();
            let start = (int_arg(name, &args[1])?.max(0) as usize).min(s.len());
            let end = match args.get(2) {
                Some(len) => (start + int_arg(name, len)?.max(0) as usize).min(s.len()),
                None => s.len(),
            };
            Ok(Value::String(s[start..end].iter().collect()))
        }
        "substringof" => {
            arity(2)?;
            let needle = str_arg(name, &args[0])?;
            let haystack = str_arg(name, &args[1])?;
            Ok(Value::Boolean(haystack.contains(needle)))
        }
        "contains" => {
            arity(2)?;
            Ok(Value::Boolean(
                str_arg(name, &args[0])?.contains(str_arg(name, &args[1])?),
            ))
        }
        "startswith" => {
            arity(2)?;
            Ok(Value::Boolean(
                str_arg(name, &args[0])?.starts_with(str_arg(name, &args[1])?),
            ))
        }
        "endswith" => {
            arity(2)?;
            Ok(Value::Boolean(
                str_arg(name, &args[0])?.ends_with(str_arg(name, &args[1])?),
            ))
        }
        "indexof" => {
            arity(2)?;
            let s = str_arg(name, &args[0])?;
            let idx = s
                .find(str_arg(name, &args[1])?)
                .map(|byte_idx| s[..byte_idx].chars().count() as i32)
                .unwrap_or(-1);
            Ok(Value::Int32(idx))
        }
        "year" | "month" | "day" | "hour" | "minute" | "second" => {
            arity(1)?;
            let Value::DateTime(dt) = &args[0] else {
                return Err(type_mismatch(name, "Edm.DateTime"));
            };
            let part = match name {
                "year" => dt.year(),
                "month" => dt.month() as i32,
                "day" => dt.day() as i32,
                "hour" => dt.hour() as i32,
                "minute" => dt.minute() as i32,
                _ => dt.second() as i32,
            };
            Ok(Value::Int32(part))
        }
        "round" | "floor" | "ceiling" => {
            arity(1)?;
            let v = args[0]
                .as_f64()
                .ok_or_else(|| type_mismatch(name, "numeric"))?;
            let r = match name {
                "round" => v.round(),
                "floor" => v.floor(),
                _ => v.ceil(),
            };
            Ok(Value::Double(r))
        }
        _ => Err(UnsupportedFeature::new(format!(
            "Function {name} within the filter is not supported"
        ))
        .into()),
    }
}

fn str_arg<'a>(name: &str, v: &'a Value) -> Result<&'a str, ODataError> {
    v.as_str().ok_or_else(|| type_mismatch(name, "Edm.String"))
}

fn int_arg(name: &str, v: &Value) -> Result<i64, ODataError> {
    v.as_i64().ok_or_else(|| type_mismatch(name, "Edm.Int32"))
}

fn type_mismatch(name: &str, expected: &str) -> ODataError {
    MalformedQuery::new(format!("Function {name} expects an argument of type {expected}")).into()
}

///////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Entity;

    fn customer() -> Entity {
        Entity::new("Customer")
            .with("ID", 1)
            .with("Name", "Alfreds")
            .with("Active", true)
            .with("Region", Value::Null)
    }

    fn check(filter: &str) -> bool {
        ODataFilter::parse(filter, 100)
            .unwrap()
            .matches(&customer())
            .unwrap()
    }

    #[test]
    fn test_comparisons() {
        assert!(check("ID eq 1"));
        assert!(check("ID lt 2 and Name eq 'Alfreds'"));
        assert!(!check("ID gt 1"));
        assert!(check("Active eq true"));
        assert!(check("Region eq null"));
        assert!(!check("Region gt 'A'"));
    }

    #[test]
    fn test_functions() {
        assert!(check("length(Name) eq 7"));
        assert!(check("startswith(Name, 'Alf') eq true"));
        assert!(check("tolower(Name) eq 'alfreds'"));
        assert!(check("indexof(Name, 'red') eq 3"));
        assert!(!check("length(Region) eq 0"));
    }

    #[test]
    fn test_recursion_limit() {
        let mut filter = String::from("Name");
        for _ in 0..200 {
            filter = format!("length({filter})");
        }
        let filter = format!("{filter} eq 1");

        let err = ODataFilter::parse(&filter, 100).unwrap_err();
        assert!(matches!(err, ODataError::RecursionLimitExceeded(_)));
        assert!(err.to_string().contains("Recursion"));
    }

    #[test]
    fn test_unknown_function() {
        let f = ODataFilter::parse("frobnicate(Name) eq 1", 100).unwrap();
        assert!(matches!(
            f.matches(&customer()),
            Err(ODataError::UnsupportedFeature(_))
        ));
    }
}
