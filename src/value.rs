use std::cmp::Ordering;

use chrono::{DateTime, NaiveDateTime, Utc};
use uuid::Uuid;

use crate::error::{MalformedQuery, ODataError, UnsupportedOrdering};

///////////////////////////////////////////////////////////////////////////////

/// See: https://www.odata.org/documentation/odata-version-3-0/common-schema-definition-language-csdl/
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdmType {
    Boolean,
    Byte,
    Int16,
    Int32,
    Int64,
    Single,
    Double,
    String,
    Guid,
    DateTime,
    /// Fully qualified complex type name
    Complex(String),
    Collection(Box<EdmType>),
}

impl EdmType {
    pub fn is_orderable(&self) -> bool {
        !matches!(self, Self::Complex(_) | Self::Collection(_))
    }

    pub fn edm_name(&self) -> String {
        match self {
            Self::Boolean => "Edm.Boolean".to_string(),
            Self::Byte => "Edm.Byte".to_string(),
            Self::Int16 => "Edm.Int16".to_string(),
            Self::Int32 => "Edm.Int32".to_string(),
            Self::Int64 => "Edm.Int64".to_string(),
            Self::Single => "Edm.Single".to_string(),
            Self::Double => "Edm.Double".to_string(),
            Self::String => "Edm.String".to_string(),
            Self::Guid => "Edm.Guid".to_string(),
            Self::DateTime => "Edm.DateTime".to_string(),
            Self::Complex(name) => name.clone(),
            Self::Collection(inner) => format!("Collection({})", inner.edm_name()),
        }
    }
}

///////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone, PartialEq)]
pub struct ComplexValue {
    pub type_name: String,
    pub properties: Vec<(String, Value)>,
}

impl ComplexValue {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            properties: Vec::new(),
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.push((name.into(), value.into()));
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.properties
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }
}

///////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Byte(u8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Single(f32),
    Double(f64),
    String(String),
    Guid(Uuid),
    DateTime(DateTime<Utc>),
    Complex(ComplexValue),
    Collection(Vec<Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Runtime type of a non-null value, used for `m:type` annotations of
    /// dynamic properties that have no declared type.
    pub fn edm_type(&self) -> Option<EdmType> {
        match self {
            Self::Null => None,
            Self::Boolean(_) => Some(EdmType::Boolean),
            Self::Byte(_) => Some(EdmType::Byte),
            Self::Int16(_) => Some(EdmType::Int16),
            Self::Int32(_) => Some(EdmType::Int32),
            Self::Int64(_) => Some(EdmType::Int64),
            Self::Single(_) => Some(EdmType::Single),
            Self::Double(_) => Some(EdmType::Double),
            Self::String(_) => Some(EdmType::String),
            Self::Guid(_) => Some(EdmType::Guid),
            Self::DateTime(_) => Some(EdmType::DateTime),
            Self::Complex(c) => Some(EdmType::Complex(c.type_name.clone())),
            Self::Collection(items) => Some(EdmType::Collection(Box::new(
                items
                    .iter()
                    .find_map(Value::edm_type)
                    .unwrap_or(EdmType::String),
            ))),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Byte(v) => Some(i64::from(*v)),
            Self::Int16(v) => Some(i64::from(*v)),
            Self::Int32(v) => Some(i64::from(*v)),
            Self::Int64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Single(v) => Some(f64::from(*v)),
            Self::Double(v) => Some(*v),
            other => other.as_i64().map(|v| v as f64),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Text form used inside payloads (not a URI literal).
    pub fn to_text(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Boolean(v) => v.to_string(),
            Self::Byte(v) => v.to_string(),
            Self::Int16(v) => v.to_string(),
            Self::Int32(v) => v.to_string(),
            Self::Int64(v) => v.to_string(),
            Self::Single(v) => format_single(*v),
            Self::Double(v) => format_float(*v),
            Self::String(v) => v.clone(),
            Self::Guid(v) => v.to_string(),
            Self::DateTime(v) => format_date_time(v),
            Self::Complex(_) | Self::Collection(_) => String::new(),
        }
    }

    /// Renders the value in URI literal syntax so that it can be embedded
    /// into `$skiptoken` and re-parsed with [`Value::parse_literal`].
    pub fn to_literal(&self) -> Result<String, ODataError> {
        let lit = match self {
            Self::Null => "null".to_string(),
            Self::Boolean(v) => v.to_string(),
            Self::Byte(v) => v.to_string(),
            Self::Int16(v) => v.to_string(),
            Self::Int32(v) => v.to_string(),
            Self::Int64(v) => format!("{v}L"),
            Self::Single(v) => format!("{}f", format_single(*v)),
            Self::Double(v) => format!("{}D", format_float(*v)),
            Self::String(v) => format!("'{}'", v.replace('\'', "''")),
            Self::Guid(v) => format!("guid'{v}'"),
            Self::DateTime(v) => format!("datetime'{}'", format_date_time(v)),
            Self::Complex(c) => {
                return Err(UnsupportedOrdering::new("<complex>", c.type_name.clone()).into())
            }
            Self::Collection(_) => {
                return Err(UnsupportedOrdering::new("<collection>", "Collection").into())
            }
        };
        Ok(lit)
    }

    pub fn parse_literal(text: &str, typ: &EdmType) -> Result<Value, ODataError> {
        let text = text.trim();
        if text == "null" {
            return Ok(Value::Null);
        }

        let bad = || -> ODataError {
            MalformedQuery::new(format!(
                "Literal {text} is not a valid {}",
                typ.edm_name()
            ))
            .into()
        };

        match typ {
            EdmType::Boolean => match text {
                "true" => Ok(Value::Boolean(true)),
                "false" => Ok(Value::Boolean(false)),
                _ => Err(bad()),
            },
            EdmType::Byte => text.parse().map(Value::Byte).map_err(|_| bad()),
            EdmType::Int16 => text.parse().map(Value::Int16).map_err(|_| bad()),
            EdmType::Int32 => text.parse().map(Value::Int32).map_err(|_| bad()),
            EdmType::Int64 => strip_suffix_ci(text, 'l')
                .parse()
                .map(Value::Int64)
                .map_err(|_| bad()),
            EdmType::Single => parse_float(strip_suffix_ci(text, 'f'))
                .map(|v| Value::Single(v as f32))
                .ok_or_else(bad),
            EdmType::Double => parse_float(strip_suffix_ci(text, 'd'))
                .map(Value::Double)
                .ok_or_else(bad),
            EdmType::String => {
                let inner = text
                    .strip_prefix('\'')
                    .and_then(|t| t.strip_suffix('\''))
                    .ok_or_else(bad)?;
                if inner.replace("''", "").contains('\'') {
                    return Err(bad());
                }
                Ok(Value::String(inner.replace("''", "'")))
            }
            EdmType::Guid => {
                let inner = quoted_with_prefix(text, "guid").ok_or_else(bad)?;
                Uuid::parse_str(inner).map(Value::Guid).map_err(|_| bad())
            }
            EdmType::DateTime => {
                let inner = quoted_with_prefix(text, "datetime").ok_or_else(bad)?;
                parse_date_time(inner).map(Value::DateTime).ok_or_else(bad)
            }
            EdmType::Complex(_) | EdmType::Collection(_) => {
                Err(UnsupportedOrdering::new(text, typ.edm_name()).into())
            }
        }
    }

    /// Total order used for sorting and skiptoken resumption.
    ///
    /// `null` sorts before every other value; numbers compare by value across
    /// widths.
    pub fn compare(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Self::Null, Self::Null) => Ordering::Equal,
            (Self::Null, _) => Ordering::Less,
            (_, Self::Null) => Ordering::Greater,
            (Self::Boolean(a), Self::Boolean(b)) => a.cmp(b),
            (Self::String(a), Self::String(b)) => a.cmp(b),
            (Self::Guid(a), Self::Guid(b)) => a.cmp(b),
            (Self::DateTime(a), Self::DateTime(b)) => a.cmp(b),
            (a, b) => match (a.as_i64(), b.as_i64()) {
                (Some(x), Some(y)) => x.cmp(&y),
                _ => match (a.as_f64(), b.as_f64()) {
                    (Some(x), Some(y)) => x.total_cmp(&y),
                    _ => a.kind_rank().cmp(&b.kind_rank()),
                },
            },
        }
    }

    fn kind_rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Boolean(_) => 1,
            Self::Byte(_)
            | Self::Int16(_)
            | Self::Int32(_)
            | Self::Int64(_)
            | Self::Single(_)
            | Self::Double(_) => 2,
            Self::String(_) => 3,
            Self::Guid(_) => 4,
            Self::DateTime(_) => 5,
            Self::Complex(_) => 6,
            Self::Collection(_) => 7,
        }
    }
}

fn format_float(v: f64) -> String {
    if v.is_nan() {
        "NaN".to_string()
    } else if v.is_infinite() {
        if v > 0.0 { "INF" } else { "-INF" }.to_string()
    } else {
        v.to_string()
    }
}

fn format_single(v: f32) -> String {
    if v.is_finite() {
        v.to_string()
    } else {
        format_float(f64::from(v))
    }
}

pub(crate) fn format_date_time(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string()
}

fn parse_float(text: &str) -> Option<f64> {
    match text {
        "NaN" => Some(f64::NAN),
        "INF" => Some(f64::INFINITY),
        "-INF" => Some(f64::NEG_INFINITY),
        _ => text.parse().ok().filter(|v: &f64| v.is_finite()),
    }
}

fn strip_suffix_ci(text: &str, suffix: char) -> &str {
    text.strip_suffix(suffix)
        .or_else(|| text.strip_suffix(suffix.to_ascii_uppercase()))
        .unwrap_or(text)
}

fn quoted_with_prefix<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let head = text.get(..prefix.len())?;
    if !head.eq_ignore_ascii_case(prefix) {
        return None;
    }
    text[prefix.len()..]
        .strip_prefix('\'')
        .and_then(|t| t.strip_suffix('\''))
}

pub(crate) fn parse_date_time(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .map(|naive| naive.and_utc())
}

///////////////////////////////////////////////////////////////////////////////

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<u8> for Value {
    fn from(v: u8) -> Self {
        Self::Byte(v)
    }
}

impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Self::Int16(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int64(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::Single(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Self::Guid(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Self::DateTime(v)
    }
}

impl From<ComplexValue> for Value {
    fn from(v: ComplexValue) -> Self {
        Self::Complex(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

///////////////////////////////////////////////////////////////////////////////
