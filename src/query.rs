use std::{collections::BTreeSet, sync::OnceLock};

use regex::Regex;

use crate::{
    config::{PayloadFormat, ServiceConfig, DEFAULT_MAX_EXPAND_DEPTH, DEFAULT_MAX_FILTER_DEPTH},
    error::{MalformedQuery, ODataError, RecursionLimitExceeded},
    filter::ODataFilter,
};

///////////////////////////////////////////////////////////////////////////////

pub const OPT_FILTER: &str = "$filter";
pub const OPT_ORDERBY: &str = "$orderby";
pub const OPT_TOP: &str = "$top";
pub const OPT_SKIP: &str = "$skip";
pub const OPT_EXPAND: &str = "$expand";
pub const OPT_SELECT: &str = "$select";
pub const OPT_COUNT: &str = "$count";
pub const OPT_SKIPTOKEN: &str = "$skiptoken";
pub const OPT_FORMAT: &str = "$format";

///////////////////////////////////////////////////////////////////////////////

/// Bounds applied while parsing query options.
#[derive(Debug, Clone)]
pub struct ParseLimits {
    pub max_filter_depth: usize,
    pub max_expand_depth: usize,
    pub max_top: Option<u64>,
}

impl Default for ParseLimits {
    fn default() -> Self {
        Self {
            max_filter_depth: DEFAULT_MAX_FILTER_DEPTH,
            max_expand_depth: DEFAULT_MAX_EXPAND_DEPTH,
            max_top: None,
        }
    }
}

impl From<&ServiceConfig> for ParseLimits {
    fn from(cfg: &ServiceConfig) -> Self {
        Self {
            max_filter_depth: cfg.max_filter_depth,
            max_expand_depth: cfg.max_expand_depth,
            max_top: cfg.max_top,
        }
    }
}

///////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone, PartialEq)]
pub struct OrderByItem {
    /// Property path segments
    pub path: Vec<String>,
    pub descending: bool,
}

impl OrderByItem {
    pub fn asc(path: impl Into<String>) -> Self {
        Self {
            path: vec![path.into()],
            descending: false,
        }
    }

    pub fn desc(path: impl Into<String>) -> Self {
        Self {
            path: vec![path.into()],
            descending: true,
        }
    }

    pub fn path_str(&self) -> String {
        self.path.join("/")
    }
}

impl std::fmt::Display for OrderByItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.descending {
            write!(f, "{} desc", self.path_str())
        } else {
            write!(f, "{}", self.path_str())
        }
    }
}

/// One `$select` or `$expand` item: a `/` separated path, optionally ending in
/// `*`, optionally followed by nested options in parentheses.
#[derive(Debug, Clone, PartialEq)]
pub struct PathItem {
    pub segments: Vec<String>,
    pub star: bool,
    pub nested: Option<Box<QueryOptions>>,
}

impl PathItem {
    pub fn new(path: &str) -> Self {
        let mut segments: Vec<String> = path.split('/').map(str::to_string).collect();
        let star = segments.last().is_some_and(|s| s == "*");
        if star {
            segments.pop();
        }
        Self {
            segments,
            star,
            nested: None,
        }
    }

    pub fn with_nested(mut self, nested: QueryOptions) -> Self {
        self.nested = Some(Box::new(nested));
        self
    }
}

impl std::fmt::Display for PathItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut parts: Vec<&str> = self.segments.iter().map(String::as_str).collect();
        if self.star {
            parts.push("*");
        }
        write!(f, "{}", parts.join("/"))?;
        if let Some(nested) = &self.nested {
            let opts: Vec<String> = nested
                .to_query_pairs()
                .into_iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect();
            write!(f, "({})", opts.join(";"))?;
        }
        Ok(())
    }
}

pub fn join_items<T: std::fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

///////////////////////////////////////////////////////////////////////////////

/// Query options of one request, or of one nested `$expand` level.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOptions {
    pub filter: Option<ODataFilter>,
    pub order_by: Option<Vec<OrderByItem>>,
    pub top: Option<u64>,
    pub skip: Option<u64>,
    pub count: bool,
    pub expand: Option<Vec<PathItem>>,
    pub select: Option<Vec<PathItem>>,
    pub skiptoken: Option<String>,
    pub format: Option<PayloadFormat>,
}

impl QueryOptions {
    /// Parses a raw (percent-encoded) query string.
    pub fn parse(raw_query: &str, limits: &ParseLimits) -> Result<Self, ODataError> {
        let pairs = url::form_urlencoded::parse(raw_query.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()));
        Self::from_pairs(pairs, limits)
    }

    pub fn from_pairs(
        pairs: impl IntoIterator<Item = (String, String)>,
        limits: &ParseLimits,
    ) -> Result<Self, ODataError> {
        let mut parser = OptionsParser::new(limits, 0, false);
        for (name, value) in pairs {
            if !name.starts_with('$') {
                // Service operation parameters are not ours to validate
                continue;
            }
            parser.accept(&name, &value)?;
        }
        Ok(parser.options)
    }

    /// True when any option that only makes sense on a collection is present.
    pub fn collection_option(&self) -> Option<&'static str> {
        if self.filter.is_some() {
            Some(OPT_FILTER)
        } else if self.order_by.is_some() {
            Some(OPT_ORDERBY)
        } else if self.top.is_some() {
            Some(OPT_TOP)
        } else if self.skip.is_some() {
            Some(OPT_SKIP)
        } else if self.count {
            Some(OPT_COUNT)
        } else if self.skiptoken.is_some() {
            Some(OPT_SKIPTOKEN)
        } else {
            None
        }
    }

    /// Renders the options back in canonical form, in a stable order.
    pub fn to_query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        if let Some(filter) = &self.filter {
            pairs.push((OPT_FILTER.to_string(), filter.to_string()));
        }
        if let Some(expand) = &self.expand {
            pairs.push((OPT_EXPAND.to_string(), join_items(expand)));
        }
        if let Some(select) = &self.select {
            pairs.push((OPT_SELECT.to_string(), join_items(select)));
        }
        if let Some(order_by) = &self.order_by {
            pairs.push((OPT_ORDERBY.to_string(), join_items(order_by)));
        }
        if let Some(top) = self.top {
            pairs.push((OPT_TOP.to_string(), top.to_string()));
        }
        if let Some(skip) = self.skip {
            pairs.push((OPT_SKIP.to_string(), skip.to_string()));
        }
        if self.count {
            pairs.push((OPT_COUNT.to_string(), "true".to_string()));
        }
        if let Some(format) = self.format {
            let f = match format {
                PayloadFormat::Atom => "atom",
                PayloadFormat::Json => "json",
            };
            pairs.push((OPT_FORMAT.to_string(), f.to_string()));
        }
        if let Some(token) = &self.skiptoken {
            pairs.push((OPT_SKIPTOKEN.to_string(), token.clone()));
        }
        pairs
    }

    /// Percent-encoded query string (without the leading `?`).
    pub fn to_query_string(&self) -> String {
        encode_query(&self.to_query_pairs())
    }
}

/// Encodes values while keeping the `$` of option names readable.
pub fn encode_query(pairs: &[(String, String)]) -> String {
    pairs
        .iter()
        .map(|(k, v)| {
            let v: String = url::form_urlencoded::byte_serialize(v.as_bytes()).collect();
            format!("{k}={v}")
        })
        .collect::<Vec<_>>()
        .join("&")
}

///////////////////////////////////////////////////////////////////////////////

struct OptionsParser<'a> {
    limits: &'a ParseLimits,
    depth: usize,
    nested: bool,
    seen: BTreeSet<String>,
    options: QueryOptions,
}

impl<'a> OptionsParser<'a> {
    fn new(limits: &'a ParseLimits, depth: usize, nested: bool) -> Self {
        Self {
            limits,
            depth,
            nested,
            seen: BTreeSet::new(),
            options: QueryOptions::default(),
        }
    }

    fn accept(&mut self, name: &str, value: &str) -> Result<(), ODataError> {
        if !self.seen.insert(name.to_string()) {
            return Err(MalformedQuery::new(format!(
                "Query option {name} is specified more than once"
            ))
            .into());
        }

        match name {
            OPT_FILTER => {
                self.options.filter = Some(ODataFilter::parse(value, self.limits.max_filter_depth)?)
            }
            OPT_ORDERBY => self.options.order_by = Some(parse_order_by(value)?),
            OPT_TOP => {
                let top = parse_count_option(OPT_TOP, value)?;
                if let Some(max_top) = self.limits.max_top {
                    if top > max_top {
                        return Err(MalformedQuery::new(format!(
                            "$top value {top} exceeds the maximum of {max_top}"
                        ))
                        .into());
                    }
                }
                self.options.top = Some(top);
            }
            OPT_SKIP => self.options.skip = Some(parse_count_option(OPT_SKIP, value)?),
            OPT_COUNT => {
                self.options.count = match value {
                    "true" => true,
                    "false" => false,
                    _ => {
                        return Err(
                            MalformedQuery::new(format!("Invalid $count value {value}")).into()
                        )
                    }
                }
            }
            OPT_EXPAND => {
                let items = parse_path_items(OPT_EXPAND, value, self.limits, self.depth)?;
                if items.iter().any(|i| i.star) {
                    return Err(MalformedQuery::new("$expand does not support '*'").into());
                }
                self.options.expand = Some(items);
            }
            OPT_SELECT => {
                self.options.select =
                    Some(parse_path_items(OPT_SELECT, value, self.limits, self.depth)?)
            }
            OPT_SKIPTOKEN if !self.nested => {
                if value.is_empty() {
                    return Err(MalformedQuery::new("$skiptoken must not be empty").into());
                }
                self.options.skiptoken = Some(value.to_string());
            }
            OPT_FORMAT if !self.nested => {
                self.options.format = Some(match value {
                    "atom" | "xml" => PayloadFormat::Atom,
                    "json" => PayloadFormat::Json,
                    _ => {
                        return Err(
                            MalformedQuery::new(format!("Unsupported $format {value}")).into()
                        )
                    }
                })
            }
            _ => {
                return Err(
                    MalformedQuery::new(format!("Unknown query option {name}")).into(),
                )
            }
        }

        Ok(())
    }
}

///////////////////////////////////////////////////////////////////////////////

/// `$top` / `$skip` values must round-trip exactly: plain decimal digits
/// without sign or leading zeros, or `0x` hexadecimal. Hexadecimal `$skip`
/// counts are only honored for 0 and 1.
fn parse_count_option(name: &str, value: &str) -> Result<u64, ODataError> {
    let bad = || -> ODataError {
        MalformedQuery::new(format!("Invalid value {value:?} for {name}")).into()
    };

    static DECIMAL: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    static HEX: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    let decimal = cached_regex(&DECIMAL, r"^(0|[1-9][0-9]*)$")?;
    let hex = cached_regex(&HEX, r"^0[xX]([0-9a-fA-F]+)$")?;

    let parsed = if decimal.is_match(value) {
        value.parse::<u64>().map_err(|_| bad())?
    } else if let Some(caps) = hex.captures(value) {
        let v = u64::from_str_radix(&caps[1], 16).map_err(|_| bad())?;
        if name == OPT_SKIP && v > 1 {
            return Err(bad());
        }
        v
    } else {
        return Err(bad());
    };

    if parsed > i32::MAX as u64 {
        return Err(bad());
    }
    Ok(parsed)
}

/// Compiles `pattern` into `cell` on first use.
pub(crate) fn cached_regex(
    cell: &'static OnceLock<Result<Regex, regex::Error>>,
    pattern: &str,
) -> Result<&'static Regex, ODataError> {
    cell.get_or_init(|| Regex::new(pattern))
        .as_ref()
        .map_err(|e| ODataError::internal(e.clone()))
}

fn parse_order_by(value: &str) -> Result<Vec<OrderByItem>, ODataError> {
    let mut items = Vec::new();
    for raw in split_top_level(value, ',')? {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(MalformedQuery::new("Empty item in $orderby").into());
        }

        let mut tokens = raw.split_whitespace();
        let path = tokens.next().unwrap_or_default();
        let descending = match tokens.next() {
            None | Some("asc") => false,
            Some("desc") => true,
            Some(other) => {
                return Err(
                    MalformedQuery::new(format!("Invalid $orderby direction {other}")).into(),
                )
            }
        };
        if tokens.next().is_some() {
            return Err(MalformedQuery::new(format!("Invalid $orderby item {raw}")).into());
        }

        let segments = parse_path(OPT_ORDERBY, path)?;
        if segments.last().is_some_and(|s| s == "*") {
            return Err(MalformedQuery::new("'*' is not valid in $orderby").into());
        }
        items.push(OrderByItem {
            path: segments,
            descending,
        });
    }
    Ok(items)
}

fn parse_path_items(
    option: &str,
    value: &str,
    limits: &ParseLimits,
    depth: usize,
) -> Result<Vec<PathItem>, ODataError> {
    let mut pieces = split_top_level(value, ',')?;

    // A single trailing comma is tolerated
    if pieces.len() > 1 && pieces.last().is_some_and(|p| p.trim().is_empty()) {
        pieces.pop();
    }

    let mut items = Vec::with_capacity(pieces.len());
    for piece in pieces {
        let piece = piece.trim();
        if piece.is_empty() {
            return Err(MalformedQuery::new(format!("Empty segment in {option}")).into());
        }

        let (head, nested) = match piece.find('(') {
            None => (piece, None),
            Some(open) => {
                let inner = piece[open + 1..].strip_suffix(')').ok_or_else(|| {
                    MalformedQuery::new(format!("Unbalanced parentheses in {option}"))
                })?;
                (&piece[..open], Some(inner))
            }
        };

        let mut segments = parse_path(option, head)?;
        let star = segments.last().is_some_and(|s| s == "*");
        if star {
            segments.pop();
        }

        // Every `/` step and every parenthesized level is one navigation
        // deeper; the terminal segment of a `$select` path is a property.
        let navigations = if option == OPT_SELECT && !star && nested.is_none() {
            segments.len().saturating_sub(1)
        } else {
            segments.len()
        };
        let reached = depth + navigations;
        if reached > limits.max_expand_depth {
            return Err(RecursionLimitExceeded::new(option, limits.max_expand_depth).into());
        }

        let nested = match nested {
            None => None,
            Some(_) if star => {
                return Err(
                    MalformedQuery::new(format!("'*' cannot carry options in {option}")).into(),
                )
            }
            Some(inner) => Some(Box::new(parse_nested_options(inner, limits, reached)?)),
        };

        items.push(PathItem {
            segments,
            star,
            nested,
        });
    }

    Ok(items)
}

fn parse_nested_options(
    inner: &str,
    limits: &ParseLimits,
    depth: usize,
) -> Result<QueryOptions, ODataError> {
    let mut parser = OptionsParser::new(limits, depth, true);
    for opt in split_top_level(inner, ';')? {
        let opt = opt.trim();
        if opt.is_empty() {
            continue;
        }
        let (name, value) = opt
            .split_once('=')
            .ok_or_else(|| MalformedQuery::new(format!("Invalid nested option {opt}")))?;
        parser.accept(name.trim(), value.trim())?;
    }
    Ok(parser.options)
}

/// Splits a `/` separated property path. `*` is only valid as the last
/// segment.
fn parse_path(option: &str, path: &str) -> Result<Vec<String>, ODataError> {
    let segments: Vec<&str> = path.split('/').collect();
    let last = segments.len() - 1;

    for (i, seg) in segments.iter().enumerate() {
        if seg.is_empty() {
            return Err(MalformedQuery::new(format!(
                "Invalid path {path:?} in {option}: leading, trailing or empty '/' segment"
            ))
            .into());
        }
        if *seg == "*" {
            if i != last {
                return Err(MalformedQuery::new(format!(
                    "Invalid path {path:?} in {option}: '*' must be the last segment"
                ))
                .into());
            }
            continue;
        }
        if !is_identifier(seg) {
            return Err(MalformedQuery::new(format!(
                "Invalid identifier {seg:?} in {option}"
            ))
            .into());
        }
    }

    Ok(segments.into_iter().map(str::to_string).collect())
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '.')
}

/// Splits on `sep` outside of parentheses and single-quoted literals.
pub(crate) fn split_top_level(s: &str, sep: char) -> Result<Vec<&str>, ODataError> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut in_str = false;
    let mut start = 0;

    for (i, c) in s.char_indices() {
        match c {
            '\'' => in_str = !in_str,
            '(' if !in_str => depth += 1,
            ')' if !in_str => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| MalformedQuery::new("Unbalanced parentheses"))?;
            }
            c if c == sep && !in_str && depth == 0 => {
                parts.push(&s[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }

    if depth != 0 || in_str {
        return Err(MalformedQuery::new("Unbalanced parentheses or quotes").into());
    }

    parts.push(&s[start..]);
    Ok(parts)
}

///////////////////////////////////////////////////////////////////////////////
