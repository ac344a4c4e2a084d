use std::cmp::Ordering;

use crate::{
    entity::PropertyAccess,
    error::{MalformedQuery, ODataError},
    ordering::EffectiveOrdering,
    query::{split_top_level, QueryOptions},
    value::{EdmType, Value},
};

///////////////////////////////////////////////////////////////////////////////

/// Lifecycle of one paged collection evaluation.
///
/// ```text
/// Materializing -> PageFull -> TokenEmitted
/// Materializing -> Exhausted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
    Materializing,
    PageFull,
    TokenEmitted,
    Exhausted,
}

///////////////////////////////////////////////////////////////////////////////

/// Ordering-key values of the last item of a page.
#[derive(Debug, Clone, PartialEq)]
pub struct SkipToken {
    pub values: Vec<Value>,
}

impl SkipToken {
    pub fn from_entity(ordering: &EffectiveOrdering, entity: &dyn PropertyAccess) -> Self {
        Self {
            values: ordering.values(entity),
        }
    }

    /// Parses a client-supplied token, checking it against the ordering it
    /// must resume.
    pub fn parse(raw: &str, ordering: &EffectiveOrdering) -> Result<Self, ODataError> {
        let parts = split_top_level(raw, ',')?;
        if parts.len() != ordering.keys.len() {
            return Err(MalformedQuery::new(format!(
                "$skiptoken {raw:?} has {} values, expected {}",
                parts.len(),
                ordering.keys.len()
            ))
            .into());
        }

        let mut values = Vec::with_capacity(parts.len());
        for (part, key) in parts.iter().zip(&ordering.keys) {
            let value = match &key.typ {
                Some(typ) => Value::parse_literal(part.trim(), typ)?,
                None => parse_untyped_literal(part.trim())?,
            };
            values.push(value);
        }

        Ok(Self { values })
    }

    pub fn render(&self) -> Result<String, ODataError> {
        let literals = self
            .values
            .iter()
            .map(Value::to_literal)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(literals.join(","))
    }

    /// True when `entity` sorts strictly after the token position.
    pub fn precedes(&self, ordering: &EffectiveOrdering, entity: &dyn PropertyAccess) -> bool {
        ordering.compare_to_values(entity, &self.values) == Ordering::Greater
    }
}

/// Dynamic properties carry no declared type, so the literal form decides.
fn parse_untyped_literal(text: &str) -> Result<Value, ODataError> {
    let candidates = [
        EdmType::Boolean,
        EdmType::Int32,
        EdmType::Int64,
        EdmType::Double,
        EdmType::Guid,
        EdmType::DateTime,
        EdmType::String,
    ];

    if text == "null" {
        return Ok(Value::Null);
    }
    // Only Edm.Single carries an `f` suffix
    if text.ends_with(['f', 'F']) {
        if let Ok(value) = Value::parse_literal(text, &EdmType::Single) {
            return Ok(value);
        }
    }
    for typ in &candidates {
        if let Ok(value) = Value::parse_literal(text, typ) {
            return Ok(value);
        }
    }
    Err(MalformedQuery::new(format!("Invalid $skiptoken value {text:?}")).into())
}

///////////////////////////////////////////////////////////////////////////////

/// Result of truncating an ordered sequence to one page.
#[derive(Debug)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next: Option<SkipToken>,
}

/// Truncates collection results to the configured page size and decides
/// whether a continuation is owed.
#[derive(Debug)]
pub struct PagingController {
    page_size: Option<usize>,
    top: Option<u64>,
    state: PageState,
}

impl PagingController {
    pub fn new(page_size: Option<usize>, top: Option<u64>) -> Self {
        Self {
            page_size: page_size.filter(|s| *s > 0),
            top,
            state: PageState::Materializing,
        }
    }

    pub fn state(&self) -> PageState {
        self.state
    }

    pub fn is_paged(&self) -> bool {
        self.page_size.is_some()
    }

    /// Takes items up to the page size or `$top`, looking one item ahead to
    /// tell a full page from an exhausted sequence.
    pub fn paginate<T, I>(&mut self, items: I, ordering: Option<&EffectiveOrdering>) -> Page<T>
    where
        T: PropertyAccess,
        I: IntoIterator<Item = T>,
    {
        let top = self.top.map(|t| usize::try_from(t).unwrap_or(usize::MAX));
        let limit = match (self.page_size, top) {
            (Some(size), Some(top)) => Some(size.min(top)),
            (size, top) => size.or(top),
        };

        let mut iter = items.into_iter().peekable();
        let mut page = Vec::new();
        while limit.map_or(true, |l| page.len() < l) {
            match iter.next() {
                Some(item) => page.push(item),
                None => break,
            }
        }

        let more = iter.peek().is_some();
        let top_reached = top.is_some_and(|t| page.len() >= t);

        let next = match (self.page_size, ordering, page.last()) {
            (Some(size), Some(ordering), Some(last)) if more && !top_reached && page.len() == size => {
                self.state = PageState::PageFull;
                let token = SkipToken::from_entity(ordering, last);
                self.state = PageState::TokenEmitted;
                Some(token)
            }
            _ => {
                self.state = PageState::Exhausted;
                None
            }
        };

        Page { items: page, next }
    }
}

///////////////////////////////////////////////////////////////////////////////

/// Builds the `rel="next"` link of a page.
///
/// `options` are the options the collection was evaluated with. `$skip` is
/// dropped as it was already applied; `$top` is reduced by the number of
/// items emitted so far.
pub fn continuation_link(
    collection_url: &str,
    options: &QueryOptions,
    emitted: usize,
    token: &SkipToken,
) -> Result<String, ODataError> {
    let mut next = options.clone();
    next.skip = None;
    next.top = next.top.map(|t| t.saturating_sub(emitted as u64));
    next.skiptoken = Some(token.render()?);

    tracing::debug!(
        collection_url,
        skiptoken = next.skiptoken.as_deref(),
        emitted,
        "Emitting continuation"
    );

    Ok(format!("{collection_url}?{}", next.to_query_string()))
}

///////////////////////////////////////////////////////////////////////////////
