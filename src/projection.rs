use std::collections::{BTreeMap, BTreeSet};

use crate::{
    error::{MalformedQuery, ODataError},
    model::{EntityType, Model},
    query::{PathItem, QueryOptions},
};

///////////////////////////////////////////////////////////////////////////////

/// Projection of one level of the result: which scalar properties are
/// emitted, which navigations are rendered as deferred links and which are
/// expanded inline.
///
/// A name appears in at most one of `selected`, `links` and `children`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpandSelectNode {
    pub entity_set: String,
    /// All scalar properties, declared and dynamic
    pub select_all: bool,
    /// `$select` was given at this level
    pub restricted: bool,
    pub selected: BTreeSet<String>,
    pub links: BTreeSet<String>,
    pub children: BTreeMap<String, ExpandedChild>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExpandedChild {
    pub node: ExpandSelectNode,
    /// Collection options of the expanded navigation ($filter, $orderby,
    /// $top, $skip, $count)
    pub options: QueryOptions,
}

impl ExpandSelectNode {
    /// Merges `$expand` and `$select` of the given options for `entity_set`.
    pub fn build(
        model: &Model,
        entity_set: &str,
        options: &QueryOptions,
    ) -> Result<Self, ODataError> {
        let expand = options.expand.clone().unwrap_or_default();
        Builder { model }.build(entity_set, options.select.clone(), expand)
    }

    /// Projection used when nothing was requested: every property and a
    /// deferred link per navigation.
    pub fn full(model: &Model, entity_set: &str) -> Result<Self, ODataError> {
        Self::build(model, entity_set, &QueryOptions::default())
    }

    pub fn includes_property(&self, name: &str) -> bool {
        self.select_all || self.selected.contains(name)
    }

    /// Renders this subtree back into `$select` / `$expand` relative to its
    /// own level.
    pub fn to_options(&self) -> QueryOptions {
        let mut options = QueryOptions::default();

        if self.restricted {
            // `*` already covers every property and navigation of this level
            let select = if self.select_all {
                vec![PathItem::new("*")]
            } else {
                self.selected
                    .iter()
                    .chain(self.links.iter())
                    .chain(self.children.keys())
                    .map(|n| PathItem::new(n))
                    .collect()
            };
            options.select = Some(select);
        }

        if !self.children.is_empty() {
            let expand = self
                .children
                .iter()
                .map(|(nav, child)| {
                    let nested = child.nested_options();
                    let item = PathItem::new(nav);
                    if nested == QueryOptions::default() {
                        item
                    } else {
                        item.with_nested(nested)
                    }
                })
                .collect();
            options.expand = Some(expand);
        }

        options
    }
}

impl ExpandedChild {
    /// Collection options plus the child's own projection, as they would be
    /// written inside `$expand=Nav(...)` or on a continuation link.
    pub fn nested_options(&self) -> QueryOptions {
        let projection = self.node.to_options();
        QueryOptions {
            select: projection.select,
            expand: projection.expand,
            ..self.options.clone()
        }
    }
}

///////////////////////////////////////////////////////////////////////////////

struct Builder<'a> {
    model: &'a Model,
}

/// Expansion request for a single navigation gathered from all `$expand` items
/// naming it.
#[derive(Default)]
struct PendingChild {
    expand: Vec<PathItem>,
    select: Option<Vec<PathItem>>,
    nested_select: bool,
    options: QueryOptions,
    has_options: bool,
}

impl<'a> Builder<'a> {
    fn build(
        &self,
        entity_set: &str,
        select: Option<Vec<PathItem>>,
        expand: Vec<PathItem>,
    ) -> Result<ExpandSelectNode, ODataError> {
        let set = self.model.entity_set(entity_set)?;
        let typ = self.model.entity_type_of(set)?;

        let mut pending = self.collect_expansions(typ, expand)?;

        let mut node = ExpandSelectNode {
            entity_set: entity_set.to_string(),
            select_all: select.is_none(),
            restricted: select.is_some(),
            selected: BTreeSet::new(),
            links: BTreeSet::new(),
            children: BTreeMap::new(),
        };

        // Navigations that survive a restrictive $select
        let mut kept_navs = BTreeSet::new();

        match select {
            None => {
                for nav in &typ.navigations {
                    if pending.contains_key(&nav.name) {
                        kept_navs.insert(nav.name.clone());
                    } else {
                        node.links.insert(nav.name.clone());
                    }
                }
            }
            Some(items) => {
                for item in items {
                    if item.nested.is_some() {
                        return Err(MalformedQuery::new(
                            "Nested query options are only valid in $expand",
                        )
                        .into());
                    }
                    self.apply_select_item(typ, item, &mut node, &mut pending, &mut kept_navs)?;
                }
                if node.select_all {
                    kept_navs.extend(pending.keys().cloned());
                    for nav in &typ.navigations {
                        if !pending.contains_key(&nav.name) {
                            node.links.insert(nav.name.clone());
                        }
                    }
                }
            }
        }

        for (nav_name, child) in pending {
            if !kept_navs.contains(&nav_name) {
                if child.nested_select {
                    return Err(MalformedQuery::new(format!(
                        "Navigation {nav_name} is expanded with a nested $select but is not selected by its parent"
                    ))
                    .into());
                }
                continue;
            }

            let nav = typ.navigation(&nav_name).ok_or_else(|| {
                ODataError::internal(format!("Navigation {nav_name} vanished from {}", typ.name))
            })?;
            let target_type = self
                .model
                .entity_type_of(self.model.entity_set(&nav.target_set)?)?;

            if !nav.is_collection() && child.has_options {
                if let Some(option) = child.options.collection_option() {
                    return Err(MalformedQuery::new(format!(
                        "Query option {option} is not valid on single-valued navigation {nav_name}"
                    ))
                    .into());
                }
            }
            if let Some(filter) = &child.options.filter {
                filter.validate(self.model, target_type)?;
            }

            let child_node = self.build(&nav.target_set, child.select, child.expand)?;
            node.children.insert(
                nav_name,
                ExpandedChild {
                    node: child_node,
                    options: child.options,
                },
            );
        }

        Ok(node)
    }

    fn collect_expansions(
        &self,
        typ: &EntityType,
        expand: Vec<PathItem>,
    ) -> Result<BTreeMap<String, PendingChild>, ODataError> {
        let mut pending: BTreeMap<String, PendingChild> = BTreeMap::new();

        for item in expand {
            let mut segments = item.segments.into_iter();
            let Some(head) = segments.next() else {
                return Err(MalformedQuery::new("Empty $expand item").into());
            };

            if typ.navigation(&head).is_none() {
                return Err(MalformedQuery::new(format!(
                    "{head} is not a navigation property of {}",
                    typ.name
                ))
                .into());
            }

            let child = pending.entry(head.clone()).or_default();
            let rest: Vec<String> = segments.collect();

            if !rest.is_empty() {
                child.expand.push(PathItem {
                    segments: rest,
                    star: false,
                    nested: item.nested,
                });
                continue;
            }

            let Some(nested) = item.nested else {
                continue;
            };
            if child.has_options {
                return Err(MalformedQuery::new(format!(
                    "Navigation {head} carries nested options more than once"
                ))
                .into());
            }
            let nested = *nested;
            child.has_options = true;
            if let Some(expand) = nested.expand.clone() {
                child.expand.extend(expand);
            }
            if let Some(select) = nested.select.clone() {
                child.nested_select = true;
                child.select.get_or_insert_with(Vec::new).extend(select);
            }
            child.options = QueryOptions {
                filter: nested.filter,
                order_by: nested.order_by,
                top: nested.top,
                skip: nested.skip,
                count: nested.count,
                ..Default::default()
            };
        }

        Ok(pending)
    }

    fn apply_select_item(
        &self,
        typ: &EntityType,
        item: PathItem,
        node: &mut ExpandSelectNode,
        pending: &mut BTreeMap<String, PendingChild>,
        kept_navs: &mut BTreeSet<String>,
    ) -> Result<(), ODataError> {
        let mut segments = item.segments.into_iter();
        let Some(head) = segments.next() else {
            // Bare `*`
            node.select_all = true;
            return Ok(());
        };
        let rest: Vec<String> = segments.collect();

        if let Some(nav) = typ.navigation(&head) {
            if rest.is_empty() && !item.star {
                if pending.contains_key(&nav.name) {
                    kept_navs.insert(head);
                } else {
                    node.links.insert(head);
                }
                return Ok(());
            }

            // Selecting through a navigation
            let Some(child) = pending.get_mut(&head) else {
                return Err(MalformedQuery::new(format!(
                    "$select path through {head} requires {head} to be expanded"
                ))
                .into());
            };
            child.select.get_or_insert_with(Vec::new).push(PathItem {
                segments: rest,
                star: item.star,
                nested: None,
            });
            kept_navs.insert(head);
            return Ok(());
        }

        if !rest.is_empty() || item.star {
            return Err(MalformedQuery::new(format!(
                "Invalid $select path through {head}: only navigation properties can be traversed"
            ))
            .into());
        }

        if typ.property(&head).is_some() || typ.open {
            node.selected.insert(head);
            Ok(())
        } else {
            Err(MalformedQuery::new(format!(
                "{} has no property {head}",
                typ.name
            ))
            .into())
        }
    }
}

///////////////////////////////////////////////////////////////////////////////
