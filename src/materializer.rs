use crate::{
    collection::key_predicate,
    config::ServiceConfig,
    context::ServiceContext,
    datasource::{DataSource, EntityIter, ProviderError},
    entity::{Entity, PropertyAccess},
    error::{ODataError, ProviderFailure, SkipTokenSupportedOnPagedSetsOnly},
    interceptor::InterceptorRegistry,
    model::{EntityType, Model},
    ordering::EffectiveOrdering,
    paging::{continuation_link, PagingController, SkipToken},
    projection::ExpandSelectNode,
    query::QueryOptions,
    value::{EdmType, Value},
};

///////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedFeed {
    pub entity_set: String,
    /// Path relative to the service root, e.g. `Customers(1)/Orders`
    pub href: String,
    pub entries: Vec<ProjectedEntity>,
    pub count: Option<usize>,
    /// Absolute continuation URL
    pub next_link: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedEntity {
    /// Qualified per-instance type name
    pub type_name: String,
    pub entity_set: String,
    /// Key predicate, e.g. `(1)`
    pub key: String,
    pub properties: Vec<ProjectedProperty>,
    pub navigations: Vec<ProjectedNavigation>,
}

impl ProjectedEntity {
    pub fn href(&self) -> String {
        format!("{}{}", self.entity_set, self.key)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedProperty {
    pub name: String,
    /// Declared type, or the type of the value for dynamic properties
    pub typ: Option<EdmType>,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedNavigation {
    pub name: String,
    pub is_collection: bool,
    pub content: NavigationContent,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NavigationContent {
    Deferred,
    /// `None` renders as an empty inline element
    Entry(Option<Box<ProjectedEntity>>),
    Feed(ProjectedFeed),
}

///////////////////////////////////////////////////////////////////////////////

/// Walks an [`ExpandSelectNode`] tree against the data source.
pub struct Materializer<'a> {
    model: &'a Model,
    config: &'a ServiceConfig,
    source: &'a dyn DataSource,
    interceptors: &'a InterceptorRegistry,
    service_base_url: String,
}

impl<'a> Materializer<'a> {
    pub fn new(ctx: &'a dyn ServiceContext) -> Self {
        Self {
            model: ctx.model(),
            config: ctx.config(),
            source: ctx.data_source(),
            interceptors: ctx.interceptors(),
            service_base_url: ctx.service_base_url(),
        }
    }

    pub fn scan(&self, entity_set: &str) -> Result<Vec<Entity>, ODataError> {
        let iter = self.source.scan(entity_set);
        self.admitted(entity_set, iter)
    }

    pub fn navigate(
        &self,
        entity_set: &str,
        entity: &Entity,
        navigation: &str,
        target_set: &str,
    ) -> Result<Vec<Entity>, ODataError> {
        let iter = self.source.navigate(entity_set, entity, navigation);
        self.admitted(target_set, iter)
    }

    /// Drains a provider iterator, keeping what the interceptors of
    /// `entity_set` admit.
    fn admitted(
        &self,
        entity_set: &str,
        iter: Result<EntityIter<'_>, ProviderError>,
    ) -> Result<Vec<Entity>, ODataError> {
        let iter = iter.map_err(|e| self.provider_failure(entity_set, e))?;
        let mut entities = Vec::new();
        for item in iter {
            let entity = item.map_err(|e| self.provider_failure(entity_set, e))?;
            if self.interceptors.admits(entity_set, &entity) {
                entities.push(entity);
            }
        }
        Ok(entities)
    }

    fn provider_failure(&self, entity_set: &str, error: ProviderError) -> ODataError {
        tracing::error!(
            provider = self.source.name(),
            entity_set,
            error = %error,
            "Data source failed",
        );
        ProviderFailure::new(self.source.name(), error.msg, self.config.verbose_errors).into()
    }

    ///////////////////////////////////////////////////////////////////////////

    /// Evaluates collection options over `items` and projects the resulting
    /// page.
    ///
    /// `link_options` are carried over to the continuation link.
    pub fn feed(
        &self,
        entity_set: &str,
        href: String,
        items: Vec<Entity>,
        options: &QueryOptions,
        node: &ExpandSelectNode,
        link_options: &QueryOptions,
    ) -> Result<ProjectedFeed, ODataError> {
        let page_size = self.config.page_size(entity_set);

        if options.skiptoken.is_some() && page_size.is_none() {
            return Err(SkipTokenSupportedOnPagedSetsOnly::new(entity_set).into());
        }

        let mut items = match &options.filter {
            None => items,
            Some(filter) => {
                let mut kept = Vec::with_capacity(items.len());
                for item in items {
                    if filter.matches(&item)? {
                        kept.push(item);
                    }
                }
                kept
            }
        };

        let count = options.count.then_some(items.len());

        let needs_ordering = options.order_by.is_some()
            || options.top.is_some()
            || options.skip.is_some()
            || page_size.is_some();

        let ordering = if needs_ordering {
            let ordering = EffectiveOrdering::resolve(
                self.model,
                self.config,
                entity_set,
                options.order_by.as_deref(),
            )?;
            ordering.sort(&mut items);
            Some(ordering)
        } else {
            None
        };

        if let (Some(raw), Some(ordering)) = (&options.skiptoken, &ordering) {
            let token = SkipToken::parse(raw, ordering)?;
            items.retain(|e| token.precedes(ordering, e));
        }

        let skip = options
            .skip
            .map(|s| usize::try_from(s).unwrap_or(usize::MAX))
            .unwrap_or(0);

        let mut paging = PagingController::new(page_size, options.top);
        let page = paging.paginate(items.into_iter().skip(skip), ordering.as_ref());

        let next_link = match &page.next {
            None => None,
            Some(token) => Some(continuation_link(
                &format!("{}{href}", self.service_base_url),
                link_options,
                page.items.len(),
                token,
            )?),
        };

        let mut entries = Vec::with_capacity(page.items.len());
        for entity in &page.items {
            entries.push(self.entity(entity_set, entity, node)?);
        }

        Ok(ProjectedFeed {
            entity_set: entity_set.to_string(),
            href,
            entries,
            count,
            next_link,
        })
    }

    pub fn entity(
        &self,
        entity_set: &str,
        entity: &Entity,
        node: &ExpandSelectNode,
    ) -> Result<ProjectedEntity, ODataError> {
        let set = self.model.entity_set(entity_set)?;
        let typ = self.model.entity_type_of(set)?;
        let key = key_predicate(typ, entity)?;

        let properties = project_properties(typ, entity, node);

        let mut navigations = Vec::new();
        for nav in &typ.navigations {
            let content = if let Some(child) = node.children.get(&nav.name) {
                let related = self.navigate(entity_set, entity, &nav.name, &nav.target_set)?;
                if nav.is_collection() {
                    let href = format!("{entity_set}{key}/{}", nav.name);
                    NavigationContent::Feed(self.feed(
                        &nav.target_set,
                        href,
                        related,
                        &child.options,
                        &child.node,
                        &child.nested_options(),
                    )?)
                } else {
                    match related.first() {
                        None => NavigationContent::Entry(None),
                        Some(target) => NavigationContent::Entry(Some(Box::new(self.entity(
                            &nav.target_set,
                            target,
                            &child.node,
                        )?))),
                    }
                }
            } else if node.links.contains(&nav.name) {
                NavigationContent::Deferred
            } else {
                continue;
            };

            navigations.push(ProjectedNavigation {
                name: nav.name.clone(),
                is_collection: nav.is_collection(),
                content,
            });
        }

        Ok(ProjectedEntity {
            type_name: self.model.qualified(&entity.type_name),
            entity_set: entity_set.to_string(),
            key,
            properties,
            navigations,
        })
    }
}

/// Declared properties in declared order (missing values become null), then
/// dynamic ones by name. Dynamic properties the instance lacks are left out.
fn project_properties(
    typ: &EntityType,
    entity: &Entity,
    node: &ExpandSelectNode,
) -> Vec<ProjectedProperty> {
    let mut properties = Vec::new();

    for prop in &typ.properties {
        if !node.includes_property(&prop.name) {
            continue;
        }
        properties.push(ProjectedProperty {
            name: prop.name.clone(),
            typ: Some(prop.typ.clone()),
            value: entity.value(&prop.name).cloned().unwrap_or(Value::Null),
        });
    }

    if !typ.open {
        return properties;
    }

    let mut dynamic: Vec<&str> = entity
        .dynamic_names()
        .filter(|n| typ.property(n).is_none() && typ.navigation(n).is_none())
        .filter(|n| node.includes_property(n))
        .collect();
    dynamic.sort_unstable();

    for name in dynamic {
        if let Some(value) = entity.dynamic_value(name) {
            properties.push(ProjectedProperty {
                name: name.to_string(),
                typ: value.edm_type(),
                value: value.clone(),
            });
        }
    }

    properties
}
