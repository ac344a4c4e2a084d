use crate::{
    collection::{matches_key, PathSegment, ResourcePath},
    context::ServiceContext,
    entity::{Entity, PropertyAccess},
    error::{MalformedQuery, NotApplicable, ODataError, ResourceNotFound},
    materializer::{Materializer, ProjectedEntity, ProjectedFeed},
    projection::ExpandSelectNode,
    query::{QueryOptions, OPT_EXPAND, OPT_SELECT},
    value::{EdmType, Value},
};

///////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone, PartialEq)]
pub enum ResourceResult {
    Feed(ProjectedFeed),
    Entry(ProjectedEntity),
    Property {
        name: String,
        typ: Option<EdmType>,
        value: Value,
    },
}

/// What a resource path addresses before options are applied.
enum Target {
    Collection {
        entity_set: String,
        href: String,
        items: Vec<Entity>,
    },
    Entity {
        entity_set: String,
        entity: Entity,
    },
    Property {
        name: String,
        typ: Option<EdmType>,
        value: Value,
    },
}

///////////////////////////////////////////////////////////////////////////////

pub fn execute(
    ctx: &dyn ServiceContext,
    path: &ResourcePath,
    options: &QueryOptions,
) -> Result<ResourceResult, ODataError> {
    let materializer = Materializer::new(ctx);
    let model = ctx.model();

    let target = resolve(ctx, &materializer, path)?;

    match target {
        Target::Collection {
            entity_set,
            href,
            items,
        } => {
            let set = model.entity_set(&entity_set)?;
            let typ = model.entity_type_of(set)?;
            if let Some(filter) = &options.filter {
                filter.validate(model, typ)?;
            }

            let node = ExpandSelectNode::build(model, &entity_set, options)?;
            let feed = materializer.feed(&entity_set, href, items, options, &node, options)?;

            tracing::debug!(
                %path,
                entity_set = entity_set.as_str(),
                entries = feed.entries.len(),
                count = feed.count,
                next_link = feed.next_link.as_deref(),
                "Materialized feed"
            );
            Ok(ResourceResult::Feed(feed))
        }
        Target::Entity { entity_set, entity } => {
            if let Some(option) = options.collection_option() {
                return Err(NotApplicable::new(option, path.to_string()).into());
            }
            let node = ExpandSelectNode::build(model, &entity_set, options)?;
            let entry = materializer.entity(&entity_set, &entity, &node)?;
            Ok(ResourceResult::Entry(entry))
        }
        Target::Property { name, typ, value } => {
            let option = options.collection_option().or_else(|| {
                if options.select.is_some() {
                    Some(OPT_SELECT)
                } else if options.expand.is_some() {
                    Some(OPT_EXPAND)
                } else {
                    None
                }
            });
            if let Some(option) = option {
                return Err(NotApplicable::new(option, path.to_string()).into());
            }
            Ok(ResourceResult::Property { name, typ, value })
        }
    }
}

fn resolve(
    ctx: &dyn ServiceContext,
    materializer: &Materializer<'_>,
    path: &ResourcePath,
) -> Result<Target, ODataError> {
    let model = ctx.model();

    let mut segments = path.segments.iter();
    let Some(first) = segments.next() else {
        return Err(MalformedQuery::new("Empty resource path").into());
    };

    let set = model.entity_set(&first.name)?;
    let items = materializer.scan(&set.name)?;
    let mut target = select_key(&set.name, set.name.clone(), items, first, ctx)?;

    let last = path.segments.len() - 1;
    for (i, seg) in segments.enumerate() {
        let Target::Entity { entity_set, entity } = target else {
            return Err(MalformedQuery::new(format!(
                "Segment {} must follow a single entity",
                seg.name
            ))
            .into());
        };

        let set = model.entity_set(&entity_set)?;
        let typ = model.entity_type_of(set)?;

        if let Some(nav) = typ.navigation(&seg.name) {
            let related = materializer.navigate(&entity_set, &entity, &nav.name, &nav.target_set)?;
            if nav.is_collection() {
                let key = crate::collection::key_predicate(typ, &entity)?;
                let href = format!("{entity_set}{key}/{}", nav.name);
                target = select_key(&nav.target_set, href, related, seg, ctx)?;
            } else {
                if seg.key.is_some() {
                    return Err(MalformedQuery::new(format!(
                        "Single-valued navigation {} takes no key",
                        seg.name
                    ))
                    .into());
                }
                let entity = related
                    .into_iter()
                    .next()
                    .ok_or_else(|| ResourceNotFound::new(seg.name.clone()))?;
                target = Target::Entity {
                    entity_set: nav.target_set.clone(),
                    entity,
                };
            }
            continue;
        }

        // Properties terminate the path
        if i + 1 != last || seg.key.is_some() {
            return Err(MalformedQuery::new(format!(
                "Property {} cannot be addressed further",
                seg.name
            ))
            .into());
        }

        target = if let Some(prop) = typ.property(&seg.name) {
            Target::Property {
                name: prop.name.clone(),
                typ: Some(prop.typ.clone()),
                value: entity.value(&prop.name).cloned().unwrap_or(Value::Null),
            }
        } else if let Some(value) = typ.open.then(|| entity.dynamic_value(&seg.name)).flatten() {
            Target::Property {
                name: seg.name.clone(),
                typ: value.edm_type(),
                value: value.clone(),
            }
        } else {
            return Err(ResourceNotFound::new(seg.name.clone()).into());
        };
    }

    Ok(target)
}

/// Narrows `items` to the entity named by the segment's key, if any.
fn select_key(
    entity_set: &str,
    href: String,
    items: Vec<Entity>,
    segment: &PathSegment,
    ctx: &dyn ServiceContext,
) -> Result<Target, ODataError> {
    let Some(key) = &segment.key else {
        return Ok(Target::Collection {
            entity_set: entity_set.to_string(),
            href,
            items,
        });
    };

    let model = ctx.model();
    let typ = model.entity_type_of(model.entity_set(entity_set)?)?;
    let key = key.resolve(typ)?;

    let entity = items
        .into_iter()
        .find(|e| matches_key(e, &key))
        .ok_or_else(|| ResourceNotFound::new(segment.name.clone()))?;

    Ok(Target::Entity {
        entity_set: entity_set.to_string(),
        entity,
    })
}
