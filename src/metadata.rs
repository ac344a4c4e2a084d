// <edmx:Edmx xmlns:edmx="http://schemas.microsoft.com/ado/2007/06/edmx" Version="1.0">
//   <edmx:DataServices xmlns:m="http://schemas.microsoft.com/ado/2007/08/dataservices/metadata" m:DataServiceVersion="3.0" m:MaxDataServiceVersion="3.0">
//     <Schema xmlns="http://schemas.microsoft.com/ado/2009/11/edm" Namespace="NorthwindModel">
//       <EntityType Name="Customer">
//         <Key>
//           <PropertyRef Name="ID"/>
//         </Key>
//         <Property Name="Name" Type="Edm.String" Nullable="true"/>
//         <NavigationProperty Name="Orders" Relationship="NorthwindModel.Customer_Orders" FromRole="Customer" ToRole="Orders"/>
//       </EntityType>

use crate::model::{self, Model, Multiplicity};

#[derive(Debug, serde::Serialize)]
pub struct Edmx {
    #[serde(rename = "edmx:DataServices")]
    pub ds: DataServices,
    #[serde(rename = "@xmlns:edmx")]
    pub ns_edmx: String,
    #[serde(rename = "@Version")]
    pub version: String,
}

impl Edmx {
    pub fn new(ds: DataServices) -> Self {
        Self {
            ds,
            ns_edmx: "http://schemas.microsoft.com/ado/2007/06/edmx".to_string(),
            version: "1.0".to_string(),
        }
    }

    pub fn from_model(model: &Model) -> Self {
        Self::new(DataServices::new(vec![Schema::from_model(model)]))
    }
}

#[derive(Debug, serde::Serialize)]
pub struct DataServices {
    #[serde(rename = "Schema")]
    pub schemas: Vec<Schema>,
    #[serde(rename = "@xmlns:m")]
    pub ns_m: String,
    #[serde(rename = "@m:DataServiceVersion")]
    pub version: String,
    #[serde(rename = "@m:MaxDataServiceVersion")]
    pub max_version: String,
}

impl DataServices {
    pub fn new(schemas: Vec<Schema>) -> Self {
        Self {
            schemas,
            ns_m: "http://schemas.microsoft.com/ado/2007/08/dataservices/metadata".to_string(),
            version: "3.0".to_string(),
            max_version: "3.0".to_string(),
        }
    }
}

#[derive(Debug, serde::Serialize)]
pub struct Schema {
    #[serde(rename = "@Namespace")]
    pub namespace: String,
    #[serde(rename = "EntityType")]
    pub entity_types: Vec<EntityType>,
    #[serde(rename = "ComplexType")]
    pub complex_types: Vec<ComplexType>,
    #[serde(rename = "Association")]
    pub associations: Vec<Association>,
    #[serde(rename = "EntityContainer")]
    pub entity_containers: Vec<EntityContainer>,
    #[serde(rename = "@xmlns")]
    pub ns: String,
}

impl Schema {
    pub fn from_model(model: &Model) -> Self {
        let ns = &model.namespace;
        let mut entity_types = Vec::new();
        let mut associations = Vec::new();
        let mut association_sets = Vec::new();

        for typ in model.entity_types() {
            let mut navigation_properties = Vec::new();

            for nav in &typ.navigations {
                let assoc_name = format!("{}_{}", typ.name, nav.name);
                let from_role = typ.name.clone();
                let to_role = if nav.name == typ.name {
                    format!("{}Target", nav.name)
                } else {
                    nav.name.clone()
                };

                let target_type = model
                    .entity_sets()
                    .iter()
                    .find(|s| s.name == nav.target_set)
                    .map(|s| model.qualified(&s.entity_type))
                    .unwrap_or_else(|| model.qualified(&nav.target_set));

                associations.push(Association {
                    name: assoc_name.clone(),
                    ends: vec![
                        AssociationEnd {
                            typ: model.qualified(&typ.name),
                            role: from_role.clone(),
                            multiplicity: "*".to_string(),
                        },
                        AssociationEnd {
                            typ: target_type,
                            role: to_role.clone(),
                            multiplicity: match nav.multiplicity {
                                Multiplicity::One => "0..1".to_string(),
                                Multiplicity::Many => "*".to_string(),
                            },
                        },
                    ],
                });

                // One association set per source entity set exposing the type
                for set in model.entity_sets().iter().filter(|s| s.entity_type == typ.name) {
                    association_sets.push(AssociationSet {
                        name: format!("{}_{}", set.name, nav.name),
                        association: format!("{ns}.{assoc_name}"),
                        ends: vec![
                            AssociationSetEnd {
                                role: from_role.clone(),
                                entity_set: set.name.clone(),
                            },
                            AssociationSetEnd {
                                role: to_role.clone(),
                                entity_set: nav.target_set.clone(),
                            },
                        ],
                    });
                }

                navigation_properties.push(NavigationProperty {
                    name: nav.name.clone(),
                    relationship: format!("{ns}.{assoc_name}"),
                    from_role,
                    to_role,
                });
            }

            entity_types.push(EntityType {
                name: typ.name.clone(),
                open_type: typ.open.then_some(true),
                key: EntityKey::new(
                    typ.key
                        .iter()
                        .map(|k| PropertyRef { name: k.clone() })
                        .collect(),
                ),
                properties: typ.properties.iter().map(Property::from_def).collect(),
                navigation_properties,
            });
        }

        let complex_types = model
            .complex_types()
            .iter()
            .map(|c| ComplexType {
                name: c.name.clone(),
                properties: c.properties.iter().map(Property::from_def).collect(),
            })
            .collect();

        let entity_container = EntityContainer {
            name: ns.clone(),
            is_default: true,
            entity_set: model
                .entity_sets()
                .iter()
                .map(|s| EntitySet {
                    name: s.name.clone(),
                    entity_type: model.qualified(&s.entity_type),
                })
                .collect(),
            association_sets,
        };

        Self {
            namespace: ns.clone(),
            entity_types,
            complex_types,
            associations,
            entity_containers: vec![entity_container],
            ns: "http://schemas.microsoft.com/ado/2009/11/edm".to_string(),
        }
    }
}

#[derive(Debug, serde::Serialize)]
pub struct EntityType {
    #[serde(rename = "@Name")]
    pub name: String,
    #[serde(rename = "@OpenType", skip_serializing_if = "Option::is_none")]
    pub open_type: Option<bool>,
    #[serde(rename = "Key")]
    pub key: EntityKey,
    #[serde(rename = "Property")]
    pub properties: Vec<Property>,
    #[serde(rename = "NavigationProperty")]
    pub navigation_properties: Vec<NavigationProperty>,
}

#[derive(Debug, serde::Serialize)]
pub struct EntityKey {
    #[serde(rename = "PropertyRef")]
    key: Vec<PropertyRef>,
}

impl EntityKey {
    pub fn new(key: Vec<PropertyRef>) -> Self {
        Self { key }
    }
}

#[derive(Debug, serde::Serialize)]
pub struct PropertyRef {
    #[serde(rename = "@Name")]
    pub name: String,
}

/// See: https://www.odata.org/documentation/odata-version-3-0/common-schema-definition-language-csdl/
#[derive(Debug, serde::Serialize)]
pub struct Property {
    #[serde(rename = "@Name")]
    pub name: String,
    #[serde(rename = "@Type")]
    pub typ: String,
    #[serde(rename = "@Nullable")]
    pub nullable: bool,
}

impl Property {
    pub fn from_def(def: &model::PropertyDef) -> Self {
        Self {
            name: def.name.clone(),
            typ: def.typ.edm_name(),
            nullable: def.nullable,
        }
    }
}

#[derive(Debug, serde::Serialize)]
pub struct NavigationProperty {
    #[serde(rename = "@Name")]
    pub name: String,
    #[serde(rename = "@Relationship")]
    pub relationship: String,
    #[serde(rename = "@FromRole")]
    pub from_role: String,
    #[serde(rename = "@ToRole")]
    pub to_role: String,
}

#[derive(Debug, serde::Serialize)]
pub struct ComplexType {
    #[serde(rename = "@Name")]
    pub name: String,
    #[serde(rename = "Property")]
    pub properties: Vec<Property>,
}

#[derive(Debug, serde::Serialize)]
pub struct Association {
    #[serde(rename = "@Name")]
    pub name: String,
    #[serde(rename = "End")]
    pub ends: Vec<AssociationEnd>,
}

#[derive(Debug, serde::Serialize)]
pub struct AssociationEnd {
    #[serde(rename = "@Type")]
    pub typ: String,
    #[serde(rename = "@Role")]
    pub role: String,
    #[serde(rename = "@Multiplicity")]
    pub multiplicity: String,
}

// <EntityContainer Name="DemoService" m:IsDefaultEntityContainer="true">
//   <EntitySet Name="Products" EntityType="ODataDemo.Product"/>
//   <AssociationSet Name="Products_Category" Association="ODataDemo.Product_Category">

#[derive(Debug, serde::Serialize)]
pub struct EntityContainer {
    #[serde(rename = "@Name")]
    pub name: String,
    #[serde(rename = "@m:IsDefaultEntityContainer")]
    pub is_default: bool,
    #[serde(rename = "EntitySet")]
    pub entity_set: Vec<EntitySet>,
    #[serde(rename = "AssociationSet")]
    pub association_sets: Vec<AssociationSet>,
}

#[derive(Debug, serde::Serialize)]
pub struct EntitySet {
    #[serde(rename = "@Name")]
    pub name: String,
    #[serde(rename = "@EntityType")]
    pub entity_type: String,
}

#[derive(Debug, serde::Serialize)]
pub struct AssociationSet {
    #[serde(rename = "@Name")]
    pub name: String,
    #[serde(rename = "@Association")]
    pub association: String,
    #[serde(rename = "End")]
    pub ends: Vec<AssociationSetEnd>,
}

#[derive(Debug, serde::Serialize)]
pub struct AssociationSetEnd {
    #[serde(rename = "@Role")]
    pub role: String,
    #[serde(rename = "@EntitySet")]
    pub entity_set: String,
}
