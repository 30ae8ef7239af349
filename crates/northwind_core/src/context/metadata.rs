//! Metadata-only context describing entity shapes for clients.
//!
//! Identity tables are left out of this context, so its entity set differs
//! from the operational context.

use crate::model::meta::{DataType, EntityKind, EntityMeta};
use log::debug;
use serde::Serialize;

const METADATA_VERSION: &str = "1.0";
const NAMESPACE: &str = "Northwind.Models";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MetadataDocument {
    metadata_version: &'static str,
    namespace: &'static str,
    entity_types: Vec<EntityTypeDoc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EntityTypeDoc {
    short_name: &'static str,
    namespace: &'static str,
    default_resource_name: &'static str,
    auto_generated_key_type: &'static str,
    key_properties: Vec<&'static str>,
    data_properties: Vec<DataPropertyDoc>,
    navigation_properties: Vec<NavigationPropertyDoc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DataPropertyDoc {
    name_on_server: &'static str,
    data_type: DataType,
    is_nullable: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    is_part_of_key: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    concurrency_mode: Option<&'static str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NavigationPropertyDoc {
    name_on_server: &'static str,
    entity_type_name: String,
    is_scalar: bool,
    foreign_key_names_on_server: &'static [&'static str],
}

/// Dedicated context producing the client metadata document.
#[derive(Debug, Clone)]
pub struct MetadataContextProvider {
    kinds: Vec<EntityKind>,
}

impl Default for MetadataContextProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataContextProvider {
    pub fn new() -> Self {
        Self {
            kinds: EntityKind::ALL
                .into_iter()
                .filter(|kind| kind.meta().exposed_in_metadata)
                .collect(),
        }
    }

    /// Entity types described by this context.
    pub fn entity_kinds(&self) -> &[EntityKind] {
        &self.kinds
    }

    /// Serializes the schema description as JSON.
    pub fn metadata(&self) -> Result<String, serde_json::Error> {
        let document = MetadataDocument {
            metadata_version: METADATA_VERSION,
            namespace: NAMESPACE,
            entity_types: self
                .kinds
                .iter()
                .map(|kind| self.entity_type_doc(kind.meta()))
                .collect(),
        };
        let text = serde_json::to_string(&document)?;
        debug!(
            "event=metadata module=context status=ok entity_types={} bytes={}",
            document.entity_types.len(),
            text.len()
        );
        Ok(text)
    }

    fn entity_type_doc(&self, meta: &'static EntityMeta) -> EntityTypeDoc {
        let data_properties = meta
            .columns
            .iter()
            .map(|column| DataPropertyDoc {
                name_on_server: column.property,
                data_type: column.data_type,
                is_nullable: column.nullable,
                is_part_of_key: meta.is_key(column.column),
                concurrency_mode: (meta.concurrency_column == Some(column.column))
                    .then_some("Fixed"),
            })
            .collect();

        let navigation_properties = meta
            .navigations
            .iter()
            .filter(|navigation| self.kinds.contains(&navigation.target))
            .map(|navigation| NavigationPropertyDoc {
                name_on_server: navigation.name,
                entity_type_name: format!("{}:#{NAMESPACE}", navigation.target.name()),
                is_scalar: navigation.is_scalar,
                foreign_key_names_on_server: navigation.foreign_keys,
            })
            .collect();

        EntityTypeDoc {
            short_name: meta.name,
            namespace: NAMESPACE,
            default_resource_name: meta.table,
            auto_generated_key_type: if meta.key_generated {
                "Identity"
            } else {
                "None"
            },
            key_properties: meta.key_columns().map(|column| column.property).collect(),
            data_properties,
            navigation_properties,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::MetadataContextProvider;
    use crate::model::meta::EntityKind;
    use serde_json::Value;

    #[test]
    fn metadata_context_excludes_identity_tables() {
        let provider = MetadataContextProvider::new();
        assert!(!provider.entity_kinds().contains(&EntityKind::User));
        assert!(provider.entity_kinds().contains(&EntityKind::Customer));
    }

    #[test]
    fn metadata_document_describes_keys_and_navigations() {
        let text = MetadataContextProvider::new()
            .metadata()
            .expect("metadata serializes");
        let document: Value = serde_json::from_str(&text).expect("metadata is json");

        let types = document["entityTypes"].as_array().expect("entity types");
        let order = types
            .iter()
            .find(|entity| entity["shortName"] == "Order")
            .expect("order type");
        assert_eq!(order["autoGeneratedKeyType"], "Identity");
        assert_eq!(order["keyProperties"][0], "OrderID");
        let navigations = order["navigationProperties"]
            .as_array()
            .expect("order navigations");
        assert!(navigations
            .iter()
            .any(|nav| nav["nameOnServer"] == "OrderDetails" && nav["isScalar"] == false));
    }
}
