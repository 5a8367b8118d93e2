//! Static entity registry

use super::entity::{Entity, EntityExt, EntityRole};
use super::field::FieldType;
use crate::domain::{PipelineError, Result};
use std::collections::HashSet;

/// Ordered set of entity descriptors consulted by the orchestrator
#[derive(Clone)]
pub struct EntityRegistry {
    entities: Vec<&'static dyn Entity>,
}

impl std::fmt::Debug for EntityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.entities.iter().map(|e| e.table()))
            .finish()
    }
}

fn invalid(entity: &dyn Entity, message: impl Into<String>) -> PipelineError {
    PipelineError::Entity {
        table: entity.table().to_string(),
        message: message.into(),
    }
}

impl EntityRegistry {
    /// Builds a registry, validating every descriptor
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Entity`] for the first inconsistent descriptor.
    pub fn new(entities: Vec<&'static dyn Entity>) -> Result<Self> {
        let mut tables = HashSet::new();
        for entity in &entities {
            if !tables.insert(entity.table()) {
                return Err(invalid(*entity, "registered more than once"));
            }
            Self::validate(*entity)?;
        }
        Ok(Self { entities })
    }

    fn validate(entity: &dyn Entity) -> Result<()> {
        if entity.primary_key().is_empty() {
            return Err(invalid(entity, "no primary key fields"));
        }
        if let Some(id) = entity.batch_id_field()? {
            if id.field_type != FieldType::Int {
                return Err(invalid(
                    entity,
                    format!("batch id field {} must be an int", id.name),
                ));
            }
        }
        for field in entity.fields() {
            if field.is_timestamp_role()
                && !matches!(field.field_type, FieldType::Timestamp | FieldType::Date)
            {
                return Err(invalid(
                    entity,
                    format!("timestamp field {} has type {}", field.name, field.field_type),
                ));
            }
            if field.is_timestamp_role() && field.derived && field.expr.is_none() {
                return Err(invalid(
                    entity,
                    format!(
                        "derived timestamp field {} needs a source expression to feed the cursor",
                        field.name
                    ),
                ));
            }
            if entity.computed_columns().contains(&field.name) {
                return Err(invalid(
                    entity,
                    format!("{} is both a field and a computed column", field.name),
                ));
            }
        }
        if entity.role() == EntityRole::Denylist && !entity.should_replace() {
            return Err(invalid(entity, "denylist entities must replace their table"));
        }
        if let Some(marker) = entity.updated_marker() {
            if marker.columns.is_empty() {
                return Err(invalid(entity, "updated marker declares no columns"));
            }
            if entity.field_index(marker.key).is_none() {
                return Err(invalid(
                    entity,
                    format!("updated marker key {} is not a field", marker.key),
                ));
            }
        }
        if let Some(indirection) = entity.timestamp_indirection() {
            if indirection.columns.is_empty() {
                return Err(invalid(entity, "timestamp indirection declares no columns"));
            }
            if entity.field_index(indirection.key).is_none() {
                return Err(invalid(
                    entity,
                    format!("timestamp indirection key {} is not a field", indirection.key),
                ));
            }
        }
        Ok(())
    }

    pub fn entities(&self) -> &[&'static dyn Entity] {
        &self.entities
    }

    pub fn find(&self, table: &str) -> Option<&'static dyn Entity> {
        self.entities.iter().copied().find(|e| e.table() == table)
    }

    pub fn with_role(&self, role: EntityRole) -> Vec<&'static dyn Entity> {
        self.entities
            .iter()
            .copied()
            .filter(|e| e.role() == role)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::partition::PartitionGroup;
    use crate::model::{FieldSpec, QueryContext};

    struct NoKey;

    const NO_KEY_FIELDS: &[FieldSpec] = &[FieldSpec::text("value")];
    const DENYLIST_FIELDS: &[FieldSpec] = &[FieldSpec::text("bene_mbi_id").primary_key()];

    impl Entity for NoKey {
        fn table(&self) -> &'static str {
            "idr.no_key"
        }
        fn fields(&self) -> &'static [FieldSpec] {
            NO_KEY_FIELDS
        }
        fn role(&self) -> EntityRole {
            EntityRole::Auxiliary
        }
        fn partition_groups(&self) -> &'static [PartitionGroup] {
            &[]
        }
        fn fetch_query(&self, _ctx: &QueryContext<'_>) -> String {
            String::new()
        }
    }

    struct MergingDenylist;

    impl Entity for MergingDenylist {
        fn table(&self) -> &'static str {
            "idr.merging_denylist"
        }
        fn fields(&self) -> &'static [FieldSpec] {
            DENYLIST_FIELDS
        }
        fn role(&self) -> EntityRole {
            EntityRole::Denylist
        }
        fn partition_groups(&self) -> &'static [PartitionGroup] {
            &[]
        }
        fn fetch_query(&self, _ctx: &QueryContext<'_>) -> String {
            String::new()
        }
    }

    struct Overshare;

    impl Entity for Overshare {
        fn table(&self) -> &'static str {
            "idr.overshare"
        }
        fn fields(&self) -> &'static [FieldSpec] {
            DENYLIST_FIELDS
        }
        fn role(&self) -> EntityRole {
            EntityRole::Denylist
        }
        fn partition_groups(&self) -> &'static [PartitionGroup] {
            &[]
        }
        fn fetch_query(&self, _ctx: &QueryContext<'_>) -> String {
            String::new()
        }
        fn should_replace(&self) -> bool {
            true
        }
    }

    #[test]
    fn test_accepts_valid_entities() {
        let registry = EntityRegistry::new(vec![&Overshare as &dyn Entity]).unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry.find("idr.overshare").is_some());
        assert_eq!(registry.with_role(EntityRole::Denylist).len(), 1);
    }

    #[test]
    fn test_rejects_missing_primary_key() {
        let err = EntityRegistry::new(vec![&NoKey as &dyn Entity]).unwrap_err();
        assert!(err.to_string().contains("no primary key"));
    }

    #[test]
    fn test_rejects_merging_denylist() {
        let err = EntityRegistry::new(vec![&MergingDenylist as &dyn Entity]).unwrap_err();
        assert!(err.to_string().contains("must replace"));
    }

    #[test]
    fn test_rejects_duplicates() {
        let err =
            EntityRegistry::new(vec![&Overshare as &dyn Entity, &Overshare]).unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }
}
