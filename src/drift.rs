//! Drift detection
//!
//! Answers "are there pending, unauthored schema changes" by comparing the
//! live schema against the registered target models. Used to gate whether
//! `upgrade` should auto-author a new revision before applying.

use crate::backend::SchemaBackend;
use crate::diff::{DiffEngine, DiffSignal};
use crate::error::MigrateResult;
use crate::registry::ModelRegistry;
use tracing::debug;

pub struct DriftDetector<'a> {
    registry: &'a ModelRegistry,
}

impl<'a> DriftDetector<'a> {
    pub fn new(registry: &'a ModelRegistry) -> Self {
        Self { registry }
    }

    /// The raw comparison signal. Pending changes are a data value, not a
    /// failure; only backend access errors propagate.
    pub async fn pending(&self, backend: &dyn SchemaBackend) -> MigrateResult<DiffSignal> {
        let live = backend.snapshot().await?;
        let signal = DiffEngine::compare(self.registry.table_defs(), &live.tables);
        if let DiffSignal::Changes(ref description) = signal {
            debug!("Pending schema changes: {}", description);
        }
        Ok(signal)
    }

    /// `true` when the live schema and the target model definitions disagree.
    pub async fn has_pending_changes(&self, backend: &dyn SchemaBackend) -> MigrateResult<bool> {
        Ok(matches!(self.pending(backend).await?, DiffSignal::Changes(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::MockBackend;
    use crate::schema::{ColumnDef, TableDef};

    fn registry_with(names: &[&str]) -> ModelRegistry {
        let mut builder = ModelRegistry::builder();
        for name in names {
            builder = builder
                .register(TableDef {
                    schema: "public".to_string(),
                    name: name.to_string(),
                    columns: vec![ColumnDef {
                        name: "id".to_string(),
                        data_type: "integer".to_string(),
                        nullable: false,
                        default_value: None,
                        primary_key: true,
                    }],
                })
                .unwrap();
        }
        builder.build().unwrap()
    }

    #[tokio::test]
    async fn test_no_pending_changes_when_schemas_agree() {
        let registry = registry_with(&["users"]);
        let backend = MockBackend::with_tables(&["users"]);

        let detector = DriftDetector::new(&registry);
        assert!(!detector.has_pending_changes(&backend).await.unwrap());
    }

    #[tokio::test]
    async fn test_pending_changes_when_target_has_extra_table() {
        let registry = registry_with(&["users", "posts"]);
        let backend = MockBackend::with_tables(&["users"]);

        let detector = DriftDetector::new(&registry);
        assert!(detector.has_pending_changes(&backend).await.unwrap());
    }
}
