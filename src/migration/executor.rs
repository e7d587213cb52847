//! Migration executor for applying and reverting migrations.

use super::ledger;
use super::registry::MigrationRegistry;
use super::types::{
    LedgerEntry, MigrationDirection, MigrationError, MigrationReport, MigrationStatus,
};
use crate::store::{Store, Transaction};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Executor for running migrations against a store.
///
/// Each `migrate` or `rollback` call runs in exactly one transaction: either
/// every pending step and its ledger update commit together, or nothing does.
/// The executor assumes it is the only writer running migrations against
/// the store.
pub struct MigrationExecutor {
    registry: Arc<MigrationRegistry>,
}

impl MigrationExecutor {
    /// Create a new executor with the given registry.
    pub fn new(registry: Arc<MigrationRegistry>) -> Self {
        Self { registry }
    }

    /// Apply every migration missing from the ledger, in registry order.
    ///
    /// Running this twice with an unchanged registry performs nothing the
    /// second time. Appending migrations to the registry applies only those.
    pub async fn migrate(&self, store: &dyn Store) -> Result<MigrationReport, MigrationError> {
        info!("Performing migrations");

        let mut tx = store.begin().await?;
        let applied = match self.apply_pending(tx.as_mut()).await {
            Ok(applied) => applied,
            Err(e) => {
                discard(tx).await;
                return Err(e);
            }
        };

        tx.commit()
            .await
            .map_err(|source| MigrationError::CommitFailed {
                direction: MigrationDirection::Up,
                source,
            })?;

        info!(count = applied.len(), "Migration completed successfully");

        Ok(MigrationReport {
            direction: MigrationDirection::Up,
            migrations_applied: applied,
        })
    }

    /// Revert performed migrations strictly after `destination`, newest first.
    ///
    /// An empty destination reverts everything, the ledger table included.
    pub async fn rollback(
        &self,
        store: &dyn Store,
        destination: &str,
    ) -> Result<MigrationReport, MigrationError> {
        info!(destination = %destination, "Performing rollback");

        let first = if destination.is_empty() {
            0
        } else {
            self.registry
                .position(destination)
                .map(|index| index + 1)
                .ok_or_else(|| MigrationError::UnknownDestination(destination.to_string()))?
        };

        let mut tx = store.begin().await?;
        let reverted = match self.revert_from(tx.as_mut(), first).await {
            Ok(reverted) => reverted,
            Err(e) => {
                discard(tx).await;
                return Err(e);
            }
        };

        tx.commit()
            .await
            .map_err(|source| MigrationError::CommitFailed {
                direction: MigrationDirection::Down,
                source,
            })?;

        info!(count = reverted.len(), "Rollback completed successfully");

        Ok(MigrationReport {
            direction: MigrationDirection::Down,
            migrations_applied: reverted,
        })
    }

    /// Check that every registry migration has been performed.
    ///
    /// Fails with the first missing ID in registry order. Nothing is written.
    pub async fn ensure(&self, store: &dyn Store) -> Result<(), MigrationError> {
        let mut tx = store.begin().await?;
        let performed = ledger::load_performed(tx.as_mut(), &self.registry).await;
        discard(tx).await;
        let performed = performed?;

        if let Some(missing) = self
            .registry
            .migrations()
            .iter()
            .find(|m| !performed.contains(m.id()))
        {
            return Err(MigrationError::NotPerformed(missing.id().to_string()));
        }

        Ok(())
    }

    /// Report every registry migration with its ledger timestamp, if any.
    pub async fn status(&self, store: &dyn Store) -> Result<Vec<MigrationStatus>, MigrationError> {
        let mut tx = store.begin().await?;
        let entries = ledger::load_known_entries(tx.as_mut(), &self.registry).await;
        discard(tx).await;

        let performed: HashMap<String, LedgerEntry> = entries?
            .into_iter()
            .map(|entry| (entry.id.clone(), entry))
            .collect();

        Ok(self
            .registry
            .migrations()
            .iter()
            .map(|m| MigrationStatus {
                id: m.id().to_string(),
                description: m.description().to_string(),
                performed_at: performed.get(m.id()).map(|entry| entry.performed_at),
            })
            .collect())
    }

    async fn apply_pending(&self, tx: &mut dyn Transaction) -> Result<Vec<String>, MigrationError> {
        let performed = ledger::load_performed(tx, &self.registry).await?;
        let mut applied = Vec::new();

        for migration in self.registry.migrations() {
            if performed.contains(migration.id()) {
                continue;
            }

            info!(
                migration = %migration.id(),
                description = %migration.description(),
                "Applying migration"
            );

            if let Err(source) = migration.up(tx).await {
                error!(migration = %migration.id(), error = %source, "Migration failed");
                return Err(MigrationError::OperationFailed {
                    id: migration.id().to_string(),
                    direction: MigrationDirection::Up,
                    source,
                });
            }

            let entry = LedgerEntry {
                id: migration.id().to_string(),
                description: migration.description().to_string(),
                performed_at: Utc::now(),
            };
            ledger::record(tx, &entry)
                .await
                .map_err(|source| MigrationError::LedgerWrite {
                    id: entry.id.clone(),
                    source,
                })?;

            applied.push(entry.id);
        }

        Ok(applied)
    }

    async fn revert_from(
        &self,
        tx: &mut dyn Transaction,
        first: usize,
    ) -> Result<Vec<String>, MigrationError> {
        let performed = ledger::load_performed(tx, &self.registry).await?;
        let mut reverted = Vec::new();

        for migration in self.registry.migrations()[first..].iter().rev() {
            if !performed.contains(migration.id()) {
                continue;
            }

            info!(
                migration = %migration.id(),
                description = %migration.description(),
                "Rolling back migration"
            );

            if let Err(source) = migration.down(tx).await {
                error!(migration = %migration.id(), error = %source, "Rollback failed");
                return Err(MigrationError::OperationFailed {
                    id: migration.id().to_string(),
                    direction: MigrationDirection::Down,
                    source,
                });
            }

            // The ledger row went away together with its table
            if !migration.owns_ledger() {
                ledger::remove(tx, migration.id())
                    .await
                    .map_err(|source| MigrationError::LedgerWrite {
                        id: migration.id().to_string(),
                        source,
                    })?;
            }

            reverted.push(migration.id().to_string());
        }

        Ok(reverted)
    }
}

/// Roll back a transaction whose work must not persist.
async fn discard(tx: Box<dyn Transaction>) {
    if let Err(e) = tx.rollback().await {
        warn!(error = %e, "Failed to roll back transaction");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::ledger::{LEDGER_MIGRATION_ID, LEDGER_TABLE};
    use crate::migration::types::{Migration, SqlMigration};
    use crate::store::{Row, SqliteStore, StoreError, Value};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts forward and backward calls, optionally failing forward.
    struct CountingMigration {
        id: &'static str,
        fail_up: bool,
        ups: AtomicUsize,
        downs: AtomicUsize,
    }

    impl CountingMigration {
        fn new(id: &'static str) -> Arc<Self> {
            Arc::new(Self {
                id,
                fail_up: false,
                ups: AtomicUsize::new(0),
                downs: AtomicUsize::new(0),
            })
        }

        fn failing(id: &'static str) -> Arc<Self> {
            Arc::new(Self {
                id,
                fail_up: true,
                ups: AtomicUsize::new(0),
                downs: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Migration for CountingMigration {
        fn id(&self) -> &str {
            self.id
        }

        fn description(&self) -> &str {
            "Counting migration"
        }

        async fn up(&self, tx: &mut dyn Transaction) -> Result<(), StoreError> {
            self.ups.fetch_add(1, Ordering::SeqCst);
            if self.fail_up {
                tx.execute("INSERT INTO no_such_table VALUES (1)", &[])
                    .await?;
            }
            Ok(())
        }

        async fn down(&self, _tx: &mut dyn Transaction) -> Result<(), StoreError> {
            self.downs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Store whose transactions refuse to commit.
    struct CommitRefusingStore(SqliteStore);

    struct CommitRefusingTransaction(Box<dyn Transaction>);

    #[async_trait]
    impl Store for CommitRefusingStore {
        async fn begin(&self) -> Result<Box<dyn Transaction>, StoreError> {
            Ok(Box::new(CommitRefusingTransaction(self.0.begin().await?)))
        }
    }

    #[async_trait]
    impl Transaction for CommitRefusingTransaction {
        async fn table_exists(&mut self, name: &str) -> Result<bool, StoreError> {
            self.0.table_exists(name).await
        }

        async fn execute(&mut self, statement: &str, params: &[Value]) -> Result<u64, StoreError> {
            self.0.execute(statement, params).await
        }

        async fn query(
            &mut self,
            statement: &str,
            params: &[Value],
        ) -> Result<Vec<Row>, StoreError> {
            self.0.query(statement, params).await
        }

        async fn commit(self: Box<Self>) -> Result<(), StoreError> {
            self.0.rollback().await?;
            Err(StoreError::Decode("commit refused".to_string()))
        }

        async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
            self.0.rollback().await
        }
    }

    fn as_dyn(migration: &Arc<CountingMigration>) -> Arc<dyn Migration> {
        migration.clone()
    }

    fn executor(migrations: Vec<Arc<dyn Migration>>) -> MigrationExecutor {
        MigrationExecutor::new(Arc::new(
            MigrationRegistry::with_migrations(migrations).unwrap(),
        ))
    }

    fn table_migration(id: &str, table: &str) -> Arc<dyn Migration> {
        Arc::new(
            SqlMigration::new(id, format!("creates {table}"))
                .forward(format!("CREATE TABLE {table} (value TEXT PRIMARY KEY)"))
                .backward(format!("DROP TABLE {table}")),
        )
    }

    async fn table_exists(store: &SqliteStore, table: &str) -> bool {
        let mut tx = store.begin().await.unwrap();
        tx.table_exists(table).await.unwrap()
    }

    #[tokio::test]
    async fn test_migrate_is_idempotent() {
        let store = SqliteStore::in_memory().await.unwrap();
        let counting = CountingMigration::new("counted");
        let executor = executor(vec![as_dyn(&counting)]);

        let first = executor.migrate(&store).await.unwrap();
        assert_eq!(first.migrations_applied, vec![LEDGER_MIGRATION_ID, "counted"]);

        let ledger_before = executor.status(&store).await.unwrap();

        let second = executor.migrate(&store).await.unwrap();
        assert!(second.migrations_applied.is_empty());
        assert_eq!(counting.ups.load(Ordering::SeqCst), 1);
        assert_eq!(executor.status(&store).await.unwrap(), ledger_before);
    }

    #[tokio::test]
    async fn test_migrate_applies_only_new_tail() {
        let store = SqliteStore::in_memory().await.unwrap();
        let first = CountingMigration::new("first");
        executor(vec![as_dyn(&first)]).migrate(&store).await.unwrap();

        let second = CountingMigration::new("second");
        let report = executor(vec![as_dyn(&first), as_dyn(&second)])
            .migrate(&store)
            .await
            .unwrap();

        assert_eq!(report.migrations_applied, vec!["second"]);
        assert_eq!(first.ups.load(Ordering::SeqCst), 1);
        assert_eq!(second.ups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_migration_leaves_no_trace() {
        let store = SqliteStore::in_memory().await.unwrap();
        let executor = executor(vec![
            table_migration("t1", "t1"),
            as_dyn(&CountingMigration::failing("broken")),
        ]);

        let result = executor.migrate(&store).await;
        assert!(matches!(
            result,
            Err(MigrationError::OperationFailed { id, direction: MigrationDirection::Up, .. })
                if id == "broken"
        ));

        assert!(!table_exists(&store, "t1").await);
        assert!(!table_exists(&store, LEDGER_TABLE).await);
    }

    #[tokio::test]
    async fn test_commit_failure_is_distinct() {
        let store = SqliteStore::in_memory().await.unwrap();
        let refusing = CommitRefusingStore(store.clone());
        let executor = executor(vec![table_migration("t1", "t1")]);

        let result = executor.migrate(&refusing).await;
        assert!(matches!(
            result,
            Err(MigrationError::CommitFailed {
                direction: MigrationDirection::Up,
                ..
            })
        ));
        assert!(!table_exists(&store, "t1").await);
    }

    #[tokio::test]
    async fn test_rollback_commit_failure_is_distinct() {
        let store = SqliteStore::in_memory().await.unwrap();
        let executor = executor(vec![table_migration("t1", "t1")]);
        executor.migrate(&store).await.unwrap();

        let refusing = CommitRefusingStore(store.clone());
        let result = executor.rollback(&refusing, "").await;
        assert!(matches!(
            result,
            Err(MigrationError::CommitFailed {
                direction: MigrationDirection::Down,
                ..
            })
        ));

        assert!(table_exists(&store, "t1").await);
        executor.ensure(&store).await.unwrap();
    }

    #[tokio::test]
    async fn test_rollback_to_destination() {
        let store = SqliteStore::in_memory().await.unwrap();
        let executor = executor(vec![table_migration("a", "t1"), table_migration("b", "t2")]);
        executor.migrate(&store).await.unwrap();

        let report = executor.rollback(&store, "a").await.unwrap();
        assert_eq!(report.direction, MigrationDirection::Down);
        assert_eq!(report.migrations_applied, vec!["b"]);

        assert!(table_exists(&store, "t1").await);
        assert!(!table_exists(&store, "t2").await);
        assert!(matches!(
            executor.ensure(&store).await,
            Err(MigrationError::NotPerformed(id)) if id == "b"
        ));
    }

    #[tokio::test]
    async fn test_rollback_to_last_applied_is_noop() {
        let store = SqliteStore::in_memory().await.unwrap();
        let counting = CountingMigration::new("only");
        let executor = executor(vec![as_dyn(&counting)]);
        executor.migrate(&store).await.unwrap();

        let report = executor.rollback(&store, "only").await.unwrap();
        assert!(report.migrations_applied.is_empty());
        assert_eq!(counting.downs.load(Ordering::SeqCst), 0);
        executor.ensure(&store).await.unwrap();
    }

    #[tokio::test]
    async fn test_rollback_everything_drops_ledger() {
        let store = SqliteStore::in_memory().await.unwrap();
        let executor = executor(vec![table_migration("a", "t1")]);
        executor.migrate(&store).await.unwrap();

        let report = executor.rollback(&store, "").await.unwrap();
        assert_eq!(report.migrations_applied, vec!["a", LEDGER_MIGRATION_ID]);

        assert!(!table_exists(&store, "t1").await);
        assert!(!table_exists(&store, LEDGER_TABLE).await);
    }

    #[tokio::test]
    async fn test_rollback_skips_unperformed() {
        let store = SqliteStore::in_memory().await.unwrap();
        let applied = CountingMigration::new("applied");
        executor(vec![as_dyn(&applied)]).migrate(&store).await.unwrap();

        let pending = CountingMigration::new("pending");
        let executor = executor(vec![as_dyn(&applied), as_dyn(&pending)]);
        let report = executor.rollback(&store, LEDGER_MIGRATION_ID).await.unwrap();

        assert_eq!(report.migrations_applied, vec!["applied"]);
        assert_eq!(pending.downs.load(Ordering::SeqCst), 0);
        assert_eq!(applied.downs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rollback_unknown_destination() {
        let store = SqliteStore::in_memory().await.unwrap();
        let executor = executor(vec![table_migration("a", "t1")]);
        executor.migrate(&store).await.unwrap();

        let result = executor.rollback(&store, "nonexistent").await;
        assert!(matches!(
            result,
            Err(MigrationError::UnknownDestination(id)) if id == "nonexistent"
        ));
        assert!(table_exists(&store, "t1").await);
    }

    #[tokio::test]
    async fn test_unknown_ledger_entry_blocks_migrate_and_rollback() {
        let store = SqliteStore::in_memory().await.unwrap();
        executor(vec![table_migration("a", "t1")])
            .migrate(&store)
            .await
            .unwrap();

        let stale = executor(vec![]);
        assert!(matches!(
            stale.migrate(&store).await,
            Err(MigrationError::UnknownLedgerEntry(id)) if id == "a"
        ));
        assert!(matches!(
            stale.rollback(&store, "").await,
            Err(MigrationError::UnknownLedgerEntry(id)) if id == "a"
        ));
        assert!(table_exists(&store, LEDGER_TABLE).await);
    }

    #[tokio::test]
    async fn test_ensure_reports_first_missing() {
        let store = SqliteStore::in_memory().await.unwrap();
        let executor = executor(vec![table_migration("a", "t1"), table_migration("b", "t2")]);

        assert!(matches!(
            executor.ensure(&store).await,
            Err(MigrationError::NotPerformed(id)) if id == LEDGER_MIGRATION_ID
        ));

        executor.migrate(&store).await.unwrap();
        executor.ensure(&store).await.unwrap();
    }

    #[tokio::test]
    async fn test_status_lists_registry() {
        let store = SqliteStore::in_memory().await.unwrap();
        executor(vec![table_migration("a", "t1")])
            .migrate(&store)
            .await
            .unwrap();

        let executor = executor(vec![table_migration("a", "t1"), table_migration("b", "t2")]);
        let status = executor.status(&store).await.unwrap();

        assert_eq!(status.len(), 3);
        assert_eq!(status[0].id, LEDGER_MIGRATION_ID);
        assert!(status[0].performed_at.is_some());
        assert_eq!(status[1].id, "a");
        assert!(status[1].performed_at.is_some());
        assert_eq!(status[2].id, "b");
        assert!(status[2].performed_at.is_none());
    }
}
