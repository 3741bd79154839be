//! Audited mutations over SQLite.
//!
//! [`SqliteAuditStore`] runs the capture engine on the same connection as
//! the mutation it audits and inserts the resulting entries there, so a
//! rollback discards mutation and audit trail together. An entry that
//! cannot be inserted fails the mutation with
//! [`CaptureError::WriteFailure`].

use crate::database::introspect::{row_image, DecodeError, SqliteCatalog};
use crate::database::migration::{COLUMN_LOG_TABLE, ROW_LOG_TABLE};
use chrono::{DateTime, Utc};
use rowtrail_capture::{
    AuditRegistry, CaptureConfig, CaptureError, CaptureOutcome, ChangeCapture, MutationEvent,
    SinkError, TableRegistration,
};
use rowtrail_common_config::RowtrailConfig;
use rowtrail_common_log::spans::{record_error, store_span};
use rowtrail_types::{
    ActorContext, AuditEntry, Operation, RowImage, TableIdentity, TransactionContext,
    TransactionMarker, Value,
};
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteConnection, SqlitePool};
use sqlx::{Executor, Sqlite, Transaction};
use thiserror::Error;
use tracing::{debug, instrument, warn, Instrument};

/// Errors raised by audited mutations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("filter on {table} matched more than one row")]
    AmbiguousFilter { table: TableIdentity },

    #[error("update of {table} assigns no columns")]
    EmptyUpdate { table: TableIdentity },

    #[error("transaction {transaction} was aborted by an earlier failure and cannot commit")]
    Aborted { transaction: TransactionMarker },
}

impl StoreError {
    /// Whether the error may leave a mutation without its audit entries,
    /// so the enclosing transaction must not commit.
    pub fn aborts_transaction(&self) -> bool {
        matches!(
            self,
            StoreError::Capture(_) | StoreError::Database(_) | StoreError::Decode(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// A column-grained entry as stored.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct StoredColumnEntry {
    pub id: i64,
    pub logged_at: DateTime<Utc>,
    pub transaction_id: String,
    pub actor: Option<String>,
    pub client_addr: Option<String>,
    pub operation: String,
    pub schema_name: String,
    pub table_name: String,
    pub record_id: String,
    pub column_name: String,
    /// Canonical text of the prior value.
    pub old_value: Option<String>,
    /// Canonical text of the new value.
    pub new_value: Option<String>,
}

/// A row-grained entry as stored.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct StoredRowEntry {
    pub id: i64,
    pub logged_at: DateTime<Utc>,
    pub transaction_id: String,
    pub actor: Option<String>,
    pub client_addr: Option<String>,
    pub operation: String,
    pub schema_name: String,
    pub table_name: String,
    pub record_id: String,
    pub record: String,
    pub old_row: Option<String>,
    pub new_row: Option<String>,
}

impl StoredRowEntry {
    /// Prior image as JSON.
    pub fn old_row_json(&self) -> Option<serde_json::Value> {
        self.old_row.as_deref().and_then(|s| serde_json::from_str(s).ok())
    }

    /// New image as JSON.
    pub fn new_row_json(&self) -> Option<serde_json::Value> {
        self.new_row.as_deref().and_then(|s| serde_json::from_str(s).ok())
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn qualified(table: &TableIdentity) -> String {
    format!("{}.{}", quote_ident(&table.schema), quote_ident(&table.table))
}

/// `WHERE` clause matching every column of `filter`, NULL-safe.
fn where_clause(filter: &RowImage) -> String {
    if filter.is_empty() {
        return String::new();
    }
    let predicates: Vec<_> = filter
        .column_names()
        .map(|c| format!("{} IS ?", quote_ident(c)))
        .collect();
    format!(" WHERE {}", predicates.join(" AND "))
}

fn bind_value<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &'q Value,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Boolean(b) => query.bind(*b),
        Value::Integer(i) => query.bind(*i),
        Value::Real(r) => query.bind(*r),
        Value::Text(s) => query.bind(s.as_str()),
        Value::Blob(bytes) => query.bind(bytes.as_slice()),
        Value::Timestamp(ts) => query.bind(*ts),
        Value::Json(json) => query.bind(json.to_string()),
    }
}

fn bind_all<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    images: &[&'q RowImage],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for image in images {
        for (_, value) in image.iter() {
            query = bind_value(query, value);
        }
    }
    query
}

async fn insert_entry(conn: &mut SqliteConnection, entry: &AuditEntry) -> sqlx::Result<()> {
    let header = entry.header();
    let transaction_id = header.transaction.to_string();
    let client_addr = header.actor.client_addr.map(|addr| addr.to_string());

    match entry {
        AuditEntry::Column(column) => {
            sqlx::query(
                "INSERT INTO audit_column_log
                 (logged_at, transaction_id, actor, client_addr, operation,
                  schema_name, table_name, record_id, column_name, old_value, new_value)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(header.timestamp)
            .bind(transaction_id)
            .bind(header.actor.actor.as_deref())
            .bind(client_addr)
            .bind(header.operation.to_string())
            .bind(&header.table.schema)
            .bind(&header.table.table)
            .bind(&column.record_id)
            .bind(&column.column)
            .bind(column.old_value.as_ref().and_then(Value::to_text))
            .bind(column.new_value.as_ref().and_then(Value::to_text))
            .execute(&mut *conn)
            .await?;
        }
        AuditEntry::Row(row) => {
            sqlx::query(
                "INSERT INTO audit_row_log
                 (logged_at, transaction_id, actor, client_addr, operation,
                  schema_name, table_name, record_id, record, old_row, new_row)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(header.timestamp)
            .bind(transaction_id)
            .bind(header.actor.actor.as_deref())
            .bind(client_addr)
            .bind(header.operation.to_string())
            .bind(&header.table.schema)
            .bind(&header.table.table)
            .bind(&row.record_id)
            .bind(row.record.to_string())
            .bind(row.old_row.as_ref().map(|json| json.to_string()))
            .bind(row.new_row.as_ref().map(|json| json.to_string()))
            .execute(&mut *conn)
            .await?;
        }
    }
    Ok(())
}

/// Capture configuration plus the registered tables.
#[derive(Debug, Clone, Default)]
pub struct SqliteAuditStore {
    config: CaptureConfig,
    registry: AuditRegistry,
}

impl SqliteAuditStore {
    /// A store with no registered tables.
    pub fn new(config: CaptureConfig) -> Self {
        Self {
            config,
            registry: AuditRegistry::new(),
        }
    }

    /// Build a store from loaded configuration, registering every
    /// configured table against the live schema.
    pub async fn from_config(
        conn: &mut SqliteConnection,
        config: &RowtrailConfig,
    ) -> Result<Self> {
        let mut store = Self::new(config.capture_config());
        for registration in config.registrations() {
            store.register(conn, registration).await?;
        }
        Ok(store)
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    pub fn registry(&self) -> &AuditRegistry {
        &self.registry
    }

    /// Validate a registration against the live schema and add it.
    #[instrument(skip(self, conn, registration), fields(table = %registration.table))]
    pub async fn register(
        &mut self,
        conn: &mut SqliteConnection,
        registration: TableRegistration,
    ) -> Result<()> {
        let catalog = SqliteCatalog::snapshot(conn, &registration.table).await?;
        self.registry.register(&catalog, registration)?;
        Ok(())
    }

    /// Stop auditing a table.
    pub fn unregister(&mut self, table: &TableIdentity) -> bool {
        self.registry.unregister(table).is_some()
    }

    /// Capture `event` and insert its entries on `conn`.
    ///
    /// `conn` must be the connection carrying the mutation's transaction.
    pub async fn record(
        &self,
        conn: &mut SqliteConnection,
        event: &MutationEvent,
        transaction: &TransactionContext,
    ) -> Result<CaptureOutcome> {
        let span = store_span("record", &event.table.to_string());
        async move {
            let catalog = SqliteCatalog::snapshot(conn, &event.table).await?;
            let engine = ChangeCapture::new(&catalog, self.config.clone());

            let mut entries: Vec<AuditEntry> = Vec::new();
            let outcome = engine.on_mutate(event, transaction, &mut entries)?;

            for entry in &entries {
                insert_entry(conn, entry).await.map_err(|e| {
                    record_error(&e);
                    CaptureError::WriteFailure {
                        table: event.table.clone(),
                        source: SinkError::backend(e),
                    }
                })?;
            }

            Ok::<_, StoreError>(outcome)
        }
        .instrument(span)
        .await
    }

    /// Capture a mutation of `table` if it is registered.
    #[allow(clippy::too_many_arguments)]
    pub async fn capture(
        &self,
        conn: &mut SqliteConnection,
        table: &TableIdentity,
        operation: Operation,
        prior: Option<RowImage>,
        new: Option<RowImage>,
        actor: &ActorContext,
        transaction: &TransactionContext,
    ) -> Result<Option<CaptureOutcome>> {
        match self.registry.event(table, operation, prior, new, actor.clone()) {
            Some(event) => Ok(Some(self.record(conn, &event, transaction).await?)),
            None => {
                debug!(%table, %operation, "table not audited");
                Ok(None)
            }
        }
    }

    /// Begin an audited transaction.
    pub async fn begin(
        &self,
        pool: &SqlitePool,
        actor: ActorContext,
    ) -> Result<AuditedTransaction<'_>> {
        let tx = pool.begin().await?;
        let context = TransactionContext::begin();
        debug!(
            transaction = %context.marker,
            actor = %actor.identifier(),
            "audited transaction started"
        );
        Ok(AuditedTransaction {
            tx,
            context,
            actor,
            store: self,
            failed: false,
        })
    }

    /// Stored column-grained entries for `table`, oldest first.
    pub async fn column_entries<'e, E>(
        &self,
        executor: E,
        table: &TableIdentity,
    ) -> Result<Vec<StoredColumnEntry>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let sql = format!(
            "SELECT * FROM {} WHERE schema_name = ? AND table_name = ? ORDER BY id",
            COLUMN_LOG_TABLE
        );
        Ok(sqlx::query_as::<_, StoredColumnEntry>(&sql)
            .bind(&table.schema)
            .bind(&table.table)
            .fetch_all(executor)
            .await?)
    }

    /// Stored row-grained entries for `table`, oldest first.
    pub async fn row_entries<'e, E>(
        &self,
        executor: E,
        table: &TableIdentity,
    ) -> Result<Vec<StoredRowEntry>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let sql = format!(
            "SELECT * FROM {} WHERE schema_name = ? AND table_name = ? ORDER BY id",
            ROW_LOG_TABLE
        );
        Ok(sqlx::query_as::<_, StoredRowEntry>(&sql)
            .bind(&table.schema)
            .bind(&table.table)
            .fetch_all(executor)
            .await?)
    }
}

/// A database transaction whose mutations are audited in place.
///
/// Dropping it without [`commit`](Self::commit) rolls back both the
/// mutations and their audit entries. After any operation fails with an
/// error that [aborts the transaction](StoreError::aborts_transaction),
/// further operations are refused and `commit` rolls back instead.
pub struct AuditedTransaction<'s> {
    tx: Transaction<'static, Sqlite>,
    context: TransactionContext,
    actor: ActorContext,
    store: &'s SqliteAuditStore,
    failed: bool,
}

impl AuditedTransaction<'_> {
    pub fn context(&self) -> &TransactionContext {
        &self.context
    }

    pub fn actor(&self) -> &ActorContext {
        &self.actor
    }

    /// Whether an earlier failure has doomed this transaction.
    pub fn is_failed(&self) -> bool {
        self.failed
    }

    /// The underlying connection, for statements that need no auditing.
    pub fn connection(&mut self) -> &mut SqliteConnection {
        &mut self.tx
    }

    fn ensure_usable(&self) -> Result<()> {
        if self.failed {
            return Err(StoreError::Aborted {
                transaction: self.context.marker,
            });
        }
        Ok(())
    }

    fn settle<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if e.aborts_transaction() {
                warn!(
                    transaction = %self.context.marker,
                    error = %e,
                    "audited transaction aborted"
                );
                self.failed = true;
            }
        }
        result
    }

    /// Capture an externally applied mutation.
    pub async fn record(&mut self, event: &MutationEvent) -> Result<CaptureOutcome> {
        self.ensure_usable()?;
        let result = self.store.record(&mut self.tx, event, &self.context).await;
        self.settle(result)
    }

    async fn capture(
        &mut self,
        table: &TableIdentity,
        operation: Operation,
        prior: Option<RowImage>,
        new: Option<RowImage>,
    ) -> Result<Option<CaptureOutcome>> {
        self.store
            .capture(&mut self.tx, table, operation, prior, new, &self.actor, &self.context)
            .await
    }

    /// Insert `row` and audit it, returning the stored row.
    #[instrument(skip(self, row), fields(%table))]
    pub async fn insert(&mut self, table: &TableIdentity, row: &RowImage) -> Result<RowImage> {
        self.ensure_usable()?;
        let result = self.apply_insert(table, row).await;
        self.settle(result)
    }

    async fn apply_insert(&mut self, table: &TableIdentity, row: &RowImage) -> Result<RowImage> {
        let sql = if row.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES RETURNING *", qualified(table))
        } else {
            let columns: Vec<_> = row.column_names().map(quote_ident).collect();
            let placeholders = vec!["?"; columns.len()].join(", ");
            format!(
                "INSERT INTO {} ({}) VALUES ({}) RETURNING *",
                qualified(table),
                columns.join(", "),
                placeholders
            )
        };

        let stored = bind_all(sqlx::query(&sql), &[row])
            .fetch_one(&mut *self.tx)
            .await?;
        let new = row_image(&stored)?;

        self.capture(table, Operation::Insert, None, Some(new.clone()))
            .await?;
        Ok(new)
    }

    /// Apply `assignments` to the single row matching `filter` and audit it.
    ///
    /// Returns the updated row, or `None` if nothing matched.
    #[instrument(skip(self, filter, assignments), fields(%table))]
    pub async fn update(
        &mut self,
        table: &TableIdentity,
        filter: &RowImage,
        assignments: &RowImage,
    ) -> Result<Option<RowImage>> {
        self.ensure_usable()?;
        let result = self.apply_update(table, filter, assignments).await;
        self.settle(result)
    }

    async fn apply_update(
        &mut self,
        table: &TableIdentity,
        filter: &RowImage,
        assignments: &RowImage,
    ) -> Result<Option<RowImage>> {
        if assignments.is_empty() {
            return Err(StoreError::EmptyUpdate {
                table: table.clone(),
            });
        }

        let select = format!(
            "SELECT * FROM {}{} LIMIT 2",
            qualified(table),
            where_clause(filter)
        );
        let matched = bind_all(sqlx::query(&select), &[filter])
            .fetch_all(&mut *self.tx)
            .await?;
        let prior = match matched.as_slice() {
            [] => return Ok(None),
            [row] => row_image(row)?,
            _ => {
                return Err(StoreError::AmbiguousFilter {
                    table: table.clone(),
                })
            }
        };

        let sets: Vec<_> = assignments
            .column_names()
            .map(|c| format!("{} = ?", quote_ident(c)))
            .collect();
        let update = format!(
            "UPDATE {} SET {}{} RETURNING *",
            qualified(table),
            sets.join(", "),
            where_clause(filter)
        );
        let stored = bind_all(sqlx::query(&update), &[assignments, filter])
            .fetch_one(&mut *self.tx)
            .await?;
        let new = row_image(&stored)?;

        self.capture(table, Operation::Update, Some(prior), Some(new.clone()))
            .await?;
        Ok(Some(new))
    }

    /// Delete every row matching `filter` and audit each, returning the
    /// deleted rows.
    #[instrument(skip(self, filter), fields(%table))]
    pub async fn delete(
        &mut self,
        table: &TableIdentity,
        filter: &RowImage,
    ) -> Result<Vec<RowImage>> {
        self.ensure_usable()?;
        let result = self.apply_delete(table, filter).await;
        self.settle(result)
    }

    async fn apply_delete(
        &mut self,
        table: &TableIdentity,
        filter: &RowImage,
    ) -> Result<Vec<RowImage>> {
        let sql = format!(
            "DELETE FROM {}{} RETURNING *",
            qualified(table),
            where_clause(filter)
        );
        let deleted = bind_all(sqlx::query(&sql), &[filter])
            .fetch_all(&mut *self.tx)
            .await?;

        let mut rows = Vec::with_capacity(deleted.len());
        for row in &deleted {
            let prior = row_image(row)?;
            self.capture(table, Operation::Delete, Some(prior.clone()), None)
                .await?;
            rows.push(prior);
        }
        Ok(rows)
    }

    /// Commit the mutations together with their audit entries.
    ///
    /// A failed transaction is rolled back instead and reported as
    /// [`StoreError::Aborted`].
    pub async fn commit(self) -> Result<()> {
        if self.failed {
            self.tx.rollback().await?;
            warn!(transaction = %self.context.marker, "failed audited transaction rolled back");
            return Err(StoreError::Aborted {
                transaction: self.context.marker,
            });
        }
        self.tx.commit().await?;
        debug!(transaction = %self.context.marker, "audited transaction committed");
        Ok(())
    }

    /// Discard the mutations and their audit entries.
    pub async fn rollback(self) -> Result<()> {
        self.tx.rollback().await?;
        debug!(transaction = %self.context.marker, "audited transaction rolled back");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifiers_are_quoted() {
        assert_eq!(quote_ident("users"), "\"users\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(
            qualified(&TableIdentity::unqualified("users")),
            "\"main\".\"users\""
        );
    }

    #[test]
    fn test_where_clause_is_null_safe() {
        assert_eq!(where_clause(&RowImage::new()), "");
        let filter = RowImage::new().with("id", 1).with("tenant", Value::Null);
        assert_eq!(where_clause(&filter), " WHERE \"id\" IS ? AND \"tenant\" IS ?");
    }
}
