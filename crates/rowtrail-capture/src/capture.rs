//! Mutation capture entry point.

use crate::columns::{eligible_columns, skip_set};
use crate::diff::{diff, ChangeSet};
use crate::error::{CaptureError, Result};
use crate::identity::resolve;
use crate::schema::SchemaProvider;
use crate::writer::{AuditSink, AuditWriter};
use rowtrail_common_log::spans::{capture_span, Timer};
use rowtrail_types::{
    ActorContext, AuditMode, Operation, RecordIdentity, RowImage, TableIdentity,
    TransactionContext,
};
use tracing::debug;

/// Configuration for change capture.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureConfig {
    /// Entry shape to write.
    pub mode: AuditMode,
    /// Columns excluded on every table, in addition to per-event skips.
    pub default_skip_columns: Vec<String>,
}

impl CaptureConfig {
    /// Config for `mode` with no global exclusions.
    pub fn new(mode: AuditMode) -> Self {
        Self {
            mode,
            default_skip_columns: Vec::new(),
        }
    }

    /// Add global exclusions.
    pub fn with_default_skip_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.default_skip_columns
            .extend(columns.into_iter().map(Into::into));
        self
    }
}

/// One insert, update or delete as delivered by the hosting hook.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationEvent {
    pub operation: Operation,
    pub table: TableIdentity,
    /// Row before the mutation; absent on insert.
    pub prior: Option<RowImage>,
    /// Row after the mutation; absent on delete.
    pub new: Option<RowImage>,
    /// Key override; `None` or empty means the table's primary key.
    pub key_columns: Option<Vec<String>>,
    /// Extra columns to exclude from auditing.
    pub skip_columns: Vec<String>,
    pub actor: ActorContext,
}

impl MutationEvent {
    fn new(
        operation: Operation,
        table: TableIdentity,
        prior: Option<RowImage>,
        new: Option<RowImage>,
    ) -> Self {
        Self {
            operation,
            table,
            prior,
            new,
            key_columns: None,
            skip_columns: Vec::new(),
            actor: ActorContext::default(),
        }
    }

    /// An insert of `new`.
    pub fn insert(table: TableIdentity, new: RowImage) -> Self {
        Self::new(Operation::Insert, table, None, Some(new))
    }

    /// An update from `prior` to `new`.
    pub fn update(table: TableIdentity, prior: RowImage, new: RowImage) -> Self {
        Self::new(Operation::Update, table, Some(prior), Some(new))
    }

    /// A delete of `prior`.
    pub fn delete(table: TableIdentity, prior: RowImage) -> Self {
        Self::new(Operation::Delete, table, Some(prior), None)
    }

    /// Override the key columns.
    pub fn with_key_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.key_columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    /// Exclude additional columns.
    pub fn with_skip_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skip_columns.extend(columns.into_iter().map(Into::into));
        self
    }

    /// Set the acting identity.
    pub fn with_actor(mut self, actor: ActorContext) -> Self {
        self.actor = actor;
        self
    }

    /// Check that the images present match the operation kind.
    pub fn validate(&self) -> Result<()> {
        let missing = if self.operation.has_prior_image() && self.prior.is_none() {
            Some("prior")
        } else if self.operation.has_new_image() && self.new.is_none() {
            Some("new")
        } else {
            None
        };

        match missing {
            Some(missing) => Err(CaptureError::InvalidEvent {
                table: self.table.clone(),
                operation: self.operation,
                missing,
            }),
            None => Ok(()),
        }
    }

    /// Image the record identity is read from: the prior row for deletes,
    /// the new row otherwise.
    fn identity_image(&self) -> Option<&RowImage> {
        match self.operation {
            Operation::Delete => self.prior.as_ref(),
            Operation::Insert | Operation::Update => self.new.as_ref(),
        }
    }
}

/// Result of one capture invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureOutcome {
    /// Encoded identity of the mutated record.
    pub record_id: String,
    /// Entries appended to the sink; zero when nothing auditable changed.
    pub entries_written: usize,
}

/// The change capture engine.
///
/// Holds no per-invocation state: every call re-reads the schema and works
/// only on its arguments, so one engine can serve concurrent mutations.
#[derive(Debug)]
pub struct ChangeCapture<P> {
    schema: P,
    config: CaptureConfig,
    writer: AuditWriter,
}

impl<P: SchemaProvider> ChangeCapture<P> {
    /// Create an engine over a schema provider.
    pub fn new(schema: P, config: CaptureConfig) -> Self {
        let writer = AuditWriter::new(config.mode);
        Self {
            schema,
            config,
            writer,
        }
    }

    /// The schema provider.
    pub fn schema(&self) -> &P {
        &self.schema
    }

    /// The active configuration.
    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Resolve the record identity and compute the change set of an event
    /// without writing anything.
    pub fn changes(&self, event: &MutationEvent) -> Result<(RecordIdentity, ChangeSet)> {
        event.validate()?;

        let empty = RowImage::new();
        let resolved = resolve(
            &self.schema,
            &event.table,
            event.key_columns.as_deref(),
            event.identity_image().unwrap_or(&empty),
        )?;

        let skip = skip_set(
            &resolved.key_columns,
            self.config
                .default_skip_columns
                .iter()
                .chain(&event.skip_columns),
        );
        let eligible = eligible_columns(&self.schema, &event.table, &skip)?;

        let changes = diff(
            event.operation,
            &eligible,
            event.prior.as_ref(),
            event.new.as_ref(),
        );
        Ok((resolved.identity, changes))
    }

    /// Capture one mutation into `sink`.
    ///
    /// Runs inline in the caller's transaction. Any error must abort that
    /// transaction; entries already appended are not rolled back here.
    pub fn on_mutate<S: AuditSink + ?Sized>(
        &self,
        event: &MutationEvent,
        transaction: &TransactionContext,
        sink: &mut S,
    ) -> Result<CaptureOutcome> {
        let span = capture_span(&event.table.to_string(), &event.operation.to_string());
        let _guard = span.enter();
        let timer = Timer::start("capture");

        let (identity, changes) = self.changes(event)?;

        let record_id = identity.as_str().to_string();
        if changes.is_empty() {
            debug!(record = %record_id, "no auditable change");
            timer.finish();
            return Ok(CaptureOutcome {
                record_id,
                entries_written: 0,
            });
        }

        let entries_written = self.writer.write(
            sink,
            &event.table,
            &identity,
            &changes,
            &event.actor,
            transaction,
        )?;

        debug!(
            record = %record_id,
            actor = %event.actor.identifier(),
            columns = changes.len(),
            entries_written,
            "mutation captured"
        );
        timer.finish();

        Ok(CaptureOutcome {
            record_id,
            entries_written,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Catalog, TableSchema};

    fn users() -> TableIdentity {
        TableIdentity::unqualified("users")
    }

    fn engine(mode: AuditMode) -> ChangeCapture<Catalog> {
        let catalog = Catalog::new().with_table(
            users(),
            TableSchema::new()
                .key_column("id")
                .column("name")
                .column("updated_at"),
        );
        ChangeCapture::new(catalog, CaptureConfig::new(mode))
    }

    #[test]
    fn test_event_missing_image_is_invalid() {
        let mut event = MutationEvent::insert(users(), RowImage::new().with("id", 1));
        event.new = None;

        let err = event.validate().unwrap_err();
        assert!(matches!(
            err,
            CaptureError::InvalidEvent { missing: "new", operation: Operation::Insert, .. }
        ));

        let mut sink = Vec::new();
        let err = engine(AuditMode::ColumnGrained)
            .on_mutate(&event, &TransactionContext::begin(), &mut sink)
            .unwrap_err();
        assert!(matches!(err, CaptureError::InvalidEvent { .. }));
        assert!(sink.is_empty());
    }

    #[test]
    fn test_delete_identity_comes_from_prior_image() {
        let event = MutationEvent::delete(users(), RowImage::new().with("id", 5).with("name", "x"));
        let (identity, changes) = engine(AuditMode::ColumnGrained).changes(&event).unwrap();
        assert_eq!(identity.as_str(), "5");
        assert_eq!(changes.len(), 1);
    }

    #[test]
    fn test_update_identity_comes_from_new_image() {
        let event = MutationEvent::update(
            users(),
            RowImage::new().with("id", 1).with("name", "a"),
            RowImage::new().with("id", 2).with("name", "a"),
        );
        let (identity, changes) = engine(AuditMode::ColumnGrained).changes(&event).unwrap();
        assert_eq!(identity.as_str(), "2");
        assert!(changes.is_empty());
    }

    #[test]
    fn test_default_skip_columns_apply_to_every_event() {
        let catalog = Catalog::new().with_table(
            users(),
            TableSchema::new().key_column("id").column("name").column("updated_at"),
        );
        let capture = ChangeCapture::new(
            catalog,
            CaptureConfig::new(AuditMode::ColumnGrained).with_default_skip_columns(["updated_at"]),
        );
        let event = MutationEvent::insert(
            users(),
            RowImage::new().with("id", 1).with("name", "a").with("updated_at", 10),
        );

        let mut sink = Vec::new();
        let outcome = capture
            .on_mutate(&event, &TransactionContext::begin(), &mut sink)
            .unwrap();
        assert_eq!(outcome.entries_written, 1);
        assert_eq!(sink[0].as_column().unwrap().column, "name");
    }
}
