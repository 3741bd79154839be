//! End-to-end capture scenarios against an in-memory catalog and audit log.

use rowtrail_capture::{
    ActorContext, AuditEntry, AuditMode, AuditRegistry, AuditSink, CaptureConfig, CaptureError,
    Catalog, ChangeCapture, MemoryAuditLog, MutationEvent, Operation, RowImage, SinkError,
    TableIdentity, TableRegistration, TableSchema, TransactionContext, Value,
};
use serde_json::json;

fn users() -> TableIdentity {
    TableIdentity::unqualified("users")
}

fn memberships() -> TableIdentity {
    TableIdentity::unqualified("memberships")
}

fn catalog() -> Catalog {
    Catalog::new()
        .with_table(
            users(),
            TableSchema::new()
                .key_column("id")
                .column("name")
                .column("updated_at"),
        )
        .with_table(
            memberships(),
            TableSchema::new()
                .column("user_id")
                .column("account_id")
                .column("company_id")
                .column("role"),
        )
}

fn capture(mode: AuditMode) -> ChangeCapture<Catalog> {
    ChangeCapture::new(catalog(), CaptureConfig::new(mode))
}

fn run(mode: AuditMode, event: &MutationEvent) -> Vec<AuditEntry> {
    let mut sink = Vec::new();
    capture(mode)
        .on_mutate(event, &TransactionContext::begin(), &mut sink)
        .unwrap();
    sink
}

#[test]
fn test_insert_column_grained() {
    let event = MutationEvent::insert(users(), RowImage::new().with("id", 1).with("name", "a"));

    let entries = run(AuditMode::ColumnGrained, &event);

    assert_eq!(entries.len(), 1);
    let entry = entries[0].as_column().unwrap();
    assert_eq!(entry.header.operation, Operation::Insert);
    assert_eq!(entry.record_id, "1");
    assert_eq!(entry.column, "name");
    assert_eq!(entry.old_value, None);
    assert_eq!(entry.new_value, Some(Value::from("a")));
}

#[test]
fn test_insert_row_grained() {
    let event = MutationEvent::insert(users(), RowImage::new().with("id", 1).with("name", "a"));

    let entries = run(AuditMode::RowGrained, &event);

    assert_eq!(entries.len(), 1);
    let entry = entries[0].as_row().unwrap();
    assert_eq!(entry.record, json!({"id": 1}));
    assert_eq!(entry.old_row, None);
    assert_eq!(entry.new_row, Some(json!({"name": "a", "updated_at": null})));
}

#[test]
fn test_update_single_column() {
    let event = MutationEvent::update(
        users(),
        RowImage::new().with("id", 1).with("name", "a"),
        RowImage::new().with("id", 1).with("name", "b"),
    );

    let entries = run(AuditMode::ColumnGrained, &event);

    assert_eq!(entries.len(), 1);
    let entry = entries[0].as_column().unwrap();
    assert_eq!(entry.column, "name");
    assert_eq!(entry.old_value, Some(Value::from("a")));
    assert_eq!(entry.new_value, Some(Value::from("b")));
}

#[test]
fn test_update_of_skipped_column_writes_nothing() {
    let event = MutationEvent::update(
        users(),
        RowImage::new().with("id", 1).with("name", "a").with("updated_at", 1),
        RowImage::new().with("id", 1).with("name", "a").with("updated_at", 2),
    )
    .with_skip_columns(["updated_at"]);

    for mode in AuditMode::all() {
        let mut sink = Vec::new();
        let outcome = capture(mode)
            .on_mutate(&event, &TransactionContext::begin(), &mut sink)
            .unwrap();
        assert_eq!(outcome.entries_written, 0);
        assert!(sink.is_empty());
    }
}

#[test]
fn test_delete_one_entry_per_non_null_column() {
    let event = MutationEvent::delete(
        users(),
        RowImage::new()
            .with("id", 1)
            .with("name", "a")
            .with("updated_at", Value::Null),
    );

    let entries = run(AuditMode::ColumnGrained, &event);

    assert_eq!(entries.len(), 1);
    let entry = entries[0].as_column().unwrap();
    assert_eq!(entry.header.operation, Operation::Delete);
    assert_eq!(entry.column, "name");
    assert_eq!(entry.old_value, Some(Value::from("a")));
    assert_eq!(entry.new_value, None);
}

#[test]
fn test_explicit_multi_column_key_with_null_member() {
    let key = ["user_id", "account_id", "company_id"];
    let row = |company: Value| {
        RowImage::new()
            .with("user_id", 7)
            .with("account_id", 3)
            .with("company_id", company)
            .with("role", "admin")
    };
    let identity_of = |company: Value| {
        let event = MutationEvent::insert(memberships(), row(company)).with_key_columns(key);
        let mut sink = Vec::new();
        capture(AuditMode::ColumnGrained)
            .on_mutate(&event, &TransactionContext::begin(), &mut sink)
            .unwrap()
            .record_id
    };

    let null_id = identity_of(Value::Null);
    assert_eq!(null_id, "7|3|\\N");
    assert_ne!(null_id, identity_of(Value::Integer(0)));
    assert_ne!(null_id, identity_of(Value::from("")));
}

#[test]
fn test_keyless_table_without_explicit_key_fails() {
    let event = MutationEvent::insert(memberships(), RowImage::new().with("role", "admin"));
    let mut sink = Vec::new();

    let err = capture(AuditMode::ColumnGrained)
        .on_mutate(&event, &TransactionContext::begin(), &mut sink)
        .unwrap_err();

    assert!(matches!(err, CaptureError::NoIdentityColumns { .. }));
    assert!(sink.is_empty());
}

#[test]
fn test_unknown_table_fails() {
    let event = MutationEvent::insert(TableIdentity::new("archive", "users"), RowImage::new());
    let mut sink = Vec::new();

    let err = capture(AuditMode::RowGrained)
        .on_mutate(&event, &TransactionContext::begin(), &mut sink)
        .unwrap_err();

    assert!(matches!(err, CaptureError::UnknownTable { .. }));
}

#[test]
fn test_entries_share_transaction_and_actor() {
    let log = MemoryAuditLog::new();
    let mut txn = log.begin();
    let context = *txn.context();
    let actor = ActorContext::new("alice").with_client_addr("10.0.0.5".parse().unwrap());
    let engine = capture(AuditMode::ColumnGrained);

    for id in 1..=3 {
        let event = MutationEvent::insert(
            users(),
            RowImage::new().with("id", id).with("name", "n").with("updated_at", 0),
        )
        .with_actor(actor.clone());
        engine.on_mutate(&event, &context, &mut txn).unwrap();
    }
    assert_eq!(txn.commit(), 6);

    let entries = log.entries();
    assert_eq!(entries.len(), 6);
    for entry in &entries {
        assert_eq!(entry.header().transaction, context.marker);
        assert_eq!(entry.header().timestamp, context.started_at);
        assert_eq!(entry.header().actor, actor);
    }
}

#[test]
fn test_rolled_back_transaction_leaves_no_entries() {
    let log = MemoryAuditLog::new();
    let engine = capture(AuditMode::RowGrained);

    let mut txn = log.begin();
    let context = *txn.context();
    let event = MutationEvent::insert(users(), RowImage::new().with("id", 1).with("name", "a"));
    engine.on_mutate(&event, &context, &mut txn).unwrap();
    assert_eq!(txn.pending().len(), 1);
    txn.rollback();

    assert!(log.is_empty());
}

struct FailAfter {
    accepted: Vec<AuditEntry>,
    limit: usize,
}

impl AuditSink for FailAfter {
    fn append(&mut self, entry: AuditEntry) -> Result<(), SinkError> {
        if self.accepted.len() >= self.limit {
            return Err(SinkError::Rejected("audit table constraint".into()));
        }
        self.accepted.push(entry);
        Ok(())
    }
}

#[test]
fn test_write_failure_is_fatal() {
    let event = MutationEvent::insert(
        users(),
        RowImage::new().with("id", 1).with("name", "a").with("updated_at", 5),
    );
    let mut sink = FailAfter {
        accepted: Vec::new(),
        limit: 1,
    };

    let err = capture(AuditMode::ColumnGrained)
        .on_mutate(&event, &TransactionContext::begin(), &mut sink)
        .unwrap_err();

    match err {
        CaptureError::WriteFailure { table, source } => {
            assert_eq!(table, users());
            assert!(matches!(source, SinkError::Rejected(_)));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_registry_driven_capture() {
    let catalog = catalog();
    let mut registry = AuditRegistry::new();
    registry
        .register(
            &catalog,
            TableRegistration::new(users()).with_skip_columns(["updated_at"]),
        )
        .unwrap();
    let engine = ChangeCapture::new(&catalog, CaptureConfig::new(AuditMode::ColumnGrained));

    let event = registry
        .event(
            &users(),
            Operation::Update,
            Some(RowImage::new().with("id", 1).with("name", "a").with("updated_at", 1)),
            Some(RowImage::new().with("id", 1).with("name", "b").with("updated_at", 2)),
            ActorContext::new("ops"),
        )
        .unwrap();

    let mut sink = Vec::new();
    let outcome = engine
        .on_mutate(&event, &TransactionContext::begin(), &mut sink)
        .unwrap();
    assert_eq!(outcome.entries_written, 1);
    assert_eq!(sink[0].as_column().unwrap().column, "name");
}

#[test]
fn test_schema_change_is_picked_up() {
    let mut catalog = catalog();
    let event = MutationEvent::insert(
        users(),
        RowImage::new().with("id", 1).with("name", "a").with("email", "a@x"),
    );

    let mut sink = Vec::new();
    ChangeCapture::new(&catalog, CaptureConfig::default())
        .on_mutate(&event, &TransactionContext::begin(), &mut sink)
        .unwrap();
    assert_eq!(sink.len(), 1);

    catalog.define(
        users(),
        TableSchema::new()
            .key_column("id")
            .column("name")
            .column("email")
            .column("updated_at"),
    );
    let mut sink = Vec::new();
    ChangeCapture::new(&catalog, CaptureConfig::default())
        .on_mutate(&event, &TransactionContext::begin(), &mut sink)
        .unwrap();
    assert_eq!(sink.len(), 2);
}
