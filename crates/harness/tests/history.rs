use tempora_core::{
    schema::{ColumnType, CREATION_TIME, EDITION_TIME},
    FieldValue, Interval, Row, TableSchema, Timestamp,
};
use tempora_harness::{init_tracing, text_row, TestDb};
use tempora_storage::TrackingRow;

type TestResult = Result<(), Box<dyn std::error::Error>>;

// ============================================================================
// Tables with their own edition_time
// ============================================================================

#[test]
fn insert_with_time_column_writes_no_history() -> TestResult {
    init_tracing();
    let mut db = TestDb::new()?;
    let (pk, outcome) = db.add_class("neuron")?;

    let row = db.engine.get("class", &pk)?.expect("row exists");
    assert_eq!(row[EDITION_TIME], FieldValue::Timestamp(outcome.at));
    assert_eq!(row[CREATION_TIME], FieldValue::Timestamp(outcome.at));
    assert_eq!(db.history_len("class")?, 0);
    assert!(db.engine.tracking_rows("class")?.is_empty());
    Ok(())
}

#[test]
fn update_with_time_column_archives_prior_image() -> TestResult {
    let mut db = TestDb::new()?;
    let (pk, created) = db.add_class("neuron")?;
    let renamed = db.rename_class(&pk, "synapse")?;

    assert_eq!(renamed.archived, 1);
    let history = db.engine.history("class", &pk)?;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].row["class_name"], FieldValue::Text("neuron".into()));
    assert_eq!(history[0].sys_period, Interval::closed(created.at, renamed.at)?);

    let row = db.engine.get("class", &pk)?.expect("row exists");
    assert_eq!(row[EDITION_TIME], FieldValue::Timestamp(renamed.at));
    assert_eq!(row[CREATION_TIME], FieldValue::Timestamp(created.at));
    Ok(())
}

#[test]
fn history_rows_mirror_every_live_column() -> TestResult {
    let mut db = TestDb::new()?;
    let (pk, _) = db.add_class("neuron")?;
    db.rename_class(&pk, "synapse")?;

    let archived = &db.engine.history("class", &pk)?[0].row;
    let columns: Vec<&str> = archived.keys().map(String::as_str).collect();
    assert_eq!(columns, ["class_name", "creation_time", "description", "edition_time", "id"]);
    assert_eq!(archived["description"], FieldValue::Null);
    Ok(())
}

#[test]
fn successive_updates_produce_contiguous_periods() -> TestResult {
    let mut db = TestDb::new()?;
    let (pk, created) = db.add_class("v0")?;
    let mut last = created.at;
    for name in ["v1", "v2", "v3"] {
        last = db.rename_class(&pk, name)?.at;
    }

    let history = db.engine.history("class", &pk)?;
    assert_eq!(history.len(), 3);
    assert_eq!(history[0].sys_period.start(), created.at);
    for pair in history.windows(2) {
        assert!(pair[0].sys_period.is_adjacent_to(&pair[1].sys_period));
    }
    assert_eq!(history[2].sys_period.end(), Some(last));
    let names: Vec<_> = history.iter().map(|h| h.row["class_name"].clone()).collect();
    assert_eq!(
        names,
        ["v0", "v1", "v2"].map(|n| FieldValue::Text(n.into()))
    );
    Ok(())
}

#[test]
fn delete_archives_final_image() -> TestResult {
    let mut db = TestDb::new()?;
    let (pk, created) = db.add_class("neuron")?;
    let deleted = db.engine.delete("class", &pk)?;

    assert!(db.engine.get("class", &pk)?.is_none());
    let history = db.engine.history("class", &pk)?;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].sys_period, Interval::closed(created.at, deleted.at)?);
    Ok(())
}

// ============================================================================
// Tables tracked through <live>__tracking
// ============================================================================

#[test]
fn insert_without_time_column_creates_tracking_row() -> TestResult {
    let mut db = TestDb::new()?;
    let (pk, outcome) = db.add_project("connectome")?;

    assert_eq!(
        db.engine.tracking_rows("project")?,
        vec![TrackingRow {
            live_pk: pk,
            edition_time: outcome.at
        }]
    );
    assert_eq!(db.history_len("project")?, 0);
    Ok(())
}

#[test]
fn update_without_time_column_uses_tracking_time() -> TestResult {
    let mut db = TestDb::new()?;
    let (pk, created) = db.add_project("draft")?;
    let first = db.retitle_project(&pk, "review")?;
    let second = db.retitle_project(&pk, "final")?;

    let history = db.engine.history("project", &pk)?;
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].sys_period, Interval::closed(created.at, first.at)?);
    assert_eq!(history[1].sys_period, Interval::closed(first.at, second.at)?);
    assert_eq!(history[1].row["title"], FieldValue::Text("review".into()));
    assert_eq!(db.engine.tracking_rows("project")?[0].edition_time, second.at);
    assert_eq!(db.engine.edition_time("project", &pk)?, Some(second.at));
    Ok(())
}

#[test]
fn delete_without_time_column_removes_tracking_row() -> TestResult {
    let mut db = TestDb::new()?;
    let (keep, _) = db.add_project("keep")?;
    let (gone, created) = db.add_project("gone")?;
    let deleted = db.engine.delete("project", &gone)?;

    let tracking = db.engine.tracking_rows("project")?;
    assert_eq!(tracking.len(), 1);
    assert_eq!(tracking[0].live_pk, keep);
    let history = db.engine.history("project", &gone)?;
    assert_eq!(history[0].sys_period, Interval::closed(created.at, deleted.at)?);
    Ok(())
}

#[test]
fn truncate_archives_every_row() -> TestResult {
    let mut db = TestDb::new()?;
    let (a, _) = db.add_project("a")?;
    db.add_project("b")?;
    db.add_project("c")?;
    let edited = db.retitle_project(&a, "a2")?;

    let (removed, truncated) = db.engine.truncate("project")?;
    assert_eq!(removed, 3);
    assert_eq!(truncated.archived, 3);
    assert!(db.engine.rows("project")?.is_empty());
    assert!(db.engine.tracking_rows("project")?.is_empty());

    let history = db.engine.history("project", &a)?;
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].sys_period, Interval::closed(edited.at, truncated.at)?);
    assert_eq!(db.history_len("project")?, 4);
    Ok(())
}

#[test]
fn truncate_with_time_column_archives_every_row() -> TestResult {
    let mut db = TestDb::new()?;
    let (a, created_a) = db.add_class("a")?;
    let (b, created_b) = db.add_class("b")?;
    let edited = db.rename_class(&a, "a2")?;
    assert_eq!(db.engine.edition_time("class", &a)?, Some(edited.at));

    let (removed, truncated) = db.engine.truncate("class")?;
    assert_eq!(removed, 2);
    assert_eq!(truncated.archived, 2);
    assert!(db.engine.rows("class")?.is_empty());
    assert_eq!(db.history_len("class")?, 3);

    let history = db.engine.history("class", &a)?;
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].sys_period, Interval::closed(created_a.at, edited.at)?);
    assert_eq!(history[1].sys_period, Interval::closed(edited.at, truncated.at)?);

    let history = db.engine.history("class", &b)?;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].sys_period, Interval::closed(created_b.at, truncated.at)?);
    Ok(())
}

// ============================================================================
// Transactions
// ============================================================================

#[test]
fn change_inside_creating_transaction_leaves_no_history() -> TestResult {
    let mut db = TestDb::new()?;
    let (pk, outcome) = db.engine.batch(|w| {
        let pk = w.insert("class", text_row("class_name", "temp"))?;
        w.update("class", &pk, text_row("class_name", "kept"))?;
        Ok(pk)
    })?;

    assert_eq!(outcome.archived, 0);
    assert_eq!(db.history_len("class")?, 0);
    assert_eq!(db.text("class", &pk, "class_name")?.as_deref(), Some("kept"));
    Ok(())
}

#[test]
fn all_writes_in_a_batch_share_one_timestamp() -> TestResult {
    let mut db = TestDb::new()?;
    let (c, _) = db.add_class("c")?;
    let (p, _) = db.add_project("p")?;
    let ((), outcome) = db.engine.batch(|w| {
        w.update("class", &c, text_row("class_name", "c2"))?;
        w.update("project", &p, text_row("title", "p2"))
    })?;

    assert_eq!(outcome.archived, 2);
    assert_eq!(db.engine.history("class", &c)?[0].sys_period.end(), Some(outcome.at));
    assert_eq!(db.engine.history("project", &p)?[0].sys_period.end(), Some(outcome.at));
    Ok(())
}

#[test]
fn failing_batch_rolls_back_live_and_history() -> TestResult {
    let mut db = TestDb::new()?;
    let (pk, _) = db.add_project("stable")?;

    let err = db
        .engine
        .batch(|w| {
            w.update("project", &pk, text_row("title", "changed"))?;
            w.update("project", &pk, text_row("no_such_column", "x"))
        })
        .unwrap_err();
    assert!(matches!(
        err,
        tempora_engine::EngineError::Storage(tempora_storage::StorageError::UnknownColumn { .. })
    ));
    assert_eq!(db.text("project", &pk, "title")?.as_deref(), Some("stable"));
    assert_eq!(db.history_len("project")?, 0);
    Ok(())
}

#[test]
fn updating_missing_row_reports_not_found() -> TestResult {
    let mut db = TestDb::new()?;
    let err = db.rename_class(&FieldValue::Integer(404), "x").unwrap_err();
    assert!(err.is_row_not_found());
    Ok(())
}

// ============================================================================
// Point-in-time reads and key types
// ============================================================================

#[test]
fn as_of_reads_past_images_of_tracked_table() -> TestResult {
    let mut db = TestDb::new()?;
    let (pk, created) = db.add_project("one")?;
    let second = db.retitle_project(&pk, "two")?;
    let deleted = db.engine.delete("project", &pk)?;

    let title_at = |at: Timestamp| -> Result<Option<FieldValue>, Box<dyn std::error::Error>> {
        Ok(db.engine.as_of("project", &pk, at)?.map(|row| row["title"].clone()))
    };
    assert_eq!(title_at(created.at)?, Some(FieldValue::Text("one".into())));
    assert_eq!(title_at(second.at)?, Some(FieldValue::Text("two".into())));
    assert_eq!(title_at(deleted.at)?, None);
    Ok(())
}

#[test]
fn text_primary_key_is_supported() -> TestResult {
    let mut db = TestDb::new()?;
    let schema = TableSchema::builder("relation")
        .primary_key("code", ColumnType::Text)
        .column("label", ColumnType::Text)
        .build(63)?;
    db.engine.create_table(&schema)?;

    let mut row = Row::new();
    row.insert("code".into(), "pre_of".into());
    row.insert("label".into(), "presynaptic".into());
    let (pk, created) = db.engine.insert("relation", row)?;
    assert_eq!(pk, FieldValue::Text("pre_of".into()));

    let relabeled = db.engine.update("relation", &pk, text_row("label", "pre"))?;
    let history = db.engine.history("relation", &pk)?;
    assert_eq!(history[0].sys_period, Interval::closed(created.at, relabeled.at)?);
    assert_eq!(db.engine.tracking_rows("relation")?[0].live_pk, pk);

    let missing_key = db.engine.insert("relation", text_row("label", "keyless"));
    assert!(missing_key.is_err());
    Ok(())
}
