//! Write-path interception: decides, for one live-table mutation, which
//! history and tracking effects the writer applies in the same transaction.
//!
//! Pure over its inputs so every transition can be checked without a
//! database.

use tempora_core::{
    schema::{CREATION_TIME, EDITION_TIME},
    CoreError, FieldValue, Interval, Row, TimeSource, Timestamp,
};

/// A row image as it stood before the mutation, with the tracking-table
/// edition time when the table keeps one.
#[derive(Debug, Clone, Copy)]
pub struct PriorImage<'a> {
    pub row: &'a Row,
    pub tracked: Option<Timestamp>,
}

#[derive(Debug, Clone)]
pub enum RowEvent<'a> {
    Insert { new: &'a Row },
    Update { old: PriorImage<'a> },
    Delete { old: PriorImage<'a> },
    Truncate { rows: Vec<PriorImage<'a>> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Append `row` to the history table as valid during `period`.
    Archive { row: Row, period: Interval },
    /// Set `edition_time` on the new image before it is written.
    StampEditionTime(Timestamp),
    TouchTracking { pk: FieldValue, edition_time: Timestamp },
    RemoveTracking { pk: FieldValue },
    ClearTracking,
}

#[derive(Debug, Clone, Copy)]
pub struct InterceptContext<'a> {
    pub time_source: TimeSource,
    pub primary_key: &'a str,
    pub now: Timestamp,
}

pub fn intercept(ctx: &InterceptContext<'_>, event: &RowEvent<'_>) -> Result<Vec<Action>, CoreError> {
    let mut actions = Vec::new();
    match event {
        RowEvent::Insert { new } => {
            if ctx.time_source == TimeSource::TrackingTable {
                actions.push(Action::TouchTracking {
                    pk: key_of(ctx, new)?,
                    edition_time: ctx.now,
                });
            }
        }
        RowEvent::Update { old } => {
            archive_prior(ctx, old, &mut actions)?;
            match ctx.time_source {
                TimeSource::EditionColumn => actions.push(Action::StampEditionTime(ctx.now)),
                TimeSource::TrackingTable => actions.push(Action::TouchTracking {
                    pk: key_of(ctx, old.row)?,
                    edition_time: ctx.now,
                }),
            }
        }
        RowEvent::Delete { old } => {
            archive_prior(ctx, old, &mut actions)?;
            if ctx.time_source == TimeSource::TrackingTable {
                actions.push(Action::RemoveTracking {
                    pk: key_of(ctx, old.row)?,
                });
            }
        }
        RowEvent::Truncate { rows } => {
            for old in rows {
                archive_prior(ctx, old, &mut actions)?;
            }
            if ctx.time_source == TimeSource::TrackingTable {
                actions.push(Action::ClearTracking);
            }
        }
    }
    Ok(actions)
}

/// Start of the interval during which `old` was current: the row's own
/// edition time, else the tracked time, else its creation time.
pub fn period_start(ctx: &InterceptContext<'_>, old: &PriorImage<'_>) -> Result<Timestamp, CoreError> {
    let recorded = match ctx.time_source {
        TimeSource::EditionColumn => timestamp_of(old.row, EDITION_TIME),
        TimeSource::TrackingTable => old.tracked,
    };
    recorded
        .or_else(|| timestamp_of(old.row, CREATION_TIME))
        .ok_or_else(|| CoreError::InvalidData(format!("row image has no {CREATION_TIME}")))
}

fn archive_prior(
    ctx: &InterceptContext<'_>,
    old: &PriorImage<'_>,
    actions: &mut Vec<Action>,
) -> Result<(), CoreError> {
    let start = period_start(ctx, old)?;
    // Fails when the prior image claims to start after this transaction.
    let period = Interval::closed(start, ctx.now)?;
    // A row created and changed in one transaction was never visible.
    if period.is_empty() {
        return Ok(());
    }
    actions.push(Action::Archive {
        row: old.row.clone(),
        period,
    });
    Ok(())
}

fn timestamp_of(row: &Row, column: &str) -> Option<Timestamp> {
    row.get(column).and_then(FieldValue::as_timestamp)
}

fn key_of(ctx: &InterceptContext<'_>, row: &Row) -> Result<FieldValue, CoreError> {
    match row.get(ctx.primary_key) {
        Some(v) if !v.is_null() => Ok(v.clone()),
        _ => Err(CoreError::InvalidData(format!(
            "row image has no value for primary key {}",
            ctx.primary_key
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(ms: u64) -> Timestamp {
        Timestamp::new(ms, 0)
    }

    fn ctx(time_source: TimeSource, now: u64) -> InterceptContext<'static> {
        InterceptContext {
            time_source,
            primary_key: "id",
            now: ts(now),
        }
    }

    fn row(id: i64, created: u64, edited: Option<u64>) -> Row {
        let mut row = Row::new();
        row.insert("id".into(), FieldValue::Integer(id));
        row.insert(CREATION_TIME.into(), ts(created).into());
        if let Some(e) = edited {
            row.insert(EDITION_TIME.into(), ts(e).into());
        }
        row
    }

    fn prior(row: &Row, tracked: Option<u64>) -> PriorImage<'_> {
        PriorImage {
            row,
            tracked: tracked.map(ts),
        }
    }

    #[test]
    fn insert_touches_tracking_only_without_edition_column() {
        let new = row(1, 50, Some(50));
        let actions = intercept(&ctx(TimeSource::EditionColumn, 50), &RowEvent::Insert { new: &new }).unwrap();
        assert!(actions.is_empty());

        let new = row(1, 50, None);
        let actions = intercept(&ctx(TimeSource::TrackingTable, 50), &RowEvent::Insert { new: &new }).unwrap();
        assert_eq!(
            actions,
            vec![Action::TouchTracking {
                pk: FieldValue::Integer(1),
                edition_time: ts(50)
            }]
        );
    }

    #[test]
    fn update_with_edition_column_archives_from_edition_time() {
        let old = row(1, 10, Some(20));
        let actions = intercept(
            &ctx(TimeSource::EditionColumn, 30),
            &RowEvent::Update { old: prior(&old, None) },
        )
        .unwrap();
        assert_eq!(
            actions,
            vec![
                Action::Archive {
                    row: old.clone(),
                    period: Interval::closed(ts(20), ts(30)).unwrap()
                },
                Action::StampEditionTime(ts(30)),
            ]
        );
    }

    #[test]
    fn update_with_tracking_prefers_tracked_time_over_creation() {
        let old = row(7, 10, None);
        let actions = intercept(
            &ctx(TimeSource::TrackingTable, 40),
            &RowEvent::Update { old: prior(&old, Some(25)) },
        )
        .unwrap();
        assert_eq!(
            actions[0],
            Action::Archive {
                row: old.clone(),
                period: Interval::closed(ts(25), ts(40)).unwrap()
            }
        );
        assert_eq!(
            actions[1],
            Action::TouchTracking {
                pk: FieldValue::Integer(7),
                edition_time: ts(40)
            }
        );
    }

    #[test]
    fn missing_tracking_row_falls_back_to_creation_time() {
        let old = row(7, 10, None);
        let c = ctx(TimeSource::TrackingTable, 40);
        assert_eq!(period_start(&c, &prior(&old, None)).unwrap(), ts(10));
    }

    #[test]
    fn delete_archives_and_removes_tracking() {
        let old = row(3, 10, None);
        let actions = intercept(
            &ctx(TimeSource::TrackingTable, 40),
            &RowEvent::Delete { old: prior(&old, Some(30)) },
        )
        .unwrap();
        assert_eq!(actions.len(), 2);
        assert!(matches!(&actions[0], Action::Archive { period, .. } if period.start() == ts(30)));
        assert_eq!(actions[1], Action::RemoveTracking { pk: FieldValue::Integer(3) });
    }

    #[test]
    fn truncate_archives_every_row_then_clears_tracking() {
        let a = row(1, 10, None);
        let b = row(2, 15, None);
        let actions = intercept(
            &ctx(TimeSource::TrackingTable, 40),
            &RowEvent::Truncate {
                rows: vec![prior(&a, Some(12)), prior(&b, None)],
            },
        )
        .unwrap();
        assert_eq!(actions.len(), 3);
        assert!(matches!(&actions[1], Action::Archive { period, .. } if period.start() == ts(15)));
        assert_eq!(actions[2], Action::ClearTracking);
    }

    #[test]
    fn truncate_with_edition_column_archives_from_each_edition_time() {
        let a = row(1, 10, Some(25));
        let b = row(2, 15, Some(15));
        let actions = intercept(
            &ctx(TimeSource::EditionColumn, 40),
            &RowEvent::Truncate {
                rows: vec![prior(&a, None), prior(&b, None)],
            },
        )
        .unwrap();
        assert_eq!(
            actions,
            vec![
                Action::Archive {
                    row: a.clone(),
                    period: Interval::closed(ts(25), ts(40)).unwrap()
                },
                Action::Archive {
                    row: b.clone(),
                    period: Interval::closed(ts(15), ts(40)).unwrap()
                },
            ]
        );
    }

    #[test]
    fn change_in_creating_transaction_archives_nothing() {
        let old = row(1, 30, Some(30));
        let actions = intercept(
            &ctx(TimeSource::EditionColumn, 30),
            &RowEvent::Update { old: prior(&old, None) },
        )
        .unwrap();
        assert_eq!(actions, vec![Action::StampEditionTime(ts(30))]);
    }

    #[test]
    fn prior_time_after_now_is_rejected() {
        let old = row(1, 10, Some(50));
        let err = intercept(
            &ctx(TimeSource::EditionColumn, 30),
            &RowEvent::Delete { old: prior(&old, None) },
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::InvalidInterval { .. }));
    }

    #[test]
    fn row_without_creation_time_is_invalid() {
        let mut old = row(1, 10, None);
        old.remove(CREATION_TIME);
        let err = intercept(
            &ctx(TimeSource::TrackingTable, 30),
            &RowEvent::Delete { old: prior(&old, None) },
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::InvalidData(_)));
    }
}
