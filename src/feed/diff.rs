//! Row-set diffing.
//!
//! Both sides are full `id -> Row` indexes; the output is the minimal list of
//! upserts and removes that turns `previous` into `fresh`, sorted by id so
//! frames are reproducible across runs.

use std::collections::HashMap;

use crate::types::{Row, RowChange};

pub type RowIndex = HashMap<String, Row>;

/// Index rows by id. On duplicate ids the later row wins.
///
/// Rows with a blank id are skipped: nothing can address them, and their
/// removal could not be expressed as a valid change.
pub fn index_rows(rows: impl IntoIterator<Item = Row>) -> RowIndex {
    let mut out = RowIndex::new();
    let mut skipped = 0usize;
    for row in rows {
        if row.id.trim().is_empty() {
            skipped += 1;
            continue;
        }
        out.insert(row.id.clone(), row);
    }
    if skipped > 0 {
        tracing::warn!(skipped, "dropped rows without an id");
    }
    out
}

pub fn diff(previous: &RowIndex, fresh: &RowIndex) -> Vec<RowChange> {
    let mut changes = Vec::new();

    for (id, row) in fresh {
        if previous.get(id) != Some(row) {
            changes.push(RowChange::upsert(row.clone()));
        }
    }
    for id in previous.keys() {
        if !fresh.contains_key(id) {
            match RowChange::remove(id.as_str()) {
                Ok(change) => changes.push(change),
                // unreachable for indexes built by `index_rows`
                Err(e) => tracing::error!(error = %e, "skipping invalid remove"),
            }
        }
    }

    changes.sort_by(|a, b| a.id().cmp(b.id()));
    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::tests::row;
    use crate::types::ChangeOp;

    fn ops(changes: &[RowChange]) -> Vec<(ChangeOp, &str)> {
        changes.iter().map(|c| (c.op(), c.id())).collect()
    }

    #[test]
    fn detects_upserts_and_removals() {
        let previous = index_rows([row("key-a", 100), row("key-b", -110)]);
        let fresh = index_rows([row("key-a", 105), row("key-c", 120)]);

        let changes = diff(&previous, &fresh);
        assert_eq!(
            ops(&changes),
            vec![
                (ChangeOp::Upsert, "key-a"),
                (ChangeOp::Remove, "key-b"),
                (ChangeOp::Upsert, "key-c"),
            ]
        );
        assert_eq!(changes[0].row().unwrap().price, Some(105));
    }

    #[test]
    fn identical_sets_produce_nothing() {
        let a = index_rows([row("a", 110), row("b", -120)]);
        assert!(diff(&a, &a.clone()).is_empty());
    }

    #[test]
    fn any_field_change_is_an_upsert() {
        let previous = index_rows([row("a", 110)]);
        let mut changed = row("a", 110);
        changed.extra.insert("participant".into(), "Boston Celtics".into());
        let fresh = index_rows([changed]);

        assert_eq!(ops(&diff(&previous, &fresh)), vec![(ChangeOp::Upsert, "a")]);
    }

    #[test]
    fn duplicate_ids_last_wins() {
        let idx = index_rows([row("a", 1), row("b", 2), row("a", 3)]);
        assert_eq!(idx.len(), 2);
        assert_eq!(idx["a"].price, Some(3));
    }

    #[test]
    fn blank_ids_never_enter_the_index() {
        let idx = index_rows([row("", 1), row("   ", 2), row("a", 3)]);
        assert_eq!(idx.len(), 1);
        assert!(idx.contains_key("a"));

        let changes = diff(&idx, &index_rows([row("", 4)]));
        assert_eq!(ops(&changes), vec![(ChangeOp::Remove, "a")]);
    }

    #[test]
    fn walkthrough_of_successive_states() {
        let s0 = index_rows([row("A", 110)]);
        let s1 = index_rows([row("A", 115), row("B", -120)]);
        let s2 = index_rows([row("B", -120)]);

        let d1 = diff(&s0, &s1);
        assert_eq!(ops(&d1), vec![(ChangeOp::Upsert, "A"), (ChangeOp::Upsert, "B")]);
        assert_eq!(d1[0].row().unwrap().price, Some(115));
        assert_eq!(d1[1].row().unwrap().price, Some(-120));

        assert_eq!(ops(&diff(&s1, &s2)), vec![(ChangeOp::Remove, "A")]);
        assert!(diff(&s2, &s2.clone()).is_empty());
    }
}
