use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::FeedError;

/// One priced outcome as mirrored from the upstream provider.
///
/// Rows are plain values: two rows are equal iff every field is equal, which is
/// exactly what the diff uses to decide whether an id needs an upsert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Row {
    pub id: String,
    pub sport: String,
    pub event: String,
    pub market: String,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub line: Option<Decimal>,
    /// American odds, e.g. `-110` or `+125`.
    #[serde(default)]
    pub price: Option<i32>,
    pub book: String,
    pub starts_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOp {
    Upsert,
    Remove,
}

/// A single change against one row id.
///
/// The variants carry exactly what each operation needs, so an upsert without a
/// row or a remove without an id cannot be represented once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase", try_from = "RawRowChange")]
pub enum RowChange {
    Upsert { id: String, row: Row },
    Remove { id: String },
}

impl RowChange {
    /// Upsert keyed by the row's own id.
    pub fn upsert(row: Row) -> Self {
        let id = row.id.clone();
        RowChange::Upsert { id, row }
    }

    pub fn remove(id: impl Into<String>) -> Result<Self, FeedError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(FeedError::InvalidChange("REMOVE changes require an id".into()));
        }
        Ok(RowChange::Remove { id })
    }

    /// Validating constructor for loosely-typed input (wire payloads, adapters).
    ///
    /// A blank or missing id on an upsert defaults to `row.id`.
    pub fn new(op: ChangeOp, id: Option<String>, row: Option<Row>) -> Result<Self, FeedError> {
        match op {
            ChangeOp::Upsert => {
                let row = row.ok_or_else(|| {
                    FeedError::InvalidChange("UPSERT changes require a row payload".into())
                })?;
                let id = match id {
                    Some(id) if !id.trim().is_empty() => id,
                    _ => row.id.clone(),
                };
                Ok(RowChange::Upsert { id, row })
            }
            ChangeOp::Remove => Self::remove(id.unwrap_or_default()),
        }
    }

    pub fn op(&self) -> ChangeOp {
        match self {
            RowChange::Upsert { .. } => ChangeOp::Upsert,
            RowChange::Remove { .. } => ChangeOp::Remove,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            RowChange::Upsert { id, .. } | RowChange::Remove { id } => id,
        }
    }

    pub fn row(&self) -> Option<&Row> {
        match self {
            RowChange::Upsert { row, .. } => Some(row),
            RowChange::Remove { .. } => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawRowChange {
    op: ChangeOp,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    row: Option<Row>,
}

impl TryFrom<RawRowChange> for RowChange {
    type Error = FeedError;

    fn try_from(raw: RawRowChange) -> Result<Self, Self::Error> {
        RowChange::new(raw.op, raw.id, raw.row)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameType {
    Snapshot,
    Delta,
}

impl FrameType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FrameType::Snapshot => "snapshot",
            FrameType::Delta => "delta",
        }
    }
}

/// One broadcast unit: either the full row set or the changes since the
/// previously published state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    #[serde(rename = "type")]
    pub kind: FrameType,
    pub ts: DateTime<Utc>,
    pub rows: Vec<RowChange>,
}

impl Frame {
    /// Snapshot frame made of one upsert per row.
    pub fn snapshot<'a>(rows: impl IntoIterator<Item = &'a Row>, ts: DateTime<Utc>) -> Self {
        Self {
            kind: FrameType::Snapshot,
            ts,
            rows: rows.into_iter().cloned().map(RowChange::upsert).collect(),
        }
    }

    pub fn delta(changes: Vec<RowChange>, ts: DateTime<Utc>) -> Self {
        Self { kind: FrameType::Delta, ts, rows: changes }
    }

    pub fn is_snapshot(&self) -> bool {
        self.kind == FrameType::Snapshot
    }
}

/// Filter parameters handed to a provider for one fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OddsQuery {
    pub sports: Vec<String>,
    pub markets: Vec<String>,
    pub regions: String,
}

/// Pull-side filter on the mirrored rows. Empty lists match everything.
#[derive(Debug, Clone, Default)]
pub struct RowFilter {
    pub sports: Vec<String>,
    pub markets: Vec<String>,
}

impl RowFilter {
    pub fn matches(&self, row: &Row) -> bool {
        (self.sports.is_empty() || self.sports.iter().any(|s| s == &row.sport))
            && (self.markets.is_empty() || self.markets.iter().any(|m| m == &row.market))
    }
}
