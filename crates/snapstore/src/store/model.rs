//! Version and snapshot records, promotion strategy and outcome

use crate::errors::{ErrorKind, Result, StoreError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::str::FromStr;

pub type VersionId = i64;
pub type SnapshotId = i64;

/// `date_until` of the current snapshot, in microseconds
pub const INFINITY_MICROS: i64 = i64::MAX;

/// One row of the version log
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Version<T> {
    pub version_id: VersionId,
    pub affinity_id: String,
    pub id: String,
    pub data: T,
    pub date_created: DateTime<Utc>,
    /// Set once, when this version was promoted
    pub snapshot_id: Option<SnapshotId>,
}

/// One row of the snapshot log
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot<T> {
    pub snapshot_id: SnapshotId,
    pub id: String,
    pub data: T,
    pub date_from: DateTime<Utc>,
    /// `None` while this is the current snapshot
    pub date_until: Option<DateTime<Utc>>,
}

impl<T> Snapshot<T> {
    pub fn is_current(&self) -> bool {
        self.date_until.is_none()
    }

    /// Whether this snapshot was the current one at `at`
    pub fn covers(&self, at: DateTime<Utc>) -> bool {
        self.date_from <= at && self.date_until.map_or(true, |until| at < until)
    }
}

/// Conflict policy for [`Store::add_snapshot`](crate::Store::add_snapshot)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strategy {
    /// Promote the caller's latest version regardless of competing promotions
    #[default]
    Mine,
    /// Refuse to promote over a snapshot another affinity promoted after the
    /// caller's latest version was written
    Abort,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Mine => "mine",
            Strategy::Abort => "abort",
        }
    }
}

impl FromStr for Strategy {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mine" => Ok(Strategy::Mine),
            "abort" => Ok(Strategy::Abort),
            other => Err(StoreError::new(ErrorKind::InvalidInput)
                .with_op("parse_strategy")
                .with_message(format!("unknown strategy '{}', expected mine or abort", other))),
        }
    }
}

/// A version that is now the current snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Promoted {
    pub snapshot_id: SnapshotId,
    pub version_id: VersionId,
    pub date_from: DateTime<Utc>,
    /// The version was already the current snapshot; nothing was written
    pub was_duplicate: bool,
}

/// The competing snapshot that blocked a [`Strategy::Abort`] promotion
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conflict {
    pub id: String,
    /// The caller's version that was not promoted
    pub version_id: VersionId,
    pub current_snapshot_id: SnapshotId,
    pub current_affinity_id: Option<String>,
    pub current_date_from: DateTime<Utc>,
}

/// Outcome of a promotion that did not fail outright
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Promotion {
    Promoted(Promoted),
    Conflict(Conflict),
}

impl Promotion {
    pub fn is_promoted(&self) -> bool {
        matches!(self, Promotion::Promoted(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Promotion::Conflict(_))
    }

    /// Treat a conflict as an error of kind [`ErrorKind::Conflict`]
    pub fn into_result(self) -> Result<Promoted> {
        match self {
            Promotion::Promoted(promoted) => Ok(promoted),
            Promotion::Conflict(conflict) => Err(StoreError::new(ErrorKind::Conflict)
                .with_op("add_snapshot")
                .with_entity_id(conflict.id.clone())
                .with_message(format!(
                    "snapshot {} was promoted by {} after version {} was written",
                    conflict.current_snapshot_id,
                    conflict.current_affinity_id.as_deref().unwrap_or("unknown affinity"),
                    conflict.version_id
                ))),
        }
    }
}

pub(crate) fn now_micros() -> i64 {
    Utc::now().timestamp_micros()
}

pub(crate) fn from_micros(micros: i64) -> Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_micros(micros).ok_or_else(|| {
        StoreError::new(ErrorKind::Internal)
            .with_op("decode_timestamp")
            .with_message(format!("timestamp {} is out of range", micros))
    })
}

pub(crate) fn until_from_micros(micros: i64) -> Result<Option<DateTime<Utc>>> {
    if micros == INFINITY_MICROS {
        Ok(None)
    } else {
        from_micros(micros).map(Some)
    }
}
