//! Result Record - metadata of one measurement

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Result Record links a measurement to its sample, user and routine.
///
/// The measured values live in the routine's dynamic table, in the row whose
/// `link` equals this result's id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResultRecord {
    id: Option<i64>,
    sample: i64,
    user: i64,
    routine: i64,
    date: Option<NaiveDateTime>,
    active: bool,
    raw_data_id: Option<i64>,
}

impl ResultRecord {
    /// Create an active result without date or raw data reference.
    #[must_use]
    pub const fn new(sample: i64, user: i64, routine: i64) -> Self {
        Self {
            id: None,
            sample,
            user,
            routine,
            date: None,
            active: true,
            raw_data_id: None,
        }
    }

    /// Set the measurement date.
    #[must_use]
    pub const fn date(mut self, date: Option<NaiveDateTime>) -> Self {
        self.date = date;
        self
    }

    /// Set the active flag.
    #[must_use]
    pub const fn active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// Set the raw data reference.
    #[must_use]
    pub const fn raw_data_id(mut self, raw_data_id: Option<i64>) -> Self {
        self.raw_data_id = raw_data_id;
        self
    }

    /// Database id, once stored.
    #[must_use]
    pub const fn id(&self) -> Option<i64> {
        self.id
    }

    /// Compound id.
    #[must_use]
    pub const fn sample_id(&self) -> i64 {
        self.sample
    }

    /// User id.
    #[must_use]
    pub const fn user_id(&self) -> i64 {
        self.user
    }

    /// Routine id.
    #[must_use]
    pub const fn routine_id(&self) -> i64 {
        self.routine
    }

    /// Measurement date.
    #[must_use]
    pub const fn measured_at(&self) -> Option<NaiveDateTime> {
        self.date
    }

    /// Whether the result is active.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    /// External raw data reference.
    #[must_use]
    pub const fn raw_data_ref(&self) -> Option<i64> {
        self.raw_data_id
    }

    pub(crate) const fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }
}
