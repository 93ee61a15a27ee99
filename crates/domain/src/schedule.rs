//! Due-date calculus — pure calendar-day arithmetic over anchored dates.
//!
//! Offsets are applied to the anchor's UTC calendar date, not to epoch
//! seconds, so an offset computed near a daylight-saving boundary still
//! lands on the intended calendar date. All output is UTC; display
//! conversion is an external concern.

use chrono::Days;

use crate::entity::EntitySnapshot;
use crate::error::EvaluationError;
use crate::field::FieldType;
use crate::rule::DueDateSpec;
use crate::time::Timestamp;

/// Result of a due-date calculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DueDate {
    Scheduled(Timestamp),
    /// The anchor field was unset; the task carries no due date.
    Unscheduled,
}

impl DueDate {
    /// The timestamp, if scheduled.
    #[must_use]
    pub fn timestamp(self) -> Option<Timestamp> {
        match self {
            Self::Scheduled(ts) => Some(ts),
            Self::Unscheduled => None,
        }
    }
}

/// Compute the due timestamp for a spec against an entity snapshot.
///
/// A null/unset anchor yields [`DueDate::Unscheduled`], not an error.
///
/// # Errors
///
/// Returns [`EvaluationError::TypeMismatch`] when the anchor value is not
/// readable as a date, and [`EvaluationError::DateOverflow`] when the
/// offset leaves the representable range.
pub fn due_at(
    spec: &DueDateSpec,
    snapshot: &EntitySnapshot,
    event_time: Timestamp,
) -> Result<DueDate, EvaluationError> {
    match spec {
        DueDateSpec::RelativeToField { field, offset_days } => {
            let value = snapshot.field(field);
            if value.is_empty() {
                return Ok(DueDate::Unscheduled);
            }
            let anchor = value
                .as_datetime()
                .ok_or_else(|| EvaluationError::TypeMismatch {
                    field: field.clone(),
                    expected: FieldType::Date,
                })?;
            Ok(DueDate::Scheduled(add_calendar_days(anchor, *offset_days)?))
        }
        DueDateSpec::FixedOffset { offset_days } => Ok(DueDate::Scheduled(add_calendar_days(
            event_time,
            *offset_days,
        )?)),
    }
}

/// Shift a timestamp by whole calendar days, preserving time-of-day.
///
/// # Errors
///
/// Returns [`EvaluationError::DateOverflow`] when the shifted date leaves
/// the representable range.
pub fn add_calendar_days(anchor: Timestamp, days: i64) -> Result<Timestamp, EvaluationError> {
    let date = anchor.date_naive();
    let shifted = if days >= 0 {
        date.checked_add_days(Days::new(days.unsigned_abs()))
    } else {
        date.checked_sub_days(Days::new(days.unsigned_abs()))
    }
    .ok_or(EvaluationError::DateOverflow)?;
    Ok(shifted.and_time(anchor.time()).and_utc())
}
