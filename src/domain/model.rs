use crate::utils::error::Result;
use crate::utils::validation::{validate_non_empty_string, Validate};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Patient questionnaire as stored by the profile store. The engine only
/// reads it; all mutation goes through the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub clinic_id: String,
    pub last_name: String,
    pub first_name: String,
    pub middle_name: String,
    pub birth_date: NaiveDate,
    pub email: String,
    pub phone: String,
}

impl Profile {
    /// Display name used in lists and status output.
    pub fn display_name(&self) -> String {
        format!("{} {}", self.last_name, self.first_name)
    }
}

/// One bookable appointment instance as reported by the portal.
/// Slots are compared by `start` only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub id: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub address: String,
    pub room: String,
    pub number: i64,
}

/// Immutable parameters of one search session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub clinic_id: String,
    pub doctor_id: String,
    pub profile_id: String,
    /// Earliest acceptable slot start.
    pub threshold: NaiveDateTime,
}

impl Validate for SearchRequest {
    fn validate(&self) -> Result<()> {
        validate_non_empty_string("clinic_id", &self.clinic_id)?;
        validate_non_empty_string("doctor_id", &self.doctor_id)?;
        validate_non_empty_string("profile_id", &self.profile_id)?;
        Ok(())
    }
}

/// Session lifecycle. `Succeeded`, `Failed` and `Cancelled` are terminal:
/// once reached, the session never mutates again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchState {
    Idle,
    Searching,
    Booking,
    Succeeded,
    Failed,
    Cancelled,
}

impl SearchState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SearchState::Succeeded | SearchState::Failed | SearchState::Cancelled
        )
    }
}

/// Snapshot delivered to subscribers after every state or status change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchUpdate {
    pub state: SearchState,
    pub message: String,
    pub selected_slot: Option<Slot>,
}

impl SearchUpdate {
    pub fn idle() -> Self {
        Self {
            state: SearchState::Idle,
            message: String::new(),
            selected_slot: None,
        }
    }
}
