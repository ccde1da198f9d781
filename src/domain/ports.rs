use crate::domain::model::{Profile, Slot};
use crate::utils::error::Result;
use async_trait::async_trait;
use thiserror::Error;

/// Recoverable failure of a slot query. The polling loop consumes these
/// without ever raising a crate error: both kinds mean "no usable data this
/// round, try again on the next tick".
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchFailure {
    /// Connection error, timeout or non-success HTTP status.
    #[error("transport failure: {0}")]
    Transport(String),
    /// The portal replied, but reported its own failure.
    #[error("service failure: {0}")]
    Service(String),
}

/// Failure of a booking attempt. Terminal for the session; never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BookingFailure {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("{0}")]
    Service(String),
}

impl BookingFailure {
    /// Message surfaced as the session's Failed outcome: the remote message
    /// when the portal reported one, a generic description otherwise.
    pub fn outcome_message(&self) -> String {
        match self {
            BookingFailure::Transport(e) => format!("Booking request failed: {}", e),
            BookingFailure::Service(msg) => msg.clone(),
        }
    }
}

/// Remote scheduling operations consumed by the search engine.
#[async_trait]
pub trait SchedulingApi: Send + Sync {
    /// Fetch the open slots for one clinic/doctor pair. No local state is
    /// retained between calls.
    async fn fetch_available_slots(
        &self,
        clinic_id: &str,
        doctor_id: &str,
    ) -> std::result::Result<Vec<Slot>, FetchFailure>;

    /// Submit one booking request for a profile+slot pair. Single attempt;
    /// the implementation performs no internal retry.
    async fn book_slot(
        &self,
        clinic_id: &str,
        profile: &Profile,
        slot: &Slot,
    ) -> std::result::Result<String, BookingFailure>;
}

/// Patient registry lookup. Profiles are checked against it before they are
/// saved or edited, so booking requests later carry an id the portal
/// recognizes.
#[async_trait]
pub trait PatientRegistry: Send + Sync {
    /// Look the profile up in the portal's registry. `Ok(None)` means the
    /// registry accepted the profile but reported no id for it.
    async fn search_patient(
        &self,
        profile: &Profile,
    ) -> std::result::Result<Option<String>, FetchFailure>;
}

/// Patient-profile persistence. The engine only calls `get` at session
/// start; the CRUD surface is driven by the CLI.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn list(&self, clinic_id: &str) -> Result<Vec<Profile>>;
    async fn get(&self, profile_id: &str) -> Result<Option<Profile>>;
    async fn upsert(&self, profile: Profile) -> Result<()>;
    async fn remove(&self, profile_id: &str) -> Result<bool>;
}
