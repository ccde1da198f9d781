pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

pub use adapters::gorzdrav::GorzdravClient;
pub use adapters::profile_store::JsonProfileStore;
pub use core::controller::{SearchController, DEFAULT_POLL_INTERVAL};
pub use domain::model::{Profile, SearchRequest, SearchState, SearchUpdate, Slot};
pub use domain::ports::{BookingFailure, FetchFailure, PatientRegistry, ProfileStore, SchedulingApi};
pub use utils::error::{HunterError, Result};
