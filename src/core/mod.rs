pub mod controller;
pub mod profiles;
pub mod selection;

pub use crate::domain::model::{Profile, SearchRequest, SearchState, SearchUpdate, Slot};
pub use crate::domain::ports::{
    BookingFailure, FetchFailure, PatientRegistry, ProfileStore, SchedulingApi,
};
pub use crate::utils::error::Result;
