pub mod gorzdrav;
pub mod profile_store;
