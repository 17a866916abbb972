//! Core of the EMAD home-care console: an encrypted local registry of
//! patients, staff, and care visits, plus the dashboard aggregations.

pub mod config;
pub mod crypto;
pub mod dashboard;
pub mod error;
pub mod export;
pub mod models;
pub mod patients;
pub mod recycle;
pub mod store;
pub mod text;
pub mod users;
pub mod visits;

#[cfg(feature = "desktop")]
pub mod commands;

pub use config::Config;
pub use error::{EmadError, EmadResult};
pub use store::Store;
