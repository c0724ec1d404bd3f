//! # wifiloc
//!
//! Offline-first Wi-Fi positioning: a local SQLite cache of access point
//! locations, a fusion engine that turns scan snapshots into a position
//! estimate, and a background loop that refreshes unknown or aging entries
//! from a remote lookup service.
//!
//! [`WifiLocator`] is the entry point. Open a session, push observation
//! snapshots in, and read estimates back from the call itself or over the
//! watch channel from [`WifiLocator::estimates`].

pub mod cache;
pub mod config;
pub mod error;
pub mod fusion;
pub mod lookup;
pub mod mac;
pub mod models;
pub mod refresh;
pub mod session;

pub use cache::{Editor, LocationCache};
pub use config::SessionConfig;
pub use error::{Error, Result};
pub use fusion::FusionEngine;
pub use lookup::{HttpResolver, LocationResolver};
pub use models::{AccessPointObservation, LocationRecord};
pub use refresh::RefreshCoordinator;
pub use session::WifiLocator;
