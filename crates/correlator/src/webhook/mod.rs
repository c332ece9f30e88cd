//! Alert webhook intake.
//!
//! Receives Alertmanager deliveries (and simpler single-alert bodies) over
//! HTTP, normalizes them, and feeds each alert into the session window.

pub mod normalize;
pub mod server;
pub mod types;

pub use normalize::normalize;
pub use server::{build_router, run_server, AppState};
pub use types::{AlertmanagerPayload, FlatAlert, LabeledAlert};
