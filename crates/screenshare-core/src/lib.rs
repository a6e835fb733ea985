//! Screen-share stage core.
//!
//! Pure Rust crate with no platform dependencies. The stage SDK and the
//! platform capture APIs are reached through the traits in [`stage`] and
//! [`capture`]; native shells consume it via the UniFFI bindings.

pub mod capture;
pub mod controller;
pub mod errors;
pub mod navigation;
pub mod participants;
pub mod renderer;
pub mod service;
pub mod settings;
pub mod stage;
pub mod state;
pub mod strategy;

#[cfg(test)]
mod testing;

pub use capture::{CaptureManager, CapturePlatform, MediaProjection};
pub use controller::StageController;
pub use errors::ShareError;
pub use navigation::{Destination, Navigator};
pub use participants::{Participant, Roster, SCREEN_SHARE_ID};
pub use service::CaptureService;
pub use settings::{CredentialStore, StageConfig};
pub use stage::{ConnectionState, Stage, StageFactory};
pub use state::StageState;
