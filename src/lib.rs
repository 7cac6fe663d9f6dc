//! doomscope - On-device doom-scrolling detection
//!
//! Turns a stream of scroll gestures into a continuously updated intensity
//! score and rate-limited intervention events:
//! velocity tracking → session model → intensity / heuristics scoring →
//! monitoring controller → event stream.
//!
//! ## Modules
//!
//! - **Scoring**: [`velocity`], [`session`], [`intensity`], [`heuristics`]
//! - **Monitoring**: [`monitor`] (controller, analysis clock, interventions)
//! - **Tooling**: [`replay`] for deterministic log replay, [`ffi`] for mobile hosts

pub mod clock;
pub mod config;
pub mod error;
pub mod heuristics;
pub mod intensity;
pub mod monitor;
pub mod replay;
pub mod session;
pub mod types;
pub mod velocity;

// FFI bindings for C interop (default feature; disable for pure-Rust embedding)
#[cfg(feature = "ffi")]
pub mod ffi;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{DetectionConfig, HeuristicsConfig, HeuristicsPreset, SensitivityPreset};
pub use error::DetectorError;
pub use heuristics::HeuristicsEngine;
pub use intensity::IntensityScorer;
pub use monitor::{MonitorEvent, MonitorMetrics, MonitoringController};
pub use session::SessionModel;
pub use types::{
    DoomScrollScore, InterventionKind, InterventionResult, Level, PowerMode, Sample, ScrollDirection,
    ScrollEvent, ScrollIntensity, SessionState, SessionSummary, Vector2,
};
pub use velocity::{VelocityStatistics, VelocityTracker};

/// Library version
pub const DOOMSCOPE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name reported by tooling
pub const PRODUCER_NAME: &str = "doomscope";
