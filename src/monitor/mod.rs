//! Monitoring
//!
//! The controller owns the current session, the velocity tracker, both
//! scorers and the intervention ledger behind one mutex, and drives them from
//! two paths: gesture ingestion and the periodic analysis clock.

pub mod clock;
pub mod controller;
pub mod events;
pub mod gesture;
pub mod intervention;

pub use clock::AnalysisClock;
pub use controller::{MonitoringController, EVENT_CHANNEL_CAPACITY};
pub use events::{MonitorEvent, MonitorMetrics};
pub use gesture::{GestureInput, GestureSegmenter};
pub use intervention::{InterventionState, InterventionStatus};
