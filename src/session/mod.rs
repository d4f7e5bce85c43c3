//! Session core: run orchestration, the result registry, bound propagation
//! and the controller tying them together.

pub mod bounds;
pub mod config;
pub mod controller;
pub mod orchestrator;
pub mod registry;

pub use bounds::{Axis, AxisUpdate, BOUNDS_WARNING, BoundControl, BoundPair, PlotBounds, Viewport};
pub use config::{ModelSelection, SessionConfig};
pub use controller::{RunFailure, Session};
pub use orchestrator::{CancelToken, Orchestrator, RunEvent, RunHandle};
pub use registry::{Registry, ResultEntry};
