//! Action layer: maps analyzer verdicts to canonical actions and dispatches
//! them to external targets with retry.

pub mod dispatcher;
pub mod mapper;
pub mod model;
pub mod state;
pub mod targets;

pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use mapper::map_analysis;
pub use model::{ActionRequest, ActionResult, ActionStatus, ActionType, Priority};
pub use state::{DispatchState, DispatchTracker};
pub use targets::{ActionTarget, SimulatedTarget, TargetRegistry, TargetResponse, TargetSystem};
