//! Step progression engine.
//!
//! [`StepManager`] owns the ordered step list and the current index. It is
//! driven exclusively by the session loop that owns it, so no state here
//! is shared across tasks.

pub mod manager;
pub mod state;

pub use manager::StepManager;
pub use state::{Conclusion, EngineState, Progress, StepTransition, Verdict};
