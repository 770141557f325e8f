//! Stagehand control plane.
//!
//! Decides which agent actions run automatically and which wait for a human:
//! - [`queue`]: human-review action queue with TTL expiry
//! - [`runtime`]: goal scheduling, auto-chat budget, suspend/resume
//! - [`playbook`]: metric-triggered multi-step remediation runs
//! - [`control_plane`]: facade composing the three
//! - [`scheduler`]: async loop driving goals and playbooks

pub mod capabilities;
pub mod control_plane;
pub mod error;
pub mod playbook;
pub mod queue;
pub mod runtime;
pub mod scheduler;
pub mod types;

pub use capabilities::{build_capabilities, Capabilities};
pub use control_plane::{ControlPlane, OpsPlaybooksSnapshot, RuntimeSnapshot};
pub use error::{ControlError, DispatchError};
pub use playbook::{ActionPort, PlaybookEngine, PlaybookState};
pub use queue::ActionQueue;
pub use runtime::budget::{BudgetDecision, BudgetReason};
pub use runtime::AutonomyRuntime;
pub use scheduler::{ChatDispatcher, Scheduler, TickReport};
pub use types::*;
