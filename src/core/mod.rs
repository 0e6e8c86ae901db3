//! 核心编排层：错误、动作结果、单轮状态、提示词、阶段管线与 Turn Runner

pub mod action;
pub mod error;
pub mod orchestrator;
pub mod pipeline;
pub mod prompt;
pub mod state;

pub use action::{ActionContext, ActionResult, ActionStatus};
pub use error::CoreError;
pub use orchestrator::TurnRunner;
pub use pipeline::{is_low_signal, DEGRADED_RESPONSE, EMPTY_RESPONSE};
pub use state::{PlannedAction, TurnInput, TurnState};
