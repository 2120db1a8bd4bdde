//! Asynchronous AI jobs: submission, polling and result merging.

mod orchestrator;
mod panel;
mod state;

pub use orchestrator::TaskOrchestrator;
pub use panel::AiTaskPanel;
pub use state::{PollPolicy, TaskState};
