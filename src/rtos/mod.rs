pub mod scheduler;
pub mod task;

pub use scheduler::Scheduler;
pub use task::{Task, TaskAction};
