//! Handlers for the five routes this service exposes. Each is a thin
//! translation from axum's extractors to `Dispatcher`/`TaskStore` calls and
//! back to a JSON response. No business logic lives here.

mod enqueue;
mod stats;
mod tasks;

pub use enqueue::enqueue;
pub use stats::stats;
pub use tasks::{delete_all, delete_task, get_task};
