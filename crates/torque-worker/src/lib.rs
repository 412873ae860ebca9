//! Worker pool and poller: the two components that turn durable task
//! records into outbound HTTP calls and back into durable state transitions.

mod dispatch;
mod pool;
mod poller;

pub use dispatch::{build_client, dispatch_once, Outcome, TASK_ID_HEADER};
pub use pool::{WorkerConfig, WorkerPool};
pub use poller::{Poller, PollerConfig};
