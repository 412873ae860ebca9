//! Domain types, traits and configuration shared by every crate in this
//! workspace.
//!
//! Torque dispatches durable tasks by issuing outbound HTTP POSTs to a target
//! URL and classifying the response to drive completed/retry/failed
//! transitions. This crate defines the vocabulary every other crate builds
//! on:
//!
//! - [`Task`] / [`TaskStatus`] / [`BackoffPolicy`]: the data model.
//! - [`TaskStore`]: the durable, transactional record every component reads
//!   and mutates through. `torque-store-postgres` provides the
//!   production implementation; [`testing::InMemoryTaskStore`] backs unit
//!   tests.
//! - [`NotifyBus`]: the best-effort push channel that lets workers skip a
//!   poll interval when the store and bus agree a task is ready.
//!   `torque-notify` provides Postgres LISTEN/NOTIFY and in-process
//!   implementations.
//! - [`backoff::compute_delay`]: the retry scheduling function.
//! - [`Config`]: environment-driven runtime configuration.
//! - [`TorqueError`]: the error kinds every component classifies into.
//!
//! None of these traits depend on sqlx, reqwest or axum directly. Those
//! live in the crates that actually need them, keeping this crate usable
//! from tests without a database or network.

mod backoff;
mod config;
mod error;
mod notify;
mod store;
mod task;

pub mod testing;

pub use backoff::{compute_delay, jitter};
pub use config::Config;
pub use error::{LogLevel, Result, TorqueError};
pub use notify::NotifyBus;
pub use store::TaskStore;
pub use task::{BackoffPolicy, Claim, Header, NewTask, Task, TaskStats, TaskStatus};
