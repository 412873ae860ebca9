//! `tracing`/`tracing-subscriber` setup, initialized once from `main()`
//! before anything else is wired up.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// JSON-formatted structured logs, filtered by `RUST_LOG` with a `torque=info`
/// default so a fresh checkout is quiet about dependencies but loud about
/// its own dispatch decisions.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("torque=info,tower_http=info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();
}
