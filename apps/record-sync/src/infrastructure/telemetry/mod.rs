//! Tracing Integration
//!
//! Subscriber setup for hosts that do not install their own. Respects
//! `RUST_LOG` on top of a default `record_sync=info` directive.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Initialize the tracing subscriber.
///
/// Safe to call more than once: if a global subscriber is already
/// installed (a host app or an earlier test), the existing one is kept
/// and this call is a no-op.
#[allow(clippy::expect_used)]
pub fn init() {
    let env_filter = EnvFilter::from_default_env().add_directive(
        "record_sync=info"
            .parse()
            .expect("static directive 'record_sync=info' is valid"),
    );

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init();
}
