//! Observability for the classroom session core.
//!
//! # Privacy by Default
//!
//! Run loops and network-bound operations use `#[instrument(skip_all)]` with
//! explicit safe fields (session and participant ids, event kinds). Chat text,
//! tokens and the API key are never recorded. Metric labels are bounded:
//! - `phase`: lifecycle phases (9 values)
//! - `kind`: event kinds (10 values)
//! - `feature`: recording, screen_share
//! - `operation`: transport calls (~12 values)
//!
//! # Metrics
//!
//! | Metric | Type | Labels | Purpose |
//! |--------|------|--------|---------|
//! | `classroom_phase_transitions_total` | Counter | `phase` | Lifecycle transitions |
//! | `classroom_channel_events_total` | Counter | `kind` | Events received from the transport |
//! | `classroom_publish_total` | Counter | `kind`, `status` | Outbound broadcasts |
//! | `classroom_duplicate_events_total` | Counter | `kind` | Re-deliveries ignored by managers |
//! | `classroom_toggle_total` | Counter | `feature`, `status` | Recording / screen-share toggles |
//! | `classroom_hand_queue_depth` | Gauge | none | Current hand-raise queue length |
//! | `classroom_transport_latency_seconds` | Histogram | `operation` | Transport call latency |
//!
//! The library records through the `metrics` facade only; installing a
//! recorder is up to the embedding application.

pub mod metrics;

use common::config::ObservabilityConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over `config.log_level` when set.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_tracing(config: &ObservabilityConfig) -> Result<(), String> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    let result = if config.json_logs {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };

    result.map_err(|e| format!("Failed to install tracing subscriber: {e}"))
}
