//! Logging and metric registration for binaries embedding the pipeline.

use metrics::describe_counter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Output format of the process-wide tracing subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

/// Installs the global tracing subscriber.
///
/// The filter comes from `RUST_LOG` and defaults to `info`. Events go to
/// stderr so they never mix with command output.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_tracing(format: LogFormat) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Pretty => registry
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .try_init()?,
        LogFormat::Json => registry
            .with(fmt::layer().json().with_current_span(true).with_writer(std::io::stderr))
            .try_init()?,
    }
    Ok(())
}

/// Registers descriptions for every counter the pipeline emits.
///
/// Call once after installing a `metrics` recorder.
pub fn describe_metrics() {
    describe_counter!(
        "warden_operations_total",
        "Operations completed, labelled by service and outcome"
    );
    describe_counter!(
        "warden_permission_denied_total",
        "Calls rejected by the permission guard"
    );
    describe_counter!(
        "warden_rate_limited_total",
        "Calls rejected by a rate-limit policy"
    );
    describe_counter!(
        "warden_tenant_fallback_total",
        "Queries scoped to the sentinel tenant because none was resolved"
    );
}
