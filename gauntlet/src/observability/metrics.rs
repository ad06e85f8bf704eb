//! Prometheus metrics.
//!
//! Recording helpers are no-ops until [`init_metrics`] installs a recorder,
//! so library code records unconditionally.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::error::GauntletError;

static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Installs the global recorder.
///
/// With `Some(port)` a scrape endpoint is served on `127.0.0.1:<port>`.
///
/// # Errors
///
/// Returns `GauntletError::Io` if the recorder or listener cannot be
/// installed.
pub fn init_metrics(port: Option<u16>) -> Result<(), GauntletError> {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        tracing::debug!("metrics already initialized, skipping");
        return Ok(());
    }
    port.map_or_else(
        || PrometheusBuilder::new().install_recorder().map(|_| ()),
        |p| {
            PrometheusBuilder::new()
                .with_http_listener(([127, 0, 0, 1], p))
                .install()
        },
    )
    .map_err(|e| GauntletError::Io(std::io::Error::other(e.to_string())))?;

    describe_metrics();
    Ok(())
}

fn describe_metrics() {
    describe_counter!("gauntlet_sessions_total", "Terminal sessions opened");
    describe_gauge!("gauntlet_active_sessions", "Sessions currently connected");
    describe_counter!(
        "gauntlet_eligibility_total",
        "Eligibility pre-check outcomes"
    );
    describe_counter!(
        "gauntlet_step_transitions_total",
        "Step transitions by source and target index"
    );
    describe_counter!("gauntlet_conclusions_total", "Concluded runs by outcome");
    describe_histogram!(
        "gauntlet_session_duration_seconds",
        "Time from connection to conclusion"
    );
    describe_counter!(
        "gauntlet_background_tasks_total",
        "Background side effects by task and result"
    );
    describe_histogram!(
        "gauntlet_background_task_duration_seconds",
        "Background side effect duration"
    );
}

/// Records a newly opened session.
pub fn record_session_opened() {
    counter!("gauntlet_sessions_total").increment(1);
    gauge!("gauntlet_active_sessions").increment(1.0);
}

/// Records a closed session.
pub fn record_session_closed() {
    gauge!("gauntlet_active_sessions").decrement(1.0);
}

/// Records the eligibility verdict label.
pub fn record_eligibility(result: &'static str) {
    counter!("gauntlet_eligibility_total", "result" => result).increment(1);
}

/// Records a step transition.
///
/// Indices come from a fixed-length sequence, so label cardinality is
/// bounded.
pub fn record_step_transition(from: usize, to: usize) {
    counter!(
        "gauntlet_step_transitions_total",
        "from" => from.to_string(),
        "to" => to.to_string()
    )
    .increment(1);
}

/// Records a concluded run.
pub fn record_conclusion(outcome: &'static str, elapsed: Duration) {
    counter!("gauntlet_conclusions_total", "outcome" => outcome).increment(1);
    histogram!("gauntlet_session_duration_seconds", "outcome" => outcome)
        .record(elapsed.as_secs_f64());
}

/// Records a finished background task.
pub fn record_background_task(task: &'static str, success: bool, duration: Duration) {
    let result = if success { "ok" } else { "error" };
    counter!("gauntlet_background_tasks_total", "task" => task, "result" => result).increment(1);
    histogram!("gauntlet_background_task_duration_seconds", "task" => task)
        .record(duration.as_secs_f64());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_does_not_panic() {
        record_session_opened();
        record_eligibility("eligible");
        record_step_transition(0, 1);
        record_conclusion("failure", Duration::from_secs(61));
        record_background_task("persist", true, Duration::from_millis(12));
        record_session_closed();
    }
}
