//! Prometheus recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the global Prometheus recorder.
///
/// Call once at startup, before anything records.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render the Prometheus text exposition.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

/// Requests handled (counter, labels: event).
pub const REQUESTS_TOTAL: &str = "bridge_requests_total";
/// Error responses sent (counter, labels: subtype).
pub const REQUEST_ERRORS_TOTAL: &str = "bridge_request_errors_total";
/// Commands invoked (counter, labels: command).
pub const COMMANDS_TOTAL: &str = "bridge_commands_total";
/// Command failures (counter, labels: command, error_type).
pub const COMMAND_ERRORS_TOTAL: &str = "bridge_command_errors_total";
/// Command duration seconds (histogram, labels: command).
pub const COMMAND_DURATION_SECONDS: &str = "bridge_command_duration_seconds";
/// Connections accepted (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "bridge_ws_connections_total";
/// Connections closed (counter, labels: reason).
pub const WS_DISCONNECTIONS_TOTAL: &str = "bridge_ws_disconnections_total";
/// Open connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "bridge_ws_connections_active";
/// Upgrades refused at the connection limit (counter).
pub const WS_CONNECTIONS_REFUSED_TOTAL: &str = "bridge_ws_connections_refused_total";
/// Pushes enqueued (counter, labels: module).
pub const PUSHES_TOTAL: &str = "bridge_pushes_total";
/// Sessions closed on a full outbound queue (counter).
pub const PUSH_OVERFLOWS_TOTAL: &str = "bridge_push_overflows_total";
/// Change notifications lost to lag (counter).
pub const DISPATCH_LAGGED_TOTAL: &str = "bridge_dispatch_lagged_total";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_recorder_renders() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, || {
            metrics::counter!(PUSHES_TOTAL, "module" => "cpu").increment(2);
        });
        let text = render(&handle);
        assert!(text.contains("bridge_pushes_total"));
    }

    #[test]
    fn names_are_prefixed_snake_case() {
        let names = [
            REQUESTS_TOTAL,
            REQUEST_ERRORS_TOTAL,
            COMMANDS_TOTAL,
            COMMAND_ERRORS_TOTAL,
            COMMAND_DURATION_SECONDS,
            WS_CONNECTIONS_TOTAL,
            WS_DISCONNECTIONS_TOTAL,
            WS_CONNECTIONS_ACTIVE,
            WS_CONNECTIONS_REFUSED_TOTAL,
            PUSHES_TOTAL,
            PUSH_OVERFLOWS_TOTAL,
            DISPATCH_LAGGED_TOTAL,
        ];
        for name in names {
            assert!(name.starts_with("bridge_"));
            assert!(
                name.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "metric name '{name}' must be snake_case"
            );
        }
    }
}
