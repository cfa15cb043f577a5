//! `/health` endpoint.
//!
//! Reports whether readings are arriving, the supervisor state and the
//! ingestion counters as plain text.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use tracing::{debug, instrument};

use crate::state::SharedState;

/// Compact uptime such as `42s`, `17m 3s`, `5h 12m` or `3d 4h`.
fn format_uptime(secs: u64) -> String {
    let (days, rem) = (secs / 86_400, secs % 86_400);
    let (hours, rem) = (rem / 3_600, rem % 3_600);
    let (minutes, seconds) = (rem / 60, rem % 60);

    match (days, hours, minutes) {
        (0, 0, 0) => format!("{seconds}s"),
        (0, 0, m) => format!("{m}m {seconds}s"),
        (0, h, m) => format!("{h}h {m}m"),
        (d, h, _) => format!("{d}d {h}h"),
    }
}

/// Handler for the /health endpoint.
#[instrument(skip(state))]
pub async fn health_handler(State(state): State<SharedState>) -> impl IntoResponse {
    debug!("Processing /health request");

    let observer = *state.supervisor_state.borrow();
    let readings = state.stats.readings_total.get();

    let (status, headline) = if readings > 0 {
        (StatusCode::OK, "OK")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "Waiting for first reading")
    };
    debug!("Health: {} ({} readings, observer {})", status, readings, observer);

    let body = format!(
        "{headline}\n\nUptime: {}\nObserver: {observer}\nTotal power: {:.1} W\n\n{}",
        format_uptime(state.stats.get_uptime_seconds()),
        state.registry.total_power(),
        state.stats.render_table(),
    );

    (
        status,
        [("Content-Type", "text/plain; charset=utf-8")],
        body,
    )
}

#[cfg(test)]
mod tests {
    use super::format_uptime;

    #[test]
    fn test_format_uptime() {
        assert_eq!(format_uptime(0), "0s");
        assert_eq!(format_uptime(59), "59s");
        assert_eq!(format_uptime(61), "1m 1s");
        assert_eq!(format_uptime(3 * 3600 + 125), "3h 2m");
        assert_eq!(format_uptime(2 * 86_400 + 7 * 3600 + 59), "2d 7h");
    }
}
