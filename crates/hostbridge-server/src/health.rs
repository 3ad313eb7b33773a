//! `/health` endpoint body.

use std::time::Instant;

use serde::Serialize;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// `"ok"` while serving.
    pub status: String,
    /// Seconds since start.
    pub uptime_secs: u64,
    /// Open client connections.
    pub connections: usize,
    /// Modules whose last sample succeeded.
    pub modules_ok: usize,
}

/// Build a health response from live counters.
pub fn health_check(start_time: Instant, connections: usize, modules_ok: usize) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        uptime_secs: start_time.elapsed().as_secs(),
        connections,
        modules_ok,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uptime_counts_from_start() {
        let start = Instant::now()
            .checked_sub(std::time::Duration::from_secs(60))
            .unwrap();
        assert!(health_check(start, 0, 0).uptime_secs >= 59);
        assert!(health_check(Instant::now(), 0, 0).uptime_secs < 2);
    }

    #[test]
    fn serializes_snake_case() {
        let json = serde_json::to_value(health_check(Instant::now(), 2, 7)).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["connections"], 2);
        assert_eq!(json["modules_ok"], 7);
        assert!(json["uptime_secs"].is_number());
    }
}
