//! `GET /health` (§6 ambient endpoints).

use std::time::Instant;

use serde::Serialize;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime_secs: u64,
}

#[must_use]
pub fn health_check(start_time: Instant) -> HealthResponse {
    HealthResponse {
        status: "ok",
        uptime_secs: start_time.elapsed().as_secs(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_ok_status() {
        let response = health_check(Instant::now());
        assert_eq!(response.status, "ok");
    }
}
