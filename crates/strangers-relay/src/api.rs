//! HTTP API.
//!
//! Endpoints:
//! - GET /api/stats — pool, session and connection counters

use axum::{Json, extract::State};
use serde::Serialize;
use std::sync::Arc;

use crate::relay::RelayState;

/// Response for GET /api/stats.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub waiting: usize,
    pub sessions: usize,
    /// Sessions waiting on a dropped member.
    pub paused: usize,
    pub connections: usize,
    pub version: &'static str,
    pub uptime_secs: u64,
}

/// GET /api/stats — live counters.
pub async fn get_stats(State(state): State<Arc<RelayState>>) -> Json<StatsResponse> {
    let stats = state.stats().await;
    Json(StatsResponse {
        waiting: stats.waiting,
        sessions: stats.sessions,
        paused: stats.paused,
        connections: stats.connections,
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::SqliteDirectory;
    use crate::push::DisabledPush;
    use std::path::Path;
    use strangers_core::CoordinatorConfig;

    #[tokio::test]
    async fn stats_reflect_waiting_connections() {
        let directory = SqliteDirectory::open(Path::new(":memory:")).unwrap();
        let state = RelayState::new(CoordinatorConfig::default(), Arc::new(directory), Arc::new(DisabledPush));
        let _rx = state.attach("a".into(), None).await;

        let Json(stats) = get_stats(State(state)).await;
        assert_eq!(stats.waiting, 1);
        assert_eq!(stats.connections, 1);
        assert_eq!(stats.sessions, 0);
        assert_eq!(stats.version, env!("CARGO_PKG_VERSION"));
    }
}
