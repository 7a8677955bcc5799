//! Network condition simulation.
//!
//! Only the offline switch changes behaviour: it forces every matched route
//! to answer 503. Latency and throughput fields are accepted so suites can
//! describe the profile they want, but they only produce a warning.

use crate::request::MockResponse;
use crate::server::MockServer;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Status returned for every matched request while offline.
pub const OFFLINE_STATUS: u16 = 503;

/// Simulated network profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NetworkConditions {
    #[serde(default)]
    pub offline: bool,
    #[serde(default)]
    pub latency_ms: Option<u64>,
    #[serde(default)]
    pub download_kbps: Option<u64>,
    #[serde(default)]
    pub upload_kbps: Option<u64>,
}

impl NetworkConditions {
    pub fn offline() -> Self {
        Self {
            offline: true,
            ..Default::default()
        }
    }

    pub fn with_latency_ms(mut self, latency_ms: u64) -> Self {
        self.latency_ms = Some(latency_ms);
        self
    }

    pub fn with_throughput_kbps(mut self, download_kbps: u64, upload_kbps: u64) -> Self {
        self.download_kbps = Some(download_kbps);
        self.upload_kbps = Some(upload_kbps);
        self
    }

    fn shapes_traffic(&self) -> bool {
        self.latency_ms.is_some() || self.download_kbps.is_some() || self.upload_kbps.is_some()
    }
}

/// Apply `conditions` to `server`.
///
/// Offline mode installs a response interceptor and stays active until the
/// server is reset. Unmatched requests keep their 404.
pub fn simulate_network_conditions(server: &MockServer, conditions: &NetworkConditions) {
    if conditions.offline {
        server.add_response_interceptor(|response: &MockResponse| {
            Some(response.clone().with_status(OFFLINE_STATUS))
        });
        info!("Simulating offline network");
    }

    if conditions.shapes_traffic() {
        warn!(
            latency_ms = ?conditions.latency_ms,
            download_kbps = ?conditions.download_kbps,
            upload_kbps = ?conditions.upload_kbps,
            "Global latency and throughput simulation is not supported, use per-route delay_ms"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerSettings;

    #[test]
    fn test_offline_installs_interceptor() {
        let server = MockServer::new(ServerSettings::new("127.0.0.1", 0));
        simulate_network_conditions(&server, &NetworkConditions::offline());
        assert_eq!(server.interceptor_counts(), (0, 1));

        server.reset();
        assert_eq!(server.interceptor_counts(), (0, 0));
    }

    #[test]
    fn test_shaping_only_is_a_no_op() {
        let server = MockServer::new(ServerSettings::new("127.0.0.1", 0));
        let conditions = NetworkConditions::default()
            .with_latency_ms(300)
            .with_throughput_kbps(750, 250);
        assert!(conditions.shapes_traffic());

        simulate_network_conditions(&server, &conditions);
        assert_eq!(server.interceptor_counts(), (0, 0));
    }

    #[test]
    fn test_deserialize_conditions() {
        let conditions: NetworkConditions =
            serde_json::from_str(r#"{"offline": true, "latency_ms": 100}"#).unwrap();
        assert!(conditions.offline);
        assert_eq!(conditions.latency_ms, Some(100));
        assert_eq!(conditions.download_kbps, None);
    }
}
