use log::{debug, warn};
use std::time::Duration;

use crate::config::Environment;

/// HTTP readiness probe against a VM's health endpoint (spec §4.3).
///
/// Grounded on `pool/maintenance.rs`'s `health_check` shape (read a target,
/// log, return a verdict), generalized here to a standalone pure-I/O probe
/// that returns a boolean instead of mutating a VM record in place — the
/// record mutation on ready/not-ready belongs to the staging-check loop
/// (`src/controller/staging.rs`), not to the probe itself.
pub struct ReadinessProbe {
    client: reqwest::Client,
    environment: Environment,
    boot_age_bound_seconds: u64,
}

impl ReadinessProbe {
    pub fn new(environment: Environment, boot_age_bound_seconds: u64) -> Self {
        Self {
            client: reqwest::Client::new(),
            environment,
            boot_age_bound_seconds,
        }
    }

    /// Build the health URL: replace the first `/` in `host` with `/health`
    /// and prefix `https://`.
    fn health_url(host: &str) -> String {
        match host.find('/') {
            Some(idx) => format!("https://{}/health{}", &host[..idx], &host[idx + 1..]),
            None => format!("https://{}/health", host),
        }
    }

    /// Returns `true` when the VM at `host` is ready to serve traffic.
    /// Any error — network, timeout, non-2xx — counts as not ready.
    pub async fn check(&self, host: &str) -> bool {
        let url = Self::health_url(host);

        let response = match self
            .client
            .get(&url)
            .timeout(Duration::from_secs(1))
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                debug!("readiness probe got non-2xx from {url}: {}", response.status());
                return false;
            }
            Err(e) => {
                debug!("readiness probe failed against {url}: {e}");
                return false;
            }
        };

        if self.environment != Environment::Production {
            return true;
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                warn!("readiness probe body read failed against {url}: {e}");
                return false;
            }
        };

        let boot_seconds: i64 = match body.trim().parse() {
            Ok(v) => v,
            Err(e) => {
                warn!("readiness probe body not a boot timestamp from {url}: {e}");
                return false;
            }
        };

        let now_seconds = chrono::Utc::now().timestamp();
        (now_seconds - boot_seconds) < self.boot_age_bound_seconds as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_url_replaces_first_slash() {
        assert_eq!(
            ReadinessProbe::health_url("10.0.0.1/control"),
            "https://10.0.0.1/health/control"
        );
        assert_eq!(
            ReadinessProbe::health_url("10.0.0.1"),
            "https://10.0.0.1/health"
        );
    }
}
