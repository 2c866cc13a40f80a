//! Where remote manifest data comes from

use std::sync::OnceLock;
use std::thread;
use std::time::Duration;

use crate::config::{ManifestConfig, NetworkConfig};
use crate::error::{ArmoryError, Result};

/// Remote endpoints the pipeline reads from
///
/// Every error returned here is transient from the pipeline's point of view:
/// it falls back to the cache or bundled manifest and reports a warning.
pub trait ManifestSource {
    /// Fetch the descriptor document
    fn fetch_descriptor(&self) -> Result<Vec<u8>>;

    /// Fetch the manifest body
    fn fetch_body(&self) -> Result<Vec<u8>>;
}

/// HTTPS source with a per-request timeout and one retry
///
/// The HTTP client is built on the first request, so an offline run
/// never sets up TLS.
pub struct HttpSource {
    client: OnceLock<reqwest::blocking::Client>,
    timeout: Duration,
    descriptor_url: String,
    manifest_url: String,
    retry_backoff: Duration,
}

impl HttpSource {
    pub fn new(manifest: &ManifestConfig, network: &NetworkConfig) -> Self {
        Self {
            client: OnceLock::new(),
            timeout: network.timeout(),
            descriptor_url: manifest.descriptor_url.clone(),
            manifest_url: manifest.manifest_url.clone(),
            retry_backoff: network.retry_backoff(),
        }
    }

    fn client(&self) -> Result<&reqwest::blocking::Client> {
        if let Some(client) = self.client.get() {
            return Ok(client);
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .user_agent(format!("armory/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ArmoryError::Network(format!("cannot build HTTP client: {}", e)))?;
        Ok(self.client.get_or_init(|| client))
    }

    fn get_with_retry(&self, url: &str) -> Result<Vec<u8>> {
        match self.get(url) {
            Ok(bytes) => Ok(bytes),
            Err(first) => {
                tracing::debug!(url, error = %first, "request failed, retrying once");
                thread::sleep(self.retry_backoff);
                self.get(url)
            }
        }
    }

    fn get(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client()?
            .get(url)
            .send()
            .map_err(|e| ArmoryError::Network(format!("{}: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(ArmoryError::Network(format!(
                "{} returned {}",
                url,
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .map_err(|e| ArmoryError::Network(format!("{}: {}", url, e)))?;
        Ok(bytes.to_vec())
    }
}

impl ManifestSource for HttpSource {
    fn fetch_descriptor(&self) -> Result<Vec<u8>> {
        self.get_with_retry(&self.descriptor_url)
    }

    fn fetch_body(&self) -> Result<Vec<u8>> {
        self.get_with_retry(&self.manifest_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_unreachable_host_is_network_error_after_retry() {
        let manifest = ManifestConfig {
            // Port 9 on loopback refuses immediately
            descriptor_url: "http://127.0.0.1:9/latest.json".to_string(),
            manifest_url: "http://127.0.0.1:9/manifest.json".to_string(),
            ..ManifestConfig::default()
        };
        let network = NetworkConfig {
            timeout_secs: 1,
            retry_backoff_ms: 50,
        };
        let source = HttpSource::new(&manifest, &network);

        let started = Instant::now();
        let err = source.fetch_descriptor().unwrap_err();
        assert!(matches!(err, ArmoryError::Network(_)));
        assert!(err.kind().is_retryable());
        assert!(started.elapsed() >= Duration::from_millis(50));
        assert!(source.client.get().is_some());
    }

    #[test]
    fn test_offline_run_never_builds_client() {
        let temp = tempfile::TempDir::new().unwrap();
        let mut config = crate::config::ArmoryConfig::default();
        config.manifest.cache_dir = Some(temp.path().to_path_buf());
        let pipeline = crate::manifest::ManifestPipeline::from_config(&config).unwrap();

        let report = pipeline
            .run(&crate::manifest::PipelineOptions::new(true, true))
            .unwrap();

        assert!(!report.trace.contains(&"fetch_remote_descriptor"));
        assert!(pipeline.source().client.get().is_none());
    }
}
