//! Backend management

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::BackendConfig;
use crate::prometheus::PrometheusClient;
use crate::{Error, Result};

/// Registry of configured backends and their clients.
///
/// Built once at startup and shared behind an `Arc`; there is no way to add
/// or remove a backend afterwards.
#[derive(Debug, Default)]
pub struct BackendRegistry {
    /// Every configured backend, by name
    configs: BTreeMap<String, Arc<BackendConfig>>,
    /// Clients for backends that had a URL and built successfully
    clients: HashMap<String, Arc<PrometheusClient>>,
}

impl BackendRegistry {
    /// Build clients for every backend that has a URL.
    ///
    /// Backends without a URL, or whose client cannot be built, are skipped
    /// with a warning.
    #[must_use]
    pub fn init(configs: &HashMap<String, BackendConfig>) -> Self {
        Self::init_with(configs, PrometheusClient::new)
    }

    /// Like [`BackendRegistry::init`] with a custom client constructor
    pub fn init_with<F>(configs: &HashMap<String, BackendConfig>, mut build: F) -> Self
    where
        F: FnMut(&str, &BackendConfig) -> Result<PrometheusClient>,
    {
        // Sorted so startup logs come out in a stable order
        let configs: BTreeMap<String, Arc<BackendConfig>> = configs
            .iter()
            .map(|(name, config)| (name.clone(), Arc::new(config.clone())))
            .collect();

        let mut clients = HashMap::with_capacity(configs.len());
        for (name, config) in &configs {
            if config.url.trim().is_empty() {
                warn!(backend = %name, "Backend has no URL, skipping");
                continue;
            }

            match build(name.as_str(), config.as_ref()) {
                Ok(client) => {
                    info!(
                        backend = %name,
                        url = %client.base_url(),
                        auth = client.transport().profile().scheme(),
                        org_id = %config.org_id,
                        "Registered backend"
                    );
                    clients.insert(name.clone(), Arc::new(client));
                }
                Err(e) => {
                    warn!(backend = %name, error = %e, "Failed to create backend client, skipping");
                }
            }
        }

        Self { configs, clients }
    }

    /// Client for a configured backend
    ///
    /// # Errors
    ///
    /// Returns [`Error::ClientUnavailable`] if the backend has no client.
    pub fn client(&self, name: &str) -> Result<Arc<PrometheusClient>> {
        self.clients
            .get(name)
            .cloned()
            .ok_or_else(|| Error::ClientUnavailable(name.to_string()))
    }

    /// Configuration of a backend
    #[must_use]
    pub fn config(&self, name: &str) -> Option<&BackendConfig> {
        self.configs.get(name).map(AsRef::as_ref)
    }

    /// Configured backend names, sorted
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.configs.keys().cloned().collect()
    }

    /// Iterate configured backends in name order
    pub fn configs(&self) -> impl Iterator<Item = (&str, &BackendConfig)> {
        self.configs.iter().map(|(k, v)| (k.as_str(), v.as_ref()))
    }

    /// Number of configured backends
    #[must_use]
    pub fn len(&self) -> usize {
        self.configs.len()
    }

    /// Whether no backend is configured
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    /// Number of backends with a usable client
    #[must_use]
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }
}
