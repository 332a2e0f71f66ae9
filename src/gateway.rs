//! Gateway runtime: registry construction and server lifecycle

use std::sync::Arc;

use crate::api::ApiServerBuilder;
use crate::config::Config;
use crate::devices::DeviceRegistry;
use crate::{Error, Result};

/// Running gateway: a populated registry plus the HTTP front end
pub struct Gateway {
    config: Config,
    registry: Arc<DeviceRegistry>,
}

impl Gateway {
    /// Build the registry from configuration
    ///
    /// # Errors
    ///
    /// Returns error if any configured device is invalid
    pub async fn new(config: Config) -> Result<Self> {
        let registry = Arc::new(build_registry(&config).await?);
        Ok(Self { config, registry })
    }

    /// Device registry shared with the API
    #[must_use]
    pub fn registry(&self) -> Arc<DeviceRegistry> {
        self.registry.clone()
    }

    /// Serve the API until Ctrl-C or a server failure
    ///
    /// # Errors
    ///
    /// Returns error if the server fails to bind or stops unexpectedly
    pub async fn run(self) -> Result<()> {
        if self.registry.is_empty().await {
            tracing::warn!("no devices configured; add [devices.<id>] entries or set RPA_DEVICES");
        }

        let server = ApiServerBuilder::new(self.registry.clone())
            .apps(self.config.apps.clone())
            .server(self.config.server.clone())
            .build()
            .spawn();

        tokio::select! {
            result = server => {
                result.map_err(|e| Error::Config(format!("API server task failed: {e}")))??;
            }
            signal = tokio::signal::ctrl_c() => {
                signal?;
                tracing::info!("shutdown requested");
            }
        }

        Ok(())
    }
}

/// Register every configured device, in order
///
/// # Errors
///
/// Returns error on the first invalid device
pub async fn build_registry(config: &Config) -> Result<DeviceRegistry> {
    let registry = DeviceRegistry::new(config.client.clone());
    for device in &config.devices {
        registry.register(device.clone()).await?;
    }
    Ok(registry)
}
