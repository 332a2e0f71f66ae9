//! Device registry for tracking configured devices

use std::sync::Arc;

use futures::future::join_all;
use indexmap::IndexMap;
use serde_json::Value;
use tokio::sync::RwLock;

use super::client::{ClientSettings, DeviceClient};
use super::types::{DeviceInfo, DeviceRegistration, DeviceStatus, TaskKind, TaskResult};
use crate::{Error, Result};

#[derive(Debug)]
struct DeviceEntry {
    info: DeviceInfo,
    client: Arc<DeviceClient>,
}

/// Registry of devices keyed by id, in registration order
///
/// The map lock is only held to read or swap entries, never across device
/// I/O, so a slow device never stalls lookups of another one.
#[derive(Debug)]
pub struct DeviceRegistry {
    devices: RwLock<IndexMap<String, DeviceEntry>>,
    settings: ClientSettings,
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new(ClientSettings::default())
    }
}

impl DeviceRegistry {
    /// Create an empty registry whose clients use `settings`
    #[must_use]
    pub fn new(settings: ClientSettings) -> Self {
        Self {
            devices: RwLock::new(IndexMap::new()),
            settings,
        }
    }

    /// Register a device, replacing any entry with the same id
    ///
    /// A fresh client is built for the endpoint every time.
    ///
    /// # Errors
    ///
    /// Returns error if the id is empty, the endpoint is not an http(s) URL,
    /// or the HTTP client cannot be built
    pub async fn register(&self, registration: DeviceRegistration) -> Result<Arc<DeviceClient>> {
        let id = registration.id.trim().to_string();
        if id.is_empty() {
            return Err(Error::InvalidDevice("device id must not be empty".to_string()));
        }
        validate_endpoint(&id, &registration.endpoint_address)?;

        let client = Arc::new(
            DeviceClient::new(&registration.endpoint_address, self.settings.clone())?
                .with_default_app(registration.target_app.clone()),
        );

        let info = DeviceInfo {
            display_name: registration
                .display_name
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| id.clone()),
            endpoint_address: client.api_base().to_string(),
            target_app: registration.target_app,
            adb_serial: registration.adb_serial,
            id: id.clone(),
        };

        tracing::info!(device_id = %id, endpoint = %info.endpoint_address, "device registered");

        let entry = DeviceEntry {
            info,
            client: client.clone(),
        };
        self.devices.write().await.insert(id, entry);

        Ok(client)
    }

    /// Remove a device; returns whether it was registered
    pub async fn unregister(&self, id: &str) -> bool {
        let removed = self.devices.write().await.shift_remove(id).is_some();
        if removed {
            tracing::info!(device_id = %id, "device removed");
        }
        removed
    }

    /// Resolve a device id to its client
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceNotFound`] if the id is not registered
    pub async fn resolve(&self, id: &str) -> Result<Arc<DeviceClient>> {
        self.devices
            .read()
            .await
            .get(id)
            .map(|entry| entry.client.clone())
            .ok_or_else(|| Error::DeviceNotFound(id.to_string()))
    }

    /// List all registered devices in registration order
    pub async fn list_all(&self) -> Vec<DeviceInfo> {
        self.devices
            .read()
            .await
            .values()
            .map(|entry| entry.info.clone())
            .collect()
    }

    /// Ids of devices that answer and have accessibility enabled
    ///
    /// Checks run concurrently; the result keeps registration order.
    pub async fn list_online(&self) -> Vec<String> {
        let devices = self.snapshot().await;
        let checks = devices.iter().map(|(_, client)| client.is_ready());
        let ready = join_all(checks).await;

        devices
            .into_iter()
            .zip(ready)
            .filter_map(|((id, _), ready)| ready.then_some(id))
            .collect()
    }

    /// Query one device's status
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceNotFound`] for unknown ids and
    /// [`Error::Connection`] if the device does not answer
    pub async fn status(&self, id: &str) -> Result<DeviceStatus> {
        self.resolve(id).await?.query_status().await
    }

    /// Fire `kind` at every online device without waiting for completion
    ///
    /// Offline devices are left out of the result. Each device is called
    /// independently; one failing never affects the others.
    pub async fn broadcast(&self, kind: TaskKind, params: Value) -> IndexMap<String, TaskResult> {
        let online = self.list_online().await;

        let mut targets = Vec::with_capacity(online.len());
        for id in online {
            // Removed between the readiness check and dispatch
            if let Ok(client) = self.resolve(&id).await {
                targets.push((id, client));
            }
        }

        let calls = targets
            .iter()
            .map(|(_, client)| client.call(kind, params.clone(), false));
        let results = join_all(calls).await;

        tracing::info!(?kind, devices = results.len(), "broadcast dispatched");

        targets
            .into_iter()
            .map(|(id, _)| id)
            .zip(results)
            .collect()
    }

    /// Number of registered devices
    pub async fn len(&self) -> usize {
        self.devices.read().await.len()
    }

    /// Whether no device is registered
    pub async fn is_empty(&self) -> bool {
        self.devices.read().await.is_empty()
    }

    async fn snapshot(&self) -> Vec<(String, Arc<DeviceClient>)> {
        self.devices
            .read()
            .await
            .iter()
            .map(|(id, entry)| (id.clone(), entry.client.clone()))
            .collect()
    }
}

fn validate_endpoint(id: &str, endpoint: &str) -> Result<()> {
    let parsed = url::Url::parse(endpoint.trim()).map_err(|e| {
        Error::InvalidDevice(format!("device '{id}': bad endpoint '{endpoint}': {e}"))
    })?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(Error::InvalidDevice(format!(
            "device '{id}': endpoint must be http or https, got '{}'",
            parsed.scheme()
        )));
    }

    Ok(())
}
