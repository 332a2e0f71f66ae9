//! Device fleet: per-device task clients and the registry that owns them
//!
//! Each Android device runs an HTTP task endpoint in front of its
//! accessibility service. The gateway reaches it through a [`DeviceClient`];
//! the [`DeviceRegistry`] maps device ids to clients and fans work out
//! across the fleet.

pub mod client;
pub mod registry;
pub mod retry;
pub mod types;

pub use client::{ClientSettings, DeviceClient};
pub use registry::DeviceRegistry;
pub use retry::RetryPolicy;
pub use types::{
    DeviceInfo, DeviceRegistration, DeviceStatus, FailureKind, TaskKind, TaskResult,
};
