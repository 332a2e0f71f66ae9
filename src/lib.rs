//! RPA Gateway - Multi-device task dispatch for Android chat automation
//!
//! Each Android device runs a small HTTP task endpoint that drives a chat
//! app (personal or enterprise messenger) through the accessibility service.
//! This crate is the coordinator in front of a fleet of such devices:
//! - Device clients that submit tasks, poll for results and retry transport faults
//! - A registry mapping device ids to clients, with online checks and broadcast
//! - An HTTP API exposing one route group per chat app
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                     Callers                          │
//! │      scripts  │  dashboards  │  other services       │
//! └────────────────────┬────────────────────────────────┘
//!                      │ /api/{wechat,wework,...}
//! ┌────────────────────▼────────────────────────────────┐
//! │                   RPA Gateway                        │
//! │     API  │  Device Registry  │  Device Clients       │
//! └────────────────────┬────────────────────────────────┘
//!                      │ submit + poll
//! ┌────────────────────▼────────────────────────────────┐
//! │           Device task endpoints (one per phone)      │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod config;
pub mod devices;
pub mod error;
pub mod gateway;

pub use config::{AppNamespace, Config};
pub use devices::{
    ClientSettings, DeviceClient, DeviceInfo, DeviceRegistration, DeviceRegistry, DeviceStatus,
    FailureKind, RetryPolicy, TaskKind, TaskResult,
};
pub use error::{Error, Result};
pub use gateway::Gateway;
