//! Keeps an ongoing call alive while its UI is backgrounded or in overlay.
//!
//! The host platform runs the actual service; this crate decides what to ask
//! for (which service types, which notification) from the caller's config and
//! the permissions actually granted.

pub mod config;
pub mod controller;

pub use config::ForegroundServiceConfig;
pub use controller::{
    ForegroundServiceController, Permission, PermissionProbe, ServiceHost, ServiceStartRequest,
    ServiceStatus, ServiceType, NOTIFICATION_ID,
};
