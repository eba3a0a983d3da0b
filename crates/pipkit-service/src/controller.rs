use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use pipkit_core::errors::ServiceError;
use tracing::{debug, info, warn};

use crate::config::ForegroundServiceConfig;

/// Notification id the service posts under.
pub const NOTIFICATION_ID: u32 = 1668;

// MARK: - Service types

/// Foreground service type flags, combined by OR into one mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceType {
    Camera,
    Microphone,
}

impl ServiceType {
    pub fn flag(self) -> u32 {
        match self {
            ServiceType::Camera => 0x40,
            ServiceType::Microphone => 0x80,
        }
    }

    fn required_permission(self) -> Permission {
        match self {
            ServiceType::Camera => Permission::Camera,
            ServiceType::Microphone => Permission::RecordAudio,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    Camera,
    RecordAudio,
}

pub trait PermissionProbe: Send + Sync {
    fn is_granted(&self, permission: Permission) -> bool;
}

/// Platform side: actually starts and stops the service.
pub trait ServiceHost: Send + Sync {
    fn start(&self, request: &ServiceStartRequest) -> Result<(), ServiceError>;
    fn stop(&self) -> Result<(), ServiceError>;
}

// MARK: - ServiceStartRequest

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceStartRequest {
    pub notification_id: u32,
    pub channel_id: String,
    pub channel_name: String,
    pub notification_title: String,
    pub notification_content: String,
    /// Never empty; an empty set stops the service instead.
    pub service_types: Vec<ServiceType>,
    /// Whether a screen-capture session may run alongside the service.
    pub screen_capture_active: bool,
}

impl ServiceStartRequest {
    pub fn type_mask(&self) -> u32 {
        self.service_types.iter().fold(0, |mask, t| mask | t.flag())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceStatus {
    Started { type_mask: u32 },
    Stopped,
}

// MARK: - ForegroundServiceController

pub struct ForegroundServiceController {
    host: Arc<dyn ServiceHost>,
    permissions: Arc<dyn PermissionProbe>,
    screen_capture_active: AtomicBool,
}

impl ForegroundServiceController {
    pub fn new(host: Arc<dyn ServiceHost>, permissions: Arc<dyn PermissionProbe>) -> Self {
        Self { host, permissions, screen_capture_active: AtomicBool::new(false) }
    }

    /// Starts (or restarts) the service for `config`.
    ///
    /// Camera and microphone types are only requested when their permission
    /// is granted. With nothing left to cover the service is stopped.
    pub fn start(&self, config: &ForegroundServiceConfig) -> Result<ServiceStatus, ServiceError> {
        let service_types = self.granted_types(config);
        if service_types.is_empty() {
            debug!("No foreground service type granted — stopping service");
            self.stop()?;
            return Ok(ServiceStatus::Stopped);
        }

        let request = ServiceStartRequest {
            notification_id: NOTIFICATION_ID,
            channel_id: config.channel_id.clone(),
            channel_name: config.channel_name.clone(),
            notification_title: config.notification_title.clone(),
            notification_content: config.notification_content.clone(),
            service_types,
            screen_capture_active: config.enable_screen_sharing,
        };
        let type_mask = request.type_mask();

        self.host.start(&request)?;
        self.screen_capture_active.store(request.screen_capture_active, Ordering::SeqCst);
        info!("Foreground service started (types {:#x})", type_mask);
        Ok(ServiceStatus::Started { type_mask })
    }

    pub fn stop(&self) -> Result<(), ServiceError> {
        self.screen_capture_active.store(false, Ordering::SeqCst);
        self.host.stop().map_err(|e| {
            warn!("{}", e);
            e
        })?;
        info!("Foreground service stopped");
        Ok(())
    }

    /// Screen-capture flag of the last successful start.
    pub fn screen_capture_active(&self) -> bool {
        self.screen_capture_active.load(Ordering::SeqCst)
    }

    fn granted_types(&self, config: &ForegroundServiceConfig) -> Vec<ServiceType> {
        [
            (config.enable_camera, ServiceType::Camera),
            (config.enable_microphone, ServiceType::Microphone),
        ]
        .into_iter()
        .filter(|(wanted, _)| *wanted)
        .map(|(_, service_type)| service_type)
        .filter(|service_type| {
            let granted = self.permissions.is_granted(service_type.required_permission());
            if !granted {
                debug!("{:?} service type skipped: permission not granted", service_type);
            }
            granted
        })
        .collect()
    }
}
