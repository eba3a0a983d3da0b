use thiserror::Error;

use crate::types::{NodeId, SurfaceId};

#[derive(Error, Debug)]
pub enum PipError {
    #[error("Malformed configuration payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("Render pipeline error: {0}")]
    Render(#[from] RenderError),

    #[error("Visual tree error: {0}")]
    Tree(#[from] TreeError),

    #[error("Window system error: {0}")]
    Window(#[from] WindowError),

    #[error("Foreground service error: {0}")]
    Service(#[from] ServiceError),
}

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Failed to initialise {surface}: {reason}")]
    InitializationFailed { surface: SurfaceId, reason: String },

    #[error("Failed to attach source '{source_id}' to {surface}: {reason}")]
    AttachFailed { source_id: String, surface: SurfaceId, reason: String },

    #[error("Failed to detach source '{source_id}' from {surface}: {reason}")]
    DetachFailed { source_id: String, surface: SurfaceId, reason: String },

    #[error("Unknown surface {0}")]
    UnknownSurface(SurfaceId),
}

#[derive(Error, Debug)]
pub enum TreeError {
    #[error("Node {0} is not in the visual tree")]
    NodeNotFound(NodeId),

    #[error("Visual tree rejected the operation: {reason}")]
    Rejected { reason: String },
}

#[derive(Error, Debug)]
pub enum WindowError {
    #[error("Window system rejected overlay mode: {reason}")]
    OverlayRejected { reason: String },

    #[error("Capability not supported by this window system: {capability}")]
    Unsupported { capability: String },
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Failed to start foreground service: {reason}")]
    StartFailed { reason: String },
}
