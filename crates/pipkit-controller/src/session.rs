//! Per-overlay resources and the saved appearance of the root tree.

use pipkit_core::{NodeId, SurfaceId, Visibility};
use pipkit_render::{SourceHandle, SurfaceHandle};
use tracing::{debug, warn};

use crate::host::VisualTree;

/// Progress of binding the session's source to its surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AttachState {
    /// Not dispatched yet (surface not initialised).
    #[default]
    Idle,
    /// Dispatched to the pipeline, completion not seen yet.
    Pending,
    Attached,
    /// Initialisation or attach failed. Never retried for this session.
    Failed,
}

/// Resources that exist only while overlay mode is active.
#[derive(Debug)]
pub(crate) struct OverlaySession {
    pub(crate) source: SourceHandle,
    pub(crate) container: Option<NodeId>,
    pub(crate) surface: Option<SurfaceHandle>,
    pub(crate) surface_node: Option<NodeId>,
    pub(crate) saved_visibility: Vec<(NodeId, Visibility)>,
    pub(crate) initialized: bool,
    pub(crate) revealed: bool,
    pub(crate) attach: AttachState,
}

impl OverlaySession {
    pub(crate) fn new(source: SourceHandle, saved_visibility: Vec<(NodeId, Visibility)>) -> Self {
        Self {
            source,
            container: None,
            surface: None,
            surface_node: None,
            saved_visibility,
            initialized: false,
            revealed: false,
            attach: AttachState::Idle,
        }
    }

    pub(crate) fn surface_id(&self) -> Option<SurfaceId> {
        self.surface.as_ref().map(SurfaceHandle::id)
    }

    pub(crate) fn owns_surface(&self, surface: SurfaceId) -> bool {
        self.surface_id() == Some(surface)
    }

    pub(crate) fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            source: self.source.id().to_owned(),
            surface: self.surface_id(),
            container: self.container,
            surface_node: self.surface_node,
            saved_children: self.saved_visibility.len(),
            initialized: self.initialized,
            revealed: self.revealed,
            attach: self.attach,
        }
    }
}

/// Read-only view of the active session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub source: String,
    pub surface: Option<SurfaceId>,
    pub container: Option<NodeId>,
    pub surface_node: Option<NodeId>,
    pub saved_children: usize,
    pub initialized: bool,
    pub revealed: bool,
    pub attach: AttachState,
}

impl SessionSnapshot {
    pub fn source_attached(&self) -> bool {
        self.attach == AttachState::Attached
    }
}

// ── Root tree visibility ──────────────────────────────────────────────────────

/// Hides every direct child of the root and returns what it saw, in order.
pub(crate) fn hide_children(tree: &dyn VisualTree) -> Vec<(NodeId, Visibility)> {
    let children = match tree.children() {
        Ok(children) => children,
        Err(e) => {
            warn!("Cannot read root children: {} — nothing hidden", e);
            return Vec::new();
        }
    };

    for (node, _) in &children {
        if let Err(e) = tree.set_visibility(*node, Visibility::Gone) {
            warn!("Failed to hide {}: {}", node, e);
        }
    }
    debug!("Hid {} root children", children.len());
    children
}

/// Puts every saved child back to its original visibility.
///
/// Children that left the tree in the meantime are skipped.
pub(crate) fn restore_children(tree: &dyn VisualTree, saved: Vec<(NodeId, Visibility)>) {
    let count = saved.len();
    for (node, visibility) in saved {
        if let Err(e) = tree.set_visibility(node, visibility) {
            warn!("Failed to restore {} to {:?}: {}", node, visibility, e);
        }
    }
    debug!("Restored {} root children", count);
}
