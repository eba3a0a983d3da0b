//! Capabilities the controller consumes from its host.
//!
//! The controller keeps only weak references to implementors and resolves
//! them on every use, so a host may disappear at any time.

use std::sync::Arc;

use pipkit_core::errors::{TreeError, WindowError};
use pipkit_core::{AspectRatio, NodeId, Size, SurfaceId, Visibility};
use pipkit_render::{SourceHandle, SurfaceAppearance};

use crate::relay::{LifecycleRelay, RelayId};

/// Called on every layout pass of a surface node with its measured size.
pub type LayoutListener = Arc<dyn Fn(Size) + Send + Sync>;

// MARK: - HostView

/// The video view that owns the controller.
pub trait HostView: Send + Sync {
    fn is_attached_to_window(&self) -> bool;

    fn measured_size(&self) -> Size;

    /// Track currently rendered by the view, if any.
    fn video_source(&self) -> Option<SourceHandle>;

    fn appearance(&self) -> SurfaceAppearance;
}

// MARK: - HostWindow

/// Parameters negotiated with the window system for overlay mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OverlayParams {
    pub aspect_ratio: Option<AspectRatio>,
    pub auto_enter: bool,
}

/// Window system owning the overlay mode.
///
/// Mode changes are reported asynchronously through registered
/// [`LifecycleRelay`]s, never as the return value of a request.
pub trait HostWindow: Send + Sync {
    /// Asks for overlay mode. `Ok` only means the request was accepted.
    fn request_enter_overlay(&self, params: &OverlayParams) -> Result<(), WindowError>;

    /// Whether the window system can enter overlay on its own when backgrounded.
    fn supports_auto_enter(&self) -> bool {
        false
    }

    /// Updates the negotiated parameters ahead of any request.
    fn update_overlay_params(&self, params: &OverlayParams) -> Result<(), WindowError>;

    fn register_relay(&self, relay: Arc<LifecycleRelay>) -> Result<(), WindowError>;

    /// Removes the relay with this id. Unknown ids are not an error.
    fn unregister_relay(&self, id: &RelayId) -> Result<(), WindowError>;
}

// MARK: - VisualTree

/// Root visual tree of the host window. Only mutated from the UI context.
pub trait VisualTree: Send + Sync {
    /// Direct children of the root, in order, with their visibility.
    fn children(&self) -> Result<Vec<(NodeId, Visibility)>, TreeError>;

    fn set_visibility(&self, node: NodeId, visibility: Visibility) -> Result<(), TreeError>;

    /// Creates an empty full-size container and appends it to the root.
    fn insert_container(&self) -> Result<NodeId, TreeError>;

    /// Inserts a node presenting `surface` into `container`.
    fn insert_surface(
        &self,
        container: NodeId,
        surface: SurfaceId,
        visibility: Visibility,
        on_layout: LayoutListener,
    ) -> Result<NodeId, TreeError>;

    /// Removes a node together with its descendants and their listeners.
    fn remove(&self, node: NodeId) -> Result<(), TreeError>;
}
