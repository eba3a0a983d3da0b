//! Render pipeline capability.
//!
//! The overlay controller never decodes or paints video itself. It drives an
//! opaque pipeline through [`RenderPipeline`]:
//!
//! ```text
//! create_surface → init_surface(shared context) → attach_source
//!                                                  ⋮
//!                                  detach_source → release_surface
//! ```
//!
//! `attach_source` and `detach_source` may block on pipeline-internal locks and
//! must only be called from the pipeline's own execution context.

use std::sync::Arc;

pub use pipkit_core::errors::RenderError;
use pipkit_core::{ScalingType, Size, SurfaceId};

// MARK: - Handles

/// Render target created by the pipeline. Cloning copies the id only.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SurfaceHandle {
    id: SurfaceId,
}

impl SurfaceHandle {
    pub fn new(id: SurfaceId) -> Self {
        Self { id }
    }

    pub fn id(&self) -> SurfaceId {
        self.id
    }
}

/// A live video track that can feed surfaces.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceHandle {
    id: String,
}

impl SourceHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl std::fmt::Display for SourceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "source '{}'", self.id)
    }
}

/// Process-wide rendering context new surfaces are bound against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SharedContext(pub u64);

// MARK: - SurfaceAppearance

/// Presentation flags copied from the primary view onto an overlay surface.
///
/// Filters or overlays painted on the primary surface are not part of this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SurfaceAppearance {
    pub mirror: bool,
    pub scaling: ScalingType,
}

// MARK: - SurfaceEvents

/// Callbacks raised by the pipeline's render thread for one surface.
pub trait SurfaceEvents: Send + Sync {
    /// The surface painted its first frame.
    fn on_first_frame(&self);

    /// The incoming frame size or rotation changed.
    fn on_resolution_changed(&self, _size: Size, _rotation: u32) {}
}

// MARK: - RenderPipeline trait

/// Interface of the shared video render pipeline.
///
/// Every call may fail; callers are expected to log and continue.
pub trait RenderPipeline: Send + Sync {
    /// Creates a fresh, uninitialised render target.
    fn create_surface(&self) -> Result<SurfaceHandle, RenderError>;

    /// Applies mirroring and scaling. Valid before `init_surface`.
    fn configure_surface(
        &self,
        surface: &SurfaceHandle,
        appearance: SurfaceAppearance,
    ) -> Result<(), RenderError>;

    /// The shared rendering context, if the pipeline has one yet.
    fn shared_context(&self) -> Option<SharedContext>;

    /// Binds the surface to `context`. The surface must have a non-zero size.
    fn init_surface(
        &self,
        surface: &SurfaceHandle,
        context: SharedContext,
        events: Arc<dyn SurfaceEvents>,
    ) -> Result<(), RenderError>;

    /// Starts feeding `source` into `surface`. May block.
    fn attach_source(&self, source: &SourceHandle, surface: &SurfaceHandle) -> Result<(), RenderError>;

    /// Stops feeding `source` into `surface`. May block.
    fn detach_source(&self, source: &SourceHandle, surface: &SurfaceHandle) -> Result<(), RenderError>;

    /// Frees the surface. The handle must not be used afterwards.
    fn release_surface(&self, surface: SurfaceHandle);
}
