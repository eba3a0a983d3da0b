//! Picture-in-Picture view-mode controller.
//!
//! Moves a live video view into the window system's compact overlay and back:
//!
//! ```text
//! property layer ─ set_config ─▶ ViewModeController ─ request_enter ─▶ HostWindow
//!                                        ▲                                 │
//!                                        └── LifecycleRelay ◀─ mode changed ┘
//! ```
//!
//! Visual-tree and mode-state mutation happen on the UI execution context.
//! Source attach/detach run on the render pipeline's execution context and
//! report back through the UI context.

pub mod controller;
pub mod executor;
pub mod host;
pub mod mock;
pub mod relay;
pub mod session;

#[cfg(test)]
mod tests;

pub use controller::{ExecutionContexts, HostBindings, ViewModeController};
pub use executor::{ui_channel, BlockingExecutor, Executor, Task, UiHandle, UiLoop};
pub use host::{HostView, HostWindow, LayoutListener, OverlayParams, VisualTree};
pub use relay::{LifecycleRelay, OverlayModeListener, RelayId, RelayRegistry};
pub use session::{AttachState, SessionSnapshot};
