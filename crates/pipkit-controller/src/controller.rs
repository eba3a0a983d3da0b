//! `ViewModeController` — moves one video view in and out of overlay mode.
//!
//! # Enter
//! ```text
//! request_enter_overlay ─▶ HostWindow (EnteringOverlay)
//! relay: mode changed(true) ─▶ hide root children
//!                              insert container + surface node (Invisible)
//! first layout with size > 0 ─▶ init surface against the shared context
//!                              attach source on the pipeline context
//! first frame ─▶ surface node Visible
//! ```
//!
//! # Exit
//! The session is taken out of the controller before any work is dispatched,
//! so a second exit (duplicate notification, host detach, disable) sees no
//! session. Dispatched work captures handles by value only. Release always
//! follows detach; a still-pending attach owns the release of its surface.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use pipkit_core::{Mode, OverlayConfig, PipError, Size, SurfaceId, Visibility};
use pipkit_render::{RenderError, RenderPipeline, SourceHandle, SurfaceEvents, SurfaceHandle};
use tracing::{debug, error, info, warn};

use crate::executor::Executor;
use crate::host::{HostView, HostWindow, LayoutListener, OverlayParams, VisualTree};
use crate::relay::{LifecycleRelay, OverlayModeListener, RelayId};
use crate::session::{self, AttachState, OverlaySession, SessionSnapshot};

// MARK: - Wiring

/// Non-owning references to the host. Every use is a checked lookup.
#[derive(Clone)]
pub struct HostBindings {
    pub view: Weak<dyn HostView>,
    pub window: Weak<dyn HostWindow>,
    pub root: Weak<dyn VisualTree>,
}

#[derive(Clone)]
pub struct ExecutionContexts {
    /// Owner of visual-tree and controller state.
    pub ui: Arc<dyn Executor>,
    /// Render pipeline's own context; attach/detach run here.
    pub pipeline: Arc<dyn Executor>,
}

struct Inner {
    config: OverlayConfig,
    mode: Mode,
    relay: Option<RelayId>,
    session: Option<OverlaySession>,
    /// Set while a session is being brought up outside the lock. Cleared by
    /// a teardown that arrives meanwhile, which cancels the bring-up.
    entering: bool,
}

impl Inner {
    fn transition(&mut self, to: Mode) {
        if self.mode != to {
            debug!("Mode {} → {}", self.mode, to);
            self.mode = to;
        }
    }
}

// MARK: - ViewModeController

pub struct ViewModeController {
    self_ref: Weak<ViewModeController>,
    host: HostBindings,
    pipeline: Arc<dyn RenderPipeline>,
    exec: ExecutionContexts,
    inner: Mutex<Inner>,
}

impl ViewModeController {
    pub fn new(
        host: HostBindings,
        pipeline: Arc<dyn RenderPipeline>,
        exec: ExecutionContexts,
    ) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            self_ref: self_ref.clone(),
            host,
            pipeline,
            exec,
            inner: Mutex::new(Inner {
                config: OverlayConfig::default(),
                mode: Mode::Normal,
                relay: None,
                session: None,
                entering: false,
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Introspection ─────────────────────────────────────────────────────

    pub fn mode(&self) -> Mode {
        self.lock().mode
    }

    pub fn config(&self) -> OverlayConfig {
        self.lock().config
    }

    pub fn is_overlay_active(&self) -> bool {
        self.lock().session.is_some()
    }

    pub fn relay_id(&self) -> Option<RelayId> {
        self.lock().relay.clone()
    }

    pub fn session_snapshot(&self) -> Option<SessionSnapshot> {
        self.lock().session.as_ref().map(OverlaySession::snapshot)
    }

    // ── Configuration ─────────────────────────────────────────────────────

    /// Applies a new config. Identical configs are ignored.
    pub fn set_config(&self, config: OverlayConfig) {
        let previous = {
            let mut inner = self.lock();
            if inner.config == config {
                return;
            }
            std::mem::replace(&mut inner.config, config)
        };

        if !previous.enabled && config.enabled {
            if self.host_view_attached() {
                self.register_relay();
                self.apply_auto_enter();
            } else {
                debug!("Overlay enabled while host view is detached — relay deferred");
            }
        } else if previous.enabled && !config.enabled {
            self.unregister_relay();
            self.teardown("overlay disabled");
        } else if config.enabled && previous.auto_start != config.auto_start {
            self.apply_auto_enter();
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.set_config(OverlayConfig { enabled, ..self.config() });
    }

    pub fn set_auto_start(&self, auto_start: bool) {
        self.set_config(OverlayConfig { auto_start, ..self.config() });
    }

    pub fn set_auto_stop(&self, auto_stop: bool) {
        self.set_config(OverlayConfig { auto_stop, ..self.config() });
    }

    pub fn set_preferred_size(&self, size: Size) {
        self.set_config(OverlayConfig {
            preferred_width: size.width,
            preferred_height: size.height,
            ..self.config()
        });
    }

    // ── Host lifecycle ────────────────────────────────────────────────────

    pub fn on_host_attached(&self) {
        if self.lock().config.enabled {
            self.register_relay();
            self.apply_auto_enter();
        }
    }

    pub fn on_host_detached(&self) {
        self.teardown("host view detached");
        self.unregister_relay();
    }

    // ── Transitions ───────────────────────────────────────────────────────

    /// Asks the window system for overlay mode.
    ///
    /// `true` only means the request was accepted; the mode change itself
    /// arrives later through the relay.
    pub fn request_enter_overlay(&self) -> bool {
        let Some(window) = self.host.window.upgrade() else {
            warn!("Cannot enter overlay: host window is gone");
            return false;
        };
        let Some(view) = self.host.view.upgrade() else {
            warn!("Cannot enter overlay: host view is gone");
            return false;
        };
        let measured = view.measured_size();
        let auto_enter_supported = window.supports_auto_enter();

        let params = {
            let mut inner = self.lock();
            if !inner.config.enabled {
                info!("Overlay request ignored: overlay is disabled");
                return false;
            }
            if inner.mode != Mode::Normal {
                debug!("Overlay request ignored in mode {}", inner.mode);
                return false;
            }
            inner.transition(Mode::EnteringOverlay);
            OverlayParams {
                aspect_ratio: inner.config.aspect_hint(measured),
                auto_enter: auto_enter_supported && inner.config.auto_start,
            }
        };

        match window.request_enter_overlay(&params) {
            Ok(()) => {
                info!(
                    "Overlay requested (aspect {})",
                    params.aspect_ratio.map_or_else(|| "unset".to_owned(), |r| r.to_string())
                );
                true
            }
            Err(e) => {
                warn!("Failed to enter overlay mode: {}", e);
                let mut inner = self.lock();
                if inner.mode == Mode::EnteringOverlay {
                    inner.transition(Mode::Normal);
                }
                false
            }
        }
    }

    /// The window system alone ends overlay mode here; kept for symmetry.
    pub fn request_exit_overlay(&self) {
        debug!("Overlay exit is decided by the window system — request ignored");
    }

    /// Mode change reported by the window system through the relay.
    pub fn on_mode_changed(&self, entering: bool) {
        if entering {
            self.enter_session();
        } else {
            self.teardown("window system left overlay mode");
        }
    }

    fn enter_session(&self) {
        {
            let mut inner = self.lock();
            if inner.session.is_some() || inner.entering || inner.mode.is_overlay() {
                debug!("Redundant overlay-entered notification — ignored");
                return;
            }
            inner.entering = true;
        }

        let (Some(root), Some(view)) = (self.host.root.upgrade(), self.host.view.upgrade()) else {
            debug!("Overlay entered after host teardown — ignored");
            self.abandon_entry();
            return;
        };
        let Some(source) = view.video_source() else {
            warn!("Overlay entered but the view has no video source");
            self.abandon_entry();
            return;
        };

        let saved = session::hide_children(root.as_ref());
        let mut session = OverlaySession::new(source, saved);

        if let Err(e) = self.bring_up_surface(root.as_ref(), view.as_ref(), &mut session) {
            warn!("Overlay bring-up failed: {} — restoring the view tree", e);
            self.dispose(session);
            let mut inner = self.lock();
            if std::mem::take(&mut inner.entering) {
                inner.transition(Mode::Overlay);
            }
            return;
        }

        let mut inner = self.lock();
        if !std::mem::take(&mut inner.entering) || inner.session.is_some() {
            drop(inner);
            debug!("Overlay left while the session was being built — discarding it");
            self.dispose(session);
            return;
        }
        info!(
            "Overlay session started: {} → {}",
            session.source,
            session.surface_id().map_or_else(|| "-".to_owned(), |s| s.to_string())
        );
        inner.session = Some(session);
        inner.transition(Mode::Overlay);
    }

    fn abandon_entry(&self) {
        let mut inner = self.lock();
        inner.entering = false;
        inner.transition(Mode::Normal);
    }

    /// Container first, then the surface, then the surface node. The surface
    /// is initialised later, once layout gives it a size.
    fn bring_up_surface(
        &self,
        root: &dyn VisualTree,
        view: &dyn HostView,
        session: &mut OverlaySession,
    ) -> Result<(), PipError> {
        let container = root.insert_container()?;
        session.container = Some(container);

        let surface = self.pipeline.create_surface()?;
        session.surface = Some(surface.clone());

        if let Err(e) = self.pipeline.configure_surface(&surface, view.appearance()) {
            warn!("Failed to copy view appearance to {}: {}", surface.id(), e);
        }

        let listener = self.layout_listener(surface.id());
        let node = root.insert_surface(container, surface.id(), Visibility::Invisible, listener)?;
        session.surface_node = Some(node);
        Ok(())
    }

    fn layout_listener(&self, surface: SurfaceId) -> LayoutListener {
        let controller = self.self_ref.clone();
        let ui = Arc::clone(&self.exec.ui);
        Arc::new(move |size: Size| {
            let controller = controller.clone();
            ui.execute(Box::new(move || {
                if let Some(controller) = controller.upgrade() {
                    controller.on_surface_laid_out(surface, size);
                }
            }));
        })
    }

    fn on_surface_laid_out(&self, surface: SurfaceId, size: Size) {
        let (source, handle) = {
            let mut inner = self.lock();
            let Some(session) = inner.session.as_mut().filter(|s| s.owns_surface(surface)) else {
                debug!("Layout for stale {} — ignored", surface);
                return;
            };
            // One attempt per session; failures are terminal.
            if session.initialized || session.attach != AttachState::Idle {
                return;
            }
            if size.is_empty() {
                debug!("{} laid out at {} — waiting for a real size", surface, size);
                return;
            }
            let Some(handle) = session.surface.clone() else {
                return;
            };
            let Some(context) = self.pipeline.shared_context() else {
                error!("Cannot create overlay renderer: no shared rendering context");
                session.attach = AttachState::Failed;
                return;
            };

            let events: Arc<dyn SurfaceEvents> = Arc::new(OverlaySurfaceEvents {
                surface,
                controller: self.self_ref.clone(),
                ui: Arc::clone(&self.exec.ui),
            });
            if let Err(e) = self.pipeline.init_surface(&handle, context, events) {
                warn!("Failed to initialise overlay {}: {}", surface, e);
                session.attach = AttachState::Failed;
                return;
            }

            session.initialized = true;
            session.attach = AttachState::Pending;
            (session.source.clone(), handle)
        };

        debug!("{} initialised at {} — attaching {}", surface, size, source);
        self.dispatch_attach(source, handle);
    }

    fn dispatch_attach(&self, source: SourceHandle, surface: SurfaceHandle) {
        let pipeline = Arc::clone(&self.pipeline);
        let exec = self.exec.clone();
        let controller = self.self_ref.clone();

        self.exec.pipeline.execute(Box::new(move || {
            let result = pipeline.attach_source(&source, &surface);
            let ui = Arc::clone(&exec.ui);
            ui.execute(Box::new(move || match controller.upgrade() {
                Some(controller) => controller.on_attach_complete(source, surface, result),
                None => {
                    debug!("Attach of {} completed after controller drop", surface.id());
                    retire_surface(&pipeline, &exec, source, surface, result.is_ok());
                }
            }));
        }));
    }

    fn on_attach_complete(
        &self,
        source: SourceHandle,
        surface: SurfaceHandle,
        result: Result<(), RenderError>,
    ) {
        {
            let mut inner = self.lock();
            if let Some(session) = inner.session.as_mut().filter(|s| s.owns_surface(surface.id())) {
                match result {
                    Ok(()) => {
                        session.attach = AttachState::Attached;
                        info!("{} attached to overlay {}", source, surface.id());
                    }
                    Err(e) => {
                        session.attach = AttachState::Failed;
                        warn!("Failed to add overlay renderer to video track: {}", e);
                    }
                }
                return;
            }
        }

        debug!("Attach of {} completed after teardown — retiring it", surface.id());
        retire_surface(&self.pipeline, &self.exec, source, surface, result.is_ok());
    }

    fn on_first_frame(&self, surface: SurfaceId) {
        let mut inner = self.lock();
        let Some(session) = inner.session.as_mut().filter(|s| s.owns_surface(surface)) else {
            debug!("First frame for stale {} — ignored", surface);
            return;
        };
        if session.revealed {
            return;
        }
        let (Some(node), Some(root)) = (session.surface_node, self.host.root.upgrade()) else {
            return;
        };
        match root.set_visibility(node, Visibility::Visible) {
            Ok(()) => session.revealed = true,
            Err(e) => warn!("Failed to reveal overlay {}: {}", surface, e),
        }
    }

    // ── Teardown ──────────────────────────────────────────────────────────

    fn teardown(&self, reason: &str) {
        let session = {
            let mut inner = self.lock();
            inner.entering = false;
            let Some(session) = inner.session.take() else {
                if inner.mode != Mode::Normal {
                    inner.transition(Mode::Normal);
                } else {
                    debug!("No overlay session to tear down ({})", reason);
                }
                return;
            };
            inner.transition(Mode::ExitingOverlay);
            session
        };

        info!("Tearing down overlay session ({})", reason);
        self.dispose(session);
        self.lock().transition(Mode::Normal);
    }

    /// Releases everything a session owns. Idempotent by construction: the
    /// session is consumed.
    fn dispose(&self, session: OverlaySession) {
        let OverlaySession { source, container, surface, saved_visibility, attach, .. } = session;

        if let Some(surface) = surface {
            match attach {
                AttachState::Attached => retire_surface(&self.pipeline, &self.exec, source, surface, true),
                AttachState::Pending => {
                    debug!("Attach to {} still in flight — its completion releases it", surface.id());
                }
                AttachState::Idle | AttachState::Failed => {
                    retire_surface(&self.pipeline, &self.exec, source, surface, false)
                }
            }
        }

        match self.host.root.upgrade() {
            Some(root) => {
                if let Some(container) = container {
                    if let Err(e) = root.remove(container) {
                        warn!("Failed to remove overlay container {}: {}", container, e);
                    }
                }
                session::restore_children(root.as_ref(), saved_visibility);
            }
            None => debug!("Root tree gone — nothing to restore"),
        }
    }

    // ── Relay ─────────────────────────────────────────────────────────────

    fn register_relay(&self) {
        let Some(window) = self.host.window.upgrade() else {
            warn!("Cannot register overlay relay: host window is gone");
            return;
        };

        let listener: Weak<dyn OverlayModeListener> = self.self_ref.clone();
        let relay = Arc::new(LifecycleRelay::new(listener));
        let id = relay.id().clone();
        {
            let mut inner = self.lock();
            if inner.relay.is_some() {
                return;
            }
            inner.relay = Some(id.clone());
        }

        match window.register_relay(relay) {
            Ok(()) => info!("Overlay relay {} registered", id),
            Err(e) => {
                warn!("Failed to register overlay relay: {}", e);
                let mut inner = self.lock();
                if inner.relay.as_ref() == Some(&id) {
                    inner.relay = None;
                }
            }
        }
    }

    fn unregister_relay(&self) {
        let Some(id) = self.lock().relay.take() else {
            return;
        };
        match self.host.window.upgrade() {
            Some(window) => match window.unregister_relay(&id) {
                Ok(()) => info!("Overlay relay {} removed", id),
                Err(e) => warn!("Failed to remove overlay relay {}: {}", id, e),
            },
            None => debug!("Host window gone — relay {} went with it", id),
        }
    }

    /// Best effort: silently skipped where auto-enter is not supported.
    fn apply_auto_enter(&self) {
        let Some(window) = self.host.window.upgrade() else {
            return;
        };
        if !window.supports_auto_enter() {
            debug!("Window system has no auto-enter capability — skipped");
            return;
        }
        let measured = self.host.view.upgrade().map_or(Size::ZERO, |view| view.measured_size());
        let params = {
            let inner = self.lock();
            if !inner.config.enabled {
                return;
            }
            OverlayParams {
                aspect_ratio: inner.config.aspect_hint(measured),
                auto_enter: inner.config.auto_start,
            }
        };
        if let Err(e) = window.update_overlay_params(&params) {
            warn!("Failed to update overlay params: {}", e);
        }
    }

    fn host_view_attached(&self) -> bool {
        self.host.view.upgrade().map_or(false, |view| view.is_attached_to_window())
    }
}

impl OverlayModeListener for ViewModeController {
    fn on_overlay_mode_changed(&self, active: bool) {
        self.on_mode_changed(active);
    }
}

impl Drop for ViewModeController {
    fn drop(&mut self) {
        let inner = self.inner.get_mut().unwrap_or_else(PoisonError::into_inner);
        let session = inner.session.take();
        let relay = inner.relay.take();

        if let Some(session) = session {
            debug!("Controller dropped with an active overlay session");
            self.dispose(session);
        }
        if let (Some(id), Some(window)) = (relay, self.host.window.upgrade()) {
            if let Err(e) = window.unregister_relay(&id) {
                warn!("Failed to remove overlay relay {}: {}", id, e);
            }
        }
    }
}

// MARK: - Surface retirement

/// Detaches (if attached) and then releases a surface that no session owns.
///
/// Release runs on the UI context after the detach finished, whatever the
/// detach result.
fn retire_surface(
    pipeline: &Arc<dyn RenderPipeline>,
    exec: &ExecutionContexts,
    source: SourceHandle,
    surface: SurfaceHandle,
    attached: bool,
) {
    if !attached {
        debug!("Releasing {}", surface.id());
        pipeline.release_surface(surface);
        return;
    }

    let pipeline = Arc::clone(pipeline);
    let ui = Arc::clone(&exec.ui);
    exec.pipeline.execute(Box::new(move || {
        if let Err(e) = pipeline.detach_source(&source, &surface) {
            debug!("Detach before release failed: {}", e);
        }
        ui.execute(Box::new(move || {
            debug!("Releasing {}", surface.id());
            pipeline.release_surface(surface);
        }));
    }));
}

// MARK: - OverlaySurfaceEvents

/// Pipeline callbacks for one overlay surface, re-posted onto the UI context.
struct OverlaySurfaceEvents {
    surface: SurfaceId,
    controller: Weak<ViewModeController>,
    ui: Arc<dyn Executor>,
}

impl SurfaceEvents for OverlaySurfaceEvents {
    fn on_first_frame(&self) {
        let controller = self.controller.clone();
        let surface = self.surface;
        self.ui.execute(Box::new(move || {
            if let Some(controller) = controller.upgrade() {
                controller.on_first_frame(surface);
            }
        }));
    }

    fn on_resolution_changed(&self, size: Size, rotation: u32) {
        debug!("{} frames now {} (rotation {})", self.surface, size, rotation);
    }
}
