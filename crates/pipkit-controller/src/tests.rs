use std::sync::{Arc, Mutex};

use pipkit_core::{Mode, NodeId, OverlayConfig, ScalingType, Size, SurfaceId, Visibility};
use pipkit_core::errors::TreeError;
use pipkit_render::{RenderPipeline, SharedContext, SurfaceAppearance};

use crate::mock::{
    ManualExecutor, MockHost, MockNodeKind, MockPipeline, MockTree, MockView, MockWindow, PipelineCall,
};
use crate::host::{LayoutListener, VisualTree};
use crate::{AttachState, ExecutionContexts, ViewModeController};

const CHILDREN: [Visibility; 3] = [Visibility::Visible, Visibility::Invisible, Visibility::Gone];
const LAYOUT: Size = Size { width: 320, height: 180 };
const SOURCE: &str = "remote-video-0";

struct Harness {
    host: MockHost,
    pipeline: Arc<MockPipeline>,
    ui: Arc<ManualExecutor>,
    worker: Arc<ManualExecutor>,
    controller: Arc<ViewModeController>,
    /// Strong owner of a substitute root; the controller only holds it weakly.
    _root: Option<Arc<HookedTree>>,
}

fn harness(children: &[Visibility]) -> Harness {
    harness_with(MockHost::new(children))
}

fn harness_with(host: MockHost) -> Harness {
    let pipeline = MockPipeline::new();
    let ui = ManualExecutor::new();
    let worker = ManualExecutor::new();
    let controller = ViewModeController::new(
        host.bindings(),
        pipeline.clone(),
        ExecutionContexts { ui: ui.clone(), pipeline: worker.clone() },
    );
    Harness { host, pipeline, ui, worker, controller, _root: None }
}

fn enabled() -> OverlayConfig {
    OverlayConfig { enabled: true, ..OverlayConfig::default() }
}

impl Harness {
    fn attach_and_enable(&self) {
        self.host.view.set_attached(true);
        self.controller.set_config(enabled());
    }

    /// Request accepted and confirmed by the window system.
    fn enter(&self) {
        assert!(self.controller.request_enter_overlay());
        self.host.window.set_overlay_mode(true);
    }

    fn layout(&self) {
        self.host.tree.run_layout(LAYOUT);
        self.ui.run_pending();
    }

    /// Runs both contexts until neither has work left.
    fn settle(&self) {
        while self.ui.run_pending() + self.worker.run_pending() > 0 {}
    }

    /// Enter, lay out, and finish the attach (end of Scenario B).
    fn active_overlay(&self) -> SurfaceId {
        self.attach_and_enable();
        self.enter();
        self.layout();
        self.settle();
        self.surface()
    }

    fn surface(&self) -> SurfaceId {
        self.controller
            .session_snapshot()
            .and_then(|s| s.surface)
            .expect("active session with a surface")
    }

    fn child_visibilities(&self) -> Vec<(NodeId, Visibility)> {
        self.host
            .tree
            .root_children()
            .into_iter()
            .filter(|(_, kind, _)| *kind == MockNodeKind::Child)
            .map(|(id, _, visibility)| (id, visibility))
            .collect()
    }
}

/// Root tree that runs a callback from inside `insert_container`, i.e. while
/// the controller is building a session outside its lock.
struct HookedTree {
    tree: Arc<MockTree>,
    hook: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl VisualTree for HookedTree {
    fn children(&self) -> Result<Vec<(NodeId, Visibility)>, TreeError> {
        self.tree.children()
    }

    fn set_visibility(&self, node: NodeId, visibility: Visibility) -> Result<(), TreeError> {
        self.tree.set_visibility(node, visibility)
    }

    fn insert_container(&self) -> Result<NodeId, TreeError> {
        let hook = self.hook.lock().unwrap().take();
        if let Some(hook) = hook {
            hook();
        }
        self.tree.insert_container()
    }

    fn insert_surface(
        &self,
        container: NodeId,
        surface: SurfaceId,
        visibility: Visibility,
        on_layout: LayoutListener,
    ) -> Result<NodeId, TreeError> {
        self.tree.insert_surface(container, surface, visibility, on_layout)
    }

    fn remove(&self, node: NodeId) -> Result<(), TreeError> {
        self.tree.remove(node)
    }
}

/// Harness whose root tree calls back into the controller mid bring-up with
/// the given mode change.
fn hooked_harness(reentrant_mode: bool) -> Harness {
    let host = MockHost::new(&CHILDREN);
    let hooked = Arc::new(HookedTree { tree: host.tree.clone(), hook: Mutex::new(None) });
    let root: Arc<dyn VisualTree> = hooked.clone();
    let mut bindings = host.bindings();
    bindings.root = Arc::downgrade(&root);

    let pipeline = MockPipeline::new();
    let ui = ManualExecutor::new();
    let worker = ManualExecutor::new();
    let controller = ViewModeController::new(
        bindings,
        pipeline.clone(),
        ExecutionContexts { ui: ui.clone(), pipeline: worker.clone() },
    );

    let weak = Arc::downgrade(&controller);
    *hooked.hook.lock().unwrap() = Some(Box::new(move || {
        if let Some(controller) = weak.upgrade() {
            controller.on_mode_changed(reentrant_mode);
        }
    }));
    Harness { host, pipeline, ui, worker, controller, _root: Some(hooked) }
}

// ── Scenarios ─────────────────────────────────────────────────────────────────

#[test]
fn scenario_a_enable_while_detached_registers_nothing() {
    let h = harness(&CHILDREN);

    h.controller.set_config(enabled());

    assert!(h.host.window.relays().is_empty());
    assert!(h.controller.relay_id().is_none());
    assert!(!h.controller.is_overlay_active());
    assert_eq!(h.controller.mode(), Mode::Normal);
}

#[test]
fn host_attach_registers_deferred_relay() {
    let h = harness(&CHILDREN);
    h.controller.set_config(enabled());

    h.host.view.set_attached(true);
    h.controller.on_host_attached();

    let id = h.controller.relay_id().expect("relay registered");
    assert!(h.host.window.relays().find(&id).is_some());

    // A second attach notification does not add another relay.
    h.controller.on_host_attached();
    assert_eq!(h.host.window.relays().len(), 1);
}

#[test]
fn scenario_b_enter_creates_session_and_attaches_source() {
    let h = harness(&CHILDREN);
    h.attach_and_enable();

    assert!(h.controller.request_enter_overlay());
    assert_eq!(h.controller.mode(), Mode::EnteringOverlay);

    h.host.window.set_overlay_mode(true);
    assert_eq!(h.controller.mode(), Mode::Overlay);
    assert!(h.child_visibilities().iter().all(|(_, v)| *v == Visibility::Gone));
    assert_eq!(h.host.tree.containers().len(), 1);
    let surface_node = h.host.tree.surface_nodes()[0];
    assert_eq!(h.host.tree.visibility(surface_node), Some(Visibility::Invisible));

    let snapshot = h.controller.session_snapshot().expect("session");
    assert_eq!(snapshot.saved_children, CHILDREN.len());
    assert!(!snapshot.initialized);
    assert_eq!(snapshot.attach, AttachState::Idle);

    // Layout gives the surface a size: initialise, then dispatch the attach.
    h.layout();
    let surface = h.surface();
    assert_eq!(h.controller.session_snapshot().unwrap().attach, AttachState::Pending);
    assert_eq!(h.worker.len(), 1);
    assert_eq!(h.pipeline.count(|c| matches!(c, PipelineCall::Attach(..))), 0);

    h.settle();
    let snapshot = h.controller.session_snapshot().unwrap();
    assert!(snapshot.source_attached());
    assert_eq!(h.pipeline.bindings(), vec![(SOURCE.to_owned(), surface)]);

    let calls = h.pipeline.calls();
    let init = calls.iter().position(|c| *c == PipelineCall::Init(surface)).unwrap();
    let attach = calls.iter().position(|c| matches!(c, PipelineCall::Attach(..))).unwrap();
    assert!(init < attach);
}

#[test]
fn scenario_c_exit_releases_and_restores() {
    let h = harness(&CHILDREN);
    let before = h.host.tree.root_children();
    let surface = h.active_overlay();

    h.host.window.set_overlay_mode(false);

    assert_eq!(h.controller.mode(), Mode::Normal);
    assert!(h.controller.session_snapshot().is_none());
    assert!(h.host.tree.containers().is_empty());
    assert_eq!(h.host.tree.root_children(), before);
    // Detach is dispatched; release waits for it.
    assert_eq!(h.worker.len(), 1);
    assert_eq!(h.pipeline.release_count(surface), 0);

    h.settle();
    let calls = h.pipeline.calls();
    let n = calls.len();
    assert_eq!(calls[n - 2], PipelineCall::Detach(SOURCE.to_owned(), surface));
    assert_eq!(calls[n - 1], PipelineCall::Release(surface));
    assert!(h.pipeline.live_surfaces().is_empty());
    assert!(h.pipeline.bindings().is_empty());
}

#[test]
fn scenario_d_duplicate_exit_is_a_noop() {
    let h = harness(&CHILDREN);
    let surface = h.active_overlay();

    h.host.window.set_overlay_mode(false);
    // The app hides a child between the two notifications.
    let (first, _) = h.child_visibilities()[0];
    h.host.tree.set_visibility(first, Visibility::Gone).unwrap();
    h.host.window.set_overlay_mode(false);
    h.settle();

    assert_eq!(h.host.tree.visibility(first), Some(Visibility::Gone));
    assert_eq!(h.pipeline.release_count(surface), 1);
    assert_eq!(h.pipeline.count(|c| matches!(c, PipelineCall::Detach(..))), 1);
    assert_eq!(h.controller.mode(), Mode::Normal);
}

#[test]
fn scenario_e_host_detach_during_attach_retires_late_attachment() {
    let h = harness(&CHILDREN);
    let before = h.host.tree.root_children();
    h.attach_and_enable();
    h.enter();
    h.layout();
    let surface = h.surface();
    assert_eq!(h.worker.len(), 1, "attach in flight");

    h.host.view.set_attached(false);
    h.controller.on_host_detached();

    assert!(h.controller.session_snapshot().is_none());
    assert!(h.controller.relay_id().is_none());
    assert!(h.host.window.relays().is_empty());
    assert_eq!(h.host.tree.root_children(), before);
    assert_eq!(h.pipeline.release_count(surface), 0, "pending attach owns the release");

    // The attach lands after teardown and is immediately undone.
    h.settle();
    assert!(h.pipeline.bindings().is_empty());
    assert_eq!(h.pipeline.release_count(surface), 1);
    let calls = h.pipeline.calls();
    let attach = calls.iter().position(|c| matches!(c, PipelineCall::Attach(..))).unwrap();
    let detach = calls.iter().position(|c| matches!(c, PipelineCall::Detach(..))).unwrap();
    let release = calls.iter().position(|c| *c == PipelineCall::Release(surface)).unwrap();
    assert!(attach < detach && detach < release);
}

// ── Properties ────────────────────────────────────────────────────────────────

#[test]
fn p1_at_most_one_session_across_event_sequences() {
    let h = harness(&CHILDREN);
    h.attach_and_enable();

    h.enter();
    h.host.window.set_overlay_mode(true);
    h.controller.on_mode_changed(true);
    assert_eq!(h.host.tree.containers().len(), 1);
    assert_eq!(h.pipeline.count(|c| matches!(c, PipelineCall::Create(_))), 1);

    h.controller.on_host_detached();
    assert!(h.host.tree.containers().is_empty());

    h.controller.on_mode_changed(true);
    h.controller.on_mode_changed(true);
    assert_eq!(h.host.tree.containers().len(), 1);

    h.controller.on_mode_changed(false);
    h.settle();
    assert!(h.host.tree.containers().is_empty());
    assert!(h.pipeline.live_surfaces().is_empty());
}

#[test]
fn p3_restore_fidelity_for_any_child_count() {
    let palette = [Visibility::Gone, Visibility::Visible, Visibility::Invisible];
    for n in 0..7 {
        let children: Vec<_> = (0..n).map(|i| palette[(i * 7 + n) % palette.len()]).collect();
        let h = harness(&children);
        let before = h.child_visibilities();

        h.active_overlay();
        h.host.window.set_overlay_mode(false);
        h.settle();

        assert_eq!(h.child_visibilities(), before, "n = {n}");
        assert_eq!(h.host.tree.root_children().len(), n);
    }
}

#[test]
fn p4_lost_view_degrades_to_noops() {
    let Harness { host, pipeline, ui, worker, controller, .. } = harness(&CHILDREN);
    let MockHost { view, window, tree } = host;
    view.set_attached(true);
    controller.set_config(enabled());
    assert!(controller.request_enter_overlay());

    drop(view);
    window.set_overlay_mode(true);
    assert!(!controller.is_overlay_active());
    assert_eq!(controller.mode(), Mode::Normal);
    assert!(!controller.request_enter_overlay());

    window.set_overlay_mode(false);
    ui.run_pending();
    worker.run_pending();
    assert!(pipeline.calls().is_empty());
    assert!(tree.containers().is_empty());
}

#[test]
fn p4_lost_window_before_config_registers_nothing() {
    let Harness { host, controller, .. } = harness(&CHILDREN);
    let MockHost { view, window, .. } = host;
    view.set_attached(true);
    drop(window);

    controller.set_config(enabled());
    assert!(controller.relay_id().is_none());
    assert!(!controller.request_enter_overlay());
    assert_eq!(controller.mode(), Mode::Normal);
}

#[test]
fn p4_lost_root_during_overlay_still_releases_once() {
    let Harness { host, pipeline, ui, worker, controller, .. } = harness(&CHILDREN);
    let MockHost { view, window, tree } = host;
    let settle = || while ui.run_pending() + worker.run_pending() > 0 {};
    view.set_attached(true);
    controller.set_config(enabled());
    assert!(controller.request_enter_overlay());
    window.set_overlay_mode(true);
    tree.run_layout(LAYOUT);
    settle();
    let snapshot = controller.session_snapshot().expect("active session");
    assert!(snapshot.source_attached());
    let surface = snapshot.surface.unwrap();

    drop(tree);
    pipeline.emit_first_frame(surface);
    settle();
    assert!(!controller.session_snapshot().unwrap().revealed);

    window.set_overlay_mode(false);
    settle();
    assert_eq!(controller.mode(), Mode::Normal);
    assert_eq!(pipeline.release_count(surface), 1);
    assert!(pipeline.bindings().is_empty());

    drop(window);
    controller.on_mode_changed(false);
    controller.on_host_detached();
    settle();
    assert!(!controller.request_enter_overlay());
    assert_eq!(pipeline.release_count(surface), 1);
}

#[test]
fn exit_during_bring_up_discards_the_new_session() {
    let h = hooked_harness(false);
    let before = h.host.tree.root_children();
    h.attach_and_enable();
    assert!(h.controller.request_enter_overlay());

    h.host.window.set_overlay_mode(true);
    h.settle();

    assert_eq!(h.controller.mode(), Mode::Normal);
    assert!(!h.controller.is_overlay_active());
    assert!(h.host.tree.containers().is_empty());
    assert_eq!(h.host.tree.root_children(), before);
    assert_eq!(h.pipeline.count(|c| matches!(c, PipelineCall::Create(_))), 1);
    assert!(h.pipeline.live_surfaces().is_empty());
}

#[test]
fn second_entry_during_bring_up_is_ignored() {
    let h = hooked_harness(true);
    h.attach_and_enable();
    assert!(h.controller.request_enter_overlay());

    h.host.window.set_overlay_mode(true);

    assert_eq!(h.controller.mode(), Mode::Overlay);
    assert!(h.controller.is_overlay_active());
    assert_eq!(h.host.tree.containers().len(), 1);
    assert_eq!(h.pipeline.count(|c| matches!(c, PipelineCall::Create(_))), 1);

    h.host.window.set_overlay_mode(false);
    h.settle();
    assert!(h.pipeline.live_surfaces().is_empty());
}

#[test]
fn p5_failed_late_attach_releases_exactly_once() {
    let h = harness(&CHILDREN);
    h.attach_and_enable();
    h.enter();
    h.layout();
    let surface = h.surface();
    h.pipeline.set_fail_attach(true);

    h.host.window.set_overlay_mode(false);
    h.settle();

    assert_eq!(h.pipeline.release_count(surface), 1);
    assert_eq!(h.pipeline.count(|c| matches!(c, PipelineCall::Detach(..))), 0);
}

#[test]
fn dropped_controller_turns_relay_and_late_attach_into_noops() {
    let Harness { host, pipeline, ui, worker, controller, .. } = harness(&CHILDREN);
    host.view.set_attached(true);
    controller.set_config(enabled());
    assert!(controller.request_enter_overlay());
    host.window.set_overlay_mode(true);
    host.tree.run_layout(LAYOUT);
    ui.run_pending();
    let surface = controller.session_snapshot().and_then(|s| s.surface).unwrap();

    drop(controller);
    assert!(host.window.relays().is_empty());
    assert!(host.tree.containers().is_empty());

    host.window.set_overlay_mode(false);
    while ui.run_pending() + worker.run_pending() > 0 {}
    assert!(pipeline.bindings().is_empty());
    assert_eq!(pipeline.release_count(surface), 1);
}

// ── Negotiation ───────────────────────────────────────────────────────────────

#[test]
fn rejected_request_stays_normal() {
    let h = harness(&CHILDREN);
    h.attach_and_enable();
    h.host.window.set_accepts(false);

    assert!(!h.controller.request_enter_overlay());
    assert_eq!(h.controller.mode(), Mode::Normal);
    assert_eq!(h.host.window.enter_requests().len(), 1);
}

#[test]
fn request_ignored_when_disabled_or_busy() {
    let h = harness(&CHILDREN);
    h.host.view.set_attached(true);
    assert!(!h.controller.request_enter_overlay());
    assert!(h.host.window.enter_requests().is_empty());

    h.controller.set_config(enabled());
    assert!(h.controller.request_enter_overlay());
    assert!(!h.controller.request_enter_overlay());
    assert_eq!(h.host.window.enter_requests().len(), 1);
}

#[test]
fn aspect_hint_uses_preferred_size_then_view_size() {
    let h = harness(&CHILDREN);
    h.attach_and_enable();
    assert!(h.controller.request_enter_overlay());
    let hint = h.host.window.enter_requests()[0].aspect_ratio.unwrap();
    assert_eq!((hint.numerator(), hint.denominator()), (1280, 720));

    h.host.window.set_overlay_mode(false);
    h.controller.set_preferred_size(Size::new(400, 300));
    assert!(h.controller.request_enter_overlay());
    let hint = h.host.window.enter_requests()[1].aspect_ratio.unwrap();
    assert_eq!((hint.numerator(), hint.denominator()), (400, 300));

    h.host.window.set_overlay_mode(false);
    h.controller.set_preferred_size(Size::ZERO);
    h.host.view.set_size(Size::ZERO);
    assert!(h.controller.request_enter_overlay());
    assert!(h.host.window.enter_requests()[2].aspect_ratio.is_none());
}

#[test]
fn request_exit_is_advisory() {
    let h = harness(&CHILDREN);
    h.active_overlay();

    h.controller.request_exit_overlay();
    assert_eq!(h.controller.mode(), Mode::Overlay);
    assert!(h.controller.is_overlay_active());
}

#[test]
fn auto_enter_follows_auto_start_when_supported() {
    let h = harness(&CHILDREN);
    h.attach_and_enable();
    let updates = h.host.window.param_updates();
    assert_eq!(updates.len(), 1);
    assert!(updates[0].auto_enter);

    h.controller.set_auto_start(false);
    let updates = h.host.window.param_updates();
    assert_eq!(updates.len(), 2);
    assert!(!updates[1].auto_enter);
}

#[test]
fn auto_enter_is_skipped_without_capability() {
    let h = harness_with(MockHost {
        view: MockView::new(Some(SOURCE), Size::new(640, 480)),
        window: MockWindow::new(false),
        tree: MockTree::with_children(&CHILDREN),
    });
    h.attach_and_enable();
    assert!(h.controller.relay_id().is_some());

    assert!(h.controller.request_enter_overlay());
    assert!(!h.host.window.enter_requests()[0].auto_enter);

    h.controller.set_auto_start(false);
    assert!(h.host.window.param_updates().is_empty());
}

#[test]
fn auto_entered_overlay_creates_session_from_normal() {
    let h = harness(&CHILDREN);
    h.attach_and_enable();

    h.host.window.set_overlay_mode(true);
    assert_eq!(h.controller.mode(), Mode::Overlay);
    assert!(h.controller.is_overlay_active());
}

// ── Config ────────────────────────────────────────────────────────────────────

#[test]
fn disabling_during_overlay_forces_teardown() {
    let h = harness(&CHILDREN);
    let before = h.host.tree.root_children();
    let surface = h.active_overlay();

    h.controller.set_enabled(false);
    h.settle();

    assert!(h.controller.relay_id().is_none());
    assert!(h.host.window.relays().is_empty());
    assert_eq!(h.host.tree.root_children(), before);
    assert_eq!(h.pipeline.release_count(surface), 1);

    // The window's own exit notification no longer reaches the controller.
    h.host.window.set_overlay_mode(false);
    assert_eq!(h.controller.mode(), Mode::Normal);
}

#[test]
fn identical_config_is_ignored() {
    let h = harness(&CHILDREN);
    h.attach_and_enable();
    let id = h.controller.relay_id();

    h.controller.set_config(enabled());
    assert_eq!(h.controller.relay_id(), id);
    assert_eq!(h.host.window.param_updates().len(), 1);
}

#[test]
fn auto_stop_is_stored_only() {
    let h = harness(&CHILDREN);
    h.active_overlay();

    h.controller.set_auto_stop(false);
    assert!(!h.controller.config().auto_stop);
    assert!(h.controller.is_overlay_active());
}

// ── Surface bring-up ──────────────────────────────────────────────────────────

#[test]
fn zero_sized_layout_defers_initialisation() {
    let h = harness(&CHILDREN);
    h.attach_and_enable();
    h.enter();

    h.host.tree.run_layout(Size::ZERO);
    h.ui.run_pending();
    assert!(!h.controller.session_snapshot().unwrap().initialized);
    assert!(h.worker.is_empty());

    h.layout();
    assert!(h.controller.session_snapshot().unwrap().initialized);

    // Later layout passes do not initialise again.
    h.layout();
    assert_eq!(h.pipeline.count(|c| matches!(c, PipelineCall::Init(_))), 1);
}

#[test]
fn missing_shared_context_never_attaches() {
    let h = harness(&CHILDREN);
    h.pipeline.set_shared_context(None);
    h.attach_and_enable();
    h.enter();
    h.layout();
    h.settle();

    assert_eq!(h.pipeline.count(|c| matches!(c, PipelineCall::Attach(..))), 0);
    let surface = h.surface();

    h.host.window.set_overlay_mode(false);
    h.settle();
    assert_eq!(h.pipeline.release_count(surface), 1);
}

#[test]
fn failed_init_releases_without_detach() {
    let h = harness(&CHILDREN);
    h.pipeline.set_fail_init(true);
    h.attach_and_enable();
    h.enter();
    h.layout();
    let surface = h.surface();
    assert_eq!(h.controller.session_snapshot().unwrap().attach, AttachState::Failed);

    h.host.window.set_overlay_mode(false);
    h.settle();
    assert_eq!(h.pipeline.release_count(surface), 1);
    assert_eq!(h.pipeline.count(|c| matches!(c, PipelineCall::Detach(..))), 0);
}

#[test]
fn failed_init_is_not_retried_on_later_layouts() {
    let h = harness(&CHILDREN);
    h.pipeline.set_fail_init(true);
    h.attach_and_enable();
    h.enter();

    h.layout();
    h.layout();
    h.layout();
    assert_eq!(h.pipeline.count(|c| matches!(c, PipelineCall::Init(_))), 1);

    h.pipeline.set_fail_init(false);
    h.layout();
    h.settle();
    assert_eq!(h.pipeline.count(|c| matches!(c, PipelineCall::Init(_))), 1);
    assert_eq!(h.pipeline.count(|c| matches!(c, PipelineCall::Attach(..))), 0);
}

#[test]
fn context_appearing_later_does_not_attach() {
    let h = harness(&CHILDREN);
    h.pipeline.set_shared_context(None);
    h.attach_and_enable();
    h.enter();
    h.layout();
    assert_eq!(h.controller.session_snapshot().unwrap().attach, AttachState::Failed);

    h.pipeline.set_shared_context(Some(SharedContext(1)));
    h.layout();
    h.settle();
    assert_eq!(h.pipeline.count(|c| matches!(c, PipelineCall::Init(_))), 0);
    assert_eq!(h.pipeline.count(|c| matches!(c, PipelineCall::Attach(..))), 0);
    assert!(!h.controller.session_snapshot().unwrap().initialized);
}

#[test]
fn first_frame_reveals_surface_once() {
    let h = harness(&CHILDREN);
    let surface = h.active_overlay();
    let node = h.host.tree.surface_nodes()[0];

    h.pipeline.emit_first_frame(surface);
    assert_eq!(h.host.tree.visibility(node), Some(Visibility::Invisible), "posted to UI");
    h.ui.run_pending();
    assert_eq!(h.host.tree.visibility(node), Some(Visibility::Visible));
    assert!(h.controller.session_snapshot().unwrap().revealed);
}

#[test]
fn first_frame_after_teardown_is_ignored() {
    let h = harness(&CHILDREN);
    let surface = h.active_overlay();
    let node = h.host.tree.surface_nodes()[0];

    // Frame lands on the render thread just as the window leaves overlay.
    h.pipeline.emit_first_frame(surface);
    h.host.window.set_overlay_mode(false);
    h.settle();

    assert!(h.host.tree.visibility(node).is_none());
    assert_eq!(h.pipeline.release_count(surface), 1);
}

#[test]
fn view_appearance_is_copied_to_overlay_surface() {
    let h = harness(&CHILDREN);
    let appearance = SurfaceAppearance { mirror: true, scaling: ScalingType::Fit };
    h.host.view.set_appearance(appearance);
    let surface = h.active_overlay();

    assert!(h.pipeline.calls().contains(&PipelineCall::Configure(surface, appearance)));
}

#[test]
fn missing_video_source_keeps_normal_mode() {
    let h = harness(&CHILDREN);
    h.host.view.set_source(None);
    h.attach_and_enable();
    h.enter();

    assert_eq!(h.controller.mode(), Mode::Normal);
    assert!(!h.controller.is_overlay_active());
    assert!(h.child_visibilities().iter().zip(CHILDREN).all(|((_, v), c)| *v == c));
}

// ── Restore ───────────────────────────────────────────────────────────────────

#[test]
fn restore_skips_children_removed_during_overlay() {
    let h = harness(&CHILDREN);
    let before = h.child_visibilities();
    h.active_overlay();

    let (removed, _) = before[1];
    h.host.tree.remove(removed).unwrap();
    let added = h.host.tree.add_child(Visibility::Visible);

    h.host.window.set_overlay_mode(false);
    h.settle();

    assert_eq!(h.host.tree.visibility(before[0].0), Some(before[0].1));
    assert_eq!(h.host.tree.visibility(before[2].0), Some(before[2].1));
    assert_eq!(h.host.tree.visibility(added), Some(Visibility::Visible));
    assert!(h.host.tree.visibility(removed).is_none());
}

#[test]
fn detach_failure_still_releases() {
    let h = harness(&CHILDREN);
    let surface = h.active_overlay();

    // Source vanished from the pipeline on its own.
    let source = pipkit_render::SourceHandle::new(SOURCE);
    let handle = pipkit_render::SurfaceHandle::new(surface);
    h.pipeline.detach_source(&source, &handle).unwrap();

    h.host.window.set_overlay_mode(false);
    h.settle();
    assert_eq!(h.pipeline.count(|c| matches!(c, PipelineCall::Detach(..))), 2);
    assert_eq!(h.pipeline.release_count(surface), 1);
}
