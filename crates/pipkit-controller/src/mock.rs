//! In-memory host, pipeline, and executors.
//!
//! Used by the test suite and the demo binary to drive full overlay cycles
//! without a real window system. Every mock records what it was asked to do.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use pipkit_core::errors::{RenderError, TreeError, WindowError};
use pipkit_core::{NodeId, Size, SurfaceId, Visibility};
use pipkit_render::{
    RenderPipeline, SharedContext, SourceHandle, SurfaceAppearance, SurfaceEvents, SurfaceHandle,
};

use crate::controller::HostBindings;
use crate::executor::{Executor, Task};
use crate::host::{HostView, HostWindow, LayoutListener, OverlayParams, VisualTree};
use crate::relay::{LifecycleRelay, RelayId, RelayRegistry};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── ManualExecutor ─────────────────────────────────────────────────────────────

/// Queues tasks until the test runs them.
#[derive(Default)]
pub struct ManualExecutor {
    queue: Mutex<VecDeque<Task>>,
}

impl ManualExecutor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn len(&self) -> usize {
        lock(&self.queue).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs the oldest queued task. `false` if the queue was empty.
    pub fn run_next(&self) -> bool {
        let task = lock(&self.queue).pop_front();
        match task {
            Some(task) => {
                task();
                true
            }
            None => false,
        }
    }

    /// Runs until the queue is empty, including tasks queued meanwhile.
    pub fn run_pending(&self) -> usize {
        let mut count = 0;
        while self.run_next() {
            count += 1;
        }
        count
    }
}

impl Executor for ManualExecutor {
    fn execute(&self, task: Task) {
        lock(&self.queue).push_back(task);
    }
}

// ── MockView ───────────────────────────────────────────────────────────────────

pub struct MockView {
    attached: AtomicBool,
    size: Mutex<Size>,
    source: Mutex<Option<SourceHandle>>,
    appearance: Mutex<SurfaceAppearance>,
}

impl MockView {
    pub fn new(source: Option<&str>, size: Size) -> Arc<Self> {
        Arc::new(Self {
            attached: AtomicBool::new(false),
            size: Mutex::new(size),
            source: Mutex::new(source.map(SourceHandle::new)),
            appearance: Mutex::new(SurfaceAppearance::default()),
        })
    }

    pub fn set_attached(&self, attached: bool) {
        self.attached.store(attached, Ordering::SeqCst);
    }

    pub fn set_size(&self, size: Size) {
        *lock(&self.size) = size;
    }

    pub fn set_source(&self, source: Option<&str>) {
        *lock(&self.source) = source.map(SourceHandle::new);
    }

    pub fn set_appearance(&self, appearance: SurfaceAppearance) {
        *lock(&self.appearance) = appearance;
    }
}

impl HostView for MockView {
    fn is_attached_to_window(&self) -> bool {
        self.attached.load(Ordering::SeqCst)
    }

    fn measured_size(&self) -> Size {
        *lock(&self.size)
    }

    fn video_source(&self) -> Option<SourceHandle> {
        lock(&self.source).clone()
    }

    fn appearance(&self) -> SurfaceAppearance {
        *lock(&self.appearance)
    }
}

// ── MockWindow ─────────────────────────────────────────────────────────────────

/// Window system that accepts requests and lets the test decide when the
/// mode actually changes via [`MockWindow::set_overlay_mode`].
pub struct MockWindow {
    relays: RelayRegistry,
    accepts: AtomicBool,
    auto_enter: bool,
    enter_requests: Mutex<Vec<OverlayParams>>,
    param_updates: Mutex<Vec<OverlayParams>>,
}

impl MockWindow {
    pub fn new(supports_auto_enter: bool) -> Arc<Self> {
        Arc::new(Self {
            relays: RelayRegistry::new(),
            accepts: AtomicBool::new(true),
            auto_enter: supports_auto_enter,
            enter_requests: Mutex::new(Vec::new()),
            param_updates: Mutex::new(Vec::new()),
        })
    }

    pub fn set_accepts(&self, accepts: bool) {
        self.accepts.store(accepts, Ordering::SeqCst);
    }

    pub fn relays(&self) -> &RelayRegistry {
        &self.relays
    }

    pub fn enter_requests(&self) -> Vec<OverlayParams> {
        lock(&self.enter_requests).clone()
    }

    pub fn param_updates(&self) -> Vec<OverlayParams> {
        lock(&self.param_updates).clone()
    }

    /// Simulates the window system entering or leaving overlay mode.
    pub fn set_overlay_mode(&self, active: bool) {
        self.relays.notify(active);
    }
}

impl HostWindow for MockWindow {
    fn request_enter_overlay(&self, params: &OverlayParams) -> Result<(), WindowError> {
        lock(&self.enter_requests).push(*params);
        if self.accepts.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(WindowError::OverlayRejected { reason: "denied by platform policy".into() })
        }
    }

    fn supports_auto_enter(&self) -> bool {
        self.auto_enter
    }

    fn update_overlay_params(&self, params: &OverlayParams) -> Result<(), WindowError> {
        if !self.auto_enter {
            return Err(WindowError::Unsupported { capability: "auto-enter".into() });
        }
        lock(&self.param_updates).push(*params);
        Ok(())
    }

    fn register_relay(&self, relay: Arc<LifecycleRelay>) -> Result<(), WindowError> {
        self.relays.register(relay);
        Ok(())
    }

    fn unregister_relay(&self, id: &RelayId) -> Result<(), WindowError> {
        self.relays.deregister(id);
        Ok(())
    }
}

// ── MockTree ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockNodeKind {
    /// Pre-existing UI owned by the host framework.
    Child,
    Container,
    Surface(SurfaceId),
}

#[derive(Debug, Clone, Copy)]
struct MockNode {
    kind: MockNodeKind,
    parent: Option<NodeId>,
    visibility: Visibility,
}

#[derive(Default)]
struct TreeState {
    next_id: u64,
    /// Direct children of the root, in order.
    root: Vec<NodeId>,
    nodes: BTreeMap<NodeId, MockNode>,
    listeners: BTreeMap<NodeId, LayoutListener>,
}

impl TreeState {
    fn alloc(&mut self, kind: MockNodeKind, parent: Option<NodeId>, visibility: Visibility) -> NodeId {
        self.next_id += 1;
        let id = NodeId(self.next_id);
        self.nodes.insert(id, MockNode { kind, parent, visibility });
        if parent.is_none() {
            self.root.push(id);
        }
        id
    }
}

#[derive(Default)]
pub struct MockTree {
    state: Mutex<TreeState>,
}

impl MockTree {
    pub fn with_children(visibilities: &[Visibility]) -> Arc<Self> {
        let tree = Self::default();
        {
            let mut state = lock(&tree.state);
            for visibility in visibilities {
                state.alloc(MockNodeKind::Child, None, *visibility);
            }
        }
        Arc::new(tree)
    }

    /// Adds a root child, as unrelated UI code would.
    pub fn add_child(&self, visibility: Visibility) -> NodeId {
        lock(&self.state).alloc(MockNodeKind::Child, None, visibility)
    }

    pub fn visibility(&self, node: NodeId) -> Option<Visibility> {
        lock(&self.state).nodes.get(&node).map(|n| n.visibility)
    }

    pub fn root_children(&self) -> Vec<(NodeId, MockNodeKind, Visibility)> {
        let state = lock(&self.state);
        state
            .root
            .iter()
            .filter_map(|id| state.nodes.get(id).map(|n| (*id, n.kind, n.visibility)))
            .collect()
    }

    pub fn containers(&self) -> Vec<NodeId> {
        self.nodes_of(|kind| kind == MockNodeKind::Container)
    }

    pub fn surface_nodes(&self) -> Vec<NodeId> {
        self.nodes_of(|kind| matches!(kind, MockNodeKind::Surface(_)))
    }

    fn nodes_of(&self, pred: impl Fn(MockNodeKind) -> bool) -> Vec<NodeId> {
        lock(&self.state)
            .nodes
            .iter()
            .filter(|(_, n)| pred(n.kind))
            .map(|(id, _)| *id)
            .collect()
    }

    /// Runs a layout pass: every surface listener sees `size`.
    pub fn run_layout(&self, size: Size) {
        let listeners: Vec<_> = lock(&self.state).listeners.values().cloned().collect();
        for listener in listeners {
            listener(size);
        }
    }
}

impl VisualTree for MockTree {
    fn children(&self) -> Result<Vec<(NodeId, Visibility)>, TreeError> {
        let state = lock(&self.state);
        Ok(state
            .root
            .iter()
            .filter_map(|id| state.nodes.get(id).map(|n| (*id, n.visibility)))
            .collect())
    }

    fn set_visibility(&self, node: NodeId, visibility: Visibility) -> Result<(), TreeError> {
        let mut state = lock(&self.state);
        let entry = state.nodes.get_mut(&node).ok_or(TreeError::NodeNotFound(node))?;
        entry.visibility = visibility;
        Ok(())
    }

    fn insert_container(&self) -> Result<NodeId, TreeError> {
        Ok(lock(&self.state).alloc(MockNodeKind::Container, None, Visibility::Visible))
    }

    fn insert_surface(
        &self,
        container: NodeId,
        surface: SurfaceId,
        visibility: Visibility,
        on_layout: LayoutListener,
    ) -> Result<NodeId, TreeError> {
        let mut state = lock(&self.state);
        match state.nodes.get(&container) {
            Some(node) if node.kind == MockNodeKind::Container => {}
            Some(_) => {
                return Err(TreeError::Rejected { reason: format!("{container} is not a container") })
            }
            None => return Err(TreeError::NodeNotFound(container)),
        }
        let id = state.alloc(MockNodeKind::Surface(surface), Some(container), visibility);
        state.listeners.insert(id, on_layout);
        Ok(id)
    }

    fn remove(&self, node: NodeId) -> Result<(), TreeError> {
        let mut state = lock(&self.state);
        if !state.nodes.contains_key(&node) {
            return Err(TreeError::NodeNotFound(node));
        }

        let mut doomed = vec![node];
        let mut i = 0;
        while i < doomed.len() {
            let parent = doomed[i];
            doomed.extend(
                state.nodes.iter().filter(|(_, n)| n.parent == Some(parent)).map(|(id, _)| *id),
            );
            i += 1;
        }
        for id in &doomed {
            state.nodes.remove(id);
            state.listeners.remove(id);
        }
        state.root.retain(|id| !doomed.contains(id));
        Ok(())
    }
}

// ── MockPipeline ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineCall {
    Create(SurfaceId),
    Configure(SurfaceId, SurfaceAppearance),
    Init(SurfaceId),
    Attach(String, SurfaceId),
    Detach(String, SurfaceId),
    Release(SurfaceId),
}

#[derive(Default)]
struct PipelineState {
    next_surface: u64,
    calls: Vec<PipelineCall>,
    live: BTreeSet<SurfaceId>,
    bindings: BTreeSet<(String, SurfaceId)>,
    events: BTreeMap<SurfaceId, Arc<dyn SurfaceEvents>>,
    context: Option<SharedContext>,
    fail_init: bool,
    fail_attach: bool,
}

pub struct MockPipeline {
    state: Mutex<PipelineState>,
}

impl MockPipeline {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(PipelineState {
                context: Some(SharedContext(1)),
                ..PipelineState::default()
            }),
        })
    }

    pub fn set_shared_context(&self, context: Option<SharedContext>) {
        lock(&self.state).context = context;
    }

    pub fn set_fail_init(&self, fail: bool) {
        lock(&self.state).fail_init = fail;
    }

    pub fn set_fail_attach(&self, fail: bool) {
        lock(&self.state).fail_attach = fail;
    }

    pub fn calls(&self) -> Vec<PipelineCall> {
        lock(&self.state).calls.clone()
    }

    /// Surfaces created and not yet released.
    pub fn live_surfaces(&self) -> Vec<SurfaceId> {
        lock(&self.state).live.iter().copied().collect()
    }

    /// Source/surface pairs currently bound.
    pub fn bindings(&self) -> Vec<(String, SurfaceId)> {
        lock(&self.state).bindings.iter().cloned().collect()
    }

    pub fn count(&self, pred: impl Fn(&PipelineCall) -> bool) -> usize {
        lock(&self.state).calls.iter().filter(|c| pred(c)).count()
    }

    pub fn release_count(&self, surface: SurfaceId) -> usize {
        self.count(|c| *c == PipelineCall::Release(surface))
    }

    /// Simulates the render thread painting the first frame of `surface`.
    pub fn emit_first_frame(&self, surface: SurfaceId) {
        let events = lock(&self.state).events.get(&surface).cloned();
        if let Some(events) = events {
            events.on_first_frame();
        }
    }

    fn check_live(state: &PipelineState, surface: SurfaceId) -> Result<(), RenderError> {
        if state.live.contains(&surface) {
            Ok(())
        } else {
            Err(RenderError::UnknownSurface(surface))
        }
    }
}

impl RenderPipeline for MockPipeline {
    fn create_surface(&self) -> Result<SurfaceHandle, RenderError> {
        let mut state = lock(&self.state);
        state.next_surface += 1;
        let id = SurfaceId(state.next_surface);
        state.live.insert(id);
        state.calls.push(PipelineCall::Create(id));
        Ok(SurfaceHandle::new(id))
    }

    fn configure_surface(
        &self,
        surface: &SurfaceHandle,
        appearance: SurfaceAppearance,
    ) -> Result<(), RenderError> {
        let mut state = lock(&self.state);
        state.calls.push(PipelineCall::Configure(surface.id(), appearance));
        Self::check_live(&state, surface.id())
    }

    fn shared_context(&self) -> Option<SharedContext> {
        lock(&self.state).context
    }

    fn init_surface(
        &self,
        surface: &SurfaceHandle,
        _context: SharedContext,
        events: Arc<dyn SurfaceEvents>,
    ) -> Result<(), RenderError> {
        let mut state = lock(&self.state);
        state.calls.push(PipelineCall::Init(surface.id()));
        Self::check_live(&state, surface.id())?;
        if state.fail_init {
            return Err(RenderError::InitializationFailed {
                surface: surface.id(),
                reason: "EGL surface creation failed".into(),
            });
        }
        state.events.insert(surface.id(), events);
        Ok(())
    }

    fn attach_source(&self, source: &SourceHandle, surface: &SurfaceHandle) -> Result<(), RenderError> {
        let mut state = lock(&self.state);
        state.calls.push(PipelineCall::Attach(source.id().to_owned(), surface.id()));
        Self::check_live(&state, surface.id())?;
        if state.fail_attach {
            return Err(RenderError::AttachFailed {
                source_id: source.id().to_owned(),
                surface: surface.id(),
                reason: "track disposed".into(),
            });
        }
        state.bindings.insert((source.id().to_owned(), surface.id()));
        Ok(())
    }

    fn detach_source(&self, source: &SourceHandle, surface: &SurfaceHandle) -> Result<(), RenderError> {
        let mut state = lock(&self.state);
        state.calls.push(PipelineCall::Detach(source.id().to_owned(), surface.id()));
        if state.bindings.remove(&(source.id().to_owned(), surface.id())) {
            Ok(())
        } else {
            Err(RenderError::DetachFailed {
                source_id: source.id().to_owned(),
                surface: surface.id(),
                reason: "source not attached".into(),
            })
        }
    }

    fn release_surface(&self, surface: SurfaceHandle) {
        let mut state = lock(&self.state);
        state.calls.push(PipelineCall::Release(surface.id()));
        state.live.remove(&surface.id());
        state.events.remove(&surface.id());
    }
}

// ── MockHost ───────────────────────────────────────────────────────────────────

/// View, window, and root tree of one simulated host window.
pub struct MockHost {
    pub view: Arc<MockView>,
    pub window: Arc<MockWindow>,
    pub tree: Arc<MockTree>,
}

impl MockHost {
    pub fn new(children: &[Visibility]) -> Self {
        Self {
            view: MockView::new(Some("remote-video-0"), Size::new(1280, 720)),
            window: MockWindow::new(true),
            tree: MockTree::with_children(children),
        }
    }

    pub fn bindings(&self) -> HostBindings {
        let view: Arc<dyn HostView> = self.view.clone();
        let window: Arc<dyn HostWindow> = self.window.clone();
        let root: Arc<dyn VisualTree> = self.tree.clone();
        HostBindings {
            view: Arc::downgrade(&view),
            window: Arc::downgrade(&window),
            root: Arc::downgrade(&root),
        }
    }
}
