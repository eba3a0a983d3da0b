use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, ensure, Result};
use pipkit_controller::mock::{MockHost, MockPipeline};
use pipkit_controller::{ui_channel, BlockingExecutor, ExecutionContexts, UiLoop, ViewModeController};
use pipkit_core::errors::ServiceError;
use pipkit_core::{Mode, PipOptions, Size, Visibility};
use pipkit_service::{
    ForegroundServiceConfig, ForegroundServiceController, Permission, PermissionProbe, ServiceHost,
    ServiceStartRequest,
};
use tracing::info;

/// How long the UI loop is pumped after each step.
const SETTLE: Duration = Duration::from_millis(50);

/// Drives one full overlay cycle against the in-memory host.
///
/// # Child count
/// Set `PIPKIT_DEMO_CHILDREN` to control how many sibling views the host root
/// holds besides the video view (default 3, max 16). Their visibilities cycle
/// through Visible / Invisible / Gone so restore can be checked afterwards.
///
/// # Flow
/// 1. Start the foreground service for the call
/// 2. Enable overlay from a `pip` property payload and attach the host view
/// 3. Request overlay; the mock window confirms it
/// 4. Lay the surface out, wait for the attach, paint a first frame
/// 5. Leave overlay and check the host tree came back unchanged
pub async fn run() -> Result<()> {
    let child_count: usize = std::env::var("PIPKIT_DEMO_CHILDREN")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(3)
        .min(16);

    let service = ForegroundServiceController::new(Arc::new(LoggingServiceHost), Arc::new(AllGranted));
    let status = service.start(&ForegroundServiceConfig {
        enable_camera: true,
        enable_microphone: true,
        ..ForegroundServiceConfig::default()
    })?;
    info!("Foreground service: {:?}", status);

    // ── Host and controller ────────────────────────────────────────────────
    let palette = [Visibility::Visible, Visibility::Invisible, Visibility::Gone];
    let children: Vec<_> = (0..child_count).map(|i| palette[i % palette.len()]).collect();
    let host = MockHost::new(&children);
    let before = host.tree.root_children();

    let pipeline = MockPipeline::new();
    let (ui, mut ui_loop) = ui_channel();
    let worker =
        BlockingExecutor::current().ok_or_else(|| anyhow!("demo must run inside a tokio runtime"))?;
    let controller = ViewModeController::new(
        host.bindings(),
        pipeline.clone(),
        ExecutionContexts { ui: Arc::new(ui), pipeline: Arc::new(worker) },
    );

    let options = PipOptions::from_json(
        r#"{"enabled": true, "startAutomatically": true, "preferredSize": {"width": 1280, "height": 720}}"#,
    )?;
    host.view.set_attached(true);
    controller.set_config(PipOptions::resolve(Some(&options)));
    info!("Overlay relay: {:?}", controller.relay_id());

    // ── Enter ──────────────────────────────────────────────────────────────
    ensure!(controller.request_enter_overlay(), "window system rejected overlay request");
    host.window.set_overlay_mode(true);
    ensure!(controller.mode() == Mode::Overlay, "overlay mode not reached");

    host.tree.run_layout(Size::new(480, 270));
    settle(&mut ui_loop).await;

    let snapshot = controller
        .session_snapshot()
        .ok_or_else(|| anyhow!("overlay session missing after enter"))?;
    ensure!(snapshot.source_attached(), "source never attached: {:?}", snapshot.attach);
    let surface = snapshot.surface.ok_or_else(|| anyhow!("session has no surface"))?;
    info!("Overlay active: {} on {}", snapshot.source, surface);

    pipeline.emit_first_frame(surface);
    settle(&mut ui_loop).await;
    info!("Surface revealed: {}", controller.session_snapshot().map_or(false, |s| s.revealed));

    // ── Exit ───────────────────────────────────────────────────────────────
    host.window.set_overlay_mode(false);
    settle(&mut ui_loop).await;

    ensure!(controller.mode() == Mode::Normal, "controller stuck in {}", controller.mode());
    ensure!(host.tree.root_children() == before, "host tree not restored");
    ensure!(pipeline.live_surfaces().is_empty(), "overlay surface leaked");
    info!(
        "Overlay cycle complete: {} child view(s) restored, {} pipeline call(s), {} UI task(s)",
        child_count,
        pipeline.calls().len(),
        ui_loop.executed()
    );

    drop(controller);
    service.stop()?;
    Ok(())
}

/// Pumps the UI loop; blocking-pool work posts back into it meanwhile.
async fn settle(ui_loop: &mut UiLoop) {
    while ui_loop.run_for(SETTLE).await > 0 {}
}

// ── Service stand-ins ──────────────────────────────────────────────────────────

struct LoggingServiceHost;

impl ServiceHost for LoggingServiceHost {
    fn start(&self, request: &ServiceStartRequest) -> Result<(), ServiceError> {
        info!(
            "Notification {} on '{}': {}",
            request.notification_id, request.channel_name, request.notification_title
        );
        Ok(())
    }

    fn stop(&self) -> Result<(), ServiceError> {
        Ok(())
    }
}

struct AllGranted;

impl PermissionProbe for AllGranted {
    fn is_granted(&self, _permission: Permission) -> bool {
        true
    }
}
