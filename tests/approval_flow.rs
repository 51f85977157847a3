//! End-to-end tests for the popup listener, action driver, and approval flow
//!
//! These run against scripted in-memory surfaces, no browser required: the
//! mock source plays the browser's role of announcing and closing surfaces
//! while the real state machines drive them.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;

use wallet_pilot::browser::{ControlMatch, Intent, Surface, SurfaceSource};
use wallet_pilot::cdp::TargetInfo;
use wallet_pilot::common::Result;
use wallet_pilot::wallet::extension::ExtensionIdentity;
use wallet_pilot::wallet::{
    drive_approval, perform_action, ActionOptions, ApprovalOptions, FlowState, PopupListener,
    PopupWait,
};

/// One control on a mock screen: (label, visible, enabled)
type Screen = Vec<(&'static str, bool, bool)>;

/// A scripted surface: each successful click advances to the next screen;
/// clicking through the last screen closes the surface.
struct MockSurface {
    url: String,
    closed: AtomicBool,
    screens: Mutex<Vec<HashMap<String, (bool, bool)>>>,
    clicks: Mutex<Vec<String>>,
}

impl MockSurface {
    fn new(url: &str, screens: Vec<Screen>) -> Arc<Self> {
        let screens = screens
            .into_iter()
            .map(|screen| {
                screen
                    .into_iter()
                    .map(|(label, visible, enabled)| (label.to_string(), (visible, enabled)))
                    .collect()
            })
            .collect();
        Arc::new(Self {
            url: url.to_string(),
            closed: AtomicBool::new(false),
            screens: Mutex::new(screens),
            clicks: Mutex::new(Vec::new()),
        })
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn clicks(&self) -> Vec<String> {
        self.clicks.lock().unwrap().clone()
    }
}

#[async_trait]
impl Surface for MockSurface {
    async fn url(&self) -> Result<String> {
        Ok(self.url.clone())
    }

    async fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn probe(&self, intent: &Intent) -> Result<Option<ControlMatch>> {
        if self.closed.load(Ordering::SeqCst) {
            return Ok(None);
        }
        let screens = self.screens.lock().unwrap();
        let Some(screen) = screens.first() else {
            return Ok(None);
        };
        Ok(screen.get(&intent.value).map(|(visible, enabled)| ControlMatch {
            strategy: intent.strategy,
            selector: intent.value.clone(),
            visible: *visible,
            enabled: *enabled,
            x: 0.0,
            y: 0.0,
            locate_js: String::new(),
        }))
    }

    async fn scroll_into_view(&self, _control: &ControlMatch) -> Result<()> {
        Ok(())
    }

    async fn click(&self, control: &ControlMatch, _force: bool) -> Result<()> {
        self.clicks.lock().unwrap().push(control.selector.clone());
        let mut screens = self.screens.lock().unwrap();
        if !screens.is_empty() {
            screens.remove(0);
        }
        if screens.is_empty() {
            self.closed.store(true, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn fill(&self, _control: &ControlMatch, _text: &str) -> Result<()> {
        Ok(())
    }

    async fn screenshot(&self, _path: &Path) -> Result<()> {
        Ok(())
    }
}

/// Plays the browser: registers surfaces, announces target creation, closes
/// surfaces out from under the listener.
struct MockSource {
    created: broadcast::Sender<TargetInfo>,
    surfaces: Mutex<HashMap<String, (TargetInfo, Arc<MockSurface>)>>,
}

impl MockSource {
    fn new() -> Arc<Self> {
        let (created, _) = broadcast::channel(16);
        Arc::new(Self {
            created,
            surfaces: Mutex::new(HashMap::new()),
        })
    }

    fn target(id: &str, url: &str) -> TargetInfo {
        TargetInfo {
            target_id: id.to_string(),
            kind: "page".to_string(),
            title: String::new(),
            url: url.to_string(),
            attached: false,
        }
    }

    /// Register a surface as already open (no announcement)
    fn register(&self, id: &str, surface: Arc<MockSurface>) {
        let target = Self::target(id, &surface.url);
        self.surfaces
            .lock()
            .unwrap()
            .insert(id.to_string(), (target, surface));
    }

    /// Register and announce a newly created surface
    fn open_popup(&self, id: &str, surface: Arc<MockSurface>) {
        let target = Self::target(id, &surface.url);
        self.surfaces
            .lock()
            .unwrap()
            .insert(id.to_string(), (target.clone(), surface));
        let _ = self.created.send(target);
    }

    fn close(&self, id: &str) {
        if let Some((_, surface)) = self.surfaces.lock().unwrap().get(id) {
            surface.close();
        }
    }
}

#[async_trait]
impl SurfaceSource for MockSource {
    fn subscribe_created(&self) -> broadcast::Receiver<TargetInfo> {
        self.created.subscribe()
    }

    async fn open_surfaces(&self) -> Result<Vec<TargetInfo>> {
        Ok(self
            .surfaces
            .lock()
            .unwrap()
            .values()
            .filter(|(_, surface)| !surface.closed.load(Ordering::SeqCst))
            .map(|(target, _)| target.clone())
            .collect())
    }

    async fn adopt(&self, target: &TargetInfo) -> Result<Box<dyn Surface>> {
        let surfaces = self.surfaces.lock().unwrap();
        let (_, surface) = surfaces
            .get(&target.target_id)
            .ok_or_else(|| wallet_pilot::Error::TargetGone(target.target_id.clone()))?;
        Ok(Box::new(surface.clone()))
    }
}

fn fast_actions() -> ActionOptions {
    ActionOptions {
        retries: 3,
        backoff: Duration::from_millis(20),
        click_timeout: Duration::from_millis(100),
    }
}

fn fast_approval(popup_timeout_ms: u64) -> ApprovalOptions {
    ApprovalOptions {
        popup_timeout: Duration::from_millis(popup_timeout_ms),
        settle: Duration::from_millis(30),
        poll_interval: Duration::from_millis(20),
        close_wait: Duration::from_millis(400),
        screenshot_dir: None,
        intents: vec![
            Intent::text("Connect"),
            Intent::text("Sign"),
            Intent::text("Confirm"),
        ],
        action: fast_actions(),
    }
}

fn wallet_identity() -> ExtensionIdentity {
    ExtensionIdentity {
        id: "walletid".to_string(),
        verified: true,
    }
}

const POPUP_URL: &str = "chrome-extension://walletid/notification.html";

#[tokio::test]
async fn first_satisfying_intent_wins_in_caller_order() {
    // "Next" is present but disabled; "Connect" and "Approve" both satisfy.
    // The driver must take "Connect" because it comes first in caller order.
    let surface = MockSurface::new(
        POPUP_URL,
        vec![vec![
            ("Next", true, false),
            ("Connect", true, true),
            ("Approve", true, true),
        ]],
    );

    let intents = vec![
        Intent::text("Next"),
        Intent::text("Connect"),
        Intent::text("Approve"),
    ];
    let result = perform_action(&surface, &intents, &fast_actions()).await;

    assert!(result.success);
    assert_eq!(result.matched.as_deref(), Some("Connect"));
    assert_eq!(surface.clicks(), vec!["Connect".to_string()]);
}

#[tokio::test]
async fn closed_surface_is_implicit_success() {
    let surface = MockSurface::new(POPUP_URL, vec![vec![("Connect", true, true)]]);
    surface.close();

    let result = perform_action(&surface, &[Intent::text("Connect")], &fast_actions()).await;

    assert!(result.success);
    assert!(result.surface_closed);
    assert!(surface.clicks().is_empty());
}

#[tokio::test]
async fn exhausted_retries_report_failure_not_error() {
    // Only an invisible control: every retry misses, the result is a plain
    // failure record.
    let surface = MockSurface::new(POPUP_URL, vec![vec![("Connect", false, true)]]);

    let result = perform_action(&surface, &[Intent::text("Connect")], &fast_actions()).await;

    assert!(!result.success);
    assert_eq!(result.retries_used, 3);
    assert!(surface.clicks().is_empty());
}

#[tokio::test]
async fn resolved_pending_survives_popup_closure() {
    let source = MockSource::new();
    let mut listener = PopupListener::new(source.clone() as Arc<dyn SurfaceSource>);

    listener.arm();
    source.open_popup("P1", MockSurface::new(POPUP_URL, vec![]));
    tokio::time::sleep(Duration::from_millis(20)).await;

    // The popup closes before anyone consumes the subscription
    source.close("P1");

    let wait = listener
        .consume_pending_or_wait(Duration::from_millis(100))
        .await
        .unwrap();
    match wait {
        PopupWait::Found(target) => assert_eq!(target.target_id, "P1"),
        PopupWait::TimedOut { .. } => panic!("closed-but-known popup must still be returned"),
    }
}

#[tokio::test]
async fn rearming_cancels_the_previous_subscription() {
    let source = MockSource::new();
    let mut listener = PopupListener::new(source.clone() as Arc<dyn SurfaceSource>);

    listener.arm();
    listener.arm(); // second arm cancels the first
    assert!(listener.is_armed());

    source.open_popup("P2", MockSurface::new(POPUP_URL, vec![]));

    let wait = listener
        .consume_pending_or_wait(Duration::from_millis(200))
        .await
        .unwrap();
    match wait {
        PopupWait::Found(target) => assert_eq!(target.target_id, "P2"),
        PopupWait::TimedOut { .. } => panic!("second arm must not drop the popup"),
    }
    assert!(!listener.is_armed());
}

#[tokio::test]
async fn existing_marker_surface_is_found_without_arming() {
    let source = MockSource::new();
    source.register("P3", MockSurface::new(POPUP_URL, vec![]));
    let mut listener = PopupListener::new(source.clone() as Arc<dyn SurfaceSource>);

    // Never armed; the popup opened between commands and is still there
    let wait = listener
        .consume_pending_or_wait(Duration::from_millis(50))
        .await
        .unwrap();
    match wait {
        PopupWait::Found(target) => assert_eq!(target.target_id, "P3"),
        PopupWait::TimedOut { .. } => panic!("already-open popup must be found"),
    }
}

#[tokio::test]
async fn auto_closing_popup_still_reports_approved() {
    // Trigger clicked, listener armed first; the popup opens 50ms later and
    // auto-closes 150ms after that (previously trusted origin).
    let source = MockSource::new();
    let mut listener = PopupListener::new(source.clone() as Arc<dyn SurfaceSource>);
    listener.arm();

    let script = source.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        script.open_popup("P4", MockSurface::new(POPUP_URL, vec![]));
        tokio::time::sleep(Duration::from_millis(150)).await;
        script.close("P4");
    });

    let report = drive_approval(&mut listener, &wallet_identity(), None, &fast_approval(2_000))
        .await
        .unwrap();

    assert!(report.success);
    assert!(report.approved);
    assert!(report.popup_closed);
    assert_eq!(report.state, FlowState::Closed);
}

#[tokio::test]
async fn no_popup_times_out_with_open_page_count() {
    let source = MockSource::new();
    source.register("tab-1", MockSurface::new("https://app.example/swap", vec![]));
    source.register("tab-2", MockSurface::new("https://app.example/pool", vec![]));
    let mut listener = PopupListener::new(source.clone() as Arc<dyn SurfaceSource>);

    let report = drive_approval(&mut listener, &wallet_identity(), None, &fast_approval(100))
        .await
        .unwrap();

    assert!(!report.success);
    assert_eq!(
        report.error.as_deref(),
        Some("No popup window detected within timeout")
    );
    assert_eq!(report.open_pages, Some(2));
    assert_eq!(report.state, FlowState::TimedOut);
}

#[tokio::test]
async fn non_extension_popup_is_rejected_without_clicks() {
    let source = MockSource::new();
    let mut listener = PopupListener::new(source.clone() as Arc<dyn SurfaceSource>);
    listener.arm();

    let surface = MockSurface::new(
        "https://unrelated.example/signup",
        vec![vec![("Confirm", true, true)]],
    );
    source.open_popup("P5", surface.clone());

    let report = drive_approval(&mut listener, &wallet_identity(), None, &fast_approval(500))
        .await
        .unwrap();

    assert!(!report.success);
    assert_eq!(
        report.error.as_deref(),
        Some("Popup is not a Chrome extension")
    );
    assert_eq!(report.url.as_deref(), Some("https://unrelated.example/signup"));
    assert!(surface.clicks().is_empty());
}

#[tokio::test]
async fn foreign_extension_popup_is_rejected() {
    let source = MockSource::new();
    let mut listener = PopupListener::new(source.clone() as Arc<dyn SurfaceSource>);
    listener.arm();

    source.open_popup(
        "P6",
        MockSurface::new(
            "chrome-extension://someoneelse/notification.html",
            vec![vec![("Confirm", true, true)]],
        ),
    );

    let report = drive_approval(&mut listener, &wallet_identity(), None, &fast_approval(500))
        .await
        .unwrap();

    assert!(!report.success);
    assert!(report.error.as_deref().unwrap().contains("not owned"));
}

#[tokio::test]
async fn single_step_approval_reaches_closed() {
    let source = MockSource::new();
    let mut listener = PopupListener::new(source.clone() as Arc<dyn SurfaceSource>);
    listener.arm();

    let surface = MockSurface::new(POPUP_URL, vec![vec![("Connect", true, true)]]);
    source.open_popup("P7", surface.clone());

    let report = drive_approval(&mut listener, &wallet_identity(), None, &fast_approval(500))
        .await
        .unwrap();

    assert!(report.success);
    assert!(report.popup_closed);
    assert_eq!(report.state, FlowState::Closed);
    assert_eq!(surface.clicks(), vec!["Connect".to_string()]);
}

#[tokio::test]
async fn two_step_chain_completes_without_step_count() {
    // Connect confirmation followed by a signature request in the same
    // surface; the caller never says how many steps there are.
    let source = MockSource::new();
    let mut listener = PopupListener::new(source.clone() as Arc<dyn SurfaceSource>);
    listener.arm();

    let surface = MockSurface::new(
        POPUP_URL,
        vec![
            vec![("Connect", true, true)],
            vec![("Sign", true, true)],
        ],
    );
    source.open_popup("P8", surface.clone());

    let report = drive_approval(&mut listener, &wallet_identity(), None, &fast_approval(500))
        .await
        .unwrap();

    assert!(report.success);
    assert!(report.approved);
    assert_eq!(report.state, FlowState::Closed);
    assert_eq!(
        surface.clicks(),
        vec!["Connect".to_string(), "Sign".to_string()]
    );
    assert!(report.steps_attempted >= 2);
}

#[tokio::test]
async fn three_step_chain_is_driven_by_the_close_poll() {
    let source = MockSource::new();
    let mut listener = PopupListener::new(source.clone() as Arc<dyn SurfaceSource>);
    listener.arm();

    let surface = MockSurface::new(
        POPUP_URL,
        vec![
            vec![("Connect", true, true)],
            vec![("Confirm", true, true)],
            vec![("Sign", true, true)],
        ],
    );
    source.open_popup("P9", surface.clone());

    let report = drive_approval(&mut listener, &wallet_identity(), None, &fast_approval(500))
        .await
        .unwrap();

    assert!(report.success);
    assert_eq!(report.state, FlowState::Closed);
    assert_eq!(surface.clicks().len(), 3);
}
