//! Smoke test against a local Chromium. Run with `--ignored` on a host with Chrome installed.

use std::sync::Arc;

use cdp_adapter::{CdpConfig, CdpInspector, ChromiumTransport, Inspector, ScreenshotService};

#[tokio::test(flavor = "multi_thread")]
#[ignore]
async fn attaches_and_captures_against_real_chromium() {
    let profile = std::env::temp_dir().join("flowtap-real-browser-test");
    let cfg = CdpConfig {
        headless: true,
        user_data_dir: profile,
        ..CdpConfig::default()
    };
    assert!(cfg.can_connect(), "no Chromium executable found");

    let transport = Arc::new(ChromiumTransport::new(cfg.clone()));
    let inspector = Arc::new(CdpInspector::new(cfg, transport));
    inspector.start().await.expect("start transport");

    let target = inspector.active_target().await.expect("page target");
    let session = inspector.attach(&target.target_id).await.expect("attach");
    inspector.enable_network(&session).await.expect("network");

    let shot = ScreenshotService::new(inspector.clone()).capture(&session).await;
    assert!(shot.is_some());

    inspector.disable_network(&session).await.expect("disable");
    inspector.detach(&session).await.expect("detach");
}
