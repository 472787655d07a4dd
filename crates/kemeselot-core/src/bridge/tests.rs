use super::*;
use crate::lock_gate::GateState;
use crate::monitor::test_support::ScriptedUsage;
use crate::overlay::test_support::FakeSurface;
use crate::permissions::test_support::FakePermissions;
use crate::speech::test_support::FakeSpeech;
use kemeselot_storage::{PrayerMode, Settings};
use std::sync::atomic::Ordering;
use std::time::Duration;
use tempfile::TempDir;

struct Fixture {
    _dir: TempDir,
    database: Arc<Database>,
    usage: Arc<ScriptedUsage>,
    permissions: Arc<FakePermissions>,
    surface: Arc<FakeSurface>,
    bridge: Bridge,
}

fn fixture(timer_seconds: u32) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let database = Arc::new(Database::new(Some(dir.path().join("test.db"))).unwrap());
    database
        .update_settings(&Settings {
            prayer_mode: PrayerMode::Silent,
            timer_duration_seconds: timer_seconds,
            overlay_command: None,
        })
        .unwrap();

    let usage = Arc::new(ScriptedUsage::default());
    let permissions = Arc::new(FakePermissions::default());
    let surface = Arc::new(FakeSurface::default());
    let parts = BridgeParts {
        usage: usage.clone(),
        permissions: permissions.clone(),
        surface: surface.clone(),
        speech: Arc::new(FakeSpeech::default()),
    };
    let bridge = Bridge::new(database.clone(), parts, MonitorConfig::default());

    Fixture {
        _dir: dir,
        database,
        usage,
        permissions,
        surface,
        bridge,
    }
}

async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

/// Start the monitor with `app` in front and wait until the overlay is up
async fn raise_overlay(f: &Fixture, app: &str) {
    f.bridge.set_blocked_apps([app]).await.unwrap();
    f.usage.push_foreground(app);
    f.bridge.start_monitor().await.unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;
    settle().await;
    assert!(f.bridge.status().await.unwrap().overlay.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_permission_checks_follow_the_host() {
    let f = fixture(300);
    assert!(!f.bridge.can_draw_overlays().await);
    assert!(!f.bridge.has_usage_access().await);

    f.bridge.request_overlay_permission();
    f.bridge.request_usage_access_permission();
    assert_eq!(f.permissions.requests.load(Ordering::SeqCst), 2);

    f.permissions.overlay.store(true, Ordering::SeqCst);
    f.permissions.usage_access.store(true, Ordering::SeqCst);
    assert!(f.bridge.permission_state().await.all_granted());
}

#[tokio::test(start_paused = true)]
async fn test_blocked_apps_round_trip() {
    let f = fixture(300);
    let apps: BTreeSet<String> = ["com.example.video", "com.example.chat", "org.game"]
        .into_iter()
        .map(String::from)
        .collect();

    assert!(f.bridge.set_blocked_apps(&apps).await.unwrap());
    assert_eq!(f.bridge.get_blocked_apps().unwrap(), apps);

    f.bridge.set_blocked_apps(Vec::<String>::new()).await.unwrap();
    assert!(f.bridge.get_blocked_apps().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_blocked_apps_keep_surrounding_whitespace() {
    let f = fixture(300);
    let apps: BTreeSet<String> = [" app.x", "app.y "].into_iter().map(String::from).collect();

    f.bridge.set_blocked_apps(&apps).await.unwrap();
    assert_eq!(f.bridge.get_blocked_apps().unwrap(), apps);
}

#[tokio::test(start_paused = true)]
async fn test_start_stop_through_bridge() {
    let f = fixture(300);
    assert!(!f.bridge.is_monitor_running().await);

    assert!(f.bridge.start_monitor().await.unwrap());
    assert!(f.bridge.start_monitor().await.unwrap());
    assert!(f.bridge.is_monitor_running().await);

    assert!(f.bridge.stop_monitor().await.unwrap());
    assert!(f.bridge.stop_monitor().await.unwrap());
    assert!(!f.bridge.is_monitor_running().await);
    assert_eq!(
        f.database.get_service_state().unwrap().intent,
        ServiceIntent::Stopped
    );
}

#[tokio::test(start_paused = true)]
async fn test_policy_update_reaches_running_monitor() {
    let f = fixture(300);
    f.usage.push_foreground("launcher");
    f.bridge.start_monitor().await.unwrap();
    settle().await;

    f.bridge.set_blocked_apps(["app.x"]).await.unwrap();
    settle().await;
    f.usage.push_foreground("app.x");
    tokio::time::sleep(Duration::from_millis(1_500)).await;
    settle().await;

    let status = f.bridge.status().await.unwrap();
    assert_eq!(status.overlay.unwrap().handle.triggering_app, "app.x");
    assert_eq!(status.blocked_count, 1);
    assert!(status.monitor_state.unwrap().overlay_showing);
}

#[tokio::test(start_paused = true)]
async fn test_dismiss_before_completion_is_ignored() {
    let f = fixture(300);
    let mut events = f.bridge.subscribe_overlay_dismissed();
    raise_overlay(&f, "app.x").await;

    tokio::time::sleep(Duration::from_secs(100)).await;
    f.bridge.dismiss_overlay();
    settle().await;

    assert!(events.try_recv().is_err());
    let overlay = f.bridge.status().await.unwrap().overlay.unwrap();
    assert_ne!(overlay.session.state, GateState::Completed);
    assert_eq!(f.surface.torn_down(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_completed_dismissal_notifies_once_and_resumes_monitoring() {
    let f = fixture(2);
    let mut events = f.bridge.subscribe_overlay_dismissed();
    raise_overlay(&f, "app.x").await;

    tokio::time::sleep(Duration::from_secs(3)).await;
    f.bridge.dismiss_overlay();
    let event = events.recv().await.unwrap();
    assert_eq!(event.handle.triggering_app, "app.x");
    settle().await;

    let status = f.bridge.status().await.unwrap();
    assert!(status.overlay.is_none());
    assert!(!status.monitor_state.unwrap().overlay_showing);

    // A second dismiss has nothing to act on
    f.bridge.dismiss_overlay();
    settle().await;
    assert!(events.try_recv().is_err());
    assert_eq!(f.surface.torn_down(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_new_subscriber_replaces_previous() {
    let f = fixture(2);
    let mut first = f.bridge.subscribe_overlay_dismissed();
    let mut second = f.bridge.subscribe_overlay_dismissed();
    assert!(first.recv().await.is_none());

    raise_overlay(&f, "app.x").await;
    tokio::time::sleep(Duration::from_secs(3)).await;
    f.bridge.dismiss_overlay();
    assert!(second.recv().await.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_system_actions_consumed_only_while_showing() {
    let f = fixture(300);
    assert_eq!(
        f.bridge.system_action(SystemAction::Back),
        ActionDisposition::PassThrough
    );

    raise_overlay(&f, "app.x").await;
    assert_eq!(
        f.bridge.system_action(SystemAction::Back),
        ActionDisposition::Consumed
    );
    assert_eq!(
        f.bridge.system_action(SystemAction::TaskSwitch),
        ActionDisposition::Consumed
    );
    settle().await;
    assert!(f.bridge.status().await.unwrap().overlay.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_speech_reports_without_overlay_are_dropped() {
    let f = fixture(300);
    assert!(!f.bridge.report_speech_started());
    assert!(!f.bridge.report_speech_ended());
    assert!(!f.bridge.pause_listening());
    assert!(!f.bridge.resume_listening());
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_keeps_start_intent() {
    let f = fixture(300);
    f.bridge.start_monitor().await.unwrap();
    f.bridge.shutdown().await;

    assert!(!f.bridge.is_monitor_running().await);
    assert_eq!(
        f.database.get_service_state().unwrap().intent,
        ServiceIntent::Running
    );
    assert!(f.bridge.restore(RestoreReason::ProcessRestart).await.unwrap());
    assert!(f.bridge.is_monitor_running().await);
}

#[tokio::test(start_paused = true)]
async fn test_dropped_bridge_stops_polling() {
    let Fixture {
        _dir,
        usage,
        bridge,
        ..
    } = fixture(300);
    bridge.start_monitor().await.unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;
    settle().await;
    assert!(usage.queries() > 0);

    drop(bridge);
    settle().await;
    let after_drop = usage.queries();
    tokio::time::sleep(Duration::from_secs(5)).await;
    settle().await;
    assert_eq!(usage.queries(), after_drop);
}
