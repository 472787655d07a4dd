use super::*;
use crate::monitor::test_support::ScriptedUsage;
use crate::overlay::test_support::FakeSurface;
use crate::overlay::OverlayDismissed;
use crate::speech::test_support::FakeSpeech;
use kemeselot_storage::{BlockPolicy, PrayerMode};
use std::time::Duration;
use tempfile::TempDir;

struct Fixture {
    _dir: TempDir,
    database: Arc<Database>,
    usage: Arc<ScriptedUsage>,
    surface: Arc<FakeSurface>,
    overlay: Arc<OverlayController>,
    dismissed: mpsc::UnboundedReceiver<OverlayDismissed>,
}

impl Fixture {
    fn new(blocked: &[&str]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let database = Arc::new(Database::new(Some(dir.path().join("test.db"))).unwrap());
        database
            .set_blocked_apps(&BlockPolicy::new(blocked.iter().copied()))
            .unwrap();
        database
            .update_settings(&Settings {
                prayer_mode: PrayerMode::Silent,
                timer_duration_seconds: 2,
                overlay_command: None,
            })
            .unwrap();

        let surface = Arc::new(FakeSurface::default());
        let (tx, rx) = mpsc::unbounded_channel();
        let overlay = Arc::new(OverlayController::new(
            surface.clone(),
            Arc::new(FakeSpeech::default()),
            tx,
            Duration::from_secs(1),
        ));

        Self {
            _dir: dir,
            database,
            usage: Arc::new(ScriptedUsage::default()),
            surface,
            overlay,
            dismissed: rx,
        }
    }

    /// A fresh supervisor over the same database, as after a process restart
    fn supervisor(&self) -> ServiceSupervisor {
        ServiceSupervisor::new(
            self.database.clone(),
            self.usage.clone(),
            self.overlay.clone(),
            MonitorConfig::default(),
        )
    }

    fn intent(&self) -> ServiceIntent {
        self.database.get_service_state().unwrap().intent
    }
}

async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_start_and_stop_are_idempotent() {
    let f = Fixture::new(&[]);
    let mut supervisor = f.supervisor();

    supervisor.start().unwrap();
    supervisor.start().unwrap();
    assert!(supervisor.is_running());
    assert_eq!(f.intent(), ServiceIntent::Running);

    supervisor.stop().await.unwrap();
    supervisor.stop().await.unwrap();
    assert!(!supervisor.is_running());
    assert_eq!(f.intent(), ServiceIntent::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_user_stop_survives_restart() {
    let f = Fixture::new(&[]);
    let mut supervisor = f.supervisor();
    supervisor.start().unwrap();
    supervisor.stop().await.unwrap();
    drop(supervisor);

    let mut restarted = f.supervisor();
    assert!(!restarted.restore(RestoreReason::ProcessRestart).unwrap());
    assert!(!restarted.is_running());
    assert!(!restarted.restore(RestoreReason::Boot).unwrap());
    assert!(!restarted.is_running());
}

#[tokio::test(start_paused = true)]
async fn test_started_monitor_resumes_after_restart() {
    let f = Fixture::new(&[]);
    let mut supervisor = f.supervisor();
    supervisor.start().unwrap();
    // Killed without a stop: only the persisted intent survives
    drop(supervisor);

    let mut restarted = f.supervisor();
    assert!(restarted.restore(RestoreReason::ProcessRestart).unwrap());
    assert!(restarted.is_running());

    drop(restarted);

    let mut booted = f.supervisor();
    assert!(booted.restore(RestoreReason::Boot).unwrap());
    assert!(booted.is_running());
}

#[tokio::test(start_paused = true)]
async fn test_dropped_supervisor_leaves_one_monitor_polling() {
    let f = Fixture::new(&[]);
    let mut supervisor = f.supervisor();
    supervisor.start().unwrap();
    settle().await;
    drop(supervisor);

    let mut restarted = f.supervisor();
    assert!(restarted.restore(RestoreReason::ProcessRestart).unwrap());
    settle().await;

    let before = f.usage.queries();
    for _ in 0..10 {
        tokio::time::sleep(Duration::from_secs(1)).await;
        settle().await;
    }
    let polled = f.usage.queries() - before;
    assert!((9..=11).contains(&polled), "{polled} queries in 10 poll intervals");
}

#[tokio::test(start_paused = true)]
async fn test_blocked_app_raises_one_overlay() {
    let f = Fixture::new(&["app.x"]);
    f.usage.push_foreground("app.x");
    let mut supervisor = f.supervisor();
    supervisor.start().unwrap();

    tokio::time::sleep(Duration::from_millis(1_500)).await;
    settle().await;

    assert!(f.overlay.is_showing());
    assert_eq!(f.surface.raised(), 1);
    let state = supervisor.monitor_state().unwrap();
    assert_eq!(state.last_foreground_app.as_deref(), Some("app.x"));
    assert!(state.overlay_showing);
}

#[tokio::test(start_paused = true)]
async fn test_dismissal_clears_overlay_flag() {
    let mut f = Fixture::new(&["app.x"]);
    f.usage.push_foreground("app.x");
    let mut supervisor = f.supervisor();
    supervisor.start().unwrap();
    settle().await;

    tokio::time::sleep(Duration::from_millis(2_500)).await;
    assert!(f.overlay.request_dismiss());
    f.dismissed.recv().await.unwrap();
    supervisor.overlay_dismissed();
    settle().await;

    assert!(!f.overlay.is_showing());
    assert!(!supervisor.monitor_state().unwrap().overlay_showing);

    // Same app still in front: no new overlay
    tokio::time::sleep(Duration::from_secs(3)).await;
    settle().await;
    assert_eq!(f.surface.raised(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_reload_policy_takes_effect_while_running() {
    let f = Fixture::new(&[]);
    f.usage.push_foreground("app.x");
    let mut supervisor = f.supervisor();
    supervisor.start().unwrap();
    settle().await;
    assert!(!f.overlay.is_showing());

    f.database
        .set_blocked_apps(&BlockPolicy::new(["app.x"]))
        .unwrap();
    supervisor.reload_policy();
    settle().await;

    f.usage.push_foreground("launcher");
    f.usage.push_foreground("app.x");
    tokio::time::sleep(Duration::from_millis(2_500)).await;
    settle().await;
    assert!(f.overlay.is_showing());
}

#[tokio::test(start_paused = true)]
async fn test_failed_raise_clears_overlay_flag() {
    let f = Fixture::new(&["app.x"]);
    f.surface
        .fail_raise
        .store(true, std::sync::atomic::Ordering::SeqCst);
    f.usage.push_foreground("app.x");
    let mut supervisor = f.supervisor();
    supervisor.start().unwrap();
    settle().await;

    assert!(!f.overlay.is_showing());
    assert!(!supervisor.monitor_state().unwrap().overlay_showing);
}

#[tokio::test(start_paused = true)]
async fn test_watchdog_restarts_dead_monitor() {
    let f = Fixture::new(&[]);
    let mut supervisor = f.supervisor();
    supervisor.start().unwrap();

    supervisor.monitor.as_ref().unwrap().task.abort();
    settle().await;
    assert!(!supervisor.is_running());

    supervisor.ensure_running();
    assert!(supervisor.is_running());
}

#[tokio::test(start_paused = true)]
async fn test_watchdog_leaves_stopped_monitor_alone() {
    let f = Fixture::new(&[]);
    let mut supervisor = f.supervisor();
    supervisor.ensure_running();
    assert!(!supervisor.is_running());

    supervisor.start().unwrap();
    supervisor.stop().await.unwrap();
    supervisor.ensure_running();
    assert!(!supervisor.is_running());
}

#[tokio::test(start_paused = true)]
async fn test_halt_keeps_start_intent() {
    let f = Fixture::new(&[]);
    let mut supervisor = f.supervisor();
    supervisor.start().unwrap();
    supervisor.halt().await;

    assert!(!supervisor.is_running());
    assert_eq!(f.intent(), ServiceIntent::Running);
}
