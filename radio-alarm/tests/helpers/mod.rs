//! Test helpers shared by the radio-alarm integration tests
//!
//! - FakeLauncher: in-memory player process with launch/terminate counters
//! - ManualClock: wall clock the test moves by hand
//! - TestApp: store in a temp dir + player + router

#![allow(dead_code)]

use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use serde_json::Value;
use tempfile::TempDir;
use tower::util::ServiceExt;

use radio_alarm::player::{Launcher, PlayerProcess};
use radio_alarm::scheduler::Clock;
use radio_alarm::{build_router, AppState, ConfigStore, PlayerController};

#[derive(Default)]
pub struct Counters {
    pub launched: AtomicUsize,
    pub terminated: AtomicUsize,
    pub killed: AtomicUsize,
}

struct FakeProcess {
    alive: Arc<AtomicBool>,
    counters: Arc<Counters>,
}

impl PlayerProcess for FakeProcess {
    fn has_exited(&mut self) -> io::Result<bool> {
        Ok(!self.alive.load(Ordering::SeqCst))
    }

    fn terminate(&mut self) -> io::Result<()> {
        self.counters.terminated.fetch_add(1, Ordering::SeqCst);
        self.alive.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn kill(&mut self) -> io::Result<()> {
        self.counters.killed.fetch_add(1, Ordering::SeqCst);
        self.alive.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Launcher whose processes live until terminated or crashed by the test
#[derive(Clone, Default)]
pub struct FakeLauncher {
    pub counters: Arc<Counters>,
    current: Arc<Mutex<Option<Arc<AtomicBool>>>>,
}

impl FakeLauncher {
    pub fn launched(&self) -> usize {
        self.counters.launched.load(Ordering::SeqCst)
    }

    pub fn terminated(&self) -> usize {
        self.counters.terminated.load(Ordering::SeqCst)
    }

    /// Make the current process exit as if it died on its own
    pub fn crash_current(&self) {
        if let Some(alive) = self.current.lock().unwrap().as_ref() {
            alive.store(false, Ordering::SeqCst);
        }
    }
}

impl Launcher for FakeLauncher {
    fn launch(&self) -> io::Result<Box<dyn PlayerProcess>> {
        self.counters.launched.fetch_add(1, Ordering::SeqCst);
        let alive = Arc::new(AtomicBool::new(true));
        *self.current.lock().unwrap() = Some(alive.clone());
        Ok(Box::new(FakeProcess {
            alive,
            counters: self.counters.clone(),
        }))
    }
}

/// Clock that only moves when told to
pub struct ManualClock(Mutex<NaiveDateTime>);

impl ManualClock {
    pub fn new(start: NaiveDateTime) -> Arc<Self> {
        Arc::new(Self(Mutex::new(start)))
    }

    pub fn set(&self, now: NaiveDateTime) {
        *self.0.lock().unwrap() = now;
    }

    pub fn advance(&self, delta: TimeDelta) {
        *self.0.lock().unwrap() += delta;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        *self.0.lock().unwrap()
    }
}

/// Build a local date-time
pub fn at(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(year, month, day)
        .unwrap()
        .and_hms_opt(hour, min, sec)
        .unwrap()
}

/// Store, player and router over a temporary state file
pub struct TestApp {
    pub dir: TempDir,
    pub store: Arc<ConfigStore>,
    pub player: Arc<PlayerController>,
    pub launcher: FakeLauncher,
}

impl TestApp {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(ConfigStore::load(dir.path().join("radio-config.json")).unwrap());
        let launcher = FakeLauncher::default();
        let player = Arc::new(PlayerController::new(launcher.clone(), Duration::ZERO));
        Self {
            dir,
            store,
            player,
            launcher,
        }
    }

    pub fn router(&self) -> axum::Router {
        build_router(AppState::new(self.store.clone(), self.player.clone()))
    }

    /// Reload the state file as a restarted service would
    pub fn reload_store(&self) -> ConfigStore {
        ConfigStore::load(self.store.path()).unwrap()
    }

    /// GET `uri` and return the status code with the decoded JSON body
    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        send_get(self.router(), uri).await
    }

    /// Shortcut for the `status` field of a successful response
    pub async fn status_of(&self, uri: &str) -> String {
        let (code, body) = self.get(uri).await;
        assert_eq!(code, StatusCode::OK, "GET {} returned {}", uri, code);
        body["status"].as_str().expect("status string").to_string()
    }
}

/// GET `uri` on `router`; the router is consumed so calls can be spawned
pub async fn send_get(router: axum::Router, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Should read body");
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("Should parse JSON")
    };
    (status, body)
}
