//! Player controller
//!
//! Owns at most one external playback process. Liveness is polled, never
//! cached: a handle whose process has exited is dropped on the next probe.
//!
//! State machine:
//!
//! ```text
//! Idle --start()--> Playing --stop()--> Idle
//!                   Playing --(process exits, seen on next probe)--> Idle
//! ```

use std::io;
use std::process::Stdio;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Default stream played when no player command is configured
pub const DEFAULT_STREAM_URL: &str = "http://stream.srg-ssr.ch/m/drs3/mp3_128";

/// Handle to a running player process
pub trait PlayerProcess: Send {
    /// Non-blocking liveness probe; `true` once the process has exited
    fn has_exited(&mut self) -> io::Result<bool>;

    /// Ask the process to exit
    fn terminate(&mut self) -> io::Result<()>;

    /// Force the process to exit
    fn kill(&mut self) -> io::Result<()>;

    /// OS process id, if known
    fn id(&self) -> Option<u32> {
        None
    }
}

/// Something that can start the player
pub trait Launcher: Send + Sync {
    fn launch(&self) -> io::Result<Box<dyn PlayerProcess>>;
}

/// Launches the player as a child process
#[derive(Debug, Clone)]
pub struct CommandLauncher {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandLauncher {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

impl Default for CommandLauncher {
    fn default() -> Self {
        Self::new("mplayer", vec![DEFAULT_STREAM_URL.to_string()])
    }
}

impl Launcher for CommandLauncher {
    fn launch(&self) -> io::Result<Box<dyn PlayerProcess>> {
        let child = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;
        Ok(Box::new(ChildProcess { child }))
    }
}

/// `PlayerProcess` over a tokio child process
struct ChildProcess {
    child: tokio::process::Child,
}

impl PlayerProcess for ChildProcess {
    fn has_exited(&mut self) -> io::Result<bool> {
        Ok(self.child.try_wait()?.is_some())
    }

    #[cfg(unix)]
    fn terminate(&mut self) -> io::Result<()> {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        // No pid means the child has already been reaped
        let Some(pid) = self.child.id() else {
            return Ok(());
        };
        let pid = i32::try_from(pid).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        kill(Pid::from_raw(pid), Signal::SIGTERM).map_err(io::Error::from)
    }

    #[cfg(not(unix))]
    fn terminate(&mut self) -> io::Result<()> {
        self.child.start_kill()
    }

    fn kill(&mut self) -> io::Result<()> {
        self.child.start_kill()
    }

    fn id(&self) -> Option<u32> {
        self.child.id()
    }
}

/// Serializes start/stop of the single player process
pub struct PlayerController {
    launcher: Box<dyn Launcher>,
    grace_period: Duration,
    process: Mutex<Option<Box<dyn PlayerProcess>>>,
}

impl PlayerController {
    pub fn new(launcher: impl Launcher + 'static, grace_period: Duration) -> Self {
        Self {
            launcher: Box::new(launcher),
            grace_period,
            process: Mutex::new(None),
        }
    }

    /// Start playback unless already playing
    ///
    /// Returns `true` when a new process was launched.
    pub async fn start(&self) -> Result<bool> {
        let mut process = self.process.lock().await;
        if probe(&mut process) {
            debug!("Player already running, start ignored");
            return Ok(false);
        }

        let handle = self.launcher.launch().map_err(Error::PlayerLaunch)?;
        info!("Player started (pid {:?})", handle.id());
        *process = Some(handle);
        Ok(true)
    }

    /// Stop playback if playing
    ///
    /// Sends a graceful termination, waits the grace period and force-kills
    /// if the process is still alive. The handle is released either way.
    /// Returns `true` when a running process was stopped.
    pub async fn stop(&self) -> Result<bool> {
        let mut process = self.process.lock().await;
        if !probe(&mut process) {
            debug!("Player not running, stop ignored");
            return Ok(false);
        }

        if let Some(handle) = process.as_mut() {
            if let Err(e) = handle.terminate() {
                warn!("Graceful player termination failed: {}", e);
            }
        }

        if !self.grace_period.is_zero() {
            tokio::time::sleep(self.grace_period).await;
        }

        if probe(&mut process) {
            if let Some(handle) = process.as_mut() {
                warn!("Player still alive after {:?}, killing", self.grace_period);
                if let Err(e) = handle.kill() {
                    warn!("Failed to kill player: {}", e);
                }
            }
        }

        *process = None;
        info!("Player stopped");
        Ok(true)
    }

    /// Whether a player process is currently alive
    pub async fn is_playing(&self) -> bool {
        let mut process = self.process.lock().await;
        probe(&mut process)
    }

    /// Stop any live playback; called on service exit
    pub async fn shutdown(&self) -> Result<()> {
        if self.stop().await? {
            info!("Playback stopped for shutdown");
        }
        Ok(())
    }
}

/// Probe liveness, dropping the handle once the process is gone
fn probe(process: &mut Option<Box<dyn PlayerProcess>>) -> bool {
    let Some(handle) = process.as_mut() else {
        return false;
    };
    match handle.has_exited() {
        Ok(false) => true,
        Ok(true) => {
            debug!("Player process has exited");
            *process = None;
            false
        }
        Err(e) => {
            warn!("Player liveness probe failed, releasing handle: {}", e);
            *process = None;
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct Counters {
        launched: AtomicUsize,
        terminated: AtomicUsize,
        killed: AtomicUsize,
    }

    struct FakeProcess {
        alive: Arc<AtomicBool>,
        ignores_term: bool,
        term_fails: bool,
        counters: Arc<Counters>,
    }

    impl PlayerProcess for FakeProcess {
        fn has_exited(&mut self) -> io::Result<bool> {
            Ok(!self.alive.load(Ordering::SeqCst))
        }

        fn terminate(&mut self) -> io::Result<()> {
            self.counters.terminated.fetch_add(1, Ordering::SeqCst);
            if self.term_fails {
                return Err(io::Error::new(io::ErrorKind::PermissionDenied, "signal refused"));
            }
            if !self.ignores_term {
                self.alive.store(false, Ordering::SeqCst);
            }
            Ok(())
        }

        fn kill(&mut self) -> io::Result<()> {
            self.counters.killed.fetch_add(1, Ordering::SeqCst);
            self.alive.store(false, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct FakeLauncher {
        counters: Arc<Counters>,
        last_alive: Arc<std::sync::Mutex<Option<Arc<AtomicBool>>>>,
        ignores_term: bool,
        term_fails: bool,
        fail: bool,
    }

    impl FakeLauncher {
        fn crash_current(&self) {
            if let Some(alive) = self.last_alive.lock().unwrap().as_ref() {
                alive.store(false, Ordering::SeqCst);
            }
        }
    }

    impl Launcher for FakeLauncher {
        fn launch(&self) -> io::Result<Box<dyn PlayerProcess>> {
            if self.fail {
                return Err(io::Error::new(io::ErrorKind::NotFound, "no such player"));
            }
            self.counters.launched.fetch_add(1, Ordering::SeqCst);
            let alive = Arc::new(AtomicBool::new(true));
            *self.last_alive.lock().unwrap() = Some(alive.clone());
            Ok(Box::new(FakeProcess {
                alive,
                ignores_term: self.ignores_term,
                term_fails: self.term_fails,
                counters: self.counters.clone(),
            }))
        }
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let launcher = FakeLauncher::default();
        let player = PlayerController::new(launcher.clone(), Duration::ZERO);

        assert!(player.start().await.unwrap());
        assert!(!player.start().await.unwrap());
        assert!(player.is_playing().await);
        assert_eq!(launcher.counters.launched.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let launcher = FakeLauncher::default();
        let player = PlayerController::new(launcher.clone(), Duration::ZERO);

        assert!(!player.stop().await.unwrap());
        player.start().await.unwrap();
        assert!(player.stop().await.unwrap());
        assert!(!player.stop().await.unwrap());
        assert!(!player.is_playing().await);
        assert_eq!(launcher.counters.terminated.load(Ordering::SeqCst), 1);
        assert_eq!(launcher.counters.killed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stop_kills_after_grace_period() {
        let launcher = FakeLauncher {
            ignores_term: true,
            ..Default::default()
        };
        let player = PlayerController::new(launcher.clone(), Duration::from_millis(20));

        player.start().await.unwrap();
        assert!(player.stop().await.unwrap());
        assert!(!player.is_playing().await);
        assert_eq!(launcher.counters.terminated.load(Ordering::SeqCst), 1);
        assert_eq!(launcher.counters.killed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_terminate_falls_through_to_kill() {
        let launcher = FakeLauncher {
            term_fails: true,
            ..Default::default()
        };
        let player = PlayerController::new(launcher.clone(), Duration::ZERO);

        player.start().await.unwrap();
        assert!(player.stop().await.unwrap());
        assert!(!player.is_playing().await);
        assert_eq!(launcher.counters.terminated.load(Ordering::SeqCst), 1);
        assert_eq!(launcher.counters.killed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_external_exit_observed_lazily() {
        let launcher = FakeLauncher::default();
        let player = PlayerController::new(launcher.clone(), Duration::ZERO);

        player.start().await.unwrap();
        launcher.crash_current();

        assert!(!player.is_playing().await);
        // Handle released, so start launches a fresh process
        assert!(player.start().await.unwrap());
        assert_eq!(launcher.counters.launched.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_launch_failure_propagates() {
        let launcher = FakeLauncher {
            fail: true,
            ..Default::default()
        };
        let player = PlayerController::new(launcher, Duration::ZERO);

        assert!(matches!(player.start().await, Err(Error::PlayerLaunch(_))));
        assert!(!player.is_playing().await);
    }

    #[tokio::test]
    async fn test_concurrent_starts_spawn_one_process() {
        let launcher = FakeLauncher::default();
        let player = Arc::new(PlayerController::new(launcher.clone(), Duration::ZERO));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let player = player.clone();
                tokio::spawn(async move { player.start().await.unwrap() })
            })
            .collect();

        let mut launched = 0;
        for task in tasks {
            if task.await.unwrap() {
                launched += 1;
            }
        }

        assert_eq!(launched, 1);
        assert_eq!(launcher.counters.launched.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_shutdown_stops_playback() {
        let launcher = FakeLauncher::default();
        let player = PlayerController::new(launcher.clone(), Duration::ZERO);

        player.start().await.unwrap();
        player.shutdown().await.unwrap();
        assert!(!player.is_playing().await);
        // Nothing running: still fine
        player.shutdown().await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_launcher_real_process() {
        let launcher = CommandLauncher::new("sleep", vec!["30".to_string()]);
        let player = PlayerController::new(launcher, Duration::from_millis(200));

        assert!(player.start().await.unwrap());
        assert!(player.is_playing().await);
        assert!(player.stop().await.unwrap());
        assert!(!player.is_playing().await);
    }

    #[tokio::test]
    async fn test_command_launcher_missing_binary() {
        let launcher = CommandLauncher::new("definitely-not-a-player-binary", Vec::new());
        let player = PlayerController::new(launcher, Duration::ZERO);

        assert!(matches!(player.start().await, Err(Error::PlayerLaunch(_))));
    }
}
