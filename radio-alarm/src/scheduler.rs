//! Alarm scheduler
//!
//! Background task that polls the wall clock against the configured wake
//! window and starts/stops the player on transitions only.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Datelike, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::player::PlayerController;
use crate::store::ConfigStore;

/// Source of local wall-clock time
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// Local time from the operating system
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// One-hour interval during which the alarm may sound
///
/// Both ends are inclusive. The end wraps past midnight, so a 23:30 wake
/// time gives `[23:30, 00:30]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WakeWindow {
    start: NaiveTime,
    end: NaiveTime,
}

impl WakeWindow {
    pub fn new(hour: u32, min: u32) -> Result<Self> {
        let start = NaiveTime::from_hms_opt(hour, min, 0)
            .ok_or(Error::InvalidAlarmTime { hour, min })?;
        let (end, _) = start.overflowing_add_signed(TimeDelta::hours(1));
        Ok(Self { start, end })
    }

    pub fn start(&self) -> NaiveTime {
        self.start
    }

    pub fn end(&self) -> NaiveTime {
        self.end
    }

    pub fn wraps_midnight(&self) -> bool {
        self.end < self.start
    }

    pub fn contains(&self, time: NaiveTime) -> bool {
        if self.wraps_midnight() {
            time >= self.start || time <= self.end
        } else {
            self.start <= time && time <= self.end
        }
    }

    /// Date on which the window containing `now` opened
    fn opened_on(&self, now: NaiveDateTime) -> NaiveDate {
        let date = now.date();
        if self.wraps_midnight() && now.time() <= self.end {
            date.pred_opt().unwrap_or(date)
        } else {
            date
        }
    }
}

/// Monday to Friday
pub fn is_weekday(date: NaiveDate) -> bool {
    date.weekday().num_days_from_monday() < 5
}

/// Whether the radio should be sounding at `now`
///
/// With `weekdays_only`, the part of a window after midnight counts toward
/// the day the window opened.
pub fn should_play(now: NaiveDateTime, window: &WakeWindow, weekdays_only: bool) -> bool {
    if !window.contains(now.time()) {
        return false;
    }
    !weekdays_only || is_weekday(window.opened_on(now))
}

/// Scheduler tunables
#[derive(Debug, Clone, Copy)]
pub struct SchedulerSettings {
    pub poll_interval: Duration,
    pub weekdays_only: bool,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            weekdays_only: true,
        }
    }
}

/// Transition acted upon by a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    /// Entered the wake window, player started
    Rising,
    /// Left the wake window, player stopped
    Falling,
}

pub struct AlarmScheduler {
    store: Arc<ConfigStore>,
    player: Arc<PlayerController>,
    clock: Arc<dyn Clock>,
    settings: SchedulerSettings,
    last_should_be_playing: bool,
}

impl AlarmScheduler {
    pub fn new(
        store: Arc<ConfigStore>,
        player: Arc<PlayerController>,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            store,
            player,
            clock: Arc::new(SystemClock),
            settings,
            last_should_be_playing: false,
        }
    }

    /// Replace the wall clock
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn last_should_be_playing(&self) -> bool {
        self.last_should_be_playing
    }

    /// Evaluate the alarm once
    ///
    /// Does nothing while the alarm is off. Otherwise starts the player on
    /// entering the window and stops it on leaving. The remembered state is
    /// updated as soon as the call is issued, so a failed start is not
    /// retried on the next tick.
    pub async fn tick(&mut self) -> Result<Option<Edge>> {
        if !self.store.get_bool("alarm/on")? {
            return Ok(None);
        }

        let window = WakeWindow::new(
            self.store.get_u32("alarm/hour")?,
            self.store.get_u32("alarm/min")?,
        )?;
        let now = self.clock.now();
        let should_be_playing = should_play(now, &window, self.settings.weekdays_only);
        debug!(
            "Alarm tick at {}: window {}-{}, should play: {}",
            now, window.start, window.end, should_be_playing
        );

        match (should_be_playing, self.last_should_be_playing) {
            (true, false) => {
                self.last_should_be_playing = true;
                info!("Wake window opened at {}, starting radio", now);
                self.player.start().await?;
                Ok(Some(Edge::Rising))
            }
            (false, true) => {
                self.last_should_be_playing = false;
                info!("Wake window closed at {}, stopping radio", now);
                self.player.stop().await?;
                Ok(Some(Edge::Falling))
            }
            _ => Ok(None),
        }
    }

    /// Run the polling loop on the tokio runtime
    pub fn spawn(mut self) -> SchedulerHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let join = tokio::spawn(async move {
            let mut interval = time::interval(self.settings.poll_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            info!(
                "Alarm scheduler started ({:?} interval, weekdays only: {})",
                self.settings.poll_interval, self.settings.weekdays_only
            );

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        // One failing tick must not end all future alarm checks
                        if let Err(e) = self.tick().await {
                            warn!("Alarm check failed: {}", e);
                        }
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }

            info!("Alarm scheduler stopped");
        });

        SchedulerHandle { shutdown_tx, join }
    }
}

/// Owner side of a spawned scheduler
///
/// Dropping the handle also ends the loop, but only `shutdown` waits for it.
pub struct SchedulerHandle {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Signal the loop to exit and wait until it has
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.join.await {
            warn!("Alarm scheduler task ended abnormally: {}", e);
        }
    }
}
