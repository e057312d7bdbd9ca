//! Pausable one-second countdown for gridclash turns and combats.
//!
//! A [`TurnTimer`] counts down from a duration, producing one
//! [`TimerTick`] per interval: `d, d-1, …, 0`, and finally `-1`, which marks
//! expiry. After expiry the timer is [`TimerState::Finished`] and reports
//! `remaining() == 0`.
//!
//! # States
//!
//! ```text
//! Idle ──start──→ Running ⇄ Paused
//!                    │
//!                    └──(tick -1)──→ Finished
//! ```
//!
//! `start` and `reset` work from any state and always replace the previous
//! schedule, so there is never more than one pending tick per timer.
//!
//! # Integration
//!
//! The timer has no callback and no background task. It sits inside a room
//! actor's `tokio::select!` loop, and dropping the actor drops the timer, so
//! no tick can outlive its room:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         Some(cmd) = cmd_rx.recv() => { /* handle commands */ }
//!         tick = turn_timer.wait_for_tick() => {
//!             if tick.expired { /* force the turn to end */ }
//!         }
//!     }
//! }
//! ```

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::{self, Instant};
use tracing::{debug, trace};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Which countdown a timer drives. Each role has its own timer instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TimerRole {
    /// The active player's movement/action phase.
    Turn,
    /// One combatant's decision window inside a combat.
    Combat,
}

impl fmt::Display for TimerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Turn => write!(f, "turn"),
            Self::Combat => write!(f, "combat"),
        }
    }
}

/// Timer configuration.
#[derive(Debug, Clone)]
pub struct TimerConfig {
    /// Time between two ticks. One second in play; tests may shorten it.
    pub tick_interval: Duration,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
        }
    }
}

impl TimerConfig {
    /// Shortest interval accepted by [`validated`](Self::validated).
    pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

    /// Clamps a zero interval, which would spin the room loop.
    pub fn validated(mut self) -> Self {
        if self.tick_interval < Self::MIN_INTERVAL {
            self.tick_interval = Self::MIN_INTERVAL;
        }
        self
    }
}

// ---------------------------------------------------------------------------
// Tick / state
// ---------------------------------------------------------------------------

/// Lifecycle state of a [`TurnTimer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    Idle,
    Running,
    Paused,
    Finished,
}

/// One countdown step, returned by [`TurnTimer::wait_for_tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerTick {
    pub role: TimerRole,
    /// Seconds left. `-1` on the expiry tick.
    pub remaining: i64,
    /// `true` exactly once per countdown, on the `-1` tick.
    pub expired: bool,
}

// ---------------------------------------------------------------------------
// Timer
// ---------------------------------------------------------------------------

/// A restartable, pausable countdown. One per role per room.
#[derive(Debug)]
pub struct TurnTimer {
    role: TimerRole,
    interval: Duration,
    state: TimerState,
    /// Last value handed out (what clients see). 0 once finished.
    remaining: i64,
    /// Value the next tick will carry.
    next_value: i64,
    /// When the next tick is due. `None` unless running.
    next_tick: Option<Instant>,
    /// `true` between `start` and the first emitted tick.
    fresh: bool,
    ticks_emitted: u64,
}

impl TurnTimer {
    pub fn new(role: TimerRole, config: TimerConfig) -> Self {
        let config = config.validated();
        Self {
            role,
            interval: config.tick_interval,
            state: TimerState::Idle,
            remaining: 0,
            next_value: 0,
            next_tick: None,
            fresh: false,
            ticks_emitted: 0,
        }
    }

    /// A timer with the default one-second interval.
    pub fn with_role(role: TimerRole) -> Self {
        Self::new(role, TimerConfig::default())
    }

    /// Starts counting down from `duration` seconds.
    ///
    /// The first tick (carrying `duration`) is due immediately. Any
    /// schedule already in place is discarded first.
    pub fn start(&mut self, duration: u32) {
        if self.state == TimerState::Running {
            debug!(role = %self.role, remaining = self.remaining, "replacing running countdown");
        }
        self.state = TimerState::Running;
        self.remaining = i64::from(duration);
        self.next_value = i64::from(duration);
        self.next_tick = Some(Instant::now());
        self.fresh = true;
        debug!(role = %self.role, duration, "countdown started");
    }

    /// Stops unconditionally, then starts fresh.
    pub fn reset(&mut self, duration: u32) {
        self.stop();
        self.start(duration);
    }

    /// Cancels the countdown without finishing it.
    pub fn stop(&mut self) {
        if self.state != TimerState::Idle {
            debug!(role = %self.role, "countdown stopped");
        }
        self.state = TimerState::Idle;
        self.next_tick = None;
        self.fresh = false;
    }

    /// Suspends ticking, keeping the remaining value. Idempotent.
    pub fn pause(&mut self) {
        if self.state == TimerState::Running {
            self.state = TimerState::Paused;
            self.next_tick = None;
            debug!(role = %self.role, remaining = self.remaining, "countdown paused");
        }
    }

    /// Resumes a paused countdown from where it stopped.
    ///
    /// The next tick carries the value after the last one delivered, one
    /// interval from now; nothing is skipped or repeated. Returns `false`
    /// (and does nothing) unless the timer was paused.
    pub fn resume(&mut self) -> bool {
        if self.state != TimerState::Paused {
            return false;
        }
        self.state = TimerState::Running;
        let now = Instant::now();
        self.next_tick = Some(if self.fresh { now } else { now + self.interval });
        debug!(role = %self.role, remaining = self.remaining, "countdown resumed");
        true
    }

    /// Waits until the next tick is due and returns it.
    ///
    /// Pends forever unless the timer is running, so it is safe to keep
    /// in a `select!` branch at all times.
    pub async fn wait_for_tick(&mut self) -> TimerTick {
        let due = match (self.state, self.next_tick) {
            (TimerState::Running, Some(due)) => due,
            _ => {
                std::future::pending::<()>().await;
                unreachable!()
            }
        };

        time::sleep_until(due).await;

        let value = self.next_value;
        self.fresh = false;
        self.ticks_emitted += 1;

        if value < 0 {
            self.state = TimerState::Finished;
            self.remaining = 0;
            self.next_tick = None;
            debug!(role = %self.role, "countdown expired");
            return TimerTick {
                role: self.role,
                remaining: value,
                expired: true,
            };
        }

        self.remaining = value;
        self.next_value = value - 1;
        // Keep the original cadence: schedule from the deadline, not from now.
        self.next_tick = Some(due + self.interval);
        trace!(role = %self.role, remaining = value, "tick");

        TimerTick {
            role: self.role,
            remaining: value,
            expired: false,
        }
    }

    pub fn role(&self) -> TimerRole {
        self.role
    }

    pub fn state(&self) -> TimerState {
        self.state
    }

    /// Seconds left as last reported. 0 when finished.
    pub fn remaining(&self) -> i64 {
        self.remaining
    }

    pub fn is_running(&self) -> bool {
        self.state == TimerState::Running
    }

    pub fn is_paused(&self) -> bool {
        self.state == TimerState::Paused
    }

    /// Total ticks delivered since creation.
    pub fn ticks_emitted(&self) -> u64 {
        self.ticks_emitted
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}
