//! # Focus Timer
//!
//! A pomodoro-style countdown. [`FocusTimer`] is the pure state machine;
//! [`FocusTimerHandle`] drives it once per second on the tokio runtime and
//! reports finished focus intervals to its owner.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};

pub const FOCUS_SECS: u32 = 25 * 60;
pub const BREAK_SECS: u32 = 5 * 60;

const TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerMode {
    Focus,
    Break,
}

impl TimerMode {
    /// Length a reset returns to.
    pub fn canonical_secs(&self) -> u32 {
        match self {
            Self::Focus => FOCUS_SECS,
            Self::Break => BREAK_SECS,
        }
    }

    fn other(&self) -> Self {
        match self {
            Self::Focus => Self::Break,
            Self::Break => Self::Focus,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimerState {
    pub remaining: u32,
    pub running: bool,
    pub is_break: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Not running; nothing changed.
    Idle,
    Running { remaining: u32 },
    /// Reached zero and stopped.
    Elapsed { break_suggested: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FocusTimer {
    mode: TimerMode,
    remaining: u32,
    running: bool,
}

impl Default for FocusTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl FocusTimer {
    /// Idle, focus mode, full 25 minutes.
    pub fn new() -> Self {
        Self { mode: TimerMode::Focus, remaining: FOCUS_SECS, running: false }
    }

    pub fn mode(&self) -> TimerMode {
        self.mode
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn state(&self) -> TimerState {
        TimerState {
            remaining: self.remaining,
            running: self.running,
            is_break: self.mode == TimerMode::Break,
        }
    }

    /// Returns true when the timer went from idle to running. A timer
    /// sitting at zero stays idle until reset.
    pub fn start(&mut self) -> bool {
        if self.running || self.remaining == 0 {
            return false;
        }
        self.running = true;
        true
    }

    pub fn pause(&mut self) {
        self.running = false;
    }

    pub fn tick(&mut self) -> TickOutcome {
        if !self.running {
            return TickOutcome::Idle;
        }
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining > 0 {
            return TickOutcome::Running { remaining: self.remaining };
        }
        self.running = false;
        TickOutcome::Elapsed { break_suggested: self.mode == TimerMode::Focus }
    }

    pub fn reset(&mut self) {
        self.running = false;
        self.remaining = self.mode.canonical_secs();
    }

    pub fn toggle_mode(&mut self) {
        self.mode = self.mode.other();
        self.reset();
    }

    /// Elapsed share of the current interval, in [0, 1].
    pub fn progress(&self) -> f64 {
        let total = self.mode.canonical_secs();
        let elapsed = total.saturating_sub(self.remaining);
        (f64::from(elapsed) / f64::from(total)).clamp(0.0, 1.0)
    }

    /// `MM:SS`
    pub fn display(&self) -> String {
        format!("{:02}:{:02}", self.remaining / 60, self.remaining % 60)
    }
}

/// Callback fired when a focus interval runs out.
pub type BreakCallback = Arc<dyn Fn() + Send + Sync>;

/// A [`FocusTimer`] with its once-per-second tick schedule.
///
/// At most one tick task exists per handle; it is aborted before a new one
/// is armed and on pause, reset, mode toggle and drop.
pub struct FocusTimerHandle {
    timer: Arc<Mutex<FocusTimer>>,
    ticker: Mutex<Option<JoinHandle<()>>>,
    on_break_suggested: BreakCallback,
}

impl FocusTimerHandle {
    pub fn new(on_break_suggested: BreakCallback) -> Self {
        Self {
            timer: Arc::new(Mutex::new(FocusTimer::new())),
            ticker: Mutex::new(None),
            on_break_suggested,
        }
    }

    pub fn snapshot(&self) -> FocusTimer {
        lock(&self.timer).clone()
    }

    /// Must run inside a tokio runtime.
    pub fn start(&self) -> TimerState {
        let started = lock(&self.timer).start();
        if started {
            self.arm();
        }
        self.state()
    }

    pub fn pause(&self) -> TimerState {
        self.disarm();
        lock(&self.timer).pause();
        self.state()
    }

    pub fn reset(&self) -> TimerState {
        self.disarm();
        lock(&self.timer).reset();
        self.state()
    }

    pub fn toggle_mode(&self) -> TimerState {
        self.disarm();
        lock(&self.timer).toggle_mode();
        self.state()
    }

    pub fn state(&self) -> TimerState {
        lock(&self.timer).state()
    }

    fn arm(&self) {
        let mut ticker = lock(&self.ticker);
        if let Some(previous) = ticker.take() {
            previous.abort();
        }

        let timer = Arc::clone(&self.timer);
        let on_break = Arc::clone(&self.on_break_suggested);
        *ticker = Some(tokio::spawn(async move {
            loop {
                sleep(TICK).await;
                let outcome = lock(&timer).tick();
                match outcome {
                    TickOutcome::Running { .. } => continue,
                    TickOutcome::Idle => return,
                    TickOutcome::Elapsed { break_suggested } => {
                        log::info!("timer interval finished");
                        if break_suggested {
                            on_break();
                        }
                        return;
                    }
                }
            }
        }));
    }

    fn disarm(&self) {
        if let Some(handle) = lock(&self.ticker).take() {
            handle.abort();
        }
    }
}

impl Drop for FocusTimerHandle {
    fn drop(&mut self) {
        self.disarm();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
