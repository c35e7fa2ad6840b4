use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

use polaroid_contracts::runs::RunAction;
use rand::Rng;

use crate::RunDispatch;

/// Largest simulated step per tick. Steps fall in `(0, MAX_TICK_DELTA]`.
pub const MAX_TICK_DELTA: f64 = 10.0;

/// Simulated progress for the item being generated. The provider reports no
/// progress, so this only feeds the progress bar.
#[derive(Debug, Clone, Copy)]
pub struct ProgressTicker {
    interval: Duration,
}

impl ProgressTicker {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: interval.max(Duration::from_millis(1)),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Starts ticking `index`. Ticks stop when the guard is stopped or dropped.
    pub fn start(&self, index: usize, dispatch: RunDispatch) -> TickerGuard {
        let signal = Arc::new(StopSignal::default());
        let worker_signal = Arc::clone(&signal);
        let interval = self.interval;
        let handle = thread::Builder::new()
            .name(format!("polaroid-progress-{index}"))
            .spawn(move || {
                let mut rng = rand::thread_rng();
                while worker_signal.wait(interval) {
                    dispatch.send(RunAction::ProgressTick {
                        index,
                        delta: MAX_TICK_DELTA - rng.gen_range(0.0..MAX_TICK_DELTA),
                    });
                }
            });

        TickerGuard {
            signal,
            // A ticker that fails to spawn only costs the animation.
            handle: handle.ok(),
        }
    }
}

#[derive(Debug, Default)]
struct StopSignal {
    stopped: Mutex<bool>,
    cvar: Condvar,
}

impl StopSignal {
    /// Sleeps for one interval; `false` once stop was requested.
    fn wait(&self, interval: Duration) -> bool {
        let Ok(guard) = self.stopped.lock() else {
            return false;
        };
        match self
            .cvar
            .wait_timeout_while(guard, interval, |stopped| !*stopped)
        {
            Ok((stopped, _)) => !*stopped,
            Err(_) => false,
        }
    }

    fn stop(&self) {
        if let Ok(mut stopped) = self.stopped.lock() {
            *stopped = true;
        }
        self.cvar.notify_all();
    }
}

/// Owns one ticker thread. Dropping it stops the thread and waits for it, so
/// no tick for this item is sent after the guard is gone.
#[derive(Debug)]
pub struct TickerGuard {
    signal: Arc<StopSignal>,
    handle: Option<thread::JoinHandle<()>>,
}

impl TickerGuard {
    pub fn stop(mut self) {
        self.shutdown();
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    fn shutdown(&mut self) {
        self.signal.stop();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for TickerGuard {
    fn drop(&mut self) {
        self.shutdown();
    }
}
