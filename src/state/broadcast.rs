use parking_lot::Mutex;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::debug;

/// Shared fixed-rate timer of a state manager
///
/// Started lazily with the first monitored item and stopped with the last.
/// Late ticks are skipped, never replayed in a burst.
pub struct Broadcaster {
    period: Duration,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Broadcaster {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            task: Mutex::new(None),
        }
    }

    /// Start the timer unless it already runs. `tick` returning false ends it.
    pub fn ensure_running<F>(&self, tick: F)
    where
        F: Fn() -> bool + Send + 'static,
    {
        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }

        debug!("🔄 Starting broadcast loop ({}ms)", self.period.as_millis());
        let period = self.period;
        *task = Some(tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if !tick() {
                    break;
                }
            }
        }));
    }

    pub fn stop(&self) {
        if let Some(handle) = self.task.lock().take() {
            handle.abort();
            debug!("Broadcast loop stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for Broadcaster {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_ticks_at_fixed_rate_until_stopped() {
        let broadcaster = Broadcaster::new(Duration::from_millis(50));
        let ticks = Arc::new(AtomicUsize::new(0));

        let t = Arc::clone(&ticks);
        broadcaster.ensure_running(move || {
            t.fetch_add(1, Ordering::SeqCst);
            true
        });
        // A second start is ignored
        let t = Arc::clone(&ticks);
        broadcaster.ensure_running(move || {
            t.fetch_add(100, Ordering::SeqCst);
            true
        });
        assert!(broadcaster.is_running());

        // Immediate first tick plus one per period
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);

        broadcaster.stop();
        assert!(!broadcaster.is_running());
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_returning_false_ends_loop() {
        let broadcaster = Broadcaster::new(Duration::from_millis(10));
        broadcaster.ensure_running(|| false);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!broadcaster.is_running());
    }
}
