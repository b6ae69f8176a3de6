//! Background presence expiry.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{Receiver, Sender};

use super::presence::PresenceTracker;
use crate::core::WallClock;

/// Periodically purges expired presence entries. Stops on [`stop`] or drop.
///
/// [`stop`]: PresenceSweeper::stop
pub struct PresenceSweeper {
    shutdown: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl PresenceSweeper {
    pub fn start(tracker: Arc<PresenceTracker>, interval: Duration) -> Self {
        let (shutdown_tx, shutdown_rx) = crossbeam::channel::bounded(1);
        let interval = interval.max(Duration::from_millis(1));
        let handle = thread::Builder::new()
            .name("valor-presence-sweeper".to_string())
            .spawn(move || run_sweep_loop(tracker, interval, shutdown_rx))
            .expect("spawn presence sweeper");
        Self {
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    pub fn stop(&mut self) {
        // Dropping the sender disconnects the shutdown channel.
        self.shutdown.take();
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            tracing::warn!("presence sweeper panicked");
        }
    }
}

impl Drop for PresenceSweeper {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_sweep_loop(tracker: Arc<PresenceTracker>, interval: Duration, shutdown: Receiver<()>) {
    let ticker = crossbeam::channel::tick(interval);
    loop {
        crossbeam::select! {
            recv(ticker) -> _ => {
                let removed = tracker.sweep(WallClock::now());
                if removed > 0 {
                    tracing::debug!(removed, "expired presence entries");
                }
            }
            recv(shutdown) -> _ => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{RoomKey, TenantId, UserId};
    use std::time::Instant;

    #[test]
    fn sweeps_in_background_and_stops() {
        let tracker = Arc::new(PresenceTracker::new(Duration::from_millis(1)));
        let key = RoomKey::parse("t1", "d1").unwrap();
        tracker.touch_at(
            &key,
            &UserId::new("u1").unwrap(),
            &TenantId::new("t1").unwrap(),
            serde_json::Value::Null,
            WallClock(0),
        );

        let mut sweeper = PresenceSweeper::start(Arc::clone(&tracker), Duration::from_millis(5));
        let deadline = Instant::now() + Duration::from_secs(2);
        while tracker.room_count() > 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(tracker.room_count(), 0);
        sweeper.stop();
        sweeper.stop();
    }
}
