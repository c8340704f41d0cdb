//! Software watchdog on a dedicated OS thread.
//!
//! The monitor thread wakes a few times per timeout period and compares the
//! time since the last [`checkin`](Watchdog::checkin) against the timeout.
//! On expiry it logs and calls the restart hook once; it fires again only
//! after another check-in.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::Watchdog;

struct Shared {
    epoch: Instant,
    last_checkin_ms: AtomicU64,
    paused: AtomicBool,
    fired: AtomicBool,
    stop: AtomicBool,
}

impl Shared {
    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }
}

/// Thread-backed [`Watchdog`].  Dropping it stops the monitor thread.
pub struct ThreadWatchdog {
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
}

impl ThreadWatchdog {
    /// Start monitoring with `timeout`; `on_expire` runs on the monitor
    /// thread when the countdown runs out.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the monitor thread cannot be spawned.
    pub fn start<F>(timeout: Duration, on_expire: F) -> std::io::Result<Self>
    where
        F: Fn() + Send + 'static,
    {
        let shared = Arc::new(Shared {
            epoch: Instant::now(),
            last_checkin_ms: AtomicU64::new(0),
            paused: AtomicBool::new(false),
            fired: AtomicBool::new(false),
            stop: AtomicBool::new(false),
        });

        let monitor = Arc::clone(&shared);
        let timeout_ms = timeout.as_millis() as u64;
        let tick = (timeout / 4).clamp(Duration::from_millis(1), Duration::from_millis(250));

        let thread = std::thread::Builder::new()
            .name("watchdog".into())
            .spawn(move || {
                while !monitor.stop.load(Ordering::Relaxed) {
                    std::thread::sleep(tick);
                    if monitor.paused.load(Ordering::Acquire) {
                        continue;
                    }

                    let idle = monitor
                        .now_ms()
                        .saturating_sub(monitor.last_checkin_ms.load(Ordering::Acquire));
                    if idle >= timeout_ms && !monitor.fired.swap(true, Ordering::AcqRel) {
                        log::error!("watchdog: no check-in for {idle} ms, restarting");
                        on_expire();
                    }
                }
            })?;

        Ok(Self {
            shared,
            thread: Some(thread),
        })
    }

    /// `true` once the countdown has expired since the last check-in.
    pub fn has_fired(&self) -> bool {
        self.shared.fired.load(Ordering::Acquire)
    }
}

impl Watchdog for ThreadWatchdog {
    fn checkin(&mut self) {
        let shared = &*self.shared;
        shared
            .last_checkin_ms
            .store(shared.now_ms(), Ordering::Release);
        shared.fired.store(false, Ordering::Release);
        shared.paused.store(false, Ordering::Release);
    }

    fn pause(&mut self) {
        self.shared.paused.store(true, Ordering::Release);
        log::debug!("watchdog: paused");
    }
}

impl Drop for ThreadWatchdog {
    fn drop(&mut self) {
        self.shared.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
