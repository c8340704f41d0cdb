//! Dedicated OS-thread key listener using `rdev::listen`.
//!
//! `rdev::listen` has **no graceful shutdown API**.  Dropping the
//! [`HotkeyListener`] sets a stop flag so the callback ignores further
//! events; the thread itself stays blocked in the rdev loop until the process
//! exits.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tokio::sync::mpsc;

use super::{PanelEvent, PanelKeys};

/// Handle to a running listener thread.  Drop it to stop forwarding events.
pub struct HotkeyListener {
    stop: Arc<AtomicBool>,
    /// Never joined: `rdev::listen` does not return.
    _thread: std::thread::JoinHandle<()>,
}

impl HotkeyListener {
    /// Spawn the listener thread and forward a [`PanelEvent`] on `tx` for
    /// every press of a key in `keys`.  Releases and auto-repeat of a held
    /// key are ignored.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the thread cannot be spawned.
    pub fn start(keys: PanelKeys, tx: mpsc::Sender<PanelEvent>) -> std::io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_clone = Arc::clone(&stop);

        let thread = std::thread::Builder::new()
            .name("hotkey-listener".into())
            .spawn(move || {
                let mut held: Option<rdev::Key> = None;
                let result = rdev::listen(move |event| {
                    if stop_clone.load(Ordering::Relaxed) {
                        return;
                    }

                    match event.event_type {
                        rdev::EventType::KeyPress(k) => {
                            if held == Some(k) {
                                return;
                            }
                            if let Some(ev) = keys.event_for(k) {
                                held = Some(k);
                                // blocking_send is safe to call from non-async threads.
                                let _ = tx.blocking_send(ev);
                            }
                        }
                        rdev::EventType::KeyRelease(k) if held == Some(k) => held = None,
                        _ => {}
                    }
                });

                if let Err(e) = result {
                    log::error!("hotkey-listener: rdev::listen exited with error: {:?}", e);
                }
            })?;

        Ok(Self {
            stop,
            _thread: thread,
        })
    }
}

impl Drop for HotkeyListener {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}
