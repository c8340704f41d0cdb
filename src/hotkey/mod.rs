//! Keyboard stand-ins for the node's physical controls, backed by `rdev`.
//!
//! Three keys emulate the mode button, the radio setup switch and an
//! accelerometer tap.  `rdev::listen()` blocks forever, so it runs on a
//! **dedicated OS thread**, never inside a tokio task; events cross into the
//! runtime over a `tokio::sync::mpsc` channel.
//!
//! ```no_run
//! use tokio::sync::mpsc;
//! use acoustic_node::hotkey::{parse_key, HotkeyListener, PanelKeys};
//!
//! let (tx, mut rx) = mpsc::channel(16);
//! let keys = PanelKeys {
//!     mode: parse_key("F9").expect("unknown key"),
//!     setup: parse_key("F10").expect("unknown key"),
//!     tap: parse_key("F11").expect("unknown key"),
//! };
//! let _listener = HotkeyListener::start(keys, tx);
//!
//! // while let Some(ev) = rx.recv().await { panel.apply(ev) }
//! ```

pub mod listener;

pub use listener::HotkeyListener;

// ---------------------------------------------------------------------------
// PanelEvent
// ---------------------------------------------------------------------------

/// A press on one of the emulated controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelEvent {
    /// One click of the mode button.
    ModeClick,
    /// Flip the radio between normal and listening (setup) mode.
    SetupToggle,
    /// The accelerometer registered a tap.
    Tap,
}

/// Keys bound to each control.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PanelKeys {
    pub mode: rdev::Key,
    pub setup: rdev::Key,
    pub tap: rdev::Key,
}

impl PanelKeys {
    /// Resolve key names, falling back to F9/F10/F11 for unknown names.
    pub fn from_names(mode: &str, setup: &str, tap: &str) -> Self {
        let resolve = |name: &str, fallback: rdev::Key| {
            parse_key(name).unwrap_or_else(|| {
                log::warn!("hotkey: unknown key {name:?}, using {fallback:?}");
                fallback
            })
        };
        Self {
            mode: resolve(mode, rdev::Key::F9),
            setup: resolve(setup, rdev::Key::F10),
            tap: resolve(tap, rdev::Key::F11),
        }
    }

    /// Map a pressed key to its control.
    pub fn event_for(&self, key: rdev::Key) -> Option<PanelEvent> {
        if key == self.mode {
            Some(PanelEvent::ModeClick)
        } else if key == self.setup {
            Some(PanelEvent::SetupToggle)
        } else if key == self.tap {
            Some(PanelEvent::Tap)
        } else {
            None
        }
    }
}

// ---------------------------------------------------------------------------
// parse_key
// ---------------------------------------------------------------------------

/// Parse a hotkey name from a config string into an [`rdev::Key`].
///
/// Supports F1 to F12, common named keys, and single uppercase or lowercase ASCII
/// letters.
///
/// Returns `None` for unrecognised names so callers can fall back to a default
/// or display an error to the user.
///
/// # Examples
///
/// ```
/// use acoustic_node::hotkey::parse_key;
///
/// assert_eq!(parse_key("F9"),      Some(rdev::Key::F9));
/// assert_eq!(parse_key("Escape"),  Some(rdev::Key::Escape));
/// assert_eq!(parse_key("a"),       Some(rdev::Key::KeyA));
/// assert_eq!(parse_key("xyz"),     None);
/// ```
pub fn parse_key(key_str: &str) -> Option<rdev::Key> {
    match key_str {
        // Function keys
        "F1" => Some(rdev::Key::F1),
        "F2" => Some(rdev::Key::F2),
        "F3" => Some(rdev::Key::F3),
        "F4" => Some(rdev::Key::F4),
        "F5" => Some(rdev::Key::F5),
        "F6" => Some(rdev::Key::F6),
        "F7" => Some(rdev::Key::F7),
        "F8" => Some(rdev::Key::F8),
        "F9" => Some(rdev::Key::F9),
        "F10" => Some(rdev::Key::F10),
        "F11" => Some(rdev::Key::F11),
        "F12" => Some(rdev::Key::F12),

        // Navigation / control
        "Escape" | "Esc" => Some(rdev::Key::Escape),
        "Space" => Some(rdev::Key::Space),
        "Return" | "Enter" => Some(rdev::Key::Return),
        "Tab" => Some(rdev::Key::Tab),
        "Backspace" => Some(rdev::Key::Backspace),
        "Delete" | "Del" => Some(rdev::Key::Delete),
        "Home" => Some(rdev::Key::Home),
        "End" => Some(rdev::Key::End),
        "PageUp" => Some(rdev::Key::PageUp),
        "PageDown" => Some(rdev::Key::PageDown),
        "UpArrow" | "Up" => Some(rdev::Key::UpArrow),
        "DownArrow" | "Down" => Some(rdev::Key::DownArrow),
        "LeftArrow" | "Left" => Some(rdev::Key::LeftArrow),
        "RightArrow" | "Right" => Some(rdev::Key::RightArrow),

        // Lock / special
        "CapsLock" => Some(rdev::Key::CapsLock),
        "NumLock" => Some(rdev::Key::NumLock),
        "ScrollLock" => Some(rdev::Key::ScrollLock),
        "PrintScreen" => Some(rdev::Key::PrintScreen),
        "Pause" => Some(rdev::Key::Pause),

        // Letter keys (case-insensitive)
        "A" | "a" => Some(rdev::Key::KeyA),
        "B" | "b" => Some(rdev::Key::KeyB),
        "C" | "c" => Some(rdev::Key::KeyC),
        "D" | "d" => Some(rdev::Key::KeyD),
        "E" | "e" => Some(rdev::Key::KeyE),
        "F" | "f" => Some(rdev::Key::KeyF),
        "G" | "g" => Some(rdev::Key::KeyG),
        "H" | "h" => Some(rdev::Key::KeyH),
        "I" | "i" => Some(rdev::Key::KeyI),
        "J" | "j" => Some(rdev::Key::KeyJ),
        "K" | "k" => Some(rdev::Key::KeyK),
        "L" | "l" => Some(rdev::Key::KeyL),
        "M" | "m" => Some(rdev::Key::KeyM),
        "N" | "n" => Some(rdev::Key::KeyN),
        "O" | "o" => Some(rdev::Key::KeyO),
        "P" | "p" => Some(rdev::Key::KeyP),
        "Q" | "q" => Some(rdev::Key::KeyQ),
        "R" | "r" => Some(rdev::Key::KeyR),
        "S" | "s" => Some(rdev::Key::KeyS),
        "T" | "t" => Some(rdev::Key::KeyT),
        "U" | "u" => Some(rdev::Key::KeyU),
        "V" | "v" => Some(rdev::Key::KeyV),
        "W" | "w" => Some(rdev::Key::KeyW),
        "X" | "x" => Some(rdev::Key::KeyX),
        "Y" | "y" => Some(rdev::Key::KeyY),
        "Z" | "z" => Some(rdev::Key::KeyZ),

        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
