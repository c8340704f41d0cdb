//! Device state enum.

use std::fmt;

/// States of the node controller.
///
/// ```text
/// LpCheck ──charge ok──▶ BootWait ──▶ Publish ──▶ PublishWait ──▶ Connect
///    ▲      └─charge low─────────────────┐  └─cloud timeout─┐       │
///    │                                   ▼                  ▼       ▼
///    └──── wake ──── PowerDown ◀──── Sleep ◀──── Finish ◀──── Stream
///
/// listening / OTA ──▶ Setup ──▶ BootWait | PowerDown
/// odd clicks      ──▶ TestPrepare ──▶ Test      even clicks ──▶ BootWait
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceState {
    /// Settle after boot before touching the cloud.
    BootWait,
    /// Read the battery and pick the wake cadence.
    #[default]
    LpCheck,
    /// Publish measurements once the cloud is reachable.
    Publish,
    /// Let the publish go out.
    PublishWait,
    /// Open the collector stream and start capture.
    Connect,
    /// Capture, compress and transmit.
    Stream,
    /// Tear down and send the status message.
    Finish,
    /// Reset the session before powering down.
    Sleep,
    /// Suspend until the wake interval or motion.
    PowerDown,
    /// Provisioning / firmware update in progress.
    Setup,
    /// Quiesce everything before diagnostics.
    TestPrepare,
    /// Periodic signal and battery diagnostics.
    Test,
}

impl DeviceState {
    /// Returns `true` while a collector session may hold resources.
    ///
    /// ```
    /// use acoustic_node::device::DeviceState;
    ///
    /// assert!(DeviceState::Stream.in_session());
    /// assert!(DeviceState::Finish.in_session());
    /// assert!(!DeviceState::Sleep.in_session());
    /// ```
    pub fn in_session(&self) -> bool {
        matches!(
            self,
            DeviceState::Connect | DeviceState::Stream | DeviceState::Finish
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            DeviceState::BootWait => "BOOT_WAIT",
            DeviceState::LpCheck => "LP_CHECK",
            DeviceState::Publish => "PUBLISH",
            DeviceState::PublishWait => "PUBLISH_WAIT",
            DeviceState::Connect => "CONNECT",
            DeviceState::Stream => "STREAM",
            DeviceState::Finish => "FINISH",
            DeviceState::Sleep => "SLEEP",
            DeviceState::PowerDown => "POWER_DOWN",
            DeviceState::Setup => "SETUP",
            DeviceState::TestPrepare => "TEST_PREPARE",
            DeviceState::Test => "TEST",
        }
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
