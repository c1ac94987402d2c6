use bitflags::bitflags;
use chrono::{DateTime, Local};

/// Player index reported before the bus assigns one.
pub const LED_UNASSIGNED: u8 = 0xFF;

/// One physical pad as seen by an enumeration pass.
///
/// Two refs are equal when their `id` matches; the other fields are
/// descriptive and may differ between passes.
#[derive(Debug, Clone)]
pub struct PhysicalDeviceRef {
    /// Lower-cased interface path, stable for as long as the pad stays paired.
    pub id: String,
    /// Interface path as reported by the OS, used to open the device.
    pub path: String,
    /// Human-readable name (e.g., "Xiaomi Bluetooth Gamepad")
    pub description: String,
    /// Device instance id (e.g., "HID\{00001124-...}_VID&00022717_PID&3144\...")
    pub instance_id: String,
    pub discovered_at: DateTime<Local>,
}

impl PhysicalDeviceRef {
    pub fn new(
        path: impl Into<String>,
        description: impl Into<String>,
        instance_id: impl Into<String>,
    ) -> Self {
        let path = path.into();
        Self {
            id: path.to_lowercase(),
            path,
            description: description.into(),
            instance_id: instance_id.into(),
            discovered_at: Local::now(),
        }
    }
}

impl PartialEq for PhysicalDeviceRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for PhysicalDeviceRef {}

impl std::fmt::Display for PhysicalDeviceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.description.is_empty() {
            write!(f, "{}", self.path)
        } else {
            write!(f, "{} ({})", self.description, self.path)
        }
    }
}

/// Selects the supported pad among all HID interfaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceFilter {
    needle: String,
}

impl DeviceFilter {
    pub fn new(fragment: &str) -> Self {
        Self {
            needle: fragment.to_lowercase(),
        }
    }

    pub fn matches(&self, path: &str) -> bool {
        path.to_lowercase().contains(&self.needle)
    }
}

bitflags! {
    /// Digital buttons in XUSB report order.
    #[repr(transparent)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Buttons: u16 {
        const DPAD_UP        = 0x0001;
        const DPAD_DOWN      = 0x0002;
        const DPAD_LEFT      = 0x0004;
        const DPAD_RIGHT     = 0x0008;
        const START          = 0x0010;
        const BACK           = 0x0020;
        const LEFT_THUMB     = 0x0040;
        const RIGHT_THUMB    = 0x0080;
        const LEFT_SHOULDER  = 0x0100;
        const RIGHT_SHOULDER = 0x0200;
        const GUIDE          = 0x0400;
        const A              = 0x1000;
        const B              = 0x2000;
        const X              = 0x4000;
        const Y              = 0x8000;

        const DPAD = Self::DPAD_UP.bits()
            | Self::DPAD_DOWN.bits()
            | Self::DPAD_LEFT.bits()
            | Self::DPAD_RIGHT.bits();
    }
}

/// Decoded logical state of one input frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControllerState {
    pub buttons: Buttons,
    pub left_trigger: u8,
    pub right_trigger: u8,
    pub thumb_lx: i16,
    pub thumb_ly: i16,
    pub thumb_rx: i16,
    pub thumb_ry: i16,
    /// Battery charge in percent, `None` when the pad reports nothing sensible.
    pub battery: Option<u8>,
}

impl ControllerState {
    pub fn guide(&self) -> bool {
        self.buttons.contains(Buttons::GUIDE)
    }

    pub fn set_guide(&mut self, pressed: bool) {
        self.buttons.set(Buttons::GUIDE, pressed);
    }
}

/// Rumble and player-LED request coming back from the virtual controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedbackCommand {
    /// Small (high frequency) motor.
    pub weak_motor: u8,
    /// Large (low frequency) motor.
    pub strong_motor: u8,
    pub led_index: u8,
}

impl FeedbackCommand {
    pub fn is_idle(&self) -> bool {
        self.weak_motor == 0 && self.strong_motor == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// No other process may open the device while we hold it.
    Exclusive,
    /// Read and write sharing with other handles.
    Shared,
}

/// Result of one bounded read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Report payload, without the report id.
    Report(Vec<u8>),
    TimedOut,
    Failed(String),
}
