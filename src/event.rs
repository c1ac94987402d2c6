use crate::device::PhysicalDeviceRef;

/// Everything that crosses from a worker thread to the control loop.
///
/// Worker threads never touch the session map directly; they post one of
/// these and the control loop applies it.
#[derive(Debug, Clone)]
pub enum BridgeEvent {
    DeviceAttached(PhysicalDeviceRef),
    DeviceRemoved(PhysicalDeviceRef),
    SessionStarted {
        device_id: String,
        serial: u64,
    },
    /// Sent exactly once per session when its worker exits. `clean_end` is
    /// set when the exit was requested through `stop()`.
    SessionEnded {
        device_id: String,
        serial: u64,
        clean_end: bool,
    },
    Shutdown,
}
