use crate::device::{
    ControllerState, DeviceFilter, FeedbackCommand, OpenMode, PhysicalDeviceRef, ReadOutcome,
};
use crate::error::Result;
use std::sync::Arc;
use std::time::Duration;

/// List the physical pads currently present.
pub trait DeviceEnumerator: Send + Sync {
    fn enumerate(&self, filter: &DeviceFilter) -> Result<Vec<PhysicalDeviceRef>>;
}

/// An open physical device. Reads happen on the session thread while
/// feature writes may come from the feedback and timer threads.
pub trait HidHandle: Send + Sync {
    fn read_report(&self, timeout: Duration) -> ReadOutcome;
    fn write_feature(&self, data: &[u8]) -> Result<()>;
    /// Release the OS handle. Further reads fail, further writes error.
    fn close(&self);
}

pub trait DeviceTransport: Send + Sync {
    fn open(&self, device: &PhysicalDeviceRef, mode: OpenMode) -> Result<Arc<dyn HidHandle>>;
}

/// Invoked on the bus notification thread for every rumble/LED update.
pub type FeedbackHandler = Box<dyn Fn(FeedbackCommand) + Send + Sync + 'static>;

/// One virtual Xbox 360 pad.
pub trait VirtualController: Send {
    /// Plug the pad into the bus. Returns `BridgeError::AlreadyConnected`
    /// when the bus still holds a previous plug-in of this target.
    fn connect(&mut self) -> Result<()>;
    fn disconnect(&mut self) -> Result<()>;
    fn submit(&mut self, state: &ControllerState) -> Result<()>;
    fn on_feedback(&mut self, handler: FeedbackHandler) -> Result<()>;
}

/// The shared bus client virtual controllers are created from.
pub trait VirtualControllerBus: Send + Sync {
    fn create_controller(&self) -> Result<Box<dyn VirtualController>>;
}

/// Hide/unhide physical devices from other applications (HidHide on Windows).
pub trait DeviceHider: Send + Sync {
    fn set_hidden(&self, instance_id: &str, hidden: bool) -> Result<()>;
    fn whitelist_self(&self) -> Result<()>;
    fn set_active(&self, active: bool) -> Result<()>;
}

/// Combined trait for full platform support.
pub trait PlatformServices:
    DeviceEnumerator + DeviceTransport + VirtualControllerBus + DeviceHider
{
}

// Blanket impl: anything implementing all four sub-traits is a PlatformServices.
impl<T: DeviceEnumerator + DeviceTransport + VirtualControllerBus + DeviceHider> PlatformServices
    for T
{
}

#[cfg(target_os = "windows")]
mod windows;

/// Create the platform-appropriate service provider.
pub fn create_platform() -> Result<Arc<dyn PlatformServices>> {
    #[cfg(target_os = "windows")]
    {
        Ok(Arc::new(windows::WindowsPlatform::new()?))
    }
    #[cfg(not(target_os = "windows"))]
    {
        Err(crate::error::BridgeError::PlatformNotSupported(
            std::env::consts::OS.into(),
        ))
    }
}
