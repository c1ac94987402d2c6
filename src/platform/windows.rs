use crate::device::{DeviceFilter, OpenMode, PhysicalDeviceRef};
use crate::error::Result;
use crate::hid::imp::HidDevice;
use crate::hidhide::imp::{current_image_path, HidHide};
use crate::platform::{
    DeviceEnumerator, DeviceHider, DeviceTransport, HidHandle, VirtualController,
    VirtualControllerBus,
};
use crate::setupdi::imp::enumerate_hid_interfaces;
use crate::vigem::imp::{connect_bus, ViGEmController};
use std::sync::Arc;

/// Windows backend: SetupAPI + raw HID + HidHide + ViGEmBus.
pub struct WindowsPlatform {
    bus: Arc<vigem_client::Client>,
}

impl WindowsPlatform {
    /// Fails when ViGEmBus is not installed.
    pub fn new() -> Result<Self> {
        let bus = connect_bus()?;
        log::info!("Connected to ViGEmBus");
        Ok(Self { bus })
    }
}

impl DeviceEnumerator for WindowsPlatform {
    fn enumerate(&self, filter: &DeviceFilter) -> Result<Vec<PhysicalDeviceRef>> {
        enumerate_hid_interfaces(filter)
    }
}

impl DeviceTransport for WindowsPlatform {
    fn open(&self, device: &PhysicalDeviceRef, mode: OpenMode) -> Result<Arc<dyn HidHandle>> {
        Ok(Arc::new(HidDevice::open(&device.path, mode)?))
    }
}

impl VirtualControllerBus for WindowsPlatform {
    fn create_controller(&self) -> Result<Box<dyn VirtualController>> {
        Ok(Box::new(ViGEmController::new(self.bus.clone())))
    }
}

impl DeviceHider for WindowsPlatform {
    fn set_hidden(&self, instance_id: &str, hidden: bool) -> Result<()> {
        HidHide::open()?.set_hidden(instance_id, hidden)?;
        log::info!(
            "{} {}",
            if hidden { "Hiding" } else { "Unhiding" },
            instance_id
        );
        Ok(())
    }

    fn whitelist_self(&self) -> Result<()> {
        let image = current_image_path()?;
        HidHide::open()?.whitelist(&image)?;
        log::info!("Whitelisted {}", image);
        Ok(())
    }

    fn set_active(&self, active: bool) -> Result<()> {
        HidHide::open()?.set_active(active)
    }
}
