/// HID interface enumeration through SetupAPI (Windows-only).
///
/// Walks every present device interface of the HID class and keeps the ones
/// whose interface path matches the configured filter. For each match we
/// also read the owning device's instance id (what HidHide hides by) and
/// its description.

#[cfg(target_os = "windows")]
pub mod imp {
    use crate::device::{DeviceFilter, PhysicalDeviceRef};
    use crate::error::{BridgeError, Result};
    use windows::core::{GUID, PCWSTR};
    use windows::Win32::Devices::DeviceAndDriverInstallation::{
        SetupDiDestroyDeviceInfoList, SetupDiEnumDeviceInterfaces, SetupDiGetClassDevsW,
        SetupDiGetDeviceInstanceIdW, SetupDiGetDeviceInterfaceDetailW,
        SetupDiGetDeviceRegistryPropertyW, DIGCF_DEVICEINTERFACE, DIGCF_PRESENT, HDEVINFO,
        SPDRP_DEVICEDESC, SP_DEVICE_INTERFACE_DATA, SP_DEVICE_INTERFACE_DETAIL_DATA_W,
        SP_DEVINFO_DATA,
    };
    use windows::Win32::Devices::HumanInterfaceDevice::HidD_GetHidGuid;

    /// Present HID interfaces whose path matches `filter`.
    pub fn enumerate_hid_interfaces(filter: &DeviceFilter) -> Result<Vec<PhysicalDeviceRef>> {
        unsafe {
            let hid_guid = HidD_GetHidGuid();
            let dev_info = SetupDiGetClassDevsW(
                Some(&hid_guid),
                PCWSTR::null(),
                None,
                DIGCF_PRESENT | DIGCF_DEVICEINTERFACE,
            )
            .map_err(|e| BridgeError::Enumeration(format!("SetupDiGetClassDevsW failed: {}", e)))?;

            let devices = collect_interfaces(dev_info, &hid_guid, filter);
            let _ = SetupDiDestroyDeviceInfoList(dev_info);
            Ok(devices)
        }
    }

    unsafe fn collect_interfaces(
        dev_info: HDEVINFO,
        hid_guid: &GUID,
        filter: &DeviceFilter,
    ) -> Vec<PhysicalDeviceRef> {
        let mut devices = Vec::new();
        let mut index: u32 = 0;

        loop {
            let mut interface = SP_DEVICE_INTERFACE_DATA {
                cbSize: std::mem::size_of::<SP_DEVICE_INTERFACE_DATA>() as u32,
                ..Default::default()
            };
            if SetupDiEnumDeviceInterfaces(dev_info, None, hid_guid, index, &mut interface).is_err()
            {
                break;
            }
            index += 1;

            let mut dev_info_data = SP_DEVINFO_DATA {
                cbSize: std::mem::size_of::<SP_DEVINFO_DATA>() as u32,
                ..Default::default()
            };
            let Some(path) = interface_path(dev_info, &interface, &mut dev_info_data) else {
                continue;
            };
            if !filter.matches(&path) {
                continue;
            }

            let instance_id = instance_id(dev_info, &dev_info_data).unwrap_or_default();
            let description = device_description(dev_info, &dev_info_data)
                .unwrap_or_else(|| "HID gamepad".to_string());
            devices.push(PhysicalDeviceRef::new(path, description, instance_id));
        }

        devices
    }

    unsafe fn interface_path(
        dev_info: HDEVINFO,
        interface: &SP_DEVICE_INTERFACE_DATA,
        dev_info_data: &mut SP_DEVINFO_DATA,
    ) -> Option<String> {
        // First call only reports the size.
        let mut required: u32 = 0;
        let _ = SetupDiGetDeviceInterfaceDetailW(
            dev_info,
            interface,
            None,
            0,
            Some(&mut required),
            None,
        );
        if required == 0 {
            return None;
        }

        // u64 storage keeps the detail struct aligned.
        let mut storage = vec![0u64; (required as usize).div_ceil(8)];
        let detail = storage.as_mut_ptr() as *mut SP_DEVICE_INTERFACE_DETAIL_DATA_W;
        (*detail).cbSize = std::mem::size_of::<SP_DEVICE_INTERFACE_DETAIL_DATA_W>() as u32;

        SetupDiGetDeviceInterfaceDetailW(
            dev_info,
            interface,
            Some(detail),
            required,
            None,
            Some(dev_info_data),
        )
        .ok()?;

        let path_ptr = std::ptr::addr_of!((*detail).DevicePath) as *const u16;
        let offset = path_ptr as usize - storage.as_ptr() as usize;
        let max_chars = (required as usize).saturating_sub(offset) / 2;
        let chars = std::slice::from_raw_parts(path_ptr, max_chars);
        Some(wide_to_string(chars))
    }

    unsafe fn instance_id(dev_info: HDEVINFO, dev_info_data: &SP_DEVINFO_DATA) -> Option<String> {
        let mut buffer = vec![0u16; 512];
        let mut required: u32 = 0;
        SetupDiGetDeviceInstanceIdW(
            dev_info,
            dev_info_data,
            Some(buffer.as_mut_slice()),
            Some(&mut required),
        )
        .ok()?;
        Some(wide_to_string(&buffer))
    }

    unsafe fn device_description(
        dev_info: HDEVINFO,
        dev_info_data: &SP_DEVINFO_DATA,
    ) -> Option<String> {
        let mut buffer = vec![0u8; 512];
        SetupDiGetDeviceRegistryPropertyW(
            dev_info,
            dev_info_data,
            SPDRP_DEVICEDESC,
            None,
            Some(buffer.as_mut_slice()),
            None,
        )
        .ok()?;

        let wide: Vec<u16> = buffer
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        let description = wide_to_string(&wide);
        (!description.is_empty()).then_some(description)
    }

    fn wide_to_string(chars: &[u16]) -> String {
        let end = chars.iter().position(|&c| c == 0).unwrap_or(chars.len());
        String::from_utf16_lossy(&chars[..end])
    }
}
