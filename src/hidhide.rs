//! HidHide control device wrapper.
//!
//! HidHide keeps two lists: device instance ids to hide (the blacklist) and
//! application images still allowed to see hidden devices (the whitelist).
//! Both travel over IOCTLs as REG_MULTI_SZ style UTF-16LE buffers; images
//! are identified by their `\Device\HarddiskVolumeN\...` path rather than
//! by drive letter.

#![cfg_attr(not(target_os = "windows"), allow(dead_code))]

const IOCTL_GET_WHITELIST: u32 = 0x8001_6000;
const IOCTL_SET_WHITELIST: u32 = 0x8001_6004;
const IOCTL_GET_BLACKLIST: u32 = 0x8001_6008;
const IOCTL_SET_BLACKLIST: u32 = 0x8001_600C;
const IOCTL_SET_ACTIVE: u32 = 0x8001_6014;

const GENERIC_READ: u32 = 0x8000_0000;
const GENERIC_WRITE: u32 = 0x4000_0000;

/// Desired access for the control handle. Every HidHide IOCTL is defined
/// with `FILE_READ_ACCESS`, so a handle opened without read is refused.
const CONTROL_ACCESS: u32 = GENERIC_READ;

/// Whether a handle opened with `desired` may issue IOCTL `code`, judged by
/// the access bits `CTL_CODE` packs into bits 14 and 15.
fn access_covers(desired: u32, code: u32) -> bool {
    const FILE_READ_ACCESS: u32 = 0x1;
    const FILE_WRITE_ACCESS: u32 = 0x2;
    let required = (code >> 14) & 0x3;
    let mut granted = 0;
    if desired & GENERIC_READ != 0 {
        granted |= FILE_READ_ACCESS;
    }
    if desired & GENERIC_WRITE != 0 {
        granted |= FILE_WRITE_ACCESS;
    }
    granted & required == required
}

/// Encode `entries` as NUL-separated, double-NUL-terminated UTF-16LE.
fn to_multi_sz(entries: &[String]) -> Vec<u8> {
    let mut units: Vec<u16> = entries
        .iter()
        .flat_map(|entry| entry.encode_utf16().chain(std::iter::once(0)))
        .collect();
    units.push(0);
    units.into_iter().flat_map(u16::to_le_bytes).collect()
}

/// Inverse of [`to_multi_sz`]. Stops at the first empty entry.
fn from_multi_sz(bytes: &[u8]) -> Vec<String> {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    units
        .split(|&unit| unit == 0)
        .take_while(|entry| !entry.is_empty())
        .map(String::from_utf16_lossy)
        .collect()
}

/// Replace the `C:` prefix of `path` with the NT device it maps to.
fn with_device_prefix(path: &str, drive: &str, device: &str) -> Option<String> {
    let rest = path.get(drive.len()..)?;
    path.get(..drive.len())?
        .eq_ignore_ascii_case(drive)
        .then(|| format!("{}{}", device, rest))
}

#[cfg(target_os = "windows")]
pub mod imp {
    use super::{
        from_multi_sz, to_multi_sz, with_device_prefix, CONTROL_ACCESS, IOCTL_GET_BLACKLIST,
        IOCTL_GET_WHITELIST, IOCTL_SET_ACTIVE, IOCTL_SET_BLACKLIST, IOCTL_SET_WHITELIST,
    };
    use crate::error::{BridgeError, Result};
    use windows::core::PCWSTR;
    use windows::Win32::Foundation::{CloseHandle, HANDLE};
    use windows::Win32::Storage::FileSystem::{
        CreateFileW, QueryDosDeviceW, FILE_ATTRIBUTE_NORMAL, FILE_SHARE_READ, FILE_SHARE_WRITE,
        OPEN_EXISTING,
    };
    use windows::Win32::System::IO::DeviceIoControl;

    const CONTROL_DEVICE: &str = r"\\.\HidHide";

    /// A handle to the control device. The driver only accepts one open
    /// handle at a time, so open one per operation and let it drop.
    pub struct HidHide {
        handle: HANDLE,
    }

    impl Drop for HidHide {
        fn drop(&mut self) {
            unsafe {
                let _ = CloseHandle(self.handle);
            }
        }
    }

    impl HidHide {
        pub fn open() -> Result<Self> {
            let path: Vec<u16> = CONTROL_DEVICE.encode_utf16().chain(std::iter::once(0)).collect();
            let handle = unsafe {
                CreateFileW(
                    PCWSTR(path.as_ptr()),
                    CONTROL_ACCESS,
                    FILE_SHARE_READ | FILE_SHARE_WRITE,
                    None,
                    OPEN_EXISTING,
                    FILE_ATTRIBUTE_NORMAL,
                    None,
                )
                .map_err(|e| BridgeError::HidHide(format!("HidHide is not available: {}", e)))?
            };
            Ok(Self { handle })
        }

        /// Add or remove `instance_id` on the blacklist. Already in the
        /// requested state is not an error.
        pub fn set_hidden(&self, instance_id: &str, hidden: bool) -> Result<()> {
            let mut list = self.read_list(IOCTL_GET_BLACKLIST)?;
            let present = list.iter().any(|entry| entry.eq_ignore_ascii_case(instance_id));
            match (hidden, present) {
                (true, false) => list.push(instance_id.to_string()),
                (false, true) => list.retain(|entry| !entry.eq_ignore_ascii_case(instance_id)),
                _ => return Ok(()),
            }
            self.write_list(IOCTL_SET_BLACKLIST, &list)
        }

        pub fn whitelist(&self, image_path: &str) -> Result<()> {
            let mut list = self.read_list(IOCTL_GET_WHITELIST)?;
            if list.iter().any(|entry| entry.eq_ignore_ascii_case(image_path)) {
                return Ok(());
            }
            list.push(image_path.to_string());
            self.write_list(IOCTL_SET_WHITELIST, &list)
        }

        pub fn set_active(&self, active: bool) -> Result<()> {
            let value = u8::from(active);
            self.ioctl(IOCTL_SET_ACTIVE, Some(std::slice::from_ref(&value)), None)
                .map(|_| ())
        }

        fn read_list(&self, code: u32) -> Result<Vec<String>> {
            // Size query; the driver reports the needed length even on failure.
            let needed = self.ioctl(code, None, None).unwrap_or(0);
            if needed == 0 {
                return Ok(Vec::new());
            }
            let mut buffer = vec![0u8; needed as usize];
            let written = self.ioctl(code, None, Some(&mut buffer))?;
            buffer.truncate(written as usize);
            Ok(from_multi_sz(&buffer))
        }

        fn write_list(&self, code: u32, entries: &[String]) -> Result<()> {
            self.ioctl(code, Some(&to_multi_sz(entries)), None).map(|_| ())
        }

        fn ioctl(&self, code: u32, input: Option<&[u8]>, output: Option<&mut [u8]>) -> Result<u32> {
            let mut returned: u32 = 0;
            let size_query = input.is_none() && output.is_none();
            let (in_ptr, in_len) = match input {
                Some(data) => (Some(data.as_ptr() as *const _), data.len() as u32),
                None => (None, 0),
            };
            let (out_ptr, out_len) = match output {
                Some(data) => (Some(data.as_mut_ptr() as *mut _), data.len() as u32),
                None => (None, 0),
            };
            let result = unsafe {
                DeviceIoControl(
                    self.handle,
                    code,
                    in_ptr,
                    in_len,
                    out_ptr,
                    out_len,
                    Some(&mut returned),
                    None,
                )
            };
            match result {
                Ok(()) => Ok(returned),
                Err(_) if size_query && returned > 0 => Ok(returned),
                Err(e) => Err(BridgeError::HidHide(format!("IOCTL {:#x} failed: {}", code, e))),
            }
        }
    }

    /// Path of the running executable as HidHide expects it on its whitelist.
    pub fn current_image_path() -> Result<String> {
        let exe = std::env::current_exe()?;
        let exe = exe.to_string_lossy();
        let drive = exe
            .get(..2)
            .filter(|prefix| prefix.ends_with(':'))
            .ok_or_else(|| BridgeError::HidHide(format!("{} is not on a drive letter", exe)))?;

        let name: Vec<u16> = drive.encode_utf16().chain(std::iter::once(0)).collect();
        let mut target = vec![0u16; 1024];
        let len =
            unsafe { QueryDosDeviceW(PCWSTR(name.as_ptr()), Some(target.as_mut_slice())) };
        if len == 0 {
            return Err(BridgeError::HidHide(format!(
                "QueryDosDeviceW({}) failed: {}",
                drive,
                windows::core::Error::from_win32()
            )));
        }
        let end = target.iter().position(|&c| c == 0).unwrap_or(target.len());
        let device = String::from_utf16_lossy(&target[..end]);

        with_device_prefix(&exe, drive, &device)
            .ok_or_else(|| BridgeError::HidHide(format!("cannot map {} to a device path", exe)))
    }
}
