//! Raw HID device access (Windows-only).
//!
//! Opens a HID interface path with `CreateFileW`, reads input reports with
//! overlapped I/O so every read honours a timeout, and writes feature
//! reports with `HidD_SetFeature`.

use crate::device::ReadOutcome;

/// Turn a completed read of `read` bytes into an outcome, dropping the
/// leading report id byte.
#[cfg_attr(not(target_os = "windows"), allow(dead_code))]
fn finish_read(mut buffer: Vec<u8>, read: usize) -> ReadOutcome {
    buffer.truncate(read);
    if buffer.is_empty() {
        return ReadOutcome::Failed("empty read".into());
    }
    buffer.remove(0);
    ReadOutcome::Report(buffer)
}

#[cfg(target_os = "windows")]
pub mod imp {
    use super::finish_read;
    use crate::device::{OpenMode, ReadOutcome};
    use crate::error::{BridgeError, Result};
    use crate::platform::HidHandle;
    use crate::report::INPUT_REPORT_LEN;
    use parking_lot::RwLock;
    use std::time::Duration;
    use windows::core::PCWSTR;
    use windows::Win32::Devices::HumanInterfaceDevice::{
        HidD_FreePreparsedData, HidD_GetPreparsedData, HidD_SetFeature, HidP_GetCaps, HIDP_CAPS,
        HIDP_STATUS_SUCCESS, PHIDP_PREPARSED_DATA,
    };
    use windows::Win32::Foundation::{
        CloseHandle, ERROR_IO_PENDING, HANDLE, WAIT_OBJECT_0, WAIT_TIMEOUT,
    };
    use windows::Win32::Storage::FileSystem::{
        CreateFileW, ReadFile, FILE_FLAG_OVERLAPPED, FILE_SHARE_MODE, FILE_SHARE_READ,
        FILE_SHARE_WRITE, OPEN_EXISTING,
    };
    use windows::Win32::System::Threading::{CreateEventW, ResetEvent, WaitForSingleObject};
    use windows::Win32::System::IO::{CancelIoEx, GetOverlappedResult, OVERLAPPED};

    const GENERIC_READ_WRITE: u32 = 0x8000_0000 | 0x4000_0000;

    /// `HANDLE` wraps a raw pointer; keep the integer so the device can be
    /// shared between the read, feedback and timer threads.
    #[derive(Clone, Copy)]
    struct RawHandle(isize);

    impl RawHandle {
        fn get(self) -> HANDLE {
            HANDLE(self.0 as *mut _)
        }
    }

    pub struct HidDevice {
        path: String,
        handle: RwLock<Option<RawHandle>>,
        read_event: RawHandle,
        /// Input report length including the report id byte.
        input_len: usize,
    }

    impl HidDevice {
        pub fn open(path: &str, mode: OpenMode) -> Result<Self> {
            let wide: Vec<u16> = path.encode_utf16().chain(std::iter::once(0)).collect();
            let share = match mode {
                OpenMode::Exclusive => FILE_SHARE_MODE(0),
                OpenMode::Shared => FILE_SHARE_READ | FILE_SHARE_WRITE,
            };

            let handle = unsafe {
                CreateFileW(
                    PCWSTR(wide.as_ptr()),
                    GENERIC_READ_WRITE,
                    share,
                    None,
                    OPEN_EXISTING,
                    FILE_FLAG_OVERLAPPED,
                    None,
                )
                .map_err(|e| BridgeError::Open(format!("{}: {}", path, e)))?
            };

            let event = match unsafe { CreateEventW(None, true, false, PCWSTR::null()) } {
                Ok(event) => event,
                Err(e) => {
                    unsafe {
                        let _ = CloseHandle(handle);
                    }
                    return Err(BridgeError::Open(format!("CreateEventW failed: {}", e)));
                }
            };

            let input_len = input_report_len(handle).unwrap_or(INPUT_REPORT_LEN + 1);
            log::debug!("{}: input report length {}", path, input_len);

            Ok(Self {
                path: path.to_string(),
                handle: RwLock::new(Some(RawHandle(handle.0 as isize))),
                read_event: RawHandle(event.0 as isize),
                input_len,
            })
        }
    }

    impl HidHandle for HidDevice {
        fn read_report(&self, timeout: Duration) -> ReadOutcome {
            let guard = self.handle.read();
            let Some(handle) = *guard else {
                return ReadOutcome::Failed("device closed".into());
            };
            let handle = handle.get();
            let event = self.read_event.get();

            let mut buffer = vec![0u8; self.input_len];
            let mut overlapped = OVERLAPPED {
                hEvent: event,
                ..Default::default()
            };
            let millis = u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX);

            unsafe {
                let _ = ResetEvent(event);
                let started = ReadFile(
                    handle,
                    Some(buffer.as_mut_slice()),
                    None,
                    Some(&mut overlapped),
                );
                if let Err(e) = started {
                    if e.code() != ERROR_IO_PENDING.to_hresult() {
                        return ReadOutcome::Failed(e.to_string());
                    }
                }

                let waited = WaitForSingleObject(event, millis);
                if waited != WAIT_OBJECT_0 {
                    // The buffer must outlive the request, so wait for the cancel to land.
                    let _ = CancelIoEx(handle, Some(&overlapped));
                    let mut read = 0u32;
                    let completed =
                        GetOverlappedResult(handle, &overlapped, &mut read, true).is_ok();
                    // The read may have finished before the cancel reached it.
                    if completed && read > 0 {
                        return finish_read(buffer, read as usize);
                    }
                    return if waited == WAIT_TIMEOUT {
                        ReadOutcome::TimedOut
                    } else {
                        ReadOutcome::Failed(format!("wait failed ({:?})", waited))
                    };
                }

                let mut read = 0u32;
                if let Err(e) = GetOverlappedResult(handle, &overlapped, &mut read, false) {
                    return ReadOutcome::Failed(e.to_string());
                }
                finish_read(buffer, read as usize)
            }
        }

        fn write_feature(&self, data: &[u8]) -> Result<()> {
            let guard = self.handle.read();
            let Some(handle) = *guard else {
                return Err(BridgeError::Write(format!("{}: device closed", self.path)));
            };

            let ok = unsafe {
                HidD_SetFeature(handle.get(), data.as_ptr() as *const _, data.len() as u32)
            };
            if ok.0 == 0 {
                return Err(BridgeError::Write(format!(
                    "{}: HidD_SetFeature failed: {}",
                    self.path,
                    windows::core::Error::from_win32()
                )));
            }
            Ok(())
        }

        fn close(&self) {
            if let Some(handle) = self.handle.write().take() {
                unsafe {
                    let _ = CloseHandle(handle.get());
                }
                log::debug!("Closed {}", self.path);
            }
        }
    }

    impl Drop for HidDevice {
        fn drop(&mut self) {
            self.close();
            unsafe {
                let _ = CloseHandle(self.read_event.get());
            }
        }
    }

    fn input_report_len(handle: HANDLE) -> Option<usize> {
        unsafe {
            let mut preparsed = PHIDP_PREPARSED_DATA::default();
            if HidD_GetPreparsedData(handle, &mut preparsed).0 == 0 {
                return None;
            }
            let mut caps = HIDP_CAPS::default();
            let status = HidP_GetCaps(preparsed, &mut caps);
            let _ = HidD_FreePreparsedData(preparsed);
            (status == HIDP_STATUS_SUCCESS && caps.InputReportByteLength > 0)
                .then_some(caps.InputReportByteLength as usize)
        }
    }
}
