//! In-memory stand-ins for the OS collaborators.
#![allow(dead_code)]

use padbridge_lib::config::SessionTimings;
use padbridge_lib::device::{
    ControllerState, DeviceFilter, FeedbackCommand, OpenMode, PhysicalDeviceRef, ReadOutcome,
};
use padbridge_lib::error::{BridgeError, Result};
use padbridge_lib::platform::{
    DeviceEnumerator, DeviceHider, DeviceTransport, FeedbackHandler, HidHandle,
    VirtualController, VirtualControllerBus,
};
use padbridge_lib::report::INPUT_REPORT_LEN;
use padbridge_lib::status::{PlayerStatus, StatusSink};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub fn pad(name: &str) -> PhysicalDeviceRef {
    PhysicalDeviceRef::new(
        format!(r"\\?\HID#{{00001124-0000-1000-8000-00805f9b34fb}}_VID&00022717_PID&3144#{}", name),
        format!("Pad {}", name),
        format!(r"HID\VID&00022717_PID&3144\{}", name.to_uppercase()),
    )
}

pub fn fast_timings() -> SessionTimings {
    SessionTimings {
        read_timeout: Duration::from_millis(20),
        guide_release: Duration::from_millis(60),
        vibration_reset: Duration::from_millis(60),
    }
}

/// Neutral input report with the given battery level.
pub fn neutral_report(battery: u8) -> Vec<u8> {
    let mut raw = vec![0u8; INPUT_REPORT_LEN];
    raw[3] = 0x0F;
    raw[4..8].copy_from_slice(&[0x80; 4]);
    raw[18] = battery;
    raw
}

pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

// ---------------------------------------------------------------------------
// HID handle
// ---------------------------------------------------------------------------

pub struct FakeHandle {
    pub device_id: String,
    pub mode: OpenMode,
    reads: Mutex<VecDeque<ReadOutcome>>,
    pub writes: Mutex<Vec<Vec<u8>>>,
    pub closes: AtomicUsize,
    closed: AtomicBool,
}

impl FakeHandle {
    fn new(device_id: &str, mode: OpenMode) -> Self {
        Self {
            device_id: device_id.to_string(),
            mode,
            reads: Mutex::new(VecDeque::new()),
            writes: Mutex::new(Vec::new()),
            closes: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    pub fn push_read(&self, outcome: ReadOutcome) {
        self.reads.lock().push_back(outcome);
    }

    pub fn push_report(&self, data: Vec<u8>) {
        self.push_read(ReadOutcome::Report(data));
    }

    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.writes.lock().clone()
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

impl HidHandle for FakeHandle {
    fn read_report(&self, timeout: Duration) -> ReadOutcome {
        if self.closed.load(Ordering::SeqCst) {
            return ReadOutcome::Failed("closed".into());
        }
        if let Some(outcome) = self.reads.lock().pop_front() {
            return outcome;
        }
        std::thread::sleep(timeout);
        ReadOutcome::TimedOut
    }

    fn write_feature(&self, data: &[u8]) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BridgeError::Write("closed".into()));
        }
        self.writes.lock().push(data.to_vec());
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Virtual controller
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct ControllerLog {
    pub connects: AtomicUsize,
    pub disconnects: AtomicUsize,
    pub submitted: Mutex<Vec<ControllerState>>,
    feedback: Mutex<Option<Arc<FeedbackHandler>>>,
}

impl ControllerLog {
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn disconnect_count(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    pub fn submitted(&self) -> Vec<ControllerState> {
        self.submitted.lock().clone()
    }

    /// Deliver a rumble/LED update as the bus would.
    pub fn send_feedback(&self, weak_motor: u8, strong_motor: u8, led_index: u8) {
        let handler = self.feedback.lock().clone();
        if let Some(handler) = handler {
            handler(FeedbackCommand {
                weak_motor,
                strong_motor,
                led_index,
            });
        }
    }
}

struct FakeController {
    log: Arc<ControllerLog>,
    reject_first_connect: bool,
    plugged: bool,
}

impl VirtualController for FakeController {
    fn connect(&mut self) -> Result<()> {
        self.log.connects.fetch_add(1, Ordering::SeqCst);
        if std::mem::take(&mut self.reject_first_connect) {
            return Err(BridgeError::AlreadyConnected);
        }
        self.plugged = true;
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        self.log.disconnects.fetch_add(1, Ordering::SeqCst);
        self.plugged = false;
        Ok(())
    }

    fn submit(&mut self, state: &ControllerState) -> Result<()> {
        if !self.plugged {
            return Err(BridgeError::ViGEm("not plugged in".into()));
        }
        self.log.submitted.lock().push(*state);
        Ok(())
    }

    fn on_feedback(&mut self, handler: FeedbackHandler) -> Result<()> {
        *self.log.feedback.lock() = Some(Arc::new(handler));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Platform
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakePlatform {
    pub present: Mutex<Vec<PhysicalDeviceRef>>,
    pub enumeration_fails: AtomicBool,
    pub exclusive_fails: AtomicBool,
    pub shared_fails: AtomicBool,
    pub already_connected: AtomicBool,
    pub handles: Mutex<Vec<Arc<FakeHandle>>>,
    pub controllers: Mutex<Vec<Arc<ControllerLog>>>,
    pub hide_calls: Mutex<Vec<(String, bool)>>,
    pub whitelisted: AtomicBool,
}

impl FakePlatform {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_present(&self, devices: Vec<PhysicalDeviceRef>) {
        *self.present.lock() = devices;
    }

    pub fn handle_count(&self) -> usize {
        self.handles.lock().len()
    }

    pub fn last_handle(&self) -> Option<Arc<FakeHandle>> {
        self.handles.lock().last().cloned()
    }

    pub fn last_controller(&self) -> Option<Arc<ControllerLog>> {
        self.controllers.lock().last().cloned()
    }

    pub fn hide_calls(&self) -> Vec<(String, bool)> {
        self.hide_calls.lock().clone()
    }

    pub fn wait_for_handle(&self, count: usize) -> Arc<FakeHandle> {
        assert!(
            wait_until(Duration::from_secs(2), || self.handle_count() >= count),
            "device was never opened"
        );
        self.handles.lock()[count - 1].clone()
    }
}

impl DeviceEnumerator for FakePlatform {
    fn enumerate(&self, filter: &DeviceFilter) -> Result<Vec<PhysicalDeviceRef>> {
        if self.enumeration_fails.load(Ordering::SeqCst) {
            return Err(BridgeError::Enumeration("scripted failure".into()));
        }
        Ok(self
            .present
            .lock()
            .iter()
            .filter(|device| filter.matches(&device.path))
            .cloned()
            .collect())
    }
}

impl DeviceTransport for FakePlatform {
    fn open(&self, device: &PhysicalDeviceRef, mode: OpenMode) -> Result<Arc<dyn HidHandle>> {
        let fails = match mode {
            OpenMode::Exclusive => &self.exclusive_fails,
            OpenMode::Shared => &self.shared_fails,
        };
        if fails.load(Ordering::SeqCst) {
            return Err(BridgeError::Open(format!("{:?} refused", mode)));
        }
        let handle = Arc::new(FakeHandle::new(&device.id, mode));
        self.handles.lock().push(handle.clone());
        Ok(handle)
    }
}

impl VirtualControllerBus for FakePlatform {
    fn create_controller(&self) -> Result<Box<dyn VirtualController>> {
        let log = Arc::new(ControllerLog::default());
        self.controllers.lock().push(log.clone());
        Ok(Box::new(FakeController {
            log,
            reject_first_connect: self.already_connected.load(Ordering::SeqCst),
            plugged: false,
        }))
    }
}

impl DeviceHider for FakePlatform {
    fn set_hidden(&self, instance_id: &str, hidden: bool) -> Result<()> {
        self.hide_calls.lock().push((instance_id.to_string(), hidden));
        Ok(())
    }

    fn whitelist_self(&self) -> Result<()> {
        self.whitelisted.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn set_active(&self, _active: bool) -> Result<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Status sink
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingSink {
    pub attached: Mutex<Vec<String>>,
    pub removed: Mutex<Vec<String>>,
    pub players: Mutex<Vec<PlayerStatus>>,
}

impl StatusSink for RecordingSink {
    fn device_attached(&self, device: &PhysicalDeviceRef) {
        self.attached.lock().push(device.id.clone());
    }

    fn device_removed(&self, device: &PhysicalDeviceRef) {
        self.removed.lock().push(device.id.clone());
    }

    fn players_changed(&self, players: &PlayerStatus) {
        self.players.lock().push(players.clone());
    }

    fn fatal(&self, _message: &str) {}
}
