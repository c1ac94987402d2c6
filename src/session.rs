use crate::config::SessionTimings;
use crate::device::{
    ControllerState, FeedbackCommand, OpenMode, PhysicalDeviceRef, ReadOutcome, LED_UNASSIGNED,
};
use crate::error::{BridgeError, Result};
use crate::event::BridgeEvent;
use crate::platform::{HidHandle, PlatformServices, VirtualController};
use crate::report::{self, INPUT_REPORT_LEN, VIBRATION_OFF};
use crate::timer::OneShotTimer;
use crossbeam::channel::Sender;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Opening,
    ExclusiveActive,
    SharedActive,
    Closing,
    Ended,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    pub state: SessionState,
    /// Whether the device was opened without sharing.
    pub is_exclusive: bool,
    /// Player index assigned by the bus, `LED_UNASSIGNED` until known.
    pub led_index: u8,
    pub battery: Option<u8>,
}

impl SessionStatus {
    pub fn is_active(&self) -> bool {
        matches!(
            self.state,
            SessionState::ExclusiveActive | SessionState::SharedActive
        )
    }
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self {
            state: SessionState::Created,
            is_exclusive: false,
            led_index: LED_UNASSIGNED,
            battery: None,
        }
    }
}

/// Bridges one physical pad to one virtual controller.
///
/// Runs on a dedicated `std::thread`: open the pad, plug in the virtual
/// controller, then read/translate/submit until cancelled or the pad fails.
/// Lifecycle changes are posted to the control loop as [`BridgeEvent`]s.
pub struct DeviceSession {
    serial: u64,
    device: PhysicalDeviceRef,
    platform: Arc<dyn PlatformServices>,
    timings: SessionTimings,
    events: Sender<BridgeEvent>,
    status: Arc<Mutex<SessionStatus>>,
    cancel: Arc<AtomicBool>,
    thread_handle: Option<std::thread::JoinHandle<()>>,
}

impl DeviceSession {
    pub fn new(
        serial: u64,
        device: PhysicalDeviceRef,
        platform: Arc<dyn PlatformServices>,
        timings: SessionTimings,
        events: Sender<BridgeEvent>,
    ) -> Self {
        Self {
            serial,
            device,
            platform,
            timings,
            events,
            status: Arc::new(Mutex::new(SessionStatus::default())),
            cancel: Arc::new(AtomicBool::new(false)),
            thread_handle: None,
        }
    }

    pub fn serial(&self) -> u64 {
        self.serial
    }

    pub fn device(&self) -> &PhysicalDeviceRef {
        &self.device
    }

    pub fn status(&self) -> SessionStatus {
        self.status.lock().clone()
    }

    pub fn is_active(&self) -> bool {
        self.status.lock().is_active()
    }

    /// Spawn the worker thread. A session can only be started once.
    pub fn start(&mut self) -> Result<()> {
        if self.thread_handle.is_some() || self.status.lock().state != SessionState::Created {
            return Err(BridgeError::Session(format!(
                "session {} already started",
                self.serial
            )));
        }

        let worker = Worker {
            serial: self.serial,
            device: self.device.clone(),
            platform: self.platform.clone(),
            timings: self.timings,
            events: self.events.clone(),
            status: self.status.clone(),
            cancel: self.cancel.clone(),
        };

        let handle = std::thread::Builder::new()
            .name(format!("padbridge-session-{}", self.serial))
            .spawn(move || worker.run())?;

        self.thread_handle = Some(handle);
        Ok(())
    }

    /// Request cancellation and wait for the worker to finish its teardown.
    ///
    /// Blocks for at most one read timeout plus teardown. Must not be called
    /// from the session's own thread.
    pub fn stop(&mut self) {
        self.cancel.store(true, Ordering::SeqCst);
        self.join();
    }

    /// Join a worker that already ended on its own, without flagging the
    /// exit as requested.
    pub fn reap(&mut self) {
        self.join();
    }

    fn join(&mut self) {
        let Some(handle) = self.thread_handle.take() else {
            return;
        };
        if handle.thread().id() == std::thread::current().id() {
            log::error!(
                "Session {} asked to join itself, leaving the thread detached",
                self.serial
            );
            return;
        }
        if handle.join().is_err() {
            log::error!("Worker thread for {} panicked", self.device);
        }
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        self.stop();
    }
}

// ---------------------------------------------------------------------------
// Worker thread
// ---------------------------------------------------------------------------

struct Worker {
    serial: u64,
    device: PhysicalDeviceRef,
    platform: Arc<dyn PlatformServices>,
    timings: SessionTimings,
    events: Sender<BridgeEvent>,
    status: Arc<Mutex<SessionStatus>>,
    cancel: Arc<AtomicBool>,
}

/// Posts `SessionEnded` when dropped, so every exit path (including a
/// panic unwinding through `run`) reports exactly once.
struct EndNotice<'a> {
    worker: &'a Worker,
}

impl Drop for EndNotice<'_> {
    fn drop(&mut self) {
        let worker = self.worker;
        worker.set_state(SessionState::Ended);
        let clean_end = worker.cancel.load(Ordering::SeqCst);
        let _ = worker.events.send(BridgeEvent::SessionEnded {
            device_id: worker.device.id.clone(),
            serial: worker.serial,
            clean_end,
        });
        log::info!("Exiting worker thread for {}", worker.device);
    }
}

impl Worker {
    fn run(self) {
        let _notice = EndNotice { worker: &self };
        log::info!("Starting worker thread for {}", self.device);

        self.set_state(SessionState::Opening);
        let Some((handle, mode)) = self.open_device() else {
            return;
        };

        // Put the rumble motors into a known state.
        if let Err(e) = handle.write_feature(&VIBRATION_OFF) {
            log::warn!("Device {}: failed to reset vibration: {}", self.device, e);
        }

        let pipeline = match self.connect_controller(&handle) {
            Ok(pipeline) => pipeline,
            Err(e) => {
                log::error!("Device {}: virtual controller unavailable: {}", self.device, e);
                self.set_state(SessionState::Closing);
                handle.close();
                return;
            }
        };

        self.set_state(match mode {
            OpenMode::Exclusive => SessionState::ExclusiveActive,
            OpenMode::Shared => SessionState::SharedActive,
        });
        let _ = self.events.send(BridgeEvent::SessionStarted {
            device_id: self.device.id.clone(),
            serial: self.serial,
        });

        self.read_loop(handle.as_ref(), &pipeline);

        self.set_state(SessionState::Closing);
        pipeline.shutdown();
        handle.close();
    }

    fn set_state(&self, state: SessionState) {
        self.status.lock().state = state;
    }

    /// Exclusive first, then shared read/write. `None` when both fail.
    fn open_device(&self) -> Option<(Arc<dyn HidHandle>, OpenMode)> {
        for mode in [OpenMode::Exclusive, OpenMode::Shared] {
            match self.platform.open(&self.device, mode) {
                Ok(handle) => {
                    log::info!("Opened {} in {:?} mode", self.device, mode);
                    self.status.lock().is_exclusive = mode == OpenMode::Exclusive;
                    return Some((handle, mode));
                }
                Err(e) => log::warn!("Opening {} in {:?} mode failed: {}", self.device, mode, e),
            }
        }
        log::error!("Unable to open {}, giving up", self.device);
        None
    }

    fn connect_controller(&self, handle: &Arc<dyn HidHandle>) -> Result<Pipeline> {
        let mut controller = self.platform.create_controller()?;

        let reset_handle = handle.clone();
        let reset_device = self.device.id.clone();
        let vibration_timer = Arc::new(OneShotTimer::new("vibration", move || {
            log::debug!("Device {}: no rumble update, stopping motors", reset_device);
            if let Err(e) = reset_handle.write_feature(&VIBRATION_OFF) {
                log::warn!("Device {}: vibration reset failed: {}", reset_device, e);
            }
        })?);

        let relay = FeedbackRelay {
            device_id: self.device.id.clone(),
            handle: handle.clone(),
            vibration_timer: vibration_timer.clone(),
            reset_after: self.timings.vibration_reset,
            status: self.status.clone(),
        };
        controller.on_feedback(Box::new(move |feedback| relay.apply(feedback)))?;

        match controller.connect() {
            Ok(()) => {}
            Err(BridgeError::AlreadyConnected) => {
                log::warn!(
                    "Device {}: virtual controller already connected, replugging",
                    self.device
                );
                if let Err(e) = controller.disconnect() {
                    log::debug!("Disconnect before replug failed: {}", e);
                }
                controller.connect()?;
            }
            Err(e) => return Err(e),
        }

        let output = Arc::new(Mutex::new(Output {
            controller,
            state: ControllerState::default(),
            guide_release_at: None,
        }));

        let timer_output = Arc::downgrade(&output);
        let guide_timer = OneShotTimer::new("guide", move || {
            if let Some(output) = timer_output.upgrade() {
                output.lock().release_guide();
            }
        });
        let guide_timer = match guide_timer {
            Ok(timer) => timer,
            Err(e) => {
                let _ = output.lock().controller.disconnect();
                return Err(e);
            }
        };

        Ok(Pipeline {
            output,
            guide_timer,
            guide_release: self.timings.guide_release,
            vibration_timer,
            status: self.status.clone(),
        })
    }

    fn read_loop(&self, handle: &dyn HidHandle, pipeline: &Pipeline) {
        while !self.cancel.load(Ordering::SeqCst) {
            let data = match handle.read_report(self.timings.read_timeout) {
                ReadOutcome::Report(data) => data,
                ReadOutcome::TimedOut => continue,
                ReadOutcome::Failed(reason) => {
                    log::warn!(
                        "Device {}: error while reading HID report, {}",
                        self.device,
                        reason
                    );
                    break;
                }
            };

            let Some(raw) = data
                .get(..INPUT_REPORT_LEN)
                .and_then(|bytes| <&[u8; INPUT_REPORT_LEN]>::try_from(bytes).ok())
            else {
                log::debug!(
                    "Device {}: ignoring short report ({} bytes)",
                    self.device,
                    data.len()
                );
                continue;
            };

            let state = report::decode(raw);
            log::trace!("Device {}: {:?}", self.device, state);
            pipeline.push(state);
        }
    }
}

// ---------------------------------------------------------------------------
// Output side
// ---------------------------------------------------------------------------

/// The virtual controller plus the last state sent to it. Everything that
/// submits (read loop, guide release) goes through this one lock.
struct Output {
    controller: Box<dyn VirtualController>,
    state: ControllerState,
    guide_release_at: Option<Instant>,
}

impl Output {
    fn submit(&mut self) {
        if let Err(e) = self.controller.submit(&self.state) {
            log::debug!("Submitting report failed: {}", e);
        }
    }

    fn release_guide(&mut self) {
        match self.guide_release_at {
            // Re-armed by a newer pulse; that timer will release it.
            Some(at) if Instant::now() < at => {}
            Some(_) => {
                self.guide_release_at = None;
                self.state.set_guide(false);
                self.submit();
            }
            None => {}
        }
    }
}

struct Pipeline {
    output: Arc<Mutex<Output>>,
    guide_timer: OneShotTimer,
    guide_release: Duration,
    vibration_timer: Arc<OneShotTimer>,
    status: Arc<Mutex<SessionStatus>>,
}

impl Pipeline {
    fn push(&self, mut state: ControllerState) {
        let battery = state.battery;
        {
            let mut output = self.output.lock();
            if state.guide() {
                output.guide_release_at = Some(Instant::now() + self.guide_release);
                self.guide_timer.schedule(self.guide_release);
            }
            state.set_guide(output.guide_release_at.is_some());
            output.state = state;
            output.submit();
        }

        self.status.lock().battery = battery;
    }

    fn shutdown(self) {
        let Pipeline {
            output,
            guide_timer,
            vibration_timer,
            ..
        } = self;

        drop(guide_timer);
        if let Err(e) = output.lock().controller.disconnect() {
            log::debug!("Disconnecting virtual controller failed: {}", e);
        }
        vibration_timer.cancel();
    }
}

/// Forwards rumble from the virtual controller to the pad and keeps the
/// auto-stop timer in step with it.
struct FeedbackRelay {
    device_id: String,
    handle: Arc<dyn HidHandle>,
    vibration_timer: Arc<OneShotTimer>,
    reset_after: Duration,
    status: Arc<Mutex<SessionStatus>>,
}

impl FeedbackRelay {
    fn apply(&self, feedback: FeedbackCommand) {
        if let Err(e) = self.handle.write_feature(&report::encode(&feedback)) {
            log::warn!("Device {}: rumble write failed: {}", self.device_id, e);
        }

        if feedback.is_idle() {
            self.vibration_timer.cancel();
        } else {
            self.vibration_timer.schedule(self.reset_after);
        }

        let mut status = self.status.lock();
        if status.led_index != feedback.led_index {
            log::info!(
                "Device {}: player index {}",
                self.device_id,
                feedback.led_index
            );
            status.led_index = feedback.led_index;
        }
    }
}
