use crate::config::SessionTimings;
use crate::device::{PhysicalDeviceRef, LED_UNASSIGNED};
use crate::event::BridgeEvent;
use crate::monitor::PresenceMonitor;
use crate::platform::{DeviceEnumerator, PlatformServices};
use crate::session::DeviceSession;
use crate::status::{PlayerStatus, StatusSink};
use crossbeam::channel::{Receiver, RecvTimeoutError, Sender};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Owns one [`DeviceSession`] per attached pad.
///
/// Lives on the control thread; sessions report back through the event
/// channel and never touch the map themselves.
pub struct BridgeManager {
    platform: Arc<dyn PlatformServices>,
    sink: Arc<dyn StatusSink>,
    events: Sender<BridgeEvent>,
    timings: SessionTimings,
    hide_devices: bool,
    sessions: HashMap<String, DeviceSession>,
    next_serial: u64,
}

impl BridgeManager {
    pub fn new(
        platform: Arc<dyn PlatformServices>,
        sink: Arc<dyn StatusSink>,
        events: Sender<BridgeEvent>,
        timings: SessionTimings,
        hide_devices: bool,
    ) -> Self {
        Self {
            platform,
            sink,
            events,
            timings,
            hide_devices,
            sessions: HashMap::new(),
            next_serial: 0,
        }
    }

    pub fn contains(&self, device_id: &str) -> bool {
        self.sessions.contains_key(device_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Start bridging `device`. Returns `false` if it is already bridged or
    /// its worker could not be spawned.
    pub fn add_and_start(&mut self, device: PhysicalDeviceRef) -> bool {
        if self.contains(&device.id) {
            log::debug!("{} is already bridged", device);
            return false;
        }

        self.next_serial += 1;
        let mut session = DeviceSession::new(
            self.next_serial,
            device.clone(),
            self.platform.clone(),
            self.timings,
            self.events.clone(),
        );

        self.set_hidden(&device, true);

        if let Err(e) = session.start() {
            log::error!("Failed to start session for {}: {}", device, e);
            self.set_hidden(&device, false);
            return false;
        }

        self.sink.device_attached(&device);
        self.sessions.insert(device.id.clone(), session);
        true
    }

    /// Stop and drop the session for `device_id`, blocking until its worker
    /// has exited. Returns `false` if there was none.
    pub fn stop_and_remove(&mut self, device_id: &str) -> bool {
        let Some(mut session) = self.sessions.remove(device_id) else {
            return false;
        };
        session.stop();
        self.release(session);
        true
    }

    /// Apply one event from a worker thread. Returns the device whose
    /// session ended on its own, so the caller can schedule a retry.
    pub fn handle_event(&mut self, event: BridgeEvent) -> Option<PhysicalDeviceRef> {
        match event {
            BridgeEvent::DeviceAttached(device) => {
                self.add_and_start(device);
                None
            }
            BridgeEvent::DeviceRemoved(device) => {
                self.stop_and_remove(&device.id);
                None
            }
            BridgeEvent::SessionStarted { device_id, serial } => {
                if let Some(session) = self.current(&device_id, serial) {
                    let status = session.status();
                    log::info!(
                        "Bridging {} ({})",
                        session.device(),
                        if status.is_exclusive { "exclusive" } else { "shared" }
                    );
                }
                None
            }
            BridgeEvent::SessionEnded {
                device_id,
                serial,
                clean_end,
            } => {
                // Requested stops are cleaned up by whoever called stop().
                if clean_end || self.current(&device_id, serial).is_none() {
                    return None;
                }
                let mut session = self.sessions.remove(&device_id)?;
                log::warn!("Session for {} ended unexpectedly", session.device());
                session.reap();
                let device = session.device().clone();
                self.release(session);
                Some(device)
            }
            BridgeEvent::Shutdown => None,
        }
    }

    /// Battery per player index for every active session with a known
    /// player index. Computed on each call.
    pub fn player_status(&self) -> PlayerStatus {
        self.sessions
            .values()
            .map(DeviceSession::status)
            .filter(|status| status.is_active() && status.led_index != LED_UNASSIGNED)
            .map(|status| (status.led_index, status.battery))
            .collect()
    }

    pub fn publish_status(&self) {
        self.sink.players_changed(&self.player_status());
    }

    /// Stop every session and un-hide its device.
    pub fn shutdown(&mut self) {
        let ids: Vec<String> = self.sessions.keys().cloned().collect();
        for id in ids {
            self.stop_and_remove(&id);
        }
    }

    fn current(&self, device_id: &str, serial: u64) -> Option<&DeviceSession> {
        self.sessions
            .get(device_id)
            .filter(|session| session.serial() == serial)
    }

    fn release(&self, session: DeviceSession) {
        let device = session.device().clone();
        drop(session);
        self.set_hidden(&device, false);
        self.sink.device_removed(&device);
    }

    fn set_hidden(&self, device: &PhysicalDeviceRef, hidden: bool) {
        if !self.hide_devices {
            return;
        }
        if let Err(e) = self.platform.set_hidden(&device.instance_id, hidden) {
            log::warn!(
                "Could not {} {}: {}",
                if hidden { "hide" } else { "unhide" },
                device.instance_id,
                e
            );
        }
    }
}

impl Drop for BridgeManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Drive `manager` from `events` until `Shutdown` arrives or every sender
/// is gone, pushing the player status every `status_interval`.
pub fn run_control_loop<E: DeviceEnumerator + ?Sized + 'static>(
    manager: &mut BridgeManager,
    monitor: &PresenceMonitor<E>,
    events: &Receiver<BridgeEvent>,
    status_interval: Duration,
) {
    let mut next_status = Instant::now() + status_interval;
    loop {
        match events.recv_deadline(next_status) {
            Ok(BridgeEvent::Shutdown) => {
                log::info!("Shutdown requested");
                break;
            }
            Ok(event) => {
                if let Some(lost) = manager.handle_event(event) {
                    monitor.forget(&lost.id);
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        if Instant::now() >= next_status {
            manager.publish_status();
            next_status = Instant::now() + status_interval;
        }
    }
}
