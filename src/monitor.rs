use crate::device::{DeviceFilter, PhysicalDeviceRef};
use crate::event::BridgeEvent;
use crate::platform::DeviceEnumerator;
use crossbeam::channel::Sender;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Granularity at which the polling thread notices `stop()`.
const STOP_CHECK_INTERVAL: Duration = Duration::from_millis(100);

/// Attach/detach transitions between two consecutive polls.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PresenceDiff {
    pub attached: Vec<PhysicalDeviceRef>,
    pub detached: Vec<PhysicalDeviceRef>,
}

impl PresenceDiff {
    pub fn is_empty(&self) -> bool {
        self.attached.is_empty() && self.detached.is_empty()
    }
}

/// Devices seen on the last poll, keyed by id.
#[derive(Debug, Default)]
pub struct PresenceTracker {
    seen: BTreeMap<String, PhysicalDeviceRef>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the snapshot with `devices` and return what changed.
    pub fn update(&mut self, devices: Vec<PhysicalDeviceRef>) -> PresenceDiff {
        let current: BTreeMap<String, PhysicalDeviceRef> = devices
            .into_iter()
            .map(|device| (device.id.clone(), device))
            .collect();

        let attached = current
            .iter()
            .filter(|(id, _)| !self.seen.contains_key(*id))
            .map(|(_, device)| device.clone())
            .collect();
        let detached = self
            .seen
            .iter()
            .filter(|(id, _)| !current.contains_key(*id))
            .map(|(_, device)| device.clone())
            .collect();

        self.seen = current;
        PresenceDiff { attached, detached }
    }

    /// Drop `id` from the snapshot so the next poll reports it as attached
    /// again if it is still present.
    pub fn forget(&mut self, id: &str) -> bool {
        self.seen.remove(id).is_some()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.seen.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// Polls the enumerator on its own thread and posts attach/detach events.
///
/// The first poll runs immediately on `start()`, then every `interval`.
pub struct PresenceMonitor<E: DeviceEnumerator + ?Sized + 'static> {
    enumerator: Arc<E>,
    filter: DeviceFilter,
    interval: Duration,
    events: Sender<BridgeEvent>,
    tracker: Arc<Mutex<PresenceTracker>>,
    running: Arc<AtomicBool>,
    thread_handle: Option<std::thread::JoinHandle<()>>,
}

impl<E: DeviceEnumerator + ?Sized + 'static> PresenceMonitor<E> {
    pub fn new(
        enumerator: Arc<E>,
        filter: DeviceFilter,
        interval: Duration,
        events: Sender<BridgeEvent>,
    ) -> Self {
        Self {
            enumerator,
            filter,
            interval,
            events,
            tracker: Arc::new(Mutex::new(PresenceTracker::new())),
            running: Arc::new(AtomicBool::new(false)),
            thread_handle: None,
        }
    }

    pub fn start(&mut self) -> crate::error::Result<()> {
        if self.running.load(Ordering::SeqCst) {
            return Ok(());
        }

        let running = self.running.clone();
        running.store(true, Ordering::SeqCst);

        let poller = Poller {
            enumerator: self.enumerator.clone(),
            filter: self.filter.clone(),
            events: self.events.clone(),
            tracker: self.tracker.clone(),
        };
        let interval = self.interval;

        let spawned = std::thread::Builder::new()
            .name("padbridge-presence-monitor".into())
            .spawn(move || monitor_loop(running, poller, interval));

        match spawned {
            Ok(handle) => {
                self.thread_handle = Some(handle);
                log::info!("Presence monitor started");
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                Err(e.into())
            }
        }
    }

    pub fn stop(&mut self) {
        if !self.running.load(Ordering::SeqCst) {
            return;
        }
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
        log::info!("Presence monitor stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// See [`PresenceTracker::forget`].
    pub fn forget(&self, id: &str) {
        if self.tracker.lock().forget(id) {
            log::debug!("Presence monitor will re-report {} on the next poll", id);
        }
    }
}

impl<E: DeviceEnumerator + ?Sized + 'static> Drop for PresenceMonitor<E> {
    fn drop(&mut self) {
        self.stop();
    }
}

// ---------------------------------------------------------------------------
// Polling loop
// ---------------------------------------------------------------------------

struct Poller<E: ?Sized> {
    enumerator: Arc<E>,
    filter: DeviceFilter,
    events: Sender<BridgeEvent>,
    tracker: Arc<Mutex<PresenceTracker>>,
}

impl<E: DeviceEnumerator + ?Sized> Poller<E> {
    fn poll(&self) {
        let devices = match self.enumerator.enumerate(&self.filter) {
            Ok(devices) => devices,
            Err(e) => {
                // Treat as "nothing present" so a failing enumerator cannot
                // hide a real removal.
                log::warn!("Device enumeration failed: {}", e);
                Vec::new()
            }
        };

        let diff = self.tracker.lock().update(devices);

        for device in diff.attached {
            log::info!("HID connected: {}", device);
            let _ = self.events.send(BridgeEvent::DeviceAttached(device));
        }
        for device in diff.detached {
            log::info!("HID disconnected: {}", device);
            let _ = self.events.send(BridgeEvent::DeviceRemoved(device));
        }
    }
}

fn monitor_loop<E: DeviceEnumerator + ?Sized>(
    running: Arc<AtomicBool>,
    poller: Poller<E>,
    interval: Duration,
) {
    while running.load(Ordering::SeqCst) {
        let started = Instant::now();
        poller.poll();

        while started.elapsed() < interval {
            if !running.load(Ordering::SeqCst) {
                return;
            }
            let remaining = interval.saturating_sub(started.elapsed());
            std::thread::sleep(remaining.min(STOP_CHECK_INTERVAL));
        }
    }
}
