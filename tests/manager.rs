mod common;

use common::{fast_timings, neutral_report, pad, wait_until, FakePlatform, RecordingSink};
use crossbeam::channel::{unbounded, Receiver};
use padbridge_lib::device::{DeviceFilter, ReadOutcome};
use padbridge_lib::event::BridgeEvent;
use padbridge_lib::manager::{run_control_loop, BridgeManager};
use padbridge_lib::monitor::PresenceMonitor;
use std::sync::Arc;
use std::time::Duration;

const EVENT_TIMEOUT: Duration = Duration::from_secs(2);

struct Harness {
    platform: Arc<FakePlatform>,
    sink: Arc<RecordingSink>,
    manager: BridgeManager,
    rx: Receiver<BridgeEvent>,
}

fn harness(hide_devices: bool) -> Harness {
    let platform = FakePlatform::new();
    let sink = Arc::new(RecordingSink::default());
    let (tx, rx) = unbounded();
    let manager = BridgeManager::new(
        platform.clone(),
        sink.clone(),
        tx,
        fast_timings(),
        hide_devices,
    );
    Harness {
        platform,
        sink,
        manager,
        rx,
    }
}

impl Harness {
    /// Feed worker events back into the manager until one matches.
    fn pump_until(&mut self, mut done: impl FnMut(&BridgeEvent) -> bool) -> Option<String> {
        loop {
            let event = self.rx.recv_timeout(EVENT_TIMEOUT).expect("no event");
            let matched = done(&event);
            let lost = self.manager.handle_event(event).map(|device| device.id);
            if matched {
                return lost;
            }
        }
    }
}

#[test]
fn one_session_per_device() {
    let mut h = harness(true);
    assert!(h.manager.add_and_start(pad("a")));
    assert!(!h.manager.add_and_start(pad("a")));
    assert_eq!(h.manager.len(), 1);
    assert_eq!(h.platform.hide_calls(), vec![(pad("a").instance_id, true)]);
    assert_eq!(*h.sink.attached.lock(), vec![pad("a").id]);
}

#[test]
fn removing_an_unknown_device_is_a_no_op() {
    let mut h = harness(true);
    assert!(!h.manager.stop_and_remove(&pad("ghost").id));
    assert!(h.platform.hide_calls().is_empty());
    assert!(h.sink.removed.lock().is_empty());
}

#[test]
fn removal_stops_the_session_and_unhides() {
    let mut h = harness(true);
    h.manager.add_and_start(pad("a"));
    let handle = h.platform.wait_for_handle(1);

    assert!(h.manager.stop_and_remove(&pad("a").id));
    assert!(h.manager.is_empty());
    assert_eq!(handle.close_count(), 1);
    assert_eq!(
        h.platform.hide_calls(),
        vec![(pad("a").instance_id, true), (pad("a").instance_id, false)]
    );
    assert_eq!(*h.sink.removed.lock(), vec![pad("a").id]);
}

#[test]
fn hiding_can_be_disabled() {
    let mut h = harness(false);
    h.manager.add_and_start(pad("a"));
    h.manager.stop_and_remove(&pad("a").id);
    assert!(h.platform.hide_calls().is_empty());
}

#[test]
fn attach_detach_attach_leaves_one_session() {
    let mut h = harness(true);
    h.manager.handle_event(BridgeEvent::DeviceAttached(pad("a")));
    h.manager.handle_event(BridgeEvent::DeviceRemoved(pad("a")));
    h.manager.handle_event(BridgeEvent::DeviceAttached(pad("a")));
    assert_eq!(h.manager.len(), 1);
    assert!(h.manager.contains(&pad("a").id));
}

#[test]
fn unexpected_end_removes_the_session() {
    let mut h = harness(true);
    h.manager.add_and_start(pad("a"));
    h.pump_until(|e| matches!(e, BridgeEvent::SessionStarted { .. }));

    h.platform
        .wait_for_handle(1)
        .push_read(ReadOutcome::Failed("link lost".into()));

    let lost = h.pump_until(|e| matches!(e, BridgeEvent::SessionEnded { .. }));
    assert_eq!(lost, Some(pad("a").id));
    assert!(!h.manager.contains(&pad("a").id));
    assert_eq!(h.platform.hide_calls().last(), Some(&(pad("a").instance_id, false)));
}

#[test]
fn stale_end_event_is_ignored() {
    let mut h = harness(true);
    h.manager.add_and_start(pad("a"));
    h.manager.stop_and_remove(&pad("a").id);
    h.manager.add_and_start(pad("a"));

    let lost = h.manager.handle_event(BridgeEvent::SessionEnded {
        device_id: pad("a").id,
        serial: 1,
        clean_end: false,
    });
    assert_eq!(lost, None);
    assert!(h.manager.contains(&pad("a").id));
}

#[test]
fn player_status_lists_known_players_only() {
    let mut h = harness(true);
    h.manager.add_and_start(pad("a"));
    h.pump_until(|e| matches!(e, BridgeEvent::SessionStarted { .. }));
    h.manager.add_and_start(pad("b"));
    h.pump_until(|e| matches!(e, BridgeEvent::SessionStarted { .. }));

    // Only the first pad gets a player index.
    let first = h.platform.controllers.lock()[0].clone();
    first.send_feedback(0, 0, 1);
    let handle = h.platform.wait_for_handle(1);
    handle.push_report(neutral_report(80));

    assert!(wait_until(EVENT_TIMEOUT, || {
        h.manager.player_status().get(&1) == Some(&Some(80))
    }));
    assert_eq!(h.manager.player_status().len(), 1);
}

#[test]
fn shutdown_stops_everything() {
    let mut h = harness(true);
    h.manager.add_and_start(pad("a"));
    h.manager.add_and_start(pad("b"));
    let first = h.platform.wait_for_handle(1);
    let second = h.platform.wait_for_handle(2);

    h.manager.shutdown();
    assert!(h.manager.is_empty());
    assert_eq!(first.close_count(), 1);
    assert_eq!(second.close_count(), 1);
    assert_eq!(h.sink.removed.lock().len(), 2);
}

#[test]
fn control_loop_bridges_present_devices_until_shutdown() {
    let platform = FakePlatform::new();
    platform.set_present(vec![pad("a")]);
    let sink = Arc::new(RecordingSink::default());
    let (tx, rx) = unbounded();

    let mut manager = BridgeManager::new(
        platform.clone(),
        sink.clone(),
        tx.clone(),
        fast_timings(),
        true,
    );
    let mut monitor = PresenceMonitor::new(
        platform.clone(),
        DeviceFilter::new("vid&00022717_pid&3144"),
        Duration::from_millis(50),
        tx.clone(),
    );
    monitor.start().unwrap();

    let stopper = {
        let platform = platform.clone();
        std::thread::spawn(move || {
            let opened = wait_until(EVENT_TIMEOUT, || platform.handle_count() == 1);
            std::thread::sleep(Duration::from_millis(100));
            let _ = tx.send(BridgeEvent::Shutdown);
            opened
        })
    };

    run_control_loop(&mut manager, &monitor, &rx, Duration::from_millis(30));
    assert!(stopper.join().unwrap());

    assert!(manager.contains(&pad("a").id));
    assert!(!sink.players.lock().is_empty());

    monitor.stop();
    manager.shutdown();
    assert_eq!(platform.last_handle().unwrap().close_count(), 1);
}
