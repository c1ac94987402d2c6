use crate::device::PhysicalDeviceRef;
use parking_lot::Mutex;
use std::collections::BTreeMap;

/// Battery level (percent, `None` if unknown) per player index.
pub type PlayerStatus = BTreeMap<u8, Option<u8>>;

/// Receives display notifications. Push-only; only the latest player
/// status matters, so implementations may drop repeats.
pub trait StatusSink: Send + Sync {
    fn device_attached(&self, device: &PhysicalDeviceRef);
    fn device_removed(&self, device: &PhysicalDeviceRef);
    fn players_changed(&self, players: &PlayerStatus);
    /// Last words before the process exits on an unexpected error.
    fn fatal(&self, message: &str);
}

/// Writes notifications to the log. Player status is only logged when it
/// differs from what was logged last.
#[derive(Default)]
pub struct LogStatusSink {
    last_players: Mutex<Option<PlayerStatus>>,
}

impl LogStatusSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StatusSink for LogStatusSink {
    fn device_attached(&self, device: &PhysicalDeviceRef) {
        log::info!(
            "Gamepad connected: {} (seen {})",
            device,
            device.discovered_at.format("%H:%M:%S")
        );
    }

    fn device_removed(&self, device: &PhysicalDeviceRef) {
        log::info!("Gamepad disconnected: {}", device);
    }

    fn players_changed(&self, players: &PlayerStatus) {
        let mut last = self.last_players.lock();
        if last.as_ref() == Some(players) {
            return;
        }
        if players.is_empty() {
            log::info!("No active players");
        }
        for (player, battery) in players {
            match battery {
                Some(level) => log::info!("Player {}: battery {}%", player + 1, level),
                None => log::info!("Player {}: battery unknown", player + 1),
            }
        }
        *last = Some(players.clone());
    }

    fn fatal(&self, message: &str) {
        log::error!("padbridge stopped: {}", message);
    }
}
