pub mod config;
pub mod device;
pub mod error;
pub mod event;
mod hid;
mod hidhide;
pub mod manager;
pub mod monitor;
pub mod platform;
pub mod report;
pub mod session;
mod setupdi;
pub mod status;
pub mod timer;
mod vigem;

use config::AppConfig;
use device::DeviceFilter;
use error::Result;
use event::BridgeEvent;
use manager::BridgeManager;
use monitor::PresenceMonitor;
use status::{LogStatusSink, StatusSink};
use std::sync::Arc;

/// Bridge every matching pad until Ctrl-C.
pub fn run() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    install_panic_hook();

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            log::warn!("Failed to load config, using defaults: {}", e);
            AppConfig::default()
        }
    };
    log::info!("Looking for devices matching {:?}", config.device_filter);

    let platform = platform::create_platform()?;

    if config.hide_devices {
        if let Err(e) = platform.whitelist_self() {
            log::warn!("Could not whitelist padbridge with HidHide: {}", e);
        }
        if let Err(e) = platform.set_active(true) {
            log::warn!("Could not activate HidHide: {}", e);
        }
    }

    let sink: Arc<dyn StatusSink> = Arc::new(LogStatusSink::new());
    let (tx, rx) = crossbeam::channel::unbounded();

    let mut manager = BridgeManager::new(
        platform.clone(),
        sink,
        tx.clone(),
        config.timings(),
        config.hide_devices,
    );

    let mut monitor = PresenceMonitor::new(
        platform.clone(),
        DeviceFilter::new(&config.device_filter),
        config.poll_interval(),
        tx.clone(),
    );
    monitor.start()?;

    let shutdown = tx.clone();
    ctrlc::set_handler(move || {
        let _ = shutdown.send(BridgeEvent::Shutdown);
    })?;
    drop(tx);

    manager::run_control_loop(&mut manager, &monitor, &rx, config.status_interval());

    monitor.stop();
    manager.shutdown();
    drop(manager);

    if config.hide_devices {
        if let Err(e) = platform.set_active(false) {
            log::warn!("Could not deactivate HidHide: {}", e);
        }
    }

    log::info!("padbridge stopped");
    Ok(())
}

/// Route panics through the logger before the default hook prints them.
fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let thread = std::thread::current();
        log::error!(
            "Panic on thread {}: {}",
            thread.name().unwrap_or("<unnamed>"),
            info
        );
        default_hook(info);
    }));
}

/// Report a fatal error the same way status updates are reported.
pub fn report_fatal(error: &error::BridgeError) {
    LogStatusSink::new().fatal(&error.to_string());
}
