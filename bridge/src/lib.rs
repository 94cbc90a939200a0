use std::path::Path;
use std::thread;
use std::time::Duration;

use log::info;
use thiserror::Error;

use sip_core::{AddressError, Event, SimEngine};

mod handle;
pub mod messages;
pub mod settings;
mod tasks;

pub use handle::Bridge;
pub use tasks::driver::{DriverConfig, DriverTask, EngineDriver};
pub use tasks::task::{AppTask, TaskMeta};

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Address(#[from] AddressError),
    #[error("bridge stopped")]
    Stopped,
    #[error("failed to spawn engine driver: {0}")]
    Spawn(std::io::Error),
}

/// Demo run against the simulated engine: register, take one inbound call,
/// hang up.
pub fn run() -> Result<(), BridgeError> {
    let settings = &settings::SETTINGS;
    let config = DriverConfig::from_settings(settings)?;

    info!("starting SIP bridge: {:?}", config);

    let log_path = Some(settings.engine_log_path)
        .filter(|p| !p.is_empty())
        .map(Path::new);
    let engine = SimEngine::new(log_path);
    let settle = config.tick_interval * 5;

    let mut bridge = Bridge::start(engine.clone(), config)?;
    bridge.set_listener(|ev: &Event| {
        info!("event {} -> {}", ev.name(), ev.payload());
    })?;
    bridge.test_native_module()?;

    bridge.register(
        settings.demo_username,
        settings.demo_password,
        settings.demo_domain,
    )?;
    thread::sleep(settle);

    engine.inject_incoming(settings.demo_caller);
    thread::sleep(settle);

    bridge.accept_call()?;
    thread::sleep(Duration::from_millis(500));

    bridge.decline_call()?;
    thread::sleep(settle);

    bridge.stop();
    info!("SIP bridge stopped");
    Ok(())
}
