use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::channel;
use std::sync::Arc;
use std::thread::JoinHandle;

use sip_core::{AccountIdentity, EventListener, SipEngine, Transport};

use crate::messages::{BridgeCommand, BridgeCommandSender};
use crate::tasks::driver::{DriverConfig, DriverTask, EngineDriver};
use crate::tasks::task;
use crate::BridgeError;

/// Host-facing side of the bridge.
///
/// Every call only queues an intent for the driver thread and returns; the
/// outcome arrives later through the registered listener. The only errors
/// reported here are malformed addresses and a bridge that has stopped.
pub struct Bridge {
    cmd_tx: BridgeCommandSender,
    transport: Transport,
    stop: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl Bridge {
    pub fn start<E>(engine: E, config: DriverConfig) -> Result<Self, BridgeError>
    where
        E: SipEngine + Send + 'static,
    {
        let (cmd_tx, cmd_rx) = channel();
        let stop = Arc::new(AtomicBool::new(false));
        let transport = config.transport;

        let driver = EngineDriver::new(engine, config, cmd_rx);
        let join = task::spawn(Box::new(DriverTask::new(driver, stop.clone())))
            .map_err(BridgeError::Spawn)?;

        Ok(Self {
            cmd_tx,
            transport,
            stop,
            join: Some(join),
        })
    }

    /// Register `username@domain` as the new default account.
    pub fn register(&self, username: &str, password: &str, domain: &str) -> Result<(), BridgeError> {
        AccountIdentity::new(username, domain, self.transport)?;
        self.send(BridgeCommand::Register {
            username: username.to_string(),
            password: password.to_string(),
            domain: domain.to_string(),
        })
    }

    pub fn accept_call(&self) -> Result<(), BridgeError> {
        self.send(BridgeCommand::AcceptCall)
    }

    pub fn decline_call(&self) -> Result<(), BridgeError> {
        self.send(BridgeCommand::DeclineCall)
    }

    pub fn set_listener<L: EventListener + 'static>(&self, listener: L) -> Result<(), BridgeError> {
        self.send(BridgeCommand::SetListener(Box::new(listener)))
    }

    pub fn clear_listener(&self) -> Result<(), BridgeError> {
        self.send(BridgeCommand::ClearListener)
    }

    /// Emit `TestNativeModule` so the host can check the event path.
    pub fn test_native_module(&self) -> Result<(), BridgeError> {
        self.send(BridgeCommand::TestNativeModule)
    }

    pub fn is_running(&self) -> bool {
        self.join.as_ref().is_some_and(|j| !j.is_finished())
    }

    /// Stop ticking and wait for the driver thread. Idempotent.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                log::error!("engine driver thread panicked");
            }
        }
    }

    fn send(&self, cmd: BridgeCommand) -> Result<(), BridgeError> {
        if self.stop.load(Ordering::Acquire) {
            return Err(BridgeError::Stopped);
        }
        self.cmd_tx.send(cmd).map_err(|_| BridgeError::Stopped)
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        self.stop();
    }
}
