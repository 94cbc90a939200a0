use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::TryRecvError;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use sip_core::{
    AddressError, EngineEvents, Event, EventDispatcher, SipEngine, SipStack, Transport,
};

use crate::messages::{BridgeCommand, BridgeCommandReceiver};
use crate::settings::Settings;
use crate::tasks::task::{AppTask, TaskMeta};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverConfig {
    /// Cadence of `tick`, and the budget one tick may spend.
    pub tick_interval: Duration,
    pub transport: Transport,
    pub max_commands_per_tick: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(20),
            transport: Transport::Udp,
            max_commands_per_tick: 32,
        }
    }
}

impl DriverConfig {
    pub fn from_settings(settings: &Settings) -> Result<Self, AddressError> {
        Ok(Self {
            tick_interval: Duration::from_millis(settings.tick_interval_ms.max(1)),
            transport: settings.transport.parse()?,
            max_commands_per_tick: settings.max_commands_per_tick.max(1),
        })
    }
}

/// Owns the engine and every piece of call/registration state. Only `tick`
/// mutates them.
pub struct EngineDriver<E> {
    config: DriverConfig,
    engine: E,
    stack: SipStack,
    dispatcher: EventDispatcher,
    cmd_rx: BridgeCommandReceiver,

    engine_events: EngineEvents,
    pending: Vec<Event>,

    stopped: bool,
    ticks: u64,
    overruns: u64,
}

impl<E: SipEngine> EngineDriver<E> {
    pub fn new(engine: E, config: DriverConfig, cmd_rx: BridgeCommandReceiver) -> Self {
        let stack = SipStack::new(config.transport);
        Self {
            config,
            engine,
            stack,
            dispatcher: EventDispatcher::new(),
            cmd_rx,
            engine_events: EngineEvents::new(),
            pending: Vec::new(),
            stopped: false,
            ticks: 0,
            overruns: 0,
        }
    }

    /// One pass: release a finished call, apply queued host commands, let the
    /// engine run and relay whatever transitions came out of it.
    pub fn tick(&mut self) {
        if self.stopped {
            return;
        }

        let started = Instant::now();
        let budget = self.config.tick_interval;
        self.ticks += 1;

        self.stack.reap_call();
        self.poll_commands(started + budget);
        self.poll_engine();
        self.flush_events();

        let elapsed = started.elapsed();
        if elapsed > budget {
            self.overruns += 1;
            log::warn!(
                "tick {} overran its budget: {:?} > {:?}",
                self.ticks,
                elapsed,
                budget
            );
        }
    }

    /// Cancel all future ticks. Safe to call more than once.
    pub fn stop(&mut self) {
        if !self.stopped {
            self.stopped = true;
            log::info!("engine driver stopped after {} ticks", self.ticks);
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn stack(&self) -> &SipStack {
        &self.stack
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn overruns(&self) -> u64 {
        self.overruns
    }

    // --- Commands from the host ----------------------------------------------

    fn poll_commands(&mut self, deadline: Instant) {
        for _ in 0..self.config.max_commands_per_tick {
            if Instant::now() >= deadline {
                log::warn!("tick budget spent; deferring remaining commands");
                return;
            }

            match self.cmd_rx.try_recv() {
                Ok(cmd) => self.handle_command(cmd),
                Err(TryRecvError::Empty) => return,
                Err(TryRecvError::Disconnected) => {
                    log::info!("command channel closed");
                    self.stop();
                    return;
                }
            }
        }
    }

    fn handle_command(&mut self, cmd: BridgeCommand) {
        log::debug!("command {:?}", cmd);

        match cmd {
            BridgeCommand::Register {
                username,
                password,
                domain,
            } => {
                if let Err(e) = self.stack.register(
                    &mut self.engine,
                    &username,
                    &password,
                    &domain,
                    &mut self.pending,
                ) {
                    log::warn!("registration for {}@{} failed: {}", username, domain, e);
                }
            }
            BridgeCommand::AcceptCall => {
                if let Err(e) = self.stack.accept_call(&mut self.engine, &mut self.pending) {
                    log::warn!("accept ignored: {}", e);
                }
            }
            BridgeCommand::DeclineCall => {
                if let Err(e) = self.stack.decline_call(&mut self.engine, &mut self.pending) {
                    log::warn!("decline ignored: {}", e);
                }
            }
            BridgeCommand::SetListener(listener) => self.dispatcher.set_listener(listener),
            BridgeCommand::ClearListener => {
                self.dispatcher.clear_listener();
            }
            BridgeCommand::TestNativeModule => self.pending.push(Event::TestNativeModule),
        }
    }

    // --- Engine callbacks ----------------------------------------------------

    fn poll_engine(&mut self) {
        self.engine_events.clear();
        if let Err(e) = self.engine.iterate(&mut self.engine_events) {
            log::error!("engine iterate failed: {}", e);
        }

        for ev in core::mem::take(&mut self.engine_events) {
            self.stack
                .on_engine_event(&mut self.engine, ev, &mut self.pending);
        }
    }

    fn flush_events(&mut self) {
        for ev in self.pending.drain(..) {
            self.dispatcher.emit(&ev);
        }
    }
}

/// Runs an [`EngineDriver`] on its own thread at the configured cadence.
pub struct DriverTask<E> {
    driver: EngineDriver<E>,
    stop: Arc<AtomicBool>,
}

impl<E: SipEngine> DriverTask<E> {
    pub fn new(driver: EngineDriver<E>, stop: Arc<AtomicBool>) -> Self {
        Self { driver, stop }
    }

    fn run(&mut self) {
        let interval = self.driver.config().tick_interval;
        log::info!("engine driver started: tick every {:?}", interval);

        let mut next_tick = Instant::now() + interval;

        loop {
            if self.stop.load(Ordering::Acquire) {
                self.driver.stop();
                break;
            }

            let now = Instant::now();
            if now < next_tick {
                thread::sleep(next_tick - now);
                continue;
            }

            self.driver.tick();
            if self.driver.is_stopped() {
                break;
            }

            // Never queue up missed ticks; resume the cadence from now.
            next_tick += interval;
            let now = Instant::now();
            if next_tick <= now {
                log::debug!("skipping missed tick deadline(s)");
                next_tick = now + interval;
            }
        }

        log::info!(
            "engine driver exiting: {} ticks, {} over budget",
            self.driver.ticks(),
            self.driver.overruns()
        );
    }
}

impl<E: SipEngine + Send + 'static> AppTask for DriverTask<E> {
    fn meta(&self) -> TaskMeta {
        TaskMeta {
            name: "sip-driver",
            stack_bytes: None,
        }
    }

    fn into_runner(mut self: Box<Self>) -> Box<dyn FnOnce() + Send + 'static> {
        Box::new(move || self.run())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc::{channel, Receiver, Sender};

    use sip_core::{
        CallState, ChannelListener, EngineCallState, RegistrationStatus, SimEngine,
    };

    use super::*;

    type Fixture = (EngineDriver<SimEngine>, SimEngine, Sender<BridgeCommand>, Receiver<Event>);

    fn driver() -> Fixture {
        driver_with(DriverConfig::default())
    }

    fn driver_with(config: DriverConfig) -> Fixture {
        let engine = SimEngine::new(None);
        let (cmd_tx, cmd_rx) = channel();
        let (ev_tx, ev_rx) = channel();
        let mut driver = EngineDriver::new(engine.clone(), config, cmd_rx);
        cmd_tx
            .send(BridgeCommand::SetListener(Box::new(ChannelListener(ev_tx))))
            .unwrap();
        driver.tick();
        (driver, engine, cmd_tx, ev_rx)
    }

    #[test]
    fn commands_apply_on_tick() {
        let (mut driver, engine, cmd_tx, ev_rx) = driver();

        cmd_tx
            .send(BridgeCommand::Register {
                username: "alice".into(),
                password: "pw".into(),
                domain: "example.com".into(),
            })
            .unwrap();
        assert!(driver.stack().accounts().is_empty());

        driver.tick();
        let acct = driver.stack().accounts().default_account().unwrap();
        assert_eq!(acct.identity_address().as_str(), "sip:alice@example.com");
        assert_eq!(acct.registration(), &RegistrationStatus::Registered);
        assert_eq!(engine.auth_users(), vec!["alice".to_string()]);

        let names: Vec<_> = ev_rx.try_iter().map(|e| e.payload()).collect();
        assert_eq!(
            names,
            vec![
                "InProgress: Registration requested".to_string(),
                "Registered: Registration successful".to_string()
            ]
        );
    }

    #[test]
    fn terminated_call_is_reaped_next_tick() {
        let (mut driver, engine, cmd_tx, _ev_rx) = driver();

        let call = engine.inject_incoming("sip:bob@example.com");
        driver.tick();
        assert_eq!(driver.stack().call_state(), CallState::IncomingReceived);

        engine.inject_call_state(call, EngineCallState::End, "Canceled");
        driver.tick();
        assert_eq!(driver.stack().call_state(), CallState::Terminated);

        driver.tick();
        assert_eq!(driver.stack().call_state(), CallState::Idle);

        // nothing to decline anymore; logged and ignored
        cmd_tx.send(BridgeCommand::DeclineCall).unwrap();
        driver.tick();
        assert!(engine.terminated_calls().is_empty());
    }

    #[test]
    fn engine_failure_does_not_stop_ticking() {
        let (mut driver, engine, _cmd_tx, _ev_rx) = driver();

        engine.fail_next_iterate("transport down");
        engine.inject_incoming("sip:bob@example.com");
        driver.tick();
        assert_eq!(driver.stack().call_state(), CallState::Idle);
        assert!(!driver.is_stopped());

        driver.tick();
        assert_eq!(driver.stack().call_state(), CallState::IncomingReceived);
    }

    #[test]
    fn stop_is_idempotent_and_final() {
        let (mut driver, engine, cmd_tx, _ev_rx) = driver();
        let before = engine.iterations();

        driver.stop();
        driver.stop();
        assert!(driver.is_stopped());

        cmd_tx.send(BridgeCommand::TestNativeModule).unwrap();
        driver.tick();
        assert_eq!(engine.iterations(), before);
    }

    #[test]
    fn closed_command_channel_stops_driver() {
        let (mut driver, _engine, cmd_tx, _ev_rx) = driver();
        drop(cmd_tx);
        driver.tick();
        assert!(driver.is_stopped());
    }

    #[test]
    fn commands_beyond_the_cap_wait_for_next_tick() {
        let engine = SimEngine::new(None);
        let (cmd_tx, cmd_rx) = channel();
        let (ev_tx, ev_rx) = channel();
        let config = DriverConfig {
            tick_interval: Duration::from_secs(1),
            max_commands_per_tick: 2,
            ..Default::default()
        };
        let mut driver = EngineDriver::new(engine, config, cmd_rx);

        cmd_tx
            .send(BridgeCommand::SetListener(Box::new(ChannelListener(ev_tx))))
            .unwrap();
        for _ in 0..3 {
            cmd_tx.send(BridgeCommand::TestNativeModule).unwrap();
        }

        driver.tick();
        assert_eq!(ev_rx.try_iter().count(), 1);
        driver.tick();
        assert_eq!(ev_rx.try_iter().count(), 2);
    }

    #[test]
    fn slow_engine_overruns_and_defers_commands() {
        let (mut driver, engine, cmd_tx, ev_rx) = driver_with(DriverConfig {
            tick_interval: Duration::from_millis(50),
            ..Default::default()
        });
        assert_eq!(driver.overruns(), 0);

        // each address lookup alone eats the whole tick
        engine.set_latency(Duration::from_millis(60));
        cmd_tx
            .send(BridgeCommand::Register {
                username: "alice".into(),
                password: "pw".into(),
                domain: "example.com".into(),
            })
            .unwrap();
        cmd_tx.send(BridgeCommand::TestNativeModule).unwrap();
        cmd_tx.send(BridgeCommand::TestNativeModule).unwrap();

        driver.tick();
        assert_eq!(driver.overruns(), 1);
        let names: Vec<_> = ev_rx.try_iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["RegistrationStateChanged", "RegistrationStateChanged"]);

        driver.tick();
        assert_eq!(driver.overruns(), 2);
        let names: Vec<_> = ev_rx.try_iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["TestNativeModule", "TestNativeModule"]);

        engine.set_latency(Duration::ZERO);
        driver.tick();
        assert_eq!(driver.overruns(), 2);
        assert_eq!(driver.ticks(), 4);
        assert!(!driver.is_stopped());
    }

    #[test]
    fn config_from_settings() {
        let settings = Settings {
            tick_interval_ms: 50,
            transport: "tcp",
            max_commands_per_tick: 0,
            engine_log_path: "",
            demo_username: "alice",
            demo_password: "pw",
            demo_domain: "example.com",
            demo_caller: "sip:bob@example.com",
        };
        let config = DriverConfig::from_settings(&settings).unwrap();
        assert_eq!(config.tick_interval, Duration::from_millis(50));
        assert_eq!(config.transport, Transport::Tcp);
        assert_eq!(config.max_commands_per_tick, 1);

        let bad = Settings { transport: "carrier-pigeon", ..settings };
        assert!(DriverConfig::from_settings(&bad).is_err());
    }
}
