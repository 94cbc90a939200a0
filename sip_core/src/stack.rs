use log::{debug, warn};

use crate::{
    account::{AccountId, AccountManager},
    call::{CallError, CallMachine, CallState},
    engine::{EngineEvent, SipEngine},
    event::Event,
    registration::{RegistrationStatus, RegistrationTracker},
    Result, Transport,
};

/// Wires accounts, registration tracking and the call machine together and
/// turns engine callbacks into host events.
///
/// This does *not* drive the engine. The caller owns the engine, calls
/// `iterate` on it, and feeds every callback to [`SipStack::on_engine_event`].
#[derive(Debug)]
pub struct SipStack {
    accounts: AccountManager,
    registration: RegistrationTracker,
    calls: CallMachine,
}

impl SipStack {
    pub fn new(transport: Transport) -> Self {
        Self {
            accounts: AccountManager::new(transport),
            registration: RegistrationTracker::new(),
            calls: CallMachine::new(),
        }
    }

    /// Create and activate a new default account. Engine-side failures are
    /// also reported to the host as a failed registration.
    pub fn register<E: SipEngine + ?Sized>(
        &mut self,
        engine: &mut E,
        username: &str,
        password: &str,
        domain: &str,
        events: &mut Vec<Event>,
    ) -> Result<AccountId> {
        match self.accounts.register(engine, username, password, domain) {
            Ok(id) => {
                self.registration.track(id);
                if let Some(ev) = self.registration.observe(
                    id,
                    RegistrationStatus::InProgress,
                    "Registration requested",
                ) {
                    events.push(ev);
                }
                Ok(id)
            }
            Err(e) => {
                if let Some(ev) = self.registration.fail(&e.to_string()) {
                    events.push(ev);
                }
                Err(e)
            }
        }
    }

    pub fn on_engine_event<E: SipEngine + ?Sized>(
        &mut self,
        engine: &mut E,
        event: EngineEvent,
        events: &mut Vec<Event>,
    ) {
        match event {
            EngineEvent::RegistrationState {
                account,
                state,
                message,
            } => {
                let status = RegistrationStatus::from_engine(state, &message);
                let Some(acct) = self.accounts.by_handle_mut(account) else {
                    warn!("registration {} for unknown {}", status, account);
                    return;
                };
                if !acct.registration.regresses_to(&status) {
                    acct.registration = status.clone();
                }
                let id = acct.id();

                if let Some(ev) = self.registration.observe(id, status, &message) {
                    events.push(ev);
                }
            }
            EngineEvent::CallState {
                call,
                state,
                message,
            } => {
                self.calls
                    .on_engine_state(engine, call, state, &message, events);
            }
        }
    }

    pub fn accept_call<E: SipEngine + ?Sized>(
        &mut self,
        engine: &mut E,
        events: &mut Vec<Event>,
    ) -> core::result::Result<(), CallError> {
        self.calls.accept(engine, events)
    }

    pub fn decline_call<E: SipEngine + ?Sized>(
        &mut self,
        engine: &mut E,
        events: &mut Vec<Event>,
    ) -> core::result::Result<(), CallError> {
        self.calls.decline(engine, events)
    }

    /// Release a call that finished on an earlier tick.
    pub fn reap_call(&mut self) -> bool {
        let reaped = self.calls.reap();
        if reaped {
            debug!("call state -> {}", CallState::Idle);
        }
        reaped
    }

    pub fn accounts(&self) -> &AccountManager {
        &self.accounts
    }

    pub fn registration(&self) -> &RegistrationTracker {
        &self.registration
    }

    pub fn calls(&self) -> &CallMachine {
        &self.calls
    }

    pub fn call_state(&self) -> CallState {
        self.calls.state()
    }
}
