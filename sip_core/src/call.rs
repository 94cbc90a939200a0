use core::fmt;

use log::{debug, info, warn};
use thiserror::Error;

use crate::{
    engine::{CallHandle, CallParams, DeclineReason, EngineCallState, EngineError, SipEngine},
    event::Event,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    #[error("no active call")]
    NoActiveCall,
    #[error("call is {0}")]
    InvalidState(CallState),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CallState {
    #[default]
    Idle,
    IncomingReceived,
    OutgoingInit,
    Connected,
    Terminated,
    Error(String),
}

impl CallState {
    /// Map an engine report onto the session graph. `None` means the engine
    /// state carries no session transition.
    pub fn from_engine(state: EngineCallState, message: &str) -> Option<Self> {
        match state {
            EngineCallState::IncomingReceived => Some(CallState::IncomingReceived),
            EngineCallState::OutgoingInit
            | EngineCallState::OutgoingProgress
            | EngineCallState::OutgoingRinging
            | EngineCallState::OutgoingEarlyMedia => Some(CallState::OutgoingInit),
            EngineCallState::Connected | EngineCallState::StreamsRunning => {
                Some(CallState::Connected)
            }
            EngineCallState::End | EngineCallState::Released => Some(CallState::Terminated),
            EngineCallState::Error => Some(CallState::Error(message.to_string())),
            EngineCallState::Idle
            | EngineCallState::Pausing
            | EngineCallState::Paused
            | EngineCallState::Resuming
            | EngineCallState::Updating => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CallState::Terminated | CallState::Error(_))
    }

    pub fn can_transition_to(&self, next: &CallState) -> bool {
        use CallState::*;

        match (self, next) {
            (Idle, IncomingReceived) | (Idle, OutgoingInit) => true,
            (IncomingReceived, Connected) | (IncomingReceived, Terminated) => true,
            (OutgoingInit, Connected) | (OutgoingInit, Terminated) => true,
            (Connected, Terminated) => true,
            (IncomingReceived | OutgoingInit | Connected, Error(_)) => true,
            (Terminated | Error(_), Idle) => true,
            _ => false,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            CallState::Idle => "Idle",
            CallState::IncomingReceived => "IncomingReceived",
            CallState::OutgoingInit => "OutgoingInit",
            CallState::Connected => "Connected",
            CallState::Terminated => "Terminated",
            CallState::Error(_) => "Error",
        }
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallDirection {
    Inbound,
    Outbound,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSession {
    handle: CallHandle,
    remote: String,
    direction: CallDirection,
    state: CallState,
    params: Option<CallParams>,
}

impl CallSession {
    pub fn handle(&self) -> CallHandle {
        self.handle
    }

    pub fn remote(&self) -> &str {
        &self.remote
    }

    pub fn direction(&self) -> CallDirection {
        self.direction
    }

    pub fn state(&self) -> &CallState {
        &self.state
    }

    pub fn params(&self) -> Option<&CallParams> {
        self.params.as_ref()
    }
}

/// Tracks the single live call, if any.
///
/// A second inbound call while a session is live is declined on the engine
/// as busy and never surfaces to the host.
#[derive(Debug, Default)]
pub struct CallMachine {
    session: Option<CallSession>,
}

impl CallMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> CallState {
        self.session
            .as_ref()
            .map(|s| s.state.clone())
            .unwrap_or(CallState::Idle)
    }

    pub fn session(&self) -> Option<&CallSession> {
        self.session.as_ref()
    }

    /// Drop a session that finished on an earlier tick. Returns whether one
    /// was released.
    pub fn reap(&mut self) -> bool {
        match &self.session {
            Some(s) if s.state.is_terminal() => {
                debug!("{} released after {}; idle", s.handle, s.state);
                self.session = None;
                true
            }
            _ => false,
        }
    }

    pub fn on_engine_state<E: SipEngine + ?Sized>(
        &mut self,
        engine: &mut E,
        call: CallHandle,
        state: EngineCallState,
        message: &str,
        events: &mut Vec<Event>,
    ) {
        let Some(next) = CallState::from_engine(state, message) else {
            debug!("{}: engine state {:?} ignored", call, state);
            return;
        };

        let (tracked, live) = match &self.session {
            Some(s) => (s.handle == call, !s.state.is_terminal()),
            None => (false, false),
        };

        if tracked {
            self.advance(next, message, events);
            return;
        }

        if live {
            if next == CallState::IncomingReceived {
                info!("{}: rejecting inbound call, line busy", call);
                if let Err(e) = engine.decline_call(call, DeclineReason::Busy) {
                    warn!("{}: busy decline failed: {}", call, e);
                }
            } else {
                debug!("{}: {} for untracked call ignored", call, next);
            }
            return;
        }

        let direction = match next {
            CallState::IncomingReceived => CallDirection::Inbound,
            CallState::OutgoingInit => CallDirection::Outbound,
            other => {
                debug!("{}: {} for untracked call ignored", call, other);
                return;
            }
        };

        if self.reap() {
            debug!("{}: previous session reaped early", call);
        }

        let remote = engine
            .call_remote_address(call)
            .map(|a| a.to_string())
            .unwrap_or_else(|| "unknown".to_string());

        info!("{}: {:?} call with {}", call, direction, remote);

        self.session = Some(CallSession {
            handle: call,
            remote: remote.clone(),
            direction,
            state: next.clone(),
            params: None,
        });

        match next {
            CallState::IncomingReceived => events.push(Event::IncomingCall { remote }),
            state => events.push(Event::CallStateChanged {
                state,
                message: message.to_string(),
            }),
        }
    }

    /// Answer the ringing inbound call.
    pub fn accept<E: SipEngine + ?Sized>(
        &mut self,
        engine: &mut E,
        events: &mut Vec<Event>,
    ) -> Result<(), CallError> {
        let session = self.session.as_ref().ok_or(CallError::NoActiveCall)?;
        if session.state != CallState::IncomingReceived {
            return Err(CallError::InvalidState(session.state.clone()));
        }
        let handle = session.handle;

        let params = engine.create_call_params(handle)?;
        if let Err(e) = engine.accept_call(handle, params.clone()) {
            self.advance(CallState::Error(e.to_string()), &e.to_string(), events);
            return Err(e.into());
        }

        if let Some(s) = self.session.as_mut() {
            s.params = Some(params);
        }
        self.advance(CallState::Connected, "Call accepted", events);
        Ok(())
    }

    /// Terminate the current call. Declining a call that already ended is a
    /// no-op.
    pub fn decline<E: SipEngine + ?Sized>(
        &mut self,
        engine: &mut E,
        events: &mut Vec<Event>,
    ) -> Result<(), CallError> {
        let session = self.session.as_ref().ok_or(CallError::NoActiveCall)?;
        if session.state.is_terminal() {
            debug!("{} already {}; decline ignored", session.handle, session.state);
            return Ok(());
        }
        let handle = session.handle;

        if let Err(e) = engine.terminate_call(handle) {
            self.advance(CallState::Error(e.to_string()), &e.to_string(), events);
            return Err(e.into());
        }

        self.advance(CallState::Terminated, "Call terminated", events);
        Ok(())
    }

    fn advance(&mut self, next: CallState, message: &str, events: &mut Vec<Event>) {
        let Some(session) = self.session.as_mut() else {
            return;
        };

        if session.state == next {
            debug!("{} still {}", session.handle, next);
            return;
        }

        if !session.state.can_transition_to(&next) {
            warn!(
                "{}: ignoring transition {} -> {}",
                session.handle, session.state, next
            );
            return;
        }

        info!("{}: {} -> {}", session.handle, session.state, next);
        session.state = next.clone();
        events.push(Event::CallStateChanged {
            state: next,
            message: message.to_string(),
        });
    }
}
