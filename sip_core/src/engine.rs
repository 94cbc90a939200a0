//! Boundary towards the external SIP engine.
//!
//! The engine owns transport, parsing, transactions and media. This crate only
//! asks it to do things and consumes the callbacks it reports from
//! [`SipEngine::iterate`].

use core::fmt;

use heapless::Vec as HVec;
use thiserror::Error;

use crate::{Credentials, Transport};

/// Upper bound of callbacks consumed per `iterate`. Engines keep the overflow
/// queued for the next call.
pub const MAX_ENGINE_EVENTS: usize = 16;

pub type EngineEvents = HVec<EngineEvent, MAX_ENGINE_EVENTS>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("malformed address: {0}")]
    MalformedAddress(String),
    #[error("unknown account {0}")]
    UnknownAccount(AccountHandle),
    #[error("unknown call {0}")]
    UnknownCall(CallHandle),
    #[error("engine failure: {0}")]
    Failure(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AccountHandle(pub u32);

impl fmt::Display for AccountHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "account#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallHandle(pub u32);

impl fmt::Display for CallHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "call#{}", self.0)
    }
}

/// A SIP address the engine has accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address(String);

impl Address {
    /// Wrap a URI the engine already validated.
    pub fn new(uri: impl Into<String>) -> Self {
        Self(uri.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountParams {
    pub identity: Option<Address>,
    pub server: Option<Address>,
    pub register_enabled: bool,
    pub transport: Transport,
}

/// Parameters used to answer a call. Produced and consumed by the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallParams {
    pub audio_enabled: bool,
    pub video_enabled: bool,
    pub early_media: bool,
}

/// Call states as the engine reports them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineCallState {
    Idle,
    IncomingReceived,
    OutgoingInit,
    OutgoingProgress,
    OutgoingRinging,
    OutgoingEarlyMedia,
    Connected,
    StreamsRunning,
    Pausing,
    Paused,
    Resuming,
    Updating,
    End,
    Released,
    Error,
}

/// Registration states as the engine reports them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineRegistrationState {
    None,
    Progress,
    Ok,
    Refreshing,
    Cleared,
    Failed,
}

/// Why a call was refused without being answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclineReason {
    Busy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    CallState {
        call: CallHandle,
        state: EngineCallState,
        message: String,
    },
    RegistrationState {
        account: AccountHandle,
        state: EngineRegistrationState,
        message: String,
    },
}

pub trait SipEngine {
    /// Let the engine process network and timer work, and collect the
    /// callbacks it fired. Must be called periodically.
    fn iterate(&mut self, events: &mut EngineEvents) -> Result<(), EngineError>;

    fn create_address(&mut self, uri: &str) -> Result<Address, EngineError>;

    fn create_account_params(&mut self) -> AccountParams {
        AccountParams::default()
    }

    fn add_auth_info(&mut self, credentials: &Credentials) -> Result<(), EngineError>;

    fn create_account(&mut self, params: AccountParams) -> Result<AccountHandle, EngineError>;

    fn add_account(&mut self, account: AccountHandle) -> Result<(), EngineError>;

    fn set_default_account(&mut self, account: AccountHandle) -> Result<(), EngineError>;

    fn call_remote_address(&self, call: CallHandle) -> Option<Address>;

    fn create_call_params(&mut self, call: CallHandle) -> Result<CallParams, EngineError>;

    fn accept_call(&mut self, call: CallHandle, params: CallParams) -> Result<(), EngineError>;

    fn terminate_call(&mut self, call: CallHandle) -> Result<(), EngineError>;

    fn decline_call(&mut self, call: CallHandle, reason: DeclineReason) -> Result<(), EngineError>;
}
