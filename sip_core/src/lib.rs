//! Registration and call-session state for a bridge in front of an external
//! SIP engine.
//!
//! Nothing in here performs I/O or owns a thread. The engine is reached
//! through [`SipEngine`]; whoever drives it feeds the callbacks into a
//! [`SipStack`] and relays the resulting [`Event`]s.

use thiserror::Error;

pub mod account;
pub mod address;
pub mod call;
pub mod engine;
pub mod event;
pub mod registration;
pub mod sim;
pub mod stack;

pub use account::{Account, AccountId, AccountManager};
pub use address::{AccountIdentity, AddressError, Credentials, Transport};
pub use call::{CallDirection, CallError, CallMachine, CallSession, CallState};
pub use engine::{
    AccountHandle, AccountParams, Address, CallHandle, CallParams, DeclineReason,
    EngineCallState, EngineError, EngineEvent, EngineEvents, EngineRegistrationState, SipEngine,
    MAX_ENGINE_EVENTS,
};
pub use event::{ChannelListener, Event, EventDispatcher, EventListener};
pub use registration::{RegistrationStatus, RegistrationTracker};
pub use sim::SimEngine;
pub use stack::SipStack;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SipError {
    #[error(transparent)]
    Address(#[from] AddressError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Call(#[from] CallError),
}

pub type Result<T> = std::result::Result<T, SipError>;
