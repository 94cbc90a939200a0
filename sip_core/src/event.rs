use core::fmt;
use std::sync::mpsc::Sender;

use log::debug;

use crate::{call::CallState, registration::RegistrationStatus};

pub const INCOMING_CALL: &str = "IncomingCall";
pub const REGISTRATION_STATE_CHANGED: &str = "RegistrationStateChanged";
pub const CALL_STATE_CHANGED: &str = "CallStateChanged";
pub const TEST_NATIVE_MODULE: &str = "TestNativeModule";

/// A notification for the host. Every event names one observed transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Carries the caller's address rather than the engine's free-text state
    /// message, so the host can show who is calling.
    IncomingCall {
        remote: String,
    },
    RegistrationStateChanged {
        status: RegistrationStatus,
        message: String,
    },
    CallStateChanged {
        state: CallState,
        message: String,
    },
    TestNativeModule,
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::IncomingCall { .. } => INCOMING_CALL,
            Event::RegistrationStateChanged { .. } => REGISTRATION_STATE_CHANGED,
            Event::CallStateChanged { .. } => CALL_STATE_CHANGED,
            Event::TestNativeModule => TEST_NATIVE_MODULE,
        }
    }

    /// The free-text payload delivered alongside the name.
    pub fn payload(&self) -> String {
        match self {
            Event::IncomingCall { remote } => remote.clone(),
            Event::RegistrationStateChanged { status, message } => format!("{status}: {message}"),
            Event::CallStateChanged { state, message } => format!("{state}: {message}"),
            Event::TestNativeModule => "Native module is working!".to_string(),
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.payload())
    }
}

pub trait EventListener: Send {
    fn on_event(&mut self, event: &Event);
}

impl<F> EventListener for F
where
    F: FnMut(&Event) + Send,
{
    fn on_event(&mut self, event: &Event) {
        self(event)
    }
}

/// Forwards events into a channel, for hosts that consume them on their own
/// thread.
pub struct ChannelListener(pub Sender<Event>);

impl EventListener for ChannelListener {
    fn on_event(&mut self, event: &Event) {
        if self.0.send(event.clone()).is_err() {
            debug!("listener channel closed; dropping {}", event.name());
        }
    }
}

/// Single-slot relay from the core to the host listener. Holds nothing but
/// the listener itself.
#[derive(Default)]
pub struct EventDispatcher {
    listener: Option<Box<dyn EventListener>>,
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("listener", &self.listener.is_some())
            .finish()
    }
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_listener(&mut self, listener: Box<dyn EventListener>) {
        if self.listener.replace(listener).is_some() {
            debug!("event listener replaced");
        }
    }

    pub fn clear_listener(&mut self) -> bool {
        self.listener.take().is_some()
    }

    /// Deliver `event` to the listener. Without one the event is dropped.
    pub fn emit(&mut self, event: &Event) -> bool {
        match self.listener.as_mut() {
            Some(l) => {
                debug!("emit {}", event);
                l.on_event(event);
                true
            }
            None => {
                debug!("no listener; dropping {}", event.name());
                false
            }
        }
    }
}
