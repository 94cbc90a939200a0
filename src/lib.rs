//! Embedding entry point: the host-facing [`Bridge`] plus the state machines
//! it drives.

pub use bridge::{messages, Bridge, BridgeError, DriverConfig, EngineDriver};
pub use sip_core;
pub use sip_core::{CallState, Event, EventListener, RegistrationStatus, SimEngine};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_names_match_host_contract() {
        let incoming = Event::IncomingCall { remote: "sip:bob@example.com".into() };
        let reg = Event::RegistrationStateChanged {
            status: RegistrationStatus::InProgress,
            message: String::new(),
        };
        assert_eq!(incoming.name(), "IncomingCall");
        assert_eq!(reg.name(), "RegistrationStateChanged");
        assert_eq!(DriverConfig::default().tick_interval.as_millis(), 20);
    }
}
