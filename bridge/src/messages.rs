use std::fmt;
use std::sync::mpsc::{Receiver, Sender};

use sip_core::EventListener;

/// Host intents, queued for the engine driver and applied on its next tick.
pub enum BridgeCommand {
    Register {
        username: String,
        password: String,
        domain: String,
    },
    AcceptCall,
    DeclineCall,
    SetListener(Box<dyn EventListener>),
    ClearListener,
    TestNativeModule,
}

impl fmt::Debug for BridgeCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeCommand::Register { username, domain, .. } => f
                .debug_struct("Register")
                .field("username", username)
                .field("domain", domain)
                .finish_non_exhaustive(),
            BridgeCommand::AcceptCall => f.write_str("AcceptCall"),
            BridgeCommand::DeclineCall => f.write_str("DeclineCall"),
            BridgeCommand::SetListener(_) => f.write_str("SetListener"),
            BridgeCommand::ClearListener => f.write_str("ClearListener"),
            BridgeCommand::TestNativeModule => f.write_str("TestNativeModule"),
        }
    }
}

pub type BridgeCommandSender = Sender<BridgeCommand>;
pub type BridgeCommandReceiver = Receiver<BridgeCommand>;
