//! In-process stand-in for the external SIP engine, so the bridge and its
//! tests run on a host without a real stack.
//!
//! Clones share state: a test keeps one handle to script the engine while the
//! driver owns another.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use log::debug;

use crate::{
    engine::{
        AccountHandle, AccountParams, Address, CallHandle, CallParams, DeclineReason,
        EngineCallState, EngineError, EngineEvent, EngineEvents, EngineRegistrationState,
        SipEngine,
    },
    Credentials,
};

#[derive(Debug, Clone, Default)]
pub struct SimEngine {
    inner: Arc<Mutex<SimState>>,
}

#[derive(Debug)]
struct SimAccount {
    handle: AccountHandle,
    params: AccountParams,
    added: bool,
}

#[derive(Debug)]
struct SimCall {
    handle: CallHandle,
    remote: Address,
}

#[derive(Debug, Default)]
struct SimState {
    log_path: Option<PathBuf>,
    next_handle: u32,
    accounts: Vec<SimAccount>,
    default_account: Option<AccountHandle>,
    auth_users: Vec<String>,
    calls: Vec<SimCall>,
    pending: VecDeque<EngineEvent>,

    reject_credentials: bool,
    reject_addresses: Option<String>,
    fail_next_iterate: Option<String>,
    latency: Duration,

    accepted: Vec<CallHandle>,
    terminated: Vec<CallHandle>,
    declined: Vec<(CallHandle, DeclineReason)>,
    iterations: u64,
}

impl SimState {
    fn next_handle(&mut self) -> u32 {
        self.next_handle = self.next_handle.wrapping_add(1);
        self.next_handle
    }

    fn push_call(&mut self, call: CallHandle, state: EngineCallState, message: &str) {
        self.pending.push_back(EngineEvent::CallState {
            call,
            state,
            message: message.to_string(),
        });
    }

    fn push_registration(&mut self, account: AccountHandle, state: EngineRegistrationState, message: &str) {
        self.pending.push_back(EngineEvent::RegistrationState {
            account,
            state,
            message: message.to_string(),
        });
    }

    fn has_call(&self, call: CallHandle) -> bool {
        self.calls.iter().any(|c| c.handle == call)
    }
}

impl SimEngine {
    /// `log_path` mirrors the engine's log-collection directory; the simulator
    /// only remembers it.
    pub fn new(log_path: Option<&Path>) -> Self {
        let engine = Self::default();
        engine.state().log_path = log_path.map(Path::to_path_buf);
        engine
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn log_path(&self) -> Option<PathBuf> {
        self.state().log_path.clone()
    }

    /// Answer future registrations with `Failed` instead of `Ok`.
    pub fn set_reject_credentials(&self, reject: bool) {
        self.state().reject_credentials = reject;
    }

    /// Make `create_address` fail for URIs containing `needle`.
    pub fn reject_addresses_containing(&self, needle: &str) {
        self.state().reject_addresses = Some(needle.to_string());
    }

    /// The next `iterate` returns an engine failure.
    pub fn fail_next_iterate(&self, reason: &str) {
        self.state().fail_next_iterate = Some(reason.to_string());
    }

    /// Delay every `iterate` and `create_address` by `latency`, like an
    /// engine stuck on DNS or a slow transport.
    pub fn set_latency(&self, latency: Duration) {
        self.state().latency = latency;
    }

    fn lag(&self) {
        let latency = self.state().latency;
        if !latency.is_zero() {
            thread::sleep(latency);
        }
    }

    pub fn inject_incoming(&self, remote: &str) -> CallHandle {
        self.inject_call(remote, EngineCallState::IncomingReceived, "Incoming call")
    }

    pub fn inject_outgoing(&self, remote: &str) -> CallHandle {
        self.inject_call(remote, EngineCallState::OutgoingInit, "Starting outgoing call")
    }

    fn inject_call(&self, remote: &str, state: EngineCallState, message: &str) -> CallHandle {
        let mut st = self.state();
        let call = CallHandle(st.next_handle());
        st.calls.push(SimCall {
            handle: call,
            remote: Address::new(remote),
        });
        st.push_call(call, state, message);
        call
    }

    pub fn inject_call_state(&self, call: CallHandle, state: EngineCallState, message: &str) {
        self.state().push_call(call, state, message);
    }

    pub fn inject_registration_state(
        &self,
        account: AccountHandle,
        state: EngineRegistrationState,
        message: &str,
    ) {
        self.state().push_registration(account, state, message);
    }

    pub fn default_account(&self) -> Option<AccountHandle> {
        self.state().default_account
    }

    pub fn account_params(&self, account: AccountHandle) -> Option<AccountParams> {
        self.state()
            .accounts
            .iter()
            .find(|a| a.handle == account)
            .map(|a| a.params.clone())
    }

    pub fn auth_users(&self) -> Vec<String> {
        self.state().auth_users.clone()
    }

    pub fn accepted_calls(&self) -> Vec<CallHandle> {
        self.state().accepted.clone()
    }

    pub fn terminated_calls(&self) -> Vec<CallHandle> {
        self.state().terminated.clone()
    }

    pub fn declined_calls(&self) -> Vec<(CallHandle, DeclineReason)> {
        self.state().declined.clone()
    }

    pub fn pending_events(&self) -> usize {
        self.state().pending.len()
    }

    pub fn iterations(&self) -> u64 {
        self.state().iterations
    }
}

impl SipEngine for SimEngine {
    fn iterate(&mut self, events: &mut EngineEvents) -> Result<(), EngineError> {
        self.lag();
        let mut st = self.state();
        st.iterations += 1;

        if let Some(reason) = st.fail_next_iterate.take() {
            return Err(EngineError::Failure(reason));
        }

        while !events.is_full() {
            let Some(ev) = st.pending.pop_front() else {
                break;
            };
            // capacity was checked above
            let _ = events.push(ev);
        }
        Ok(())
    }

    fn create_address(&mut self, uri: &str) -> Result<Address, EngineError> {
        self.lag();
        let st = self.state();
        if let Some(needle) = st.reject_addresses.as_deref() {
            if uri.contains(needle) {
                return Err(EngineError::MalformedAddress(uri.to_string()));
            }
        }

        let rest = uri
            .strip_prefix("sip:")
            .ok_or_else(|| EngineError::MalformedAddress(uri.to_string()))?;
        if rest.is_empty() || rest.ends_with('@') || rest.chars().any(char::is_whitespace) {
            return Err(EngineError::MalformedAddress(uri.to_string()));
        }
        Ok(Address::new(uri))
    }

    fn add_auth_info(&mut self, credentials: &Credentials) -> Result<(), EngineError> {
        self.state().auth_users.push(credentials.username().to_string());
        Ok(())
    }

    fn create_account(&mut self, params: AccountParams) -> Result<AccountHandle, EngineError> {
        if params.identity.is_none() || params.server.is_none() {
            return Err(EngineError::Failure("account params incomplete".into()));
        }
        let mut st = self.state();
        let handle = AccountHandle(st.next_handle());
        st.accounts.push(SimAccount {
            handle,
            params,
            added: false,
        });
        Ok(handle)
    }

    fn add_account(&mut self, account: AccountHandle) -> Result<(), EngineError> {
        let mut st = self.state();
        let acct = st
            .accounts
            .iter_mut()
            .find(|a| a.handle == account)
            .ok_or(EngineError::UnknownAccount(account))?;
        acct.added = true;
        Ok(())
    }

    fn set_default_account(&mut self, account: AccountHandle) -> Result<(), EngineError> {
        let mut st = self.state();
        let register = match st.accounts.iter().find(|a| a.handle == account) {
            Some(a) if a.added => a.params.register_enabled,
            _ => return Err(EngineError::UnknownAccount(account)),
        };
        st.default_account = Some(account);

        if register {
            debug!("sim: registering {}", account);
            st.push_registration(account, EngineRegistrationState::Progress, "Registration in progress");
            if st.reject_credentials {
                st.push_registration(account, EngineRegistrationState::Failed, "Unauthorized");
            } else {
                st.push_registration(account, EngineRegistrationState::Ok, "Registration successful");
            }
        }
        Ok(())
    }

    fn call_remote_address(&self, call: CallHandle) -> Option<Address> {
        self.state()
            .calls
            .iter()
            .find(|c| c.handle == call)
            .map(|c| c.remote.clone())
    }

    fn create_call_params(&mut self, call: CallHandle) -> Result<CallParams, EngineError> {
        if !self.state().has_call(call) {
            return Err(EngineError::UnknownCall(call));
        }
        Ok(CallParams {
            audio_enabled: true,
            video_enabled: false,
            early_media: false,
        })
    }

    fn accept_call(&mut self, call: CallHandle, _params: CallParams) -> Result<(), EngineError> {
        let mut st = self.state();
        if !st.has_call(call) {
            return Err(EngineError::UnknownCall(call));
        }
        st.accepted.push(call);
        st.push_call(call, EngineCallState::Connected, "Connected");
        st.push_call(call, EngineCallState::StreamsRunning, "Streams running");
        Ok(())
    }

    fn terminate_call(&mut self, call: CallHandle) -> Result<(), EngineError> {
        let mut st = self.state();
        if !st.has_call(call) {
            return Err(EngineError::UnknownCall(call));
        }
        st.terminated.push(call);
        st.push_call(call, EngineCallState::End, "Call terminated");
        st.push_call(call, EngineCallState::Released, "Call released");
        Ok(())
    }

    fn decline_call(&mut self, call: CallHandle, reason: DeclineReason) -> Result<(), EngineError> {
        let mut st = self.state();
        if !st.has_call(call) {
            return Err(EngineError::UnknownCall(call));
        }
        st.declined.push((call, reason));
        let message = match reason {
            DeclineReason::Busy => "Busy here",
        };
        st.push_call(call, EngineCallState::End, message);
        st.push_call(call, EngineCallState::Released, "Call released");
        Ok(())
    }
}
