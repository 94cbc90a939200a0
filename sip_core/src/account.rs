use core::fmt;

use log::info;

use crate::{
    address::{AccountIdentity, Credentials, Transport},
    engine::{AccountHandle, Address, SipEngine},
    registration::RegistrationStatus,
    Result,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AccountId(u32);

impl AccountId {
    pub(crate) fn new(id: u32) -> Self {
        Self(id)
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "acct-{}", self.0)
    }
}

#[derive(Debug)]
pub struct Account {
    id: AccountId,
    handle: AccountHandle,
    identity: AccountIdentity,
    identity_address: Address,
    server_address: Address,
    credentials: Credentials,
    pub(crate) registration: RegistrationStatus,
}

impl Account {
    pub fn id(&self) -> AccountId {
        self.id
    }

    pub fn handle(&self) -> AccountHandle {
        self.handle
    }

    pub fn identity(&self) -> &AccountIdentity {
        &self.identity
    }

    pub fn identity_address(&self) -> &Address {
        &self.identity_address
    }

    pub fn server_address(&self) -> &Address {
        &self.server_address
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn registration(&self) -> &RegistrationStatus {
        &self.registration
    }
}

/// Owns every account created through `register`. Exactly one of them, the
/// most recently registered, is the default.
#[derive(Debug)]
pub struct AccountManager {
    transport: Transport,
    accounts: Vec<Account>,
    default: Option<AccountId>,
    next_id: u32,
}

impl AccountManager {
    pub fn new(transport: Transport) -> Self {
        Self {
            transport,
            accounts: Vec::new(),
            default: None,
            next_id: 1,
        }
    }

    /// Build the identity for `username@domain`, create the account on the
    /// engine and make it the default. The engine starts registering
    /// asynchronously; its progress arrives through `iterate`.
    pub fn register<E: SipEngine + ?Sized>(
        &mut self,
        engine: &mut E,
        username: &str,
        password: &str,
        domain: &str,
    ) -> Result<AccountId> {
        let identity = AccountIdentity::new(username, domain, self.transport)?;
        let credentials = Credentials::new(username, password, domain);
        self.register_identity(engine, identity, credentials)
    }

    pub fn register_identity<E: SipEngine + ?Sized>(
        &mut self,
        engine: &mut E,
        identity: AccountIdentity,
        credentials: Credentials,
    ) -> Result<AccountId> {
        let identity_address = engine.create_address(&identity.sip_uri())?;
        let server_address = engine.create_address(&identity.server_uri())?;

        let mut params = engine.create_account_params();
        params.identity = Some(identity_address.clone());
        params.server = Some(server_address.clone());
        params.register_enabled = true;
        params.transport = identity.transport();

        engine.add_auth_info(&credentials)?;

        let handle = engine.create_account(params)?;
        engine.add_account(handle)?;
        engine.set_default_account(handle)?;

        let id = AccountId::new(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);

        info!(
            "{} registering as {} via {} ({})",
            id,
            identity_address,
            server_address,
            identity.transport()
        );

        if let Some(prev) = self.default.replace(id) {
            info!("{} replaces {} as default account", id, prev);
        }

        self.accounts.push(Account {
            id,
            handle,
            identity,
            identity_address,
            server_address,
            credentials,
            registration: RegistrationStatus::InProgress,
        });

        Ok(id)
    }

    pub fn default_id(&self) -> Option<AccountId> {
        self.default
    }

    pub fn default_account(&self) -> Option<&Account> {
        self.default.and_then(|id| self.get(id))
    }

    pub fn get(&self, id: AccountId) -> Option<&Account> {
        self.accounts.iter().find(|a| a.id == id)
    }

    pub fn by_handle_mut(&mut self, handle: AccountHandle) -> Option<&mut Account> {
        self.accounts.iter_mut().find(|a| a.handle == handle)
    }

    pub fn accounts(&self) -> impl Iterator<Item = &Account> {
        self.accounts.iter()
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{sim::SimEngine, AddressError, EngineError, SipError};

    #[test]
    fn register_builds_addresses_and_sets_default() {
        let mut engine = SimEngine::new(None);
        let mut accounts = AccountManager::new(Transport::Udp);

        let id = accounts
            .register(&mut engine, "alice", "pw", "example.com")
            .unwrap();

        let acct = accounts.default_account().unwrap();
        assert_eq!(acct.id(), id);
        assert_eq!(acct.identity_address().as_str(), "sip:alice@example.com");
        assert_eq!(acct.server_address().as_str(), "sip:example.com");
        assert_eq!(acct.registration(), &RegistrationStatus::InProgress);
        assert_eq!(acct.credentials().username(), "alice");
        assert_eq!(acct.credentials().domain(), "example.com");

        let params = engine.account_params(acct.handle()).unwrap();
        assert!(params.register_enabled);
        assert_eq!(params.transport, Transport::Udp);
        assert_eq!(engine.default_account(), Some(acct.handle()));
    }

    #[test]
    fn new_default_keeps_previous_account() {
        let mut engine = SimEngine::new(None);
        let mut accounts = AccountManager::new(Transport::Tls);

        let first = accounts.register(&mut engine, "alice", "pw", "example.com").unwrap();
        let second = accounts.register(&mut engine, "bob", "pw", "example.org").unwrap();

        assert_ne!(first, second);
        assert_eq!(accounts.len(), 2);
        assert_eq!(accounts.default_id(), Some(second));
        assert!(accounts.get(first).is_some());
        assert_eq!(
            accounts.default_account().unwrap().identity().transport(),
            Transport::Tls
        );
    }

    #[test]
    fn invalid_domain_is_rejected_before_engine() {
        let mut engine = SimEngine::new(None);
        let mut accounts = AccountManager::new(Transport::Udp);

        let err = accounts.register(&mut engine, "alice", "pw", "").unwrap_err();
        assert!(matches!(err, SipError::Address(AddressError::InvalidAddress(_))));
        assert!(accounts.is_empty());
        assert_eq!(engine.default_account(), None);
    }

    #[test]
    fn engine_address_failure_propagates() {
        let mut engine = SimEngine::new(None);
        engine.reject_addresses_containing("example.com");
        let mut accounts = AccountManager::new(Transport::Udp);

        let err = accounts
            .register(&mut engine, "alice", "pw", "example.com")
            .unwrap_err();
        assert!(matches!(err, SipError::Engine(EngineError::MalformedAddress(_))));
        assert!(accounts.default_account().is_none());
    }
}
