use core::fmt;

use log::debug;

use crate::{account::AccountId, engine::EngineRegistrationState, event::Event};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RegistrationStatus {
    #[default]
    NotRegistered,
    InProgress,
    Registered,
    Failed(String),
    Cleared,
}

impl RegistrationStatus {
    pub fn from_engine(state: EngineRegistrationState, message: &str) -> Self {
        match state {
            EngineRegistrationState::None => RegistrationStatus::NotRegistered,
            EngineRegistrationState::Progress | EngineRegistrationState::Refreshing => {
                RegistrationStatus::InProgress
            }
            EngineRegistrationState::Ok => RegistrationStatus::Registered,
            EngineRegistrationState::Failed => RegistrationStatus::Failed(message.to_string()),
            EngineRegistrationState::Cleared => RegistrationStatus::Cleared,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            RegistrationStatus::NotRegistered => "NotRegistered",
            RegistrationStatus::InProgress => "InProgress",
            RegistrationStatus::Registered => "Registered",
            RegistrationStatus::Failed(_) => "Failed",
            RegistrationStatus::Cleared => "Cleared",
        }
    }

    /// An attempt has reached an outcome.
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            RegistrationStatus::Registered
                | RegistrationStatus::Failed(_)
                | RegistrationStatus::Cleared
        )
    }

    /// Moving to `next` would go back to an earlier stage of the same
    /// attempt, e.g. a refresh reported after `Registered`.
    pub fn regresses_to(&self, next: &RegistrationStatus) -> bool {
        self.is_settled()
            && matches!(
                next,
                RegistrationStatus::NotRegistered | RegistrationStatus::InProgress
            )
    }
}

impl fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Follows the registration status of the default account and turns
/// distinct changes into `RegistrationStateChanged` events.
#[derive(Debug, Default)]
pub struct RegistrationTracker {
    target: Option<AccountId>,
    last_observed: RegistrationStatus,
}

impl RegistrationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start following `account` and begin a new attempt. Its previous
    /// history is forgotten, so the next observed status is always a change.
    pub fn track(&mut self, account: AccountId) {
        self.target = Some(account);
        self.last_observed = RegistrationStatus::NotRegistered;
    }

    pub fn target(&self) -> Option<AccountId> {
        self.target
    }

    pub fn last_observed(&self) -> &RegistrationStatus {
        &self.last_observed
    }

    pub fn observe(
        &mut self,
        account: AccountId,
        status: RegistrationStatus,
        message: &str,
    ) -> Option<Event> {
        if self.target != Some(account) {
            debug!("registration {} for non-default {}; not surfaced", status, account);
            return None;
        }

        if self.last_observed.regresses_to(&status) {
            debug!("registration {} after {}; attempt already settled", status, self.last_observed);
            return None;
        }

        self.record(status, message)
    }

    /// A `register` that failed before the engine took the account. The
    /// failure is recorded as the outcome regardless of which account is
    /// followed.
    pub fn fail(&mut self, reason: &str) -> Option<Event> {
        self.record(RegistrationStatus::Failed(reason.to_string()), reason)
    }

    fn record(&mut self, status: RegistrationStatus, message: &str) -> Option<Event> {
        if status == self.last_observed {
            debug!("registration still {}; suppressing duplicate", status);
            return None;
        }

        self.last_observed = status.clone();
        Some(Event::RegistrationStateChanged {
            status,
            message: message.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_flow() {
        let acct = AccountId::new(1);
        let mut tracker = RegistrationTracker::new();
        tracker.track(acct);

        let ev = tracker
            .observe(acct, RegistrationStatus::InProgress, "Registration in progress")
            .unwrap();
        assert_eq!(ev.payload(), "InProgress: Registration in progress");

        let ev = tracker
            .observe(acct, RegistrationStatus::Registered, "Registration successful")
            .unwrap();
        assert_eq!(ev.name(), "RegistrationStateChanged");
        assert_eq!(tracker.last_observed(), &RegistrationStatus::Registered);
    }

    #[test]
    fn repeated_status_is_suppressed() {
        let acct = AccountId::new(1);
        let mut tracker = RegistrationTracker::new();
        tracker.track(acct);

        assert!(tracker.observe(acct, RegistrationStatus::Registered, "ok").is_some());
        assert!(tracker.observe(acct, RegistrationStatus::Registered, "ok").is_none());
        assert!(tracker.observe(acct, RegistrationStatus::Registered, "refreshed").is_none());
    }

    #[test]
    fn ignores_accounts_that_are_not_default() {
        let old = AccountId::new(1);
        let new = AccountId::new(2);
        let mut tracker = RegistrationTracker::new();
        tracker.track(old);
        tracker.track(new);

        assert!(tracker.observe(old, RegistrationStatus::Cleared, "gone").is_none());
        assert!(tracker.observe(new, RegistrationStatus::InProgress, "").is_some());
    }

    #[test]
    fn refresh_after_registered_is_silent() {
        let acct = AccountId::new(1);
        let mut tracker = RegistrationTracker::new();
        tracker.track(acct);
        tracker.observe(acct, RegistrationStatus::InProgress, "");
        tracker.observe(acct, RegistrationStatus::Registered, "ok");

        let refreshing = RegistrationStatus::from_engine(EngineRegistrationState::Refreshing, "Refreshing");
        assert!(tracker.observe(acct, refreshing, "Refreshing").is_none());
        assert!(tracker.observe(acct, RegistrationStatus::Registered, "Refreshed").is_none());
        assert!(tracker.observe(acct, RegistrationStatus::NotRegistered, "").is_none());
        assert_eq!(tracker.last_observed(), &RegistrationStatus::Registered);

        // an outcome can still change
        let ev = tracker
            .observe(acct, RegistrationStatus::Failed("408".into()), "408")
            .unwrap();
        assert_eq!(ev.payload(), "Failed: 408");
    }

    #[test]
    fn new_attempt_restarts_from_in_progress() {
        let acct = AccountId::new(1);
        let mut tracker = RegistrationTracker::new();
        tracker.track(acct);
        tracker.observe(acct, RegistrationStatus::Registered, "ok");

        tracker.track(acct);
        assert!(tracker.observe(acct, RegistrationStatus::InProgress, "again").is_some());
        assert_eq!(tracker.target(), Some(acct));
    }

    #[test]
    fn local_failure_is_recorded() {
        let acct = AccountId::new(1);
        let mut tracker = RegistrationTracker::new();
        tracker.track(acct);
        tracker.observe(acct, RegistrationStatus::Registered, "ok");

        let ev = tracker.fail("malformed address").unwrap();
        assert_eq!(ev.payload(), "Failed: malformed address");
        assert!(tracker.fail("malformed address").is_none());
        assert_eq!(
            tracker.last_observed(),
            &RegistrationStatus::Failed("malformed address".into())
        );

        // the account still being followed may report again
        assert!(tracker.observe(acct, RegistrationStatus::Registered, "ok").is_some());
    }

    #[test]
    fn maps_engine_states() {
        assert_eq!(
            RegistrationStatus::from_engine(EngineRegistrationState::Refreshing, ""),
            RegistrationStatus::InProgress
        );
        assert_eq!(
            RegistrationStatus::from_engine(EngineRegistrationState::Failed, "403 Forbidden"),
            RegistrationStatus::Failed("403 Forbidden".into())
        );
        assert_eq!(
            RegistrationStatus::from_engine(EngineRegistrationState::None, ""),
            RegistrationStatus::NotRegistered
        );
    }
}
