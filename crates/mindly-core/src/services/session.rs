//! Session state service over the identity provider.

use tokio::sync::watch;

use crate::auth::{AuthUser, IdentityProvider};

/// Authenticated-identity state published to the UI layer.
///
/// `name` and `email` cache the profile fields of the signed-in user and
/// are empty strings while signed out, so views can bind them directly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub user: Option<AuthUser>,
    pub name: String,
    pub email: String,
    pub signed_in: bool,
    /// Set when the most recent sign-in or sign-up attempt was rejected.
    /// Carries no cause; the cause is logged where it happened.
    pub last_attempt_failed: bool,
}

impl Session {
    fn from_user(user: Option<AuthUser>, last_attempt_failed: bool) -> Self {
        match user {
            Some(user) => Self {
                name: user.display_name.clone().unwrap_or_default(),
                email: user.email.clone().unwrap_or_default(),
                signed_in: true,
                last_attempt_failed,
                user: Some(user),
            },
            None => Self {
                last_attempt_failed,
                ..Self::default()
            },
        }
    }

    /// The signed-in user's id, if any.
    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        self.user.as_ref().map(|user| user.uid.as_str())
    }
}

/// Tracks who is signed in and whether the last auth attempt failed.
///
/// Each operation finishes with the session state already re-derived; the
/// new snapshot is both returned and published to watchers. Auth rejections
/// never surface as errors here, only as the failure flag.
pub struct SessionManager<P> {
    provider: P,
    state: watch::Sender<Session>,
}

impl<P: IdentityProvider> SessionManager<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            state: watch::Sender::new(Session::default()),
        }
    }

    /// Current session snapshot.
    #[must_use]
    pub fn session(&self) -> Session {
        self.state.borrow().clone()
    }

    /// Subscribe to session snapshots.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<Session> {
        self.state.subscribe()
    }

    /// Re-derive the session from the provider's current user.
    ///
    /// Cannot fail; a provider that cannot answer reads as signed out. The
    /// failure flag carries over untouched.
    pub async fn check_session(&self) -> Session {
        let last_attempt_failed = self.state.borrow().last_attempt_failed;
        let user = self.provider.current_user().await;
        self.publish(user, last_attempt_failed)
    }

    /// Sign in and refresh the session state in one step.
    pub async fn sign_in(&self, email: &str, password: &str) -> Session {
        match self.provider.sign_in(email, password).await {
            Ok(user) => self.publish(Some(user), false),
            Err(error) => {
                tracing::warn!("Sign-in attempt failed: {error}");
                let user = self.provider.current_user().await;
                self.publish(user, true)
            }
        }
    }

    /// Create an account with a display name and sign in, in one step.
    ///
    /// When account creation succeeds but the profile write fails, the
    /// provider is left with a signed-in, nameless account. The published
    /// state then reports both `signed_in` and `last_attempt_failed`.
    pub async fn sign_up(&self, name: &str, email: &str, password: &str) -> Session {
        match self.provider.sign_up(name, email, password).await {
            Ok(user) => self.publish(Some(user), false),
            Err(error) => {
                tracing::warn!("Sign-up attempt failed: {error}");
                let user = self.provider.current_user().await;
                self.publish(user, true)
            }
        }
    }

    /// Sign out and refresh the session state in one step.
    ///
    /// Provider failures are logged and otherwise ignored; the published
    /// state reflects whatever the provider reports afterwards.
    pub async fn sign_out(&self) -> Session {
        if let Err(error) = self.provider.sign_out().await {
            tracing::warn!("Sign-out failed: {error}");
        }
        let last_attempt_failed = self.state.borrow().last_attempt_failed;
        let user = self.provider.current_user().await;
        self.publish(user, last_attempt_failed)
    }

    /// Reset the failure flag, leaving identity state alone.
    pub fn clear_failure(&self) -> Session {
        let user = self.state.borrow().user.clone();
        self.publish(user, false)
    }

    fn publish(&self, user: Option<AuthUser>, last_attempt_failed: bool) -> Session {
        let session = Session::from_user(user, last_attempt_failed);
        self.state.send_replace(session.clone());
        session
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    use crate::auth::{AuthError, AuthResult};

    use super::*;

    #[derive(Clone, Default)]
    struct FakeProvider {
        state: Arc<Mutex<FakeState>>,
    }

    #[derive(Default)]
    struct FakeState {
        user: Option<AuthUser>,
        reject_credentials: bool,
        fail_display_name: bool,
        fail_sign_out: bool,
    }

    impl FakeProvider {
        fn reject_credentials(&self, reject: bool) {
            self.state.lock().unwrap().reject_credentials = reject;
        }

        fn fail_display_name(&self) {
            self.state.lock().unwrap().fail_display_name = true;
        }

        fn fail_sign_out(&self) {
            self.state.lock().unwrap().fail_sign_out = true;
        }
    }

    #[async_trait]
    impl IdentityProvider for FakeProvider {
        async fn current_user(&self) -> Option<AuthUser> {
            self.state.lock().unwrap().user.clone()
        }

        async fn sign_in(&self, email: &str, _password: &str) -> AuthResult<AuthUser> {
            let mut state = self.state.lock().unwrap();
            if state.reject_credentials {
                return Err(AuthError::Api("INVALID_PASSWORD (400)".to_string()));
            }
            let user = AuthUser {
                uid: "user-1".to_string(),
                email: Some(email.to_string()),
                display_name: Some("User One".to_string()),
            };
            state.user = Some(user.clone());
            Ok(user)
        }

        async fn sign_up(&self, name: &str, email: &str, _password: &str) -> AuthResult<AuthUser> {
            let mut state = self.state.lock().unwrap();
            if state.reject_credentials {
                return Err(AuthError::Api("EMAIL_EXISTS (400)".to_string()));
            }
            let mut user = AuthUser {
                uid: "user-1".to_string(),
                email: Some(email.to_string()),
                display_name: Some(name.to_string()),
            };
            if state.fail_display_name {
                // Account created and signed in, but the profile write failed.
                user.display_name = None;
                state.user = Some(user);
                return Err(AuthError::Api("Profile update rejected".to_string()));
            }
            state.user = Some(user.clone());
            Ok(user)
        }

        async fn sign_out(&self) -> AuthResult<()> {
            let mut state = self.state.lock().unwrap();
            if state.fail_sign_out {
                return Err(AuthError::Api("network unreachable".to_string()));
            }
            state.user = None;
            Ok(())
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn check_session_reads_provider_state() {
        let provider = FakeProvider::default();
        let manager = SessionManager::new(provider.clone());

        let session = manager.check_session().await;
        assert_eq!(session, Session::default());

        provider.sign_in("user@example.com", "secret").await.unwrap();
        let session = manager.check_session().await;
        assert!(session.signed_in);
        assert_eq!(session.name, "User One");
        assert_eq!(session.email, "user@example.com");
        assert_eq!(session.user_id(), Some("user-1"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn sign_in_returns_the_refreshed_session() {
        let manager = SessionManager::new(FakeProvider::default());

        let session = manager.sign_in("user@example.com", "secret").await;
        assert!(session.signed_in);
        assert!(!session.last_attempt_failed);
        // The returned snapshot is already the published one.
        assert_eq!(manager.session(), session);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn rejected_sign_in_sets_the_flag_only() {
        let provider = FakeProvider::default();
        provider.reject_credentials(true);
        let manager = SessionManager::new(provider.clone());

        let session = manager.sign_in("user@example.com", "wrong").await;
        assert!(!session.signed_in);
        assert!(session.last_attempt_failed);

        // A later successful attempt clears the flag.
        provider.reject_credentials(false);
        let session = manager.sign_in("user@example.com", "secret").await;
        assert!(session.signed_in);
        assert!(!session.last_attempt_failed);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn rejected_sign_in_keeps_the_existing_user() {
        let provider = FakeProvider::default();
        let manager = SessionManager::new(provider.clone());
        manager.sign_in("user@example.com", "secret").await;

        provider.reject_credentials(true);
        let session = manager.sign_in("user@example.com", "typo").await;
        assert!(session.signed_in);
        assert!(session.last_attempt_failed);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn clear_failure_resets_only_the_flag() {
        let provider = FakeProvider::default();
        provider.reject_credentials(true);
        let manager = SessionManager::new(provider);

        manager.sign_in("user@example.com", "wrong").await;
        let session = manager.clear_failure();
        assert!(!session.last_attempt_failed);
        assert!(!session.signed_in);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn check_session_carries_the_flag_across() {
        let provider = FakeProvider::default();
        provider.reject_credentials(true);
        let manager = SessionManager::new(provider);

        manager.sign_in("user@example.com", "wrong").await;
        let session = manager.check_session().await;
        assert!(session.last_attempt_failed);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn sign_up_signs_in_with_a_display_name() {
        let manager = SessionManager::new(FakeProvider::default());

        let session = manager.sign_up("User One", "user@example.com", "secret").await;
        assert!(session.signed_in);
        assert_eq!(session.name, "User One");
        assert!(!session.last_attempt_failed);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn partial_sign_up_reports_failure_while_signed_in() {
        let provider = FakeProvider::default();
        provider.fail_display_name();
        let manager = SessionManager::new(provider);

        let session = manager.sign_up("User One", "user@example.com", "secret").await;
        assert!(session.signed_in);
        assert!(session.last_attempt_failed);
        assert_eq!(session.name, "");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn sign_out_clears_the_published_identity() {
        let manager = SessionManager::new(FakeProvider::default());
        manager.sign_in("user@example.com", "secret").await;

        let session = manager.sign_out().await;
        assert!(!session.signed_in);
        assert_eq!(session.name, "");
        assert_eq!(session.email, "");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failed_sign_out_leaves_the_session_standing() {
        let provider = FakeProvider::default();
        let manager = SessionManager::new(provider.clone());
        manager.sign_in("user@example.com", "secret").await;

        provider.fail_sign_out();
        let session = manager.sign_out().await;
        assert!(session.signed_in);
        assert!(!session.last_attempt_failed);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn watchers_observe_every_published_transition() {
        let manager = SessionManager::new(FakeProvider::default());
        let mut watcher = manager.watch();

        manager.sign_in("user@example.com", "secret").await;
        watcher.changed().await.unwrap();
        assert!(watcher.borrow_and_update().signed_in);

        manager.sign_out().await;
        watcher.changed().await.unwrap();
        assert!(!watcher.borrow_and_update().signed_in);
    }
}
