//! # Session Guard
//!
//! Holds the authenticated/anonymous state of the client and decides, per
//! route, whether a view may render, must show the loading placeholder, or
//! must redirect.

use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};

use crate::models::{AuthSession, AuthUser};
use crate::traits::AuthProvider;

pub const LOGIN_PATH: &str = "/login";
pub const HOME_PATH: &str = "/";

#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    /// The provider has not answered yet.
    Loading,
    Anonymous,
    Authenticated {
        user: AuthUser,
        expires_at: Option<DateTime<Utc>>,
    },
}

/// What a route policy needs to know.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub is_authenticated: bool,
    pub is_loading: bool,
}

pub struct SessionGuard {
    state: RwLock<SessionState>,
}

impl Default for SessionGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionGuard {
    /// Starts in `Loading` until `resolve` or `establish` runs.
    pub fn new() -> Self {
        Self { state: RwLock::new(SessionState::Loading) }
    }

    /// Reads the provider's current session. Provider failures resolve to
    /// anonymous.
    pub async fn resolve(&self, provider: &dyn AuthProvider) {
        let next = match provider.current_session().await {
            Ok(Some(session)) => authenticated(&session),
            Ok(None) => SessionState::Anonymous,
            Err(e) => {
                log::warn!("session lookup failed, continuing anonymous: {e}");
                SessionState::Anonymous
            }
        };
        self.set(next);
    }

    pub fn establish(&self, session: &AuthSession) {
        log::info!("session established for user {}", session.user.id);
        self.set(authenticated(session));
    }

    pub fn clear(&self) {
        log::info!("session cleared");
        self.set(SessionState::Anonymous);
    }

    pub fn state(&self) -> SessionState {
        self.state.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn user(&self) -> Option<AuthUser> {
        match self.state() {
            SessionState::Authenticated { user, expires_at } if !expired(expires_at, Utc::now()) => Some(user),
            _ => None,
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot_at(Utc::now())
    }

    /// Like [`snapshot`](Self::snapshot), but a session past its expiry is
    /// first re-read from the provider, which may have refreshed it.
    pub async fn refreshed_snapshot(&self, provider: &dyn AuthProvider) -> SessionSnapshot {
        self.refreshed_snapshot_at(provider, Utc::now()).await
    }

    pub async fn refreshed_snapshot_at(&self, provider: &dyn AuthProvider, now: DateTime<Utc>) -> SessionSnapshot {
        let stale = matches!(
            self.state(),
            SessionState::Authenticated { expires_at, .. } if expired(expires_at, now)
        );
        if stale {
            log::debug!("session expired, asking the provider again");
            self.resolve(provider).await;
        }
        self.snapshot_at(now)
    }

    /// An expired session reads as anonymous.
    pub fn snapshot_at(&self, now: DateTime<Utc>) -> SessionSnapshot {
        match self.state() {
            SessionState::Loading => SessionSnapshot { is_authenticated: false, is_loading: true },
            SessionState::Anonymous => SessionSnapshot { is_authenticated: false, is_loading: false },
            SessionState::Authenticated { expires_at, .. } => SessionSnapshot {
                is_authenticated: !expired(expires_at, now),
                is_loading: false,
            },
        }
    }

    fn set(&self, next: SessionState) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = next;
    }
}

fn authenticated(session: &AuthSession) -> SessionState {
    SessionState::Authenticated { user: session.user.clone(), expires_at: session.expires_at }
}

fn expired(expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    expires_at.is_some_and(|at| at <= now)
}

/// Outcome of a route policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Render the loading placeholder.
    Loading,
    Allow,
    Redirect(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutePolicy {
    /// Only for signed-in users; others go to the login page.
    Private,
    /// Only for anonymous users; signed-in users go home.
    Public,
}

impl RoutePolicy {
    pub fn decide(self, session: SessionSnapshot) -> Access {
        if session.is_loading {
            return Access::Loading;
        }
        match (self, session.is_authenticated) {
            (Self::Private, true) | (Self::Public, false) => Access::Allow,
            (Self::Private, false) => Access::Redirect(LOGIN_PATH),
            (Self::Public, true) => Access::Redirect(HOME_PATH),
        }
    }
}

/// Named routes of the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Login,
    Register,
    Logout,
    Dashboard,
    Tasks,
    Profile,
    Settings,
    NotFound,
}

impl Route {
    pub fn from_path(path: &str) -> Self {
        match path {
            "/login" => Self::Login,
            "/register" => Self::Register,
            "/logout" => Self::Logout,
            "/" => Self::Dashboard,
            "/tasks" => Self::Tasks,
            "/profile" => Self::Profile,
            "/settings" => Self::Settings,
            _ => Self::NotFound,
        }
    }

    pub fn path(&self) -> Option<&'static str> {
        match self {
            Self::Login => Some("/login"),
            Self::Register => Some("/register"),
            Self::Logout => Some("/logout"),
            Self::Dashboard => Some("/"),
            Self::Tasks => Some("/tasks"),
            Self::Profile => Some("/profile"),
            Self::Settings => Some("/settings"),
            Self::NotFound => None,
        }
    }

    /// The not-found route is not guarded.
    pub fn policy(&self) -> Option<RoutePolicy> {
        match self {
            Self::Login | Self::Register => Some(RoutePolicy::Public),
            Self::Logout | Self::Dashboard | Self::Tasks | Self::Profile | Self::Settings => {
                Some(RoutePolicy::Private)
            }
            Self::NotFound => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserMetadata;
    use crate::traits::MockAuthProvider;
    use chrono::Duration;
    use secrecy::SecretString;

    fn user() -> AuthUser {
        AuthUser {
            id: "u1".into(),
            email: Some("ana@example.com".into()),
            user_metadata: UserMetadata { name: Some("Ana".into()) },
            identities: vec![],
        }
    }

    fn session(expires_at: Option<DateTime<Utc>>) -> AuthSession {
        AuthSession {
            access_token: SecretString::from("token".to_string()),
            refresh_token: None,
            expires_at,
            user: user(),
        }
    }

    #[test]
    fn loading_renders_placeholder_under_both_policies() {
        for is_authenticated in [true, false] {
            let snapshot = SessionSnapshot { is_authenticated, is_loading: true };
            assert_eq!(RoutePolicy::Private.decide(snapshot), Access::Loading);
            assert_eq!(RoutePolicy::Public.decide(snapshot), Access::Loading);
        }
    }

    #[test]
    fn resolved_sessions_are_routed() {
        let anon = SessionSnapshot { is_authenticated: false, is_loading: false };
        let signed_in = SessionSnapshot { is_authenticated: true, is_loading: false };

        assert_eq!(RoutePolicy::Private.decide(anon), Access::Redirect("/login"));
        assert_eq!(RoutePolicy::Private.decide(signed_in), Access::Allow);
        assert_eq!(RoutePolicy::Public.decide(anon), Access::Allow);
        assert_eq!(RoutePolicy::Public.decide(signed_in), Access::Redirect("/"));
    }

    #[test]
    fn route_table() {
        assert_eq!(Route::from_path("/tasks").policy(), Some(RoutePolicy::Private));
        assert_eq!(Route::from_path("/register").policy(), Some(RoutePolicy::Public));
        assert_eq!(Route::from_path("/nope"), Route::NotFound);
        assert_eq!(Route::NotFound.policy(), None);
        assert_eq!(Route::Settings.path(), Some("/settings"));
        assert_eq!(Route::from_path("/logout"), Route::Logout);
        assert_eq!(Route::Logout.policy(), Some(RoutePolicy::Private));
    }

    #[test]
    fn guard_starts_loading_and_tracks_session() {
        let guard = SessionGuard::new();
        assert!(guard.snapshot().is_loading);

        guard.establish(&session(None));
        assert_eq!(guard.snapshot(), SessionSnapshot { is_authenticated: true, is_loading: false });
        assert_eq!(guard.user().map(|u| u.id), Some("u1".to_string()));

        guard.clear();
        assert_eq!(guard.snapshot(), SessionSnapshot { is_authenticated: false, is_loading: false });
        assert!(guard.user().is_none());
    }

    #[test]
    fn expired_token_reads_as_anonymous() {
        let now = Utc::now();
        let guard = SessionGuard::new();
        guard.establish(&session(Some(now + Duration::minutes(5))));

        assert!(guard.snapshot_at(now).is_authenticated);
        assert!(!guard.snapshot_at(now + Duration::minutes(6)).is_authenticated);
    }

    #[tokio::test]
    async fn resolve_uses_provider_session() {
        let mut provider = MockAuthProvider::new();
        provider.expect_current_session().times(1).returning(|| Ok(Some(session(None))));

        let guard = SessionGuard::new();
        guard.resolve(&provider).await;
        assert!(guard.snapshot().is_authenticated);
    }

    #[tokio::test]
    async fn provider_failure_resolves_anonymous() {
        let mut provider = MockAuthProvider::new();
        provider
            .expect_current_session()
            .returning(|| Err(anyhow::anyhow!("network unreachable")));

        let guard = SessionGuard::new();
        guard.resolve(&provider).await;
        assert_eq!(guard.state(), SessionState::Anonymous);
    }

    #[tokio::test]
    async fn expired_session_picks_up_provider_refresh() {
        let now = Utc::now();
        let mut provider = MockAuthProvider::new();
        provider
            .expect_current_session()
            .times(1)
            .returning(move || Ok(Some(session(Some(now + Duration::hours(1))))));

        let guard = SessionGuard::new();
        guard.establish(&session(Some(now + Duration::seconds(1))));

        let later = now + Duration::seconds(2);
        assert!(!guard.snapshot_at(later).is_authenticated);
        assert!(guard.refreshed_snapshot_at(&provider, later).await.is_authenticated);
        assert!(guard.snapshot_at(later).is_authenticated);
    }

    #[tokio::test]
    async fn live_session_does_not_ask_the_provider() {
        let mut provider = MockAuthProvider::new();
        provider.expect_current_session().times(0);

        let guard = SessionGuard::new();
        guard.establish(&session(Some(Utc::now() + Duration::hours(1))));
        assert!(guard.refreshed_snapshot(&provider).await.is_authenticated);
    }

    #[tokio::test]
    async fn expired_session_without_refresh_reads_anonymous() {
        let now = Utc::now();
        let mut provider = MockAuthProvider::new();
        provider.expect_current_session().times(1).returning(|| Ok(None));

        let guard = SessionGuard::new();
        guard.establish(&session(Some(now - Duration::seconds(1))));
        let snapshot = guard.refreshed_snapshot_at(&provider, now).await;
        assert_eq!(snapshot, SessionSnapshot { is_authenticated: false, is_loading: false });
        assert_eq!(guard.state(), SessionState::Anonymous);
    }
}
