//! # Credential Gateway
//!
//! Pass-through to the auth provider for sign-up, sign-in and sign-out.
//! Successful calls update the Session Guard; failures surface once, with
//! the provider's message, and are never retried.

use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::models::{AuthUser, SignUpRequest, UserMetadata};
use crate::session::SessionGuard;
use crate::traits::AuthProvider;
use crate::validation::{LoginForm, RegistrationForm};

#[derive(Clone)]
pub struct CredentialGateway {
    auth: Arc<dyn AuthProvider>,
    guard: Arc<SessionGuard>,
}

impl CredentialGateway {
    pub fn new(auth: Arc<dyn AuthProvider>, guard: Arc<SessionGuard>) -> Self {
        Self { auth, guard }
    }

    /// Creates an account with `name` as profile metadata.
    ///
    /// A returned user without identities means the address is taken; the
    /// provider does not report that as an error.
    pub async fn sign_up(&self, name: &str, email: &str, password: &str) -> Result<AuthUser> {
        let request = SignUpRequest {
            email: email.to_string(),
            password: password.to_string(),
            data: UserMetadata { name: Some(name.to_string()) },
        };
        let response = self.auth.sign_up(request).await.map_err(AppError::auth)?;

        let user = match response.user {
            Some(user) if user.identities.is_empty() => return Err(AppError::AlreadyRegistered),
            Some(user) => user,
            // A success without a user counts as a failed sign-up.
            None => return Err(AppError::Auth("sign-up returned no user".to_string())),
        };
        if let Some(session) = &response.session {
            self.guard.establish(session);
        }
        Ok(user)
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<AuthUser> {
        let session = self
            .auth
            .sign_in_with_password(email, password)
            .await
            .map_err(AppError::auth)?;
        self.guard.establish(&session);
        Ok(session.user)
    }

    pub async fn sign_out(&self) -> Result<()> {
        self.auth.sign_out().await.map_err(AppError::auth)?;
        self.guard.clear();
        Ok(())
    }

    /// Validates the registration form, then signs up.
    pub async fn register(&self, form: &RegistrationForm) -> Result<AuthUser> {
        form.validate()?;
        self.sign_up(&form.name, &form.email, &form.password).await
    }

    /// Validates the login form, then signs in.
    pub async fn login(&self, form: &LoginForm) -> Result<AuthUser> {
        form.validate()?;
        self.sign_in(&form.email, &form.password).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AuthSession, Identity, SignUpResponse};
    use crate::traits::MockAuthProvider;
    use crate::validation::MSG_PASSWORD_UPPERCASE;
    use secrecy::SecretString;

    fn user(identities: Vec<Identity>) -> AuthUser {
        AuthUser {
            id: "u1".into(),
            email: Some("ana@example.com".into()),
            user_metadata: UserMetadata { name: Some("Ana".into()) },
            identities,
        }
    }

    fn email_identity() -> Identity {
        Identity { id: "i1".into(), provider: "email".into() }
    }

    fn session() -> AuthSession {
        AuthSession {
            access_token: SecretString::from("token".to_string()),
            refresh_token: None,
            expires_at: None,
            user: user(vec![email_identity()]),
        }
    }

    fn gateway(provider: MockAuthProvider) -> (CredentialGateway, Arc<SessionGuard>) {
        let guard = Arc::new(SessionGuard::new());
        (CredentialGateway::new(Arc::new(provider), guard.clone()), guard)
    }

    #[tokio::test]
    async fn sign_up_without_identities_is_already_registered() {
        let mut provider = MockAuthProvider::new();
        provider
            .expect_sign_up()
            .returning(|_| Ok(SignUpResponse { user: Some(user(vec![])), session: None }));
        let (gateway, guard) = gateway(provider);

        let err = gateway.sign_up("Ana", "ana@example.com", "Abc123").await.unwrap_err();
        assert_eq!(err, AppError::AlreadyRegistered);
        assert!(!guard.snapshot().is_authenticated);
    }

    #[tokio::test]
    async fn sign_up_without_user_is_an_auth_error() {
        let mut provider = MockAuthProvider::new();
        provider
            .expect_sign_up()
            .returning(|_| Ok(SignUpResponse { user: None, session: None }));
        let (gateway, guard) = gateway(provider);

        let err = gateway.sign_up("Ana", "ana@example.com", "Abc123").await.unwrap_err();
        assert_eq!(err, AppError::Auth("sign-up returned no user".into()));
        assert!(!guard.snapshot().is_authenticated);
    }

    #[tokio::test]
    async fn sign_up_forwards_name_and_establishes_returned_session() {
        let mut provider = MockAuthProvider::new();
        provider
            .expect_sign_up()
            .withf(|req| req.email == "ana@example.com" && req.data.name.as_deref() == Some("Ana"))
            .returning(|_| {
                Ok(SignUpResponse { user: Some(user(vec![email_identity()])), session: Some(session()) })
            });
        let (gateway, guard) = gateway(provider);

        let created = gateway.sign_up("Ana", "ana@example.com", "Abc123").await.unwrap();
        assert_eq!(created.id, "u1");
        assert!(guard.snapshot().is_authenticated);
    }

    #[tokio::test]
    async fn provider_errors_become_auth_errors() {
        let mut provider = MockAuthProvider::new();
        provider
            .expect_sign_in_with_password()
            .times(1)
            .returning(|_, _| Err(anyhow::anyhow!("Invalid login credentials")));
        let (gateway, guard) = gateway(provider);

        let err = gateway.sign_in("ana@example.com", "wrong").await.unwrap_err();
        assert_eq!(err, AppError::Auth("Invalid login credentials".into()));
        assert!(!guard.snapshot().is_authenticated);
    }

    #[tokio::test]
    async fn sign_in_then_sign_out_moves_the_guard() {
        let mut provider = MockAuthProvider::new();
        provider.expect_sign_in_with_password().returning(|_, _| Ok(session()));
        provider.expect_sign_out().times(1).returning(|| Ok(()));
        let (gateway, guard) = gateway(provider);

        gateway.sign_in("ana@example.com", "Abc123").await.unwrap();
        assert!(guard.snapshot().is_authenticated);

        gateway.sign_out().await.unwrap();
        assert!(!guard.snapshot().is_authenticated);
    }

    #[tokio::test]
    async fn failed_sign_out_keeps_the_session() {
        let mut provider = MockAuthProvider::new();
        provider.expect_sign_in_with_password().returning(|_, _| Ok(session()));
        provider.expect_sign_out().returning(|| Err(anyhow::anyhow!("service unavailable")));
        let (gateway, guard) = gateway(provider);

        gateway.sign_in("ana@example.com", "Abc123").await.unwrap();
        let err = gateway.sign_out().await.unwrap_err();
        assert_eq!(err.to_string(), "service unavailable");
        assert!(guard.snapshot().is_authenticated);
    }

    #[test]
    fn weak_password_never_reaches_the_provider() {
        let mut provider = MockAuthProvider::new();
        provider.expect_sign_up().times(0);
        let (gateway, _) = gateway(provider);

        let form = RegistrationForm {
            name: "Ana".into(),
            email: "ana@example.com".into(),
            password: "abc123".into(),
            confirm_password: "abc123".into(),
        };
        let err = tokio_test::block_on(gateway.register(&form)).unwrap_err();
        assert_eq!(err, AppError::Validation(MSG_PASSWORD_UPPERCASE.into()));
    }
}
