/// Authenticated portal sessions and the login retry loop.
use std::fmt;

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::errors::AuthError;

/// Default number of login attempts before a run is abandoned.
pub const DEFAULT_LOGIN_ATTEMPTS: u32 = 3;

/// An authenticated HTTP session.
///
/// Established once per run and shared read-only by every request after it.
/// It is never refreshed; an expired session surfaces as request failures.
#[derive(Clone)]
pub struct AuthSession {
    client: reqwest::Client,
}

impl AuthSession {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }
}

impl fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSession").finish_non_exhaustive()
    }
}

/// Username and password for one login attempt.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"********")
            .finish()
    }
}

/// Supplies credentials for each login attempt (interactive prompt,
/// environment, fixed values in tests).
pub trait CredentialProvider: Send + Sync {
    /// Credentials for attempt number `attempt` (starting at 1).
    fn credentials(&self, attempt: u32) -> Result<Credentials, AuthError>;
}

/// Logs into the remote portal.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn login(&self, credentials: &Credentials) -> Result<AuthSession, AuthError>;
}

/// Log in, asking for fresh credentials on every attempt, up to
/// `max_attempts` tries.
pub async fn login_with_retries<A, C>(
    authenticator: &A,
    provider: &C,
    max_attempts: u32,
) -> Result<AuthSession, AuthError>
where
    A: Authenticator + ?Sized,
    C: CredentialProvider + ?Sized,
{
    let max_attempts = max_attempts.max(1);

    for attempt in 1..=max_attempts {
        let credentials = provider.credentials(attempt)?;
        match authenticator.login(&credentials).await {
            Ok(session) => {
                info!("Login succeeded for {}", credentials.username);
                return Ok(session);
            }
            Err(e) if e.is_retriable() => {
                let remaining = max_attempts - attempt;
                if remaining > 0 {
                    warn!(
                        "Login failed ({}) - {} attempt{} remaining",
                        e,
                        remaining,
                        if remaining > 1 { "s" } else { "" }
                    );
                } else {
                    error!("Login failed ({}) - exiting", e);
                }
            }
            Err(e) => return Err(e),
        }
    }

    Err(AuthError::AttemptsExhausted(max_attempts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Accepts only the password "secret".
    struct FakePortal {
        logins: AtomicU32,
    }

    #[async_trait]
    impl Authenticator for FakePortal {
        async fn login(&self, credentials: &Credentials) -> Result<AuthSession, AuthError> {
            self.logins.fetch_add(1, Ordering::SeqCst);
            if credentials.password == "secret" {
                Ok(AuthSession::new(reqwest::Client::new()))
            } else {
                Err(AuthError::Rejected)
            }
        }
    }

    /// Hands out passwords from a script, one per attempt.
    struct Scripted {
        passwords: Mutex<Vec<&'static str>>,
        asked: Mutex<Vec<u32>>,
    }

    impl Scripted {
        fn new(passwords: Vec<&'static str>) -> Self {
            Self {
                passwords: Mutex::new(passwords),
                asked: Mutex::new(Vec::new()),
            }
        }
    }

    impl CredentialProvider for Scripted {
        fn credentials(&self, attempt: u32) -> Result<Credentials, AuthError> {
            self.asked.lock().unwrap().push(attempt);
            let mut passwords = self.passwords.lock().unwrap();
            if passwords.is_empty() {
                return Err(AuthError::Credentials("no more input".into()));
            }
            Ok(Credentials::new("a1234567", passwords.remove(0)))
        }
    }

    #[tokio::test]
    async fn test_succeeds_on_later_attempt() {
        let portal = FakePortal { logins: AtomicU32::new(0) };
        let provider = Scripted::new(vec!["wrong", "secret"]);
        let session = login_with_retries(&portal, &provider, 3).await;
        assert!(session.is_ok());
        assert_eq!(portal.logins.load(Ordering::SeqCst), 2);
        assert_eq!(*provider.asked.lock().unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_budget_exhausted() {
        let portal = FakePortal { logins: AtomicU32::new(0) };
        let provider = Scripted::new(vec!["a", "b", "c", "secret"]);
        let err = login_with_retries(&portal, &provider, DEFAULT_LOGIN_ATTEMPTS)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::AttemptsExhausted(3)));
        assert_eq!(portal.logins.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_credential_failure_aborts_immediately() {
        let portal = FakePortal { logins: AtomicU32::new(0) };
        let provider = Scripted::new(vec![]);
        let err = login_with_retries(&portal, &provider, 3).await.unwrap_err();
        assert!(matches!(err, AuthError::Credentials(_)));
        assert_eq!(portal.logins.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_debug_redacts_password() {
        let creds = Credentials::new("a1234567", "hunter2");
        let shown = format!("{:?}", creds);
        assert!(shown.contains("a1234567"));
        assert!(!shown.contains("hunter2"));
    }
}
