/// CAS single sign-on login and credential sources.
use async_trait::async_trait;
use dialoguer::{Input, Password};
use tracing::{debug, info};

use lectern_shared::auth::{AuthSession, Authenticator, CredentialProvider, Credentials};
use lectern_shared::config::Config;
use lectern_shared::errors::AuthError;

use crate::html;

/// Text the CAS server shows after a successful login.
const LOGIN_SUCCESS_MARKER: &str = "Log In Successful";

/// Logs into a CAS server, then visits the media portal so its
/// single-sign-on cookies are in the session's jar.
#[derive(Debug, Clone)]
pub struct CasAuthenticator {
    login_url: String,
    media_url: String,
}

impl CasAuthenticator {
    pub fn new(login_url: &str, media_url: &str) -> Self {
        Self {
            login_url: login_url.trim_end_matches('/').to_string(),
            media_url: media_url.trim_end_matches('/').to_string(),
        }
    }

    fn form_url(&self) -> String {
        format!("{}/cas/login", self.login_url)
    }
}

fn unreachable(e: reqwest::Error) -> AuthError {
    AuthError::Unreachable(e.to_string())
}

#[async_trait]
impl Authenticator for CasAuthenticator {
    async fn login(&self, credentials: &Credentials) -> Result<AuthSession, AuthError> {
        // Fresh jar per attempt so a half-finished login leaves nothing behind.
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .build()
            .map_err(unreachable)?;

        let form_url = self.form_url();
        debug!("Fetching login form {}", form_url);
        let page = client
            .get(&form_url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(unreachable)?
            .text()
            .await
            .map_err(unreachable)?;

        let lt = html::input_value(&page, "lt").ok_or(AuthError::MissingFormField("lt"))?;
        let execution =
            html::input_value(&page, "execution").ok_or(AuthError::MissingFormField("execution"))?;

        let body = client
            .post(&form_url)
            .form(&[
                ("username", credentials.username.as_str()),
                ("password", credentials.password.as_str()),
                ("lt", lt.as_str()),
                ("execution", execution.as_str()),
                ("_eventId", "submit"),
                ("submit", "Login"),
            ])
            .send()
            .await
            .map_err(unreachable)?
            .text()
            .await
            .map_err(unreachable)?;

        if !body.contains(LOGIN_SUCCESS_MARKER) {
            return Err(AuthError::Rejected);
        }

        client
            .get(format!("{}/", self.media_url))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(unreachable)?;

        info!("Signed in to {}", self.media_url);
        Ok(AuthSession::new(client))
    }
}

/// Asks the operator on the terminal for each attempt.
#[derive(Debug, Clone, Default)]
pub struct PromptCredentials {
    username: Option<String>,
}

impl PromptCredentials {
    /// `username`, when given, is offered as the default answer.
    pub fn new(username: Option<String>) -> Self {
        Self { username }
    }
}

impl CredentialProvider for PromptCredentials {
    fn credentials(&self, attempt: u32) -> Result<Credentials, AuthError> {
        debug!("Prompting for credentials (attempt {})", attempt);
        tokio::task::block_in_place(|| {
            let mut input = Input::<String>::new().with_prompt("Username");
            if let Some(username) = &self.username {
                input = input.default(username.clone());
            }
            let username = input
                .interact_text()
                .map_err(|e| AuthError::Credentials(e.to_string()))?;
            let password = Password::new()
                .with_prompt("Password")
                .interact()
                .map_err(|e| AuthError::Credentials(e.to_string()))?;
            Ok(Credentials::new(username, password))
        })
    }
}

/// Fixed credentials, typically from `LECTERN_USERNAME`/`LECTERN_PASSWORD`.
#[derive(Debug, Clone)]
pub struct EnvCredentials {
    credentials: Credentials,
}

impl EnvCredentials {
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }
}

impl CredentialProvider for EnvCredentials {
    fn credentials(&self, _attempt: u32) -> Result<Credentials, AuthError> {
        Ok(self.credentials.clone())
    }
}

/// Environment credentials when both are configured, the terminal prompt
/// otherwise.
pub fn provider_from_config(config: &Config) -> Box<dyn CredentialProvider> {
    match (&config.username, &config.password) {
        (Some(username), Some(password)) => {
            info!("Using credentials from the environment for {}", username);
            Box::new(EnvCredentials::new(Credentials::new(username.clone(), password.clone())))
        }
        _ => Box::new(PromptCredentials::new(config.username.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(username: Option<&str>, password: Option<&str>) -> Config {
        let mut config = Config::from_lookup(|_| None).unwrap();
        config.username = username.map(str::to_string);
        config.password = password.map(str::to_string);
        config
    }

    #[test]
    fn test_env_credentials_are_stable() {
        let provider = EnvCredentials::new(Credentials::new("a1234567", "pw"));
        assert_eq!(provider.credentials(1).unwrap(), provider.credentials(3).unwrap());
    }

    #[test]
    fn test_provider_from_config_uses_environment() {
        let provider = provider_from_config(&config(Some("a1234567"), Some("pw")));
        let credentials = provider.credentials(1).unwrap();
        assert_eq!(credentials.username, "a1234567");
        assert_eq!(credentials.password, "pw");
    }

    #[test]
    fn test_form_url_trims_trailing_slash() {
        let auth = CasAuthenticator::new("https://login.example.edu/", "https://media.example.edu/");
        assert_eq!(auth.form_url(), "https://login.example.edu/cas/login");
    }
}
