//! Identity hooks consulted when a player joins.
//!
//! Credential storage and HTTP login sessions live outside this engine. The
//! engine only needs two questions answered, expressed as traits:
//!
//! - [`AccountService`]: "is this username/password pair valid?"
//! - [`IdentitySession`]: "which username does this session token belong to?"
//!
//! Both are asked at join time only, never inside a tick.

use std::collections::HashMap;
use std::future::Future;

use browsercraft_protocol::JoinRequest;

use crate::IdentityError;

/// Longest display name, in characters.
pub const MAX_NAME_LEN: usize = 16;

/// Validates a username/password pair against the account store.
///
/// The returned future must be `Send`: joins are resolved inside the
/// per-connection task, which Tokio may move between worker threads.
///
/// ```rust
/// use browsercraft_session::AccountService;
///
/// /// Accepts any password of the right length. Development only.
/// struct LenientAccounts;
///
/// impl AccountService for LenientAccounts {
///     async fn validate_credentials(&self, _username: &str, password: &str) -> bool {
///         password.len() >= 8
///     }
/// }
/// ```
pub trait AccountService: Send + Sync + 'static {
    fn validate_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> impl Future<Output = bool> + Send;
}

/// Resolves an HTTP-level session token to the logged-in username.
pub trait IdentitySession: Send + Sync + 'static {
    fn username(&self, session_token: &str) -> impl Future<Output = Option<String>> + Send;
}

/// An account store held in memory. Useful for development and tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAccounts {
    users: HashMap<String, String>,
}

impl InMemoryAccounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.users.insert(username.into(), password.into());
        self
    }
}

impl AccountService for InMemoryAccounts {
    async fn validate_credentials(&self, username: &str, password: &str) -> bool {
        self.users.get(username).is_some_and(|stored| stored == password)
    }
}

/// A session-token table held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemorySessions {
    tokens: HashMap<String, String>,
}

impl InMemorySessions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(mut self, token: impl Into<String>, username: impl Into<String>) -> Self {
        self.tokens.insert(token.into(), username.into());
        self
    }
}

impl IdentitySession for InMemorySessions {
    async fn username(&self, session_token: &str) -> Option<String> {
        self.tokens.get(session_token).cloned()
    }
}

/// Trims a display name and checks it against the naming rules:
/// 1 to [`MAX_NAME_LEN`] characters of letters, digits, `_`, `-` or space.
pub fn validate_display_name(name: &str) -> Result<String, IdentityError> {
    let trimmed = name.trim();
    let len = trimmed.chars().count();
    if len == 0 {
        return Err(IdentityError::MissingName);
    }
    if len > MAX_NAME_LEN {
        return Err(IdentityError::InvalidName(format!(
            "at most {MAX_NAME_LEN} characters"
        )));
    }
    if let Some(bad) = trimmed
        .chars()
        .find(|c| !(c.is_alphanumeric() || matches!(c, '_' | '-' | ' ')))
    {
        return Err(IdentityError::InvalidName(format!("character {bad:?} not allowed")));
    }
    Ok(trimmed.to_owned())
}

/// Works out the display name for a join request.
///
/// The first identification the request carries decides:
/// 1. `session_token` → [`IdentitySession::username`]
/// 2. `credentials` → [`AccountService::validate_credentials`]
/// 3. `name` → guest name, if `allow_guests`
pub async fn resolve_display_name<A, I>(
    request: &JoinRequest,
    accounts: &A,
    identity: &I,
    allow_guests: bool,
) -> Result<String, IdentityError>
where
    A: AccountService,
    I: IdentitySession,
{
    if let Some(token) = &request.session_token {
        let username = identity
            .username(token)
            .await
            .ok_or(IdentityError::UnknownSession)?;
        return validate_display_name(&username);
    }

    if let Some(creds) = &request.credentials {
        if !accounts
            .validate_credentials(&creds.username, &creds.password)
            .await
        {
            return Err(IdentityError::InvalidCredentials);
        }
        return validate_display_name(&creds.username);
    }

    match &request.name {
        Some(name) if allow_guests => validate_display_name(name),
        Some(_) => Err(IdentityError::GuestsNotAllowed),
        None => Err(IdentityError::MissingName),
    }
}

#[cfg(test)]
mod tests {
    use browsercraft_protocol::Credentials;

    use super::*;

    fn collaborators() -> (InMemoryAccounts, InMemorySessions) {
        (
            InMemoryAccounts::new().with_user("ada", "correct horse"),
            InMemorySessions::new().with_session("tok-1", "ada"),
        )
    }

    #[test]
    fn test_validate_display_name_trims() {
        assert_eq!(validate_display_name("  Ada ").unwrap(), "Ada");
    }

    #[test]
    fn test_validate_display_name_rules() {
        assert_eq!(validate_display_name("   "), Err(IdentityError::MissingName));
        assert!(matches!(
            validate_display_name("a_very_long_name_indeed"),
            Err(IdentityError::InvalidName(_))
        ));
        assert!(matches!(
            validate_display_name("<script>"),
            Err(IdentityError::InvalidName(_))
        ));
        assert!(validate_display_name("Bo-2 the_3rd").is_ok());
    }

    #[tokio::test]
    async fn test_session_token_resolves_name() {
        let (accounts, sessions) = collaborators();
        let req = JoinRequest {
            session_token: Some("tok-1".into()),
            name: Some("ignored".into()),
            ..JoinRequest::default()
        };
        let name = resolve_display_name(&req, &accounts, &sessions, false).await;
        assert_eq!(name.unwrap(), "ada");
    }

    #[tokio::test]
    async fn test_unknown_session_token_is_rejected() {
        let (accounts, sessions) = collaborators();
        let req = JoinRequest {
            session_token: Some("stale".into()),
            ..JoinRequest::default()
        };
        let result = resolve_display_name(&req, &accounts, &sessions, true).await;
        assert_eq!(result, Err(IdentityError::UnknownSession));
    }

    #[tokio::test]
    async fn test_credentials_are_checked() {
        let (accounts, sessions) = collaborators();
        let good = JoinRequest {
            credentials: Some(Credentials {
                username: "ada".into(),
                password: "correct horse".into(),
            }),
            ..JoinRequest::default()
        };
        assert_eq!(
            resolve_display_name(&good, &accounts, &sessions, false).await.unwrap(),
            "ada"
        );

        let bad = JoinRequest {
            credentials: Some(Credentials {
                username: "ada".into(),
                password: "battery staple".into(),
            }),
            ..JoinRequest::default()
        };
        assert_eq!(
            resolve_display_name(&bad, &accounts, &sessions, true).await,
            Err(IdentityError::InvalidCredentials)
        );
    }

    #[tokio::test]
    async fn test_guest_names_depend_on_config() {
        let (accounts, sessions) = collaborators();
        let req = JoinRequest {
            name: Some("Ada".into()),
            ..JoinRequest::default()
        };
        assert_eq!(
            resolve_display_name(&req, &accounts, &sessions, true).await.unwrap(),
            "Ada"
        );
        assert_eq!(
            resolve_display_name(&req, &accounts, &sessions, false).await,
            Err(IdentityError::GuestsNotAllowed)
        );
        assert_eq!(
            resolve_display_name(&JoinRequest::default(), &accounts, &sessions, true).await,
            Err(IdentityError::MissingName)
        );
    }
}
