//! Client credentials carrying a user token.

use std::fmt;

use crate::error::TokenError;

/// Credentials presented by a client, split into their parts.
#[derive(Clone, PartialEq, Eq)]
pub struct GatewayCredentials {
    /// Public user token (the first `user_token_length` characters of the username).
    pub user_token: String,
    /// Backend principal inside the tenant's namespace.
    pub principal: String,
    /// Password forwarded to the backend.
    pub password: String,
}

impl fmt::Debug for GatewayCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayCredentials")
            .field("user_token", &cqlgate_core::tenant::redact_token(&self.user_token))
            .field("principal", &self.principal)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl GatewayCredentials {
    /// Split `username` into user token and principal.
    pub fn parse(
        username: &str,
        password: &str,
        user_token_length: usize,
    ) -> Result<Self, TokenError> {
        let split = username
            .char_indices()
            .nth(user_token_length)
            .map(|(index, _)| index)
            .ok_or_else(|| {
                TokenError::MalformedCredentials("token + username is too short".to_string())
            })?;

        let (user_token, principal) = username.split_at(split);

        Ok(Self {
            user_token: user_token.to_string(),
            principal: principal.to_string(),
            password: password.to_string(),
        })
    }

    /// Credentials from a protocol v1 CREDENTIALS map.
    pub fn from_map<'a, I>(entries: I, user_token_length: usize) -> Result<Self, TokenError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut username = None;
        let mut password = None;
        for (key, value) in entries {
            match key {
                "username" => username = Some(value),
                "password" => password = Some(value),
                _ => {}
            }
        }

        match (username, password) {
            (Some(username), Some(password)) => Self::parse(username, password, user_token_length),
            _ => Err(TokenError::MalformedCredentials(
                "no credentials supplied".to_string(),
            )),
        }
    }

    /// Credentials from a SASL PLAIN response (`authzid NUL authcid NUL password`).
    pub fn from_sasl_plain(payload: &[u8], user_token_length: usize) -> Result<Self, TokenError> {
        let mut parts = payload.split(|b| *b == 0);
        let (Some(_authzid), Some(authcid), Some(password), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(TokenError::MalformedCredentials(
                "SASL PLAIN response must have three fields".to_string(),
            ));
        };

        let username = std::str::from_utf8(authcid).map_err(|_| {
            TokenError::MalformedCredentials("username is not valid UTF-8".to_string())
        })?;
        let password = std::str::from_utf8(password).map_err(|_| {
            TokenError::MalformedCredentials("password is not valid UTF-8".to_string())
        })?;

        Self::parse(username, password, user_token_length)
    }

    /// SASL PLAIN encoding of a backend login.
    pub fn sasl_plain(username: &str, password: &str) -> Vec<u8> {
        let mut payload = Vec::with_capacity(username.len() + password.len() + 2);
        payload.push(0);
        payload.extend_from_slice(username.as_bytes());
        payload.push(0);
        payload.extend_from_slice(password.as_bytes());
        payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: &str = "0123456789abcdef0123";

    #[test]
    fn test_parse_splits_token_and_principal() {
        let creds = GatewayCredentials::parse(&format!("{TOKEN}cassandra"), "cassandra", 20).unwrap();
        assert_eq!(creds.user_token, TOKEN);
        assert_eq!(creds.principal, "cassandra");
        assert_eq!(creds.password, "cassandra");
    }

    #[test]
    fn test_parse_requires_principal() {
        assert!(matches!(
            GatewayCredentials::parse(TOKEN, "pw", 20),
            Err(TokenError::MalformedCredentials(_))
        ));
        assert!(GatewayCredentials::parse("short", "pw", 20).is_err());
    }

    #[test]
    fn test_parse_multibyte_username() {
        let creds = GatewayCredentials::parse("ééx", "pw", 2).unwrap();
        assert_eq!(creds.user_token, "éé");
        assert_eq!(creds.principal, "x");
    }

    #[test]
    fn test_from_map() {
        let username = format!("{TOKEN}alice");
        let entries = vec![("username", username.as_str()), ("password", "pw")];
        let creds = GatewayCredentials::from_map(entries, 20).unwrap();
        assert_eq!(creds.principal, "alice");

        let missing = vec![("username", username.as_str())];
        assert!(GatewayCredentials::from_map(missing, 20).is_err());
    }

    #[test]
    fn test_sasl_plain_round_trip() {
        let username = format!("{TOKEN}cassandra");
        let payload = GatewayCredentials::sasl_plain(&username, "secret");
        let creds = GatewayCredentials::from_sasl_plain(&payload, 20).unwrap();
        assert_eq!(creds.user_token, TOKEN);
        assert_eq!(creds.principal, "cassandra");
        assert_eq!(creds.password, "secret");
    }

    #[test]
    fn test_sasl_plain_rejects_wrong_shape() {
        assert!(GatewayCredentials::from_sasl_plain(b"no-separators", 20).is_err());
        assert!(GatewayCredentials::from_sasl_plain(b"\0a\0b\0c", 20).is_err());
    }

    #[test]
    fn test_debug_hides_password() {
        let creds = GatewayCredentials::parse(&format!("{TOKEN}cassandra"), "hunter2", 20).unwrap();
        let rendered = format!("{creds:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains(TOKEN));
    }
}
