//! Token registry abstraction and tenant resolution.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cqlgate_core::{Namespace, TenantRecord};
use std::sync::Arc;

use crate::error::TokenError;

/// Durable mapping from user tokens to tenant records.
#[async_trait]
pub trait TokenRegistry: Send + Sync {
    /// Point read of the record for `user_token`.
    ///
    /// Returns `Ok(None)` when no record exists. Never mutates the registry.
    async fn lookup(&self, user_token: &str) -> Result<Option<TenantRecord>, TokenError>;
}

/// A tenant accepted for a new session.
#[derive(Debug, Clone)]
pub struct ResolvedTenant {
    pub record: Arc<TenantRecord>,
    pub namespace: Namespace,
}

/// Applies expiration and record validation on top of a registry.
#[derive(Clone)]
pub struct TenantResolver {
    registry: Arc<dyn TokenRegistry>,
    token_length: usize,
}

impl TenantResolver {
    /// Create a resolver validating internal tokens of `token_length` characters.
    pub fn new(registry: Arc<dyn TokenRegistry>, token_length: usize) -> Self {
        Self {
            registry,
            token_length,
        }
    }

    /// Resolve a user token now.
    pub async fn resolve(&self, user_token: &str) -> Result<ResolvedTenant, TokenError> {
        self.resolve_at(user_token, Utc::now()).await
    }

    /// Resolve a user token as of `now`.
    ///
    /// Missing and expired records both yield [`TokenError::NotFound`].
    pub async fn resolve_at(
        &self,
        user_token: &str,
        now: DateTime<Utc>,
    ) -> Result<ResolvedTenant, TokenError> {
        let record = self
            .registry
            .lookup(user_token)
            .await?
            .ok_or(TokenError::NotFound)?;

        if record.is_expired_at(now) {
            tracing::debug!(
                token = %record.redacted_user_token(),
                owner = %record.owner_id,
                "Rejected expired token"
            );
            return Err(TokenError::NotFound);
        }

        let namespace = Namespace::for_tenant(&record, self.token_length).map_err(|e| {
            tracing::error!(
                token = %record.redacted_user_token(),
                owner = %record.owner_id,
                error = %e,
                "Tenant record has an unusable internal token"
            );
            TokenError::InvalidRecord(e)
        })?;

        Ok(ResolvedTenant {
            record: Arc::new(record),
            namespace,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::StaticTokenRegistry;
    use chrono::Duration;

    const USER_TOKEN: &str = "0123456789abcdef0123";

    fn resolver(records: Vec<TenantRecord>) -> TenantResolver {
        TenantResolver::new(Arc::new(StaticTokenRegistry::from_records(records)), 20)
    }

    #[tokio::test]
    async fn test_resolve_known_token() {
        let record = TenantRecord::new("a1111111111111111111", USER_TOKEN, "alice");
        let resolved = resolver(vec![record]).resolve(USER_TOKEN).await.unwrap();
        assert_eq!(resolved.record.owner_id, "alice");
        assert_eq!(resolved.namespace.token(), "a1111111111111111111");
    }

    #[tokio::test]
    async fn test_unknown_and_expired_are_identical() {
        let now = Utc::now();
        let expired = TenantRecord::new("a1111111111111111111", USER_TOKEN, "alice")
            .with_expiration(now - Duration::minutes(1));
        let resolver = resolver(vec![expired]);

        let unknown = resolver.resolve_at("ffffffffffffffffffff", now).await;
        let expired = resolver.resolve_at(USER_TOKEN, now).await;
        assert!(matches!(unknown, Err(TokenError::NotFound)));
        assert!(matches!(expired, Err(TokenError::NotFound)));
    }

    #[tokio::test]
    async fn test_future_expiration_is_accepted() {
        let now = Utc::now();
        let record = TenantRecord::new("a1111111111111111111", USER_TOKEN, "alice")
            .with_expiration(now + Duration::days(1));
        assert!(resolver(vec![record]).resolve_at(USER_TOKEN, now).await.is_ok());
    }

    #[tokio::test]
    async fn test_malformed_internal_token_fails_closed() {
        let record = TenantRecord::new("1abc", USER_TOKEN, "mallory");
        let result = resolver(vec![record]).resolve(USER_TOKEN).await;
        assert!(matches!(result, Err(TokenError::InvalidRecord(_))));
    }
}
