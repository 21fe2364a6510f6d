//! Token registry stored in a backend table.
//!
//! The provisioning tool writes one row per tenant:
//!
//! ```text
//! usertoken text PRIMARY KEY, internaltoken text, userid text,
//! comment text, expiration timestamp
//! ```
//!
//! The write time of `internaltoken` becomes the record's creation time.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::DateTime;
use cqlgate_core::TenantRecord;
use cqlgate_core::config::BackendRegistryConfig;
use cqlgate_token::{TokenError, TokenRegistry};
use std::sync::Arc;

use super::connection::BackendLogin;
use super::pool::{BackendPool, ConnectionSpec};
use crate::error::BackendError;
use crate::protocol::{Request, Response, ResultBody};

const INTERNAL_TOKEN: usize = 0;
const OWNER: usize = 1;
const COMMENT: usize = 2;
const EXPIRATION: usize = 3;
const WRITE_TIME: usize = 4;

/// Reads tenant records through the shared backend pool with an
/// administrative login.
pub struct BackendTokenRegistry {
    pool: Arc<BackendPool>,
    spec: ConnectionSpec,
    relation: String,
}

impl BackendTokenRegistry {
    pub fn new(pool: Arc<BackendPool>, config: &BackendRegistryConfig, password: String) -> Self {
        let spec = ConnectionSpec::new(
            config.protocol_version,
            vec![("CQL_VERSION".to_string(), "3.0.0".to_string())],
        )
        .with_login(BackendLogin::new(config.username.clone(), password));

        Self {
            pool,
            spec,
            relation: format!("{}.{}", config.keyspace, config.table),
        }
    }

    fn lookup_query(&self, user_token: &str) -> String {
        format!(
            "SELECT internaltoken, userid, comment, expiration, writetime(internaltoken) \
             FROM {} WHERE usertoken='{}'",
            self.relation,
            user_token.replace('\'', "''")
        )
    }

    async fn fetch(&self, user_token: &str) -> Result<Response, BackendError> {
        let mut connection = self.pool.acquire(&self.spec, None).await?;
        let query = Request::simple_query(self.spec.version, self.lookup_query(user_token));
        let response = connection.call(&query).await?;
        connection.release();
        Ok(response)
    }
}

#[async_trait]
impl TokenRegistry for BackendTokenRegistry {
    async fn lookup(&self, user_token: &str) -> Result<Option<TenantRecord>, TokenError> {
        let response = self.fetch(user_token).await.map_err(|e| {
            tracing::error!(error = %e, "Token registry lookup failed");
            TokenError::Registry(e.to_string())
        })?;

        match response {
            Response::Result(ResultBody::Rows(rows)) => rows
                .rows
                .into_iter()
                .next()
                .map(|row| record_from_row(user_token, &row))
                .transpose(),
            Response::Error(error) => Err(TokenError::Registry(error.message)),
            other => Err(TokenError::Registry(format!(
                "unexpected {:?} response",
                other.opcode()
            ))),
        }
    }
}

fn text(row: &[Option<Bytes>], index: usize) -> Result<Option<String>, TokenError> {
    match row.get(index) {
        Some(Some(bytes)) => String::from_utf8(bytes.to_vec())
            .map(Some)
            .map_err(|_| TokenError::Registry(format!("column {index} is not UTF-8"))),
        _ => Ok(None),
    }
}

fn bigint(row: &[Option<Bytes>], index: usize) -> Result<Option<i64>, TokenError> {
    match row.get(index) {
        Some(Some(bytes)) => {
            let raw: [u8; 8] = bytes[..]
                .try_into()
                .map_err(|_| TokenError::Registry(format!("column {index} is not 8 bytes")))?;
            Ok(Some(i64::from_be_bytes(raw)))
        }
        _ => Ok(None),
    }
}

fn record_from_row(user_token: &str, row: &[Option<Bytes>]) -> Result<TenantRecord, TokenError> {
    let internal_token = text(row, INTERNAL_TOKEN)?
        .ok_or_else(|| TokenError::Registry("record has no internal token".to_string()))?;
    let owner = text(row, OWNER)?.unwrap_or_default();

    let mut record = TenantRecord::new(internal_token, user_token, owner);
    record.comment = text(row, COMMENT)?;
    // An expiration at or before the epoch means the token never expires.
    record.expires_at = bigint(row, EXPIRATION)?
        .filter(|millis| *millis > 0)
        .and_then(DateTime::from_timestamp_millis);
    if let Some(created_at) = bigint(row, WRITE_TIME)?.and_then(DateTime::from_timestamp_micros) {
        record.created_at = created_at;
    }

    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cqlgate_core::BackendConfig;

    fn cell(bytes: &[u8]) -> Option<Bytes> {
        Some(Bytes::copy_from_slice(bytes))
    }

    #[test]
    fn test_record_from_row() {
        let row = vec![
            cell(b"a1111111111111111111"),
            cell(b"alice@example.com"),
            None,
            cell(&1_700_000_000_000i64.to_be_bytes()),
            cell(&1_600_000_000_000_000i64.to_be_bytes()),
        ];
        let record = record_from_row("0123456789abcdef0123", &row).unwrap();

        assert_eq!(record.internal_token, "a1111111111111111111");
        assert_eq!(record.owner_id, "alice@example.com");
        assert_eq!(record.comment, None);
        assert_eq!(record.expires_at.unwrap().timestamp(), 1_700_000_000);
        assert_eq!(record.created_at.timestamp(), 1_600_000_000);
    }

    #[test]
    fn test_epoch_expiration_never_expires() {
        let row = vec![
            cell(b"a1111111111111111111"),
            cell(b"bob"),
            cell(b"trial"),
            cell(&0i64.to_be_bytes()),
            None,
        ];
        let record = record_from_row("0123456789abcdef0123", &row).unwrap();
        assert_eq!(record.expires_at, None);
        assert_eq!(record.comment.as_deref(), Some("trial"));
    }

    #[test]
    fn test_missing_internal_token_is_an_error() {
        let row = vec![None, cell(b"bob"), None, None, None];
        assert!(matches!(
            record_from_row("0123456789abcdef0123", &row),
            Err(TokenError::Registry(_))
        ));
    }

    #[test]
    fn test_lookup_query_escapes_quotes() {
        let pool = BackendPool::new(BackendConfig::default(), 1 << 20);
        let registry = BackendTokenRegistry::new(
            pool,
            &BackendRegistryConfig::default(),
            "secret".to_string(),
        );
        let query = registry.lookup_query("x' OR 'a'='a");
        assert!(query.ends_with("WHERE usertoken='x'' OR ''a''=''a'"));
        assert!(query.contains("FROM multitenantcassandra.tokentable"));
    }
}
