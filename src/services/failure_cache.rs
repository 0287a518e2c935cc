use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

use crate::errors::GatewayError;

#[derive(Debug, Clone)]
pub struct FailureInfo {
    pub failed_at: DateTime<Utc>,
    pub failure_type: FailureType,
    pub ttl: Duration,
}

impl FailureInfo {
    fn expires_at(&self) -> DateTime<Utc> {
        self.failed_at + self.ttl
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// Symbol unknown to the provider
    NotFound,
    RateLimited,
    ApiError,
}

impl FailureType {
    pub fn ttl(&self) -> Duration {
        match self {
            FailureType::NotFound => Duration::hours(24),
            FailureType::RateLimited => Duration::minutes(5),
            FailureType::ApiError => Duration::minutes(15),
        }
    }
}

impl From<&GatewayError> for FailureType {
    fn from(err: &GatewayError) -> Self {
        match err {
            GatewayError::NotFound(_) => FailureType::NotFound,
            GatewayError::RateLimited | GatewayError::QuotaExceeded => FailureType::RateLimited,
            _ => FailureType::ApiError,
        }
    }
}

/// Remembers lookups that recently failed so they are not retried on every
/// request. Keys are free-form (`quote:AAPL`, `profile:MSFT`).
#[derive(Clone, Default)]
pub struct FailureCache {
    cache: Arc<DashMap<String, FailureInfo>>,
}

impl FailureCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The live failure for `key`, if any. Expired entries are evicted.
    pub fn is_failed(&self, key: &str) -> Option<FailureInfo> {
        let info = self.cache.get(key).map(|e| e.value().clone())?;
        if Utc::now() < info.expires_at() {
            return Some(info);
        }
        self.cache.remove(key);
        None
    }

    pub fn record_failure(&self, key: &str, failure_type: FailureType) {
        let info = FailureInfo {
            failed_at: Utc::now(),
            failure_type,
            ttl: failure_type.ttl(),
        };
        self.cache.insert(key.to_string(), info);
    }

    pub fn clear(&self, key: &str) {
        self.cache.remove(key);
    }

    /// Drops expired entries; returns how many were removed.
    pub fn cleanup_expired(&self) -> usize {
        let before = self.cache.len();
        let now = Utc::now();
        self.cache.retain(|_, info| now < info.expires_at());
        before.saturating_sub(self.cache.len())
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    #[cfg(test)]
    fn insert_raw(&self, key: &str, info: FailureInfo) {
        self.cache.insert(key.to_string(), info);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_records_and_retrieves_failures() {
        let cache = FailureCache::new();
        cache.record_failure("quote:INVALID", FailureType::NotFound);

        let result = cache.is_failed("quote:INVALID");
        assert_eq!(result.unwrap().failure_type, FailureType::NotFound);
    }

    #[test]
    fn test_cache_clears_key() {
        let cache = FailureCache::new();
        cache.record_failure("quote:TEST", FailureType::ApiError);
        cache.clear("quote:TEST");
        assert!(cache.is_failed("quote:TEST").is_none());
    }

    #[test]
    fn test_gateway_errors_map_to_failure_types() {
        assert_eq!(FailureType::from(&GatewayError::RateLimited), FailureType::RateLimited);
        assert_eq!(FailureType::from(&GatewayError::QuotaExceeded), FailureType::RateLimited);
        assert_eq!(FailureType::from(&GatewayError::NotFound("x".into())), FailureType::NotFound);
        assert_eq!(FailureType::from(&GatewayError::Network("x".into())), FailureType::ApiError);
    }

    #[test]
    fn test_cleanup_removes_only_expired() {
        let cache = FailureCache::new();
        cache.record_failure("fresh", FailureType::NotFound);
        cache.insert_raw(
            "stale",
            FailureInfo {
                failed_at: Utc::now() - Duration::hours(2),
                failure_type: FailureType::RateLimited,
                ttl: FailureType::RateLimited.ttl(),
            },
        );

        assert_eq!(cache.cleanup_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.is_failed("stale").is_none());
    }
}
