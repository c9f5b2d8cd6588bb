//! User notifications. SMS goes through an ordered chain of carriers with
//! failover; e-mail through a single SMTP relay with bounded retries.

use std::time::Duration;

use tracing::warn;

use crate::ports::CacheStore;

pub mod email;
pub mod sms;

const DOMESTIC_PREFIX: &str = "+55";
const ROTATION_KEY_PREFIX: &str = "sms:rotation:";

/// Carrier configuration for SMS delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmsRouting {
    /// Upper-case provider names, in preference order.
    pub providers: Vec<String>,
    /// Sole carrier used for numbers outside Brazil.
    pub international_provider: String,
    /// How long the rotation start of a token is remembered.
    pub rotation_ttl: Duration,
}

impl SmsRouting {
    pub fn is_domestic(phone_number: &str) -> bool {
        phone_number.trim().starts_with(DOMESTIC_PREFIX)
    }

    /// Provider chain starting at `start`, wrapping around.
    pub fn rotated(&self, start: usize) -> Vec<String> {
        let n = self.providers.len();
        if n == 0 {
            return Vec::new();
        }
        (0..n)
            .map(|offset| self.providers[(start + offset) % n].clone())
            .collect()
    }

    /// Decides the provider chain for one send. Domestic sends sharing an
    /// idempotency token rotate their first provider; the cache stores the index
    /// the previous send started from, never the provider a failover reached.
    /// The cache is best effort.
    pub async fn plan(
        &self,
        cache: &dyn CacheStore,
        phone_number: &str,
        idempotency_token: Option<&str>,
    ) -> Vec<String> {
        if !Self::is_domestic(phone_number) {
            return vec![self.international_provider.clone()];
        }
        let n = self.providers.len();
        let Some(token) = idempotency_token.filter(|_| n > 0) else {
            return self.rotated(0);
        };

        let key = format!("{}{}", ROTATION_KEY_PREFIX, token);
        let start = match cache.get(&key).await {
            Ok(Some(previous_start)) => previous_start
                .parse::<usize>()
                .map(|previous_start| (previous_start + 1) % n)
                .unwrap_or(0),
            Ok(None) => 0,
            Err(e) => {
                warn!(error = %e, "sms rotation lookup failed, starting from first provider");
                0
            }
        };
        if let Err(e) = cache.set(&key, &start.to_string(), self.rotation_ttl).await {
            warn!(error = %e, "failed to store sms rotation start");
        }
        self.rotated(start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn routing() -> SmsRouting {
        SmsRouting {
            providers: vec!["A".into(), "B".into(), "C".into()],
            international_provider: "INTL".into(),
            rotation_ttl: Duration::from_secs(60),
        }
    }

    #[test]
    fn test_rotation_wraps_around() {
        let routing = routing();
        assert_eq!(routing.rotated(0), vec!["A", "B", "C"]);
        assert_eq!(routing.rotated(2), vec!["C", "A", "B"]);
        assert_eq!(routing.rotated(3), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_domestic_prefix() {
        assert!(SmsRouting::is_domestic("+5511999990000"));
        assert!(SmsRouting::is_domestic(" +5521988887777"));
        assert!(!SmsRouting::is_domestic("+14155550100"));
    }

    #[test]
    fn test_empty_chain() {
        let routing = SmsRouting {
            providers: Vec::new(),
            ..routing()
        };
        assert!(routing.rotated(1).is_empty());
    }
}
