//! Binding code model types.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;

use crate::partition::TenantId;

/// Fixed length of a binding code.
pub const CODE_LENGTH: usize = 8;

/// Time-to-live of an issued code.
pub const CODE_TTL_DAYS: i64 = 7;

/// Characters used in codes. Ambiguous glyphs (0/O, 1/I) are left out since
/// codes are typed by hand into a chat.
const CODE_CHARSET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// A one-time, expiring token that binds a chat to a tenant (and optionally
/// to a user, matched by contact email).
#[derive(Debug, Clone)]
pub struct BindingCode {
    /// Surrogate row id (None for unsaved codes).
    pub id: Option<i64>,
    /// The code value itself.
    pub code: String,
    /// Tenant the redeeming chat will be bound to.
    pub tenant_id: TenantId,
    /// Contact email of the target user, if the code is user-specific. This
    /// is a weak cross-partition reference resolved at redemption time.
    pub target_contact: Option<String>,
    /// When the code was issued.
    pub created_at: DateTime<Utc>,
    /// When the code stops being redeemable.
    pub expires_at: DateTime<Utc>,
    /// Whether the code has been redeemed.
    pub used: bool,
    /// When the code was redeemed.
    pub used_at: Option<DateTime<Utc>>,
    /// Chat that redeemed the code; the reconciler reads this as proof of
    /// intentional creation.
    pub redeemed_chat_id: Option<i64>,
}

impl BindingCode {
    /// Create a fresh, unused code expiring [`CODE_TTL_DAYS`] from `now`.
    #[must_use]
    pub fn issue(
        code: String,
        tenant_id: TenantId,
        target_contact: Option<&str>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: None,
            code,
            tenant_id,
            target_contact: target_contact.map(str::to_lowercase),
            created_at: now,
            expires_at: now + Duration::days(CODE_TTL_DAYS),
            used: false,
            used_at: None,
            redeemed_chat_id: None,
        }
    }

    /// Whether the code's time-to-live has elapsed at `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Generates a random code of [`CODE_LENGTH`] characters.
///
/// Uniqueness is not guaranteed here; the issuer checks for collisions
/// against the store and regenerates.
#[must_use]
pub fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    (0..CODE_LENGTH)
        .map(|_| {
            let idx = rng.gen_range(0..CODE_CHARSET.len());
            CODE_CHARSET[idx] as char
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_issue_sets_ttl() {
        let now = Utc::now();
        let code = BindingCode::issue("ABCD2345".to_string(), TenantId::new(1), None, now);
        assert_eq!(code.expires_at, now + Duration::days(7));
        assert!(!code.used);
        assert!(!code.is_expired(now));
        assert!(code.is_expired(now + Duration::days(7)));
        assert!(code.is_expired(now + Duration::days(8)));
    }

    #[test]
    fn test_target_contact_normalized() {
        let code = BindingCode::issue(
            "ABCD2345".to_string(),
            TenantId::new(1),
            Some("Ana@Example.COM"),
            Utc::now(),
        );
        assert_eq!(code.target_contact.as_deref(), Some("ana@example.com"));
    }

    #[test]
    fn test_generated_codes_have_fixed_length() {
        for _ in 0..100 {
            let code = generate_code();
            assert_eq!(code.len(), CODE_LENGTH);
        }
    }

    proptest! {
        #[test]
        fn prop_generated_codes_use_charset(_seed in 0u8..255) {
            let code = generate_code();
            prop_assert!(code.bytes().all(|b| CODE_CHARSET.contains(&b)));
        }
    }
}
