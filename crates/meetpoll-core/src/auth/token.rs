//! Signed, poll-scoped vote tokens.
//!
//! A token is `base64url(claims_json) "." hex(hmac_sha256(claims_json))`.
//! Claims bind one voter to one poll and expire no later than the poll's
//! deadline.

use std::collections::BTreeSet;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{AuthError, CoreError, StateError, ValidationError};
use crate::identity::{normalize_identity, same_identity};
use crate::poll::Poll;

type HmacSha256 = Hmac<Sha256>;

/// Payload carried inside a vote token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteClaims {
    pub poll_id: String,
    /// Lowercased voter identity
    pub voter: String,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub exp: DateTime<Utc>,
}

/// Everything a caller may present when voting or viewing a poll.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteCredentials {
    /// Signed vote token
    pub token: Option<String>,
    /// Legacy unsigned identity claim
    pub voter_email: Option<String>,
    /// Identity of a logged-in session, if any
    pub session_identity: Option<String>,
}

impl VoteCredentials {
    pub fn token(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            ..Self::default()
        }
    }

    pub fn session(identity: impl Into<String>) -> Self {
        Self {
            session_identity: Some(identity.into()),
            ..Self::default()
        }
    }

    pub fn legacy_email(email: impl Into<String>) -> Self {
        Self {
            voter_email: Some(email.into()),
            ..Self::default()
        }
    }
}

/// Issues and checks vote tokens with a process-wide HMAC key.
#[derive(Clone)]
pub struct TokenAuthorizer {
    key: Vec<u8>,
    ttl: Duration,
    allow_legacy_email: bool,
}

impl std::fmt::Debug for TokenAuthorizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenAuthorizer")
            .field("ttl", &self.ttl)
            .field("allow_legacy_email", &self.allow_legacy_email)
            .finish_non_exhaustive()
    }
}

/// Random 256-bit seed, hex encoded, for `auth.signing_seed`.
pub fn generate_seed() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Derive an HMAC key from a configured seed.
pub fn derive_signing_key(seed: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(seed.as_bytes());
    hasher.update(b"meetpoll-vote-token-v1");
    hasher.finalize().to_vec()
}

impl TokenAuthorizer {
    pub fn new(key: Vec<u8>, ttl: Duration) -> Self {
        Self {
            key,
            ttl,
            allow_legacy_email: true,
        }
    }

    pub fn from_seed(seed: &str, ttl: Duration) -> Self {
        Self::new(derive_signing_key(seed), ttl)
    }

    /// Whether a bare `voter_email` is accepted when no token or session is
    /// presented.
    pub fn with_legacy_email(mut self, allow: bool) -> Self {
        self.allow_legacy_email = allow;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a token for `voter` on `poll`, expiring at
    /// `min(now + ttl, deadline)`.
    ///
    /// # Errors
    /// [`StateError`] if the poll is closed or its deadline has passed, and
    /// [`ValidationError::InvalidValue`] if `now + ttl` is out of range.
    pub fn issue(&self, poll: &Poll, voter: &str, now: DateTime<Utc>) -> Result<String, CoreError> {
        crate::poll::vote::ensure_accepting_votes(poll, now)?;

        let mut exp = now
            .checked_add_signed(self.ttl)
            .ok_or_else(|| ValidationError::InvalidValue {
                field: "token_ttl".to_string(),
                message: format!("{}h from {now} is out of range", self.ttl.num_hours()),
            })?;
        if let Some(deadline) = poll.deadline() {
            exp = exp.min(deadline);
        }
        let claims = VoteClaims {
            poll_id: poll.id().to_string(),
            voter: normalize_identity(voter),
            exp,
        };
        let payload = serde_json::to_vec(&claims)?;
        Ok(format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(&payload),
            hex::encode(self.sign(&payload))
        ))
    }

    /// Decode `token` and check its signature. Expiry is not checked here.
    pub fn verify(&self, token: &str) -> Result<VoteClaims, AuthError> {
        let (payload_b64, signature_hex) =
            token.trim().split_once('.').ok_or(AuthError::MalformedToken)?;
        let payload = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| AuthError::MalformedToken)?;
        let signature = hex::decode(signature_hex).map_err(|_| AuthError::MalformedToken)?;

        self.mac()
            .chain_update(&payload)
            .verify_slice(&signature)
            .map_err(|_| AuthError::InvalidSignature)?;

        serde_json::from_slice(&payload).map_err(|_| AuthError::MalformedToken)
    }

    /// Resolve the caller's identity for `poll`.
    ///
    /// Precedence is signed token, then session identity, then the legacy
    /// `voter_email`. Any two presented identities must agree. The resolved
    /// identity must be in `invitees`.
    pub fn authorize(
        &self,
        poll: &Poll,
        invitees: &BTreeSet<String>,
        credentials: &VoteCredentials,
        now: DateTime<Utc>,
    ) -> Result<String, AuthError> {
        let session = non_empty(&credentials.session_identity);
        let email = non_empty(&credentials.voter_email);

        let identity = if let Some(token) = non_empty(&credentials.token) {
            let claims = self.verify(token)?;
            if claims.poll_id != poll.id() {
                return Err(AuthError::PollMismatch {
                    token_poll: claims.poll_id,
                    poll: poll.id().to_string(),
                });
            }
            if now >= claims.exp {
                return Err(AuthError::TokenExpired(claims.exp));
            }
            for caller in [session, email].into_iter().flatten() {
                ensure_agree(&claims.voter, caller)?;
            }
            claims.voter
        } else if let Some(session) = session {
            if let Some(email) = email {
                ensure_agree(session, email)?;
            }
            normalize_identity(session)
        } else if let Some(email) = email.filter(|_| self.allow_legacy_email) {
            normalize_identity(email)
        } else {
            return Err(AuthError::MissingCredentials);
        };

        if !invitees.iter().any(|i| same_identity(i, &identity)) {
            return Err(AuthError::NotInvited(identity));
        }
        Ok(identity)
    }

    fn mac(&self) -> HmacSha256 {
        HmacSha256::new_from_slice(&self.key).expect("HMAC can take keys of any size")
    }

    fn sign(&self, payload: &[u8]) -> Vec<u8> {
        self.mac().chain_update(payload).finalize().into_bytes().to_vec()
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn ensure_agree(token_identity: &str, caller: &str) -> Result<(), AuthError> {
    if same_identity(token_identity, caller) {
        Ok(())
    } else {
        Err(AuthError::IdentityMismatch {
            token: normalize_identity(token_identity),
            caller: normalize_identity(caller),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::availability::TimeInterval;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn poll(deadline: Option<DateTime<Utc>>) -> Poll {
        let start = Utc.with_ymd_and_hms(2026, 3, 5, 9, 0, 0).unwrap();
        let slot = TimeInterval::new(start, start + Duration::minutes(30)).unwrap();
        Poll::new("m1", "org@example.com", vec![slot], deadline, now()).unwrap()
    }

    fn invitees() -> BTreeSet<String> {
        ["org@example.com", "alice@example.com", "bob@example.com"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn authorizer() -> TokenAuthorizer {
        TokenAuthorizer::from_seed("test-seed", Duration::hours(168))
    }

    #[test]
    fn issued_token_authorizes_its_voter() {
        let auth = authorizer();
        let poll = poll(None);
        let token = auth.issue(&poll, "Alice@Example.com", now()).unwrap();

        let identity = auth
            .authorize(&poll, &invitees(), &VoteCredentials::token(&token), now())
            .unwrap();
        assert_eq!(identity, "alice@example.com");
    }

    #[test]
    fn expiry_is_capped_by_deadline() {
        let auth = authorizer();
        let deadline = now() + Duration::hours(2);
        let poll = poll(Some(deadline));
        let token = auth.issue(&poll, "alice@example.com", now()).unwrap();

        assert_eq!(auth.verify(&token).unwrap().exp, deadline);
        let err = auth
            .authorize(&poll, &invitees(), &VoteCredentials::token(&token), deadline)
            .unwrap_err();
        assert_eq!(err, AuthError::TokenExpired(deadline));
    }

    #[test]
    fn token_for_another_poll_is_rejected() {
        let auth = authorizer();
        let (a, b) = (poll(None), poll(None));
        let token = auth.issue(&a, "alice@example.com", now()).unwrap();
        let err = auth
            .authorize(&b, &invitees(), &VoteCredentials::token(&token), now())
            .unwrap_err();
        assert!(matches!(err, AuthError::PollMismatch { .. }));
    }

    #[test]
    fn tampered_or_foreign_tokens_fail_signature() {
        let poll = poll(None);
        let token = authorizer().issue(&poll, "alice@example.com", now()).unwrap();

        let other = TokenAuthorizer::from_seed("other-seed", Duration::hours(1));
        assert_eq!(other.verify(&token).unwrap_err(), AuthError::InvalidSignature);

        let (payload, sig) = token.split_once('.').unwrap();
        let forged_claims = VoteClaims {
            poll_id: poll.id().to_string(),
            voter: "bob@example.com".to_string(),
            exp: now() + Duration::hours(1),
        };
        let forged = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&forged_claims).unwrap());
        assert_ne!(forged, payload);
        assert_eq!(
            authorizer().verify(&format!("{forged}.{sig}")).unwrap_err(),
            AuthError::InvalidSignature
        );
        assert_eq!(authorizer().verify("garbage").unwrap_err(), AuthError::MalformedToken);
    }

    #[test]
    fn session_and_token_must_agree() {
        let auth = authorizer();
        let poll = poll(None);
        let token = auth.issue(&poll, "alice@example.com", now()).unwrap();
        let creds = VoteCredentials {
            token: Some(token),
            session_identity: Some("bob@example.com".to_string()),
            voter_email: None,
        };
        let err = auth.authorize(&poll, &invitees(), &creds, now()).unwrap_err();
        assert!(matches!(err, AuthError::IdentityMismatch { .. }));
    }

    #[test]
    fn legacy_email_with_token_must_agree() {
        let auth = authorizer();
        let poll = poll(None);
        let token = auth.issue(&poll, "alice@example.com", now()).unwrap();
        let creds = VoteCredentials {
            token: Some(token),
            voter_email: Some("bob@example.com".to_string()),
            session_identity: None,
        };
        assert!(auth.authorize(&poll, &invitees(), &creds, now()).is_err());
    }

    #[test]
    fn legacy_email_respects_toggle() {
        let poll = poll(None);
        let creds = VoteCredentials::legacy_email("BOB@example.com");

        let identity = authorizer().authorize(&poll, &invitees(), &creds, now()).unwrap();
        assert_eq!(identity, "bob@example.com");

        let strict = authorizer().with_legacy_email(false);
        assert_eq!(
            strict.authorize(&poll, &invitees(), &creds, now()).unwrap_err(),
            AuthError::MissingCredentials
        );
    }

    #[test]
    fn uninvited_identity_is_rejected() {
        let auth = authorizer();
        let poll = poll(None);
        let token = auth.issue(&poll, "mallory@example.com", now()).unwrap();
        let err = auth
            .authorize(&poll, &invitees(), &VoteCredentials::token(token), now())
            .unwrap_err();
        assert_eq!(err, AuthError::NotInvited("mallory@example.com".to_string()));
    }

    #[test]
    fn generated_seeds_differ() {
        let (a, b) = (generate_seed(), generate_seed());
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
    }

    #[test]
    fn no_tokens_for_closed_polls() {
        let auth = authorizer();
        let mut poll = poll(None);
        let winner = poll.options()[0].id().to_string();
        poll.close(winner, now());
        assert!(matches!(
            auth.issue(&poll, "alice@example.com", now()),
            Err(CoreError::State(StateError::PollClosed(_)))
        ));
    }

    #[test]
    fn oversized_ttl_is_an_error_not_a_panic() {
        let auth = TokenAuthorizer::from_seed("test-seed", Duration::MAX);
        assert!(matches!(
            auth.issue(&poll(None), "alice@example.com", now()),
            Err(CoreError::Validation(ValidationError::InvalidValue { .. }))
        ));
    }
}
