//! # Session tokens: HS256 signed and stateless
//!
//! A token is the JWT compact form `header.claims.signature`, each segment
//! base64url without padding:
//!
//! - header: `{"alg":"HS256","typ":"JWT"}`
//! - claims: [`Claims`]: `sub` (user id as a decimal string), `username`, `iat`, `exp`
//! - signature: HMAC-SHA256 over `header.claims` with the server secret
//!
//! There is no server-side session table and no revocation list: a token is
//! valid exactly when its signature checks out and `exp` is in the future.
//!
//! ## Verification order
//!
//! 1. exactly three non-empty segments
//! 2. header decodes and names `HS256` (anything else, `none` included, is refused
//!    before the MAC is looked at)
//! 3. MAC matches, compared in constant time
//! 4. claims decode into [`Claims`] with no unknown or missing fields
//! 5. `exp` is strictly after now
//!
//! Every failure is a [`TokenError`]. The variants exist for logs only; the
//! session extractor answers all of them with the same 401.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

use store::UserId;

use crate::settings::{AuthSettings, Environment};

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "HS256";
const TOKEN_TYPE: &str = "JWT";

/// Lifetime of a session token, and of the cookie carrying it.
pub const TOKEN_TTL_SECS: i64 = 24 * 60 * 60;

/// Length of the random secret generated for development runs.
const EPHEMERAL_SECRET_LEN: usize = 32;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("malformed token: {0}")]
    Malformed(&'static str),

    #[error("unsupported signing algorithm `{0}`")]
    UnsupportedAlgorithm(String),

    #[error("signature mismatch")]
    BadSignature,

    #[error("invalid claims: {0}")]
    InvalidClaims(String),

    #[error("token expired at {expired_at}, current time is {now}")]
    Expired { expired_at: i64, now: i64 },

    #[error("token signing secret is not configured")]
    MissingSecret,

    #[error("failed to encode token: {0}")]
    Encoding(String),
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct Header {
    alg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    typ: Option<String>,
}

/// The claim set carried by a session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Claims {
    pub sub: String,
    pub username: String,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    /// The subject parsed back into a user id.
    pub fn user_id(&self) -> Result<UserId, TokenError> {
        self.sub
            .parse()
            .map_err(|_| {
                TokenError::InvalidClaims(format!("subject `{}` is not a user id", self.sub))
            })
    }
}

/// Issues and verifies session tokens with a process-wide secret.
pub struct TokenService {
    keyed: HmacSha256,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService").finish_non_exhaustive()
    }
}

impl TokenService {
    pub fn new(secret: impl Into<Vec<u8>>) -> Result<Self, TokenError> {
        let secret = secret.into();
        if secret.is_empty() {
            return Err(TokenError::MissingSecret);
        }
        let keyed = <HmacSha256 as Mac>::new_from_slice(&secret)
            .map_err(|_| TokenError::MissingSecret)?;
        Ok(Self { keyed })
    }

    /// Build from settings. Production refuses to start without a secret;
    /// development falls back to a random secret that lives as long as the process.
    pub fn from_settings(
        auth: &AuthSettings,
        environment: Environment,
    ) -> Result<Self, TokenError> {
        if !auth.secret.is_empty() {
            return Self::new(auth.secret.as_bytes());
        }
        if environment == Environment::Production {
            return Err(TokenError::MissingSecret);
        }
        tracing::warn!(
            "no token secret configured; using an ephemeral secret, sessions end on restart"
        );
        let mut secret = vec![0u8; EPHEMERAL_SECRET_LEN];
        rand::rngs::OsRng.fill_bytes(&mut secret);
        Self::new(secret)
    }

    pub fn issue(&self, user_id: UserId, username: &str) -> Result<String, TokenError> {
        self.issue_at(user_id, username, Utc::now().timestamp())
    }

    pub fn issue_at(
        &self,
        user_id: UserId,
        username: &str,
        now: i64,
    ) -> Result<String, TokenError> {
        let header = Header {
            alg: ALGORITHM.to_string(),
            typ: Some(TOKEN_TYPE.to_string()),
        };
        let claims = Claims {
            sub: user_id.to_string(),
            username: username.to_string(),
            iat: now,
            exp: now + TOKEN_TTL_SECS,
        };
        let header = encode_segment(&header)?;
        let claims = encode_segment(&claims)?;
        let signing_input = format!("{header}.{claims}");
        let signature = URL_SAFE_NO_PAD.encode(self.mac(&signing_input).finalize().into_bytes());
        tracing::debug!(user_id, "session token issued");
        Ok(format!("{signing_input}.{signature}"))
    }

    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify_at(token, Utc::now().timestamp())
    }

    pub fn verify_at(&self, token: &str, now: i64) -> Result<Claims, TokenError> {
        let mut parts = token.split('.');
        let (Some(header), Some(claims), Some(signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(TokenError::Malformed("expected three segments"));
        };
        if header.is_empty() || claims.is_empty() || signature.is_empty() {
            return Err(TokenError::Malformed("empty segment"));
        }

        let decoded_header: Header = decode_segment(header)
            .map_err(|_| TokenError::Malformed("header is not valid base64url JSON"))?;
        if decoded_header.alg != ALGORITHM {
            return Err(TokenError::UnsupportedAlgorithm(decoded_header.alg));
        }
        if decoded_header.typ.as_deref().is_some_and(|t| t != TOKEN_TYPE) {
            return Err(TokenError::Malformed("unexpected token type"));
        }

        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| TokenError::Malformed("signature is not valid base64url"))?;
        self.mac(&format!("{header}.{claims}"))
            .verify_slice(&signature)
            .map_err(|_| TokenError::BadSignature)?;

        let claims: Claims = decode_segment(claims).map_err(TokenError::InvalidClaims)?;
        if claims.exp <= now {
            return Err(TokenError::Expired {
                expired_at: claims.exp,
                now,
            });
        }
        claims.user_id()?;
        Ok(claims)
    }

    fn mac(&self, signing_input: &str) -> HmacSha256 {
        let mut mac = self.keyed.clone();
        mac.update(signing_input.as_bytes());
        mac
    }
}

fn encode_segment<T: Serialize>(value: &T) -> Result<String, TokenError> {
    let json = serde_json::to_vec(value).map_err(|e| TokenError::Encoding(e.to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

fn decode_segment<T: for<'de> Deserialize<'de>>(segment: &str) -> Result<T, String> {
    let bytes = URL_SAFE_NO_PAD.decode(segment).map_err(|e| e.to_string())?;
    serde_json::from_slice(&bytes).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000;

    fn service() -> TokenService {
        TokenService::new("test-secret-test-secret-test-secret").unwrap()
    }

    fn forge(header: &str, claims: &str, secret: &[u8]) -> String {
        let h = URL_SAFE_NO_PAD.encode(header);
        let c = URL_SAFE_NO_PAD.encode(claims);
        let mut mac = <HmacSha256 as Mac>::new_from_slice(secret).unwrap();
        mac.update(format!("{h}.{c}").as_bytes());
        let s = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        format!("{h}.{c}.{s}")
    }

    #[test]
    fn issued_token_verifies() {
        let svc = service();
        let token = svc.issue_at(42, "alice", NOW).unwrap();
        let claims = svc.verify_at(&token, NOW + 1).unwrap();
        assert_eq!(claims.sub, "42");
        assert_eq!(claims.user_id().unwrap(), 42);
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.exp - claims.iat, TOKEN_TTL_SECS);
    }

    #[test]
    fn issue_uses_the_clock() {
        let svc = service();
        let token = svc.issue(7, "bob").unwrap();
        assert_eq!(svc.verify(&token).unwrap().user_id().unwrap(), 7);
    }

    #[test]
    fn expired_token_is_rejected() {
        let svc = service();
        let token = svc.issue_at(1, "alice", NOW).unwrap();
        assert!(svc.verify_at(&token, NOW + TOKEN_TTL_SECS - 1).is_ok());
        assert_eq!(
            svc.verify_at(&token, NOW + TOKEN_TTL_SECS),
            Err(TokenError::Expired {
                expired_at: NOW + TOKEN_TTL_SECS,
                now: NOW + TOKEN_TTL_SECS
            })
        );
    }

    #[test]
    fn other_secret_is_rejected() {
        let token = service().issue_at(1, "alice", NOW).unwrap();
        let other = TokenService::new("another-secret").unwrap();
        assert_eq!(other.verify_at(&token, NOW), Err(TokenError::BadSignature));
    }

    #[test]
    fn alg_none_is_rejected() {
        let claims = format!(r#"{{"sub":"1","username":"alice","iat":{NOW},"exp":{}}}"#, NOW + 60);
        let h = URL_SAFE_NO_PAD.encode(r#"{"alg":"none","typ":"JWT"}"#);
        let c = URL_SAFE_NO_PAD.encode(&claims);
        let unsigned = format!("{h}.{c}.");
        assert_eq!(
            service().verify_at(&unsigned, NOW),
            Err(TokenError::Malformed("empty segment"))
        );

        // Even with a signature attached, the algorithm is refused first.
        let with_sig = forge(
            r#"{"alg":"none","typ":"JWT"}"#,
            &claims,
            b"test-secret-test-secret-test-secret",
        );
        assert_eq!(
            service().verify_at(&with_sig, NOW),
            Err(TokenError::UnsupportedAlgorithm("none".into()))
        );
    }

    #[test]
    fn mismatched_algorithm_is_rejected() {
        let claims = format!(r#"{{"sub":"1","username":"a","iat":{NOW},"exp":{}}}"#, NOW + 60);
        let token = forge(
            r#"{"alg":"HS512","typ":"JWT"}"#,
            &claims,
            b"test-secret-test-secret-test-secret",
        );
        assert_eq!(
            service().verify_at(&token, NOW),
            Err(TokenError::UnsupportedAlgorithm("HS512".into()))
        );
    }

    #[test]
    fn tampered_claims_are_rejected() {
        let svc = service();
        let token = svc.issue_at(1, "alice", NOW).unwrap();
        let parts: Vec<&str> = token.split('.').collect();
        let evil = URL_SAFE_NO_PAD.encode(format!(
            r#"{{"sub":"2","username":"alice","iat":{NOW},"exp":{}}}"#,
            NOW + TOKEN_TTL_SECS
        ));
        let tampered = format!("{}.{}.{}", parts[0], evil, parts[2]);
        assert_eq!(svc.verify_at(&tampered, NOW), Err(TokenError::BadSignature));
    }

    #[test]
    fn unknown_or_malformed_claims_are_rejected() {
        let secret = b"test-secret-test-secret-test-secret";
        let header = r#"{"alg":"HS256","typ":"JWT"}"#;

        let extra = format!(
            r#"{{"sub":"1","username":"a","iat":{NOW},"exp":{},"admin":true}}"#,
            NOW + 60
        );
        assert!(matches!(
            service().verify_at(&forge(header, &extra, secret), NOW),
            Err(TokenError::InvalidClaims(_))
        ));

        let missing = format!(r#"{{"sub":"1","iat":{NOW},"exp":{}}}"#, NOW + 60);
        assert!(matches!(
            service().verify_at(&forge(header, &missing, secret), NOW),
            Err(TokenError::InvalidClaims(_))
        ));

        let bad_subject = format!(
            r#"{{"sub":"abc","username":"a","iat":{NOW},"exp":{}}}"#,
            NOW + 60
        );
        assert!(matches!(
            service().verify_at(&forge(header, &bad_subject, secret), NOW),
            Err(TokenError::InvalidClaims(_))
        ));
    }

    #[test]
    fn structural_garbage_is_rejected() {
        let svc = service();
        assert!(matches!(svc.verify_at("", NOW), Err(TokenError::Malformed(_))));
        assert!(matches!(svc.verify_at("a.b", NOW), Err(TokenError::Malformed(_))));
        assert!(matches!(svc.verify_at("a.b.c.d", NOW), Err(TokenError::Malformed(_))));
        assert!(matches!(svc.verify_at("!!.??.##", NOW), Err(TokenError::Malformed(_))));
    }

    #[test]
    fn empty_secret_is_refused() {
        assert_eq!(TokenService::new(Vec::new()).unwrap_err(), TokenError::MissingSecret);

        let auth = AuthSettings::default();
        assert_eq!(
            TokenService::from_settings(&auth, Environment::Production).unwrap_err(),
            TokenError::MissingSecret
        );
        let dev = TokenService::from_settings(&auth, Environment::Development).unwrap();
        let token = dev.issue_at(5, "dev", NOW).unwrap();
        assert!(dev.verify_at(&token, NOW).is_ok());
    }
}
