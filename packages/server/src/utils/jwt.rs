use chrono::{Duration, Utc};
use jsonwebtoken::errors::{Error, ErrorKind};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::AuthConfig;

/// Lifetime of issued tokens.
pub const TOKEN_TTL_HOURS: i64 = 12;

/// JWT Claims structure.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // User ID, as text
    pub uid: Uuid,
    pub role: String,
    pub iat: usize,
    pub exp: usize,
}

/// HS256 signing key plus the retired keys still accepted for verification.
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: Vec<DecodingKey>,
    validation: Validation,
}

impl JwtKeys {
    /// Current secret first, then `previous` in order.
    pub fn new(secret: &str, previous: &[String]) -> Self {
        let decoding = std::iter::once(secret)
            .chain(previous.iter().map(String::as_str))
            .map(|s| DecodingKey::from_secret(s.as_bytes()))
            .collect();

        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding,
            validation: Validation::default(),
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(&config.jwt_secret, &config.previous_secrets)
    }

    /// Sign a new token with the current secret.
    pub fn sign(&self, user_id: Uuid, role: &str) -> Result<String, Error> {
        let now = Utc::now();
        let expiration = now + Duration::hours(TOKEN_TTL_HOURS);

        let claims = Claims {
            sub: user_id.to_string(),
            uid: user_id,
            role: role.to_owned(),
            iat: now.timestamp() as usize,
            exp: expiration.timestamp() as usize,
        };

        encode(&Header::default(), &claims, &self.encoding)
    }

    /// Verify against every accepted secret.
    ///
    /// Only a bad signature moves on to the next key; an expired or
    /// malformed token is rejected immediately.
    pub fn verify(&self, token: &str) -> Result<Claims, Error> {
        let mut last_err = Error::from(ErrorKind::InvalidSignature);

        for key in &self.decoding {
            match decode::<Claims>(token, key, &self.validation) {
                Ok(data) => return Ok(data.claims),
                Err(e) if matches!(e.kind(), ErrorKind::InvalidSignature) => last_err = e,
                Err(e) => return Err(e),
            }
        }

        Err(last_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify() {
        let keys = JwtKeys::new("current", &[]);
        let user = Uuid::now_v7();

        let claims = keys.verify(&keys.sign(user, "admin").unwrap()).unwrap();
        assert_eq!(claims.uid, user);
        assert_eq!(claims.sub, user.to_string());
        assert_eq!(claims.role, "admin");
        assert_eq!(
            claims.exp - claims.iat,
            (TOKEN_TTL_HOURS * 3600) as usize
        );
    }

    #[test]
    fn rotated_out_secret_still_verifies() {
        let old = JwtKeys::new("old-secret", &[]);
        let token = old.sign(Uuid::now_v7(), "user").unwrap();

        let rotated = JwtKeys::new("new-secret", &["old-secret".to_string()]);
        assert!(rotated.verify(&token).is_ok());

        let forgotten = JwtKeys::new("new-secret", &[]);
        assert!(forgotten.verify(&token).is_err());
    }

    #[test]
    fn new_tokens_use_current_secret() {
        let rotated = JwtKeys::new("new-secret", &["old-secret".to_string()]);
        let token = rotated.sign(Uuid::now_v7(), "user").unwrap();

        assert!(JwtKeys::new("new-secret", &[]).verify(&token).is_ok());
        assert!(JwtKeys::new("old-secret", &[]).verify(&token).is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let keys = JwtKeys::new("current", &[]);
        let past = (Utc::now() - Duration::hours(2)).timestamp() as usize;
        let claims = Claims {
            sub: "x".into(),
            uid: Uuid::now_v7(),
            role: "user".into(),
            iat: past,
            exp: past,
        };
        let token = encode(&Header::default(), &claims, &keys.encoding).unwrap();

        let err = keys.verify(&token).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::ExpiredSignature));
    }

    #[test]
    fn garbage_is_rejected() {
        let keys = JwtKeys::new("current", &["old".to_string()]);
        assert!(keys.verify("not.a.token").is_err());
    }
}
