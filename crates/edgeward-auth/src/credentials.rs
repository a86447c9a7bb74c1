//! Short-lived tunnel credentials
//!
//! An agent asked to open a reverse tunnel receives a signed token proving it
//! was invited for one environment. The token is opaque to the coordinator;
//! only its expiry matters there.

use chrono::{DateTime, Duration, Utc};
use edgeward_proto::EnvironmentId;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const ISSUER: &str = "edgeward";
const AUDIENCE: &str = "edgeward-tunnel";

/// Claims carried by tunnel credentials
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TunnelClaims {
    /// Subject (environment ID)
    pub sub: String,
    /// Issued at (timestamp)
    pub iat: i64,
    /// Expiration time (timestamp)
    pub exp: i64,
    /// Issuer
    pub iss: String,
    /// Audience
    pub aud: String,
}

impl TunnelClaims {
    pub fn new(environment_id: EnvironmentId, validity: Duration) -> Self {
        let now = Utc::now();
        let exp = now + validity;

        Self {
            sub: environment_id.to_string(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
            iss: ISSUER.to_string(),
            aud: AUDIENCE.to_string(),
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() > self.exp
    }

    pub fn environment_id(&self) -> Option<EnvironmentId> {
        self.sub.parse().ok().map(EnvironmentId)
    }
}

/// Signed token plus its expiry
#[derive(Debug, Clone, PartialEq)]
pub struct TunnelCredentials {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl TunnelCredentials {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("JWT encoding error: {0}")]
    Encoding(#[from] jsonwebtoken::errors::Error),

    #[error("Credentials expired")]
    Expired,

    #[error("Credentials issued for environment {presented}, expected {expected}")]
    WrongEnvironment {
        expected: EnvironmentId,
        presented: String,
    },

    #[error("Invalid edge key: {0}")]
    InvalidEdgeKey(String),
}

/// Issues and verifies tunnel credentials with HMAC-SHA256
pub struct CredentialIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    validity: Duration,
}

impl CredentialIssuer {
    pub fn new(secret: &[u8], validity: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.validate_nbf = false;
        validation.set_audience(&[AUDIENCE]);
        validation.set_issuer(&[ISSUER]);
        validation.leeway = 0;

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            validity,
        }
    }

    pub fn validity(&self) -> Duration {
        self.validity
    }

    /// Issue fresh credentials for one environment
    pub fn issue(&self, environment_id: EnvironmentId) -> Result<TunnelCredentials, CredentialError> {
        let claims = TunnelClaims::new(environment_id, self.validity);
        let expires_at = DateTime::<Utc>::from_timestamp(claims.exp, 0)
            .unwrap_or_else(|| Utc::now() + self.validity);

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?;

        Ok(TunnelCredentials { token, expires_at })
    }

    /// Verify a token presented by an agent for `environment_id`
    pub fn verify(
        &self,
        token: &str,
        environment_id: EnvironmentId,
    ) -> Result<TunnelClaims, CredentialError> {
        let token_data = decode::<TunnelClaims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => CredentialError::Expired,
                _ => CredentialError::Encoding(e),
            })?;

        let claims = token_data.claims;
        if claims.is_expired() {
            return Err(CredentialError::Expired);
        }

        if claims.environment_id() != Some(environment_id) {
            return Err(CredentialError::WrongEnvironment {
                expected: environment_id,
                presented: claims.sub,
            });
        }

        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_and_verify() {
        let issuer = CredentialIssuer::new(b"test-secret", Duration::hours(1));
        let credentials = issuer.issue(EnvironmentId(7)).unwrap();

        assert!(!credentials.is_expired_at(Utc::now()));
        let claims = issuer.verify(&credentials.token, EnvironmentId(7)).unwrap();
        assert_eq!(claims.environment_id(), Some(EnvironmentId(7)));
        assert_eq!(claims.iss, "edgeward");
    }

    #[test]
    fn test_verify_rejects_other_environment() {
        let issuer = CredentialIssuer::new(b"test-secret", Duration::hours(1));
        let credentials = issuer.issue(EnvironmentId(7)).unwrap();

        let result = issuer.verify(&credentials.token, EnvironmentId(8));
        assert!(matches!(
            result,
            Err(CredentialError::WrongEnvironment { .. })
        ));
    }

    #[test]
    fn test_verify_rejects_wrong_secret() {
        let issuer = CredentialIssuer::new(b"test-secret", Duration::hours(1));
        let other = CredentialIssuer::new(b"other-secret", Duration::hours(1));
        let credentials = issuer.issue(EnvironmentId(1)).unwrap();

        assert!(other.verify(&credentials.token, EnvironmentId(1)).is_err());
    }

    #[test]
    fn test_expired_credentials() {
        let issuer = CredentialIssuer::new(b"test-secret", Duration::seconds(-120));
        let credentials = issuer.issue(EnvironmentId(1)).unwrap();

        assert!(credentials.is_expired_at(Utc::now()));
        let result = issuer.verify(&credentials.token, EnvironmentId(1));
        assert!(matches!(result, Err(CredentialError::Expired)));
    }
}
