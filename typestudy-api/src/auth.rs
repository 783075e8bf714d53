//! Google OAuth2 access tokens
//!
//! Two credential sources are supported:
//! - an OAuth2 refresh token exchanged at the token endpoint
//! - a service-account key, exchanged through a signed JWT bearer assertion
//!
//! Access tokens are cached until shortly before they expire.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use jwt::{AlgorithmType, Header, PKeyWithDigest, SignWithKey, Token};
use openssl::{hash::MessageDigest, pkey::PKey};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::Mutex;
use typestudy_common::config::{Credentials, ServiceAccountKey};

use crate::drive::DriveError;

pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const DRIVE_FILE_SCOPE: &str = "https://www.googleapis.com/auth/drive.file";

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
/// Assertion lifetime; Google caps it at one hour
const ASSERTION_LIFETIME_SECS: i64 = 3600;
/// Refresh this long before the reported expiry
const EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Debug, Clone)]
enum TokenSource {
    RefreshToken {
        client_id: String,
        client_secret: String,
        refresh_token: String,
    },
    ServiceAccount(ServiceAccountKey),
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now + ChronoDuration::seconds(EXPIRY_MARGIN_SECS) < self.expires_at
    }
}

/// Anything that can hand out Drive bearer tokens
#[async_trait]
pub trait AccessTokenSource: Send + Sync {
    /// Short label for logs
    fn kind(&self) -> &'static str;

    /// A valid access token
    async fn access_token(&self) -> Result<String, DriveError>;
}

/// Claims of the service-account assertion
#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct AssertionClaims {
    iss: String,
    scope: String,
    aud: String,
    iat: i64,
    exp: i64,
}

/// Issues bearer tokens for Drive requests
pub struct TokenProvider {
    http: reqwest::Client,
    source: TokenSource,
    token_url: String,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenProvider {
    /// Build a provider for the configured credentials, if any
    pub fn from_credentials(credentials: &Credentials) -> Result<Option<Self>, DriveError> {
        let source = match credentials {
            Credentials::RefreshToken {
                client_id,
                client_secret,
                refresh_token,
            } => TokenSource::RefreshToken {
                client_id: client_id.clone(),
                client_secret: client_secret.clone(),
                refresh_token: refresh_token.clone(),
            },
            Credentials::ServiceAccount(key) => TokenSource::ServiceAccount(key.clone()),
            Credentials::None => return Ok(None),
        };

        let token_url = match &source {
            TokenSource::ServiceAccount(key) => key
                .token_uri
                .clone()
                .unwrap_or_else(|| GOOGLE_TOKEN_URL.to_string()),
            TokenSource::RefreshToken { .. } => GOOGLE_TOKEN_URL.to_string(),
        };

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| DriveError::Network(e.to_string()))?;

        Ok(Some(Self {
            http,
            source,
            token_url,
            cached: Mutex::new(None),
        }))
    }

    async fn fetch(&self, now: DateTime<Utc>) -> Result<CachedToken, DriveError> {
        let form: Vec<(&str, String)> = match &self.source {
            TokenSource::RefreshToken {
                client_id,
                client_secret,
                refresh_token,
            } => vec![
                ("client_id", client_id.clone()),
                ("client_secret", client_secret.clone()),
                ("refresh_token", refresh_token.clone()),
                ("grant_type", "refresh_token".to_string()),
            ],
            TokenSource::ServiceAccount(key) => vec![
                ("grant_type", JWT_BEARER_GRANT.to_string()),
                ("assertion", sign_assertion(key, &self.token_url, now)?),
            ],
        };

        tracing::debug!(source = self.kind(), "Requesting access token");

        let response = self
            .http
            .post(&self.token_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| DriveError::Network(e.to_string()))?;

        let status = response.status();
        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| DriveError::Parse(e.to_string()))?;

        match body.access_token {
            Some(value) if status.is_success() => {
                let expires_in = body.expires_in.unwrap_or(ASSERTION_LIFETIME_SECS);
                tracing::info!(source = self.kind(), expires_in, "Obtained access token");
                Ok(CachedToken {
                    value,
                    expires_at: now + ChronoDuration::seconds(expires_in),
                })
            }
            _ => Err(DriveError::Auth(format!(
                "Failed to get access token ({}): {}",
                status.as_u16(),
                body.error_description
                    .or(body.error)
                    .unwrap_or_else(|| "no access_token in response".to_string())
            ))),
        }
    }
}

#[async_trait]
impl AccessTokenSource for TokenProvider {
    fn kind(&self) -> &'static str {
        match self.source {
            TokenSource::RefreshToken { .. } => "refresh token",
            TokenSource::ServiceAccount(_) => "service account",
        }
    }

    /// Cached token, fetching a new one when the cache is stale
    async fn access_token(&self) -> Result<String, DriveError> {
        let mut cached = self.cached.lock().await;
        let now = Utc::now();

        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh(now)) {
            return Ok(token.value.clone());
        }

        let fresh = self.fetch(now).await?;
        let value = fresh.value.clone();
        *cached = Some(fresh);
        Ok(value)
    }
}

/// RS256-signed JWT asserting the service account's identity
fn sign_assertion(key: &ServiceAccountKey, audience: &str, now: DateTime<Utc>) -> Result<String, DriveError> {
    let pkey = PKey::private_key_from_pem(key.private_key.as_bytes())
        .map_err(|e| DriveError::Auth(format!("Invalid service account private key: {}", e)))?;
    let signer = PKeyWithDigest {
        digest: MessageDigest::sha256(),
        key: pkey,
    };

    let header = Header {
        algorithm: AlgorithmType::Rs256,
        type_: Some(jwt::header::HeaderType::JsonWebToken),
        ..Default::default()
    };
    let claims = assertion_claims(key, audience, now);

    let token = Token::new(header, claims)
        .sign_with_key(&signer)
        .map_err(|e| DriveError::Auth(format!("Signing assertion failed: {}", e)))?;
    Ok(token.as_str().to_string())
}

fn assertion_claims(key: &ServiceAccountKey, audience: &str, now: DateTime<Utc>) -> AssertionClaims {
    let iat = now.timestamp();
    AssertionClaims {
        iss: key.client_email.clone(),
        scope: DRIVE_FILE_SCOPE.to_string(),
        aud: audience.to_string(),
        iat,
        exp: iat + ASSERTION_LIFETIME_SECS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;
    use chrono::TimeZone;
    use openssl::rsa::Rsa;

    fn test_key() -> ServiceAccountKey {
        let rsa = Rsa::generate(2048).unwrap();
        let pem = rsa.private_key_to_pem().unwrap();
        ServiceAccountKey {
            client_email: "svc@study.iam.gserviceaccount.com".to_string(),
            private_key: String::from_utf8(pem).unwrap(),
            token_uri: None,
        }
    }

    fn segment_json(segment: &str) -> serde_json::Value {
        let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(segment)
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_no_credentials_means_no_provider() {
        assert!(TokenProvider::from_credentials(&Credentials::None).unwrap().is_none());
    }

    #[test]
    fn test_provider_kind() {
        let provider = TokenProvider::from_credentials(&Credentials::RefreshToken {
            client_id: "id".into(),
            client_secret: "secret".into(),
            refresh_token: "token".into(),
        })
        .unwrap()
        .unwrap();
        assert_eq!(provider.kind(), "refresh token");
        assert_eq!(provider.token_url, GOOGLE_TOKEN_URL);
    }

    #[test]
    fn test_cached_token_freshness_margin() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let token = CachedToken {
            value: "t".into(),
            expires_at: now + ChronoDuration::seconds(120),
        };
        assert!(token.is_fresh(now));
        assert!(!token.is_fresh(now + ChronoDuration::seconds(61)));
    }

    #[test]
    fn test_assertion_is_rs256_with_expected_claims() {
        let key = test_key();
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();

        let jwt = sign_assertion(&key, GOOGLE_TOKEN_URL, now).unwrap();
        let parts: Vec<&str> = jwt.split('.').collect();
        assert_eq!(parts.len(), 3);

        let header = segment_json(parts[0]);
        assert_eq!(header["alg"], "RS256");
        assert_eq!(header["typ"], "JWT");

        let claims: AssertionClaims = serde_json::from_value(segment_json(parts[1])).unwrap();
        assert_eq!(claims, assertion_claims(&key, GOOGLE_TOKEN_URL, now));
        assert_eq!(claims.exp - claims.iat, 3600);
        assert_eq!(claims.scope, DRIVE_FILE_SCOPE);
    }

    #[test]
    fn test_bad_private_key_is_auth_error() {
        let key = ServiceAccountKey {
            client_email: "svc@x".into(),
            private_key: "not a pem".into(),
            token_uri: None,
        };
        assert!(matches!(
            sign_assertion(&key, GOOGLE_TOKEN_URL, Utc::now()),
            Err(DriveError::Auth(_))
        ));
    }
}
