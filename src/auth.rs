//! Authentication: bearer-token verification and the Auth0 client.
//!
//! # Token verification
//!
//! [`JwtVerifier`] checks RS256 access tokens against the tenant's JWKS
//! (`https://{domain}/.well-known/jwks.json`). Keys are cached by `kid` and
//! the set is re-fetched when a token names an unknown key, which covers
//! key rotation. Issuer must be `https://{domain}/` and audience the
//! configured API audience.
//!
//! # Identity provider
//!
//! [`Auth0Client`] implements [`IdentityProvider`]:
//!
//! | Operation | Auth0 call |
//! |-----------|------------|
//! | sign-up | `POST /api/v2/users` with a management token (client credentials) |
//! | login | `POST /oauth/token` with the password grant |

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::config::AuthConfig;
use crate::error::{AuthError, ConfigError};
use crate::http::build_client;

const JWKS_TIMEOUT_SECS: u64 = 10;

/// Claims the API relies on. `sub` is the user id everywhere downstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default)]
    pub iss: Option<String>,
    #[serde(default)]
    pub aud: serde_json::Value,
    #[serde(default)]
    pub exp: Option<u64>,
    #[serde(default)]
    pub email: Option<String>,
}

#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<Claims, AuthError>;
}

/// Pull the token out of an `Authorization` header value.
pub fn bearer_token(header: Option<&str>) -> Result<&str, AuthError> {
    header
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::MissingHeader)
}

/// JWKS keys cached by `kid`.
///
/// The endpoint is fetched at most once per `min_refresh_interval` after a
/// successful refresh, and at most once per `retry_interval` after a failed
/// one. While a failure is being waited out, lookups of unknown keys keep
/// reporting [`AuthError::JwksFetch`].
pub struct JwksCache {
    jwks_uri: String,
    keys: RwLock<HashMap<String, DecodingKey>>,
    last_refresh: RwLock<Option<RefreshAttempt>>,
    min_refresh_interval: Duration,
    retry_interval: Duration,
    client: reqwest::Client,
}

#[derive(Debug, Clone)]
struct RefreshAttempt {
    at: Instant,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Jwks {
    keys: Vec<Jwk>,
}

#[derive(Debug, Deserialize)]
struct Jwk {
    kty: String,
    kid: Option<String>,
    n: Option<String>,
    e: Option<String>,
}

impl JwksCache {
    pub fn new(jwks_uri: impl Into<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            jwks_uri: jwks_uri.into(),
            keys: RwLock::new(HashMap::new()),
            last_refresh: RwLock::new(None),
            min_refresh_interval: Duration::from_secs(300),
            retry_interval: Duration::from_secs(30),
            client: build_client(JWKS_TIMEOUT_SECS)?,
        })
    }

    /// Add a key directly, bypassing the JWKS endpoint.
    pub async fn insert(&self, kid: impl Into<String>, key: DecodingKey) {
        self.keys.write().await.insert(kid.into(), key);
    }

    /// Key for `kid`, fetching the key set once if it is not cached.
    pub async fn get_key(&self, kid: &str) -> Result<DecodingKey, AuthError> {
        if let Some(key) = self.keys.read().await.get(kid) {
            return Ok(key.clone());
        }

        self.refresh().await?;

        self.keys
            .read()
            .await
            .get(kid)
            .cloned()
            .ok_or_else(|| AuthError::KeyNotFound(kid.to_string()))
    }

    async fn refresh(&self) -> Result<(), AuthError> {
        if let Some(last) = self.last_refresh.read().await.clone() {
            match last.error {
                None if last.at.elapsed() < self.min_refresh_interval => return Ok(()),
                Some(error) if last.at.elapsed() < self.retry_interval => {
                    return Err(AuthError::JwksFetch(error));
                }
                _ => {}
            }
        }

        tracing::debug!(uri = %self.jwks_uri, "fetching JWKS");
        let jwks = match self.fetch().await {
            Ok(jwks) => jwks,
            Err(error) => {
                tracing::warn!(uri = %self.jwks_uri, error = %error, "JWKS fetch failed");
                *self.last_refresh.write().await = Some(RefreshAttempt {
                    at: Instant::now(),
                    error: Some(error.clone()),
                });
                return Err(AuthError::JwksFetch(error));
            }
        };

        let mut keys = self.keys.write().await;
        keys.clear();
        for jwk in jwks.keys {
            let (Some(kid), Some(n), Some(e)) = (jwk.kid, jwk.n, jwk.e) else {
                continue;
            };
            if jwk.kty != "RSA" {
                continue;
            }
            match DecodingKey::from_rsa_components(&n, &e) {
                Ok(key) => {
                    keys.insert(kid, key);
                }
                Err(err) => tracing::warn!(kid = %kid, error = %err, "skipping unusable JWK"),
            }
        }
        *self.last_refresh.write().await = Some(RefreshAttempt {
            at: Instant::now(),
            error: None,
        });

        tracing::debug!(count = keys.len(), "JWKS cache refreshed");
        Ok(())
    }

    async fn fetch(&self) -> Result<Jwks, String> {
        self.client
            .get(&self.jwks_uri)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| e.to_string())?
            .json()
            .await
            .map_err(|e| e.to_string())
    }
}

/// Verifies JWTs against a JWKS with fixed issuer and audience.
pub struct JwtVerifier {
    issuer: String,
    audience: String,
    algorithm: Algorithm,
    jwks: JwksCache,
}

impl JwtVerifier {
    pub fn new(
        issuer: impl Into<String>,
        audience: impl Into<String>,
        algorithm: Algorithm,
        jwks: JwksCache,
    ) -> Self {
        Self {
            issuer: issuer.into(),
            audience: audience.into(),
            algorithm,
            jwks,
        }
    }

    pub fn from_config(config: &AuthConfig) -> Result<Self, ConfigError> {
        let algorithm: Algorithm = config.algorithm.parse().map_err(|_| {
            ConfigError::Missing(format!(
                "supported auth.algorithm (got '{}')",
                config.algorithm
            ))
        })?;
        Ok(Self::new(
            format!("https://{}/", config.domain),
            config.audience.clone(),
            algorithm,
            JwksCache::new(format!("https://{}/.well-known/jwks.json", config.domain))?,
        ))
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(self.algorithm);
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        validation.validate_exp = true;
        validation
    }
}

#[async_trait]
impl TokenVerifier for JwtVerifier {
    async fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let header = jsonwebtoken::decode_header(token)?;
        let kid = header
            .kid
            .ok_or_else(|| AuthError::InvalidToken("token header has no kid".to_string()))?;

        let key = self.jwks.get_key(&kid).await?;
        let data = jsonwebtoken::decode::<Claims>(token, &key, &self.validation())?;
        Ok(data.claims)
    }
}

/// Identity created by a successful sign-up.
#[derive(Debug, Clone, PartialEq)]
pub struct CreatedIdentity {
    pub user_id: String,
    pub metadata: serde_json::Value,
}

/// Account operations delegated to the identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_up(&self, email: &str, password: &str) -> Result<CreatedIdentity, AuthError>;

    /// Exchange credentials for the provider's token response, returned as-is.
    async fn login(&self, email: &str, password: &str) -> Result<serde_json::Value, AuthError>;
}

pub struct Auth0Client {
    client: reqwest::Client,
    base_url: String,
    client_id: String,
    client_secret: String,
    audience: String,
    connection: String,
}

impl Auth0Client {
    /// Requires `AUTH0_CLIENT_SECRET` in the environment.
    pub fn new(config: &AuthConfig) -> Result<Self, ConfigError> {
        let client_secret = std::env::var("AUTH0_CLIENT_SECRET")
            .map_err(|_| ConfigError::Missing("AUTH0_CLIENT_SECRET".to_string()))?;
        let client = build_client(30)?;

        Ok(Self {
            client,
            base_url: format!("https://{}", config.domain),
            client_id: config.client_id.clone(),
            client_secret,
            audience: config.audience.clone(),
            connection: config.connection.clone(),
        })
    }

    async fn management_token(&self) -> Result<String, AuthError> {
        let response = self
            .client
            .post(format!("{}/oauth/token", self.base_url))
            .json(&json!({
                "client_id": self.client_id,
                "client_secret": self.client_secret,
                "audience": format!("{}/api/v2/", self.base_url),
                "grant_type": "client_credentials",
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(provider_error("management token", response).await);
        }

        let body: serde_json::Value = response.json().await?;
        body.get("access_token")
            .and_then(|t| t.as_str())
            .map(str::to_string)
            .ok_or_else(|| AuthError::Provider {
                operation: "management token".into(),
                message: "response has no access_token".into(),
            })
    }
}

async fn provider_error(operation: &str, response: reqwest::Response) -> AuthError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    tracing::warn!(operation, %status, body = %body, "identity provider rejected request");
    AuthError::Provider {
        operation: operation.to_string(),
        message: format!("status {}", status),
    }
}

#[async_trait]
impl IdentityProvider for Auth0Client {
    async fn sign_up(&self, email: &str, password: &str) -> Result<CreatedIdentity, AuthError> {
        let token = self.management_token().await?;
        let response = self
            .client
            .post(format!("{}/api/v2/users", self.base_url))
            .bearer_auth(token)
            .json(&json!({
                "email": email,
                "password": password,
                "connection": self.connection,
            }))
            .send()
            .await?;

        if response.status() != reqwest::StatusCode::CREATED {
            return Err(provider_error("sign-up", response).await);
        }

        let body: serde_json::Value = response.json().await?;
        let user_id = body
            .get("user_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AuthError::Provider {
                operation: "sign-up".into(),
                message: "response has no user_id".into(),
            })?
            .to_string();
        let metadata = body.get("user_metadata").cloned().unwrap_or_else(|| json!({}));

        Ok(CreatedIdentity { user_id, metadata })
    }

    async fn login(&self, email: &str, password: &str) -> Result<serde_json::Value, AuthError> {
        let response = self
            .client
            .post(format!("{}/oauth/token", self.base_url))
            .json(&json!({
                "grant_type": "password",
                "username": email,
                "password": password,
                "audience": self.audience,
                "client_id": self.client_id,
                "client_secret": self.client_secret,
                "realm": self.connection,
                "scope": "offline_access openid",
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(provider_error("login", response).await);
        }
        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header};

    const SECRET: &[u8] = b"late-night-test-secret";

    fn token(kid: &str, aud: &str, secret: &[u8]) -> String {
        let mut header = Header::new(Algorithm::HS256);
        header.kid = Some(kid.to_string());
        let claims = Claims {
            sub: "auth0|123".into(),
            iss: Some("https://diner.example.com/".into()),
            aud: json!(aud),
            exp: Some(chrono::Utc::now().timestamp() as u64 + 600),
            email: None,
        };
        jsonwebtoken::encode(&header, &claims, &EncodingKey::from_secret(secret)).unwrap()
    }

    async fn verifier() -> JwtVerifier {
        // Unroutable JWKS endpoint: only pre-seeded keys resolve.
        let jwks = JwksCache::new("http://127.0.0.1:9/.well-known/jwks.json").unwrap();
        jwks.insert("k1", DecodingKey::from_secret(SECRET)).await;
        JwtVerifier::new(
            "https://diner.example.com/",
            "https://api.diner.example.com",
            Algorithm::HS256,
            jwks,
        )
    }

    #[tokio::test]
    async fn test_valid_token() {
        let verifier = verifier().await;
        let claims = verifier
            .verify(&token("k1", "https://api.diner.example.com", SECRET))
            .await
            .unwrap();
        assert_eq!(claims.sub, "auth0|123");
    }

    #[tokio::test]
    async fn test_wrong_audience_rejected() {
        let verifier = verifier().await;
        let err = verifier
            .verify(&token("k1", "https://other.example.com", SECRET))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken(_)));
    }

    #[tokio::test]
    async fn test_wrong_signature_rejected() {
        let verifier = verifier().await;
        let err = verifier
            .verify(&token("k1", "https://api.diner.example.com", b"forged"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken(_)));
    }

    #[tokio::test]
    async fn test_unknown_kid_triggers_fetch() {
        let verifier = verifier().await;
        let err = verifier
            .verify(&token("k2", "https://api.diner.example.com", SECRET))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::JwksFetch(_)));
    }

    #[tokio::test]
    async fn test_failed_jwks_refresh_is_rate_limited() {
        use axum::{http::StatusCode, routing::get, Router};
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let app = Router::new().route(
            "/.well-known/jwks.json",
            get(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    StatusCode::SERVICE_UNAVAILABLE
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let jwks = JwksCache::new(format!("http://{}/.well-known/jwks.json", addr)).unwrap();
        for _ in 0..3 {
            assert!(matches!(jwks.get_key("k9").await, Err(AuthError::JwksFetch(_))));
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_garbage_token() {
        let verifier = verifier().await;
        assert!(matches!(
            verifier.verify("not-a-jwt").await,
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[test]
    fn test_bearer_token() {
        assert_eq!(bearer_token(Some("Bearer abc.def")).unwrap(), "abc.def");
        assert!(matches!(bearer_token(None), Err(AuthError::MissingHeader)));
        assert!(matches!(bearer_token(Some("Basic xyz")), Err(AuthError::MissingHeader)));
        assert!(matches!(bearer_token(Some("Bearer ")), Err(AuthError::MissingHeader)));
    }
}
