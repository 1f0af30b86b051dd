use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use secrecy::ExposeSecret;
use serde_json::{Map, Value};
use tracing::{debug, error, warn};

use super::{TokenSigningService, TokenVerifier};
use crate::config::{KeywardOptions, SigningAlgorithm};
use crate::constants::claim_types;
use crate::error::{Error, Result};
use crate::models::{AccessTokenType, Claim, Token, TokenKind};

/// Envelope claims owned by the signer rather than the claims bag
const ENVELOPE_CLAIMS: [&str; 5] = ["iss", "aud", "iat", "nbf", "exp"];

/// Claims that are always rendered as JSON arrays
const ARRAY_CLAIMS: [&str; 1] = [claim_types::AUTHENTICATION_METHOD];

/// JWS signer and verifier backed by `jsonwebtoken`
pub struct JwtTokenSigner {
    algorithm: Algorithm,
    key_id: Option<String>,
    issuer: String,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl std::fmt::Debug for JwtTokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtTokenSigner")
            .field("algorithm", &self.algorithm)
            .field("key_id", &self.key_id)
            .field("issuer", &self.issuer)
            .finish_non_exhaustive()
    }
}

impl JwtTokenSigner {
    /// HS256 signer over a shared key
    pub fn hs256(secret: &[u8], issuer: impl Into<String>) -> Self {
        Self {
            algorithm: Algorithm::HS256,
            key_id: None,
            issuer: issuer.into(),
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
        }
    }

    /// RS256 signer over a PEM key pair
    ///
    /// # Errors
    ///
    /// [`Error::Signing`] if either PEM document cannot be parsed.
    pub fn rs256(
        private_pem: &[u8],
        public_pem: &[u8],
        issuer: impl Into<String>,
    ) -> Result<Self> {
        let encoding_key = EncodingKey::from_rsa_pem(private_pem)
            .map_err(|e| Error::Signing(format!("invalid RSA private key: {e}")))?;
        let decoding_key = DecodingKey::from_rsa_pem(public_pem)
            .map_err(|e| Error::Signing(format!("invalid RSA public key: {e}")))?;
        Ok(Self {
            algorithm: Algorithm::RS256,
            key_id: None,
            issuer: issuer.into(),
            encoding_key,
            decoding_key,
        })
    }

    /// Build from the `signing` section of the options
    ///
    /// # Errors
    ///
    /// Returns a signing error if the configured key is missing or cannot be parsed.
    pub fn from_options(options: &KeywardOptions) -> Result<Self> {
        let signing = &options.signing;
        let signer = match signing.algorithm {
            SigningAlgorithm::HS256 => {
                let key = signing.symmetric_key.as_ref().ok_or_else(|| {
                    Error::Signing("HS256 requires a symmetric_key".to_string())
                })?;
                Self::hs256(key.expose_secret().as_bytes(), &options.issuer_uri)
            }
            SigningAlgorithm::RS256 => {
                let (Some(private_pem), Some(public_pem)) =
                    (&signing.private_key_pem, &signing.public_key_pem)
                else {
                    return Err(Error::Signing(
                        "RS256 requires private_key_pem and public_key_pem".to_string(),
                    ));
                };
                Self::rs256(
                    private_pem.expose_secret().as_bytes(),
                    public_pem.as_bytes(),
                    &options.issuer_uri,
                )?
            }
        };
        Ok(match &signing.key_id {
            Some(kid) => signer.with_key_id(kid.clone()),
            None => signer,
        })
    }

    #[must_use]
    pub fn with_key_id(mut self, key_id: impl Into<String>) -> Self {
        self.key_id = Some(key_id.into());
        self
    }

    fn payload(token: &Token) -> Map<String, Value> {
        let iat = token.creation_time.timestamp();
        let mut payload = Map::new();
        payload.insert("iss".to_string(), Value::from(token.issuer.clone()));
        payload.insert("aud".to_string(), Value::from(token.audience.clone()));
        payload.insert("iat".to_string(), Value::from(iat));
        payload.insert("nbf".to_string(), Value::from(iat));
        payload.insert("exp".to_string(), Value::from(token.expires_at().timestamp()));

        for claim in &token.claims {
            if ENVELOPE_CLAIMS.contains(&claim.claim_type.as_str()) {
                continue;
            }
            match payload.get_mut(&claim.claim_type) {
                Some(Value::Array(values)) => values.push(claim.value.clone()),
                Some(existing) => {
                    let first = existing.take();
                    *existing = Value::Array(vec![first, claim.value.clone()]);
                }
                None => {
                    let value = if ARRAY_CLAIMS.contains(&claim.claim_type.as_str()) {
                        Value::Array(vec![claim.value.clone()])
                    } else {
                        claim.value.clone()
                    };
                    payload.insert(claim.claim_type.clone(), value);
                }
            }
        }
        payload
    }

    fn token_from_payload(payload: Map<String, Value>) -> Option<Token> {
        let issuer = payload.get("iss")?.as_str()?.to_string();
        let audience = match payload.get("aud")? {
            Value::String(aud) => aud.clone(),
            Value::Array(auds) => auds.first()?.as_str()?.to_string(),
            _ => return None,
        };
        let iat = payload.get("iat")?.as_i64()?;
        let exp = payload.get("exp")?.as_i64()?;
        let creation_time = DateTime::<Utc>::from_timestamp(iat, 0)?;
        let lifetime = u32::try_from(exp.saturating_sub(iat)).ok()?;

        let client_claim = payload
            .get(claim_types::CLIENT_ID)
            .and_then(Value::as_str)
            .map(str::to_string);
        let kind = if client_claim.is_some() {
            TokenKind::Access
        } else {
            TokenKind::Identity
        };
        let client_id = client_claim.unwrap_or_else(|| audience.clone());

        let mut claims = Vec::new();
        for (claim_type, value) in payload {
            if ENVELOPE_CLAIMS.contains(&claim_type.as_str()) {
                continue;
            }
            match value {
                Value::Array(values) => {
                    claims.extend(values.into_iter().map(|v| Claim::new(claim_type.clone(), v)));
                }
                value => claims.push(Claim::new(claim_type, value)),
            }
        }

        Some(Token {
            kind,
            issuer,
            audience,
            creation_time,
            lifetime,
            client_id,
            access_token_type: AccessTokenType::Jwt,
            claims,
        })
    }
}

#[async_trait]
impl TokenSigningService for JwtTokenSigner {
    async fn sign(&self, token: &Token) -> Result<String> {
        let mut header = Header::new(self.algorithm);
        header.kid = self.key_id.clone();

        let payload = Self::payload(token);
        encode(&header, &payload, &self.encoding_key).map_err(|e| {
            error!(error = %e, kind = token.kind.as_str(), "Token signing failed");
            Error::Signing(e.to_string())
        })
    }
}

#[async_trait]
impl TokenVerifier for JwtTokenSigner {
    async fn verify(&self, jwt: &str, audience: &str) -> Result<Option<Token>> {
        let mut validation = Validation::new(self.algorithm);
        validation.set_audience(&[audience]);
        validation.set_issuer(&[&self.issuer]);
        // lifetime is judged by the caller
        validation.validate_exp = false;
        validation.validate_nbf = false;

        let data = match decode::<Map<String, Value>>(jwt, &self.decoding_key, &validation) {
            Ok(data) => data,
            Err(e) => {
                warn!(error = %e, "JWT verification failed");
                return Ok(None);
            }
        };

        let token = Self::token_from_payload(data.claims);
        if token.is_none() {
            warn!("JWT payload is missing envelope claims");
        } else {
            debug!(audience, "JWT verified");
        }
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &[u8] = b"0123456789abcdef0123456789abcdef";

    fn access_token() -> Token {
        let mut token = Token::new(
            TokenKind::Access,
            "client",
            "https://issuer",
            "https://issuer/resources",
            3600,
        );
        token.claims = vec![
            Claim::new("client_id", "client"),
            Claim::new("scope", "api1"),
            Claim::new("scope", "api2"),
            Claim::new("sub", "alice"),
            Claim::new("amr", "password"),
        ];
        token
    }

    #[tokio::test]
    async fn test_sign_then_verify() {
        let signer = JwtTokenSigner::hs256(KEY, "https://issuer").with_key_id("k1");
        let jwt = signer.sign(&access_token()).await.unwrap();
        assert_eq!(jwt.split('.').count(), 3);

        let header = jsonwebtoken::decode_header(&jwt).unwrap();
        assert_eq!(header.kid.as_deref(), Some("k1"));

        let token = signer
            .verify(&jwt, "https://issuer/resources")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(token.kind, TokenKind::Access);
        assert_eq!(token.client_id, "client");
        assert_eq!(token.lifetime, 3600);
        let scopes: Vec<_> = token.claim_values("scope").collect();
        assert_eq!(scopes, vec!["api1", "api2"]);
    }

    #[tokio::test]
    async fn test_multi_valued_claims_become_arrays() {
        let payload = JwtTokenSigner::payload(&access_token());
        assert_eq!(payload["scope"], serde_json::json!(["api1", "api2"]));
        assert_eq!(payload["amr"], serde_json::json!(["password"]));
        assert_eq!(payload["sub"], serde_json::json!("alice"));
    }

    #[tokio::test]
    async fn test_wrong_key_or_audience_is_rejected() {
        let signer = JwtTokenSigner::hs256(KEY, "https://issuer");
        let other = JwtTokenSigner::hs256(b"another-key-another-key-another-key", "https://issuer");
        let jwt = signer.sign(&access_token()).await.unwrap();

        assert!(other.verify(&jwt, "https://issuer/resources").await.unwrap().is_none());
        assert!(signer.verify(&jwt, "https://elsewhere").await.unwrap().is_none());
    }

    #[test]
    fn test_from_options_requires_key_material() {
        let options = KeywardOptions::default();
        assert!(matches!(
            JwtTokenSigner::from_options(&options),
            Err(Error::Signing(_))
        ));

        let options = KeywardOptions::builder()
            .symmetric_key("0123456789abcdef0123456789abcdef")
            .key_id("main")
            .build();
        let signer = JwtTokenSigner::from_options(&options).unwrap();
        assert_eq!(signer.key_id.as_deref(), Some("main"));
    }
}
