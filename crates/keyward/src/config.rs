//! Server options
//!
//! [`KeywardOptions`] is loaded from TOML, YAML or JSON with environment
//! overrides (`KEYWARD__SIGNING__KEY_ID=...`), or assembled with
//! [`KeywardOptions::builder`].

use std::path::PathBuf;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

/// Environment variable prefix used by [`KeywardOptions::from_file`]
pub const ENV_PREFIX: &str = "KEYWARD";

/// Top-level options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeywardOptions {
    /// Issuer (`iss`) of every token this server produces
    pub issuer_uri: String,
    /// Human readable site name
    pub site_name: String,
    /// Login policy
    pub authentication: AuthenticationOptions,
    /// Token signing key material
    pub signing: SigningOptions,
    /// Audit trail settings
    pub audit: AuditOptions,
    /// Logging settings (consumed by the host binary)
    pub logging: LoggingOptions,
    /// Maximum accepted parameter lengths
    pub input_limits: InputLengthLimits,
}

/// Login policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthenticationOptions {
    /// Server-wide switch for local (username/password) login
    pub enable_local_login: bool,
    /// Identity provider name recorded for local logins
    pub local_identity_provider: String,
}

/// Supported JWT signing algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SigningAlgorithm {
    /// HMAC with SHA-256 over a shared symmetric key
    HS256,
    /// RSASSA-PKCS1-v1_5 with SHA-256
    RS256,
}

/// Token signing key material
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SigningOptions {
    /// JWS algorithm
    pub algorithm: SigningAlgorithm,
    /// `kid` header value
    pub key_id: Option<String>,
    /// Shared key for HS256
    #[serde(
        serialize_with = "serialize_optional_secret",
        deserialize_with = "deserialize_optional_secret"
    )]
    pub symmetric_key: Option<SecretString>,
    /// PEM encoded RSA private key for RS256
    #[serde(
        serialize_with = "serialize_optional_secret",
        deserialize_with = "deserialize_optional_secret"
    )]
    pub private_key_pem: Option<SecretString>,
    /// PEM encoded RSA public key for RS256 verification
    pub public_key_pem: Option<String>,
}

impl std::fmt::Debug for SigningOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningOptions")
            .field("algorithm", &self.algorithm)
            .field("key_id", &self.key_id)
            .field("symmetric_key", &self.symmetric_key.as_ref().map(|_| "[REDACTED]"))
            .field(
                "private_key_pem",
                &self.private_key_pem.as_ref().map(|_| "[REDACTED]"),
            )
            .field("public_key_pem", &self.public_key_pem.is_some())
            .finish()
    }
}

/// Audit trail settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditOptions {
    /// Service name stamped on every audit record
    pub service_name: String,
    /// Hash subject and client identifiers before logging
    pub hash_identifiers: bool,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingOptions {
    /// `EnvFilter` directive, e.g. `info` or `keyward=debug`
    pub level: String,
    /// Emit JSON lines instead of human readable output
    pub json: bool,
}

/// Maximum accepted lengths for untrusted request parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputLengthLimits {
    pub client_id: usize,
    pub scope: usize,
    pub redirect_uri: usize,
    pub nonce: usize,
    pub ui_locales: usize,
    pub login_hint: usize,
    pub acr_values: usize,
    pub state: usize,
    pub code: usize,
    pub user_name: usize,
    pub password: usize,
    pub refresh_token: usize,
    pub grant_type: usize,
    pub assertion: usize,
}

impl Default for KeywardOptions {
    fn default() -> Self {
        Self {
            issuer_uri: "https://localhost".to_string(),
            site_name: "keyward".to_string(),
            authentication: AuthenticationOptions::default(),
            signing: SigningOptions::default(),
            audit: AuditOptions::default(),
            logging: LoggingOptions::default(),
            input_limits: InputLengthLimits::default(),
        }
    }
}

impl Default for AuthenticationOptions {
    fn default() -> Self {
        Self {
            enable_local_login: true,
            local_identity_provider: "idsrv".to_string(),
        }
    }
}

impl Default for SigningOptions {
    fn default() -> Self {
        Self {
            algorithm: SigningAlgorithm::HS256,
            key_id: None,
            symmetric_key: None,
            private_key_pem: None,
            public_key_pem: None,
        }
    }
}

impl Default for AuditOptions {
    fn default() -> Self {
        Self {
            service_name: "keyward".to_string(),
            hash_identifiers: true,
        }
    }
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl Default for InputLengthLimits {
    fn default() -> Self {
        Self {
            client_id: 100,
            scope: 300,
            redirect_uri: 400,
            nonce: 300,
            ui_locales: 100,
            login_hint: 100,
            acr_values: 300,
            state: 2000,
            code: 100,
            user_name: 100,
            password: 100,
            refresh_token: 100,
            grant_type: 100,
            assertion: 8000,
        }
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file not found
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    /// Unsupported file format
    #[error("Unsupported configuration file format. Use .toml, .yaml, .yml, or .json")]
    UnsupportedFormat,

    /// Configuration parsing error
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] config::ConfigError),

    /// Options are well-formed but inconsistent
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl KeywardOptions {
    /// Load options from a file (TOML, YAML, or JSON)
    ///
    /// The format is picked from the file extension. Environment variables
    /// with the `KEYWARD__` prefix override file settings, `__` separating
    /// nested keys (`KEYWARD__AUTHENTICATION__ENABLE_LOCAL_LOGIN=false`).
    ///
    /// # Errors
    ///
    /// Returns an error if the file doesn't exist, has an unsupported
    /// extension, fails to parse, or fails [`KeywardOptions::validate`].
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        Self::from_file_with_prefix(path, ENV_PREFIX)
    }

    /// Load options from a file with a custom environment prefix
    ///
    /// # Errors
    ///
    /// Same as [`KeywardOptions::from_file`].
    pub fn from_file_with_prefix(
        path: impl AsRef<std::path::Path>,
        env_prefix: &str,
    ) -> Result<Self, ConfigError> {
        use config::{Config, File, FileFormat};

        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let format = match path.extension().and_then(|s| s.to_str()) {
            Some("toml") => FileFormat::Toml,
            Some("yaml") | Some("yml") => FileFormat::Yaml,
            Some("json") => FileFormat::Json,
            _ => return Err(ConfigError::UnsupportedFormat),
        };

        let config = Config::builder()
            .add_source(File::new(
                path.to_str().ok_or(ConfigError::UnsupportedFormat)?,
                format,
            ))
            .add_source(
                config::Environment::with_prefix(env_prefix)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let options: Self = config.try_deserialize()?;
        options.validate()?;
        Ok(options)
    }

    /// Create an options builder
    pub fn builder() -> KeywardOptionsBuilder {
        KeywardOptionsBuilder::new()
    }

    /// Check cross-field consistency
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] when the issuer is not an absolute URI, the
    /// signing material does not match the algorithm, or a length limit is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if url::Url::parse(&self.issuer_uri).is_err() {
            return Err(ConfigError::Invalid(format!(
                "issuer_uri is not an absolute URI: {}",
                self.issuer_uri
            )));
        }

        match self.signing.algorithm {
            SigningAlgorithm::HS256 => {
                if let Some(key) = &self.signing.symmetric_key
                    && key.expose_secret().len() < 32
                {
                    return Err(ConfigError::Invalid(
                        "symmetric_key must be at least 32 bytes for HS256".to_string(),
                    ));
                }
            }
            SigningAlgorithm::RS256 => {
                if self.signing.private_key_pem.is_none() || self.signing.public_key_pem.is_none()
                {
                    return Err(ConfigError::Invalid(
                        "RS256 requires private_key_pem and public_key_pem".to_string(),
                    ));
                }
            }
        }

        let limits = &self.input_limits;
        let any_zero = [
            limits.client_id,
            limits.scope,
            limits.redirect_uri,
            limits.nonce,
            limits.ui_locales,
            limits.login_hint,
            limits.acr_values,
            limits.state,
            limits.code,
            limits.user_name,
            limits.password,
            limits.refresh_token,
            limits.grant_type,
            limits.assertion,
        ]
        .contains(&0);
        if any_zero {
            return Err(ConfigError::Invalid(
                "input length limits must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

/// Options builder
#[derive(Debug)]
pub struct KeywardOptionsBuilder {
    options: KeywardOptions,
}

impl KeywardOptionsBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            options: KeywardOptions::default(),
        }
    }

    /// Set the issuer URI
    pub fn issuer_uri(mut self, issuer: impl Into<String>) -> Self {
        self.options.issuer_uri = issuer.into();
        self
    }

    /// Set the site name
    pub fn site_name(mut self, name: impl Into<String>) -> Self {
        self.options.site_name = name.into();
        self
    }

    /// Enable or disable local login server-wide
    #[must_use]
    pub fn enable_local_login(mut self, enabled: bool) -> Self {
        self.options.authentication.enable_local_login = enabled;
        self
    }

    /// Sign with HS256 using a shared key
    pub fn symmetric_key(mut self, key: impl Into<String>) -> Self {
        self.options.signing.algorithm = SigningAlgorithm::HS256;
        self.options.signing.symmetric_key = Some(SecretString::new(key.into()));
        self
    }

    /// Sign with RS256 using a PEM key pair
    pub fn rsa_keys(mut self, private_pem: impl Into<String>, public_pem: impl Into<String>) -> Self {
        self.options.signing.algorithm = SigningAlgorithm::RS256;
        self.options.signing.private_key_pem = Some(SecretString::new(private_pem.into()));
        self.options.signing.public_key_pem = Some(public_pem.into());
        self
    }

    /// Set the `kid` header
    pub fn key_id(mut self, key_id: impl Into<String>) -> Self {
        self.options.signing.key_id = Some(key_id.into());
        self
    }

    /// Service name for audit records
    pub fn audit_service_name(mut self, name: impl Into<String>) -> Self {
        self.options.audit.service_name = name.into();
        self
    }

    /// Hash identifiers in audit records
    #[must_use]
    pub fn hash_identifiers(mut self, enabled: bool) -> Self {
        self.options.audit.hash_identifiers = enabled;
        self
    }

    /// Set log level
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.options.logging.level = level.into();
        self
    }

    /// Override input length limits
    #[must_use]
    pub fn input_limits(mut self, limits: InputLengthLimits) -> Self {
        self.options.input_limits = limits;
        self
    }

    /// Build the options
    #[must_use]
    pub fn build(self) -> KeywardOptions {
        self.options
    }
}

impl Default for KeywardOptionsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn serialize_optional_secret<S>(
    secret: &Option<SecretString>,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    match secret {
        Some(secret) => serializer.serialize_some(secret.expose_secret()),
        None => serializer.serialize_none(),
    }
}

fn deserialize_optional_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.map(SecretString::new))
}
