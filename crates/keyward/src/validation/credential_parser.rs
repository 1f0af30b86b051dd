//! Client credential extraction
//!
//! One credential source per request, in priority order:
//!
//! 1. `Authorization: Basic base64(urlencode(id):urlencode(secret))`
//! 2. `client_id` + `client_secret` form fields
//!
//! A transport-level client certificate is extracted in addition to either.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use secrecy::SecretString;

use crate::constants::params;
use crate::models::Parameters;

/// Where a credential came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    BasicAuthentication,
    PostBody,
    X509Certificate,
}

impl CredentialSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialSource::BasicAuthentication => "basic",
            CredentialSource::PostBody => "post_body",
            CredentialSource::X509Certificate => "x509",
        }
    }
}

/// A presented client id and shared secret
#[derive(Debug, Clone)]
pub struct ClientCredential {
    pub client_id: String,
    pub secret: SecretString,
    pub source: CredentialSource,
}

/// A presented client certificate, reduced to its thumbprint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientCertificate {
    pub client_id: String,
    pub thumbprint: String,
}

/// Outcome of credential extraction
///
/// `is_malformed` is set when a Basic header was present but could not be
/// decoded; callers should hard-fail such requests rather than falling
/// through to other sources.
#[derive(Debug, Clone, Default)]
pub struct ClientCredentialParseResult {
    pub is_present: bool,
    pub is_malformed: bool,
    pub credential: Option<ClientCredential>,
    pub certificate: Option<ClientCertificate>,
}

impl ClientCredentialParseResult {
    fn malformed() -> Self {
        Self {
            is_present: true,
            is_malformed: true,
            ..Self::default()
        }
    }

    /// Client id claimed by whichever credential was presented
    pub fn client_id(&self) -> Option<&str> {
        self.credential
            .as_ref()
            .map(|c| c.client_id.as_str())
            .or_else(|| self.certificate.as_ref().map(|c| c.client_id.as_str()))
    }
}

enum BasicHeader {
    Absent,
    Malformed,
    Credential(String, String),
}

/// Extract client credentials from a token request
///
/// `authorization` is the raw `Authorization` header value, `certificate_thumbprint`
/// the hex thumbprint of a TLS client certificate when the host terminates mTLS.
pub fn parse_client_credentials(
    authorization: Option<&str>,
    body: &Parameters,
    certificate_thumbprint: Option<&str>,
) -> ClientCredentialParseResult {
    let mut result = match parse_basic_header(authorization) {
        BasicHeader::Malformed => return ClientCredentialParseResult::malformed(),
        BasicHeader::Credential(client_id, secret) => ClientCredentialParseResult {
            is_present: true,
            credential: Some(ClientCredential {
                client_id,
                secret: SecretString::new(secret),
                source: CredentialSource::BasicAuthentication,
            }),
            ..ClientCredentialParseResult::default()
        },
        BasicHeader::Absent => {
            match (body.get(params::CLIENT_ID), body.get(params::CLIENT_SECRET)) {
                (Some(client_id), Some(secret)) => ClientCredentialParseResult {
                    is_present: true,
                    credential: Some(ClientCredential {
                        client_id: client_id.to_string(),
                        secret: SecretString::new(secret.to_string()),
                        source: CredentialSource::PostBody,
                    }),
                    ..ClientCredentialParseResult::default()
                },
                _ => ClientCredentialParseResult::default(),
            }
        }
    };

    if let Some(thumbprint) = certificate_thumbprint.filter(|t| !t.trim().is_empty()) {
        let client_id = result
            .credential
            .as_ref()
            .map(|c| c.client_id.clone())
            .or_else(|| body.get(params::CLIENT_ID).map(str::to_string));
        if let Some(client_id) = client_id {
            result.is_present = true;
            result.certificate = Some(ClientCertificate {
                client_id,
                thumbprint: thumbprint.trim().to_string(),
            });
        }
    }

    result
}

fn parse_basic_header(authorization: Option<&str>) -> BasicHeader {
    let Some(header) = authorization.map(str::trim) else {
        return BasicHeader::Absent;
    };

    let Some((scheme, encoded)) = header.split_once(' ') else {
        return BasicHeader::Absent;
    };
    if !scheme.eq_ignore_ascii_case("basic") {
        return BasicHeader::Absent;
    }

    let Ok(decoded) = STANDARD.decode(encoded.trim()) else {
        return BasicHeader::Malformed;
    };
    let Ok(decoded) = String::from_utf8(decoded) else {
        return BasicHeader::Malformed;
    };
    let Some((client_id, secret)) = decoded.split_once(':') else {
        return BasicHeader::Malformed;
    };

    match (urlencoding::decode(client_id), urlencoding::decode(secret)) {
        (Ok(client_id), Ok(secret)) if !client_id.trim().is_empty() => {
            BasicHeader::Credential(client_id.into_owned(), secret.into_owned())
        }
        _ => BasicHeader::Malformed,
    }
}
