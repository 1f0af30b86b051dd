//! Protocol vocabulary and static lookup tables
//!
//! Response types, response modes, prompt modes and standard scopes are
//! closed enums; their relationships (response type → flow, flow → allowed
//! response modes, standard scope → claim types) are exhaustive `match`
//! tables so that adding a variant is a compile error until every table
//! covers it.

use serde::{Deserialize, Serialize};

use crate::models::Flow;

/// Request parameter names
pub mod params {
    pub const CLIENT_ID: &str = "client_id";
    pub const CLIENT_SECRET: &str = "client_secret";
    pub const REDIRECT_URI: &str = "redirect_uri";
    pub const RESPONSE_TYPE: &str = "response_type";
    pub const RESPONSE_MODE: &str = "response_mode";
    pub const SCOPE: &str = "scope";
    pub const STATE: &str = "state";
    pub const NONCE: &str = "nonce";
    pub const PROMPT: &str = "prompt";
    pub const MAX_AGE: &str = "max_age";
    pub const UI_LOCALES: &str = "ui_locales";
    pub const LOGIN_HINT: &str = "login_hint";
    pub const ACR_VALUES: &str = "acr_values";
    pub const DISPLAY: &str = "display";
    pub const GRANT_TYPE: &str = "grant_type";
    pub const CODE: &str = "code";
    pub const USER_NAME: &str = "username";
    pub const PASSWORD: &str = "password";
    pub const REFRESH_TOKEN: &str = "refresh_token";
    pub const ASSERTION: &str = "assertion";
}

/// Standard grant type identifiers
pub mod grant_types {
    pub const AUTHORIZATION_CODE: &str = "authorization_code";
    pub const CLIENT_CREDENTIALS: &str = "client_credentials";
    pub const PASSWORD: &str = "password";
    pub const REFRESH_TOKEN: &str = "refresh_token";
    pub const JWT_BEARER: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
    pub const SAML2_BEARER: &str = "urn:ietf:params:oauth:grant-type:saml2-bearer";
}

/// JWT / OIDC claim type names
pub mod claim_types {
    pub const SUBJECT: &str = "sub";
    pub const NAME: &str = "name";
    pub const GIVEN_NAME: &str = "given_name";
    pub const FAMILY_NAME: &str = "family_name";
    pub const MIDDLE_NAME: &str = "middle_name";
    pub const NICKNAME: &str = "nickname";
    pub const PREFERRED_USERNAME: &str = "preferred_username";
    pub const PROFILE: &str = "profile";
    pub const PICTURE: &str = "picture";
    pub const WEBSITE: &str = "website";
    pub const GENDER: &str = "gender";
    pub const BIRTHDATE: &str = "birthdate";
    pub const ZONE_INFO: &str = "zoneinfo";
    pub const LOCALE: &str = "locale";
    pub const UPDATED_AT: &str = "updated_at";
    pub const EMAIL: &str = "email";
    pub const EMAIL_VERIFIED: &str = "email_verified";
    pub const ADDRESS: &str = "address";
    pub const PHONE_NUMBER: &str = "phone_number";
    pub const PHONE_NUMBER_VERIFIED: &str = "phone_number_verified";

    pub const CLIENT_ID: &str = "client_id";
    pub const SCOPE: &str = "scope";
    pub const AUTHENTICATION_TIME: &str = "auth_time";
    pub const IDENTITY_PROVIDER: &str = "idp";
    pub const AUTHENTICATION_METHOD: &str = "amr";
    pub const NONCE: &str = "nonce";
    pub const ACCESS_TOKEN_HASH: &str = "at_hash";
    pub const AUTHORIZATION_CODE_HASH: &str = "c_hash";
    pub const JWT_ID: &str = "jti";
}

/// Prefix of the identity-provider hint inside `acr_values`
pub const IDP_ACR_PREFIX: &str = "idp:";

/// Token type discriminators
pub const ACCESS_TOKEN_TYPE: &str = "access_token";
pub const IDENTITY_TOKEN_TYPE: &str = "id_token";

/// `token_type` returned from the token endpoint
pub const BEARER_TOKEN_TYPE: &str = "Bearer";

/// Audience of access tokens: the issuer's resource servers
pub fn access_token_audience(issuer_uri: &str) -> String {
    format!("{}/resources", issuer_uri.trim_end_matches('/'))
}

/// One component of a `response_type` value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ResponseTypePart {
    Code,
    Token,
    IdToken,
}

impl ResponseTypePart {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "code" => Some(Self::Code),
            "token" => Some(Self::Token),
            "id_token" => Some(Self::IdToken),
            _ => None,
        }
    }
}

/// The seven supported `response_type` combinations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResponseType {
    /// `code`
    Code,
    /// `token`
    Token,
    /// `id_token`
    IdToken,
    /// `id_token token`
    IdTokenToken,
    /// `code id_token`
    CodeIdToken,
    /// `code token`
    CodeToken,
    /// `code id_token token`
    CodeIdTokenToken,
}

impl ResponseType {
    /// Every supported combination
    pub const ALL: [ResponseType; 7] = [
        ResponseType::Code,
        ResponseType::Token,
        ResponseType::IdToken,
        ResponseType::IdTokenToken,
        ResponseType::CodeIdToken,
        ResponseType::CodeToken,
        ResponseType::CodeIdTokenToken,
    ];

    /// Parse a space-delimited `response_type` value.
    ///
    /// Component order is irrelevant (`token id_token` == `id_token token`);
    /// unknown or empty components make the whole value unsupported.
    pub fn parse(value: &str) -> Option<Self> {
        let mut code = false;
        let mut token = false;
        let mut id_token = false;
        let mut any = false;

        for part in value.split_whitespace() {
            any = true;
            match ResponseTypePart::parse(part)? {
                ResponseTypePart::Code => code = true,
                ResponseTypePart::Token => token = true,
                ResponseTypePart::IdToken => id_token = true,
            }
        }

        if !any {
            return None;
        }

        match (code, id_token, token) {
            (true, false, false) => Some(ResponseType::Code),
            (false, false, true) => Some(ResponseType::Token),
            (false, true, false) => Some(ResponseType::IdToken),
            (false, true, true) => Some(ResponseType::IdTokenToken),
            (true, true, false) => Some(ResponseType::CodeIdToken),
            (true, false, true) => Some(ResponseType::CodeToken),
            (true, true, true) => Some(ResponseType::CodeIdTokenToken),
            (false, false, false) => None,
        }
    }

    /// Canonical wire form
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseType::Code => "code",
            ResponseType::Token => "token",
            ResponseType::IdToken => "id_token",
            ResponseType::IdTokenToken => "id_token token",
            ResponseType::CodeIdToken => "code id_token",
            ResponseType::CodeToken => "code token",
            ResponseType::CodeIdTokenToken => "code id_token token",
        }
    }

    /// Flow implied by the response type
    pub fn flow(&self) -> Flow {
        match self {
            ResponseType::Code => Flow::AuthorizationCode,
            ResponseType::Token | ResponseType::IdToken | ResponseType::IdTokenToken => {
                Flow::Implicit
            }
            ResponseType::CodeIdToken
            | ResponseType::CodeToken
            | ResponseType::CodeIdTokenToken => Flow::Hybrid,
        }
    }

    /// Scope classes the response type needs
    pub fn scope_requirement(&self) -> ScopeRequirement {
        match self {
            ResponseType::Code => ScopeRequirement::None,
            ResponseType::Token => ScopeRequirement::ResourceOnly,
            ResponseType::IdToken => ScopeRequirement::IdentityOnly,
            ResponseType::IdTokenToken
            | ResponseType::CodeIdToken
            | ResponseType::CodeToken
            | ResponseType::CodeIdTokenToken => ScopeRequirement::Identity,
        }
    }

    /// Response mode used when the request does not name one
    pub fn default_response_mode(&self) -> ResponseMode {
        match self.flow() {
            Flow::AuthorizationCode => ResponseMode::Query,
            _ => ResponseMode::Fragment,
        }
    }

    /// Whether an authorization code is part of the response
    pub fn includes_code(&self) -> bool {
        matches!(
            self,
            ResponseType::Code
                | ResponseType::CodeIdToken
                | ResponseType::CodeToken
                | ResponseType::CodeIdTokenToken
        )
    }

    /// Whether an identity token is part of the response
    pub fn includes_identity_token(&self) -> bool {
        matches!(
            self,
            ResponseType::IdToken
                | ResponseType::IdTokenToken
                | ResponseType::CodeIdToken
                | ResponseType::CodeIdTokenToken
        )
    }

    /// Whether an access token is part of the front-channel response
    pub fn includes_access_token(&self) -> bool {
        matches!(
            self,
            ResponseType::Token
                | ResponseType::IdTokenToken
                | ResponseType::CodeToken
                | ResponseType::CodeIdTokenToken
        )
    }
}

impl std::fmt::Display for ResponseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scope classification a response type demands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeRequirement {
    /// No constraint
    None,
    /// Resource scopes required, identity scopes forbidden
    ResourceOnly,
    /// Identity scopes required, resource scopes forbidden
    IdentityOnly,
    /// Identity scopes required
    Identity,
}

impl ScopeRequirement {
    /// Whether the `openid` scope must be requested
    pub fn requires_identity(&self) -> bool {
        matches!(self, ScopeRequirement::Identity | ScopeRequirement::IdentityOnly)
    }
}

/// How the authorization response is delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseMode {
    /// Parameters in the redirect URI query string
    Query,
    /// Parameters in the redirect URI fragment
    Fragment,
    /// Auto-submitting HTML form POSTed to the redirect URI
    FormPost,
}

impl ResponseMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "query" => Some(ResponseMode::Query),
            "fragment" => Some(ResponseMode::Fragment),
            "form_post" => Some(ResponseMode::FormPost),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseMode::Query => "query",
            ResponseMode::Fragment => "fragment",
            ResponseMode::FormPost => "form_post",
        }
    }

    /// Whether this mode may carry the response of `flow`.
    ///
    /// Tokens must never travel in a query string.
    pub fn is_allowed_for(&self, flow: Flow) -> bool {
        match flow {
            Flow::AuthorizationCode => {
                matches!(self, ResponseMode::Query | ResponseMode::FormPost)
            }
            Flow::Implicit | Flow::Hybrid => {
                matches!(self, ResponseMode::Fragment | ResponseMode::FormPost)
            }
            Flow::ClientCredentials | Flow::ResourceOwner | Flow::Custom => false,
        }
    }
}

/// `prompt` values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptMode {
    None,
    Login,
    Consent,
    SelectAccount,
}

impl PromptMode {
    /// Parse a prompt value; unsupported values yield `None` and are ignored
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "none" => Some(PromptMode::None),
            "login" => Some(PromptMode::Login),
            "consent" => Some(PromptMode::Consent),
            "select_account" => Some(PromptMode::SelectAccount),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PromptMode::None => "none",
            PromptMode::Login => "login",
            PromptMode::Consent => "consent",
            PromptMode::SelectAccount => "select_account",
        }
    }
}

/// `display` values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayMode {
    Page,
    Popup,
    Touch,
    Wap,
}

impl DisplayMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "page" => Some(DisplayMode::Page),
            "popup" => Some(DisplayMode::Popup),
            "touch" => Some(DisplayMode::Touch),
            "wap" => Some(DisplayMode::Wap),
            _ => None,
        }
    }
}

/// Scopes defined by OpenID Connect Core §5.4 and §11
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StandardScope {
    OpenId,
    Profile,
    Email,
    Address,
    Phone,
    OfflineAccess,
}

impl StandardScope {
    pub const ALL: [StandardScope; 6] = [
        StandardScope::OpenId,
        StandardScope::Profile,
        StandardScope::Email,
        StandardScope::Address,
        StandardScope::Phone,
        StandardScope::OfflineAccess,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            StandardScope::OpenId => "openid",
            StandardScope::Profile => "profile",
            StandardScope::Email => "email",
            StandardScope::Address => "address",
            StandardScope::Phone => "phone",
            StandardScope::OfflineAccess => "offline_access",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.name() == name)
    }

    /// Claim types released by the scope
    pub fn claims(&self) -> &'static [&'static str] {
        use claim_types::*;
        match self {
            StandardScope::OpenId => &[SUBJECT],
            StandardScope::Profile => &[
                NAME,
                FAMILY_NAME,
                GIVEN_NAME,
                MIDDLE_NAME,
                NICKNAME,
                PREFERRED_USERNAME,
                PROFILE,
                PICTURE,
                WEBSITE,
                GENDER,
                BIRTHDATE,
                ZONE_INFO,
                LOCALE,
                UPDATED_AT,
            ],
            StandardScope::Email => &[EMAIL, EMAIL_VERIFIED],
            StandardScope::Address => &[ADDRESS],
            StandardScope::Phone => &[PHONE_NUMBER, PHONE_NUMBER_VERIFIED],
            StandardScope::OfflineAccess => &[],
        }
    }
}

/// Name of the `openid` scope
pub const OPENID_SCOPE: &str = "openid";

/// Name of the `offline_access` scope
pub const OFFLINE_ACCESS_SCOPE: &str = "offline_access";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_type_parse_is_order_independent() {
        assert_eq!(
            ResponseType::parse("token id_token"),
            Some(ResponseType::IdTokenToken)
        );
        assert_eq!(
            ResponseType::parse("id_token token code"),
            Some(ResponseType::CodeIdTokenToken)
        );
        assert_eq!(ResponseType::parse("  code  "), Some(ResponseType::Code));
    }

    #[test]
    fn test_response_type_rejects_unknown_parts() {
        assert_eq!(ResponseType::parse(""), None);
        assert_eq!(ResponseType::parse("code device"), None);
        assert_eq!(ResponseType::parse("none"), None);
    }

    #[test]
    fn test_response_type_round_trips_wire_form() {
        for rt in ResponseType::ALL {
            assert_eq!(ResponseType::parse(rt.as_str()), Some(rt));
        }
    }

    #[test]
    fn test_flow_table() {
        assert_eq!(ResponseType::Code.flow(), Flow::AuthorizationCode);
        assert_eq!(ResponseType::Token.flow(), Flow::Implicit);
        assert_eq!(ResponseType::IdToken.flow(), Flow::Implicit);
        assert_eq!(ResponseType::IdTokenToken.flow(), Flow::Implicit);
        assert_eq!(ResponseType::CodeIdToken.flow(), Flow::Hybrid);
        assert_eq!(ResponseType::CodeToken.flow(), Flow::Hybrid);
        assert_eq!(ResponseType::CodeIdTokenToken.flow(), Flow::Hybrid);
    }

    #[test]
    fn test_scope_requirements() {
        assert_eq!(ResponseType::Code.scope_requirement(), ScopeRequirement::None);
        assert_eq!(
            ResponseType::Token.scope_requirement(),
            ScopeRequirement::ResourceOnly
        );
        assert_eq!(
            ResponseType::IdToken.scope_requirement(),
            ScopeRequirement::IdentityOnly
        );
        assert!(ResponseType::CodeIdTokenToken.scope_requirement().requires_identity());
        assert!(!ResponseType::Token.scope_requirement().requires_identity());
    }

    #[test]
    fn test_default_response_modes() {
        assert_eq!(ResponseType::Code.default_response_mode(), ResponseMode::Query);
        assert_eq!(
            ResponseType::IdToken.default_response_mode(),
            ResponseMode::Fragment
        );
        assert_eq!(
            ResponseType::CodeIdToken.default_response_mode(),
            ResponseMode::Fragment
        );
    }

    #[test]
    fn test_response_mode_compatibility() {
        assert!(ResponseMode::Query.is_allowed_for(Flow::AuthorizationCode));
        assert!(!ResponseMode::Query.is_allowed_for(Flow::Implicit));
        assert!(!ResponseMode::Query.is_allowed_for(Flow::Hybrid));
        assert!(ResponseMode::FormPost.is_allowed_for(Flow::Hybrid));
        assert!(!ResponseMode::Fragment.is_allowed_for(Flow::AuthorizationCode));
    }

    #[test]
    fn test_prompt_ignores_unknown_values() {
        assert_eq!(PromptMode::parse("consent"), Some(PromptMode::Consent));
        assert_eq!(PromptMode::parse("always"), None);
    }

    #[test]
    fn test_standard_scope_claims() {
        assert_eq!(StandardScope::from_name("email"), Some(StandardScope::Email));
        assert!(StandardScope::Profile.claims().contains(&"given_name"));
        assert!(StandardScope::OfflineAccess.claims().is_empty());
        assert_eq!(StandardScope::OpenId.claims(), &["sub"]);
    }
}
