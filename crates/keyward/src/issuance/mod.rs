//! Token issuance: claims, signing, authorization codes and refresh tokens

mod authorize_response;
mod refresh_token_service;
mod token_response;
mod token_service;

pub use authorize_response::{AuthorizeResponse, AuthorizeResponseGenerator};
pub use refresh_token_service::{RefreshTokenRotation, RefreshTokenService, renewed_lifetime};
pub use token_response::{TokenResponse, TokenResponseGenerator};
pub use token_service::{IdentityTokenRequest, TokenService, left_half_hash};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use rand::rngs::OsRng;

/// Bytes of entropy in codes and handles
const HANDLE_BYTES: usize = 32;

/// Fresh unguessable handle for codes, reference tokens and refresh tokens
pub(crate) fn new_handle() -> String {
    let mut bytes = [0u8; HANDLE_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
