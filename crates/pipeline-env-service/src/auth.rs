//! Bearer token authentication.
//!
//! Requests may carry an `Authorization: Bearer <token>` header with an RS256
//! signed JWT. When the token verifies against the configured public key, an
//! [`Identity`] is attached to the request extensions. Requests without a
//! valid token are passed on without one: endpoints that require a caller
//! reject them on their own.
use actix_web::dev::ServiceRequest;
use actix_web::http::header::Header;
use actix_web::HttpMessage;
use actix_web_httpauth::headers::authorization::{Authorization, Bearer};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use log::debug;
use serde::Deserialize;
use thiserror::Error as ThisError;

/// The authenticated caller of a request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    /// Subject of the token.
    pub id: String,
    /// The raw bearer token, forwarded to services called on behalf of the caller.
    pub token: String,
}

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
}

#[derive(ThisError, Debug)]
pub enum AuthError {
    #[error("invalid public key for token verification: {0}")]
    InvalidPublicKey(jsonwebtoken::errors::Error),
}

/// Verifies bearer tokens.
///
/// Without a public key, every token is rejected.
#[derive(Clone)]
pub struct TokenVerifier {
    key: Option<DecodingKey>,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(public_key_pem: Option<&str>) -> Result<Self, AuthError> {
        let key = public_key_pem
            .map(|pem| DecodingKey::from_rsa_pem(pem.as_bytes()))
            .transpose()
            .map_err(AuthError::InvalidPublicKey)?;
        Ok(Self {
            key,
            validation: Validation::new(Algorithm::RS256),
        })
    }

    pub fn identify(&self, token: &str) -> Option<Identity> {
        let key = self.key.as_ref()?;
        match decode::<Claims>(token, key, &self.validation) {
            Ok(data) => Some(Identity {
                id: data.claims.sub,
                token: token.to_string(),
            }),
            Err(e) => {
                debug!("Rejected bearer token: {e}");
                None
            }
        }
    }
}

/// Attaches the [`Identity`] of the caller to the request, if it has one.
pub(crate) fn authenticate(req: &ServiceRequest, verifier: &TokenVerifier) {
    let Ok(authorization) = Authorization::<Bearer>::parse(req) else {
        return;
    };
    if let Some(identity) = verifier.identify(authorization.as_ref().token()) {
        req.extensions_mut().insert(identity);
    }
}
