//! Authentication module for the chat gateway
//!
//! Every socket is authenticated once, during the upgrade request, before
//! it can send or receive application events.

mod authenticator;
mod verifier;

pub use authenticator::{ConnectionAuthenticator, Handshake};
pub use verifier::{Claims, CredentialVerifier, JwtVerifier};

#[cfg(test)]
pub use verifier::MockCredentialVerifier;
