//! Hardware-key (passkey) unlock.
//!
//! A hardware authenticator that supports the PRF extension returns a
//! pseudorandom output bound to the credential and a per-credential salt.
//! That output, expanded with HKDF, wraps the raw master key. The wrapped
//! key is ciphertext and is stored server-side next to the credential; the
//! PRF output itself never leaves the device.
//!
//! Credential verification and challenge issuance happen on the trusted
//! server (`PasskeyServer`). The ceremony itself is driven through the
//! platform authenticator (`Authenticator`). Both are collaborators.

pub mod service;
mod wrap;

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::encoding::{base64_decode, base64_encode};
use crate::errors::{Result, VaultCoreError};

pub use service::{
    ActivationOutcome, HardwareAuthMode, HardwareAuthentication, HardwareKeyService,
    RegistrationOutcome,
};

/// Outcome of a user-facing ceremony.
///
/// Dismissal is a normal outcome, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ceremony<T> {
    Completed(T),
    Cancelled,
}

impl<T> Ceremony<T> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Ceremony::Cancelled)
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Ceremony<U> {
        match self {
            Ceremony::Completed(v) => Ceremony::Completed(f(v)),
            Ceremony::Cancelled => Ceremony::Cancelled,
        }
    }

    /// Collapse into a `Result`, with cancellation as `VaultCoreError::Cancelled`.
    pub fn into_result(self) -> Result<T> {
        match self {
            Ceremony::Completed(v) => Ok(v),
            Ceremony::Cancelled => Err(VaultCoreError::Cancelled),
        }
    }
}

/// Whether a credential already carries a wrapped master key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WrapStatus {
    Wrapped,
    NeedsActivation,
}

/// A registered hardware credential as listed by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasskeyCredential {
    pub id: String,
    pub device_label: String,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub wrap_status: WrapStatus,
}

/// Server-issued registration challenge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationOptions {
    /// Opaque ceremony options passed through to the authenticator.
    pub options: serde_json::Value,
    /// Salt for the PRF extension, unique to the new credential.
    #[serde(serialize_with = "base64_encode", deserialize_with = "base64_decode")]
    pub prf_salt: Vec<u8>,
}

/// Server-issued authentication challenge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticationOptions {
    pub options: serde_json::Value,
    /// PRF salts keyed by credential id.
    pub prf_salts: Vec<CredentialSalt>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialSalt {
    pub credential_id: String,
    #[serde(serialize_with = "base64_encode", deserialize_with = "base64_decode")]
    pub salt: Vec<u8>,
}

/// What the authenticator returned from a registration ceremony.
pub struct RegistrationResponse {
    pub credential_id: String,
    /// Attestation, forwarded to the server for verification.
    pub attestation: serde_json::Value,
    /// PRF output, when the authenticator evaluated the extension.
    pub prf_output: Option<Zeroizing<Vec<u8>>>,
}

/// What the authenticator returned from an authentication ceremony.
pub struct AuthenticationResponse {
    pub credential_id: String,
    pub assertion: serde_json::Value,
    pub prf_output: Option<Zeroizing<Vec<u8>>>,
}

impl fmt::Debug for RegistrationResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistrationResponse")
            .field("credential_id", &self.credential_id)
            .field("prf_output", &self.prf_output.as_ref().map(|_| "<redacted>"))
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for AuthenticationResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthenticationResponse")
            .field("credential_id", &self.credential_id)
            .field("prf_output", &self.prf_output.as_ref().map(|_| "<redacted>"))
            .finish_non_exhaustive()
    }
}

/// Server verdict on an assertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedAuthentication {
    pub credential_id: String,
    /// Wrapped master key stored for this credential, if any.
    pub wrapped_key: Option<String>,
}

/// The trusted server actions. Implementations must not be bypassable
/// client-side.
#[async_trait]
pub trait PasskeyServer: Send + Sync {
    async fn generate_registration_options(&self, device_label: &str)
        -> Result<RegistrationOptions>;

    /// Verify the attestation and record the credential.
    async fn verify_registration(
        &self,
        credential_id: &str,
        attestation: &serde_json::Value,
        device_label: &str,
    ) -> Result<()>;

    async fn generate_authentication_options(&self) -> Result<AuthenticationOptions>;

    async fn verify_authentication(
        &self,
        credential_id: &str,
        assertion: &serde_json::Value,
    ) -> Result<VerifiedAuthentication>;

    async fn list_credentials(&self) -> Result<Vec<PasskeyCredential>>;

    async fn delete_credential(&self, credential_id: &str) -> Result<()>;

    /// Store the wrapped master key for a credential and mark it wrapped.
    async fn save_wrapped_key(&self, credential_id: &str, wrapped_key: &str) -> Result<()>;
}

/// The platform authenticator.
///
/// Ceremonies may wait indefinitely on the user; dismissal is reported as
/// `Ceremony::Cancelled`.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn register(
        &self,
        options: &RegistrationOptions,
    ) -> Result<Ceremony<RegistrationResponse>>;

    async fn authenticate(
        &self,
        options: &AuthenticationOptions,
    ) -> Result<Ceremony<AuthenticationResponse>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelled_ceremony_maps_to_cancelled_error() {
        let c: Ceremony<u8> = Ceremony::Cancelled;
        assert!(c.is_cancelled());
        assert!(matches!(c.into_result(), Err(VaultCoreError::Cancelled)));
    }

    #[test]
    fn options_serialize_salt_as_base64() {
        let opts = RegistrationOptions {
            options: serde_json::json!({ "rp": "example" }),
            prf_salt: vec![0xff; 4],
        };
        let json = serde_json::to_value(&opts).unwrap();
        assert_eq!(json["prf_salt"], "/////w==");
    }
}
