use std::sync::Arc;

use tracing::{debug, info};

use super::wrap::{unwrap_master_key, wrap_master_key};
use super::{Authenticator, Ceremony, PasskeyCredential, PasskeyServer};
use crate::crypto::keys::{KeyHandle, RawKey};
use crate::errors::Result;

/// Result of a completed registration ceremony.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationOutcome {
    /// The master key was wrapped and stored with the credential.
    Wrapped { credential_id: String },
    /// The authenticator gave no PRF output during registration; a later
    /// `activate_hardware_key_wrap` is needed.
    NeedsActivation { credential_id: String },
}

/// Result of a completed activation ceremony.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivationOutcome {
    Activated { credential_id: String },
    /// The authenticator still returned no PRF output.
    PrfUnavailable { credential_id: String },
}

/// How a hardware-key unlock resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HardwareAuthMode {
    /// The master key was unwrapped.
    KeyUnwrapped,
    /// The user is authenticated but no key could be produced; fall back
    /// to password unlock.
    PasswordRequired,
}

#[derive(Debug)]
pub struct HardwareAuthentication {
    pub credential_id: String,
    pub key: Option<KeyHandle>,
    pub mode: HardwareAuthMode,
}

/// Registers hardware credentials and unlocks with them.
pub struct HardwareKeyService {
    server: Arc<dyn PasskeyServer>,
    authenticator: Arc<dyn Authenticator>,
}

impl HardwareKeyService {
    pub fn new(server: Arc<dyn PasskeyServer>, authenticator: Arc<dyn Authenticator>) -> Self {
        Self {
            server,
            authenticator,
        }
    }

    /// Register a new credential and, if the authenticator cooperates,
    /// wrap `master` under it.
    pub async fn register_hardware_key(
        &self,
        master: &RawKey,
        device_label: &str,
    ) -> Result<Ceremony<RegistrationOutcome>> {
        let options = self
            .server
            .generate_registration_options(device_label)
            .await?;

        let response = match self.authenticator.register(&options).await? {
            Ceremony::Completed(response) => response,
            Ceremony::Cancelled => {
                debug!(%device_label, "hardware key registration cancelled");
                return Ok(Ceremony::Cancelled);
            }
        };

        self.server
            .verify_registration(&response.credential_id, &response.attestation, device_label)
            .await?;

        let credential_id = response.credential_id;
        let outcome = match response.prf_output {
            Some(prf) => {
                let wrapped = wrap_master_key(master, &prf, &credential_id)?;
                self.server
                    .save_wrapped_key(&credential_id, &wrapped)
                    .await?;
                info!(%credential_id, "hardware key registered with wrapped master key");
                RegistrationOutcome::Wrapped { credential_id }
            }
            None => {
                info!(%credential_id, "hardware key registered, wrap pending activation");
                RegistrationOutcome::NeedsActivation { credential_id }
            }
        };
        Ok(Ceremony::Completed(outcome))
    }

    /// Run an authentication ceremony only to obtain PRF output, then wrap
    /// `master` for the credential used.
    pub async fn activate_hardware_key_wrap(
        &self,
        master: &RawKey,
    ) -> Result<Ceremony<ActivationOutcome>> {
        let options = self.server.generate_authentication_options().await?;
        let response = match self.authenticator.authenticate(&options).await? {
            Ceremony::Completed(response) => response,
            Ceremony::Cancelled => return Ok(Ceremony::Cancelled),
        };

        let verified = self
            .server
            .verify_authentication(&response.credential_id, &response.assertion)
            .await?;
        let credential_id = verified.credential_id;

        let Some(prf) = response.prf_output else {
            return Ok(Ceremony::Completed(ActivationOutcome::PrfUnavailable {
                credential_id,
            }));
        };

        let wrapped = wrap_master_key(master, &prf, &credential_id)?;
        self.server
            .save_wrapped_key(&credential_id, &wrapped)
            .await?;
        info!(%credential_id, "hardware key wrap activated");
        Ok(Ceremony::Completed(ActivationOutcome::Activated {
            credential_id,
        }))
    }

    /// Unlock with a hardware key.
    ///
    /// The unwrapped raw key lives only long enough to be imported into a
    /// `KeyHandle`; its buffer is wiped on every path out of this function.
    pub async fn authenticate_with_hardware_key(
        &self,
    ) -> Result<Ceremony<HardwareAuthentication>> {
        let options = self.server.generate_authentication_options().await?;
        let response = match self.authenticator.authenticate(&options).await? {
            Ceremony::Completed(response) => response,
            Ceremony::Cancelled => return Ok(Ceremony::Cancelled),
        };

        let verified = self
            .server
            .verify_authentication(&response.credential_id, &response.assertion)
            .await?;
        let credential_id = verified.credential_id;

        let (Some(prf), Some(wrapped)) = (response.prf_output, verified.wrapped_key) else {
            debug!(%credential_id, "no PRF output or wrapped key, password unlock required");
            return Ok(Ceremony::Completed(HardwareAuthentication {
                credential_id,
                key: None,
                mode: HardwareAuthMode::PasswordRequired,
            }));
        };

        let raw = unwrap_master_key(&wrapped, &prf, &credential_id)?;
        let key = KeyHandle::from_raw(&raw)?;
        drop(raw);

        Ok(Ceremony::Completed(HardwareAuthentication {
            credential_id,
            key: Some(key),
            mode: HardwareAuthMode::KeyUnwrapped,
        }))
    }

    pub async fn list_credentials(&self) -> Result<Vec<PasskeyCredential>> {
        self.server.list_credentials().await
    }

    pub async fn delete_credential(&self, credential_id: &str) -> Result<()> {
        self.server.delete_credential(credential_id).await?;
        info!(%credential_id, "hardware key deleted");
        Ok(())
    }
}
