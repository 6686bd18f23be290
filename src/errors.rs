use thiserror::Error;

/// All errors that can occur in the vault core.
#[derive(Debug, Error)]
pub enum VaultCoreError {
    // --- Key derivation ---
    #[error("Unknown KDF version {0}")]
    UnknownKdfVersion(u32),

    #[error("Key derivation failed: {0}")]
    KeyDerivationFailed(String),

    // --- Symmetric / asymmetric crypto ---
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed — wrong key or tampered ciphertext")]
    DecryptionFailed,

    #[error("Ciphertext version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u8, found: u8 },

    #[error("Invalid ciphertext format: {0}")]
    InvalidFormat(String),

    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    #[error("Duress password must differ from the master password")]
    DuressPasswordReused,

    // --- Key provisioning ---
    #[error("Master password required to provision key material")]
    MasterPasswordRequired,

    #[error("Storage conflict — another writer provisioned this record first")]
    StorageConflict,

    // --- Collaborators ---
    #[error("Connectivity unavailable")]
    ConnectivityUnavailable,

    #[error("Remote store error: {0}")]
    Remote(String),

    #[error("Local cache error: {0}")]
    Storage(String),

    #[error("Authenticator error: {0}")]
    Authenticator(String),

    #[error("User cancelled the authenticator ceremony")]
    Cancelled,

    // --- Config / serialization ---
    #[error("Config file error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification used by callers deciding how to react to a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    UnknownKdfVersion,
    DecryptionFailure,
    VersionMismatch,
    MasterPasswordRequired,
    StorageConflict,
    ConnectivityUnavailable,
    Cancelled,
    Other,
}

impl VaultCoreError {
    /// Map this error onto the taxonomy class callers branch on.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownKdfVersion(_) => ErrorKind::UnknownKdfVersion,
            Self::DecryptionFailed => ErrorKind::DecryptionFailure,
            Self::VersionMismatch { .. } => ErrorKind::VersionMismatch,
            Self::MasterPasswordRequired => ErrorKind::MasterPasswordRequired,
            Self::StorageConflict => ErrorKind::StorageConflict,
            Self::ConnectivityUnavailable => ErrorKind::ConnectivityUnavailable,
            Self::Cancelled => ErrorKind::Cancelled,
            _ => ErrorKind::Other,
        }
    }

    /// Returns `true` if retrying once the device is back online may succeed.
    pub fn is_connectivity(&self) -> bool {
        self.kind() == ErrorKind::ConnectivityUnavailable
    }
}

/// Convenience type alias for vault core results.
pub type Result<T> = std::result::Result<T, VaultCoreError>;
