pub mod clipboard;
pub mod config;
pub mod crypto;
mod encoding;
pub mod errors;
pub mod integrity;
pub mod logging;
pub mod offline;
pub mod passkey;
pub mod provision;
pub mod remote;
pub mod storage;
pub mod unlock;
pub mod vault;
