//! Loadable node configuration (§6 "Configuration"), an ambient addition
//! not named by the distilled spec.
//!
//! [`TransferConfig`] is deserialized from TOML, with every field
//! defaulted so a partial or absent file still produces a runnable node.
//! Defaults mirror every value §6 names.

use std::path::PathBuf;
use std::time::Duration;

use maptransfer_engine::{
    AuthCapabilities, AuthConfig, SessionConfig, VerificationKey, auth, session,
};
use serde::Deserialize;
use thiserror::Error;

use crate::coordinator::CoordinatorConfig;

/// Failures loading or validating a [`TransferConfig`].
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("reading config file: {0}")]
    Io(#[from] std::io::Error),
    /// The config file was not valid TOML for this shape.
    #[error("parsing config file: {0}")]
    Toml(#[from] toml::de::Error),
    /// `auth_required_signature = true` but no public key was given, or
    /// `false` but no development secret was given.
    #[error("auth_required_signature={required_signature} but no matching key material was given")]
    MissingKeyMaterial {
        /// The mode that had no matching key material.
        required_signature: bool,
    },
    /// `auth_public_key_hex` or `auth_dev_secret` was not valid hex.
    #[error("key material is not valid hex: {0}")]
    InvalidKeyHex(#[from] hex::FromHexError),
}

/// Auth-specific section of [`TransferConfig`] (§6 `auth.*`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthSection {
    /// Handshake window, in seconds.
    pub window_seconds: u64,
    /// Max verification attempts before a challenge is burned.
    pub max_attempts: u32,
    /// Whether a real ECDSA-P256 signature is required (`true` in
    /// production) or the development keyed digest is accepted (`false`).
    pub required_signature: bool,
    /// Hex-encoded SEC1 P-256 public key, required when
    /// `required_signature = true`.
    #[serde(default)]
    pub public_key_hex: Option<String>,
    /// Shared secret for the development keyed digest, required when
    /// `required_signature = false`.
    #[serde(default)]
    pub dev_secret_hex: Option<String>,
}

impl Default for AuthSection {
    fn default() -> Self {
        Self {
            window_seconds: auth::DEFAULT_AUTH_WINDOW.as_secs(),
            max_attempts: auth::DEFAULT_MAX_ATTEMPTS,
            required_signature: true,
            public_key_hex: None,
            dev_secret_hex: None,
        }
    }
}

/// Top-level configuration for a node, loaded from TOML (§6).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// This device's own identifier, mixed into the auth binding payload.
    pub server_id: String,
    /// Negotiated chunk length, in bytes (§6 `chunk_size`).
    pub chunk_size: u32,
    /// Reject `transfer_init` whose wire size exceeds this (§6
    /// `max_transfer_size`).
    pub max_transfer_size: u64,
    /// Acceptance rate cap, in chunks per second (§6
    /// `max_chunks_per_second`).
    pub max_chunks_per_second: u32,
    /// Liveness timeout since last activity, in seconds (§6
    /// `session_timeout_seconds`).
    pub session_timeout_seconds: u64,
    /// Whether `transfer_init` must carry a signature.
    pub require_signature: bool,
    /// Auth handshake policy.
    pub auth: AuthSection,
    /// Path to the installed canonical map file.
    pub active_path: PathBuf,
    /// Directory backups are rotated into.
    pub backup_dir: PathBuf,
    /// Backups retained before the oldest is evicted (§6 `max_backups`).
    pub max_backups: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            server_id: "maptransfer-node".to_string(),
            chunk_size: session::DEFAULT_CHUNK_SIZE,
            max_transfer_size: session::DEFAULT_MAX_TRANSFER_SIZE,
            max_chunks_per_second: session::DEFAULT_MAX_CHUNKS_PER_SECOND,
            session_timeout_seconds: session::DEFAULT_SESSION_TIMEOUT.as_secs(),
            require_signature: true,
            auth: AuthSection::default(),
            active_path: PathBuf::from("installed_map.json"),
            backup_dir: PathBuf::from("map_backups"),
            max_backups: crate_default_max_backups(),
        }
    }
}

fn crate_default_max_backups() -> usize {
    maptransfer_store::FsMapStore::DEFAULT_MAX_BACKUPS
}

impl TransferConfig {
    /// Load from a TOML file, falling back to [`Default`] for any field
    /// the file omits.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Io`] if the file cannot be read, [`ConfigError::Toml`]
    /// if its contents do not parse as this shape.
    pub fn load_from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&text)?;
        Ok(config)
    }

    /// Build the [`CoordinatorConfig`] this node should run with.
    ///
    /// # Errors
    ///
    /// [`ConfigError::MissingKeyMaterial`] if `auth.required_signature`
    /// names a mode with no corresponding key material configured.
    /// [`ConfigError::InvalidKeyHex`] if the configured key material is not
    /// valid hex.
    pub fn to_coordinator_config(&self) -> Result<CoordinatorConfig, ConfigError> {
        let verification_key = if self.auth.required_signature {
            let hex_key = self
                .auth
                .public_key_hex
                .as_deref()
                .ok_or(ConfigError::MissingKeyMaterial { required_signature: true })?;
            VerificationKey::EcdsaP256(hex::decode(hex_key)?)
        } else {
            let hex_secret = self
                .auth
                .dev_secret_hex
                .as_deref()
                .ok_or(ConfigError::MissingKeyMaterial { required_signature: false })?;
            VerificationKey::KeyedDigest(hex::decode(hex_secret)?)
        };

        let auth = AuthConfig {
            window: Duration::from_secs(self.auth.window_seconds),
            max_attempts: self.auth.max_attempts,
            session_lifetime: auth::DEFAULT_SESSION_LIFETIME,
            verification_key,
            capabilities: AuthCapabilities {
                max_transfer_size: self.max_transfer_size,
                chunk_size: self.chunk_size,
                ..AuthCapabilities::default()
            },
        };

        let session = SessionConfig {
            chunk_size: self.chunk_size,
            max_transfer_size: self.max_transfer_size,
            max_chunks_per_second: self.max_chunks_per_second,
            session_timeout: Duration::from_secs(self.session_timeout_seconds),
            require_signature: self.require_signature,
        };

        Ok(CoordinatorConfig { server_id: self.server_id.clone(), auth, session })
    }
}
