//! Configuration structures for profile generation.

use crate::error::Result;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// Certificate bundle looked up inside the certificates directory
pub const DEFAULT_P12_NAME: &str = "SelfSigned.p12";

/// File extension (without dot) of provisioning profiles
pub const PROFILE_EXTENSION: &str = "mobileprovision";

/// Prefix of generated keychain names
pub const KEYCHAIN_PREFIX: &str = "generate-profiles";

/// Settings for a generation run.
///
/// Loaded from TOML with [`GenerateConfig::load`]; every field has a default
/// so an empty file (or no file at all) is valid.
#[derive(Clone, Deserialize)]
pub struct GenerateConfig {
    /// File name of the PKCS#12 bundle inside the certificates directory
    #[serde(default = "default_p12_name")]
    pub p12_name: String,

    /// Password protecting the PKCS#12 bundle (fake-codesigning uses none)
    #[serde(default)]
    pub p12_password: String,

    /// How decoded profiles are edited
    #[serde(default)]
    pub editor: EditorKind,

    /// Pass `-legacy` to `openssl pkcs12` (required by OpenSSL 3, rejected by LibreSSL)
    #[serde(default = "default_true")]
    pub openssl_legacy: bool,

    #[serde(default)]
    pub keychain: KeychainConfig,

    #[serde(default)]
    pub tools: ToolPaths,

    /// Validate and list profiles without creating a keychain or writing files
    #[serde(default)]
    pub dry_run: bool,

    /// Verbose output
    #[serde(default)]
    pub verbose: bool,
}

impl Default for GenerateConfig {
    fn default() -> Self {
        Self {
            p12_name: default_p12_name(),
            p12_password: String::new(),
            editor: EditorKind::default(),
            openssl_legacy: true,
            keychain: KeychainConfig::default(),
            tools: ToolPaths::default(),
            dry_run: false,
            verbose: false,
        }
    }
}

// Hand-written so the bundle password never reaches logs
impl fmt::Debug for GenerateConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerateConfig")
            .field("p12_name", &self.p12_name)
            .field("p12_password", &"<redacted>")
            .field("editor", &self.editor)
            .field("openssl_legacy", &self.openssl_legacy)
            .field("keychain", &self.keychain)
            .field("tools", &self.tools)
            .field("dry_run", &self.dry_run)
            .field("verbose", &self.verbose)
            .finish()
    }
}

impl GenerateConfig {
    /// Load settings from a TOML file
    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

/// Ephemeral keychain placement.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct KeychainConfig {
    /// Fixed keychain file name. When unset a unique name is generated per run.
    #[serde(default)]
    pub name: Option<String>,

    /// Directory holding the keychain file (defaults to `~/Library/Keychains`)
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

/// Locations of the external programs the run depends on.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolPaths {
    #[serde(default = "default_security")]
    pub security: PathBuf,

    #[serde(default = "default_openssl")]
    pub openssl: PathBuf,

    #[serde(default = "default_plutil")]
    pub plutil: PathBuf,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            security: default_security(),
            openssl: default_openssl(),
            plutil: default_plutil(),
        }
    }
}

/// Strategy used to rewrite a decoded profile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum EditorKind {
    /// Edit the property list in-process with the `plist` crate
    #[default]
    Native,

    /// Edit the property list through `plutil`, one entry at a time
    Plutil,
}

fn default_p12_name() -> String {
    DEFAULT_P12_NAME.to_string()
}

fn default_security() -> PathBuf {
    PathBuf::from("security")
}

fn default_openssl() -> PathBuf {
    PathBuf::from("openssl")
}

fn default_plutil() -> PathBuf {
    PathBuf::from("plutil")
}

fn default_true() -> bool {
    true
}
