//! Ephemeral keychain holding the signing identity for one run

use crate::config::{KEYCHAIN_PREFIX, KeychainConfig};
use crate::credentials::Bundle;
use crate::error::{Error, Result};
use crate::tools;
use fs4::tokio::AsyncFileExt;
use rand::distr::{Alphanumeric, SampleString};
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use zeroize::Zeroize;

/// Programs allowed to use the imported key without prompting
const TRUSTED_APPLICATIONS: [&str; 2] = ["/usr/bin/codesign", "/usr/bin/security"];

/// Partition list granted to the imported key
const PARTITION_LIST: &str = "apple-tool:,apple:";

/// Temporary keychain that is deleted when dropped
///
/// Created with a random name (unless a fixed one is configured), appended
/// to the user's keychain search list, unlocked, and loaded with the bundle's
/// identity. Call [`TempKeychain::destroy`] when done; `Drop` deletes it as
/// a fallback.
///
/// # Example
/// ```no_run
/// # async fn example() -> fake_profile_sign::error::Result<()> {
/// use fake_profile_sign::config::KeychainConfig;
/// use fake_profile_sign::credentials::Bundle;
/// use fake_profile_sign::keychain::TempKeychain;
/// use std::path::Path;
///
/// let bundle = Bundle::new("certs/SelfSigned.p12", "");
/// let keychain = TempKeychain::create(Path::new("security"), &bundle, &KeychainConfig::default()).await?;
/// // sign with keychain.path()
/// keychain.destroy().await;
/// # Ok(())
/// # }
/// ```
pub struct TempKeychain {
    path: PathBuf,
    password: String,
    security: PathBuf,
    deleted: bool,
    _lock: Option<tokio::fs::File>,
}

impl TempKeychain {
    /// Create the keychain and import the bundle's identity into it.
    ///
    /// A stale keychain at the same path is deleted first (failure ignored).
    /// Every later step is fatal; the half-built keychain is deleted before
    /// the error is returned.
    pub async fn create(security: &Path, bundle: &Bundle, config: &KeychainConfig) -> Result<Self> {
        let file_name = match &config.name {
            Some(name) => name.clone(),
            None => generate_keychain_name(),
        };

        let directory = match &config.directory {
            Some(dir) => dir.clone(),
            None => dirs::home_dir()
                .ok_or_else(|| Error::InvalidConfig("HOME not set".to_string()))?
                .join("Library/Keychains"),
        };
        let path = directory.join(&file_name);

        // Fixed names are shared between runs; serialize them
        let lock = match &config.name {
            Some(name) => Some(lock_fixed_name(&directory, name).await?),
            None => None,
        };

        let password = Alphanumeric.sample_string(&mut rand::rng(), 16);

        let stale = tools::run(security, [OsStr::new("delete-keychain"), path.as_os_str()]).await?;
        if stale.status.success() {
            log::debug!("removed stale keychain {}", path.display());
        }

        run_security(
            security,
            vec!["create-keychain".into(), "-p".into(), password.as_str().into(), path.clone().into()],
        )
        .await?;

        let keychain = Self {
            path,
            password,
            security: security.to_path_buf(),
            deleted: false,
            _lock: lock,
        };

        let prepared = keychain.prepare(bundle).await;
        match prepared {
            Ok(()) => Ok(keychain),
            Err(e) => {
                keychain.destroy().await;
                Err(e)
            }
        }
    }

    async fn prepare(&self, bundle: &Bundle) -> Result<()> {
        self.add_to_search_list().await?;

        // No timeout: the keychain must stay unlocked for the whole batch
        run_security(
            &self.security,
            vec!["set-keychain-settings".into(), self.path.clone().into()],
        )
        .await?;

        run_security(
            &self.security,
            vec![
                "unlock-keychain".into(),
                "-p".into(),
                self.password.as_str().into(),
                self.path.clone().into(),
            ],
        )
        .await?;

        let mut import: Vec<OsString> = vec![
            "import".into(),
            bundle.path().into(),
            "-k".into(),
            self.path.clone().into(),
            "-P".into(),
            bundle.password().into(),
        ];
        for app in TRUSTED_APPLICATIONS {
            import.push("-T".into());
            import.push(app.into());
        }
        run_security(&self.security, import).await?;

        // Prevents password prompts when codesign/security use the key
        run_security(
            &self.security,
            vec![
                "set-key-partition-list".into(),
                "-S".into(),
                PARTITION_LIST.into(),
                "-k".into(),
                self.password.as_str().into(),
                self.path.clone().into(),
            ],
        )
        .await?;

        Ok(())
    }

    async fn add_to_search_list(&self) -> Result<()> {
        let current = run_security(
            &self.security,
            vec!["list-keychains".into(), "-d".into(), "user".into()],
        )
        .await?;

        let mut keychains = parse_search_list(&String::from_utf8_lossy(&current));
        let ours = self.path.to_string_lossy().to_string();
        if !keychains.contains(&ours) {
            keychains.push(ours);
        }

        let mut args: Vec<OsString> = vec!["list-keychains".into(), "-d".into(), "user".into(), "-s".into()];
        args.extend(keychains.into_iter().map(OsString::from));
        run_security(&self.security, args).await?;

        Ok(())
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the keychain.
    ///
    /// Best-effort: failures are printed as warnings and never returned, so
    /// cleanup cannot hide the error that triggered it.
    pub async fn destroy(mut self) {
        self.deleted = true;

        match tools::run(&self.security, [OsStr::new("delete-keychain"), self.path.as_os_str()]).await {
            Ok(output) if output.status.success() => {
                log::debug!("deleted keychain {}", self.path.display());
            }
            Ok(output) => {
                warn!(
                    "Keychain deletion returned non-zero: {}",
                    String::from_utf8_lossy(&output.stderr).trim()
                );
            }
            Err(e) => {
                warn!("Failed to delete keychain {}: {e}", self.path.display());
            }
        }
    }
}

impl Drop for TempKeychain {
    fn drop(&mut self) {
        if !self.deleted {
            let _ = std::process::Command::new(&self.security)
                .arg("delete-keychain")
                .arg(&self.path)
                .output();
        }
        self.password.zeroize();
    }
}

/// Random keychain file name, unique per run
#[must_use]
pub fn generate_keychain_name() -> String {
    format!(
        "{KEYCHAIN_PREFIX}-{}.keychain-db",
        Alphanumeric.sample_string(&mut rand::rng(), 16)
    )
}

/// Parse `security list-keychains` output into plain paths
///
/// Input:
/// ```text
///     "/Users/ci/Library/Keychains/login.keychain-db"
///     "/Library/Keychains/System.keychain"
/// ```
#[must_use]
pub fn parse_search_list(output: &str) -> Vec<String> {
    output
        .lines()
        .map(|l| l.trim().trim_matches('"').to_string())
        .filter(|l| !l.is_empty())
        .collect()
}

/// Lock file `.<name>.lock` next to the keychain, held until the keychain is dropped.
///
/// The file itself is left in place after the run. Unlinking it while
/// another run waits on it would let a third run lock a fresh inode and
/// share the keychain name.
async fn lock_fixed_name(directory: &Path, name: &str) -> Result<tokio::fs::File> {
    tokio::fs::create_dir_all(directory).await?;

    let lock_file = tokio::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(directory.join(format!(".{name}.lock")))
        .await?;

    // Blocks while another run holds the same keychain name
    lock_file.lock_exclusive().map_err(|e| {
        Error::KeychainOperation(format!("Failed to acquire keychain lock: {e}"))
    })?;

    Ok(lock_file)
}

async fn run_security(security: &Path, args: Vec<OsString>) -> Result<Vec<u8>> {
    let label = tools::label(security, &args);
    let output = tools::run(security, &args).await?;

    if !output.status.success() {
        return Err(Error::KeychainOperation(format!(
            "{label} failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    Ok(output.stdout)
}
