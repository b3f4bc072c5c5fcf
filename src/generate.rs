//! Batch driver: re-sign every profile in a directory

use crate::config::{GenerateConfig, PROFILE_EXTENSION};
use crate::credentials::{Bundle, Credentials};
use crate::error::{Error, Result};
use crate::keychain::TempKeychain;
use crate::profile::ProfileRewriter;
use crate::tools;
use std::path::{Path, PathBuf};

/// Directories and settings for one run.
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    /// Directory containing the `*.mobileprovision` files to re-sign
    pub source_dir: PathBuf,
    /// Existing directory receiving the re-signed profiles
    pub destination_dir: PathBuf,
    /// Directory containing the PKCS#12 bundle
    pub certs_dir: PathBuf,
    pub config: GenerateConfig,
}

impl GenerateOptions {
    #[must_use]
    pub fn p12_path(&self) -> PathBuf {
        self.certs_dir.join(&self.config.p12_name)
    }
}

/// Outcome of a run.
#[derive(Debug, Clone)]
pub struct GenerateReport {
    pub signing_identity: String,
    /// Source profiles, in processing order (planned order for dry runs)
    pub profiles: Vec<PathBuf>,
    /// `*.mobileprovision` files found in the destination afterwards
    pub generated: usize,
}

/// Re-sign every profile in `source_dir` into `destination_dir`.
///
/// The keychain is created once and destroyed after the batch whether or not
/// a profile failed. The first failing profile aborts the rest of the batch.
pub async fn generate_profiles(options: &GenerateOptions) -> Result<GenerateReport> {
    let config = &options.config;
    let p12_path = options.p12_path();

    validate_inputs(&p12_path, &options.destination_dir).await?;
    tools::check_dependencies(&config.tools, config.editor)?;

    let bundle = Bundle::new(&p12_path, &config.p12_password).with_legacy(config.openssl_legacy);
    let credentials = Credentials::from_bundle(&config.tools.openssl, &bundle).await?;
    step!("Using signing identity: {}", credentials.signing_identity);

    let profiles = list_profiles(&options.source_dir).await?;

    if config.dry_run {
        for profile in &profiles {
            step!("Would process {}", display_name(profile));
        }
        return Ok(GenerateReport {
            signing_identity: credentials.signing_identity,
            profiles,
            generated: 0,
        });
    }

    let keychain = TempKeychain::create(&config.tools.security, &bundle, &config.keychain).await?;

    let result = {
        let rewriter = ProfileRewriter::new(&config.tools, config.editor, &credentials, keychain.path());
        rewrite_all(&rewriter, &profiles, &options.destination_dir).await
    };

    keychain.destroy().await;
    result?;

    let generated = count_profiles(&options.destination_dir).await?;
    success!("Done. Generated {generated} profiles.");

    Ok(GenerateReport {
        signing_identity: credentials.signing_identity,
        profiles,
        generated,
    })
}

async fn rewrite_all(rewriter: &ProfileRewriter<'_>, profiles: &[PathBuf], destination_dir: &Path) -> Result<()> {
    for source in profiles {
        let Some(file_name) = source.file_name() else {
            continue;
        };
        step!("Processing {}", file_name.to_string_lossy());
        rewriter.rewrite(source, &destination_dir.join(file_name)).await?;
    }
    Ok(())
}

/// Fail unless the bundle file and destination directory exist
pub async fn validate_inputs(p12_path: &Path, destination_dir: &Path) -> Result<()> {
    if !tokio::fs::try_exists(p12_path).await.unwrap_or(false) {
        return Err(Error::MissingFile(p12_path.to_path_buf()));
    }

    let is_dir = tokio::fs::metadata(destination_dir)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false);
    if !is_dir {
        return Err(Error::MissingDirectory(destination_dir.to_path_buf()));
    }

    Ok(())
}

/// Profiles in `dir`, sorted by file name
pub async fn list_profiles(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut profiles = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !is_profile_name(&entry.file_name().to_string_lossy()) {
            continue;
        }
        if tokio::fs::metadata(&path).await?.is_file() {
            profiles.push(path);
        }
    }

    profiles.sort();
    Ok(profiles)
}

/// Number of profiles currently in `dir`
pub async fn count_profiles(dir: &Path) -> Result<usize> {
    Ok(list_profiles(dir).await?.len())
}

#[must_use]
pub fn is_profile_name(file_name: &str) -> bool {
    file_name.ends_with(&format!(".{PROFILE_EXTENSION}"))
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}
