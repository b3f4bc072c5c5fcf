//! Provisioning profile rewriting
//!
//! A profile is a CMS envelope around an XML property list. Rewriting one
//! means:
//! 1. decode the envelope with `security cms -D`
//! 2. replace `DeveloperCertificates` with the run's certificate
//! 3. drop the stale `DER-Encoded-Profile` signature copy
//! 4. re-sign with `security cms -S` using the ephemeral keychain
//!
//! Steps 2 and 3 are done by one of two editors: [`native`] edits the plist
//! in-process, [`plutil`] drives Apple's `plutil` one entry at a time.

pub mod native;
pub mod plutil;

use crate::cleanup_path;
use crate::config::{EditorKind, ToolPaths};
use crate::credentials::Credentials;
use crate::error::{Error, Result};
use crate::tools;
use std::ffi::OsString;
use std::path::Path;

/// Array of DER certificates allowed to sign apps covered by the profile
pub const DEVELOPER_CERTIFICATES: &str = "DeveloperCertificates";

/// Apple's embedded signature copy; stale once the certificates change
pub const DER_ENCODED_PROFILE: &str = "DER-Encoded-Profile";

/// Rewrites profiles against one identity and keychain
pub struct ProfileRewriter<'a> {
    tools: &'a ToolPaths,
    editor: EditorKind,
    credentials: &'a Credentials,
    keychain: &'a Path,
}

impl<'a> ProfileRewriter<'a> {
    #[must_use]
    pub fn new(
        tools: &'a ToolPaths,
        editor: EditorKind,
        credentials: &'a Credentials,
        keychain: &'a Path,
    ) -> Self {
        Self {
            tools,
            editor,
            credentials,
            keychain,
        }
    }

    /// Rewrite `source` and write the re-signed profile to `destination`.
    ///
    /// The decoded plist lives in a scratch file that is removed on every
    /// exit path. A failed signature leaves no file at `destination`.
    pub async fn rewrite(&self, source: &Path, destination: &Path) -> Result<()> {
        let decoded = decode_profile(&self.tools.security, source).await?;

        let scratch = tempfile::Builder::new()
            .prefix("profile-")
            .suffix(".plist")
            .tempfile()?;

        match self.editor {
            EditorKind::Native => {
                let certificate = self.credentials.certificate_der()?;
                native::rewrite(source, &decoded, certificate, scratch.path())?;
            }
            EditorKind::Plutil => {
                tokio::fs::write(scratch.path(), &decoded).await?;
                plutil::rewrite(
                    &self.tools.plutil,
                    scratch.path(),
                    &self.credentials.certificate_base64,
                )
                .await?;
            }
        }

        sign_profile(
            &self.tools.security,
            self.keychain,
            &self.credentials.signing_identity,
            scratch.path(),
            destination,
        )
        .await
    }
}

/// Strip the CMS envelope and return the embedded property list
pub async fn decode_profile(security: &Path, source: &Path) -> Result<Vec<u8>> {
    let args: Vec<OsString> = vec!["cms".into(), "-D".into(), "-i".into(), source.into()];
    let output = tools::run(security, &args).await?;

    if !output.status.success() {
        return Err(Error::InvalidProfile {
            path: source.to_path_buf(),
            reason: format!(
                "security cms -D failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        });
    }

    if output.stdout.is_empty() {
        return Err(Error::InvalidProfile {
            path: source.to_path_buf(),
            reason: "decoded to an empty property list".to_string(),
        });
    }

    Ok(output.stdout)
}

/// Wrap `plist` in a CMS signature made with `identity` from `keychain`
pub async fn sign_profile(
    security: &Path,
    keychain: &Path,
    identity: &str,
    plist: &Path,
    destination: &Path,
) -> Result<()> {
    let args: Vec<OsString> = vec![
        "cms".into(),
        "-S".into(),
        "-k".into(),
        keychain.into(),
        "-N".into(),
        identity.into(),
        "-i".into(),
        plist.into(),
        "-o".into(),
        destination.into(),
    ];
    let output = tools::run(security, &args).await?;

    if !output.status.success() {
        cleanup_path(destination, "partially signed profile").await;
        return Err(Error::CommandExecution(format!(
            "security cms -S failed for {}: {}",
            destination.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    Ok(())
}
