//! Profile editing through `plutil`
//!
//! `plutil` only removes one array index at a time, so the certificate list
//! is drained by removing index 0 until that fails. Success is judged by exit
//! status alone.

use super::{DER_ENCODED_PROFILE, DEVELOPER_CERTIFICATES};
use crate::error::{Error, Result};
use crate::tools;
use std::ffi::OsStr;
use std::path::Path;

/// Edit the decoded plist at `plist` in place
pub async fn rewrite(plutil: &Path, plist: &Path, certificate_base64: &str) -> Result<()> {
    let removed = drain_developer_certificates(plutil, plist).await?;
    log::debug!("removed {removed} developer certificate(s)");

    insert_certificate(plutil, plist, certificate_base64).await?;

    if !remove_entry(plutil, plist, DER_ENCODED_PROFILE).await? {
        log::debug!("profile had no {DER_ENCODED_PROFILE}");
    }

    Ok(())
}

/// Remove `DeveloperCertificates.0` until the array is empty. Returns the count removed.
pub async fn drain_developer_certificates(plutil: &Path, plist: &Path) -> Result<usize> {
    let first = format!("{DEVELOPER_CERTIFICATES}.0");
    let mut removed = 0;

    while remove_entry(plutil, plist, &first).await? {
        removed += 1;
    }

    Ok(removed)
}

/// Put the certificate at index 0, creating the array if the profile had none
pub async fn insert_certificate(plutil: &Path, plist: &Path, certificate_base64: &str) -> Result<()> {
    let first = format!("{DEVELOPER_CERTIFICATES}.0");
    let insert = [
        OsStr::new("-insert"),
        OsStr::new(&first),
        OsStr::new("-data"),
        OsStr::new(certificate_base64),
        plist.as_os_str(),
    ];

    if tools::run(plutil, insert).await?.status.success() {
        return Ok(());
    }

    tools::run_checked(
        plutil,
        [
            OsStr::new("-insert"),
            OsStr::new(DEVELOPER_CERTIFICATES),
            OsStr::new("-array"),
            plist.as_os_str(),
        ],
    )
    .await?;
    tools::run_checked(plutil, insert).await?;

    Ok(())
}

/// Remove `keypath`. Returns `false` when there was nothing to remove.
///
/// A failed removal is only accepted when a follow-up extract confirms the
/// entry is gone; otherwise the file would be left half-edited.
pub async fn remove_entry(plutil: &Path, plist: &Path, keypath: &str) -> Result<bool> {
    let output = tools::run(
        plutil,
        [OsStr::new("-remove"), OsStr::new(keypath), plist.as_os_str()],
    )
    .await?;

    if output.status.success() {
        return Ok(true);
    }

    if entry_exists(plutil, plist, keypath).await? {
        return Err(Error::CommandExecution(format!(
            "plutil could not remove {keypath} from {}: {}",
            plist.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    Ok(false)
}

/// Whether `keypath` resolves to a value
pub async fn entry_exists(plutil: &Path, plist: &Path, keypath: &str) -> Result<bool> {
    let output = tools::run(
        plutil,
        [
            OsStr::new("-extract"),
            OsStr::new(keypath),
            OsStr::new("raw"),
            OsStr::new("-o"),
            OsStr::new("-"),
            plist.as_os_str(),
        ],
    )
    .await?;

    Ok(output.status.success())
}
