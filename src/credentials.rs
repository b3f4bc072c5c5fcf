//! Signing credentials read from a PKCS#12 bundle via `openssl`

use crate::error::{Error, Result};
use crate::tools;
use base64::Engine;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use zeroize::Zeroize;

/// A PKCS#12 bundle on disk together with its password.
pub struct Bundle {
    path: PathBuf,
    password: String,
    legacy: bool,
}

impl Bundle {
    pub fn new(path: impl Into<PathBuf>, password: &str) -> Self {
        Self {
            path: path.into(),
            password: password.to_string(),
            legacy: true,
        }
    }

    /// Toggle `-legacy` for `openssl pkcs12` (LibreSSL does not know the flag)
    #[must_use]
    pub fn with_legacy(mut self, legacy: bool) -> Self {
        self.legacy = legacy;
        self
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }
}

impl Drop for Bundle {
    fn drop(&mut self) {
        self.password.zeroize();
    }
}

/// Identity and certificate shared by every profile in a run.
#[derive(Debug, Clone)]
pub struct Credentials {
    /// Common name of the certificate subject, used as the `security cms -N` nickname
    pub signing_identity: String,
    /// DER certificate, base64 encoded
    pub certificate_base64: String,
}

impl Credentials {
    /// Extract both parts from the bundle.
    ///
    /// Fails with [`Error::IdentityNotFound`] when the subject has no common name.
    pub async fn from_bundle(openssl: &Path, bundle: &Bundle) -> Result<Self> {
        let certificate_base64 = certificate_base64_from_bundle(openssl, bundle).await?;
        let signing_identity = signing_identity_from_bundle(openssl, bundle)
            .await?
            .ok_or_else(|| Error::IdentityNotFound(bundle.path().to_path_buf()))?;

        Ok(Self {
            signing_identity,
            certificate_base64,
        })
    }

    /// DER bytes of the certificate
    pub fn certificate_der(&self) -> Result<Vec<u8>> {
        Ok(base64::engine::general_purpose::STANDARD.decode(&self.certificate_base64)?)
    }
}

/// Decrypt the bundle and return its certificate(s) as PEM
pub async fn certificate_pem_from_bundle(openssl: &Path, bundle: &Bundle) -> Result<Vec<u8>> {
    let mut args: Vec<OsString> = vec![
        "pkcs12".into(),
        "-in".into(),
        bundle.path().as_os_str().to_os_string(),
        "-passin".into(),
        format!("pass:{}", bundle.password()).into(),
        "-nokeys".into(),
    ];
    if bundle.legacy {
        args.push("-legacy".into());
    }

    let output = tools::run(openssl, args).await?;
    if !output.status.success() {
        return Err(Error::CommandExecution(format!(
            "openssl pkcs12 could not read {}: {}",
            bundle.path().display(),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    if !output
        .stdout
        .windows(b"-----BEGIN CERTIFICATE-----".len())
        .any(|w| w == b"-----BEGIN CERTIFICATE-----")
    {
        return Err(Error::CommandExecution(format!(
            "openssl pkcs12 returned no certificate for {}",
            bundle.path().display()
        )));
    }

    Ok(output.stdout)
}

/// Signing identity (subject common name) of the bundle's certificate.
///
/// Returns `Ok(None)` when the subject carries no `CN = ` component.
pub async fn signing_identity_from_bundle(openssl: &Path, bundle: &Bundle) -> Result<Option<String>> {
    let pem = certificate_pem_from_bundle(openssl, bundle).await?;

    let output = tools::run_with_input(
        openssl,
        ["x509", "-noout", "-subject", "-nameopt", "oneline,-esc_msb"],
        &pem,
    )
    .await?;
    let output = tools::ensure_success("openssl x509 -subject", output)?;

    let subject = String::from_utf8_lossy(&output.stdout);
    log::debug!("certificate {}", subject.trim());

    Ok(common_name_from_subject(subject.trim()))
}

/// DER form of the bundle's certificate, base64 encoded for embedding in a plist
pub async fn certificate_base64_from_bundle(openssl: &Path, bundle: &Bundle) -> Result<String> {
    let pem = certificate_pem_from_bundle(openssl, bundle).await?;

    let output = tools::run_with_input(openssl, ["x509", "-outform", "DER"], &pem).await?;
    let output = tools::ensure_success("openssl x509 -outform DER", output)?;

    if output.stdout.is_empty() {
        return Err(Error::CommandExecution(
            "openssl x509 produced an empty DER certificate".to_string(),
        ));
    }

    Ok(base64::engine::general_purpose::STANDARD.encode(&output.stdout))
}

/// Parse the common name out of an `openssl x509 -subject` line
///
/// Takes the text after the last `CN = ` up to the next comma.
///
/// Input: `subject= C = AE, O = Example, CN = Some Name`
/// Output: `Some("Some Name")`
#[must_use]
pub fn common_name_from_subject(subject: &str) -> Option<String> {
    let (_, tail) = subject.rsplit_once("CN = ")?;
    let name = tail.split(',').next().unwrap_or_default().trim();
    (!name.is_empty()).then(|| name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn common_name_is_last_component() {
        assert_eq!(
            common_name_from_subject("subject= C = US, O = Test Org, CN = Test Identity").as_deref(),
            Some("Test Identity")
        );
    }

    #[test]
    fn common_name_stops_at_comma() {
        assert_eq!(
            common_name_from_subject("subject=CN = Fake Signer, emailAddress = ci@example.com")
                .as_deref(),
            Some("Fake Signer")
        );
    }

    #[test]
    fn last_common_name_wins() {
        assert_eq!(
            common_name_from_subject("subject= O = CN = Org, CN = Real Name").as_deref(),
            Some("Real Name")
        );
    }

    #[test]
    fn keeps_non_ascii_names() {
        assert_eq!(
            common_name_from_subject("subject= CN = Ünïcode Sïgner").as_deref(),
            Some("Ünïcode Sïgner")
        );
    }

    #[test]
    fn no_common_name() {
        assert_eq!(common_name_from_subject("subject= C = US, O = Test Org"), None);
        assert_eq!(common_name_from_subject(""), None);
        assert_eq!(common_name_from_subject("subject= O = Org, CN = "), None);
        // openssl's default format has no spaces around '='
        assert_eq!(common_name_from_subject("subject=C=US, CN=Compact"), None);
    }

    #[test]
    fn certificate_der_decodes_base64() {
        let credentials = Credentials {
            signing_identity: "Test Identity".to_string(),
            certificate_base64: "REVSQllURVM=".to_string(),
        };
        assert_eq!(credentials.certificate_der().unwrap(), b"DERBYTES");
    }
}
