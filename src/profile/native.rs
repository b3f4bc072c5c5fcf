//! In-process profile editing with the `plist` crate

use super::{DER_ENCODED_PROFILE, DEVELOPER_CERTIFICATES};
use crate::error::{Error, Result};
use plist::{Dictionary, Value};
use std::io::Cursor;
use std::path::Path;

/// Parse `decoded`, swap in `certificate`, and write XML to `output`
pub fn rewrite(source: &Path, decoded: &[u8], certificate: Vec<u8>, output: &Path) -> Result<()> {
    let mut profile = Value::from_reader(Cursor::new(decoded))?;
    let dict = profile.as_dictionary_mut().ok_or_else(|| Error::InvalidProfile {
        path: source.to_path_buf(),
        reason: "property list root is not a dictionary".to_string(),
    })?;

    if let Some(name) = dict.get("Name").and_then(Value::as_string) {
        log::debug!("profile {name}");
    }

    let replaced = replace_developer_certificates(dict, certificate);
    log::debug!("replaced {replaced} developer certificate(s)");
    remove_embedded_signature(dict);

    profile.to_file_xml(output)?;
    Ok(())
}

/// Make `certificate` the only entry of `DeveloperCertificates`.
///
/// Returns how many certificates were there before. A missing or malformed
/// entry counts as none and is overwritten.
pub fn replace_developer_certificates(profile: &mut Dictionary, certificate: Vec<u8>) -> usize {
    let previous = profile
        .get(DEVELOPER_CERTIFICATES)
        .and_then(Value::as_array)
        .map_or(0, Vec::len);

    profile.insert(
        DEVELOPER_CERTIFICATES.to_string(),
        Value::Array(vec![Value::Data(certificate)]),
    );

    previous
}

/// Drop `DER-Encoded-Profile`. Returns whether it was present.
pub fn remove_embedded_signature(profile: &mut Dictionary) -> bool {
    profile.remove(DER_ENCODED_PROFILE).is_some()
}
