//! Re-sign iOS provisioning profiles against a self-signed certificate
//!
//! Build pipelines that fake-codesign apps need provisioning profiles that
//! trust their own certificate. This crate decodes each profile, swaps its
//! developer certificates for the one in a PKCS#12 bundle, and re-signs it
//! from a throwaway keychain using the system `security`, `openssl` and
//! (optionally) `plutil` tools.
//!
//! # Error Handling Strategy
//!
//! **CRITICAL I/O** is propagated with `?`: file operations, external
//! commands, keychain operations.
//!
//! **DECORATIVE I/O** is ignored with `let _ =`: terminal colors and status
//! lines. A closed stdout must not fail a signing run.
//!
//! Cleanup (keychain deletion, partial output removal) is best-effort and
//! only ever warns.

#[macro_use]
pub mod output;

pub mod config;
pub mod credentials;
pub mod error;
pub mod generate;
pub mod keychain;
pub mod profile;
pub mod tools;

// Re-export common types
pub use config::{EditorKind, GenerateConfig};
pub use error::Error;
pub use generate::{GenerateOptions, GenerateReport, generate_profiles};

/// Attempt to remove a file or directory, warning on failure.
///
/// Best-effort cleanup:
/// - Succeeds silently when cleanup works or there is nothing to remove
/// - Prints a warning with a suggestion when it fails
/// - Never returns errors
pub async fn cleanup_path<P: AsRef<std::path::Path>>(path: P, description: &str) {
    let path = path.as_ref();

    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        return;
    }

    let is_dir = tokio::fs::metadata(path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false);

    let result = if is_dir {
        tokio::fs::remove_dir_all(path).await
    } else {
        tokio::fs::remove_file(path).await
    };

    if let Err(e) = result {
        // NotFound is OK - removed by someone else in the meantime
        if e.kind() != std::io::ErrorKind::NotFound {
            let suggestion = match e.kind() {
                std::io::ErrorKind::PermissionDenied => format!(
                    "Check file permissions or try: sudo rm -rf {}",
                    path.display()
                ),
                _ => "Manual cleanup may be needed".to_string(),
            };
            warn!(
                "Failed to cleanup {description}\n   Path: {}\n   Error: {e}\n   Suggestion: {suggestion}",
                path.display()
            );
        }
    }
}
