//! Fake `security`, `openssl` and `plutil` scripts for driving the pipeline
//! without macOS tooling.
//!
//! * `security cms -D` prints the profile unchanged and `cms -S` copies its
//!   input to the output, so a "signed" profile is just the edited plist.
//! * Keychains are empty files; creating one that exists fails like the real
//!   tool does.
//! * `plutil` works on a line format (`ARRAY`, `CERT:<b64>`, `DER:<sig>`)
//!   instead of XML.
//! * Touching `<tools>/fail-<subcommand>` makes that subcommand fail.
//!   `fail-sign` makes `cms -S` write a partial file and then fail.

#![allow(dead_code)]

use fake_profile_sign::config::{EditorKind, GenerateConfig, KeychainConfig, ToolPaths};
use fake_profile_sign::generate::GenerateOptions;
use plist::{Dictionary, Value};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const TEST_IDENTITY_SUBJECT: &str = "subject= C = US, O = Test Org, CN = Test Identity";

/// base64 of the DER bytes the fake openssl prints
pub const FAKE_CERTIFICATE_BASE64: &str = "REVSQllURVM=";

pub struct Workspace {
    pub root: TempDir,
    pub tools_dir: PathBuf,
    pub source: PathBuf,
    pub destination: PathBuf,
    pub certs: PathBuf,
    pub keychains: PathBuf,
}

impl Workspace {
    pub fn new() -> Self {
        Self::with_subject(TEST_IDENTITY_SUBJECT)
    }

    pub fn with_subject(subject: &str) -> Self {
        let root = tempfile::tempdir().unwrap();
        let tools_dir = root.path().join("tools");
        let source = root.path().join("profiles");
        let destination = root.path().join("out");
        let certs = root.path().join("certs");
        let keychains = root.path().join("keychains");

        for dir in [&tools_dir, &source, &destination, &certs, &keychains] {
            std::fs::create_dir_all(dir).unwrap();
        }
        std::fs::write(certs.join("SelfSigned.p12"), b"not really pkcs12").unwrap();

        write_script(&tools_dir.join("security"), &security_script(&tools_dir));
        write_script(&tools_dir.join("openssl"), &openssl_script(&tools_dir, subject));
        write_script(&tools_dir.join("plutil"), &plutil_script(&tools_dir));

        Self {
            root,
            tools_dir,
            source,
            destination,
            certs,
            keychains,
        }
    }

    pub fn tools(&self) -> ToolPaths {
        ToolPaths {
            security: self.tools_dir.join("security"),
            openssl: self.tools_dir.join("openssl"),
            plutil: self.tools_dir.join("plutil"),
        }
    }

    pub fn options(&self, editor: EditorKind) -> GenerateOptions {
        GenerateOptions {
            source_dir: self.source.clone(),
            destination_dir: self.destination.clone(),
            certs_dir: self.certs.clone(),
            config: GenerateConfig {
                editor,
                tools: self.tools(),
                keychain: KeychainConfig {
                    name: None,
                    directory: Some(self.keychains.clone()),
                },
                ..GenerateConfig::default()
            },
        }
    }

    /// Make `subcommand` of the fake `security` fail from now on
    pub fn fail(&self, subcommand: &str) {
        std::fs::write(self.tools_dir.join(format!("fail-{subcommand}")), b"").unwrap();
    }

    pub fn security_log(&self) -> String {
        std::fs::read_to_string(self.tools_dir.join("security.log")).unwrap_or_default()
    }

    pub fn plutil_log(&self) -> String {
        std::fs::read_to_string(self.tools_dir.join("plutil.log")).unwrap_or_default()
    }

    /// XML profile with `certificates` developer certificates and a signature copy
    pub fn add_xml_profile(&self, name: &str, certificates: usize) -> PathBuf {
        let mut dict = Dictionary::new();
        dict.insert("Name".to_string(), Value::String(name.to_string()));
        dict.insert("UUID".to_string(), Value::String(format!("uuid-{name}")));
        dict.insert(
            "DeveloperCertificates".to_string(),
            Value::Array(
                (0..certificates)
                    .map(|i| Value::Data(format!("apple-cert-{i}").into_bytes()))
                    .collect(),
            ),
        );
        dict.insert("DER-Encoded-Profile".to_string(), Value::Data(b"apple-signature".to_vec()));

        let path = self.source.join(format!("{name}.mobileprovision"));
        Value::Dictionary(dict).to_file_xml(&path).unwrap();
        path
    }

    /// Line-format profile understood by the fake `plutil`
    pub fn add_line_profile(&self, name: &str, certificates: usize, with_array: bool) -> PathBuf {
        let mut content = format!("NAME:{name}\n");
        if with_array {
            content.push_str("ARRAY\n");
        }
        for i in 0..certificates {
            content.push_str(&format!("CERT:apple-cert-{i}\n"));
        }
        content.push_str("DER:apple-signature\n");

        let path = self.source.join(format!("{name}.mobileprovision"));
        std::fs::write(&path, content).unwrap();
        path
    }

    pub fn output(&self, name: &str) -> PathBuf {
        self.destination.join(format!("{name}.mobileprovision"))
    }

    /// Files left in the keychain directory, lock files excluded
    pub fn keychain_files(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(&self.keychains)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .filter(|n| !n.ends_with(".lock"))
            .collect();
        names.sort();
        names
    }
}

/// `DeveloperCertificates` of a re-signed XML profile
pub fn xml_certificates(path: &Path) -> Vec<Vec<u8>> {
    let value = Value::from_file(path).unwrap();
    value
        .as_dictionary()
        .unwrap()
        .get("DeveloperCertificates")
        .and_then(Value::as_array)
        .unwrap()
        .iter()
        .map(|v| v.as_data().unwrap().to_vec())
        .collect()
}

fn write_script(path: &Path, body: &str) {
    std::fs::write(path, body).unwrap();
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

fn security_script(dir: &Path) -> String {
    format!(
        r#"#!/bin/sh
dir='{dir}'
echo "$*" >> "$dir/security.log"
if [ -e "$dir/fail-$1" ]; then
  echo "security: $1 failed" >&2
  exit 1
fi
case "$1" in
  delete-keychain)
    if [ -e "$2" ]; then rm -f "$2"; exit 0; fi
    echo "security: SecKeychainDelete: The specified keychain could not be found." >&2
    exit 50
    ;;
  create-keychain)
    if [ -e "$4" ]; then
      echo "security: SecKeychainCreate $4: A keychain with the same name already exists." >&2
      exit 48
    fi
    : > "$4"
    ;;
  list-keychains)
    if [ "$#" -eq 3 ]; then
      echo '    "/Users/ci/Library/Keychains/login.keychain-db"'
    fi
    ;;
  cms)
    if [ "$2" = "-D" ]; then
      cat "$4"
      exit $?
    fi
    in=""
    out=""
    while [ "$#" -gt 0 ]; do
      case "$1" in
        -i) in="$2"; shift ;;
        -o) out="$2"; shift ;;
      esac
      shift
    done
    if [ -e "$dir/fail-sign" ]; then
      echo "partial" > "$out"
      echo "security: SecCmsSignedDataSign failed" >&2
      exit 1
    fi
    cp "$in" "$out"
    ;;
esac
exit 0
"#,
        dir = dir.display()
    )
}

fn openssl_script(dir: &Path, subject: &str) -> String {
    format!(
        r#"#!/bin/sh
dir='{dir}'
echo "$*" >> "$dir/openssl.log"
case "$1" in
  pkcs12)
    printf '%s\n' '-----BEGIN CERTIFICATE-----' 'TUlJQ0ZBS0U=' '-----END CERTIFICATE-----'
    ;;
  x509)
    cat > /dev/null
    case "$*" in
      *-subject*) echo '{subject}' ;;
      *DER*) printf 'DERBYTES' ;;
    esac
    ;;
esac
exit 0
"#,
        dir = dir.display()
    )
}

fn plutil_script(dir: &Path) -> String {
    format!(
        r#"#!/bin/sh
dir='{dir}'
echo "$*" >> "$dir/plutil.log"
for file; do :; done
remove_first() {{
  awk -v p="$1" 'BEGIN {{ d = 0 }} index($0, p) == 1 && !d {{ d = 1; next }} {{ print }}' "$file" > "$file.tmp" && mv "$file.tmp" "$file"
}}
case "$1 $2" in
  "-remove DeveloperCertificates.0")
    if [ -e "$dir/fail-remove" ]; then exit 1; fi
    grep -q '^CERT:' "$file" || exit 1
    remove_first 'CERT:'
    ;;
  "-extract DeveloperCertificates.0")
    grep '^CERT:' "$file" | head -n 1 | grep . || exit 1
    ;;
  "-insert DeveloperCertificates.0")
    grep -q '^ARRAY$' "$file" || exit 1
    echo "CERT:$4" >> "$file"
    ;;
  "-insert DeveloperCertificates")
    echo "ARRAY" >> "$file"
    ;;
  "-remove DER-Encoded-Profile")
    grep -q '^DER:' "$file" || exit 1
    remove_first 'DER:'
    ;;
  "-extract DER-Encoded-Profile")
    grep '^DER:' "$file" || exit 1
    ;;
  *)
    echo "plutil: unsupported $*" >&2
    exit 2
    ;;
esac
exit 0
"#,
        dir = dir.display()
    )
}
