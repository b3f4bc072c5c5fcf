use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use fake_profile_sign::config::{EditorKind, GenerateConfig};
use fake_profile_sign::generate::{GenerateOptions, generate_profiles};
use fake_profile_sign::error;

/// Environment variable consulted when `--p12-password` is not given
const P12_PASSWORD_ENV: &str = "GENERATE_PROFILES_P12_PASSWORD";

#[derive(Parser)]
#[command(name = "generate_profiles")]
#[command(version, about = "Re-sign provisioning profiles with a self-signed certificate")]
struct Cli {
    /// Directory containing the *.mobileprovision files to re-sign
    #[arg(long)]
    source: PathBuf,

    /// Existing directory receiving the re-signed profiles
    #[arg(long)]
    destination: PathBuf,

    /// Directory containing the PKCS#12 bundle
    #[arg(long)]
    certs: PathBuf,

    /// Path to settings file (TOML)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// File name of the PKCS#12 bundle inside --certs (default: SelfSigned.p12)
    #[arg(long)]
    p12_name: Option<String>,

    /// Password of the PKCS#12 bundle (default: empty)
    #[arg(long)]
    p12_password: Option<String>,

    /// Fixed keychain file name instead of a random per-run name
    #[arg(long)]
    keychain_name: Option<String>,

    /// How decoded profiles are edited
    #[arg(long, value_enum)]
    editor: Option<EditorKind>,

    /// Do not pass -legacy to openssl pkcs12 (for LibreSSL)
    #[arg(long)]
    no_legacy: bool,

    /// List the profiles that would be processed without signing anything
    #[arg(long)]
    dry_run: bool,

    /// Log every external command
    #[arg(long, short = 'v')]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        error!("{e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => GenerateConfig::load(&expand(path)?).await?,
        None => GenerateConfig::default(),
    };
    apply_overrides(&mut config, &cli);

    init_logging(config.verbose);

    let options = GenerateOptions {
        source_dir: expand(&cli.source)?,
        destination_dir: expand(&cli.destination)?,
        certs_dir: expand(&cli.certs)?,
        config,
    };

    generate_profiles(&options).await?;
    Ok(())
}

fn apply_overrides(config: &mut GenerateConfig, cli: &Cli) {
    if let Some(name) = &cli.p12_name {
        config.p12_name = name.clone();
    }

    if let Some(password) = cli
        .p12_password
        .clone()
        .or_else(|| std::env::var(P12_PASSWORD_ENV).ok())
    {
        config.p12_password = password;
    }

    if let Some(name) = &cli.keychain_name {
        config.keychain.name = Some(name.clone());
    }

    if let Some(editor) = cli.editor {
        config.editor = editor;
    }

    if cli.no_legacy {
        config.openssl_legacy = false;
    }

    config.dry_run |= cli.dry_run;
    config.verbose |= cli.verbose;
}

fn init_logging(verbose: bool) {
    let level = if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Warn
    };

    let _ = env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp(None)
        .try_init();
}

/// Expand a leading `~`, failing if HOME is not set
fn expand(path: &std::path::Path) -> Result<PathBuf> {
    let raw = path.to_string_lossy();
    let expanded = shellexpand::tilde(&raw).to_string();

    if raw.starts_with('~') && expanded.starts_with('~') {
        anyhow::bail!(
            "Could not expand ~ in {raw} (HOME environment variable not set). \
             Please use an absolute path instead."
        );
    }

    Ok(PathBuf::from(expanded))
}
