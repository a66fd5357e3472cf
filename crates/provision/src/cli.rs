use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use provision_core::{
    Dispatcher, ProvisionConfig, ProvisionReport, Provisioner, ProvisionerBuilder,
    TransferRequest,
};
use provision_plugin::{PluginCatalog, PluginLoader, PluginRegistry, PluginSet};
use provision_transport::GenericTransport;
use tracing::{info, warn};

#[derive(Clone, Debug, Parser)]
#[command(
    name = "dockstore-provision",
    version = env!("CARGO_PKG_VERSION"),
    about = "Provision workflow input and output files",
    long_about = None,
    propagate_version = true
)]
pub struct App {
    /// Configuration file, `~/.dockstore/config.toml` when omitted.
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Clone, Debug, Subcommand)]
pub enum Commands {
    #[command(alias = "dl", name = "download", about = "Bring remote inputs into the working directory")]
    Download(TransferArg),
    #[command(alias = "up", name = "upload", about = "Send local outputs to their remote locations")]
    Upload(TransferArg),
    #[command(name = "run", about = "Download every input, then upload every output")]
    Run(TransferArg),
    #[command(subcommand)]
    Plugins(PluginCommands),
}

#[derive(Clone, Debug, Subcommand)]
pub enum PluginCommands {
    #[command(alias = "ls", name = "list", about = "Show the plugins that would be used")]
    List,
    #[command(alias = "i", name = "install", about = "Download the plugins named in the catalog")]
    Install,
}

#[derive(Clone, Debug, Args)]
pub struct TransferArg {
    /// JSON array of transfer requests.
    #[arg(long, short)]
    pub manifest: PathBuf,
    /// Base for relative local paths.
    #[arg(long, short)]
    pub working_dir: Option<PathBuf>,
    /// Fail when a local input cannot be staged.
    #[arg(long)]
    pub strict: bool,
    /// Override `file-provision-threads`.
    #[arg(long, short)]
    pub threads: Option<usize>,
    #[arg(long)]
    pub no_progress: bool,
}

impl App {
    pub async fn run(self) -> anyhow::Result<()> {
        let config = ProvisionConfig::load(self.config.as_deref())
            .context("failed to load configuration")?;

        match self.cmd {
            Commands::Download(arg) => {
                let requests = read_manifest(&arg.manifest)?;
                let report = provisioner(&config, &arg)?.download(requests).await?;
                emit(&report)
            }
            Commands::Upload(arg) => {
                let requests = read_manifest(&arg.manifest)?;
                let report = provisioner(&config, &arg)?.upload(requests).await?;
                emit(&report)
            }
            Commands::Run(arg) => {
                let requests = read_manifest(&arg.manifest)?;
                let report = provisioner(&config, &arg)?.provision(requests).await?;
                emit(&report)
            }
            Commands::Plugins(PluginCommands::List) => {
                for plugin in plugins(&config)?.iter() {
                    let d = &plugin.descriptor;
                    let schemes: Vec<&str> = d.declared_schemes.iter().map(String::as_str).collect();
                    println!(
                        "{}\t{}\t{}\t{}",
                        d.plugin_id,
                        d.version,
                        schemes.join(","),
                        d.install_directory.display()
                    );
                }
                Ok(())
            }
            Commands::Plugins(PluginCommands::Install) => {
                let catalog = PluginCatalog::load_or_create(config.get_catalog_path())?;
                let generic = GenericTransport::new();
                let report = catalog.install(config.get_plugin_dir(), &generic).await?;
                info!(
                    downloaded = report.downloaded.len(),
                    skipped = report.skipped.len(),
                    "plugin archives installed"
                );
                // expand and prune what was just downloaded
                let set = plugins(&config)?;
                info!(plugins = set.len(), "plugin root ready");
                Ok(())
            }
        }
    }
}

fn read_manifest(path: &Path) -> anyhow::Result<Vec<TransferRequest>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read manifest '{}'", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("manifest '{}' is not a list of transfer requests", path.display()))
}

fn plugins(config: &ProvisionConfig) -> anyhow::Result<PluginSet> {
    let registry = PluginRegistry::new(config.get_plugin_dir());
    registry
        .initialize(&PluginLoader::new(), config.get_plugin_settings())
        .with_context(|| {
            format!(
                "failed to initialize plugins in '{}'",
                config.get_plugin_dir().display()
            )
        })
}

fn provisioner(config: &ProvisionConfig, arg: &TransferArg) -> anyhow::Result<Provisioner> {
    let generic = GenericTransport::new().show_progress(!arg.no_progress);
    let dispatcher = Dispatcher::new(plugins(config)?, generic);

    let working_dir = match &arg.working_dir {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().context("failed to read current directory")?,
    };
    let mut builder = ProvisionerBuilder::from_config(config, dispatcher)
        .working_dir(working_dir)
        .strict(arg.strict);
    if let Some(threads) = arg.threads {
        builder = builder.threads(threads);
    }
    Ok(builder.build())
}

/// Print the report on stdout; fail when any transfer did not succeed.
fn emit(report: &ProvisionReport) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    let failed = report.outcomes.iter().filter(|o| !o.success).count();
    if failed > 0 {
        warn!(failed, "some transfers did not succeed");
        bail!("{failed} of {} transfers did not succeed", report.outcomes.len());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_command_is_well_formed() {
        App::command().debug_assert();
    }

    #[test]
    fn test_download_arguments() {
        let app = App::try_parse_from([
            "dockstore-provision",
            "download",
            "--manifest",
            "inputs.json",
            "--strict",
            "-t",
            "4",
        ])
        .unwrap();
        match app.cmd {
            Commands::Download(arg) => {
                assert_eq!(arg.manifest, PathBuf::from("inputs.json"));
                assert!(arg.strict);
                assert_eq!(arg.threads, Some(4));
                assert_eq!(arg.working_dir, None);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_global_config_after_subcommand() {
        let app = App::try_parse_from([
            "dockstore-provision",
            "plugins",
            "list",
            "--config",
            "/etc/dockstore.toml",
        ])
        .unwrap();
        assert_eq!(app.config, Some(PathBuf::from("/etc/dockstore.toml")));
        assert!(matches!(app.cmd, Commands::Plugins(PluginCommands::List)));
    }

    #[test]
    fn test_manifest_is_parsed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        fs::write(
            &path,
            r#"[
  {"logical_id": "reads", "remote_path": "s3://bucket/reads.fq", "local_path": "inputs/reads.fq"},
  {"logical_id": "out", "remote_path": "gs://bucket/out", "local_path": "out", "is_directory": true, "direction": "upload"}
]"#,
        )
        .unwrap();

        let requests = read_manifest(&path).unwrap();

        assert_eq!(requests.len(), 2);
        assert!(requests[1].is_directory);
        assert_eq!(requests[1].direction, provision_core::Direction::Upload);
    }

    #[test]
    fn test_malformed_manifest_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        fs::write(&path, "{\"not\": \"a list\"}").unwrap();
        assert!(read_manifest(&path).is_err());
    }
}
