use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use recon_kube::KubeStore;
use tracing::{error, info};

mod manifest;
mod run;

use manifest::{parse_manifests, Manifest};
use run::{converge_all, delete_all, dry_run_store, CliReconciler, ManifestStore, Outcome};

#[derive(Parser, Debug)]
#[command(name = "reconctl", version, about = "Converge Kubernetes objects toward a manifest")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// Namespace for every document (overrides the manifest)
    #[arg(long = "ns", global = true)]
    namespace: Option<String>,

    /// Run against an empty in-memory store instead of the cluster
    #[arg(long = "dry-run", global = true, action = ArgAction::SetTrue)]
    dry_run: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output {
    Human,
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create or update each object; delete it when the change touches an immutable field
    Converge {
        /// Multi-document YAML manifest
        #[arg(short = 'f', long = "file")]
        file: PathBuf,
    },
    /// Delete each object if it exists
    Delete {
        /// Multi-document YAML manifest
        #[arg(short = 'f', long = "file")]
        file: PathBuf,
    },
}

impl Commands {
    fn file(&self) -> &PathBuf {
        match self {
            Commands::Converge { file } | Commands::Delete { file } => file,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Commands::Converge { .. } => "converge",
            Commands::Delete { .. } => "delete",
        }
    }
}

fn init_tracing() {
    let env = std::env::var("RECON_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("RECON_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => tracing::info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => tracing::warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            tracing::warn!(addr = %addr, "invalid RECON_METRICS_ADDR; expected host:port");
        }
    }
}

async fn execute<C: ManifestStore>(store: C, command: &Commands, docs: Vec<Manifest>) -> Vec<Outcome> {
    let r = CliReconciler::new(store);
    match command {
        Commands::Converge { .. } => converge_all(&r, docs).await,
        Commands::Delete { .. } => delete_all(&r, docs).await,
    }
}

fn print_outcomes(outcomes: &[Outcome], output: Output) -> Result<()> {
    match output {
        Output::Human => {
            for o in outcomes {
                println!("{}", o.human());
            }
        }
        Output::Json => println!("{}", serde_json::to_string_pretty(outcomes)?),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();

    let path = cli.command.file();
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let mut docs = parse_manifests(&text).with_context(|| format!("parsing {}", path.display()))?;
    if let Some(ns) = cli.namespace.as_deref() {
        for doc in &mut docs {
            doc.set_namespace(ns);
        }
    }
    info!(command = cli.command.name(), file = %path.display(), documents = docs.len(), dry_run = cli.dry_run, "invoked");

    let outcomes = if cli.dry_run {
        execute(dry_run_store(), &cli.command, docs).await
    } else {
        let store = KubeStore::try_default().await?;
        execute(store, &cli.command, docs).await
    };
    print_outcomes(&outcomes, cli.output)?;

    let failed = outcomes.iter().filter(|o| o.failed()).count();
    if failed > 0 {
        error!(failed, total = outcomes.len(), "{} failed", cli.command.name());
        bail!("{} of {} documents failed", failed, outcomes.len());
    }
    Ok(())
}
