use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod app;
mod cli;
mod constructs;
mod context;
mod diff;
mod error;
mod settings;
mod stack;
mod stacks;
mod template;

#[cfg(feature = "aws")]
mod aws;

use cli::Workspace;
use settings::TemplateFormat;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Synthesize CloudFormation templates for every stack
    #[command(visible_alias = "s")]
    Synth {
        /// Output directory (defaults to [output] dir)
        #[arg(long, short)]
        out: Option<PathBuf>,
        /// Template format: json or yaml (defaults to [output] format)
        #[arg(long, short)]
        format: Option<TemplateFormat>,
    },
    /// List stacks in deployment order
    #[command(visible_alias = "ls")]
    List {},
    /// Compare synthesized templates with the ones in the output directory
    Diff {
        /// Directory holding the previous templates (defaults to [output] dir)
        #[arg(long, short)]
        out: Option<PathBuf>,
        /// Exit with status 1 when any stack differs
        #[arg(long)]
        fail: bool,
    },
    /// Validate the configuration and lookup context
    CheckConfig {},
    /// Lookup context management commands
    #[command(subcommand)]
    Context(ContextCommands),
    /// Deploy stacks through CloudFormation (requires the `aws` feature)
    Deploy {
        /// Stacks to deploy; their dependencies are deployed first. Defaults to all stacks
        stacks: Vec<String>,
    },
}

#[derive(Subcommand, Debug)]
enum ContextCommands {
    /// Show cached hosted zone ids
    #[command(visible_alias = "ls")]
    Show {},
    /// Record a hosted zone id by hand
    Set {
        /// Hosted zone name, e.g. example.com
        zone: String,
        /// Hosted zone id, with or without the /hostedzone/ prefix
        zone_id: String,
    },
    /// Resolve missing hosted zones through Route 53 (requires the `aws` feature)
    Lookup {},
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing for all commands
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let mut workspace = Workspace::load()?;

    match &cli.command {
        Commands::Synth { out, format } => {
            cli::synth::synth(&workspace, out.as_deref(), *format)?;
        }
        Commands::List {} => {
            cli::list::list_stacks(&workspace)?;
        }
        Commands::Diff { out, fail } => {
            let changed = cli::diff::diff_stacks(&workspace, out.as_deref())?;
            if *fail && changed > 0 {
                std::process::exit(1);
            }
        }
        Commands::CheckConfig {} => {
            cli::check_config::check_config(&workspace)?;
        }
        Commands::Context(context_cmd) => match context_cmd {
            ContextCommands::Show {} => {
                cli::context::show_context(&workspace)?;
            }
            ContextCommands::Set { zone, zone_id } => {
                cli::context::set_zone(&mut workspace, zone, zone_id)?;
            }
            ContextCommands::Lookup {} => {
                lookup_context(&mut workspace).await?;
            }
        },
        Commands::Deploy { stacks } => {
            deploy_stacks(&workspace, stacks).await?;
        }
    }

    Ok(())
}

#[cfg(feature = "aws")]
async fn lookup_context(workspace: &mut Workspace) -> Result<()> {
    // Route 53 is global; its endpoint lives in us-east-1
    let config = aws::sdk_config("us-east-1").await;
    let lookup = aws::route53::Route53ZoneLookup::new(&config);
    cli::context::lookup_zones(workspace, &lookup).await
}

/// Stands in for Route 53 when built without the `aws` feature
#[cfg(not(feature = "aws"))]
struct OfflineZoneLookup;

#[cfg(not(feature = "aws"))]
#[async_trait::async_trait]
impl context::ZoneLookup for OfflineZoneLookup {
    async fn find_zone_id(&self, zone_name: &str) -> Result<Option<String>> {
        anyhow::bail!(
            "Cannot look up {} without the `aws` feature; record it with 'cmi context set'",
            zone_name
        )
    }
}

#[cfg(not(feature = "aws"))]
async fn lookup_context(workspace: &mut Workspace) -> Result<()> {
    cli::context::lookup_zones(workspace, &OfflineZoneLookup).await
}

#[cfg(feature = "aws")]
async fn deploy_stacks(workspace: &Workspace, stacks: &[String]) -> Result<()> {
    cli::deploy::deploy(workspace, stacks).await
}

#[cfg(not(feature = "aws"))]
async fn deploy_stacks(_workspace: &Workspace, _stacks: &[String]) -> Result<()> {
    anyhow::bail!("cmi was built without the `aws` feature; rebuild with --features aws")
}
