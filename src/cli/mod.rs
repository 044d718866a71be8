use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "reefchat", version, about = "Feature-gated gateway for OpenAI-compatible providers")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    Serve(ServeOpts),
    Models(ModelsOpts),
    Config(ConfigOpts),
    Version,
}

#[derive(clap::Args)]
pub struct ServeOpts {
    #[arg(short, long)]
    pub config: Option<String>,
    #[arg(short, long)]
    pub port: Option<u16>,
    #[arg(short, long)]
    pub bind: Option<String>,
}

#[derive(clap::Args)]
pub struct ModelsOpts {
    #[arg(short, long)]
    pub config: Option<String>,
    #[command(subcommand)]
    pub action: ModelsAction,
}

#[derive(Subcommand)]
pub enum ModelsAction {
    List(ListOpts),
    Sync(SyncOpts),
}

#[derive(clap::Args)]
pub struct ListOpts {
    /// Catalog base URL; defaults to the configured one.
    #[arg(long)]
    pub base_url: Option<String>,
    /// Bearer token for the catalog; defaults to the configured one.
    #[arg(long)]
    pub token: Option<String>,
    /// Only list models served by this provider.
    #[arg(long)]
    pub provider: Option<String>,
}

#[derive(clap::Args)]
pub struct SyncOpts {
    /// Provider whose catalog models get enabled.
    #[arg(long, default_value = "groq")]
    pub provider: String,
    /// YAML values file holding the FEATURE_CONFIG entry.
    #[arg(long)]
    pub values: PathBuf,
    #[arg(long)]
    pub base_url: Option<String>,
    #[arg(long)]
    pub token: Option<String>,
    /// Print the generated feature config instead of writing the file.
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(clap::Args)]
pub struct ConfigOpts {
    #[arg(short, long)]
    pub config: Option<String>,
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    Show,
    Check,
    Init,
}
