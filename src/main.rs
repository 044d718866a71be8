use std::collections::HashMap;

use clap::Parser;
use reefchat::catalog::{self, CatalogClient};
use reefchat::cli::{Cli, Commands, ConfigAction, ListOpts, ModelsAction, SyncOpts};
use reefchat::config::{validate_config_object, CatalogConfig, Config};
use reefchat::features::FeatureGate;
use reefchat::logging;
use reefchat::server::Server;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    logging::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(opts) => {
            info!("Starting reefchat server");
            let config = Config::load(opts.config.as_deref())?;
            validate_config_object(&config)?;
            let gate = FeatureGate::from_env();
            let server = Server::start(config, gate, &opts).await?;
            server.run_until_shutdown().await?;
        }
        Commands::Models(opts) => {
            let config = Config::load(opts.config.as_deref())?;
            match opts.action {
                ModelsAction::List(opts) => models_list(&config.catalog, &opts).await?,
                ModelsAction::Sync(opts) => models_sync(&config.catalog, &opts).await?,
            }
        }
        Commands::Config(opts) => {
            match opts.action {
                ConfigAction::Show => {
                    let config = Config::load(opts.config.as_deref())?;
                    println!("{}", serde_json::to_string_pretty(&config)?);
                }
                ConfigAction::Check => {
                    let config = Config::load(opts.config.as_deref())?;
                    validate_config_object(&config)?;
                    info!("Configuration is valid");
                }
                ConfigAction::Init => {
                    Config::write_default(opts.config.as_deref().unwrap_or("reefchat.json"))?;
                    info!("Configuration file created");
                }
            }
        }
        Commands::Version => {
            println!("reefchat {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}

fn catalog_client(
    catalog: &CatalogConfig,
    base_url: Option<&str>,
    token: Option<String>,
) -> CatalogClient {
    CatalogClient::new(
        base_url.unwrap_or(&catalog.base_url),
        token.or_else(|| catalog.token.clone()),
    )
}

/// Print the catalog grouped by serving provider, or one provider's slice.
async fn models_list(catalog_config: &CatalogConfig, opts: &ListOpts) -> anyhow::Result<()> {
    let client = catalog_client(catalog_config, opts.base_url.as_deref(), opts.token.clone());
    let models = client.list_models().await?;

    if let Some(provider) = &opts.provider {
        let ids = catalog::models_served_by(&models, provider);
        println!("Found {} {} models:\n", ids.len(), provider);
        for (index, id) in ids.iter().enumerate() {
            println!("{:>3}. {}", index + 1, id);
        }
        return Ok(());
    }

    let added: HashMap<&str, i64> = models
        .iter()
        .filter_map(|model| model.created.map(|created| (model.id.as_str(), created)))
        .collect();

    println!("Models from {} ({} total)\n", client.base_url(), models.len());
    for (provider, ids) in catalog::group_by_provider(&models) {
        println!("{} ({} models)", provider, ids.len());
        for id in &ids {
            match added
                .get(id.as_str())
                .and_then(|ts| chrono::DateTime::from_timestamp(*ts, 0))
            {
                Some(date) => println!("  - {}  (added {})", id, date.format("%Y-%m-%d")),
                None => println!("  - {}", id),
            }
        }
        println!();
    }
    Ok(())
}

/// Rewrite the values file so only the chosen provider's models are enabled.
async fn models_sync(catalog_config: &CatalogConfig, opts: &SyncOpts) -> anyhow::Result<()> {
    let client = catalog_client(catalog_config, opts.base_url.as_deref(), opts.token.clone());
    let models = client.list_models().await?;

    let ids = catalog::models_served_by(&models, &opts.provider);
    if ids.is_empty() {
        anyhow::bail!(
            "No models served by '{}' in the catalog at {}",
            opts.provider,
            client.base_url()
        );
    }

    println!("Found {} {} models:\n", ids.len(), opts.provider);
    for (index, id) in ids.iter().enumerate() {
        println!("{:>3}. {}", index + 1, id);
    }
    println!();

    let feature_config = catalog::feature_config_enabling(&opts.provider, &ids);

    if opts.dry_run {
        println!("{}", catalog::render_feature_config(&feature_config)?);
        return Ok(());
    }

    catalog::update_values_file(&opts.values, &feature_config)?;
    info!(
        "Updated {} with {} {} models",
        opts.values.display(),
        ids.len(),
        opts.provider
    );
    info!("Restart the server for the new FEATURE_CONFIG to take effect");
    info!("Then check /api/models: only {} models should be listed", opts.provider);
    Ok(())
}
