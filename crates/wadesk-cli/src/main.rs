use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;
use wadesk_channels::whatsapp::build_text_message;
use wadesk_common::OrganizationId;
use wadesk_config::{AppConfig, ConfigLoader};
use wadesk_gateway::{AppState, GatewayServer};
use wadesk_security::parse_organization_id;

#[derive(Parser)]
#[command(
    name = "wadesk",
    version,
    about = "wadesk - multi-tenant WhatsApp Business backend"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway server
    Start {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides config)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Check whether a gateway is answering on the configured address
    Status,

    /// Create the config directory and a default config.yml
    Init,

    /// Store WhatsApp credentials for an organization
    Configure {
        /// Organization id (UUID v4)
        #[arg(long)]
        organization: String,

        #[arg(long, env = "WADESK_WHATSAPP_ACCESS_TOKEN")]
        access_token: Option<String>,

        #[arg(long)]
        phone_number_id: Option<String>,

        #[arg(long)]
        business_account_id: Option<String>,

        #[arg(long)]
        verify_token: Option<String>,
    },

    /// Validate an organization's stored credentials against the Graph API
    TestConnection {
        #[arg(long)]
        organization: String,
    },

    /// Pull approved templates for an organization and store them locally
    SyncTemplates {
        #[arg(long)]
        organization: String,
    },

    /// Send a plain text message on behalf of an organization
    Send {
        #[arg(long)]
        organization: String,

        /// Recipient phone number
        #[arg(long)]
        to: String,

        /// Message body
        #[arg(long)]
        body: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .init();

    let config_loader = ConfigLoader::new()?;
    let config = config_loader.load()?;
    config_loader.ensure_dirs(&config)?;

    match cli.command {
        Commands::Start { host, port } => {
            let mut config = config;
            if let Some(host) = host {
                config.gateway.host = host;
            }
            if let Some(port) = port {
                config.gateway.port = port;
            }

            let data_dir = config_loader.data_dir(&config);
            GatewayServer::new(config, data_dir).run().await?;
        }
        Commands::Status => {
            let url = format!(
                "http://{}:{}/health",
                config.gateway.host, config.gateway.port
            );
            let resp = reqwest::get(&url).await.map_err(|_| {
                anyhow::anyhow!(
                    "Gateway is not running at {}:{}",
                    config.gateway.host,
                    config.gateway.port
                )
            })?;
            if !resp.status().is_success() {
                anyhow::bail!("Gateway answered {} on {url}", resp.status());
            }
            println!(
                "wadesk gateway is running at {}:{}",
                config.gateway.host, config.gateway.port
            );
        }
        Commands::Init => {
            let path = config_loader.config_dir().join("config.yml");
            if config_loader.config_file_exists() {
                println!("Config already present in {}", config_loader.config_dir().display());
            } else {
                let yaml = serde_yaml::to_string(&AppConfig::default())
                    .context("failed to render default config")?;
                std::fs::write(&path, yaml)
                    .with_context(|| format!("failed to write {}", path.display()))?;
                println!("Wrote {}", path.display());
            }
            println!("Data directory: {}", config_loader.data_dir(&config).display());
        }
        Commands::Configure {
            organization,
            access_token,
            phone_number_id,
            business_account_id,
            verify_token,
        } => {
            let org = organization_arg(&organization)?;
            let state = open_state(&config_loader, config)?;
            let mut creds = state.credentials(org)?;

            for (update, field) in [
                (access_token, &mut creds.access_token),
                (phone_number_id, &mut creds.phone_number_id),
                (business_account_id, &mut creds.business_account_id),
                (verify_token, &mut creds.webhook_verify_token),
            ] {
                if let Some(value) = update {
                    *field = value.trim().to_string();
                }
            }

            state.settings.save_credentials(&creds)?;
            println!(
                "Saved WhatsApp settings for {org} (configured: {})",
                creds.is_configured()
            );
        }
        Commands::TestConnection { organization } => {
            let org = organization_arg(&organization)?;
            let state = open_state(&config_loader, config)?;
            let creds = state.credentials(org)?;

            let result = state.whatsapp.test_connection(&creds).await;
            println!("{}", serde_json::to_string_pretty(&result)?);
            if !result.success {
                anyhow::bail!("connection test failed");
            }
        }
        Commands::SyncTemplates { organization } => {
            let org = organization_arg(&organization)?;
            let state = open_state(&config_loader, config)?;
            let creds = state.credentials(org)?;

            let result = state.whatsapp.sync_templates(&creds).await;
            let Some(templates) = result.templates.filter(|_| result.success) else {
                anyhow::bail!(
                    "template sync failed: {}",
                    result.error.unwrap_or_else(|| "unknown error".to_string())
                );
            };

            let counts = state.templates.upsert_synced(org, &templates)?;
            info!("template sync finished for {org}");
            println!(
                "Synced {} templates ({} created, {} updated)",
                templates.len(),
                counts.created,
                counts.updated
            );
        }
        Commands::Send {
            organization,
            to,
            body,
        } => {
            let org = organization_arg(&organization)?;
            let message = build_text_message(&to, &body)?;
            let state = open_state(&config_loader, config)?;
            let creds = state.credentials(org)?;

            let result = state.whatsapp.send_message(&creds, &message).await;
            println!("{}", serde_json::to_string_pretty(&result)?);
            if !result.success {
                anyhow::bail!("send failed");
            }
        }
    }

    Ok(())
}

fn organization_arg(raw: &str) -> Result<OrganizationId> {
    parse_organization_id(raw).with_context(|| format!("invalid --organization {raw:?}"))
}

fn open_state(loader: &ConfigLoader, config: AppConfig) -> Result<AppState> {
    let data_dir = loader.data_dir(&config);
    AppState::open(config, &data_dir)
        .with_context(|| format!("failed to open data in {}", data_dir.display()))
}
