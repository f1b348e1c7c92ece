mod app;
mod certs;
mod settings;

use app::{parse_options, App, GatewayChanges, NewGateway, Output};
use certs::CertificateStore;
use clap::{Parser, Subcommand};
use gatewayctl_adapters::GatewayFactory;
use gatewayctl_core::{ApiDefinition, GatewayctlError, GatewayctlResult};
use gatewayctl_security::CredentialCodec;
use gatewayctl_store::ConfigStore;
use settings::Settings;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gatewayctl", about = "gatewayctl: one control plane for many API gateways")]
struct Cli {
    /// Path to config file (default: ./gatewayctl.toml if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List supported gateway types
    Types,
    /// List stored gateways
    List,
    /// Store a new gateway
    Add {
        /// Unique gateway name
        name: String,
        /// Vendor tag (kong, wso2, tyk, gravitee, aws)
        #[arg(short = 't', long = "type")]
        gateway_type: String,
        /// Management API base URL
        #[arg(short, long)]
        url: String,
        /// Skip TLS certificate verification
        #[arg(long)]
        no_verify_ssl: bool,
        /// PEM certificate to trust for this gateway
        #[arg(long)]
        cert: Option<PathBuf>,
        /// Vendor option as key=value (repeatable)
        #[arg(short, long = "option")]
        options: Vec<String>,
    },
    /// Change a stored gateway
    Update {
        /// Current gateway name
        name: String,
        /// New name
        #[arg(long)]
        rename: Option<String>,
        /// New vendor tag
        #[arg(short = 't', long = "type")]
        gateway_type: Option<String>,
        /// New management API base URL
        #[arg(short, long)]
        url: Option<String>,
        /// Turn TLS verification on or off
        #[arg(long)]
        verify_ssl: Option<bool>,
        /// Replace the trusted PEM certificate
        #[arg(long)]
        cert: Option<PathBuf>,
        /// Set a vendor option as key=value (repeatable)
        #[arg(short, long = "option")]
        options: Vec<String>,
        /// Remove a vendor option (repeatable)
        #[arg(long = "unset")]
        unset: Vec<String>,
    },
    /// Delete a stored gateway
    Remove {
        name: String,
    },
    /// Delete every stored gateway
    Clear,
    /// Check connectivity to one gateway or all of them
    Test {
        /// Gateway to check
        #[arg(required_unless_present = "all")]
        name: Option<String>,
        /// Check every stored gateway
        #[arg(long, conflicts_with = "name")]
        all: bool,
    },
    /// List the APIs published on a gateway
    Apis {
        name: String,
    },
    /// Show metrics for one API
    Metrics {
        name: String,
        api_id: String,
    },
    /// Create an API from a JSON definition file
    CreateApi {
        name: String,
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Update an API from a JSON definition file
    UpdateApi {
        name: String,
        api_id: String,
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Delete an API
    DeleteApi {
        name: String,
        api_id: String,
    },
    /// Print a new credential encryption key
    Keygen,
}

fn init_logging(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn read_definition(path: &Path) -> GatewayctlResult<ApiDefinition> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        GatewayctlError::InvalidDefinition(format!(
            "cannot read '{}': {}",
            path.display(),
            e
        ))
    })?;
    serde_json::from_str(&raw).map_err(|e| {
        GatewayctlError::InvalidDefinition(format!("'{}': {}", path.display(), e))
    })
}

fn open_app(settings: &Settings) -> GatewayctlResult<App> {
    let codec = CredentialCodec::from_env()?;
    let database = settings.database_path();
    if let Some(parent) = database.parent() {
        std::fs::create_dir_all(parent)?;
    }
    debug!(database = %database.display(), encrypted = codec.is_enabled(), "Opening store");
    let store = ConfigStore::open(&database, codec)?;
    Ok(App::new(
        store,
        GatewayFactory::new(),
        CertificateStore::new(settings.certificates_path()),
        settings.request_timeout_secs,
    ))
}

async fn run(command: Commands, settings: &Settings) -> GatewayctlResult<Output> {
    if let Commands::Keygen = command {
        return App::keygen();
    }
    let app = open_app(settings)?;
    match command {
        Commands::Types => Ok(app.types()),
        Commands::List => app.list(),
        Commands::Add {
            name,
            gateway_type,
            url,
            no_verify_ssl,
            cert,
            options,
        } => app.add(NewGateway {
            name,
            gateway_type,
            url,
            verify_ssl: !no_verify_ssl,
            cert,
            options: parse_options(&options)?,
        }),
        Commands::Update {
            name,
            rename,
            gateway_type,
            url,
            verify_ssl,
            cert,
            options,
            unset,
        } => app.update(
            &name,
            GatewayChanges {
                rename,
                gateway_type,
                url,
                verify_ssl,
                cert,
                options: parse_options(&options)?,
                remove_options: unset,
            },
        ),
        Commands::Remove { name } => app.remove(&name),
        Commands::Clear => app.clear(),
        Commands::Test { name, all } => match name {
            Some(name) if !all => app.test(&name).await,
            _ => app.test_all().await,
        },
        Commands::Apis { name } => app.apis(&name).await,
        Commands::Metrics { name, api_id } => app.metrics(&name, &api_id).await,
        Commands::CreateApi { name, file } => {
            let definition = read_definition(&file)?;
            app.create_api(&name, &definition).await
        }
        Commands::UpdateApi { name, api_id, file } => {
            let definition = read_definition(&file)?;
            app.update_api(&name, &api_id, &definition).await
        }
        Commands::DeleteApi { name, api_id } => app.delete_api(&name, &api_id).await,
        Commands::Keygen => App::keygen(),
    }
}

fn print_json(value: &serde_json::Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(_) => println!("{value}"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_logging(cli.log_json);

    let settings = Settings::load(cli.config.as_deref())?;

    match run(cli.command, &settings).await {
        Ok(output) => {
            print_json(&output.body);
            Ok(if output.success {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Err(e) => {
            error!(error = %e, "Command failed");
            print_json(&e.to_error_value());
            Ok(ExitCode::FAILURE)
        }
    }
}
