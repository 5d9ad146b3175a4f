use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use teach_gate::auth::hash_password;
use teach_gate::client::InstitutionClient;
use teach_gate::config::{GateConfig, resolve_config_path};
use teach_gate::types::{Role, UserId};

#[derive(Parser)]
#[command(name = "teach-gate")]
#[command(about = "Multi-tenant session and authorization gate for institutions")]
struct Cli {
    /// Configuration file (falls back to TEACH_GATE_CONFIG, then the XDG and local defaults)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gate HTTP server
    Serve {
        /// Override the configured bind address, e.g. 127.0.0.1:8080
        #[arg(long)]
        bind: Option<SocketAddr>,
    },
    /// Load and validate the configuration, then print a summary
    CheckConfig,
    /// Hash a password into an Argon2 PHC string
    HashPassword {
        #[arg(long, env = "TEACH_GATE_PASSWORD")]
        password: String,
    },
    /// Log in to an institution and print the bearer token
    Login {
        #[arg(long)]
        institution: String,
        #[arg(long)]
        user_id: UserId,
        #[arg(long, env = "TEACH_GATE_PASSWORD")]
        password: String,
    },
    /// Fetch the home view of a role area with an existing token
    Home {
        #[arg(long)]
        institution: String,
        #[arg(long)]
        role: Role,
        #[arg(long, env = "TEACH_GATE_TOKEN")]
        token: String,
    },
}

fn load_config(explicit: Option<PathBuf>) -> Result<GateConfig> {
    let path = resolve_config_path(explicit)?;
    info!("Using configuration {}", path.display());
    GateConfig::load(&path)
}

fn client_for(config: &GateConfig, institution: &str) -> Result<InstitutionClient> {
    let institutions = config.institutions()?;
    let institution = institutions
        .get(institution)
        .ok_or_else(|| anyhow!("Institution `{}` is not configured", institution))?;
    Ok(InstitutionClient::new(institution)?)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("teach_gate=info".parse()?)
                .add_directive("tower_http=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { bind } => {
            let config = load_config(cli.config)?;
            let bind = bind.unwrap_or(config.bind);
            let gate = teach_gate::build(&config)?;

            for admin in &gate.bootstrapped {
                println!("Admin created for {}:", admin.institution);
                println!();
                println!("  Username: {}", admin.username);
                println!("  User ID:  {}", admin.credential.user_id);
                println!("  Password: {}", admin.credential.password.as_str());
                println!();
            }
            if !gate.bootstrapped.is_empty() {
                println!("IMPORTANT: Save these passwords now. They cannot be retrieved later.");
            }

            teach_gate::serve(gate, &config.session, bind).await?;
        }
        Commands::CheckConfig => {
            let config = load_config(cli.config)?;
            let institutions = config.institutions()?;
            println!("Configuration OK");
            println!("  Bind:        {}", config.bind);
            println!(
                "  Token TTL:   {}s (sliding: {}, single session: {})",
                config.session.token_ttl_seconds,
                config.session.sliding_expiry,
                config.session.single_session
            );
            println!("  Institutions:");
            for (id, institution) in &config.institutions {
                let base_url = institutions
                    .get(id.as_str())
                    .map(|i| i.base_url.to_string())
                    .unwrap_or_default();
                println!(
                    "    {:<20} {} ({} bootstrap admins)",
                    id,
                    base_url,
                    institution.bootstrap_admins.len()
                );
            }
        }
        Commands::HashPassword { password } => {
            println!("{}", hash_password(&password)?);
        }
        Commands::Login {
            institution,
            user_id,
            password,
        } => {
            let config = load_config(cli.config)?;
            let mut client = client_for(&config, &institution)?;
            let session = client
                .login(user_id, &password)
                .await
                .with_context(|| format!("Logging in to {}", institution))?;
            println!("Token:   {}", session.token);
            println!("Expires: {}", session.expires.format("%Y-%m-%d %H:%M:%S UTC"));
            println!("Use with: -H 'Authorization: Bearer {}'", session.token);
        }
        Commands::Home {
            institution,
            role,
            token,
        } => {
            let config = load_config(cli.config)?;
            let mut client = client_for(&config, &institution)?
                .with_token(token, chrono::Utc::now());
            let home = client
                .home(role)
                .await
                .with_context(|| format!("Fetching {} home of {}", role, institution))?;
            println!("{}", serde_json::to_string_pretty(&home)?);
        }
    }

    Ok(())
}
