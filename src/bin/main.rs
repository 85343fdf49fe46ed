use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{Level, info};
use tracing_subscriber::EnvFilter;
use fleet_session::{
    AuthResult, Authenticator, RequestContext, RevocationList, Role, SessionConfig, SubjectId,
    load_session_config, resolve_config_path,
};

/// How often revoked refresh tokens past their expiry are dropped.
const REVOCATION_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

#[derive(Parser)]
#[command(name = "fleet-session")]
#[command(about = "Session authentication service for the fleet backend")]
struct Cli {
    /// Path to a JSON session config (falls back to FLEET_SESSION_CONFIG, then FLEET_* env vars)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Bind address, e.g. 0.0.0.0:8080
        #[arg(long, default_value = "0.0.0.0:8080")]
        bind: String,
        /// Server build clients must match (overrides config)
        #[arg(long, env = "FLEET_APP_VERSION")]
        expected_version: Option<String>,
    },
    /// Issue an access/refresh token pair
    IssueToken {
        #[arg(long)]
        subject: String,
        #[arg(long, default_value = "owner")]
        role: String,
    },
    /// Run the authentication gates against a token offline
    Verify {
        #[arg(long)]
        token: Option<String>,
        #[arg(long)]
        refresh_token: Option<String>,
        #[arg(long)]
        app_version: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("fleet_session=info".parse()?),
        )
        .with_max_level(Level::INFO)
        .init();

    let cli = Cli::parse();
    let mut config = load_config(cli.config)?;

    match cli.command {
        Commands::Serve {
            bind,
            expected_version,
        } => {
            if let Some(version) = expected_version.filter(|v| !v.trim().is_empty()) {
                config.expected_version = Some(version);
            }
            config.validate()?;

            match &config.expected_version {
                Some(v) => info!("Enforcing client version {}", v),
                None => info!("Client version check disabled"),
            }

            let revocation = RevocationList::new();
            let sweeper = revocation.spawn_sweeper(REVOCATION_SWEEP_INTERVAL);
            let authenticator = Authenticator::new(&config).with_revocation(revocation);

            let app = fleet_session::api::create_router(authenticator);
            let listener = tokio::net::TcpListener::bind(&bind).await?;
            info!("Session server listening on http://{}", bind);

            let served = axum::serve(listener, app).await;
            sweeper.abort();
            served?;
        }
        Commands::IssueToken { subject, role } => {
            config.validate()?;
            let authenticator = Authenticator::new(&config);

            let tokens =
                authenticator.issue_session(&SubjectId::new(subject), &Role::new(role))?;
            println!("{}", serde_json::to_string_pretty(&tokens)?);
        }
        Commands::Verify {
            token,
            refresh_token,
            app_version,
        } => {
            let authenticator = Authenticator::new(&config);
            let result = verify(&authenticator, token, refresh_token, app_version).await?;

            println!("Authenticated");
            println!("  Subject: {}", result.claims.sub);
            println!("  Role:    {}", result.claims.role);
            println!("  Expires: {}", result.claims.exp);
            if let Some(new_token) = result.new_access_token {
                println!("  Renewed access token: {}", new_token);
            }
        }
    }

    Ok(())
}

/// Run the authentication gates offline; a rejection is an error so the
/// process exits non-zero.
async fn verify(
    authenticator: &Authenticator,
    token: Option<String>,
    refresh_token: Option<String>,
    app_version: Option<String>,
) -> Result<AuthResult> {
    let mut ctx = RequestContext::new();
    if let Some(t) = token {
        ctx = ctx.with_bearer(&t);
    }
    if let Some(r) = refresh_token {
        ctx = ctx.with_refresh_token(r);
    }
    if let Some(v) = app_version {
        ctx = ctx.with_client_version(&v);
    }

    authenticator.authenticate(&ctx).await.map_err(|e| match e.detail() {
        Some(detail) => anyhow::anyhow!("Rejected ({}): {} [{}]", e.status(), e, detail),
        None => anyhow::anyhow!("Rejected ({}): {}", e.status(), e),
    })
}

/// Load session config from an explicit path, a discovered file, or the environment.
fn load_config(path: Option<PathBuf>) -> Result<SessionConfig> {
    match path.or_else(resolve_config_path) {
        Some(p) => {
            info!("Loading session config from {}", p.display());
            load_session_config(&p)
        }
        None => {
            info!("Loading session config from environment");
            SessionConfig::from_env()
        }
    }
}
