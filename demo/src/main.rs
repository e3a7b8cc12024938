//! File server stand-in guarded by a reauth chain
//!
//! Everything under `/private` requires an identity from the configured chain.
//! `/healthz` stays open.
//!
//! ```text
//! cargo run -p reauth-demo -- --config demo/reauth.example.toml
//! curl -u alice:secret http://127.0.0.1:8080/private/whoami
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use axum::extract::{ConnectInfo, Request};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Extension, Json, Router};
use clap::Parser;
use reauth::{ClientAddr, Identity, Reauth, ReauthConfig, ReauthError, ReauthLayer};
use tower::ServiceBuilder;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Debug, Parser)]
#[command(name = "reauth-demo", version, about = "Serve a route guarded by a reauth chain")]
struct Args {
    /// Chain configuration (.toml, .json, .yaml)
    #[arg(short, long, env = "REAUTH_DEMO_CONFIG")]
    config: PathBuf,

    /// Address to listen on
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    listen: SocketAddr,

    /// Log level used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

fn init_tracing(level: &str, json: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .context("invalid log filter")?;

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).try_init()?;
    } else {
        registry.with(fmt::layer()).try_init()?;
    }
    Ok(())
}

/// Expose the peer address to backends that forward it
async fn record_client_addr(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    mut req: Request,
) -> Request {
    req.extensions_mut().insert(ClientAddr(addr));
    req
}

async fn handle_reauth_error(err: ReauthError) -> impl IntoResponse {
    error!(error = %err, "authentication chain failed");
    (StatusCode::INTERNAL_SERVER_ERROR, "authentication unavailable")
}

async fn whoami(Extension(identity): Extension<Identity>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "id": identity.id(),
        "metadata": identity.metadata(),
    }))
}

async fn healthz() -> &'static str {
    "ok"
}

fn app(chain: Reauth) -> Router {
    let private = Router::new().route("/whoami", get(whoami)).route_layer(
        ServiceBuilder::new()
            .layer(axum::middleware::map_request(record_client_addr))
            .layer(axum::error_handling::HandleErrorLayer::new(
                handle_reauth_error,
            ))
            .layer(ReauthLayer::new(chain)),
    );

    Router::new()
        .nest("/private", private)
        .route("/healthz", get(healthz))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level, args.json_logs)?;

    let config = ReauthConfig::from_file(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    let chain = Reauth::from_config(&config)
        .await
        .context("resolving authentication chain")?;
    info!(backends = chain.backends().len(), "authentication chain ready");

    let listener = tokio::net::TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("binding {}", args.listen))?;
    info!(addr = %args.listen, "listening");

    axum::serve(
        listener,
        app(chain).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("server error")?;

    Ok(())
}
