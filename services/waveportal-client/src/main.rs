use axum::{
    Json, Router,
    http::StatusCode,
    routing::{get, post, put},
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;
use wp_keystore::{FileKeystore, InMemoryKeystore, Keystore};
use wp_ledger_client::{InMemoryLedger, LedgerContract};
use wp_ledger_http::{HttpLedger, HttpLedgerConfig};
use wp_sync::{PortalOptions, WavePortal};
use wp_wallet::{ApprovalPolicy, LocalWallet, WalletProvider};

mod config;
mod routes;

use config::{ClientConfig, LedgerKind, WalletKind};

#[derive(Debug, Serialize)]
struct HealthResponse {
    service: &'static str,
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct VersionResponse {
    service: &'static str,
    version: &'static str,
}

#[derive(Debug, Serialize)]
pub(crate) struct ErrorResponse {
    error: String,
}

pub(crate) type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) portal: Arc<WavePortal>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = ClientConfig::from_env();
    let ledger = build_ledger(&config);
    let wallet = build_wallet(&config).await?;

    let portal = Arc::new(WavePortal::new(
        ledger,
        wallet,
        PortalOptions {
            fee_hint: Some(config.gas_limit),
        },
    ));

    match portal.load().await {
        Some(session) => info!("resumed session for {}", session.account),
        None => info!("no authorized wallet yet, waiting for POST /connect"),
    }

    let app = router(AppState { portal }).layer(CorsLayer::permissive());

    info!("waveportal-client listening on {}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await?;

    Ok(())
}

pub(crate) fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/version", get(version))
        .route("/state", get(routes::get_state))
        .route("/waves", get(routes::get_waves))
        .route("/connect", post(routes::connect))
        .route("/draft", put(routes::put_draft))
        .route("/wave", post(routes::wave))
        .route("/notices", get(routes::list_notices))
        .route("/notices/{id}/dismiss", post(routes::dismiss_notice))
        .with_state(state)
}

fn build_ledger(config: &ClientConfig) -> Arc<dyn LedgerContract> {
    match config.ledger {
        LedgerKind::Http => {
            info!(
                "using ledger node {} for contract {}",
                config.ledger_url, config.contract_address
            );
            Arc::new(HttpLedger::new(HttpLedgerConfig {
                endpoint: config.ledger_url.clone(),
                contract_address: config.contract_address.clone(),
                confirm_poll: config.confirm_poll,
                confirm_timeout: config.confirm_timeout,
                event_poll: config.event_poll,
            }))
        }
        LedgerKind::Memory => {
            info!("using in-memory ledger for contract {}", config.contract_address);
            Arc::new(InMemoryLedger::new(config.contract_address.clone()))
        }
    }
}

async fn build_wallet(config: &ClientConfig) -> anyhow::Result<Option<Arc<dyn WalletProvider>>> {
    if config.wallet == WalletKind::None {
        info!("wallet disabled");
        return Ok(None);
    }

    let keystore: Arc<dyn Keystore> = match &config.keystore_path {
        Some(path) => {
            info!("using keystore file {}", path.display());
            Arc::new(FileKeystore::open(path))
        }
        None => Arc::new(InMemoryKeystore::default()),
    };
    let policy = if config.auto_approve {
        ApprovalPolicy::AutoApprove
    } else {
        ApprovalPolicy::Deny
    };

    let wallet = LocalWallet::open(keystore, &config.keystore_secret, policy).await?;
    info!("local wallet {}", wallet.address());
    Ok(Some(Arc::new(wallet)))
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        service: "waveportal-client",
        status: "ok",
    })
}

async fn version() -> Json<VersionResponse> {
    Json(VersionResponse {
        service: "waveportal-client",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub(crate) fn bad_request(message: &str) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.to_owned(),
        }),
    )
}

pub(crate) fn conflict(message: &str) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::CONFLICT,
        Json(ErrorResponse {
            error: message.to_owned(),
        }),
    )
}

pub(crate) fn not_found(message: &str) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: message.to_owned(),
        }),
    )
}
