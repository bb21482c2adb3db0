use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{DefaultBodyLimit, MatchedPath, Request, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::get;
use clap::Parser;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod cache;
mod chain;
mod cli;
mod config;
mod errors;
mod jobs;
mod metrics;
mod middleware;
mod models;
mod notification;
mod proxy;
mod store;
mod template;

use cache::TieredCache;
use chain::ParcelChain;
use metrics::PrometheusRecorder;
use middleware::rate_limit::FixedWindowLimiter;
use notification::email::Mailer;
use notification::webhook::WebhookNotifier;
use proxy::pinata::PinataClient;
use proxy::rekognition::ModerationClient;
use store::postgres::PgStore;

/// Shared application state passed to handlers and middleware.
pub struct AppState {
    pub db: PgStore,
    pub cache: TieredCache,
    pub limiter: FixedWindowLimiter,
    pub chain: Option<ParcelChain>,
    pub pinata: Option<PinataClient>,
    pub moderation: Option<ModerationClient>,
    pub mailer: Option<Mailer>,
    pub webhook: WebhookNotifier,
    pub metrics: PrometheusRecorder,
    pub config: config::Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Ship spans to an OTLP collector when an endpoint is configured,
    // otherwise log to stdout only.
    use opentelemetry::KeyValue;
    use opentelemetry_sdk::{trace as sdktrace, Resource};

    let telemetry_layer = if std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok() {
        let tracer = opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(opentelemetry_otlp::new_exporter().tonic())
            .with_trace_config(sdktrace::config().with_resource(Resource::new(vec![
                KeyValue::new("service.name", "adparcel-gateway"),
            ])))
            .install_batch(opentelemetry_sdk::runtime::Tokio)
            .expect("failed to install OpenTelemetry tracer");
        Some(tracing_opentelemetry::layer().with_tracer(tracer))
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "adparcel=debug,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .with(telemetry_layer)
        .init();

    let cfg = config::load()?;
    let args = cli::Cli::parse();

    let result = match args.command {
        Some(cli::Commands::Serve { port }) => {
            let port = port.unwrap_or(cfg.port);
            run_server(cfg, port).await
        }
        Some(cli::Commands::Website { command }) => {
            let db = PgStore::connect(&cfg.database_url).await?;
            handle_website_command(&db, command).await
        }
        Some(cli::Commands::Events { command }) => {
            let db = PgStore::connect(&cfg.database_url).await?;
            handle_event_command(&db, command).await
        }
        None => {
            let port = cfg.port;
            run_server(cfg, port).await
        }
    };

    if let Err(ref e) = result {
        eprintln!("Error: {:?}", e);
    }
    result
}

async fn run_server(cfg: config::Config, port: u16) -> anyhow::Result<()> {
    tracing::info!("Connecting to database...");
    let db = PgStore::connect(&cfg.database_url).await?;

    tracing::info!("Running migrations...");
    db.migrate().await?;

    tracing::info!("Connecting to Redis...");
    let redis_client = redis::Client::open(cfg.redis_url.as_str())?;
    let redis_conn = redis::aio::ConnectionManager::new(redis_client).await?;
    let cache = TieredCache::new(redis_conn);

    let chain = match (&cfg.rpc_url, &cfg.registry_address, &cfg.signer_key) {
        (Some(rpc), Some(registry), Some(key)) => {
            tracing::info!("Connecting to registry contract...");
            Some(ParcelChain::connect(rpc, registry, key).await?)
        }
        _ => {
            tracing::warn!("chain env vars incomplete — ad serving and chain proxy disabled");
            None
        }
    };

    let pinata = cfg
        .pinata_jwt
        .clone()
        .map(|jwt| PinataClient::new(jwt, cfg.ipfs_gateway.clone()));
    if pinata.is_none() {
        tracing::warn!("PINATA_JWT not set — IPFS pinning disabled");
    }

    let moderation = match (&cfg.aws_access_key_id, &cfg.aws_secret_access_key) {
        (Some(key), Some(secret)) => Some(ModerationClient::new(
            key.clone(),
            secret.clone(),
            cfg.aws_region.clone(),
            cfg.moderation_min_confidence,
        )),
        _ => {
            tracing::warn!("AWS credentials not set — creative moderation disabled");
            None
        }
    };

    let mailer = match (&cfg.smtp_host, &cfg.smtp_from) {
        (Some(host), Some(from)) => Some(Mailer::new(
            host,
            cfg.smtp_username.as_deref(),
            cfg.smtp_password.as_deref(),
            from,
        )?),
        _ => {
            tracing::warn!("SMTP not configured — notification email disabled");
            None
        }
    };

    let limiter = FixedWindowLimiter::new(
        cfg.rate_limit,
        Duration::from_secs(cfg.rate_limit_window_secs),
    );

    let state = Arc::new(AppState {
        db,
        cache,
        limiter,
        chain,
        pinata,
        moderation,
        mailer,
        webhook: WebhookNotifier::new(cfg.webhook_secret.clone()),
        metrics: PrometheusRecorder::new(),
        config: cfg,
    });

    let api = axum::Router::new()
        .nest("/serve", api::serve_router())
        .nest("/v1", api::api_router(state.clone()))
        .nest("/hooks", api::hooks_router())
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            api::rate_limit,
        ));

    let app = axum::Router::new()
        // Operational endpoints (no auth, no rate limit)
        .route("/healthz", get(|| async { "ok" }))
        .route("/readyz", get(readiness_check))
        .route("/metrics", get(metrics_handler))
        .route("/ad-parcel.js", get(embed_script))
        .nest("/api", api)
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            track_metrics,
        ))
        .with_state(state.clone())
        .layer(DefaultBodyLimit::max(2 * 1024 * 1024))
        // 30 s cap on any handler, chain confirmation waits included.
        .layer(
            tower::ServiceBuilder::new()
                .layer(axum::error_handling::HandleErrorLayer::new(
                    |_: tower::BoxError| async {
                        axum::http::StatusCode::REQUEST_TIMEOUT
                    },
                ))
                .timeout(Duration::from_secs(30)),
        )
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer({
            use axum::http::{HeaderName, Method};
            use tower_http::cors::AllowOrigin;
            let dashboard_origin = state.config.dashboard_origin.clone();
            CorsLayer::new()
                .allow_origin(AllowOrigin::predicate(move |origin, _| {
                    let origin_str = origin.to_str().unwrap_or("");
                    origin_str == dashboard_origin
                        || origin_str.starts_with("http://localhost:")
                        || origin_str.starts_with("http://127.0.0.1:")
                }))
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PUT,
                    Method::DELETE,
                    Method::OPTIONS,
                ])
                .allow_headers([
                    HeaderName::from_static("content-type"),
                    HeaderName::from_static("authorization"),
                    HeaderName::from_static("x-admin-key"),
                    HeaderName::from_static("x-adparcel-signature"),
                    HeaderName::from_static("x-request-id"),
                ])
                .allow_credentials(true)
        })
        .layer(axum::middleware::from_fn(request_id_middleware))
        .layer(axum::middleware::from_fn(security_headers_middleware));

    jobs::cleanup::spawn(state.clone());
    tracing::info!("Background cleanup job started (hourly)");

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("AdParcel gateway listening on {}", addr);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

/// Readiness: the gateway is ready when the database answers.
async fn readiness_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.db.ping().await {
        Ok(()) => (axum::http::StatusCode::OK, "ok"),
        Err(e) => {
            tracing::error!("readiness check failed: {}", e);
            (axum::http::StatusCode::SERVICE_UNAVAILABLE, "database unreachable")
        }
    }
}

async fn metrics_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::encode_metrics(),
    )
}

/// The embeddable client script. Publishers drop a single <script> tag and
/// a container div on their page; the script pulls the snippet and reports
/// clicks back.
async fn embed_script() -> impl IntoResponse {
    (
        [
            (header::CONTENT_TYPE, "application/javascript; charset=utf-8"),
            (header::CACHE_CONTROL, "public, max-age=3600"),
        ],
        include_str!("../static/ad-parcel.js"),
    )
}

/// Middleware: per-route request counters.
async fn track_metrics(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let resp = next.run(req).await;
    state.metrics.record_request(&route, resp.status().as_u16());
    resp
}

/// Middleware: injects a unique X-Request-Id into every response.
/// This allows clients to correlate errors with gateway logs.
async fn request_id_middleware(
    req: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let req_id = uuid::Uuid::new_v4().to_string();
    let mut resp = next.run(req).await;
    if let Ok(val) = axum::http::HeaderValue::from_str(&req_id) {
        resp.headers_mut().insert("x-request-id", val);
    }
    resp
}

/// Middleware: injects security headers into every response.
async fn security_headers_middleware(
    req: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let mut resp = next.run(req).await;
    let headers = resp.headers_mut();

    headers.insert("X-Content-Type-Options", "nosniff".parse().unwrap());
    headers.insert("X-Frame-Options", "DENY".parse().unwrap());
    headers.insert("Referrer-Policy", "no-referrer".parse().unwrap());
    headers.remove("Server");

    resp
}

async fn handle_website_command(db: &PgStore, cmd: cli::WebsiteCommands) -> anyhow::Result<()> {
    match cmd {
        cli::WebsiteCommands::List { owner } => {
            let sites = db.list_websites(owner.as_deref()).await?;
            if sites.is_empty() {
                println!("No websites found.");
            } else {
                println!("{:<38} {:<20} {:<30} OWNER", "ID", "NAME", "URL");
                for s in sites {
                    println!(
                        "{:<38} {:<20} {:<30} {}",
                        s.id, s.name, s.url, s.owner_address
                    );
                }
            }
        }
    }
    Ok(())
}

async fn handle_event_command(db: &PgStore, cmd: cli::EventCommands) -> anyhow::Result<()> {
    match cmd {
        cli::EventCommands::Prune { days } => {
            let cutoff = chrono::Utc::now() - chrono::Duration::days(days);
            let dropped = db.prune_events_before(cutoff).await?;
            println!("Dropped {} events older than {} days.", dropped, days);
        }
    }
    Ok(())
}
