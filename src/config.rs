use serde::Deserialize;

/// Deployment environment. The click de-duplication window is only enforced
/// in production so local testing can replay clicks freely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Production,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub redis_url: String,
    pub environment: Environment,
    pub admin_key: String,
    /// Shared secret for inbound webhook signatures and outbound event signing.
    pub webhook_secret: String,
    /// Outbound webhook URLs notified on marketplace events.
    pub webhook_urls: Vec<String>,
    /// Per-IP request budget on /api/* routes. Default: 10.
    pub rate_limit: u32,
    /// Window in seconds for the per-IP budget. Default: 1.
    pub rate_limit_window_secs: u64,
    /// Click de-duplication lookback in hours. Default: 24.
    pub click_window_hours: i64,
    pub dashboard_origin: String,

    // Chain (AdParcelRegistry)
    pub rpc_url: Option<String>,
    pub registry_address: Option<String>,
    pub signer_key: Option<String>,

    // IPFS pinning
    pub pinata_jwt: Option<String>,
    pub ipfs_gateway: String,

    // Image moderation
    pub aws_access_key_id: Option<String>,
    pub aws_secret_access_key: Option<String>,
    pub aws_region: String,
    /// Minimum Rekognition label confidence (0-100) to flag a creative.
    pub moderation_min_confidence: f32,

    // Notification email
    pub smtp_host: Option<String>,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub smtp_from: Option<String>,
}

impl Config {
    /// The 24 h click suppression only applies in production (spec'd escape
    /// hatch for local development).
    pub fn enforce_click_window(&self) -> bool {
        self.environment == Environment::Production
    }
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();

    let environment = match std::env::var("ADPARCEL_ENV")
        .or_else(|_| std::env::var("RUST_ENV"))
        .unwrap_or_default()
        .as_str()
    {
        "production" => Environment::Production,
        _ => Environment::Development,
    };

    let admin_key =
        std::env::var("ADPARCEL_ADMIN_KEY").unwrap_or_else(|_| "CHANGE_ME_ADMIN_KEY".into());
    let webhook_secret =
        std::env::var("ADPARCEL_WEBHOOK_SECRET").unwrap_or_else(|_| "CHANGE_ME_HOOK_SECRET".into());

    if environment == Environment::Production {
        if admin_key == "CHANGE_ME_ADMIN_KEY" {
            anyhow::bail!(
                "ADPARCEL_ADMIN_KEY is still the insecure placeholder. \
                 Set a proper key before running in production."
            );
        }
        if webhook_secret == "CHANGE_ME_HOOK_SECRET" {
            anyhow::bail!(
                "ADPARCEL_WEBHOOK_SECRET is still the insecure placeholder. \
                 Webhook endpoints cannot be authenticated without it."
            );
        }
    } else if admin_key == "CHANGE_ME_ADMIN_KEY" {
        eprintln!("⚠️  ADPARCEL_ADMIN_KEY is not set — using insecure placeholder.");
    }

    Ok(Config {
        port: std::env::var("ADPARCEL_PORT")
            .unwrap_or_else(|_| "8080".into())
            .parse()
            .unwrap_or(8080),
        database_url: std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgres://localhost/adparcel".into()),
        redis_url: std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into()),
        environment,
        admin_key,
        webhook_secret,
        webhook_urls: std::env::var("ADPARCEL_WEBHOOK_URLS")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
        rate_limit: std::env::var("ADPARCEL_RATE_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(10),
        rate_limit_window_secs: std::env::var("ADPARCEL_RATE_LIMIT_WINDOW")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(1),
        click_window_hours: std::env::var("ADPARCEL_CLICK_WINDOW_HOURS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(24),
        dashboard_origin: std::env::var("DASHBOARD_ORIGIN")
            .unwrap_or_else(|_| "http://localhost:3000".into()),
        rpc_url: std::env::var("ADPARCEL_RPC_URL").ok(),
        registry_address: std::env::var("ADPARCEL_REGISTRY_ADDRESS").ok(),
        signer_key: std::env::var("ADPARCEL_SIGNER_KEY").ok(),
        pinata_jwt: std::env::var("PINATA_JWT").ok(),
        ipfs_gateway: std::env::var("ADPARCEL_IPFS_GATEWAY")
            .unwrap_or_else(|_| "https://gateway.pinata.cloud".into()),
        aws_access_key_id: std::env::var("AWS_ACCESS_KEY_ID").ok(),
        aws_secret_access_key: std::env::var("AWS_SECRET_ACCESS_KEY").ok(),
        aws_region: std::env::var("AWS_REGION").unwrap_or_else(|_| "us-east-1".into()),
        moderation_min_confidence: std::env::var("ADPARCEL_MODERATION_MIN_CONFIDENCE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(80.0),
        smtp_host: std::env::var("SMTP_HOST").ok(),
        smtp_username: std::env::var("SMTP_USERNAME").ok(),
        smtp_password: std::env::var("SMTP_PASSWORD").ok(),
        smtp_from: std::env::var("SMTP_FROM").ok(),
    })
}
