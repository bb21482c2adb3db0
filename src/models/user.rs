use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Checksummed or lowercase EVM wallet address: 0x + 40 hex chars.
static WALLET_ADDRESS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^0x[0-9a-fA-F]{40}$").expect("valid wallet address regex"));

pub fn is_wallet_address(s: &str) -> bool {
    WALLET_ADDRESS.is_match(s)
}

/// Marketplace role: publishers offer ad parcels on their websites,
/// announcers rent them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Publisher,
    Announcer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Publisher => "publisher",
            Role::Announcer => "announcer",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct UserRow {
    pub wallet_address: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub role: String,
    /// Auth-provider profile blob (Web3Auth), opaque to the gateway.
    pub profile: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wallet_address_validation() {
        assert!(is_wallet_address(
            "0x52908400098527886E0F7030069857D2E4169EE7"
        ));
        assert!(is_wallet_address(
            "0xde709f2102306220921060314715629080e2fb77"
        ));
        assert!(!is_wallet_address("52908400098527886E0F7030069857D2E4169EE7"));
        assert!(!is_wallet_address("0x123"));
        assert!(!is_wallet_address("0xZZ08400098527886E0F7030069857D2E4169EE7"));
    }

    #[test]
    fn test_role_round_trip() {
        let r: Role = serde_json::from_str("\"announcer\"").unwrap();
        assert_eq!(r, Role::Announcer);
        assert_eq!(r.as_str(), "announcer");
    }
}
