use serde::{Deserialize, Serialize};

/// Off-chain snapshot of a registry parcel, cached between serves.
///
/// Bids are kept as decimal strings: uint256 does not fit an integer type
/// and the API treats them as opaque amounts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParcelSnapshot {
    pub parcel_id: u64,
    pub bid: String,
    pub min_bid: String,
    pub owner: String,
    pub renter: String,
    pub traits_hash: String,
    pub content_hash: String,
    pub website_info_hash: String,
    pub active: bool,
}

impl ParcelSnapshot {
    /// A parcel is servable when it is active and currently rented with
    /// published traits and creative documents.
    pub fn servable(&self) -> bool {
        self.active
            && !self.rented_by_nobody()
            && !self.traits_hash.is_empty()
            && !self.content_hash.is_empty()
    }

    fn rented_by_nobody(&self) -> bool {
        self.renter.is_empty()
            || self.renter == "0x0000000000000000000000000000000000000000"
    }
}

/// Parcel traits document from IPFS: the rendering dimensions of the slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParcelTraits {
    pub width: u32,
    pub height: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> ParcelSnapshot {
        ParcelSnapshot {
            parcel_id: 1,
            bid: "1000000000000000".into(),
            min_bid: "1000000000000000".into(),
            owner: "0x52908400098527886E0F7030069857D2E4169EE7".into(),
            renter: "0xde709f2102306220921060314715629080e2fb77".into(),
            traits_hash: "QmTraits".into(),
            content_hash: "QmContent".into(),
            website_info_hash: "QmSite".into(),
            active: true,
        }
    }

    #[test]
    fn test_rented_active_parcel_is_servable() {
        assert!(snapshot().servable());
    }

    #[test]
    fn test_inactive_parcel_is_not_servable() {
        let mut p = snapshot();
        p.active = false;
        assert!(!p.servable());
    }

    #[test]
    fn test_unrented_parcel_is_not_servable() {
        let mut p = snapshot();
        p.renter = "0x0000000000000000000000000000000000000000".into();
        assert!(!p.servable());
    }

    #[test]
    fn test_parcel_without_creative_is_not_servable() {
        let mut p = snapshot();
        p.content_hash.clear();
        assert!(!p.servable());
    }
}
