//! Typed client for the AdParcelRegistry contract.
//!
//! The binding is generated from the ABI schema with `abigen!`, so every
//! call and return struct is checked at compile time instead of going
//! through stringly-typed ABI lookups. Reads use `call()`; the single
//! write (parcel activation) is signed locally and waits for one
//! confirmation.

use ethers::contract::abigen;
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Middleware, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, U256, U64};
use std::sync::Arc;

use crate::errors::AppError;
use crate::models::parcel::ParcelSnapshot;

abigen!(AdParcelRegistry, "./abi/AdParcelRegistry.json");

type RegistryClient = AdParcelRegistry<SignerMiddleware<Provider<Http>, LocalWallet>>;

#[derive(Clone)]
pub struct ParcelChain {
    contract: Arc<RegistryClient>,
}

impl ParcelChain {
    pub async fn connect(
        rpc_url: &str,
        registry_address: &str,
        signer_key: &str,
    ) -> anyhow::Result<Self> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .map_err(|e| anyhow::anyhow!("invalid RPC url: {}", e))?;

        let chain_id = provider
            .get_chainid()
            .await
            .map_err(|e| anyhow::anyhow!("failed to get chain ID: {}", e))?
            .as_u64();

        let wallet = signer_key
            .parse::<LocalWallet>()
            .map_err(|e| anyhow::anyhow!("invalid signer key: {}", e))?
            .with_chain_id(chain_id);

        let address = registry_address
            .parse::<Address>()
            .map_err(|e| anyhow::anyhow!("invalid registry address: {}", e))?;

        let client = Arc::new(SignerMiddleware::new(provider, wallet));
        tracing::info!(chain_id, registry = registry_address, "connected to registry");

        Ok(Self {
            contract: Arc::new(AdParcelRegistry::new(address, client)),
        })
    }

    pub async fn get_parcel(&self, parcel_id: u64) -> Result<ParcelSnapshot, AppError> {
        let parcel = self
            .contract
            .get_ad_parcel_by_id(U256::from(parcel_id))
            .call()
            .await
            .map_err(|e| AppError::Chain(format!("getAdParcelById({}): {}", parcel_id, e)))?;

        Ok(ParcelSnapshot {
            parcel_id,
            bid: parcel.bid.to_string(),
            min_bid: parcel.min_bid.to_string(),
            owner: format!("{:#x}", parcel.owner),
            renter: format!("{:#x}", parcel.renter),
            traits_hash: parcel.traits_hash,
            content_hash: parcel.content_hash,
            website_info_hash: parcel.website_info_hash,
            active: parcel.active,
        })
    }

    pub async fn list_parcel_ids(&self) -> Result<Vec<u64>, AppError> {
        let ids = self
            .contract
            .get_parcel_ids()
            .call()
            .await
            .map_err(|e| AppError::Chain(format!("getParcelIds: {}", e)))?;
        Ok(ids.into_iter().map(|id| id.as_u64()).collect())
    }

    /// Submit the activation write and wait for one confirmation.
    /// Returns the transaction hash.
    pub async fn set_parcel_active(
        &self,
        parcel_id: u64,
        active: bool,
    ) -> Result<String, AppError> {
        let call = self.contract.set_parcel_active(U256::from(parcel_id), active);
        let pending = call
            .send()
            .await
            .map_err(|e| AppError::Chain(format!("setParcelActive send: {}", e)))?;

        let tx_hash = format!("{:#x}", pending.tx_hash());
        let receipt = pending
            .confirmations(1)
            .await
            .map_err(|e| AppError::Chain(format!("setParcelActive confirmation: {}", e)))?;

        match receipt {
            Some(r) if r.status == Some(U64::from(1)) => {
                tracing::info!(parcel_id, active, tx = %tx_hash, "parcel activation confirmed");
                Ok(tx_hash)
            }
            Some(_) => Err(AppError::Chain(format!(
                "setParcelActive reverted on-chain (tx {})",
                tx_hash
            ))),
            None => Err(AppError::Chain(format!(
                "setParcelActive dropped from mempool (tx {})",
                tx_hash
            ))),
        }
    }
}
