//! Read-only access to the coinflip contract.

use crate::{
    config::AppConfig,
    contract::{
        GameId,
        GameRecord,
        ICoinflip,
    },
    error::{
        ChainError,
        ChainResult,
    },
    events::Resolution,
};
use alloy::{
    primitives::{
        Address,
        B256,
    },
    providers::{
        DynProvider,
        Provider,
        ProviderBuilder,
    },
    rpc::types::Filter,
    sol_types::SolEvent,
};
use std::future::Future;
use tracing::debug;

pub trait ChainReader: Send + Sync + 'static {
    /// Ids of games still waiting for a second player, in contract order.
    fn open_games(&self) -> impl Future<Output = ChainResult<Vec<GameId>>> + Send;

    fn game(&self, game_id: GameId) -> impl Future<Output = ChainResult<GameRecord>> + Send;

    fn chain_id(&self) -> impl Future<Output = ChainResult<u64>> + Send;

    /// Most recent `GameResolved` for `game_id` within the lookback window.
    fn find_resolution(
        &self,
        game_id: GameId,
    ) -> impl Future<Output = ChainResult<Option<Resolution>>> + Send;
}

#[derive(Clone)]
pub struct RpcChainReader {
    provider: DynProvider,
    contract: Address,
    lookback_blocks: u64,
}

impl RpcChainReader {
    pub fn new(provider: DynProvider, contract: Address, lookback_blocks: u64) -> Self {
        Self {
            provider,
            contract,
            lookback_blocks,
        }
    }

    pub fn connect(config: &AppConfig) -> Self {
        let provider = ProviderBuilder::new()
            .connect_http(config.network.rpc_url.clone())
            .erased();
        Self::new(
            provider,
            config.contract,
            config.resolution_lookback_blocks,
        )
    }

    pub fn provider(&self) -> &DynProvider {
        &self.provider
    }

    fn instance(&self) -> ICoinflip::ICoinflipInstance<DynProvider> {
        ICoinflip::new(self.contract, self.provider.clone())
    }
}

impl ChainReader for RpcChainReader {
    async fn open_games(&self) -> ChainResult<Vec<GameId>> {
        self.instance()
            .getOpenGames()
            .call()
            .await
            .map_err(|err| ChainError::call("getOpenGames", err))
    }

    async fn game(&self, game_id: GameId) -> ChainResult<GameRecord> {
        let record = self
            .instance()
            .games(game_id)
            .call()
            .await
            .map_err(|err| ChainError::call("games", err))?;
        Ok(record.into())
    }

    async fn chain_id(&self) -> ChainResult<u64> {
        self.provider.get_chain_id().await.map_err(ChainError::rpc)
    }

    async fn find_resolution(&self, game_id: GameId) -> ChainResult<Option<Resolution>> {
        let latest = self
            .provider
            .get_block_number()
            .await
            .map_err(ChainError::rpc)?;
        let from = latest.saturating_sub(self.lookback_blocks);
        let filter = Filter::new()
            .address(self.contract)
            .event_signature(ICoinflip::GameResolved::SIGNATURE_HASH)
            .topic1(B256::from(game_id.to_be_bytes::<32>()))
            .from_block(from)
            .to_block(latest);
        let logs = self
            .provider
            .get_logs(&filter)
            .await
            .map_err(ChainError::rpc)?;
        debug!(%game_id, from, latest, count = logs.len(), "searched for GameResolved logs");
        let found = logs
            .iter()
            .rev()
            .filter_map(|log| ICoinflip::GameResolved::decode_log_data(&log.inner.data).ok())
            .map(Resolution::from)
            .find(|resolution| resolution.game_id == game_id);
        Ok(found)
    }
}
