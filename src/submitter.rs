//! Signing and broadcasting of state-changing coinflip calls.

use crate::{
    config::AppConfig,
    contract::{
        GameId,
        ICoinflip,
        Side,
    },
    error::{
        ChainError,
        ChainResult,
    },
};
use alloy::{
    network::{
        EthereumWallet,
        ReceiptResponse,
    },
    primitives::{
        Address,
        Log,
        TxHash,
        U256,
    },
    providers::{
        DynProvider,
        Provider,
        ProviderBuilder,
    },
    signers::local::PrivateKeySigner,
};
use std::{
    fmt,
    future::Future,
    time::Duration,
};
use tracing::{
    debug,
    info,
};

const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Action {
    CreateGame,
    JoinGame(GameId),
    MakeChoice { game_id: GameId, side: Side },
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::CreateGame => "createGame",
            Action::JoinGame(_) => "joinGame",
            Action::MakeChoice { .. } => "makeChoice",
        }
    }

    /// Value attached to the call: create and join stake, choosing is free.
    pub fn value(&self, stake: U256) -> U256 {
        match self {
            Action::CreateGame | Action::JoinGame(_) => stake,
            Action::MakeChoice { .. } => U256::ZERO,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::CreateGame => write!(f, "createGame()"),
            Action::JoinGame(id) => write!(f, "joinGame({id})"),
            Action::MakeChoice { game_id, side } => {
                write!(f, "makeChoice({game_id}, {})", side.code())
            }
        }
    }
}

pub trait TxSubmitter: Send + Sync + 'static {
    fn account(&self) -> Address;

    /// Signs and broadcasts `action`, resolving once the node accepted it.
    fn submit(&self, action: Action) -> impl Future<Output = ChainResult<TxHash>> + Send;

    /// Waits, without a deadline, for the receipt of `tx_hash` and returns its logs.
    fn wait_for_receipt(
        &self,
        tx_hash: TxHash,
    ) -> impl Future<Output = ChainResult<Vec<Log>>> + Send;
}

#[derive(Clone)]
pub struct WalletSubmitter {
    provider: DynProvider,
    account: Address,
    contract: Address,
    stake: U256,
}

impl WalletSubmitter {
    pub fn connect(config: &AppConfig, signer: PrivateKeySigner) -> Self {
        let account = signer.address();
        let provider = ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer))
            .connect_http(config.network.rpc_url.clone())
            .erased();
        Self {
            provider,
            account,
            contract: config.contract,
            stake: config.stake,
        }
    }
}

impl TxSubmitter for WalletSubmitter {
    fn account(&self) -> Address {
        self.account
    }

    async fn submit(&self, action: Action) -> ChainResult<TxHash> {
        let instance = ICoinflip::new(self.contract, self.provider.clone());
        let value = action.value(self.stake);
        info!(%action, %value, "submitting transaction");
        let pending = match action {
            Action::CreateGame => instance.createGame().value(value).send().await,
            Action::JoinGame(game_id) => {
                instance.joinGame(game_id).value(value).send().await
            }
            Action::MakeChoice { game_id, side } => {
                instance.makeChoice(game_id, side.code()).send().await
            }
        }
        .map_err(|err| ChainError::call(action.name(), err))?;
        let tx_hash = *pending.tx_hash();
        info!(%action, %tx_hash, "transaction broadcast");
        Ok(tx_hash)
    }

    async fn wait_for_receipt(&self, tx_hash: TxHash) -> ChainResult<Vec<Log>> {
        loop {
            let receipt = self
                .provider
                .get_transaction_receipt(tx_hash)
                .await
                .map_err(ChainError::rpc)?;
            match receipt {
                Some(receipt) => {
                    if !receipt.status() {
                        return Err(ChainError::Reverted(tx_hash));
                    }
                    let logs = receipt
                        .inner
                        .logs()
                        .iter()
                        .map(|log| log.inner.clone())
                        .collect();
                    return Ok(logs);
                }
                None => {
                    debug!(%tx_hash, "receipt not available yet");
                    tokio::time::sleep(RECEIPT_POLL_INTERVAL).await;
                }
            }
        }
    }
}
