//! In-memory stand-in for the coinflip contract and its node.

use crate::{
    chain::ChainReader,
    config::AppConfig,
    contract::{
        GameId,
        GameRecord,
        ICoinflip,
        Side,
    },
    error::{
        ChainError,
        ChainResult,
    },
    events::Resolution,
    submitter::{
        Action,
        TxSubmitter,
    },
};
use alloy::{
    primitives::{
        Address,
        B256,
        Log,
        TxHash,
        U256,
    },
    sol_types::SolEvent,
};
use std::{
    collections::HashMap,
    sync::{
        Arc,
        Mutex,
        MutexGuard,
    },
    time::Duration,
};

pub const FAKE_CONTRACT: Address = Address::repeat_byte(0xc0);
pub const FAKE_CHAIN_ID: u64 = 10143;

/// Config pointing at the fake contract with a short poll interval.
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::defaults().expect("defaults are valid");
    config.contract = FAKE_CONTRACT;
    config.poll_interval = Duration::from_millis(100);
    config
}

#[derive(Default)]
struct FakeState {
    games: HashMap<GameId, GameRecord>,
    open_games: Vec<GameId>,
    next_game_id: u64,
    next_tx: u64,
    receipts: HashMap<TxHash, Vec<Log>>,
    submitted: Vec<Action>,
    resolutions: HashMap<GameId, Resolution>,
    resolve_on_choice: HashMap<GameId, Resolution>,
    read_failure: Option<String>,
    submit_failure: Option<String>,
    reverting: bool,
}

/// Emulates the contract for one player account. Clones share state, so a
/// test can hand one clone to the controller and drive the other player
/// through the remaining one.
#[derive(Clone)]
pub struct FakeChain {
    account: Address,
    state: Arc<Mutex<FakeState>>,
}

impl FakeChain {
    pub fn new(account: Address) -> Self {
        let state = FakeState {
            next_game_id: 1,
            ..FakeState::default()
        };
        Self {
            account,
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().expect("fake chain state poisoned")
    }

    /// Opens a game created by `creator`, returning its id.
    pub fn open_game(&self, creator: Address) -> GameId {
        let mut state = self.lock();
        let game_id = U256::from(state.next_game_id);
        state.next_game_id += 1;
        state.games.insert(
            game_id,
            GameRecord {
                player1: creator,
                player2: Address::ZERO,
                choice1: 0,
                choice2: 0,
                resolved: false,
            },
        );
        state.open_games.push(game_id);
        game_id
    }

    /// Seats `opponent` as the second player of `game_id`.
    pub fn join_as(&self, game_id: GameId, opponent: Address) {
        let mut state = self.lock();
        if let Some(game) = state.games.get_mut(&game_id) {
            game.player2 = opponent;
        }
        state.open_games.retain(|id| *id != game_id);
    }

    /// Marks `game_id` resolved without a receipt reaching the player, as
    /// when the opponent's choice settles the game.
    pub fn resolve_externally(&self, resolution: Resolution) {
        let mut state = self.lock();
        if let Some(game) = state.games.get_mut(&resolution.game_id) {
            game.resolved = true;
        }
        state.resolutions.insert(resolution.game_id, resolution);
    }

    /// The player's own `makeChoice` for `game_id` settles it with `resolution`.
    pub fn resolve_on_choice(&self, resolution: Resolution) {
        self.lock()
            .resolve_on_choice
            .insert(resolution.game_id, resolution);
    }

    pub fn game(&self, game_id: GameId) -> Option<GameRecord> {
        self.lock().games.get(&game_id).copied()
    }

    pub fn fail_reads(&self, reason: Option<&str>) {
        self.lock().read_failure = reason.map(str::to_owned);
    }

    pub fn fail_submissions(&self, reason: Option<&str>) {
        self.lock().submit_failure = reason.map(str::to_owned);
    }

    pub fn revert_transactions(&self, reverting: bool) {
        self.lock().reverting = reverting;
    }

    pub fn submitted(&self) -> Vec<Action> {
        self.lock().submitted.clone()
    }

    fn check_reads(&self) -> ChainResult<()> {
        match &self.lock().read_failure {
            Some(reason) => Err(ChainError::Rpc(reason.clone())),
            None => Ok(()),
        }
    }

    fn apply(&self, state: &mut FakeState, action: Action) -> Vec<Log> {
        match action {
            Action::CreateGame => {
                let game_id = U256::from(state.next_game_id);
                state.next_game_id += 1;
                state.games.insert(
                    game_id,
                    GameRecord {
                        player1: self.account,
                        player2: Address::ZERO,
                        choice1: 0,
                        choice2: 0,
                        resolved: false,
                    },
                );
                state.open_games.push(game_id);
                let event = ICoinflip::GameCreated { gameId: game_id };
                vec![contract_log(event.encode_log_data())]
            }
            Action::JoinGame(game_id) => {
                if let Some(game) = state.games.get_mut(&game_id) {
                    game.player2 = self.account;
                }
                state.open_games.retain(|id| *id != game_id);
                Vec::new()
            }
            Action::MakeChoice { game_id, side } => {
                let account = self.account;
                if let Some(game) = state.games.get_mut(&game_id) {
                    record_choice(game, account, side);
                }
                match state.resolve_on_choice.remove(&game_id) {
                    Some(resolution) => {
                        if let Some(game) = state.games.get_mut(&game_id) {
                            game.resolved = true;
                        }
                        state.resolutions.insert(game_id, resolution);
                        let event = ICoinflip::GameResolved {
                            gameId: resolution.game_id,
                            winner: resolution.winner,
                            winningChoice: resolution.winning_choice,
                        };
                        vec![contract_log(event.encode_log_data())]
                    }
                    None => Vec::new(),
                }
            }
        }
    }
}

fn record_choice(game: &mut GameRecord, account: Address, side: Side) {
    if game.player1 == account {
        game.choice1 = side.code();
    } else {
        game.choice2 = side.code();
    }
}

fn contract_log(data: alloy::primitives::LogData) -> Log {
    Log {
        address: FAKE_CONTRACT,
        data,
    }
}

impl ChainReader for FakeChain {
    async fn open_games(&self) -> ChainResult<Vec<GameId>> {
        self.check_reads()?;
        Ok(self.lock().open_games.clone())
    }

    async fn game(&self, game_id: GameId) -> ChainResult<GameRecord> {
        self.check_reads()?;
        Ok(self.lock().games.get(&game_id).copied().unwrap_or(GameRecord {
            player1: Address::ZERO,
            player2: Address::ZERO,
            choice1: 0,
            choice2: 0,
            resolved: false,
        }))
    }

    async fn chain_id(&self) -> ChainResult<u64> {
        self.check_reads()?;
        Ok(FAKE_CHAIN_ID)
    }

    async fn find_resolution(&self, game_id: GameId) -> ChainResult<Option<Resolution>> {
        self.check_reads()?;
        Ok(self.lock().resolutions.get(&game_id).copied())
    }
}

impl TxSubmitter for FakeChain {
    fn account(&self) -> Address {
        self.account
    }

    async fn submit(&self, action: Action) -> ChainResult<TxHash> {
        let mut state = self.lock();
        if let Some(reason) = &state.submit_failure {
            return Err(ChainError::Call {
                call: action.name(),
                reason: reason.clone(),
            });
        }
        state.submitted.push(action);
        state.next_tx += 1;
        let tx_hash = B256::from(U256::from(state.next_tx).to_be_bytes::<32>());
        let logs = if state.reverting {
            Vec::new()
        } else {
            self.apply(&mut state, action)
        };
        state.receipts.insert(tx_hash, logs);
        Ok(tx_hash)
    }

    async fn wait_for_receipt(&self, tx_hash: TxHash) -> ChainResult<Vec<Log>> {
        let state = self.lock();
        if state.reverting {
            return Err(ChainError::Reverted(tx_hash));
        }
        state
            .receipts
            .get(&tx_hash)
            .cloned()
            .ok_or_else(|| ChainError::Rpc(format!("no receipt for {tx_hash}")))
    }
}
