use crate::{
    chain::{
        ChainReader,
        RpcChainReader,
    },
    config::AppConfig,
    contract::{
        GameId,
        format_native,
    },
    error::ChainError,
    events,
    submitter::{
        Action,
        TxSubmitter,
        WalletSubmitter,
    },
    sync::{
        Effect,
        Input,
        Phase,
        PollResult,
        Synchronizer,
        Ticket,
        UserAction,
    },
    ui,
};
use alloy::{
    primitives::{
        Address,
        TxHash,
    },
    signers::local::PrivateKeySigner,
};
use chrono::{
    DateTime,
    Local,
};
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use std::{
    sync::Arc,
    time::Duration,
};
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{
        self,
        Instant,
        MissedTickBehavior,
    },
};
use tracing::{
    error,
    info,
    warn,
};

const MAX_ERRORS: usize = 20;

pub type InputSender = mpsc::UnboundedSender<Input>;
pub type InputReceiver = mpsc::UnboundedReceiver<Input>;

/// Everything the UI needs to draw one frame.
#[derive(Clone, Debug)]
pub struct AppSnapshot {
    pub network: String,
    pub chain_id: u64,
    pub explorer_url: Option<String>,
    pub contract: Address,
    pub stake: String,
    pub account: Option<Address>,
    pub phase: Phase,
    pub game_id: Option<GameId>,
    pub winner_info: Option<String>,
    pub open_games: Vec<GameId>,
    pub pending_tx: Option<TxHash>,
    pub last_poll_at: Option<DateTime<Local>>,
    pub status: String,
    pub errors: Vec<String>,
}

/// The single repeating poll of the tracked game. Dropping it cancels the task.
struct PollHandle {
    game_id: GameId,
    task: JoinHandle<()>,
}

impl PollHandle {
    fn spawn<R: ChainReader>(
        reader: Arc<R>,
        game_id: GameId,
        period: Duration,
        inputs: InputSender,
    ) -> Self {
        let task = tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match reader.game(game_id).await {
                    Ok(game) => {
                        if inputs.send(Input::Poll(PollResult { game_id, game })).is_err() {
                            break;
                        }
                    }
                    Err(err) => warn!(%game_id, %err, "game poll failed"),
                }
            }
        });
        Self { game_id, task }
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub struct AppController<R, S> {
    config: AppConfig,
    reader: Arc<R>,
    wallet: Option<Arc<S>>,
    wallet_connected: bool,
    sync: Synchronizer,
    inputs: InputSender,
    poll: Option<PollHandle>,
    last_poll_at: Option<DateTime<Local>>,
    status: String,
    errors: Vec<String>,
}

impl<R: ChainReader, S: TxSubmitter> AppController<R, S> {
    pub fn new(config: AppConfig, reader: R, wallet: Option<S>) -> (Self, InputReceiver) {
        let (inputs, receiver) = mpsc::unbounded_channel();
        let wallet_connected = wallet.is_some();
        let controller = Self {
            config,
            reader: Arc::new(reader),
            wallet: wallet.map(Arc::new),
            wallet_connected,
            sync: Synchronizer::new(),
            inputs,
            poll: None,
            last_poll_at: None,
            status: String::from("Ready"),
            errors: Vec::new(),
        };
        (controller, receiver)
    }

    pub fn phase(&self) -> Phase {
        self.sync.phase()
    }

    pub fn synchronizer(&self) -> &Synchronizer {
        &self.sync
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Game id of the live poll task, if any.
    pub fn polling(&self) -> Option<GameId> {
        self.poll.as_ref().map(|handle| handle.game_id)
    }

    pub fn account(&self) -> Option<Address> {
        self.active_wallet().map(|wallet| wallet.account())
    }

    fn active_wallet(&self) -> Option<&Arc<S>> {
        self.wallet.as_ref().filter(|_| self.wallet_connected)
    }

    pub fn start(&mut self) {
        let effects = self.sync.start();
        self.execute(effects);
    }

    pub fn shutdown(&mut self) {
        let effects = self.sync.teardown();
        self.execute(effects);
        self.poll = None;
    }

    pub fn toggle_wallet(&mut self) {
        let Some(account) = self.wallet.as_ref().map(|wallet| wallet.account()) else {
            self.push_error(
                "No keystore unlocked; restart with --wallet <name> to play".to_string(),
            );
            return;
        };
        self.wallet_connected = !self.wallet_connected;
        if self.wallet_connected {
            info!(%account, "wallet connected");
            self.set_status(format!("Connected {account}"));
        } else {
            info!(%account, "wallet disconnected");
            self.set_status("Wallet disconnected");
        }
    }

    pub fn refresh_open_games(&mut self) {
        self.execute(vec![Effect::RefreshOpenGames]);
    }

    /// Forwards a user intent. Chain-writing intents need a connected wallet.
    pub fn dispatch(&mut self, action: UserAction) {
        let writes = !matches!(action, UserAction::PlayAgain);
        if writes && self.active_wallet().is_none() {
            self.push_error(ChainError::NoWallet.to_string());
            return;
        }
        self.handle(Input::User(action));
    }

    pub fn handle(&mut self, input: Input) {
        let failure_before = self.sync.last_failure().map(str::to_owned);
        let status = match &input {
            Input::Poll(_) => {
                self.last_poll_at = Some(Local::now());
                None
            }
            Input::Submitted { tx_hash, .. } => {
                Some(format!("Transaction {tx_hash} sent, waiting for receipt..."))
            }
            Input::Receipt { tx_hash, .. } => Some(format!("Transaction {tx_hash} confirmed")),
            _ => None,
        };
        match self.sync.apply(input) {
            Ok(effects) => {
                if let Some(status) = status {
                    self.set_status(status);
                }
                self.execute(effects);
            }
            Err(err) => {
                warn!(%err, "input rejected");
                self.set_status(err.to_string());
            }
        }
        let failure_after = self.sync.last_failure().map(str::to_owned);
        if let Some(failure) = failure_after.filter(|after| Some(after) != failure_before.as_ref()) {
            self.push_error(failure);
        }
    }

    fn execute(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Submit { ticket, action } => self.spawn_submission(ticket, action),
                Effect::StartPolling(game_id) => {
                    info!(%game_id, "starting game poll");
                    self.poll = Some(PollHandle::spawn(
                        self.reader.clone(),
                        game_id,
                        self.config.poll_interval,
                        self.inputs.clone(),
                    ));
                }
                Effect::StopPolling => {
                    if let Some(handle) = self.poll.take() {
                        info!(game_id = %handle.game_id, "stopping game poll");
                    }
                }
                Effect::RefreshOpenGames => self.spawn_open_games_refresh(),
                Effect::LookupResolution(game_id) => self.spawn_resolution_lookup(game_id),
            }
        }
    }

    fn spawn_submission(&mut self, ticket: Ticket, action: Action) {
        let inputs = self.inputs.clone();
        let Some(wallet) = self.active_wallet().cloned() else {
            let _ = inputs.send(Input::SubmissionFailed {
                ticket,
                reason: ChainError::NoWallet.to_string(),
            });
            return;
        };
        let contract = self.config.contract;
        self.set_status(format!("Submitting {action}..."));
        tokio::spawn(async move {
            let tx_hash = match wallet.submit(action).await {
                Ok(tx_hash) => tx_hash,
                Err(err) => {
                    error!(%action, %err, "transaction submission failed");
                    let _ = inputs.send(Input::SubmissionFailed {
                        ticket,
                        reason: err.to_string(),
                    });
                    return;
                }
            };
            if inputs.send(Input::Submitted { ticket, tx_hash }).is_err() {
                return;
            }
            match wallet.wait_for_receipt(tx_hash).await {
                Ok(logs) => {
                    let events = events::decode_logs(&logs, contract);
                    info!(%tx_hash, count = events.len(), "receipt decoded");
                    let _ = inputs.send(Input::Receipt { tx_hash, events });
                }
                Err(err) => {
                    error!(%action, %tx_hash, %err, "transaction failed");
                    let _ = inputs.send(Input::SubmissionFailed {
                        ticket,
                        reason: err.to_string(),
                    });
                }
            }
        });
    }

    fn spawn_open_games_refresh(&self) {
        let reader = self.reader.clone();
        let inputs = self.inputs.clone();
        tokio::spawn(async move {
            match reader.open_games().await {
                Ok(ids) => {
                    let _ = inputs.send(Input::OpenGames(ids));
                }
                Err(err) => warn!(%err, "failed to fetch open games"),
            }
        });
    }

    fn spawn_resolution_lookup(&self, game_id: GameId) {
        let reader = self.reader.clone();
        let inputs = self.inputs.clone();
        tokio::spawn(async move {
            match reader.find_resolution(game_id).await {
                Ok(resolution) => {
                    let _ = inputs.send(Input::ResolutionLookup {
                        game_id,
                        resolution,
                    });
                }
                Err(err) => {
                    warn!(%game_id, %err, "resolution lookup failed");
                    let _ = inputs.send(Input::ResolutionLookup {
                        game_id,
                        resolution: None,
                    });
                }
            }
        });
    }

    fn set_status(&mut self, message: impl Into<String>) {
        self.status = message.into();
    }

    fn push_error(&mut self, message: String) {
        error!("{}", message);
        self.errors.push(message);
        if self.errors.len() > MAX_ERRORS {
            let drain = self.errors.len() - MAX_ERRORS;
            self.errors.drain(0..drain);
        }
    }

    pub fn snapshot(&self) -> AppSnapshot {
        AppSnapshot {
            network: self.config.network.name.clone(),
            chain_id: self.config.network.chain_id,
            explorer_url: self.config.network.explorer_url.clone(),
            contract: self.config.contract,
            stake: format_native(self.config.stake, &self.config.network.currency_symbol),
            account: self.account(),
            phase: self.sync.phase(),
            game_id: self.sync.game_id(),
            winner_info: self.sync.winner_info().map(str::to_owned),
            open_games: self.sync.open_games().to_vec(),
            pending_tx: self.sync.pending().and_then(|pending| pending.tx_hash),
            last_poll_at: self.last_poll_at,
            status: self.status.clone(),
            errors: self.errors.clone(),
        }
    }
}

pub async fn run_app(config: AppConfig, signer: Option<PrivateKeySigner>) -> Result<()> {
    let reader = RpcChainReader::connect(&config);
    let chain_id = reader
        .chain_id()
        .await
        .wrap_err_with(|| format!("failed to reach RPC node {}", config.network.rpc_url))?;
    if chain_id != config.network.chain_id {
        return Err(eyre!(
            "RPC node {} reports chain id {chain_id}, expected {} ({})",
            config.network.rpc_url,
            config.network.chain_id,
            config.network.name
        ));
    }
    info!(chain_id, network = %config.network.name, "connected to node");

    let wallet = signer.map(|signer| WalletSubmitter::connect(&config, signer));
    let (mut controller, mut inputs) = AppController::new(config, reader, wallet);
    let mut ui_state = ui::UiState::default();
    let mut input_events = ui::input_event_stream();

    ui::terminal_enter(&mut ui_state)?;
    tracing::info!("UI ready");
    let res = run_loop(&mut controller, &mut inputs, &mut ui_state, &mut input_events).await;
    controller.shutdown();
    ui::terminal_exit()?;
    res
}

async fn run_loop<R: ChainReader, S: TxSubmitter>(
    controller: &mut AppController<R, S>,
    inputs: &mut InputReceiver,
    ui_state: &mut ui::UiState,
    input_events: &mut ui::InputEventReceiver,
) -> Result<()> {
    tracing::info!("Running app loop");
    controller.start();
    ui::draw(ui_state, &controller.snapshot()).wrap_err("initial draw failed")?;

    loop {
        tokio::select! {
            maybe_input = inputs.recv() => {
                let Some(input) = maybe_input else {
                    warn!("input channel closed");
                    break;
                };
                controller.handle(input);
            }
            _ = tokio::signal::ctrl_c() => {
                break;
            }
            raw_ev = ui::next_raw_event(input_events) => {
                let event = raw_ev?;
                let snapshot = controller.snapshot();
                let Some(ev) = ui::interpret_event(ui_state, &snapshot, event) else {
                    continue;
                };
                match ev {
                    ui::UserEvent::Quit => break,
                    ui::UserEvent::CreateGame => controller.dispatch(UserAction::CreateGame),
                    ui::UserEvent::JoinGame(game_id) => {
                        controller.dispatch(UserAction::JoinGame(game_id))
                    }
                    ui::UserEvent::Choose(side) => {
                        controller.dispatch(UserAction::MakeChoice(side))
                    }
                    ui::UserEvent::PlayAgain => controller.dispatch(UserAction::PlayAgain),
                    ui::UserEvent::RefreshOpenGames => controller.refresh_open_games(),
                    ui::UserEvent::ToggleWallet => controller.toggle_wallet(),
                    ui::UserEvent::Redraw => {}
                }
            }
        }
        ui::draw(ui_state, &controller.snapshot()).wrap_err("draw failed")?;
    }
    Ok(())
}
