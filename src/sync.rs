//! Client-side game state synchronization.
//!
//! [`Synchronizer`] is a deterministic state machine. It never touches the
//! network: every observation arrives as an [`Input`] and every side effect
//! it wants performed is returned as an [`Effect`] for the caller to run.

use crate::{
    contract::{
        GameId,
        GameRecord,
        Side,
    },
    events::{
        CoinflipEvent,
        Resolution,
    },
    submitter::Action,
};
use alloy::primitives::TxHash;
use std::fmt;
use thiserror::Error;
use tracing::{
    debug,
    info,
    warn,
};

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum Phase {
    #[default]
    Lobby,
    /// Game created, waiting for an opponent.
    Waiting,
    /// Join submitted, not yet confirmed by a poll.
    Joined,
    Choose,
    /// Side submitted, waiting for the outcome.
    WaitingChoice,
    Result,
}

impl Phase {
    /// Phases during which the tracked game is polled.
    pub fn is_polling(self) -> bool {
        matches!(self, Phase::Waiting | Phase::Joined | Phase::WaitingChoice)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Lobby => "lobby",
            Phase::Waiting => "waiting",
            Phase::Joined => "joined",
            Phase::Choose => "choose",
            Phase::WaitingChoice => "waiting_choice",
            Phase::Result => "result",
        };
        f.write_str(name)
    }
}

/// Identifies one submission so late answers about older ones can be dropped.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Ticket(pub u64);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UserAction {
    CreateGame,
    JoinGame(GameId),
    MakeChoice(Side),
    PlayAgain,
}

impl UserAction {
    fn name(&self) -> &'static str {
        match self {
            UserAction::CreateGame => "create game",
            UserAction::JoinGame(_) => "join game",
            UserAction::MakeChoice(_) => "choose side",
            UserAction::PlayAgain => "play again",
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PollResult {
    pub game_id: GameId,
    pub game: GameRecord,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Input {
    User(UserAction),
    Submitted {
        ticket: Ticket,
        tx_hash: TxHash,
    },
    SubmissionFailed {
        ticket: Ticket,
        reason: String,
    },
    Receipt {
        tx_hash: TxHash,
        events: Vec<CoinflipEvent>,
    },
    Poll(PollResult),
    OpenGames(Vec<GameId>),
    ResolutionLookup {
        game_id: GameId,
        resolution: Option<Resolution>,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Effect {
    Submit { ticket: Ticket, action: Action },
    StartPolling(GameId),
    StopPolling,
    RefreshOpenGames,
    LookupResolution(GameId),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("cannot {action} while in {phase}")]
    ActionNotAllowed { action: &'static str, phase: Phase },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PendingTx {
    pub ticket: Ticket,
    pub action: Action,
    pub tx_hash: Option<TxHash>,
}

#[derive(Debug, Default)]
pub struct Synchronizer {
    phase: Phase,
    game_id: Option<GameId>,
    winner_info: Option<String>,
    open_games: Vec<GameId>,
    pending: Option<PendingTx>,
    polling: Option<GameId>,
    next_ticket: u64,
    last_failure: Option<String>,
}

impl Synchronizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn game_id(&self) -> Option<GameId> {
        self.game_id
    }

    pub fn winner_info(&self) -> Option<&str> {
        self.winner_info.as_deref()
    }

    pub fn open_games(&self) -> &[GameId] {
        &self.open_games
    }

    pub fn pending(&self) -> Option<&PendingTx> {
        self.pending.as_ref()
    }

    /// Game id currently being polled, if a poll is live.
    pub fn polling(&self) -> Option<GameId> {
        self.polling
    }

    pub fn last_failure(&self) -> Option<&str> {
        self.last_failure.as_deref()
    }

    /// Effects to run when the session starts.
    pub fn start(&self) -> Vec<Effect> {
        vec![Effect::RefreshOpenGames]
    }

    /// Effects to run when the session is torn down.
    pub fn teardown(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        if self.polling.take().is_some() {
            effects.push(Effect::StopPolling);
        }
        effects
    }

    pub fn apply(&mut self, input: Input) -> Result<Vec<Effect>, SyncError> {
        let mut effects = Vec::new();
        match input {
            Input::User(action) => self.on_user_action(action, &mut effects)?,
            Input::Submitted { ticket, tx_hash } => self.on_submitted(ticket, tx_hash),
            Input::SubmissionFailed { ticket, reason } => {
                self.on_submission_failed(ticket, reason)
            }
            Input::Receipt { tx_hash, events } => {
                self.on_receipt(tx_hash, events, &mut effects)
            }
            Input::Poll(result) => self.on_poll(result, &mut effects),
            Input::OpenGames(ids) => self.open_games = ids,
            Input::ResolutionLookup {
                game_id,
                resolution,
            } => self.on_resolution_lookup(game_id, resolution),
        }
        Ok(effects)
    }

    fn on_user_action(
        &mut self,
        action: UserAction,
        effects: &mut Vec<Effect>,
    ) -> Result<(), SyncError> {
        let not_allowed = SyncError::ActionNotAllowed {
            action: action.name(),
            phase: self.phase,
        };
        match action {
            UserAction::CreateGame => {
                if self.phase != Phase::Lobby {
                    return Err(not_allowed);
                }
                self.submit(Action::CreateGame, effects);
            }
            UserAction::JoinGame(game_id) => {
                if self.phase != Phase::Lobby {
                    return Err(not_allowed);
                }
                self.game_id = Some(game_id);
                self.transition(Phase::Joined, effects);
                self.submit(Action::JoinGame(game_id), effects);
            }
            UserAction::MakeChoice(side) => {
                let Some(game_id) = self.game_id.filter(|_| self.phase == Phase::Choose)
                else {
                    return Err(not_allowed);
                };
                self.transition(Phase::WaitingChoice, effects);
                self.submit(Action::MakeChoice { game_id, side }, effects);
            }
            UserAction::PlayAgain => {
                if self.phase != Phase::Result {
                    return Err(not_allowed);
                }
                self.game_id = None;
                self.winner_info = None;
                self.pending = None;
                self.last_failure = None;
                self.transition(Phase::Lobby, effects);
            }
        }
        Ok(())
    }

    /// Replaces any previous pending reference before handing out the new one.
    fn submit(&mut self, action: Action, effects: &mut Vec<Effect>) {
        self.next_ticket += 1;
        let ticket = Ticket(self.next_ticket);
        if let Some(previous) = self.pending.replace(PendingTx {
            ticket,
            action,
            tx_hash: None,
        }) {
            debug!(?previous, "superseding pending transaction");
        }
        self.last_failure = None;
        effects.push(Effect::Submit { ticket, action });
    }

    fn on_submitted(&mut self, ticket: Ticket, tx_hash: TxHash) {
        match self.pending.as_mut() {
            Some(pending) if pending.ticket == ticket => {
                pending.tx_hash = Some(tx_hash);
            }
            _ => debug!(?ticket, %tx_hash, "ignoring hash of superseded submission"),
        }
    }

    fn on_submission_failed(&mut self, ticket: Ticket, reason: String) {
        match self.pending {
            Some(pending) if pending.ticket == ticket => {
                warn!(action = %pending.action, %reason, phase = %self.phase, "submission failed");
                self.pending = None;
                self.last_failure = Some(format!("{} failed: {reason}", pending.action));
            }
            _ => debug!(?ticket, "ignoring failure of superseded submission"),
        }
    }

    fn on_receipt(
        &mut self,
        tx_hash: TxHash,
        events: Vec<CoinflipEvent>,
        effects: &mut Vec<Effect>,
    ) {
        let tracked = self
            .pending
            .is_some_and(|pending| pending.tx_hash == Some(tx_hash));
        if !tracked {
            debug!(%tx_hash, "ignoring receipt of untracked transaction");
            return;
        }
        self.pending = None;
        for event in events {
            match event {
                CoinflipEvent::GameCreated { game_id } => {
                    if self.phase == Phase::Lobby {
                        info!(%game_id, "game created");
                        self.game_id = Some(game_id);
                        self.transition(Phase::Waiting, effects);
                    } else {
                        debug!(%game_id, phase = %self.phase, "ignoring GameCreated");
                    }
                }
                CoinflipEvent::GameResolved(resolution) => {
                    self.on_resolution_event(resolution, effects)
                }
            }
        }
    }

    fn on_resolution_event(&mut self, resolution: Resolution, effects: &mut Vec<Effect>) {
        if self.game_id != Some(resolution.game_id) {
            debug!(game_id = %resolution.game_id, "ignoring resolution of another game");
            return;
        }
        match self.phase {
            Phase::Result => {
                if self.winner_info.is_none() {
                    self.winner_info = Some(resolution.describe());
                }
            }
            Phase::Lobby => {}
            _ => {
                self.winner_info = Some(resolution.describe());
                self.transition(Phase::Result, effects);
            }
        }
    }

    fn on_poll(&mut self, result: PollResult, effects: &mut Vec<Effect>) {
        if !self.phase.is_polling() || self.game_id != Some(result.game_id) {
            debug!(game_id = %result.game_id, phase = %self.phase, "ignoring stale poll");
            return;
        }
        if result.game.resolved {
            info!(game_id = %result.game_id, "poll observed resolved game");
            self.transition(Phase::Result, effects);
            if self.winner_info.is_none() {
                effects.push(Effect::LookupResolution(result.game_id));
            }
            return;
        }
        if result.game.both_joined()
            && !matches!(self.phase, Phase::Choose | Phase::WaitingChoice)
        {
            self.transition(Phase::Choose, effects);
        }
    }

    fn on_resolution_lookup(&mut self, game_id: GameId, resolution: Option<Resolution>) {
        if self.phase != Phase::Result
            || self.game_id != Some(game_id)
            || self.winner_info.is_some()
        {
            return;
        }
        self.winner_info = Some(match resolution {
            Some(resolution) => resolution.describe(),
            None => {
                warn!(%game_id, "no GameResolved event found for resolved game");
                format!("Game #{game_id} resolved. Outcome event not found.")
            }
        });
    }

    /// Moves to `next`, keeping the poll and the open-games list in step.
    fn transition(&mut self, next: Phase, effects: &mut Vec<Effect>) {
        if next == self.phase {
            return;
        }
        info!(from = %self.phase, to = %next, "phase transition");
        self.phase = next;
        let wanted = self.game_id.filter(|_| next.is_polling());
        if wanted != self.polling {
            if self.polling.is_some() {
                effects.push(Effect::StopPolling);
            }
            if let Some(game_id) = wanted {
                effects.push(Effect::StartPolling(game_id));
            }
            self.polling = wanted;
        }
        effects.push(Effect::RefreshOpenGames);
    }
}
