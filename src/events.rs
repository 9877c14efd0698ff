//! Decoding of coinflip contract events out of transaction receipt logs.

use crate::contract::{
    GameId,
    ICoinflip,
    Side,
};
use alloy::{
    primitives::{
        Address,
        Log,
        U256,
    },
    sol_types::SolEvent,
};
use tracing::{
    debug,
    trace,
};

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CoinflipEvent {
    GameCreated { game_id: GameId },
    GameResolved(Resolution),
}

/// Final outcome of a game as carried by `GameResolved`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Resolution {
    pub game_id: GameId,
    /// Zero address means the game was a draw.
    pub winner: Address,
    pub winning_choice: U256,
}

impl Resolution {
    pub fn is_draw(&self) -> bool {
        self.winner.is_zero()
    }

    pub fn winning_side(&self) -> Option<Side> {
        u8::try_from(self.winning_choice)
            .ok()
            .and_then(Side::from_code)
    }

    pub fn describe(&self) -> String {
        if self.is_draw() {
            return String::from("Draw! Bets returned.");
        }
        let side = match self.winning_side() {
            Some(side) => side.label().to_string(),
            None => format!("side {}", self.winning_choice),
        };
        let winner = self.winner.to_string();
        format!("Winner: {side} — {}...", &winner[..6])
    }
}

impl From<ICoinflip::GameResolved> for Resolution {
    fn from(event: ICoinflip::GameResolved) -> Self {
        Self {
            game_id: event.gameId,
            winner: event.winner,
            winning_choice: event.winningChoice,
        }
    }
}

/// Decodes every log emitted by `contract` that matches a known event.
///
/// Logs from other emitters, unknown signatures and malformed payloads are
/// skipped; one bad entry never hides the ones after it.
pub fn decode_logs(logs: &[Log], contract: Address) -> Vec<CoinflipEvent> {
    logs.iter()
        .filter_map(|log| decode_log(log, contract))
        .collect()
}

pub fn decode_log(log: &Log, contract: Address) -> Option<CoinflipEvent> {
    if log.address != contract {
        trace!(emitter = %log.address, "skipping log from foreign emitter");
        return None;
    }
    let topic0 = *log.data.topics().first()?;
    let decoded = if topic0 == ICoinflip::GameCreated::SIGNATURE_HASH {
        ICoinflip::GameCreated::decode_log_data(&log.data).map(|event| {
            CoinflipEvent::GameCreated {
                game_id: event.gameId,
            }
        })
    } else if topic0 == ICoinflip::GameResolved::SIGNATURE_HASH {
        ICoinflip::GameResolved::decode_log_data(&log.data)
            .map(|event| CoinflipEvent::GameResolved(event.into()))
    } else {
        trace!(%topic0, "skipping log with unknown signature");
        return None;
    };
    match decoded {
        Ok(event) => Some(event),
        Err(err) => {
            debug!(%topic0, ?err, "skipping undecodable coinflip log");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use alloy::primitives::{
        B256,
        LogData,
        address,
    };

    const CONTRACT: Address = address!("0xa88cbABB0a977dC35Af8b99aBe16af8b4B8EA620");

    fn created_log(id: u64) -> Log {
        let event = ICoinflip::GameCreated {
            gameId: U256::from(id),
        };
        Log {
            address: CONTRACT,
            data: event.encode_log_data(),
        }
    }

    fn resolved_log(id: u64, winner: Address, choice: u64) -> Log {
        let event = ICoinflip::GameResolved {
            gameId: U256::from(id),
            winner,
            winningChoice: U256::from(choice),
        };
        Log {
            address: CONTRACT,
            data: event.encode_log_data(),
        }
    }

    #[test]
    fn decode_logs__recognizes_both_events() {
        // given
        let winner = Address::repeat_byte(0xcc);
        let logs = vec![created_log(3), resolved_log(3, winner, 2)];

        // when
        let events = decode_logs(&logs, CONTRACT);

        // then
        assert_eq!(
            events,
            vec![
                CoinflipEvent::GameCreated {
                    game_id: U256::from(3)
                },
                CoinflipEvent::GameResolved(Resolution {
                    game_id: U256::from(3),
                    winner,
                    winning_choice: U256::from(2),
                }),
            ]
        );
    }

    #[test]
    fn decode_logs__skips_unknown_and_foreign_logs_without_aborting() {
        // given
        let unknown = Log {
            address: CONTRACT,
            data: LogData::new_unchecked(vec![B256::repeat_byte(0x42)], Default::default()),
        };
        let foreign = Log {
            address: Address::repeat_byte(0x01),
            data: created_log(9).data,
        };
        let truncated = Log {
            address: CONTRACT,
            data: LogData::new_unchecked(
                vec![ICoinflip::GameResolved::SIGNATURE_HASH],
                Default::default(),
            ),
        };
        let logs = vec![unknown, foreign, truncated, created_log(4)];

        // when
        let events = decode_logs(&logs, CONTRACT);

        // then
        assert_eq!(
            events,
            vec![CoinflipEvent::GameCreated {
                game_id: U256::from(4)
            }]
        );
    }

    #[test]
    fn decode_logs__empty_topics_are_skipped() {
        let bare = Log {
            address: CONTRACT,
            data: LogData::new_unchecked(Vec::new(), Default::default()),
        };
        assert!(decode_logs(&[bare], CONTRACT).is_empty());
    }

    #[test]
    fn describe__draw_when_winner_is_zero_address() {
        // given
        let resolution = Resolution {
            game_id: U256::from(7),
            winner: Address::ZERO,
            winning_choice: U256::from(1),
        };

        // then
        assert!(resolution.is_draw());
        assert_eq!(resolution.describe(), "Draw! Bets returned.");
    }

    #[test]
    fn describe__names_side_and_abbreviated_winner() {
        // given
        let winner = Address::repeat_byte(0xcc);
        let resolution = Resolution {
            game_id: U256::from(7),
            winner,
            winning_choice: U256::from(2),
        };

        // when
        let text = resolution.describe();

        // then
        let prefix = &winner.to_string()[..6];
        assert_eq!(text, format!("Winner: Black — {prefix}..."));
        assert!(text.to_lowercase().starts_with("winner: black — 0xcccc"));
    }

    #[test]
    fn describe__unknown_choice_is_reported_verbatim() {
        let resolution = Resolution {
            game_id: U256::from(1),
            winner: Address::repeat_byte(0xaa),
            winning_choice: U256::from(9),
        };
        assert!(resolution.describe().starts_with("Winner: side 9 — "));
    }
}
