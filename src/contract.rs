use alloy::{
    primitives::{
        Address,
        U256,
        utils::format_ether,
    },
    sol,
};
use std::fmt;

sol! {
    #[sol(rpc)]
    interface ICoinflip {
        function getOpenGames() external view returns (uint256[] memory);
        function games(uint256 gameId)
            external
            view
            returns (
                address player1,
                address player2,
                uint8 choice1,
                uint8 choice2,
                bool resolved
            );
        function createGame() external payable;
        function joinGame(uint256 gameId) external payable;
        function makeChoice(uint256 gameId, uint8 choice) external;

        event GameCreated(uint256 indexed gameId);
        event GameResolved(uint256 indexed gameId, address winner, uint256 winningChoice);
    }
}

pub type GameId = U256;

/// The two sides a player can back. The contract encodes them as `1` and `2`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Side {
    White,
    Black,
}

impl Side {
    pub fn code(self) -> u8 {
        match self {
            Side::White => 1,
            Side::Black => 2,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Side::White),
            2 => Some(Side::Black),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Side::White => "White",
            Side::Black => "Black",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// What `games(gameId)` reports for a single game.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct GameRecord {
    pub player1: Address,
    pub player2: Address,
    pub choice1: u8,
    pub choice2: u8,
    pub resolved: bool,
}

impl GameRecord {
    pub fn both_joined(&self) -> bool {
        !self.player1.is_zero() && !self.player2.is_zero()
    }
}

impl From<ICoinflip::gamesReturn> for GameRecord {
    fn from(value: ICoinflip::gamesReturn) -> Self {
        Self {
            player1: value.player1,
            player2: value.player2,
            choice1: value.choice1,
            choice2: value.choice2,
            resolved: value.resolved,
        }
    }
}

/// `0x1234...abcd`
pub fn short_address(address: &Address) -> String {
    let full = address.to_string();
    format!("{}...{}", &full[..6], &full[full.len() - 4..])
}

/// Amount in wei rendered in whole native units, trailing zeros trimmed.
pub fn format_native(amount: U256, symbol: &str) -> String {
    let raw = format_ether(amount);
    let trimmed = if raw.contains('.') {
        raw.trim_end_matches('0').trim_end_matches('.')
    } else {
        raw.as_str()
    };
    format!("{trimmed} {symbol}")
}
