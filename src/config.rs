//! Runtime configuration.
//!
//! Values are layered: built-in defaults, then an optional JSON file, then
//! command line flags (which may also come from the environment).

use crate::error::ConfigError;
use alloy::primitives::{
    Address,
    U256,
    address,
};
use clap::Parser;
use serde::Deserialize;
use std::{
    fmt,
    fs,
    path::{
        Path,
        PathBuf,
    },
    str::FromStr,
    time::Duration,
};
use url::Url;

pub const DEFAULT_NETWORK_NAME: &str = "Monad Testnet";
pub const DEFAULT_CHAIN_ID: u64 = 10143;
pub const DEFAULT_RPC_URL: &str = "https://testnet-rpc.monad.xyz";
pub const DEFAULT_EXPLORER_URL: &str = "https://testnet.monadexplorer.com";
pub const DEFAULT_CURRENCY_SYMBOL: &str = "MON";
pub const DEFAULT_CONTRACT: Address = address!("0xa88cbABB0a977dC35Af8b99aBe16af8b4B8EA620");
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 3_000;
/// 0.01 MON
pub const DEFAULT_STAKE_WEI: u64 = 10_000_000_000_000_000;
pub const DEFAULT_LOOKBACK_BLOCKS: u64 = 100;
pub const DEFAULT_LOG_DIR: &str = ".coinflip/logs";

#[derive(Parser, Debug, Default)]
#[command(name = "coinflip")]
#[command(about = "Terminal client for the two-player on-chain coinflip game")]
#[command(version)]
pub struct CliArgs {
    /// JSON config file; flags override its values
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// RPC endpoint of the target network
    #[arg(long, env = "COINFLIP_RPC_URL")]
    pub rpc_url: Option<String>,

    /// Expected chain id, checked against the node at startup
    #[arg(long)]
    pub chain_id: Option<u64>,

    /// Display name of the network
    #[arg(long)]
    pub network_name: Option<String>,

    /// Coinflip contract address
    #[arg(long, env = "COINFLIP_CONTRACT")]
    pub contract: Option<String>,

    /// Interval between game state polls, in milliseconds
    #[arg(long)]
    pub poll_interval_ms: Option<u64>,

    /// Stake attached to create/join, in wei
    #[arg(long)]
    pub stake_wei: Option<String>,

    /// How many blocks back to search for a missed GameResolved event
    #[arg(long)]
    pub lookback_blocks: Option<u64>,

    /// Keystore name to play with; omit to browse read-only
    #[arg(long, env = "COINFLIP_WALLET")]
    pub wallet: Option<String>,

    /// Keystore directory (defaults to ~/.foundry/keystores)
    #[arg(long)]
    pub wallet_dir: Option<String>,

    /// Directory for the rolling log file
    #[arg(long)]
    pub log_dir: Option<String>,

    /// Print the resolved configuration and exit
    #[arg(long)]
    pub print_config: bool,
}

/// Optional overrides read from `--config`.
#[derive(Deserialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub network_name: Option<String>,
    pub chain_id: Option<u64>,
    pub rpc_url: Option<String>,
    pub explorer_url: Option<String>,
    pub currency_symbol: Option<String>,
    pub contract: Option<String>,
    pub poll_interval_ms: Option<u64>,
    pub stake_wei: Option<String>,
    pub lookback_blocks: Option<u64>,
    pub wallet: Option<String>,
    pub wallet_dir: Option<String>,
    pub log_dir: Option<String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetworkConfig {
    pub name: String,
    pub chain_id: u64,
    pub rpc_url: Url,
    pub explorer_url: Option<String>,
    pub currency_symbol: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WalletConfig {
    pub name: String,
    pub dir: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppConfig {
    pub network: NetworkConfig,
    pub contract: Address,
    pub poll_interval: Duration,
    pub stake: U256,
    pub resolution_lookback_blocks: u64,
    pub wallet: Option<WalletConfig>,
    pub log_dir: PathBuf,
}

impl AppConfig {
    /// Builds the configuration from flags, loading `--config` if given.
    pub fn from_cli(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = match &cli.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        Self::layered(file, cli)
    }

    /// Built-in defaults with no file and no flags.
    pub fn defaults() -> Result<Self, ConfigError> {
        Self::layered(FileConfig::default(), &CliArgs::default())
    }

    pub fn layered(file: FileConfig, cli: &CliArgs) -> Result<Self, ConfigError> {
        let rpc_raw = cli
            .rpc_url
            .clone()
            .or(file.rpc_url)
            .unwrap_or_else(|| DEFAULT_RPC_URL.to_string());
        let rpc_url =
            Url::parse(&rpc_raw).map_err(|_| ConfigError::InvalidUrl(rpc_raw.clone()))?;

        let contract = match cli.contract.clone().or(file.contract) {
            Some(raw) => Address::from_str(raw.trim()).map_err(|err| {
                ConfigError::Invalid(format!("contract address `{raw}`: {err}"))
            })?,
            None => DEFAULT_CONTRACT,
        };

        let stake = match cli.stake_wei.clone().or(file.stake_wei) {
            Some(raw) => U256::from_str(raw.trim()).map_err(|err| {
                ConfigError::Invalid(format!("stake `{raw}`: {err}"))
            })?,
            None => U256::from(DEFAULT_STAKE_WEI),
        };
        if stake.is_zero() {
            return Err(ConfigError::Invalid("stake must be non-zero".into()));
        }

        let poll_ms = cli
            .poll_interval_ms
            .or(file.poll_interval_ms)
            .unwrap_or(DEFAULT_POLL_INTERVAL_MS);
        if poll_ms == 0 {
            return Err(ConfigError::Invalid(
                "poll interval must be at least 1 ms".into(),
            ));
        }

        let wallet = cli
            .wallet
            .clone()
            .or(file.wallet)
            .map(|name| WalletConfig {
                name,
                dir: cli.wallet_dir.clone().or(file.wallet_dir),
            });

        let log_dir = cli
            .log_dir
            .clone()
            .or(file.log_dir)
            .unwrap_or_else(|| DEFAULT_LOG_DIR.to_string());

        Ok(Self {
            network: NetworkConfig {
                name: cli
                    .network_name
                    .clone()
                    .or(file.network_name)
                    .unwrap_or_else(|| DEFAULT_NETWORK_NAME.to_string()),
                chain_id: cli.chain_id.or(file.chain_id).unwrap_or(DEFAULT_CHAIN_ID),
                rpc_url,
                explorer_url: file
                    .explorer_url
                    .or_else(|| Some(DEFAULT_EXPLORER_URL.to_string())),
                currency_symbol: file
                    .currency_symbol
                    .unwrap_or_else(|| DEFAULT_CURRENCY_SYMBOL.to_string()),
            },
            contract,
            poll_interval: Duration::from_millis(poll_ms),
            stake,
            resolution_lookback_blocks: cli
                .lookback_blocks
                .or(file.lookback_blocks)
                .unwrap_or(DEFAULT_LOOKBACK_BLOCKS),
            wallet,
            log_dir: PathBuf::from(shellexpand::tilde(&log_dir).into_owned()),
        })
    }
}


impl fmt::Display for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "network:        {} (chain id {})",
            self.network.name, self.network.chain_id
        )?;
        writeln!(f, "rpc url:        {}", self.network.rpc_url)?;
        if let Some(explorer) = &self.network.explorer_url {
            writeln!(f, "explorer:       {explorer}")?;
        }
        writeln!(f, "contract:       {}", self.contract)?;
        writeln!(f, "poll interval:  {} ms", self.poll_interval.as_millis())?;
        writeln!(
            f,
            "stake:          {} wei ({})",
            self.stake,
            crate::contract::format_native(self.stake, &self.network.currency_symbol)
        )?;
        writeln!(f, "lookback:       {} blocks", self.resolution_lookback_blocks)?;
        match &self.wallet {
            Some(wallet) => writeln!(f, "wallet:         {}", wallet.name)?,
            None => writeln!(f, "wallet:         (none, read-only)")?,
        }
        write!(f, "log dir:        {}", self.log_dir.display())
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use std::io::Write;

    #[test]
    fn layered__defaults_describe_monad_testnet() {
        // when
        let config = AppConfig::defaults().unwrap();

        // then
        assert_eq!(config.network.chain_id, DEFAULT_CHAIN_ID);
        assert_eq!(config.network.rpc_url.as_str(), "https://testnet-rpc.monad.xyz/");
        assert_eq!(config.contract, DEFAULT_CONTRACT);
        assert_eq!(config.poll_interval, Duration::from_secs(3));
        assert_eq!(config.stake, U256::from(DEFAULT_STAKE_WEI));
        assert_eq!(config.wallet, None);
    }

    #[test]
    fn layered__cli_overrides_file_and_file_overrides_defaults() {
        // given
        let file = FileConfig {
            chain_id: Some(1),
            poll_interval_ms: Some(500),
            stake_wei: Some("42".into()),
            wallet: Some("from-file".into()),
            ..FileConfig::default()
        };
        let cli = CliArgs {
            poll_interval_ms: Some(750),
            wallet: Some("from-cli".into()),
            ..CliArgs::default()
        };

        // when
        let config = AppConfig::layered(file, &cli).unwrap();

        // then
        assert_eq!(config.network.chain_id, 1);
        assert_eq!(config.poll_interval, Duration::from_millis(750));
        assert_eq!(config.stake, U256::from(42));
        assert_eq!(config.wallet.unwrap().name, "from-cli");
    }

    #[test]
    fn layered__rejects_zero_stake_and_zero_interval() {
        let zero_stake = CliArgs {
            stake_wei: Some("0".into()),
            ..CliArgs::default()
        };
        assert!(AppConfig::layered(FileConfig::default(), &zero_stake).is_err());

        let zero_poll = CliArgs {
            poll_interval_ms: Some(0),
            ..CliArgs::default()
        };
        assert!(AppConfig::layered(FileConfig::default(), &zero_poll).is_err());
    }

    #[test]
    fn layered__rejects_malformed_contract_and_url() {
        let bad_contract = CliArgs {
            contract: Some("0x1234".into()),
            ..CliArgs::default()
        };
        assert!(matches!(
            AppConfig::layered(FileConfig::default(), &bad_contract),
            Err(ConfigError::Invalid(_))
        ));

        let bad_url = CliArgs {
            rpc_url: Some("not a url".into()),
            ..CliArgs::default()
        };
        assert!(matches!(
            AppConfig::layered(FileConfig::default(), &bad_url),
            Err(ConfigError::InvalidUrl(_))
        ));
    }

    #[test]
    fn from_cli__loads_json_file() {
        // given
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "rpc_url": "http://localhost:8545", "chain_id": 31337, "lookback_blocks": 5 }}"#
        )
        .unwrap();
        let cli = CliArgs {
            config: Some(file.path().to_path_buf()),
            ..CliArgs::default()
        };

        // when
        let config = AppConfig::from_cli(&cli).unwrap();

        // then
        assert_eq!(config.network.rpc_url.as_str(), "http://localhost:8545/");
        assert_eq!(config.network.chain_id, 31337);
        assert_eq!(config.resolution_lookback_blocks, 5);
    }

    #[test]
    fn from_cli__unknown_file_keys_are_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "rpc": "http://localhost:8545" }}"#).unwrap();
        let cli = CliArgs {
            config: Some(file.path().to_path_buf()),
            ..CliArgs::default()
        };
        assert!(matches!(
            AppConfig::from_cli(&cli),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn cli_args__parse_flags() {
        let cli = CliArgs::try_parse_from([
            "coinflip",
            "--wallet",
            "alice",
            "--poll-interval-ms",
            "1000",
        ])
        .unwrap();
        assert_eq!(cli.wallet.as_deref(), Some("alice"));
        assert_eq!(cli.poll_interval_ms, Some(1000));
    }
}
