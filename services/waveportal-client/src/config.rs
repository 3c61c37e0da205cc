use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;
use wp_ledger_http::{DEFAULT_CONTRACT_ADDRESS, DEFAULT_LEDGER_URL};

const DEFAULT_GAS_LIMIT: u64 = 300_000;
const DEFAULT_CONFIRM_POLL_MS: u64 = 1_000;
const DEFAULT_CONFIRM_TIMEOUT_SECS: u64 = 300;
const DEFAULT_EVENT_POLL_MS: u64 = 2_000;
const DEFAULT_KEYSTORE_SECRET: &str = "waveportal-dev";
const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LedgerKind {
    Http,
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WalletKind {
    Local,
    None,
}

#[derive(Debug, Clone)]
pub(crate) struct ClientConfig {
    pub(crate) ledger: LedgerKind,
    pub(crate) ledger_url: String,
    pub(crate) contract_address: String,
    pub(crate) gas_limit: u64,
    pub(crate) confirm_poll: Duration,
    pub(crate) confirm_timeout: Duration,
    pub(crate) event_poll: Duration,
    pub(crate) wallet: WalletKind,
    pub(crate) keystore_path: Option<PathBuf>,
    pub(crate) keystore_secret: String,
    pub(crate) auto_approve: bool,
    pub(crate) bind_addr: SocketAddr,
}

impl ClientConfig {
    pub(crate) fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let value = |key: &str| {
            lookup(key)
                .map(|raw| raw.trim().to_owned())
                .filter(|raw| !raw.is_empty())
        };

        let ledger = match value("WAVEPORTAL_LEDGER").as_deref() {
            None | Some("http") => LedgerKind::Http,
            Some("memory") => LedgerKind::Memory,
            Some(other) => {
                warn!("unknown WAVEPORTAL_LEDGER {other:?}, using http");
                LedgerKind::Http
            }
        };

        let wallet = match value("WAVEPORTAL_WALLET").as_deref() {
            None | Some("local") => WalletKind::Local,
            Some("none") => WalletKind::None,
            Some(other) => {
                warn!("unknown WAVEPORTAL_WALLET {other:?}, using local");
                WalletKind::Local
            }
        };

        let auto_approve = match value("WAVEPORTAL_AUTO_APPROVE").as_deref() {
            None => true,
            Some("1" | "true" | "yes") => true,
            Some("0" | "false" | "no") => false,
            Some(other) => {
                warn!("invalid WAVEPORTAL_AUTO_APPROVE {other:?}, using true");
                true
            }
        };

        let default_bind = SocketAddr::from(([127, 0, 0, 1], 8080));

        Self {
            ledger,
            ledger_url: value("WAVEPORTAL_LEDGER_URL").unwrap_or_else(|| DEFAULT_LEDGER_URL.to_owned()),
            contract_address: value("WAVEPORTAL_CONTRACT_ADDRESS")
                .unwrap_or_else(|| DEFAULT_CONTRACT_ADDRESS.to_owned()),
            gas_limit: parsed(&value, "WAVEPORTAL_GAS_LIMIT", DEFAULT_GAS_LIMIT),
            confirm_poll: Duration::from_millis(parsed(
                &value,
                "WAVEPORTAL_CONFIRM_POLL_MS",
                DEFAULT_CONFIRM_POLL_MS,
            )),
            confirm_timeout: Duration::from_secs(parsed(
                &value,
                "WAVEPORTAL_CONFIRM_TIMEOUT_SECS",
                DEFAULT_CONFIRM_TIMEOUT_SECS,
            )),
            event_poll: Duration::from_millis(parsed(
                &value,
                "WAVEPORTAL_EVENT_POLL_MS",
                DEFAULT_EVENT_POLL_MS,
            )),
            wallet,
            keystore_path: value("WAVEPORTAL_KEYSTORE_PATH").map(PathBuf::from),
            keystore_secret: value("WAVEPORTAL_KEYSTORE_SECRET")
                .unwrap_or_else(|| DEFAULT_KEYSTORE_SECRET.to_owned()),
            auto_approve,
            bind_addr: match value("WAVEPORTAL_BIND_ADDR") {
                None => default_bind,
                Some(raw) => raw.parse().unwrap_or_else(|_| {
                    warn!("invalid WAVEPORTAL_BIND_ADDR {raw:?}, using {DEFAULT_BIND_ADDR}");
                    default_bind
                }),
            },
        }
    }
}

fn parsed<T>(value: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + Copy + std::fmt::Display,
{
    match value(key) {
        None => default,
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("invalid {key} {raw:?}, using {default}");
            default
        }),
    }
}
