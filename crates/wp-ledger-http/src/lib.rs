use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, warn};
use wp_ledger_client::{EntryFeed, LedgerContract, SubmitWaveReceipt, SubmitWaveRequest, TxOutcome};
use wp_types::{TxHash, WireEntry};

pub const DEFAULT_LEDGER_URL: &str = "http://localhost:8545";
pub const DEFAULT_CONTRACT_ADDRESS: &str = "0x05515108a7929DE53dDcECd71E54E00Ec5B6789F";

#[derive(Debug, Clone)]
pub struct HttpLedgerConfig {
    pub endpoint: String,
    pub contract_address: String,
    pub confirm_poll: Duration,
    pub confirm_timeout: Duration,
    pub event_poll: Duration,
}

impl Default for HttpLedgerConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_LEDGER_URL.to_owned(),
            contract_address: DEFAULT_CONTRACT_ADDRESS.to_owned(),
            confirm_poll: Duration::from_millis(1000),
            confirm_timeout: Duration::from_secs(300),
            event_poll: Duration::from_millis(2000),
        }
    }
}

/// HTTP adapter for a ledger node exposing the wave contract over REST.
///
/// The node has no push channel, so the `NewWave` feed is a background task
/// polling the contract's event log from the cursor current at subscribe
/// time.
pub struct HttpLedger {
    config: HttpLedgerConfig,
    http: reqwest::Client,
}

impl HttpLedger {
    pub fn new(mut config: HttpLedgerConfig) -> Self {
        config.endpoint = config.endpoint.trim_end_matches('/').to_string();
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    fn contract_url(&self, path: &str) -> String {
        format!(
            "{}/contracts/{}/{}",
            self.config.endpoint, self.config.contract_address, path
        )
    }
}

// ── Ledger node REST API types ─────────────────────────────────────

#[derive(Debug, Serialize)]
struct SubmitBody<'a> {
    from: &'a str,
    message: &'a str,
    gas_limit: Option<u64>,
    public_key: &'a str,
    signature: &'a str,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    hash: String,
}

#[derive(Debug, Deserialize)]
struct CountResponse {
    count: u64,
}

#[derive(Debug, Deserialize)]
struct TxStatusResponse {
    #[allow(dead_code)]
    hash: String,
    status: String,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CursorResponse {
    cursor: u64,
}

#[derive(Debug, Deserialize)]
struct EventsResponse {
    cursor: u64,
    #[serde(default)]
    events: Vec<WireEntry>,
}

#[derive(Debug, Deserialize)]
struct NodeErrorResponse {
    error: String,
}

async fn read_json<T>(response: reqwest::Response, what: &str) -> Result<T>
where
    T: serde::de::DeserializeOwned,
{
    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        if let Ok(err) = serde_json::from_str::<NodeErrorResponse>(&text) {
            bail!("{what} rejected ({status}): {}", err.error);
        }
        bail!("{what} HTTP {status}: {text}");
    }

    response
        .json()
        .await
        .with_context(|| format!("{what} parse"))
}

async fn fetch_events(http: &reqwest::Client, url: &str, after: u64) -> Result<EventsResponse> {
    let response = http
        .get(url)
        .query(&[("after", after)])
        .send()
        .await
        .context("ledger events transport")?;
    read_json(response, "ledger events").await
}

#[async_trait]
impl LedgerContract for HttpLedger {
    fn contract_address(&self) -> &str {
        &self.config.contract_address
    }

    async fn get_all_entries(&self) -> Result<Vec<WireEntry>> {
        let response = self
            .http
            .get(self.contract_url("waves"))
            .send()
            .await
            .context("ledger get_all_entries transport")?;
        read_json(response, "ledger get_all_entries").await
    }

    async fn get_total_count(&self) -> Result<u64> {
        let response = self
            .http
            .get(self.contract_url("waves/count"))
            .send()
            .await
            .context("ledger get_total_count transport")?;
        let body: CountResponse = read_json(response, "ledger get_total_count").await?;
        Ok(body.count)
    }

    async fn submit(&self, req: SubmitWaveRequest) -> Result<SubmitWaveReceipt> {
        let body = SubmitBody {
            from: &req.wave.from.0,
            message: &req.wave.message,
            gas_limit: req.fee_hint,
            public_key: &req.wave.public_key,
            signature: &req.wave.signature,
        };

        let response = self
            .http
            .post(self.contract_url("wave"))
            .json(&body)
            .send()
            .await
            .context("ledger submit transport")?;
        let body: SubmitResponse = read_json(response, "ledger submit").await?;

        if body.hash.trim().is_empty() {
            bail!("ledger submit returned an empty transaction hash");
        }
        Ok(SubmitWaveReceipt {
            tx_hash: TxHash(body.hash),
        })
    }

    async fn wait_for_receipt(&self, tx_hash: &TxHash) -> Result<TxOutcome> {
        let url = format!("{}/tx/{}", self.config.endpoint, tx_hash.0);
        let deadline = Instant::now() + self.config.confirm_timeout;

        loop {
            let response = self
                .http
                .get(&url)
                .send()
                .await
                .context("ledger tx status transport")?;

            // Freshly broadcast transactions may not be indexed yet.
            if response.status() == reqwest::StatusCode::NOT_FOUND {
                debug!("{} not indexed yet", tx_hash);
            } else {
                let body: TxStatusResponse = read_json(response, "ledger tx status").await?;
                match body.status.as_str() {
                    "pending" => {}
                    "confirmed" => return Ok(TxOutcome::Confirmed),
                    "failed" | "reverted" => {
                        return Ok(TxOutcome::Reverted(
                            body.error.unwrap_or_else(|| "transaction reverted".to_owned()),
                        ));
                    }
                    other => bail!("ledger reported unknown status '{other}' for {tx_hash}"),
                }
            }

            if Instant::now() + self.config.confirm_poll > deadline {
                return Err(anyhow!(
                    "gave up waiting for {tx_hash} after {:?}",
                    self.config.confirm_timeout
                ));
            }
            tokio::time::sleep(self.config.confirm_poll).await;
        }
    }

    async fn subscribe(&self) -> Result<EntryFeed> {
        let response = self
            .http
            .get(self.contract_url("events/cursor"))
            .send()
            .await
            .context("ledger subscribe transport")?;
        let head: CursorResponse = read_json(response, "ledger subscribe").await?;

        let (tx, rx) = mpsc::unbounded_channel();
        let http = self.http.clone();
        let url = self.contract_url("events");
        let interval = self.config.event_poll;

        tokio::spawn(async move {
            let mut cursor = head.cursor;
            loop {
                tokio::select! {
                    _ = tx.closed() => break,
                    _ = tokio::time::sleep(interval) => {}
                }

                match fetch_events(&http, &url, cursor).await {
                    Ok(page) => {
                        cursor = page.cursor;
                        for event in page.events {
                            if tx.send(event).is_err() {
                                return;
                            }
                        }
                    }
                    Err(err) => {
                        warn!("ledger event feed stopped: {err:#}");
                        break;
                    }
                }
            }
            debug!("ledger event poller exited at cursor {cursor}");
        });

        Ok(rx)
    }
}
