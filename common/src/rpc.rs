use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use solana_client::{
    nonblocking::{pubsub_client::PubsubClient, rpc_client::RpcClient},
    rpc_config::{
        RpcSendTransactionConfig, RpcSignatureSubscribeConfig, RpcSimulateTransactionConfig,
        RpcTransactionConfig,
    },
    rpc_response::RpcSignatureResult,
};
use solana_sdk::{
    commitment_config::CommitmentConfig,
    hash::Hash,
    pubkey::Pubkey,
    signature::Signature,
    transaction::{TransactionError, VersionedTransaction},
};
use solana_transaction_status::{
    option_serializer::OptionSerializer, EncodedConfirmedTransactionWithStatusMeta,
    UiTransactionEncoding, UiTransactionTokenBalance,
};
use tracing::{debug, warn};

use crate::report::{TokenBalanceEntry, TransactionRecord};

pub const DEFAULT_RPC_URL: &str = "https://api.mainnet-beta.solana.com";
pub const DEFAULT_WSS_URL: &str = "wss://api.mainnet-beta.solana.com";

const STATUS_POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SimulationResult {
    pub error: Option<String>,
    pub logs: Vec<String>,
}

/// How a confirmed signature settled on-chain.
pub type Settlement = std::result::Result<(), TransactionError>;

/// The chain endpoint as seen by the assembler and the execution engine.
#[async_trait]
pub trait ChainRpc: Send + Sync {
    async fn latest_blockhash(&self) -> Result<(Hash, u64)>;

    async fn simulate(&self, tx: &VersionedTransaction) -> Result<SimulationResult>;

    async fn submit(&self, tx: &VersionedTransaction) -> Result<Signature>;

    /// Resolves once `signature` reaches finalized commitment.
    ///
    /// May never resolve; callers bound it with a deadline.
    async fn await_confirmation(&self, signature: &Signature) -> Result<Settlement>;

    async fn fetch_transaction(&self, signature: &Signature) -> Result<TransactionRecord>;
}

pub struct SolanaRpc {
    rpc: RpcClient,
    wss_url: String,
}

impl SolanaRpc {
    pub fn new(rpc_url: impl Into<String>, wss_url: impl Into<String>) -> Self {
        Self {
            rpc: RpcClient::new_with_commitment(rpc_url.into(), CommitmentConfig::finalized()),
            wss_url: wss_url.into(),
        }
    }

    async fn poll_status(&self, signature: &Signature) -> Result<Settlement> {
        let mut ticker = tokio::time::interval(STATUS_POLL_INTERVAL);
        loop {
            ticker.tick().await;
            let statuses = match self.rpc.get_signature_statuses(&[*signature]).await {
                Ok(resp) => resp.value,
                Err(err) => {
                    debug!(%signature, error = %err, "signature status poll failed");
                    continue;
                }
            };
            if let Some(Some(status)) = statuses.into_iter().next() {
                if status.satisfies_commitment(CommitmentConfig::finalized()) {
                    return Ok(match status.err {
                        Some(err) => Err(err),
                        None => Ok(()),
                    });
                }
            }
        }
    }

    async fn watch_signature(&self, signature: &Signature) -> Result<Settlement> {
        let pubsub = PubsubClient::new(&self.wss_url)
            .await
            .with_context(|| format!("failed to connect to {}", self.wss_url))?;
        let config = RpcSignatureSubscribeConfig {
            commitment: Some(CommitmentConfig::finalized()),
            enable_received_notification: Some(false),
        };
        let (mut stream, unsubscribe) = pubsub
            .signature_subscribe(signature, Some(config))
            .await
            .context("signatureSubscribe failed")?;

        let mut settled = None;
        while let Some(update) = stream.next().await {
            if let RpcSignatureResult::ProcessedSignature(result) = update.value {
                settled = Some(match result.err {
                    Some(err) => Err(err),
                    None => Ok(()),
                });
                break;
            }
        }
        drop(stream);
        unsubscribe().await;
        settled.ok_or_else(|| anyhow!("signature subscription closed before notification"))
    }
}

#[async_trait]
impl ChainRpc for SolanaRpc {
    async fn latest_blockhash(&self) -> Result<(Hash, u64)> {
        Ok(self
            .rpc
            .get_latest_blockhash_with_commitment(CommitmentConfig::finalized())
            .await?)
    }

    async fn simulate(&self, tx: &VersionedTransaction) -> Result<SimulationResult> {
        // sig_verify conflicts with replace_recent_blockhash
        let config = RpcSimulateTransactionConfig {
            sig_verify: false,
            replace_recent_blockhash: true,
            commitment: Some(CommitmentConfig::finalized()),
            encoding: Some(UiTransactionEncoding::Base64),
            ..RpcSimulateTransactionConfig::default()
        };
        let result = self.rpc.simulate_transaction_with_config(tx, config).await?.value;
        Ok(SimulationResult {
            error: result.err.map(|err| err.to_string()),
            logs: result.logs.unwrap_or_default(),
        })
    }

    async fn submit(&self, tx: &VersionedTransaction) -> Result<Signature> {
        let config = RpcSendTransactionConfig {
            skip_preflight: true,
            preflight_commitment: Some(CommitmentConfig::finalized().commitment),
            encoding: Some(UiTransactionEncoding::Base64),
            ..RpcSendTransactionConfig::default()
        };
        Ok(self.rpc.send_transaction_with_config(tx, config).await?)
    }

    async fn await_confirmation(&self, signature: &Signature) -> Result<Settlement> {
        tokio::select! {
            watched = self.watch_signature(signature) => match watched {
                Ok(settled) => Ok(settled),
                Err(err) => {
                    warn!(%signature, error = %format!("{err:#}"), "signature subscription unavailable, polling only");
                    self.poll_status(signature).await
                }
            },
            polled = self.poll_status(signature) => polled,
        }
    }

    async fn fetch_transaction(&self, signature: &Signature) -> Result<TransactionRecord> {
        let config = RpcTransactionConfig {
            encoding: Some(UiTransactionEncoding::Base64),
            commitment: Some(CommitmentConfig::finalized()),
            max_supported_transaction_version: Some(0),
        };
        let tx = self.rpc.get_transaction_with_config(signature, config).await?;
        record_from_encoded(&tx)
    }
}

/// Flattens an RPC transaction into a `TransactionRecord`.
pub fn record_from_encoded(tx: &EncodedConfirmedTransactionWithStatusMeta) -> Result<TransactionRecord> {
    let meta = tx
        .transaction
        .meta
        .as_ref()
        .ok_or_else(|| anyhow!("transaction has no status meta"))?;
    let decoded = tx
        .transaction
        .transaction
        .decode()
        .ok_or_else(|| anyhow!("transaction payload could not be decoded"))?;

    let mut account_keys = decoded.message.static_account_keys().to_vec();
    if let OptionSerializer::Some(loaded) = &meta.loaded_addresses {
        for key in loaded.writable.iter().chain(loaded.readonly.iter()) {
            account_keys.push(Pubkey::from_str(key).with_context(|| format!("bad loaded address {key}"))?);
        }
    }

    Ok(TransactionRecord {
        account_keys,
        pre_balances: meta.pre_balances.clone(),
        post_balances: meta.post_balances.clone(),
        pre_token_balances: token_entries(&meta.pre_token_balances)?,
        post_token_balances: token_entries(&meta.post_token_balances)?,
    })
}

fn token_entries(
    balances: &OptionSerializer<Vec<UiTransactionTokenBalance>>,
) -> Result<Vec<TokenBalanceEntry>> {
    let balances = match balances {
        OptionSerializer::Some(balances) => balances,
        _ => return Ok(Vec::new()),
    };
    balances
        .iter()
        .map(|balance| {
            let owner = match &balance.owner {
                OptionSerializer::Some(owner) => Some(
                    Pubkey::from_str(owner).with_context(|| format!("bad token owner {owner}"))?,
                ),
                _ => None,
            };
            if balance.mint.is_empty() {
                bail!("token balance at index {} has no mint", balance.account_index);
            }
            Ok(TokenBalanceEntry {
                account_index: balance.account_index,
                mint: balance.mint.clone(),
                owner,
                ui_amount: balance.ui_token_amount.ui_amount_string.clone(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use solana_sdk::{
        message::{v0, VersionedMessage},
        signature::{Keypair, Signer},
    };

    fn encoded(payer: &Keypair, extra: Pubkey, owner: &Pubkey) -> EncodedConfirmedTransactionWithStatusMeta {
        let message = v0::Message::try_compile(&payer.pubkey(), &[], &[], Hash::new_unique()).unwrap();
        let tx = VersionedTransaction::try_new(VersionedMessage::V0(message), &[payer]).unwrap();
        let raw = base64::encode(bincode::serialize(&tx).unwrap());
        serde_json::from_value(json!({
            "slot": 42,
            "blockTime": null,
            "transaction": [raw, "base64"],
            "meta": {
                "err": null,
                "status": {"Ok": null},
                "fee": 5000,
                "preBalances": [1_000_000_000u64, 0],
                "postBalances": [999_995_000u64, 2_039_280],
                "innerInstructions": [],
                "logMessages": [],
                "preTokenBalances": [],
                "postTokenBalances": [{
                    "accountIndex": 1,
                    "mint": "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v",
                    "owner": owner.to_string(),
                    "programId": "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA",
                    "uiTokenAmount": {
                        "uiAmount": 1.5,
                        "decimals": 6,
                        "amount": "1500000",
                        "uiAmountString": "1.5"
                    }
                }],
                "rewards": [],
                "loadedAddresses": {"writable": [extra.to_string()], "readonly": []}
            },
            "version": 0
        }))
        .expect("encoded transaction")
    }

    #[test]
    fn record_includes_loaded_addresses_and_token_balances() {
        let payer = Keypair::new();
        let extra = Pubkey::new_unique();
        let record = record_from_encoded(&encoded(&payer, extra, &payer.pubkey())).expect("record");

        assert_eq!(record.account_keys, vec![payer.pubkey(), extra]);
        assert_eq!(record.post_balances, vec![999_995_000, 2_039_280]);
        assert!(record.pre_token_balances.is_empty());
        assert_eq!(record.post_token_balances.len(), 1);
        let token = &record.post_token_balances[0];
        assert_eq!(token.account_index, 1);
        assert_eq!(token.owner, Some(payer.pubkey()));
        assert_eq!(token.ui_amount, "1.5");
    }

    /// JSON-RPC stub answering every `getSignatureStatuses` with `status`.
    ///
    /// Returns the HTTP url and the number of status requests served so far.
    async fn status_server(status: serde_json::Value) -> (String, std::sync::Arc<std::sync::atomic::AtomicUsize>) {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let served = Arc::new(AtomicUsize::new(0));
        let counter = served.clone();
        tokio::spawn(async move {
            loop {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut raw = Vec::new();
                let mut buf = [0u8; 4096];
                // headers, then a content-length body
                let request = loop {
                    let n = socket.read(&mut buf).await.unwrap();
                    if n == 0 {
                        break None;
                    }
                    raw.extend_from_slice(&buf[..n]);
                    let text = String::from_utf8_lossy(&raw).to_string();
                    if let Some(end) = text.find("\r\n\r\n") {
                        let len = text[..end]
                            .lines()
                            .find_map(|line| {
                                let (name, value) = line.split_once(':')?;
                                name.eq_ignore_ascii_case("content-length")
                                    .then(|| value.trim().parse::<usize>().ok())?
                            })
                            .unwrap_or(0);
                        if raw.len() >= end + 4 + len {
                            break Some(text[end + 4..].to_string());
                        }
                    }
                };
                let Some(request) = request else { continue };
                let request: serde_json::Value = serde_json::from_str(&request).unwrap();
                assert_eq!(request["method"], "getSignatureStatuses");
                counter.fetch_add(1, Ordering::SeqCst);

                let body = json!({
                    "jsonrpc": "2.0",
                    "result": {"context": {"slot": 300}, "value": [status.clone()]},
                    "id": request["id"].clone(),
                })
                .to_string();
                let response = format!(
                    "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                socket.write_all(response.as_bytes()).await.unwrap();
                socket.shutdown().await.ok();
            }
        });
        (format!("http://{addr}"), served)
    }

    async fn closed_ws_url() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("ws://{addr}")
    }

    #[tokio::test]
    async fn confirmation_falls_back_to_polling() {
        let (http_url, served) = status_server(json!({
            "slot": 299,
            "confirmations": null,
            "status": {"Ok": null},
            "err": null,
            "confirmationStatus": "finalized"
        }))
        .await;
        let rpc = SolanaRpc::new(http_url, closed_ws_url().await);

        let settled = tokio::time::timeout(Duration::from_secs(10), rpc.await_confirmation(&Signature::new_unique()))
            .await
            .expect("settles before the deadline")
            .expect("status lookup");
        assert_eq!(settled, Ok(()));
        assert!(served.load(std::sync::atomic::Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn polled_on_chain_failure_is_reported() {
        let (http_url, _served) = status_server(json!({
            "slot": 299,
            "confirmations": null,
            "status": {"Err": {"InstructionError": [2, {"Custom": 6001}]}},
            "err": {"InstructionError": [2, {"Custom": 6001}]},
            "confirmationStatus": "finalized"
        }))
        .await;
        let rpc = SolanaRpc::new(http_url, closed_ws_url().await);

        let settled = tokio::time::timeout(Duration::from_secs(10), rpc.await_confirmation(&Signature::new_unique()))
            .await
            .expect("settles before the deadline")
            .expect("status lookup");
        assert!(matches!(settled, Err(TransactionError::InstructionError(2, _))));
    }
}
