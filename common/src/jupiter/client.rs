use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use super::builder::build_swap_request;
use super::types::{SwapQuote, SwapQuoteRequest, SwapRequest, SwapResponse, SwapTransaction};
use crate::error::{SwapError, SwapResult};

pub const DEFAULT_SWAP_API: &str = "https://quote-api.jup.ag/v6";

/// The routing service: a quote in, a prebuilt unsigned transaction out.
#[async_trait]
pub trait RoutingApi: Send + Sync {
    async fn quote(&self, request: &SwapQuoteRequest) -> Result<SwapQuote>;
    async fn swap(&self, request: &SwapRequest) -> Result<SwapResponse>;
}

trait ApiKeyExt {
    fn with_api_key(self, key: Option<&str>) -> Self;
}

/// Attaches `x-api-key` when a key is configured.
impl ApiKeyExt for RequestBuilder {
    fn with_api_key(self, key: Option<&str>) -> Self {
        match key {
            Some(key) if !key.is_empty() => self.header("x-api-key", key),
            _ => self,
        }
    }
}

pub struct JupiterClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
}

impl JupiterClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self> {
        let http = Client::builder()
            .build()
            .context("failed to build http client")?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }
}

/// Any non-2xx status is an error regardless of body; the raw body is kept.
async fn decode_json<T: DeserializeOwned>(what: &str, resp: Response) -> Result<T> {
    let status = resp.status();
    let body = resp
        .text()
        .await
        .with_context(|| format!("failed to read {what} response body"))?;
    if !status.is_success() {
        return Err(anyhow!("{what} failed with status {status}: {body}"));
    }
    serde_json::from_str(&body).with_context(|| format!("failed to decode {what} response: {body}"))
}

#[async_trait]
impl RoutingApi for JupiterClient {
    async fn quote(&self, request: &SwapQuoteRequest) -> Result<SwapQuote> {
        let resp = self
            .http
            .get(self.endpoint("quote"))
            .query(request)
            .header(header::ACCEPT, "application/json")
            .with_api_key(self.api_key.as_deref())
            .send()
            .await
            .context("failed to send quote request")?;
        decode_json("quote", resp).await
    }

    async fn swap(&self, request: &SwapRequest) -> Result<SwapResponse> {
        let resp = self
            .http
            .post(self.endpoint("swap"))
            .header(header::ACCEPT, "application/json")
            .with_api_key(self.api_key.as_deref())
            .json(request)
            .send()
            .await
            .context("failed to send swap request")?;
        decode_json("swap", resp).await
    }
}

// ─────────────────── /quote -> /swap ───────────────────

pub async fn fetch_quote(api: &dyn RoutingApi, request: &SwapQuoteRequest) -> SwapResult<SwapQuote> {
    let quote = api.quote(request).await.map_err(SwapError::fetch)?;
    info!(
        in_amount = %quote.in_amount,
        out_amount = %quote.out_amount,
        hops = quote.route_plan.len(),
        price_impact_pct = %quote.price_impact_pct,
        "quote received"
    );
    Ok(quote)
}

/// Requests the swap transaction for `quote` and returns it with the quoted
/// output amount.
pub async fn fetch_swap_transaction(
    api: &dyn RoutingApi,
    user_public_key: &str,
    destination_token_account: &str,
    quote: SwapQuote,
) -> SwapResult<SwapTransaction> {
    let expected_out_amount = quote
        .out_amount
        .parse::<u64>()
        .with_context(|| format!("quote outAmount {:?} is not an integer", quote.out_amount))
        .map_err(SwapError::fetch)?;

    let request = build_swap_request(user_public_key, destination_token_account, quote);
    let envelope = api.swap(&request).await.map_err(SwapError::fetch)?;
    debug!(
        last_valid_block_height = envelope.last_valid_block_height,
        prioritization_fee_lamports = ?envelope.prioritization_fee_lamports,
        "swap transaction received"
    );

    Ok(SwapTransaction {
        envelope,
        expected_out_amount,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serves one canned HTTP response and hands back the raw request text.
    async fn one_shot_server(
        status_line: &'static str,
        body: &'static str,
    ) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 16 * 1024];
            let n = socket.read(&mut buf).await.unwrap();
            let response = format!(
                "HTTP/1.1 {status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&buf[..n]).into_owned()
        });
        (format!("http://{addr}"), handle)
    }

    fn request() -> SwapQuoteRequest {
        SwapQuoteRequest::new(
            "So11111111111111111111111111111111111111112",
            "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v",
            1_000_000,
            50,
        )
    }

    #[tokio::test(flavor = "current_thread")]
    async fn non_success_status_surfaces_raw_body() {
        let (url, server) =
            one_shot_server("400 Bad Request", r#"{"error":"Could not find any route"}"#).await;
        let client = JupiterClient::new(url, Some("secret".into())).unwrap();

        let err = fetch_quote(&client, &request()).await.unwrap_err();
        let text = err.to_string();
        assert!(matches!(err, SwapError::Fetch(_)));
        assert!(text.contains("400"), "{text}");
        assert!(text.contains("Could not find any route"), "{text}");

        let raw = server.await.unwrap();
        assert!(raw.starts_with("GET /quote?inputMint=So111"), "{raw}");
        assert!(raw.contains("slippageBps=50"));
        assert!(raw.contains("swapMode=ExactIn"));
        assert!(raw.to_ascii_lowercase().contains("x-api-key: secret"));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn malformed_body_is_a_fetch_error() {
        let (url, _server) = one_shot_server("200 OK", r#"{"inputMint": 7}"#).await;
        let client = JupiterClient::new(url, None).unwrap();
        let err = fetch_quote(&client, &request()).await.unwrap_err();
        assert!(matches!(err, SwapError::Fetch(_)));
        assert!(err.to_string().contains("failed to decode quote response"));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn transport_failure_is_a_fetch_error() {
        // bind then drop so the port is very likely closed
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = JupiterClient::new(format!("http://{addr}"), None).unwrap();
        let err = fetch_quote(&client, &request()).await.unwrap_err();
        assert!(matches!(err, SwapError::Fetch(_)));
    }
}
