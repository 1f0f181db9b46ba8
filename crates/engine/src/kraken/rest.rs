use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use sha2::{Digest, Sha256, Sha512};
use tracing::debug;
use url::form_urlencoded;

use common::{
    CancelAck, Error, ExchangeClient, NewOrder, OpenOrder, OrderAck, OrderSide, Result, Ticker,
};

const BASE_URL: &str = "https://api.kraken.com";

type HmacSha512 = Hmac<Sha512>;

/// REST API client for Kraken spot. Used for order management and tickers.
pub struct KrakenClient {
    api_key: String,
    /// Decoded API secret.
    secret: Vec<u8>,
    base_url: String,
    http: Client,
    last_nonce: AtomicU64,
}

impl KrakenClient {
    /// `secret` is the base64 private key shown by Kraken.
    /// `timeout` bounds every request.
    pub fn new(api_key: impl Into<String>, secret: &str, timeout: Duration) -> Result<Self> {
        let secret = BASE64
            .decode(secret.trim())
            .map_err(|e| Error::Config(format!("KRAKEN_SECRET is not valid base64: {e}")))?;
        let http = Client::builder()
            .use_rustls_tls()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;

        Ok(Self {
            api_key: api_key.into(),
            secret,
            base_url: BASE_URL.to_string(),
            http,
            last_nonce: AtomicU64::new(0),
        })
    }

    /// Client without credentials. Only `ticker` works.
    pub fn public(timeout: Duration) -> Result<Self> {
        Self::new("", "", timeout)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Microsecond timestamp, strictly increasing per client.
    fn next_nonce(&self) -> u64 {
        let now = Utc::now().timestamp_micros().max(0) as u64;
        let mut last = self.last_nonce.load(Ordering::Relaxed);
        loop {
            let next = now.max(last + 1);
            match self
                .last_nonce
                .compare_exchange(last, next, Ordering::SeqCst, Ordering::Relaxed)
            {
                Ok(_) => return next,
                Err(actual) => last = actual,
            }
        }
    }

    /// `base64(HMAC-SHA512(secret, path || SHA256(nonce || post_data)))`
    fn sign(&self, path: &str, nonce: u64, post_data: &str) -> String {
        let mut sha = Sha256::new();
        sha.update(nonce.to_string().as_bytes());
        sha.update(post_data.as_bytes());
        let digest = sha.finalize();

        let mut mac =
            HmacSha512::new_from_slice(&self.secret).expect("HMAC accepts any key length");
        mac.update(path.as_bytes());
        mac.update(&digest);
        BASE64.encode(mac.finalize().into_bytes())
    }

    async fn public_get<T: DeserializeOwned>(&self, method: &str, query: &[(&str, &str)]) -> Result<T> {
        let url = format!("{}/0/public/{method}", self.base_url);
        let resp = self
            .http
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| Error::Http(e.to_string()))?;

        if !status.is_success() {
            return Err(Error::Exchange(format!("HTTP {status}: {body}")));
        }
        unwrap_envelope(&body)
    }

    async fn private_post<T: DeserializeOwned>(
        &self,
        method: &str,
        params: &[(&str, String)],
    ) -> Result<T> {
        if self.api_key.is_empty() {
            return Err(Error::Config(format!(
                "Kraken {method} requires API credentials"
            )));
        }

        let path = format!("/0/private/{method}");
        let nonce = self.next_nonce();
        let body = form_urlencoded::Serializer::new(String::new())
            .append_pair("nonce", &nonce.to_string())
            .extend_pairs(params.iter().map(|(k, v)| (*k, v.as_str())))
            .finish();
        let signature = self.sign(&path, nonce, &body);
        let url = format!("{}{path}", self.base_url);

        let resp = self
            .http
            .post(&url)
            .header("API-Key", &self.api_key)
            .header("API-Sign", signature)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = resp.status();
        let text = resp.text().await.map_err(|e| Error::Http(e.to_string()))?;

        if !status.is_success() {
            return Err(Error::Exchange(format!("HTTP {status}: {text}")));
        }
        unwrap_envelope(&text)
    }
}

#[async_trait]
impl ExchangeClient for KrakenClient {
    async fn open_orders(&self) -> Result<HashMap<String, OpenOrder>> {
        let result: OpenOrdersResult = self.private_post("OpenOrders", &[]).await?;

        result
            .open
            .into_iter()
            .map(|(txid, order)| {
                let side = OrderSide::from_exchange(&order.descr.side).ok_or_else(|| {
                    Error::Exchange(format!(
                        "order {txid} has unknown side '{}'",
                        order.descr.side
                    ))
                })?;
                let open = OpenOrder {
                    pair: order.descr.pair,
                    side,
                    order_type: order.descr.ordertype,
                    price: order.descr.price,
                    volume: order.vol,
                };
                Ok((txid, open))
            })
            .collect()
    }

    async fn ticker(&self, pair: &str) -> Result<Ticker> {
        let mut result: HashMap<String, TickerInfo> =
            self.public_get("Ticker", &[("pair", pair)]).await?;

        // Kraken keys the result by its canonical pair name, which may differ
        // from the requested alias.
        let info = match result.remove(pair) {
            Some(info) => info,
            None if result.len() == 1 => result
                .into_values()
                .next()
                .ok_or_else(|| Error::Exchange(format!("no ticker for {pair}")))?,
            None => return Err(Error::Exchange(format!("no ticker for {pair}"))),
        };

        Ok(Ticker {
            pair: pair.to_string(),
            close: info.c,
        })
    }

    async fn balance(&self) -> Result<HashMap<String, String>> {
        self.private_post("Balance", &[]).await
    }

    async fn cancel_order(&self, order_id: &str) -> Result<CancelAck> {
        debug!(order_id, "Cancelling order on Kraken");
        let result: CancelResult = self
            .private_post("CancelOrder", &[("txid", order_id.to_string())])
            .await?;
        Ok(CancelAck {
            count: result.count,
            pending: result.pending,
        })
    }

    async fn add_order(&self, order: &NewOrder) -> Result<OrderAck> {
        let ordertype = order.kind.as_exchange_str().ok_or_else(|| {
            Error::Exchange(format!("order kind {:?} cannot be placed", order.kind))
        })?;

        let params = [
            ("ordertype", ordertype.to_string()),
            ("type", order.side.to_string()),
            ("volume", order.volume.clone()),
            ("pair", order.pair.clone()),
            ("price", order.price.to_string()),
        ];

        debug!(pair = %order.pair, ordertype, price = order.price, "Submitting order to Kraken");
        let result: AddOrderResult = self.private_post("AddOrder", &params).await?;

        Ok(OrderAck {
            txids: result.txid,
            description: result.descr.order,
        })
    }
}

fn unwrap_envelope<T: DeserializeOwned>(body: &str) -> Result<T> {
    let envelope: Envelope<T> = serde_json::from_str(body)
        .map_err(|e| Error::Exchange(format!("malformed response: {e}")))?;
    if !envelope.error.is_empty() {
        return Err(Error::Exchange(envelope.error.join(", ")));
    }
    envelope
        .result
        .ok_or_else(|| Error::Exchange("response carries no result".into()))
}

// ─── Response types ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    error: Vec<String>,
    result: Option<T>,
}

#[derive(Deserialize)]
struct OpenOrdersResult {
    #[serde(default)]
    open: HashMap<String, KrakenOrder>,
}

#[derive(Deserialize)]
struct KrakenOrder {
    descr: OrderDescription,
    vol: String,
}

#[derive(Deserialize)]
struct OrderDescription {
    pair: String,
    #[serde(rename = "type")]
    side: String,
    ordertype: String,
    #[serde(default)]
    price: Option<String>,
}

#[derive(Deserialize)]
struct TickerInfo {
    /// `[price, lot volume]` of the last trade.
    c: Vec<String>,
}

#[derive(Deserialize)]
struct CancelResult {
    count: u32,
    #[serde(default)]
    pending: bool,
}

#[derive(Deserialize)]
struct AddOrderResult {
    descr: AddOrderDescription,
    #[serde(default)]
    txid: Vec<String>,
}

#[derive(Deserialize)]
struct AddOrderDescription {
    order: String,
}
