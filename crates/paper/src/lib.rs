use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};

use common::{
    CancelAck, Error, ExchangeClient, NewOrder, OpenOrder, OrderAck, OrderKind, OrderSide, Result,
    Ticker,
};

/// A simulated resting order.
#[derive(Debug, Clone)]
struct PaperOrder {
    open: OpenOrder,
    kind: OrderKind,
    trigger: f64,
}

/// Simulated exchange client for paper trading.
///
/// Market data comes from a real source; balances, open orders and fills
/// are simulated in memory. No private endpoint is ever called.
pub struct PaperClient {
    market: Arc<dyn ExchangeClient>,
    base_asset: String,
    quote_asset: String,
    balances: Arc<RwLock<HashMap<String, f64>>>,
    orders: Arc<RwLock<HashMap<String, PaperOrder>>>,
}

impl PaperClient {
    pub fn new(
        market: Arc<dyn ExchangeClient>,
        base_asset: impl Into<String>,
        quote_asset: impl Into<String>,
        initial_base_balance: f64,
    ) -> Self {
        let base_asset = base_asset.into();
        let quote_asset = quote_asset.into();
        info!(
            base = %base_asset,
            balance = initial_base_balance,
            "PaperClient initialized"
        );
        let balances = HashMap::from([
            (base_asset.clone(), initial_base_balance),
            (quote_asset.clone(), 0.0),
        ]);
        Self {
            market,
            base_asset,
            quote_asset,
            balances: Arc::new(RwLock::new(balances)),
            orders: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Rest a sell order of `kind` for the whole base balance at `trigger`.
    /// Used to give the strategy a position to protect.
    pub async fn seed_protective_order(
        &self,
        pair: &str,
        kind: OrderKind,
        trigger: f64,
    ) -> Result<OrderAck> {
        let volume = self
            .balances
            .read()
            .await
            .get(&self.base_asset)
            .copied()
            .unwrap_or(0.0);
        self.add_order(&NewOrder {
            pair: pair.to_string(),
            side: OrderSide::Sell,
            kind,
            volume: volume.to_string(),
            price: trigger,
        })
        .await
    }

    /// Fill every resting sell order whose trigger was crossed by `price`.
    async fn simulate_fills(&self, price: f64) {
        let mut orders = self.orders.write().await;
        let triggered: Vec<String> = orders
            .iter()
            .filter(|(_, o)| match o.kind {
                OrderKind::StopLoss => price <= o.trigger,
                OrderKind::TakeProfit => price >= o.trigger,
                OrderKind::Limit => price >= o.trigger,
                OrderKind::Other => false,
            })
            .map(|(id, _)| id.clone())
            .collect();

        let mut balances = self.balances.write().await;
        for id in triggered {
            let Some(order) = orders.remove(&id) else {
                continue;
            };
            let held = balances.get(&self.base_asset).copied().unwrap_or(0.0);
            let wanted = order.open.volume.parse::<f64>().unwrap_or(0.0);
            let sold = wanted.min(held);
            *balances.entry(self.base_asset.clone()).or_default() -= sold;
            *balances.entry(self.quote_asset.clone()).or_default() += sold * price;
            info!(order_id = %id, kind = %order.kind, price, volume = sold, "Paper order filled");
        }
    }
}

#[async_trait]
impl ExchangeClient for PaperClient {
    async fn open_orders(&self) -> Result<HashMap<String, OpenOrder>> {
        Ok(self
            .orders
            .read()
            .await
            .iter()
            .map(|(id, o)| (id.clone(), o.open.clone()))
            .collect())
    }

    async fn ticker(&self, pair: &str) -> Result<Ticker> {
        let ticker = self.market.ticker(pair).await?;
        if let Some(price) = ticker.close.first().and_then(|p| p.parse::<f64>().ok()) {
            self.simulate_fills(price).await;
        }
        Ok(ticker)
    }

    async fn balance(&self) -> Result<HashMap<String, String>> {
        Ok(self
            .balances
            .read()
            .await
            .iter()
            .map(|(asset, amount)| (asset.clone(), amount.to_string()))
            .collect())
    }

    async fn cancel_order(&self, order_id: &str) -> Result<CancelAck> {
        let removed = self.orders.write().await.remove(order_id);
        debug!(order_id, found = removed.is_some(), "Paper cancel");
        Ok(CancelAck {
            count: u32::from(removed.is_some()),
            pending: false,
        })
    }

    async fn add_order(&self, order: &NewOrder) -> Result<OrderAck> {
        let order_type = order.kind.as_exchange_str().ok_or_else(|| {
            Error::Exchange(format!("order kind {:?} cannot be placed", order.kind))
        })?;
        if order.side != OrderSide::Sell {
            return Err(Error::Exchange("PaperClient only simulates sell orders".into()));
        }
        let volume = order
            .volume
            .parse::<f64>()
            .map_err(|e| Error::Exchange(format!("invalid volume '{}': {e}", order.volume)))?;
        let held = self
            .balances
            .read()
            .await
            .get(&self.base_asset)
            .copied()
            .unwrap_or(0.0);
        if volume <= 0.0 || volume > held {
            return Err(Error::Exchange(format!(
                "EOrder:Insufficient funds (volume {volume}, held {held})"
            )));
        }

        let txid = uuid::Uuid::new_v4().to_string();
        let description = format!(
            "{} {} {} @ {} {}",
            order.side, order.volume, order.pair, order_type, order.price
        );
        debug!(order_id = %txid, %description, "Paper order placed");

        self.orders.write().await.insert(
            txid.clone(),
            PaperOrder {
                open: OpenOrder {
                    pair: order.pair.clone(),
                    side: order.side,
                    order_type: order_type.to_string(),
                    price: Some(order.price.to_string()),
                    volume: order.volume.clone(),
                },
                kind: order.kind,
                trigger: order.price,
            },
        );

        Ok(OrderAck {
            txids: vec![txid],
            description,
        })
    }
}
