#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::time::Instant;

use common::{
    CancelAck, Error, ExchangeClient, NewOrder, OpenOrder, OrderAck, OrderSide, PositionConfig,
    Result, Ticker,
};

pub fn position() -> PositionConfig {
    PositionConfig {
        pair: "XETHZUSD".into(),
        base_asset: "XETH".into(),
        entry: 2000.0,
        stop: 1900.0,
        take: 2200.0,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    OpenOrders,
    Ticker(String),
    Balance,
    Cancel(String),
    Add(NewOrder),
}

/// In-memory exchange with scripted failures and a call journal.
#[derive(Default)]
pub struct ScriptedExchange {
    orders: Mutex<HashMap<String, OpenOrder>>,
    price: Mutex<String>,
    balances: Mutex<HashMap<String, String>>,
    calls: Mutex<Vec<(Call, Instant)>>,
    next_txid: AtomicU32,
    pub fail_open_orders: AtomicBool,
    pub fail_ticker: AtomicBool,
    pub stall_ticker: AtomicBool,
    pub fail_balance: AtomicBool,
    pub fail_cancel: AtomicBool,
    pub stall_cancel: AtomicBool,
    pub unconfirmed_cancel: AtomicBool,
    pub fail_add: AtomicBool,
    pub stall_add: AtomicBool,
}

impl ScriptedExchange {
    pub fn new(price: &str, base_balance: &str) -> Self {
        let exchange = Self::default();
        exchange.set_price(price);
        exchange
            .balances
            .lock()
            .unwrap()
            .insert("XETH".into(), base_balance.into());
        exchange
    }

    pub fn with_order(self, id: &str, order_type: &str) -> Self {
        self.with_order_on(id, order_type, OrderSide::Sell)
    }

    pub fn with_order_on(self, id: &str, order_type: &str, side: OrderSide) -> Self {
        self.orders.lock().unwrap().insert(
            id.into(),
            OpenOrder {
                pair: "XETHZUSD".into(),
                side,
                order_type: order_type.into(),
                price: None,
                volume: "1.5".into(),
            },
        );
        self
    }

    pub fn set_price(&self, price: &str) {
        *self.price.lock().unwrap() = price.into();
    }

    pub fn fail(flag: &AtomicBool) {
        flag.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().iter().map(|(c, _)| c.clone()).collect()
    }

    pub fn timed_calls(&self) -> Vec<(Call, Instant)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn open_order_types(&self) -> Vec<String> {
        self.orders
            .lock()
            .unwrap()
            .values()
            .map(|o| o.order_type.clone())
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push((call, Instant::now()));
    }

    fn flag(flag: &AtomicBool) -> bool {
        flag.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExchangeClient for ScriptedExchange {
    async fn open_orders(&self) -> Result<HashMap<String, OpenOrder>> {
        self.record(Call::OpenOrders);
        if Self::flag(&self.fail_open_orders) {
            return Err(Error::Http("connection reset".into()));
        }
        Ok(self.orders.lock().unwrap().clone())
    }

    async fn ticker(&self, pair: &str) -> Result<Ticker> {
        self.record(Call::Ticker(pair.to_string()));
        if Self::flag(&self.stall_ticker) {
            std::future::pending::<()>().await;
        }
        if Self::flag(&self.fail_ticker) {
            return Err(Error::Http("503 Service Unavailable".into()));
        }
        Ok(Ticker {
            pair: pair.to_string(),
            close: vec![self.price.lock().unwrap().clone(), "0.1".into()],
        })
    }

    async fn balance(&self) -> Result<HashMap<String, String>> {
        self.record(Call::Balance);
        if Self::flag(&self.fail_balance) {
            return Err(Error::Exchange("EAPI:Rate limit exceeded".into()));
        }
        Ok(self.balances.lock().unwrap().clone())
    }

    async fn cancel_order(&self, order_id: &str) -> Result<CancelAck> {
        self.record(Call::Cancel(order_id.to_string()));
        if Self::flag(&self.stall_cancel) {
            std::future::pending::<()>().await;
        }
        if Self::flag(&self.fail_cancel) {
            return Err(Error::Exchange("EOrder:Unknown order".into()));
        }
        if Self::flag(&self.unconfirmed_cancel) {
            return Ok(CancelAck {
                count: 0,
                pending: true,
            });
        }
        let removed = self.orders.lock().unwrap().remove(order_id);
        Ok(CancelAck {
            count: u32::from(removed.is_some()),
            pending: false,
        })
    }

    async fn add_order(&self, order: &NewOrder) -> Result<OrderAck> {
        self.record(Call::Add(order.clone()));
        if Self::flag(&self.stall_add) {
            std::future::pending::<()>().await;
        }
        if Self::flag(&self.fail_add) {
            return Err(Error::Exchange("EOrder:Insufficient funds".into()));
        }
        let txid = format!("TX{}", self.next_txid.fetch_add(1, Ordering::SeqCst));
        let order_type = order.kind.as_exchange_str().unwrap_or("other").to_string();
        self.orders.lock().unwrap().insert(
            txid.clone(),
            OpenOrder {
                pair: order.pair.clone(),
                side: order.side,
                order_type,
                price: Some(order.price.to_string()),
                volume: order.volume.clone(),
            },
        );
        Ok(OrderAck {
            txids: vec![txid],
            description: format!("{} {} {} @ {}", order.side, order.volume, order.pair, order.price),
        })
    }
}
