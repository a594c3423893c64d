//! Real-time stop-loss watcher
//!
//! Holds one WebSocket connection to the market quote stream while any
//! position is open. On every book update for a held token it compares the
//! best bid against the entry price and exits the position once the drop
//! crosses the configured threshold. Reconnects after a fixed delay on any
//! disconnect; tears the connection down when the last position closes.

use crate::config::{StrategyConfig, WatcherConfig};
use crate::ledger::Ledger;
use crate::storage::TradeLog;
use crate::types::Resolution;
use futures_util::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

/// Commands accepted by the watcher task.
#[derive(Debug)]
pub enum WatcherCommand {
    /// A new position was opened; (re)subscribe its token.
    Subscribe(String),
    /// A position settled elsewhere; drop its token.
    Unsubscribe(String),
    Shutdown,
}

/// Cheap handle for sending commands to the watcher task. Senders never
/// block; a closed channel means the watcher is already gone.
#[derive(Clone)]
pub struct WatcherHandle {
    tx: mpsc::UnboundedSender<WatcherCommand>,
}

impl WatcherHandle {
    pub fn subscribe(&self, token_id: &str) {
        let _ = self.tx.send(WatcherCommand::Subscribe(token_id.to_string()));
    }

    pub fn unsubscribe(&self, token_id: &str) {
        let _ = self.tx.send(WatcherCommand::Unsubscribe(token_id.to_string()));
    }

    pub fn shutdown(&self) {
        let _ = self.tx.send(WatcherCommand::Shutdown);
    }

    /// Handle backed by a raw channel, for asserting on commands in tests.
    #[cfg(test)]
    pub(crate) fn test_channel() -> (Self, mpsc::UnboundedReceiver<WatcherCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

/// Quote-stream message. Anything that does not parse into this shape is
/// ignored.
#[derive(Debug, Deserialize)]
struct BookEvent {
    event_type: String,
    asset_id: String,
    #[serde(default)]
    bids: Vec<RawLevel>,
}

#[derive(Debug, Deserialize)]
struct RawLevel {
    price: String,
}

enum ConnectionExit {
    /// All positions closed; go idle without reconnecting.
    Idle,
    /// Connection dropped; reconnect after the fixed delay.
    Disconnected,
    Shutdown,
}

pub struct StopLossWatcher {
    ledger: Ledger,
    trade_log: Option<TradeLog>,
    ws_url: String,
    state_file: String,
    stop_price_drop: Decimal,
    ping_interval: Duration,
    reconnect_delay: Duration,
}

impl StopLossWatcher {
    pub fn new(
        ledger: Ledger,
        trade_log: Option<TradeLog>,
        ws_url: String,
        state_file: String,
        strategy: &StrategyConfig,
        watcher: &WatcherConfig,
    ) -> Self {
        Self {
            ledger,
            trade_log,
            ws_url,
            state_file,
            stop_price_drop: strategy.stop_price_drop,
            ping_interval: Duration::from_secs(watcher.ping_interval_secs),
            reconnect_delay: Duration::from_secs(watcher.reconnect_delay_secs),
        }
    }

    /// Spawn the watcher task and return its command handle.
    pub fn spawn(self) -> WatcherHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(self.run(rx));
        WatcherHandle { tx }
    }

    async fn run(self, mut rx: mpsc::UnboundedReceiver<WatcherCommand>) {
        loop {
            // Idle until there is something to watch.
            if self.ledger.open_position_count().await == 0 {
                debug!("📡 No open positions, watcher idle");
                match rx.recv().await {
                    Some(WatcherCommand::Subscribe(_)) => {}
                    Some(WatcherCommand::Unsubscribe(_)) => continue,
                    Some(WatcherCommand::Shutdown) | None => return,
                }
            }

            match self.run_connection(&mut rx).await {
                ConnectionExit::Shutdown => return,
                ConnectionExit::Idle => {
                    info!("📡 All positions closed, disconnecting quote stream");
                }
                ConnectionExit::Disconnected => {
                    warn!(
                        "🔌 Quote stream disconnected, reconnecting in {}s",
                        self.reconnect_delay.as_secs()
                    );
                    tokio::time::sleep(self.reconnect_delay).await;
                }
            }
        }
    }

    /// One connection lifetime: connect, subscribe every held token, then
    /// pump messages until disconnect, shutdown, or the last close.
    async fn run_connection(
        &self,
        rx: &mut mpsc::UnboundedReceiver<WatcherCommand>,
    ) -> ConnectionExit {
        let ws_stream = match connect_async(&self.ws_url).await {
            Ok((stream, _)) => stream,
            Err(e) => {
                warn!("Quote stream connect failed: {}", e);
                return ConnectionExit::Disconnected;
            }
        };
        info!("🔌 Quote stream connected");

        let (mut write, mut read) = ws_stream.split();

        if !self.send_subscriptions(&mut write).await {
            return ConnectionExit::Disconnected;
        }

        let mut ping = tokio::time::interval(self.ping_interval);
        ping.tick().await; // first tick fires immediately

        loop {
            tokio::select! {
                _ = ping.tick() => {
                    if write.send(Message::Text("PING".into())).await.is_err() {
                        return ConnectionExit::Disconnected;
                    }
                }
                cmd = rx.recv() => match cmd {
                    Some(WatcherCommand::Subscribe(_)) => {
                        // Resending the full instrument list is additive and
                        // idempotent upstream.
                        if !self.send_subscriptions(&mut write).await {
                            return ConnectionExit::Disconnected;
                        }
                    }
                    Some(WatcherCommand::Unsubscribe(_)) => {
                        if self.ledger.open_position_count().await == 0 {
                            let _ = write.send(Message::Close(None)).await;
                            return ConnectionExit::Idle;
                        }
                    }
                    Some(WatcherCommand::Shutdown) | None => {
                        let _ = write.send(Message::Close(None)).await;
                        return ConnectionExit::Shutdown;
                    }
                },
                msg = read.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        self.handle_message(&text).await;
                        if self.ledger.open_position_count().await == 0 {
                            let _ = write.send(Message::Close(None)).await;
                            return ConnectionExit::Idle;
                        }
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                        return ConnectionExit::Disconnected;
                    }
                    _ => {}
                },
            }
        }
    }

    /// Send one subscription frame listing every held token. Skipped when
    /// the open set is empty.
    async fn send_subscriptions<S>(&self, write: &mut S) -> bool
    where
        S: SinkExt<Message> + Unpin,
    {
        let token_ids: Vec<String> = self
            .ledger
            .open_positions()
            .await
            .into_iter()
            .map(|p| p.token_id)
            .collect();

        if token_ids.is_empty() {
            return true;
        }

        let frame = json!({
            "assets_ids": token_ids,
            "type": "market",
        });

        if write.send(Message::Text(frame.to_string().into())).await.is_err() {
            return false;
        }
        info!("📡 Subscribed to {} position tokens", token_ids.len());
        true
    }

    async fn handle_message(&self, text: &str) {
        let event: BookEvent = match serde_json::from_str(text) {
            Ok(event) => event,
            Err(_) => return, // not a book update, ignore
        };
        if event.event_type != "book" {
            return;
        }

        let bids: Vec<Decimal> = event
            .bids
            .iter()
            .filter_map(|l| l.price.parse().ok())
            .collect();

        self.check_stop_loss(&event.asset_id, &bids).await;
    }

    /// Evaluate the stop condition for a held token against fresh bids and
    /// settle the position at the best bid if it triggers.
    pub async fn check_stop_loss(&self, token_id: &str, bid_prices: &[Decimal]) {
        let position = match self
            .ledger
            .open_positions()
            .await
            .into_iter()
            .find(|p| p.token_id == token_id)
        {
            Some(p) => p,
            None => return,
        };

        let best_bid = match best_bid_of(bid_prices) {
            Some(bid) => bid,
            None => return,
        };

        let drop = price_drop(position.entry_price, best_bid);
        if drop < self.stop_price_drop {
            return;
        }

        let payout = position.size * best_bid;
        let closed = match self
            .ledger
            .settle(position.id, Resolution::StopLoss, payout)
            .await
        {
            Ok(closed) => closed,
            Err(e) => {
                warn!("Stop-loss settle failed for {}: {}", position.slug, e);
                return;
            }
        };

        info!(
            "🛑 STOP {} | Entry: {:.3} | Exit: {:.3} | Drop: {:.1}% | P&L: ${:.2}",
            closed.position.slug,
            closed.position.entry_price,
            best_bid,
            drop * Decimal::ONE_HUNDRED,
            closed.pnl
        );

        if let Some(log) = &self.trade_log {
            log.record(&closed).await;
        }
        if let Err(e) = self.ledger.save(&self.state_file).await {
            warn!("Ledger save after stop-loss failed: {}", e);
        }
    }
}

/// Highest bid in the update, if any.
pub fn best_bid_of(bid_prices: &[Decimal]) -> Option<Decimal> {
    bid_prices.iter().copied().max()
}

/// Fractional drop of the bid below the entry price.
pub fn price_drop(entry_price: Decimal, best_bid: Decimal) -> Decimal {
    if entry_price.is_zero() {
        return Decimal::ZERO;
    }
    (entry_price - best_bid) / entry_price
}
