//! Resolution poller
//!
//! Periodically re-checks every open position's market for finality and
//! settles winners at full size. Markets that are still open, unreachable,
//! or closed without a decodable winner are left alone until the next
//! cycle; a position is never force-settled on ambiguous data.

use crate::client::MarketDataSource;
use crate::ledger::Ledger;
use crate::storage::TradeLog;
use crate::types::{Position, Resolution};
use crate::watcher::WatcherHandle;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

/// One poll pass over all open positions. Returns how many settled.
pub async fn poll(
    source: &dyn MarketDataSource,
    ledger: &Ledger,
    watcher: &WatcherHandle,
    trade_log: Option<&TradeLog>,
) -> usize {
    let mut settled = 0;
    for position in ledger.open_positions().await {
        if check_resolution(source, ledger, watcher, trade_log, &position).await {
            settled += 1;
        }
    }
    settled
}

async fn check_resolution(
    source: &dyn MarketDataSource,
    ledger: &Ledger,
    watcher: &WatcherHandle,
    trade_log: Option<&TradeLog>,
    position: &Position,
) -> bool {
    let market = match source.market_by_id(&position.market_id).await {
        Ok(Some(market)) => market,
        Ok(None) => {
            debug!("Market {} not found, re-checking next cycle", position.market_id);
            return false;
        }
        Err(e) => {
            warn!("Resolution fetch failed for {}: {}", position.slug, e);
            return false;
        }
    };

    if !market.closed {
        return false;
    }

    let resolution = match decode_resolution(&market.outcome_prices) {
        Some(resolution) => resolution,
        None => {
            // Closed but not yet settled upstream; treat as not final.
            debug!("Ambiguous resolution for {}, leaving open", position.slug);
            return false;
        }
    };

    let won = resolution.winning_side() == Some(position.side);
    let payout = if won { position.size } else { Decimal::ZERO };

    let closed = match ledger.settle(position.id, resolution, payout).await {
        Ok(closed) => closed,
        Err(e) => {
            warn!("Settle failed for {}: {}", position.slug, e);
            return false;
        }
    };

    watcher.unsubscribe(&position.token_id);
    if let Some(log) = trade_log {
        log.record(&closed).await;
    }

    info!(
        "✅ RESOLVED {} {} | Payout: ${:.2} | P&L: ${:.2}",
        closed.position.slug, resolution, closed.payout, closed.pnl
    );
    true
}

/// Winning side of a closed market: the outcome whose settlement price is
/// exactly 1. Anything else is ambiguous.
pub fn decode_resolution(outcome_prices: &[Decimal]) -> Option<Resolution> {
    match (outcome_prices.first(), outcome_prices.get(1)) {
        (Some(yes), _) if *yes == Decimal::ONE => Some(Resolution::Yes),
        (_, Some(no)) if *no == Decimal::ONE => Some(Resolution::No),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{MarketDetail, MockMarketDataSource};
    use crate::error::BotError;
    use crate::ledger::NewPosition;
    use crate::types::Side;
    use crate::watcher::WatcherCommand;
    use rust_decimal_macros::dec;

    async fn ledger_with_position(side: Side) -> Ledger {
        let ledger = Ledger::new(dec!(50));
        ledger
            .open_position(NewPosition {
                event_id: "ev1".to_string(),
                market_id: "m1".to_string(),
                slug: "will-it-happen".to_string(),
                side,
                token_id: "tok1".to_string(),
                entry_price: dec!(0.90),
                entry_probability: dec!(0.90),
                size: dec!(10),
                cost: dec!(9),
            })
            .await
            .unwrap();
        ledger
    }

    fn market(closed: bool, prices: &[Decimal]) -> MarketDetail {
        MarketDetail {
            id: "m1".to_string(),
            outcome_prices: prices.to_vec(),
            token_ids: vec!["tok1".to_string(), "tok2".to_string()],
            end_date: None,
            closed,
        }
    }

    #[test]
    fn decodes_only_unit_settlement_prices() {
        assert_eq!(decode_resolution(&[dec!(1), dec!(0)]), Some(Resolution::Yes));
        assert_eq!(decode_resolution(&[dec!(0), dec!(1)]), Some(Resolution::No));
        assert_eq!(decode_resolution(&[dec!(0.99), dec!(0.01)]), None);
        assert_eq!(decode_resolution(&[]), None);
    }

    #[tokio::test]
    async fn settles_winner_at_full_size() {
        let ledger = ledger_with_position(Side::Yes).await;
        let (watcher, mut rx) = WatcherHandle::test_channel();
        let mut source = MockMarketDataSource::new();
        source
            .expect_market_by_id()
            .returning(|_| Ok(Some(market(true, &[dec!(1), dec!(0)]))));

        let settled = poll(&source, &ledger, &watcher, None).await;

        assert_eq!(settled, 1);
        let closed = &ledger.closed_positions().await[0];
        assert_eq!(closed.resolution, Resolution::Yes);
        assert_eq!(closed.payout, dec!(10));
        assert_eq!(closed.pnl, dec!(1));
        assert_eq!(ledger.balance().await, dec!(51));
        assert!(matches!(
            rx.try_recv().unwrap(),
            WatcherCommand::Unsubscribe(token) if token == "tok1"
        ));
    }

    #[tokio::test]
    async fn settles_loser_at_zero() {
        let ledger = ledger_with_position(Side::Yes).await;
        let (watcher, _rx) = WatcherHandle::test_channel();
        let mut source = MockMarketDataSource::new();
        source
            .expect_market_by_id()
            .returning(|_| Ok(Some(market(true, &[dec!(0), dec!(1)]))));

        poll(&source, &ledger, &watcher, None).await;

        let closed = &ledger.closed_positions().await[0];
        assert_eq!(closed.resolution, Resolution::No);
        assert_eq!(closed.payout, Decimal::ZERO);
        assert_eq!(closed.pnl, dec!(-9));
        assert_eq!(ledger.balance().await, dec!(41));
    }

    #[tokio::test]
    async fn open_market_is_skipped() {
        let ledger = ledger_with_position(Side::Yes).await;
        let (watcher, _rx) = WatcherHandle::test_channel();
        let mut source = MockMarketDataSource::new();
        source
            .expect_market_by_id()
            .returning(|_| Ok(Some(market(false, &[dec!(0.95), dec!(0.05)]))));

        assert_eq!(poll(&source, &ledger, &watcher, None).await, 0);
        assert_eq!(ledger.open_position_count().await, 1);
    }

    #[tokio::test]
    async fn ambiguous_resolution_never_force_settles() {
        let ledger = ledger_with_position(Side::Yes).await;
        let (watcher, _rx) = WatcherHandle::test_channel();
        let mut source = MockMarketDataSource::new();
        source
            .expect_market_by_id()
            .returning(|_| Ok(Some(market(true, &[dec!(0.99), dec!(0.01)]))));

        assert_eq!(poll(&source, &ledger, &watcher, None).await, 0);
        assert_eq!(ledger.open_position_count().await, 1);
        assert!(ledger.is_event_locked("ev1").await);
    }

    #[tokio::test]
    async fn fetch_failure_leaves_position_untouched() {
        let ledger = ledger_with_position(Side::Yes).await;
        let (watcher, _rx) = WatcherHandle::test_channel();
        let mut source = MockMarketDataSource::new();
        source
            .expect_market_by_id()
            .returning(|_| Err(BotError::DataIncomplete("timeout".to_string())));

        assert_eq!(poll(&source, &ledger, &watcher, None).await, 0);
        assert_eq!(ledger.open_position_count().await, 1);
        assert_eq!(ledger.balance().await, dec!(41));
    }
}
