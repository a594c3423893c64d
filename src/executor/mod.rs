//! Capital allocator
//!
//! Turns one scan cycle's opportunities into simulated fills against the
//! ledger. Sizing couples a fixed fraction of performance-adjusted capital
//! (initial capital plus realized P&L) with an equal split of the free
//! balance, so a burst of opportunities cannot over-commit the wallet.
//! Strictly sequential: processing order decides who gets funded when
//! capital runs out mid-cycle.

use crate::config::StrategyConfig;
use crate::error::BotError;
use crate::ledger::{Ledger, NewPosition};
use crate::types::Opportunity;
use crate::watcher::WatcherHandle;
use rust_decimal::Decimal;
use tracing::{debug, info};

/// Open positions for as many opportunities as capital allows. Returns the
/// number of positions opened.
pub async fn execute(
    opportunities: &[Opportunity],
    ledger: &Ledger,
    watcher: &WatcherHandle,
    strategy: &StrategyConfig,
) -> usize {
    let wallet = ledger.balance().await;
    let n = opportunities.len();

    if n == 0 || wallet <= Decimal::ZERO {
        return 0;
    }

    // Sizing base compounds realized performance on top of the initial
    // capital; the live balance only caps, never grows, the allocation.
    let total_capital = ledger.initial_capital().await + ledger.realized_pnl().await;
    let base_allocation = total_capital * strategy.per_market_percent;
    let alloc_per_market = (wallet / Decimal::from(n as u64)).min(base_allocation);

    let mut opened = 0;

    for opp in opportunities {
        if ledger.is_event_locked(&opp.event_id).await {
            debug!("⏭️  Skipping {} - event {} already locked", opp.slug, opp.event_id);
            continue;
        }

        let allocation = if opp.is_crypto {
            alloc_per_market * strategy.crypto_discount
        } else {
            alloc_per_market
        };

        let size = (allocation / opp.best_ask).min(opp.ask_size);
        if size <= Decimal::ZERO {
            continue;
        }
        let cost = size * opp.best_ask;

        // The ledger re-checks the balance inside its lock; earlier buys in
        // this cycle have already debited it.
        let position = match ledger
            .open_position(NewPosition {
                event_id: opp.event_id.clone(),
                market_id: opp.market_id.clone(),
                slug: opp.slug.clone(),
                side: opp.side,
                token_id: opp.token_id.clone(),
                entry_price: opp.best_ask,
                entry_probability: opp.probability,
                size,
                cost,
            })
            .await
        {
            Ok(position) => position,
            Err(BotError::InsufficientBalance { .. }) => continue,
            Err(e) => {
                debug!("Open failed for {}: {}", opp.slug, e);
                continue;
            }
        };

        watcher.subscribe(&position.token_id);
        opened += 1;

        let tag = if opp.is_crypto { "💰" } else { "📊" };
        info!(
            "✅ BUY {} {} {} @ {:.3} | Size: {:.2} | Cost: ${:.2}",
            tag, position.slug, position.side, position.entry_price, position.size, position.cost
        );
    }

    opened
}
