//! Eligibility pipeline
//!
//! Two-stage, cost-ordered market scan: paged event discovery, a pure
//! denylist/lock stage, a cheap market-detail filter, and an order-book
//! filter that only runs for sides the cheap stage kept. Produces
//! opportunities in processing order and never touches the ledger.

pub mod filters;

use crate::client::{EventListing, MarketDataSource, MarketDetail, MarketRef, OrderBook};
use crate::config::{ScannerConfig, StrategyConfig};
use crate::error::BotError;
use crate::ledger::Ledger;
use crate::types::{Opportunity, Side};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Why a market (or one of its sides) fell out of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Core pricing/expiry fields missing on an otherwise successful fetch.
    Incomplete,
    /// Market closes too late, or has already closed.
    Time,
    /// Implied or book probability outside the acceptance band.
    Probability,
    /// Best-ask depth value below the liquidity floor.
    Liquidity,
    /// Order book has no asks at all.
    NoDepth,
}

/// A side that survived stage 1, ready for an order-book check.
#[derive(Debug, Clone, PartialEq)]
pub struct SideCandidate {
    pub side: Side,
    pub probability: Decimal,
    pub token_id: String,
}

/// Per-cycle filter accounting, logged at scan end.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScanCounters {
    pub checked: usize,
    pub locked_events: usize,
    pub denylisted: usize,
    pub time_filtered: usize,
    pub prob_filtered: usize,
    pub liquidity_filtered: usize,
    pub fetch_errors: usize,
}

/// Run one full eligibility scan. A discovery failure discards the whole
/// run (partial listings are never acted on); per-market failures are
/// counted and skipped.
pub async fn scan(
    source: &dyn MarketDataSource,
    ledger: &Ledger,
    strategy: &StrategyConfig,
    scanner: &ScannerConfig,
) -> Vec<Opportunity> {
    let started = std::time::Instant::now();

    let events = match fetch_all_events(source, scanner).await {
        Ok(events) => events,
        Err(e) => {
            warn!("Event discovery failed, skipping scan cycle: {}", e);
            return Vec::new();
        }
    };
    info!("📥 Events: {}", events.len());

    let mut counters = ScanCounters::default();
    let jobs = collect_market_jobs(&events, ledger, &mut counters).await;
    info!("📋 Markets to check: {}", jobs.len());

    if jobs.is_empty() {
        return Vec::new();
    }

    let mut eligible = Vec::new();
    let batch_size = scanner.batch_size.max(1);

    for (i, batch) in jobs.chunks(batch_size).enumerate() {
        let results = futures_util::future::join_all(
            batch.iter().map(|job| check_market(source, job, strategy)),
        )
        .await;

        for result in results {
            counters.checked += 1;
            match result {
                CheckOutcome::Eligible(opp) => eligible.push(opp),
                CheckOutcome::Rejected(r) => counters.count(r),
                CheckOutcome::FetchError => counters.fetch_errors += 1,
            }
        }

        if (i + 1) * batch_size < jobs.len() {
            tokio::time::sleep(Duration::from_millis(scanner.batch_pause_ms)).await;
        }
    }

    info!(
        "📊 Scan complete: {} eligible in {:.1}s (checked={}, time={}, prob={}, liq={}, errors={})",
        eligible.len(),
        started.elapsed().as_secs_f64(),
        counters.checked,
        counters.time_filtered,
        counters.prob_filtered,
        counters.liquidity_filtered,
        counters.fetch_errors
    );
    for (i, opp) in eligible.iter().enumerate() {
        info!("   {}. {} {} @ {:.3}", i + 1, opp.slug, opp.side, opp.best_ask);
    }

    eligible
}

/// Page through all open events until a short or empty page. HTTP 429 backs
/// off and retries the same page; any other failure aborts discovery.
async fn fetch_all_events(
    source: &dyn MarketDataSource,
    scanner: &ScannerConfig,
) -> crate::error::Result<Vec<EventListing>> {
    let mut events = Vec::new();
    let mut offset = 0;

    loop {
        let page = match source.events_page(offset, scanner.page_size).await {
            Ok(page) => page,
            Err(BotError::RateLimited { .. }) => {
                warn!(
                    "⏳ Rate limited at offset {}, backing off {}s",
                    offset, scanner.rate_limit_backoff_secs
                );
                tokio::time::sleep(Duration::from_secs(scanner.rate_limit_backoff_secs)).await;
                continue;
            }
            Err(e) => return Err(e),
        };

        if page.is_empty() {
            break;
        }
        let short_page = page.len() < scanner.page_size;
        events.extend(page);
        if short_page {
            break;
        }
        offset += scanner.page_size;
    }

    Ok(events)
}

#[derive(Debug, Clone)]
struct MarketJob {
    event_id: String,
    market: MarketRef,
}

/// Drop markets of locked events and denylisted slugs. Pure apart from the
/// lock lookups.
async fn collect_market_jobs(
    events: &[EventListing],
    ledger: &Ledger,
    counters: &mut ScanCounters,
) -> Vec<MarketJob> {
    let mut jobs = Vec::new();

    for event in events {
        if ledger.is_event_locked(&event.event_id).await {
            counters.locked_events += 1;
            continue;
        }

        for market in &event.markets {
            if filters::should_skip_slug(&market.slug) {
                counters.denylisted += 1;
                continue;
            }
            jobs.push(MarketJob {
                event_id: event.event_id.clone(),
                market: market.clone(),
            });
        }
    }

    jobs
}

enum CheckOutcome {
    Eligible(Opportunity),
    Rejected(Rejection),
    FetchError,
}

/// Stage 1 then stage 2 for one market. At most one opportunity comes out,
/// from the first side (YES before NO) that survives both stages.
async fn check_market(
    source: &dyn MarketDataSource,
    job: &MarketJob,
    strategy: &StrategyConfig,
) -> CheckOutcome {
    let detail = match source.market_by_slug(&job.market.slug).await {
        Ok(Some(detail)) => detail,
        Ok(None) => return CheckOutcome::FetchError,
        Err(e) => {
            debug!("Market fetch failed for {}: {}", job.market.slug, e);
            return CheckOutcome::FetchError;
        }
    };

    let (candidates, hours_to_close) = match stage1_check(&detail, Utc::now(), strategy) {
        Ok(pass) => pass,
        Err(r) => return CheckOutcome::Rejected(r),
    };

    let mut last_rejection = Rejection::Probability;
    let mut had_fetch_error = false;
    for candidate in candidates {
        let book = match source.order_book(&candidate.token_id).await {
            Ok(book) => book,
            Err(e) => {
                debug!("Order book fetch failed for {}: {}", candidate.token_id, e);
                had_fetch_error = true;
                continue;
            }
        };

        match stage2_check(&book, strategy) {
            Ok((best_ask, ask_size)) => {
                return CheckOutcome::Eligible(Opportunity {
                    event_id: job.event_id.clone(),
                    market_id: detail.id.clone(),
                    slug: job.market.slug.clone(),
                    side: candidate.side,
                    token_id: candidate.token_id,
                    probability: candidate.probability,
                    best_ask,
                    ask_size,
                    hours_to_close,
                    is_crypto: filters::is_crypto_slug(&job.market.slug),
                });
            }
            Err(r) => last_rejection = r,
        }
    }

    if had_fetch_error {
        CheckOutcome::FetchError
    } else {
        CheckOutcome::Rejected(last_rejection)
    }
}

/// Stage 1: cheap filters over fetched market detail. Returns surviving
/// sides in YES-then-NO order plus hours until close.
pub fn stage1_check(
    detail: &MarketDetail,
    now: DateTime<Utc>,
    strategy: &StrategyConfig,
) -> Result<(Vec<SideCandidate>, Decimal), Rejection> {
    let end_date = detail.end_date.ok_or(Rejection::Incomplete)?;
    if detail.outcome_prices.is_empty() || detail.token_ids.len() < 2 {
        return Err(Rejection::Incomplete);
    }

    let hours = Decimal::from((end_date - now).num_seconds()) / dec!(3600);
    if hours <= Decimal::ZERO || hours > strategy.max_hours_to_close {
        return Err(Rejection::Time);
    }

    let yes_price = detail.outcome_prices[0];
    let mut candidates = Vec::new();

    for (side, probability, token_idx) in [
        (Side::Yes, yes_price, 0),
        (Side::No, Decimal::ONE - yes_price, 1),
    ] {
        if probability >= strategy.min_probability && probability <= strategy.max_probability {
            candidates.push(SideCandidate {
                side,
                probability,
                token_id: detail.token_ids[token_idx].clone(),
            });
        }
    }

    if candidates.is_empty() {
        return Err(Rejection::Probability);
    }

    Ok((candidates, hours))
}

/// Stage 2: order-book filters. The book price can diverge from the quoted
/// market price, so the probability band is re-checked against the best ask.
pub fn stage2_check(
    book: &OrderBook,
    strategy: &StrategyConfig,
) -> Result<(Decimal, Decimal), Rejection> {
    let best_ask = book
        .asks
        .iter()
        .map(|l| l.price)
        .min()
        .ok_or(Rejection::NoDepth)?;

    if best_ask < strategy.min_probability || best_ask > strategy.max_probability {
        return Err(Rejection::Probability);
    }

    let ask_size: Decimal = book
        .asks
        .iter()
        .filter(|l| l.price == best_ask)
        .map(|l| l.size)
        .sum();

    let liquidity = best_ask * ask_size;
    if liquidity < strategy.min_liquidity_usd {
        return Err(Rejection::Liquidity);
    }

    Ok((best_ask, ask_size))
}

impl ScanCounters {
    fn count(&mut self, rejection: Rejection) {
        match rejection {
            Rejection::Incomplete => self.fetch_errors += 1,
            Rejection::Time => self.time_filtered += 1,
            Rejection::Probability | Rejection::NoDepth => self.prob_filtered += 1,
            Rejection::Liquidity => self.liquidity_filtered += 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{BookLevel, MockMarketDataSource};
    use chrono::Duration as ChronoDuration;
    use rust_decimal_macros::dec;

    fn strategy() -> StrategyConfig {
        StrategyConfig::default()
    }

    fn scanner_cfg() -> ScannerConfig {
        ScannerConfig {
            page_size: 2,
            batch_size: 1,
            batch_pause_ms: 0,
            request_timeout_secs: 10,
            rate_limit_backoff_secs: 0,
        }
    }

    fn detail(yes_price: Decimal, hours_out: i64) -> MarketDetail {
        MarketDetail {
            id: "m1".to_string(),
            outcome_prices: vec![yes_price, Decimal::ONE - yes_price],
            token_ids: vec!["tok-yes".to_string(), "tok-no".to_string()],
            end_date: Some(Utc::now() + ChronoDuration::hours(hours_out)),
            closed: false,
        }
    }

    fn book(asks: &[(Decimal, Decimal)]) -> OrderBook {
        OrderBook {
            bids: Vec::new(),
            asks: asks
                .iter()
                .map(|&(price, size)| BookLevel { price, size })
                .collect(),
        }
    }

    fn listing(event_id: &str, slug: &str) -> EventListing {
        EventListing {
            event_id: event_id.to_string(),
            slug: format!("{}-event", slug),
            markets: vec![MarketRef {
                id: "m1".to_string(),
                slug: slug.to_string(),
            }],
        }
    }

    #[test]
    fn stage1_rejects_missing_fields() {
        let mut d = detail(dec!(0.85), 2);
        d.end_date = None;
        assert_eq!(
            stage1_check(&d, Utc::now(), &strategy()).unwrap_err(),
            Rejection::Incomplete
        );

        let mut d = detail(dec!(0.85), 2);
        d.outcome_prices.clear();
        assert_eq!(
            stage1_check(&d, Utc::now(), &strategy()).unwrap_err(),
            Rejection::Incomplete
        );
    }

    #[test]
    fn stage1_rejects_out_of_window_expiry() {
        let expired = detail(dec!(0.85), -1);
        assert_eq!(
            stage1_check(&expired, Utc::now(), &strategy()).unwrap_err(),
            Rejection::Time
        );

        let too_far = detail(dec!(0.85), 48);
        assert_eq!(
            stage1_check(&too_far, Utc::now(), &strategy()).unwrap_err(),
            Rejection::Time
        );
    }

    #[test]
    fn stage1_keeps_sides_within_band_yes_first() {
        let (sides, hours) = stage1_check(&detail(dec!(0.85), 2), Utc::now(), &strategy()).unwrap();
        assert_eq!(sides.len(), 1);
        assert_eq!(sides[0].side, Side::Yes);
        assert_eq!(sides[0].probability, dec!(0.85));
        assert_eq!(sides[0].token_id, "tok-yes");
        assert!(hours > dec!(1.9) && hours <= dec!(2));

        // NO side at 0.88 implied
        let (sides, _) = stage1_check(&detail(dec!(0.12), 2), Utc::now(), &strategy()).unwrap();
        assert_eq!(sides[0].side, Side::No);
        assert_eq!(sides[0].token_id, "tok-no");

        // band is inclusive on both edges
        let (sides, _) = stage1_check(&detail(dec!(0.96), 2), Utc::now(), &strategy()).unwrap();
        assert_eq!(sides[0].probability, dec!(0.96));
    }

    #[test]
    fn stage1_rejects_mid_probability_markets() {
        assert_eq!(
            stage1_check(&detail(dec!(0.50), 2), Utc::now(), &strategy()).unwrap_err(),
            Rejection::Probability
        );
    }

    #[test]
    fn stage2_takes_minimum_ask_and_sums_depth_at_it() {
        let book = book(&[(dec!(0.93), dec!(10)), (dec!(0.91), dec!(5)), (dec!(0.91), dec!(3))]);
        let (best_ask, ask_size) = stage2_check(&book, &strategy()).unwrap();
        assert_eq!(best_ask, dec!(0.91));
        assert_eq!(ask_size, dec!(8));
    }

    #[test]
    fn stage2_rejects_book_price_divergence() {
        // Passed stage 1 at 0.85 implied, but no ask at or below 0.96.
        let book = book(&[(dec!(0.97), dec!(100))]);
        assert_eq!(stage2_check(&book, &strategy()).unwrap_err(), Rejection::Probability);
    }

    #[test]
    fn stage2_rejects_thin_books() {
        assert_eq!(
            stage2_check(&book(&[]), &strategy()).unwrap_err(),
            Rejection::NoDepth
        );

        // 0.90 x 2 = 1.80 < 2.50 floor
        let thin = book(&[(dec!(0.90), dec!(2))]);
        assert_eq!(stage2_check(&thin, &strategy()).unwrap_err(), Rejection::Liquidity);
    }

    #[tokio::test]
    async fn discovery_stops_on_short_page_and_retries_rate_limits() {
        let mut source = MockMarketDataSource::new();
        let mut calls = 0;
        source.expect_events_page().returning(move |offset, _| {
            calls += 1;
            match (offset, calls) {
                // first page: rate limited once, then full
                (0, 1) => Err(BotError::RateLimited { retry_after_secs: 0 }),
                (0, _) => Ok(vec![listing("ev1", "a"), listing("ev2", "b")]),
                // second page is short, ending discovery
                (2, _) => Ok(vec![listing("ev3", "c")]),
                _ => panic!("unexpected offset {}", offset),
            }
        });

        let events = fetch_all_events(&source, &scanner_cfg()).await.unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[2].event_id, "ev3");
    }

    #[tokio::test]
    async fn discovery_failure_discards_partial_results() {
        let mut source = MockMarketDataSource::new();
        source.expect_events_page().returning(|offset, _| match offset {
            0 => Ok(vec![listing("ev1", "a"), listing("ev2", "b")]),
            _ => Err(BotError::DataIncomplete("upstream went away".to_string())),
        });

        let ledger = Ledger::new(dec!(50));
        let opportunities = scan(&source, &ledger, &strategy(), &scanner_cfg()).await;
        assert!(opportunities.is_empty());
    }

    #[tokio::test]
    async fn scan_yields_opportunity_and_is_idempotent() {
        let mut source = MockMarketDataSource::new();
        source
            .expect_events_page()
            .returning(|offset, _| match offset {
                0 => Ok(vec![listing("ev1", "fed-rate-decision")]),
                _ => Ok(vec![]),
            });
        source
            .expect_market_by_slug()
            .returning(|_| Ok(Some(detail(dec!(0.85), 2))));
        source
            .expect_order_book()
            .returning(|_| Ok(book(&[(dec!(0.90), dec!(100))])));

        let ledger = Ledger::new(dec!(50));
        let first = scan(&source, &ledger, &strategy(), &scanner_cfg()).await;
        assert_eq!(first.len(), 1);
        let opp = &first[0];
        assert_eq!(opp.event_id, "ev1");
        assert_eq!(opp.side, Side::Yes);
        assert_eq!(opp.best_ask, dec!(0.90));
        assert_eq!(opp.ask_size, dec!(100));
        assert!(!opp.is_crypto);

        // same upstream data, same output (hours_to_close moves with the
        // clock, so normalize it before comparing)
        let second = scan(&source, &ledger, &strategy(), &scanner_cfg()).await;
        let normalize = |mut opps: Vec<Opportunity>| {
            for opp in &mut opps {
                opp.hours_to_close = Decimal::ZERO;
            }
            opps
        };
        assert_eq!(normalize(second), normalize(first));
    }

    #[tokio::test]
    async fn scan_skips_locked_events_and_denylisted_slugs() {
        let mut source = MockMarketDataSource::new();
        source.expect_events_page().returning(|offset, _| match offset {
            0 => Ok(vec![
                listing("locked-ev", "fed-rate-decision"),
                listing("ev2", "nba-finals-2026"),
            ]),
            _ => Ok(vec![]),
        });
        // neither market may reach the detail fetch
        source.expect_market_by_slug().never();

        let ledger = Ledger::new(dec!(50));
        ledger
            .open_position(crate::ledger::NewPosition {
                event_id: "locked-ev".to_string(),
                market_id: "m0".to_string(),
                slug: "held".to_string(),
                side: Side::Yes,
                token_id: "tok0".to_string(),
                entry_price: dec!(0.9),
                entry_probability: dec!(0.9),
                size: dec!(1),
                cost: dec!(0.9),
            })
            .await
            .unwrap();

        let opportunities = scan(&source, &ledger, &strategy(), &scanner_cfg()).await;
        assert!(opportunities.is_empty());
    }

    #[tokio::test]
    async fn one_market_contributes_at_most_one_opportunity() {
        // Both sides in band (yes 0.85 won't happen naturally; craft prices
        // so yes=0.85 and no=0.15 -> only yes qualifies, then fail yes book
        // and confirm no NO-side fallback opportunity appears).
        let mut source = MockMarketDataSource::new();
        source.expect_events_page().returning(|offset, _| match offset {
            0 => Ok(vec![listing("ev1", "fed-rate-decision")]),
            _ => Ok(vec![]),
        });
        source
            .expect_market_by_slug()
            .returning(|_| Ok(Some(detail(dec!(0.85), 2))));
        source
            .expect_order_book()
            .returning(|_| Ok(book(&[(dec!(0.97), dec!(100))])));

        let ledger = Ledger::new(dec!(50));
        let opportunities = scan(&source, &ledger, &strategy(), &scanner_cfg()).await;
        assert!(opportunities.is_empty());
    }
}
