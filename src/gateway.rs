// Purchase orchestrator
//
// Sequences one ticket purchase across the three downstream services:
//
//   Received -> Valid -> FlightResolved -> RateResolved -> SaleRequested -> Paid | Failed
//
// Flight lookup failures are retried and then masked by the flight cache,
// exchange failures are masked by the average of recent rates, sale failures
// are fatal, bonus failures are only logged. No lock is held across a call.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::cache::{FlightCache, QuotationCache};
use crate::client::ResilientClient;
use crate::config::GatewayConfig;
use crate::downstream::{
    AirlinesHubClient, ExchangeClient, ExchangeService, FidelityClient, FidelityService,
    FlightService, AIRLINES_HUB, EXCHANGE, FIDELITY,
};
use crate::error::{GatewayError, UpstreamError};
use crate::ledger::TicketLedger;
use crate::model::{bonus_points, round_price, BuyTicketRequest, FlightQuote, Ticket};
use crate::retry::{with_retry, RetryConfig, Sleeper, TokioSleeper};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurchaseStage {
    Received,
    Valid,
    FlightResolved,
    RateResolved,
    SaleRequested,
    Paid,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceSource {
    Live,
    Cached,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateSource {
    Live,
    Averaged,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PurchaseReceipt {
    pub transaction_id: Uuid,
    pub ticket: Ticket,
    pub unit_price_usd: f64,
    pub exchange_rate: f64,
    pub price_source: PriceSource,
    pub rate_source: RateSource,
    pub bonus_sent: bool,
}

#[derive(Debug, Default)]
pub struct GatewayStats {
    pub purchases_succeeded: AtomicUsize,
    pub purchases_failed: AtomicUsize,
    pub flight_retries: AtomicUsize,
    pub flight_cache_fallbacks: AtomicUsize,
    pub rate_average_fallbacks: AtomicUsize,
    pub sale_timeouts: AtomicUsize,
    pub bonus_failures: AtomicUsize,
}

impl GatewayStats {
    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::SeqCst);
    }
}

// The three downstream capabilities the gateway talks to
#[derive(Clone)]
pub struct Downstream {
    pub flights: Arc<dyn FlightService>,
    pub exchange: Arc<dyn ExchangeService>,
    pub fidelity: Arc<dyn FidelityService>,
}

impl Downstream {
    pub fn http(config: &GatewayConfig) -> Self {
        let client = ResilientClient::new(config.request_timeout);
        Self {
            flights: Arc::new(AirlinesHubClient::new(&config.urls.airlines_hub, client.clone())),
            exchange: Arc::new(ExchangeClient::new(&config.urls.exchange, client.clone())),
            fidelity: Arc::new(FidelityClient::new(&config.urls.fidelity, client)),
        }
    }
}

// A request that passed validation
#[derive(Debug, Clone)]
struct Purchase {
    flight: String,
    day: String,
    user: String,
    fault_tolerant: bool,
}

pub struct TravelGateway {
    downstream: Downstream,
    flight_cache: Arc<FlightCache>,
    quotation_cache: Arc<QuotationCache>,
    ledger: Arc<TicketLedger>,
    sleeper: Arc<dyn Sleeper>,
    retry_config: RetryConfig,
    request_timeout: Duration,
    concurrent_lookups: bool,
    stats: GatewayStats,
}

impl TravelGateway {
    pub fn new(downstream: Downstream, config: &GatewayConfig) -> Self {
        Self {
            downstream,
            flight_cache: Arc::new(FlightCache::new()),
            quotation_cache: Arc::new(QuotationCache::with_window(config.quotation_window)),
            ledger: Arc::new(TicketLedger::new()),
            sleeper: Arc::new(TokioSleeper),
            retry_config: config.retry_config.clone(),
            request_timeout: config.request_timeout,
            concurrent_lookups: config.concurrent_lookups,
            stats: GatewayStats::default(),
        }
    }

    pub fn from_config(config: &GatewayConfig) -> Self {
        Self::new(Downstream::http(config), config)
    }

    pub fn with_flight_cache(mut self, cache: Arc<FlightCache>) -> Self {
        self.flight_cache = cache;
        self
    }

    pub fn with_quotation_cache(mut self, cache: Arc<QuotationCache>) -> Self {
        self.quotation_cache = cache;
        self
    }

    pub fn with_ledger(mut self, ledger: Arc<TicketLedger>) -> Self {
        self.ledger = ledger;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn flight_cache(&self) -> &Arc<FlightCache> {
        &self.flight_cache
    }

    pub fn quotation_cache(&self) -> &Arc<QuotationCache> {
        &self.quotation_cache
    }

    pub fn ledger(&self) -> &Arc<TicketLedger> {
        &self.ledger
    }

    pub fn stats(&self) -> &GatewayStats {
        &self.stats
    }

    #[tracing::instrument(
        name = "buy_ticket",
        skip(self, request),
        fields(flight = %request.flight, day = %request.day, user = %request.user, ft = request.ft)
    )]
    pub async fn buy_ticket(&self, request: &BuyTicketRequest) -> Result<PurchaseReceipt, GatewayError> {
        let mut stage = PurchaseStage::Received;

        match self.run_purchase(request, &mut stage).await {
            Ok(receipt) => {
                GatewayStats::bump(&self.stats.purchases_succeeded);
                info!(transaction_id = %receipt.transaction_id, "purchase completed");
                Ok(receipt)
            }
            Err(err) => {
                GatewayStats::bump(&self.stats.purchases_failed);
                warn!(failed_at = ?stage, error = %err, "purchase failed");
                Err(err)
            }
        }
    }

    async fn run_purchase(
        &self,
        request: &BuyTicketRequest,
        stage: &mut PurchaseStage,
    ) -> Result<PurchaseReceipt, GatewayError> {
        let purchase = validate(request)?;
        advance(stage, PurchaseStage::Valid);

        let ((quote, price_source), (rate, rate_source)) = if self.concurrent_lookups {
            let (flight, rate) = futures::join!(
                self.resolve_flight(&purchase),
                self.resolve_rate(&purchase)
            );
            let flight = flight?;
            advance(stage, PurchaseStage::FlightResolved);
            let rate = rate?;
            advance(stage, PurchaseStage::RateResolved);
            (flight, rate)
        } else {
            let flight = self.resolve_flight(&purchase).await?;
            advance(stage, PurchaseStage::FlightResolved);
            let rate = self.resolve_rate(&purchase).await?;
            advance(stage, PurchaseStage::RateResolved);
            (flight, rate)
        };

        let price = round_price(quote.unit_price_usd * rate);
        let mut ticket = Ticket::pending(&purchase.flight, &purchase.day, &purchase.user, price);
        info!(price, rate, unit_price_usd = quote.unit_price_usd, "ticket priced");

        advance(stage, PurchaseStage::SaleRequested);
        let sale = self
            .bounded(self.downstream.flights.sell(&purchase.flight, &purchase.day))
            .await;

        let transaction_id = match sale {
            Ok(id) => id,
            Err(err) => {
                ticket.mark_failed();
                advance(stage, PurchaseStage::Failed);
                if err.is_timeout() {
                    GatewayStats::bump(&self.stats.sale_timeouts);
                    // graceful failure: nothing is recorded and payment will not be processed
                    error!(status = ?ticket.status, "sale timed out, ticket will not be paid");
                } else {
                    error!(status = ?ticket.status, error = %err, "sale rejected");
                }
                return Err(GatewayError::upstream(AIRLINES_HUB, err));
            }
        };

        ticket.mark_paid(transaction_id);
        self.ledger.insert(ticket.clone())?;
        advance(stage, PurchaseStage::Paid);
        info!(%transaction_id, "ticket recorded");

        let bonus_sent = self.send_bonus(&purchase.user, quote.unit_price_usd).await;

        Ok(PurchaseReceipt {
            transaction_id,
            ticket,
            unit_price_usd: quote.unit_price_usd,
            exchange_rate: rate,
            price_source,
            rate_source,
            bonus_sent,
        })
    }

    async fn resolve_flight(&self, purchase: &Purchase) -> Result<(FlightQuote, PriceSource), GatewayError> {
        let flights = &self.downstream.flights;
        let stats = &self.stats;
        let flight = purchase.flight.as_str();
        let day = purchase.day.as_str();

        let mut lookup = move |attempt: u32| {
            if attempt > 0 {
                GatewayStats::bump(&stats.flight_retries);
            }
            debug!(attempt = attempt + 1, "looking up flight price");
            async move {
                let quote = self.bounded(flights.lookup(flight, day)).await?;
                check_positive(quote.unit_price_usd, "flight price")?;
                Ok::<_, UpstreamError>(quote)
            }
        };

        // ft=false: a single attempt, no backoff
        let live = if purchase.fault_tolerant {
            with_retry(&self.retry_config, self.sleeper.as_ref(), lookup).await
        } else {
            lookup(0).await
        };

        match live {
            Ok(quote) => {
                self.flight_cache.put(flight, day, quote.clone());
                Ok((quote, PriceSource::Live))
            }
            Err(err) if purchase.fault_tolerant => match self.flight_cache.get(flight, day) {
                Some(cached) => {
                    GatewayStats::bump(&self.stats.flight_cache_fallbacks);
                    warn!(error = %err, price = cached.unit_price_usd, "flight lookup failed, using cached quote");
                    Ok((cached, PriceSource::Cached))
                }
                None => {
                    error!(error = %err, "flight lookup failed and no cached quote exists");
                    Err(GatewayError::ExhaustedFallback(format!(
                        "could not fetch a price for flight {flight} on {day}"
                    )))
                }
            },
            Err(err) => Err(GatewayError::lookup(AIRLINES_HUB, err)),
        }
    }

    async fn resolve_rate(&self, purchase: &Purchase) -> Result<(f64, RateSource), GatewayError> {
        let live = self
            .bounded(self.downstream.exchange.convert())
            .await
            .and_then(|rate| check_positive(rate, "exchange rate").map(|_| rate));

        match live {
            Ok(rate) => {
                self.quotation_cache.record(rate);
                debug!(rate, "exchange rate received");
                Ok((rate, RateSource::Live))
            }
            Err(err) if purchase.fault_tolerant => match self.quotation_cache.average() {
                Some(avg) => {
                    GatewayStats::bump(&self.stats.rate_average_fallbacks);
                    warn!(
                        error = %err,
                        rate = avg,
                        samples = self.quotation_cache.len(),
                        "exchange failed, using average of recent rates"
                    );
                    Ok((avg, RateSource::Averaged))
                }
                None => {
                    error!(error = %err, "exchange failed and no recent rates are cached");
                    Err(GatewayError::ExhaustedFallback(
                        "could not fetch the exchange rate and no recent rates are known".to_string(),
                    ))
                }
            },
            Err(err) => Err(GatewayError::lookup(EXCHANGE, err)),
        }
    }

    // Best effort; the outcome never changes the purchase result
    async fn send_bonus(&self, user: &str, unit_price_usd: f64) -> bool {
        let points = bonus_points(unit_price_usd);
        info!(points, "sending loyalty bonus");

        match self.bounded(self.downstream.fidelity.bonus(user, points)).await {
            Ok(status) if (200..300).contains(&status) => {
                debug!(status, "bonus accepted");
                true
            }
            Ok(status) => {
                GatewayStats::bump(&self.stats.bonus_failures);
                warn!(service = FIDELITY, status, "bonus not accepted");
                false
            }
            Err(err) => {
                GatewayStats::bump(&self.stats.bonus_failures);
                warn!(service = FIDELITY, error = %err, "bonus could not be sent");
                false
            }
        }
    }

    // Deadline on top of whatever the capability enforces itself
    async fn bounded<T, F>(&self, call: F) -> Result<T, UpstreamError>
    where
        F: Future<Output = Result<T, UpstreamError>>,
    {
        match tokio::time::timeout(self.request_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(UpstreamError::Timeout(self.request_timeout)),
        }
    }
}

fn advance(stage: &mut PurchaseStage, next: PurchaseStage) {
    let from = *stage;
    debug!(?from, to = ?next, "purchase stage");
    *stage = next;
}

fn check_positive(value: f64, what: &str) -> Result<(), UpstreamError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(UpstreamError::Decode(format!("{what} must be positive, got {value}")))
    }
}

fn validate(request: &BuyTicketRequest) -> Result<Purchase, GatewayError> {
    // blank values are rejected, everything else goes downstream as sent
    let field = |name: &str, value: &str| {
        if value.trim().is_empty() {
            Err(GatewayError::InvalidInput(format!("missing field: {name}")))
        } else {
            Ok(value.to_string())
        }
    };

    Ok(Purchase {
        flight: field("flight", &request.flight)?,
        day: field("day", &request.day)?,
        user: field("user", &request.user)?,
        fault_tolerant: request.ft,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceUrls;
    use crate::mock_services::{MockAirlinesHub, MockExchange, MockFidelity, ServiceMode};
    use crate::model::TicketStatus;
    use crate::retry::RecordingSleeper;

    struct Harness {
        hub: Arc<MockAirlinesHub>,
        exchange: Arc<MockExchange>,
        fidelity: Arc<MockFidelity>,
        sleeper: RecordingSleeper,
        gateway: TravelGateway,
    }

    fn config() -> GatewayConfig {
        GatewayConfig::with_urls(ServiceUrls {
            airlines_hub: "http://hub".to_string(),
            exchange: "http://exchange".to_string(),
            fidelity: "http://fidelity".to_string(),
        })
    }

    fn harness_with(config: GatewayConfig, price: f64, rate: f64) -> Harness {
        let hub = Arc::new(MockAirlinesHub::new(price));
        let exchange = Arc::new(MockExchange::new(rate));
        let fidelity = Arc::new(MockFidelity::new());
        let sleeper = RecordingSleeper::new();

        let downstream = Downstream {
            flights: hub.clone(),
            exchange: exchange.clone(),
            fidelity: fidelity.clone(),
        };
        let gateway = TravelGateway::new(downstream, &config).with_sleeper(Arc::new(sleeper.clone()));

        Harness {
            hub,
            exchange,
            fidelity,
            sleeper,
            gateway,
        }
    }

    fn harness(price: f64, rate: f64) -> Harness {
        harness_with(config(), price, rate)
    }

    fn request() -> BuyTicketRequest {
        BuyTicketRequest::new("AB1234", "2026-03-01", "ana")
    }

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[tokio::test]
    async fn test_happy_path() {
        let h = harness(150.49, 5.37);

        let receipt = h.gateway.buy_ticket(&request()).await.unwrap();

        assert_eq!(receipt.ticket.price_local_currency, round_price(150.49 * 5.37));
        assert_eq!(receipt.ticket.status, TicketStatus::Paid);
        assert_eq!(receipt.price_source, PriceSource::Live);
        assert_eq!(receipt.rate_source, RateSource::Live);
        assert!(receipt.bonus_sent);

        let stored = h.gateway.ledger().get(&receipt.transaction_id).unwrap();
        assert_eq!(stored, receipt.ticket);
        assert_eq!(h.hub.sold(), vec![receipt.transaction_id]);
        assert_eq!(h.fidelity.bonuses(), vec![("ana".to_string(), 150)]);
        assert!(h.sleeper.delays().is_empty());
        assert_eq!(h.gateway.quotation_cache().snapshot(), vec![5.37]);
        assert_eq!(h.gateway.stats().purchases_succeeded.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalid_input_makes_no_calls() {
        let h = harness(100.0, 5.0);

        for req in [
            BuyTicketRequest::new("", "2026-03-01", "ana"),
            BuyTicketRequest::new("AB12", " ", "ana"),
            BuyTicketRequest::new("AB12", "2026-03-01", ""),
        ] {
            let err = h.gateway.buy_ticket(&req).await.unwrap_err();
            assert!(matches!(err, GatewayError::InvalidInput(_)), "{err:?}");
        }

        assert_eq!(h.hub.lookup_count(), 0);
        assert_eq!(h.exchange.request_count(), 0);
        assert_eq!(h.hub.sell_count(), 0);
        assert_eq!(h.fidelity.request_count(), 0);
    }

    #[tokio::test]
    async fn test_flight_lookup_recovers_on_third_attempt() {
        let h = harness(200.0, 5.0);
        h.hub.fail_next_lookups(2);

        let receipt = h.gateway.buy_ticket(&request()).await.unwrap();

        assert_eq!(h.hub.lookup_count(), 3);
        assert_eq!(h.sleeper.delays(), vec![ms(200), ms(400)]);
        assert_eq!(receipt.price_source, PriceSource::Live);
        assert_eq!(receipt.unit_price_usd, 200.0);
        // the cache is neither read nor needed
        let cache_stats = h.gateway.flight_cache().stats();
        assert_eq!(cache_stats.hit_count + cache_stats.miss_count, 0);
        assert_eq!(h.gateway.stats().flight_retries.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_flight_lookup_falls_back_to_cache() {
        let h = harness(120.0, 5.0);
        h.gateway.buy_ticket(&request()).await.unwrap();

        h.hub.set_price(999.0);
        h.hub.set_lookup_mode(ServiceMode::Unavailable);

        let receipt = h.gateway.buy_ticket(&request()).await.unwrap();
        assert_eq!(receipt.price_source, PriceSource::Cached);
        assert_eq!(receipt.unit_price_usd, 120.0);
        assert_eq!(receipt.ticket.price_local_currency, 600.0);
        // 1 lookup for the first purchase, 3 for the second
        assert_eq!(h.hub.lookup_count(), 4);
        assert_eq!(h.gateway.ledger().len(), 2);
        assert_eq!(h.gateway.stats().flight_cache_fallbacks.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_flight_lookup_without_cache_fails() {
        let h = harness(120.0, 5.0);
        h.hub.set_lookup_mode(ServiceMode::Erroring);

        let err = h.gateway.buy_ticket(&request()).await.unwrap_err();
        assert!(matches!(err, GatewayError::ExhaustedFallback(_)));
        assert_eq!(err.status_code().as_u16(), 500);
        assert_eq!(h.hub.lookup_count(), 3);
        assert_eq!(h.sleeper.delays(), vec![ms(200), ms(400), ms(800)]);
        assert_eq!(h.exchange.request_count(), 0);
        assert_eq!(h.hub.sell_count(), 0);
        assert!(h.gateway.ledger().is_empty());
    }

    #[tokio::test]
    async fn test_cache_is_keyed_by_flight_and_day() {
        let h = harness(120.0, 5.0);
        h.gateway
            .buy_ticket(&BuyTicketRequest::new("AB1", "23", "ana"))
            .await
            .unwrap();

        h.hub.set_lookup_mode(ServiceMode::Unavailable);
        let err = h
            .gateway
            .buy_ticket(&BuyTicketRequest::new("AB12", "3", "ana"))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::ExhaustedFallback(_)));
    }

    #[tokio::test]
    async fn test_exchange_failure_uses_average() {
        let h = harness(100.0, 5.0);
        h.gateway.quotation_cache().record(5.0);
        h.gateway.quotation_cache().record(6.0);
        h.exchange.set_mode(ServiceMode::Erroring);

        let receipt = h.gateway.buy_ticket(&request()).await.unwrap();
        assert_eq!(receipt.exchange_rate, 5.5);
        assert_eq!(receipt.rate_source, RateSource::Averaged);
        assert_eq!(receipt.ticket.price_local_currency, 550.0);
        // a fallback is not a new observation
        assert_eq!(h.gateway.quotation_cache().len(), 2);
    }

    #[tokio::test]
    async fn test_exchange_failure_without_history_fails() {
        let h = harness(100.0, 5.0);
        h.exchange.set_mode(ServiceMode::Unavailable);

        let err = h.gateway.buy_ticket(&request()).await.unwrap_err();
        assert!(matches!(err, GatewayError::ExhaustedFallback(_)));
        assert_eq!(err.status_code().as_u16(), 500);
        assert_eq!(h.hub.sell_count(), 0);
    }

    #[tokio::test]
    async fn test_non_positive_rate_is_treated_as_failure() {
        let h = harness(100.0, 0.0);
        h.gateway.quotation_cache().record(5.0);

        let receipt = h.gateway.buy_ticket(&request()).await.unwrap();
        assert_eq!(receipt.exchange_rate, 5.0);
        assert_eq!(receipt.rate_source, RateSource::Averaged);
    }

    #[tokio::test]
    async fn test_non_positive_price_is_treated_as_failure() {
        let h = harness(150.0, 5.0);
        h.gateway.buy_ticket(&request()).await.unwrap();
        h.hub.set_price(-1.0);

        let receipt = h.gateway.buy_ticket(&request()).await.unwrap();
        assert_eq!(receipt.price_source, PriceSource::Cached);
        assert_eq!(receipt.unit_price_usd, 150.0);
        assert_eq!(h.gateway.flight_cache().get("AB1234", "2026-03-01").unwrap().unit_price_usd, 150.0);
    }

    #[tokio::test]
    async fn test_fields_are_passed_through_untrimmed() {
        let h = harness(120.0, 5.0);
        h.gateway.buy_ticket(&request()).await.unwrap();
        h.hub.set_lookup_mode(ServiceMode::Erroring);

        // "AB1234 " is its own cache key, so the cached "AB1234" quote is not reused
        let padded = BuyTicketRequest::new("AB1234 ", "2026-03-01", "ana");
        let err = h.gateway.buy_ticket(&padded).await.unwrap_err();
        assert!(matches!(err, GatewayError::ExhaustedFallback(_)), "{err:?}");

        let blank = BuyTicketRequest::new("  ", "2026-03-01", "ana");
        let err = h.gateway.buy_ticket(&blank).await.unwrap_err();
        assert!(matches!(err, GatewayError::InvalidInput(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sale_timeout_is_504_without_ledger_entry() {
        let h = harness(100.0, 5.0);
        h.hub.set_sell_mode(ServiceMode::Delayed(Duration::from_secs(5)));

        let err = h.gateway.buy_ticket(&request()).await.unwrap_err();

        assert!(matches!(err, GatewayError::UpstreamTimeout { .. }), "{err:?}");
        assert_eq!(err.status_code().as_u16(), 504);
        assert!(h.gateway.ledger().is_empty());
        assert_eq!(h.hub.sell_count(), 1);
        assert_eq!(h.fidelity.request_count(), 0);
        assert_eq!(h.gateway.stats().sale_timeouts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_sale_error_is_500_without_ledger_entry() {
        let h = harness(100.0, 5.0);
        h.hub.set_sell_mode(ServiceMode::Unavailable);

        let err = h.gateway.buy_ticket(&request()).await.unwrap_err();
        assert!(matches!(err, GatewayError::UpstreamUnavailable { .. }));
        assert_eq!(err.status_code().as_u16(), 500);
        // the sale is never retried
        assert_eq!(h.hub.sell_count(), 1);
        assert!(h.gateway.ledger().is_empty());
    }

    #[tokio::test]
    async fn test_bonus_failure_does_not_fail_purchase() {
        let h = harness(100.0, 5.0);
        h.fidelity.set_mode(ServiceMode::Unavailable);

        let receipt = h.gateway.buy_ticket(&request()).await.unwrap();
        assert!(!receipt.bonus_sent);
        assert_eq!(receipt.ticket.status, TicketStatus::Paid);
        assert!(h.gateway.ledger().contains(&receipt.transaction_id));
        assert_eq!(h.gateway.stats().bonus_failures.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_bonus_is_cut_off() {
        let h = harness(100.0, 5.0);
        h.fidelity.set_mode(ServiceMode::Delayed(Duration::from_secs(30)));

        let receipt = h.gateway.buy_ticket(&request()).await.unwrap();
        assert!(!receipt.bonus_sent);
    }

    #[tokio::test]
    async fn test_fault_tolerance_off_skips_retry_and_fallbacks() {
        let h = harness(120.0, 5.0);
        h.gateway.buy_ticket(&request()).await.unwrap();
        h.hub.set_lookup_mode(ServiceMode::Erroring);

        let mut req = request();
        req.ft = false;
        let err = h.gateway.buy_ticket(&req).await.unwrap_err();

        assert!(matches!(err, GatewayError::UpstreamBadResponse { .. }), "{err:?}");
        assert_eq!(h.hub.lookup_count(), 2);
        assert!(h.sleeper.delays().is_empty());

        h.hub.set_lookup_mode(ServiceMode::Normal);
        h.exchange.set_mode(ServiceMode::Erroring);
        let err = h.gateway.buy_ticket(&req).await.unwrap_err();
        assert!(matches!(err, GatewayError::UpstreamBadResponse { service: EXCHANGE, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fault_tolerance_off_lookup_timeout_is_500() {
        let h = harness(120.0, 5.0);
        let mut req = request();
        req.ft = false;

        h.hub.set_lookup_mode(ServiceMode::Delayed(Duration::from_secs(10)));
        let err = h.gateway.buy_ticket(&req).await.unwrap_err();
        assert!(matches!(err, GatewayError::UpstreamUnavailable { service: AIRLINES_HUB, .. }), "{err:?}");
        assert_eq!(err.status_code().as_u16(), 500);
        assert_eq!(h.hub.lookup_count(), 1);

        h.hub.set_lookup_mode(ServiceMode::Normal);
        h.exchange.set_mode(ServiceMode::Delayed(Duration::from_secs(10)));
        let err = h.gateway.buy_ticket(&req).await.unwrap_err();
        assert!(matches!(err, GatewayError::UpstreamUnavailable { service: EXCHANGE, .. }), "{err:?}");
        assert_eq!(err.status_code().as_u16(), 500);
        assert_eq!(h.hub.sell_count(), 0);
        assert!(h.gateway.ledger().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_lookups_give_same_result() {
        let mut config = config();
        config.concurrent_lookups = true;
        let h = harness_with(config, 100.0, 5.25);

        let receipt = h.gateway.buy_ticket(&request()).await.unwrap();
        assert_eq!(receipt.ticket.price_local_currency, 525.0);
        assert_eq!(h.exchange.request_count(), 1);
    }

    #[tokio::test]
    async fn test_injected_caches_are_used() {
        let h = harness(100.0, 5.0);
        let quotations = Arc::new(QuotationCache::new());
        quotations.record(4.0);
        let ledger = Arc::new(TicketLedger::new());

        let gateway = TravelGateway::new(
            Downstream {
                flights: h.hub.clone(),
                exchange: h.exchange.clone(),
                fidelity: h.fidelity.clone(),
            },
            &config(),
        )
        .with_quotation_cache(quotations.clone())
        .with_ledger(ledger.clone())
        .with_sleeper(Arc::new(RecordingSleeper::new()));

        h.exchange.set_mode(ServiceMode::Erroring);
        let receipt = gateway.buy_ticket(&request()).await.unwrap();
        assert_eq!(receipt.exchange_rate, 4.0);
        assert!(ledger.contains(&receipt.transaction_id));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_purchases_share_state() {
        let h = harness(100.0, 5.0);
        let gateway = Arc::new(h.gateway);

        let mut handles = vec![];
        for i in 0..50 {
            let gateway = gateway.clone();
            handles.push(tokio::spawn(async move {
                let req = BuyTicketRequest::new(&format!("F{}", i % 5), "2026-03-01", "ana");
                gateway.buy_ticket(&req).await
            }));
        }

        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }

        assert_eq!(gateway.ledger().len(), 50);
        assert_eq!(gateway.flight_cache().len(), 5);
        assert_eq!(gateway.quotation_cache().len(), 10);
    }
}
