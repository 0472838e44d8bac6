// In-process stand-ins for the downstream services
//
// Each mock can be switched between behaviours at runtime and counts the
// calls it receives. Failures are deterministic: either a mode or a number of
// upcoming requests to fail.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::downstream::{ExchangeService, FidelityService, FlightService};
use crate::error::UpstreamError;
use crate::model::FlightQuote;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ServiceMode {
    Normal,
    // answers after the given delay
    Delayed(Duration),
    // answers with a 500
    Erroring,
    // refuses the connection, as a crashed process would
    Unavailable,
}

// Mode plus a budget of forced failures, shared by every mock
#[derive(Debug)]
struct Behaviour {
    mode: Mutex<ServiceMode>,
    fail_next_requests: AtomicUsize,
    request_count: AtomicUsize,
}

impl Default for Behaviour {
    fn default() -> Self {
        Self {
            mode: Mutex::new(ServiceMode::Normal),
            fail_next_requests: AtomicUsize::new(0),
            request_count: AtomicUsize::new(0),
        }
    }
}

impl Behaviour {
    async fn apply(&self, message: &str) -> Result<(), UpstreamError> {
        self.request_count.fetch_add(1, Ordering::SeqCst);

        let forced = self
            .fail_next_requests
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if forced {
            return Err(UpstreamError::BadResponse {
                status: 500,
                message: message.to_string(),
            });
        }

        let mode = *self.mode.lock();
        match mode {
            ServiceMode::Normal => Ok(()),
            ServiceMode::Delayed(delay) => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
            ServiceMode::Erroring => Err(UpstreamError::BadResponse {
                status: 500,
                message: message.to_string(),
            }),
            ServiceMode::Unavailable => {
                Err(UpstreamError::Unavailable("connection refused".to_string()))
            }
        }
    }
}

pub struct MockAirlinesHub {
    price_usd: Mutex<f64>,
    lookup: Behaviour,
    sell: Behaviour,
    sold: Mutex<Vec<Uuid>>,
}

impl MockAirlinesHub {
    pub fn new(price_usd: f64) -> Self {
        Self {
            price_usd: Mutex::new(price_usd),
            lookup: Behaviour::default(),
            sell: Behaviour::default(),
            sold: Mutex::new(Vec::new()),
        }
    }

    pub fn set_price(&self, price_usd: f64) {
        *self.price_usd.lock() = price_usd;
    }

    pub fn set_lookup_mode(&self, mode: ServiceMode) {
        *self.lookup.mode.lock() = mode;
    }

    pub fn set_sell_mode(&self, mode: ServiceMode) {
        *self.sell.mode.lock() = mode;
    }

    pub fn fail_next_lookups(&self, count: usize) {
        self.lookup.fail_next_requests.store(count, Ordering::SeqCst);
    }

    pub fn lookup_count(&self) -> usize {
        self.lookup.request_count.load(Ordering::SeqCst)
    }

    pub fn sell_count(&self) -> usize {
        self.sell.request_count.load(Ordering::SeqCst)
    }

    pub fn sold(&self) -> Vec<Uuid> {
        self.sold.lock().clone()
    }
}

#[async_trait]
impl FlightService for MockAirlinesHub {
    async fn lookup(&self, flight_code: &str, day: &str) -> Result<FlightQuote, UpstreamError> {
        self.lookup.apply("flight lookup failed").await?;

        Ok(FlightQuote {
            flight_code: flight_code.to_string(),
            day: day.to_string(),
            unit_price_usd: *self.price_usd.lock(),
        })
    }

    async fn sell(&self, _flight_code: &str, _day: &str) -> Result<Uuid, UpstreamError> {
        self.sell.apply("sale failed").await?;

        let id = Uuid::new_v4();
        self.sold.lock().push(id);
        Ok(id)
    }
}

pub struct MockExchange {
    rate: Mutex<f64>,
    behaviour: Behaviour,
}

impl MockExchange {
    pub fn new(rate: f64) -> Self {
        Self {
            rate: Mutex::new(rate),
            behaviour: Behaviour::default(),
        }
    }

    pub fn set_rate(&self, rate: f64) {
        *self.rate.lock() = rate;
    }

    pub fn set_mode(&self, mode: ServiceMode) {
        *self.behaviour.mode.lock() = mode;
    }

    pub fn fail_next_requests(&self, count: usize) {
        self.behaviour.fail_next_requests.store(count, Ordering::SeqCst);
    }

    pub fn request_count(&self) -> usize {
        self.behaviour.request_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExchangeService for MockExchange {
    async fn convert(&self) -> Result<f64, UpstreamError> {
        self.behaviour.apply("failed to fetch the dollar rate").await?;
        Ok(*self.rate.lock())
    }
}

#[derive(Default)]
pub struct MockFidelity {
    behaviour: Behaviour,
    bonuses: Mutex<Vec<(String, i64)>>,
}

impl MockFidelity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_mode(&self, mode: ServiceMode) {
        *self.behaviour.mode.lock() = mode;
    }

    pub fn request_count(&self) -> usize {
        self.behaviour.request_count.load(Ordering::SeqCst)
    }

    pub fn bonuses(&self) -> Vec<(String, i64)> {
        self.bonuses.lock().clone()
    }
}

#[async_trait]
impl FidelityService for MockFidelity {
    async fn bonus(&self, user_id: &str, bonus: i64) -> Result<u16, UpstreamError> {
        self.behaviour.apply("bonus rejected").await?;
        self.bonuses.lock().push((user_id.to_string(), bonus));
        Ok(200)
    }
}
