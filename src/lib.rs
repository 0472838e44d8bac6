// Travel gateway: buys a ticket by composing the airlines hub, exchange and
// fidelity services, with retries, timeouts and cache fallbacks.

pub mod api;
pub mod cache;
pub mod client;
pub mod config;
pub mod downstream;
pub mod error;
pub mod gateway;
pub mod ledger;
pub mod mock_services;
pub mod model;
pub mod retry;

// Re-export key types for convenience
pub use api::{app, AppState};
pub use cache::{CacheStats, FlightCache, QuotationCache};
pub use client::ResilientClient;
pub use config::{GatewayConfig, ServiceUrls};
pub use downstream::{ExchangeService, FidelityService, FlightService};
pub use error::{ConfigError, GatewayError, UpstreamError};
pub use gateway::{Downstream, PurchaseReceipt, TravelGateway};
pub use ledger::TicketLedger;
pub use model::{BuyTicketRequest, BuyTicketResponse, FlightQuote, Ticket, TicketStatus};
pub use retry::{with_retry, RetryConfig, Sleeper};
