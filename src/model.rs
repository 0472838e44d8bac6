// Data model shared by the gateway, the downstream adapters and the HTTP surface

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// Price quote for one flight on one day, as returned by the airlines hub
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightQuote {
    #[serde(rename = "flight")]
    pub flight_code: String,
    pub day: String,
    #[serde(rename = "value")]
    pub unit_price_usd: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketStatus {
    PendingPayment,
    Paid,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    #[serde(rename = "transactionID")]
    pub transaction_id: Option<Uuid>,
    #[serde(rename = "flight")]
    pub flight_code: String,
    pub day: String,
    #[serde(rename = "price")]
    pub price_local_currency: f64,
    #[serde(rename = "user")]
    pub user_id: String,
    pub status: TicketStatus,
    pub created_at: DateTime<Utc>,
}

impl Ticket {
    pub fn pending(flight_code: &str, day: &str, user_id: &str, price: f64) -> Self {
        Self {
            transaction_id: None,
            flight_code: flight_code.to_string(),
            day: day.to_string(),
            price_local_currency: price,
            user_id: user_id.to_string(),
            status: TicketStatus::PendingPayment,
            created_at: Utc::now(),
        }
    }

    pub fn mark_paid(&mut self, transaction_id: Uuid) {
        self.transaction_id = Some(transaction_id);
        self.status = TicketStatus::Paid;
    }

    pub fn mark_failed(&mut self) {
        self.status = TicketStatus::Failed;
    }
}

fn default_fault_tolerance() -> bool {
    true
}

// Body of POST /buyTicket
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuyTicketRequest {
    #[serde(default)]
    pub flight: String,
    #[serde(default)]
    pub day: String,
    #[serde(default)]
    pub user: String,
    // false disables retries and cache fallbacks for this purchase
    #[serde(default = "default_fault_tolerance")]
    pub ft: bool,
}

impl BuyTicketRequest {
    pub fn new(flight: &str, day: &str, user: &str) -> Self {
        Self {
            flight: flight.to_string(),
            day: day.to_string(),
            user: user.to_string(),
            ft: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuyTicketResponse {
    #[serde(rename = "transactionID")]
    pub transaction_id: String,
}

// Wire payloads towards the downstream services

#[derive(Debug, Serialize, Deserialize)]
pub struct ExchangeRateResponse {
    pub value: f64,
}

#[derive(Debug, Default, Deserialize)]
pub struct ExchangeErrorBody {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SellRequest {
    pub flight: String,
    pub day: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SellResponse {
    #[serde(rename = "transactionID")]
    pub transaction_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BonusRequest {
    pub user: String,
    pub bonus: i64,
}

// Local price with two decimals, half away from zero
pub fn round_price(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// Loyalty points granted for a ticket, nearest whole dollar
pub fn bonus_points(unit_price_usd: f64) -> i64 {
    unit_price_usd.round() as i64
}
