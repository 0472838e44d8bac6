// Capabilities the gateway consumes from the three downstream services,
// and their HTTP implementations.

use async_trait::async_trait;
use uuid::Uuid;

use crate::client::ResilientClient;
use crate::error::UpstreamError;
use crate::model::{
    BonusRequest, ExchangeErrorBody, ExchangeRateResponse, FlightQuote, SellRequest, SellResponse,
};

pub const AIRLINES_HUB: &str = "airlines hub";
pub const EXCHANGE: &str = "exchange";
pub const FIDELITY: &str = "fidelity";

#[async_trait]
pub trait FlightService: Send + Sync + 'static {
    async fn lookup(&self, flight_code: &str, day: &str) -> Result<FlightQuote, UpstreamError>;

    // Returns the transaction id assigned by the airline
    async fn sell(&self, flight_code: &str, day: &str) -> Result<Uuid, UpstreamError>;
}

#[async_trait]
pub trait ExchangeService: Send + Sync + 'static {
    // USD -> local currency multiplier
    async fn convert(&self) -> Result<f64, UpstreamError>;
}

#[async_trait]
pub trait FidelityService: Send + Sync + 'static {
    // Returns the HTTP status the service answered with
    async fn bonus(&self, user_id: &str, bonus: i64) -> Result<u16, UpstreamError>;
}

fn trim_base(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}

#[derive(Debug, Clone)]
pub struct AirlinesHubClient {
    base_url: String,
    client: ResilientClient,
}

impl AirlinesHubClient {
    pub fn new(base_url: &str, client: ResilientClient) -> Self {
        Self {
            base_url: trim_base(base_url),
            client,
        }
    }
}

#[async_trait]
impl FlightService for AirlinesHubClient {
    async fn lookup(&self, flight_code: &str, day: &str) -> Result<FlightQuote, UpstreamError> {
        let url = format!("{}/flight", self.base_url);
        let quote: FlightQuote = self
            .client
            .get_json(&url, &[("flight", flight_code), ("day", day)])
            .await?;

        tracing::debug!(flight = flight_code, day, price = quote.unit_price_usd, "flight quote received");
        Ok(quote)
    }

    async fn sell(&self, flight_code: &str, day: &str) -> Result<Uuid, UpstreamError> {
        let url = format!("{}/sell", self.base_url);
        let body = SellRequest {
            flight: flight_code.to_string(),
            day: day.to_string(),
        };

        let res: SellResponse = self.client.post_json(&url, &body).await?;
        Uuid::parse_str(&res.transaction_id).map_err(|e| {
            UpstreamError::Decode(format!(
                "invalid transaction id {:?}: {e}",
                res.transaction_id
            ))
        })
    }
}

#[derive(Debug, Clone)]
pub struct ExchangeClient {
    base_url: String,
    client: ResilientClient,
}

impl ExchangeClient {
    pub fn new(base_url: &str, client: ResilientClient) -> Self {
        Self {
            base_url: trim_base(base_url),
            client,
        }
    }
}

#[async_trait]
impl ExchangeService for ExchangeClient {
    async fn convert(&self) -> Result<f64, UpstreamError> {
        let url = format!("{}/convert", self.base_url);
        let (status, body) = self.client.get_raw(&url).await?;

        if !status.is_success() {
            // the exchange explains its own failures as {"message": ...}
            let message = serde_json::from_slice::<ExchangeErrorBody>(&body)
                .ok()
                .map(|b| b.message)
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| String::from_utf8_lossy(&body).trim().to_string());

            return Err(UpstreamError::BadResponse {
                status: status.as_u16(),
                message,
            });
        }

        let rate: ExchangeRateResponse =
            serde_json::from_slice(&body).map_err(|e| UpstreamError::Decode(e.to_string()))?;
        Ok(rate.value)
    }
}

#[derive(Debug, Clone)]
pub struct FidelityClient {
    base_url: String,
    client: ResilientClient,
}

impl FidelityClient {
    pub fn new(base_url: &str, client: ResilientClient) -> Self {
        Self {
            base_url: trim_base(base_url),
            client,
        }
    }
}

#[async_trait]
impl FidelityService for FidelityClient {
    async fn bonus(&self, user_id: &str, bonus: i64) -> Result<u16, UpstreamError> {
        let url = format!("{}/bonus", self.base_url);
        let body = BonusRequest {
            user: user_id.to_string(),
            bonus,
        };

        let status = self.client.post_for_status(&url, &body).await?;
        Ok(status.as_u16())
    }
}
