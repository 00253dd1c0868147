//! Minimal Stripe client: the one call `processAutoTopUp` needs
//! (§4.5), kept behind a trait so the worker is testable without a live
//! Stripe account.

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";

/// A card-on-file charge to create, confirmed immediately and without a
/// customer present (`off_session: true`), matching §4.5's
/// `paymentIntents.create{confirm:true, off_session:true}`.
#[derive(Clone, Debug)]
pub struct CreatePaymentIntentRequest {
    pub customer_id: String,
    /// Smallest-currency-unit amount (e.g. cents for USD).
    pub amount_cents: i64,
    pub currency: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub status: String,
}

#[derive(Debug, Error)]
pub enum StripeError {
    #[error("stripe request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("stripe returned {status}: {body}")]
    Api { status: u16, body: String },
}

/// What `processAutoTopUp` needs from Stripe. Implemented for real by
/// [`HttpStripeClient`]; tests supply a stub.
#[async_trait]
pub trait StripeClient: Send + Sync {
    async fn create_payment_intent(&self, req: &CreatePaymentIntentRequest) -> Result<PaymentIntent, StripeError>;
}

/// Talks to the real Stripe API over the account's secret key.
pub struct HttpStripeClient {
    http: reqwest::Client,
    secret_key: String,
    api_base: String,
}

impl HttpStripeClient {
    #[must_use]
    pub fn new(http: reqwest::Client, secret_key: String) -> Self {
        Self::with_base_url(http, secret_key, STRIPE_API_BASE.to_string())
    }

    /// For tests: point at a stub server instead of the real Stripe API.
    #[must_use]
    pub fn with_base_url(http: reqwest::Client, secret_key: String, api_base: String) -> Self {
        Self { http, secret_key, api_base }
    }
}

#[async_trait]
impl StripeClient for HttpStripeClient {
    async fn create_payment_intent(&self, req: &CreatePaymentIntentRequest) -> Result<PaymentIntent, StripeError> {
        // Stripe's API is form-encoded, not JSON.
        let form = [
            ("amount", req.amount_cents.to_string()),
            ("currency", req.currency.clone()),
            ("customer", req.customer_id.clone()),
            ("confirm", "true".to_string()),
            ("off_session", "true".to_string()),
        ];

        let response = self
            .http
            .post(format!("{}/payment_intents", self.api_base))
            .basic_auth(&self.secret_key, Some(""))
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StripeError::Api { status: status.as_u16(), body });
        }
        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn req() -> CreatePaymentIntentRequest {
        CreatePaymentIntentRequest {
            customer_id: "cus_1".to_string(),
            amount_cents: 1000,
            currency: "usd".to_string(),
        }
    }

    #[tokio::test]
    async fn creates_payment_intent_against_stub_server() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/payment_intents"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "pi_123",
                "status": "succeeded",
            })))
            .mount(&server)
            .await;

        let client = HttpStripeClient::with_base_url(reqwest::Client::new(), "sk_test_123".to_string(), server.uri());
        let intent = client.create_payment_intent(&req()).await.unwrap();
        assert_eq!(intent.id, "pi_123");
        assert_eq!(intent.status, "succeeded");
    }

    #[tokio::test]
    async fn non_2xx_response_is_an_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/payment_intents"))
            .respond_with(ResponseTemplate::new(402).set_body_string("card_declined"))
            .mount(&server)
            .await;

        let client = HttpStripeClient::with_base_url(reqwest::Client::new(), "sk_test_123".to_string(), server.uri());
        let err = client.create_payment_intent(&req()).await.unwrap_err();
        assert_matches::assert_matches!(err, StripeError::Api { status: 402, .. });
    }
}
