//! Stripe Checkout Sessions client.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::{CheckoutSession, PaymentError, PaymentGateway, SessionRequest};

const DEFAULT_BASE_URL: &str = "https://api.stripe.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct StripeGateway {
    client: reqwest::Client,
    secret_key: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    id: String,
    url: Option<String>,
}

impl StripeGateway {
    pub fn new(secret_key: impl Into<String>) -> Self {
        Self::with_base_url(secret_key, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(secret_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            secret_key: secret_key.into(),
            base_url: base_url.into(),
        }
    }

    /// Stripe's form encoding addresses nested fields with bracketed
    /// paths, e.g. `line_items[0][price_data][unit_amount]`.
    fn form_pairs(request: &SessionRequest) -> Vec<(String, String)> {
        let mut pairs = vec![
            ("mode".to_string(), "payment".to_string()),
            ("customer_email".to_string(), request.customer_email.clone()),
            ("success_url".to_string(), request.success_url.clone()),
            ("cancel_url".to_string(), request.cancel_url.clone()),
            (
                "metadata[booking_id]".to_string(),
                request.booking_id.clone(),
            ),
            ("metadata[tenant_id]".to_string(), request.tenant_id.clone()),
        ];
        for (i, item) in request.line_items.iter().enumerate() {
            pairs.push((format!("line_items[{i}][quantity]"), item.quantity.to_string()));
            pairs.push((
                format!("line_items[{i}][price_data][currency]"),
                request.currency.clone(),
            ));
            pairs.push((
                format!("line_items[{i}][price_data][unit_amount]"),
                item.unit_amount_minor.to_string(),
            ));
            pairs.push((
                format!("line_items[{i}][price_data][product_data][name]"),
                item.name.clone(),
            ));
            if let Some(image) = &item.image_url {
                pairs.push((
                    format!("line_items[{i}][price_data][product_data][images][0]"),
                    image.clone(),
                ));
            }
        }
        pairs
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_session(&self, request: &SessionRequest) -> Result<CheckoutSession, PaymentError> {
        let url = format!("{}/v1/checkout/sessions", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.secret_key)
            .form(&Self::form_pairs(request))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "checkout session rejected");
            return Err(PaymentError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let session: SessionResponse = response.json().await?;
        let url = session.url.ok_or(PaymentError::MissingUrl)?;
        tracing::debug!(session_id = %session.id, "checkout session created");
        Ok(CheckoutSession {
            id: session.id,
            url,
        })
    }
}
