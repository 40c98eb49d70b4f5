use std::collections::HashMap;

use anyhow::Context;
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use sha2::Sha256;

use super::{CheckoutRequest, CheckoutSession, PaymentProvider};

type HmacSha256 = Hmac<Sha256>;

const API_BASE: &str = "https://api.stripe.com/v1";

/// Maximum age of a signed webhook before it is treated as a replay.
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Checkout Sessions client for one-off payments.
pub struct StripeClient {
    http: reqwest::Client,
    secret_key: String,
}

impl StripeClient {
    pub fn new(secret_key: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            secret_key,
        }
    }

    async fn ensure_success(resp: reqwest::Response, context: &str) -> anyhow::Result<reqwest::Response> {
        if resp.status().is_success() {
            return Ok(resp);
        }

        let status = resp.status();
        let request_id = resp
            .headers()
            .get("request-id")
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());
        let body = resp.text().await.unwrap_or_default();

        let message = serde_json::from_str::<StripeErrorEnvelope>(&body)
            .ok()
            .and_then(|envelope| envelope.error.message);

        tracing::error!(
            status = %status,
            stripe_request_id = ?request_id,
            stripe_error_message = ?message,
            context = %context,
            "stripe api request failed"
        );

        anyhow::bail!("Stripe API request failed: {context} (status {status})");
    }
}

#[derive(Debug, Deserialize)]
struct StripeErrorEnvelope {
    error: StripeErrorDetails,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetails {
    message: Option<String>,
}

/// Form fields for `POST /v1/checkout/sessions`.
pub fn checkout_form(request: &CheckoutRequest) -> Vec<(String, String)> {
    let mut body: Vec<(String, String)> = vec![
        ("mode".to_string(), "payment".to_string()),
        ("success_url".to_string(), request.success_url.clone()),
        ("cancel_url".to_string(), request.cancel_url.clone()),
        ("customer_email".to_string(), request.customer_email.clone()),
        ("client_reference_id".to_string(), request.booking_id.clone()),
        ("metadata[booking_id]".to_string(), request.booking_id.clone()),
        ("billing_address_collection".to_string(), "required".to_string()),
        ("customer_creation".to_string(), "always".to_string()),
        ("expires_at".to_string(), request.expires_at.to_string()),
        ("line_items[0][quantity]".to_string(), "1".to_string()),
    ];

    match &request.provider_price_id {
        Some(price_id) => {
            body.push(("line_items[0][price]".to_string(), price_id.clone()));
        }
        None => {
            body.push(("line_items[0][price_data][currency]".to_string(), request.currency.clone()));
            body.push((
                "line_items[0][price_data][unit_amount]".to_string(),
                request.amount_cents.to_string(),
            ));
            body.push((
                "line_items[0][price_data][product_data][name]".to_string(),
                request.item_name.clone(),
            ));
            if let Some(description) = request.item_description.as_ref().filter(|d| !d.is_empty()) {
                body.push((
                    "line_items[0][price_data][product_data][description]".to_string(),
                    description.clone(),
                ));
            }
        }
    }

    body
}

#[async_trait]
impl PaymentProvider for StripeClient {
    async fn create_checkout_session(&self, request: &CheckoutRequest) -> anyhow::Result<CheckoutSession> {
        anyhow::ensure!(!self.secret_key.is_empty(), "STRIPE_SECRET_KEY is not configured");

        let resp = self
            .http
            .post(format!("{API_BASE}/checkout/sessions"))
            .header(AUTHORIZATION, format!("Bearer {}", self.secret_key))
            .form(&checkout_form(request))
            .send()
            .await
            .context("failed to call Stripe API")?;
        let resp = Self::ensure_success(resp, "create checkout session").await?;

        #[derive(Deserialize)]
        struct CheckoutResp {
            id: String,
            url: Option<String>,
        }

        let parsed: CheckoutResp = resp.json().await.context("failed to parse Stripe response")?;
        let url = parsed
            .url
            .ok_or_else(|| anyhow::anyhow!("Stripe Checkout session URL is missing"))?;
        Ok(CheckoutSession { id: parsed.id, url })
    }
}

// ── Webhooks ──

#[derive(Debug, Deserialize)]
pub struct StripeEvent {
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub type_: String,
    pub data: StripeEventData,
}

#[derive(Debug, Deserialize)]
pub struct StripeEventData {
    pub object: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct StripeCheckoutSession {
    pub id: String,
    pub payment_intent: Option<String>,
    pub payment_status: Option<String>,
    pub client_reference_id: Option<String>,
    pub metadata: Option<HashMap<String, String>>,
}

impl StripeCheckoutSession {
    fn booking_id(&self) -> Option<String> {
        self.client_reference_id.clone().or_else(|| {
            self.metadata
                .as_ref()
                .and_then(|m| m.get("booking_id").cloned())
        })
    }
}

/// Provider-neutral outcome of a payment callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentEvent {
    Succeeded {
        session_id: String,
        booking_id: Option<String>,
        payment_intent_id: Option<String>,
    },
    Failed {
        session_id: String,
        booking_id: Option<String>,
    },
    Ignored {
        kind: String,
    },
}

/// Verifies a `Stripe-Signature` header (`t=...,v1=...`) against the raw body.
pub fn verify_signature(secret: &str, payload: &[u8], header: &str, now_ts: i64) -> anyhow::Result<()> {
    let mut timestamp: Option<&str> = None;
    let mut signatures: Vec<&str> = vec![];

    for part in header.split(',') {
        let part = part.trim();
        if let Some(rest) = part.strip_prefix("t=") {
            timestamp = Some(rest);
        } else if let Some(rest) = part.strip_prefix("v1=") {
            signatures.push(rest);
        }
    }

    let timestamp = timestamp.ok_or_else(|| anyhow::anyhow!("missing timestamp in stripe-signature"))?;
    anyhow::ensure!(!signatures.is_empty(), "missing v1 in stripe-signature");

    let ts: i64 = timestamp.parse().context("invalid timestamp in stripe-signature")?;
    anyhow::ensure!(
        (now_ts - ts).abs() <= SIGNATURE_TOLERANCE_SECS,
        "stripe-signature timestamp outside tolerance"
    );

    for signature in signatures {
        let Ok(provided) = hex::decode(signature) else {
            continue;
        };
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())?;
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(payload);
        if mac.verify_slice(&provided).is_ok() {
            return Ok(());
        }
    }

    anyhow::bail!("invalid webhook signature")
}

/// Computes the `v1` signature for a payload. Used to sign test fixtures.
pub fn sign_payload(secret: &str, payload: &[u8], timestamp: i64) -> anyhow::Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

pub fn parse_event(payload: &[u8]) -> anyhow::Result<PaymentEvent> {
    let event: StripeEvent = serde_json::from_slice(payload).context("malformed stripe event")?;

    let session = || -> anyhow::Result<StripeCheckoutSession> {
        serde_json::from_value(event.data.object.clone()).context("event object is not a checkout session")
    };

    Ok(match event.type_.as_str() {
        "checkout.session.completed" => {
            let session = session()?;
            match session.payment_status.as_deref() {
                Some("paid") | Some("no_payment_required") => PaymentEvent::Succeeded {
                    booking_id: session.booking_id(),
                    payment_intent_id: session.payment_intent,
                    session_id: session.id,
                },
                // Delayed payment methods report the outcome in a later event.
                _ => PaymentEvent::Ignored {
                    kind: format!("{} (unpaid)", event.type_),
                },
            }
        }
        "checkout.session.async_payment_succeeded" => {
            let session = session()?;
            PaymentEvent::Succeeded {
                booking_id: session.booking_id(),
                payment_intent_id: session.payment_intent,
                session_id: session.id,
            }
        }
        "checkout.session.expired" | "checkout.session.async_payment_failed" => {
            let session = session()?;
            PaymentEvent::Failed {
                booking_id: session.booking_id(),
                session_id: session.id,
            }
        }
        other => PaymentEvent::Ignored {
            kind: other.to_string(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(price_id: Option<&str>) -> CheckoutRequest {
        CheckoutRequest {
            booking_id: "bk-1".to_string(),
            customer_email: "alice@example.com".to_string(),
            item_name: "Premium Mobile Detail".to_string(),
            item_description: Some("Full detail".to_string()),
            amount_cents: 7500,
            currency: "usd".to_string(),
            provider_price_id: price_id.map(str::to_string),
            success_url: "https://example.com/booking/success?booking_id=bk-1".to_string(),
            cancel_url: "https://example.com/booking/cancel?booking_id=bk-1".to_string(),
            expires_at: 1_700_001_800,
        }
    }

    fn field<'a>(form: &'a [(String, String)], key: &str) -> Option<&'a str> {
        form.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    #[test]
    fn test_checkout_form_builds_inline_price() {
        let form = checkout_form(&request(None));
        assert_eq!(field(&form, "mode"), Some("payment"));
        assert_eq!(field(&form, "client_reference_id"), Some("bk-1"));
        assert_eq!(field(&form, "line_items[0][price_data][unit_amount]"), Some("7500"));
        assert_eq!(field(&form, "line_items[0][price_data][currency]"), Some("usd"));
        assert_eq!(field(&form, "line_items[0][price]"), None);
    }

    #[test]
    fn test_checkout_form_sets_session_expiry() {
        let form = checkout_form(&request(None));
        assert_eq!(field(&form, "expires_at"), Some("1700001800"));
    }

    #[test]
    fn test_checkout_form_prefers_price_id() {
        let form = checkout_form(&request(Some("price_123")));
        assert_eq!(field(&form, "line_items[0][price]"), Some("price_123"));
        assert_eq!(field(&form, "line_items[0][price_data][unit_amount]"), None);
    }

    #[test]
    fn test_signature_round_trip() {
        let payload = br#"{"type":"ping"}"#;
        let sig = sign_payload("whsec_test", payload, 1_700_000_000).unwrap();
        let header = format!("t=1700000000,v1={sig}");

        assert!(verify_signature("whsec_test", payload, &header, 1_700_000_010).is_ok());
        assert!(verify_signature("whsec_other", payload, &header, 1_700_000_010).is_err());
        assert!(verify_signature("whsec_test", br#"{"type":"pong"}"#, &header, 1_700_000_010).is_err());
    }

    #[test]
    fn test_signature_rejects_stale_timestamp() {
        let payload = b"{}";
        let sig = sign_payload("whsec_test", payload, 1_700_000_000).unwrap();
        let header = format!("t=1700000000,v1={sig}");
        assert!(verify_signature("whsec_test", payload, &header, 1_700_000_000 + 301).is_err());
    }

    #[test]
    fn test_signature_requires_parts() {
        assert!(verify_signature("s", b"{}", "v1=abcd", 0).is_err());
        assert!(verify_signature("s", b"{}", "t=0", 0).is_err());
    }

    #[test]
    fn test_parse_completed_paid() {
        let payload = br#"{"id":"evt_1","type":"checkout.session.completed","data":{"object":{"id":"cs_1","payment_status":"paid","payment_intent":"pi_1","client_reference_id":"bk-1"}}}"#;
        assert_eq!(
            parse_event(payload).unwrap(),
            PaymentEvent::Succeeded {
                session_id: "cs_1".to_string(),
                booking_id: Some("bk-1".to_string()),
                payment_intent_id: Some("pi_1".to_string()),
            }
        );
    }

    #[test]
    fn test_parse_completed_unpaid_is_ignored() {
        let payload = br#"{"type":"checkout.session.completed","data":{"object":{"id":"cs_1","payment_status":"unpaid"}}}"#;
        assert!(matches!(parse_event(payload).unwrap(), PaymentEvent::Ignored { .. }));
    }

    #[test]
    fn test_parse_expired_uses_metadata() {
        let payload = br#"{"type":"checkout.session.expired","data":{"object":{"id":"cs_2","metadata":{"booking_id":"bk-2"}}}}"#;
        assert_eq!(
            parse_event(payload).unwrap(),
            PaymentEvent::Failed {
                session_id: "cs_2".to_string(),
                booking_id: Some("bk-2".to_string()),
            }
        );
    }

    #[test]
    fn test_parse_unrelated_event() {
        let payload = br#"{"type":"customer.created","data":{"object":{"id":"cus_1"}}}"#;
        assert_eq!(
            parse_event(payload).unwrap(),
            PaymentEvent::Ignored {
                kind: "customer.created".to_string()
            }
        );
    }
}
