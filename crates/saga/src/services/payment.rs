//! Payment gateway trait, the PayPal REST client and an in-memory gateway.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;
use tokio::sync::Mutex;

const SANDBOX_BASE_URL: &str = "https://api-m.sandbox.paypal.com";
const LIVE_BASE_URL: &str = "https://api-m.paypal.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);
const BRAND_NAME: &str = "Banners On The Fly";
const ORDER_DESCRIPTION: &str = "Custom Banner Order - Banners On The Fly";

/// Which family of gateway failure a response belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureFamily {
    /// The order id or payload was rejected.
    MalformedRequest,
    /// Credentials or environment are wrong.
    Authorization,
    /// Anything else. Retrying with the same idempotency key is safe.
    Transient,
}

impl FailureFamily {
    /// Classifies a failure by the gateway's error `name`.
    pub fn classify(name: &str) -> Self {
        let name = name.to_ascii_uppercase();
        if name.starts_with("INVALID_") || name.starts_with("UNPROCESSABLE_") {
            FailureFamily::MalformedRequest
        } else if name.contains("AUTHORIZ") || name == "PERMISSION_DENIED" {
            FailureFamily::Authorization
        } else {
            FailureFamily::Transient
        }
    }

    /// Operator hint returned alongside the error.
    pub fn hint(&self) -> &'static str {
        match self {
            FailureFamily::MalformedRequest => "Invalid orderID or payload.",
            FailureFamily::Authorization => "Check client/secret and PAYPAL_ENV vs client type.",
            FailureFamily::Transient => "Transient gateway error. Safe to retry.",
        }
    }
}

/// Errors raised while capturing a payment.
#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("gateway order id is required")]
    MissingOrderId,

    #[error("payment gateway credentials are not configured")]
    MissingCredentials,

    #[error("order amount must be positive, got {0} cents")]
    InvalidAmount(i64),

    /// The access token request failed.
    #[error("gateway token request failed with status {status}")]
    Token { status: u16, details: Value },

    /// The gateway refused or failed the capture.
    #[error("capture failed with status {status}: {}", .family.hint())]
    CaptureFailed {
        status: u16,
        family: FailureFamily,
        details: Value,
    },

    /// The gateway refused to create an order.
    #[error("gateway order creation failed with status {status}")]
    CreateFailed { status: u16, details: Value },

    /// The gateway reported success without a capture id.
    #[error("gateway returned a completed response without a capture id")]
    IncompleteCapture { details: Value },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl PaymentError {
    /// Machine-readable code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            PaymentError::MissingOrderId => "MISSING_ORDER_ID",
            PaymentError::MissingCredentials => "MISSING_PAYPAL_CREDS",
            PaymentError::InvalidAmount(_) => "INVALID_AMOUNT",
            PaymentError::CreateFailed { .. } => "PAYPAL_CREATE_FAILED",
            PaymentError::Token { .. } => "PAYPAL_TOKEN_ERROR",
            PaymentError::CaptureFailed { .. } | PaymentError::Http(_) => "PAYPAL_CAPTURE_FAILED",
            PaymentError::IncompleteCapture { .. } => "INCOMPLETE_CAPTURE",
        }
    }

    pub fn hint(&self) -> Option<&'static str> {
        match self {
            PaymentError::MissingOrderId => Some("Send the gateway orderID."),
            PaymentError::MissingCredentials => {
                Some("Set PAYPAL_CLIENT_ID and PAYPAL_CLIENT_SECRET.")
            }
            PaymentError::InvalidAmount(_) => Some("The cart must price to more than zero."),
            PaymentError::Token { .. } => Some(FailureFamily::Authorization.hint()),
            PaymentError::CreateFailed { details, .. } => Some(
                FailureFamily::classify(
                    details.get("name").and_then(Value::as_str).unwrap_or(""),
                )
                .hint(),
            ),
            PaymentError::CaptureFailed { family, .. } => Some(family.hint()),
            PaymentError::IncompleteCapture { .. } => {
                Some("The gateway did not confirm a capture. Check the order in the gateway dashboard.")
            }
            PaymentError::Http(_) => Some(FailureFamily::Transient.hint()),
        }
    }

    /// HTTP status mirroring the gateway's where one exists.
    pub fn status(&self) -> u16 {
        match self {
            PaymentError::MissingOrderId | PaymentError::InvalidAmount(_) => 400,
            PaymentError::MissingCredentials => 500,
            PaymentError::Token { status, .. } | PaymentError::CaptureFailed { status, .. } => {
                *status
            }
            PaymentError::CreateFailed { .. }
            | PaymentError::IncompleteCapture { .. }
            | PaymentError::Http(_) => 502,
        }
    }

    /// Raw provider payload, when the gateway sent one.
    pub fn details(&self) -> Option<&Value> {
        match self {
            PaymentError::Token { details, .. }
            | PaymentError::CreateFailed { details, .. }
            | PaymentError::CaptureFailed { details, .. }
            | PaymentError::IncompleteCapture { details } => Some(details),
            _ => None,
        }
    }
}

/// A capture response as the gateway returned it.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayReply {
    pub status: u16,
    pub body: Value,
}

impl GatewayReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// An order to open at the gateway for the buyer to approve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewGatewayOrder {
    pub amount_cents: i64,
    pub currency: String,
    /// Our reference for the purchase unit, if any.
    pub reference: Option<String>,
}

/// An order the gateway has opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GatewayOrder {
    pub id: String,
    pub status: String,
}

/// Formats cents as the gateway's decimal amount string, e.g. `"33.56"`.
pub fn format_amount(amount_cents: i64) -> String {
    format!("{}.{:02}", amount_cents / 100, amount_cents % 100)
}

/// A payment gateway that opens orders and captures approved ones.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Opens an order with `intent: CAPTURE` for the given amount.
    async fn create_order(&self, order: &NewGatewayOrder) -> Result<GatewayOrder, PaymentError>;

    /// Captures an approved gateway order.
    ///
    /// Repeating a call with the same idempotency key must converge on the
    /// same capture.
    async fn capture_order(
        &self,
        gateway_order_id: &str,
        idempotency_key: &str,
    ) -> Result<GatewayReply, PaymentError>;
}

#[async_trait]
impl<T: PaymentGateway + ?Sized> PaymentGateway for Arc<T> {
    async fn create_order(&self, order: &NewGatewayOrder) -> Result<GatewayOrder, PaymentError> {
        (**self).create_order(order).await
    }

    async fn capture_order(
        &self,
        gateway_order_id: &str,
        idempotency_key: &str,
    ) -> Result<GatewayReply, PaymentError> {
        (**self)
            .capture_order(gateway_order_id, idempotency_key)
            .await
    }
}

/// Which PayPal environment to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PayPalEnv {
    #[default]
    Sandbox,
    Live,
}

impl PayPalEnv {
    /// Anything other than `live` selects the sandbox.
    pub fn parse(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("live") {
            PayPalEnv::Live
        } else {
            PayPalEnv::Sandbox
        }
    }

    pub fn base_url(&self) -> &'static str {
        match self {
            PayPalEnv::Sandbox => SANDBOX_BASE_URL,
            PayPalEnv::Live => LIVE_BASE_URL,
        }
    }
}

/// PayPal client configuration.
#[derive(Debug, Clone, Default)]
pub struct PayPalConfig {
    pub env: PayPalEnv,
    pub client_id: Option<String>,
    pub client_secret: Option<SecretString>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// PayPal Orders v2 client.
///
/// Every call obtains a fresh client-credentials token; tokens are
/// short-lived and captures are rare enough not to cache them.
#[derive(Clone)]
pub struct PayPalClient {
    client: reqwest::Client,
    base_url: String,
    credentials: Option<(String, SecretString)>,
}

impl PayPalClient {
    /// Creates a client. Missing credentials surface on the first capture.
    pub fn new(config: PayPalConfig) -> Result<Self, PaymentError> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        let credentials = match (config.client_id, config.client_secret) {
            (Some(id), Some(secret)) if !id.trim().is_empty() => Some((id, secret)),
            _ => None,
        };
        Ok(Self {
            client,
            base_url: config.env.base_url().to_string(),
            credentials,
        })
    }

    /// Points the client at another host, e.g. a local gateway stub.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn is_configured(&self) -> bool {
        self.credentials.is_some()
    }

    async fn access_token(&self) -> Result<SecretString, PaymentError> {
        let (client_id, secret) = self
            .credentials
            .as_ref()
            .ok_or(PaymentError::MissingCredentials)?;

        let response = self
            .client
            .post(format!("{}/v1/oauth2/token", self.base_url))
            .basic_auth(client_id, Some(secret.expose_secret()))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        let status = response.status().as_u16();
        let body: Value = response.json().await.unwrap_or(Value::Null);
        if !(200..300).contains(&status) {
            return Err(PaymentError::Token {
                status,
                details: body,
            });
        }

        let token: TokenResponse =
            serde_json::from_value(body.clone()).map_err(|_| PaymentError::Token {
                status,
                details: body,
            })?;
        Ok(SecretString::from(token.access_token))
    }
}

#[async_trait]
impl PaymentGateway for PayPalClient {
    #[tracing::instrument(skip(self))]
    async fn create_order(&self, order: &NewGatewayOrder) -> Result<GatewayOrder, PaymentError> {
        if order.amount_cents <= 0 {
            return Err(PaymentError::InvalidAmount(order.amount_cents));
        }
        let token = self.access_token().await?;

        let mut unit = json!({
            "amount": {
                "currency_code": order.currency,
                "value": format_amount(order.amount_cents),
            },
            "description": ORDER_DESCRIPTION,
        });
        if let Some(reference) = &order.reference {
            unit["reference_id"] = json!(reference);
        }
        let body = json!({
            "intent": "CAPTURE",
            "purchase_units": [unit],
            "application_context": {
                "brand_name": BRAND_NAME,
                "user_action": "PAY_NOW",
                "shipping_preference": "GET_FROM_FILE",
            },
        });

        let response = self
            .client
            .post(format!("{}/v2/checkout/orders", self.base_url))
            .bearer_auth(token.expose_secret())
            .json(&body)
            .send()
            .await?;

        let status = response.status().as_u16();
        let body: Value = response.json().await.unwrap_or(Value::Null);
        if !(200..300).contains(&status) {
            return Err(PaymentError::CreateFailed {
                status,
                details: body,
            });
        }

        let created = body
            .get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(|id| GatewayOrder {
                id: id.to_string(),
                status: body
                    .get("status")
                    .and_then(Value::as_str)
                    .unwrap_or("CREATED")
                    .to_string(),
            });
        created.ok_or(PaymentError::CreateFailed {
            status: 502,
            details: body,
        })
    }

    #[tracing::instrument(skip(self))]
    async fn capture_order(
        &self,
        gateway_order_id: &str,
        idempotency_key: &str,
    ) -> Result<GatewayReply, PaymentError> {
        let token = self.access_token().await?;

        let response = self
            .client
            .post(format!(
                "{}/v2/checkout/orders/{gateway_order_id}/capture",
                self.base_url
            ))
            .bearer_auth(token.expose_secret())
            .header("PayPal-Request-Id", idempotency_key)
            .header("Content-Type", "application/json")
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.json().await.unwrap_or(Value::Null);
        Ok(GatewayReply { status, body })
    }
}

#[derive(Debug, Default)]
struct InMemoryGatewayState {
    /// Replies already given, by idempotency key.
    replies: HashMap<String, GatewayReply>,
    /// Amounts approved per gateway order.
    approved: HashMap<String, (i64, Option<String>)>,
    /// Replies to hand out before capturing normally.
    scripted: Vec<GatewayReply>,
}

/// In-memory gateway for tests and local runs.
///
/// Captures converge per idempotency key the way the real gateway does.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentGateway {
    state: Arc<Mutex<InMemoryGatewayState>>,
    fail_on_token: Arc<AtomicBool>,
    next_id: Arc<AtomicU32>,
    next_order: Arc<AtomicU32>,
    calls: Arc<AtomicU32>,
}

impl InMemoryPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Approves a gateway order for the given amount and payer.
    pub async fn approve(
        &self,
        gateway_order_id: impl Into<String>,
        amount_cents: i64,
        payer_email: Option<&str>,
    ) {
        self.state.lock().await.approved.insert(
            gateway_order_id.into(),
            (amount_cents, payer_email.map(str::to_string)),
        );
    }

    /// Returns `reply` for the next capture instead of capturing.
    pub async fn script_reply(&self, status: u16, body: Value) {
        self.state
            .lock()
            .await
            .scripted
            .push(GatewayReply { status, body });
    }

    /// Makes the token step fail.
    pub fn set_fail_on_token(&self, fail: bool) {
        self.fail_on_token.store(fail, Ordering::SeqCst);
    }

    /// Number of capture calls received.
    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Amount an opened or approved order will capture.
    pub async fn approved_amount(&self, gateway_order_id: &str) -> Option<i64> {
        self.state
            .lock()
            .await
            .approved
            .get(gateway_order_id)
            .map(|(amount, _)| *amount)
    }

    /// Number of distinct captures performed.
    pub async fn capture_count(&self) -> usize {
        self.state
            .lock()
            .await
            .replies
            .values()
            .filter(|reply| reply.is_success())
            .count()
    }
}

#[async_trait]
impl PaymentGateway for InMemoryPaymentGateway {
    /// Opened orders count as approved without a payer email.
    async fn create_order(&self, order: &NewGatewayOrder) -> Result<GatewayOrder, PaymentError> {
        if order.amount_cents <= 0 {
            return Err(PaymentError::InvalidAmount(order.amount_cents));
        }
        if self.fail_on_token.load(Ordering::SeqCst) {
            return Err(PaymentError::Token {
                status: 401,
                details: json!({"error": "invalid_client"}),
            });
        }

        let n = self.next_order.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("PP-ORDER-{n:06}");
        self.approve(id.clone(), order.amount_cents, None).await;
        Ok(GatewayOrder {
            id,
            status: "CREATED".to_string(),
        })
    }

    async fn capture_order(
        &self,
        gateway_order_id: &str,
        idempotency_key: &str,
    ) -> Result<GatewayReply, PaymentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.fail_on_token.load(Ordering::SeqCst) {
            return Err(PaymentError::Token {
                status: 401,
                details: json!({"error": "invalid_client"}),
            });
        }

        let mut state = self.state.lock().await;
        if !state.scripted.is_empty() {
            return Ok(state.scripted.remove(0));
        }
        if let Some(reply) = state.replies.get(idempotency_key) {
            return Ok(reply.clone());
        }

        let reply = match state.approved.get(gateway_order_id).cloned() {
            Some((amount_cents, payer_email)) => {
                let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
                completed_body(gateway_order_id, &format!("CAP-{n:06}"), amount_cents, payer_email)
            }
            None => GatewayReply {
                status: 404,
                body: json!({
                    "name": "RESOURCE_NOT_FOUND",
                    "message": "The specified resource does not exist.",
                }),
            },
        };
        state
            .replies
            .insert(idempotency_key.to_string(), reply.clone());
        Ok(reply)
    }
}

fn completed_body(
    gateway_order_id: &str,
    capture_id: &str,
    amount_cents: i64,
    payer_email: Option<String>,
) -> GatewayReply {
    let value = format_amount(amount_cents);
    GatewayReply {
        status: 201,
        body: json!({
            "id": gateway_order_id,
            "status": "COMPLETED",
            "payer": {
                "email_address": payer_email,
                "name": {"given_name": "Test", "surname": "Buyer"},
            },
            "purchase_units": [{
                "payments": {
                    "captures": [{
                        "id": capture_id,
                        "status": "COMPLETED",
                        "amount": {"currency_code": "USD", "value": value},
                    }]
                }
            }],
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_failure_names() {
        assert_eq!(
            FailureFamily::classify("INVALID_RESOURCE_ID"),
            FailureFamily::MalformedRequest
        );
        assert_eq!(
            FailureFamily::classify("UNPROCESSABLE_ENTITY"),
            FailureFamily::MalformedRequest
        );
        assert_eq!(
            FailureFamily::classify("NOT_AUTHORIZED"),
            FailureFamily::Authorization
        );
        assert_eq!(
            FailureFamily::classify("AUTHORIZATION_ERROR"),
            FailureFamily::Authorization
        );
        assert_eq!(
            FailureFamily::classify("PERMISSION_DENIED"),
            FailureFamily::Authorization
        );
        assert_eq!(
            FailureFamily::classify("INTERNAL_SERVER_ERROR"),
            FailureFamily::Transient
        );
        assert_eq!(FailureFamily::classify(""), FailureFamily::Transient);
    }

    #[test]
    fn error_codes_and_hints() {
        assert_eq!(PaymentError::MissingCredentials.code(), "MISSING_PAYPAL_CREDS");
        let err = PaymentError::CaptureFailed {
            status: 422,
            family: FailureFamily::MalformedRequest,
            details: json!({"name": "UNPROCESSABLE_ENTITY"}),
        };
        assert_eq!(err.code(), "PAYPAL_CAPTURE_FAILED");
        assert_eq!(err.hint(), Some("Invalid orderID or payload."));
        assert_eq!(err.status(), 422);
        assert!(err.details().is_some());
    }

    #[test]
    fn env_parsing() {
        assert_eq!(PayPalEnv::parse("LIVE"), PayPalEnv::Live);
        assert_eq!(PayPalEnv::parse("sandbox"), PayPalEnv::Sandbox);
        assert_eq!(PayPalEnv::parse("anything"), PayPalEnv::Sandbox);
        assert_eq!(PayPalEnv::Live.base_url(), "https://api-m.paypal.com");
    }

    #[tokio::test]
    async fn unconfigured_client_reports_missing_credentials() {
        let client = PayPalClient::new(PayPalConfig::default()).unwrap();
        assert!(!client.is_configured());

        let err = client.capture_order("ORDER-1", "cap_ORDER-1").await.unwrap_err();
        assert!(matches!(err, PaymentError::MissingCredentials));
    }

    #[tokio::test]
    async fn in_memory_capture_converges_per_key() {
        let gateway = InMemoryPaymentGateway::new();
        gateway.approve("ORDER-1", 3356, Some("payer@banners.test")).await;

        let first = gateway.capture_order("ORDER-1", "cap_ORDER-1").await.unwrap();
        let second = gateway.capture_order("ORDER-1", "cap_ORDER-1").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.status, 201);
        assert_eq!(gateway.call_count(), 2);
        assert_eq!(gateway.capture_count().await, 1);
    }

    #[test]
    fn formats_amounts() {
        assert_eq!(format_amount(3356), "33.56");
        assert_eq!(format_amount(2000), "20.00");
        assert_eq!(format_amount(5), "0.05");
    }

    #[tokio::test]
    async fn unconfigured_client_cannot_open_orders() {
        let client = PayPalClient::new(PayPalConfig::default()).unwrap();
        let order = NewGatewayOrder {
            amount_cents: 3356,
            currency: "USD".into(),
            reference: None,
        };
        let err = client.create_order(&order).await.unwrap_err();
        assert!(matches!(err, PaymentError::MissingCredentials));

        let free = NewGatewayOrder {
            amount_cents: 0,
            ..order
        };
        let err = client.create_order(&free).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_AMOUNT");
        assert_eq!(err.status(), 400);
    }

    #[tokio::test]
    async fn in_memory_opened_order_captures_its_amount() {
        let gateway = InMemoryPaymentGateway::new();
        let opened = gateway
            .create_order(&NewGatewayOrder {
                amount_cents: 3356,
                currency: "USD".into(),
                reference: Some("cart-1".into()),
            })
            .await
            .unwrap();
        assert_eq!(opened.id, "PP-ORDER-000001");
        assert_eq!(gateway.approved_amount(&opened.id).await, Some(3356));

        let reply = gateway
            .capture_order(&opened.id, "cap_PP-ORDER-000001")
            .await
            .unwrap();
        assert_eq!(
            reply.body["purchase_units"][0]["payments"]["captures"][0]["amount"]["value"],
            "33.56"
        );
    }

    #[tokio::test]
    async fn in_memory_unknown_order_is_not_found() {
        let gateway = InMemoryPaymentGateway::new();
        let reply = gateway.capture_order("NOPE", "cap_NOPE").await.unwrap();
        assert_eq!(reply.status, 404);
        assert!(!reply.is_success());
    }
}
