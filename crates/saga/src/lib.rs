//! Checkout orchestration for the banner storefront.
//!
//! Before the buyer approves a payment, the cart is priced on the server
//! and a gateway order is opened for that total. A checkout then captures
//! the payment, verifies the captured amount and persists the order.
//! Those are core steps: any failure aborts the checkout. Afterwards two best-effort steps run on their own:
//!
//! 1. Recover the customer's abandoned cart
//! 2. Send the order confirmation and admin notification
//!
//! A failing best-effort step is logged and counted but never undoes the
//! order.

pub mod capture;
pub mod checkout;
pub mod coordinator;
pub mod error;
pub mod notifications;
pub mod recovery;
pub mod services;
pub mod state;
pub mod templates;

pub use capture::{CaptureReconciler, CaptureRecord, default_idempotency_key, interpret_reply};
pub use coordinator::{
    CheckoutOutcome, CheckoutRequest, CheckoutSaga, LinkOutcome, PaymentOrder,
};
pub use error::SagaError;
pub use notifications::{
    AdminOutcome, NotificationDispatcher, NotificationError, NotificationSettings, NotifyOutcome,
    RetryPolicy,
};
pub use recovery::{AbandonedCartMatcher, RecoveryOutcome};
pub use services::{
    EmailError, EmailProvider, FailureFamily, GatewayOrder, GatewayReply, InMemoryEmailProvider,
    InMemoryPaymentGateway, NewGatewayOrder, OutgoingEmail, PayPalClient, PayPalConfig, PayPalEnv,
    PaymentError, PaymentGateway, ResendClient, SentEmail,
};
pub use state::{StepReport, StepStatus};
