//! External service traits and their implementations.

pub mod email;
pub mod payment;

pub use email::{
    EmailError, EmailProvider, InMemoryEmailProvider, OutgoingEmail, ResendClient, SentEmail,
};
pub use payment::{
    FailureFamily, GatewayOrder, GatewayReply, InMemoryPaymentGateway, NewGatewayOrder,
    PayPalClient, PayPalConfig, PayPalEnv, PaymentError, PaymentGateway, format_amount,
};
