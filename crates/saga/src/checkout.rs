//! Checkout saga step names.

/// The saga type identifier for checkout.
pub const SAGA_TYPE: &str = "Checkout";

/// Step name: open a gateway order for the priced cart.
pub const STEP_OPEN_PAYMENT: &str = "open_payment";

/// Step name: capture the approved payment.
pub const STEP_CAPTURE_PAYMENT: &str = "capture_payment";

/// Step name: check the captured amount against the cart total.
pub const STEP_VERIFY_AMOUNT: &str = "verify_amount";

/// Step name: persist the order and its items.
pub const STEP_PERSIST_ORDER: &str = "persist_order";

/// Step name: record the capture on an existing order.
pub const STEP_LINK_CAPTURE: &str = "link_capture";

/// Step name: mark the buyer's abandoned cart recovered.
pub const STEP_RECOVER_CART: &str = "recover_cart";

/// Step name: send the order emails.
pub const STEP_NOTIFY: &str = "notify_order";
