//! HTTP-specific constants.

/// Header carrying a version 1 payment proof (client → server).
pub const X_PAYMENT_HEADER: &str = "x-payment";

/// Header carrying a version 2 payment proof (client → server).
pub const PAYMENT_SIGNATURE_HEADER: &str = "payment-signature";

/// Header carrying a base64 version 2 payment challenge (server → client).
pub const PAYMENT_REQUIRED_HEADER: &str = "payment-required";

/// Header carrying the settlement receipt of a version 1 payment (server → client).
pub const X_PAYMENT_RESPONSE_HEADER: &str = "x-payment-response";

/// Header carrying the settlement receipt of a version 2 payment (server → client).
pub const PAYMENT_RESPONSE_HEADER: &str = "payment-response";
