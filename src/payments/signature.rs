use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Lowercase hex HMAC-SHA256 of `message`.
pub fn sign(secret: &str, message: &[u8]) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(message);
    Some(hex::encode(mac.finalize().into_bytes()))
}

fn matches(expected: Option<String>, supplied: &str) -> bool {
    match expected {
        Some(expected) => constant_time_eq::constant_time_eq(expected.as_bytes(), supplied.as_bytes()),
        None => false,
    }
}

/// Client-side checkout signature over `order_id|payment_id`.
pub fn verify_payment_signature(
    secret: &str,
    order_id: &str,
    payment_id: &str,
    signature: &str,
) -> bool {
    let message = format!("{order_id}|{payment_id}");
    matches(sign(secret, message.as_bytes()), signature)
}

/// Webhook signature over the raw request body.
pub fn verify_webhook_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    matches(sign(secret, body), signature)
}
