//! HMAC request signing for signature-authenticated marketplaces.

use hmac::digest::InvalidLength;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Sign a request as `HMAC-SHA256(secret, METHOD\nURL\nBODY\nTIMESTAMP)`.
///
/// `url` is the full request URL including the query string, `body` is the
/// exact bytes sent (empty for GET) and `timestamp` is Unix seconds. The
/// result is lowercase hex.
pub fn sign_request(
    method: &str,
    url: &str,
    body: &str,
    timestamp: i64,
    secret: &str,
) -> Result<String, InvalidLength> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes())?;

    let payload = format!("{}\n{}\n{}\n{}", method.to_uppercase(), url, body, timestamp);
    mac.update(payload.as_bytes());

    Ok(hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_shape() {
        let signature = sign_request("get", "https://sellerapi.kaufland.com/v2/units", "", 1_700_000_000, "secret").unwrap();
        assert_eq!(signature.len(), 64);
        assert!(signature.chars().all(|c| c.is_ascii_hexdigit()));

        let upper = sign_request("GET", "https://sellerapi.kaufland.com/v2/units", "", 1_700_000_000, "secret").unwrap();
        assert_eq!(signature, upper);
    }

    #[test]
    fn test_signature_covers_every_part() {
        let base = sign_request("PATCH", "https://x/v2/units/1", "{}", 1, "s").unwrap();
        assert_ne!(base, sign_request("PATCH", "https://x/v2/units/2", "{}", 1, "s").unwrap());
        assert_ne!(base, sign_request("PATCH", "https://x/v2/units/1", "{\"a\":1}", 1, "s").unwrap());
        assert_ne!(base, sign_request("PATCH", "https://x/v2/units/1", "{}", 2, "s").unwrap());
        assert_ne!(base, sign_request("PATCH", "https://x/v2/units/1", "{}", 1, "t").unwrap());
    }

    #[test]
    fn test_known_vector() {
        // HMAC-SHA256("key", "GET\nu\n\n0")
        let mut mac = <HmacSha256 as Mac>::new_from_slice(b"key").unwrap();
        mac.update(b"GET\nu\n\n0");
        let expected = hex::encode(mac.finalize().into_bytes());
        assert_eq!(sign_request("GET", "u", "", 0, "key").unwrap(), expected);
    }
}
