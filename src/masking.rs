//! Sensitive-data masking for logs and reports.
//!
//! Unmasked values never reach a log record or a persisted progress file;
//! callers mask at the point of emitting a report, not at the point of
//! storage, so the raw value is still available for the actual API calls.

/// Masks an international phone number `+CCCnnnnnnnnnn` as `+CCC****nnnn`.
///
/// Numbers that don't look like `+<digits>` are returned unchanged rather
/// than panicking — this is a display helper, not a validator.
pub fn mask_phone(phone: &str) -> String {
    if !phone.starts_with('+') {
        return phone.to_string();
    }
    let digits = &phone[1..];
    if !digits.chars().all(|c| c.is_ascii_digit()) || digits.len() < 4 {
        return phone.to_string();
    }
    let country_len = digits.len().saturating_sub(4).min(3).max(1);
    let (country, rest) = digits.split_at(country_len);
    let tail = &rest[rest.len() - 4..];
    format!("+{country}****{tail}")
}

/// Masks a hex string of length >= 32 as `xxxx****xxxx`; shorter hex
/// strings (and non-hex input) are returned unchanged.
pub fn mask_hex(value: &str) -> String {
    if value.len() < 32 || !value.chars().all(|c| c.is_ascii_hexdigit()) {
        return value.to_string();
    }
    let head = &value[..4];
    let tail = &value[value.len() - 4..];
    format!("{head}****{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_phone_number() {
        assert_eq!(mask_phone("+15551234567"), "+1****4567");
        assert_eq!(mask_phone("+445512345678"), "+445****5678");
    }

    #[test]
    fn leaves_non_phone_untouched() {
        assert_eq!(mask_phone("not-a-phone"), "not-a-phone");
        assert_eq!(mask_phone("+abc"), "+abc");
    }

    #[test]
    fn masks_long_hex() {
        let hash = "a".repeat(32);
        assert_eq!(mask_hex(&hash), "aaaa****aaaa");
    }

    #[test]
    fn leaves_short_hex_untouched() {
        assert_eq!(mask_hex("deadbeef"), "deadbeef");
    }
}
