use alloy::primitives::{Address, U256};
use anyhow::Result;

/// 10^decimals as a U256
fn unit_scale(decimals: u8) -> U256 {
    U256::from(10u64).pow(U256::from(decimals))
}

/// Converts a smallest-unit amount into whole tokens, truncating the fraction
pub fn to_whole_tokens(amount: U256, decimals: u8) -> U256 {
    amount / unit_scale(decimals)
}

/// Formats a smallest-unit amount as an exact decimal token string
///
/// Process: amount -> (whole, fraction) -> "whole.fraction" with trailing zeros trimmed.
/// No floating point is involved, so the result parses back to the same amount.
pub fn format_token_amount(amount: U256, decimals: u8) -> String {
    let scale = unit_scale(decimals);
    let whole = amount / scale;
    let fraction = amount % scale;

    if fraction.is_zero() {
        return whole.to_string();
    }

    let padded = format!("{:0>width$}", fraction.to_string(), width = decimals as usize);
    format!("{}.{}", whole, padded.trim_end_matches('0'))
}

/// Parses a decimal token string back into a smallest-unit amount
pub fn parse_token_amount(value: &str, decimals: u8) -> Result<U256> {
    let value = value.trim();
    let (whole_str, fraction_str) = match value.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (value, ""),
    };

    if whole_str.is_empty() || !whole_str.chars().all(|c| c.is_ascii_digit()) {
        return Err(anyhow::anyhow!("Invalid token amount '{}'", value));
    }
    if !fraction_str.chars().all(|c| c.is_ascii_digit()) {
        return Err(anyhow::anyhow!("Invalid token amount '{}'", value));
    }
    if fraction_str.len() > decimals as usize {
        return Err(anyhow::anyhow!(
            "Token amount '{}' has more than {} decimals",
            value,
            decimals
        ));
    }

    let whole = U256::from_str_radix(whole_str, 10)
        .map_err(|e| anyhow::anyhow!("Invalid token amount '{}': {}", value, e))?;
    let fraction = if fraction_str.is_empty() {
        U256::ZERO
    } else {
        let padded = format!("{:0<width$}", fraction_str, width = decimals as usize);
        U256::from_str_radix(&padded, 10)
            .map_err(|e| anyhow::anyhow!("Invalid token amount '{}': {}", value, e))?
    };

    whole
        .checked_mul(unit_scale(decimals))
        .and_then(|scaled| scaled.checked_add(fraction))
        .ok_or_else(|| anyhow::anyhow!("Token amount '{}' overflows 256 bits", value))
}

/// Parses a JSON-RPC hex quantity ("0x1a") into a u64
pub fn parse_hex_u64(value: &str) -> Result<u64> {
    let digits = value.trim_start_matches("0x");
    u64::from_str_radix(digits, 16)
        .map_err(|e| anyhow::anyhow!("Invalid hex quantity '{}': {}", value, e))
}

/// Parses the leading 32-byte word of a hex payload into a U256
///
/// An empty payload ("0x") decodes as zero.
pub fn parse_hex_u256(value: &str) -> Result<U256> {
    let digits = value.trim_start_matches("0x");
    if digits.is_empty() {
        return Ok(U256::ZERO);
    }
    if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(anyhow::anyhow!("Invalid hex payload '{}'", value));
    }
    let word = digits.get(..64).unwrap_or(digits);
    U256::from_str_radix(word, 16)
        .map_err(|e| anyhow::anyhow!("Invalid hex word '{}': {}", value, e))
}

/// Extracts the right-aligned 20-byte address from a 32-byte indexed topic
pub fn topic_to_address(topic: &str) -> Result<String> {
    let bytes = hex::decode(topic.trim_start_matches("0x"))
        .map_err(|e| anyhow::anyhow!("Invalid topic hex '{}': {}", topic, e))?;
    if bytes.len() != 32 {
        return Err(anyhow::anyhow!(
            "Invalid topic '{}': expected 32 bytes, got {}",
            topic,
            bytes.len()
        ));
    }

    let address = Address::from_slice(&bytes[12..32]);
    Ok(address.to_string().to_lowercase())
}

/// Serializes U256 fields as base-10 strings
pub mod u256_decimal {
    use alloy::primitives::U256;
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        let raw = String::deserialize(deserializer)?;
        U256::from_str_radix(&raw, 10).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn test_format_whole_and_fractional_amounts() {
        let ten = U256::from(10u64).pow(U256::from(18u64)) * U256::from(10u64);
        assert_eq!(format_token_amount(ten, 18), "10");

        let three_and_half = U256::from(3_500_000_000_000_000_000u128);
        assert_eq!(format_token_amount(three_and_half, 18), "3.5");

        assert_eq!(format_token_amount(U256::from(1u64), 18), "0.000000000000000001");
        assert_eq!(format_token_amount(U256::ZERO, 18), "0");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_token_amount("", 18).is_err());
        assert!(parse_token_amount("1.2.3", 18).is_err());
        assert!(parse_token_amount("-1", 18).is_err());
        assert!(parse_token_amount("0.1234567", 6).is_err());
    }

    #[test]
    fn test_random_amounts_survive_decimal_boundary() {
        let mut rng = rand::rng();
        for _ in 0..500 {
            let limbs: [u64; 4] = [rng.random(), rng.random(), rng.random(), rng.random()];
            let amount = U256::from_limbs(limbs);
            let decimals = rng.random_range(0..=18u8);

            let formatted = format_token_amount(amount, decimals);
            let parsed = parse_token_amount(&formatted, decimals).unwrap();
            assert_eq!(parsed, amount, "amount {} formatted as {}", amount, formatted);

            let raw = amount.to_string();
            assert_eq!(U256::from_str_radix(&raw, 10).unwrap(), amount);
        }
    }

    #[test]
    fn test_whole_tokens_truncate() {
        let amount = U256::from(35_000_000_000_000_000_000u128) + U256::from(999u64);
        assert_eq!(to_whole_tokens(amount, 18), U256::from(35u64));
    }

    #[test]
    fn test_hex_helpers() {
        assert_eq!(parse_hex_u64("0x1a").unwrap(), 26);
        assert!(parse_hex_u64("0xzz").is_err());
        assert_eq!(parse_hex_u256("0x").unwrap(), U256::ZERO);
        assert_eq!(
            parse_hex_u256("0x0000000000000000000000000000000000000000000000008ac7230489e80000")
                .unwrap(),
            U256::from(10_000_000_000_000_000_000u128)
        );
    }

    #[test]
    fn test_non_hex_payload_is_an_error() {
        let multibyte_at_word_end = format!("0x{}é", "0".repeat(63));
        assert!(parse_hex_u256(&multibyte_at_word_end).is_err());
        assert!(parse_hex_u256("0xg1").is_err());

        let two_words = format!("0x{:064x}{:064x}", 5, 9);
        assert_eq!(parse_hex_u256(&two_words).unwrap(), U256::from(5u64));
    }

    #[test]
    fn test_topic_to_address() {
        let topic = "0x000000000000000000000000AefC770D8515C552C952a30e597d9fbEa99aA756";
        let address = topic_to_address(topic).unwrap();
        assert_eq!(address, "0xaefc770d8515c552c952a30e597d9fbea99aa756");

        assert!(topic_to_address("0x1234").is_err());
    }
}
