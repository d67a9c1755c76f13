//! Decimal display amounts ↔ on-chain base units.
//!
//! Display amounts are parsed from text, never from floats, so `"0.1"` is exactly
//! `10^17` base units at 18 decimals. Fractional digits beyond the token's precision are
//! truncated.

use crate::{Amount, Result, StakeflowError};

/// Decimals of the staking token.
pub const TOKEN_DECIMALS: u32 = 18;

/// Largest power of ten representable in `u128`.
const MAX_DECIMALS: u32 = 38;

/// Fixed-point codec for one token precision.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AmountCodec {
    decimals: u32,
}

impl Default for AmountCodec {
    fn default() -> Self {
        Self {
            decimals: TOKEN_DECIMALS,
        }
    }
}

impl AmountCodec {
    pub fn new(decimals: u32) -> Result<Self> {
        if decimals > MAX_DECIMALS {
            return Err(StakeflowError::ConfigError(format!(
                "token decimals must be <= {MAX_DECIMALS}, got {decimals}"
            )));
        }
        Ok(Self { decimals })
    }

    pub fn decimals(&self) -> u32 {
        self.decimals
    }

    fn scale(&self) -> Amount {
        10u128.pow(self.decimals)
    }

    /// Parse a non-negative display amount. Zero is accepted.
    pub fn parse(&self, display: &str) -> Result<Amount> {
        let raw = display.trim();
        if raw.is_empty() {
            return Err(StakeflowError::InvalidAmount("amount is empty".into()));
        }
        if raw.starts_with('-') {
            return Err(StakeflowError::InvalidAmount(format!(
                "amount must not be negative: '{raw}'"
            )));
        }
        let unsigned = raw.strip_prefix('+').unwrap_or(raw);

        let (whole, fraction) = match unsigned.split_once('.') {
            Some((whole, fraction)) => (whole, fraction),
            None => (unsigned, ""),
        };
        if whole.is_empty() && fraction.is_empty() {
            return Err(StakeflowError::InvalidAmount(format!(
                "amount is not numeric: '{raw}'"
            )));
        }
        let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
        if !all_digits(whole) || !all_digits(fraction) {
            return Err(StakeflowError::InvalidAmount(format!(
                "amount is not numeric: '{raw}'"
            )));
        }

        let overflow =
            || StakeflowError::InvalidAmount(format!("amount exceeds representable range: '{raw}'"));

        let whole_units = if whole.is_empty() {
            0
        } else {
            whole.parse::<Amount>().map_err(|_| overflow())?
        };

        let kept = &fraction[..fraction.len().min(self.decimals as usize)];
        let mut fraction_units: Amount = 0;
        for digit in kept.bytes() {
            fraction_units = fraction_units * 10 + Amount::from(digit - b'0');
        }
        let padding = self.decimals - kept.len() as u32;
        fraction_units *= 10u128.pow(padding);

        whole_units
            .checked_mul(self.scale())
            .and_then(|units| units.checked_add(fraction_units))
            .ok_or_else(overflow)
    }

    /// Convert a user-entered amount to base units. Zero is rejected.
    pub fn to_base_units(&self, display: &str) -> Result<Amount> {
        let amount = self.parse(display)?;
        if amount == 0 {
            return Err(StakeflowError::InvalidAmount(format!(
                "amount must be greater than zero: '{}'",
                display.trim()
            )));
        }
        Ok(amount)
    }

    /// Render base units as a canonical decimal string (no trailing fractional zeros).
    pub fn to_display_units(&self, base: Amount) -> String {
        let scale = self.scale();
        let whole = base / scale;
        let fraction = base % scale;
        if fraction == 0 {
            return whole.to_string();
        }
        let digits = format!("{:0width$}", fraction, width = self.decimals as usize);
        format!("{whole}.{}", digits.trim_end_matches('0'))
    }
}

/// Serde adapter writing amounts as decimal strings.
///
/// JSON numbers lose precision above 2^53 in most consumers and `serde_json::Value` cannot hold
/// values above `u64::MAX`.
pub mod decimal_string {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &u128, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Like [`decimal_string`] for optional amounts.
pub mod optional_decimal_string {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<u128>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) => serializer.serialize_some(&v.to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<u128>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        raw.map(|s| s.parse().map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const WEI: Amount = 1_000_000_000_000_000_000;

    #[test]
    fn scales_whole_and_fractional_amounts() {
        let codec = AmountCodec::default();
        assert_eq!(codec.to_base_units("500").unwrap(), 500 * WEI);
        assert_eq!(codec.to_base_units("0.1").unwrap(), WEI / 10);
        assert_eq!(codec.to_base_units(".5").unwrap(), WEI / 2);
        assert_eq!(codec.to_base_units("2.").unwrap(), 2 * WEI);
        assert_eq!(codec.to_base_units(" 1.25 ").unwrap(), WEI + WEI / 4);
    }

    #[test]
    fn truncates_digits_beyond_precision() {
        let codec = AmountCodec::new(2).unwrap();
        assert_eq!(codec.to_base_units("1.239").unwrap(), 123);
    }

    #[test]
    fn rejects_zero_negative_and_non_numeric() {
        let codec = AmountCodec::default();
        for input in ["", "0", "0.000", "-1", "abc", "1.2.3", "1e3", ".", "NaN"] {
            assert!(
                matches!(codec.to_base_units(input), Err(StakeflowError::InvalidAmount(_))),
                "{input:?} should be rejected"
            );
        }
    }

    #[test]
    fn parse_accepts_zero() {
        assert_eq!(AmountCodec::default().parse("0").unwrap(), 0);
    }

    #[test]
    fn rejects_overflow() {
        let codec = AmountCodec::default();
        let huge = "1".repeat(30);
        assert!(matches!(
            codec.to_base_units(&huge),
            Err(StakeflowError::InvalidAmount(_))
        ));
    }

    #[test]
    fn rejects_excessive_decimals() {
        assert!(AmountCodec::new(39).is_err());
        assert!(AmountCodec::new(38).is_ok());
    }

    #[test]
    fn renders_canonical_display() {
        let codec = AmountCodec::default();
        assert_eq!(codec.to_display_units(500 * WEI), "500");
        assert_eq!(codec.to_display_units(WEI / 10), "0.1");
        assert_eq!(codec.to_display_units(1), "0.000000000000000001");
        assert_eq!(codec.to_display_units(0), "0");
    }

    fn canonical(whole: u64, fraction: &str) -> String {
        let trimmed = fraction.trim_end_matches('0');
        if trimmed.is_empty() {
            whole.to_string()
        } else {
            format!("{whole}.{trimmed}")
        }
    }

    proptest! {
        #[test]
        fn display_inverts_base_units(
            whole in 0u64..1_000_000_000_000,
            fraction in "[0-9]{0,18}",
        ) {
            prop_assume!(whole > 0 || fraction.bytes().any(|b| b != b'0'));
            let codec = AmountCodec::default();
            let input = if fraction.is_empty() {
                whole.to_string()
            } else {
                format!("{whole}.{fraction}")
            };
            let base = codec.to_base_units(&input).unwrap();
            prop_assert_eq!(codec.to_display_units(base), canonical(whole, &fraction));
        }

        #[test]
        fn digits_past_precision_are_truncated(
            whole in 1u64..1_000_000,
            fraction in "[0-9]{18}",
            extra in "[0-9]{1,6}",
        ) {
            let codec = AmountCodec::default();
            let exact = codec.to_base_units(&format!("{whole}.{fraction}")).unwrap();
            let longer = codec.to_base_units(&format!("{whole}.{fraction}{extra}")).unwrap();
            prop_assert_eq!(exact, longer);
        }
    }
}
