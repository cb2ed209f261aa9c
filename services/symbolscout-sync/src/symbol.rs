//! Ticker normalization - split multiplier prefixes from base symbols

use std::fmt;

/// Multiplier encoded by the `1M` prefix form
pub const MILLION: u64 = 1_000_000;

/// A ticker split into its contract-size multiplier and base symbol
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NormalizedToken {
    pub multiplier: u64,
    pub base: String,
}

impl NormalizedToken {
    pub fn new(multiplier: u64, base: impl Into<String>) -> Self {
        Self {
            multiplier,
            base: base.into(),
        }
    }

    /// Parse a raw ticker such as `1000PEPE`, `1MBABYDOGE` or `BTC`.
    ///
    /// The `1M` prefix is checked before the digit scan, so `1M2` parses as
    /// `(1_000_000, "2")`.
    pub fn parse(token: &str) -> Self {
        if let Some(rest) = token.strip_prefix("1M") {
            return Self::new(MILLION, rest);
        }

        let digits = token
            .char_indices()
            .find(|(_, c)| !c.is_ascii_digit())
            .map(|(i, _)| i);

        match digits {
            Some(split) if split > 0 => match token[..split].parse::<u64>() {
                Ok(multiplier) => Self::new(multiplier, &token[split..]),
                // Digit runs beyond u64 range are kept verbatim
                Err(_) => Self::new(1, token),
            },
            _ => Self::new(1, token),
        }
    }

    /// Display form. Only the bare, `1M` and decimal-prefix shapes are emitted.
    pub fn render(&self) -> String {
        match self.multiplier {
            1 => self.base.clone(),
            MILLION => format!("1M{}", self.base),
            m => format!("{}{}", m, self.base),
        }
    }
}

impl fmt::Display for NormalizedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Convenience wrapper returning `(multiplier, base)`
pub fn normalize(token: &str) -> (u64, String) {
    let parsed = NormalizedToken::parse(token);
    (parsed.multiplier, parsed.base)
}

/// Inverse of [`normalize`] for the canonical shapes
pub fn render(multiplier: u64, base: &str) -> String {
    NormalizedToken::new(multiplier, base).render()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_prefix() {
        assert_eq!(normalize("1000PEPE"), (1000, "PEPE".to_string()));
        assert_eq!(normalize("10000LADYS"), (10000, "LADYS".to_string()));
    }

    #[test]
    fn test_million_prefix() {
        assert_eq!(normalize("1MBABYDOGE"), (MILLION, "BABYDOGE".to_string()));
    }

    #[test]
    fn test_plain_symbol() {
        assert_eq!(normalize("BTC"), (1, "BTC".to_string()));
        assert_eq!(normalize(""), (1, String::new()));
    }

    #[test]
    fn test_all_digits_is_left_alone() {
        assert_eq!(normalize("1000"), (1, "1000".to_string()));
    }

    #[test]
    fn test_million_prefix_wins_over_digits_quirk() {
        // Known quirk: the 1M rule fires before the digit scan
        assert_eq!(normalize("1M2"), (MILLION, "2".to_string()));
    }

    #[test]
    fn test_render_inverts_canonical_forms() {
        for base in ["PEPE", "SHIB", "BABYDOGE", "X"] {
            for multiplier in [1, 1000, MILLION] {
                let rendered = render(multiplier, base);
                assert_eq!(normalize(&rendered), (multiplier, base.to_string()));
            }
        }
    }

    #[test]
    fn test_display_matches_render() {
        let token = NormalizedToken::parse("1000SHIB");
        assert_eq!(token.to_string(), "1000SHIB");
        assert_eq!(NormalizedToken::new(MILLION, "CAT").to_string(), "1MCAT");
    }
}
