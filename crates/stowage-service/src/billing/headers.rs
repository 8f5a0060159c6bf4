//! Case-insensitive webhook header map.

use std::collections::HashMap;

use stowage_core::error::AppError;
use stowage_core::result::AppResult;

/// Headers accompanying a webhook delivery, keyed by lowercase name.
#[derive(Debug, Clone, Default)]
pub struct SignatureHeaders {
    entries: HashMap<String, String>,
}

impl SignatureHeaders {
    /// Create an empty header map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a header, replacing any previous value.
    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        self.entries
            .insert(name.trim().to_ascii_lowercase(), value.into());
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, name: &str, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    /// Look up a header by name, ignoring case.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Parse a raw `Name: value` line.
    pub fn parse_line(line: &str) -> AppResult<(String, String)> {
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| AppError::validation(format!("Malformed header line: '{line}'")))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::validation(format!("Malformed header line: '{line}'")));
        }
        Ok((name.to_string(), value.trim().to_string()))
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for SignatureHeaders {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Self::new();
        for (name, value) in iter {
            headers.insert(name.as_ref(), value);
        }
        headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_ignores_case() {
        let headers = SignatureHeaders::new().with("Stripe-Signature", "t=1,v1=ab");
        assert_eq!(headers.get("stripe-signature"), Some("t=1,v1=ab"));
        assert_eq!(headers.get("STRIPE-SIGNATURE"), Some("t=1,v1=ab"));
        assert!(headers.get("paddle-signature").is_none());
    }

    #[test]
    fn test_parse_line_keeps_colons_in_value() {
        let (name, value) = SignatureHeaders::parse_line("Paddle-Signature: ts=1;h1=ab:cd").unwrap();
        assert_eq!(name, "Paddle-Signature");
        assert_eq!(value, "ts=1;h1=ab:cd");
        assert!(SignatureHeaders::parse_line("no separator").is_err());
    }
}
