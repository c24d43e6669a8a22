//! eSewa transaction status lookup

use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use serde::Deserialize;
use serde_json::Value;

/// Fixed; a slow provider must not hold the request open
pub const STATUS_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Deserialize)]
pub struct TransactionStatus {
    pub status: String,
    #[serde(default)]
    pub ref_id: Option<String>,
    #[serde(default)]
    pub transaction_uuid: Option<String>,
    #[serde(default)]
    pub total_amount: Option<Value>,
}

impl TransactionStatus {
    /// Whether the provider's echo agrees with what was asked for.
    /// Fields the provider leaves out are not checked.
    pub fn matches(&self, transaction_uuid: &str, total_amount: &str) -> bool {
        let uuid_ok = self
            .transaction_uuid
            .as_deref()
            .is_none_or(|uuid| uuid == transaction_uuid);
        let amount_ok = match self.total_amount.as_ref() {
            None | Some(Value::Null) => true,
            Some(echoed) => {
                let requested = total_amount.parse::<Decimal>().ok();
                requested.is_some() && echoed_amount(echoed) == requested
            }
        };
        uuid_ok && amount_ok
    }
}

fn echoed_amount(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => n.as_f64().and_then(Decimal::from_f64),
        Value::String(s) => s.replace(',', "").trim().parse().ok(),
        _ => None,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StatusError {
    #[error("eSewa status request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("eSewa returned HTTP {0}")]
    Http(u16),
}

#[derive(Clone)]
pub struct EsewaClient {
    http: reqwest::Client,
    status_url: String,
}

impl EsewaClient {
    pub fn new(http: reqwest::Client, status_url: impl Into<String>) -> Self {
        Self {
            http,
            status_url: status_url.into(),
        }
    }

    /// Query the provider once; no retry
    pub async fn transaction_status(
        &self,
        product_code: &str,
        total_amount: &str,
        transaction_uuid: &str,
    ) -> Result<TransactionStatus, StatusError> {
        let resp = self
            .http
            .get(&self.status_url)
            .query(&[
                ("product_code", product_code),
                ("total_amount", total_amount),
                ("transaction_uuid", transaction_uuid),
            ])
            .timeout(STATUS_TIMEOUT)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(StatusError::Http(resp.status().as_u16()));
        }
        Ok(resp.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_response_parses() {
        let body = r#"{
            "product_code": "EPAYTEST",
            "transaction_uuid": "42-1700000000000",
            "total_amount": 300.0,
            "status": "COMPLETE",
            "ref_id": "0001TS9"
        }"#;
        let status: TransactionStatus = serde_json::from_str(body).unwrap();
        assert_eq!(status.status, "COMPLETE");
        assert_eq!(status.ref_id.as_deref(), Some("0001TS9"));
    }

    #[test]
    fn test_pending_response_without_ref() {
        let body = r#"{"status": "PENDING", "ref_id": null}"#;
        let status: TransactionStatus = serde_json::from_str(body).unwrap();
        assert_eq!(status.status, "PENDING");
        assert!(status.ref_id.is_none());
    }

    #[test]
    fn test_echo_must_match_request() {
        let status: TransactionStatus = serde_json::from_str(
            r#"{"status": "COMPLETE", "transaction_uuid": "42-1700", "total_amount": 300.0}"#,
        )
        .unwrap();
        assert!(status.matches("42-1700", "300.00"));
        assert!(!status.matches("43-1700", "300.00"));
        assert!(!status.matches("42-1700", "250.00"));

        let status: TransactionStatus = serde_json::from_str(
            r#"{"status": "COMPLETE", "transaction_uuid": "42-1700", "total_amount": "1,000.0"}"#,
        )
        .unwrap();
        assert!(status.matches("42-1700", "1000.00"));
    }

    #[test]
    fn test_missing_echo_fields_are_not_checked() {
        let status: TransactionStatus =
            serde_json::from_str(r#"{"status": "PENDING", "total_amount": null}"#).unwrap();
        assert!(status.matches("42-1700", "300.00"));
    }
}
