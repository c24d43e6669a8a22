//! Expo push API client

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PushError {
    #[error("push transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("push rejected: {0}")]
    Rejected(String),
}

/// `ExponentPushToken[...]` or `ExpoPushToken[...]` with a non-empty body
pub fn is_expo_push_token(token: &str) -> bool {
    ["ExponentPushToken[", "ExpoPushToken["]
        .iter()
        .filter_map(|prefix| token.strip_prefix(prefix))
        .filter_map(|rest| rest.strip_suffix(']'))
        .any(|inner| !inner.is_empty() && !inner.contains(['[', ']']))
}

#[derive(Debug, Serialize)]
pub struct PushMessage<'a> {
    pub to: &'a str,
    pub title: &'a str,
    pub body: &'a str,
    pub data: &'a serde_json::Value,
    pub sound: &'static str,
}

#[derive(Debug, Deserialize)]
struct PushResponse {
    data: Option<PushTicket>,
    errors: Option<Vec<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct PushTicket {
    status: String,
    message: Option<String>,
}

#[derive(Clone)]
pub struct ExpoClient {
    http: reqwest::Client,
    url: String,
}

impl ExpoClient {
    pub fn new(http: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }

    pub async fn send(&self, message: &PushMessage<'_>) -> Result<(), PushError> {
        let resp: PushResponse = self
            .http
            .post(&self.url)
            .header("Accept", "application/json")
            .json(message)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(errors) = resp.errors.filter(|e| !e.is_empty()) {
            return Err(PushError::Rejected(serde_json::Value::from(errors).to_string()));
        }
        match resp.data {
            Some(ticket) if ticket.status == "ok" => Ok(()),
            Some(ticket) => Err(PushError::Rejected(
                ticket.message.unwrap_or(ticket.status),
            )),
            None => Err(PushError::Rejected("empty response".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_token_formats() {
        assert!(is_expo_push_token("ExponentPushToken[xxxxxxxxxxxxxxxxxxxxxx]"));
        assert!(is_expo_push_token("ExpoPushToken[abc123]"));
        assert!(!is_expo_push_token("ExponentPushToken[]"));
        assert!(!is_expo_push_token("ExponentPushToken[abc"));
        assert!(!is_expo_push_token("fcm:abc123"));
        assert!(!is_expo_push_token(""));
    }

    #[test]
    fn test_message_shape() {
        let data = serde_json::json!({"orderId": 1});
        let msg = PushMessage {
            to: "ExpoPushToken[a]",
            title: "New order received",
            body: "A buyer placed an order",
            data: &data,
            sound: "default",
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["to"], "ExpoPushToken[a]");
        assert_eq!(json["data"]["orderId"], 1);
        assert_eq!(json["sound"], "default");
    }
}
