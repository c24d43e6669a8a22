//! eSewa ePay v2 integration via REST (no SDK dependency)
//!
//! Outbound: the server signs `total_amount,transaction_uuid,product_code`
//! and hands the client an 11-field form to post to eSewa.
//! Inbound: eSewa redirects back with a base64 JSON payload that carries its
//! own `signed_field_names` and `signature`; both are checked before the
//! status API is consulted.

pub mod checkout;
pub mod client;
pub mod service;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::Sha256;
use shared::error::{AppError, ErrorCode};
use shared::models::PaymentStatus;
use thiserror::Error;

use crate::config::EsewaConfig;

/// Fields covered by the outbound signature, in signing order
pub const SIGNED_FIELD_NAMES: &str = "total_amount,transaction_uuid,product_code";

#[derive(Debug, Error, PartialEq)]
pub enum EsewaError {
    #[error("Callback data is not valid base64")]
    Encoding,

    #[error("Callback data is not a JSON object")]
    Payload,

    #[error("Callback is missing {0}")]
    MissingField(String),

    #[error("Payment signature verification failed")]
    SignatureMismatch,

    #[error("Transaction {0} does not belong to this order")]
    TransactionMismatch(String),

    #[error("HMAC key error")]
    Key,
}

impl From<EsewaError> for AppError {
    fn from(err: EsewaError) -> Self {
        let code = match err {
            EsewaError::Encoding | EsewaError::Payload | EsewaError::MissingField(_) => {
                ErrorCode::InvalidFormat
            }
            EsewaError::SignatureMismatch => ErrorCode::PaymentSignatureInvalid,
            EsewaError::TransactionMismatch(_) => ErrorCode::PaymentTransactionMismatch,
            EsewaError::Key => ErrorCode::ConfigError,
        };
        AppError::with_message(code, err.to_string())
    }
}

fn mac(secret: &str) -> Result<Hmac<Sha256>, EsewaError> {
    Hmac::<Sha256>::new_from_slice(secret.as_bytes()).map_err(|_| EsewaError::Key)
}

/// HMAC-SHA256 of `message`, base64 encoded
pub fn sign(secret: &str, message: &str) -> Result<String, EsewaError> {
    let mut mac = mac(secret)?;
    mac.update(message.as_bytes());
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}

/// Constant-time check of a base64 signature
pub fn verify(secret: &str, message: &str, signature: &str) -> Result<(), EsewaError> {
    let sig_bytes = BASE64
        .decode(signature.trim())
        .map_err(|_| EsewaError::SignatureMismatch)?;
    let mut mac = mac(secret)?;
    mac.update(message.as_bytes());
    mac.verify_slice(&sig_bytes)
        .map_err(|_| EsewaError::SignatureMismatch)
}

pub fn signing_message(total_amount: &str, transaction_uuid: &str, product_code: &str) -> String {
    format!("total_amount={total_amount},transaction_uuid={transaction_uuid},product_code={product_code}")
}

/// `{orderId}-{millis}`; a fresh uuid per attempt
pub fn transaction_uuid(order_id: i64, now: i64) -> String {
    format!("{order_id}-{now}")
}

pub fn belongs_to_order(transaction_uuid: &str, order_id: i64) -> bool {
    transaction_uuid
        .strip_prefix(&format!("{order_id}-"))
        .is_some_and(|rest| !rest.is_empty())
}

/// Provider status string to local payment status
pub fn map_status(provider_status: &str) -> PaymentStatus {
    match provider_status {
        "COMPLETE" => PaymentStatus::Paid,
        "NOT_FOUND" | "CANCELED" => PaymentStatus::Failed,
        _ => PaymentStatus::Pending,
    }
}

/// Signed form the client posts to eSewa (field names are eSewa's)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentForm {
    pub amount: String,
    pub tax_amount: String,
    pub total_amount: String,
    pub transaction_uuid: String,
    pub product_code: String,
    pub product_service_charge: String,
    pub product_delivery_charge: String,
    pub success_url: String,
    pub failure_url: String,
    pub signed_field_names: String,
    pub signature: String,
}

pub fn build_form(
    config: &EsewaConfig,
    transaction_uuid: String,
    total_amount: String,
) -> Result<PaymentForm, EsewaError> {
    let message = signing_message(&total_amount, &transaction_uuid, &config.product_code);
    let signature = sign(&config.secret_key, &message)?;
    Ok(PaymentForm {
        amount: total_amount.clone(),
        tax_amount: "0".into(),
        total_amount,
        transaction_uuid,
        product_code: config.product_code.clone(),
        product_service_charge: "0".into(),
        product_delivery_charge: "0".into(),
        success_url: config.success_url.clone(),
        failure_url: config.failure_url.clone(),
        signed_field_names: SIGNED_FIELD_NAMES.into(),
        signature,
    })
}

/// Callback fields after the signature has been checked
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedCallback {
    pub transaction_uuid: String,
    pub status: Option<String>,
    pub transaction_code: Option<String>,
    pub total_amount: Option<String>,
}

fn field_str(fields: &Map<String, Value>, name: &str) -> Option<String> {
    match fields.get(name)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Decode and authenticate the `data` query value eSewa redirects with.
///
/// The signed message is rebuilt from the callback's own
/// `signed_field_names`, each as `name=value`, joined with commas.
pub fn decode_callback(data: &str, secret: &str) -> Result<VerifiedCallback, EsewaError> {
    // '+' arrives as ' ' when the value went through a query string unescaped
    let normalized = data.trim().replace(' ', "+");
    let raw = BASE64.decode(normalized).map_err(|_| EsewaError::Encoding)?;
    let fields: Map<String, Value> =
        serde_json::from_slice(&raw).map_err(|_| EsewaError::Payload)?;

    let signature = field_str(&fields, "signature")
        .filter(|s| !s.is_empty())
        .ok_or(EsewaError::SignatureMismatch)?;
    let names = field_str(&fields, "signed_field_names")
        .ok_or_else(|| EsewaError::MissingField("signed_field_names".into()))?;

    let mut parts = Vec::new();
    for name in names.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        let value =
            field_str(&fields, name).ok_or_else(|| EsewaError::MissingField(name.to_string()))?;
        parts.push(format!("{name}={value}"));
    }
    if parts.is_empty() {
        return Err(EsewaError::MissingField("signed_field_names".into()));
    }
    verify(secret, &parts.join(","), &signature)?;

    let transaction_uuid = field_str(&fields, "transaction_uuid")
        .ok_or_else(|| EsewaError::MissingField("transaction_uuid".into()))?;
    Ok(VerifiedCallback {
        transaction_uuid,
        status: field_str(&fields, "status"),
        transaction_code: field_str(&fields, "transaction_code"),
        total_amount: field_str(&fields, "total_amount"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "8gBm/:&EnhH.1/q";

    fn config() -> EsewaConfig {
        EsewaConfig {
            secret_key: SECRET.into(),
            product_code: "EPAYTEST".into(),
            form_url: "https://rc-epay.esewa.com.np/api/epay/main/v2/form".into(),
            status_url: "https://rc.esewa.com.np/api/epay/transaction/status/".into(),
            success_url: "http://localhost:5173/payment/esewa/success".into(),
            failure_url: "http://localhost:5173/payment/esewa/failure".into(),
        }
    }

    fn signed_callback(status: &str, uuid: &str) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert("transaction_code".into(), "000AWEO".into());
        fields.insert("status".into(), status.into());
        fields.insert("total_amount".into(), "1,000.0".into());
        fields.insert("transaction_uuid".into(), uuid.into());
        fields.insert("product_code".into(), "EPAYTEST".into());
        fields.insert(
            "signed_field_names".into(),
            "transaction_code,status,total_amount,transaction_uuid,product_code,signed_field_names"
                .into(),
        );
        let message = format!(
            "transaction_code=000AWEO,status={status},total_amount=1,000.0,\
             transaction_uuid={uuid},product_code=EPAYTEST,\
             signed_field_names=transaction_code,status,total_amount,transaction_uuid,product_code,signed_field_names"
        );
        fields.insert("signature".into(), sign(SECRET, &message).unwrap().into());
        fields
    }

    fn encode(fields: &Map<String, Value>) -> String {
        BASE64.encode(serde_json::to_vec(fields).unwrap())
    }

    #[test]
    fn test_known_signature() {
        let message = signing_message("100", "11-201-13", "EPAYTEST");
        assert_eq!(
            message,
            "total_amount=100,transaction_uuid=11-201-13,product_code=EPAYTEST"
        );
        assert_eq!(
            sign(SECRET, &message).unwrap(),
            "5DZywcrTKD0gia/rsSMcrRHmJl+4Tbol6S+lWgdJ94E="
        );
    }

    #[test]
    fn test_known_callback_signature() {
        let fields = signed_callback("COMPLETE", "250610-162413");
        assert_eq!(
            fields["signature"],
            "papjo8JJpF2skOaVl21DUR7k7hdectT5lWk+z5xvYIU="
        );
    }

    #[test]
    fn test_build_form_is_verifiable() {
        let form = build_form(&config(), "42-1700000000000".into(), "300.00".into()).unwrap();
        assert_eq!(form.amount, "300.00");
        assert_eq!(form.tax_amount, "0");
        assert_eq!(form.signed_field_names, SIGNED_FIELD_NAMES);
        let message = signing_message(&form.total_amount, &form.transaction_uuid, &form.product_code);
        assert!(verify(SECRET, &message, &form.signature).is_ok());
        assert_eq!(
            verify("other-secret", &message, &form.signature),
            Err(EsewaError::SignatureMismatch)
        );
    }

    #[test]
    fn test_valid_callback_decodes() {
        let data = encode(&signed_callback("COMPLETE", "42-1700000000000"));
        let cb = decode_callback(&data, SECRET).unwrap();
        assert_eq!(cb.transaction_uuid, "42-1700000000000");
        assert_eq!(cb.status.as_deref(), Some("COMPLETE"));
        assert_eq!(cb.transaction_code.as_deref(), Some("000AWEO"));
    }

    #[test]
    fn test_tampered_fields_are_rejected() {
        for (key, value) in [
            ("status", "PENDING"),
            ("total_amount", "1.0"),
            ("transaction_uuid", "43-1700000000000"),
            ("product_code", "OTHER"),
            ("transaction_code", "XYZ"),
        ] {
            let mut fields = signed_callback("COMPLETE", "42-1700000000000");
            fields.insert(key.into(), value.into());
            assert_eq!(
                decode_callback(&encode(&fields), SECRET),
                Err(EsewaError::SignatureMismatch),
                "tampering with {key} must fail"
            );
        }
    }

    #[test]
    fn test_missing_or_garbled_signature() {
        let mut fields = signed_callback("COMPLETE", "42-1");
        fields.remove("signature");
        assert_eq!(
            decode_callback(&encode(&fields), SECRET),
            Err(EsewaError::SignatureMismatch)
        );

        fields.insert("signature".into(), "not base64 !!".into());
        assert_eq!(
            decode_callback(&encode(&fields), SECRET),
            Err(EsewaError::SignatureMismatch)
        );

        let mut fields = signed_callback("COMPLETE", "42-1");
        fields.remove("status");
        assert_eq!(
            decode_callback(&encode(&fields), SECRET),
            Err(EsewaError::MissingField("status".into()))
        );
    }

    #[test]
    fn test_garbage_payload() {
        assert_eq!(decode_callback("%%%", SECRET), Err(EsewaError::Encoding));
        let not_object = BASE64.encode(b"[1,2,3]");
        assert_eq!(decode_callback(&not_object, SECRET), Err(EsewaError::Payload));
    }

    #[test]
    fn test_space_is_read_as_plus() {
        let data = encode(&signed_callback("COMPLETE", "42-1700000000000"));
        let mangled = data.replace('+', " ");
        assert!(decode_callback(&mangled, SECRET).is_ok());
    }

    #[test]
    fn test_transaction_belongs_to_order() {
        assert!(belongs_to_order("42-1700000000000", 42));
        assert!(!belongs_to_order("420-1700000000000", 42));
        assert!(!belongs_to_order("4-1700000000000", 42));
        assert!(!belongs_to_order("42-", 42));
        assert_eq!(transaction_uuid(42, 1_700_000_000_000), "42-1700000000000");
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(map_status("COMPLETE"), PaymentStatus::Paid);
        assert_eq!(map_status("NOT_FOUND"), PaymentStatus::Failed);
        assert_eq!(map_status("CANCELED"), PaymentStatus::Failed);
        assert_eq!(map_status("PENDING"), PaymentStatus::Pending);
        assert_eq!(map_status("AMBIGUOUS"), PaymentStatus::Pending);
        assert_eq!(map_status("FULL_REFUND"), PaymentStatus::Pending);
    }
}
