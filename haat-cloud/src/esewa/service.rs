//! eSewa payment initiation and verification for orders

use serde::Deserialize;
use shared::error::{AppError, ErrorCode};
use shared::models::{
    NotificationType, Order, OrderStatus, PaymentDetails, PaymentMethod, PaymentStatus,
};
use shared::util::now_millis;
use sqlx::PgPool;

use super::client::EsewaClient;
use super::{EsewaError, PaymentForm};
use crate::auth::CurrentUser;
use crate::config::EsewaConfig;
use crate::db;
use crate::error::ServiceResult;
use crate::notify::{self, Notice};
use crate::orders::money;
use crate::orders::service::lock_order;

/// Body of `POST /api/orders/{id}/esewa/verify`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    /// Base64 `data` value from the eSewa redirect
    pub data: Option<String>,
    pub transaction_uuid: Option<String>,
}

fn require_payer(order: &Order, user: &CurrentUser) -> Result<(), AppError> {
    if order.buyer_id == user.id || user.is_admin() {
        Ok(())
    } else {
        Err(AppError::with_message(
            ErrorCode::NotOwner,
            "Only the buyer can pay for this order",
        ))
    }
}

fn require_esewa(order: &Order) -> Result<(), AppError> {
    if order.payment_method == PaymentMethod::Esewa {
        Ok(())
    } else {
        Err(AppError::new(ErrorCode::PaymentInvalidMethod))
    }
}

/// Sign a fresh transaction for the order and record it as pending
pub async fn initiate(
    pool: &PgPool,
    config: &EsewaConfig,
    user: &CurrentUser,
    order_id: i64,
) -> ServiceResult<(Order, PaymentForm)> {
    let mut tx = pool.begin().await?;
    let mut order = lock_order(&mut tx, order_id).await?;
    require_payer(&order, user)?;
    require_esewa(&order)?;
    if order.payment_status == PaymentStatus::Paid {
        return Err(AppError::new(ErrorCode::PaymentAlreadyPaid).into());
    }
    if matches!(order.status, OrderStatus::Cancelled | OrderStatus::Rejected) {
        return Err(AppError::invalid(format!(
            "Cannot pay for a {} order",
            order.status.as_db()
        ))
        .into());
    }

    let now = now_millis();
    let uuid = super::transaction_uuid(order.id, now);
    let amount = money::format_amount(order.total_amount);
    let form = super::build_form(config, uuid.clone(), amount.clone()).map_err(AppError::from)?;

    order.payment_status = PaymentStatus::Pending;
    order.payment_details = Some(PaymentDetails {
        transaction_uuid: Some(uuid),
        amount: Some(amount),
        product_code: Some(config.product_code.clone()),
        provider_status: Some("INITIATED".into()),
        ..Default::default()
    });
    order.updated_at = now;
    db::orders::save(&mut *tx, &order).await?;
    tx.commit().await?;

    tracing::info!(
        order_id,
        transaction_uuid = %form.transaction_uuid,
        total_amount = %form.total_amount,
        "eSewa payment initiated"
    );
    Ok((order, form))
}

/// Apply a provider status to the order.
///
/// Returns the farmer notice when this call is the one that marks it paid.
pub fn apply_provider_status(
    order: &mut Order,
    transaction_uuid: &str,
    provider_status: &str,
    ref_id: Option<String>,
    now: i64,
) -> Option<Notice> {
    if order.payment_status == PaymentStatus::Paid {
        return None;
    }

    let next = super::map_status(provider_status);
    let mut details = order.payment_details.take().unwrap_or_default();
    details.transaction_uuid = Some(transaction_uuid.to_string());
    details.provider_status = Some(provider_status.to_string());
    details.verified_at = Some(now);
    if next == PaymentStatus::Paid {
        details.ref_id = ref_id;
        details.paid_at = Some(now);
    }
    order.payment_details = Some(details);
    order.payment_status = next;
    order.updated_at = now;

    (next == PaymentStatus::Paid).then(|| {
        Notice::new(
            order.farmer_id,
            NotificationType::PaymentReceived,
            "Payment received",
            format!(
                "Rs. {} received via eSewa for order #{}",
                money::format_amount(order.total_amount),
                order.id
            ),
        )
        .from_user(order.buyer_id)
        .about_order(order.id)
        .with_data("transactionUuid", transaction_uuid)
    })
}

/// Resolve the transaction to check: callback, then body, then stored details
fn resolve_transaction(
    order: &Order,
    callback_uuid: Option<String>,
    body_uuid: Option<&str>,
) -> Result<String, AppError> {
    let uuid = callback_uuid
        .or_else(|| body_uuid.map(str::to_string))
        .or_else(|| {
            order
                .payment_details
                .as_ref()
                .and_then(|d| d.transaction_uuid.clone())
        })
        .ok_or_else(|| AppError::new(ErrorCode::PaymentTransactionMissing))?;
    if !super::belongs_to_order(&uuid, order.id) {
        return Err(EsewaError::TransactionMismatch(uuid).into());
    }
    Ok(uuid)
}

pub async fn verify(
    pool: &PgPool,
    config: &EsewaConfig,
    client: &EsewaClient,
    user: &CurrentUser,
    order_id: i64,
    req: &VerifyRequest,
) -> ServiceResult<Order> {
    let order = db::orders::find_by_id(pool, order_id)
        .await?
        .ok_or_else(|| AppError::new(ErrorCode::OrderNotFound))?;
    require_payer(&order, user)?;
    require_esewa(&order)?;
    if order.payment_status == PaymentStatus::Paid {
        return Ok(order);
    }

    let callback = req
        .data
        .as_deref()
        .filter(|d| !d.trim().is_empty())
        .map(|data| super::decode_callback(data, &config.secret_key))
        .transpose()
        .map_err(|e| {
            tracing::warn!(order_id, error = %e, "Rejected eSewa callback");
            AppError::from(e)
        })?;
    let uuid = resolve_transaction(
        &order,
        callback.map(|cb| cb.transaction_uuid),
        req.transaction_uuid.as_deref(),
    )?;
    let amount = order
        .payment_details
        .as_ref()
        .and_then(|d| d.amount.clone())
        .unwrap_or_else(|| money::format_amount(order.total_amount));

    // Provider call happens outside the row lock
    let status = client
        .transaction_status(&config.product_code, &amount, &uuid)
        .await
        .map_err(|e| {
            tracing::warn!(order_id, transaction_uuid = %uuid, error = %e, "eSewa status lookup failed");
            AppError::with_message(ErrorCode::PaymentGatewayError, e.to_string())
        })?;
    if !status.matches(&uuid, &amount) {
        tracing::warn!(
            order_id,
            transaction_uuid = %uuid,
            echoed_uuid = ?status.transaction_uuid,
            echoed_amount = ?status.total_amount,
            "eSewa status does not match the requested transaction"
        );
        return Err(AppError::with_message(
            ErrorCode::PaymentTransactionMismatch,
            "eSewa status does not match the requested transaction",
        )
        .into());
    }

    let now = now_millis();
    let mut tx = pool.begin().await?;
    let mut order = lock_order(&mut tx, order_id).await?;
    if order.payment_status == PaymentStatus::Paid {
        return Ok(order);
    }
    let notice = apply_provider_status(&mut order, &uuid, &status.status, status.ref_id, now);
    db::orders::save(&mut *tx, &order).await?;
    if let Some(notice) = &notice {
        notify::enqueue(&mut *tx, notice, now).await?;
    }
    tx.commit().await?;

    tracing::info!(
        order_id,
        transaction_uuid = %uuid,
        provider_status = %status.status,
        payment_status = order.payment_status.as_db(),
        "eSewa payment verified"
    );
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::models::{DeliveryOption, DeliveryStatus, OrderItem};

    fn esewa_order() -> Order {
        Order {
            id: 42,
            buyer_id: 1,
            farmer_id: 2,
            items: vec![OrderItem {
                product_id: 9,
                name: "Tomato".into(),
                quantity: 2.0,
                price: 125.0,
            }],
            total_amount: 250.0,
            status: OrderStatus::Placed,
            delivery_option: DeliveryOption::SelfPickup,
            delivery_location: None,
            delivery_status: DeliveryStatus::Completed,
            delivery_responded_at: None,
            payment_method: PaymentMethod::Esewa,
            payment_status: PaymentStatus::Pending,
            payment_details: Some(PaymentDetails {
                transaction_uuid: Some("42-100".into()),
                amount: Some("250.00".into()),
                provider_status: Some("INITIATED".into()),
                ..Default::default()
            }),
            inventory_deducted: false,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn test_complete_marks_paid_once() {
        let mut order = esewa_order();
        let notice = apply_provider_status(&mut order, "42-100", "COMPLETE", Some("REF1".into()), 500)
            .expect("first completion notifies");
        assert_eq!(notice.recipient_id, 2);
        assert_eq!(notice.kind, NotificationType::PaymentReceived);
        assert_eq!(notice.related_data["orderId"], 42);
        assert_eq!(order.payment_status, PaymentStatus::Paid);
        let details = order.payment_details.clone().unwrap();
        assert_eq!(details.ref_id.as_deref(), Some("REF1"));
        assert_eq!(details.paid_at, Some(500));
        assert_eq!(details.amount.as_deref(), Some("250.00"));

        assert!(apply_provider_status(&mut order, "42-100", "COMPLETE", Some("REF2".into()), 900).is_none());
        assert_eq!(order.updated_at, 500);
        assert_eq!(order.payment_details.unwrap().ref_id.as_deref(), Some("REF1"));
    }

    #[test]
    fn test_failed_and_pending_statuses() {
        let mut order = esewa_order();
        assert!(apply_provider_status(&mut order, "42-100", "CANCELED", None, 5).is_none());
        assert_eq!(order.payment_status, PaymentStatus::Failed);
        assert_eq!(
            order.payment_details.as_ref().unwrap().provider_status.as_deref(),
            Some("CANCELED")
        );

        let mut order = esewa_order();
        assert!(apply_provider_status(&mut order, "42-100", "AMBIGUOUS", None, 5).is_none());
        assert_eq!(order.payment_status, PaymentStatus::Pending);
        assert!(order.payment_details.unwrap().paid_at.is_none());
    }

    #[test]
    fn test_transaction_resolution_order() {
        let order = esewa_order();
        assert_eq!(
            resolve_transaction(&order, Some("42-300".into()), Some("42-200")).unwrap(),
            "42-300"
        );
        assert_eq!(resolve_transaction(&order, None, Some("42-200")).unwrap(), "42-200");
        assert_eq!(resolve_transaction(&order, None, None).unwrap(), "42-100");

        let err = resolve_transaction(&order, Some("43-300".into()), None).unwrap_err();
        assert_eq!(err.code, ErrorCode::PaymentTransactionMismatch);

        let mut bare = esewa_order();
        bare.payment_details = None;
        let err = resolve_transaction(&bare, None, None).unwrap_err();
        assert_eq!(err.code, ErrorCode::PaymentTransactionMissing);
    }
}
