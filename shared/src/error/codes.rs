//! Unified error codes for the haat marketplace
//!
//! Error codes are organized by category:
//! - 0xxx: General errors
//! - 1xxx: Authentication errors
//! - 2xxx: Permission errors
//! - 3xxx: Account errors (users, ratings, notifications, locations)
//! - 4xxx: Order errors
//! - 5xxx: Payment errors
//! - 6xxx: Product errors
//! - 7xxx: Market errors (negotiations, group sales, haat events)
//! - 8xxx: Expense tracker errors
//! - 9xxx: System errors

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unified error code enum
///
/// Serialized as a bare `u16` so mobile and web clients can switch on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
#[repr(u16)]
pub enum ErrorCode {
    // ==================== 0xxx: General ====================
    /// Operation completed successfully
    Success = 0,
    /// Unknown error
    Unknown = 1,
    /// Validation failed
    ValidationFailed = 2,
    /// Resource not found
    NotFound = 3,
    /// Resource already exists
    AlreadyExists = 4,
    /// Invalid request
    InvalidRequest = 5,
    /// Invalid format
    InvalidFormat = 6,
    /// Required field missing
    RequiredField = 7,
    /// Value out of range
    ValueOutOfRange = 8,
    /// Too many requests
    RateLimited = 9,

    // ==================== 1xxx: Auth ====================
    /// User is not authenticated
    NotAuthenticated = 1001,
    /// Invalid credentials (phone/password)
    InvalidCredentials = 1002,
    /// Token has expired
    TokenExpired = 1003,
    /// Token is invalid
    TokenInvalid = 1004,

    // ==================== 2xxx: Permission ====================
    /// Permission denied
    PermissionDenied = 2001,
    /// Specific role required
    RoleRequired = 2002,
    /// Admin role required
    AdminRequired = 2003,
    /// Caller does not own the resource
    NotOwner = 2004,
    /// Cannot delete own account
    CannotDeleteSelf = 2005,

    // ==================== 3xxx: Account ====================
    /// User not found
    UserNotFound = 3001,
    /// Phone number already registered
    PhoneAlreadyRegistered = 3002,
    /// Farmer account is waiting for admin approval
    AccountPendingApproval = 3003,
    /// Password too short
    PasswordTooShort = 3004,
    /// Address is required for farmers
    AddressRequired = 3005,
    /// Invalid Expo push token
    InvalidPushToken = 3006,
    /// User has no stored location
    LocationRequired = 3007,
    /// Role cannot be chosen at registration
    InvalidRole = 3008,
    /// Notification not found
    NotificationNotFound = 3101,
    /// Rating score is outside 0.5..=5 or not a 0.5 step
    RatingInvalidScore = 3201,
    /// Only farmers can be rated
    RatingTargetInvalid = 3202,
    /// Users cannot rate themselves
    CannotRateSelf = 3203,
    /// Location not found
    LocationNotFound = 3301,

    // ==================== 4xxx: Order ====================
    /// Order not found
    OrderNotFound = 4001,
    /// Order has no items
    OrderEmpty = 4002,
    /// Status transition not allowed
    OrderInvalidTransition = 4003,
    /// Order can no longer be cancelled
    OrderNotCancellable = 4004,
    /// Not enough stock to fulfil the order
    InsufficientQuantity = 4005,
    /// Delivery location is required for delivery orders
    DeliveryLocationRequired = 4006,
    /// Product does not belong to the order's farmer
    OrderFarmerMismatch = 4007,

    // ==================== 5xxx: Payment ====================
    /// Payment processing failed
    PaymentFailed = 5001,
    /// Order is not paid through this method
    PaymentInvalidMethod = 5002,
    /// Order has already been paid
    PaymentAlreadyPaid = 5003,
    /// Payment callback signature is invalid
    PaymentSignatureInvalid = 5004,
    /// Transaction does not belong to this order
    PaymentTransactionMismatch = 5005,
    /// Payment provider could not be reached
    PaymentGatewayError = 5006,
    /// No transaction to verify
    PaymentTransactionMissing = 5007,
    /// Checkout form field missing
    CheckoutFieldMissing = 5008,

    // ==================== 6xxx: Product ====================
    /// Product not found
    ProductNotFound = 6001,
    /// Product has invalid price
    ProductInvalidPrice = 6002,
    /// Product is out of stock
    ProductOutOfStock = 6003,
    /// Product is not approved for sale
    ProductNotApproved = 6004,
    /// Invalid product status
    ProductInvalidStatus = 6005,

    // ==================== 7xxx: Market ====================
    /// Negotiation not found
    NegotiationNotFound = 7001,
    /// Negotiation is no longer active
    NegotiationClosed = 7002,
    /// Unknown negotiation action
    NegotiationInvalidAction = 7003,
    /// Farmers cannot negotiate on their own products
    CannotNegotiateOwnProduct = 7004,
    /// Group sale not found
    GroupSaleNotFound = 7101,
    /// Group sale is not open
    GroupSaleNotOpen = 7102,
    /// Buyer already joined the group sale
    GroupSaleAlreadyJoined = 7103,
    /// Requested quantity exceeds remaining capacity
    GroupSaleCapacityExceeded = 7104,
    /// Group sale deadline has passed
    GroupSaleDeadlinePassed = 7105,
    /// Group sale status transition not allowed
    GroupSaleInvalidTransition = 7106,
    /// Haat event not found
    HaatEventNotFound = 7201,
    /// Farmer is outside the event radius
    HaatEventOutOfRange = 7202,
    /// Farmer already registered for the event
    HaatEventAlreadyRegistered = 7203,
    /// Event registration is closed
    HaatEventRegistrationClosed = 7204,
    /// Haat event status transition not allowed
    HaatEventInvalidTransition = 7205,

    // ==================== 8xxx: Expense ====================
    /// Expense project not found
    ExpenseProjectNotFound = 8001,
    /// Expense not found
    ExpenseNotFound = 8002,
    /// Unknown expense category
    ExpenseInvalidCategory = 8003,

    // ==================== 9xxx: System ====================
    /// Internal server error
    InternalError = 9001,
    /// Database error
    DatabaseError = 9002,
    /// Network error
    NetworkError = 9003,
    /// Timeout error
    TimeoutError = 9004,
    /// Configuration error
    ConfigError = 9005,
    /// Upstream service returned an error
    UpstreamError = 9006,
}

impl ErrorCode {
    /// Get the numeric code value
    #[inline]
    pub const fn code(&self) -> u16 {
        *self as u16
    }

    /// Check if this is a success code
    #[inline]
    pub const fn is_success(&self) -> bool {
        matches!(self, ErrorCode::Success)
    }

    /// Get the default English message for this error code
    pub const fn message(&self) -> &'static str {
        match self {
            // General
            ErrorCode::Success => "Operation completed successfully",
            ErrorCode::Unknown => "An unknown error occurred",
            ErrorCode::ValidationFailed => "Validation failed",
            ErrorCode::NotFound => "Resource not found",
            ErrorCode::AlreadyExists => "Resource already exists",
            ErrorCode::InvalidRequest => "Invalid request",
            ErrorCode::InvalidFormat => "Invalid format",
            ErrorCode::RequiredField => "Required field is missing",
            ErrorCode::ValueOutOfRange => "Value is out of range",
            ErrorCode::RateLimited => "Too many requests, try again later",

            // Auth
            ErrorCode::NotAuthenticated => "Not authorized, no token",
            ErrorCode::InvalidCredentials => "Invalid phone or password",
            ErrorCode::TokenExpired => "Token has expired",
            ErrorCode::TokenInvalid => "Not authorized, token failed",

            // Permission
            ErrorCode::PermissionDenied => "Permission denied",
            ErrorCode::RoleRequired => "This action requires a different role",
            ErrorCode::AdminRequired => "Admin role required",
            ErrorCode::NotOwner => "You do not own this resource",
            ErrorCode::CannotDeleteSelf => "You cannot delete your own account",

            // Account
            ErrorCode::UserNotFound => "User not found",
            ErrorCode::PhoneAlreadyRegistered => "Phone number already registered",
            ErrorCode::AccountPendingApproval => "Your account is awaiting admin approval",
            ErrorCode::PasswordTooShort => "Password must be at least 6 characters",
            ErrorCode::AddressRequired => "Address is required for farmers",
            ErrorCode::InvalidPushToken => "Invalid Expo push token",
            ErrorCode::LocationRequired => "Location is required for this action",
            ErrorCode::InvalidRole => "Invalid role",
            ErrorCode::NotificationNotFound => "Notification not found",
            ErrorCode::RatingInvalidScore => "Score must be between 0.5 and 5 in steps of 0.5",
            ErrorCode::RatingTargetInvalid => "Only farmers can be rated",
            ErrorCode::CannotRateSelf => "You cannot rate yourself",
            ErrorCode::LocationNotFound => "Location not found",

            // Order
            ErrorCode::OrderNotFound => "Order not found",
            ErrorCode::OrderEmpty => "Order must contain at least one product",
            ErrorCode::OrderInvalidTransition => "Order status transition not allowed",
            ErrorCode::OrderNotCancellable => "Order can no longer be cancelled",
            ErrorCode::InsufficientQuantity => "Insufficient product quantity",
            ErrorCode::DeliveryLocationRequired => "Delivery location is required",
            ErrorCode::OrderFarmerMismatch => "Product does not belong to this farmer",

            // Payment
            ErrorCode::PaymentFailed => "Payment failed",
            ErrorCode::PaymentInvalidMethod => "Order is not an eSewa order",
            ErrorCode::PaymentAlreadyPaid => "Order is already paid",
            ErrorCode::PaymentSignatureInvalid => "Invalid payment signature",
            ErrorCode::PaymentTransactionMismatch => "Transaction does not belong to this order",
            ErrorCode::PaymentGatewayError => "Payment provider unavailable",
            ErrorCode::PaymentTransactionMissing => "No payment transaction to verify",
            ErrorCode::CheckoutFieldMissing => "Missing checkout field",

            // Product
            ErrorCode::ProductNotFound => "Product not found",
            ErrorCode::ProductInvalidPrice => "Product price must be greater than zero",
            ErrorCode::ProductOutOfStock => "Product is out of stock",
            ErrorCode::ProductNotApproved => "Product is not approved",
            ErrorCode::ProductInvalidStatus => "Invalid product status",

            // Market
            ErrorCode::NegotiationNotFound => "Negotiation not found",
            ErrorCode::NegotiationClosed => "Negotiation is no longer active",
            ErrorCode::NegotiationInvalidAction => "Invalid negotiation action",
            ErrorCode::CannotNegotiateOwnProduct => "You cannot negotiate on your own product",
            ErrorCode::GroupSaleNotFound => "Group sale not found",
            ErrorCode::GroupSaleNotOpen => "Group sale is not open",
            ErrorCode::GroupSaleAlreadyJoined => "You have already joined this group sale",
            ErrorCode::GroupSaleCapacityExceeded => "Quantity exceeds remaining capacity",
            ErrorCode::GroupSaleDeadlinePassed => "Group sale deadline has passed",
            ErrorCode::GroupSaleInvalidTransition => "Group sale status transition not allowed",
            ErrorCode::HaatEventNotFound => "Haat event not found",
            ErrorCode::HaatEventOutOfRange => "Farmer is outside the event radius",
            ErrorCode::HaatEventAlreadyRegistered => "Already registered for this event",
            ErrorCode::HaatEventRegistrationClosed => "Event registration is closed",
            ErrorCode::HaatEventInvalidTransition => "Haat event status transition not allowed",

            // Expense
            ErrorCode::ExpenseProjectNotFound => "Project not found",
            ErrorCode::ExpenseNotFound => "Expense not found",
            ErrorCode::ExpenseInvalidCategory => "Invalid expense category",

            // System
            ErrorCode::InternalError => "Internal server error",
            ErrorCode::DatabaseError => "Database error",
            ErrorCode::NetworkError => "Network error",
            ErrorCode::TimeoutError => "Operation timed out",
            ErrorCode::ConfigError => "Configuration error",
            ErrorCode::UpstreamError => "Upstream service unavailable",
        }
    }
}

impl From<ErrorCode> for u16 {
    #[inline]
    fn from(code: ErrorCode) -> Self {
        code.code()
    }
}

/// Error when converting from an invalid u16 to ErrorCode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidErrorCode(pub u16);

impl fmt::Display for InvalidErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid error code: {}", self.0)
    }
}

impl std::error::Error for InvalidErrorCode {}

impl TryFrom<u16> for ErrorCode {
    type Error = InvalidErrorCode;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            // General
            0 => Ok(ErrorCode::Success),
            1 => Ok(ErrorCode::Unknown),
            2 => Ok(ErrorCode::ValidationFailed),
            3 => Ok(ErrorCode::NotFound),
            4 => Ok(ErrorCode::AlreadyExists),
            5 => Ok(ErrorCode::InvalidRequest),
            6 => Ok(ErrorCode::InvalidFormat),
            7 => Ok(ErrorCode::RequiredField),
            8 => Ok(ErrorCode::ValueOutOfRange),
            9 => Ok(ErrorCode::RateLimited),

            // Auth
            1001 => Ok(ErrorCode::NotAuthenticated),
            1002 => Ok(ErrorCode::InvalidCredentials),
            1003 => Ok(ErrorCode::TokenExpired),
            1004 => Ok(ErrorCode::TokenInvalid),

            // Permission
            2001 => Ok(ErrorCode::PermissionDenied),
            2002 => Ok(ErrorCode::RoleRequired),
            2003 => Ok(ErrorCode::AdminRequired),
            2004 => Ok(ErrorCode::NotOwner),
            2005 => Ok(ErrorCode::CannotDeleteSelf),

            // Account
            3001 => Ok(ErrorCode::UserNotFound),
            3002 => Ok(ErrorCode::PhoneAlreadyRegistered),
            3003 => Ok(ErrorCode::AccountPendingApproval),
            3004 => Ok(ErrorCode::PasswordTooShort),
            3005 => Ok(ErrorCode::AddressRequired),
            3006 => Ok(ErrorCode::InvalidPushToken),
            3007 => Ok(ErrorCode::LocationRequired),
            3008 => Ok(ErrorCode::InvalidRole),
            3101 => Ok(ErrorCode::NotificationNotFound),
            3201 => Ok(ErrorCode::RatingInvalidScore),
            3202 => Ok(ErrorCode::RatingTargetInvalid),
            3203 => Ok(ErrorCode::CannotRateSelf),
            3301 => Ok(ErrorCode::LocationNotFound),

            // Order
            4001 => Ok(ErrorCode::OrderNotFound),
            4002 => Ok(ErrorCode::OrderEmpty),
            4003 => Ok(ErrorCode::OrderInvalidTransition),
            4004 => Ok(ErrorCode::OrderNotCancellable),
            4005 => Ok(ErrorCode::InsufficientQuantity),
            4006 => Ok(ErrorCode::DeliveryLocationRequired),
            4007 => Ok(ErrorCode::OrderFarmerMismatch),

            // Payment
            5001 => Ok(ErrorCode::PaymentFailed),
            5002 => Ok(ErrorCode::PaymentInvalidMethod),
            5003 => Ok(ErrorCode::PaymentAlreadyPaid),
            5004 => Ok(ErrorCode::PaymentSignatureInvalid),
            5005 => Ok(ErrorCode::PaymentTransactionMismatch),
            5006 => Ok(ErrorCode::PaymentGatewayError),
            5007 => Ok(ErrorCode::PaymentTransactionMissing),
            5008 => Ok(ErrorCode::CheckoutFieldMissing),

            // Product
            6001 => Ok(ErrorCode::ProductNotFound),
            6002 => Ok(ErrorCode::ProductInvalidPrice),
            6003 => Ok(ErrorCode::ProductOutOfStock),
            6004 => Ok(ErrorCode::ProductNotApproved),
            6005 => Ok(ErrorCode::ProductInvalidStatus),

            // Market
            7001 => Ok(ErrorCode::NegotiationNotFound),
            7002 => Ok(ErrorCode::NegotiationClosed),
            7003 => Ok(ErrorCode::NegotiationInvalidAction),
            7004 => Ok(ErrorCode::CannotNegotiateOwnProduct),
            7101 => Ok(ErrorCode::GroupSaleNotFound),
            7102 => Ok(ErrorCode::GroupSaleNotOpen),
            7103 => Ok(ErrorCode::GroupSaleAlreadyJoined),
            7104 => Ok(ErrorCode::GroupSaleCapacityExceeded),
            7105 => Ok(ErrorCode::GroupSaleDeadlinePassed),
            7106 => Ok(ErrorCode::GroupSaleInvalidTransition),
            7201 => Ok(ErrorCode::HaatEventNotFound),
            7202 => Ok(ErrorCode::HaatEventOutOfRange),
            7203 => Ok(ErrorCode::HaatEventAlreadyRegistered),
            7204 => Ok(ErrorCode::HaatEventRegistrationClosed),
            7205 => Ok(ErrorCode::HaatEventInvalidTransition),

            // Expense
            8001 => Ok(ErrorCode::ExpenseProjectNotFound),
            8002 => Ok(ErrorCode::ExpenseNotFound),
            8003 => Ok(ErrorCode::ExpenseInvalidCategory),

            // System
            9001 => Ok(ErrorCode::InternalError),
            9002 => Ok(ErrorCode::DatabaseError),
            9003 => Ok(ErrorCode::NetworkError),
            9004 => Ok(ErrorCode::TimeoutError),
            9005 => Ok(ErrorCode::ConfigError),
            9006 => Ok(ErrorCode::UpstreamError),

            _ => Err(InvalidErrorCode(value)),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
