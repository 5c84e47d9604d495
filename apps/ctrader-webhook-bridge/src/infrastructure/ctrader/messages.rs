//! cTrader Open API Message Types
//!
//! Wire format types for the JSON flavour of the cTrader Open API. Every
//! frame is an envelope carrying a numeric `payloadType`, an optional
//! `clientMsgId` echoed back on responses, and the message body.
//!
//! ```json
//! {"clientMsgId":"7f0c…","payloadType":2106,"payload":{"ctidTraderAccountId":1,"symbolId":1,"orderType":1,"tradeSide":1,"volume":100}}
//! ```
//!
//! Enumerations travel as their protobuf numeric values.
//!
//! # References
//!
//! - [Open API messages](https://help.ctrader.com/open-api/messages/)
//! - [Model messages](https://help.ctrader.com/open-api/model-messages/)

use serde::{Deserialize, Serialize};

// =============================================================================
// Payload Types
// =============================================================================

/// `ProtoErrorRes`
pub const PROTO_ERROR_RES: u32 = 50;
/// `ProtoHeartbeatEvent`
pub const PROTO_HEARTBEAT_EVENT: u32 = 51;
/// `ProtoOAApplicationAuthReq`
pub const PROTO_OA_APPLICATION_AUTH_REQ: u32 = 2100;
/// `ProtoOAApplicationAuthRes`
pub const PROTO_OA_APPLICATION_AUTH_RES: u32 = 2101;
/// `ProtoOAAccountAuthReq`
pub const PROTO_OA_ACCOUNT_AUTH_REQ: u32 = 2102;
/// `ProtoOAAccountAuthRes`
pub const PROTO_OA_ACCOUNT_AUTH_RES: u32 = 2103;
/// `ProtoOANewOrderReq`
pub const PROTO_OA_NEW_ORDER_REQ: u32 = 2106;
/// `ProtoOAExecutionEvent`
pub const PROTO_OA_EXECUTION_EVENT: u32 = 2126;
/// `ProtoOAOrderErrorEvent`
pub const PROTO_OA_ORDER_ERROR_EVENT: u32 = 2132;
/// `ProtoOAErrorRes`
pub const PROTO_OA_ERROR_RES: u32 = 2142;
/// `ProtoOAAccountsTokenInvalidatedEvent`
pub const PROTO_OA_ACCOUNTS_TOKEN_INVALIDATED_EVENT: u32 = 2147;
/// `ProtoOAClientDisconnectEvent`
pub const PROTO_OA_CLIENT_DISCONNECT_EVENT: u32 = 2148;
/// `ProtoOAAccountDisconnectEvent`
pub const PROTO_OA_ACCOUNT_DISCONNECT_EVENT: u32 = 2164;

// =============================================================================
// Model Enumerations
// =============================================================================

/// `ProtoOAOrderType.MARKET`
pub const ORDER_TYPE_MARKET: i32 = 1;
/// `ProtoOATradeSide.BUY`
pub const TRADE_SIDE_BUY: i32 = 1;
/// `ProtoOATradeSide.SELL`
pub const TRADE_SIDE_SELL: i32 = 2;

/// `ProtoOAExecutionType` values carried by execution events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionType {
    /// `ORDER_ACCEPTED`
    OrderAccepted,
    /// `ORDER_FILLED`
    OrderFilled,
    /// `ORDER_REPLACED`
    OrderReplaced,
    /// `ORDER_CANCELLED`
    OrderCancelled,
    /// `ORDER_EXPIRED`
    OrderExpired,
    /// `ORDER_REJECTED`
    OrderRejected,
    /// `ORDER_CANCEL_REJECTED`
    OrderCancelRejected,
    /// `SWAP`
    Swap,
    /// `DEPOSIT_WITHDRAW`
    DepositWithdraw,
    /// `ORDER_PARTIAL_FILL`
    OrderPartialFill,
    /// `BONUS_DEPOSIT_WITHDRAW`
    BonusDepositWithdraw,
}

impl ExecutionType {
    /// Map the protobuf numeric value.
    #[must_use]
    pub const fn from_code(code: i32) -> Option<Self> {
        match code {
            2 => Some(Self::OrderAccepted),
            3 => Some(Self::OrderFilled),
            4 => Some(Self::OrderReplaced),
            5 => Some(Self::OrderCancelled),
            6 => Some(Self::OrderExpired),
            7 => Some(Self::OrderRejected),
            8 => Some(Self::OrderCancelRejected),
            9 => Some(Self::Swap),
            10 => Some(Self::DepositWithdraw),
            11 => Some(Self::OrderPartialFill),
            12 => Some(Self::BonusDepositWithdraw),
            _ => None,
        }
    }
}

/// Error codes that mean the configured credentials are unusable.
pub const CREDENTIAL_ERROR_CODES: &[&str] = &[
    "CH_CLIENT_AUTH_FAILURE",
    "CH_CLIENT_NOT_AUTHENTICATED",
    "CH_ACCESS_TOKEN_INVALID",
    "CH_CTID_TRADER_ACCOUNT_NOT_FOUND",
    "OA_AUTH_TOKEN_EXPIRED",
    "ACCESS_TOKEN_INVALIDATED",
];

/// Whether `code` reports bad or expired credentials.
#[must_use]
pub fn is_credential_error(code: &str) -> bool {
    CREDENTIAL_ERROR_CODES.contains(&code)
}

// =============================================================================
// Envelope
// =============================================================================

/// Outbound message envelope.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtoMessage<P> {
    /// Correlation id, echoed by the server on responses.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_msg_id: Option<String>,
    /// Numeric payload type.
    pub payload_type: u32,
    /// Message body.
    pub payload: P,
}

/// Inbound envelope with the body left undecoded until the type is known.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMessage {
    /// Correlation id of the request this answers, if any.
    #[serde(default)]
    pub client_msg_id: Option<String>,
    /// Numeric payload type.
    pub payload_type: u32,
    /// Message body.
    #[serde(default)]
    pub payload: serde_json::Value,
}

// =============================================================================
// Requests
// =============================================================================

/// Application authentication request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationAuthReq<'a> {
    /// Application client id.
    pub client_id: &'a str,
    /// Application client secret.
    pub client_secret: &'a str,
}

/// Trading account authentication request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountAuthReq<'a> {
    /// Trading account id.
    pub ctid_trader_account_id: i64,
    /// OAuth access token.
    pub access_token: &'a str,
}

/// New order request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrderReq<'a> {
    /// Trading account id.
    pub ctid_trader_account_id: i64,
    /// Symbol id.
    pub symbol_id: i64,
    /// `ProtoOAOrderType`.
    pub order_type: i32,
    /// `ProtoOATradeSide`.
    pub trade_side: i32,
    /// Volume in hundredths of a unit.
    pub volume: i64,
    /// Free-text order comment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<&'a str>,
}

/// Heartbeat (empty body).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct HeartbeatEvent {}

// =============================================================================
// Responses and Events
// =============================================================================

/// Account authentication response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountAuthRes {
    /// Authorized trading account id.
    pub ctid_trader_account_id: i64,
}

/// Order model, reduced to the fields the bridge reads.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderModel {
    /// Broker order id.
    pub order_id: i64,
}

/// Execution event for an order on the account.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionEvent {
    /// Trading account id.
    #[serde(default)]
    pub ctid_trader_account_id: i64,
    /// `ProtoOAExecutionType`.
    pub execution_type: i32,
    /// Affected order.
    #[serde(default)]
    pub order: Option<OrderModel>,
    /// Error code, set on rejections.
    #[serde(default)]
    pub error_code: Option<String>,
}

/// Order-level error event.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderErrorEvent {
    /// Error code.
    pub error_code: String,
    /// Affected order, if known.
    #[serde(default)]
    pub order_id: Option<i64>,
    /// Error description.
    #[serde(default)]
    pub description: Option<String>,
}

/// Error response (both `ProtoErrorRes` and `ProtoOAErrorRes`).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRes {
    /// Error code, e.g. `CH_CLIENT_AUTH_FAILURE`.
    pub error_code: String,
    /// Error description.
    #[serde(default)]
    pub description: Option<String>,
}

/// Access token for one or more accounts was invalidated.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountsTokenInvalidatedEvent {
    /// Affected accounts.
    #[serde(default)]
    pub ctid_trader_account_ids: Vec<i64>,
    /// Reason given by the server.
    #[serde(default)]
    pub reason: Option<String>,
}

/// Server is closing the client connection.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientDisconnectEvent {
    /// Reason given by the server.
    #[serde(default)]
    pub reason: Option<String>,
}

/// Account was logged out on the server side.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountDisconnectEvent {
    /// Disconnected account id.
    pub ctid_trader_account_id: i64,
}
