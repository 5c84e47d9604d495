//! Open API JSON Codec
//!
//! Encodes outbound requests into JSON text frames and decodes inbound
//! frames into [`BrokerEvent`]s. Frames that carry nothing the session
//! cares about decode to `None`.

use serde::Serialize;

use super::messages::{
    AccountAuthReq, AccountAuthRes, AccountDisconnectEvent, AccountsTokenInvalidatedEvent,
    ApplicationAuthReq, ClientDisconnectEvent, ErrorRes, ExecutionEvent, ExecutionType,
    HeartbeatEvent, NewOrderReq, ORDER_TYPE_MARKET, OrderErrorEvent, PROTO_ERROR_RES,
    PROTO_HEARTBEAT_EVENT, PROTO_OA_ACCOUNT_AUTH_REQ, PROTO_OA_ACCOUNT_AUTH_RES,
    PROTO_OA_ACCOUNT_DISCONNECT_EVENT, PROTO_OA_ACCOUNTS_TOKEN_INVALIDATED_EVENT,
    PROTO_OA_APPLICATION_AUTH_REQ, PROTO_OA_APPLICATION_AUTH_RES,
    PROTO_OA_CLIENT_DISCONNECT_EVENT, PROTO_OA_ERROR_RES, PROTO_OA_EXECUTION_EVENT,
    PROTO_OA_NEW_ORDER_REQ, PROTO_OA_ORDER_ERROR_EVENT, ProtoMessage, RawMessage,
    TRADE_SIDE_BUY, TRADE_SIDE_SELL, is_credential_error,
};
use crate::application::ports::BrokerEvent;
use crate::domain::order::{
    BrokerRejection, ExecutionStatus, OrderAck, OrderRequest, RequestId, TradeSide,
};

/// Comment attached to every order placed by the bridge.
pub const ORDER_COMMENT: &str = "Order from TradingView";

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON encoding/decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Order volume does not convert to a positive number of broker units.
    #[error("order volume rounds to zero broker units")]
    InvalidVolume,
}

/// JSON codec for the cTrader Open API.
#[derive(Debug, Default, Clone)]
pub struct JsonCodec;

impl JsonCodec {
    /// Create a new JSON codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    // =========================================================================
    // Encoding
    // =========================================================================

    /// Encode `ProtoOAApplicationAuthReq`.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn encode_app_auth(
        &self,
        client_id: &str,
        client_secret: &str,
    ) -> Result<String, CodecError> {
        Self::encode(
            None,
            PROTO_OA_APPLICATION_AUTH_REQ,
            &ApplicationAuthReq {
                client_id,
                client_secret,
            },
        )
    }

    /// Encode `ProtoOAAccountAuthReq`.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn encode_account_auth(
        &self,
        access_token: &str,
        account_id: i64,
    ) -> Result<String, CodecError> {
        Self::encode(
            None,
            PROTO_OA_ACCOUNT_AUTH_REQ,
            &AccountAuthReq {
                ctid_trader_account_id: account_id,
                access_token,
            },
        )
    }

    /// Encode `ProtoOANewOrderReq` for a market order, tagged with `request_id`.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidVolume`] if the volume rounds to zero units.
    pub fn encode_new_order(
        &self,
        request_id: &RequestId,
        account_id: i64,
        order: &OrderRequest,
    ) -> Result<String, CodecError> {
        let volume = order.volume_units().ok_or(CodecError::InvalidVolume)?;
        let trade_side = match order.side() {
            TradeSide::Buy => TRADE_SIDE_BUY,
            TradeSide::Sell => TRADE_SIDE_SELL,
        };

        Self::encode(
            Some(request_id.as_str()),
            PROTO_OA_NEW_ORDER_REQ,
            &NewOrderReq {
                ctid_trader_account_id: account_id,
                symbol_id: order.symbol_id(),
                order_type: ORDER_TYPE_MARKET,
                trade_side,
                volume,
                comment: Some(ORDER_COMMENT),
            },
        )
    }

    /// Encode `ProtoHeartbeatEvent`.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn encode_heartbeat(&self) -> Result<String, CodecError> {
        Self::encode(None, PROTO_HEARTBEAT_EVENT, &HeartbeatEvent {})
    }

    fn encode<P: Serialize>(
        client_msg_id: Option<&str>,
        payload_type: u32,
        payload: &P,
    ) -> Result<String, CodecError> {
        let message = ProtoMessage {
            client_msg_id: client_msg_id.map(str::to_string),
            payload_type,
            payload,
        };
        Ok(serde_json::to_string(&message)?)
    }

    // =========================================================================
    // Decoding
    // =========================================================================

    /// Decode an inbound text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is not a valid envelope or a known
    /// payload does not match its schema.
    pub fn decode(&self, text: &str) -> Result<Option<BrokerEvent>, CodecError> {
        let message: RawMessage = serde_json::from_str(text)?;
        let request_id = message.client_msg_id.map(RequestId::from);
        let payload = message.payload;

        let event = match message.payload_type {
            PROTO_HEARTBEAT_EVENT => Some(BrokerEvent::Heartbeat),
            PROTO_OA_APPLICATION_AUTH_RES => Some(BrokerEvent::AppAuthAck),
            PROTO_OA_ACCOUNT_AUTH_RES => {
                let res: AccountAuthRes = serde_json::from_value(payload)?;
                Some(BrokerEvent::AccountAuthAck {
                    account_id: res.ctid_trader_account_id,
                })
            }
            PROTO_OA_EXECUTION_EVENT => {
                let event: ExecutionEvent = serde_json::from_value(payload)?;
                Self::decode_execution(request_id, event)
            }
            PROTO_OA_ORDER_ERROR_EVENT => {
                let event: OrderErrorEvent = serde_json::from_value(payload)?;
                let description = event
                    .description
                    .unwrap_or_else(|| "order error".to_string());
                Some(BrokerEvent::OrderReject {
                    request_id,
                    rejection: BrokerRejection::new(event.error_code, description),
                })
            }
            PROTO_ERROR_RES | PROTO_OA_ERROR_RES => {
                let res: ErrorRes = serde_json::from_value(payload)?;
                let invalid_credentials = is_credential_error(&res.error_code);
                let description = res.description.unwrap_or_else(|| res.error_code.clone());
                Some(BrokerEvent::Error {
                    request_id,
                    rejection: BrokerRejection::new(res.error_code, description),
                    invalid_credentials,
                })
            }
            PROTO_OA_ACCOUNTS_TOKEN_INVALIDATED_EVENT => {
                let event: AccountsTokenInvalidatedEvent = serde_json::from_value(payload)?;
                let description = event
                    .reason
                    .unwrap_or_else(|| "access token invalidated".to_string());
                Some(BrokerEvent::Error {
                    request_id: None,
                    rejection: BrokerRejection::new("ACCESS_TOKEN_INVALIDATED", description),
                    invalid_credentials: true,
                })
            }
            PROTO_OA_CLIENT_DISCONNECT_EVENT => {
                let event: ClientDisconnectEvent = serde_json::from_value(payload)?;
                Some(BrokerEvent::Disconnected {
                    reason: format!(
                        "server closed client connection: {}",
                        event.reason.as_deref().unwrap_or("no reason given")
                    ),
                })
            }
            PROTO_OA_ACCOUNT_DISCONNECT_EVENT => {
                let event: AccountDisconnectEvent = serde_json::from_value(payload)?;
                Some(BrokerEvent::Disconnected {
                    reason: format!("account {} disconnected", event.ctid_trader_account_id),
                })
            }
            other => {
                tracing::trace!(payload_type = other, "Ignoring unhandled payload type");
                None
            }
        };

        Ok(event)
    }

    fn decode_execution(
        request_id: Option<RequestId>,
        event: ExecutionEvent,
    ) -> Option<BrokerEvent> {
        let execution_type = ExecutionType::from_code(event.execution_type)?;

        let status = match execution_type {
            ExecutionType::OrderRejected => {
                let code = event
                    .error_code
                    .unwrap_or_else(|| "ORDER_REJECTED".to_string());
                return Some(BrokerEvent::OrderReject {
                    request_id,
                    rejection: BrokerRejection::new(code, "order rejected by broker"),
                });
            }
            ExecutionType::OrderAccepted => ExecutionStatus::Accepted,
            ExecutionType::OrderFilled => ExecutionStatus::Filled,
            ExecutionType::OrderPartialFill => ExecutionStatus::PartiallyFilled,
            ExecutionType::OrderReplaced => ExecutionStatus::Replaced,
            ExecutionType::OrderCancelled => ExecutionStatus::Cancelled,
            ExecutionType::OrderExpired => ExecutionStatus::Expired,
            ExecutionType::OrderCancelRejected
            | ExecutionType::Swap
            | ExecutionType::DepositWithdraw
            | ExecutionType::BonusDepositWithdraw => return None,
        };

        // events for orders placed by other clients carry no id of ours
        let request_id = request_id?;
        let order_id = event.order.map(|order| order.order_id).unwrap_or_default();
        Some(BrokerEvent::OrderAck {
            ack: OrderAck::new(request_id.clone(), order_id, status),
            request_id,
        })
    }
}
