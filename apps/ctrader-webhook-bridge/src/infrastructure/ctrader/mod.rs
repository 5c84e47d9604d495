//! cTrader Open API Adapter
//!
//! Everything that speaks to cTrader: the JSON wire types and codec, the
//! WebSocket [`BrokerClient`](crate::application::ports::BrokerClient)
//! implementation, the heartbeat and reconnect policies, and the session
//! manager that ties them together.
//!
//! # Session lifecycle
//!
//! 1. Connect to `wss://{demo|live}.ctraderapi.com:5036`
//! 2. Send `ProtoOAApplicationAuthReq`, wait for the response
//! 3. Send `ProtoOAAccountAuthReq`, wait for the response
//! 4. Ready: place orders, exchange heartbeats every 10 seconds
//! 5. On loss, back off exponentially and start again at 1

pub mod client;
pub mod codec;
pub mod heartbeat;
pub mod messages;
pub mod mock;
pub mod reconnect;
pub mod session;

pub use client::CTraderClient;
pub use codec::{CodecError, JsonCodec, ORDER_COMMENT};
pub use heartbeat::{HeartbeatAction, HeartbeatConfig, HeartbeatMonitor};
pub use mock::{AuthReply, MockBrokerClient, MockBrokerControl, OrderReply};
pub use reconnect::{ReconnectConfig, ReconnectPolicy};
pub use session::{SessionHandle, SessionManager, SessionManagerConfig};
