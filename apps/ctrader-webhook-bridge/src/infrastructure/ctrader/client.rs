//! cTrader Open API WebSocket Client
//!
//! [`BrokerClient`] adapter over the JSON endpoint (port 5036). Each call to
//! `connect` opens a fresh socket and spawns a reader task that decodes
//! inbound frames into [`BrokerEvent`]s for that connection only. The
//! writer half stays with the client and is driven by the session manager.
//!
//! # Endpoints
//!
//! - Demo: `wss://demo.ctraderapi.com:5036`
//! - Live: `wss://live.ctraderapi.com:5036`

use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::codec::{CodecError, JsonCodec};
use crate::application::ports::{BrokerClient, BrokerClientError, BrokerEvent};
use crate::domain::order::{OrderRequest, RequestId};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

/// Capacity of the per-connection event channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Default upper bound for a single socket write.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

impl From<CodecError> for BrokerClientError {
    fn from(err: CodecError) -> Self {
        Self::Encode(err.to_string())
    }
}

/// WebSocket client for the cTrader Open API.
pub struct CTraderClient {
    codec: JsonCodec,
    writer: Option<WsSink>,
    reader: Option<JoinHandle<()>>,
    account_id: Option<i64>,
    write_timeout: Duration,
}

impl Default for CTraderClient {
    fn default() -> Self {
        Self {
            codec: JsonCodec::default(),
            writer: None,
            reader: None,
            account_id: None,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }
}

impl CTraderClient {
    /// Create a disconnected client.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail any write that has not been flushed within `timeout`.
    #[must_use]
    pub const fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Current per-write limit.
    #[must_use]
    pub const fn write_timeout(&self) -> Duration {
        self.write_timeout
    }

    async fn send_text(&mut self, text: String) -> Result<(), BrokerClientError> {
        let limit = self.write_timeout;
        let writer = self
            .writer
            .as_mut()
            .ok_or(BrokerClientError::NotConnected)?;
        match tokio::time::timeout(limit, writer.send(Message::Text(text.into()))).await {
            Ok(sent) => sent.map_err(|e| BrokerClientError::SendFailed(e.to_string())),
            Err(_) => Err(BrokerClientError::SendFailed(format!(
                "write timed out after {limit:?}"
            ))),
        }
    }

    fn abort_reader(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

impl Drop for CTraderClient {
    fn drop(&mut self) {
        self.abort_reader();
    }
}

#[async_trait]
impl BrokerClient for CTraderClient {
    async fn connect(
        &mut self,
        url: &str,
    ) -> Result<mpsc::Receiver<BrokerEvent>, BrokerClientError> {
        self.close().await;

        tracing::info!(url = %url, "Connecting to cTrader Open API");
        let (ws_stream, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| BrokerClientError::ConnectionFailed(e.to_string()))?;
        let (write, read) = ws_stream.split();

        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        self.writer = Some(write);
        self.reader = Some(tokio::spawn(read_loop(read, self.codec.clone(), event_tx)));

        Ok(event_rx)
    }

    async fn send_app_auth(
        &mut self,
        client_id: &str,
        client_secret: &str,
    ) -> Result<(), BrokerClientError> {
        let json = self.codec.encode_app_auth(client_id, client_secret)?;
        self.send_text(json).await
    }

    async fn send_account_auth(
        &mut self,
        access_token: &str,
        account_id: i64,
    ) -> Result<(), BrokerClientError> {
        let json = self.codec.encode_account_auth(access_token, account_id)?;
        self.account_id = Some(account_id);
        self.send_text(json).await
    }

    async fn send_order(
        &mut self,
        request_id: &RequestId,
        order: &OrderRequest,
    ) -> Result<(), BrokerClientError> {
        let account_id = self.account_id.ok_or(BrokerClientError::NotConnected)?;
        let json = self.codec.encode_new_order(request_id, account_id, order)?;
        tracing::debug!(
            request_id = %request_id,
            symbol_id = order.symbol_id(),
            side = %order.side(),
            "Sending new order request"
        );
        self.send_text(json).await
    }

    async fn send_heartbeat(&mut self) -> Result<(), BrokerClientError> {
        let json = self.codec.encode_heartbeat()?;
        self.send_text(json).await
    }

    async fn close(&mut self) {
        self.abort_reader();
        if let Some(mut writer) = self.writer.take()
            && let Err(e) = writer.close().await
        {
            tracing::debug!(error = %e, "Error closing cTrader socket");
        }
    }
}

/// Decode frames until the socket or the consumer goes away.
async fn read_loop(
    mut read: SplitStream<WsStream>,
    codec: JsonCodec,
    event_tx: mpsc::Sender<BrokerEvent>,
) {
    let reason = loop {
        let text = match read.next().await {
            Some(Ok(Message::Text(text))) => text.as_str().to_string(),
            Some(Ok(Message::Binary(data))) => match String::from_utf8(data.to_vec()) {
                Ok(text) => text,
                Err(_) => {
                    tracing::warn!(len = data.len(), "Received non-UTF8 binary message");
                    continue;
                }
            },
            Some(Ok(Message::Close(frame))) => {
                break frame.map_or_else(
                    || "server sent close frame".to_string(),
                    |f| format!("server sent close frame: {}", f.reason.as_str()),
                );
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => break format!("WebSocket error: {e}"),
            None => break "WebSocket stream ended".to_string(),
        };

        match codec.decode(&text) {
            Ok(Some(event)) => {
                if event_tx.send(event).await.is_err() {
                    return;
                }
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "Failed to decode cTrader message"),
        }
    };

    tracing::info!(reason = %reason, "cTrader connection closed");
    let _ = event_tx.send(BrokerEvent::Disconnected { reason }).await;
}
