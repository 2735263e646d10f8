//! Transport seam for the edit channel.
//!
//! A [`Connector`] produces one duplex [`Connection`] per session: a sink of
//! outbound code payloads and a stream of inbound feedback payloads. One
//! message is one opaque string; framing is left to the transport.

use std::future::Future;
use std::pin::Pin;

use futures::{Sink, SinkExt, Stream, StreamExt, future};
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;

use crate::config::Endpoints;
use crate::error::TransportError;
use crate::identity::SubmissionId;

pub type FrameSink = Pin<Box<dyn Sink<String, Error = TransportError> + Send>>;
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String, TransportError>> + Send>>;

/// One established duplex connection.
pub struct Connection {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

/// Establishes edit channel connections addressed by submission id.
pub trait Connector: Send + Sync + 'static {
    fn connect(
        &self,
        id: &SubmissionId,
    ) -> impl Future<Output = Result<Connection, TransportError>> + Send;
}

/// WebSocket connector speaking the `/ws/feedback/{submission_id}` contract.
#[derive(Clone, Debug)]
pub struct WsConnector {
    endpoints: Endpoints,
}

impl WsConnector {
    pub fn new(endpoints: Endpoints) -> Self {
        Self { endpoints }
    }
}

impl Connector for WsConnector {
    async fn connect(&self, id: &SubmissionId) -> Result<Connection, TransportError> {
        let url = self.endpoints.feedback_url(id);
        debug!("Connecting edit channel to {}", url);

        let (ws_stream, _) = tokio_tungstenite::connect_async(url.as_str()).await?;
        let (ws_write, ws_read) = ws_stream.split();

        let sink = ws_write
            .sink_map_err(TransportError::from)
            .with(|code: String| future::ready(Ok::<_, TransportError>(Message::Text(code.into()))));

        let stream = ws_read.filter_map(|frame| {
            future::ready(match frame {
                Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
                Ok(Message::Binary(bytes)) => Some(Ok(String::from_utf8_lossy(&bytes).into_owned())),
                Ok(Message::Close(_)) => Some(Err(TransportError::Closed)),
                // Ping/Pong are answered by tungstenite itself
                Ok(_) => None,
                Err(e) => Some(Err(TransportError::from(e))),
            })
        });

        Ok(Connection {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        })
    }
}
