//! Client side of a relay connection
//!
//! A `RelayConnection` is opened once and handed to whatever needs live
//! events (the status view, the CLI publisher).

use futures::{SinkExt, StreamExt};
use serde_json::value::RawValue;
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use super::events::{Channel, RelayFrame, UserEvent};
use crate::error::Result;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// An open connection to the relay's `/cable` endpoint
pub struct RelayConnection {
    socket: Socket,
    url: String,
}

impl RelayConnection {
    /// Connect to a relay endpoint (`ws://host:port/cable`)
    pub async fn connect(url: &str) -> Result<Self> {
        let (socket, _response) = connect_async(url).await?;
        tracing::info!("Connected to relay at {}", url);
        Ok(Self {
            socket,
            url: url.to_string(),
        })
    }

    /// Endpoint this connection was opened against
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Publish a raw payload on `channel`
    pub async fn publish(&mut self, channel: Channel, payload: Box<RawValue>) -> Result<()> {
        self.send_frame(&RelayFrame::new(channel, payload)).await
    }

    /// Publish a user event on the channel it belongs to
    pub async fn publish_event(&mut self, event: &UserEvent) -> Result<()> {
        let frame = RelayFrame::from_event(Channel::for_event(event), event)?;
        self.send_frame(&frame).await
    }

    async fn send_frame(&mut self, frame: &RelayFrame) -> Result<()> {
        self.socket.send(Message::Text(frame.encode()?)).await?;
        Ok(())
    }

    /// Wait for the next relayed frame.
    ///
    /// Returns `None` once the relay closes the connection. Control frames are
    /// skipped.
    pub async fn next_frame(&mut self) -> Option<Result<RelayFrame>> {
        loop {
            match self.socket.next().await? {
                Ok(Message::Text(text)) => return Some(RelayFrame::parse(&text)),
                Ok(Message::Close(_)) => return None,
                Ok(_) => continue,
                Err(e) => return Some(Err(e.into())),
            }
        }
    }

    /// Close the connection
    pub async fn close(mut self) -> Result<()> {
        self.socket.close(None).await?;
        tracing::debug!("Closed relay connection to {}", self.url);
        Ok(())
    }
}
