//! WebSocket push channel.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::protocol::{frame::coding::CloseCode, CloseFrame, Message},
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, warn};

use crate::config::PushConfig;

use super::{CloseReason, PushChannel, PushConnection, PushError, PushFrame};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Push channel over WebSocket. The resource id travels as a query
/// parameter of the endpoint URL.
pub struct WsPushChannel {
    url: String,
    resource_param: String,
    connect_timeout: Duration,
}

impl WsPushChannel {
    pub fn new(config: &PushConfig) -> Self {
        Self {
            url: config.url.clone(),
            resource_param: config.resource_param.clone(),
            connect_timeout: config.connect_timeout(),
        }
    }

    /// Endpoint URL for a resource.
    pub fn channel_url(&self, resource_id: &str) -> String {
        let separator = if self.url.contains('?') { '&' } else { '?' };
        format!(
            "{}{}{}={}",
            self.url,
            separator,
            urlencoding::encode(&self.resource_param),
            urlencoding::encode(resource_id)
        )
    }
}

#[async_trait]
impl PushChannel for WsPushChannel {
    async fn connect(&self, resource_id: &str) -> Result<Box<dyn PushConnection>, PushError> {
        let url = self.channel_url(resource_id);
        debug!(url = %url, "Connecting to push channel");

        // A server may accept TCP and never finish the upgrade
        let (ws, _) = tokio::time::timeout(self.connect_timeout, connect_async(url.as_str()))
            .await
            .map_err(|_| {
                PushError::ConnectionFailed(format!(
                    "Handshake timed out after {}ms",
                    self.connect_timeout.as_millis()
                ))
            })?
            .map_err(|e| PushError::ConnectionFailed(e.to_string()))?;

        debug!(url = %url, "Push channel connected");
        Ok(Box::new(WsPushConnection { ws }))
    }

    fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }
}

struct WsPushConnection {
    ws: WsStream,
}

#[async_trait]
impl PushConnection for WsPushConnection {
    async fn recv(&mut self) -> Result<PushFrame, PushError> {
        loop {
            match self.ws.next().await {
                Some(Ok(Message::Text(text))) => return Ok(PushFrame::Text(text)),
                Some(Ok(Message::Binary(data))) => match String::from_utf8(data) {
                    Ok(text) => return Ok(PushFrame::Text(text)),
                    Err(_) => {
                        warn!("Discarding non UTF-8 binary frame");
                        continue;
                    }
                },
                Some(Ok(Message::Close(frame))) => {
                    return Ok(match frame {
                        Some(frame) => PushFrame::Closed {
                            code: Some(u16::from(frame.code)),
                            reason: frame.reason.into_owned(),
                        },
                        None => PushFrame::Closed {
                            code: None,
                            reason: String::new(),
                        },
                    });
                }
                // Ping/pong are answered by tungstenite
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(PushError::Protocol(e.to_string())),
                None => {
                    return Ok(PushFrame::Closed {
                        code: None,
                        reason: String::new(),
                    })
                }
            }
        }
    }

    async fn close(&mut self, reason: CloseReason) -> Result<(), PushError> {
        let frame = CloseFrame {
            code: CloseCode::from(reason.code()),
            reason: reason.as_str().into(),
        };
        self.ws
            .close(Some(frame))
            .await
            .map_err(|e| PushError::Protocol(e.to_string()))
    }
}
