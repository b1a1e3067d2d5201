//! Reconnecting coordinator client used by barber and customer
//! integrations. Retries abnormal closes on a fixed delay with a capped
//! attempt count, re-authenticating on every attempt; a normal close
//! never triggers a reconnect.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use crate::session::protocol::{ClientFrame, Envelope, ServerFrame};

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base websocket endpoint, e.g. `ws://localhost:3000/ws`.
    pub url: String,
    pub retry_delay: Duration,
    pub max_attempts: u32,
    pub heartbeat_interval: Duration,
}

impl ClientConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            retry_delay: Duration::from_secs(3),
            max_attempts: 5,
            heartbeat_interval: Duration::from_secs(10),
        }
    }
}

pub struct ClientChannels {
    pub outbound: mpsc::UnboundedSender<ClientFrame>,
    pub inbound: mpsc::UnboundedReceiver<ServerFrame>,
}

pub struct CoordinatorClient {
    config: ClientConfig,
    outbound_rx: mpsc::UnboundedReceiver<ClientFrame>,
    inbound_tx: mpsc::UnboundedSender<ServerFrame>,
    seq: u64,
}

enum LinkClosed {
    Normal,
    Abnormal,
}

impl CoordinatorClient {
    pub fn new(config: ClientConfig) -> (Self, ClientChannels) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        (
            Self {
                config,
                outbound_rx,
                inbound_tx,
                seq: 0,
            },
            ClientChannels {
                outbound: outbound_tx,
                inbound: inbound_rx,
            },
        )
    }

    /// Connection loop. `token_source` is consulted on every attempt so
    /// each reconnect re-authenticates with a fresh token.
    pub async fn run<T>(mut self, mut token_source: T)
    where
        T: FnMut() -> String + Send,
    {
        let mut attempts = 0u32;

        loop {
            if attempts >= self.config.max_attempts {
                error!(
                    attempts,
                    "giving up on coordinator connection after max attempts"
                );
                return;
            }

            let token = token_source();
            let url = format!("{}?token={}", self.config.url, token);

            match connect_async(url.as_str()).await {
                Ok((stream, _response)) => {
                    info!(url = %self.config.url, "connected to coordinator");
                    attempts = 0;

                    match self.drive(stream).await {
                        LinkClosed::Normal => {
                            info!("coordinator connection closed normally");
                            return;
                        }
                        LinkClosed::Abnormal => {
                            attempts += 1;
                            warn!(
                                attempt = attempts,
                                "connection lost; retrying in {:?}", self.config.retry_delay
                            );
                            tokio::time::sleep(self.config.retry_delay).await;
                        }
                    }
                }
                Err(err) => {
                    attempts += 1;
                    error!(error = %err, attempt = attempts, "failed to connect to coordinator");
                    tokio::time::sleep(self.config.retry_delay).await;
                }
            }
        }
    }

    async fn drive(
        &mut self,
        stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    ) -> LinkClosed {
        let (mut write, mut read) = stream.split();
        let mut heartbeat = tokio::time::interval(self.config.heartbeat_interval);

        // Field borrows split so the select arms do not fight over self.
        let outbound_rx = &mut self.outbound_rx;
        let inbound_tx = &self.inbound_tx;
        let seq = &mut self.seq;

        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    let envelope = stamp(seq, ClientFrame::Heartbeat);
                    if send_envelope(&mut write, &envelope).await.is_err() {
                        return LinkClosed::Abnormal;
                    }
                }
                frame = outbound_rx.recv() => match frame {
                    Some(frame) => {
                        let envelope = stamp(seq, frame);
                        if send_envelope(&mut write, &envelope).await.is_err() {
                            return LinkClosed::Abnormal;
                        }
                    }
                    // Caller dropped the outbound channel: explicit close.
                    None => {
                        let _ = write.send(Message::Close(None)).await;
                        return LinkClosed::Normal;
                    }
                },
                msg = read.next() => match msg {
                    Some(Ok(Message::Text(text))) => match serde_json::from_str::<ServerFrame>(&text) {
                        Ok(frame) => {
                            if inbound_tx.send(frame).is_err() {
                                let _ = write.send(Message::Close(None)).await;
                                return LinkClosed::Normal;
                            }
                        }
                        Err(err) => debug!(error = %err, "ignoring unparseable frame"),
                    },
                    Some(Ok(Message::Close(close))) => {
                        return classify_close(close.map(|frame| frame.code));
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        warn!(error = %err, "websocket read error");
                        return LinkClosed::Abnormal;
                    }
                    None => return LinkClosed::Abnormal,
                },
            }
        }
    }
}

/// Stamps an outbound frame with the next sequence number. The server
/// relies on this for duplicate suppression across reconnects.
fn stamp(seq: &mut u64, frame: ClientFrame) -> Envelope {
    *seq += 1;
    Envelope { seq: *seq, frame }
}

fn classify_close(code: Option<CloseCode>) -> LinkClosed {
    match code {
        Some(CloseCode::Normal) | Some(CloseCode::Away) | None => LinkClosed::Normal,
        Some(_) => LinkClosed::Abnormal,
    }
}

async fn send_envelope<S>(write: &mut S, envelope: &Envelope) -> Result<(), ()>
where
    S: SinkExt<Message> + Unpin,
{
    let json = serde_json::to_string(envelope).map_err(|_| ())?;
    write.send(Message::Text(json)).await.map_err(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelopes_are_stamped_with_increasing_seq() {
        let mut seq = 0u64;

        let first = stamp(&mut seq, ClientFrame::Heartbeat);
        let second = stamp(&mut seq, ClientFrame::ToggleOnline { is_online: true });

        assert_eq!(first.seq, 1);
        assert_eq!(second.seq, 2);
    }

    #[test]
    fn normal_close_codes_do_not_reconnect() {
        assert!(matches!(
            classify_close(Some(CloseCode::Normal)),
            LinkClosed::Normal
        ));
        assert!(matches!(classify_close(None), LinkClosed::Normal));
        assert!(matches!(
            classify_close(Some(CloseCode::Abnormal)),
            LinkClosed::Abnormal
        ));
        assert!(matches!(
            classify_close(Some(CloseCode::Error)),
            LinkClosed::Abnormal
        ));
    }
}
