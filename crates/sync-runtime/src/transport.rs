//! Physical connection: a pair of text-frame channels behind a trait.

use std::future::Future;

use futures_util::{SinkExt, StreamExt};
use sync_core::{SyncError, SyncErrorCategory};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, warn};

const LINK_BUFFER: usize = 256;

/// An open connection. Dropping `outbound` closes it from the client side;
/// `inbound` yields `None` once the peer is gone.
#[derive(Debug)]
pub struct TransportLink {
    pub outbound: mpsc::Sender<String>,
    pub inbound: mpsc::Receiver<String>,
}

/// Opens links to the push server.
pub trait Transport: Send + Sync + 'static {
    fn open(&self) -> impl Future<Output = Result<TransportLink, SyncError>> + Send;
}

/// Websocket transport carrying one JSON event per text frame.
#[derive(Debug, Clone)]
pub struct WsTransport {
    url: String,
}

impl WsTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Transport for WsTransport {
    async fn open(&self) -> Result<TransportLink, SyncError> {
        let (socket, _) = connect_async(self.url.as_str()).await.map_err(|err| {
            SyncError::new(
                SyncErrorCategory::Network,
                "transport_connect_failed",
                format!("connect to {} failed: {err}", self.url),
            )
        })?;
        debug!(url = %self.url, "websocket connected");

        let (mut sink, mut stream) = socket.split();
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<String>(LINK_BUFFER);
        let (inbound_tx, inbound_rx) = mpsc::channel::<String>(LINK_BUFFER);
        let (pong_tx, mut pong_rx) = mpsc::unbounded_channel::<Message>();

        tokio::spawn(async move {
            loop {
                let message = tokio::select! {
                    frame = outbound_rx.recv() => match frame {
                        Some(frame) => Message::Text(frame.into()),
                        None => break,
                    },
                    Some(pong) = pong_rx.recv() => pong,
                };
                if let Err(err) = sink.send(message).await {
                    warn!(error = %err, "websocket write failed");
                    return;
                }
            }
            let _ = sink.close().await;
        });

        tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                match frame {
                    Ok(Message::Text(text)) => {
                        if inbound_tx.send(text.to_string()).await.is_err() {
                            break;
                        }
                    }
                    Ok(Message::Ping(payload)) => {
                        let _ = pong_tx.send(Message::Pong(payload));
                    }
                    Ok(Message::Close(frame)) => {
                        debug!(?frame, "websocket closed by peer");
                        break;
                    }
                    Ok(_) => {}
                    Err(err) => {
                        warn!(error = %err, "websocket read failed");
                        break;
                    }
                }
            }
        });

        Ok(TransportLink {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::{net::TcpListener, time::timeout};
    use tokio_tungstenite::accept_async;

    #[tokio::test]
    async fn pumps_text_frames_both_ways() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept");
            let mut ws = accept_async(stream).await.expect("handshake");
            let first = ws.next().await.expect("frame").expect("frame ok");
            ws.send(Message::Text(format!("echo:{}", first.to_text().expect("text")).into()))
                .await
                .expect("echo");
            ws.close(None).await.expect("close");
        });

        let transport = WsTransport::new(format!("ws://{addr}"));
        let mut link = transport.open().await.expect("open");
        link.outbound.send("hello".to_owned()).await.expect("send");

        let reply = timeout(Duration::from_secs(5), link.inbound.recv())
            .await
            .expect("reply timeout");
        assert_eq!(reply.as_deref(), Some("echo:hello"));

        let closed = timeout(Duration::from_secs(5), link.inbound.recv())
            .await
            .expect("close timeout");
        assert_eq!(closed, None);
        server.await.expect("server task");
    }

    #[tokio::test]
    async fn connect_failure_is_a_network_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        drop(listener);

        let err = WsTransport::new(format!("ws://{addr}"))
            .open()
            .await
            .expect_err("nothing is listening");
        assert_eq!(err.code, "transport_connect_failed");
        assert!(err.is_retryable());
    }
}
