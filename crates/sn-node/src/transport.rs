use std::sync::atomic::{AtomicU64, Ordering};

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::mpsc::UnboundedSender;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, warn};

/// Handle identifying one live socket inside the node's socket table.
pub type SocketId = u64;

static NEXT_SOCKET_ID: AtomicU64 = AtomicU64::new(1);

/// What the transport reports back to the node's event loop. All chain and
/// consensus state lives on that loop; socket tasks only shuttle frames.
#[derive(Debug)]
pub enum SocketEvent {
    /// A socket opened. `sender` delivers outbound text frames to it;
    /// dropping the sender closes the socket.
    Opened {
        socket: SocketId,
        sender: UnboundedSender<String>,
        dialed: bool,
    },

    /// One inbound text frame.
    Frame { socket: SocketId, text: String },

    /// The socket is gone, whatever the reason.
    Closed { socket: SocketId },
}

/// Bind the WebSocket listener and spawn the accept loop. Returns the port
/// actually bound (relevant when `port` is 0).
pub async fn listen(
    port: u16,
    events: UnboundedSender<SocketEvent>,
) -> std::io::Result<u16> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    let local_port = listener.local_addr()?.port();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    let events = events.clone();
                    tokio::spawn(async move {
                        match tokio_tungstenite::accept_async(stream).await {
                            Ok(socket) => drive(socket, events, false).await,
                            Err(e) => debug!("handshake from {addr} failed: {e}"),
                        }
                    });
                }
                Err(e) => warn!("accept failed: {e}"),
            }
        }
    });

    Ok(local_port)
}

/// Dial one seed peer in the background. Connect failures are logged and
/// otherwise ignored; the caller keeps going with whatever peers answered.
pub fn dial(url: String, events: UnboundedSender<SocketEvent>) {
    tokio::spawn(async move {
        match tokio_tungstenite::connect_async(url.as_str()).await {
            Ok((socket, _)) => {
                info!("Connected to {url}");
                drive(socket, events, true).await;
            }
            Err(e) => warn!("failed to dial {url}: {e}"),
        }
    });
}

/// Own one socket until it dies: pump outbound frames from the node and
/// inbound frames to it, then report the close.
async fn drive<S>(socket: WebSocketStream<S>, events: UnboundedSender<SocketEvent>, dialed: bool)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let id = NEXT_SOCKET_ID.fetch_add(1, Ordering::Relaxed);
    let (mut sink, mut stream) = socket.split();
    let (sender, mut outbound) = tokio::sync::mpsc::unbounded_channel::<String>();

    if events
        .send(SocketEvent::Opened {
            socket: id,
            sender,
            dialed,
        })
        .is_err()
    {
        return;
    }

    let writer = tokio::spawn(async move {
        while let Some(text) = outbound.recv().await {
            if sink.send(WsMessage::Text(text)).await.is_err() {
                break;
            }
        }
        // Channel gone: the node dropped this peer. Say goodbye properly.
        let _ = sink.close().await;
    });

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(WsMessage::Text(text)) => {
                if events
                    .send(SocketEvent::Frame { socket: id, text })
                    .is_err()
                {
                    break;
                }
            }
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!("socket {id} read error: {e}");
                break;
            }
        }
    }

    writer.abort();
    let _ = events.send(SocketEvent::Closed { socket: id });
}
