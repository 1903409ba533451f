//! Background I/O tasks for one connection.
//!
//! The receiver task is the only reader of the stream; the writer task is
//! the only writer. Both close the router when the stream fails; the
//! receiver also closes it if the task ends any other way.
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::codec::FrameReader;
use crate::error::DapError;
use crate::protocol::ProtocolMessage;
use crate::router::{Incoming, MessageRouter};

/// Capacity of the outgoing frame queue.
const WRITER_QUEUE: usize = 64;

/// Closes the router when dropped, so a receiver that stops for any reason,
/// including a panic, never leaves waits hanging.
struct CloseOnExit(Arc<MessageRouter>);

impl Drop for CloseOnExit {
    fn drop(&mut self) {
        // Drop cannot await; hand the close to the runtime if one is running.
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let router = Arc::clone(&self.0);
            runtime.spawn(async move {
                router.close("receiver stopped").await;
            });
        }
    }
}

/// Spawn the task that decodes frames from `reader` and feeds `router`.
///
/// The task runs until the stream ends or a frame fails to decode, then
/// closes the router so every pending and future wait fails.
pub fn spawn_receiver<R>(reader: R, router: Arc<MessageRouter>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let _close = CloseOnExit(Arc::clone(&router));
        let mut frames = FrameReader::new(reader);
        loop {
            let value = match frames.read_message().await {
                Ok(value) => value,
                Err(DapError::ConnectionClosed) => {
                    tracing::debug!("adapter closed the connection");
                    router.close("connection closed by adapter").await;
                    return;
                }
                Err(e) => {
                    tracing::error!(error = %e, "stopping receiver");
                    router.close(&e.to_string()).await;
                    return;
                }
            };

            match ProtocolMessage::from_value(value) {
                Ok(ProtocolMessage::Response(resp)) => {
                    tracing::debug!(
                        request_seq = resp.request_seq,
                        command = %resp.command,
                        success = resp.success,
                        "received response"
                    );
                    router.on_message(Incoming::Response(resp)).await;
                }
                Ok(ProtocolMessage::Event(evt)) => {
                    tracing::debug!(event = %evt.event, "received event");
                    router.on_message(Incoming::Event(evt)).await;
                }
                Ok(ProtocolMessage::Request(req)) => {
                    tracing::debug!(
                        seq = req.seq,
                        command = %req.command,
                        "received reverse request (unhandled)"
                    );
                }
                Err(e) => {
                    tracing::error!(error = %e, "adapter sent a malformed message");
                    router.close("malformed message").await;
                    return;
                }
            }
        }
    })
}

/// Spawn the task that owns `writer` and writes queued frames in order.
///
/// Each queued frame is written whole before the next one starts. Dropping
/// every sender flushes and shuts down the write half.
pub fn spawn_writer<W>(
    writer: W,
    router: Arc<MessageRouter>,
) -> (mpsc::Sender<Vec<u8>>, JoinHandle<()>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<Vec<u8>>(WRITER_QUEUE);
    let handle = tokio::spawn(async move {
        let mut writer = writer;
        while let Some(frame) = rx.recv().await {
            let written = async {
                writer.write_all(&frame).await?;
                writer.flush().await
            }
            .await;
            if let Err(e) = written {
                tracing::warn!(error = %e, "write to adapter failed");
                router.close("write failed").await;
                return;
            }
        }
        if let Err(e) = writer.shutdown().await {
            tracing::debug!(error = %e, "shutting down write half failed");
        }
    });
    (tx, handle)
}
