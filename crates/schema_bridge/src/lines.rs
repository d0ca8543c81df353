//! JSON-lines transport: one envelope per line, host → editor on a reader, editor → host on a
//! writer. Used with stdin/stdout when the editor runs as a child process of its host.
//!
//! Nothing else may write to the outbound stream; route logs to stderr or a file.

use std::sync::Arc;

use tokio::{
    io::{self, AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter},
    sync::mpsc::{self, UnboundedSender},
    task::JoinHandle,
};
use tracing::{error, warn};

use crate::{
    bridge::Bridge,
    envelope::BridgeMsg,
    error::BridgeError,
    transport::{BridgeTransport, EditorInbox},
};

pub struct LineTransport {
    out: UnboundedSender<String>,
    inbox: Arc<EditorInbox>,
}

impl LineTransport {
    /// Spawns the writer task on `writer`. Must be called from within a tokio runtime.
    pub fn spawn<W>(writer: W, inbox: Arc<EditorInbox>) -> (Arc<Self>, JoinHandle<()>)
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (out, mut rx) = mpsc::unbounded_channel::<String>();
        let handle = tokio::spawn(async move {
            let mut w = BufWriter::new(writer);
            while let Some(line) = rx.recv().await {
                if let Err(e) = w.write_all(line.as_bytes()).await {
                    error!("bridge writer error: {e}");
                    break;
                }
                if w.flush().await.is_err() {
                    error!("bridge writer flush error");
                    break;
                }
            }
        });
        (Arc::new(Self { out, inbox }), handle)
    }

    pub fn stdout(inbox: Arc<EditorInbox>) -> (Arc<Self>, JoinHandle<()>) {
        Self::spawn(io::stdout(), inbox)
    }
}

impl BridgeTransport for LineTransport {
    fn post_to_host(&self, msg: BridgeMsg) -> Result<(), BridgeError> {
        let line = serde_json::to_string(&msg).map_err(|e| BridgeError::Encode(e.to_string()))?;
        self.out
            .send(format!("{line}\n"))
            .map_err(|_| BridgeError::Transport("line writer has stopped".into()))
    }

    fn post_to_editor(&self, msg: BridgeMsg) {
        self.inbox.deliver(msg);
    }
}

/// Reads envelopes from `reader` until EOF, handing each valid one to `bridge`.
/// Blank lines are skipped; malformed or wrong-version lines are logged and dropped.
pub async fn pump<R>(reader: R, bridge: &Bridge) -> io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut accepted = 0;
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match BridgeMsg::decode_line(line) {
            Ok(msg) => {
                bridge.handle_from_host(msg);
                accepted += 1;
            }
            Err(err) => warn!(error = %err, "dropping inbound line"),
        }
    }
    Ok(accepted)
}

pub async fn pump_stdin(bridge: &Bridge) -> io::Result<usize> {
    pump(BufReader::new(io::stdin()), bridge).await
}
