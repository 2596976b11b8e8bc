// Session — per-connection protocol handler
//
// Each accepted connection gets one Session driving a strictly sequential
// read loop (length, body, dispatch, repeat) plus one writer task draining
// the session's outbound queue. Forwards from other sessions land on the
// queue, so the writer is the only task ever writing to the socket.

use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::protocol::codec;
use crate::protocol::envelope::{Envelope, ProtocolError};
use crate::protocol::frame::{self, FrameError};
use crate::server::registry::{Registry, SessionHandle, SessionId};
use crate::sink::{sanitize_filename, FileSink};

/// Longest slice of a rejected body worth quoting in the log.
const BODY_PREVIEW_LEN: usize = 200;

pub(crate) struct Session {
    id: SessionId,
    peer: SocketAddr,
    registry: Arc<Registry>,
    sink: Arc<dyn FileSink>,
    max_frame_len: usize,
    /// Name most recently claimed over this connection, if any.
    registered_name: Option<String>,
    /// Our own routing handle; clones of it go into the registry.
    handle: SessionHandle,
}

impl Session {
    /// Take ownership of an accepted connection: split it, start the
    /// outbound writer, and drive the read loop on its own task.
    ///
    /// The session stays alive exactly as long as its tasks hold it; the
    /// registry only ever holds routing handles.
    pub(crate) fn spawn(
        socket: TcpStream,
        peer: SocketAddr,
        registry: Arc<Registry>,
        sink: Arc<dyn FileSink>,
        max_frame_len: usize,
    ) {
        let (reader, writer) = socket.into_split();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let id = SessionId::next();

        let session = Session {
            id,
            peer,
            registry,
            sink,
            max_frame_len,
            registered_name: None,
            handle: SessionHandle::new(id, outbound_tx),
        };

        tokio::spawn(write_loop(id, writer, outbound_rx));
        tokio::spawn(session.run(reader));
    }

    /// Read loop: one frame at a time until the transport closes or the
    /// stream can no longer be trusted to resynchronize.
    async fn run(mut self, mut reader: OwnedReadHalf) {
        debug!("session {}: connected from {}", self.id, self.peer);

        loop {
            let body = match frame::read_frame(&mut reader, self.max_frame_len).await {
                Ok(body) => body,
                Err(FrameError::TooLarge { len, max }) => {
                    warn!(
                        "session {}: declared frame length {} exceeds limit {}, closing",
                        self.id, len, max
                    );
                    break;
                }
                Err(FrameError::Io(e)) if e.kind() == ErrorKind::UnexpectedEof => {
                    debug!("session {}: peer closed the connection", self.id);
                    break;
                }
                Err(FrameError::Io(e)) => {
                    warn!("session {}: read error: {}", self.id, e);
                    break;
                }
            };

            match Envelope::parse(&body) {
                Ok(envelope) => self.dispatch(envelope, &body),
                // The frame boundary was honored, so a bad body costs one
                // message, not the connection.
                Err(e) => {
                    let preview =
                        String::from_utf8_lossy(&body[..body.len().min(BODY_PREVIEW_LEN)]);
                    warn!(
                        "session {}: dropping invalid envelope: {} (body starts {:?})",
                        self.id, e, preview
                    );
                }
            }
        }

        self.close();
    }

    /// Act on one validated envelope. `body` is the exact frame body it was
    /// parsed from, kept so forwarding can reuse the original bytes.
    fn dispatch(&mut self, envelope: Envelope, body: &[u8]) {
        match envelope {
            Envelope::Register { name } => {
                info!("session {}: registered name {:?}", self.id, name);
                self.registered_name = Some(name.clone());
                self.registry.register(name, self.handle.clone());
            }

            Envelope::Text {
                sender, receiver, ..
            } => match self.registry.lookup(&receiver) {
                Some(target) => {
                    // Re-framing the received body reproduces the sender's
                    // bytes exactly; nothing is re-encoded.
                    if target.forward(frame::encode_frame(body)) {
                        info!(
                            "session {}: text from {:?} relayed to {:?}",
                            self.id, sender, receiver
                        );
                    } else {
                        info!(
                            "session {}: receiver {:?} hung up, text from {:?} dropped",
                            self.id, receiver, sender
                        );
                    }
                }
                None => info!(
                    "session {}: receiver {:?} not registered, text from {:?} dropped",
                    self.id, receiver, sender
                ),
            },

            Envelope::File {
                sender,
                receiver,
                filename,
                data,
            } => {
                let bytes = match codec::decode(&data) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        warn!(
                            "session {}: dropping file {:?} from {:?}: {}",
                            self.id,
                            filename,
                            sender,
                            ProtocolError::InvalidPayload(e)
                        );
                        return;
                    }
                };
                let name = sanitize_filename(&filename);
                match self.sink.write(&name, &bytes) {
                    Ok(path) => info!(
                        "session {}: file {:?} from {:?} for {:?} stored at {} ({} bytes)",
                        self.id,
                        name,
                        sender,
                        receiver,
                        path.display(),
                        bytes.len()
                    ),
                    Err(e) => error!(
                        "session {}: cannot store file {:?} from {:?}: {}",
                        self.id, name, sender, e
                    ),
                }
            }
        }
    }

    /// Teardown: sweep this session's registry entries, then let the
    /// outbound sender drop so the writer finishes any queued frames and
    /// releases the write half.
    fn close(&mut self) {
        match self.registered_name.take() {
            Some(name) => info!(
                "session {}: disconnected from {}, dropping registration {:?}",
                self.id, self.peer, name
            ),
            None => debug!("session {}: disconnected from {}", self.id, self.peer),
        }
        self.registry.remove_session(self.id);
    }
}

/// Drain the outbound queue, one whole frame per write.
///
/// Concurrent forwards from other sessions serialize here, which is what
/// keeps two frames from ever interleaving on the wire. Exits when every
/// sender is gone (session teardown) or the transport fails; dropping the
/// write half then shuts down the write direction.
async fn write_loop(
    id: SessionId,
    mut writer: OwnedWriteHalf,
    mut outbound: mpsc::UnboundedReceiver<Vec<u8>>,
) {
    while let Some(frame) = outbound.recv().await {
        if let Err(e) = writer.write_all(&frame).await {
            warn!("session {}: outbound write failed: {}", id, e);
            break;
        }
    }
    debug!("session {}: outbound writer finished", id);
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::io;
    use std::path::PathBuf;

    use parking_lot::Mutex;

    /// Sink that remembers every write instead of touching the filesystem.
    #[derive(Default)]
    struct RecordingSink {
        files: Mutex<Vec<(String, Vec<u8>)>>,
    }

    impl FileSink for RecordingSink {
        fn write(&self, name: &str, bytes: &[u8]) -> io::Result<PathBuf> {
            self.files.lock().push((name.to_string(), bytes.to_vec()));
            Ok(PathBuf::from(name))
        }
    }

    /// Sink that refuses every write.
    struct FailingSink;

    impl FileSink for FailingSink {
        fn write(&self, _name: &str, _bytes: &[u8]) -> io::Result<PathBuf> {
            Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "sink refused the write",
            ))
        }
    }

    fn test_session(
        sink: Arc<dyn FileSink>,
    ) -> (Session, mpsc::UnboundedReceiver<Vec<u8>>, Arc<Registry>) {
        let registry = Arc::new(Registry::new());
        let (tx, rx) = mpsc::unbounded_channel();
        let id = SessionId::next();
        let session = Session {
            id,
            peer: "127.0.0.1:9".parse().expect("addr"),
            registry: Arc::clone(&registry),
            sink,
            max_frame_len: frame::MAX_FRAME_LEN,
            registered_name: None,
            handle: SessionHandle::new(id, tx),
        };
        (session, rx, registry)
    }

    /// Serialize an envelope and hand both forms to `dispatch`, the way the
    /// read loop does.
    fn dispatch(session: &mut Session, envelope: Envelope) -> Vec<u8> {
        let body = envelope.to_wire_bytes().expect("serialize");
        let parsed = Envelope::parse(&body).expect("parse");
        session.dispatch(parsed, &body);
        body
    }

    fn register_peer(registry: &Registry, name: &str) -> mpsc::UnboundedReceiver<Vec<u8>> {
        let (tx, rx) = mpsc::unbounded_channel();
        registry.register(name.to_string(), SessionHandle::new(SessionId::next(), tx));
        rx
    }

    #[test]
    fn test_register_claims_name_in_registry() {
        let (mut session, _rx, registry) = test_session(Arc::new(RecordingSink::default()));

        dispatch(
            &mut session,
            Envelope::Register {
                name: "alice".to_string(),
            },
        );

        let found = registry.lookup("alice").expect("alice registered");
        assert_eq!(found.id(), session.id);
        assert_eq!(session.registered_name.as_deref(), Some("alice"));
    }

    #[test]
    fn test_text_forwards_the_original_frame_bytes() {
        let (mut session, _rx, registry) = test_session(Arc::new(RecordingSink::default()));
        let mut bob_rx = register_peer(&registry, "bob");

        let body = dispatch(
            &mut session,
            Envelope::Text {
                sender: "alice".to_string(),
                receiver: "bob".to_string(),
                data: codec::encode(b"hi"),
            },
        );

        let forwarded = bob_rx.try_recv().expect("frame reaches bob's queue");
        assert_eq!(forwarded, frame::encode_frame(&body));
    }

    #[test]
    fn test_text_to_unregistered_receiver_is_dropped() {
        let (mut session, mut own_rx, _registry) = test_session(Arc::new(RecordingSink::default()));

        dispatch(
            &mut session,
            Envelope::Text {
                sender: "alice".to_string(),
                receiver: "nobody".to_string(),
                data: codec::encode(b"hi"),
            },
        );

        // Nothing echoes back to the sender either.
        assert!(own_rx.try_recv().is_err());
    }

    #[test]
    fn test_text_to_hung_up_receiver_is_dropped() {
        let (mut session, _rx, registry) = test_session(Arc::new(RecordingSink::default()));
        let bob_rx = register_peer(&registry, "bob");
        drop(bob_rx);

        // Must not panic and must not disturb the session.
        dispatch(
            &mut session,
            Envelope::Text {
                sender: "alice".to_string(),
                receiver: "bob".to_string(),
                data: codec::encode(b"hi"),
            },
        );
    }

    #[test]
    fn test_file_reaches_sink_with_sanitized_name_and_decoded_bytes() {
        let sink = Arc::new(RecordingSink::default());
        let (mut session, _rx, _registry) = test_session(Arc::clone(&sink) as Arc<dyn FileSink>);

        dispatch(
            &mut session,
            Envelope::File {
                sender: "alice".to_string(),
                receiver: "bob".to_string(),
                filename: "../../etc/passwd".to_string(),
                data: codec::encode(&[0x01, 0x02]),
            },
        );

        let files = sink.files.lock();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].0, ".._.._etc_passwd");
        assert_eq!(files[0].1, vec![0x01, 0x02]);
    }

    #[test]
    fn test_file_is_stored_not_forwarded() {
        let sink = Arc::new(RecordingSink::default());
        let (mut session, _rx, registry) = test_session(Arc::clone(&sink) as Arc<dyn FileSink>);
        let mut bob_rx = register_peer(&registry, "bob");

        dispatch(
            &mut session,
            Envelope::File {
                sender: "alice".to_string(),
                receiver: "bob".to_string(),
                filename: "notes.txt".to_string(),
                data: codec::encode(b"contents"),
            },
        );

        assert!(bob_rx.try_recv().is_err(), "files never reach the receiver");
        assert_eq!(sink.files.lock().len(), 1);
    }

    #[test]
    fn test_file_with_undecodable_payload_is_dropped() {
        let sink = Arc::new(RecordingSink::default());
        let (mut session, _rx, _registry) = test_session(Arc::clone(&sink) as Arc<dyn FileSink>);

        // Bypass the client-side encoder to craft an invalid payload.
        let body = br#"{"type":"FILE","sender":"a","receiver":"b","filename":"f","data":"!!!"}"#;
        let envelope = Envelope::parse(body).expect("parse");
        session.dispatch(envelope, body);

        assert!(sink.files.lock().is_empty());
    }

    #[test]
    fn test_sink_failure_does_not_disturb_the_session() {
        let (mut session, _rx, registry) = test_session(Arc::new(FailingSink));

        dispatch(
            &mut session,
            Envelope::File {
                sender: "alice".to_string(),
                receiver: "bob".to_string(),
                filename: "notes.txt".to_string(),
                data: codec::encode(b"contents"),
            },
        );

        // The session still works: it can register afterwards.
        dispatch(
            &mut session,
            Envelope::Register {
                name: "alice".to_string(),
            },
        );
        assert!(registry.lookup("alice").is_some());
    }

    #[test]
    fn test_reregistration_keeps_earlier_name_until_close() {
        let (mut session, _rx, registry) = test_session(Arc::new(RecordingSink::default()));

        dispatch(
            &mut session,
            Envelope::Register {
                name: "alice".to_string(),
            },
        );
        dispatch(
            &mut session,
            Envelope::Register {
                name: "alt".to_string(),
            },
        );

        // Claiming a second name does not release the first.
        assert!(registry.lookup("alice").is_some());
        assert!(registry.lookup("alt").is_some());
        assert_eq!(session.registered_name.as_deref(), Some("alt"));

        session.close();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_close_sweeps_only_own_entries() {
        let (mut session, _rx, registry) = test_session(Arc::new(RecordingSink::default()));
        let _bob_rx = register_peer(&registry, "bob");

        dispatch(
            &mut session,
            Envelope::Register {
                name: "alice".to_string(),
            },
        );
        session.close();

        assert!(registry.lookup("alice").is_none());
        assert!(registry.lookup("bob").is_some());
    }
}
