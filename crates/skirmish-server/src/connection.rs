//! One accepted TCP session.
//!
//! The receive side keeps a single read in flight: `post_receive` arms the
//! reader task, which performs exactly one read and reports it to the
//! dispatcher as an `IoEvent::Received`. The next read is armed only after
//! the dispatcher has digested those bytes.
//!
//! The send side is serialized by a one-permit gate. A sender takes the
//! permit, writes the whole frame, and reports `IoEvent::Sent`; the permit
//! returns when the dispatcher observes that completion. A failed write
//! returns the permit inline so later sends are not wedged behind a
//! completion that will never arrive.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex, Notify, Semaphore};
use tracing::{debug, warn};

use skirmish_core::net::framing::{FrameCodec, MAX_FRAME_SIZE, pack_control, pack_message};
use skirmish_core::net::messages::{MessageType, Payload};

use crate::dispatcher::{EventSender, IoEvent};
use crate::error::ServerError;

pub type ConnectionId = u64;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

pub struct Connection {
    pub id: ConnectionId,
    pub addr: SocketAddr,
    writer: Mutex<OwnedWriteHalf>,
    send_gate: Semaphore,
    recv_pending: AtomicBool,
    read_armed: Notify,
    closed: AtomicBool,
    pub codec: Mutex<FrameCodec>,
    events: EventSender,
}

impl Connection {
    /// Wrap an accepted stream and start its reader task.
    pub fn spawn(stream: TcpStream, addr: SocketAddr, events: EventSender) -> Arc<Self> {
        let (reader, writer) = stream.into_split();
        let conn = Arc::new(Self {
            id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            addr,
            writer: Mutex::new(writer),
            send_gate: Semaphore::new(1),
            recv_pending: AtomicBool::new(false),
            read_armed: Notify::new(),
            closed: AtomicBool::new(false),
            codec: Mutex::new(FrameCodec::new()),
            events,
        });
        tokio::spawn(read_loop(Arc::clone(&conn), reader));
        conn
    }

    /// Arm the next read. Posting while one is already pending is a logged
    /// no-op; there is never more than one read in flight.
    pub fn post_receive(&self) {
        if self.recv_pending.swap(true, Ordering::AcqRel) {
            warn!(conn = self.id, "receive already pending, ignoring");
            return;
        }
        self.read_armed.notify_one();
    }

    pub(crate) fn receive_complete(&self) {
        self.recv_pending.store(false, Ordering::Release);
    }

    /// Tear the session down. Closes the send gate so blocked and future
    /// senders error out instead of waiting on a completion that will
    /// never be observed, and wakes the reader task so it exits and
    /// releases the socket. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.send_gate.close();
        self.read_armed.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Return the send permit once the dispatcher has seen the completion.
    pub(crate) fn complete_send(&self) {
        self.send_gate.add_permits(1);
    }

    pub async fn send_control(&self, message_type: MessageType) -> Result<(), ServerError> {
        self.send_frame(&pack_control(message_type)).await
    }

    pub async fn send_payload(&self, payload: &Payload) -> Result<(), ServerError> {
        let body = payload.encode()?;
        let frame = pack_message(payload.message_type(), &body)?;
        self.send_frame(&frame).await
    }

    /// Relay already-framed bytes untouched.
    pub async fn send_raw(&self, data: &Bytes) -> Result<(), ServerError> {
        self.send_frame(data).await
    }

    pub async fn send_frame(&self, frame: &[u8]) -> Result<(), ServerError> {
        let permit = self
            .send_gate
            .acquire()
            .await
            .map_err(|_| ServerError::ConnectionClosed(self.id))?;
        permit.forget();

        let result = {
            let mut writer = self.writer.lock().await;
            writer.write_all(frame).await
        };
        match result {
            Ok(()) => {
                let _ = self.events.send(IoEvent::Sent { conn: self.id });
                Ok(())
            },
            Err(e) => {
                // The completion will never arrive; hand the permit back so
                // the connection's send path is not wedged forever.
                self.complete_send();
                Err(e.into())
            },
        }
    }
}

async fn read_loop(conn: Arc<Connection>, mut reader: OwnedReadHalf) {
    let mut buf = [0u8; MAX_FRAME_SIZE];
    loop {
        conn.read_armed.notified().await;
        if conn.is_closed() {
            debug!(conn = conn.id, "reader stopping, connection closed");
            break;
        }
        match reader.read(&mut buf).await {
            Ok(0) => {
                debug!(conn = conn.id, "peer closed connection");
                let _ = conn.events.send(IoEvent::Received {
                    conn: conn.id,
                    data: Bytes::new(),
                });
                break;
            },
            Ok(n) => {
                let _ = conn.events.send(IoEvent::Received {
                    conn: conn.id,
                    data: Bytes::copy_from_slice(&buf[..n]),
                });
            },
            Err(e) => {
                debug!(conn = conn.id, error = %e, "read failed");
                let _ = conn.events.send(IoEvent::Received {
                    conn: conn.id,
                    data: Bytes::new(),
                });
                break;
            },
        }
    }
}
