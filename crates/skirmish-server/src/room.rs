//! Live room: roster state, member connections, and the broadcast queue.
//!
//! Each room owns an unbounded queue drained by one broadcaster task, so
//! broadcasts to a room are FIFO and fan out without blocking the
//! dispatcher. Lock order when both are needed: `info` before `members`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, warn};

use skirmish_core::RoomId;
use skirmish_core::net::framing::{pack_control, pack_message};
use skirmish_core::net::messages::{MessageType, Payload, RoomInfo};

use crate::connection::{Connection, ConnectionId};

#[derive(Debug)]
pub enum RoomEvent {
    /// Pack once, send to every member.
    General(Payload),
    /// Header-only control broadcast.
    TypeOnly(MessageType),
    /// Verbatim relay of already-framed gameplay bytes.
    Raw(Bytes),
    /// Room destroyed; stop the broadcaster.
    Shutdown,
}

pub struct Room {
    pub id: RoomId,
    pub info: Mutex<RoomInfo>,
    members: Mutex<Vec<Arc<Connection>>>,
    game_started: AtomicBool,
    queue: mpsc::UnboundedSender<RoomEvent>,
}

impl Room {
    /// Create the room and start its broadcaster task.
    pub fn spawn(info: RoomInfo) -> Arc<Self> {
        let (queue, rx) = mpsc::unbounded_channel();
        let room = Arc::new(Self {
            id: info.room_id,
            info: Mutex::new(info),
            members: Mutex::new(Vec::new()),
            game_started: AtomicBool::new(false),
            queue,
        });
        tokio::spawn(broadcaster(Arc::clone(&room), rx));
        room
    }

    pub fn enqueue(&self, event: RoomEvent) {
        // Fails only when the broadcaster is already gone.
        let _ = self.queue.send(event);
    }

    pub async fn add_connection(&self, conn: Arc<Connection>) {
        self.members.lock().await.push(conn);
    }

    pub async fn remove_connection(&self, conn_id: ConnectionId) {
        self.members.lock().await.retain(|c| c.id != conn_id);
    }

    pub fn has_started(&self) -> bool {
        self.game_started.load(Ordering::Acquire)
    }

    pub fn set_started(&self) {
        self.game_started.store(true, Ordering::Release);
    }

    pub async fn snapshot(&self) -> RoomInfo {
        self.info.lock().await.clone()
    }

    async fn member_list(&self) -> Vec<Arc<Connection>> {
        self.members.lock().await.clone()
    }
}

async fn broadcaster(room: Arc<Room>, mut rx: mpsc::UnboundedReceiver<RoomEvent>) {
    debug!(room = room.id, "room broadcaster started");
    while let Some(event) = rx.recv().await {
        let frame = match event {
            RoomEvent::Shutdown => break,
            RoomEvent::General(payload) => {
                let encoded = payload
                    .encode()
                    .and_then(|body| pack_message(payload.message_type(), &body));
                match encoded {
                    Ok(frame) => Bytes::from(frame),
                    Err(e) => {
                        warn!(room = room.id, error = %e, "dropping unpackable broadcast");
                        continue;
                    },
                }
            },
            RoomEvent::TypeOnly(message_type) => Bytes::from(pack_control(message_type)),
            RoomEvent::Raw(data) => data,
        };

        for member in room.member_list().await {
            if let Err(e) = member.send_raw(&frame).await {
                // Disconnect cleanup will drop the member; keep fanning out.
                warn!(room = room.id, conn = member.id, error = %e, "broadcast send failed");
            }
        }
    }
    debug!(room = room.id, "room broadcaster stopped");
}
