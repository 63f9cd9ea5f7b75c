//! Process-wide session and room orchestration.
//!
//! The registry owns four independent lock domains: room name reservations,
//! live rooms, seats (which room and player name a connection holds), and
//! the connections themselves. Locks from different domains are never held
//! at the same time; each operation takes what it needs in sequence.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use bytes::Bytes;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use skirmish_core::RoomId;
use skirmish_core::net::framing::Frame;
use skirmish_core::net::messages::{
    CT_ASSIGN_USERNAME, CT_CHAT_MESSAGE, CT_CLIENT_POSITION, CT_CREATE_ROOM, CT_ENTER_ROOM,
    CT_REJECT_CREATE_ROOM, CT_REJECT_ENTER_ROOM, CT_REJECT_START_GAME, CT_START_GAME, DataMsg,
    KEY_LIMITS, KEY_POSITION, KEY_ROOM_ID, KEY_ROOM_NAME, KEY_USER_NAME, MessageType, Payload,
    RoomInfo, RoomListMsg,
};

use crate::config::ServerConfig;
use crate::connection::{Connection, ConnectionId};
use crate::error::ServerError;
use crate::room::{Room, RoomEvent};

/// Where a connection currently sits. Player name is the stable identity;
/// positions shift as rosters compact.
#[derive(Debug, Clone)]
struct Seat {
    room_id: RoomId,
    name: String,
}

pub struct Registry {
    config: Arc<ServerConfig>,
    room_names: Mutex<HashMap<String, RoomId>>,
    rooms: Mutex<HashMap<RoomId, Arc<Room>>>,
    seats: Mutex<HashMap<ConnectionId, Seat>>,
    connections: Mutex<HashMap<ConnectionId, Arc<Connection>>>,
    next_room_id: AtomicU32,
    next_guest: AtomicU64,
}

impl Registry {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config: Arc::new(config),
            room_names: Mutex::new(HashMap::new()),
            rooms: Mutex::new(HashMap::new()),
            seats: Mutex::new(HashMap::new()),
            connections: Mutex::new(HashMap::new()),
            next_room_id: AtomicU32::new(100),
            next_guest: AtomicU64::new(1),
        }
    }

    /// Session bootstrap: register the connection, send the room directory
    /// and a guest name, then arm the first receive.
    pub async fn bootstrap(&self, conn: Arc<Connection>) -> Result<(), ServerError> {
        self.connections
            .lock()
            .await
            .insert(conn.id, Arc::clone(&conn));

        match self.room_listing().await {
            Some(listing) => conn.send_payload(&Payload::RoomList(listing)).await?,
            None => conn.send_control(MessageType::EmptyRoomList).await?,
        }

        let guest = format!("TempUser{}", self.next_guest.fetch_add(1, Ordering::Relaxed));
        conn.send_payload(&Payload::Data(
            DataMsg::new(CT_ASSIGN_USERNAME).with(KEY_USER_NAME, guest),
        ))
        .await?;

        conn.post_receive();
        Ok(())
    }

    /// Reopen the connection's send gate after an observed completion.
    pub async fn complete_send(&self, conn_id: ConnectionId) {
        if let Some(conn) = self.connections.lock().await.get(&conn_id) {
            conn.complete_send();
        }
    }

    /// Digest one read completion. In the lobby the bytes run through the
    /// frame codec; once the connection's room has started they bypass it
    /// and are relayed verbatim to the room.
    pub async fn handle_receive(&self, conn_id: ConnectionId, data: Bytes) -> Result<(), ServerError> {
        let Some(conn) = self.connections.lock().await.get(&conn_id).cloned() else {
            return Ok(());
        };
        conn.receive_complete();

        if let Some(room) = self.started_room_of(conn_id).await {
            room.enqueue(RoomEvent::Raw(data));
            conn.post_receive();
            return Ok(());
        }

        let frames = {
            let mut codec = conn.codec.lock().await;
            codec.feed(&data)?
        };
        for frame in frames {
            self.handle_frame(&conn, frame).await?;
        }

        conn.post_receive();
        Ok(())
    }

    /// Connection gone: leave any room it occupied and release it. The
    /// connection is closed, not just dropped from the map: a `Sent`
    /// completion processed after the removal cannot reopen the gate, and
    /// the parked reader has to be woken to release the socket.
    pub async fn handle_disconnect(&self, conn_id: ConnectionId) {
        let seat = self.seats.lock().await.remove(&conn_id);
        if let Some(seat) = seat {
            self.leave_room(conn_id, &seat).await;
        }
        let conn = self.connections.lock().await.remove(&conn_id);
        if let Some(conn) = conn {
            conn.close();
            info!(conn = conn_id, "client disconnected");
        }
    }

    async fn handle_frame(&self, conn: &Arc<Connection>, frame: Frame) -> Result<(), ServerError> {
        if frame.is_control() {
            return self.handle_control(conn, frame.message_type).await;
        }
        match Payload::decode(frame.message_type, &frame.payload) {
            Ok(Payload::Data(msg)) => self.handle_data(conn, msg).await,
            Ok(other) => {
                warn!(conn = conn.id, ?other, "unexpected payload from client, dropping");
                Ok(())
            },
            Err(e) => {
                // Malformed payloads are connection-local noise.
                warn!(conn = conn.id, error = %e, "undecodable payload, dropping frame");
                Ok(())
            },
        }
    }

    async fn handle_control(
        &self,
        conn: &Arc<Connection>,
        message_type: MessageType,
    ) -> Result<(), ServerError> {
        match message_type {
            MessageType::Refresh => match self.room_listing().await {
                Some(listing) => conn.send_payload(&Payload::RoomList(listing)).await,
                None => conn.send_control(MessageType::EmptyRoomList).await,
            },
            MessageType::SeekMyPosition => self.reply_position(conn).await,
            MessageType::ReadyEvent => self.on_ready(conn).await,
            MessageType::TeamChange => self.on_team_change(conn).await,
            MessageType::LeaveGameRoom => self.on_leave(conn).await,
            other => {
                warn!(conn = conn.id, ?other, "unexpected control frame, dropping");
                Ok(())
            },
        }
    }

    async fn handle_data(&self, conn: &Arc<Connection>, msg: DataMsg) -> Result<(), ServerError> {
        match msg.content_type() {
            Some(CT_CREATE_ROOM) => self.on_create_room(conn, &msg).await,
            Some(CT_ENTER_ROOM) => self.on_enter_room(conn, &msg).await,
            Some(CT_CHAT_MESSAGE) => self.on_chat(conn, msg).await,
            Some(CT_START_GAME) => self.on_start_game(conn, &msg).await,
            other => {
                warn!(conn = conn.id, ?other, "unknown data content type, dropping");
                Ok(())
            },
        }
    }

    async fn on_create_room(
        &self,
        conn: &Arc<Connection>,
        msg: &DataMsg,
    ) -> Result<(), ServerError> {
        let (Some(room_name), Some(user_name)) = (msg.get(KEY_ROOM_NAME), msg.get(KEY_USER_NAME))
        else {
            warn!(conn = conn.id, "create room request missing fields, dropping");
            return Ok(());
        };
        let limit = msg.get(KEY_LIMITS).and_then(|v| v.parse::<u32>().ok());
        let limit = match limit {
            Some(n) if n >= 2 && n <= self.config.limits.max_room_limit => n,
            _ => {
                return self
                    .send_reject(conn, CT_REJECT_CREATE_ROOM, 400, "Invalid room limit")
                    .await;
            },
        };

        let room_id = {
            let mut names = self.room_names.lock().await;
            if names.contains_key(room_name) {
                drop(names);
                return self
                    .send_reject(conn, CT_REJECT_CREATE_ROOM, 400, "Duplicated Room Name")
                    .await;
            }
            let room_id = self.next_room_id.fetch_add(1, Ordering::Relaxed);
            names.insert(room_name.to_string(), room_id);
            room_id
        };

        let info = RoomInfo::create(room_id, room_name, limit, user_name);
        let room = Room::spawn(info.clone());
        room.add_connection(Arc::clone(conn)).await;
        self.rooms.lock().await.insert(room_id, room);
        self.seats.lock().await.insert(
            conn.id,
            Seat {
                room_id,
                name: user_name.to_string(),
            },
        );

        info!(conn = conn.id, room = room_id, name = room_name, "room created");
        conn.send_payload(&Payload::Room(info)).await
    }

    async fn on_enter_room(
        &self,
        conn: &Arc<Connection>,
        msg: &DataMsg,
    ) -> Result<(), ServerError> {
        let (Some(room_name), Some(user_name)) = (msg.get(KEY_ROOM_NAME), msg.get(KEY_USER_NAME))
        else {
            warn!(conn = conn.id, "enter room request missing fields, dropping");
            return Ok(());
        };

        let room = {
            let room_id = self.room_names.lock().await.get(room_name).copied();
            match room_id {
                Some(id) => self.rooms.lock().await.get(&id).cloned(),
                None => None,
            }
        };
        let Some(room) = room else {
            return self
                .send_reject(
                    conn,
                    CT_REJECT_ENTER_ROOM,
                    401,
                    "Room already has been destroyed!",
                )
                .await;
        };

        if room.has_started() {
            return self
                .send_reject(
                    conn,
                    CT_REJECT_ENTER_ROOM,
                    401,
                    "The game has already started!",
                )
                .await;
        }

        let joined = {
            let mut info = room.info.lock().await;
            if info.is_full() {
                Err("The room is already full!")
            } else if info.position_of(user_name).is_some() {
                // Names are the roster identity; an alias would let one
                // member's events mutate another member's seat.
                Err("Duplicated User Name")
            } else {
                info.add_member(user_name);
                Ok(info.clone())
            }
        };
        let snapshot = match joined {
            Ok(snapshot) => snapshot,
            Err(message) => {
                return self
                    .send_reject(conn, CT_REJECT_ENTER_ROOM, 401, message)
                    .await;
            },
        };

        room.add_connection(Arc::clone(conn)).await;
        self.seats.lock().await.insert(
            conn.id,
            Seat {
                room_id: room.id,
                name: user_name.to_string(),
            },
        );

        info!(conn = conn.id, room = room.id, user = user_name, "room entered");
        room.enqueue(RoomEvent::General(Payload::Room(snapshot)));
        Ok(())
    }

    async fn on_chat(&self, conn: &Arc<Connection>, msg: DataMsg) -> Result<(), ServerError> {
        let room_id = msg.get(KEY_ROOM_ID).and_then(|v| v.parse::<RoomId>().ok());
        let Some(room) = (match room_id {
            Some(id) => self.rooms.lock().await.get(&id).cloned(),
            None => None,
        }) else {
            warn!(conn = conn.id, "chat for unknown room, dropping");
            return Ok(());
        };
        room.enqueue(RoomEvent::General(Payload::Data(msg)));
        Ok(())
    }

    async fn on_start_game(&self, conn: &Arc<Connection>, msg: &DataMsg) -> Result<(), ServerError> {
        let room_id = msg.get(KEY_ROOM_ID).and_then(|v| v.parse::<RoomId>().ok());
        let Some(room) = (match room_id {
            Some(id) => self.rooms.lock().await.get(&id).cloned(),
            None => None,
        }) else {
            warn!(conn = conn.id, "start for unknown room, dropping");
            return Ok(());
        };

        let verdict = room.info.lock().await.can_start();
        match verdict {
            Ok(()) => {
                room.set_started();
                info!(room = room.id, "game started");
                room.enqueue(RoomEvent::TypeOnly(MessageType::StartGame));
                Ok(())
            },
            Err(rejection) => {
                self.send_reject(conn, CT_REJECT_START_GAME, 402, &rejection.to_string())
                    .await
            },
        }
    }

    async fn on_ready(&self, conn: &Arc<Connection>) -> Result<(), ServerError> {
        let Some((room, seat)) = self.seated_room(conn.id).await else {
            warn!(conn = conn.id, "ready event without a seat, dropping");
            return Ok(());
        };
        let snapshot = {
            let mut info = room.info.lock().await;
            let toggled = info
                .position_of(&seat.name)
                .and_then(|pos| info.toggle_ready(pos));
            toggled.map(|_| info.clone())
        };
        if let Some(snapshot) = snapshot {
            room.enqueue(RoomEvent::General(Payload::Room(snapshot)));
        }
        Ok(())
    }

    async fn on_team_change(&self, conn: &Arc<Connection>) -> Result<(), ServerError> {
        let Some((room, seat)) = self.seated_room(conn.id).await else {
            warn!(conn = conn.id, "team change without a seat, dropping");
            return Ok(());
        };
        let snapshot = {
            let mut info = room.info.lock().await;
            let moved = info
                .position_of(&seat.name)
                .and_then(|pos| info.change_team(pos));
            moved.map(|_| info.clone())
        };
        match snapshot {
            // A rejected change altered nothing, so nothing is broadcast.
            None => debug!(conn = conn.id, room = room.id, "team change rejected, team full"),
            Some(snapshot) => room.enqueue(RoomEvent::General(Payload::Room(snapshot))),
        }
        Ok(())
    }

    async fn on_leave(&self, conn: &Arc<Connection>) -> Result<(), ServerError> {
        let seat = self.seats.lock().await.remove(&conn.id);
        let Some(seat) = seat else {
            warn!(conn = conn.id, "leave without a seat, dropping");
            return Ok(());
        };
        self.leave_room(conn.id, &seat).await;
        Ok(())
    }

    /// Shared leave path for explicit LEAVE_GAMEROOM and disconnects.
    /// Closing the last seat destroys the room; otherwise the surviving
    /// members get the updated snapshot.
    async fn leave_room(&self, conn_id: ConnectionId, seat: &Seat) {
        let room = self.rooms.lock().await.get(&seat.room_id).cloned();
        let Some(room) = room else {
            return;
        };

        let outcome = {
            let mut info = room.info.lock().await;
            info.position_of(&seat.name)
                .and_then(|pos| info.remove_member(pos))
                .map(|closed| (closed, info.clone()))
        };
        room.remove_connection(conn_id).await;

        match outcome {
            None => {},
            Some((true, snapshot)) => {
                self.rooms.lock().await.remove(&seat.room_id);
                self.room_names.lock().await.remove(&snapshot.name);
                room.enqueue(RoomEvent::Shutdown);
                info!(room = room.id, name = %snapshot.name, "room closed");
            },
            Some((false, snapshot)) => {
                room.enqueue(RoomEvent::General(Payload::Room(snapshot)));
            },
        }
    }

    async fn reply_position(&self, conn: &Arc<Connection>) -> Result<(), ServerError> {
        let Some((room, seat)) = self.seated_room(conn.id).await else {
            warn!(conn = conn.id, "position query without a seat, dropping");
            return Ok(());
        };
        let position = room.info.lock().await.position_of(&seat.name);
        let Some(position) = position else {
            return Ok(());
        };
        conn.send_payload(&Payload::Data(
            DataMsg::new(CT_CLIENT_POSITION).with(KEY_POSITION, position.to_string()),
        ))
        .await
    }

    async fn send_reject(
        &self,
        conn: &Arc<Connection>,
        content_type: &str,
        code: u16,
        message: &str,
    ) -> Result<(), ServerError> {
        debug!(conn = conn.id, content_type, code, message, "rejecting request");
        conn.send_payload(&Payload::Data(DataMsg::reject(content_type, code, message)))
            .await
    }

    /// Directory snapshot, or `None` when no rooms exist.
    async fn room_listing(&self) -> Option<RoomListMsg> {
        let rooms: Vec<Arc<Room>> = self.rooms.lock().await.values().cloned().collect();
        if rooms.is_empty() {
            return None;
        }
        let mut listing = RoomListMsg::default();
        for room in rooms {
            listing.rooms.insert(room.id, room.snapshot().await);
        }
        Some(listing)
    }

    async fn seated_room(&self, conn_id: ConnectionId) -> Option<(Arc<Room>, Seat)> {
        let seat = self.seats.lock().await.get(&conn_id).cloned()?;
        let room = self.rooms.lock().await.get(&seat.room_id).cloned()?;
        Some((room, seat))
    }

    async fn started_room_of(&self, conn_id: ConnectionId) -> Option<Arc<Room>> {
        let (room, _) = self.seated_room(conn_id).await?;
        room.has_started().then_some(room)
    }
}
