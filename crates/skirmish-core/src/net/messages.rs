use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::RoomId;

/// Wire message type discriminator. The value travels as a little-endian
/// `i32` in the frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum MessageType {
    // Header-only control messages
    Accept = 0,
    Reject = 1,
    Refresh = 2,
    Create = 3,
    Enter = 4,
    EmptyRoomList = 5,
    SeekMyPosition = 6,
    TeamChange = 7,
    ReadyEvent = 8,
    LeaveGameRoom = 9,
    StartGame = 10,

    // Messages carrying a payload
    Data = 100,
    RoomList = 101,
    Room = 102,
    Client = 103,
    PlayState = 104,
    Transform = 105,
    Vector3 = 106,
    WorldState = 107,
}

impl MessageType {
    /// Map a raw header value back to a known type.
    pub fn from_wire(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::Accept),
            1 => Some(Self::Reject),
            2 => Some(Self::Refresh),
            3 => Some(Self::Create),
            4 => Some(Self::Enter),
            5 => Some(Self::EmptyRoomList),
            6 => Some(Self::SeekMyPosition),
            7 => Some(Self::TeamChange),
            8 => Some(Self::ReadyEvent),
            9 => Some(Self::LeaveGameRoom),
            10 => Some(Self::StartGame),
            100 => Some(Self::Data),
            101 => Some(Self::RoomList),
            102 => Some(Self::Room),
            103 => Some(Self::Client),
            104 => Some(Self::PlayState),
            105 => Some(Self::Transform),
            106 => Some(Self::Vector3),
            107 => Some(Self::WorldState),
            _ => None,
        }
    }

    pub fn wire(self) -> i32 {
        self as i32
    }
}

// Keys and contentType values of the generic `Data` envelope.
pub const KEY_CONTENT_TYPE: &str = "contentType";
pub const KEY_ROOM_NAME: &str = "roomName";
pub const KEY_USER_NAME: &str = "userName";
pub const KEY_ROOM_ID: &str = "roomId";
pub const KEY_LIMITS: &str = "limits";
pub const KEY_POSITION: &str = "position";
pub const KEY_ERROR_CODE: &str = "errorCode";
pub const KEY_ERROR_MESSAGE: &str = "errorMessage";

pub const CT_ASSIGN_USERNAME: &str = "ASSIGN_USERNAME";
pub const CT_CLIENT_POSITION: &str = "CLIENT_POSITION";
pub const CT_CREATE_ROOM: &str = "CREATE_ROOM";
pub const CT_ENTER_ROOM: &str = "ENTER_ROOM";
pub const CT_CHAT_MESSAGE: &str = "CHAT_MESSAGE";
pub const CT_START_GAME: &str = "START_GAME";
pub const CT_REJECT_CREATE_ROOM: &str = "REJECT_CREATE_ROOM";
pub const CT_REJECT_ENTER_ROOM: &str = "REJECT_ENTER_ROOM";
pub const CT_REJECT_START_GAME: &str = "REJECT_START_GAME";

/// Generic string key/value envelope used for sub-commands that have no
/// dedicated wire type (room creation, chat, rejects, name assignment).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataMsg {
    pub entries: HashMap<String, String>,
}

impl DataMsg {
    pub fn new(content_type: &str) -> Self {
        let mut msg = Self::default();
        msg.entries
            .insert(KEY_CONTENT_TYPE.to_string(), content_type.to_string());
        msg
    }

    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.entries.insert(key.to_string(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.get(KEY_CONTENT_TYPE)
    }

    /// Build a typed rejection reply with an error code and reason.
    pub fn reject(content_type: &str, code: u16, message: &str) -> Self {
        Self::new(content_type)
            .with(KEY_ERROR_CODE, code.to_string())
            .with(KEY_ERROR_MESSAGE, message)
    }
}

/// A player's seat inside a room roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    /// Id of the room this client currently occupies.
    pub room_id: RoomId,
    pub name: String,
    /// Wire position: 0..7 red team, 8..15 blue team.
    pub position: u32,
    pub ready: bool,
}

/// Snapshot of one room, broadcast to members on every roster change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomInfo {
    pub room_id: RoomId,
    pub name: String,
    /// Wire position of the host member.
    pub host: u32,
    pub current: u32,
    pub limit: u32,
    pub ready_count: u32,
    pub red_team: Vec<Client>,
    pub blue_team: Vec<Client>,
}

/// Room directory sent on connect and in response to REFRESH.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomListMsg {
    pub rooms: HashMap<RoomId, RoomInfo>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: Vector3,
    pub rotation: Vector3,
}

/// Per-player gameplay state. In-game traffic normally rides the raw relay
/// channel; this schema exists so framed gameplay messages stay decodable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayState {
    pub player: String,
    pub transform: Transform,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldState {
    pub states: Vec<PlayState>,
}

/// A decoded frame payload. Each variant declares its wire type id; decode
/// dispatches on the header type to construct the right variant.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Data(DataMsg),
    RoomList(RoomListMsg),
    Room(RoomInfo),
    Client(Client),
    PlayState(PlayState),
    Transform(Transform),
    Vector3(Vector3),
    WorldState(WorldState),
}

impl Payload {
    /// The wire type id this payload is framed with.
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::Data(_) => MessageType::Data,
            Self::RoomList(_) => MessageType::RoomList,
            Self::Room(_) => MessageType::Room,
            Self::Client(_) => MessageType::Client,
            Self::PlayState(_) => MessageType::PlayState,
            Self::Transform(_) => MessageType::Transform,
            Self::Vector3(_) => MessageType::Vector3,
            Self::WorldState(_) => MessageType::WorldState,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let result = match self {
            Self::Data(m) => rmp_serde::to_vec(m),
            Self::RoomList(m) => rmp_serde::to_vec(m),
            Self::Room(m) => rmp_serde::to_vec(m),
            Self::Client(m) => rmp_serde::to_vec(m),
            Self::PlayState(m) => rmp_serde::to_vec(m),
            Self::Transform(m) => rmp_serde::to_vec(m),
            Self::Vector3(m) => rmp_serde::to_vec(m),
            Self::WorldState(m) => rmp_serde::to_vec(m),
        };
        result.map_err(|e| ProtocolError::Encode(e.to_string()))
    }

    /// Decode payload bytes according to the frame's header type.
    /// Header-only types have no payload schema and are rejected here.
    pub fn decode(message_type: MessageType, data: &[u8]) -> Result<Self, ProtocolError> {
        fn de<T: for<'de> Deserialize<'de>>(data: &[u8]) -> Result<T, ProtocolError> {
            rmp_serde::from_slice(data).map_err(|e| ProtocolError::Decode(e.to_string()))
        }
        match message_type {
            MessageType::Data => Ok(Self::Data(de(data)?)),
            MessageType::RoomList => Ok(Self::RoomList(de(data)?)),
            MessageType::Room => Ok(Self::Room(de(data)?)),
            MessageType::Client => Ok(Self::Client(de(data)?)),
            MessageType::PlayState => Ok(Self::PlayState(de(data)?)),
            MessageType::Transform => Ok(Self::Transform(de(data)?)),
            MessageType::Vector3 => Ok(Self::Vector3(de(data)?)),
            MessageType::WorldState => Ok(Self::WorldState(de(data)?)),
            other => Err(ProtocolError::UnexpectedPayload(other.wire())),
        }
    }
}

#[derive(Debug)]
pub enum ProtocolError {
    /// Header carried a type id outside the registry.
    UnknownMessageType(i32),
    /// Header-only type arrived with a payload attached.
    UnexpectedPayload(i32),
    /// Declared payload length is negative or exceeds the frame budget.
    InvalidLength(i64),
    /// A packed frame would not fit the fixed send buffer.
    FrameTooLarge(usize),
    Encode(String),
    Decode(String),
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownMessageType(t) => write!(f, "unknown message type: {t}"),
            Self::UnexpectedPayload(t) => {
                write!(f, "type {t} does not carry a payload")
            },
            Self::InvalidLength(len) => write!(f, "invalid payload length: {len}"),
            Self::FrameTooLarge(size) => {
                write!(f, "packed frame too large: {size} bytes")
            },
            Self::Encode(e) => write!(f, "encode error: {e}"),
            Self::Decode(e) => write!(f, "decode error: {e}"),
        }
    }
}

impl std::error::Error for ProtocolError {}
