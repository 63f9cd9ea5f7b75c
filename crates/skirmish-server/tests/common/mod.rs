use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use skirmish_core::net::framing::{Frame, FrameCodec, pack_control, pack_message};
use skirmish_core::net::messages::{DataMsg, MessageType, Payload};

use skirmish_server::config::ServerConfig;
use skirmish_server::serve;

pub struct TestServer {
    pub addr: SocketAddr,
    _shutdown: tokio::task::JoinHandle<()>,
}

impl TestServer {
    /// Start a server on an ephemeral port with a small dispatcher pool.
    pub async fn new() -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let mut config = ServerConfig::default();
        config.limits.workers = 4;

        let handle = tokio::spawn(async move {
            serve(listener, config).await.unwrap();
        });

        // Give the server a moment to start accepting
        tokio::time::sleep(Duration::from_millis(20)).await;

        Self {
            addr,
            _shutdown: handle,
        }
    }
}

/// A raw TCP lobby client speaking the framed protocol.
pub struct TestClient {
    stream: TcpStream,
    codec: FrameCodec,
    queued: Vec<Frame>,
}

impl TestClient {
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        Self {
            stream,
            codec: FrameCodec::new(),
            queued: Vec::new(),
        }
    }

    /// Connect and consume the bootstrap frames, returning the assigned
    /// guest name.
    pub async fn join_lobby(addr: SocketAddr) -> (Self, String) {
        let mut client = Self::connect(addr).await;
        let listing = client.recv_frame().await;
        assert!(matches!(
            listing.message_type,
            MessageType::RoomList | MessageType::EmptyRoomList
        ));
        let assigned = client.recv_data().await;
        assert_eq!(assigned.content_type(), Some("ASSIGN_USERNAME"));
        let name = assigned.get("userName").unwrap().to_string();
        (client, name)
    }

    pub async fn send_control(&mut self, message_type: MessageType) {
        self.stream
            .write_all(&pack_control(message_type))
            .await
            .unwrap();
    }

    pub async fn send_data(&mut self, msg: DataMsg) {
        let payload = Payload::Data(msg);
        let frame = pack_message(MessageType::Data, &payload.encode().unwrap()).unwrap();
        self.stream.write_all(&frame).await.unwrap();
    }

    pub async fn send_bytes(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.unwrap();
    }

    /// Next decoded frame, failing the test after five seconds.
    pub async fn recv_frame(&mut self) -> Frame {
        if !self.queued.is_empty() {
            return self.queued.remove(0);
        }
        tokio::time::timeout(Duration::from_secs(5), async {
            let mut buf = [0u8; 4096];
            loop {
                let n = self.stream.read(&mut buf).await.unwrap();
                assert!(n > 0, "server closed the connection while waiting");
                let mut frames = self.codec.feed(&buf[..n]).unwrap();
                if !frames.is_empty() {
                    let first = frames.remove(0);
                    self.queued.extend(frames);
                    return first;
                }
            }
        })
        .await
        .expect("timed out waiting for a frame")
    }

    /// Wait for the server to close this connection, draining anything
    /// still in flight.
    pub async fn expect_closed(&mut self) {
        tokio::time::timeout(Duration::from_secs(5), async {
            let mut buf = [0u8; 256];
            loop {
                match self.stream.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {},
                }
            }
        })
        .await
        .expect("server did not close the connection");
    }

    /// Read exactly `len` raw bytes, bypassing the codec.
    pub async fn recv_raw(&mut self, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        tokio::time::timeout(Duration::from_secs(5), self.stream.read_exact(&mut buf))
            .await
            .expect("timed out waiting for raw bytes")
            .unwrap();
        buf
    }

    pub async fn recv_data(&mut self) -> DataMsg {
        let frame = self.recv_frame().await;
        assert_eq!(frame.message_type, MessageType::Data);
        match Payload::decode(frame.message_type, &frame.payload).unwrap() {
            Payload::Data(msg) => msg,
            other => panic!("expected Data payload, got {other:?}"),
        }
    }

    pub async fn recv_room(&mut self) -> skirmish_core::net::messages::RoomInfo {
        let frame = self.recv_frame().await;
        assert_eq!(frame.message_type, MessageType::Room);
        match Payload::decode(frame.message_type, &frame.payload).unwrap() {
            Payload::Room(info) => info,
            other => panic!("expected Room payload, got {other:?}"),
        }
    }
}
