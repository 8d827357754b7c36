use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use aden::config::ServerConfig;
use aden::database::StaticData;
use aden::game::StdFormulas;
use aden::network::cipher::S_INITPACKET;
use aden::network::opcodes::*;
use aden::network::{read_frame, write_frame, Cipher, PacketReader, PacketWriter};
use aden::repo::Repos;
use aden::servers::map::{packets, GameServer};
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::time::timeout;

const CONF: &str = "sql_ip: 127.0.0.1\nsql_id: aden\nsql_pw: aden\nsql_db: aden\ngame_ip: 127.0.0.1\ngame_port: 0\nauto_create_accounts: true\n";

async fn start_test_server() -> (SocketAddr, Arc<GameServer>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let config = ServerConfig::from_str(CONF).unwrap();
    let (repos, _store) = Repos::memory();
    let srv = GameServer::new(config, Arc::new(StaticData::default()), repos, Arc::new(StdFormulas));

    let s = Arc::clone(&srv);
    tokio::spawn(async move {
        s.serve(listener).await.unwrap();
    });
    (addr, srv)
}

/// A client past the init packet, keyed off its seed.
struct Client {
    stream: TcpStream,
    cipher: Cipher,
}

impl Client {
    async fn connect(addr: SocketAddr) -> Self {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let mut init = [0u8; 18];
        stream.read_exact(&mut init).await.unwrap();
        assert_eq!(u16::from_le_bytes([init[0], init[1]]), 18);
        assert_eq!(init[2], S_INITPACKET);
        let seed = i32::from_le_bytes([init[3], init[4], init[5], init[6]]);
        Self { stream, cipher: Cipher::new(seed) }
    }

    async fn send(&mut self, mut payload: Vec<u8>) {
        self.cipher.encrypt(&mut payload);
        write_frame(&mut self.stream, &payload).await.unwrap();
    }

    async fn recv(&mut self) -> Vec<u8> {
        let mut frame = timeout(Duration::from_secs(5), read_frame(&mut self.stream)).await.expect("reply in time").unwrap();
        self.cipher.decrypt(&mut frame);
        frame
    }

    async fn login(&mut self, account: &str, password: &str) -> u16 {
        self.send(PacketWriter::new(C_LOGIN).s(account).s(password).finish()).await;
        let reply = self.recv().await;
        assert_eq!(reply[0], S_LOGIN_CHECK);
        PacketReader::new(&reply).read_h()
    }
}

#[tokio::test]
async fn test_init_packet_carries_seed() {
    let (addr, _srv) = start_test_server().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let mut init = [0u8; 18];
    stream.read_exact(&mut init).await.unwrap();
    assert_eq!(init[2], S_INITPACKET);
    assert!(i32::from_le_bytes([init[3], init[4], init[5], init[6]]) > 0);
}

#[tokio::test]
async fn test_version_check_ok() {
    let (addr, _srv) = start_test_server().await;
    let mut client = Client::connect(addr).await;
    client.send(PacketWriter::new(C_VERSION).h(0).finish()).await;
    let reply = client.recv().await;
    assert_eq!(reply[0], S_VERSION_CHECK);
}

#[tokio::test]
async fn test_login_before_version_is_dropped() {
    let (addr, _srv) = start_test_server().await;
    let mut client = Client::connect(addr).await;
    client.send(PacketWriter::new(C_LOGIN).s("early").s("bird").finish()).await;
    client.send(PacketWriter::new(C_VERSION).h(0).finish()).await;
    // no reply to the early login, the connection stays up
    assert_eq!(client.recv().await[0], S_VERSION_CHECK);
}

#[tokio::test]
async fn test_login_creates_account_and_lists_chars() {
    let (addr, _srv) = start_test_server().await;
    let mut client = Client::connect(addr).await;
    client.send(PacketWriter::new(C_VERSION).h(0).finish()).await;
    client.recv().await;

    assert_eq!(client.login("tester", "secret").await, packets::LOGIN_OK);
    let list = client.recv().await;
    assert_eq!(list[0], S_NUM_CHARACTER);
    assert_eq!(list[1], 0);
}

#[tokio::test]
async fn test_second_login_is_turned_away() {
    let (addr, _srv) = start_test_server().await;
    let mut first = Client::connect(addr).await;
    first.send(PacketWriter::new(C_VERSION).h(0).finish()).await;
    first.recv().await;
    assert_eq!(first.login("tester", "secret").await, packets::LOGIN_OK);

    let mut second = Client::connect(addr).await;
    second.send(PacketWriter::new(C_VERSION).h(0).finish()).await;
    second.recv().await;
    assert_eq!(second.login("tester", "secret").await, packets::LOGIN_ALREADY_ONLINE);
}

#[tokio::test]
async fn test_shutdown_stops_accepting() {
    let (addr, srv) = start_test_server().await;
    let mut client = Client::connect(addr).await;
    srv.state.request_shutdown();
    // the connection task winds down and the socket closes
    let mut buf = [0u8; 1];
    let n = timeout(Duration::from_secs(5), client.stream.read(&mut buf)).await.expect("closed in time").unwrap_or(0);
    assert_eq!(n, 0);
}
