//! Integration tests for the Connection module against a loopback fake peer.
//!
//! The fake peer speaks just enough of the protocol to complete a handshake the
//! way a Dogecoin Core node does for an inbound connection.

use dogemap_connection::message::{
    dogecoin_magic, AddrMessage, NetAddress, NetworkMessage, PingMessage, VersionMessage,
};
use dogemap_connection::{
    unix_timestamp, AsyncTransport, Connection, ConnectionConfiguration, ConnectionError,
    PeerAddress,
};
use bitcoin::p2p::ServiceFlags;
use std::net::Ipv4Addr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::timeout;

const NONCE: u64 = 42;
const PEER_NONCE: u64 = 0x5eed;

fn peer_version(version: i32) -> VersionMessage {
    let mut msg = ConnectionConfiguration::default().version_message(unix_timestamp());
    msg.version = version;
    msg.nonce = PEER_NONCE;
    msg.user_agent = "/Shibetoshi:1.14.9/".to_string();
    msg.start_height = 5_400_000;
    msg
}

/// Bind a listener and return it with the peer address to dial.
async fn listen() -> (TcpListener, PeerAddress) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, PeerAddress::from(addr))
}

#[tokio::test]
async fn test_connection_handshake_and_ping() {
    let (listener, peer) = listen().await;

    let fake_peer = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (reader, writer) = stream.into_split();
        let mut transport = AsyncTransport::new(dogecoin_magic(), reader, writer);

        let ours = NetworkMessage::decode(transport.read().await.unwrap(), 0).unwrap();
        assert_eq!(ours.command(), "version");
        transport
            .write(&NetworkMessage::Version(peer_version(70015)).into_raw(70015))
            .await
            .unwrap();
        let verack = transport.read().await.unwrap();
        assert_eq!(verack.command, "verack");

        // Answer a ping, then gossip one address.
        match NetworkMessage::decode(transport.read().await.unwrap(), 70015).unwrap() {
            NetworkMessage::Ping(ping) => transport
                .write(&NetworkMessage::Pong(ping).into_raw(70015))
                .await
                .unwrap(),
            other => panic!("expected ping, got {other:?}"),
        }
        let addr = AddrMessage {
            addresses: vec![NetAddress {
                time: Some(unix_timestamp() as u32),
                services: ServiceFlags::NETWORK,
                address: Ipv4Addr::new(10, 0, 0, 7).to_ipv6_mapped(),
                port: 22556,
            }],
        };
        transport
            .write(&NetworkMessage::Addr(addr).into_raw(70015))
            .await
            .unwrap();
    });

    let config = ConnectionConfiguration::default().with_user_agent("/dogemap-test/");
    let mut connection = Connection::tcp(peer, &config)
        .await
        .expect("Failed to establish connection");
    assert_eq!(connection.peer(), peer);
    assert_eq!(connection.peer_version().user_agent, "/Shibetoshi:1.14.9/");
    assert_eq!(connection.peer_version().start_height, 5_400_000);

    connection
        .send(NetworkMessage::Ping(PingMessage::new(NONCE)))
        .await
        .expect("Failed to send ping");

    let response = timeout(Duration::from_secs(5), connection.receive())
        .await
        .expect("Timeout waiting for response")
        .expect("Failed to receive message");
    assert_eq!(response, NetworkMessage::Pong(PingMessage::new(NONCE)));

    let gossip = timeout(Duration::from_secs(5), connection.receive())
        .await
        .expect("Timeout waiting for addr")
        .expect("Failed to receive addr");
    match gossip {
        NetworkMessage::Addr(addr) => {
            assert_eq!(addr.addresses.len(), 1);
            assert_eq!(
                addr.addresses[0].peer_address().to_string(),
                "10.0.0.7:22556"
            );
        }
        other => panic!("Expected addr message, got {other:?}"),
    }

    fake_peer.await.unwrap();
}

#[tokio::test]
async fn test_connection_to_self_detected() {
    let (listener, peer) = listen().await;

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (reader, writer) = stream.into_split();
        let mut transport = AsyncTransport::new(dogecoin_magic(), reader, writer);
        let ours = transport.read().await.unwrap();
        // Echo our own version back, as dialing our own address would.
        transport.write(&ours).await.unwrap();
    });

    let result = Connection::tcp(peer, &ConnectionConfiguration::default()).await;
    assert!(matches!(result, Err(ConnectionError::ConnectionLoop)));
}

#[tokio::test]
async fn test_connection_handshake_timeout() {
    let (listener, peer) = listen().await;

    let silent_peer = tokio::spawn(async move {
        // Accept and never answer.
        let (stream, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        drop(stream);
    });

    let config =
        ConnectionConfiguration::default().with_handshake_timeout(Duration::from_millis(200));
    let result = Connection::tcp(peer, &config).await;
    assert!(matches!(result, Err(ConnectionError::Timeout(_))));
    silent_peer.abort();
}

#[tokio::test]
async fn test_connection_refused() {
    let (listener, peer) = listen().await;
    drop(listener);

    let result = Connection::tcp(peer, &ConnectionConfiguration::default()).await;
    assert!(matches!(result, Err(ConnectionError::Io(_))));
}
