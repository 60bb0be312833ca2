//! End-to-end transport behavior between two instances on loopback

use bytes::Bytes;
use network::{ChannelListener, Endpoint, EndpointState, Transport, TransportError};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use transport_config::TransportSettings;
use types::{ErrorBody, Message, MessageHeader, SduType, StandardError, Uri};

const WAIT: Duration = Duration::from_secs(5);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn server_settings() -> TransportSettings {
    TransportSettings {
        host: "127.0.0.1".into(),
        port: 0,
        listen: true,
        ..TransportSettings::default()
    }
}

fn client_settings() -> TransportSettings {
    TransportSettings {
        listen: false,
        ..server_settings()
    }
}

fn listen(endpoint: &Endpoint) -> mpsc::Receiver<Message> {
    let (listener, inbox) = ChannelListener::new(32);
    endpoint.set_listener(Arc::new(listener));
    endpoint.start_delivery().unwrap();
    inbox
}

async fn next(inbox: &mut mpsc::Receiver<Message>) -> Message {
    tokio::time::timeout(WAIT, inbox.recv())
        .await
        .expect("timed out waiting for message")
        .expect("listener closed")
}

async fn nothing_arrives(inbox: &mut mpsc::Receiver<Message>) -> bool {
    tokio::time::timeout(Duration::from_millis(300), inbox.recv())
        .await
        .is_err()
}

#[tokio::test]
async fn test_reply_reaches_client_over_its_own_socket() {
    init_tracing();
    let server = Transport::start(server_settings()).await.unwrap();
    let client = Transport::start(client_settings()).await.unwrap();
    assert!(!client.root_uri().is_connectable());

    let provider = server.create_endpoint("provider");
    let consumer = client.create_endpoint("consumer");
    let mut provider_inbox = listen(&provider);
    let mut consumer_inbox = listen(&consumer);

    let mut request = consumer.message(
        SduType::Request,
        provider.uri().clone(),
        vec![Bytes::from_static(b"ping")],
    );
    request.header.transaction_id = 42;
    consumer.send(request).await.unwrap();

    let received = next(&mut provider_inbox).await;
    assert_eq!(received.header.from.as_ref(), Some(consumer.uri()));
    assert_eq!(received.body, vec![Bytes::from_static(b"ping")]);
    assert!(server.pool().contains(client.root_uri()));

    let reply = received.reply(SduType::RequestResponse, vec![Bytes::from_static(b"pong")]);
    provider.send(reply).await.unwrap();

    let answer = next(&mut consumer_inbox).await;
    assert_eq!(answer.header.sdu_type, SduType::RequestResponse);
    assert_eq!(answer.header.transaction_id, 42);
    assert_eq!(answer.body, vec![Bytes::from_static(b"pong")]);

    client.close().await;
    server.close().await;
}

#[tokio::test]
async fn test_unknown_endpoint_request_gets_error_reply() {
    let server = Transport::start(server_settings()).await.unwrap();
    let client = Transport::start(client_settings()).await.unwrap();
    let consumer = client.create_endpoint("consumer");
    let mut inbox = listen(&consumer);
    let missing = Uri::for_endpoint(server.root_uri(), "missing");

    consumer
        .send(consumer.message(SduType::Request, missing.clone(), vec![]))
        .await
        .unwrap();

    let reply = next(&mut inbox).await;
    assert!(reply.header.is_error);
    assert_eq!(reply.header.sdu_type, SduType::RequestResponse);
    let body = ErrorBody::from_elements(&reply.body).unwrap();
    assert_eq!(body.error, StandardError::DestinationUnknown);
    assert!(body.info.contains("missing"));

    // SEND has no reply stage
    consumer
        .send(consumer.message(SduType::Send, missing, vec![]))
        .await
        .unwrap();
    assert!(nothing_arrives(&mut inbox).await);

    client.close().await;
    server.close().await;
}

#[tokio::test]
async fn test_batch_reports_every_failure() {
    let server = Transport::start(server_settings()).await.unwrap();
    let provider = server.create_endpoint("provider");
    let mut inbox = listen(&provider);

    let client = Transport::start(client_settings()).await.unwrap();
    let consumer = client.create_endpoint("consumer");

    let good = || consumer.message(SduType::Send, provider.uri().clone(), vec![]);
    let bad = consumer.message(SduType::Send, Uri::from("proto://host-no-port/x"), vec![]);
    let no_port_either = consumer.message(SduType::Send, Uri::from("nohost/x"), vec![]);

    let err = consumer
        .send_batch(vec![good(), bad, good(), no_port_either])
        .await
        .unwrap_err();
    assert_eq!(err.total, 4);
    assert_eq!(err.failed_indices(), vec![1, 3]);
    assert!(err
        .failures
        .iter()
        .all(|(_, e)| matches!(e, TransportError::MalformedAddress { .. })));

    next(&mut inbox).await;
    next(&mut inbox).await;

    client.close().await;
    server.close().await;
}

#[tokio::test]
async fn test_delivery_follows_endpoint_state() {
    let server = Transport::start(server_settings()).await.unwrap();
    let client = Transport::start(client_settings()).await.unwrap();
    let consumer = client.create_endpoint("consumer");

    let provider = server.create_endpoint("provider");
    assert_eq!(provider.state(), EndpointState::Created);
    let (listener, mut inbox) = ChannelListener::new(8);
    provider.set_listener(Arc::new(listener));

    let send = || consumer.message(SduType::Send, provider.uri().clone(), vec![]);

    consumer.send(send()).await.unwrap();
    assert!(nothing_arrives(&mut inbox).await);

    provider.start_delivery().unwrap();
    consumer.send(send()).await.unwrap();
    next(&mut inbox).await;

    provider.stop_delivery().unwrap();
    consumer.send(send()).await.unwrap();
    assert!(nothing_arrives(&mut inbox).await);

    assert!(server.delete_endpoint("provider"));
    assert!(!server.delete_endpoint("provider"));
    assert_eq!(provider.state(), EndpointState::Closed);
    assert!(provider.start_delivery().is_err());
    assert!(matches!(
        provider.send(send()).await,
        Err(TransportError::EndpointClosed { .. })
    ));

    client.close().await;
    server.close().await;
}

#[tokio::test]
async fn test_endpoint_registry() {
    let server = Transport::start(server_settings()).await.unwrap();

    let first = server.create_endpoint("svc");
    let again = server.create_endpoint("svc");
    assert!(Arc::ptr_eq(&first, &again));
    assert_eq!(first.uri(), &Uri::for_endpoint(server.root_uri(), "svc"));

    let found = server.endpoint_by_uri(first.uri()).unwrap();
    assert!(Arc::ptr_eq(&first, &found));
    assert!(server.endpoint("svc").is_some());
    assert!(server
        .endpoint_by_uri(&Uri::from("maltcp://10.9.9.9:1/svc"))
        .is_none());

    server.close().await;
    assert_eq!(first.state(), EndpointState::Closed);
}

#[tokio::test]
async fn test_garbage_frame_tears_down_sender_root() {
    init_tracing();
    let server = Transport::start(server_settings()).await.unwrap();
    let provider = server.create_endpoint("provider");
    let mut inbox = listen(&provider);
    let addr = server.local_addr().unwrap();

    let peer_root = Uri::from("maltcp://127.0.0.1:rawpeer/");
    let header = MessageHeader::new(SduType::Send).with_addresses(
        Uri::for_endpoint(&peer_root, "raw"),
        provider.uri().clone(),
    );
    let frame = codec::encode_frame(&Message::new(header, vec![])).unwrap();

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(&(frame.len() as u32).to_be_bytes()).await.unwrap();
    stream.write_all(&frame).await.unwrap();

    next(&mut inbox).await;
    assert!(server.pool().contains(&peer_root));

    // Declares a 3-byte frame: too short for any header
    stream.write_all(&[0, 0, 0, 3, 0xde, 0xad, 0xbf]).await.unwrap();

    let mut buf = [0u8; 16];
    let read = tokio::time::timeout(WAIT, stream.read(&mut buf))
        .await
        .expect("socket not closed after garbage frame");
    assert!(matches!(read, Ok(0) | Err(_)));

    tokio::time::timeout(WAIT, async {
        while server.pool().contains(&peer_root) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("destination not torn down");
    assert_eq!(server.pool().stats().teardowns, 1);

    server.close().await;
}

#[tokio::test]
async fn test_failed_bind_spawns_no_tasks() {
    let taken = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let settings = TransportSettings {
        port: taken.local_addr().unwrap().port(),
        ..server_settings()
    };

    let metrics = tokio::runtime::Handle::current().metrics();
    let before = metrics.num_alive_tasks();
    for _ in 0..3 {
        let Err(err) = Transport::start(settings.clone()).await else {
            panic!("bind to a taken port succeeded");
        };
        assert!(matches!(err, TransportError::Io { .. }), "unexpected error: {err:?}");
    }
    assert_eq!(metrics.num_alive_tasks(), before);
}
