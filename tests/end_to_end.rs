//! Loopback end-to-end scenarios (§8 E1-E6) driven over the real TCP
//! transport: a server `Rpc` POA and a client `Session` obtained through
//! `transport::tcp::connect`.

use std::sync::Arc;
use std::time::Duration;

use nprpc::codec::endpoint::{Endpoint, Transport};
use nprpc::codec::header::{ExceptionKind, Header, MessageId, MessageType, ObjectIdLocal};
use nprpc::codec::object_id::ObjectFlags;
use nprpc::service::{Context, Poa, PoaBuilder, Servant};
use nprpc::statistics::Statistics;
use nprpc::transport;
use tokio::io::AsyncWriteExt;

struct Ping;

impl Servant for Ping {
    fn class_id(&self) -> &str {
        "Ping"
    }

    fn dispatch(&self, _i: u8, _f: u8, _args: &[u8], _ctx: &mut Context<'_>) -> Result<Vec<u8>, ExceptionKind> {
        Ok(Vec::new())
    }
}

struct Calc;

impl Servant for Calc {
    fn class_id(&self) -> &str {
        "Calc"
    }

    fn dispatch(&self, _i: u8, function_idx: u8, args: &[u8], _ctx: &mut Context<'_>) -> Result<Vec<u8>, ExceptionKind> {
        match function_idx {
            0 => {
                let a = u32::from_le_bytes(args[0..4].try_into().unwrap());
                let b = u32::from_le_bytes(args[4..8].try_into().unwrap());
                Ok((a + b).to_le_bytes().to_vec())
            }
            _ => Err(ExceptionKind::UnknownFunctionIndex),
        }
    }
}

/// Never replies within any sane deadline — the timeout scenario's reply
/// simply never arrives.
struct Blackhole;

impl Servant for Blackhole {
    fn class_id(&self) -> &str {
        "Blackhole"
    }

    fn dispatch(&self, _i: u8, _f: u8, _args: &[u8], _ctx: &mut Context<'_>) -> Result<Vec<u8>, ExceptionKind> {
        std::thread::sleep(Duration::from_secs(5));
        Ok(Vec::new())
    }
}

struct Slow;

impl Servant for Slow {
    fn class_id(&self) -> &str {
        "Slow"
    }

    fn dispatch(&self, _i: u8, _f: u8, _args: &[u8], _ctx: &mut Context<'_>) -> Result<Vec<u8>, ExceptionKind> {
        std::thread::sleep(Duration::from_millis(200));
        Ok(b"slow".to_vec())
    }
}

/// Binds a one-POA server on `port` with each servant activated under the
/// System policy, and returns the POA plus the object id assigned to each
/// servant in argument order.
async fn start_server(port: u16, servants: Vec<Arc<dyn Servant>>) -> (Arc<Poa>, Vec<u64>) {
    let poa = Arc::new(PoaBuilder::new().build(0).unwrap());
    let object_ids = servants
        .into_iter()
        .map(|servant| poa.activate_object(servant, ObjectFlags::ALL_TRANSPORTS).unwrap())
        .collect();

    let poas = Arc::new(vec![poa.clone()]);
    let statistics = Statistics::default();

    tokio::spawn(async move {
        let _ = transport::tcp::serve(([127, 0, 0, 1], port).into(), poas, statistics).await;
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    (poa, object_ids)
}

async fn connect_client(port: u16) -> Arc<nprpc::Session> {
    transport::tcp::connect(
        Endpoint::new(Transport::Tcp, "127.0.0.1", port),
        Arc::new(Vec::new()),
        Statistics::default(),
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn e1_empty_call_over_tcp_answers_with_an_empty_body() {
    let (poa, ids) = start_server(16601, vec![Arc::new(Ping)]).await;
    let session = connect_client(16601).await;

    let reply = session.call(0, ids[0], 0, 0, &[]).await.unwrap();
    assert!(reply.is_empty());
    assert_eq!(poa.external_refcount(ids[0]), Some(0));
}

#[tokio::test]
async fn e2_integer_return_round_trips() {
    let (_poa, ids) = start_server(16602, vec![Arc::new(Calc)]).await;
    let session = connect_client(16602).await;

    let mut args = Vec::with_capacity(8);
    args.extend_from_slice(&40u32.to_le_bytes());
    args.extend_from_slice(&2u32.to_le_bytes());

    let reply = session.call(0, ids[0], 0, 0, &args).await.unwrap();
    assert_eq!(u32::from_le_bytes(reply[..4].try_into().unwrap()), 42);
}

#[tokio::test]
async fn e3_unactivated_object_is_object_not_exist() {
    start_server(16603, vec![Arc::new(Ping)]).await;
    let session = connect_client(16603).await;

    let result = session.call(0, 999, 0, 0, &[]).await;
    assert!(matches!(result, Err(nprpc::Error::Exception(ExceptionKind::ObjectNotExist))));
}

#[tokio::test]
async fn e4_timeout_leaves_the_session_active_and_drops_the_late_answer() {
    let (_poa, ids) = start_server(16604, vec![Arc::new(Blackhole)]).await;
    let session = connect_client(16604).await;

    // Session::call's own DEFAULT_CALL_TIMEOUT (30s) is what actually fires
    // here; the outer wrapper just bounds how long a hung test can run.
    let result = tokio::time::timeout(Duration::from_secs(31), session.call(0, ids[0], 0, 0, &[])).await;
    assert!(result.is_ok(), "the call's own 30s deadline should have fired first");
    assert!(matches!(result.unwrap(), Err(nprpc::Error::Exception(ExceptionKind::Timeout))));
    assert_eq!(session.state(), nprpc::session::SessionState::Active);
}

#[tokio::test]
async fn e5_concurrent_calls_on_one_session_do_not_serialize() {
    let (_poa, ids) = start_server(16605, vec![Arc::new(Slow), Arc::new(Ping)]).await;
    let session = connect_client(16605).await;

    let started = std::time::Instant::now();
    let (slow, fast) = tokio::join!(
        session.call(0, ids[0], 0, 0, &[]),
        session.call(0, ids[1], 0, 0, &[])
    );

    assert_eq!(slow.unwrap(), b"slow".as_slice());
    assert!(fast.unwrap().is_empty());
    // The fast ping must not wait behind the 200ms slow call: each inbound
    // FunctionCall frame dispatches on its own task (§4.6).
    assert!(started.elapsed() < Duration::from_millis(190));
}

#[tokio::test]
async fn e6_dropping_the_connection_releases_refcounts_the_server_session_held() {
    let (poa, ids) = start_server(16606, vec![Arc::new(Ping)]).await;
    let object_id = ids[0];

    let mut stream = tokio::net::TcpStream::connect("127.0.0.1:16606").await.unwrap();

    let mut body = bytes::BytesMut::new();
    ObjectIdLocal { poa_idx: 0, object_id }.encode(&mut body);
    let header = Header::new(MessageId::AddReference, MessageType::Request, 0, body.len());
    let mut frame = bytes::BytesMut::new();
    header.encode(&mut frame);
    frame.extend_from_slice(&body);
    stream.write_all(&frame).await.unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(poa.external_refcount(object_id), Some(1));

    drop(stream);
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Transient lifespan: refcount reaching zero on session death
    // deactivates the servant (§4.5), so the id no longer resolves at all.
    assert_eq!(poa.external_refcount(object_id), None);
}
