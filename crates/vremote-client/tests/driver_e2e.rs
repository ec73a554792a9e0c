//! End-to-end tests: driver -> unix socket -> scripted daemon.

use bytes::BytesMut;
use uuid::Uuid;

use vremote_client::{Command, Connection, RemoteDriver, execute};
use vremote_core::Error;
use vremote_core::protocol::{Domain, DomainInfo, OpenArgs, OpenFlags, Procedure, RemoteErrorPayload};
use vremote_core::xdr::{XdrDecode, encode_array};
use vremote_test_utils::{CallLog, MockDaemon, Reply};

fn unix_uri(path: &std::path::Path) -> String {
    format!("test+unix:///default?socket={}", path.display())
}

/// Start `daemon` on a fresh socket and open a connection to it.
async fn connect(daemon: MockDaemon) -> (Connection, CallLog, tempfile::TempDir) {
    vremote_core::init_test_logging();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sock");
    let log = daemon.log();
    daemon.spawn_unix(&path).unwrap();

    let conn = RemoteDriver::default()
        .open(Some(&unix_uri(&path)), OpenFlags::default())
        .await
        .unwrap()
        .expect("unix URI declined");
    (conn, log, dir)
}

fn array<T: vremote_core::xdr::XdrEncode>(items: &[T]) -> Reply {
    let mut buf = BytesMut::new();
    encode_array(items, items.len(), &mut buf).unwrap();
    Reply::Ok(buf.freeze())
}

fn guest(id: i32) -> Domain {
    Domain {
        name: "guest1".into(),
        uuid: Uuid::from_u128(0x1234),
        id,
    }
}

#[tokio::test]
async fn open_sends_name_and_flags() {
    let (mut conn, log, _dir) = connect(MockDaemon::new()).await;
    assert!(conn.is_live());
    assert_eq!(conn.name(), "test:///default");

    conn.close().await.unwrap();
    let calls = log.calls();
    assert_eq!(calls[0].header.procedure, Procedure::Open.as_u32());
    let args = OpenArgs::decode(&mut calls[0].payload.clone()).unwrap();
    assert_eq!(args.name.as_deref(), Some("test:///default"));
    assert!(!args.flags.read_only);
}

#[tokio::test]
async fn serials_increase_across_calls() {
    let daemon = MockDaemon::new()
        .reply(Reply::empty())
        .reply(Reply::ok(&9_001_002i64))
        .reply(Reply::ok(&4i32));
    let (mut conn, log, _dir) = connect(daemon).await;

    assert_eq!(conn.get_version().await.unwrap(), 9_001_002);
    assert_eq!(conn.num_of_domains().await.unwrap(), 4);
    conn.close().await.unwrap();

    let serials: Vec<u32> = log.calls().iter().map(|c| c.header.serial).collect();
    assert_eq!(serials, vec![0, 1, 2, 3]);
}

#[tokio::test]
async fn hypervisor_type_is_cached() {
    let daemon = MockDaemon::new()
        .reply(Reply::empty())
        .reply(Reply::ok("QEMU"));
    let (mut conn, log, _dir) = connect(daemon).await;

    assert_eq!(conn.get_type().await.unwrap(), "QEMU");
    assert_eq!(conn.get_type().await.unwrap(), "QEMU");
    conn.close().await.unwrap();

    assert_eq!(
        log.procedures(),
        vec![
            Procedure::Open.as_u32(),
            Procedure::GetType.as_u32(),
            Procedure::Close.as_u32()
        ]
    );
}

#[tokio::test]
async fn closed_connection_rejects_everything() {
    let (mut conn, log, _dir) = connect(MockDaemon::new()).await;
    conn.close().await.unwrap();

    assert!(matches!(conn.close().await, Err(Error::ClosedHandle)));
    assert!(matches!(conn.get_version().await, Err(Error::ClosedHandle)));
    assert_eq!(log.len(), 2);
}

#[tokio::test]
async fn remote_error_is_surfaced() {
    let daemon = MockDaemon::new()
        .reply(Reply::empty())
        .reply(Reply::error(RemoteErrorPayload::new(10, 42, "boom")));
    let (mut conn, _log, _dir) = connect(daemon).await;

    let err = conn.get_capabilities().await.unwrap_err();
    assert!(err.is_remote());
    let remote = err.remote().unwrap();
    assert_eq!(remote.code, 42);
    assert_eq!(remote.subsystem, 10);
    assert_eq!(remote.message.as_deref(), Some("boom"));

    // The connection stays usable after a server-reported failure.
    assert!(conn.is_live());
    conn.close().await.unwrap();
}

#[tokio::test]
async fn open_failure_is_reported() {
    vremote_core::init_test_logging();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sock");
    MockDaemon::new()
        .reply(Reply::error(RemoteErrorPayload::new(0, 38, "access denied")))
        .spawn_unix(&path)
        .unwrap();

    let err = RemoteDriver::default()
        .open(Some(&unix_uri(&path)), OpenFlags { read_only: true })
        .await
        .unwrap_err();
    assert_eq!(err.remote().map(|r| r.code), Some(38));
}

#[tokio::test]
async fn oversized_request_is_rejected_before_io() {
    let (mut conn, log, _dir) = connect(MockDaemon::new()).await;

    let err = conn.list_domains(16_385).await.unwrap_err();
    assert!(matches!(err, Error::Protocol { .. }));
    assert!(conn.is_live());
    assert_eq!(log.len(), 1);
    conn.close().await.unwrap();
}

#[tokio::test]
async fn reply_longer_than_requested_is_rejected() {
    let daemon = MockDaemon::new()
        .reply(Reply::empty())
        .reply(array(&[1i32, 2, 3]));
    let (mut conn, _log, _dir) = connect(daemon).await;

    let err = conn.list_domains(2).await.unwrap_err();
    assert!(matches!(err, Error::Protocol { .. }));
    conn.close().await.unwrap();
}

#[tokio::test]
async fn serial_mismatch_is_protocol_error() {
    let daemon = MockDaemon::new()
        .reply(Reply::empty())
        .reply(Reply::tampered(&7i32, |h| h.serial += 1));
    let (mut conn, _log, _dir) = connect(daemon).await;

    let err = conn.num_of_networks().await.unwrap_err();
    assert!(matches!(err, Error::Protocol { .. }));
}

#[tokio::test]
async fn hangup_mid_call_is_connection_closed() {
    let daemon = MockDaemon::new().reply(Reply::empty()).reply(Reply::Hangup);
    let (mut conn, _log, _dir) = connect(daemon).await;

    let err = conn.get_version().await.unwrap_err();
    assert!(matches!(err, Error::ConnectionClosed));
}

#[tokio::test]
async fn domain_lookup_and_info() {
    let info = DomainInfo {
        state: 1,
        max_mem: 2_097_152,
        memory: 1_048_576,
        nr_virt_cpu: 2,
        cpu_time: 3_000_000_000,
    };
    let daemon = MockDaemon::new()
        .reply(Reply::empty())
        .reply(Reply::ok(&guest(3)))
        .reply(Reply::ok(&info))
        .reply(Reply::ok("hvm"));
    let (mut conn, log, _dir) = connect(daemon).await;

    let dom = conn.domain_lookup_by_name("guest1").await.unwrap();
    assert_eq!(dom, guest(3));
    assert_eq!(conn.domain_get_info(&dom).await.unwrap(), info);
    assert_eq!(conn.domain_get_os_type(&dom).await.unwrap(), "hvm");
    conn.close().await.unwrap();

    let calls = log.calls();
    assert_eq!(
        String::decode(&mut calls[1].payload.clone()).unwrap(),
        "guest1"
    );
    assert_eq!(
        Domain::decode(&mut calls[2].payload.clone()).unwrap(),
        guest(3)
    );
}

#[tokio::test]
async fn list_command_renders_active_and_defined() {
    let info = DomainInfo {
        state: 1,
        max_mem: 1024,
        memory: 1024,
        nr_virt_cpu: 1,
        cpu_time: 0,
    };
    let daemon = MockDaemon::new()
        .reply(Reply::empty())
        .reply(Reply::ok(&1i32))
        .reply(array(&[3i32]))
        .reply(Reply::ok(&guest(3)))
        .reply(Reply::ok(&info))
        .reply(Reply::ok(&1i32))
        .reply(array(&["backup".to_string()]));
    let (mut conn, _log, _dir) = connect(daemon).await;

    let out = execute(&mut conn, &Command::List { all: true }, true)
        .await
        .unwrap();
    let rows: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(rows[0]["id"], 3);
    assert_eq!(rows[0]["name"], "guest1");
    assert_eq!(rows[0]["state"], "running");
    assert!(rows[1]["id"].is_null());
    assert_eq!(rows[1]["name"], "backup");
    assert_eq!(rows[1]["state"], "shut off");
    conn.close().await.unwrap();
}

#[tokio::test]
async fn lifecycle_command_resolves_numeric_id() {
    let daemon = MockDaemon::new()
        .reply(Reply::empty())
        .reply(Reply::ok(&guest(3)))
        .reply(Reply::empty());
    let (mut conn, log, _dir) = connect(daemon).await;

    let out = execute(
        &mut conn,
        &Command::Suspend {
            domain: "3".into(),
        },
        false,
    )
    .await
    .unwrap();
    assert_eq!(out, "Domain guest1 suspended");
    conn.close().await.unwrap();

    assert_eq!(
        log.procedures()[1..3],
        [
            Procedure::DomainLookupById.as_u32(),
            Procedure::DomainSuspend.as_u32()
        ]
    );
}
