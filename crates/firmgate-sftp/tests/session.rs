//! End-to-end session tests over the in-memory object store.
//!
//! Each test drives a session with raw framed packets, exactly as the
//! bytes arrive from the SSH channel, and asserts on the framed
//! responses.

use bytes::{BufMut, BytesMut};
use firmgate_core::{Role, UserContext};
use firmgate_sftp::protocol::{codec, FileAttrs, MessageType, OpenFlags, StatusCode, SFTP_VERSION};
use firmgate_sftp::{Config, SftpSession};
use firmgate_store::MemoryObjectStore;
use std::sync::Arc;

fn make_session(store: Arc<MemoryObjectStore>, role: Role, models: &[&str]) -> SftpSession {
    let user = UserContext {
        username: "tester".into(),
        role,
        allowed_models: models.iter().map(|m| (*m).to_string()).collect(),
    };
    SftpSession::new(user, store, Arc::new(Config::default()), None)
}

async fn init(session: &mut SftpSession) {
    let mut packet = BytesMut::new();
    packet.put_u8(MessageType::Init as u8);
    packet.put_u32(SFTP_VERSION);
    let response = session.handle_data(&frame(&packet)).await.unwrap();
    assert_eq!(response[4], MessageType::Version as u8);
}

fn frame(packet: &[u8]) -> Vec<u8> {
    let mut framed = (packet.len() as u32).to_be_bytes().to_vec();
    framed.extend_from_slice(packet);
    framed
}

#[derive(Debug)]
enum Resp {
    Status { id: u32, code: u32 },
    Handle { id: u32, handle: Vec<u8> },
    Data { id: u32, data: Vec<u8> },
    Name { id: u32, entries: Vec<(String, FileAttrs)> },
    Attrs { id: u32, attrs: FileAttrs },
}

fn parse_one(response: &[u8]) -> Resp {
    let responses = parse_all(response);
    assert_eq!(responses.len(), 1, "expected exactly one response frame");
    responses.into_iter().next().unwrap()
}

fn parse_all(mut response: &[u8]) -> Vec<Resp> {
    let mut out = Vec::new();
    while !response.is_empty() {
        let len = u32::from_be_bytes([response[0], response[1], response[2], response[3]]) as usize;
        let packet = &response[4..4 + len];
        out.push(parse_packet(packet));
        response = &response[4 + len..];
    }
    out
}

fn parse_packet(packet: &[u8]) -> Resp {
    let msg_type = packet[0];
    let mut buf = &packet[1..];
    let id = codec::get_u32(&mut buf).unwrap();

    if msg_type == MessageType::Status as u8 {
        let code = codec::get_u32(&mut buf).unwrap();
        Resp::Status { id, code }
    } else if msg_type == MessageType::Handle as u8 {
        Resp::Handle {
            id,
            handle: codec::get_bytes(&mut buf).unwrap(),
        }
    } else if msg_type == MessageType::Data as u8 {
        Resp::Data {
            id,
            data: codec::get_bytes(&mut buf).unwrap(),
        }
    } else if msg_type == MessageType::Name as u8 {
        let count = codec::get_u32(&mut buf).unwrap();
        let mut entries = Vec::new();
        for _ in 0..count {
            let filename = codec::get_string(&mut buf).unwrap();
            let _longname = codec::get_string(&mut buf).unwrap();
            let attrs = FileAttrs::decode(&mut buf).unwrap();
            entries.push((filename, attrs));
        }
        Resp::Name { id, entries }
    } else if msg_type == MessageType::Attrs as u8 {
        Resp::Attrs {
            id,
            attrs: FileAttrs::decode(&mut buf).unwrap(),
        }
    } else {
        panic!("unexpected response type {msg_type}");
    }
}

async fn send(session: &mut SftpSession, packet: &BytesMut) -> Resp {
    let response = session.handle_data(&frame(packet)).await.unwrap();
    parse_one(&response)
}

fn open_packet(id: u32, path: &str, flags: u32) -> BytesMut {
    let mut packet = BytesMut::new();
    packet.put_u8(MessageType::Open as u8);
    packet.put_u32(id);
    codec::put_string(&mut packet, path);
    packet.put_u32(flags);
    packet.put_u32(0); // empty attrs
    packet
}

fn close_packet(id: u32, handle: &[u8]) -> BytesMut {
    let mut packet = BytesMut::new();
    packet.put_u8(MessageType::Close as u8);
    packet.put_u32(id);
    codec::put_bytes(&mut packet, handle);
    packet
}

fn read_packet(id: u32, handle: &[u8], offset: u64, length: u32) -> BytesMut {
    let mut packet = BytesMut::new();
    packet.put_u8(MessageType::Read as u8);
    packet.put_u32(id);
    codec::put_bytes(&mut packet, handle);
    packet.put_u64(offset);
    packet.put_u32(length);
    packet
}

fn write_packet(id: u32, handle: &[u8], offset: u64, data: &[u8]) -> BytesMut {
    let mut packet = BytesMut::new();
    packet.put_u8(MessageType::Write as u8);
    packet.put_u32(id);
    codec::put_bytes(&mut packet, handle);
    packet.put_u64(offset);
    codec::put_bytes(&mut packet, data);
    packet
}

fn path_packet(msg_type: MessageType, id: u32, path: &str) -> BytesMut {
    let mut packet = BytesMut::new();
    packet.put_u8(msg_type as u8);
    packet.put_u32(id);
    codec::put_string(&mut packet, path);
    packet
}

fn readdir_packet(id: u32, handle: &[u8]) -> BytesMut {
    let mut packet = BytesMut::new();
    packet.put_u8(MessageType::Readdir as u8);
    packet.put_u32(id);
    codec::put_bytes(&mut packet, handle);
    packet
}

fn expect_handle(resp: Resp) -> Vec<u8> {
    match resp {
        Resp::Handle { handle, .. } => handle,
        other => panic!("expected handle, got {other:?}"),
    }
}

fn expect_status(resp: Resp, code: StatusCode) {
    match resp {
        Resp::Status { code: got, .. } => assert_eq!(got, code as u32),
        other => panic!("expected status, got {other:?}"),
    }
}

#[tokio::test]
async fn upload_commits_on_close_and_downloads_back() {
    let store = Arc::new(MemoryObjectStore::new());
    let mut session = make_session(store.clone(), Role::Admin, &[]);
    init(&mut session).await;

    let handle = expect_handle(
        send(
            &mut session,
            &open_packet(1, "/firmwares/SS1416/2.4.1/fw.bin", OpenFlags::WRITE | OpenFlags::CREAT),
        )
        .await,
    );

    expect_status(
        send(&mut session, &write_packet(2, &handle, 0, b"firmware-")).await,
        StatusCode::Ok,
    );
    expect_status(
        send(&mut session, &write_packet(3, &handle, 9, b"payload")).await,
        StatusCode::Ok,
    );

    // Nothing committed until close.
    assert!(!store.contains("firmwares/SS1416/2.4.1/fw.bin").await);

    expect_status(
        send(&mut session, &close_packet(4, &handle)).await,
        StatusCode::Ok,
    );

    let puts = store.recorded_puts().await;
    assert_eq!(puts.len(), 1);
    assert_eq!(puts[0].0, "firmwares/SS1416/2.4.1/fw.bin");
    assert_eq!(puts[0].1, b"firmware-payload");

    // Download it back.
    let handle = expect_handle(
        send(
            &mut session,
            &open_packet(5, "SS1416/2.4.1/fw.bin", OpenFlags::READ),
        )
        .await,
    );

    match send(&mut session, &read_packet(6, &handle, 0, 1024)).await {
        Resp::Data { data, .. } => assert_eq!(data, b"firmware-payload"),
        other => panic!("expected data, got {other:?}"),
    }

    expect_status(
        send(&mut session, &read_packet(7, &handle, 16, 1024)).await,
        StatusCode::Eof,
    );

    expect_status(
        send(&mut session, &close_packet(8, &handle)).await,
        StatusCode::Ok,
    );
}

#[tokio::test]
async fn write_offsets_are_appended_in_arrival_order() {
    let store = Arc::new(MemoryObjectStore::new());
    let mut session = make_session(store.clone(), Role::Admin, &[]);
    init(&mut session).await;

    let handle = expect_handle(
        send(
            &mut session,
            &open_packet(1, "/firmwares/SS1406/1.0/fw.bin", OpenFlags::WRITE),
        )
        .await,
    );

    // A bogus offset does not reorder anything.
    expect_status(
        send(&mut session, &write_packet(2, &handle, 9000, b"ab")).await,
        StatusCode::Ok,
    );
    expect_status(
        send(&mut session, &write_packet(3, &handle, 0, b"cd")).await,
        StatusCode::Ok,
    );
    expect_status(
        send(&mut session, &close_packet(4, &handle)).await,
        StatusCode::Ok,
    );

    assert_eq!(store.recorded_puts().await[0].1, b"abcd");
}

#[tokio::test]
async fn empty_write_buffer_commits_nothing() {
    let store = Arc::new(MemoryObjectStore::new());
    let mut session = make_session(store.clone(), Role::Admin, &[]);
    init(&mut session).await;

    let handle = expect_handle(
        send(
            &mut session,
            &open_packet(1, "/firmwares/SS1406/1.0/fw.bin", OpenFlags::WRITE),
        )
        .await,
    );
    expect_status(
        send(&mut session, &close_packet(2, &handle)).await,
        StatusCode::Ok,
    );

    assert!(store.recorded_puts().await.is_empty());
    assert!(!store.contains("firmwares/SS1406/1.0/fw.bin").await);
}

#[tokio::test]
async fn downloader_cannot_write_or_remove() {
    let store = Arc::new(MemoryObjectStore::new());
    store.seed("firmwares/SS1416/2.4.1/fw.bin", b"data".to_vec()).await;
    let mut session = make_session(store.clone(), Role::Downloader, &[]);
    init(&mut session).await;

    expect_status(
        send(
            &mut session,
            &open_packet(1, "/firmwares/SS1416/2.4.1/fw.bin", OpenFlags::WRITE),
        )
        .await,
        StatusCode::PermissionDenied,
    );

    expect_status(
        send(
            &mut session,
            &path_packet(MessageType::Remove, 2, "/firmwares/SS1416/2.4.1/fw.bin"),
        )
        .await,
        StatusCode::PermissionDenied,
    );

    // Reads still work.
    let handle = expect_handle(
        send(
            &mut session,
            &open_packet(3, "/firmwares/SS1416/2.4.1/fw.bin", OpenFlags::READ),
        )
        .await,
    );
    match send(&mut session, &read_packet(4, &handle, 0, 16)).await {
        Resp::Data { data, .. } => assert_eq!(data, b"data"),
        other => panic!("expected data, got {other:?}"),
    }
}

#[tokio::test]
async fn scoped_account_sees_only_its_models() {
    let store = Arc::new(MemoryObjectStore::new());
    store.seed("firmwares/SS1406/1.0/a.bin", b"a".to_vec()).await;
    store.seed("firmwares/SS1416/2.4.1/b.bin", b"b".to_vec()).await;
    store.seed("firmwares/SSN3000/9.0/c.bin", b"c".to_vec()).await;

    let mut session = make_session(store.clone(), Role::Downloader, &["SS1406", "SS1416"]);
    init(&mut session).await;

    // Root listing is filtered by omission.
    let handle = expect_handle(send(&mut session, &path_packet(MessageType::Opendir, 1, "/")).await);
    match send(&mut session, &readdir_packet(2, &handle)).await {
        Resp::Name { entries, .. } => {
            let names: Vec<_> = entries.iter().map(|(n, _)| n.as_str()).collect();
            assert_eq!(names, vec!["SS1406", "SS1416"]);
        }
        other => panic!("expected name, got {other:?}"),
    }

    // Direct access to a foreign model is denied, listing and file alike.
    expect_status(
        send(&mut session, &path_packet(MessageType::Opendir, 3, "/firmwares/SSN3000")).await,
        StatusCode::PermissionDenied,
    );
    expect_status(
        send(
            &mut session,
            &open_packet(4, "/firmwares/SSN3000/9.0/c.bin", OpenFlags::READ),
        )
        .await,
        StatusCode::PermissionDenied,
    );
    expect_status(
        send(&mut session, &path_packet(MessageType::Stat, 5, "/firmwares/SSN3000")).await,
        StatusCode::PermissionDenied,
    );

    // Permitted model works end to end.
    let handle = expect_handle(
        send(&mut session, &path_packet(MessageType::Opendir, 6, "/firmwares/SS1416")).await,
    );
    match send(&mut session, &readdir_packet(7, &handle)).await {
        Resp::Name { entries, .. } => {
            assert_eq!(entries.len(), 1);
            assert_eq!(entries[0].0, "2.4.1");
            assert!(entries[0].1.is_directory());
        }
        other => panic!("expected name, got {other:?}"),
    }
}

#[tokio::test]
async fn readdir_pages_and_terminates_with_eof() {
    let store = Arc::new(MemoryObjectStore::new());
    for i in 0..25 {
        store
            .seed(format!("firmwares/SS1416/{i:02}.0/fw.bin"), b"x".to_vec())
            .await;
    }

    let mut session = make_session(store, Role::Downloader, &[]);
    init(&mut session).await;

    let handle = expect_handle(
        send(&mut session, &path_packet(MessageType::Opendir, 1, "/firmwares/SS1416")).await,
    );

    let mut total = 0;
    let mut pages = Vec::new();
    loop {
        match send(&mut session, &readdir_packet(2, &handle)).await {
            Resp::Name { entries, .. } => {
                pages.push(entries.len());
                total += entries.len();
            }
            Resp::Status { code, .. } => {
                assert_eq!(code, StatusCode::Eof as u32);
                break;
            }
            other => panic!("unexpected response {other:?}"),
        }
    }

    assert_eq!(total, 25);
    assert_eq!(pages, vec![10, 10, 5]);
}

#[tokio::test]
async fn stat_serves_objects_directories_and_misses() {
    let store = Arc::new(MemoryObjectStore::new());
    store.seed("firmwares/SS1416/2.4.1/fw.bin", vec![0u8; 2048]).await;

    let mut session = make_session(store, Role::Downloader, &[]);
    init(&mut session).await;

    // Object: real size, regular mode.
    match send(&mut session, &path_packet(MessageType::Stat, 1, "/firmwares/SS1416/2.4.1/fw.bin"))
        .await
    {
        Resp::Attrs { attrs, .. } => {
            assert_eq!(attrs.size, Some(2048));
            assert!(!attrs.is_directory());
        }
        other => panic!("expected attrs, got {other:?}"),
    }

    // Synthesized directory, via LSTAT to cover the alias.
    match send(&mut session, &path_packet(MessageType::Lstat, 2, "/firmwares/SS1416")).await {
        Resp::Attrs { attrs, .. } => assert!(attrs.is_directory()),
        other => panic!("expected attrs, got {other:?}"),
    }

    // Root is always a directory.
    match send(&mut session, &path_packet(MessageType::Stat, 3, "/")).await {
        Resp::Attrs { attrs, .. } => assert!(attrs.is_directory()),
        other => panic!("expected attrs, got {other:?}"),
    }

    // A non-object path is treated as an implicit directory.
    match send(&mut session, &path_packet(MessageType::Stat, 4, "/firmwares/SS9999")).await {
        Resp::Attrs { attrs, .. } => assert!(attrs.is_directory()),
        other => panic!("expected attrs, got {other:?}"),
    }
}

#[tokio::test]
async fn remove_deletes_objects_idempotently() {
    let store = Arc::new(MemoryObjectStore::new());
    store.seed("firmwares/SS1416/2.4.1/fw.bin", b"x".to_vec()).await;

    let mut session = make_session(store.clone(), Role::Admin, &[]);
    init(&mut session).await;

    expect_status(
        send(
            &mut session,
            &path_packet(MessageType::Remove, 1, "/firmwares/SS1416/2.4.1/fw.bin"),
        )
        .await,
        StatusCode::Ok,
    );
    assert!(!store.contains("firmwares/SS1416/2.4.1/fw.bin").await);

    // Backend deletes are idempotent; deleting again is still OK.
    expect_status(
        send(
            &mut session,
            &path_packet(MessageType::Remove, 2, "/firmwares/SS1416/2.4.1/fw.bin"),
        )
        .await,
        StatusCode::Ok,
    );
}

#[tokio::test]
async fn realpath_lands_on_the_namespace_root() {
    let store = Arc::new(MemoryObjectStore::new());
    let mut session = make_session(store, Role::Downloader, &[]);
    init(&mut session).await;

    for (id, path) in [(1u32, "."), (2, "/"), (3, "")] {
        match send(&mut session, &path_packet(MessageType::Realpath, id, path)).await {
            Resp::Name { entries, .. } => {
                assert_eq!(entries.len(), 1);
                assert_eq!(entries[0].0, "/firmwares");
            }
            other => panic!("expected name, got {other:?}"),
        }
    }

    match send(&mut session, &path_packet(MessageType::Realpath, 4, "SS1416/2.4.1")).await {
        Resp::Name { entries, .. } => assert_eq!(entries[0].0, "/firmwares/SS1416/2.4.1"),
        other => panic!("expected name, got {other:?}"),
    }
}

#[tokio::test]
async fn open_of_missing_object_reports_no_such_file() {
    let store = Arc::new(MemoryObjectStore::new());
    let mut session = make_session(store, Role::Downloader, &[]);
    init(&mut session).await;

    expect_status(
        send(
            &mut session,
            &open_packet(1, "/firmwares/SS1416/2.4.1/fw.bin", OpenFlags::READ),
        )
        .await,
        StatusCode::NoSuchFile,
    );
}

#[tokio::test]
async fn unknown_and_foreign_handles_fail() {
    let store = Arc::new(MemoryObjectStore::new());
    store.seed("firmwares/SS1416/2.4.1/fw.bin", b"x".to_vec()).await;

    let mut session_a = make_session(store.clone(), Role::Admin, &[]);
    init(&mut session_a).await;
    let handle = expect_handle(
        send(
            &mut session_a,
            &open_packet(1, "/firmwares/SS1416/2.4.1/fw.bin", OpenFlags::READ),
        )
        .await,
    );

    // The same handle means nothing to another session.
    let mut session_b = make_session(store, Role::Admin, &[]);
    init(&mut session_b).await;
    expect_status(
        send(&mut session_b, &read_packet(2, &handle, 0, 16)).await,
        StatusCode::Failure,
    );

    // And a fabricated handle fails in its own session.
    expect_status(
        send(&mut session_a, &read_packet(3, b"bogus-handle", 0, 16)).await,
        StatusCode::Failure,
    );

    // Closing an already-closed handle fails too.
    expect_status(
        send(&mut session_a, &close_packet(4, &handle)).await,
        StatusCode::Ok,
    );
    expect_status(
        send(&mut session_a, &close_packet(5, &handle)).await,
        StatusCode::Failure,
    );
}

#[tokio::test]
async fn traversal_paths_are_rejected() {
    let store = Arc::new(MemoryObjectStore::new());
    let mut session = make_session(store, Role::Admin, &[]);
    init(&mut session).await;

    expect_status(
        send(&mut session, &path_packet(MessageType::Stat, 1, "/firmwares/../secrets")).await,
        StatusCode::Failure,
    );
    expect_status(
        send(
            &mut session,
            &open_packet(2, "../../etc/passwd", OpenFlags::READ),
        )
        .await,
        StatusCode::Failure,
    );
}

#[tokio::test]
async fn unsupported_operations_answer_failure() {
    let store = Arc::new(MemoryObjectStore::new());
    let mut session = make_session(store, Role::Admin, &[]);
    init(&mut session).await;

    // MKDIR has no object-store counterpart.
    let mut packet = BytesMut::new();
    packet.put_u8(MessageType::Mkdir as u8);
    packet.put_u32(9);
    codec::put_string(&mut packet, "/firmwares/NEW");
    packet.put_u32(0);

    match send(&mut session, &packet).await {
        Resp::Status { id, code } => {
            assert_eq!(id, 9);
            assert_eq!(code, StatusCode::Failure as u32);
        }
        other => panic!("expected status, got {other:?}"),
    }
}

#[tokio::test]
async fn oversized_upload_is_rejected() {
    let store = Arc::new(MemoryObjectStore::new());
    let config = Config {
        max_file_size: 8,
        ..Config::default()
    };
    let user = UserContext {
        username: "tester".into(),
        role: Role::Admin,
        allowed_models: vec![],
    };
    let mut session = SftpSession::new(user, store.clone(), Arc::new(config), None);
    init(&mut session).await;

    let handle = expect_handle(
        send(
            &mut session,
            &open_packet(1, "/firmwares/SS1416/2.4.1/fw.bin", OpenFlags::WRITE),
        )
        .await,
    );

    expect_status(
        send(&mut session, &write_packet(2, &handle, 0, b"12345678")).await,
        StatusCode::Ok,
    );
    expect_status(
        send(&mut session, &write_packet(3, &handle, 8, b"9")).await,
        StatusCode::Failure,
    );
}

#[tokio::test]
async fn pipelined_requests_in_one_chunk_all_answer() {
    let store = Arc::new(MemoryObjectStore::new());
    let mut session = make_session(store, Role::Downloader, &[]);
    init(&mut session).await;

    let mut chunk = Vec::new();
    chunk.extend_from_slice(&frame(&path_packet(MessageType::Realpath, 1, ".")));
    chunk.extend_from_slice(&frame(&path_packet(MessageType::Stat, 2, "/")));

    let responses = parse_all(&session.handle_data(&chunk).await.unwrap());
    assert_eq!(responses.len(), 2);
    assert!(matches!(responses[0], Resp::Name { id: 1, .. }));
    assert!(matches!(responses[1], Resp::Attrs { id: 2, .. }));
}
