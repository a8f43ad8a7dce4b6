#![cfg(unix)]

use serde_json::json;
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixListener;
use std::path::PathBuf;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use transport::{ConsoleCall, ConsoleTransport, Payload, RawResponse, Transport, TransportError};

const GREETING: &str = "Tarantool 2.11.1 (Lua console)                                 \n\
                        type 'help' for interactive help                               \n";

fn socket_path(name: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!(
        "clusterctl-{}-{}.control",
        std::process::id(),
        name
    ));
    let _ = fs::remove_file(&path);
    path
}

/// Accept one connection, greet, read the chunk and answer with `reply`.
fn spawn_console(path: &PathBuf, greeting: &'static str, reply: &'static str) -> JoinHandle<String> {
    let listener = UnixListener::bind(path).expect("bind console socket");
    thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept");
        stream.write_all(greeting.as_bytes()).expect("greeting");
        let mut reader = BufReader::new(stream.try_clone().expect("clone stream"));
        let mut chunk = String::new();
        let _ = reader.read_line(&mut chunk);
        let _ = stream.write_all(reply.as_bytes());
        chunk
    })
}

#[test]
fn evaluates_chunk_and_decodes_envelope() {
    let path = socket_path("eval");
    let stub = spawn_console(
        &path,
        GREETING,
        "---\n- '{\"ok\":true,\"res\":{\"in_progress\":true}}'\n...\n",
    );

    let transport = ConsoleTransport::new(&path, Duration::from_secs(5));
    let payload = Payload::Console(
        ConsoleCall::new("snapshot_state", "return {in_progress = box.info.gc().checkpoint_is_in_progress}")
            .arg("unused"),
    );
    let response = transport.send(&payload).unwrap();
    assert_eq!(
        response,
        RawResponse::Console {
            result: json!({"in_progress": true}),
            error: None,
        }
    );

    let chunk = stub.join().unwrap();
    assert!(chunk.contains("checkpoint_is_in_progress"));
    assert!(chunk.contains(r#"[=[["unused"]]=]"#));
    assert!(chunk.ends_with('\n'));
    let _ = fs::remove_file(&path);
}

#[test]
fn remote_error_is_returned_as_console_error() {
    let path = socket_path("remote-err");
    let stub = spawn_console(
        &path,
        GREETING,
        "---\n- '{\"ok\":false,\"err\":\"Cluster isn''t bootstrapped yet\"}'\n...\n",
    );

    let transport = ConsoleTransport::new(&path, Duration::from_secs(5));
    let response = transport
        .send(&Payload::Console(ConsoleCall::new("topology", "return nil")))
        .unwrap();
    match response {
        RawResponse::Console { error, .. } => {
            assert_eq!(error, Some(json!("Cluster isn't bootstrapped yet")));
        }
        other => panic!("unexpected {other:?}"),
    }
    stub.join().unwrap();
    let _ = fs::remove_file(&path);
}

#[test]
fn missing_socket_is_reported_with_path() {
    let path = socket_path("missing");
    let transport = ConsoleTransport::new(&path, Duration::from_secs(1));

    let err = transport
        .send(&Payload::Console(ConsoleCall::new("health", "return true")))
        .unwrap_err();
    assert!(matches!(err, TransportError::SocketMissing { .. }));
    assert!(err.to_string().contains(&path.display().to_string()));
}

#[test]
fn foreign_greeting_is_a_protocol_error() {
    let path = socket_path("foreign");
    let stub = spawn_console(&path, "SSH-2.0-OpenSSH_9.6\n", "");

    let transport = ConsoleTransport::new(&path, Duration::from_secs(2));
    let err = transport
        .send(&Payload::Console(ConsoleCall::new("health", "return true")))
        .unwrap_err();
    assert!(matches!(err, TransportError::Protocol { .. }));
    drop(stub);
    let _ = fs::remove_file(&path);
}

#[test]
fn silent_instance_times_out() {
    let path = socket_path("silent");
    let listener = UnixListener::bind(&path).expect("bind console socket");
    let stub = thread::spawn(move || {
        let (stream, _) = listener.accept().expect("accept");
        thread::sleep(Duration::from_millis(800));
        drop(stream);
    });

    let transport = ConsoleTransport::new(&path, Duration::from_millis(200));
    let err = transport
        .send(&Payload::Console(ConsoleCall::new("health", "return true")))
        .unwrap_err();
    assert!(matches!(err, TransportError::Timeout { .. }), "unexpected {err:?}");

    stub.join().unwrap();
    let _ = fs::remove_file(&path);
}
