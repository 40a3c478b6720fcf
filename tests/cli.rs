//! Black-box tests of the `mcctl` and `sync-repl` binaries against a mock
//! server speaking the client codec.

use std::collections::HashMap;
use std::io::{BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;

use assert_cmd::Command;
use predicates::str::contains;

use mctools::client::{
    GetResponse, MutationOp, MutationResponse, MutationResult, Request, StatusResponse,
};

/// Names of the requests a server session received, in arrival order.
type RequestLog = Arc<Mutex<Vec<&'static str>>>;

/// Accepts connections sequentially and serves the JSON codec over a shared
/// in-memory map. Lives until the test process exits.
fn spawn_server() -> (SocketAddr, RequestLog) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let log: RequestLog = Arc::new(Mutex::new(Vec::new()));
    let server_log = Arc::clone(&log);

    thread::spawn(move || {
        let mut store: HashMap<String, Vec<u8>> = HashMap::new();
        let mut seqno = 0u64;
        for stream in listener.incoming() {
            let stream = match stream {
                Ok(stream) => stream,
                Err(_) => break,
            };
            // A dropped client connection just ends that session.
            let _ = serve(stream, &mut store, &mut seqno, &server_log);
        }
    });

    (addr, log)
}

fn request_name(req: &Request) -> &'static str {
    match req {
        Request::Hello { .. } => "hello",
        Request::SaslAuthPlain { .. } => "sasl_auth_plain",
        Request::SelectBucket { .. } => "select_bucket",
        Request::EnableFeature { .. } => "enable_feature",
        Request::Get { .. } => "get",
        Request::Mutate { .. } => "mutate",
        Request::Delete { .. } => "delete",
    }
}

fn serve(
    stream: TcpStream,
    store: &mut HashMap<String, Vec<u8>>,
    seqno: &mut u64,
    log: &RequestLog,
) -> mctools::Result<()> {
    let reader = BufReader::new(stream.try_clone()?);
    let mut writer = stream;

    for req in serde_json::Deserializer::from_reader(reader).into_iter::<Request>() {
        let req = req?;
        log.lock().unwrap().push(request_name(&req));
        match req {
            Request::Hello { .. }
            | Request::SaslAuthPlain { .. }
            | Request::SelectBucket { .. }
            | Request::EnableFeature { .. } => {
                serde_json::to_writer(&mut writer, &StatusResponse::Ok(()))?;
            }
            Request::Get { key } => {
                serde_json::to_writer(&mut writer, &GetResponse::Ok(store.get(&key).cloned()))?;
            }
            Request::Mutate { op, key, value, .. } => {
                *seqno += 1;
                let resp = match op {
                    MutationOp::Add if store.contains_key(&key) => {
                        MutationResponse::Err("Data exists for key".to_string())
                    }
                    MutationOp::Replace if !store.contains_key(&key) => {
                        MutationResponse::Err("Not found".to_string())
                    }
                    _ => {
                        store.insert(key, value);
                        MutationResponse::Ok(MutationResult {
                            cas: *seqno,
                            seqno: *seqno,
                        })
                    }
                };
                serde_json::to_writer(&mut writer, &resp)?;
            }
            Request::Delete { key, .. } => {
                *seqno += 1;
                let resp = if store.remove(&key).is_some() {
                    MutationResponse::Ok(MutationResult {
                        cas: *seqno,
                        seqno: *seqno,
                    })
                } else {
                    MutationResponse::Err("Not found".to_string())
                };
                serde_json::to_writer(&mut writer, &resp)?;
            }
        }
        writer.flush()?;
    }
    Ok(())
}

/// Port with nothing listening on it.
fn dead_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

fn mcctl() -> Command {
    Command::cargo_bin("mcctl").unwrap()
}

fn sync_repl() -> Command {
    Command::cargo_bin("sync-repl").unwrap()
}

#[test]
fn mcctl_requires_address_and_command() {
    mcctl().assert().code(2).stderr(contains("Too few arguments"));

    mcctl()
        .arg("127.0.0.1:11210")
        .assert()
        .code(2)
        .stderr(contains("Too few arguments"));
}

#[test]
fn mcctl_rejects_malformed_address() {
    mcctl()
        .args(["not a valid::: address", "get", "k"])
        .assert()
        .code(1)
        .stderr(contains("Invalid format for host string"));
}

#[test]
fn mcctl_reports_connection_errors() {
    let addr = dead_addr();
    mcctl()
        .args([addr.to_string().as_str(), "get", "k"])
        .assert()
        .code(1)
        .stderr(contains("Connection error"));
}

#[test]
fn mcctl_help_lists_sorted_commands() {
    mcctl()
        .arg("--help")
        .assert()
        .success()
        .stdout(contains("Commands:"))
        .stdout(contains("get <key>"))
        .stdout(contains("set-durable <key> <value>"));
}

#[test]
fn mcctl_unknown_command_is_a_usage_error() {
    let (addr, _) = spawn_server();
    mcctl()
        .args([addr.to_string().as_str(), "frobnicate"])
        .assert()
        .code(2)
        .stderr(contains("Unknown command"));
}

#[test]
fn mcctl_set_then_get_roundtrip() {
    let (addr, _) = spawn_server();
    let addr = addr.to_string();

    mcctl()
        .args([addr.as_str(), "set", "greeting", "hello-world"])
        .assert()
        .success()
        .stdout(contains("cas:"));

    mcctl()
        .args([addr.as_str(), "get", "greeting"])
        .assert()
        .success()
        .stdout(contains("hello-world"));
}

#[test]
fn mcctl_get_missing_key() {
    let (addr, _) = spawn_server();
    mcctl()
        .args([addr.to_string().as_str(), "get", "nosuchkey"])
        .assert()
        .success()
        .stdout(contains("Key not found"));
}

#[test]
fn mcctl_delete_missing_key_fails() {
    let (addr, _) = spawn_server();
    mcctl()
        .args([addr.to_string().as_str(), "delete", "nosuchkey"])
        .assert()
        .code(1)
        .stderr(contains("Not found"));
}

#[test]
fn mcctl_set_durable_with_level_and_bucket() {
    let (addr, _) = spawn_server();
    mcctl()
        .args([
            addr.to_string().as_str(),
            "set-durable",
            "k",
            "v",
            "-u",
            "user",
            "-P",
            "secret",
            "-b",
            "default",
            "-l",
            "3",
            "-t",
            "2500",
        ])
        .assert()
        .success()
        .stdout(contains("cas:"));
}

#[test]
fn mcctl_session_setup_runs_before_plain_commands() {
    let (addr, log) = spawn_server();
    mcctl()
        .args([
            addr.to_string().as_str(),
            "get",
            "k",
            "-u",
            "user",
            "-P",
            "secret",
            "-b",
            "default",
        ])
        .assert()
        .success()
        .stdout(contains("Key not found"));

    let log = log.lock().unwrap();
    assert_eq!(*log, vec!["sasl_auth_plain", "select_bucket", "get"]);
}

/// Accepts connections and closes them again without reading anything.
fn spawn_dropping_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    thread::spawn(move || {
        for stream in listener.incoming() {
            drop(stream);
        }
    });
    addr
}

#[test]
fn mcctl_remaps_dropped_connection() {
    let addr = spawn_dropping_server();
    mcctl()
        .args([addr.to_string().as_str(), "get", "k"])
        .assert()
        .code(1)
        .stderr(contains(format!(
            "Could not connect to {}: Connection refused",
            addr
        )));
}

#[test]
fn sync_repl_requires_seven_arguments() {
    sync_repl()
        .args(["127.0.0.1:11210", "user", "pw", "bucket", "get"])
        .assert()
        .code(1)
        .stderr(contains("Usage:"));
}

#[test]
fn sync_repl_unknown_op() {
    let (addr, _) = spawn_server();
    sync_repl()
        .args([
            addr.to_string().as_str(),
            "user",
            "pw",
            "bucket",
            "frobnicate",
            "k",
        ])
        .assert()
        .code(1)
        .stderr(contains("Unknown op 'frobnicate'"));
}

#[test]
fn sync_repl_durable_set_then_get() {
    let (addr, _) = spawn_server();
    let addr = addr.to_string();

    sync_repl()
        .args([
            addr.as_str(),
            "user",
            "pw",
            "bucket",
            "setD",
            "doc",
            "payload-1",
            "2",
            "5000",
        ])
        .assert()
        .success()
        .stdout(contains("cas:"));

    sync_repl()
        .args([addr.as_str(), "user", "pw", "bucket", "get", "doc"])
        .assert()
        .success()
        .stdout(contains("payload-1"));
}

#[test]
fn sync_repl_loop_bulk_set_durable() {
    let (addr, _) = spawn_server();
    let addr = addr.to_string();

    sync_repl()
        .args([
            addr.as_str(),
            "user",
            "pw",
            "bucket",
            "loop_bulk_setD",
            "doc",
            "unused-value",
            "10",
            "3",
        ])
        .assert()
        .success();

    // stride 10 // 3 = 3, so index 9 was written and index 1 was not
    sync_repl()
        .args([addr.as_str(), "user", "pw", "bucket", "get", "doc_1"])
        .assert()
        .success()
        .stdout(contains("Key not found"));
    sync_repl()
        .args([addr.as_str(), "user", "pw", "bucket", "delete", "doc_9"])
        .assert()
        .success()
        .stdout(contains("cas:"));
}
