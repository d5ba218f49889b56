//! End-to-end runs of the welcome-daemon binary against a local fake directory.

use serde_json::Value;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::path::Path;
use std::process::{Command, Output};
use std::thread;

const PEOPLE: &str = r#"[{"id":"alice","display_name":"Alice","attrs":{"homebridge":{"anywhere":true}}}]"#;
const ROLES: &str = r#"[{"id":"guest","display_name":"Guest"}]"#;
const HOME: &str = r#"{"id":"home-1","display_name":"Home","rooms":[
    {"id":"kitchen","display_name":"Kitchen"},
    {"id":"office","display_name":"Office"}
]}"#;
const PRESENCE: &str = r#"[{
    "known": true,
    "person": {"id":"alice","display_name":"Alice"},
    "role": {"id":"guest","display_name":"Guest"},
    "room": {"id":"kitchen","display_name":"Kitchen"}
}]"#;

fn serve_directory() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { continue };
            let mut reader = BufReader::new(stream.try_clone().expect("clone"));
            let mut request_line = String::new();
            if reader.read_line(&mut request_line).is_err() {
                continue;
            }
            loop {
                let mut header = String::new();
                if reader.read_line(&mut header).unwrap_or(0) == 0 || header == "\r\n" {
                    break;
                }
            }
            let (status, body) = match request_line.split_whitespace().nth(1) {
                Some("/api/people") => (200, PEOPLE),
                Some("/api/roles") => (200, ROLES),
                Some("/api/homes/home-1") => (200, HOME),
                Some("/api/homes/home-1/people") => (200, PRESENCE),
                _ => (404, "{}"),
            };
            let _ = write!(
                stream,
                "HTTP/1.1 {} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
        }
    });
    format!("http://{}", addr)
}

fn write_config(dir: &Path, server_url: Option<&str>) -> std::path::PathBuf {
    let mut content = format!(
        "home_id = \"home-1\"\ndatabase_path = \"{}\"\n",
        dir.join("registry.db").display()
    );
    if let Some(url) = server_url {
        content.push_str(&format!("server_url = \"{}\"\n", url));
    }
    let path = dir.join("daemon.toml");
    std::fs::write(&path, content).expect("write config");
    path
}

fn daemon(home: &Path, config: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_welcome-daemon"))
        .env("HOME", home)
        .env_remove("WELCOME_DEBUG_LOG")
        .env_remove("RUST_LOG")
        .arg("--config")
        .arg(config)
        .args(args)
        .output()
        .expect("spawn welcome-daemon")
}

fn stdout_json(output: &Output) -> Value {
    assert!(
        output.status.success(),
        "daemon failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("stdout is json")
}

#[test]
fn once_creates_entries_and_persists_them() {
    let temp_dir = tempfile::tempdir().expect("temp dir");
    let config = write_config(temp_dir.path(), Some(&serve_directory()));

    let report = stdout_json(&daemon(temp_dir.path(), &config, &["once"]));
    assert_eq!(report["created"].as_array().expect("created").len(), 6);

    let labels: Vec<&str> = report["updates"]
        .as_array()
        .expect("updates")
        .iter()
        .filter(|update| update["active"] == true)
        .filter_map(|update| update["label"].as_str())
        .collect();
    assert!(labels.contains(&"Kitchen Alice"));
    assert!(labels.contains(&"Anywhere Anyone"));
    assert!(!labels.contains(&"Office Alice"));

    let entries = stdout_json(&daemon(temp_dir.path(), &config, &["entries"]));
    assert_eq!(entries.as_array().expect("entries").len(), 6);

    let history = stdout_json(&daemon(
        temp_dir.path(),
        &config,
        &["history", "--limit", "50"],
    ));
    let events = history.as_array().expect("events");
    assert!(!events.is_empty());
    assert!(events.iter().all(|event| event["active"] == true));

    let second = stdout_json(&daemon(temp_dir.path(), &config, &["once"]));
    assert!(second["created"].as_array().expect("created").is_empty());
    assert!(second["removed"].as_array().expect("removed").is_empty());
}

#[test]
fn dry_run_leaves_database_untouched() {
    let temp_dir = tempfile::tempdir().expect("temp dir");
    let config = write_config(temp_dir.path(), Some(&serve_directory()));

    let report = stdout_json(&daemon(temp_dir.path(), &config, &["once", "--dry-run"]));
    assert_eq!(report["created"].as_array().expect("created").len(), 6);
    assert!(!temp_dir.path().join("registry.db").exists());

    stdout_json(&daemon(temp_dir.path(), &config, &["once"]));
    let before = stdout_json(&daemon(temp_dir.path(), &config, &["history"]));

    let report = stdout_json(&daemon(temp_dir.path(), &config, &["once", "--dry-run"]));
    assert!(report["created"].as_array().expect("created").is_empty());
    let after = stdout_json(&daemon(temp_dir.path(), &config, &["history"]));
    assert_eq!(before, after);
}

#[test]
fn missing_server_url_exits_nonzero() {
    let temp_dir = tempfile::tempdir().expect("temp dir");
    let config = write_config(temp_dir.path(), None);

    let output = daemon(temp_dir.path(), &config, &["once"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("server_url"));
}

#[test]
fn unreachable_directory_exits_nonzero() {
    let temp_dir = tempfile::tempdir().expect("temp dir");
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let url = format!("http://{}", listener.local_addr().expect("addr"));
    drop(listener);
    let config = write_config(temp_dir.path(), Some(&url));

    let output = daemon(temp_dir.path(), &config, &["once"]);
    assert!(!output.status.success());

    let entries = stdout_json(&daemon(temp_dir.path(), &config, &["entries"]));
    assert!(entries.as_array().expect("entries").is_empty());
}
