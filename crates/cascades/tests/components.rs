#![cfg(unix)]

use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use bytes::Bytes;
use cascades_frame::Ip;
use cascades_port::{Direction, Port, PortError};
use cascades_transport::Endpoint;

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = PathBuf::from(format!(
        "/tmp/cascli-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

fn ipc(path: &Path) -> String {
    format!("ipc://{}", path.display())
}

async fn wait_for_path(path: &Path) {
    let start = Instant::now();
    while !path.exists() {
        assert!(
            start.elapsed() < Duration::from_secs(5),
            "{} was never bound",
            path.display()
        );
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

async fn wait_for_exit(child: &mut Child) -> ExitStatus {
    wait_for_exit_within(child, Duration::from_secs(5)).await
}

async fn wait_for_exit_within(child: &mut Child, limit: Duration) -> ExitStatus {
    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait().expect("child should be pollable") {
            return status;
        }
        if start.elapsed() >= limit {
            let _ = child.kill();
            panic!("component did not terminate");
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

async fn open(name: &str, path: &Path, direction: Direction) -> Port {
    Port::open(name, Endpoint::Ipc(path.to_path_buf()), direction)
        .await
        .expect("test port should open")
}

async fn next_ip(port: &mut Port) -> Ip {
    let frames = tokio::time::timeout(Duration::from_secs(5), port.receive())
        .await
        .expect("IP should arrive in time")
        .expect("receive should succeed");
    Ip::decode(&frames).expect("component should only emit valid IPs")
}

fn read_stdout(child: &mut Child) -> String {
    let mut stdout = String::new();
    child
        .stdout
        .take()
        .expect("stdout should be piped")
        .read_to_string(&mut stdout)
        .expect("stdout should be readable");
    stdout
}

#[tokio::test]
async fn console_prints_ips_and_exits_when_upstream_closes() {
    let dir = unique_temp_dir("console");
    let sock = dir.join("in.sock");

    let mut child = Command::new(env!("CARGO_BIN_EXE_console"))
        .arg("--port.in")
        .arg(ipc(&sock))
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("console should start");
    wait_for_path(&sock).await;

    let mut upstream = open("test.out", &sock, Direction::Output).await;
    upstream.send(Ip::packet("hello")).await.expect("send");
    upstream.send(Ip::OpenBracket).await.expect("send");
    upstream.send(Ip::packet("x")).await.expect("send");
    upstream
        .send_frames(vec![Bytes::from_static(b"not"), Bytes::from_static(b"an ip")])
        .await
        .expect("send");
    upstream.send(Ip::CloseBracket).await.expect("send");

    // Upstream loss discards whatever is still queued, so wait for the output
    // before closing.
    let stdout = child.stdout.take().expect("stdout should be piped");
    let reading = tokio::task::spawn_blocking(move || {
        let mut reader = BufReader::new(stdout);
        let mut lines = Vec::new();
        for _ in 0..4 {
            let mut line = String::new();
            reader.read_line(&mut line).expect("stdout should be readable");
            lines.push(line);
        }
        (lines, reader)
    });
    let (lines, mut reader) = tokio::time::timeout(Duration::from_secs(5), reading)
        .await
        .expect("console should print in time")
        .expect("reader should not panic");
    assert_eq!(lines, ["hello\n", "[\n", "x\n", "]\n"]);

    upstream.close().await;
    let status = wait_for_exit(&mut child).await;
    assert!(status.success(), "cascade exit should be clean: {status:?}");

    let mut rest = String::new();
    reader.read_to_string(&mut rest).expect("stdout should be readable");
    assert_eq!(rest, "");

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn console_terminates_without_ever_receiving() {
    let dir = unique_temp_dir("idle");
    let sock = dir.join("in.sock");

    let mut child = Command::new(env!("CARGO_BIN_EXE_console"))
        .arg("--port.in")
        .arg(ipc(&sock))
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("console should start");
    wait_for_path(&sock).await;

    let mut upstream = open("test.out", &sock, Direction::Output).await;
    let connected = upstream.closed_signal();
    // Let the connection come up before dropping it.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!connected.is_closed());
    upstream.close().await;

    let status = wait_for_exit(&mut child).await;
    assert!(status.success());
    assert_eq!(read_stdout(&mut child), "");
    assert!(!sock.exists(), "socket file should be removed on exit");

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn console_exits_while_stdout_is_not_drained() {
    let dir = unique_temp_dir("stalled");
    let sock = dir.join("in.sock");

    // stdout is piped but never read.
    let mut child = Command::new(env!("CARGO_BIN_EXE_console"))
        .arg("--port.in")
        .arg(ipc(&sock))
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("console should start");
    wait_for_path(&sock).await;

    let mut upstream = open("test.out", &sock, Direction::Output).await;
    let line = "x".repeat(1024);
    for _ in 0..200 {
        upstream.send(Ip::packet(line.clone())).await.expect("send");
    }
    tokio::time::sleep(Duration::from_millis(300)).await;
    upstream.close().await;

    let status = wait_for_exit_within(&mut child, Duration::from_secs(10)).await;
    assert!(status.success(), "cascade exit should be clean: {status:?}");

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn console_exits_cleanly_on_sigterm() {
    let dir = unique_temp_dir("sigterm");
    let sock = dir.join("in.sock");

    let mut child = Command::new(env!("CARGO_BIN_EXE_console"))
        .arg("--port.in")
        .arg(ipc(&sock))
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("console should start");
    wait_for_path(&sock).await;

    let killed = Command::new("kill")
        .arg("-TERM")
        .arg(child.id().to_string())
        .status()
        .expect("kill should run");
    assert!(killed.success());

    let status = wait_for_exit(&mut child).await;
    assert_eq!(status.code(), Some(0));

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn template_renders_after_configuration_and_cascades_on_input_loss() {
    let dir = unique_temp_dir("template");
    let (tpl, input, output) = (dir.join("tpl.sock"), dir.join("in.sock"), dir.join("out.sock"));

    let mut downstream = open("test.in", &output, Direction::Input).await;
    let mut child = Command::new(env!("CARGO_BIN_EXE_template"))
        .arg("--port.tpl")
        .arg(ipc(&tpl))
        .arg("--port.in")
        .arg(ipc(&input))
        .arg("--port.out")
        .arg(ipc(&output))
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("template should start");
    wait_for_path(&tpl).await;
    wait_for_path(&input).await;

    let mut config = open("test.tpl", &tpl, Direction::Output).await;
    config.send(Ip::packet("Hi {{.Name")).await.expect("send");
    config.send(Ip::packet("Hi {{upper .Name}}")).await.expect("send");
    config.send(Ip::packet("Hi {{Name}}")).await.expect("send");

    let mut upstream = open("test.out", &input, Direction::Output).await;
    upstream.send(Ip::packet("not json")).await.expect("send");
    upstream
        .send(Ip::packet(r#"{"Name":"Bob"}"#))
        .await
        .expect("send");
    upstream.send(Ip::OpenBracket).await.expect("send");
    upstream.send(Ip::packet(r#"{"Other":1}"#)).await.expect("send");
    upstream
        .send(Ip::packet(r#"{"Name":"Ann"}"#))
        .await
        .expect("send");
    upstream.send(Ip::CloseBracket).await.expect("send");

    assert_eq!(next_ip(&mut downstream).await, Ip::packet("Hi Bob"));
    assert_eq!(next_ip(&mut downstream).await, Ip::OpenBracket);
    assert_eq!(next_ip(&mut downstream).await, Ip::packet("Hi <no value>"));
    assert_eq!(next_ip(&mut downstream).await, Ip::packet("Hi Ann"));
    assert_eq!(next_ip(&mut downstream).await, Ip::CloseBracket);

    upstream.close().await;
    let status = wait_for_exit(&mut child).await;
    assert!(status.success(), "cascade exit should be clean: {status:?}");

    let err = tokio::time::timeout(Duration::from_secs(5), downstream.receive())
        .await
        .expect("downstream should observe the exit")
        .expect_err("no further output after input loss");
    assert!(matches!(err, PortError::Disconnected { .. }));

    config.close().await;
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn json_flag_prints_manifest_without_endpoints() {
    let output = Command::new(env!("CARGO_BIN_EXE_template"))
        .arg("--json")
        .output()
        .expect("template should run");

    assert!(output.status.success());
    let manifest: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("manifest should be JSON");
    assert_eq!(manifest["name"], "core/template");
    assert_eq!(manifest["inports"][0]["name"], "TPL");

    let output = Command::new(env!("CARGO_BIN_EXE_console"))
        .arg("--json")
        .output()
        .expect("console should run");
    assert!(output.status.success());
    let manifest: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("manifest should be JSON");
    assert_eq!(manifest["name"], "core/console");
}

#[test]
fn missing_endpoint_exits_with_usage() {
    let output = Command::new(env!("CARGO_BIN_EXE_template"))
        .arg("--port.in")
        .arg("ipc:///tmp/cascades-unused-in.sock")
        .arg("--port.out")
        .arg("ipc:///tmp/cascades-unused-out.sock")
        .output()
        .expect("template should run");

    assert_eq!(output.status.code(), Some(64));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("--port.tpl"), "stderr: {stderr}");
    assert!(stderr.contains("Usage"), "stderr: {stderr}");
    assert!(!Path::new("/tmp/cascades-unused-in.sock").exists());
}

#[test]
fn invalid_endpoint_exits_with_usage() {
    let output = Command::new(env!("CARGO_BIN_EXE_console"))
        .arg("--port.in")
        .arg("udp://127.0.0.1:1")
        .output()
        .expect("console should run");
    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn bind_failure_exits_with_transport_error() {
    let output = Command::new(env!("CARGO_BIN_EXE_console"))
        .arg("--port.in")
        .arg("ipc:///nonexistent-cascades-dir/in.sock")
        .output()
        .expect("console should run");
    assert_eq!(output.status.code(), Some(3));
}
