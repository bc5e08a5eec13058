//! Request/response cycle between the control client and server
#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use courier_common::Signal;
use courier_control::{
    ControlClient, ControlError, ControlServer, Result,
    protocol::{
        QueueCommand, Request, RequestCommand, Response, ResponseData, ResponsePayload,
        SystemCommand, SystemStatus,
    },
    server::CommandHandler,
};
use courier_reconcile::{PassOutcome, PassReport, SchedulerState};
use tempfile::TempDir;
use tokio::sync::broadcast;

#[derive(Default)]
struct MockHandler {
    passes: AtomicUsize,
}

#[async_trait]
impl CommandHandler for MockHandler {
    async fn handle_request(&self, request: Request) -> Result<Response> {
        match request.command {
            RequestCommand::System(SystemCommand::Ping) => Ok(Response::ok()),
            RequestCommand::System(SystemCommand::Status) => {
                Ok(Response::data(ResponseData::SystemStatus(SystemStatus {
                    version: "0.0.1".to_string(),
                    uptime_secs: 12,
                    queue_size: 4,
                    scheduler: SchedulerState::Scheduled,
                })))
            }
            RequestCommand::Queue(QueueCommand::ProcessNow) => {
                self.passes.fetch_add(1, Ordering::SeqCst);
                Ok(Response::data(ResponseData::Pass(PassOutcome::Completed(
                    PassReport {
                        queried: 2,
                        delivered: 1,
                        retried: 1,
                        ..PassReport::default()
                    },
                ))))
            }
            RequestCommand::Queue(QueueCommand::Remove { external_id }) => {
                Err(ControlError::ServerError(format!("{external_id} is pinned")))
            }
            RequestCommand::Queue(_) => Ok(Response::error("not implemented in mock")),
        }
    }
}

async fn start_test_server(
    socket_path: &str,
    handler: Arc<dyn CommandHandler>,
) -> (tokio::task::JoinHandle<()>, broadcast::Sender<Signal>) {
    let server = ControlServer::new(socket_path, handler).expect("Failed to create server");
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    let server_handle = tokio::spawn(async move {
        if let Err(e) = server.serve(shutdown_rx).await {
            eprintln!("Server error: {e}");
        }
    });

    tokio::time::sleep(Duration::from_millis(100)).await;

    (server_handle, shutdown_tx)
}

#[tokio::test]
async fn test_system_ping() {
    let temp_dir = TempDir::new().unwrap();
    let socket_path = temp_dir.path().join("test.sock");
    let socket_str = socket_path.to_str().unwrap();

    let (_server, _shutdown) = start_test_server(socket_str, Arc::new(MockHandler::default())).await;

    let client = ControlClient::new(socket_str);
    let response = client
        .send_request(Request::new(RequestCommand::System(SystemCommand::Ping)))
        .await
        .unwrap();

    assert!(matches!(response.payload, ResponsePayload::Ok));
}

#[tokio::test]
async fn test_system_status() {
    let temp_dir = TempDir::new().unwrap();
    let socket_path = temp_dir.path().join("test.sock");
    let socket_str = socket_path.to_str().unwrap();

    let (_server, _shutdown) = start_test_server(socket_str, Arc::new(MockHandler::default())).await;

    let client = ControlClient::new(socket_str);
    let response = client
        .send_request(Request::new(RequestCommand::System(SystemCommand::Status)))
        .await
        .unwrap();

    match response.payload {
        ResponsePayload::Data(data) => match *data {
            ResponseData::SystemStatus(status) => {
                assert_eq!(status.queue_size, 4);
                assert_eq!(status.scheduler, SchedulerState::Scheduled);
            }
            other => panic!("Expected SystemStatus, got {other:?}"),
        },
        other => panic!("Expected Data response, got {other:?}"),
    }
}

#[tokio::test]
async fn test_process_now_reports_pass() {
    let temp_dir = TempDir::new().unwrap();
    let socket_path = temp_dir.path().join("test.sock");
    let socket_str = socket_path.to_str().unwrap();

    let handler = Arc::new(MockHandler::default());
    let (_server, _shutdown) = start_test_server(socket_str, handler.clone()).await;

    let client = ControlClient::new(socket_str);
    let response = client
        .send_request(Request::new(RequestCommand::Queue(QueueCommand::ProcessNow)))
        .await
        .unwrap();

    match response.payload {
        ResponsePayload::Data(data) => match *data {
            ResponseData::Pass(outcome) => {
                let report = outcome.report().copied().unwrap();
                assert_eq!(report.queried, 2);
                assert_eq!(report.delivered, 1);
            }
            other => panic!("Expected Pass, got {other:?}"),
        },
        other => panic!("Expected Data response, got {other:?}"),
    }
    assert_eq!(handler.passes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_server_error_response() {
    let temp_dir = TempDir::new().unwrap();
    let socket_path = temp_dir.path().join("test.sock");
    let socket_str = socket_path.to_str().unwrap();

    let (_server, _shutdown) = start_test_server(socket_str, Arc::new(MockHandler::default())).await;

    let client = ControlClient::new(socket_str);

    let result = client
        .send_request(Request::new(RequestCommand::Queue(QueueCommand::Stats)))
        .await;
    assert!(matches!(result, Err(ControlError::ServerError(ref msg)) if msg.contains("mock")));

    let result = client
        .send_request(Request::new(RequestCommand::Queue(QueueCommand::Remove {
            external_id: "msg-9".to_string(),
        })))
        .await;
    assert!(matches!(result, Err(ControlError::ServerError(ref msg)) if msg.contains("msg-9")));
}

#[tokio::test]
async fn test_incompatible_version_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let socket_path = temp_dir.path().join("test.sock");
    let socket_str = socket_path.to_str().unwrap();

    let handler = Arc::new(MockHandler::default());
    let (_server, _shutdown) = start_test_server(socket_str, handler.clone()).await;

    let mut request = Request::new(RequestCommand::Queue(QueueCommand::ProcessNow));
    request.version += 1;

    let result = ControlClient::new(socket_str).send_request(request).await;
    assert!(matches!(result, Err(ControlError::ServerError(ref msg)) if msg.contains("version")));
    assert_eq!(handler.passes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_socket_not_exist_error() {
    let temp_dir = TempDir::new().unwrap();
    let socket_path = temp_dir.path().join("nonexistent.sock");
    let socket_str = socket_path.to_str().unwrap();

    let client = ControlClient::new(socket_str);
    let result = client
        .send_request(Request::new(RequestCommand::System(SystemCommand::Ping)))
        .await;

    assert!(matches!(result, Err(ControlError::Io(_))));
    assert!(matches!(
        client.check_socket_exists(),
        Err(ControlError::InvalidSocketPath(_))
    ));
}

#[tokio::test]
async fn test_shutdown_removes_socket() {
    let temp_dir = TempDir::new().unwrap();
    let socket_path = temp_dir.path().join("test.sock");
    let socket_str = socket_path.to_str().unwrap();

    let (server, shutdown) = start_test_server(socket_str, Arc::new(MockHandler::default())).await;
    assert!(socket_path.exists());

    shutdown.send(Signal::Shutdown).unwrap();
    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("server did not stop")
        .unwrap();

    assert!(!socket_path.exists());
}

#[tokio::test]
async fn test_stale_socket_replaced() {
    let temp_dir = TempDir::new().unwrap();
    let socket_path = temp_dir.path().join("test.sock");
    let socket_str = socket_path.to_str().unwrap();

    // A bound-then-dropped listener leaves a socket file nobody accepts on
    drop(std::os::unix::net::UnixListener::bind(&socket_path).unwrap());
    assert!(socket_path.exists());

    let (_server, _shutdown) = start_test_server(socket_str, Arc::new(MockHandler::default())).await;

    let response = ControlClient::new(socket_str)
        .send_request(Request::new(RequestCommand::System(SystemCommand::Ping)))
        .await
        .unwrap();
    assert!(response.is_success());
}

#[tokio::test]
async fn test_oversized_frame_gets_no_response() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let temp_dir = TempDir::new().unwrap();
    let socket_path = temp_dir.path().join("test.sock");
    let socket_str = socket_path.to_str().unwrap();

    let handler = Arc::new(MockHandler::default());
    let (_server, _shutdown) = start_test_server(socket_str, handler.clone()).await;

    let mut stream = tokio::net::UnixStream::connect(&socket_path).await.unwrap();
    stream.write_all(&u32::MAX.to_be_bytes()).await.unwrap();

    let mut buf = Vec::new();
    let read = tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut buf))
        .await
        .expect("server kept the connection open");
    assert!(read.is_err() || buf.is_empty());
    assert_eq!(handler.passes.load(Ordering::SeqCst), 0);

    // The server keeps accepting after dropping the bad frame
    let response = ControlClient::new(socket_str)
        .send_request(Request::new(RequestCommand::System(SystemCommand::Ping)))
        .await
        .unwrap();
    assert!(response.is_success());
}

#[test]
fn test_empty_socket_path_rejected() {
    let result = ControlServer::new("", Arc::new(MockHandler::default()));
    assert!(matches!(result, Err(ControlError::InvalidSocketPath(_))));
}
