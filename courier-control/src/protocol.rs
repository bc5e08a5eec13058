//! Control protocol types and serialization

use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use courier_reconcile::{PassOutcome, QueueStats, ReconciliationTask, SchedulerState};
use serde::{Deserialize, Serialize};

/// Current protocol version
pub const PROTOCOL_VERSION: u32 = 1;

fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// Request sent to the control server (versioned wrapper)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub version: u32,
    pub command: RequestCommand,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RequestCommand {
    System(SystemCommand),
    Queue(QueueCommand),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SystemCommand {
    /// Health check
    Ping,
    /// Uptime, queue size and scheduler state
    Status,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum QueueCommand {
    /// Queued tasks in priority order
    List,
    Stats,
    /// Stop tracking a message
    Remove { external_id: String },
    /// Run a reconciliation pass immediately
    ProcessNow,
    /// Seed the queue from the record store
    Bootstrap,
}

/// Response from the control server (versioned wrapper)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub version: u32,
    pub payload: ResponsePayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ResponsePayload {
    Ok,
    Data(Box<ResponseData>),
    Error(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ResponseData {
    SystemStatus(SystemStatus),
    QueueList(Vec<QueuedTask>),
    QueueStats(QueueStats),
    /// Result of a manual pass
    Pass(PassOutcome),
    /// Number of tasks a bootstrap added
    Bootstrapped(usize),
    Message(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemStatus {
    pub version: String,
    pub uptime_secs: u64,
    pub queue_size: usize,
    pub scheduler: SchedulerState,
}

impl Display for SystemStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("Version:    {}\n", self.version))?;
        f.write_fmt(format_args!("Uptime:     {}s\n", self.uptime_secs))?;
        f.write_fmt(format_args!("Queue size: {}\n", self.queue_size))?;
        f.write_fmt(format_args!("Scheduler:  {:?}", self.scheduler))
    }
}

/// Queue entry as reported over the control socket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedTask {
    pub external_id: String,
    pub destination_address: String,
    pub priority: u8,
    pub retry_count: u32,
    pub added_at: DateTime<Utc>,
    pub last_attempt_at: Option<DateTime<Utc>>,
}

impl From<ReconciliationTask> for QueuedTask {
    fn from(task: ReconciliationTask) -> Self {
        Self {
            external_id: task.external_id,
            destination_address: task.destination_address,
            priority: task.priority,
            retry_count: task.retry_count,
            added_at: task.added_at,
            last_attempt_at: task.last_attempt_at,
        }
    }
}

impl Display for QueuedTask {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("ID:          {}\n", self.external_id))?;
        f.write_fmt(format_args!("Destination: {}\n", self.destination_address))?;
        f.write_fmt(format_args!("Priority:    {}\n", self.priority))?;
        f.write_fmt(format_args!("Retries:     {}\n", self.retry_count))?;
        f.write_fmt(format_args!(
            "Added:       {}\n",
            format_timestamp(&self.added_at)
        ))?;
        match &self.last_attempt_at {
            Some(at) => f.write_fmt(format_args!("Last query:  {}\n", format_timestamp(at))),
            None => f.write_str("Last query:  never\n"),
        }
    }
}

impl Request {
    /// Create a new request with the current protocol version
    #[must_use]
    pub const fn new(command: RequestCommand) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            command,
        }
    }

    /// Only an exact version match is accepted
    #[must_use]
    pub const fn is_version_compatible(&self) -> bool {
        self.version == PROTOCOL_VERSION
    }
}

impl Response {
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            payload: ResponsePayload::Error(message.into()),
        }
    }

    #[must_use]
    pub const fn ok() -> Self {
        Self {
            version: PROTOCOL_VERSION,
            payload: ResponsePayload::Ok,
        }
    }

    #[must_use]
    pub fn data(data: ResponseData) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            payload: ResponsePayload::Data(Box::new(data)),
        }
    }

    /// Check if the response indicates success (not an error)
    #[must_use]
    pub const fn is_success(&self) -> bool {
        !matches!(self.payload, ResponsePayload::Error(_))
    }

    #[must_use]
    pub const fn is_version_compatible(&self) -> bool {
        self.version == PROTOCOL_VERSION
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_request_version() {
        let request = Request::new(RequestCommand::System(SystemCommand::Ping));
        assert!(request.is_version_compatible());

        let stale = Request {
            version: PROTOCOL_VERSION + 1,
            ..request
        };
        assert!(!stale.is_version_compatible());
    }

    #[test]
    fn test_response_success() {
        assert!(Response::ok().is_success());
        assert!(Response::data(ResponseData::Bootstrapped(3)).is_success());
        assert!(!Response::error("nope").is_success());
    }

    #[test]
    fn test_request_encoding() {
        let request = Request::new(RequestCommand::Queue(QueueCommand::Remove {
            external_id: "msg-1".to_string(),
        }));
        let bytes = bincode::serde::encode_to_vec(&request, bincode::config::standard()).unwrap();
        let (decoded, _): (Request, _) =
            bincode::serde::decode_from_slice(&bytes, bincode::config::standard()).unwrap();

        match decoded.command {
            RequestCommand::Queue(QueueCommand::Remove { external_id }) => {
                assert_eq!(external_id, "msg-1");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_queued_task_display() {
        let added = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
        let mut task = ReconciliationTask::new("msg-1", "+15550100", 2, added);
        task.retry_count = 3;

        let rendered = QueuedTask::from(task).to_string();
        assert!(rendered.contains("msg-1"));
        assert!(rendered.contains("+15550100"));
        assert!(rendered.contains("Retries:     3"));
        assert!(rendered.contains("2025-01-01 12:00:00 UTC"));
        assert!(rendered.contains("Last query:  never"));
    }
}
