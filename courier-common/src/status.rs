use core::fmt::{self, Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Delivery status of an outbound message
///
/// `Sending` is the only non-terminal state. `SendingStoppedQuerying` is
/// forced onto a record when the engine gives up without ever receiving a
/// terminal answer from the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageStatus {
    Sending,
    Delivered,
    Failed,
    SendingStoppedQuerying,
}

impl MessageStatus {
    /// Checks if no further status queries should happen for this status
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Sending)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sending => "Sending",
            Self::Delivered => "Delivered",
            Self::Failed => "Failed",
            Self::SendingStoppedQuerying => "SendingStoppedQuerying",
        }
    }
}

impl Display for MessageStatus {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        fmt.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown message status: {0}")]
pub struct ParseStatusError(pub String);

impl FromStr for MessageStatus {
    type Err = ParseStatusError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sending" => Ok(Self::Sending),
            "delivered" => Ok(Self::Delivered),
            "failed" => Ok(Self::Failed),
            "sendingstoppedquerying" | "sending_stopped_querying" => {
                Ok(Self::SendingStoppedQuerying)
            }
            _ => Err(ParseStatusError(value.to_string())),
        }
    }
}

/// Outcome of a status query, carried from the query client through the
/// reconciler to subscribers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub external_id: String,
    pub status: MessageStatus,
    pub error_code: Option<String>,
    pub receive_date: Option<DateTime<Utc>>,
    pub destination_address: String,
}

impl StatusUpdate {
    #[must_use]
    pub fn new(
        external_id: impl Into<String>,
        destination_address: impl Into<String>,
        status: MessageStatus,
    ) -> Self {
        Self {
            external_id: external_id.into(),
            status,
            error_code: None,
            receive_date: None,
            destination_address: destination_address.into(),
        }
    }

    #[must_use]
    pub fn with_error_code(mut self, error_code: impl Into<String>) -> Self {
        self.error_code = Some(error_code.into());
        self
    }

    #[must_use]
    pub fn with_receive_date(mut self, receive_date: DateTime<Utc>) -> Self {
        self.receive_date = Some(receive_date);
        self
    }
}
