//! Command types for the nextupd protocol

use chrono::{DateTime, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use nextup_util::ClientId;

use crate::{Event, ServiceStatus, API_VERSION};

/// Request wrapper with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Request ID for correlation
    pub request_id: u64,
    pub api_version: u32,
    pub command: Command,
}

impl Request {
    pub fn new(request_id: u64, command: Command) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            command,
        }
    }
}

/// Response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Corresponding request ID
    pub request_id: u64,
    pub api_version: u32,
    pub result: ResponseResult,
}

impl Response {
    pub fn success(request_id: u64, payload: ResponsePayload) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            result: ResponseResult::Ok(payload),
        }
    }

    pub fn error(request_id: u64, error: ErrorInfo) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            result: ResponseResult::Err(error),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseResult {
    Ok(ResponsePayload),
    Err(ErrorInfo),
}

/// Error information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: ErrorCode,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Error codes for the protocol.
///
/// The refresh failure kinds are kept distinct so clients can show a
/// specific message for rejected credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidRequest,
    Unauthenticated,
    AuthenticationRejected,
    FetchFailed,
    ParseFailed,
    CacheWriteFailed,
    StoreError,
    InternalError,
}

/// All possible commands from clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Get service status
    GetStatus,

    /// Get the cached timetable, optionally restricted to one day
    GetTimetable { day: Option<NaiveDate> },

    /// Get the next upcoming event today
    GetNext,

    /// Fetch the timetable from the remote source now
    Refresh,

    /// Enable or disable the "next event" notification
    SetEnabled { enabled: bool },

    /// Subscribe to events (returns immediately, events stream separately)
    SubscribeEvents,

    UnsubscribeEvents,

    /// Ping for keepalive
    Ping,
}

/// Response payloads
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponsePayload {
    Status(ServiceStatus),
    Timetable {
        /// None when the cache was never populated
        written_at: Option<DateTime<Local>>,
        events: Vec<Event>,
    },
    Next {
        event: Option<Event>,
    },
    Refreshed {
        written_at: DateTime<Local>,
        event_count: usize,
    },
    EnabledChanged {
        enabled: bool,
    },
    Subscribed {
        client_id: ClientId,
    },
    Unsubscribed,
    Pong,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serialization() {
        let req = Request::new(7, Command::SetEnabled { enabled: false });
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains(r#""type":"set_enabled""#));

        let parsed: Request = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.request_id, 7);
        assert!(matches!(parsed.command, Command::SetEnabled { enabled: false }));
    }

    #[test]
    fn timetable_day_is_optional() {
        let parsed: Command = serde_json::from_str(r#"{"type":"get_timetable","day":null}"#).unwrap();
        assert!(matches!(parsed, Command::GetTimetable { day: None }));

        let parsed: Command =
            serde_json::from_str(r#"{"type":"get_timetable","day":"2025-03-17"}"#).unwrap();
        assert!(matches!(parsed, Command::GetTimetable { day: Some(_) }));
    }

    #[test]
    fn error_response_keeps_code() {
        let resp = Response::error(
            3,
            ErrorInfo::new(ErrorCode::AuthenticationRejected, "bad credentials"),
        );
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("authentication_rejected"));

        let parsed: Response = serde_json::from_str(&json).unwrap();
        match parsed.result {
            ResponseResult::Err(e) => assert_eq!(e.code, ErrorCode::AuthenticationRejected),
            ResponseResult::Ok(_) => panic!("expected error"),
        }
    }
}
