//! JSON-RPC protocol types for the shellmux command surface.
//!
//! Wire format: line-delimited JSON over stdin/stdout.
//! - Requests have `id` + `method` + optional `params`
//! - Responses have `id` + `result` or `error`
//! - Notifications have `method` + `params` but NO `id`
//!
//! Byte payloads travel as standard base64 strings.

use std::path::PathBuf;

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::session::{Notification as SessionNotification, SessionId};
use crate::sftp::SftpError;

// ═══════════════════════════════════════════════════════════════════════════
// JSON-RPC envelope
// ═══════════════════════════════════════════════════════════════════════════

/// Incoming request from the UI process.
#[derive(Debug, Deserialize)]
pub struct Request {
    pub id: u64,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Outgoing response.
#[derive(Debug, Serialize)]
pub struct Response {
    pub id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

/// JSON-RPC error object.
#[derive(Debug, Serialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
}

/// Server-initiated notification (no `id`).
#[derive(Debug, Serialize)]
pub struct Notification {
    pub method: String,
    pub params: serde_json::Value,
}

impl Response {
    pub fn ok(id: u64, result: serde_json::Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn empty(id: u64) -> Self {
        Self::ok(id, serde_json::json!({}))
    }

    pub fn err(id: u64, code: i32, message: impl Into<String>) -> Self {
        Self {
            id,
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
            }),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Error codes
// ═══════════════════════════════════════════════════════════════════════════

pub const ERR_INVALID_PARAMS: i32 = -32602;
pub const ERR_METHOD_NOT_FOUND: i32 = -32601;
pub const ERR_INTERNAL: i32 = -32603;
pub const ERR_IO: i32 = -1;
pub const ERR_NOT_FOUND: i32 = -2;
pub const ERR_PERMISSION: i32 = -3;
pub const ERR_NOT_READY: i32 = -4;

pub fn sftp_error_code(err: &SftpError) -> i32 {
    match err {
        SftpError::NotReady => ERR_NOT_READY,
        SftpError::FileNotFound(_) => ERR_NOT_FOUND,
        SftpError::PermissionDenied(_) => ERR_PERMISSION,
        SftpError::InvalidPath(_) => ERR_INVALID_PARAMS,
        _ => ERR_IO,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Method names
// ═══════════════════════════════════════════════════════════════════════════

pub const METHOD_CREATE: &str = "session/create";
pub const METHOD_WRITE: &str = "session/write";
pub const METHOD_RESIZE: &str = "session/resize";
pub const METHOD_KILL: &str = "session/kill";
pub const METHOD_ACK: &str = "session/ack";
pub const METHOD_LIST_SESSIONS: &str = "session/list";
pub const METHOD_SFTP_LIST: &str = "sftp/list";
pub const METHOD_SFTP_DOWNLOAD: &str = "sftp/download";
pub const METHOD_SFTP_UPLOAD: &str = "sftp/upload";
pub const METHOD_SFTP_MKDIR: &str = "sftp/mkdir";
pub const METHOD_SFTP_DELETE: &str = "sftp/delete";
pub const METHOD_SFTP_RENAME: &str = "sftp/rename";
pub const METHOD_METRICS: &str = "metrics/get";
pub const METHOD_SHUTDOWN: &str = "shutdown";

pub const NOTIFY_DATA: &str = "session/data";
pub const NOTIFY_EXIT: &str = "session/exit";

// ═══════════════════════════════════════════════════════════════════════════
// session/* params & results
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionParams {
    pub session_id: SessionId,
}

/// session/write params
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteParams {
    pub session_id: SessionId,
    /// base64
    pub data: String,
}

impl WriteParams {
    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        base64::engine::general_purpose::STANDARD.decode(&self.data)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResizeParams {
    pub session_id: SessionId,
    pub cols: u16,
    pub rows: u16,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AckParams {
    pub session_id: SessionId,
    pub length: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateResult {
    pub session_id: SessionId,
}

// ═══════════════════════════════════════════════════════════════════════════
// sftp/* params & results
// ═══════════════════════════════════════════════════════════════════════════

/// sftp/list, sftp/mkdir, sftp/delete params
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathParams {
    pub session_id: SessionId,
    pub path: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadParams {
    pub session_id: SessionId,
    pub remote_path: String,
    #[serde(default)]
    pub local_path: Option<PathBuf>,
}

/// `remote_path` is the destination directory
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadParams {
    pub session_id: SessionId,
    pub local_path: PathBuf,
    pub remote_path: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameParams {
    pub session_id: SessionId,
    pub old_path: String,
    pub new_path: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadResult {
    pub local_path: PathBuf,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResult {
    pub remote_path: String,
}

// ═══════════════════════════════════════════════════════════════════════════
// Notifications
// ═══════════════════════════════════════════════════════════════════════════

impl From<&SessionNotification> for Notification {
    fn from(notification: &SessionNotification) -> Self {
        match notification {
            SessionNotification::Data { session_id, data } => Notification {
                method: NOTIFY_DATA.to_string(),
                params: serde_json::json!({
                    "sessionId": session_id,
                    "data": base64::engine::general_purpose::STANDARD.encode(data),
                }),
            },
            SessionNotification::Exit { session_id, status } => Notification {
                method: NOTIFY_EXIT.to_string(),
                params: serde_json::json!({
                    "sessionId": session_id,
                    "exitCode": status.exit_code,
                    "signal": status.signal,
                }),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    use crate::session::ExitStatus;

    #[test]
    fn test_request_without_params() {
        let req: Request = serde_json::from_str(r#"{"id":7,"method":"session/list"}"#).unwrap();
        assert_eq!(req.id, 7);
        assert!(req.params.is_null());
    }

    #[test]
    fn test_error_response_omits_result() {
        let json = serde_json::to_value(Response::err(3, ERR_METHOD_NOT_FOUND, "nope")).unwrap();
        assert_eq!(json["error"]["code"], -32601);
        assert!(json.get("result").is_none());
    }

    #[test]
    fn test_write_params_decode_base64() {
        let params: WriteParams =
            serde_json::from_str(r#"{"sessionId":"abc","data":"bHMK"}"#).unwrap();
        assert_eq!(params.session_id.as_str(), "abc");
        assert_eq!(params.decode().unwrap(), b"ls\n");
    }

    #[test]
    fn test_notifications() {
        let data = Notification::from(&SessionNotification::Data {
            session_id: SessionId::from("s1"),
            data: Bytes::from_static(b"hi"),
        });
        assert_eq!(data.method, "session/data");
        assert_eq!(data.params["data"], "aGk=");

        let exit = Notification::from(&SessionNotification::Exit {
            session_id: SessionId::from("s1"),
            status: ExitStatus::error(),
        });
        assert_eq!(exit.method, "session/exit");
        assert_eq!(exit.params["exitCode"], 1);
        assert_eq!(exit.params["signal"], "ERROR");
    }

    #[test]
    fn test_sftp_error_codes() {
        assert_eq!(sftp_error_code(&SftpError::NotReady), ERR_NOT_READY);
        assert_eq!(sftp_error_code(&SftpError::FileNotFound("/x".into())), ERR_NOT_FOUND);
    }
}
