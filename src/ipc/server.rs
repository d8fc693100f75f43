//! Stdio JSON-RPC server
//!
//! Reads requests from stdin, writes responses and session notifications to
//! stdout through a single writer task so lines never interleave. Logging
//! goes to stderr.

use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::protocol::*;
use crate::session::{CreateOptions, SessionManager};

/// Time given to sessions to report their exit after `shutdown`
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

/// Serve on the process's stdin/stdout until EOF or `shutdown`
pub async fn serve_stdio(manager: SessionManager) -> std::io::Result<()> {
    serve(manager, tokio::io::stdin(), tokio::io::stdout()).await
}

pub async fn serve<R, W>(manager: SessionManager, input: R, output: W) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();

    let writer = tokio::spawn(async move {
        let mut output = output;
        while let Some(line) = out_rx.recv().await {
            if output.write_all(line.as_bytes()).await.is_err()
                || output.write_all(b"\n").await.is_err()
                || output.flush().await.is_err()
            {
                break;
            }
        }
    });

    let forwarder = {
        let mut observer = manager.observe();
        let out_tx = out_tx.clone();
        tokio::spawn(async move {
            while let Some(notification) = observer.recv().await {
                if let Ok(json) = serde_json::to_string(&Notification::from(&notification)) {
                    if out_tx.send(json).is_err() {
                        break;
                    }
                }
            }
        })
    };

    let mut lines = BufReader::new(input).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let request = match serde_json::from_str::<Request>(&line) {
            Ok(request) => request,
            Err(e) => {
                warn!("Invalid JSON-RPC: {}: {}", e, line);
                continue;
            }
        };

        if request.method == METHOD_SHUTDOWN {
            info!("Shutdown requested");
            send(&out_tx, Response::empty(request.id));
            break;
        }

        // Fire-and-forget commands run inline to keep per-session order
        if let Some(response) = dispatch_inline(&manager, &request) {
            send(&out_tx, response);
            continue;
        }

        let manager = manager.clone();
        let out_tx = out_tx.clone();
        tokio::spawn(async move {
            let response = dispatch(&manager, &request).await;
            send(&out_tx, response);
        });
    }

    info!("Input closed, shutting down sessions");
    manager.shutdown();
    tokio::time::sleep(SHUTDOWN_GRACE).await;
    forwarder.abort();
    drop(out_tx);
    let _ = writer.await;
    Ok(())
}

fn send(out_tx: &mpsc::UnboundedSender<String>, response: Response) {
    match serde_json::to_string(&response) {
        Ok(json) => {
            let _ = out_tx.send(json);
        }
        Err(e) => warn!("Failed to encode response {}: {}", response.id, e),
    }
}

fn parse<T: DeserializeOwned>(request: &Request) -> Result<T, Response> {
    serde_json::from_value(request.params.clone())
        .map_err(|e| Response::err(request.id, ERR_INVALID_PARAMS, e.to_string()))
}

fn to_result<T: serde::Serialize>(id: u64, value: T) -> Response {
    match serde_json::to_value(value) {
        Ok(value) => Response::ok(id, value),
        Err(e) => Response::err(id, ERR_INTERNAL, e.to_string()),
    }
}

/// Commands that complete without awaiting. `None` for everything else.
pub fn dispatch_inline(manager: &SessionManager, req: &Request) -> Option<Response> {
    let response = match req.method.as_str() {
        METHOD_WRITE => match parse::<WriteParams>(req) {
            Ok(params) => match params.decode() {
                Ok(bytes) => {
                    manager.write(&params.session_id, &bytes);
                    Response::empty(req.id)
                }
                Err(e) => Response::err(req.id, ERR_INVALID_PARAMS, e.to_string()),
            },
            Err(response) => response,
        },

        METHOD_RESIZE => match parse::<ResizeParams>(req) {
            Ok(params) => {
                manager.resize(&params.session_id, params.cols, params.rows);
                Response::empty(req.id)
            }
            Err(response) => response,
        },

        METHOD_KILL => match parse::<SessionParams>(req) {
            Ok(params) => {
                manager.kill(&params.session_id);
                Response::empty(req.id)
            }
            Err(response) => response,
        },

        METHOD_ACK => match parse::<AckParams>(req) {
            Ok(params) => {
                manager.ack(&params.session_id, params.length);
                Response::empty(req.id)
            }
            Err(response) => response,
        },

        METHOD_LIST_SESSIONS => to_result(req.id, manager.list_sessions()),

        _ => return None,
    };
    Some(response)
}

/// Route a JSON-RPC request to the appropriate handler.
pub async fn dispatch(manager: &SessionManager, req: &Request) -> Response {
    debug!("Dispatching {} ({})", req.method, req.id);

    if let Some(response) = dispatch_inline(manager, req) {
        return response;
    }

    match req.method.as_str() {
        METHOD_CREATE => match parse::<CreateOptions>(req) {
            Ok(options) => {
                let session_id = manager.create(options).await;
                to_result(req.id, CreateResult { session_id })
            }
            Err(response) => response,
        },

        METHOD_SFTP_LIST => match parse::<PathParams>(req) {
            Ok(params) => sftp_response(req.id, manager.list_dir(&params.session_id, &params.path).await),
            Err(response) => response,
        },

        METHOD_SFTP_DOWNLOAD => match parse::<DownloadParams>(req) {
            Ok(params) => sftp_response(
                req.id,
                manager
                    .download(&params.session_id, &params.remote_path, params.local_path)
                    .await
                    .map(|local_path| DownloadResult { local_path }),
            ),
            Err(response) => response,
        },

        METHOD_SFTP_UPLOAD => match parse::<UploadParams>(req) {
            Ok(params) => sftp_response(
                req.id,
                manager
                    .upload(&params.session_id, &params.local_path, &params.remote_path)
                    .await
                    .map(|remote_path| UploadResult { remote_path }),
            ),
            Err(response) => response,
        },

        METHOD_SFTP_MKDIR => match parse::<PathParams>(req) {
            Ok(params) => sftp_response(req.id, manager.mkdir(&params.session_id, &params.path).await),
            Err(response) => response,
        },

        METHOD_SFTP_DELETE => match parse::<PathParams>(req) {
            Ok(params) => sftp_response(req.id, manager.delete(&params.session_id, &params.path).await),
            Err(response) => response,
        },

        METHOD_SFTP_RENAME => match parse::<RenameParams>(req) {
            Ok(params) => sftp_response(
                req.id,
                manager
                    .rename(&params.session_id, &params.old_path, &params.new_path)
                    .await,
            ),
            Err(response) => response,
        },

        METHOD_METRICS => match parse::<SessionParams>(req) {
            Ok(params) => to_result(req.id, manager.metrics(&params.session_id).await),
            Err(response) => response,
        },

        _ => Response::err(
            req.id,
            ERR_METHOD_NOT_FOUND,
            format!("Unknown method: {}", req.method),
        ),
    }
}

fn sftp_response<T: serde::Serialize>(id: u64, result: Result<T, crate::sftp::SftpError>) -> Response {
    match result {
        Ok(value) => to_result(id, value),
        Err(e) => Response::err(id, sftp_error_code(&e), e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::channels::{ReadinessPolicy, SubChannelRegistry};
    use crate::config::CoreConfig;

    fn manager() -> SessionManager {
        SessionManager::with_registry(
            CoreConfig::default(),
            Arc::new(SubChannelRegistry::new(ReadinessPolicy::immediate(), None)),
        )
    }

    fn request(json: &str) -> Request {
        serde_json::from_str(json).unwrap()
    }

    #[tokio::test]
    async fn test_unknown_session_commands_succeed() {
        let manager = manager();
        for json in [
            r#"{"id":1,"method":"session/write","params":{"sessionId":"gone","data":"bHMK"}}"#,
            r#"{"id":2,"method":"session/resize","params":{"sessionId":"gone","cols":100,"rows":30}}"#,
            r#"{"id":3,"method":"session/kill","params":{"sessionId":"gone"}}"#,
            r#"{"id":4,"method":"session/ack","params":{"sessionId":"gone","length":512}}"#,
        ] {
            let response = dispatch(&manager, &request(json)).await;
            assert!(response.error.is_none(), "{}", json);
        }
    }

    #[tokio::test]
    async fn test_bad_params_and_unknown_method() {
        let manager = manager();
        let response = dispatch(
            &manager,
            &request(r#"{"id":5,"method":"session/resize","params":{"sessionId":"x"}}"#),
        )
        .await;
        assert_eq!(response.error.map(|e| e.code), Some(ERR_INVALID_PARAMS));

        let response = dispatch(&manager, &request(r#"{"id":6,"method":"fs/format"}"#)).await;
        assert_eq!(response.error.map(|e| e.code), Some(ERR_METHOD_NOT_FOUND));
    }

    #[tokio::test]
    async fn test_sftp_without_transport_is_not_ready() {
        let manager = manager();
        let response = dispatch(
            &manager,
            &request(r#"{"id":7,"method":"sftp/list","params":{"sessionId":"s","path":"/"}}"#),
        )
        .await;
        let error = response.error.unwrap();
        assert_eq!(error.code, ERR_NOT_READY);
        assert!(error.message.contains("not ready"));
    }

    #[tokio::test]
    async fn test_metrics_without_transport_uses_placeholders() {
        let manager = manager();
        let response = dispatch(
            &manager,
            &request(r#"{"id":8,"method":"metrics/get","params":{"sessionId":"s"}}"#),
        )
        .await;
        let result = response.result.unwrap();
        assert_eq!(result["uptime"], "N/A");
        assert_eq!(result["username"], "unknown");
    }

    #[tokio::test]
    async fn test_serve_create_then_shutdown() {
        let manager = manager();
        let input = concat!(
            r#"{"id":1,"method":"session/create","params":{"type":"ssh","cols":80,"rows":24}}"#,
            "\n",
        );
        let (client, server) = tokio::io::duplex(64 * 1024);
        let (server_read, server_write) = tokio::io::split(server);
        drop(server_read);

        serve(manager, input.as_bytes(), server_write).await.unwrap();

        let mut output = String::new();
        let mut client = client;
        tokio::io::AsyncReadExt::read_to_string(&mut client, &mut output)
            .await
            .unwrap();

        assert!(output.lines().any(|l| l.contains(r#""sessionId""#) && l.contains(r#""id":1"#)));
        assert!(output.lines().any(|l| l.contains("session/exit")));
    }
}
