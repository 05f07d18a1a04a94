//! Unix domain socket server that wraps a fakedyn `Engine` handle.
//!
//! Each connected client sends JSON-line requests and receives JSON-line
//! responses. Reads run concurrently and mutations are serialized by the
//! locks inside `Engine`.

use std::io;
use std::path::PathBuf;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::signal::unix::{SignalKind, signal};
use tracing::{debug, error, info, warn};

use fakedyn_core::Engine;

use crate::protocol::{RESET_OPERATION, Request, Response};

/// A fakedyn server listening on a Unix socket.
pub struct FakedynServer {
    engine: Engine,
    socket_path: PathBuf,
}

impl FakedynServer {
    pub fn new(engine: Engine, socket_path: PathBuf) -> Self {
        Self {
            engine,
            socket_path,
        }
    }

    /// Serve until SIGINT or SIGTERM.
    pub async fn run(&self) -> io::Result<()> {
        self.run_until(shutdown_signal()).await
    }

    /// Serve until `shutdown` completes, then flush the log and remove the
    /// socket file. A stale socket file left by an earlier run is replaced.
    pub async fn run_until(&self, shutdown: impl Future<Output = ()>) -> io::Result<()> {
        let listener = self.bind()?;
        tokio::pin!(shutdown);

        let mut connections = 0u64;
        loop {
            tokio::select! {
                biased;
                () = &mut shutdown => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, _addr)) => {
                        connections += 1;
                        debug!(connection = connections, "client connected");
                        tokio::spawn(serve_connection(self.engine.clone(), stream, connections));
                    }
                    Err(e) => error!(error = %e, "accept failed"),
                },
            }
        }

        info!(connections, "server stopping");
        self.close();
        Ok(())
    }

    fn bind(&self) -> io::Result<UnixListener> {
        match std::fs::remove_file(&self.socket_path) {
            Ok(()) => debug!(path = %self.socket_path.display(), "replaced stale socket"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        let listener = UnixListener::bind(&self.socket_path)?;
        info!(path = %self.socket_path.display(), "server listening");
        Ok(listener)
    }

    fn close(&self) {
        if let Err(e) = self.engine.shutdown() {
            error!(error = %e, "log flush failed on shutdown");
        }
        match std::fs::remove_file(&self.socket_path) {
            Ok(()) => info!(path = %self.socket_path.display(), "socket removed"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.socket_path.display(), error = %e, "socket removal failed"),
        }
    }
}

async fn serve_connection(engine: Engine, stream: UnixStream, connection: u64) {
    match handle_connection(engine, stream).await {
        Ok(requests) => debug!(connection, requests, "client disconnected"),
        Err(e) => warn!(connection, error = %e, "connection dropped"),
    }
}

/// Answer request lines until the client hangs up. Returns the number of
/// requests answered.
async fn handle_connection(engine: Engine, stream: UnixStream) -> io::Result<u64> {
    let (reader, writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();
    let mut writer = BufWriter::new(writer);
    let mut line_number = 0u64;
    let mut answered = 0u64;

    while let Some(line) = lines.next_line().await? {
        line_number += 1;
        if line.trim().is_empty() {
            continue;
        }
        let response = match decode_request(line_number, &line) {
            Ok(req) => execute(engine.clone(), req).await,
            Err(rejected) => rejected,
        };
        write_response(&mut writer, &response).await?;
        answered += 1;
    }
    Ok(answered)
}

/// Parse one request line. Errors name the line so a client can tell which
/// of its pipelined requests was rejected.
fn decode_request(line_number: u64, line: &str) -> Result<Request, Response> {
    let req: Request = serde_json::from_str(line.trim())
        .map_err(|e| Response::parse_error(format!("line {line_number}: {e}")))?;
    if req.operation.is_empty() {
        return Err(Response::parse_error(format!(
            "line {line_number}: operation must not be empty"
        )));
    }
    Ok(req)
}

/// Engine calls take blocking locks and write the log, so they run on the
/// blocking pool.
async fn execute(engine: Engine, req: Request) -> Response {
    let operation = req.operation.clone();
    match tokio::task::spawn_blocking(move || dispatch(&engine, req)).await {
        Ok(response) => response,
        Err(e) => {
            error!(operation = %operation, error = %e, "request task failed");
            Response::internal_failure(e.to_string())
        }
    }
}

async fn write_response(writer: &mut BufWriter<OwnedWriteHalf>, response: &Response) -> io::Result<()> {
    let mut bytes = serde_json::to_vec(response).map_err(io::Error::other)?;
    bytes.push(b'\n');
    writer.write_all(&bytes).await?;
    writer.flush().await
}

fn dispatch(engine: &Engine, req: Request) -> Response {
    if req.operation == RESET_OPERATION {
        return match engine.reset() {
            Ok(()) => Response::ok(serde_json::json!({})),
            Err(e) => Response::error(&e),
        };
    }

    match engine.process(&req.operation, req.payload) {
        Ok(body) => Response::ok(body),
        Err(e) => {
            if e.status_code() >= 500 {
                error!(operation = %req.operation, error = %e, "operation failed");
            }
            Response::error(&e)
        }
    }
}

async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    tokio::select! {
        () = interrupt => info!("SIGINT received"),
        () = terminate => info!("SIGTERM received"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_dispatch_statuses() {
        let engine = Engine::in_memory();
        let resp = dispatch(
            &engine,
            Request {
                operation: "ListTables".into(),
                payload: json!({}),
            },
        );
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body["TableNames"], json!([]));

        let resp = dispatch(
            &engine,
            Request {
                operation: "Nope".into(),
                payload: json!({}),
            },
        );
        assert_eq!(resp.status, 400);
        assert_eq!(
            resp.body["__type"],
            "com.amazon.coral.service#UnknownOperationException"
        );
    }

    #[test]
    fn test_decode_request_names_line() {
        let rejected = decode_request(3, "{not json").unwrap_err();
        assert_eq!(rejected.status, 400);
        let message = rejected.body["message"].as_str().unwrap();
        assert!(message.starts_with("line 3: "), "{message}");

        let rejected = decode_request(1, r#"{"operation": ""}"#).unwrap_err();
        assert_eq!(
            rejected.body["message"],
            "line 1: operation must not be empty"
        );

        let req = decode_request(2, r#" {"operation": "ListTables"} "#).unwrap();
        assert_eq!(req.operation, "ListTables");
    }

    #[tokio::test]
    async fn test_execute_runs_on_blocking_pool() {
        let engine = Engine::in_memory();
        let resp = execute(
            engine,
            Request {
                operation: "ListTables".into(),
                payload: json!({}),
            },
        )
        .await;
        assert!(resp.is_ok());
    }

    #[test]
    fn test_dispatch_reset() {
        let engine = Engine::in_memory();
        let resp = dispatch(
            &engine,
            Request {
                operation: RESET_OPERATION.into(),
                payload: json!(null),
            },
        );
        assert!(resp.is_ok());
    }
}
