//! Client library for connecting to a `fakedyn-server` via Unix socket.
//!
//! [`FakedynClient::call`] sends any operation by name. The typed helpers
//! cover the calls test harnesses make most often.

use std::path::Path;

use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::UnixStream;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};

use crate::error::ClientError;
use crate::protocol::{RESET_OPERATION, Request, Response};

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Client for a fakedyn server.
pub struct FakedynClient {
    reader: BufReader<OwnedReadHalf>,
    writer: BufWriter<OwnedWriteHalf>,
    line_buf: String,
}

impl FakedynClient {
    /// Connect to a fakedyn server at the given Unix socket path.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let stream = UnixStream::connect(path.as_ref()).await?;
        let (read_half, write_half) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(read_half),
            writer: BufWriter::new(write_half),
            line_buf: String::new(),
        })
    }

    /// Run an operation and return its response body.
    pub async fn call(&mut self, operation: &str, payload: Value) -> Result<Value> {
        let req = Request {
            operation: operation.to_string(),
            payload,
        };
        let resp = self.send_request(&req).await?;
        into_body(resp)
    }

    /// Drop every table on the server.
    pub async fn reset(&mut self) -> Result<()> {
        self.call(RESET_OPERATION, Value::Null).await?;
        Ok(())
    }

    /// All table names, following `LastEvaluatedTableName` across pages.
    pub async fn list_tables(&mut self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut start: Option<String> = None;
        loop {
            let payload = match &start {
                Some(start) => json!({ "ExclusiveStartTableName": start }),
                None => json!({}),
            };
            let resp = self.call("ListTables", payload).await?;
            names.extend(
                resp.get("TableNames")
                    .and_then(Value::as_array)
                    .into_iter()
                    .flatten()
                    .filter_map(|v| v.as_str().map(str::to_string)),
            );
            match resp.get("LastEvaluatedTableName").and_then(Value::as_str) {
                Some(last) => start = Some(last.to_string()),
                None => return Ok(names),
            }
        }
    }

    /// The `Table` description for `table`.
    pub async fn describe_table(&mut self, table: &str) -> Result<Value> {
        let mut resp = self
            .call("DescribeTable", json!({ "TableName": table }))
            .await?;
        Ok(resp["Table"].take())
    }

    /// Store `item` (wire-encoded attributes).
    pub async fn put_item(&mut self, table: &str, item: Value) -> Result<()> {
        self.call("PutItem", json!({ "TableName": table, "Item": item }))
            .await?;
        Ok(())
    }

    /// Fetch the item with `key`, if present.
    pub async fn get_item(&mut self, table: &str, key: Value) -> Result<Option<Value>> {
        let mut resp = self
            .call("GetItem", json!({ "TableName": table, "Key": key }))
            .await?;
        Ok(resp.get_mut("Item").map(Value::take))
    }

    /// Delete the item with `key`. Absent keys are not an error.
    pub async fn delete_item(&mut self, table: &str, key: Value) -> Result<()> {
        self.call("DeleteItem", json!({ "TableName": table, "Key": key }))
            .await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Transport
    // -----------------------------------------------------------------------

    async fn send_request(&mut self, req: &Request) -> Result<Response> {
        let mut data = serde_json::to_vec(req).map_err(ClientError::Serialization)?;
        data.push(b'\n');
        self.writer.write_all(&data).await?;
        self.writer.flush().await?;

        self.line_buf.clear();
        let n = self.reader.read_line(&mut self.line_buf).await?;
        if n == 0 {
            return Err(ClientError::Disconnected);
        }

        serde_json::from_str(self.line_buf.trim()).map_err(ClientError::Serialization)
    }
}

/// Unwrap a successful body or turn an error body into `ClientError::Service`.
fn into_body(resp: Response) -> Result<Value> {
    if resp.is_ok() {
        return Ok(resp.body);
    }
    let kind = resp
        .body
        .get("__type")
        .and_then(Value::as_str)
        .map(|t| t.rsplit('#').next().unwrap_or(t))
        .unwrap_or("Unknown")
        .to_string();
    let message = resp
        .body
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();
    Err(ClientError::Service {
        status: resp.status,
        kind,
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_body_strips_namespace() {
        let resp = Response {
            status: 409,
            body: json!({
                "__type": "com.amazonaws.dynamodb.v20120810#ConditionalCheckFailedException",
                "message": "The conditional request failed"
            }),
        };
        match into_body(resp) {
            Err(ClientError::Service { status, kind, .. }) => {
                assert_eq!(status, 409);
                assert_eq!(kind, "ConditionalCheckFailedException");
            }
            other => panic!("expected service error, got {other:?}"),
        }
    }

    #[test]
    fn test_into_body_ok() {
        let body = into_body(Response::ok(json!({"TableNames": []}))).unwrap();
        assert_eq!(body["TableNames"], json!([]));
    }
}
