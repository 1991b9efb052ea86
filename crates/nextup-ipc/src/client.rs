//! Control socket client used by nextupctl

use nextup_api::{Command, Request, Response, ResponseResult, ServiceEvent};
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tracing::debug;

use crate::{IpcError, IpcResult};

/// Request/response connection to a running nextupd
pub struct IpcClient {
    reader: BufReader<tokio::net::unix::OwnedReadHalf>,
    writer: tokio::net::unix::OwnedWriteHalf,
    next_request_id: u64,
}

impl IpcClient {
    /// Open a connection on the daemon socket
    pub async fn connect(socket_path: impl AsRef<Path>) -> IpcResult<Self> {
        let stream = UnixStream::connect(socket_path).await?;
        let (read_half, write_half) = stream.into_split();

        Ok(Self {
            reader: BufReader::new(read_half),
            writer: write_half,
            next_request_id: 1,
        })
    }

    /// Issue `command` with the next request id and return the matching response
    pub async fn send(&mut self, command: Command) -> IpcResult<Response> {
        let request_id = self.next_request_id;
        self.next_request_id += 1;

        let request = Request::new(request_id, command);
        let mut json = serde_json::to_string(&request)?;
        json.push('\n');

        self.writer.write_all(json.as_bytes()).await?;

        let mut line = String::new();
        loop {
            line.clear();
            let n = self.reader.read_line(&mut line).await?;
            if n == 0 {
                return Err(IpcError::ConnectionClosed);
            }

            // Events may be interleaved once subscribed
            if serde_json::from_str::<ServiceEvent>(line.trim()).is_ok() {
                debug!("Skipping event while waiting for response");
                continue;
            }

            let response: Response = serde_json::from_str(line.trim())?;
            if response.request_id != request_id {
                return Err(IpcError::UnexpectedResponse {
                    expected: request_id,
                    got: response.request_id,
                });
            }
            return Ok(response);
        }
    }

    /// Switch the connection to event delivery; no further requests can be sent
    pub async fn subscribe(mut self) -> IpcResult<EventStream> {
        let response = self.send(Command::SubscribeEvents).await?;

        match response.result {
            ResponseResult::Ok(_) => {}
            ResponseResult::Err(e) => {
                return Err(IpcError::ServerError(e.message));
            }
        }

        Ok(EventStream {
            reader: self.reader,
            _writer: self.writer,
        })
    }
}

/// Service events pushed by the daemon after subscribing
pub struct EventStream {
    reader: BufReader<tokio::net::unix::OwnedReadHalf>,
    // Dropping the write half would shut the connection down
    _writer: tokio::net::unix::OwnedWriteHalf,
}

impl EventStream {
    /// Next event line, or `ConnectionClosed` once the daemon hangs up
    pub async fn next(&mut self) -> IpcResult<ServiceEvent> {
        let mut line = String::new();
        let n = self.reader.read_line(&mut line).await?;
        if n == 0 {
            return Err(IpcError::ConnectionClosed);
        }

        let event: ServiceEvent = serde_json::from_str(line.trim())?;
        Ok(event)
    }
}
