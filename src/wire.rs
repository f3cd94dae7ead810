use std::time::Instant;

use futures::{SinkExt, StreamExt};
use serde::Serialize;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};
use tracing::error;

use crate::engine::{BookingService, EngineError};
use crate::limits::MAX_LINE_LEN;
use crate::model::*;
use crate::observability::{self, command_label};
use crate::request::{parse_request, Command};
use crate::store::RecordStore;

/// What callers see for failures they cannot act on. Details go to the log.
pub const INTERNAL_ERROR_MESSAGE: &str = "Something went wrong. Please try again later.";

pub const CANCEL_MESSAGE: &str = "Cancel booking successful";

/// One response line: `{"status":200,"data":…}` or `{"status":400,"message":"…"}`.
#[derive(Debug, Serialize)]
pub struct Response {
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Reply>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Reply {
    Booking(BookingView),
    Bookings(Vec<BookingView>),
    Windows(Vec<Span>),
    Message { message: &'static str },
}

impl Response {
    pub fn ok(data: Reply) -> Self {
        Self {
            status: 200,
            data: Some(data),
            message: None,
        }
    }

    pub fn error(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            data: None,
            message: Some(message.into()),
        }
    }
}

#[derive(Debug, Error)]
pub enum WireError {
    #[error("connection error: {0}")]
    Codec(#[from] LinesCodecError),
    #[error("cannot encode response: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Serve newline-delimited JSON requests until the peer hangs up.
pub async fn process_connection<T, S>(
    socket: T,
    service: &BookingService<S>,
) -> Result<(), WireError>
where
    T: AsyncRead + AsyncWrite + Unpin,
    S: RecordStore,
{
    let mut framed = Framed::new(socket, LinesCodec::new_with_max_length(MAX_LINE_LEN));

    while let Some(frame) = framed.next().await {
        let response = match frame {
            Ok(line) if line.trim().is_empty() => continue,
            Ok(line) => handle_line(service, &line).await,
            Err(LinesCodecError::MaxLineLengthExceeded) => {
                count_invalid();
                Response::error(400, "request too long")
            }
            Err(e) => return Err(e.into()),
        };
        framed.send(serde_json::to_string(&response)?).await?;
    }
    Ok(())
}

fn count_invalid() {
    metrics::counter!(
        observability::REQUESTS_TOTAL,
        "command" => "invalid",
        "status" => "400"
    )
    .increment(1);
}

/// Parse and execute one request line.
pub async fn handle_line<S: RecordStore>(service: &BookingService<S>, line: &str) -> Response {
    let cmd = match parse_request(line) {
        Ok(cmd) => cmd,
        Err(e) => {
            count_invalid();
            return Response::error(400, e.to_string());
        }
    };

    let label = command_label(&cmd);
    let start = Instant::now();
    let response = match execute(service, cmd).await {
        Ok(reply) => Response::ok(reply),
        Err(e) if e.is_internal() => {
            error!("{label} failed: {e}");
            Response::error(e.status_code(), INTERNAL_ERROR_MESSAGE)
        }
        Err(e) => Response::error(e.status_code(), e.to_string()),
    };
    metrics::histogram!(observability::REQUEST_DURATION_SECONDS, "command" => label)
        .record(start.elapsed().as_secs_f64());
    metrics::counter!(
        observability::REQUESTS_TOTAL,
        "command" => label,
        "status" => response.status.to_string()
    )
    .increment(1);
    response
}

async fn execute<S: RecordStore>(
    service: &BookingService<S>,
    cmd: Command,
) -> Result<Reply, EngineError> {
    match cmd {
        Command::Create(draft) => Ok(Reply::Booking(service.create(draft).await?)),
        Command::Update { id, from, to } => Ok(Reply::Booking(service.update(id, from, to).await?)),
        Command::Cancel { id } => {
            service.cancel(id).await?;
            Ok(Reply::Message {
                message: CANCEL_MESSAGE,
            })
        }
        Command::Get { id } => service
            .load_by_id(id)
            .await?
            .map(Reply::Booking)
            .ok_or(EngineError::BookingNotFound(id)),
        Command::ListByUser {
            user_email,
            facility_type,
        } => Ok(Reply::Bookings(
            service.list_by_user(&user_email, facility_type).await?,
        )),
        Command::ListByFacility { facility_id } => Ok(Reply::Bookings(
            service.list_by_facility(facility_id).await?,
        )),
        Command::Availability { facility_id, day } => Ok(Reply::Windows(
            service.availability(facility_id, day).await?,
        )),
    }
}
