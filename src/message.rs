use std::sync::Mutex;

use serde::ser::SerializeTuple;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::error::StoreError;

/// Tag of every failure message, whatever the request's event name.
pub const EXCEPTION_TAG: &str = "exception";
pub const STREAM_START: &str = "StartIteration";
pub const STREAM_END: &str = "StopIteration";

/// Failure payload carried by an `"exception"` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionInfo
{
    pub kind: String,
    pub message: String,
}

impl From<&StoreError> for ExceptionInfo
{
    fn from(err: &StoreError) -> Self
    {
        ExceptionInfo {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

/// One message sent back to the requester. On the wire each is a
/// `[tag, payload]` pair.
#[derive(Debug, Clone, PartialEq)]
pub enum Response
{
    Value { event: String, value: Value },
    StreamStart { event: String },
    Item { event: String, item: Value },
    StreamEnd { event: String },
    Exception(ExceptionInfo),
}

impl Response
{
    pub fn exception(err: &StoreError) -> Response
    {
        Response::Exception(ExceptionInfo::from(err))
    }

    pub fn tag(&self) -> &str
    {
        match self {
            Response::Value { event, .. }
            | Response::StreamStart { event }
            | Response::Item { event, .. }
            | Response::StreamEnd { event } => event,
            Response::Exception(_) => EXCEPTION_TAG,
        }
    }

    /// No message follows a terminal one.
    pub fn is_terminal(&self) -> bool
    {
        matches!(self, Response::Value { .. }
                     | Response::StreamEnd { .. }
                     | Response::Exception(_))
    }
}

impl Serialize for Response
{
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error>
    {
        let mut tup = serializer.serialize_tuple(2)?;
        tup.serialize_element(self.tag())?;
        match self {
            Response::Value { value, .. } => tup.serialize_element(value)?,
            Response::Item { item, .. } => tup.serialize_element(item)?,
            Response::StreamStart { .. } => {
                tup.serialize_element(&(None::<()>, STREAM_START))?
            },
            Response::StreamEnd { .. } => {
                tup.serialize_element(&(None::<()>, STREAM_END))?
            },
            Response::Exception(info) => tup.serialize_element(info)?,
        }
        tup.end()
    }
}

/// The requester's end of the IPC connection.
pub trait Channel: Send + Sync
{
    fn send(&self, msg: Response) -> std::io::Result<()>;
}

fn disconnected() -> std::io::Error
{
    std::io::Error::new(std::io::ErrorKind::BrokenPipe,
                        "response channel disconnected")
}

impl Channel for std::sync::mpsc::Sender<Response>
{
    fn send(&self, msg: Response) -> std::io::Result<()>
    {
        std::sync::mpsc::Sender::send(self, msg).map_err(|_| disconnected())
    }
}

impl Channel for tokio::sync::mpsc::UnboundedSender<Response>
{
    fn send(&self, msg: Response) -> std::io::Result<()>
    {
        tokio::sync::mpsc::UnboundedSender::send(self, msg)
            .map_err(|_| disconnected())
    }
}

/// Records every message in order.
impl Channel for Mutex<Vec<Response>>
{
    fn send(&self, msg: Response) -> std::io::Result<()>
    {
        match self.lock() {
            Ok(mut sent) => {
                sent.push(msg);
                Ok(())
            },
            Err(_) => Err(disconnected()),
        }
    }
}
