//! Runs table operations on schema-named key-value stores on behalf of
//! session processes, one short-lived worker per request.

pub mod config;
pub mod error;
pub mod event;
pub mod memstore;
pub mod message;
pub mod operation;
pub mod prelude;
pub mod rocksstore;
pub mod store_factory;
pub mod worker;


pub use error::{RequestError, StoreError, WorkerError};
pub use event::EventTag;
pub use message::{Channel, ExceptionInfo, Response};
pub use worker::{CommandWorker, RequestData, WorkerContext};
