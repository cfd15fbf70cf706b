//! Executes one table operation requested by a session and reports the
//! outcome over the session's channel.
//!
//! A request names a schema (through its event name), a table, a method
//! and positional arguments. In single-value mode (`xx-schema`) the worker
//! sends exactly one `(event, result)` message. In streaming mode
//! (`xx=schema`) it sends a start marker, one message per produced element
//! and an end marker. Operation failures in either mode are sent as a
//! single `("exception", error)` message instead of the terminal message.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use once_cell::sync::Lazy;
use serde_json::Value;

use crate::config;
use crate::error::{RequestError, StoreError, WorkerError};
use crate::event::EventTag;
use crate::message::{Channel, Response};
use crate::operation::Operation;
use crate::prelude::{KVStore, StoreBackend};
use crate::store_factory;

/// Serializes directory creation and store opening across every worker of
/// the process.
static FILE_LOCK: Lazy<Arc<Mutex<()>>> = Lazy::new(|| Arc::new(Mutex::new(())));

/// The operation failure forwarded to the requester, if any.
type Outcome = Result<Option<StoreError>, WorkerError>;

/// `(table, method, args)`
pub type RequestData = (String, String, Vec<Value>);

/// What every worker of a process shares.
#[derive(Clone)]
pub struct WorkerContext
{
    datapath: PathBuf,
    backend: Arc<dyn StoreBackend + Send + Sync>,
    file_lock: Arc<Mutex<()>>,
}

impl WorkerContext
{
    pub fn new(datapath: impl Into<PathBuf>,
               backend: Arc<dyn StoreBackend + Send + Sync>) -> WorkerContext
    {
        WorkerContext {
            datapath: datapath.into(),
            backend,
            file_lock: FILE_LOCK.clone(),
        }
    }

    pub fn from_config(cfg: &config::ServiceConfig) -> std::io::Result<WorkerContext>
    {
        let backend = store_factory::create_backend(&cfg.store)?;
        Ok(WorkerContext::new(cfg.system.datapath.clone(), backend))
    }

    /// Replace the process-wide lock.
    pub fn with_file_lock(mut self, file_lock: Arc<Mutex<()>>) -> WorkerContext
    {
        self.file_lock = file_lock;
        self
    }

    pub fn datapath(&self) -> &Path
    {
        &self.datapath
    }
}

pub struct CommandWorker
{
    channel: Arc<dyn Channel>,
    event: EventTag,
    table: String,
    method: String,
    args: Vec<Value>,
    filepath: PathBuf,
    backend: Arc<dyn StoreBackend + Send + Sync>,
    file_lock: Arc<Mutex<()>>,
}

impl CommandWorker
{
    /// Validate the request. Performs no I/O; a malformed event name never
    /// reaches storage.
    pub fn new(channel: Arc<dyn Channel>, event: &str, data: RequestData,
               ctx: &WorkerContext) -> Result<CommandWorker, RequestError>
    {
        let event = EventTag::parse(event)?;
        let (table, method, args) = data;
        let filepath = ctx.datapath.join(std::format!(
                "{}.{}", event.schema(), ctx.backend.extension()));

        Ok(CommandWorker {
            channel,
            event,
            table,
            method,
            args,
            filepath,
            backend: ctx.backend.clone(),
            file_lock: ctx.file_lock.clone(),
        })
    }

    pub fn event(&self) -> &EventTag
    {
        &self.event
    }

    pub fn filepath(&self) -> &Path
    {
        &self.filepath
    }

    /// Run on a dedicated thread. Worker errors are logged on that thread
    /// before being returned through the handle.
    pub fn start(self) -> std::io::Result<thread::JoinHandle<Result<(), WorkerError>>>
    {
        let name = std::format!("db-{}", self.event.schema());
        thread::Builder::new().name(name).spawn(move || {
            let event = self.event.name().to_string();
            let res = self.run();
            if let Err(e) = &res {
                tracing::error!(event = %event, error = %e, "db worker failed");
            }
            res
        })
    }

    /// Execute the request and drive the response protocol to completion.
    ///
    /// Operation failures are sent to the requester and yield `Ok(())`.
    /// The storage handle is closed before returning on every path.
    pub fn run(self) -> Result<(), WorkerError>
    {
        let store = self.open_store()?;
        let res = self.dispatch(store.as_ref());
        if let Err(e) = store.close() {
            tracing::warn!(path = %self.filepath.display(), error = %e,
                           "closing store failed");
        }
        if let Some(err) = res? {
            tracing::error!(schema = self.event.schema(), table = %self.table,
                            method = %self.method, error = %err,
                            "table operation failed");
        }
        Ok(())
    }

    fn open_store(&self) -> Result<Box<dyn KVStore>, WorkerError>
    {
        let open_err = |source| WorkerError::Open {
            path: self.filepath.clone(),
            source,
        };

        let _guard = self.file_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(folder) = self.filepath.parent() {
            if !folder.exists() {
                std::fs::create_dir_all(folder).map_err(open_err)?;
            }
        }
        self.backend.open(&self.filepath, &self.table).map_err(open_err)
    }

    fn dispatch(&self, store: &dyn KVStore) -> Outcome
    {
        let Some(op) = Operation::resolve(&self.method) else {
            tracing::error!(schema = self.event.schema(), table = %self.table,
                            method = %self.method,
                            "not a valid table operation");
            return Err(WorkerError::InvalidOperation(self.method.clone()));
        };

        tracing::debug!("{}/{}{}", self.event.schema(), self.method,
                        if self.args.is_empty() {
                            String::from("()")
                        } else {
                            std::format!("(*{})", self.args.len())
                        });

        if self.event.is_streaming() {
            self.reply_stream(op, store)
        } else {
            self.reply_single(op, store)
        }
    }

    fn reply_single(&self, op: Operation, store: &dyn KVStore) -> Outcome
    {
        match op.invoke(store, &self.args) {
            Ok(value) => {
                self.send(Response::Value {
                    event: self.event.name().to_string(),
                    value,
                })?;
                Ok(None)
            },
            Err(e) => self.fail(e),
        }
    }

    fn reply_stream(&self, op: Operation, store: &dyn KVStore) -> Outcome
    {
        let event = self.event.name();
        self.send(Response::StreamStart { event: event.to_string() })?;

        let items = match op.produce(store, &self.args) {
            Ok(items) => items,
            Err(e) => return self.fail(e),
        };
        for item in items {
            match item {
                Ok(item) => self.send(Response::Item {
                    event: event.to_string(),
                    item,
                })?,
                Err(e) => return self.fail(e),
            }
        }

        self.send(Response::StreamEnd { event: event.to_string() })?;
        Ok(None)
    }

    /// Forward an operation failure; it is logged once the handle is closed.
    fn fail(&self, err: StoreError) -> Outcome
    {
        self.send(Response::exception(&err))?;
        Ok(Some(err))
    }

    fn send(&self, msg: Response) -> Result<(), WorkerError>
    {
        self.channel.send(msg).map_err(WorkerError::Channel)
    }
}
