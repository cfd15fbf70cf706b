use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::EnvFilter;

use db_worker::config;
use db_worker::{Channel, CommandWorker, RequestData, Response, WorkerContext,
                WorkerError};

type Request = (String, RequestData);
type Worker = JoinHandle<Result<(), WorkerError>>;

// Reads one `[event, [table, method, [args..]]]` request per stdin line and
// writes every response as one `[tag, payload]` line on stdout.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>>
{
    let configfile = std::env::args().nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(config::DEFAULT_CONFIG_PATH));
    let config = config::read_and_parse_config(&configfile)?;
    init_tracing(&config.log);
    tracing::info!(config = ?config, "db worker supervisor starting");

    let ctx = WorkerContext::from_config(&config)?;
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<Response>();
    let channel: Arc<dyn Channel> = Arc::new(tx);

    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(msg) = rx.recv().await {
            let mut line = match serde_json::to_vec(&msg) {
                Ok(line) => line,
                Err(e) => {
                    tracing::error!(tag = msg.tag(), error = %e,
                                    "failed to encode response");
                    continue;
                },
            };
            line.push(b'\n');
            stdout.write_all(&line).await?;
            stdout.flush().await?;
        }
        Ok::<(), std::io::Error>(())
    });

    let mut workers: Vec<Worker> = Vec::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let (event, data): Request = match serde_json::from_str(&line) {
            Ok(req) => req,
            Err(e) => {
                tracing::warn!(error = %e, "skipping malformed request line");
                continue;
            },
        };
        let worker = match CommandWorker::new(channel.clone(), &event, data, &ctx) {
            Ok(worker) => worker,
            Err(e) => {
                tracing::warn!(event = %event, error = %e, "rejected request");
                continue;
            },
        };
        workers.retain(|w| !w.is_finished());
        match worker.start() {
            Ok(handle) => workers.push(handle),
            Err(e) => tracing::error!(event = %event, error = %e,
                                      "failed to spawn db worker"),
        }
    }

    let pending = tokio::task::spawn_blocking(move || {
        for handle in workers {
            if handle.join().is_err() {
                tracing::error!("db worker panicked");
            }
        }
    });
    pending.await?;

    drop(channel);
    writer.await??;
    Ok(())
}

fn init_tracing(cfg: &config::LogConfig)
{
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cfg.filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
