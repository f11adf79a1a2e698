use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use rusqlite::Connection;
use tokio::sync::oneshot;

use super::migrations::run_migrations;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

type Job = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum Message {
    Run(Job),
    Stop,
}

/// Where the worker opens its connection.
#[derive(Debug, Clone)]
enum Location {
    File(PathBuf),
    Memory,
}

impl Location {
    fn open(&self) -> Result<Connection> {
        let conn = match self {
            Location::File(path) => Connection::open(path)
                .with_context(|| format!("failed to open SQLite database at {}", path.display()))?,
            Location::Memory => Connection::open_in_memory().context("failed to open in-memory SQLite")?,
        };
        conn.busy_timeout(BUSY_TIMEOUT)
            .context("failed to set SQLite busy timeout")?;
        if let Location::File(_) = self {
            if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
                log_error!("could not switch to WAL journal: {err}");
            }
        }
        Ok(conn)
    }
}

struct Worker {
    mailbox: mpsc::Sender<Message>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Worker {
    fn drop(&mut self) {
        let thread = self
            .thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(thread) = thread else {
            return;
        };
        if self.mailbox.send(Message::Stop).is_err() {
            log_error!("database worker already gone at shutdown");
        }
        if let Err(panic) = thread.join() {
            log_error!("database worker panicked: {panic:?}");
        }
    }
}

/// Opens the connection, migrates it, reports readiness, then serves jobs
/// until told to stop or every sender is gone.
fn serve(location: Location, ready: mpsc::Sender<Result<()>>, mailbox: mpsc::Receiver<Message>) {
    let mut conn = match location.open().and_then(|mut conn| {
        run_migrations(&mut conn).context("failed to migrate recognition store")?;
        Ok(conn)
    }) {
        Ok(conn) => conn,
        Err(err) => {
            let _ = ready.send(Err(err));
            return;
        }
    };

    if ready.send(Ok(())).is_err() {
        return;
    }

    while let Ok(message) = mailbox.recv() {
        match message {
            Message::Run(job) => job(&mut conn),
            Message::Stop => break,
        }
    }
    log_debug!("database worker stopped");
}

/// Recognition store backed by one SQLite connection that lives on its own
/// thread. Clones share the worker.
#[derive(Clone)]
pub struct Database {
    worker: Arc<Worker>,
    path: Option<Arc<PathBuf>>,
}

impl Database {
    pub fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let database = Self::spawn(Location::File(db_path.clone()))?;
        log_info!("recognition store ready at {}", db_path.display());
        Ok(Self {
            path: Some(Arc::new(db_path)),
            ..database
        })
    }

    /// Throwaway store; contents vanish with the last clone.
    pub fn in_memory() -> Result<Self> {
        Self::spawn(Location::Memory)
    }

    fn spawn(location: Location) -> Result<Self> {
        let (mailbox, inbox) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();

        let thread = thread::Builder::new()
            .name("inkcalc-db".into())
            .spawn(move || serve(location, ready_tx, inbox))
            .context("failed to spawn database worker")?;

        ready_rx
            .recv()
            .context("database worker exited during startup")??;

        Ok(Self {
            worker: Arc::new(Worker {
                mailbox,
                thread: Mutex::new(Some(thread)),
            }),
            path: None,
        })
    }

    /// File backing this store, `None` when in memory.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref().map(PathBuf::as_path)
    }

    /// Run `job` on the worker thread and await its result.
    pub async fn execute<F, T>(&self, job: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply, response) = oneshot::channel();
        let message = Message::Run(Box::new(move |conn| {
            // Caller may have given up waiting.
            let _ = reply.send(job(conn));
        }));

        self.worker
            .mailbox
            .send(message)
            .map_err(|_| anyhow!("database worker is not running"))?;

        response
            .await
            .map_err(|_| anyhow!("database worker dropped the request"))?
    }
}
