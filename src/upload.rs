//! Chunked blob uploads.
//!
//! A session is owned by a background task. The handle only sends commands to
//! its mailbox, so commands from any number of callers are applied one at a
//! time in the order they were sent. Chunk N+1 always goes to the location
//! returned for chunk N.

use std::fmt;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use url::Url;

use crate::api::{Repository, UploadInit, UploadProgress, Uploaded};
use crate::digest::{Digest, Digester};
use crate::error::{Error, Result};

/// Chunk size used unless the registry asks for more.
pub const DEFAULT_CHUNK_SIZE: usize = 5 * 1024 * 1024;

/// Largest chunk buffer a session allocates, whatever the registry demands.
pub const MAX_CHUNK_SIZE: usize = 256 * 1024 * 1024;

const MAILBOX: usize = 16;

type Reader = Box<dyn AsyncRead + Send + Unpin>;

enum Command {
    Write {
        reader: Reader,
        reply: oneshot::Sender<Result<u64>>,
    },
    Close {
        reply: oneshot::Sender<Result<Uploaded>>,
    },
    Status {
        reply: oneshot::Sender<Result<UploadProgress>>,
    },
    State {
        reply: oneshot::Sender<State>,
    },
}

/// Snapshot of a session.
#[derive(Debug, Clone, PartialEq)]
pub struct State {
    /// Where the next chunk goes; `None` once the session is closed.
    pub location: Option<Url>,
    /// Bytes acknowledged by the registry so far.
    pub offset: u64,
    pub chunk_size: usize,
}

/// Handle to a running upload session. Cloning it shares the session.
#[derive(Clone)]
pub struct UploadSession {
    mailbox: mpsc::Sender<Command>,
}

impl UploadSession {
    /// Spawn the task that owns the session opened by `init`.
    pub fn start(repo: Repository, init: UploadInit) -> Self {
        let chunk_size = repo
            .chunk_size()
            .max(init.chunk_min_length.unwrap_or(0).min(MAX_CHUNK_SIZE))
            .max(1);
        info!("upload session opened at {}", init.location);

        let (tx, rx) = mpsc::channel(MAILBOX);
        let worker = Worker {
            repo,
            location: Some(init.location),
            offset: 0,
            hasher: Digester::sha256(),
            chunk_size,
        };
        tokio::spawn(worker.run(rx));
        Self { mailbox: tx }
    }

    async fn call<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.mailbox
            .send(command(tx))
            .await
            .map_err(|_| Error::SessionClosed)?;
        rx.await.map_err(|_| Error::SessionClosed)
    }

    /// Upload everything `reader` yields, in chunks. Returns the number of
    /// bytes written.
    ///
    /// Dropping the returned future abandons the chunk in flight; only
    /// chunks the registry acknowledged count towards the digest.
    pub async fn write<R>(&self, reader: R) -> Result<u64>
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        self.call(|reply| Command::Write {
            reader: Box::new(reader),
            reply,
        })
        .await?
    }

    pub async fn write_bytes(&self, data: impl Into<Bytes>) -> Result<u64> {
        self.write(std::io::Cursor::new(data.into())).await
    }

    /// Finish the upload with the digest of everything written. Later
    /// writes fail with [`Error::SessionClosed`] without a request.
    pub async fn close(&self) -> Result<Uploaded> {
        self.call(|reply| Command::Close { reply }).await?
    }

    /// Ask the registry how much of the upload it holds.
    pub async fn status(&self) -> Result<UploadProgress> {
        self.call(|reply| Command::Status { reply }).await?
    }

    pub async fn state(&self) -> Result<State> {
        self.call(|reply| Command::State { reply }).await
    }

    pub async fn offset(&self) -> Result<u64> {
        Ok(self.state().await?.offset)
    }

    pub async fn location(&self) -> Result<Option<Url>> {
        Ok(self.state().await?.location)
    }
}

impl fmt::Debug for UploadSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadSession")
            .field("closed", &self.mailbox.is_closed())
            .finish()
    }
}

struct Worker {
    repo: Repository,
    location: Option<Url>,
    offset: u64,
    hasher: Digester,
    chunk_size: usize,
}

impl Worker {
    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        while let Some(command) = rx.recv().await {
            match command {
                Command::Write { mut reader, mut reply } => {
                    let outcome = tokio::select! {
                        outcome = self.write(&mut reader) => outcome,
                        _ = reply.closed() => {
                            debug!("write abandoned by caller");
                            continue;
                        }
                    };
                    let _ = reply.send(outcome);
                }
                Command::Close { mut reply } => {
                    let outcome = tokio::select! {
                        outcome = self.close() => outcome,
                        _ = reply.closed() => continue,
                    };
                    let _ = reply.send(outcome);
                }
                Command::Status { reply } => {
                    let _ = reply.send(self.status().await);
                }
                Command::State { reply } => {
                    let _ = reply.send(State {
                        location: self.location.clone(),
                        offset: self.offset,
                        chunk_size: self.chunk_size,
                    });
                }
            }
        }
        if self.location.is_some() {
            warn!("upload session dropped before close at offset {}", self.offset);
        }
    }

    fn active(&self) -> Result<Url> {
        self.location.clone().ok_or(Error::SessionClosed)
    }

    async fn fill(&self, reader: &mut Reader) -> Result<Bytes> {
        let mut buf = vec![0u8; self.chunk_size];
        let mut filled = 0;
        while filled < buf.len() {
            let n = reader.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        buf.truncate(filled);
        Ok(Bytes::from(buf))
    }

    async fn write(&mut self, reader: &mut Reader) -> Result<u64> {
        self.active()?;
        let mut written = 0;
        loop {
            let chunk = self.fill(reader).await?;
            if chunk.is_empty() {
                break;
            }
            let last = chunk.len() < self.chunk_size;

            let at = self.active()?;
            debug!("uploading {} bytes at offset {}", chunk.len(), self.offset);
            let progress = self
                .repo
                .blobs()
                .upload_chunk(&at, self.offset, chunk.clone())
                .await?
                .unwrap()?
                .into_value();

            self.hasher.update(&chunk);
            self.offset += chunk.len() as u64;
            self.location = Some(progress.location);
            written += chunk.len() as u64;

            if last {
                break;
            }
        }
        Ok(written)
    }

    async fn close(&mut self) -> Result<Uploaded> {
        let at = self.active()?;
        let digest: Digest = self.hasher.clone().finalize();
        let uploaded = self
            .repo
            .blobs()
            .close_upload(&at, &digest, None)
            .await?
            .unwrap()?
            .into_value();

        self.location = None;
        info!("upload of {} closed after {} bytes", digest, self.offset);
        Ok(uploaded)
    }

    async fn status(&mut self) -> Result<UploadProgress> {
        let at = self.active()?;
        let progress = self
            .repo
            .blobs()
            .upload_status(&at)
            .await?
            .unwrap()?
            .into_value();
        self.location = Some(progress.location.clone());
        Ok(progress)
    }
}
