//! Exchange engine — turns a wanted hash into a verified block or a miss.
//!
//! Per hash: Idle → WantSent → {Delivered | DontHave | TimedOut}.
//! A background reader routes BLOCK and DONT_HAVE frames to the wantlist;
//! fetchers wait on their subscription. Only timeouts are retried.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;

use barge_core::config::RetrievalConfig;
use barge_core::{Block, ContentHash, Message};

use crate::error::{MissReason, RetrieveError};
use crate::progress::ProgressSink;
use crate::store::BlockStore;
use crate::transport::{read_message, write_message};
use crate::walker::BlockSource;
use crate::wantlist::{Delivery, Wantlist};

type BoxedWriter = Box<dyn AsyncWrite + Unpin + Send>;

pub struct Exchange {
    peer: String,
    writer: Mutex<BoxedWriter>,
    store: BlockStore,
    wantlist: Arc<Wantlist>,
    progress: Arc<dyn ProgressSink>,
    want_timeout: Duration,
    max_attempts: u32,
    closed: CancellationToken,
    close_reason: Arc<OnceLock<String>>,
    wants_sent: AtomicU64,
    reader: AbortHandle,
}

impl Exchange {
    /// Take over an established connection and start routing its frames.
    pub fn start<R, W>(
        peer: impl Into<String>,
        reader: R,
        writer: W,
        store: BlockStore,
        progress: Arc<dyn ProgressSink>,
        config: &RetrievalConfig,
    ) -> Arc<Self>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let peer = peer.into();
        let wantlist = Arc::new(Wantlist::new());
        let closed = CancellationToken::new();
        let close_reason = Arc::new(OnceLock::new());

        let task = tokio::spawn({
            let wantlist = wantlist.clone();
            let closed = closed.clone();
            let close_reason = close_reason.clone();
            let peer = peer.clone();
            async move {
                let reason = route_frames(reader, &wantlist).await;
                tracing::debug!(peer = %peer, reason = %reason, "connection reader finished");
                let _ = close_reason.set(reason.clone());
                closed.cancel();
                wantlist.close_all(&reason);
            }
        });

        Arc::new(Self {
            peer,
            writer: Mutex::new(Box::new(writer)),
            store,
            wantlist,
            progress,
            want_timeout: config.want_timeout(),
            max_attempts: config.max_attempts.max(1),
            closed,
            close_reason,
            wants_sent: AtomicU64::new(0),
            reader: task.abort_handle(),
        })
    }

    pub fn store(&self) -> &BlockStore {
        &self.store
    }

    /// WANT frames written so far, retries included.
    pub fn wants_sent(&self) -> u64 {
        self.wants_sent.load(Ordering::Relaxed)
    }

    /// Get `hash`, from the store if present, else from the peer.
    ///
    /// A delivered block is verified before it is stored; on mismatch the
    /// store is left untouched.
    pub async fn fetch(
        &self,
        hash: ContentHash,
        cancel: &CancellationToken,
    ) -> Result<Block, RetrieveError> {
        loop {
            if let Some(block) = self.store.get(&hash) {
                return Ok(block);
            }
            if cancel.is_cancelled() {
                return Err(RetrieveError::Cancelled);
            }
            if self.closed.is_cancelled() {
                return Err(self.closed_error());
            }

            let sub = self.wantlist.subscribe(hash);
            let delivery = if sub.owner {
                self.drive_want(hash, sub.rx, cancel).await?
            } else {
                match self.join_want(sub.rx, cancel).await? {
                    Some(d) => d,
                    // The owner abandoned the want; take it over.
                    None => continue,
                }
            };
            return self.accept(hash, delivery);
        }
    }

    /// Owner side: send the want, re-send on timeout, give up after
    /// `max_attempts`.
    async fn drive_want(
        &self,
        hash: ContentHash,
        mut rx: tokio::sync::oneshot::Receiver<Delivery>,
        cancel: &CancellationToken,
    ) -> Result<Delivery, RetrieveError> {
        if let Err(e) = self.send_want(hash).await {
            self.wantlist.abandon(&hash);
            return Err(e);
        }
        let mut attempts = 1;

        loop {
            tokio::select! {
                biased;

                delivered = &mut rx => {
                    return delivered.map_err(|_| self.closed_error());
                }

                _ = cancel.cancelled() => {
                    self.wantlist.abandon(&hash);
                    return Err(RetrieveError::Cancelled);
                }

                _ = self.closed.cancelled() => {
                    return Err(self.closed_error());
                }

                _ = tokio::time::sleep(self.want_timeout) => {
                    if attempts >= self.max_attempts {
                        match self.give_up(hash, attempts) {
                            Some(timed_out) => return Ok(timed_out),
                            // Answered between the timer firing and now; rx holds it.
                            None => continue,
                        }
                    }
                    match self.wantlist.retry(&hash) {
                        Some(n) => attempts = n,
                        // Answered between the timer firing and now.
                        None => continue,
                    }
                    tracing::warn!(hash = %hash, attempt = attempts, "want timed out, re-sending");
                    if let Err(e) = self.send_want(hash).await {
                        self.wantlist.abandon(&hash);
                        return Err(e);
                    }
                }
            }
        }
    }

    /// Answer the entry with `TimedOut`. None if a delivery got there first.
    fn give_up(&self, hash: ContentHash, attempts: u32) -> Option<Delivery> {
        let timed_out = Delivery::TimedOut { attempts };
        if !self.wantlist.resolve(&hash, timed_out.clone()) {
            return None;
        }
        tracing::warn!(hash = %hash, attempts, "want timed out, giving up");
        Some(timed_out)
    }

    /// Joiner side. `Ok(None)` means the owner abandoned the entry.
    async fn join_want(
        &self,
        rx: tokio::sync::oneshot::Receiver<Delivery>,
        cancel: &CancellationToken,
    ) -> Result<Option<Delivery>, RetrieveError> {
        tokio::select! {
            delivered = rx => Ok(delivered.ok()),
            _ = cancel.cancelled() => Err(RetrieveError::Cancelled),
            _ = self.closed.cancelled() => Err(self.closed_error()),
        }
    }

    fn accept(&self, hash: ContentHash, delivery: Delivery) -> Result<Block, RetrieveError> {
        match delivery {
            Delivery::Block(data) => {
                let block = Block::verified(hash, data).map_err(|actual| {
                    tracing::warn!(expected = %hash, actual = %actual, "hash mismatch");
                    RetrieveError::HashMismatch {
                        expected: hash,
                        actual,
                    }
                })?;
                if self.store.put(block.clone()) {
                    self.progress.add(block.len() as u64);
                    tracing::debug!(hash = %hash, bytes = block.len(), "block received");
                }
                Ok(block)
            }
            Delivery::DontHave => Err(RetrieveError::MissingBlock {
                hash,
                reason: MissReason::DontHave,
            }),
            Delivery::TimedOut { attempts } => Err(RetrieveError::MissingBlock {
                hash,
                reason: MissReason::TimedOut { attempts },
            }),
            Delivery::Closed(reason) => Err(RetrieveError::connection(&self.peer, reason)),
        }
    }

    async fn send_want(&self, hash: ContentHash) -> Result<(), RetrieveError> {
        let mut writer = self.writer.lock().await;
        write_message(&mut *writer, &Message::Want(hash))
            .await
            .map_err(|e| RetrieveError::connection(&self.peer, e))?;
        self.wants_sent.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(hash = %hash, "want sent");
        Ok(())
    }

    fn closed_error(&self) -> RetrieveError {
        let reason = self
            .close_reason
            .get()
            .map(String::as_str)
            .unwrap_or("connection closed");
        RetrieveError::connection(&self.peer, reason)
    }
}

impl Drop for Exchange {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

#[async_trait]
impl BlockSource for Exchange {
    async fn fetch(
        &self,
        hash: ContentHash,
        cancel: &CancellationToken,
    ) -> Result<Block, RetrieveError> {
        Exchange::fetch(self, hash, cancel).await
    }
}

/// Read frames until the connection ends. Returns why it ended.
async fn route_frames<R>(mut reader: R, wantlist: &Wantlist) -> String
where
    R: AsyncRead + Unpin,
{
    loop {
        match read_message(&mut reader).await {
            Ok(Some(Message::Block { hash, data })) => {
                let bytes = data.len();
                if !wantlist.resolve(&hash, Delivery::Block(data)) {
                    tracing::warn!(hash = %hash, bytes, "unsolicited block dropped");
                }
            }
            Ok(Some(Message::DontHave(hash))) => {
                if !wantlist.resolve(&hash, Delivery::DontHave) {
                    tracing::warn!(hash = %hash, "unsolicited dont_have dropped");
                }
            }
            Ok(Some(other)) => {
                tracing::warn!(kind = other.name(), "unexpected frame from provider dropped");
            }
            Ok(None) => return "peer closed the connection".to_string(),
            Err(e) => return e.to_string(),
        }
    }
}
