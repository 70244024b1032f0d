// SPDX-FileCopyrightText: © 2025 PackKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Decorates a `File` with a background I/O task and an [`IoCache`] so that
//! the caller only ever blocks on the cache, never on the kernel.
//!
//! - Input mode: the task reads blocks from the inner file into the cache.
//!   EOF and errors are latched and surfaced by later foreground reads.
//! - Output mode: the foreground writes into the cache; the task drains it
//!   into the inner file. `flush` is a barrier: it returns once everything
//!   buffered has reached the inner file and the cache is writable again.
//!
//! The first inner-file error is sticky: every subsequent foreground
//! operation reports it, and the cache is closed so neither side deadlocks.

use crate::file::File;
use crate::io_cache::IoCache;
use async_trait::async_trait;
use packkit_core::{PackKitError, Result};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mode {
    Input,
    Output,
}

#[derive(Default)]
struct Shared {
    error: Mutex<Option<PackKitError>>,
    eof: AtomicBool,
    flushing: AtomicBool,
}

impl Shared {
    // Mutex poisoning requires a panicked holder, a programmer error.
    #[allow(clippy::unwrap_used)]
    fn sticky_error(&self) -> Option<PackKitError> {
        self.error.lock().unwrap().clone()
    }

    fn latch_error(&self, error: PackKitError) {
        #[allow(clippy::unwrap_used)]
        let mut slot = self.error.lock().unwrap();
        if slot.is_none() {
            *slot = Some(error);
        }
    }
}

pub struct ThreadedIoFile {
    file_name: String,
    mode: Mode,
    cache: Arc<IoCache>,
    shared: Arc<Shared>,
    /// Bumped by the task when a flush barrier completes or the task exits.
    flush_done: watch::Sender<u64>,
    size: AtomicU64,
    task: Option<JoinHandle<Box<dyn File>>>,
}

impl ThreadedIoFile {
    /// Wrap an opened file for background reading.
    pub async fn start_input(
        inner: Box<dyn File>,
        io_cache_size: usize,
        io_block_size: usize,
    ) -> Result<Self> {
        Self::start(inner, Mode::Input, io_cache_size, io_block_size).await
    }

    /// Wrap an opened file for background writing.
    pub async fn start_output(
        inner: Box<dyn File>,
        io_cache_size: usize,
        io_block_size: usize,
    ) -> Result<Self> {
        Self::start(inner, Mode::Output, io_cache_size, io_block_size).await
    }

    async fn start(
        mut inner: Box<dyn File>,
        mode: Mode,
        io_cache_size: usize,
        io_block_size: usize,
    ) -> Result<Self> {
        let file_name = inner.file_name().to_string();
        let size = inner.size().await.unwrap_or(0);

        let cache = Arc::new(IoCache::new(io_cache_size));
        let shared = Arc::new(Shared::default());
        let (flush_done, _) = watch::channel(0);

        let task_cache = Arc::clone(&cache);
        let task_shared = Arc::clone(&shared);
        let task_flush_done = flush_done.clone();
        let task = tokio::spawn(async move {
            match mode {
                Mode::Input => {
                    run_input(inner.as_mut(), &task_cache, &task_shared, io_block_size).await;
                },
                Mode::Output => {
                    run_output(
                        inner.as_mut(),
                        &task_cache,
                        &task_shared,
                        &task_flush_done,
                        io_block_size,
                    )
                    .await;
                },
            }
            // Wake any flush barrier that would otherwise wait forever.
            task_flush_done.send_modify(|version| *version = version.wrapping_add(1));
            inner
        });

        Ok(Self {
            file_name,
            mode,
            cache,
            shared,
            flush_done,
            size: AtomicU64::new(size),
            task: Some(task),
        })
    }

    async fn join_task(&mut self) -> Result<Box<dyn File>> {
        let task = self
            .task
            .take()
            .ok_or_else(|| PackKitError::Internal("threaded io task already joined".to_string()))?;
        task.await
            .map_err(|e| PackKitError::Internal(format!("threaded io task failed: {e}")))
    }
}

async fn run_input(inner: &mut dyn File, cache: &IoCache, shared: &Shared, io_block_size: usize) {
    let mut block = vec![0u8; io_block_size];
    loop {
        match inner.read(&mut block).await {
            Ok(0) => {
                shared.eof.store(true, Ordering::Release);
                cache.close();
                return;
            },
            Ok(count) => {
                if cache.write(&block[..count]).await == 0 {
                    // Cache closed from the foreground; stop reading.
                    return;
                }
            },
            Err(error) => {
                shared.latch_error(error);
                cache.close();
                return;
            },
        }
    }
}

async fn run_output(
    inner: &mut dyn File,
    cache: &IoCache,
    shared: &Shared,
    flush_done: &watch::Sender<u64>,
    io_block_size: usize,
) {
    let mut block = vec![0u8; io_block_size];
    loop {
        let count = cache.read(&mut block).await;
        if count == 0 {
            if shared.flushing.load(Ordering::Acquire) {
                if let Err(error) = inner.flush().await {
                    shared.latch_error(error);
                    return;
                }
                cache.reopen();
                shared.flushing.store(false, Ordering::Release);
                flush_done.send_modify(|version| *version = version.wrapping_add(1));
            } else {
                // Cache closed for good: drain finished.
                return;
            }
        } else if let Err(error) = inner.write(&block[..count]).await {
            shared.latch_error(error);
            cache.close();
            return;
        }
    }
}

#[async_trait]
impl File for ThreadedIoFile {
    fn file_name(&self) -> &str {
        &self.file_name
    }

    async fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        if self.mode != Mode::Input {
            return Err(PackKitError::File(
                "threaded file opened for output does not support read".to_string(),
            ));
        }
        if self.shared.eof.load(Ordering::Acquire) && self.cache.bytes_cached() == 0 {
            return Ok(0);
        }
        if let Some(error) = self.shared.sticky_error() {
            return Err(error);
        }
        Ok(self.cache.read(buffer).await)
    }

    async fn write(&mut self, buffer: &[u8]) -> Result<usize> {
        if self.mode != Mode::Output {
            return Err(PackKitError::File(
                "threaded file opened for input does not support write".to_string(),
            ));
        }
        if let Some(error) = self.shared.sticky_error() {
            return Err(error);
        }
        if buffer.is_empty() {
            return Ok(0);
        }
        self.size.fetch_add(buffer.len() as u64, Ordering::AcqRel);
        if self.cache.write(buffer).await == 0 {
            return Err(self
                .shared
                .sticky_error()
                .unwrap_or_else(|| PackKitError::File("write to a closed cache".to_string())));
        }
        Ok(buffer.len())
    }

    async fn size(&mut self) -> Result<u64> {
        Ok(self.size.load(Ordering::Acquire))
    }

    async fn flush(&mut self) -> Result<()> {
        if self.mode != Mode::Output {
            return Err(PackKitError::File(
                "threaded file opened for input does not support flush".to_string(),
            ));
        }
        if let Some(error) = self.shared.sticky_error() {
            return Err(error);
        }
        self.shared.flushing.store(true, Ordering::Release);
        self.cache.close();
        // Either the barrier completes (flushing drops back to false) or the
        // task exits on error; both bump the channel. Subscribing before the
        // predicate check means the wakeup cannot be lost.
        loop {
            let mut done = self.flush_done.subscribe();
            if let Some(error) = self.shared.sticky_error() {
                return Err(error);
            }
            if !self.shared.flushing.load(Ordering::Acquire) {
                return Ok(());
            }
            let _ = done.changed().await;
        }
    }

    async fn seek(&mut self, _position: u64) -> Result<()> {
        Err(PackKitError::File("threaded files do not support seeking".to_string()))
    }

    async fn tell(&mut self) -> Result<u64> {
        Err(PackKitError::File("threaded files do not support seeking".to_string()))
    }

    async fn close(mut self: Box<Self>) -> Result<()> {
        let flush_result = if self.mode == Mode::Output && self.shared.sticky_error().is_none() {
            self.flush().await
        } else {
            Ok(())
        };
        self.cache.close();
        let inner = self.join_task().await?;
        flush_result.and(inner.close().await)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::file::OpenMode;
    use crate::memory_file::MemoryFile;

    const CACHE_SIZE: usize = 4096;
    const BLOCK_SIZE: usize = 256;

    #[tokio::test]
    async fn test_output_then_input_round_trip() {
        let name = "threaded-round-trip";
        let source: Vec<u8> = (0..64 * 1024u32).map(|i| (i % 253) as u8).collect();

        let inner = Box::new(MemoryFile::open(name, OpenMode::Write));
        let mut writer = ThreadedIoFile::start_output(inner, CACHE_SIZE, BLOCK_SIZE)
            .await
            .unwrap();
        for chunk in source.chunks(777) {
            assert_eq!(writer.write(chunk).await.unwrap(), chunk.len());
        }
        assert_eq!(writer.size().await.unwrap(), source.len() as u64);
        Box::new(writer).close().await.unwrap();

        let inner = Box::new(MemoryFile::open(name, OpenMode::Read));
        let mut reader = ThreadedIoFile::start_input(inner, CACHE_SIZE, BLOCK_SIZE)
            .await
            .unwrap();
        let mut received = Vec::new();
        let mut buffer = [0u8; 513];
        loop {
            let count = reader.read(&mut buffer).await.unwrap();
            if count == 0 {
                break;
            }
            received.extend_from_slice(&buffer[..count]);
        }
        Box::new(reader).close().await.unwrap();

        assert_eq!(received, source);
        MemoryFile::delete(name);
    }

    #[tokio::test]
    async fn test_flush_is_a_barrier() {
        let name = "threaded-flush-barrier";
        let inner = Box::new(MemoryFile::open(name, OpenMode::Write));
        let mut writer = ThreadedIoFile::start_output(inner, CACHE_SIZE, BLOCK_SIZE)
            .await
            .unwrap();

        writer.write(b"before flush").await.unwrap();
        writer.flush().await.unwrap();

        // Everything written so far is visible through the backing.
        let mut probe = MemoryFile::open(name, OpenMode::Read);
        let mut buffer = [0u8; 32];
        let count = probe.read(&mut buffer).await.unwrap();
        assert_eq!(&buffer[..count], b"before flush");
        Box::new(probe).close().await.unwrap();

        // The cache accepts writes again after the barrier.
        writer.write(b" and after").await.unwrap();
        Box::new(writer).close().await.unwrap();

        assert_eq!(
            crate::file::read_file_to_end(&format!("memory://{name}")).await.unwrap(),
            b"before flush and after"
        );
        MemoryFile::delete(name);
    }

    #[tokio::test]
    async fn test_seek_not_supported() {
        let name = "threaded-no-seek";
        let inner = Box::new(MemoryFile::open(name, OpenMode::Write));
        let mut writer = ThreadedIoFile::start_output(inner, CACHE_SIZE, BLOCK_SIZE)
            .await
            .unwrap();
        assert!(writer.seek(0).await.is_err());
        assert!(writer.tell().await.is_err());
        Box::new(writer).close().await.unwrap();
        MemoryFile::delete(name);
    }
}
