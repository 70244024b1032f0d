// SPDX-FileCopyrightText: © 2025 PackKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! A task-safe bounded circular byte buffer with blocking semantics.
//!
//! One producer and one consumer are expected; additional concurrent readers
//! or writers are not supported. The backing buffer is one byte larger than
//! the nominal capacity so that `read_pos == write_pos` unambiguously means
//! "empty".

use std::sync::Mutex;
use tokio::sync::watch;

struct CacheState {
    buffer: Vec<u8>,
    read_pos: usize,
    write_pos: usize,
    closed: bool,
}

impl CacheState {
    fn bytes_cached(&self) -> usize {
        (self.write_pos + self.buffer.len() - self.read_pos) % self.buffer.len()
    }

    fn bytes_free(&self) -> usize {
        // One slot distinguishes full from empty.
        self.buffer.len() - 1 - self.bytes_cached()
    }

    fn copy_out(&mut self, dest: &mut [u8]) -> usize {
        let count = dest.len().min(self.bytes_cached());
        let first_chunk = count.min(self.buffer.len() - self.read_pos);
        dest[..first_chunk].copy_from_slice(&self.buffer[self.read_pos..self.read_pos + first_chunk]);
        self.read_pos = (self.read_pos + first_chunk) % self.buffer.len();
        let second_chunk = count - first_chunk;
        if second_chunk > 0 {
            dest[first_chunk..count].copy_from_slice(&self.buffer[..second_chunk]);
            self.read_pos = second_chunk;
        }
        count
    }

    fn copy_in(&mut self, src: &[u8]) -> usize {
        let count = src.len().min(self.bytes_free());
        let first_chunk = count.min(self.buffer.len() - self.write_pos);
        self.buffer[self.write_pos..self.write_pos + first_chunk].copy_from_slice(&src[..first_chunk]);
        self.write_pos = (self.write_pos + first_chunk) % self.buffer.len();
        let second_chunk = count - first_chunk;
        if second_chunk > 0 {
            self.buffer[..second_chunk].copy_from_slice(&src[first_chunk..count]);
            self.write_pos = second_chunk;
        }
        count
    }
}

/// Thread-safe circular buffer decoupling a producer from a consumer.
pub struct IoCache {
    state: Mutex<CacheState>,
    changed: watch::Sender<u64>,
}

impl IoCache {
    pub fn new(cache_size: usize) -> Self {
        let (changed, _) = watch::channel(0);
        Self {
            state: Mutex::new(CacheState {
                buffer: vec![0; cache_size + 1],
                read_pos: 0,
                write_pos: 0,
                closed: false,
            }),
            changed,
        }
    }

    /// Read up to `buffer.len()` bytes, waiting until at least one byte is
    /// available. Returns 0 only when the cache is closed and empty;
    /// buffered bytes are still drained after `close`.
    pub async fn read(&self, buffer: &mut [u8]) -> usize {
        loop {
            let mut rx = self.changed.subscribe();
            {
                let mut state = self.lock();
                if state.bytes_cached() > 0 {
                    let count = state.copy_out(buffer);
                    drop(state);
                    self.bump();
                    return count;
                }
                if state.closed {
                    return 0;
                }
            }
            let _ = rx.changed().await;
        }
    }

    /// Write the whole of `buffer`, waiting while the cache is full.
    /// Returns `buffer.len()`, or 0 if the cache was closed mid-write.
    pub async fn write(&self, buffer: &[u8]) -> usize {
        let mut written = 0;
        while written < buffer.len() {
            let mut rx = self.changed.subscribe();
            {
                let mut state = self.lock();
                if state.closed {
                    return 0;
                }
                if state.bytes_free() > 0 {
                    written += state.copy_in(&buffer[written..]);
                    drop(state);
                    self.bump();
                    continue;
                }
            }
            let _ = rx.changed().await;
        }
        buffer.len()
    }

    /// Drop all buffered bytes and wake writers.
    pub fn clear(&self) {
        {
            let mut state = self.lock();
            state.read_pos = 0;
            state.write_pos = 0;
        }
        self.bump();
    }

    /// Close the cache, waking blocked readers and writers. The cache is
    /// unusable until [`reopen`](Self::reopen).
    pub fn close(&self) {
        self.lock().closed = true;
        self.bump();
    }

    pub fn closed(&self) -> bool {
        self.lock().closed
    }

    /// Return a closed cache to service, discarding any residual bytes.
    pub fn reopen(&self) {
        {
            let mut state = self.lock();
            state.read_pos = 0;
            state.write_pos = 0;
            state.closed = false;
        }
        self.bump();
    }

    pub fn bytes_cached(&self) -> usize {
        self.lock().bytes_cached()
    }

    pub fn bytes_free(&self) -> usize {
        self.lock().bytes_free()
    }

    /// Wait until the cache has fully drained or has been closed.
    pub async fn wait_until_empty_or_closed(&self) {
        loop {
            let mut rx = self.changed.subscribe();
            {
                let state = self.lock();
                if state.closed || state.bytes_cached() == 0 {
                    return;
                }
            }
            let _ = rx.changed().await;
        }
    }

    // Poisoning requires a panicked holder, which is a programmer error.
    #[allow(clippy::unwrap_used)]
    fn lock(&self) -> std::sync::MutexGuard<'_, CacheState> {
        self.state.lock().unwrap()
    }

    fn bump(&self) {
        self.changed.send_modify(|version| *version = version.wrapping_add(1));
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_write_then_read_round_trips() {
        let cache = IoCache::new(64);
        assert_eq!(cache.write(b"hello cache").await, 11);
        assert_eq!(cache.bytes_cached(), 11);

        let mut buffer = [0u8; 32];
        let count = cache.read(&mut buffer).await;
        assert_eq!(&buffer[..count], b"hello cache");
        assert_eq!(cache.bytes_free(), 64);
    }

    #[tokio::test]
    async fn test_wraparound_preserves_order() {
        let cache = IoCache::new(8);
        let mut buffer = [0u8; 8];
        // Advance the ring positions so the next write wraps.
        assert_eq!(cache.write(&[0, 1, 2, 3, 4, 5]).await, 6);
        assert_eq!(cache.read(&mut buffer[..6]).await, 6);
        assert_eq!(cache.write(&[6, 7, 8, 9, 10]).await, 5);
        assert_eq!(cache.read(&mut buffer).await, 5);
        assert_eq!(&buffer[..5], &[6, 7, 8, 9, 10]);
    }

    #[tokio::test]
    async fn test_concurrent_fifo_byte_for_byte() {
        let cache = Arc::new(IoCache::new(97));
        let source: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();

        let writer_cache = Arc::clone(&cache);
        let written = source.clone();
        let writer = tokio::spawn(async move {
            for chunk in written.chunks(331) {
                assert_ne!(writer_cache.write(chunk).await, 0);
            }
            writer_cache.close();
        });

        let mut received = Vec::new();
        let mut buffer = [0u8; 61];
        loop {
            let count = cache.read(&mut buffer).await;
            if count == 0 {
                break;
            }
            received.extend_from_slice(&buffer[..count]);
        }

        writer.await.unwrap();
        assert_eq!(received, source);
    }

    #[tokio::test]
    async fn test_close_unblocks_reader() {
        let cache = Arc::new(IoCache::new(16));
        let reader_cache = Arc::clone(&cache);
        let reader = tokio::spawn(async move {
            let mut buffer = [0u8; 4];
            reader_cache.read(&mut buffer).await
        });
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        cache.close();
        assert_eq!(reader.await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_close_unblocks_writer() {
        let cache = Arc::new(IoCache::new(4));
        assert_eq!(cache.write(&[1, 2, 3, 4]).await, 4);

        let writer_cache = Arc::clone(&cache);
        let writer = tokio::spawn(async move { writer_cache.write(&[5, 6, 7, 8]).await });
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        cache.close();
        assert_eq!(writer.await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_reads_drain_after_close() {
        let cache = IoCache::new(16);
        assert_eq!(cache.write(b"tail").await, 4);
        cache.close();

        let mut buffer = [0u8; 16];
        assert_eq!(cache.read(&mut buffer).await, 4);
        assert_eq!(&buffer[..4], b"tail");
        assert_eq!(cache.read(&mut buffer).await, 0);
    }

    #[tokio::test]
    async fn test_reopen_resets_state() {
        let cache = IoCache::new(16);
        assert_eq!(cache.write(b"stale").await, 5);
        cache.close();
        cache.reopen();

        assert!(!cache.closed());
        assert_eq!(cache.bytes_cached(), 0);
        assert_eq!(cache.write(b"fresh").await, 5);
        let mut buffer = [0u8; 8];
        assert_eq!(cache.read(&mut buffer).await, 5);
        assert_eq!(&buffer[..5], b"fresh");
    }

    #[tokio::test]
    async fn test_wait_until_empty_or_closed() {
        let cache = Arc::new(IoCache::new(16));
        assert_eq!(cache.write(b"pending").await, 7);

        let drainer_cache = Arc::clone(&cache);
        let drainer = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            let mut buffer = [0u8; 16];
            drainer_cache.read(&mut buffer).await
        });

        cache.wait_until_empty_or_closed().await;
        assert_eq!(cache.bytes_cached(), 0);
        assert_eq!(drainer.await.unwrap(), 7);
    }
}
