// SPDX-FileCopyrightText: © 2025 PackKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Cross-task write-then-read over the in-memory backing, exercising the
//! threaded-I/O wrapper end to end.

#![allow(clippy::unwrap_used)]

use packkit_file::{File, IoCache, MemoryFile, OpenMode, ThreadedIoFile};

const TOTAL_SIZE: usize = 1 << 20; // 1 MiB
const CHUNK_SIZE: usize = 4096;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_threaded_write_then_read_one_mebibyte() {
    let name = "threaded-one-mebibyte";
    let source: Vec<u8> = (0..TOTAL_SIZE as u32).map(|i| (i % 251) as u8).collect();

    // Writer task: 1 MiB in 4 KiB chunks through the output wrapper.
    let written = source.clone();
    let writer = tokio::spawn(async move {
        let inner = Box::new(MemoryFile::open(name, OpenMode::Write));
        let mut file = ThreadedIoFile::start_output(inner, 64 * 1024, 8 * 1024).await.unwrap();
        for chunk in written.chunks(CHUNK_SIZE) {
            assert_eq!(file.write(chunk).await.unwrap(), chunk.len());
        }
        Box::new(file).close().await.unwrap();
    });

    // The reader starts once the writer has closed; shared storage under
    // the same name then holds the full payload.
    writer.await.unwrap();

    let reader = tokio::spawn(async move {
        let inner = Box::new(MemoryFile::open(name, OpenMode::Read));
        let mut file = ThreadedIoFile::start_input(inner, 64 * 1024, 8 * 1024).await.unwrap();
        let mut received = Vec::with_capacity(TOTAL_SIZE);
        let mut buffer = vec![0u8; CHUNK_SIZE];
        loop {
            let count = file.read(&mut buffer).await.unwrap();
            if count == 0 {
                break;
            }
            received.extend_from_slice(&buffer[..count]);
        }
        Box::new(file).close().await.unwrap();
        received
    });

    let received = reader.await.unwrap();
    assert_eq!(received.len(), TOTAL_SIZE);
    assert_eq!(received, source);

    MemoryFile::delete(name);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_io_cache_pipes_between_tasks() {
    // A producer and consumer share only the cache; closing from the
    // producer side lets the consumer drain and finish.
    let cache = std::sync::Arc::new(IoCache::new(4096));
    let source: Vec<u8> = (0..TOTAL_SIZE as u32).map(|i| (i % 241) as u8).collect();

    let producer_cache = std::sync::Arc::clone(&cache);
    let produced = source.clone();
    let producer = tokio::spawn(async move {
        for chunk in produced.chunks(CHUNK_SIZE) {
            assert_ne!(producer_cache.write(chunk).await, 0);
        }
        producer_cache.close();
    });

    let mut received = Vec::with_capacity(TOTAL_SIZE);
    let mut buffer = vec![0u8; CHUNK_SIZE];
    loop {
        let count = cache.read(&mut buffer).await;
        if count == 0 {
            break;
        }
        received.extend_from_slice(&buffer[..count]);
    }

    producer.await.unwrap();
    assert_eq!(received, source);
}
