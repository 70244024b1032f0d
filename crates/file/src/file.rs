// SPDX-FileCopyrightText: © 2025 PackKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! The `File` trait, the URL-scheme registry, and the factory functions.

use crate::local_file::LocalFile;
use crate::memory_file::MemoryFile;
use crate::threaded_file::ThreadedIoFile;
use crate::udp_file::UdpFile;
use async_trait::async_trait;
use futures::future::BoxFuture;
use packkit_core::{PackKitError, Result};
use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

pub const LOCAL_FILE_PREFIX: &str = "file://";
pub const UDP_FILE_PREFIX: &str = "udp://";
pub const MEMORY_FILE_PREFIX: &str = "memory://";

/// Size of the threaded I/O cache, in bytes.
pub const DEFAULT_IO_CACHE_SIZE: usize = 32 << 20;
/// Size of the block used for threaded I/O reads/writes, in bytes.
pub const DEFAULT_IO_BLOCK_SIZE: usize = 2 << 20;

/// An open byte-oriented file.
///
/// A handle is obtained from [`open`] and released with exactly one
/// [`close`](File::close); consuming `self` makes use-after-close
/// unrepresentable.
#[async_trait]
pub trait File: Send {
    /// The name this file was opened with, scheme prefix stripped.
    fn file_name(&self) -> &str;

    /// Read up to `buffer.len()` bytes. Returns `Ok(0)` at end of file.
    async fn read(&mut self, buffer: &mut [u8]) -> Result<usize>;

    /// Write the whole of `buffer`. On success the return value equals
    /// `buffer.len()`.
    async fn write(&mut self, buffer: &[u8]) -> Result<usize>;

    /// Current size in bytes. Unbounded sources report `u64::MAX`.
    async fn size(&mut self) -> Result<u64>;

    /// Push buffered data to the OS. Does not imply fsync.
    async fn flush(&mut self) -> Result<()>;

    /// Seek to an absolute position. Non-seekable backings fail.
    async fn seek(&mut self, position: u64) -> Result<()>;

    /// Current position. Non-seekable backings fail.
    async fn tell(&mut self) -> Result<u64>;

    /// Flush and release resources. For writable files an error may
    /// indicate data loss.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Mode requested at open time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    Write,
    Append,
}

type OpenFn = fn(String, OpenMode) -> BoxFuture<'static, Result<Box<dyn File>>>;
type DeleteFn = fn(String) -> BoxFuture<'static, Result<()>>;

/// Constructor and deleter for one URL scheme. The callbacks receive the
/// file name with the scheme prefix already stripped.
#[derive(Clone, Copy)]
pub struct SchemeHandler {
    pub open: OpenFn,
    pub delete: Option<DeleteFn>,
}

fn registry() -> &'static Mutex<HashMap<&'static str, SchemeHandler>> {
    static REGISTRY: OnceLock<Mutex<HashMap<&'static str, SchemeHandler>>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut map: HashMap<&'static str, SchemeHandler> = HashMap::new();
        map.insert(
            LOCAL_FILE_PREFIX,
            SchemeHandler { open: open_local, delete: Some(delete_local) },
        );
        map.insert(UDP_FILE_PREFIX, SchemeHandler { open: open_udp, delete: None });
        map.insert(
            MEMORY_FILE_PREFIX,
            SchemeHandler { open: open_memory, delete: Some(delete_memory) },
        );
        Mutex::new(map)
    })
}

fn open_local(file_name: String, mode: OpenMode) -> BoxFuture<'static, Result<Box<dyn File>>> {
    Box::pin(async move {
        Ok(Box::new(LocalFile::open(&file_name, mode).await?) as Box<dyn File>)
    })
}

fn delete_local(file_name: String) -> BoxFuture<'static, Result<()>> {
    Box::pin(async move {
        tokio::fs::remove_file(&file_name).await?;
        Ok(())
    })
}

fn open_udp(file_name: String, mode: OpenMode) -> BoxFuture<'static, Result<Box<dyn File>>> {
    Box::pin(async move {
        if mode != OpenMode::Read {
            return Err(PackKitError::InvalidArgument(
                "udp files only support read (receive) mode".to_string(),
            ));
        }
        Ok(Box::new(UdpFile::open(&file_name).await?) as Box<dyn File>)
    })
}

fn open_memory(file_name: String, mode: OpenMode) -> BoxFuture<'static, Result<Box<dyn File>>> {
    Box::pin(async move { Ok(Box::new(MemoryFile::open(&file_name, mode)) as Box<dyn File>) })
}

fn delete_memory(file_name: String) -> BoxFuture<'static, Result<()>> {
    Box::pin(async move {
        MemoryFile::delete(&file_name);
        Ok(())
    })
}

/// Register (or replace) the handler for a scheme prefix such as
/// `"memory://"`. Intended for tests and embedders with custom transports.
pub fn register_scheme(prefix: &'static str, handler: SchemeHandler) {
    lock_registry().insert(prefix, handler);
}

/// Remove the handler for a scheme prefix. Built-in schemes can be
/// deregistered too; tests must restore what they remove.
pub fn unregister_scheme(prefix: &str) {
    lock_registry().remove(prefix);
}

// Poisoning requires a panicked holder, which is a programmer error.
#[allow(clippy::unwrap_used)]
fn lock_registry() -> std::sync::MutexGuard<'static, HashMap<&'static str, SchemeHandler>> {
    registry().lock().unwrap()
}

fn resolve(file_name: &str) -> Result<(SchemeHandler, String)> {
    let handlers = lock_registry();
    for (prefix, handler) in handlers.iter() {
        if let Some(rest) = file_name.strip_prefix(prefix) {
            return Ok((*handler, rest.to_string()));
        }
    }
    // No scheme prefix: assume a local file.
    let handler = handlers.get(LOCAL_FILE_PREFIX).copied().ok_or_else(|| {
        PackKitError::File(format!("no scheme handler available for '{file_name}'"))
    })?;
    Ok((handler, file_name.to_string()))
}

async fn create_internal(file_name: &str, mode: OpenMode) -> Result<Box<dyn File>> {
    let (handler, rest) = resolve(file_name)?;
    (handler.open)(rest, mode).await
}

/// Open a file, selecting the backing by scheme prefix. Seekable
/// read/write/append opens are wrapped with the threaded-I/O cache;
/// `memory://` backings bypass the wrapper.
pub async fn open(file_name: &str, mode: OpenMode) -> Result<Box<dyn File>> {
    open_with_cache(file_name, mode, DEFAULT_IO_CACHE_SIZE, DEFAULT_IO_BLOCK_SIZE).await
}

/// [`open`] with explicit cache sizing. A zero `io_cache_size` disables the
/// threaded-I/O wrapper entirely.
pub async fn open_with_cache(
    file_name: &str,
    mode: OpenMode,
    io_cache_size: usize,
    io_block_size: usize,
) -> Result<Box<dyn File>> {
    let internal = create_internal(file_name, mode).await?;

    // Memory files are already as fast as the cache would be.
    if file_name.starts_with(MEMORY_FILE_PREFIX) || io_cache_size == 0 {
        return Ok(internal);
    }

    let wrapped = match mode {
        OpenMode::Read => {
            ThreadedIoFile::start_input(internal, io_cache_size, io_block_size).await?
        },
        OpenMode::Write | OpenMode::Append => {
            ThreadedIoFile::start_output(internal, io_cache_size, io_block_size).await?
        },
    };
    Ok(Box::new(wrapped))
}

/// Open a file in direct-access mode, without the threaded-I/O wrapper.
pub async fn open_with_no_buffering(file_name: &str, mode: OpenMode) -> Result<Box<dyn File>> {
    create_internal(file_name, mode).await
}

/// Delete a file through its scheme's delete handler.
pub async fn delete(file_name: &str) -> Result<()> {
    let (handler, rest) = resolve(file_name)?;
    match handler.delete {
        Some(delete_fn) => delete_fn(rest).await,
        None => Err(PackKitError::File(format!("'{file_name}' does not support deletion"))),
    }
}

/// Size of a file in bytes. The file is opened and closed in the process.
pub async fn get_file_size(file_name: &str) -> Result<u64> {
    let mut file = open_with_no_buffering(file_name, OpenMode::Read).await?;
    let size = file.size().await;
    file.close().await?;
    size
}

/// Read the whole of a file into memory.
pub async fn read_file_to_end(file_name: &str) -> Result<Vec<u8>> {
    let mut file = open_with_no_buffering(file_name, OpenMode::Read).await?;
    let mut contents = Vec::new();
    let mut buffer = vec![0u8; 0x40000];
    loop {
        let count = file.read(&mut buffer).await?;
        if count == 0 {
            break;
        }
        contents.extend_from_slice(&buffer[..count]);
    }
    file.close().await?;
    Ok(contents)
}

/// Write `contents` to a file, replacing what was there. Test convenience.
pub async fn write_to_file(file_name: &str, contents: &[u8]) -> Result<()> {
    let mut file = open_with_no_buffering(file_name, OpenMode::Write).await?;
    file.write(contents).await?;
    file.close().await
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_round_trip_memory_scheme() {
        let name = "memory://file-factory-round-trip";
        write_to_file(name, b"abc 123").await.unwrap();
        assert_eq!(read_file_to_end(name).await.unwrap(), b"abc 123");
        assert_eq!(get_file_size(name).await.unwrap(), 7);
        delete(name).await.unwrap();
    }

    #[tokio::test]
    async fn test_round_trip_local_scheme() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roundtrip.bin");
        let name = format!("file://{}", path.display());

        let mut file = open(&name, OpenMode::Write).await.unwrap();
        file.write(b"local bytes").await.unwrap();
        file.close().await.unwrap();

        assert_eq!(read_file_to_end(&name).await.unwrap(), b"local bytes");
        assert_eq!(get_file_size(&name).await.unwrap(), 11);

        // Bare paths (no scheme) hit the same backing.
        let bare = path.display().to_string();
        assert_eq!(read_file_to_end(&bare).await.unwrap(), b"local bytes");

        delete(&name).await.unwrap();
        assert!(read_file_to_end(&name).await.is_err());
    }

    #[tokio::test]
    async fn test_append_mode_appends() {
        let dir = tempfile::tempdir().unwrap();
        let name = format!("file://{}", dir.path().join("log.txt").display());

        write_to_file(&name, b"one").await.unwrap();
        let mut file = open_with_no_buffering(&name, OpenMode::Append).await.unwrap();
        file.write(b" two").await.unwrap();
        file.close().await.unwrap();

        assert_eq!(read_file_to_end(&name).await.unwrap(), b"one two");
    }

    #[tokio::test]
    async fn test_udp_rejects_write_mode() {
        let result = open("udp://127.0.0.1:9999", OpenMode::Write).await;
        assert!(matches!(result, Err(PackKitError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_scheme_registration_round_trip() {
        // A custom scheme resolves through the registry, and is gone again
        // after deregistration.
        fn open_nowhere(
            _file_name: String,
            _mode: OpenMode,
        ) -> futures::future::BoxFuture<'static, Result<Box<dyn File>>> {
            Box::pin(async { Err(PackKitError::File("nowhere is not openable".to_string())) })
        }

        register_scheme("nowhere://", SchemeHandler { open: open_nowhere, delete: None });
        let err = match open("nowhere://x", OpenMode::Read).await {
            Err(e) => e,
            Ok(_) => panic!("expected error"),
        };
        assert!(matches!(err, PackKitError::File(_)));

        unregister_scheme("nowhere://");
        // Without the handler the name falls back to the local backing.
        assert!(open("nowhere://x", OpenMode::Read).await.is_err());
    }
}
