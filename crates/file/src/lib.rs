// SPDX-FileCopyrightText: © 2025 PackKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! PackKit File - The byte-oriented I/O substrate.
//!
//! Every parser and writer in PackKit goes through the [`File`] trait so it
//! can run against local files, in-memory storage (tests), or a UDP
//! receiver, selected by URL scheme:
//!
//! - `file://path` or a bare `path` - local filesystem
//! - `memory://key` - process-wide in-memory registry
//! - `udp://ip:port[?reuse=0|1&interface=ip&timeout=us]` - UDP receive
//!
//! Seekable read/write opens are decorated with a background I/O task and a
//! bounded [`IoCache`] so compute never waits on the kernel, only on the
//! cache.

pub mod file;
pub mod io_cache;
pub mod local_file;
pub mod memory_file;
pub mod threaded_file;
pub mod udp_file;
pub mod udp_options;

pub use file::{
    delete, get_file_size, open, open_with_no_buffering, read_file_to_end, register_scheme,
    unregister_scheme, write_to_file, File, OpenMode, SchemeHandler, DEFAULT_IO_BLOCK_SIZE,
    DEFAULT_IO_CACHE_SIZE, LOCAL_FILE_PREFIX, MEMORY_FILE_PREFIX, UDP_FILE_PREFIX,
};
pub use io_cache::IoCache;
pub use local_file::LocalFile;
pub use memory_file::MemoryFile;
pub use threaded_file::ThreadedIoFile;
pub use udp_file::UdpFile;
pub use udp_options::UdpOptions;
