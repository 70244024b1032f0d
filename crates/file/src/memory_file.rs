// SPDX-FileCopyrightText: © 2025 PackKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! In-memory files backed by a process-wide registry, keyed by name.
//!
//! Handles opened under the same name share storage, which lets one task
//! write a `memory://` file while another reads it back. Deleting a name
//! removes the underlying vector; handles that are still open keep the old
//! storage and observe stale data (documented undefined behavior, matching
//! the original design).

use crate::file::{File, OpenMode};
use async_trait::async_trait;
use packkit_core::{PackKitError, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

type Storage = Arc<Mutex<Vec<u8>>>;

fn file_system() -> &'static Mutex<HashMap<String, Storage>> {
    static FILE_SYSTEM: OnceLock<Mutex<HashMap<String, Storage>>> = OnceLock::new();
    FILE_SYSTEM.get_or_init(|| Mutex::new(HashMap::new()))
}

// Poisoning requires a panicked holder, which is a programmer error.
#[allow(clippy::unwrap_used)]
fn lock_file_system() -> std::sync::MutexGuard<'static, HashMap<String, Storage>> {
    file_system().lock().unwrap()
}

pub struct MemoryFile {
    file_name: String,
    storage: Storage,
    position: u64,
}

impl MemoryFile {
    /// Open (creating on demand) the in-memory file under `file_name`.
    /// Write mode truncates existing content; append positions at the end.
    pub fn open(file_name: &str, mode: OpenMode) -> Self {
        let storage = lock_file_system()
            .entry(file_name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Vec::new())))
            .clone();
        let position = {
            let mut bytes = lock_storage(&storage);
            match mode {
                OpenMode::Write => {
                    bytes.clear();
                    0
                },
                OpenMode::Append => bytes.len() as u64,
                OpenMode::Read => 0,
            }
        };
        Self { file_name: file_name.to_string(), storage, position }
    }

    /// Remove the storage under `file_name`.
    pub fn delete(file_name: &str) {
        lock_file_system().remove(file_name);
    }

    /// Remove every in-memory file. Test teardown helper.
    pub fn delete_all() {
        lock_file_system().clear();
    }
}

#[allow(clippy::unwrap_used)]
fn lock_storage(storage: &Storage) -> std::sync::MutexGuard<'_, Vec<u8>> {
    storage.lock().unwrap()
}

#[async_trait]
impl File for MemoryFile {
    fn file_name(&self) -> &str {
        &self.file_name
    }

    async fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        let bytes = lock_storage(&self.storage);
        let size = bytes.len() as u64;
        if self.position >= size {
            return Ok(0);
        }
        let start = self.position as usize;
        let count = buffer.len().min(bytes.len() - start);
        buffer[..count].copy_from_slice(&bytes[start..start + count]);
        self.position += count as u64;
        Ok(count)
    }

    async fn write(&mut self, buffer: &[u8]) -> Result<usize> {
        let mut bytes = lock_storage(&self.storage);
        let end = self.position as usize + buffer.len();
        if bytes.len() < end {
            bytes.resize(end, 0);
        }
        let start = self.position as usize;
        bytes[start..end].copy_from_slice(buffer);
        self.position += buffer.len() as u64;
        Ok(buffer.len())
    }

    async fn size(&mut self) -> Result<u64> {
        Ok(lock_storage(&self.storage).len() as u64)
    }

    async fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    async fn seek(&mut self, position: u64) -> Result<()> {
        if position > lock_storage(&self.storage).len() as u64 {
            return Err(PackKitError::File(format!(
                "seek past end of memory file '{}'",
                self.file_name
            )));
        }
        self.position = position;
        Ok(())
    }

    async fn tell(&mut self) -> Result<u64> {
        Ok(self.position)
    }

    async fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
