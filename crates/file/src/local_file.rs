// SPDX-FileCopyrightText: © 2025 PackKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Local filesystem backing - a thin wrapper over `tokio::fs::File`.

use crate::file::{File, OpenMode};
use async_trait::async_trait;
use packkit_core::Result;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

pub struct LocalFile {
    file_name: String,
    file: tokio::fs::File,
}

impl LocalFile {
    /// Open a local file. Write mode truncates; append mode creates the
    /// file when absent and positions at the end.
    pub async fn open(file_name: &str, mode: OpenMode) -> Result<Self> {
        let mut options = OpenOptions::new();
        match mode {
            OpenMode::Read => options.read(true),
            OpenMode::Write => options.write(true).create(true).truncate(true),
            OpenMode::Append => options.append(true).create(true),
        };
        let file = options.open(file_name).await?;
        Ok(Self { file_name: file_name.to_string(), file })
    }
}

#[async_trait]
impl File for LocalFile {
    fn file_name(&self) -> &str {
        &self.file_name
    }

    async fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        Ok(self.file.read(buffer).await?)
    }

    async fn write(&mut self, buffer: &[u8]) -> Result<usize> {
        self.file.write_all(buffer).await?;
        Ok(buffer.len())
    }

    async fn size(&mut self) -> Result<u64> {
        Ok(self.file.metadata().await?.len())
    }

    async fn flush(&mut self) -> Result<()> {
        Ok(self.file.flush().await?)
    }

    async fn seek(&mut self, position: u64) -> Result<()> {
        self.file.seek(std::io::SeekFrom::Start(position)).await?;
        Ok(())
    }

    async fn tell(&mut self) -> Result<u64> {
        Ok(self.file.stream_position().await?)
    }

    async fn close(mut self: Box<Self>) -> Result<()> {
        self.file.flush().await?;
        Ok(())
    }
}
