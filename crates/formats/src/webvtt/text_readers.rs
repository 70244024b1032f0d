// SPDX-FileCopyrightText: © 2025 PackKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Incremental line and block readers over pushed byte chunks.

/// Splits pushed bytes into lines, handling LF, CR and CRLF endings across
/// chunk boundaries.
#[derive(Default)]
pub struct LineReader {
    buffer: Vec<u8>,
    should_flush: bool,
}

impl LineReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append data to the end of the buffer.
    pub fn push_data(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
        self.should_flush = false;
    }

    /// Indicates no more data is coming: a trailing unterminated line is
    /// returned by the next call.
    pub fn flush(&mut self) {
        self.should_flush = true;
    }

    /// Read the next line, without its terminator.
    pub fn next(&mut self) -> Option<String> {
        let terminator = self.buffer.iter().position(|&b| b == b'\n' || b == b'\r');
        let (line_end, next_start) = match terminator {
            Some(i) if self.buffer[i] == b'\r' => {
                if i + 1 < self.buffer.len() {
                    (i, if self.buffer[i + 1] == b'\n' { i + 2 } else { i + 1 })
                } else if self.should_flush {
                    (i, i + 1)
                } else {
                    // The CR may be half of a CRLF pair; wait for more data.
                    return None;
                }
            },
            Some(i) => (i, i + 1),
            None if self.should_flush && !self.buffer.is_empty() => {
                (self.buffer.len(), self.buffer.len())
            },
            None => return None,
        };

        let line = String::from_utf8_lossy(&self.buffer[..line_end]).into_owned();
        self.buffer.drain(..next_start);
        Some(line)
    }
}

/// Groups lines into blank-line-delimited blocks.
#[derive(Default)]
pub struct BlockReader {
    source: LineReader,
    temp: Vec<String>,
    should_flush: bool,
}

impl BlockReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_data(&mut self, data: &[u8]) {
        self.source.push_data(data);
        self.should_flush = false;
    }

    pub fn flush(&mut self) {
        self.source.flush();
        self.should_flush = true;
    }

    /// Read the next block of consecutive non-blank lines.
    pub fn next(&mut self) -> Option<Vec<String>> {
        let mut complete = false;
        while let Some(line) = self.source.next() {
            if line.trim().is_empty() {
                if !self.temp.is_empty() {
                    complete = true;
                    break;
                }
                continue;
            }
            self.temp.push(line);
        }

        if !complete && self.should_flush && !self.temp.is_empty() {
            complete = true;
        }
        if complete {
            Some(std::mem::take(&mut self.temp))
        } else {
            None
        }
    }
}
