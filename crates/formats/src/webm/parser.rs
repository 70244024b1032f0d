// SPDX-FileCopyrightText: © 2025 PackKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! The generic EBML element walker.
//!
//! [`WebmListParser`] reads element headers (variable-length id and size),
//! dispatches primitive elements to the matching typed callback of a
//! [`WebmParserClient`], and recursively descends into lists. Unrecognized
//! ids are skipped by their declared size. The driver is restartable at
//! byte granularity: [`parse`](WebmListParser::parse) consumes what it can
//! and reports how far it got, so callers can feed partial buffers.
//!
//! Nested lists may be handled by a different client: `on_list_start`
//! returns a [`ClientRef`] naming either the same client or one of its
//! child slots, and the driver re-resolves the active client per event
//! through [`child_client`](WebmParserClient::child_client). The driver
//! owns the list stack; clients never hold references to each other.

use super::ids::{self, ElementType};
use packkit_core::{PackKitError, Result};

/// Which client receives the events of a sub-tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientRef {
    /// The client that received `on_list_start` keeps the sub-tree.
    This,
    /// Delegate to the child visitor in the given slot.
    Child(usize),
}

/// Typed callbacks a parse client implements. Returning `false` (or `None`
/// from `on_list_start`) fails the whole parse.
pub trait WebmParserClient {
    fn on_list_start(&mut self, id: u64) -> Option<ClientRef> {
        let _ = id;
        Some(ClientRef::This)
    }

    fn on_list_end(&mut self, id: u64) -> bool {
        let _ = id;
        true
    }

    fn on_uint(&mut self, id: u64, value: u64) -> bool {
        let _ = (id, value);
        true
    }

    fn on_float(&mut self, id: u64, value: f64) -> bool {
        let _ = (id, value);
        true
    }

    fn on_binary(&mut self, id: u64, data: &[u8]) -> bool {
        let _ = (id, data);
        true
    }

    fn on_string(&mut self, id: u64, value: &str) -> bool {
        let _ = (id, value);
        true
    }

    /// Resolve a child slot returned from `on_list_start`. Only clients
    /// that return `ClientRef::Child` need to implement this.
    fn child_client(&mut self, slot: usize) -> &mut dyn WebmParserClient {
        unreachable!("client has no child visitor in slot {slot}")
    }
}

/// Parse one element header. Returns `Ok(None)` when the buffer does not
/// yet hold the whole header. The element size is `None` for the reserved
/// all-ones "unknown size" encoding.
pub(crate) fn parse_element_header(buf: &[u8]) -> Result<Option<(u64, Option<u64>, usize)>> {
    let Some(&first) = buf.first() else { return Ok(None) };
    let id_length = match first {
        b if b & 0x80 != 0 => 1,
        b if b & 0x40 != 0 => 2,
        b if b & 0x20 != 0 => 3,
        b if b & 0x10 != 0 => 4,
        _ => {
            return Err(PackKitError::Parser(format!(
                "invalid element id starting with {first:#04x}"
            )));
        },
    };
    if buf.len() < id_length {
        return Ok(None);
    }
    let mut id: u64 = 0;
    for &byte in &buf[..id_length] {
        id = id << 8 | u64::from(byte);
    }

    let rest = &buf[id_length..];
    let Some(&size_first) = rest.first() else { return Ok(None) };
    let size_length = size_first.leading_zeros() as usize + 1;
    if size_length > 8 {
        return Err(PackKitError::Parser("invalid element size descriptor".to_string()));
    }
    if rest.len() < size_length {
        return Ok(None);
    }
    let mut size = u64::from(size_first) & (0xFF >> size_length);
    for &byte in &rest[1..size_length] {
        size = size << 8 | u64::from(byte);
    }
    let unknown_size = size == (1 << (7 * size_length)) - 1;
    Ok(Some((id, if unknown_size { None } else { Some(size) }, id_length + size_length)))
}

struct ListState {
    id: u64,
    /// Declared size in bytes; `None` only for the root list.
    size: Option<u64>,
    bytes_parsed: u64,
    /// Client-path length to restore when this list ends.
    path_len: usize,
}

/// Drives a [`WebmParserClient`] over one list element and its sub-tree.
pub struct WebmListParser {
    root_id: u64,
    stack: Vec<ListState>,
    client_path: Vec<usize>,
    done: bool,
    errored: bool,
}

impl WebmListParser {
    /// A parser expecting `root_id` as the outermost list.
    pub fn new(root_id: u64) -> Self {
        Self { root_id, stack: Vec::new(), client_path: Vec::new(), done: false, errored: false }
    }

    /// True once the root list has been fully parsed.
    pub fn is_parsing_complete(&self) -> bool {
        self.done
    }

    /// Make the parser ready to accept a new root list.
    pub fn reset(&mut self) {
        self.stack.clear();
        self.client_path.clear();
        self.done = false;
        self.errored = false;
    }

    /// Feed bytes. Returns how many bytes were consumed; 0 means more data
    /// is needed before progress can be made.
    pub fn parse(&mut self, client: &mut dyn WebmParserClient, buf: &[u8]) -> Result<usize> {
        if self.errored {
            return Err(PackKitError::Parser("parse called after a parse error".to_string()));
        }
        if self.done {
            return Err(PackKitError::Parser("parse called on a completed parser".to_string()));
        }

        let mut pos = 0;
        while pos < buf.len() && !self.done {
            if self.stack.is_empty() {
                let Some((id, size, header_length)) = self.checked(parse_element_header(&buf[pos..]))?
                else {
                    break;
                };
                if id != self.root_id {
                    return self.fail(format!(
                        "expected element {:#x}, found {id:#x}",
                        self.root_id
                    ));
                }
                pos += header_length;
                self.begin_list(client, id, size)?;
                continue;
            }

            let Some((id, size, header_length)) = self.checked(parse_element_header(&buf[pos..]))?
            else {
                break;
            };
            #[allow(clippy::unwrap_used)] // stack is non-empty on this path
            let list_id = self.stack.last().unwrap().id;

            // Void and CRC-32 filler elements may appear inside any list.
            let element_type = if id == ids::VOID || id == ids::CRC32 {
                None
            } else {
                ids::child_type(list_id, id)
            };

            match element_type {
                Some(ElementType::List) => {
                    if size.is_none() {
                        return self.fail(format!(
                            "nested list {id:#x} with unknown size is not supported"
                        ));
                    }
                    pos += header_length;
                    #[allow(clippy::unwrap_used)]
                    let top = self.stack.last_mut().unwrap();
                    top.bytes_parsed += header_length as u64;
                    self.begin_list(client, id, size)?;
                },
                Some(primitive) => {
                    let Some(element_size) = size else {
                        return self.fail(format!("element {id:#x} has unknown size"));
                    };
                    let total = header_length + element_size as usize;
                    if buf.len() - pos < total {
                        break; // need more data
                    }
                    let body = &buf[pos + header_length..pos + total];
                    self.dispatch(client, primitive, id, body)?;
                    pos += total;
                    self.account_bytes(client, total as u64)?;
                },
                None => {
                    #[allow(clippy::unwrap_used)]
                    let unknown_size_list = self.stack.last().unwrap().size.is_none();
                    if unknown_size_list {
                        // A non-child id terminates an unknown-size list.
                        // Do not consume the header; it belongs to whatever
                        // follows.
                        self.end_top_list(client)?;
                        continue;
                    }
                    let Some(element_size) = size else {
                        return self.fail(format!("unknown element {id:#x} with unknown size"));
                    };
                    let total = header_length + element_size as usize;
                    if buf.len() - pos < total {
                        break; // need the whole element to skip it
                    }
                    pos += total;
                    self.account_bytes(client, total as u64)?;
                },
            }
        }
        Ok(pos)
    }

    fn begin_list(
        &mut self,
        client: &mut dyn WebmParserClient,
        id: u64,
        size: Option<u64>,
    ) -> Result<()> {
        let path_len = self.client_path.len();
        let current = resolve(client, &self.client_path);
        match current.on_list_start(id) {
            Some(ClientRef::This) => {},
            Some(ClientRef::Child(slot)) => self.client_path.push(slot),
            None => return self.fail(format!("client rejected list {id:#x}")),
        }
        self.stack.push(ListState { id, size, bytes_parsed: 0, path_len });
        self.close_completed_lists(client)
    }

    fn dispatch(
        &mut self,
        client: &mut dyn WebmParserClient,
        element_type: ElementType,
        id: u64,
        body: &[u8],
    ) -> Result<()> {
        let current = resolve(client, &self.client_path);
        let accepted = match element_type {
            ElementType::Uint => match parse_uint(body) {
                Some(value) => current.on_uint(id, value),
                None => return self.fail(format!("bad unsigned integer element {id:#x}")),
            },
            ElementType::Float => match parse_float(body) {
                Some(value) => current.on_float(id, value),
                None => return self.fail(format!("bad float element {id:#x}")),
            },
            ElementType::Str => {
                // Trailing NULs are padding.
                let end = body.iter().position(|&b| b == 0).unwrap_or(body.len());
                match std::str::from_utf8(&body[..end]) {
                    Ok(value) => current.on_string(id, value),
                    Err(_) => return self.fail(format!("bad string element {id:#x}")),
                }
            },
            ElementType::Binary => current.on_binary(id, body),
            ElementType::List => unreachable!("lists are handled by begin_list"),
        };
        if accepted {
            Ok(())
        } else {
            self.fail(format!("client rejected element {id:#x}"))
        }
    }

    fn account_bytes(&mut self, client: &mut dyn WebmParserClient, count: u64) -> Result<()> {
        #[allow(clippy::unwrap_used)] // callers hold a non-empty stack
        let top = self.stack.last_mut().unwrap();
        top.bytes_parsed += count;
        self.close_completed_lists(client)
    }

    fn close_completed_lists(&mut self, client: &mut dyn WebmParserClient) -> Result<()> {
        while let Some(top) = self.stack.last() {
            let (id, bytes_parsed, size) = (top.id, top.bytes_parsed, top.size);
            match size {
                Some(size) if bytes_parsed == size => self.end_top_list(client)?,
                Some(size) if bytes_parsed > size => {
                    return self.fail(format!(
                        "children of list {id:#x} overflow its declared size"
                    ));
                },
                _ => break,
            }
        }
        Ok(())
    }

    fn end_top_list(&mut self, client: &mut dyn WebmParserClient) -> Result<()> {
        #[allow(clippy::unwrap_used)] // callers hold a non-empty stack
        let state = self.stack.pop().unwrap();
        self.client_path.truncate(state.path_len);
        if !resolve(client, &self.client_path).on_list_end(state.id) {
            return self.fail(format!("client rejected end of list {:#x}", state.id));
        }
        match self.stack.last_mut() {
            Some(parent) => {
                // Headers were accounted when the list began; only the body
                // size remains. Unknown-size lists can only be the root.
                parent.bytes_parsed += state.size.unwrap_or(0);
            },
            None => self.done = true,
        }
        Ok(())
    }

    fn checked<T>(&mut self, result: Result<T>) -> Result<T> {
        if result.is_err() {
            self.errored = true;
        }
        result
    }

    fn fail<T>(&mut self, message: String) -> Result<T> {
        self.errored = true;
        tracing::debug!("webm parse failure: {message}");
        Err(PackKitError::Parser(message))
    }
}

fn resolve<'a>(
    client: &'a mut dyn WebmParserClient,
    path: &[usize],
) -> &'a mut dyn WebmParserClient {
    let mut current = client;
    for &slot in path {
        current = current.child_client(slot);
    }
    current
}

fn parse_uint(body: &[u8]) -> Option<u64> {
    if body.is_empty() || body.len() > 8 {
        return None;
    }
    let mut value: u64 = 0;
    for &byte in body {
        value = value << 8 | u64::from(byte);
    }
    Some(value)
}

fn parse_float(body: &[u8]) -> Option<f64> {
    match body.len() {
        4 => {
            let mut bytes = [0u8; 4];
            bytes.copy_from_slice(body);
            Some(f64::from(f32::from_be_bytes(bytes)))
        },
        8 => {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(body);
            Some(f64::from_be_bytes(bytes))
        },
        _ => None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::super::ids;
    use super::*;

    /// Records each callback in document order.
    #[derive(Default)]
    struct RecordingClient {
        events: Vec<String>,
        reject_uint_id: Option<u64>,
    }

    impl WebmParserClient for RecordingClient {
        fn on_list_start(&mut self, id: u64) -> Option<ClientRef> {
            self.events.push(format!("start {id:#x}"));
            Some(ClientRef::This)
        }

        fn on_list_end(&mut self, id: u64) -> bool {
            self.events.push(format!("end {id:#x}"));
            true
        }

        fn on_uint(&mut self, id: u64, value: u64) -> bool {
            self.events.push(format!("uint {id:#x}={value}"));
            self.reject_uint_id != Some(id)
        }

        fn on_float(&mut self, id: u64, value: f64) -> bool {
            self.events.push(format!("float {id:#x}={value}"));
            true
        }

        fn on_binary(&mut self, id: u64, data: &[u8]) -> bool {
            self.events.push(format!("binary {id:#x} len={}", data.len()));
            true
        }

        fn on_string(&mut self, id: u64, value: &str) -> bool {
            self.events.push(format!("string {id:#x}={value}"));
            true
        }
    }

    // Info element with TimecodeScale (uint), Duration (4-byte float) and
    // MuxingApp (string).
    fn info_fixture() -> Vec<u8> {
        let mut info = vec![
            0x15, 0x49, 0xA9, 0x66, 0x93, // Info, size 19
            0x2A, 0xD7, 0xB1, 0x83, 0x0F, 0x42, 0x40, // TimecodeScale = 1000000
            0x44, 0x89, 0x84, 0x45, 0x7A, 0x30, 0x00, // Duration = 4003.0f
        ];
        info.extend_from_slice(&[0x4D, 0x80, 0x82, b'p', b'k']); // MuxingApp = "pk"
        info
    }

    #[test]
    fn test_typed_dispatch_in_document_order() {
        let mut client = RecordingClient::default();
        let mut parser = WebmListParser::new(ids::INFO);
        let buf = info_fixture();

        let consumed = parser.parse(&mut client, &buf).unwrap();
        assert_eq!(consumed, buf.len());
        assert!(parser.is_parsing_complete());
        assert_eq!(
            client.events,
            vec![
                "start 0x1549a966".to_string(),
                "uint 0x2ad7b1=1000000".to_string(),
                "float 0x4489=4003".to_string(),
                "string 0x4d80=pk".to_string(),
                "end 0x1549a966".to_string(),
            ]
        );
    }

    #[test]
    fn test_restartable_at_byte_granularity() {
        let mut client = RecordingClient::default();
        let mut parser = WebmListParser::new(ids::INFO);
        let buf = info_fixture();

        let mut offset = 0;
        for end in 1..=buf.len() {
            offset += parser.parse(&mut client, &buf[offset..end]).unwrap();
        }
        assert_eq!(offset, buf.len());
        assert!(parser.is_parsing_complete());
        assert_eq!(client.events.len(), 5);
    }

    #[test]
    fn test_unknown_elements_are_skipped() {
        let mut client = RecordingClient::default();
        let mut parser = WebmListParser::new(ids::INFO);
        let buf = vec![
            0x15, 0x49, 0xA9, 0x66, 0x8D, // Info, size 13
            0xEC, 0x82, 0x00, 0x00, // Void, size 2
            0x2A, 0xD7, 0xB1, 0x81, 0x01, // TimecodeScale = 1
            0xBF, 0x82, 0xAA, 0xBB, // CRC-32, size 2
        ];

        let consumed = parser.parse(&mut client, &buf).unwrap();
        assert_eq!(consumed, buf.len());
        assert!(parser.is_parsing_complete());
        assert_eq!(
            client.events,
            vec![
                "start 0x1549a966".to_string(),
                "uint 0x2ad7b1=1".to_string(),
                "end 0x1549a966".to_string(),
            ]
        );
    }

    #[test]
    fn test_client_rejection_fails_the_parse() {
        let mut client =
            RecordingClient { reject_uint_id: Some(ids::TIMECODE_SCALE), ..Default::default() };
        let mut parser = WebmListParser::new(ids::INFO);
        let buf = info_fixture();

        assert!(matches!(
            parser.parse(&mut client, &buf),
            Err(PackKitError::Parser(_))
        ));
        // The parser stays failed until reset.
        assert!(parser.parse(&mut client, &buf).is_err());
        parser.reset();
        let mut accepting = RecordingClient::default();
        assert_eq!(parser.parse(&mut accepting, &buf).unwrap(), buf.len());
    }

    #[test]
    fn test_wrong_root_id_fails() {
        let mut client = RecordingClient::default();
        let mut parser = WebmListParser::new(ids::TRACKS);
        assert!(parser.parse(&mut client, &info_fixture()).is_err());
    }

    #[test]
    fn test_unknown_size_root_ends_on_foreign_id() {
        let mut client = RecordingClient::default();
        let mut parser = WebmListParser::new(ids::CLUSTER);
        let buf = vec![
            0x1F, 0x43, 0xB6, 0x75, 0xFF, // Cluster, unknown size
            0xE7, 0x81, 0x05, // Timecode = 5
            0x1F, 0x43, 0xB6, 0x75, 0xFF, // next Cluster terminates the first
        ];

        let consumed = parser.parse(&mut client, &buf).unwrap();
        // The second cluster header is left unconsumed.
        assert_eq!(consumed, 8);
        assert!(parser.is_parsing_complete());
        assert_eq!(
            client.events,
            vec![
                "start 0x1f43b675".to_string(),
                "uint 0xe7=5".to_string(),
                "end 0x1f43b675".to_string(),
            ]
        );
    }

    #[test]
    fn test_element_header_parsing() {
        // 4-byte id, 1-byte size.
        let (id, size, len) = parse_element_header(&[0x1A, 0x45, 0xDF, 0xA3, 0x83])
            .unwrap()
            .unwrap();
        assert_eq!((id, size, len), (ids::EBML_HEADER, Some(3), 5));

        // 2-byte size with the marker stripped.
        let (_, size, len) = parse_element_header(&[0xE7, 0x40, 0x00]).unwrap().unwrap();
        assert_eq!((size, len), (Some(0), 3));

        // All-ones size means unknown.
        let (_, size, _) = parse_element_header(&[0xA0, 0xFF]).unwrap().unwrap();
        assert_eq!(size, None);

        // Incomplete headers ask for more data.
        assert_eq!(parse_element_header(&[0x1A, 0x45]).unwrap(), None);
        assert_eq!(parse_element_header(&[0xE7]).unwrap(), None);

        // A zero lead byte is not a valid id.
        assert!(parse_element_header(&[0x00, 0x00]).is_err());
    }
}
