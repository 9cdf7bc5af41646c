//! Captured request records.
//!
//! A record is the full parameter tuple of one intercepted outbound call,
//! persisted the first time the anchor request is seen and substituted into
//! matching calls ever after.
//!
//! On-disk format, newline-delimited fields in fixed order:
//!
//! ```text
//! request_id
//! operation_type
//! five business integers, one per line
//! record_time as 1 or 0
//! then for each of the three string slots:
//!   byte length on its own line
//!   that many raw bytes followed by a newline (omitted when empty)
//! ```
//!
//! Deliberately not a structured serialization format: the file has to stay
//! byte-compatible with records written by earlier builds of the agent.

use crate::domain::StoreError;
use log::{debug, info};
use std::fs;
use std::path::Path;
use std::str;

/// Upper bound on a persisted string slot; anything claiming more is a
/// corrupt record.
const MAX_STRING_LEN: usize = 100_000;

/// Full parameter tuple of one outbound call.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RequestRecord {
    pub request_id: i32,
    pub operation_type: i32,
    pub business_args: [i32; 5],
    /// Payload, session and routing strings. `None` stands for the null
    /// pointer the host sometimes passes.
    pub string_args: [Option<String>; 3],
    pub record_time: bool,
}

impl RequestRecord {
    /// Write the record to `path`, creating parent directories as needed.
    ///
    /// # Errors
    /// Propagates I/O failures; the caller logs and forwards the original
    /// call unchanged.
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut out: Vec<u8> = Vec::new();
        for n in [
            self.request_id,
            self.operation_type,
            self.business_args[0],
            self.business_args[1],
            self.business_args[2],
            self.business_args[3],
            self.business_args[4],
            i32::from(self.record_time),
        ] {
            out.extend_from_slice(n.to_string().as_bytes());
            out.push(b'\n');
        }

        for slot in &self.string_args {
            let s = slot.as_deref().unwrap_or("");
            out.extend_from_slice(s.len().to_string().as_bytes());
            out.push(b'\n');
            if !s.is_empty() {
                out.extend_from_slice(s.as_bytes());
                out.push(b'\n');
            }
        }

        fs::write(path, out)?;
        info!("request record saved: {}", path.display());
        Ok(())
    }

    /// Load a record from `path`.
    ///
    /// # Errors
    /// I/O failure, truncation, or a string slot claiming an absurd length
    /// all fail the load; the caller falls back to the original parameters.
    pub fn load(path: &Path) -> Result<RequestRecord, StoreError> {
        let data = fs::read(path)?;
        let mut cursor = Cursor { data: &data, pos: 0 };

        let request_id = cursor.int_line("request_id")?;
        let operation_type = cursor.int_line("operation_type")?;
        let mut business_args = [0i32; 5];
        for (i, slot) in business_args.iter_mut().enumerate() {
            *slot = cursor.int_line(&format!("business_args[{i}]"))?;
        }
        let record_time = cursor.int_line("record_time")? != 0;

        let mut string_args: [Option<String>; 3] = [None, None, None];
        for (i, slot) in string_args.iter_mut().enumerate() {
            let len = cursor.len_line(&format!("string_args[{i}]"))?;
            if len == 0 {
                continue;
            }
            let bytes = cursor.take(len)?;
            let text = str::from_utf8(bytes)
                .map_err(|e| StoreError::Malformed(format!("string_args[{i}]: {e}")))?;
            *slot = Some(text.to_string());
            cursor.skip_newline();
        }

        debug!("request record loaded: {}", path.display());
        Ok(RequestRecord { request_id, operation_type, business_args, string_args, record_time })
    }
}

/// Minimal parser over the raw record bytes. Length-prefixed payloads may
/// contain newlines, so the usual lines() iterator does not fit.
struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn line(&mut self, field: &str) -> Result<&'a str, StoreError> {
        if self.pos >= self.data.len() {
            return Err(StoreError::Malformed(format!("truncated before {field}")));
        }
        let rest = &self.data[self.pos..];
        let end = rest.iter().position(|&b| b == b'\n').unwrap_or(rest.len());
        let raw = &rest[..end];
        self.pos += end + 1;
        str::from_utf8(raw)
            .map(str::trim_end)
            .map_err(|e| StoreError::Malformed(format!("{field}: {e}")))
    }

    fn int_line(&mut self, field: &str) -> Result<i32, StoreError> {
        let text = self.line(field)?;
        text.parse::<i32>().map_err(|e| StoreError::Malformed(format!("{field} '{text}': {e}")))
    }

    fn len_line(&mut self, field: &str) -> Result<usize, StoreError> {
        let text = self.line(field)?;
        let len = text
            .parse::<usize>()
            .map_err(|e| StoreError::Malformed(format!("{field} length '{text}': {e}")))?;
        if len >= MAX_STRING_LEN {
            return Err(StoreError::Malformed(format!("{field} claims {len} bytes")));
        }
        Ok(len)
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], StoreError> {
        if self.pos + n > self.data.len() {
            return Err(StoreError::Malformed(format!(
                "expected {n} bytes, {} remain",
                self.data.len() - self.pos
            )));
        }
        let bytes = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    fn skip_newline(&mut self) {
        if self.data.get(self.pos) == Some(&b'\n') {
            self.pos += 1;
        }
    }
}
