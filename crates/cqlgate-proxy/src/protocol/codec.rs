//! Primitive body notations: `[short]`, `[string]`, `[bytes]`, maps and lists.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::WireError;

/// Cursor over a frame body.
#[derive(Debug, Clone)]
pub struct BodyReader {
    buf: Bytes,
}

impl BodyReader {
    pub fn new(buf: Bytes) -> Self {
        Self { buf }
    }

    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn need(&self, n: usize, what: &'static str) -> Result<(), WireError> {
        if self.buf.remaining() < n {
            Err(WireError::Truncated(what))
        } else {
            Ok(())
        }
    }

    pub fn read_u8(&mut self) -> Result<u8, WireError> {
        self.need(1, "byte")?;
        Ok(self.buf.get_u8())
    }

    pub fn read_short(&mut self) -> Result<u16, WireError> {
        self.need(2, "short")?;
        Ok(self.buf.get_u16())
    }

    pub fn read_int(&mut self) -> Result<i32, WireError> {
        self.need(4, "int")?;
        Ok(self.buf.get_i32())
    }

    pub fn read_long(&mut self) -> Result<i64, WireError> {
        self.need(8, "long")?;
        Ok(self.buf.get_i64())
    }

    pub fn read_raw(&mut self, n: usize, what: &'static str) -> Result<Bytes, WireError> {
        self.need(n, what)?;
        Ok(self.buf.split_to(n))
    }

    fn utf8(bytes: Bytes, what: &'static str) -> Result<String, WireError> {
        String::from_utf8(bytes.to_vec()).map_err(|_| WireError::InvalidUtf8(what))
    }

    /// `[string]`: short length then UTF-8.
    pub fn read_string(&mut self) -> Result<String, WireError> {
        let len = self.read_short()? as usize;
        let bytes = self.read_raw(len, "string")?;
        Self::utf8(bytes, "string")
    }

    /// `[long string]`: int length then UTF-8.
    pub fn read_long_string(&mut self) -> Result<String, WireError> {
        let len = self.read_int()?;
        let len = usize::try_from(len).map_err(|_| WireError::Truncated("long string"))?;
        let bytes = self.read_raw(len, "long string")?;
        Self::utf8(bytes, "long string")
    }

    /// `[bytes]`: int length, negative for null.
    pub fn read_bytes(&mut self) -> Result<Option<Bytes>, WireError> {
        let len = self.read_int()?;
        if len < 0 {
            return Ok(None);
        }
        self.read_raw(len as usize, "bytes").map(Some)
    }

    /// `[short bytes]`.
    pub fn read_short_bytes(&mut self) -> Result<Bytes, WireError> {
        let len = self.read_short()? as usize;
        self.read_raw(len, "short bytes")
    }

    pub fn read_string_list(&mut self) -> Result<Vec<String>, WireError> {
        let n = self.read_short()?;
        (0..n).map(|_| self.read_string()).collect()
    }

    pub fn read_string_map(&mut self) -> Result<Vec<(String, String)>, WireError> {
        let n = self.read_short()?;
        (0..n)
            .map(|_| Ok((self.read_string()?, self.read_string()?)))
            .collect()
    }

    pub fn read_string_multimap(&mut self) -> Result<Vec<(String, Vec<String>)>, WireError> {
        let n = self.read_short()?;
        (0..n)
            .map(|_| Ok((self.read_string()?, self.read_string_list()?)))
            .collect()
    }

    pub fn read_bytes_map(&mut self) -> Result<Vec<(String, Option<Bytes>)>, WireError> {
        let n = self.read_short()?;
        (0..n)
            .map(|_| Ok((self.read_string()?, self.read_bytes()?)))
            .collect()
    }

    pub fn read_uuid(&mut self) -> Result<[u8; 16], WireError> {
        let raw = self.read_raw(16, "uuid")?;
        let mut uuid = [0u8; 16];
        uuid.copy_from_slice(&raw);
        Ok(uuid)
    }

    /// Bytes consumed by `f`, returned verbatim.
    pub fn read_spanned<F>(&mut self, f: F) -> Result<Bytes, WireError>
    where
        F: FnOnce(&mut Self) -> Result<(), WireError>,
    {
        let start = self.buf.clone();
        f(self)?;
        let consumed = start.len() - self.buf.len();
        Ok(start.slice(..consumed))
    }

    /// Skip a `[short]` count of `[value]`s (`[bytes]`, with -2 meaning unset).
    pub fn skip_values(&mut self) -> Result<(), WireError> {
        let n = self.read_short()?;
        for _ in 0..n {
            self.read_bytes()?;
        }
        Ok(())
    }

    /// Everything not read yet.
    pub fn take_rest(&mut self) -> Bytes {
        self.buf.split_off(0)
    }
}

/// Builder for a frame body.
#[derive(Debug, Default)]
pub struct BodyWriter {
    buf: BytesMut,
}

impl BodyWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_u8(&mut self, v: u8) {
        self.buf.put_u8(v);
    }

    pub fn put_short(&mut self, v: u16) {
        self.buf.put_u16(v);
    }

    pub fn put_int(&mut self, v: i32) {
        self.buf.put_i32(v);
    }

    pub fn put_long(&mut self, v: i64) {
        self.buf.put_i64(v);
    }

    pub fn put_raw(&mut self, raw: &[u8]) {
        self.buf.put_slice(raw);
    }

    pub fn put_string(&mut self, s: &str) {
        debug_assert!(s.len() <= u16::MAX as usize);
        self.put_short(s.len() as u16);
        self.put_raw(s.as_bytes());
    }

    pub fn put_long_string(&mut self, s: &str) {
        self.put_int(s.len() as i32);
        self.put_raw(s.as_bytes());
    }

    pub fn put_bytes(&mut self, bytes: Option<&[u8]>) {
        match bytes {
            Some(bytes) => {
                self.put_int(bytes.len() as i32);
                self.put_raw(bytes);
            }
            None => self.put_int(-1),
        }
    }

    pub fn put_short_bytes(&mut self, bytes: &[u8]) {
        self.put_short(bytes.len() as u16);
        self.put_raw(bytes);
    }

    pub fn put_string_list<S: AsRef<str>>(&mut self, list: &[S]) {
        self.put_short(list.len() as u16);
        for s in list {
            self.put_string(s.as_ref());
        }
    }

    pub fn put_string_map(&mut self, map: &[(String, String)]) {
        self.put_short(map.len() as u16);
        for (k, v) in map {
            self.put_string(k);
            self.put_string(v);
        }
    }

    pub fn put_string_multimap(&mut self, map: &[(String, Vec<String>)]) {
        self.put_short(map.len() as u16);
        for (k, values) in map {
            self.put_string(k);
            self.put_string_list(values);
        }
    }

    pub fn put_bytes_map(&mut self, map: &[(String, Option<Bytes>)]) {
        self.put_short(map.len() as u16);
        for (k, v) in map {
            self.put_string(k);
            self.put_bytes(v.as_deref());
        }
    }

    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}
