//! Field reader/writer for decrypted 3.80C payloads.
//!
//! Byte 0 of every payload is the opcode. Reads past the end yield zero
//! values so handlers can parse truncated input without bounds checks; a
//! handler that cares can ask [`PacketReader::overrun`] afterwards.
//!
//! Strings travel in the client's codepage, MS950 (Big5); they are UTF-8
//! everywhere on this side of the reader and writer.

use bytes::{BufMut, BytesMut};
use encoding_rs::BIG5;

/// Big5 bytes to UTF-8. Invalid sequences become U+FFFD.
pub fn decode_client_str(raw: &[u8]) -> String {
    if raw.is_ascii() {
        return String::from_utf8_lossy(raw).into_owned();
    }
    BIG5.decode_without_bom_handling(raw).0.into_owned()
}

/// UTF-8 to Big5. Characters Big5 lacks come out as numeric character
/// references, which the client shows verbatim.
pub fn encode_client_str(s: &str) -> Vec<u8> {
    if s.is_ascii() {
        return s.as_bytes().to_vec();
    }
    BIG5.encode(s).0.into_owned()
}

pub struct PacketReader<'a> {
    data: &'a [u8],
    pos: usize,
    overrun: bool,
}

impl<'a> PacketReader<'a> {
    /// Starts reading after the opcode byte.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 1, overrun: false }
    }

    pub fn opcode(&self) -> u8 {
        self.data.first().copied().unwrap_or(0)
    }

    pub fn read_c(&mut self) -> u8 {
        match self.data.get(self.pos) {
            Some(&v) => {
                self.pos += 1;
                v
            }
            None => {
                self.overrun = true;
                0
            }
        }
    }

    pub fn read_h(&mut self) -> u16 {
        match self.data.get(self.pos..self.pos + 2) {
            Some(b) => {
                self.pos += 2;
                u16::from_le_bytes([b[0], b[1]])
            }
            None => {
                self.overrun = true;
                self.pos = self.data.len();
                0
            }
        }
    }

    pub fn read_d(&mut self) -> i32 {
        match self.data.get(self.pos..self.pos + 4) {
            Some(b) => {
                self.pos += 4;
                i32::from_le_bytes([b[0], b[1], b[2], b[3]])
            }
            None => {
                self.overrun = true;
                self.pos = self.data.len();
                0
            }
        }
    }

    /// Null-terminated Big5 string.
    pub fn read_s(&mut self) -> String {
        let rest = self.data.get(self.pos..).unwrap_or(&[]);
        match rest.iter().position(|&b| b == 0) {
            Some(end) => {
                self.pos += end + 1;
                decode_client_str(&rest[..end])
            }
            None => {
                self.pos = self.data.len();
                decode_client_str(rest)
            }
        }
    }

    /// Up to `n` raw bytes; shorter if the payload ends first.
    pub fn read_bytes(&mut self, n: usize) -> Vec<u8> {
        let end = (self.pos + n).min(self.data.len());
        if end - self.pos < n {
            self.overrun = true;
        }
        let out = self.data[self.pos.min(end)..end].to_vec();
        self.pos = end;
        out
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    /// True once any read ran past the end of the payload.
    pub fn overrun(&self) -> bool {
        self.overrun
    }
}

/// Builds a server payload. [`PacketWriter::finish`] pads to a 4-byte boundary.
pub struct PacketWriter {
    buf: BytesMut,
}

impl PacketWriter {
    pub fn new(opcode: u8) -> Self {
        let mut buf = BytesMut::with_capacity(64);
        buf.put_u8(opcode);
        Self { buf }
    }

    pub fn c(mut self, v: u8) -> Self {
        self.buf.put_u8(v);
        self
    }

    pub fn h(mut self, v: u16) -> Self {
        self.buf.put_u16_le(v);
        self
    }

    pub fn d(mut self, v: i32) -> Self {
        self.buf.put_i32_le(v);
        self
    }

    pub fn du(mut self, v: u32) -> Self {
        self.buf.put_u32_le(v);
        self
    }

    pub fn s(mut self, v: &str) -> Self {
        self.buf.put_slice(&encode_client_str(v));
        self.buf.put_u8(0);
        self
    }

    pub fn bytes(mut self, v: &[u8]) -> Self {
        self.buf.put_slice(v);
        self
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn finish(mut self) -> Vec<u8> {
        let rem = self.buf.len() % 4;
        if rem != 0 {
            self.buf.put_bytes(0, 4 - rem);
        }
        self.buf.to_vec()
    }
}
