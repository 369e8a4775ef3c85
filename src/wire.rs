//! Fixed-layout little-endian packing used for every message between ranks.
//!
//! Records are written field by field in a documented order; there is no
//! self-description, so reader and writer must agree on the record type.
use crate::errors::{CellMdError, Result};

#[derive(Debug, Default)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            buf: Vec::with_capacity(bytes),
        }
    }

    pub fn put_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_f64(&mut self, v: f64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_f64s(&mut self, vs: &[f64]) {
        for v in vs {
            self.put_f64(*v);
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Cursor over a received buffer. Reads past the end are reported, never panic.
pub struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
    record_size: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(buf: &'a [u8], record_size: usize) -> Self {
        Self {
            buf,
            pos: 0,
            record_size,
        }
    }

    /// Checks that the buffer holds a whole number of records and returns that number.
    pub fn record_count(&self) -> Result<usize> {
        if self.record_size == 0 || self.buf.len() % self.record_size != 0 {
            return Err(CellMdError::TruncatedMessage {
                found: self.buf.len(),
                record_size: self.record_size,
            });
        }
        Ok(self.buf.len() / self.record_size)
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N]> {
        if self.remaining() < N {
            return Err(CellMdError::TruncatedMessage {
                found: self.buf.len(),
                record_size: self.record_size,
            });
        }
        let mut out = [0u8; N];
        out.copy_from_slice(&self.buf[self.pos..self.pos + N]);
        self.pos += N;
        Ok(out)
    }

    pub fn get_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.take::<4>()?))
    }

    pub fn get_i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.take::<4>()?))
    }

    pub fn get_u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.take::<8>()?))
    }

    pub fn get_f64(&mut self) -> Result<f64> {
        Ok(f64::from_le_bytes(self.take::<8>()?))
    }

    pub fn get_f64x3(&mut self) -> Result<[f64; 3]> {
        Ok([self.get_f64()?, self.get_f64()?, self.get_f64()?])
    }
}
