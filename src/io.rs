//! Big-endian scalar codec.
//!
//! [`ScalarWriter`] and [`ScalarReader`] wrap a byte sink/source and encode the fixed
//! scalar layouts of the format. Bulk primitive arrays go through a fixed scratch
//! buffer, one `write_all`/`read_exact` per chunk instead of one per element.

use crate::error::{GraphError, Result};
use byteorder::{BigEndian, ByteOrder, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

/// Writes big-endian scalars to an underlying sink.
#[derive(Debug)]
pub struct ScalarWriter<W> {
    inner: W,
    scratch: Vec<u8>,
}

macro_rules! bulk_write {
    ($(#[$doc:meta] $name:ident, $ty:ty, $width:expr, $into:path;)*) => {
        $(
            #[$doc]
            pub fn $name(&mut self, values: &[$ty]) -> Result<()> {
                let per_chunk = self.scratch.len() / $width;
                for chunk in values.chunks(per_chunk) {
                    let bytes = &mut self.scratch[..chunk.len() * $width];
                    $into(chunk, bytes);
                    self.inner.write_all(bytes)?;
                }
                Ok(())
            }
        )*
    };
}

impl<W: Write> ScalarWriter<W> {
    /// Creates a writer with a scratch buffer of `scratch_size` bytes (at least 8).
    pub fn new(inner: W, scratch_size: usize) -> Self {
        Self {
            inner,
            scratch: vec![0; scratch_size.max(8)],
        }
    }

    /// Writes a boolean as one byte, 0 or 1.
    pub fn write_bool(&mut self, v: bool) -> Result<()> {
        Ok(self.inner.write_u8(u8::from(v))?)
    }

    /// Writes one unsigned byte.
    pub fn write_u8(&mut self, v: u8) -> Result<()> {
        Ok(self.inner.write_u8(v)?)
    }

    /// Writes one signed byte.
    pub fn write_i8(&mut self, v: i8) -> Result<()> {
        Ok(self.inner.write_i8(v)?)
    }

    /// Writes a 2-byte signed integer.
    pub fn write_i16(&mut self, v: i16) -> Result<()> {
        Ok(self.inner.write_i16::<BigEndian>(v)?)
    }

    /// Writes a 2-byte unsigned integer.
    pub fn write_u16(&mut self, v: u16) -> Result<()> {
        Ok(self.inner.write_u16::<BigEndian>(v)?)
    }

    /// Writes a 4-byte signed integer.
    pub fn write_i32(&mut self, v: i32) -> Result<()> {
        Ok(self.inner.write_i32::<BigEndian>(v)?)
    }

    /// Writes a 4-byte unsigned integer (handles, counts, lengths).
    pub fn write_u32(&mut self, v: u32) -> Result<()> {
        Ok(self.inner.write_u32::<BigEndian>(v)?)
    }

    /// Writes an 8-byte signed integer.
    pub fn write_i64(&mut self, v: i64) -> Result<()> {
        Ok(self.inner.write_i64::<BigEndian>(v)?)
    }

    /// Writes the IEEE-754 bits of an `f32` as a 4-byte integer.
    pub fn write_f32(&mut self, v: f32) -> Result<()> {
        Ok(self.inner.write_u32::<BigEndian>(v.to_bits())?)
    }

    /// Writes the IEEE-754 bits of an `f64` as an 8-byte integer.
    pub fn write_f64(&mut self, v: f64) -> Result<()> {
        Ok(self.inner.write_u64::<BigEndian>(v.to_bits())?)
    }

    /// Writes a string as a 4-byte byte length followed by its UTF-8 bytes.
    pub fn write_str(&mut self, s: &str) -> Result<()> {
        self.write_len(s.len())?;
        self.inner.write_all(s.as_bytes())?;
        Ok(())
    }

    /// Writes a collection length as a 4-byte count.
    pub fn write_len(&mut self, len: usize) -> Result<()> {
        let len = u32::try_from(len)
            .map_err(|_| GraphError::Format(format!("length {len} exceeds u32 range")))?;
        self.write_u32(len)
    }

    /// Writes raw bytes.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        Ok(self.inner.write_all(bytes)?)
    }

    /// Writes booleans, one byte each.
    pub fn write_bool_slice(&mut self, values: &[bool]) -> Result<()> {
        for chunk in values.chunks(self.scratch.len()) {
            let bytes = &mut self.scratch[..chunk.len()];
            for (dst, v) in bytes.iter_mut().zip(chunk) {
                *dst = u8::from(*v);
            }
            self.inner.write_all(bytes)?;
        }
        Ok(())
    }

    /// Writes signed bytes.
    pub fn write_i8_slice(&mut self, values: &[i8]) -> Result<()> {
        for chunk in values.chunks(self.scratch.len()) {
            let bytes = &mut self.scratch[..chunk.len()];
            for (dst, v) in bytes.iter_mut().zip(chunk) {
                *dst = v.to_be_bytes()[0];
            }
            self.inner.write_all(bytes)?;
        }
        Ok(())
    }

    bulk_write! {
        /// Writes 2-byte signed integers.
        write_i16_slice, i16, 2, BigEndian::write_i16_into;
        /// Writes 2-byte unsigned integers.
        write_u16_slice, u16, 2, BigEndian::write_u16_into;
        /// Writes 4-byte signed integers.
        write_i32_slice, i32, 4, BigEndian::write_i32_into;
        /// Writes 8-byte signed integers.
        write_i64_slice, i64, 8, BigEndian::write_i64_into;
        /// Writes `f32` bit patterns.
        write_f32_slice, f32, 4, BigEndian::write_f32_into;
        /// Writes `f64` bit patterns.
        write_f64_slice, f64, 8, BigEndian::write_f64_into;
    }

    /// Flushes the underlying sink.
    pub fn flush(&mut self) -> Result<()> {
        Ok(self.inner.flush()?)
    }

    /// Returns a reference to the underlying sink.
    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Consumes the writer, returning the underlying sink.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

/// Reads big-endian scalars from an underlying source.
///
/// Exhaustion of the source in the middle of a scalar is reported as
/// [`GraphError::Truncated`].
#[derive(Debug)]
pub struct ScalarReader<R> {
    inner: R,
    scratch: Vec<u8>,
    max_string_len: u32,
}

macro_rules! bulk_read {
    ($(#[$doc:meta] $name:ident, $ty:ty, $width:expr, $from:path;)*) => {
        $(
            #[$doc]
            pub fn $name(&mut self, len: usize) -> Result<Vec<$ty>> {
                let per_chunk = self.scratch.len() / $width;
                let mut out: Vec<$ty> = Vec::with_capacity(len.min(per_chunk));
                let mut remaining = len;
                while remaining > 0 {
                    let n = remaining.min(per_chunk);
                    let bytes = &mut self.scratch[..n * $width];
                    self.inner.read_exact(bytes)?;
                    let start = out.len();
                    out.resize(start + n, <$ty>::default());
                    $from(bytes, &mut out[start..]);
                    remaining -= n;
                }
                Ok(out)
            }
        )*
    };
}

impl<R: Read> ScalarReader<R> {
    /// Creates a reader with a scratch buffer of `scratch_size` bytes (at least 8).
    pub fn new(inner: R, scratch_size: usize, max_string_len: u32) -> Self {
        Self {
            inner,
            scratch: vec![0; scratch_size.max(8)],
            max_string_len,
        }
    }

    /// Reads a one-byte boolean. Any non-zero byte is `true`.
    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.inner.read_u8()? != 0)
    }

    /// Reads one unsigned byte.
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.inner.read_u8()?)
    }

    /// Reads one signed byte.
    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.inner.read_i8()?)
    }

    /// Reads a 2-byte signed integer.
    pub fn read_i16(&mut self) -> Result<i16> {
        Ok(self.inner.read_i16::<BigEndian>()?)
    }

    /// Reads a 2-byte unsigned integer.
    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(self.inner.read_u16::<BigEndian>()?)
    }

    /// Reads a 4-byte signed integer.
    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(self.inner.read_i32::<BigEndian>()?)
    }

    /// Reads a 4-byte unsigned integer.
    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(self.inner.read_u32::<BigEndian>()?)
    }

    /// Reads an 8-byte signed integer.
    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(self.inner.read_i64::<BigEndian>()?)
    }

    /// Reads an `f32` from its 4-byte bit pattern.
    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(f32::from_bits(self.inner.read_u32::<BigEndian>()?))
    }

    /// Reads an `f64` from its 8-byte bit pattern.
    pub fn read_f64(&mut self) -> Result<f64> {
        Ok(f64::from_bits(self.inner.read_u64::<BigEndian>()?))
    }

    /// Reads exactly `buf.len()` raw bytes.
    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        Ok(self.inner.read_exact(buf)?)
    }

    /// Reads a length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> Result<String> {
        let len = self.read_u32()?;
        if len > self.max_string_len {
            return Err(GraphError::Format(format!(
                "string length {len} exceeds limit {}",
                self.max_string_len
            )));
        }
        let bytes = self.read_byte_vec(len as usize)?;
        String::from_utf8(bytes)
            .map_err(|e| GraphError::Format(format!("invalid UTF-8 in string: {e}")))
    }

    /// Reads `len` raw bytes, growing the buffer only as data actually arrives.
    pub fn read_byte_vec(&mut self, len: usize) -> Result<Vec<u8>> {
        let per_chunk = self.scratch.len();
        let mut out = Vec::with_capacity(len.min(per_chunk));
        let mut remaining = len;
        while remaining > 0 {
            let n = remaining.min(per_chunk);
            let bytes = &mut self.scratch[..n];
            self.inner.read_exact(bytes)?;
            out.extend_from_slice(bytes);
            remaining -= n;
        }
        Ok(out)
    }

    /// Reads `len` one-byte booleans.
    pub fn read_bool_vec(&mut self, len: usize) -> Result<Vec<bool>> {
        Ok(self.read_byte_vec(len)?.into_iter().map(|b| b != 0).collect())
    }

    /// Reads `len` signed bytes.
    pub fn read_i8_vec(&mut self, len: usize) -> Result<Vec<i8>> {
        Ok(self
            .read_byte_vec(len)?
            .into_iter()
            .map(|b| i8::from_be_bytes([b]))
            .collect())
    }

    bulk_read! {
        /// Reads `len` 2-byte signed integers.
        read_i16_vec, i16, 2, BigEndian::read_i16_into;
        /// Reads `len` 2-byte unsigned integers.
        read_u16_vec, u16, 2, BigEndian::read_u16_into;
        /// Reads `len` 4-byte signed integers.
        read_i32_vec, i32, 4, BigEndian::read_i32_into;
        /// Reads `len` 8-byte signed integers.
        read_i64_vec, i64, 8, BigEndian::read_i64_into;
        /// Reads `len` `f32` values.
        read_f32_vec, f32, 4, BigEndian::read_f32_into;
        /// Reads `len` `f64` values.
        read_f64_vec, f64, 8, BigEndian::read_f64_into;
    }

    /// Consumes the reader, returning the underlying source.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalars_are_big_endian() -> Result<()> {
        let mut w = ScalarWriter::new(Vec::new(), 8);
        w.write_i32(1)?;
        w.write_i16(-2)?;
        w.write_f32(1.0)?;
        w.write_bool(true)?;
        w.write_str("hé")?;
        let bytes = w.into_inner();
        assert_eq!(
            bytes,
            [
                0, 0, 0, 1, 0xFF, 0xFE, 0x3F, 0x80, 0, 0, 1, 0, 0, 0, 3, b'h', 0xC3, 0xA9
            ]
        );
        Ok(())
    }

    #[test]
    fn bulk_transfer_spans_several_scratch_chunks() -> Result<()> {
        let values: Vec<i64> = (0..37).map(|i| i * -1_000_000_007).collect();
        let mut w = ScalarWriter::new(Vec::new(), 16);
        w.write_i64_slice(&values)?;
        let bytes = w.into_inner();

        let mut element_wise = ScalarWriter::new(Vec::new(), 16);
        for v in &values {
            element_wise.write_i64(*v)?;
        }
        assert_eq!(bytes, element_wise.into_inner());

        let mut r = ScalarReader::new(bytes.as_slice(), 16, 1024);
        assert_eq!(r.read_i64_vec(values.len())?, values);
        Ok(())
    }

    #[test]
    fn short_input_is_truncated() {
        let mut r = ScalarReader::new(&[0u8, 0, 1][..], 8, 1024);
        assert!(matches!(r.read_i32(), Err(GraphError::Truncated)));

        let mut r = ScalarReader::new(&[0u8, 0, 0, 9, b'a'][..], 8, 1024);
        assert!(matches!(r.read_string(), Err(GraphError::Truncated)));
    }

    #[test]
    fn oversize_string_is_rejected_before_allocation() {
        let mut r = ScalarReader::new(&[0xFFu8, 0xFF, 0xFF, 0xFF][..], 8, 1024);
        assert!(matches!(r.read_string(), Err(GraphError::Format(_))));
    }
}
