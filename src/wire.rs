// mirrormediad/src/wire.rs

//! Descriptor I/O primitives: fixed-width little-endian codecs and exact
//! byte-copy loops shared by the archive producers and consumers. Copies move
//! through the standard library's fixed internal buffer; nothing here
//! allocates in proportion to file size.

use std::io::{self, Read, Write};

use anyhow::{Result, bail};

pub trait WireRead: Read {
    fn read_u8(&mut self) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    fn read_u16_le(&mut self) -> Result<u16> {
        let mut buf = [0u8; 2];
        self.read_exact(&mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    fn read_u32_le(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    fn read_u64_le(&mut self) -> Result<u64> {
        let mut buf = [0u8; 8];
        self.read_exact(&mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }
}

impl<R: Read + ?Sized> WireRead for R {}

pub trait WireWrite: Write {
    fn write_u8(&mut self, value: u8) -> Result<()> {
        self.write_all(&[value])?;
        Ok(())
    }

    fn write_u16_le(&mut self, value: u16) -> Result<()> {
        self.write_all(&value.to_le_bytes())?;
        Ok(())
    }

    fn write_u32_le(&mut self, value: u32) -> Result<()> {
        self.write_all(&value.to_le_bytes())?;
        Ok(())
    }

    fn write_u64_le(&mut self, value: u64) -> Result<()> {
        self.write_all(&value.to_le_bytes())?;
        Ok(())
    }
}

impl<W: Write + ?Sized> WireWrite for W {}

/// Copies exactly `len` bytes from `reader` to `writer`. A short read is an
/// error: the caller's stream position would no longer be trustworthy.
pub fn copy_exact<R: Read, W: Write>(reader: &mut R, writer: &mut W, len: u64) -> Result<()> {
    let mut limited = reader.take(len);
    let copied = io::copy(&mut limited, writer)?;
    if copied != len {
        bail!("short read: wanted {len} bytes, got {copied}");
    }
    Ok(())
}

/// Reads and discards exactly `len` bytes, keeping the stream aligned after a
/// rejected entry.
pub fn drain_exact<R: Read>(reader: &mut R, len: u64) -> Result<()> {
    copy_exact(reader, &mut io::sink(), len)
}

/// Copies until EOF and returns the byte count.
pub fn copy_to_eof<R: Read, W: Write>(reader: &mut R, writer: &mut W) -> Result<u64> {
    Ok(io::copy(reader, writer)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_codec_round_trip() {
        let mut buf = Vec::new();
        buf.write_u8(b'F').unwrap();
        buf.write_u16_le(0x1234).unwrap();
        buf.write_u32_le(0o644).unwrap();
        buf.write_u64_le(0xDEAD_BEEF_CAFE).unwrap();

        let mut cur = Cursor::new(buf);
        assert_eq!(cur.read_u8().unwrap(), b'F');
        assert_eq!(cur.read_u16_le().unwrap(), 0x1234);
        assert_eq!(cur.read_u32_le().unwrap(), 0o644);
        assert_eq!(cur.read_u64_le().unwrap(), 0xDEAD_BEEF_CAFE);
    }

    #[test]
    fn test_codec_is_little_endian() {
        let mut buf = Vec::new();
        buf.write_u16_le(0x0201).unwrap();
        buf.write_u32_le(0x0605_0403).unwrap();
        assert_eq!(buf, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_copy_exact() {
        let src = b"hello world";
        let mut out = Vec::new();
        copy_exact(&mut &src[..], &mut out, 5).unwrap();
        assert_eq!(out, b"hello");
    }

    #[test]
    fn test_copy_exact_short_read_fails() {
        let src = b"abc";
        let mut out = Vec::new();
        assert!(copy_exact(&mut &src[..], &mut out, 10).is_err());
    }

    #[test]
    fn test_drain_exact_keeps_alignment() {
        let src = b"skipthiskeepthat";
        let mut cur = Cursor::new(&src[..]);
        drain_exact(&mut cur, 8).unwrap();
        let mut rest = Vec::new();
        cur.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, b"keepthat");
    }

    #[test]
    fn test_copy_to_eof_counts() {
        let src = vec![7u8; 70_000];
        let mut out = Vec::new();
        let n = copy_to_eof(&mut &src[..], &mut out).unwrap();
        assert_eq!(n, 70_000);
        assert_eq!(out.len(), 70_000);
    }
}
