use anyhow::{anyhow, Result};
use byteorder::{BigEndian, ByteOrder};
use num_bigint::BigUint;

use crate::big::to_be_bytes_padded;

/// Append-only sink for the binary layouts shared by the SSH-1 and SSH-2
/// wire formats.
#[derive(Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Writer { buf: vec![] }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn write_bytes(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    pub fn write_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    /// Length-prefixed string: 32-bit big-endian byte count, then the bytes.
    pub fn write_string(&mut self, data: &[u8]) {
        self.write_u32(data.len() as u32);
        self.write_bytes(data);
    }

    /// SSH-2 mpint: 32-bit big-endian byte count, then the two's-complement
    /// magnitude. Unsigned values whose top bit would be set receive a
    /// leading zero byte.
    pub fn write_mpint(&mut self, x: &BigUint) {
        if x.bits() == 0 {
            self.write_u32(0);
            return;
        }

        let bytes = x.to_bytes_be();
        let pad = (bytes[0] & 0x80) != 0;

        self.write_u32((bytes.len() + if pad { 1 } else { 0 }) as u32);
        if pad {
            self.buf.push(0);
        }
        self.write_bytes(&bytes);
    }

    /// SSH-1 mpint: 16-bit big-endian bit count, then ceil(bits/8) magnitude
    /// bytes.
    pub fn write_mpint_ssh1(&mut self, x: &BigUint) {
        let bits = x.bits() as usize;
        assert!(bits <= u16::max_value() as usize);

        self.write_u16(bits as u16);
        self.write_bytes(&to_be_bytes_padded(x, (bits + 7) / 8));
    }
}

/// An SSH-1 mpint along with the borrowed magnitude bytes it was read from
/// (callers hash the raw encoding).
pub struct Ssh1Mpint<'a> {
    pub value: BigUint,
    pub bits: usize,
    pub magnitude: &'a [u8],
}

impl<'a> Ssh1Mpint<'a> {
    /// Total number of bytes the mpint occupied on the wire.
    pub fn encoded_len(&self) -> usize {
        2 + self.magnitude.len()
    }
}

/// Checked reader over a borrowed wire buffer. All reads fail cleanly on
/// truncated input.
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Reader { buf, pos: 0 }
    }

    /// Number of bytes consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(anyhow!("Input truncated"));
        }

        let out = &self.buf[self.pos..(self.pos + n)];
        self.pos += n;
        Ok(out)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(BigEndian::read_u16(self.read_bytes(2)?))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(BigEndian::read_u32(self.read_bytes(4)?))
    }

    pub fn read_string(&mut self) -> Result<&'a [u8]> {
        let len = self.read_u32()? as usize;
        self.read_bytes(len)
    }

    /// SSH-2 mpint read as an unsigned value (a leading zero pad byte is
    /// absorbed into the magnitude).
    pub fn read_mpint(&mut self) -> Result<BigUint> {
        let data = self.read_string()?;
        Ok(BigUint::from_bytes_be(data))
    }

    pub fn read_mpint_ssh1(&mut self) -> Result<Ssh1Mpint<'a>> {
        let bits = self.read_u16()? as usize;
        let magnitude = self.read_bytes((bits + 7) / 8)?;

        Ok(Ssh1Mpint {
            value: BigUint::from_bytes_be(magnitude),
            bits,
            magnitude,
        })
    }
}
