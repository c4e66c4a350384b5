//! MSB-first bit streams used by the Golomb-coded set.

use std::io::{self, Write};

use crate::error::LookupError;

/// Writes bit fields MSB-first into any [`Write`]. Wrap the target in a `BufWriter`: whole
/// bytes are written as soon as they are complete.
pub struct BitWriter<W> {
    inner: W,
    // Fewer than 8 pending bits between calls, so a 64-bit write always fits.
    acc: u128,
    acc_bits: u32,
    bits_written: u64,
}

impl<W: Write> BitWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, acc: 0, acc_bits: 0, bits_written: 0 }
    }

    /// Writes the `n` (<= 64) low bits of `value`.
    pub fn write_bits(&mut self, n: u32, value: u64) -> io::Result<()> {
        debug_assert!(n <= 64);
        if n == 0 {
            return Ok(());
        }
        let value = if n == 64 { value } else { value & ((1u64 << n) - 1) };

        self.acc = (self.acc << n) | value as u128;
        self.acc_bits += n;
        self.bits_written += n as u64;

        let mut out = [0u8; 9];
        let mut len = 0;
        while self.acc_bits >= 8 {
            self.acc_bits -= 8;
            out[len] = (self.acc >> self.acc_bits) as u8;
            len += 1;
        }
        self.acc &= (1u128 << self.acc_bits) - 1;

        self.inner.write_all(&out[..len])
    }

    /// Writes `q` one bits followed by a single zero bit.
    pub fn write_unary(&mut self, mut q: u64) -> io::Result<()> {
        while q >= 64 {
            self.write_bits(64, u64::MAX)?;
            q -= 64;
        }
        if q > 0 {
            self.write_bits(q as u32, u64::MAX >> (64 - q))?;
        }
        self.write_bits(1, 0)
    }

    /// Total bits written so far, excluding padding.
    pub fn bits_written(&self) -> u64 {
        self.bits_written
    }

    /// Pads the stream with zero bits up to a byte boundary and returns the inner writer
    /// together with the number of padding bits.
    pub fn finish(mut self) -> io::Result<(W, u64)> {
        let mut padding = 0;
        if self.acc_bits > 0 {
            padding = 8 - self.acc_bits;
            let byte = (self.acc << padding) as u8;
            self.inner.write_all(&[byte])?;
        }
        self.inner.flush()?;
        Ok((self.inner, padding as u64))
    }
}

/// Reads bit fields MSB-first from a byte slice, never past `end_bits`.
pub struct BitReader<'a> {
    data: &'a [u8],
    pos: u64,
    end_bits: u64,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0, end_bits: data.len() as u64 * 8 }
    }

    /// Moves to an absolute bit position.
    pub fn seek(&mut self, bit_pos: u64) -> Result<(), LookupError> {
        if bit_pos > self.end_bits {
            return Err(LookupError::Corrupt("seek past end of data"));
        }
        self.pos = bit_pos;
        Ok(())
    }

    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Reads `n` (<= 64) bits.
    pub fn read_bits(&mut self, n: u32) -> Result<u64, LookupError> {
        debug_assert!(n <= 64);
        if self.pos + n as u64 > self.end_bits {
            return Err(LookupError::Corrupt("read past end of data"));
        }

        let mut out = 0u64;
        let mut remaining = n;
        while remaining > 0 {
            let byte = self.data[(self.pos / 8) as usize];
            let avail = 8 - (self.pos % 8) as u32;
            let take = avail.min(remaining);
            let chunk = (byte >> (avail - take)) & (((1u16 << take) - 1) as u8);
            out = (out << take) | chunk as u64;
            remaining -= take;
            self.pos += take as u64;
        }

        Ok(out)
    }

    /// Counts one bits up to (and consuming) the next zero bit.
    pub fn read_unary(&mut self) -> Result<u64, LookupError> {
        let mut q = 0u64;
        while self.read_bits(1)? == 1 {
            q += 1;
        }
        Ok(q)
    }
}
