//! Little-endian binary snapshot encoding.
//!
//! Snapshots are an 8-byte magic header, a `u32` version, then a flat
//! sequence of little-endian fields. Floats are stored by bit pattern so a
//! restored object continues bit-identically.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use bevy::math::DVec3;

use crate::body::BodyError;
use crate::trajectory::ChebyshevError;
use crate::types::{DegreesOfFreedom, TimedDegreesOfFreedom};

pub const VERSION: u32 = 1;

#[derive(thiserror::Error, Debug)]
pub enum SnapshotError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid magic header")]
    BadMagic,

    #[error("unsupported snapshot version {0}")]
    UnsupportedVersion(u32),

    #[error("snapshot truncated at byte {offset} (needed {needed} more)")]
    Truncated { offset: usize, needed: usize },

    #[error("{0} trailing bytes after snapshot")]
    TrailingBytes(usize),

    #[error("invalid UTF-8 in body name")]
    InvalidName,

    #[error("invalid snapshot field {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("unknown integrator id {0}")]
    UnknownIntegrator(u32),

    #[error("invalid body in snapshot: {0}")]
    Body(#[from] BodyError),

    #[error("invalid series in snapshot: {0}")]
    Series(#[from] ChebyshevError),
}

impl SnapshotError {
    pub(crate) fn invalid(field: &'static str, reason: impl ToString) -> Self {
        SnapshotError::InvalidField {
            field,
            reason: reason.to_string(),
        }
    }
}

pub(crate) fn read_file(path: impl AsRef<Path>) -> Result<Vec<u8>, SnapshotError> {
    let mut f = File::open(path)?;
    let mut buf = Vec::new();
    f.read_to_end(&mut buf)?;
    Ok(buf)
}

pub(crate) fn write_file(path: impl AsRef<Path>, bytes: &[u8]) -> Result<(), SnapshotError> {
    let mut f = File::create(path)?;
    f.write_all(bytes)?;
    f.flush()?;
    Ok(())
}

pub(crate) struct Writer {
    bytes: Vec<u8>,
}

impl Writer {
    pub(crate) fn with_header(magic: &[u8; 8]) -> Self {
        let mut w = Self { bytes: Vec::new() };
        w.bytes.extend_from_slice(magic);
        w.write_u32(VERSION);
        w
    }

    pub(crate) fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub(crate) fn write_u8(&mut self, v: u8) {
        self.bytes.push(v);
    }

    pub(crate) fn write_bool(&mut self, v: bool) {
        self.write_u8(u8::from(v));
    }

    pub(crate) fn write_u32(&mut self, v: u32) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }

    pub(crate) fn write_u64(&mut self, v: u64) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }

    pub(crate) fn write_len(&mut self, len: usize) {
        self.write_u64(len as u64);
    }

    pub(crate) fn write_f64(&mut self, v: f64) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }

    pub(crate) fn write_dvec3(&mut self, v: DVec3) {
        self.write_f64(v.x);
        self.write_f64(v.y);
        self.write_f64(v.z);
    }

    pub(crate) fn write_str(&mut self, s: &str) {
        self.write_len(s.len());
        self.bytes.extend_from_slice(s.as_bytes());
    }

    pub(crate) fn write_timed(&mut self, point: &TimedDegreesOfFreedom) {
        self.write_f64(point.time);
        self.write_dvec3(point.position());
        self.write_dvec3(point.velocity());
    }
}

pub(crate) struct Cursor<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Cursor<'a> {
    /// Check the magic and version, leaving the cursor on the first field.
    pub(crate) fn with_header(bytes: &'a [u8], magic: &[u8; 8]) -> Result<Self, SnapshotError> {
        let mut r = Self { bytes, offset: 0 };

        let mut found = [0u8; 8];
        r.read_exact(&mut found)?;
        if &found != magic {
            return Err(SnapshotError::BadMagic);
        }

        let version = r.read_u32_le()?;
        if version != VERSION {
            return Err(SnapshotError::UnsupportedVersion(version));
        }
        Ok(r)
    }

    pub(crate) fn finish(self) -> Result<(), SnapshotError> {
        match self.bytes.len() - self.offset {
            0 => Ok(()),
            n => Err(SnapshotError::TrailingBytes(n)),
        }
    }

    fn read_exact(&mut self, out: &mut [u8]) -> Result<(), SnapshotError> {
        let end = self.offset + out.len();
        if end > self.bytes.len() {
            return Err(SnapshotError::Truncated {
                offset: self.offset,
                needed: end - self.bytes.len(),
            });
        }
        out.copy_from_slice(&self.bytes[self.offset..end]);
        self.offset = end;
        Ok(())
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8, SnapshotError> {
        let mut b = [0u8; 1];
        self.read_exact(&mut b)?;
        Ok(b[0])
    }

    pub(crate) fn read_bool(&mut self) -> Result<bool, SnapshotError> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(SnapshotError::invalid("flag", format!("byte {other}"))),
        }
    }

    pub(crate) fn read_u32_le(&mut self) -> Result<u32, SnapshotError> {
        let mut b = [0u8; 4];
        self.read_exact(&mut b)?;
        Ok(u32::from_le_bytes(b))
    }

    pub(crate) fn read_u64_le(&mut self) -> Result<u64, SnapshotError> {
        let mut b = [0u8; 8];
        self.read_exact(&mut b)?;
        Ok(u64::from_le_bytes(b))
    }

    /// A length prefix, checked against the bytes actually remaining so a
    /// corrupt count cannot trigger a huge allocation.
    pub(crate) fn read_len(&mut self, element_size: usize) -> Result<usize, SnapshotError> {
        let len = self.read_u64_le()?;
        let remaining = (self.bytes.len() - self.offset) as u64;
        let total = len.saturating_mul(element_size.max(1) as u64);
        if total > remaining {
            return Err(SnapshotError::Truncated {
                offset: self.offset,
                needed: (total - remaining) as usize,
            });
        }
        Ok(len as usize)
    }

    pub(crate) fn read_f64_le(&mut self) -> Result<f64, SnapshotError> {
        let mut b = [0u8; 8];
        self.read_exact(&mut b)?;
        Ok(f64::from_le_bytes(b))
    }

    pub(crate) fn read_dvec3(&mut self) -> Result<DVec3, SnapshotError> {
        let x = self.read_f64_le()?;
        let y = self.read_f64_le()?;
        let z = self.read_f64_le()?;
        Ok(DVec3::new(x, y, z))
    }

    pub(crate) fn read_string(&mut self) -> Result<String, SnapshotError> {
        let len = self.read_len(1)?;
        let mut buf = vec![0u8; len];
        self.read_exact(&mut buf)?;
        String::from_utf8(buf).map_err(|_| SnapshotError::InvalidName)
    }

    pub(crate) fn read_timed(&mut self) -> Result<TimedDegreesOfFreedom, SnapshotError> {
        let time = self.read_f64_le()?;
        let position = self.read_dvec3()?;
        let velocity = self.read_dvec3()?;
        Ok(TimedDegreesOfFreedom::new(time, DegreesOfFreedom::new(position, velocity)))
    }
}
