use super::ChunkError;
use byteorder::{LittleEndian, ReadBytesExt};
use smol_str::SmolStr;
use std::io::Read;

/// Primitive decoder over a byte source.
///
/// All multi-byte reads are little-endian, matching the only header
/// profile the decoder accepts. A short read surfaces as
/// [`ChunkError::TruncatedChunk`].
pub struct ChunkReader<R: Read> {
    inner: R,
}

fn map_io(e: std::io::Error) -> ChunkError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        ChunkError::TruncatedChunk
    } else {
        ChunkError::Io(e)
    }
}

impl<R: Read> ChunkReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Read exactly `buf.len()` bytes
    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), ChunkError> {
        self.inner.read_exact(buf).map_err(map_io)
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>, ChunkError> {
        let mut buf = vec![0u8; n];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    pub fn read_u8(&mut self) -> Result<u8, ChunkError> {
        self.inner.read_u8().map_err(map_io)
    }

    pub fn read_u32(&mut self) -> Result<u32, ChunkError> {
        self.inner.read_u32::<LittleEndian>().map_err(map_io)
    }

    pub fn read_u64(&mut self) -> Result<u64, ChunkError> {
        self.inner.read_u64::<LittleEndian>().map_err(map_io)
    }

    pub fn read_f64(&mut self) -> Result<f64, ChunkError> {
        self.inner.read_f64::<LittleEndian>().map_err(map_io)
    }

    /// Length-prefixed string: u64 byte count, then that many bytes of
    /// which the trailing NUL is stripped. A count of zero denotes the
    /// empty (absent) string.
    pub fn read_string(&mut self) -> Result<SmolStr, ChunkError> {
        let size = self.read_u64()? as usize;
        if size == 0 {
            return Ok(SmolStr::default());
        }
        let mut bytes = self.read_bytes(size)?;
        if bytes.last() == Some(&0) {
            bytes.pop();
        }
        match std::str::from_utf8(&bytes) {
            Ok(s) => Ok(SmolStr::new(s)),
            Err(_) => Err(ChunkError::InvalidString),
        }
    }

    /// Run `f` once per element of a u32-counted sequence
    pub fn read_vec<T, F>(&mut self, mut f: F) -> Result<Vec<T>, ChunkError>
    where
        F: FnMut(&mut Self) -> Result<T, ChunkError>,
    {
        let len = self.read_u32()? as usize;
        let mut out = Vec::with_capacity(len.min(1 << 20));
        for _ in 0..len {
            out.push(f(self)?);
        }
        Ok(out)
    }
}
