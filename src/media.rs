//! Sequential byte streams for dumping and programming images.
//!
//! The tester never touches a file system itself; whoever owns the storage
//! hands in something implementing [`ByteStream`].

use std::io;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamMode {
    Read,
    Write,
}

pub trait ByteStream {
    fn open(&mut self, mode: StreamMode) -> Result<()>;

    /// Fills `buf` as far as possible; 0 means end of stream.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    fn write(&mut self, buf: &[u8]) -> Result<()>;

    fn close(&mut self) -> Result<()>;
}

/// In-memory stream, used by tests and the simulated bench.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryStream {
    data: Vec<u8>,
    position: usize,
    mode: Option<StreamMode>,
}

impl MemoryStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Self {
        MemoryStream {
            data: data.into(),
            ..Self::default()
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    fn expect_mode(&self, wanted: StreamMode) -> Result<()> {
        if self.mode == Some(wanted) {
            Ok(())
        } else {
            Err(io::Error::new(
                io::ErrorKind::Other,
                format!("stream not open for {:?}", wanted),
            )
            .into())
        }
    }
}

impl ByteStream for MemoryStream {
    fn open(&mut self, mode: StreamMode) -> Result<()> {
        if mode == StreamMode::Write {
            self.data.clear();
        }
        self.position = 0;
        self.mode = Some(mode);
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.expect_mode(StreamMode::Read)?;
        let available = &self.data[self.position.min(self.data.len())..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.position += n;
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> Result<()> {
        self.expect_mode(StreamMode::Write)?;
        self.data.extend_from_slice(buf);
        self.position = self.data.len();
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.mode = None;
        Ok(())
    }
}

/// Reads up to `limit` bytes, stopping early at end of stream.
pub fn read_image(stream: &mut dyn ByteStream, limit: usize) -> Result<Vec<u8>> {
    let mut image = vec![0; limit];
    let mut filled = 0;
    while filled < limit {
        let n = stream.read(&mut image[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    image.truncate(filled);
    Ok(image)
}
