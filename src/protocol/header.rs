//! Streaming wire header
//!
//! Every streaming client receives exactly one header before any video bytes:
//!
//! ```text
//! +---------+---------+---------+---------+---------+---------+---------+---------+
//! |  'j'    |  's'    |  'm'    |  'p'    |  width (u16 BE)   |  height (u16 BE)  |
//! +---------+---------+---------+---------+---------+---------+---------+---------+
//! ```
//!
//! After the header the stream is the raw MPEG-1 elementary stream, with no
//! further framing.

use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Magic tag the browser-side decoder looks for
pub const STREAM_MAGIC: &[u8; 4] = b"jsmp";

/// Encoded size of [`StreamHeader`]
pub const HEADER_SIZE: usize = 8;

/// Maximum number of bytes read from the transcoder per chunk
pub const CHUNK_SIZE: usize = 512;

/// Header announcing the stream dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamHeader {
    pub width: u16,
    pub height: u16,
}

impl StreamHeader {
    /// Create a header for the given frame dimensions
    pub fn new(width: u16, height: u16) -> Self {
        Self { width, height }
    }

    /// Encode the header in its fixed big-endian layout
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE);
        buf.put_slice(STREAM_MAGIC);
        buf.put_u16(self.width);
        buf.put_u16(self.height);
        buf.freeze()
    }

    /// Parse a header from the first bytes of a stream
    ///
    /// Returns `None` if fewer than eight bytes are available or the magic
    /// tag does not match.
    pub fn decode(data: &[u8]) -> Option<Self> {
        if data.len() < HEADER_SIZE || &data[..4] != STREAM_MAGIC {
            return None;
        }

        let mut rest = &data[4..HEADER_SIZE];
        let width = rest.get_u16();
        let height = rest.get_u16();
        Some(Self { width, height })
    }
}
