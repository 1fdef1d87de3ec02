//! Tokio codec for framing device byte streams.
//!
//! [`TrackerCodec`] integrates the frame codec with async TCP streams by
//! implementing tokio-util's [`Decoder`] and [`Encoder`] traits. TCP is a
//! stream protocol without message boundaries: a single read may contain
//! a partial frame, a complete frame, several frames, or garbage. The
//! decoder is length-driven: it reads the start marker, takes the length
//! field width from it, waits until the declared frame is complete, then
//! hands the exact byte span to [`Frame::decode`].
//!
//! A decode failure consumes the offending span and leaves the stream
//! usable, so one corrupt frame never terminates a connection. When the
//! buffer does not begin with a valid start marker the decoder discards
//! bytes through the next `0x0D0A` terminator to resynchronize, and a
//! buffer that grows past the frame cap without resynchronizing is
//! dropped wholesale.
//!
//! # Usage with Tokio Framed
//!
//! ```rust,no_run
//! use futures::{SinkExt, StreamExt};
//! use tokio::net::TcpStream;
//! use tokio_util::codec::Framed;
//! use tracklock_protocol::{Frame, TrackerCodec};
//!
//! # async fn example() -> tracklock_core::Result<()> {
//! let stream = TcpStream::connect("127.0.0.1:21105").await?;
//! let mut framed = Framed::new(stream, TrackerCodec::new());
//!
//! framed.send(Frame::command("LJDW#", 1)).await?;
//! if let Some(Ok(frame)) = framed.next().await {
//!     println!("received {frame}");
//! }
//! # Ok(())
//! # }
//! ```

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{trace, warn};
use tracklock_core::constants::{
    DEFAULT_CRC_SECRET, END_MARKER, LENGTH_OVERHEAD, START_LONG, START_SHORT,
};
use tracklock_core::{Error, Result};

use crate::frame::Frame;

/// Default maximum frame size in bytes (64 KB).
///
/// The long-form length field tops out just above this, so the cap
/// rejects nothing a real device can send while bounding the memory a
/// malformed stream can pin.
const DEFAULT_MAX_FRAME_SIZE: usize = 64 * 1024;

/// Stream codec pairing [`Frame`] with tokio's `Framed` transport.
#[derive(Debug)]
pub struct TrackerCodec {
    /// CRC seed used for both directions.
    secret: u16,

    /// Upper bound on a single frame, including markers.
    max_frame_size: usize,
}

impl TrackerCodec {
    /// Create a codec with the stock CRC seed.
    pub fn new() -> Self {
        Self::with_secret(DEFAULT_CRC_SECRET)
    }

    /// Create a codec with a provisioned CRC seed.
    pub fn with_secret(secret: u16) -> Self {
        Self {
            secret,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Get the configured frame size cap.
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Drop buffered bytes through the next end marker.
    ///
    /// Returns `true` when a terminator was found and consumed; `false`
    /// leaves the buffer untouched so more bytes can arrive.
    fn resync(src: &mut BytesMut) -> bool {
        if let Some(pos) = src.windows(2).position(|w| w == END_MARKER) {
            src.advance(pos + END_MARKER.len());
            true
        } else {
            false
        }
    }
}

impl Default for TrackerCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for TrackerCodec {
    type Item = Frame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        if src.len() < 2 {
            return Ok(None);
        }

        let marker = [src[0], src[1]];
        let width = match marker {
            START_SHORT => 1,
            START_LONG => 2,
            _ => {
                // Not a frame boundary: discard through the next
                // terminator, or give up on a runaway buffer.
                let raw = u16::from_be_bytes(marker);
                if Self::resync(src) || src.len() >= self.max_frame_size {
                    if src.len() >= self.max_frame_size {
                        src.clear();
                    }
                    return Err(Error::UnknownStart(raw));
                }
                return Ok(None);
            }
        };

        if src.len() < 2 + width {
            return Ok(None);
        }
        let length = match width {
            1 => src[2] as usize,
            _ => u16::from_be_bytes([src[2], src[3]]) as usize,
        };
        let total = 2 + width + length + END_MARKER.len();

        if length < LENGTH_OVERHEAD || total > self.max_frame_size {
            Self::resync(src);
            return Err(Error::FramingError(format!(
                "implausible declared length {length}"
            )));
        }

        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        let frame_bytes = src.split_to(total);
        trace!(direction = "recv", frame = %hex::encode(&frame_bytes), "frame bytes");
        match Frame::decode_with_secret(&frame_bytes, self.secret) {
            Ok(frame) => Ok(Some(frame)),
            Err(e) => {
                // Keep the raw bytes; they are the only way to diagnose
                // field traffic the parser refused.
                warn!(frame = %hex::encode(&frame_bytes), error = %e, "frame rejected");
                Err(e)
            }
        }
    }
}

impl Encoder<Frame> for TrackerCodec {
    type Error = Error;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<()> {
        let encoded = item.encode_with_secret(self.secret)?;
        if encoded.len() > self.max_frame_size {
            return Err(Error::FrameTooLarge {
                size: encoded.len(),
                max: self.max_frame_size,
            });
        }
        trace!(direction = "send", frame = %hex::encode(&encoded), "frame bytes");
        dst.extend_from_slice(&encoded);
        Ok(())
    }
}
