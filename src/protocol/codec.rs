use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::debug;

use crate::core::{Error, FRAME_HEX_LEN};
use super::frame::Frame;

/// Slices a hex character stream into 16-character candidate frames
///
/// The bus carries no delimiter, so alignment is taken on trust from the
/// adapter: every 16 characters form one candidate, validated later by
/// checksum. Outbound frames are written back as upper-case hex.
///
/// Whitespace before a candidate is skipped so that line-delimited captures,
/// one frame per line, replay as-is. A live adapter never sends any, and
/// whitespace inside a candidate is kept and fails validation.
#[derive(Clone, Default)]
pub struct HexFrameCodec;

impl HexFrameCodec {
    /// Creates a new hex frame codec
    pub fn new() -> Self {
        HexFrameCodec
    }
}

impl Decoder for HexFrameCodec {
    type Item = String;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let skip = src.iter().take_while(|b| b.is_ascii_whitespace()).count();
        src.advance(skip);

        if src.len() < FRAME_HEX_LEN {
            // Need more data for a full frame
            return Ok(None);
        }

        let candidate = src.split_to(FRAME_HEX_LEN);
        Ok(Some(String::from_utf8_lossy(&candidate).to_ascii_uppercase()))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(candidate) = self.decode(src)? {
            return Ok(Some(candidate));
        }
        if !src.is_empty() {
            debug!(
                remainder = %String::from_utf8_lossy(&src[..]),
                "discarding partial frame at end of stream"
            );
            src.clear();
        }
        Ok(None)
    }
}

impl Encoder<Frame> for HexFrameCodec {
    type Error = Error;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.extend_from_slice(item.to_string().as_bytes());
        Ok(())
    }
}

/// Candidate frames in one self-contained chunk; a trailing partial is dropped
pub fn split_frames(chunk: &str) -> Vec<String> {
    let mut codec = HexFrameCodec::new();
    let mut buffer = BytesMut::from(chunk.as_bytes());
    let mut frames = Vec::with_capacity(chunk.len() / FRAME_HEX_LEN);
    while let Ok(Some(candidate)) = codec.decode_eof(&mut buffer) {
        frames.push(candidate);
    }
    frames
}
