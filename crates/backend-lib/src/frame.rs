// ============================
// crates/backend-lib/src/frame.rs
// ============================
//! WebSocket frame codec.
//!
//! ```text
//!  0                   1                   2                   3
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
//! |I|S|S|S|  (4)  |A|     (7)     |            (16/64)            |
//! |N|V|V|V|       |S|             |                               |
//! +-+-+-+-+-------+-+-------------+ - - - - - - - - - - - - - - - +
//! |     Masking-key (0 or 4 bytes, client frames only)            |
//! +---------------------------------------------------------------+
//! |                         Payload data                          |
//! +---------------------------------------------------------------+
//! ```
//!
//! Only whole frames are handled. FIN is not tracked and fragmented messages are not
//! reassembled; server frames are always final, unmasked and uncompressed.

use std::io;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest payload accepted from the 64-bit length form
pub const MAX_PAYLOAD_LEN: u64 = i32::MAX as u64;

const FIN: u8 = 0x80;
const MASK: u8 = 0x80;
const LEN_16: u8 = 126;
const LEN_64: u8 = 127;

/// Frame opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    Continuation,
    Text,
    Binary,
    Close,
    Ping,
    Pong,
    /// Any reserved opcode, kept so the caller can ignore it
    Reserved(u8),
}

impl OpCode {
    pub fn as_u8(self) -> u8 {
        match self {
            OpCode::Continuation => 0x0,
            OpCode::Text => 0x1,
            OpCode::Binary => 0x2,
            OpCode::Close => 0x8,
            OpCode::Ping => 0x9,
            OpCode::Pong => 0xA,
            OpCode::Reserved(code) => code & 0x0F,
        }
    }
}

impl From<u8> for OpCode {
    fn from(value: u8) -> Self {
        match value & 0x0F {
            0x0 => OpCode::Continuation,
            0x1 => OpCode::Text,
            0x2 => OpCode::Binary,
            0x8 => OpCode::Close,
            0x9 => OpCode::Ping,
            0xA => OpCode::Pong,
            other => OpCode::Reserved(other),
        }
    }
}

/// One decoded frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub opcode: OpCode,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(opcode: OpCode, payload: Vec<u8>) -> Self {
        Self { opcode, payload }
    }

    pub fn text(payload: impl Into<Vec<u8>>) -> Self {
        Self::new(OpCode::Text, payload.into())
    }

    pub fn pong() -> Self {
        Self::new(OpCode::Pong, Vec::new())
    }
}

/// Transport-level decode failures
#[derive(Error, Debug)]
pub enum FrameError {
    #[error("frame read failed: {0}")]
    Io(#[from] io::Error),

    #[error("frame_too_large: {0} bytes")]
    TooLarge(u64),
}

impl FrameError {
    /// Clean EOF and the usual "peer went away" conditions
    pub fn is_expected_disconnect(&self) -> bool {
        match self {
            FrameError::Io(err) => matches!(
                err.kind(),
                io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::NotConnected
            ),
            FrameError::TooLarge(_) => false,
        }
    }
}

/// XOR `payload` in place with the 4-byte masking key
pub fn apply_mask(payload: &mut [u8], mask: [u8; 4]) {
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte ^= mask[i % 4];
    }
}

fn push_length(buf: &mut Vec<u8>, mask_bit: u8, len: usize) {
    if len < LEN_16 as usize {
        buf.push(mask_bit | len as u8);
    } else if len <= u16::MAX as usize {
        buf.push(mask_bit | LEN_16);
        buf.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        buf.push(mask_bit | LEN_64);
        buf.extend_from_slice(&(len as u64).to_be_bytes());
    }
}

/// Encode a final, unmasked server frame
pub fn encode_frame(opcode: OpCode, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(payload.len() + 10);
    buf.push(FIN | opcode.as_u8());
    push_length(&mut buf, 0, payload.len());
    buf.extend_from_slice(payload);
    buf
}

/// Encode a final frame masked with `mask`, as a client would send it
#[cfg(test)]
pub(crate) fn encode_masked_frame(opcode: OpCode, payload: &[u8], mask: [u8; 4]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(payload.len() + 14);
    buf.push(FIN | opcode.as_u8());
    push_length(&mut buf, MASK, payload.len());
    buf.extend_from_slice(&mask);
    let start = buf.len();
    buf.extend_from_slice(payload);
    apply_mask(&mut buf[start..], mask);
    buf
}

/// Read exactly one frame, unmasking the payload if needed
pub async fn read_frame<R>(reader: &mut R) -> Result<Frame, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut head = [0u8; 2];
    reader.read_exact(&mut head).await?;

    let opcode = OpCode::from(head[0]);
    let masked = head[1] & MASK != 0;
    let len = match head[1] & 0x7F {
        LEN_16 => {
            let mut ext = [0u8; 2];
            reader.read_exact(&mut ext).await?;
            u64::from(u16::from_be_bytes(ext))
        },
        LEN_64 => {
            let mut ext = [0u8; 8];
            reader.read_exact(&mut ext).await?;
            let len = u64::from_be_bytes(ext);
            if len > MAX_PAYLOAD_LEN {
                return Err(FrameError::TooLarge(len));
            }
            len
        },
        short => u64::from(short),
    };

    let mut mask = [0u8; 4];
    if masked {
        reader.read_exact(&mut mask).await?;
    }

    // Grow with the data actually received instead of trusting the declared length
    let mut payload = Vec::with_capacity(len.min(64 * 1024) as usize);
    let read = (&mut *reader).take(len).read_to_end(&mut payload).await?;
    if (read as u64) < len {
        return Err(FrameError::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "connection closed mid-frame",
        )));
    }

    if masked {
        apply_mask(&mut payload, mask);
    }
    Ok(Frame { opcode, payload })
}

/// Write one unmasked frame and flush it
pub async fn write_frame<W>(writer: &mut W, opcode: OpCode, payload: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&encode_frame(opcode, payload)).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn decode(bytes: Vec<u8>) -> Result<Frame, FrameError> {
        let mut cursor = io::Cursor::new(bytes);
        read_frame(&mut cursor).await
    }

    #[test]
    fn test_length_tiers() {
        let short = encode_frame(OpCode::Text, &[b'a'; 125]);
        assert_eq!(&short[..2], &[0x81, 125]);
        assert_eq!(short.len(), 2 + 125);

        let medium = encode_frame(OpCode::Text, &[b'a'; 126]);
        assert_eq!(&medium[..4], &[0x81, 126, 0x00, 126]);

        let edge = encode_frame(OpCode::Binary, &vec![0u8; 65535]);
        assert_eq!(&edge[..4], &[0x82, 126, 0xFF, 0xFF]);

        let long = encode_frame(OpCode::Text, &vec![0u8; 65536]);
        assert_eq!(long[1], 127);
        assert_eq!(&long[2..10], &65536u64.to_be_bytes());
    }

    #[test]
    fn test_pong_has_no_payload() {
        assert_eq!(encode_frame(OpCode::Pong, &[]), vec![0x8A, 0x00]);
    }

    #[tokio::test]
    async fn test_large_text_frame_roundtrip() {
        // 70000 bytes forces the 64-bit length form
        let payload: Vec<u8> = (0..70_000u32).map(|i| (i % 251) as u8).collect();
        let frame = decode(encode_frame(OpCode::Text, &payload)).await.unwrap();
        assert_eq!(frame.opcode, OpCode::Text);
        assert_eq!(frame.payload, payload);
    }

    #[tokio::test]
    async fn test_masked_client_frame_is_unmasked() {
        let mask = [0x37, 0xfa, 0x21, 0x3d];
        let bytes = encode_masked_frame(OpCode::Text, b"Hello", mask);
        // RFC 6455 section 5.7 sample
        assert_eq!(
            bytes,
            vec![0x81, 0x85, 0x37, 0xfa, 0x21, 0x3d, 0x7f, 0x9f, 0x4d, 0x51, 0x58]
        );
        let frame = decode(bytes).await.unwrap();
        assert_eq!(frame.payload, b"Hello");
    }

    #[tokio::test]
    async fn test_masked_medium_frame() {
        let payload = vec![b'x'; 300];
        let frame = decode(encode_masked_frame(OpCode::Text, &payload, [1, 2, 3, 4]))
            .await
            .unwrap();
        assert_eq!(frame.payload, payload);
    }

    #[tokio::test]
    async fn test_oversized_length_rejected() {
        let mut bytes = vec![0x82, 127];
        bytes.extend_from_slice(&(MAX_PAYLOAD_LEN + 1).to_be_bytes());
        let err = decode(bytes).await.unwrap_err();
        assert!(matches!(err, FrameError::TooLarge(len) if len == MAX_PAYLOAD_LEN + 1));
        assert!(err.to_string().starts_with("frame_too_large"));
        assert!(!err.is_expected_disconnect());
    }

    #[tokio::test]
    async fn test_short_reads_are_expected_disconnects() {
        let err = decode(Vec::new()).await.unwrap_err();
        assert!(err.is_expected_disconnect());

        // Header promises 10 bytes, only 3 arrive
        let err = decode(vec![0x81, 10, b'a', b'b', b'c']).await.unwrap_err();
        assert!(err.is_expected_disconnect());

        // Truncated mask key
        let err = decode(vec![0x81, 0x85, 0x01]).await.unwrap_err();
        assert!(err.is_expected_disconnect());
    }

    #[tokio::test]
    async fn test_control_and_reserved_opcodes() {
        let frame = decode(encode_masked_frame(OpCode::Ping, b"", [9, 9, 9, 9]))
            .await
            .unwrap();
        assert_eq!(frame.opcode, OpCode::Ping);
        assert!(frame.payload.is_empty());

        let frame = decode(vec![0x83, 0x00]).await.unwrap();
        assert_eq!(frame.opcode, OpCode::Reserved(0x3));
    }

    #[tokio::test]
    async fn test_back_to_back_frames() {
        let mut bytes = encode_masked_frame(OpCode::Text, b"one", [1, 1, 1, 1]);
        bytes.extend(encode_masked_frame(OpCode::Close, b"", [2, 2, 2, 2]));
        let mut cursor = io::Cursor::new(bytes);
        assert_eq!(read_frame(&mut cursor).await.unwrap().payload, b"one");
        assert_eq!(read_frame(&mut cursor).await.unwrap().opcode, OpCode::Close);
    }

    #[tokio::test]
    async fn test_write_frame_flushes_whole_frame() {
        let mut out = Vec::new();
        write_frame(&mut out, OpCode::Text, b"{}").await.unwrap();
        assert_eq!(out, vec![0x81, 0x02, b'{', b'}']);
    }
}
