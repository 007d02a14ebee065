//! Stream framing for [`Message`]s.
//!
//! Frame layout: a big-endian `u32` payload length followed by the
//! bincode-encoded message. The length prefix lets a reader pull exactly one
//! message off a byte stream no matter how the transport splits it.

use crate::protocol::Message;
use crate::MAX_FRAME_LEN;
use bincode::{deserialize, serialize};
use std::fmt;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

#[derive(Debug)]
pub enum ProtocolError {
    /// Transport failure other than an orderly close.
    Io(io::Error),
    /// Peer closed or reset the stream.
    Closed,
    Encode(bincode::Error),
    /// A complete frame arrived but its payload is not a valid message.
    Decode(bincode::Error),
    /// Declared frame length exceeds [`MAX_FRAME_LEN`]; the stream cannot be resynchronised.
    FrameTooLarge(usize),
}

impl ProtocolError {
    /// True when the stream is unusable and the connection must be dropped.
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self,
            ProtocolError::Io(_) | ProtocolError::Closed | ProtocolError::FrameTooLarge(_)
        )
    }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::Io(e) => write!(f, "transport error: {}", e),
            ProtocolError::Closed => write!(f, "connection closed by peer"),
            ProtocolError::Encode(e) => write!(f, "failed to encode message: {}", e),
            ProtocolError::Decode(e) => write!(f, "failed to decode message: {}", e),
            ProtocolError::FrameTooLarge(len) => {
                write!(f, "frame of {} bytes exceeds limit of {}", len, MAX_FRAME_LEN)
            }
        }
    }
}

impl std::error::Error for ProtocolError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProtocolError::Io(e) => Some(e),
            ProtocolError::Encode(e) | ProtocolError::Decode(e) => Some(&**e),
            _ => None,
        }
    }
}

impl From<io::Error> for ProtocolError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe => ProtocolError::Closed,
            _ => ProtocolError::Io(e),
        }
    }
}

/// Encodes `message` into a complete frame, length prefix included.
pub fn encode_message(message: &Message) -> Result<Vec<u8>, ProtocolError> {
    let payload = serialize(message).map_err(ProtocolError::Encode)?;
    if payload.len() > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge(payload.len()));
    }

    let mut frame = Vec::with_capacity(4 + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Decodes a frame payload (without its length prefix).
pub fn decode_payload(payload: &[u8]) -> Result<Message, ProtocolError> {
    deserialize(payload).map_err(ProtocolError::Decode)
}

/// Reads exactly one frame from `reader`.
///
/// A `Decode` error consumes the bad frame, so the next call starts on a
/// frame boundary again.
pub async fn read_message<R>(reader: &mut R) -> Result<Message, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let len = reader.read_u32().await? as usize;
    if len > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge(len));
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    decode_payload(&payload)
}

pub async fn write_message<W>(writer: &mut W, message: &Message) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode_message(message)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{PlayerInfo, PlayerState, WorldInfo};
    use crate::world::Projectile;
    use crate::Vec2;

    fn sample_player(id: u32) -> PlayerInfo {
        PlayerInfo {
            id,
            position: Vec2::new(123.5, -7.25),
            velocity: Vec2::new(-1.5, 0.125),
            angle: 42.0,
            state: PlayerState::Dead,
            attacking: true,
        }
    }

    fn sample_messages() -> Vec<Message> {
        let mut projectile = Projectile::new(1, Vec2::new(10.0, 10.0), Vec2::new(5.0, 0.0), 0.0);
        projectile.position = Vec2::new(35.0, 10.0);

        vec![
            Message::GameInfoRequest,
            Message::GameInfoSend(WorldInfo {
                players: vec![sample_player(0), sample_player(1)],
                projectiles: vec![projectile],
            }),
            Message::PlayerInfoBroadcast(sample_player(2)),
            Message::PlayerInfo(sample_player(3)),
            Message::NewPlayerInfo(PlayerInfo::new(4, Vec2::new(399.0, 0.0))),
        ]
    }

    #[test]
    fn test_every_kind_roundtrips() {
        for message in sample_messages() {
            let frame = encode_message(&message).unwrap();
            let decoded = decode_payload(&frame[4..]).unwrap();
            assert_eq!(decoded, message);
        }
    }

    #[test]
    fn test_length_prefix_matches_payload() {
        let frame = encode_message(&Message::PlayerInfo(sample_player(9))).unwrap();
        let declared = u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]) as usize;
        assert_eq!(declared, frame.len() - 4);
    }

    #[test]
    fn test_garbage_payload_is_decode_error() {
        let err = decode_payload(&[0xFF, 0xFF, 0xFF, 0xFF]).unwrap_err();
        assert!(matches!(err, ProtocolError::Decode(_)));
        assert!(!err.is_disconnect());
    }

    #[tokio::test]
    async fn test_read_reassembles_split_frames() {
        let first = encode_message(&Message::GameInfoRequest).unwrap();
        let second = encode_message(&Message::PlayerInfo(sample_player(5))).unwrap();

        // The second frame straddles three reads, the first shares a read with its start.
        let mut joined = first.clone();
        joined.extend_from_slice(&second[..3]);
        let mut reader = tokio_test::io::Builder::new()
            .read(&joined)
            .read(&second[3..10])
            .read(&second[10..])
            .build();

        assert_eq!(read_message(&mut reader).await.unwrap(), Message::GameInfoRequest);
        assert_eq!(
            read_message(&mut reader).await.unwrap(),
            Message::PlayerInfo(sample_player(5))
        );
    }

    #[tokio::test]
    async fn test_bad_frame_does_not_desync_stream() {
        let mut bytes = 4u32.to_be_bytes().to_vec();
        bytes.extend_from_slice(&[0xFF; 4]);
        bytes.extend(encode_message(&Message::GameInfoRequest).unwrap());

        let mut reader = tokio_test::io::Builder::new().read(&bytes).build();

        let err = read_message(&mut reader).await.unwrap_err();
        assert!(matches!(err, ProtocolError::Decode(_)));
        assert_eq!(read_message(&mut reader).await.unwrap(), Message::GameInfoRequest);
    }

    #[tokio::test]
    async fn test_eof_is_closed() {
        let mut reader = tokio_test::io::Builder::new().build();
        let err = read_message(&mut reader).await.unwrap_err();
        assert!(matches!(err, ProtocolError::Closed));
        assert!(err.is_disconnect());
    }

    #[tokio::test]
    async fn test_eof_mid_frame_is_closed() {
        let frame = encode_message(&Message::PlayerInfo(sample_player(1))).unwrap();
        let mut reader = tokio_test::io::Builder::new()
            .read(&frame[..frame.len() - 2])
            .build();

        let err = read_message(&mut reader).await.unwrap_err();
        assert!(matches!(err, ProtocolError::Closed));
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let header = ((MAX_FRAME_LEN + 1) as u32).to_be_bytes();
        let mut reader = tokio_test::io::Builder::new().read(&header).build();

        let err = read_message(&mut reader).await.unwrap_err();
        assert!(matches!(err, ProtocolError::FrameTooLarge(len) if len == MAX_FRAME_LEN + 1));
        assert!(err.is_disconnect());
    }

    #[tokio::test]
    async fn test_write_then_read_over_duplex() {
        let (mut client, mut server) = tokio::io::duplex(64);
        let message = Message::NewPlayerInfo(sample_player(0));

        let expected = message.clone();
        let writer = tokio::spawn(async move { write_message(&mut client, &message).await });

        assert_eq!(read_message(&mut server).await.unwrap(), expected);
        writer.await.unwrap().unwrap();
    }

    #[test]
    fn test_io_error_classification() {
        let reset: ProtocolError = io::Error::from(io::ErrorKind::ConnectionReset).into();
        assert!(matches!(reset, ProtocolError::Closed));

        let other: ProtocolError = io::Error::from(io::ErrorKind::PermissionDenied).into();
        assert!(matches!(other, ProtocolError::Io(_)));
        assert!(other.is_disconnect());
    }
}
