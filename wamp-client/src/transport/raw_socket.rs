use std::fmt::Display;

use anyhow::{
    Error,
    Result,
};
use bytes::{
    Buf,
    BufMut,
    BytesMut,
};
use log::debug;
use thiserror::Error;
use tokio::io::{
    AsyncRead,
    AsyncReadExt,
    AsyncWrite,
    AsyncWriteExt,
};
use tokio_util::codec::{
    Decoder,
    Encoder,
    Framed,
};

use crate::{
    serializer::serializer::SerializerType,
    transport::transport::TransportData,
};

const MAGIC: u8 = 0x7f;
const HEADER_LENGTH: usize = 4;
const MAX_FRAME_LENGTH: usize = 0xff_ffff;

/// The largest allowed maximum length exponent.
pub const MAX_LENGTH_EXPONENT: u8 = 15;

/// The maximum frame length announced by a length exponent.
pub fn max_length_for_exponent(exponent: u8) -> usize {
    (1usize << (9 + exponent.min(MAX_LENGTH_EXPONENT) as usize)).min(MAX_FRAME_LENGTH)
}

/// Error code sent by a router rejecting a RawSocket handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawSocketErrorCode {
    Illegal,
    SerializerUnsupported,
    MaxLengthUnacceptable,
    ReservedBitsUsed,
    MaxConnectionCountReached,
    Unknown(u8),
}

impl From<u8> for RawSocketErrorCode {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::Illegal,
            1 => Self::SerializerUnsupported,
            2 => Self::MaxLengthUnacceptable,
            3 => Self::ReservedBitsUsed,
            4 => Self::MaxConnectionCountReached,
            code => Self::Unknown(code),
        }
    }
}

impl Display for RawSocketErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Illegal => write!(f, "illegal"),
            Self::SerializerUnsupported => write!(f, "serializer unsupported"),
            Self::MaxLengthUnacceptable => write!(f, "maximum message length unacceptable"),
            Self::ReservedBitsUsed => write!(f, "use of reserved bits"),
            Self::MaxConnectionCountReached => write!(f, "maximum connection count reached"),
            Self::Unknown(code) => write!(f, "unknown error code {code}"),
        }
    }
}

/// Error for a failed RawSocket handshake.
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("invalid maximum length exponent {0}")]
    InvalidMaxLengthExponent(u8),
    #[error("router replied with invalid magic byte {0:#04x}")]
    InvalidMagic(u8),
    #[error("router rejected handshake: {0}")]
    Rejected(RawSocketErrorCode),
    #[error("router selected serializer {found}, expected {expected}")]
    SerializerMismatch { expected: u8, found: u8 },
}

/// Frame limits negotiated by the RawSocket handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawSocketLimits {
    /// The largest frame this peer accepts.
    pub max_receive_length: usize,
    /// The largest frame the router accepts.
    pub max_send_length: usize,
}

/// Performs the client side of the RawSocket handshake.
pub async fn client_handshake<S>(
    stream: &mut S,
    serializer_type: SerializerType,
    max_length_exponent: u8,
) -> Result<RawSocketLimits>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if max_length_exponent > MAX_LENGTH_EXPONENT {
        return Err(HandshakeError::InvalidMaxLengthExponent(max_length_exponent).into());
    }
    let serializer_id = serializer_type.raw_socket_id();
    stream
        .write_all(&[MAGIC, (max_length_exponent << 4) | serializer_id, 0, 0])
        .await?;
    stream.flush().await?;

    let mut reply = [0u8; HEADER_LENGTH];
    stream.read_exact(&mut reply).await?;
    if reply[0] != MAGIC {
        return Err(HandshakeError::InvalidMagic(reply[0]).into());
    }
    let router_serializer = reply[1] & 0x0f;
    let router_exponent = reply[1] >> 4;
    if router_serializer == 0 {
        return Err(HandshakeError::Rejected(RawSocketErrorCode::from(router_exponent)).into());
    }
    if router_serializer != serializer_id {
        return Err(HandshakeError::SerializerMismatch {
            expected: serializer_id,
            found: router_serializer,
        }
        .into());
    }

    let limits = RawSocketLimits {
        max_receive_length: max_length_for_exponent(max_length_exponent),
        max_send_length: max_length_for_exponent(router_exponent),
    };
    debug!("RawSocket handshake complete: {limits:?}");
    Ok(limits)
}

/// Performs the RawSocket handshake over a stream and frames it for WAMP messaging.
pub async fn connect<S>(
    mut stream: S,
    serializer_type: SerializerType,
    max_length_exponent: u8,
) -> Result<Framed<S, RawSocketCodec>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let limits = client_handshake(&mut stream, serializer_type, max_length_exponent).await?;
    Ok(Framed::new(stream, RawSocketCodec::new(limits)))
}

/// A codec for RawSocket frames.
///
/// Each frame has a 4-byte header: the frame type in the low 3 bits of the first byte (the rest
/// are reserved), followed by the payload length as a 24-bit big-endian integer.
#[derive(Debug)]
pub struct RawSocketCodec {
    limits: RawSocketLimits,
}

impl RawSocketCodec {
    pub fn new(limits: RawSocketLimits) -> Self {
        Self { limits }
    }
}

impl Decoder for RawSocketCodec {
    type Item = TransportData;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if src.len() < HEADER_LENGTH {
            return Ok(None);
        }
        let frame_type = src[0];
        if frame_type & 0xf8 != 0 {
            return Err(Error::msg(format!(
                "frame header uses reserved bits: {frame_type:#04x}"
            )));
        }
        let length = u32::from_be_bytes([0, src[1], src[2], src[3]]) as usize;
        if length > self.limits.max_receive_length {
            return Err(Error::msg(format!(
                "frame of length {length} exceeds maximum of {}",
                self.limits.max_receive_length
            )));
        }
        if src.len() < HEADER_LENGTH + length {
            src.reserve(HEADER_LENGTH + length - src.len());
            return Ok(None);
        }

        src.advance(HEADER_LENGTH);
        let payload = src.split_to(length).to_vec();
        match frame_type {
            0 => Ok(Some(TransportData::Message(payload))),
            1 => Ok(Some(TransportData::Ping(payload))),
            2 => Ok(Some(TransportData::Pong(payload))),
            _ => Err(Error::msg(format!("invalid frame type {frame_type}"))),
        }
    }
}

impl Encoder<TransportData> for RawSocketCodec {
    type Error = Error;

    fn encode(&mut self, item: TransportData, dst: &mut BytesMut) -> Result<()> {
        let (frame_type, payload) = match item {
            TransportData::Message(payload) => (0u8, payload),
            TransportData::Ping(payload) => (1u8, payload),
            TransportData::Pong(payload) => (2u8, payload),
        };
        if payload.len() > self.limits.max_send_length {
            return Err(Error::msg(format!(
                "frame of length {} exceeds maximum of {}",
                payload.len(),
                self.limits.max_send_length
            )));
        }
        let length = (payload.len() as u32).to_be_bytes();
        dst.reserve(HEADER_LENGTH + payload.len());
        dst.put_u8(frame_type);
        dst.put_slice(&length[1..]);
        dst.put_slice(&payload);
        Ok(())
    }
}

#[cfg(test)]
mod raw_socket_test {
    use bytes::BytesMut;
    use tokio::io::{
        AsyncReadExt,
        AsyncWriteExt,
    };
    use tokio_util::codec::{
        Decoder,
        Encoder,
    };

    use crate::{
        serializer::serializer::SerializerType,
        transport::{
            raw_socket::{
                HandshakeError,
                RawSocketCodec,
                RawSocketErrorCode,
                RawSocketLimits,
                client_handshake,
                max_length_for_exponent,
            },
            transport::TransportData,
        },
    };

    fn codec(max_length: usize) -> RawSocketCodec {
        RawSocketCodec::new(RawSocketLimits {
            max_receive_length: max_length,
            max_send_length: max_length,
        })
    }

    #[test]
    fn computes_max_length_from_exponent() {
        assert_eq!(max_length_for_exponent(0), 512);
        assert_eq!(max_length_for_exponent(9), 262144);
        assert_eq!(max_length_for_exponent(15), 0xffffff);
    }

    #[test]
    fn decodes_frames_split_across_reads() {
        let mut codec = codec(1024);
        let mut buffer = BytesMut::from(&[0u8, 0, 0, 3, b'a'][..]);
        assert_matches::assert_matches!(codec.decode(&mut buffer), Ok(None));
        buffer.extend_from_slice(&[b'b', b'c', 1, 0, 0, 1]);
        assert_matches::assert_matches!(codec.decode(&mut buffer), Ok(Some(TransportData::Message(payload))) => {
            assert_eq!(payload, b"abc");
        });
        assert_matches::assert_matches!(codec.decode(&mut buffer), Ok(None));
        buffer.extend_from_slice(&[b'x']);
        assert_matches::assert_matches!(codec.decode(&mut buffer), Ok(Some(TransportData::Ping(payload))) => {
            assert_eq!(payload, b"x");
        });
        assert!(buffer.is_empty());
    }

    #[test]
    fn rejects_invalid_frames() {
        let mut codec = codec(4);
        let mut buffer = BytesMut::from(&[0u8, 0, 0, 5][..]);
        assert_matches::assert_matches!(codec.decode(&mut buffer), Err(err) => {
            assert!(err.to_string().contains("exceeds maximum of 4"));
        });

        let mut buffer = BytesMut::from(&[0x08u8, 0, 0, 0][..]);
        assert_matches::assert_matches!(codec.decode(&mut buffer), Err(err) => {
            assert!(err.to_string().contains("reserved bits"));
        });

        let mut buffer = BytesMut::from(&[3u8, 0, 0, 0][..]);
        assert_matches::assert_matches!(codec.decode(&mut buffer), Err(err) => {
            assert!(err.to_string().contains("invalid frame type 3"));
        });

        let mut buffer = BytesMut::new();
        assert_matches::assert_matches!(
            codec.encode(TransportData::Message(vec![0; 5]), &mut buffer),
            Err(_)
        );
    }

    #[test]
    fn encodes_frame_headers() {
        let mut codec = codec(1024);
        let mut buffer = BytesMut::new();
        codec
            .encode(TransportData::Pong(vec![1, 2]), &mut buffer)
            .unwrap();
        codec
            .encode(TransportData::Message(vec![9; 300]), &mut buffer)
            .unwrap();
        assert_eq!(&buffer[..6], &[2, 0, 0, 2, 1, 2]);
        assert_eq!(&buffer[6..10], &[0, 0, 0x01, 0x2c]);
        assert_eq!(buffer.len(), 10 + 300);
    }

    #[tokio::test]
    async fn completes_handshake_with_echoing_router() {
        let (mut client, mut router) = tokio::io::duplex(64);
        let router = tokio::spawn(async move {
            let mut request = [0u8; 4];
            router.read_exact(&mut request).await.unwrap();
            router.write_all(&[0x7f, 0xf2, 0, 0]).await.unwrap();
            request
        });
        let limits = client_handshake(&mut client, SerializerType::MessagePack, 9)
            .await
            .unwrap();
        assert_eq!(router.await.unwrap(), [0x7f, 0x92, 0, 0]);
        assert_eq!(
            limits,
            RawSocketLimits {
                max_receive_length: 262144,
                max_send_length: 0xffffff,
            }
        );
    }

    #[tokio::test]
    async fn fails_handshake_on_rejection() {
        let (mut client, mut router) = tokio::io::duplex(64);
        tokio::spawn(async move {
            let mut request = [0u8; 4];
            router.read_exact(&mut request).await.unwrap();
            router.write_all(&[0x7f, 0x10, 0, 0]).await.unwrap();
        });
        assert_matches::assert_matches!(
            client_handshake(&mut client, SerializerType::MessagePack, 9).await,
            Err(err) => {
                assert_matches::assert_matches!(
                    err.downcast_ref::<HandshakeError>(),
                    Some(HandshakeError::Rejected(RawSocketErrorCode::SerializerUnsupported))
                );
            }
        );
    }

    #[tokio::test]
    async fn fails_handshake_on_invalid_exponent() {
        let (mut client, _router) = tokio::io::duplex(64);
        assert_matches::assert_matches!(
            client_handshake(&mut client, SerializerType::Json, 16).await,
            Err(err) => {
                assert_eq!(err.to_string(), "invalid maximum length exponent 16");
            }
        );
    }
}
