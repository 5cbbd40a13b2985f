use anyhow::{
    Error,
    Result,
};
use serde_json::Value;
use tokio::io::{
    AsyncRead,
    AsyncReadExt,
    AsyncWrite,
    AsyncWriteExt,
};

const MAGIC: u8 = 0x7f;
const JSON_SERIALIZER: u8 = 1;
const MESSAGE_PACK_SERIALIZER: u8 = 2;

/// Frame types on a RawSocket connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    Message = 0,
    Ping = 1,
    Pong = 2,
}

impl TryFrom<u8> for FrameType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Message),
            1 => Ok(Self::Ping),
            2 => Ok(Self::Pong),
            _ => Err(Error::msg(format!("invalid frame type {value}"))),
        }
    }
}

/// A scripted router on the other end of a RawSocket connection.
///
/// Messages are written and read as JSON values, so tests can write them out literally. On the
/// wire they use whichever serializer the client asked for in its handshake.
#[derive(Debug)]
pub struct FakeRouter<S> {
    stream: S,
    serializer: u8,
}

impl<S> FakeRouter<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Accepts the client's handshake, announcing the given maximum length exponent.
    pub async fn accept(mut stream: S, max_length_exponent: u8) -> Result<Self> {
        let mut handshake = [0u8; 4];
        stream.read_exact(&mut handshake).await?;
        if handshake[0] != MAGIC {
            return Err(Error::msg(format!("invalid magic byte {:#04x}", handshake[0])));
        }
        let serializer = handshake[1] & 0x0f;
        if serializer != JSON_SERIALIZER && serializer != MESSAGE_PACK_SERIALIZER {
            return Err(Error::msg(format!("unexpected serializer {serializer}")));
        }
        stream
            .write_all(&[MAGIC, (max_length_exponent << 4) | serializer, 0, 0])
            .await?;
        Ok(Self { stream, serializer })
    }

    /// The RawSocket serializer id agreed on in the handshake.
    pub fn serializer(&self) -> u8 {
        self.serializer
    }

    /// Rejects the client's handshake with the given error code.
    pub async fn reject(mut stream: S, error_code: u8) -> Result<()> {
        let mut handshake = [0u8; 4];
        stream.read_exact(&mut handshake).await?;
        stream.write_all(&[MAGIC, error_code << 4, 0, 0]).await?;
        Ok(())
    }

    /// Receives the next frame, or [`None`] if the client closed the connection.
    pub async fn receive_frame(&mut self) -> Result<Option<(FrameType, Vec<u8>)>> {
        let mut header = [0u8; 4];
        match self.stream.read_exact(&mut header).await {
            Ok(_) => (),
            Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(err) => return Err(err.into()),
        }
        let frame_type = FrameType::try_from(header[0])?;
        let length = u32::from_be_bytes([0, header[1], header[2], header[3]]) as usize;
        let mut payload = vec![0u8; length];
        self.stream.read_exact(&mut payload).await?;
        Ok(Some((frame_type, payload)))
    }

    /// Receives the next WAMP message, failing on any other frame.
    pub async fn receive_message(&mut self) -> Result<Value> {
        match self.receive_frame().await? {
            Some((FrameType::Message, payload)) => self.decode(&payload),
            Some((frame_type, _)) => Err(Error::msg(format!(
                "expected message frame, found {frame_type:?}"
            ))),
            None => Err(Error::msg("connection closed")),
        }
    }

    /// Sends a raw frame.
    pub async fn send_frame(&mut self, frame_type: FrameType, payload: &[u8]) -> Result<()> {
        let length = u32::try_from(payload.len())?.to_be_bytes();
        self.stream
            .write_all(&[frame_type as u8, length[1], length[2], length[3]])
            .await?;
        self.stream.write_all(payload).await?;
        Ok(())
    }

    /// Sends a WAMP message.
    pub async fn send_message(&mut self, message: Value) -> Result<()> {
        let payload = self.encode(&message)?;
        self.send_frame(FrameType::Message, &payload).await
    }

    fn encode(&self, message: &Value) -> Result<Vec<u8>> {
        match self.serializer {
            MESSAGE_PACK_SERIALIZER => Ok(rmp_serde::to_vec(message)?),
            _ => Ok(serde_json::to_vec(message)?),
        }
    }

    fn decode(&self, payload: &[u8]) -> Result<Value> {
        match self.serializer {
            MESSAGE_PACK_SERIALIZER => Ok(rmp_serde::from_slice(payload)?),
            _ => Ok(serde_json::from_slice(payload)?),
        }
    }
}
