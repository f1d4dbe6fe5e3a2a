//! CBOR-framed codec carrying [`dawn_protocol::Frame`] over libp2p's
//! `request_response` protocol.
//!
//! Wire format per message: `[4 bytes big-endian length][CBOR payload]`.
//! Optionally pads the payload to a configured block size and sleeps a
//! random jitter before writing, for the privacy mode `node/configure_privacy`
//! can turn on.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dawn_protocol::Frame;
use futures::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use libp2p::{request_response, StreamProtocol};
use rand::Rng;

const MAX_MSG_BYTES: usize = 8 * 1024 * 1024;

pub const DAWN_PROTO: StreamProtocol = StreamProtocol::new("/dawn/frame/1.0.0");

/// Optional traffic-analysis resistance applied at the codec layer:
/// padding every outbound frame to a multiple of `pad_to_bytes`, and
/// sleeping a random duration in `[jitter_min_ms, jitter_max_ms)` before
/// each send. Both default to off.
#[derive(Debug, Clone, Default)]
pub struct PrivacyConfig {
    pub pad_to_bytes: Option<usize>,
    pub jitter_ms: Option<(u64, u64)>,
}

pub fn cbor_encode<T: serde::Serialize>(value: &T) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
    Ok(buf)
}

pub fn cbor_decode<T: for<'de> serde::Deserialize<'de>>(data: &[u8]) -> io::Result<T> {
    ciborium::from_reader(data)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))
}

fn pad(mut payload: Vec<u8>, pad_to_bytes: Option<usize>) -> Vec<u8> {
    let Some(block) = pad_to_bytes else {
        return payload;
    };
    if block == 0 {
        return payload;
    }
    // Length-prefix the real size so padding can be stripped on read.
    let real_len = payload.len() as u32;
    let mut framed = real_len.to_be_bytes().to_vec();
    framed.append(&mut payload);
    let remainder = framed.len() % block;
    if remainder != 0 {
        framed.resize(framed.len() + (block - remainder), 0);
    }
    framed
}

fn unpad(framed: Vec<u8>, padded: bool) -> io::Result<Vec<u8>> {
    if !padded {
        return Ok(framed);
    }
    if framed.len() < 4 {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "padded frame too short"));
    }
    let mut len_buf = [0u8; 4];
    len_buf.copy_from_slice(&framed[..4]);
    let real_len = u32::from_be_bytes(len_buf) as usize;
    if real_len > framed.len() - 4 {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "corrupt padding length"));
    }
    Ok(framed[4..4 + real_len].to_vec())
}

async fn write_framed<W, T>(io: &mut W, value: &T, privacy: &PrivacyConfig) -> io::Result<()>
where
    W: AsyncWrite + Unpin + Send,
    T: serde::Serialize,
{
    if let Some((min_ms, max_ms)) = privacy.jitter_ms {
        if max_ms > min_ms {
            let wait = rand::thread_rng().gen_range(min_ms..max_ms);
            tokio::time::sleep(Duration::from_millis(wait)).await;
        }
    }

    let encoded = cbor_encode(value)?;
    let padded = privacy.pad_to_bytes.is_some();
    let payload = pad(encoded, privacy.pad_to_bytes);
    if payload.len() > MAX_MSG_BYTES {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "message too large"));
    }
    let len = payload.len() as u32;
    io.write_all(&len.to_be_bytes()).await?;
    io.write_all(&[padded as u8]).await?;
    io.write_all(&payload).await?;
    io.close().await
}

async fn read_framed<R, T>(io: &mut R) -> io::Result<T>
where
    R: AsyncRead + Unpin + Send,
    T: for<'de> serde::Deserialize<'de>,
{
    let mut len_buf = [0u8; 4];
    io.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_MSG_BYTES {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "incoming message too large",
        ));
    }
    let mut padded_flag = [0u8; 1];
    io.read_exact(&mut padded_flag).await?;
    let mut payload = vec![0u8; len];
    io.read_exact(&mut payload).await?;
    let unpadded = unpad(payload, padded_flag[0] != 0)?;
    cbor_decode(&unpadded)
}

/// libp2p `request_response::Codec` exchanging CBOR-framed [`Frame`] values.
/// Both directions carry the same envelope type, since a JSON-RPC frame is
/// self-describing (request/notification/response are distinguished by
/// shape, not by which side of the wire they travel on).
#[derive(Clone, Default, Debug)]
pub struct DawnCodec {
    pub privacy: Arc<PrivacyConfig>,
}

#[async_trait]
impl request_response::Codec for DawnCodec {
    type Protocol = StreamProtocol;
    type Request = Frame;
    type Response = Frame;

    async fn read_request<T>(&mut self, _proto: &StreamProtocol, io: &mut T) -> io::Result<Frame>
    where
        T: AsyncRead + Unpin + Send,
    {
        read_framed(io).await
    }

    async fn read_response<T>(&mut self, _proto: &StreamProtocol, io: &mut T) -> io::Result<Frame>
    where
        T: AsyncRead + Unpin + Send,
    {
        read_framed(io).await
    }

    async fn write_request<T>(
        &mut self,
        _proto: &StreamProtocol,
        io: &mut T,
        req: Frame,
    ) -> io::Result<()>
    where
        T: AsyncWrite + Unpin + Send,
    {
        write_framed(io, &req, &self.privacy).await
    }

    async fn write_response<T>(
        &mut self,
        _proto: &StreamProtocol,
        io: &mut T,
        resp: Frame,
    ) -> io::Result<()>
    where
        T: AsyncWrite + Unpin + Send,
    {
        write_framed(io, &resp, &self.privacy).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dawn_protocol::Message;
    use serde_json::json;

    #[test]
    fn cbor_round_trips_a_frame() {
        let frame = Frame::Single(Message::request(1, "node/get_info", None));
        let encoded = cbor_encode(&frame).unwrap();
        let decoded: Frame = cbor_decode(&encoded).unwrap();
        match decoded {
            Frame::Single(msg) => assert_eq!(msg.method(), Some("node/get_info")),
            Frame::Batch(_) => panic!("expected single"),
        }
    }

    #[test]
    fn padding_round_trips() {
        let payload = cbor_encode(&json!({"a": 1})).unwrap();
        let original_len = payload.len();
        let padded = pad(payload, Some(64));
        assert_eq!(padded.len() % 64, 0);
        let unpadded = unpad(padded, true).unwrap();
        assert_eq!(unpadded.len(), original_len);
    }

    #[test]
    fn no_padding_is_a_no_op() {
        let payload = cbor_encode(&json!({"a": 1})).unwrap();
        let result = pad(payload.clone(), None);
        assert_eq!(result, payload);
    }
}
