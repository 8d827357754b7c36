//! Length-prefixed frames: `[u16 LE total length incl. header][payload]`.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest payload that still fits a u16 total length.
pub const MAX_PAYLOAD: usize = 65533;

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid frame length: {0}")]
    InvalidLength(usize),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reads one frame and returns its payload (header stripped).
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>, FrameError> {
    let mut header = [0u8; 2];
    reader.read_exact(&mut header).await?;
    let total = u16::from_le_bytes(header) as usize;
    if total <= 2 || total - 2 > MAX_PAYLOAD {
        return Err(FrameError::InvalidLength(total));
    }
    let mut payload = vec![0u8; total - 2];
    reader.read_exact(&mut payload).await?;
    Ok(payload)
}

/// Writes `payload` with its length header.
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, payload: &[u8]) -> Result<(), FrameError> {
    if payload.is_empty() || payload.len() > MAX_PAYLOAD {
        return Err(FrameError::InvalidLength(payload.len() + 2));
    }
    let mut buf = Vec::with_capacity(payload.len() + 2);
    buf.extend_from_slice(&((payload.len() + 2) as u16).to_le_bytes());
    buf.extend_from_slice(payload);
    writer.write_all(&buf).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frame_roundtrip_over_duplex() {
        let (mut a, mut b) = tokio::io::duplex(256);
        write_frame(&mut a, &[29, 1, 2, 3]).await.unwrap();
        let payload = read_frame(&mut b).await.unwrap();
        assert_eq!(payload, vec![29, 1, 2, 3]);
    }

    #[tokio::test]
    async fn test_zero_length_rejected() {
        let (mut a, mut b) = tokio::io::duplex(16);
        a.write_all(&[2, 0]).await.unwrap();
        let err = read_frame(&mut b).await.unwrap_err();
        assert!(matches!(err, FrameError::InvalidLength(2)));
    }

    #[tokio::test]
    async fn test_truncated_payload_is_io_error() {
        let (mut a, mut b) = tokio::io::duplex(16);
        a.write_all(&[10, 0, 1, 2]).await.unwrap();
        drop(a);
        assert!(matches!(read_frame(&mut b).await, Err(FrameError::Io(_))));
    }
}
