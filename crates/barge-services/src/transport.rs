//! Frame I/O over a byte stream.

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use barge_core::wire::{parse_header, HEADER_LEN};
use barge_core::{Message, WireError};

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bad frame: {0}")]
    Wire(#[from] WireError),
}

/// Read one frame. `Ok(None)` on a clean end of stream between frames.
pub async fn read_message<R>(reader: &mut R) -> Result<Option<Message>, TransportError>
where
    R: AsyncRead + Unpin,
{
    let mut header_buf = [0u8; HEADER_LEN];
    if reader.read(&mut header_buf[..1]).await? == 0 {
        return Ok(None);
    }
    reader.read_exact(&mut header_buf[1..]).await?;

    let header = parse_header(&header_buf)?;
    let mut payload = vec![0u8; header.length.get() as usize];
    reader.read_exact(&mut payload).await?;

    let message = Message::from_frame(&header, Bytes::from(payload))?;
    tracing::trace!(kind = message.name(), bytes = message.payload().len(), "frame in");
    Ok(Some(message))
}

/// Write one frame and flush it.
pub async fn write_message<W>(writer: &mut W, message: &Message) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    let frame = message.encode()?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    tracing::trace!(kind = message.name(), bytes = message.payload().len(), "frame out");
    Ok(())
}
