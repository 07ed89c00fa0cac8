// Line-delimited frame transport.
//
// A frame is one line of text terminated by '\n'. The transport knows nothing
// about what the text means; the hex codec and the session sit on top of it.
// Frames longer than the transport's limit are refused in both directions, so
// a peer that never sends a newline cannot make us buffer without bound.
use crate::config::DEFAULT_MAX_FRAME_LEN;
use crate::{ChannelError, Result};

use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, ReadHalf,
    WriteHalf,
};
use tokio::net::{TcpStream, ToSocketAddrs};

pub struct FrameTransport<S> {
    reader: BufReader<ReadHalf<S>>,
    writer: WriteHalf<S>,
    peer: String,
    max_frame_len: usize,
}

impl FrameTransport<TcpStream> {
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        let peer = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        Ok(Self::new(stream, peer))
    }
}

impl<S: AsyncRead + AsyncWrite> FrameTransport<S> {
    pub fn new(stream: S, peer: impl Into<String>) -> Self {
        let (read_half, write_half) = tokio::io::split(stream);
        Self {
            reader: BufReader::new(read_half),
            writer: write_half,
            peer: peer.into(),
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }

    pub fn with_max_frame_len(mut self, max_frame_len: usize) -> Self {
        self.max_frame_len = max_frame_len;
        self
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub async fn send_frame(&mut self, frame: &str) -> Result<()> {
        self.check_frame_len(frame.len())?;
        let mut line = String::with_capacity(frame.len() + 1);
        line.push_str(frame);
        line.push('\n');
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Read the next frame. A peer that hangs up between frames yields
    /// `ConnectionClosed`; one that sends more than `max_frame_len`
    /// characters on a line yields `MalformedFrame`.
    pub async fn recv_frame(&mut self) -> Result<String> {
        // Room for the frame and its "\r\n", plus one byte to spot overruns.
        let limit = self.max_frame_len as u64 + 3;
        let mut line = Vec::new();
        let n_read = (&mut self.reader)
            .take(limit)
            .read_until(b'\n', &mut line)
            .await?;
        if n_read == 0 {
            return Err(ChannelError::ConnectionClosed);
        }
        if line.last() == Some(&b'\n') {
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
        }
        self.check_frame_len(line.len())?;
        String::from_utf8(line)
            .map_err(|_| ChannelError::MalformedFrame("frame is not valid UTF-8".to_string()))
    }

    fn check_frame_len(&self, frame_len: usize) -> Result<()> {
        if frame_len > self.max_frame_len {
            return Err(ChannelError::MalformedFrame(format!(
                "frame of {} or more characters exceeds the limit of {}",
                frame_len, self.max_frame_len
            )));
        }
        Ok(())
    }

    pub async fn close(&mut self) -> Result<()> {
        self.writer.flush().await?;
        self.writer.shutdown().await?;
        Ok(())
    }
}
