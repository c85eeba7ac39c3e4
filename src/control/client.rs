//! Client side of the control protocol.

use std::io;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};

use super::{ControlCommand, MAX_LINE_LENGTH};

/// One connection to a control server.
#[derive(Debug)]
pub struct ControlClient {
    framed: Framed<TcpStream, LinesCodec>,
}

impl ControlClient {
    /// Connect to the control server at `addr`.
    ///
    /// # Errors
    ///
    /// Returns any error raised while connecting.
    pub async fn connect(addr: impl ToSocketAddrs) -> io::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self {
            framed: Framed::new(stream, LinesCodec::new_with_max_length(MAX_LINE_LENGTH)),
        })
    }

    /// Send `command` and wait for the reply line.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails or closes before replying.
    pub async fn request(&mut self, command: &ControlCommand) -> io::Result<String> {
        self.request_line(&command.to_string()).await
    }

    /// Send a raw request line and wait for the reply line.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails or closes before replying.
    pub async fn request_line(&mut self, line: &str) -> io::Result<String> {
        self.framed.send(line).await.map_err(into_io)?;
        match self.framed.next().await {
            Some(reply) => reply.map_err(into_io),
            None => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "control server closed the connection",
            )),
        }
    }
}

fn into_io(err: LinesCodecError) -> io::Error {
    match err {
        LinesCodecError::Io(err) => err,
        LinesCodecError::MaxLineLengthExceeded => io::Error::new(io::ErrorKind::InvalidData, err),
    }
}
