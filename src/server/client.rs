//! Minimal framed client
//!
//! Speaks the same length-prefixed JSON protocol as the server. Used by the
//! end-to-end tests and handy for scripting against a running server.

use crate::io::wire::{
    decode_response, encode_request, frame_codec, Request, Response, DEFAULT_MAX_FRAME_BYTES,
};
use crate::types::{LedgerError, Role};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio_util::codec::{Framed, LengthDelimitedCodec};

/// One client connection, and therefore one server session
pub struct LedgerClient {
    framed: Framed<TcpStream, LengthDelimitedCodec>,
}

impl LedgerClient {
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self, LedgerError> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self {
            framed: Framed::new(stream, frame_codec(DEFAULT_MAX_FRAME_BYTES)),
        })
    }

    /// Send one request and wait for its response
    pub async fn send(&mut self, request: &Request) -> Result<Response, LedgerError> {
        self.send_raw(encode_request(request)?).await
    }

    /// Send an arbitrary frame body and wait for the response
    pub async fn send_raw(&mut self, body: Bytes) -> Result<Response, LedgerError> {
        self.framed.send(body).await?;
        let frame = self
            .framed
            .next()
            .await
            .ok_or_else(|| LedgerError::IoError {
                message: "server closed the connection".to_string(),
            })??;
        decode_response(&frame)
    }

    pub async fn login(
        &mut self,
        username: &str,
        password: &str,
        role: Role,
    ) -> Result<Response, LedgerError> {
        self.send(&Request::Login {
            username: username.to_string(),
            password: password.to_string(),
            role,
        })
        .await
    }
}
