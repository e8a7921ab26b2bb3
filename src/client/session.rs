#![cfg(feature = "net")]

//! Typed client sessions.
//!
//! [`NamingSession`] holds the long-lived connection to the naming
//! server; a `ConnectToServer` answer carries the address for a second,
//! direct [`DataSession`] to the storage node, which is where the bytes
//! actually flow.

use crate::wire::{AckKind, AckResponse, ClientRequest, ErrorCode, Message};
use log::debug;
use std::net::{TcpStream, ToSocketAddrs};
use thiserror::Error;

#[derive(Debug)]
pub enum RequestOutcome {
    /// The naming server handled (or proxied) the request itself.
    Done(AckResponse),
    /// The client must connect to this storage node and repeat the
    /// request there.
    Redirect { host: String, data_port: u16 },
}

pub struct NamingSession {
    stream: TcpStream,
}

impl NamingSession {
    pub fn connect(addr: impl ToSocketAddrs) -> Result<Self, ClientError> {
        Ok(Self {
            stream: TcpStream::connect(addr)?,
        })
    }

    /// Sends one request and follows the ack protocol to completion
    /// (for proxied operations this blocks until the final relayed ack).
    pub fn submit(&mut self, request: &ClientRequest) -> Result<RequestOutcome, ClientError> {
        Message::Request(request.clone()).write_to(&mut self.stream)?;
        let ack = self.read_ack()?;
        match ack.ack {
            AckKind::ConnectToServer => match Message::read_from(&mut self.stream)? {
                Message::RedirectTarget { host, data_port } => {
                    debug!("event=client_redirected host={host} port={data_port}");
                    Ok(RequestOutcome::Redirect { host, data_port })
                }
                other => Err(ClientError::unexpected("redirect target", &other)),
            },
            AckKind::Init => {
                // The naming server is proxying; the next ack is final.
                let final_ack = self.read_ack()?;
                Ok(RequestOutcome::Done(final_ack))
            }
            AckKind::Success | AckKind::Failure | AckKind::Stop => {
                Ok(RequestOutcome::Done(ack))
            }
        }
    }

    fn read_ack(&mut self) -> Result<AckResponse, ClientError> {
        match Message::read_from(&mut self.stream)? {
            Message::Ack(ack) => Ok(ack),
            other => Err(ClientError::unexpected("ack", &other)),
        }
    }
}

pub struct DataSession {
    stream: TcpStream,
}

impl DataSession {
    pub fn connect(host: &str, data_port: u16) -> Result<Self, ClientError> {
        Ok(Self {
            stream: TcpStream::connect((host, data_port))?,
        })
    }

    /// READ_FILE: returns the file contents.
    pub fn read_file(&mut self, request: &ClientRequest) -> Result<Vec<u8>, ClientError> {
        self.send_checked(request)?;
        let mut contents = Vec::new();
        loop {
            match Message::read_from(&mut self.stream)? {
                Message::FileChunk { bytes, is_last } => {
                    contents.extend_from_slice(&bytes);
                    if is_last {
                        return Ok(contents);
                    }
                }
                other => return Err(ClientError::unexpected("file chunk", &other)),
            }
        }
    }

    /// WRITE_FILE: streams `contents` and waits for the closing ack.
    pub fn write_file(
        &mut self,
        request: &ClientRequest,
        contents: &[u8],
    ) -> Result<(), ClientError> {
        self.send_checked(request)?;
        for chunk in contents.chunks(crate::wire::MAX_CHUNK_LEN) {
            Message::FileChunk {
                bytes: chunk.to_vec(),
                is_last: false,
            }
            .write_to(&mut self.stream)?;
        }
        Message::FileChunk {
            bytes: Vec::new(),
            is_last: true,
        }
        .write_to(&mut self.stream)?;
        let ack = self.read_ack()?;
        if ack.ack == AckKind::Success {
            Ok(())
        } else {
            Err(ClientError::Rejected(ack.error))
        }
    }

    /// FILE_INFO and LIST_ALL both come back as one text payload.
    pub fn fetch_text(&mut self, request: &ClientRequest) -> Result<String, ClientError> {
        self.send_checked(request)?;
        match Message::read_from(&mut self.stream)? {
            Message::InfoText { text } => Ok(text),
            other => Err(ClientError::unexpected("info text", &other)),
        }
    }

    /// Sends the request and fails fast on a rejecting ack.
    fn send_checked(&mut self, request: &ClientRequest) -> Result<(), ClientError> {
        Message::Request(request.clone()).write_to(&mut self.stream)?;
        let ack = self.read_ack()?;
        if ack.ack == AckKind::Success {
            Ok(())
        } else {
            Err(ClientError::Rejected(ack.error))
        }
    }

    fn read_ack(&mut self) -> Result<AckResponse, ClientError> {
        match Message::read_from(&mut self.stream)? {
            Message::Ack(ack) => Ok(ack),
            other => Err(ClientError::unexpected("ack", &other)),
        }
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("wire error: {0}")]
    Wire(#[from] crate::wire::WireError),
    #[error("request rejected: {0:?}")]
    Rejected(ErrorCode),
    #[error("expected {expected}, got {got} frame")]
    Unexpected {
        expected: &'static str,
        got: &'static str,
    },
}

impl ClientError {
    fn unexpected(expected: &'static str, message: &Message) -> Self {
        ClientError::Unexpected {
            expected,
            got: crate::net::message_name(message),
        }
    }
}
