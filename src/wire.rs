//! Framed wire protocol shared by the naming server, storage nodes, and
//! clients.
//!
//! Every message travels as `[wire id: u8][payload len: u32 LE][payload]`
//! over a plain TCP stream. Payload fields are little-endian fixed-width
//! integers and u32-length-prefixed UTF-8 strings, with bounds enforced on
//! decode so a misbehaving peer cannot make us allocate unbounded buffers.

use crate::registry::ServerId;
use std::io::{self, Read, Write};
use thiserror::Error;

/// Longest path argument a request may carry.
pub const MAX_ARG_LEN: usize = 256;
/// Most paths a storage node may report in one registration or refresh.
pub const MAX_PATHS_PER_REPORT: usize = 4096;
/// Largest data payload of a single file chunk.
pub const MAX_CHUNK_LEN: usize = 4096;
/// Hard cap on any decoded frame payload.
pub const MAX_FRAME_LEN: usize = 1 << 20;

const WIRE_REQUEST: u8 = 0x01;
const WIRE_ACK: u8 = 0x02;
const WIRE_REDIRECT_TARGET: u8 = 0x03;
const WIRE_SERVER_DETAILS: u8 = 0x04;
const WIRE_PATH_REPORT: u8 = 0x05;
const WIRE_HEARTBEAT_HELLO: u8 = 0x06;
const WIRE_HEARTBEAT_PING: u8 = 0x07;
const WIRE_FILE_CHUNK: u8 = 0x08;
const WIRE_INFO_TEXT: u8 = 0x09;

/// Operation a client asks the naming server to arrange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestType {
    CreateDir,
    CreateFile,
    ReadFile,
    WriteFile,
    DeleteFile,
    DeleteDir,
    FileInfo,
    ListAll,
}

impl RequestType {
    pub fn command_word(self) -> &'static str {
        match self {
            RequestType::CreateDir => "CREATE_DIR",
            RequestType::CreateFile => "CREATE_FILE",
            RequestType::ReadFile => "READ_FILE",
            RequestType::WriteFile => "WRITE_FILE",
            RequestType::DeleteFile => "DELETE_FILE",
            RequestType::DeleteDir => "DELETE_DIR",
            RequestType::FileInfo => "FILE_INFO",
            RequestType::ListAll => "LIST_ALL",
        }
    }

    pub fn from_command_word(word: &str) -> Option<Self> {
        Some(match word {
            "CREATE_DIR" => RequestType::CreateDir,
            "CREATE_FILE" => RequestType::CreateFile,
            "READ_FILE" => RequestType::ReadFile,
            "WRITE_FILE" => RequestType::WriteFile,
            "DELETE_FILE" => RequestType::DeleteFile,
            "DELETE_DIR" => RequestType::DeleteDir,
            "FILE_INFO" => RequestType::FileInfo,
            "LIST_ALL" => RequestType::ListAll,
            _ => return None,
        })
    }

    fn wire_value(self) -> u8 {
        match self {
            RequestType::CreateDir => 0,
            RequestType::CreateFile => 1,
            RequestType::ReadFile => 2,
            RequestType::WriteFile => 3,
            RequestType::DeleteFile => 4,
            RequestType::DeleteDir => 5,
            RequestType::FileInfo => 6,
            RequestType::ListAll => 7,
        }
    }

    fn from_wire(value: u8) -> Result<Self, WireError> {
        Ok(match value {
            0 => RequestType::CreateDir,
            1 => RequestType::CreateFile,
            2 => RequestType::ReadFile,
            3 => RequestType::WriteFile,
            4 => RequestType::DeleteFile,
            5 => RequestType::DeleteDir,
            6 => RequestType::FileInfo,
            7 => RequestType::ListAll,
            other => return Err(WireError::UnknownRequestType(other)),
        })
    }
}

/// Outcome classification carried by every acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckKind {
    /// The operation completed.
    Success,
    /// The operation failed; consult the error code.
    Failure,
    /// The client should open a direct connection to the named server.
    ConnectToServer,
    /// The naming server will proxy the operation on the client's behalf.
    Init,
    /// The peer should stop issuing requests on this connection.
    Stop,
}

impl AckKind {
    fn wire_value(self) -> u8 {
        match self {
            AckKind::Success => 0,
            AckKind::Failure => 1,
            AckKind::ConnectToServer => 2,
            AckKind::Init => 3,
            AckKind::Stop => 4,
        }
    }

    fn from_wire(value: u8) -> Result<Self, WireError> {
        Ok(match value {
            0 => AckKind::Success,
            1 => AckKind::Failure,
            2 => AckKind::ConnectToServer,
            3 => AckKind::Init,
            4 => AckKind::Stop,
            other => return Err(WireError::UnknownAckKind(other)),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Success,
    NetworkError,
    RuntimeError,
    InvalidInput,
    ServerAlreadyRegistered,
    ServerOffline,
    WrongPath,
    Other,
}

impl ErrorCode {
    fn wire_value(self) -> u8 {
        match self {
            ErrorCode::Success => 0,
            ErrorCode::NetworkError => 1,
            ErrorCode::RuntimeError => 2,
            ErrorCode::InvalidInput => 3,
            ErrorCode::ServerAlreadyRegistered => 4,
            ErrorCode::ServerOffline => 5,
            ErrorCode::WrongPath => 6,
            ErrorCode::Other => 7,
        }
    }

    fn from_wire(value: u8) -> Result<Self, WireError> {
        Ok(match value {
            0 => ErrorCode::Success,
            1 => ErrorCode::NetworkError,
            2 => ErrorCode::RuntimeError,
            3 => ErrorCode::InvalidInput,
            4 => ErrorCode::ServerAlreadyRegistered,
            5 => ErrorCode::ServerOffline,
            6 => ErrorCode::WrongPath,
            7 => ErrorCode::Other,
            other => return Err(WireError::UnknownErrorCode(other)),
        })
    }
}

/// A file operation as issued by a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientRequest {
    pub request_type: RequestType,
    pub arg1: String,
    pub arg2: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckResponse {
    pub ack: AckKind,
    pub error: ErrorCode,
}

impl AckResponse {
    pub fn success() -> Self {
        Self {
            ack: AckKind::Success,
            error: ErrorCode::Success,
        }
    }

    pub fn failure(error: ErrorCode) -> Self {
        Self {
            ack: AckKind::Failure,
            error,
        }
    }
}

/// Everything a storage node announces about itself at registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerDetails {
    pub server_id: ServerId,
    pub host: String,
    pub proxy_port: u16,
    pub data_port: u16,
    pub online: bool,
    pub paths: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Request(ClientRequest),
    Ack(AckResponse),
    /// Follows a `ConnectToServer` ack: where the client should connect.
    RedirectTarget { host: String, data_port: u16 },
    ServerDetails(ServerDetails),
    /// A storage node's complete current path list, sent after every
    /// namespace-mutating operation.
    PathReport {
        server_id: ServerId,
        paths: Vec<String>,
    },
    HeartbeatHello { server_id: ServerId },
    HeartbeatPing { server_id: ServerId },
    FileChunk { bytes: Vec<u8>, is_last: bool },
    InfoText { text: String },
}

impl Message {
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        let mut payload = Vec::new();
        match self {
            Message::Request(request) => {
                check_arg(&request.arg1)?;
                check_arg(&request.arg2)?;
                payload.push(request.request_type.wire_value());
                write_string(&mut payload, &request.arg1);
                write_string(&mut payload, &request.arg2);
            }
            Message::Ack(ack) => {
                payload.push(ack.ack.wire_value());
                payload.push(ack.error.wire_value());
            }
            Message::RedirectTarget { host, data_port } => {
                write_string(&mut payload, host);
                payload.extend_from_slice(&data_port.to_le_bytes());
            }
            Message::ServerDetails(details) => {
                check_paths(&details.paths)?;
                payload.extend_from_slice(&details.server_id.raw().to_le_bytes());
                write_string(&mut payload, &details.host);
                payload.extend_from_slice(&details.proxy_port.to_le_bytes());
                payload.extend_from_slice(&details.data_port.to_le_bytes());
                payload.push(u8::from(details.online));
                write_string_array(&mut payload, &details.paths);
            }
            Message::PathReport { server_id, paths } => {
                check_paths(paths)?;
                payload.extend_from_slice(&server_id.raw().to_le_bytes());
                write_string_array(&mut payload, paths);
            }
            Message::HeartbeatHello { server_id } => {
                payload.extend_from_slice(&server_id.raw().to_le_bytes());
            }
            Message::HeartbeatPing { server_id } => {
                payload.extend_from_slice(&server_id.raw().to_le_bytes());
            }
            Message::FileChunk { bytes, is_last } => {
                if bytes.len() > MAX_CHUNK_LEN {
                    return Err(WireError::ChunkTooLarge(bytes.len()));
                }
                payload.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
                payload.extend_from_slice(bytes);
                payload.push(u8::from(*is_last));
            }
            Message::InfoText { text } => {
                write_string(&mut payload, text);
            }
        }
        let mut frame = Vec::with_capacity(payload.len() + 5);
        frame.push(self.wire_id());
        frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        frame.extend_from_slice(&payload);
        Ok(frame)
    }

    pub fn decode(wire_id: u8, mut payload: &[u8]) -> Result<Self, WireError> {
        let bytes = &mut payload;
        let message = match wire_id {
            WIRE_REQUEST => {
                let request_type = RequestType::from_wire(read_u8(bytes)?)?;
                let arg1 = read_string(bytes, MAX_ARG_LEN)?;
                let arg2 = read_string(bytes, MAX_ARG_LEN)?;
                Message::Request(ClientRequest {
                    request_type,
                    arg1,
                    arg2,
                })
            }
            WIRE_ACK => {
                let ack = AckKind::from_wire(read_u8(bytes)?)?;
                let error = ErrorCode::from_wire(read_u8(bytes)?)?;
                Message::Ack(AckResponse { ack, error })
            }
            WIRE_REDIRECT_TARGET => {
                let host = read_string(bytes, MAX_ARG_LEN)?;
                let data_port = read_u16(bytes)?;
                Message::RedirectTarget { host, data_port }
            }
            WIRE_SERVER_DETAILS => {
                let server_id = ServerId::new(read_u16(bytes)?);
                let host = read_string(bytes, MAX_ARG_LEN)?;
                let proxy_port = read_u16(bytes)?;
                let data_port = read_u16(bytes)?;
                let online = read_u8(bytes)? != 0;
                let paths = read_string_array(bytes, MAX_PATHS_PER_REPORT, MAX_ARG_LEN)?;
                Message::ServerDetails(ServerDetails {
                    server_id,
                    host,
                    proxy_port,
                    data_port,
                    online,
                    paths,
                })
            }
            WIRE_PATH_REPORT => {
                let server_id = ServerId::new(read_u16(bytes)?);
                let paths = read_string_array(bytes, MAX_PATHS_PER_REPORT, MAX_ARG_LEN)?;
                Message::PathReport { server_id, paths }
            }
            WIRE_HEARTBEAT_HELLO => Message::HeartbeatHello {
                server_id: ServerId::new(read_u16(bytes)?),
            },
            WIRE_HEARTBEAT_PING => Message::HeartbeatPing {
                server_id: ServerId::new(read_u16(bytes)?),
            },
            WIRE_FILE_CHUNK => {
                let len = read_u32(bytes)? as usize;
                if len > MAX_CHUNK_LEN {
                    return Err(WireError::ChunkTooLarge(len));
                }
                let data = read_bytes(bytes, len)?;
                let is_last = read_u8(bytes)? != 0;
                Message::FileChunk {
                    bytes: data,
                    is_last,
                }
            }
            WIRE_INFO_TEXT => Message::InfoText {
                text: read_string(bytes, MAX_FRAME_LEN)?,
            },
            other => return Err(WireError::UnknownWireId(other)),
        };
        if !bytes.is_empty() {
            return Err(WireError::TrailingBytes {
                wire_id,
                remaining: bytes.len(),
            });
        }
        Ok(message)
    }

    /// Blocking read of one framed message from a stream.
    pub fn read_from(stream: &mut impl Read) -> Result<Self, WireError> {
        let mut header = [0u8; 5];
        stream.read_exact(&mut header)?;
        let wire_id = header[0];
        let len = u32::from_le_bytes([header[1], header[2], header[3], header[4]]) as usize;
        if len > MAX_FRAME_LEN {
            return Err(WireError::FrameTooLarge(len));
        }
        let mut payload = vec![0u8; len];
        stream.read_exact(&mut payload)?;
        Self::decode(wire_id, &payload)
    }

    pub fn write_to(&self, stream: &mut impl Write) -> Result<(), WireError> {
        let frame = self.encode()?;
        stream.write_all(&frame)?;
        stream.flush()?;
        Ok(())
    }

    fn wire_id(&self) -> u8 {
        match self {
            Message::Request(_) => WIRE_REQUEST,
            Message::Ack(_) => WIRE_ACK,
            Message::RedirectTarget { .. } => WIRE_REDIRECT_TARGET,
            Message::ServerDetails(_) => WIRE_SERVER_DETAILS,
            Message::PathReport { .. } => WIRE_PATH_REPORT,
            Message::HeartbeatHello { .. } => WIRE_HEARTBEAT_HELLO,
            Message::HeartbeatPing { .. } => WIRE_HEARTBEAT_PING,
            Message::FileChunk { .. } => WIRE_FILE_CHUNK,
            Message::InfoText { .. } => WIRE_INFO_TEXT,
        }
    }
}

fn check_arg(arg: &str) -> Result<(), WireError> {
    if arg.len() > MAX_ARG_LEN {
        return Err(WireError::ArgumentTooLong(arg.len()));
    }
    Ok(())
}

fn check_paths(paths: &[String]) -> Result<(), WireError> {
    if paths.len() > MAX_PATHS_PER_REPORT {
        return Err(WireError::PathReportTooLarge(paths.len()));
    }
    for path in paths {
        check_arg(path)?;
    }
    Ok(())
}

fn write_string(writer: &mut Vec<u8>, value: &str) {
    let bytes = value.as_bytes();
    writer.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    writer.extend_from_slice(bytes);
}

fn write_string_array(writer: &mut Vec<u8>, values: &[String]) {
    writer.extend_from_slice(&(values.len() as u16).to_le_bytes());
    for value in values {
        write_string(writer, value);
    }
}

fn read_u8(reader: &mut &[u8]) -> Result<u8, WireError> {
    let mut buf = [0u8; 1];
    reader
        .read_exact(&mut buf)
        .map_err(|_| WireError::Truncated)?;
    Ok(buf[0])
}

fn read_u16(reader: &mut &[u8]) -> Result<u16, WireError> {
    let mut buf = [0u8; 2];
    reader
        .read_exact(&mut buf)
        .map_err(|_| WireError::Truncated)?;
    Ok(u16::from_le_bytes(buf))
}

fn read_u32(reader: &mut &[u8]) -> Result<u32, WireError> {
    let mut buf = [0u8; 4];
    reader
        .read_exact(&mut buf)
        .map_err(|_| WireError::Truncated)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_bytes(reader: &mut &[u8], len: usize) -> Result<Vec<u8>, WireError> {
    if reader.len() < len {
        return Err(WireError::Truncated);
    }
    let (head, tail) = reader.split_at(len);
    let bytes = head.to_vec();
    *reader = tail;
    Ok(bytes)
}

fn read_string(reader: &mut &[u8], max_len: usize) -> Result<String, WireError> {
    let len = read_u32(reader)? as usize;
    if len > max_len {
        return Err(WireError::ArgumentTooLong(len));
    }
    let bytes = read_bytes(reader, len)?;
    String::from_utf8(bytes).map_err(|_| WireError::InvalidUtf8)
}

fn read_string_array(
    reader: &mut &[u8],
    max_entries: usize,
    max_len: usize,
) -> Result<Vec<String>, WireError> {
    let count = read_u16(reader)? as usize;
    if count > max_entries {
        return Err(WireError::PathReportTooLarge(count));
    }
    let mut values = Vec::with_capacity(count);
    for _ in 0..count {
        values.push(read_string(reader, max_len)?);
    }
    Ok(values)
}

#[derive(Debug, Error)]
pub enum WireError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("unknown wire id {0:#x}")]
    UnknownWireId(u8),
    #[error("unknown request type {0}")]
    UnknownRequestType(u8),
    #[error("unknown ack kind {0}")]
    UnknownAckKind(u8),
    #[error("unknown error code {0}")]
    UnknownErrorCode(u8),
    #[error("frame payload of {0} bytes exceeds limit")]
    FrameTooLarge(usize),
    #[error("path argument of {0} bytes exceeds limit")]
    ArgumentTooLong(usize),
    #[error("path report of {0} entries exceeds limit")]
    PathReportTooLarge(usize),
    #[error("file chunk of {0} bytes exceeds limit")]
    ChunkTooLarge(usize),
    #[error("unexpected end of frame payload")]
    Truncated,
    #[error("frame {wire_id:#x} carries {remaining} trailing bytes")]
    TrailingBytes { wire_id: u8, remaining: usize },
    #[error("invalid UTF-8 in frame payload")]
    InvalidUtf8,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn round_trip(message: Message) -> Message {
        let frame = message.encode().unwrap();
        let mut cursor = Cursor::new(frame);
        Message::read_from(&mut cursor).unwrap()
    }

    #[test]
    fn request_round_trip() {
        let message = Message::Request(ClientRequest {
            request_type: RequestType::CreateFile,
            arg1: "/docs/a.txt".into(),
            arg2: String::new(),
        });
        assert_eq!(round_trip(message.clone()), message);
    }

    #[test]
    fn server_details_round_trip() {
        let message = Message::ServerDetails(ServerDetails {
            server_id: ServerId::new(3),
            host: "127.0.0.1".into(),
            proxy_port: 6060,
            data_port: 7070,
            online: false,
            paths: vec!["/docs/".into(), "/docs/a.txt".into()],
        });
        assert_eq!(round_trip(message.clone()), message);
    }

    #[test]
    fn redirect_follows_connect_ack() {
        let ack = Message::Ack(AckResponse {
            ack: AckKind::ConnectToServer,
            error: ErrorCode::Success,
        });
        let target = Message::RedirectTarget {
            host: "10.0.0.2".into(),
            data_port: 7070,
        };
        let mut buf = Vec::new();
        ack.write_to(&mut buf).unwrap();
        target.write_to(&mut buf).unwrap();
        let mut cursor = Cursor::new(buf);
        assert_eq!(Message::read_from(&mut cursor).unwrap(), ack);
        assert_eq!(Message::read_from(&mut cursor).unwrap(), target);
    }

    #[test]
    fn oversized_argument_rejected_on_encode() {
        let message = Message::Request(ClientRequest {
            request_type: RequestType::ReadFile,
            arg1: "x".repeat(MAX_ARG_LEN + 1),
            arg2: String::new(),
        });
        assert!(matches!(
            message.encode(),
            Err(WireError::ArgumentTooLong(_))
        ));
    }

    #[test]
    fn oversized_chunk_rejected_on_decode() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&((MAX_CHUNK_LEN + 1) as u32).to_le_bytes());
        let err = Message::decode(0x08, &payload).unwrap_err();
        assert!(matches!(err, WireError::ChunkTooLarge(_)));
    }

    #[test]
    fn trailing_bytes_rejected() {
        let frame = Message::Ack(AckResponse::success()).encode().unwrap();
        let mut payload = frame[5..].to_vec();
        payload.push(0xff);
        let err = Message::decode(frame[0], &payload).unwrap_err();
        assert!(matches!(err, WireError::TrailingBytes { .. }));
    }

    #[test]
    fn unknown_wire_id_rejected() {
        let err = Message::decode(0x7f, &[]).unwrap_err();
        assert!(matches!(err, WireError::UnknownWireId(0x7f)));
    }
}
