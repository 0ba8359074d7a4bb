//! Uplink Piece-Transfer Protocol
//!
//! Protobuf messages exchanged between the uplink and a storage node for a
//! single piece operation. Each message travels in one length-delimited
//! frame.
//!
//! ```text
//! package uplink.piece.v1;
//!
//! message PieceRequest {
//!   uint32    version       = 1;
//!   Operation operation     = 2;
//!   bytes     piece_id      = 3;
//!   optional bytes payload  = 4;
//!   bytes     authorization = 5;
//! }
//!
//! message PieceResponse {
//!   Status          status        = 1;
//!   optional bytes  payload       = 2;
//!   optional uint32 error_code    = 3;
//!   string          error_message = 4;
//! }
//! ```

use bytes::Bytes;

/// Wire protocol version carried in every request
pub const PROTOCOL_VERSION: u32 = 1;

/// Largest frame either side accepts (one piece plus envelope)
pub const MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

/// Piece operation requested from a node
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum Operation {
    Unspecified = 0,
    Put = 1,
    Get = 2,
    Delete = 3,
}

impl Operation {
    /// Stable name, also used as MAC input
    pub fn as_str_name(&self) -> &'static str {
        match self {
            Operation::Unspecified => "UNSPECIFIED",
            Operation::Put => "PUT",
            Operation::Get => "GET",
            Operation::Delete => "DELETE",
        }
    }
}

/// Outcome reported by a node.
///
/// Zero is reserved so that an empty or truncated response never reads
/// as success.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum Status {
    Unspecified = 0,
    Ok = 1,
    NotFound = 2,
    Unauthorized = 3,
    BadRequest = 4,
    Internal = 5,
    VersionMismatch = 6,
}

/// Request for a single piece operation
#[derive(Clone, PartialEq, prost::Message)]
pub struct PieceRequest {
    #[prost(uint32, tag = "1")]
    pub version: u32,
    #[prost(enumeration = "Operation", tag = "2")]
    pub operation: i32,
    #[prost(bytes = "vec", tag = "3")]
    pub piece_id: Vec<u8>,
    #[prost(bytes = "bytes", optional, tag = "4")]
    pub payload: Option<Bytes>,
    #[prost(bytes = "vec", tag = "5")]
    pub authorization: Vec<u8>,
}

impl PieceRequest {
    /// Build a request for the current protocol version
    pub fn new(operation: Operation, piece_id: &[u8], authorization: Vec<u8>) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            operation: operation as i32,
            piece_id: piece_id.to_vec(),
            payload: None,
            authorization,
        }
    }

    /// Attach a piece payload (for `Put`)
    pub fn with_payload(mut self, payload: Bytes) -> Self {
        self.payload = Some(payload);
        self
    }
}

/// Response to a [`PieceRequest`]
#[derive(Clone, PartialEq, prost::Message)]
pub struct PieceResponse {
    #[prost(enumeration = "Status", tag = "1")]
    pub status: i32,
    #[prost(bytes = "bytes", optional, tag = "2")]
    pub payload: Option<Bytes>,
    #[prost(uint32, optional, tag = "3")]
    pub error_code: Option<u32>,
    #[prost(string, tag = "4")]
    pub error_message: String,
}

impl PieceResponse {
    /// Successful response, optionally carrying a piece
    pub fn ok(payload: Option<Bytes>) -> Self {
        Self {
            status: Status::Ok as i32,
            payload,
            error_code: None,
            error_message: String::new(),
        }
    }

    /// Failed response
    pub fn error(status: Status, message: impl Into<String>) -> Self {
        Self {
            status: status as i32,
            payload: None,
            error_code: Some(status as u32),
            error_message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn test_request_encoding() {
        let request = PieceRequest::new(Operation::Put, &[9u8; 32], vec![1, 2, 3])
            .with_payload(Bytes::from_static(b"piece"));

        let decoded = PieceRequest::decode(request.encode_to_vec().as_slice()).unwrap();
        assert_eq!(decoded.version, PROTOCOL_VERSION);
        assert_eq!(decoded.operation(), Operation::Put);
        assert_eq!(decoded.payload.as_deref(), Some(&b"piece"[..]));
    }

    #[test]
    fn test_error_response_carries_code() {
        let response = PieceResponse::error(Status::Unauthorized, "bad token");
        let decoded = PieceResponse::decode(response.encode_to_vec().as_slice()).unwrap();
        assert_eq!(decoded.status(), Status::Unauthorized);
        assert_eq!(decoded.error_code, Some(Status::Unauthorized as u32));
        assert_eq!(decoded.error_message, "bad token");
    }

    #[test]
    fn test_empty_response_is_not_ok() {
        let decoded = PieceResponse::decode(&b""[..]).unwrap();
        assert_eq!(decoded.status, Status::Unspecified as i32);
        assert_ne!(decoded.status, PieceResponse::ok(None).status);
    }

    #[test]
    fn test_unknown_operation_defaults() {
        let mut request = PieceRequest::new(Operation::Get, &[0u8; 32], Vec::new());
        request.operation = 42;
        assert_eq!(request.operation(), Operation::Unspecified);
    }
}
