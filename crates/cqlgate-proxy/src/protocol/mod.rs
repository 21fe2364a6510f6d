//! CQL native protocol, versions 1 to 4.
//!
//! Compression is not supported: the gateway removes it from STARTUP and
//! answers compressed frames with a protocol error.

pub mod codec;
pub mod frame;
pub mod messages;

pub use codec::{BodyReader, BodyWriter};
pub use frame::{
    EVENT_STREAM, Frame, FrameHeader, FrameReader, MAX_VERSION, MIN_VERSION, Opcode, flags,
    frame_size,
};
pub use messages::{
    BatchRequest, BatchStatement, BatchTarget, ColumnSpec, DataType, ErrorBody, ErrorDetail,
    Event, Prepared, Request, RequestEnvelope, Response, ResponseEnvelope, ResultBody, Rows,
    RowsMetadata, SchemaChange, TableSpec, clear_skip_metadata, error_code, map_bound_values,
    map_value_list,
};

/// Frame carrying a decoded response for a protocol version.
pub fn response_frame(version: u8, stream: i16, response: &Response) -> Frame {
    Frame::response(version, stream, response.opcode(), response.encode(version))
}

/// Frame carrying an ERROR response.
pub fn error_frame(version: u8, stream: i16, code: i32, message: impl Into<String>) -> Frame {
    response_frame(version, stream, &Response::Error(ErrorBody::new(code, message)))
}

/// Frame carrying a request.
pub fn request_frame(version: u8, stream: i16, request: &Request) -> Frame {
    Frame::request(version, stream, request.opcode(), request.encode())
}
