//! Typed request and response bodies.
//!
//! Only the parts the gateway inspects are decoded. Query parameters, bound
//! values and paging state travel as opaque byte slices.

use bytes::{Bytes, BytesMut};

use super::codec::{BodyReader, BodyWriter};
use super::frame::{Opcode, flags};
use crate::error::WireError;

/// Error codes of ERROR responses.
pub mod error_code {
    pub const SERVER_ERROR: i32 = 0x0000;
    pub const PROTOCOL_ERROR: i32 = 0x000A;
    pub const BAD_CREDENTIALS: i32 = 0x0100;
    pub const UNAVAILABLE: i32 = 0x1000;
    pub const OVERLOADED: i32 = 0x1001;
    pub const IS_BOOTSTRAPPING: i32 = 0x1002;
    pub const TRUNCATE_ERROR: i32 = 0x1003;
    pub const WRITE_TIMEOUT: i32 = 0x1100;
    pub const READ_TIMEOUT: i32 = 0x1200;
    pub const FUNCTION_FAILURE: i32 = 0x1400;
    pub const SYNTAX_ERROR: i32 = 0x2000;
    pub const UNAUTHORIZED: i32 = 0x2100;
    pub const INVALID: i32 = 0x2200;
    pub const CONFIG_ERROR: i32 = 0x2300;
    pub const ALREADY_EXISTS: i32 = 0x2400;
    pub const UNPREPARED: i32 = 0x2500;
}

/// Consistency level ONE.
pub const CONSISTENCY_ONE: u16 = 0x0001;

/// QUERY/EXECUTE flags.
const VALUES: u8 = 0x01;
/// Asks the server to omit result metadata.
const SKIP_METADATA: u8 = 0x02;
const NAMES_FOR_VALUES: u8 = 0x40;

const GLOBAL_TABLES_SPEC: i32 = 0x0001;
const HAS_MORE_PAGES: i32 = 0x0002;
const NO_METADATA: i32 = 0x0004;

const RESULT_VOID: i32 = 0x0001;
const RESULT_ROWS: i32 = 0x0002;
const RESULT_SET_KEYSPACE: i32 = 0x0003;
const RESULT_PREPARED: i32 = 0x0004;
const RESULT_SCHEMA_CHANGE: i32 = 0x0005;

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// A client request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Startup { options: Vec<(String, String)> },
    /// Protocol v1 login.
    Credentials { entries: Vec<(String, String)> },
    Options,
    /// `parameters` is everything after the query string.
    Query { query: String, parameters: Bytes },
    Prepare { query: String, extra: Bytes },
    Execute { id: Bytes, parameters: Bytes },
    Batch(BatchRequest),
    Register { events: Vec<String> },
    /// SASL response, protocol v2 and later.
    AuthResponse { token: Option<Bytes> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRequest {
    pub kind: u8,
    pub statements: Vec<BatchStatement>,
    /// Consistency and trailing flags, kept verbatim.
    pub tail: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchStatement {
    pub target: BatchTarget,
    /// `[short]` count followed by the bound values.
    pub values: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchTarget {
    Query(String),
    Prepared(Bytes),
}

impl Request {
    pub fn opcode(&self) -> Opcode {
        match self {
            Self::Startup { .. } => Opcode::Startup,
            Self::Credentials { .. } => Opcode::Credentials,
            Self::Options => Opcode::Options,
            Self::Query { .. } => Opcode::Query,
            Self::Prepare { .. } => Opcode::Prepare,
            Self::Execute { .. } => Opcode::Execute,
            Self::Batch(_) => Opcode::Batch,
            Self::Register { .. } => Opcode::Register,
            Self::AuthResponse { .. } => Opcode::AuthResponse,
        }
    }

    /// Decode a request body (after any custom payload).
    ///
    /// Returns `None` for opcodes a client never sends.
    pub fn decode(opcode: Opcode, body: Bytes) -> Result<Option<Self>, WireError> {
        let mut r = BodyReader::new(body);
        let request = match opcode {
            Opcode::Startup => Self::Startup {
                options: r.read_string_map()?,
            },
            Opcode::Credentials => Self::Credentials {
                entries: r.read_string_map()?,
            },
            Opcode::Options => Self::Options,
            Opcode::Query => Self::Query {
                query: r.read_long_string()?,
                parameters: r.take_rest(),
            },
            Opcode::Prepare => Self::Prepare {
                query: r.read_long_string()?,
                extra: r.take_rest(),
            },
            Opcode::Execute => Self::Execute {
                id: r.read_short_bytes()?,
                parameters: r.take_rest(),
            },
            Opcode::Batch => Self::Batch(BatchRequest::decode(&mut r)?),
            Opcode::Register => Self::Register {
                events: r.read_string_list()?,
            },
            Opcode::AuthResponse => Self::AuthResponse {
                token: r.read_bytes()?,
            },
            _ => return Ok(None),
        };
        Ok(Some(request))
    }

    pub fn encode(&self) -> Bytes {
        let mut w = BodyWriter::new();
        match self {
            Self::Startup { options } => w.put_string_map(options),
            Self::Credentials { entries } => w.put_string_map(entries),
            Self::Options => {}
            Self::Query { query, parameters } => {
                w.put_long_string(query);
                w.put_raw(parameters);
            }
            Self::Prepare { query, extra } => {
                w.put_long_string(query);
                w.put_raw(extra);
            }
            Self::Execute { id, parameters } => {
                w.put_short_bytes(id);
                w.put_raw(parameters);
            }
            Self::Batch(batch) => batch.encode(&mut w),
            Self::Register { events } => w.put_string_list(events),
            Self::AuthResponse { token } => w.put_bytes(token.as_deref()),
        }
        w.finish()
    }

    /// A QUERY with consistency ONE and no values.
    pub fn simple_query(version: u8, query: impl Into<String>) -> Self {
        let mut w = BodyWriter::new();
        w.put_short(CONSISTENCY_ONE);
        if version >= 2 {
            w.put_u8(0);
        }
        Self::Query {
            query: query.into(),
            parameters: w.finish(),
        }
    }
}

impl BatchRequest {
    fn decode(r: &mut BodyReader) -> Result<Self, WireError> {
        let kind = r.read_u8()?;
        let n = r.read_short()?;
        let mut statements = Vec::with_capacity((n as usize).min(r.remaining()));
        for _ in 0..n {
            let target = match r.read_u8()? {
                0 => BatchTarget::Query(r.read_long_string()?),
                _ => BatchTarget::Prepared(r.read_short_bytes()?),
            };
            let values = r.read_spanned(BodyReader::skip_values)?;
            statements.push(BatchStatement { target, values });
        }
        Ok(Self {
            kind,
            statements,
            tail: r.take_rest(),
        })
    }

    fn encode(&self, w: &mut BodyWriter) {
        w.put_u8(self.kind);
        w.put_short(self.statements.len() as u16);
        for statement in &self.statements {
            match &statement.target {
                BatchTarget::Query(query) => {
                    w.put_u8(0);
                    w.put_long_string(query);
                }
                BatchTarget::Prepared(id) => {
                    w.put_u8(1);
                    w.put_short_bytes(id);
                }
            }
            w.put_raw(&statement.values);
        }
        w.put_raw(&self.tail);
    }
}

/// Clear the skip-metadata flag of EXECUTE parameters.
///
/// Result metadata is needed to translate keyspace names. Protocol v1 has no
/// query flags and is returned unchanged.
pub fn clear_skip_metadata(version: u8, parameters: Bytes) -> Bytes {
    if version < 2 || parameters.len() < 3 || parameters[2] & SKIP_METADATA == 0 {
        return parameters;
    }
    let mut owned = BytesMut::from(&parameters[..]);
    owned[2] &= !SKIP_METADATA;
    owned.freeze()
}

/// Replace bound values of QUERY or EXECUTE parameters.
///
/// `f` receives the marker position and the value and returns a
/// replacement, or `None` to keep it. Null and unset values are never
/// offered. Named values and v1 QUERY (which has none) come back unchanged.
pub fn map_bound_values<F>(
    version: u8,
    opcode: Opcode,
    parameters: Bytes,
    f: F,
) -> Result<Bytes, WireError>
where
    F: FnMut(usize, &[u8]) -> Option<Bytes>,
{
    let mut r = BodyReader::new(parameters.clone());
    let mut w = BodyWriter::new();

    if version < 2 {
        if opcode != Opcode::Execute {
            return Ok(parameters);
        }
        map_values(&mut r, &mut w, f)?;
    } else {
        let consistency = r.read_short()?;
        let query_flags = r.read_u8()?;
        if query_flags & VALUES == 0 || query_flags & NAMES_FOR_VALUES != 0 {
            return Ok(parameters);
        }
        w.put_short(consistency);
        w.put_u8(query_flags);
        map_values(&mut r, &mut w, f)?;
    }
    w.put_raw(&r.take_rest());
    Ok(w.finish())
}

/// [`map_bound_values`] for the values of one BATCH statement.
pub fn map_value_list<F>(values: Bytes, f: F) -> Result<Bytes, WireError>
where
    F: FnMut(usize, &[u8]) -> Option<Bytes>,
{
    let mut r = BodyReader::new(values);
    let mut w = BodyWriter::new();
    map_values(&mut r, &mut w, f)?;
    w.put_raw(&r.take_rest());
    Ok(w.finish())
}

fn map_values<F>(r: &mut BodyReader, w: &mut BodyWriter, mut f: F) -> Result<(), WireError>
where
    F: FnMut(usize, &[u8]) -> Option<Bytes>,
{
    let n = r.read_short()?;
    w.put_short(n);
    for index in 0..n as usize {
        let len = r.read_int()?;
        if len < 0 {
            // -1 null, -2 unset
            w.put_int(len);
            continue;
        }
        let value = r.read_raw(len as usize, "value")?;
        match f(index, &value) {
            Some(replacement) => w.put_bytes(Some(&replacement)),
            None => w.put_bytes(Some(&value)),
        }
    }
    Ok(())
}

/// Custom payload in front of a v4 request body, kept verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestEnvelope {
    pub custom_payload: Option<Bytes>,
}

impl RequestEnvelope {
    pub fn split(frame_flags: u8, body: Bytes) -> Result<(Self, Bytes), WireError> {
        if frame_flags & flags::CUSTOM_PAYLOAD == 0 {
            return Ok((Self::default(), body));
        }
        let mut r = BodyReader::new(body);
        let payload = r.read_spanned(|r| r.read_bytes_map().map(drop))?;
        Ok((
            Self {
                custom_payload: Some(payload),
            },
            r.take_rest(),
        ))
    }

    pub fn join(&self, body: Bytes) -> Bytes {
        match &self.custom_payload {
            None => body,
            Some(payload) => {
                let mut w = BodyWriter::new();
                w.put_raw(payload);
                w.put_raw(&body);
                w.finish()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// A server response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Error(ErrorBody),
    Ready,
    Authenticate { authenticator: String },
    Supported { options: Vec<(String, Vec<String>)> },
    Result(ResultBody),
    Event(Event),
    AuthChallenge { token: Option<Bytes> },
    AuthSuccess { token: Option<Bytes> },
}

impl Response {
    pub fn opcode(&self) -> Opcode {
        match self {
            Self::Error(_) => Opcode::Error,
            Self::Ready => Opcode::Ready,
            Self::Authenticate { .. } => Opcode::Authenticate,
            Self::Supported { .. } => Opcode::Supported,
            Self::Result(_) => Opcode::Result,
            Self::Event(_) => Opcode::Event,
            Self::AuthChallenge { .. } => Opcode::AuthChallenge,
            Self::AuthSuccess { .. } => Opcode::AuthSuccess,
        }
    }

    /// Decode a response body (after its envelope).
    pub fn decode(opcode: Opcode, version: u8, body: Bytes) -> Result<Self, WireError> {
        let mut r = BodyReader::new(body);
        Ok(match opcode {
            Opcode::Error => Self::Error(ErrorBody::decode(&mut r)?),
            Opcode::Ready => Self::Ready,
            Opcode::Authenticate => Self::Authenticate {
                authenticator: r.read_string()?,
            },
            Opcode::Supported => Self::Supported {
                options: r.read_string_multimap()?,
            },
            Opcode::Result => Self::Result(ResultBody::decode(&mut r, version)?),
            Opcode::Event => Self::Event(Event::decode(&mut r, version)?),
            Opcode::AuthChallenge => Self::AuthChallenge {
                token: r.read_bytes()?,
            },
            Opcode::AuthSuccess => Self::AuthSuccess {
                token: r.read_bytes()?,
            },
            other => {
                return Err(WireError::UnknownOpcode {
                    opcode: other.as_u8(),
                    stream: 0,
                });
            }
        })
    }

    pub fn encode(&self, version: u8) -> Bytes {
        let mut w = BodyWriter::new();
        match self {
            Self::Error(error) => error.encode(&mut w),
            Self::Ready => {}
            Self::Authenticate { authenticator } => w.put_string(authenticator),
            Self::Supported { options } => w.put_string_multimap(options),
            Self::Result(result) => result.encode(&mut w, version),
            Self::Event(event) => event.encode(&mut w, version),
            Self::AuthChallenge { token } | Self::AuthSuccess { token } => {
                w.put_bytes(token.as_deref())
            }
        }
        w.finish()
    }
}

/// Tracing id, warnings and custom payload in front of a response body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseEnvelope {
    pub tracing_id: Option<[u8; 16]>,
    pub warnings: Option<Vec<String>>,
    pub custom_payload: Option<Vec<(String, Option<Bytes>)>>,
}

impl ResponseEnvelope {
    pub fn split(frame_flags: u8, body: Bytes) -> Result<(Self, Bytes), WireError> {
        let mut r = BodyReader::new(body);
        let mut envelope = Self::default();
        if frame_flags & flags::TRACING != 0 {
            envelope.tracing_id = Some(r.read_uuid()?);
        }
        if frame_flags & flags::WARNING != 0 {
            envelope.warnings = Some(r.read_string_list()?);
        }
        if frame_flags & flags::CUSTOM_PAYLOAD != 0 {
            envelope.custom_payload = Some(r.read_bytes_map()?);
        }
        Ok((envelope, r.take_rest()))
    }

    /// Frame flags describing this envelope.
    pub fn flags(&self) -> u8 {
        let mut f = 0;
        if self.tracing_id.is_some() {
            f |= flags::TRACING;
        }
        if self.warnings.is_some() {
            f |= flags::WARNING;
        }
        if self.custom_payload.is_some() {
            f |= flags::CUSTOM_PAYLOAD;
        }
        f
    }

    pub fn join(&self, body: Bytes) -> Bytes {
        if self.flags() == 0 {
            return body;
        }
        let mut w = BodyWriter::new();
        if let Some(id) = &self.tracing_id {
            w.put_raw(id);
        }
        if let Some(warnings) = &self.warnings {
            w.put_string_list(warnings);
        }
        if let Some(payload) = &self.custom_payload {
            w.put_bytes_map(payload);
        }
        w.put_raw(&body);
        w.finish()
    }
}

/// Body of an ERROR response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorBody {
    pub code: i32,
    pub message: String,
    pub detail: ErrorDetail,
}

/// Code-specific fields after the message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorDetail {
    None,
    /// Empty `table` for a keyspace.
    AlreadyExists { keyspace: String, table: String },
    Unprepared { id: Bytes },
    /// A user-defined function raised an error (v4).
    FunctionFailure {
        keyspace: String,
        function: String,
        arg_types: Vec<String>,
    },
    Raw(Bytes),
}

impl ErrorBody {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            detail: ErrorDetail::None,
        }
    }

    pub fn unprepared(id: Bytes) -> Self {
        Self {
            code: error_code::UNPREPARED,
            message: "Prepared query with ID not found".to_string(),
            detail: ErrorDetail::Unprepared { id },
        }
    }

    fn decode(r: &mut BodyReader) -> Result<Self, WireError> {
        let code = r.read_int()?;
        let message = r.read_string()?;
        let detail = match code {
            error_code::ALREADY_EXISTS => ErrorDetail::AlreadyExists {
                keyspace: r.read_string()?,
                table: r.read_string()?,
            },
            error_code::UNPREPARED => ErrorDetail::Unprepared {
                id: r.read_short_bytes()?,
            },
            error_code::FUNCTION_FAILURE if !r.is_empty() => ErrorDetail::FunctionFailure {
                keyspace: r.read_string()?,
                function: r.read_string()?,
                arg_types: r.read_string_list()?,
            },
            _ if r.is_empty() => ErrorDetail::None,
            _ => ErrorDetail::Raw(r.take_rest()),
        };
        Ok(Self {
            code,
            message,
            detail,
        })
    }

    fn encode(&self, w: &mut BodyWriter) {
        w.put_int(self.code);
        w.put_string(&self.message);
        match &self.detail {
            ErrorDetail::None => {}
            ErrorDetail::AlreadyExists { keyspace, table } => {
                w.put_string(keyspace);
                w.put_string(table);
            }
            ErrorDetail::Unprepared { id } => w.put_short_bytes(id),
            ErrorDetail::FunctionFailure {
                keyspace,
                function,
                arg_types,
            } => {
                w.put_string(keyspace);
                w.put_string(function);
                w.put_string_list(arg_types);
            }
            ErrorDetail::Raw(raw) => w.put_raw(raw),
        }
    }
}

/// Body of a RESULT response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultBody {
    Void,
    Rows(Rows),
    SetKeyspace(String),
    Prepared(Prepared),
    SchemaChange(SchemaChange),
}

impl ResultBody {
    fn decode(r: &mut BodyReader, version: u8) -> Result<Self, WireError> {
        Ok(match r.read_int()? {
            RESULT_VOID => Self::Void,
            RESULT_ROWS => {
                let metadata = RowsMetadata::decode(r, version, false)?;
                let count = r.read_int()?.max(0) as usize;
                let width = metadata.columns_count.max(0) as usize;
                // Every cell carries at least its 4-byte length.
                let mut rows = Vec::with_capacity(count.min(r.remaining() / (width.max(1) * 4)));
                for _ in 0..count {
                    let row = (0..width)
                        .map(|_| r.read_bytes())
                        .collect::<Result<Vec<_>, _>>()?;
                    rows.push(row);
                }
                Self::Rows(Rows { metadata, rows })
            }
            RESULT_SET_KEYSPACE => Self::SetKeyspace(r.read_string()?),
            RESULT_PREPARED => {
                let id = r.read_short_bytes()?;
                let metadata = RowsMetadata::decode(r, version, true)?;
                let result_metadata = if version >= 2 {
                    Some(RowsMetadata::decode(r, version, false)?)
                } else {
                    None
                };
                Self::Prepared(Prepared {
                    id,
                    metadata,
                    result_metadata,
                })
            }
            RESULT_SCHEMA_CHANGE => Self::SchemaChange(SchemaChange::decode(r, version)?),
            _ => return Err(WireError::Truncated("result kind")),
        })
    }

    fn encode(&self, w: &mut BodyWriter, version: u8) {
        match self {
            Self::Void => w.put_int(RESULT_VOID),
            Self::Rows(rows) => {
                w.put_int(RESULT_ROWS);
                rows.metadata.encode(w, version, false);
                w.put_int(rows.rows.len() as i32);
                for row in &rows.rows {
                    for cell in row {
                        w.put_bytes(cell.as_deref());
                    }
                }
            }
            Self::SetKeyspace(keyspace) => {
                w.put_int(RESULT_SET_KEYSPACE);
                w.put_string(keyspace);
            }
            Self::Prepared(prepared) => {
                w.put_int(RESULT_PREPARED);
                w.put_short_bytes(&prepared.id);
                prepared.metadata.encode(w, version, true);
                if let Some(result_metadata) = &prepared.result_metadata {
                    result_metadata.encode(w, version, false);
                }
            }
            Self::SchemaChange(change) => {
                w.put_int(RESULT_SCHEMA_CHANGE);
                change.encode(w, version);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rows {
    pub metadata: RowsMetadata,
    pub rows: Vec<Vec<Option<Bytes>>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prepared {
    pub id: Bytes,
    /// Bind variables.
    pub metadata: RowsMetadata,
    /// Result columns, protocol v2 and later.
    pub result_metadata: Option<RowsMetadata>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    pub keyspace: String,
    pub table: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    /// `None` when the metadata carries a global table spec.
    pub table: Option<TableSpec>,
    pub name: String,
    pub data_type: DataType,
}

/// Rows or prepared-statement metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowsMetadata {
    pub flags: i32,
    pub columns_count: i32,
    pub paging_state: Option<Bytes>,
    /// Partition key bind indexes of a v4 prepared statement.
    pub pk_indices: Option<Vec<u16>>,
    pub global_table_spec: Option<TableSpec>,
    pub columns: Vec<ColumnSpec>,
}

impl RowsMetadata {
    fn decode(r: &mut BodyReader, version: u8, prepared: bool) -> Result<Self, WireError> {
        let flags = r.read_int()?;
        let columns_count = r.read_int()?;

        let paging_state = if !prepared && flags & HAS_MORE_PAGES != 0 {
            r.read_bytes()?
        } else {
            None
        };
        let pk_indices = if prepared && version >= 4 {
            let n = r.read_int()?.max(0);
            Some((0..n).map(|_| r.read_short()).collect::<Result<_, _>>()?)
        } else {
            None
        };

        let mut metadata = Self {
            flags,
            columns_count,
            paging_state,
            pk_indices,
            global_table_spec: None,
            columns: Vec::new(),
        };
        if flags & NO_METADATA != 0 {
            return Ok(metadata);
        }

        if flags & GLOBAL_TABLES_SPEC != 0 {
            metadata.global_table_spec = Some(TableSpec {
                keyspace: r.read_string()?,
                table: r.read_string()?,
            });
        }
        for _ in 0..columns_count.max(0) {
            let table = if metadata.global_table_spec.is_some() {
                None
            } else {
                Some(TableSpec {
                    keyspace: r.read_string()?,
                    table: r.read_string()?,
                })
            };
            metadata.columns.push(ColumnSpec {
                table,
                name: r.read_string()?,
                data_type: DataType::decode(r)?,
            });
        }
        Ok(metadata)
    }

    fn encode(&self, w: &mut BodyWriter, version: u8, prepared: bool) {
        w.put_int(self.flags);
        w.put_int(self.columns_count);
        if !prepared && self.flags & HAS_MORE_PAGES != 0 {
            w.put_bytes(self.paging_state.as_deref());
        }
        if prepared && version >= 4 {
            let indices = self.pk_indices.as_deref().unwrap_or_default();
            w.put_int(indices.len() as i32);
            for index in indices {
                w.put_short(*index);
            }
        }
        if self.flags & NO_METADATA != 0 {
            return;
        }
        if let Some(spec) = &self.global_table_spec {
            w.put_string(&spec.keyspace);
            w.put_string(&spec.table);
        }
        for column in &self.columns {
            if let Some(spec) = &column.table {
                w.put_string(&spec.keyspace);
                w.put_string(&spec.table);
            }
            w.put_string(&column.name);
            column.data_type.encode(w);
        }
    }

    pub fn has_metadata(&self) -> bool {
        self.flags & NO_METADATA == 0
    }

    /// Relation of the first column (or the global spec).
    pub fn relation(&self) -> Option<&TableSpec> {
        self.global_table_spec
            .as_ref()
            .or_else(|| self.columns.first().and_then(|c| c.table.as_ref()))
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

/// A column type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataType {
    Custom(String),
    Native(u16),
    List(Box<DataType>),
    Map(Box<DataType>, Box<DataType>),
    Set(Box<DataType>),
    Udt {
        keyspace: String,
        name: String,
        fields: Vec<(String, DataType)>,
    },
    Tuple(Vec<DataType>),
}

impl DataType {
    fn decode(r: &mut BodyReader) -> Result<Self, WireError> {
        Ok(match r.read_short()? {
            0x0000 => Self::Custom(r.read_string()?),
            0x0020 => Self::List(Box::new(Self::decode(r)?)),
            0x0021 => Self::Map(Box::new(Self::decode(r)?), Box::new(Self::decode(r)?)),
            0x0022 => Self::Set(Box::new(Self::decode(r)?)),
            0x0030 => {
                let keyspace = r.read_string()?;
                let name = r.read_string()?;
                let n = r.read_short()?;
                let fields = (0..n)
                    .map(|_| Ok((r.read_string()?, Self::decode(r)?)))
                    .collect::<Result<_, WireError>>()?;
                Self::Udt {
                    keyspace,
                    name,
                    fields,
                }
            }
            0x0031 => {
                let n = r.read_short()?;
                Self::Tuple((0..n).map(|_| Self::decode(r)).collect::<Result<_, _>>()?)
            }
            id => Self::Native(id),
        })
    }

    fn encode(&self, w: &mut BodyWriter) {
        match self {
            Self::Custom(class) => {
                w.put_short(0x0000);
                w.put_string(class);
            }
            Self::Native(id) => w.put_short(*id),
            Self::List(inner) => {
                w.put_short(0x0020);
                inner.encode(w);
            }
            Self::Map(key, value) => {
                w.put_short(0x0021);
                key.encode(w);
                value.encode(w);
            }
            Self::Set(inner) => {
                w.put_short(0x0022);
                inner.encode(w);
            }
            Self::Udt {
                keyspace,
                name,
                fields,
            } => {
                w.put_short(0x0030);
                w.put_string(keyspace);
                w.put_string(name);
                w.put_short(fields.len() as u16);
                for (field, data_type) in fields {
                    w.put_string(field);
                    data_type.encode(w);
                }
            }
            Self::Tuple(items) => {
                w.put_short(0x0031);
                w.put_short(items.len() as u16);
                for item in items {
                    item.encode(w);
                }
            }
        }
    }

    /// Apply `f` to the keyspace of every user-defined type inside this type.
    pub fn try_map_keyspaces<E, F>(&mut self, f: &mut F) -> Result<(), E>
    where
        F: FnMut(&str) -> Result<String, E>,
    {
        match self {
            Self::Custom(_) | Self::Native(_) => Ok(()),
            Self::List(inner) | Self::Set(inner) => inner.try_map_keyspaces(f),
            Self::Map(key, value) => {
                key.try_map_keyspaces(f)?;
                value.try_map_keyspaces(f)
            }
            Self::Udt {
                keyspace, fields, ..
            } => {
                *keyspace = f(keyspace)?;
                fields
                    .iter_mut()
                    .try_for_each(|(_, data_type)| data_type.try_map_keyspaces(f))
            }
            Self::Tuple(items) => items.iter_mut().try_for_each(|t| t.try_map_keyspaces(f)),
        }
    }
}

/// A schema change, as a result or as an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaChange {
    /// `CREATED`, `UPDATED` or `DROPPED`.
    pub change: String,
    /// `KEYSPACE`, `TABLE`, `TYPE`, `FUNCTION` or `AGGREGATE`.
    pub target: String,
    pub keyspace: String,
    pub name: Option<String>,
    pub arguments: Option<Vec<String>>,
}

impl SchemaChange {
    fn decode(r: &mut BodyReader, version: u8) -> Result<Self, WireError> {
        let change = r.read_string()?;
        if version < 3 {
            let keyspace = r.read_string()?;
            let table = r.read_string()?;
            let (target, name) = if table.is_empty() {
                ("KEYSPACE", None)
            } else {
                ("TABLE", Some(table))
            };
            return Ok(Self {
                change,
                target: target.to_string(),
                keyspace,
                name,
                arguments: None,
            });
        }

        let target = r.read_string()?;
        let keyspace = r.read_string()?;
        let (name, arguments) = match target.as_str() {
            "KEYSPACE" => (None, None),
            "FUNCTION" | "AGGREGATE" => (Some(r.read_string()?), Some(r.read_string_list()?)),
            _ => (Some(r.read_string()?), None),
        };
        Ok(Self {
            change,
            target,
            keyspace,
            name,
            arguments,
        })
    }

    fn encode(&self, w: &mut BodyWriter, version: u8) {
        w.put_string(&self.change);
        if version < 3 {
            w.put_string(&self.keyspace);
            w.put_string(self.name.as_deref().unwrap_or_default());
            return;
        }
        w.put_string(&self.target);
        w.put_string(&self.keyspace);
        if let Some(name) = &self.name {
            w.put_string(name);
        }
        if let Some(arguments) = &self.arguments {
            w.put_string_list(arguments);
        }
    }
}

/// A server-pushed event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    SchemaChange(SchemaChange),
    /// Topology and status changes, forwarded untouched.
    Other { kind: String, body: Bytes },
}

impl Event {
    fn decode(r: &mut BodyReader, version: u8) -> Result<Self, WireError> {
        let kind = r.read_string()?;
        if kind == "SCHEMA_CHANGE" {
            Ok(Self::SchemaChange(SchemaChange::decode(r, version)?))
        } else {
            Ok(Self::Other {
                kind,
                body: r.take_rest(),
            })
        }
    }

    fn encode(&self, w: &mut BodyWriter, version: u8) {
        match self {
            Self::SchemaChange(change) => {
                w.put_string("SCHEMA_CHANGE");
                change.encode(w, version);
            }
            Self::Other { kind, body } => {
                w.put_string(kind);
                w.put_raw(body);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn column(ks: &str, table: &str, name: &str, data_type: DataType) -> ColumnSpec {
        ColumnSpec {
            table: Some(TableSpec {
                keyspace: ks.to_string(),
                table: table.to_string(),
            }),
            name: name.to_string(),
            data_type,
        }
    }

    #[test]
    fn test_rows_with_paging_state() {
        let rows = ResultBody::Rows(Rows {
            metadata: RowsMetadata {
                flags: HAS_MORE_PAGES,
                columns_count: 2,
                paging_state: Some(Bytes::from_static(b"page")),
                pk_indices: None,
                global_table_spec: None,
                columns: vec![
                    column("ks", "t", "k", DataType::Native(0x000D)),
                    column("ks", "t", "v", DataType::List(Box::new(DataType::Native(0x0009)))),
                ],
            },
            rows: vec![vec![Some(Bytes::from_static(b"a")), None]],
        });
        let response = Response::Result(rows);

        let decoded = Response::decode(Opcode::Result, 4, response.encode(4)).unwrap();
        assert_eq!(decoded, response);
    }

    #[test]
    fn test_v4_prepared_carries_pk_indices() {
        let metadata = RowsMetadata {
            flags: GLOBAL_TABLES_SPEC,
            columns_count: 1,
            paging_state: None,
            pk_indices: Some(vec![0]),
            global_table_spec: Some(TableSpec {
                keyspace: "ks".to_string(),
                table: "t".to_string(),
            }),
            columns: vec![ColumnSpec {
                table: None,
                name: "k".to_string(),
                data_type: DataType::Native(0x000D),
            }],
        };
        let prepared = ResultBody::Prepared(Prepared {
            id: Bytes::from_static(&[1, 2, 3]),
            metadata,
            result_metadata: Some(RowsMetadata {
                flags: NO_METADATA,
                columns_count: 0,
                paging_state: None,
                pk_indices: None,
                global_table_spec: None,
                columns: vec![],
            }),
        });
        let response = Response::Result(prepared);
        let encoded = response.encode(4);
        assert_eq!(Response::decode(Opcode::Result, 4, encoded).unwrap(), response);
    }

    #[test]
    fn test_schema_change_v2_keyspace_has_empty_table() {
        let change = SchemaChange {
            change: "CREATED".to_string(),
            target: "KEYSPACE".to_string(),
            keyspace: "foo".to_string(),
            name: None,
            arguments: None,
        };
        let mut w = BodyWriter::new();
        change.encode(&mut w, 2);
        let bytes = w.finish();
        assert_eq!(&bytes[..], b"\x00\x07CREATED\x00\x03foo\x00\x00");

        let decoded = SchemaChange::decode(&mut BodyReader::new(bytes), 2).unwrap();
        assert_eq!(decoded, change);
    }

    #[test]
    fn test_function_schema_change_v4() {
        let change = SchemaChange {
            change: "DROPPED".to_string(),
            target: "FUNCTION".to_string(),
            keyspace: "ks".to_string(),
            name: Some("f".to_string()),
            arguments: Some(vec!["int".to_string()]),
        };
        let event = Response::Event(Event::SchemaChange(change));
        assert_eq!(Response::decode(Opcode::Event, 4, event.encode(4)).unwrap(), event);
    }

    #[test]
    fn test_udt_keyspaces_are_mapped() {
        let mut data_type = DataType::Map(
            Box::new(DataType::Native(0x000D)),
            Box::new(DataType::Udt {
                keyspace: "tokfoo".to_string(),
                name: "address".to_string(),
                fields: vec![(
                    "inner".to_string(),
                    DataType::Udt {
                        keyspace: "tokfoo".to_string(),
                        name: "street".to_string(),
                        fields: vec![],
                    },
                )],
            }),
        );
        data_type
            .try_map_keyspaces(&mut |ks: &str| {
                Ok::<_, ()>(ks.trim_start_matches("tok").to_string())
            })
            .unwrap();

        let DataType::Map(_, value) = data_type else {
            panic!("expected map");
        };
        let DataType::Udt {
            keyspace, fields, ..
        } = *value
        else {
            panic!("expected udt");
        };
        assert_eq!(keyspace, "foo");
        assert!(matches!(&fields[0].1, DataType::Udt { keyspace, .. } if keyspace == "foo"));
    }

    #[test]
    fn test_batch_keeps_values_and_tail() {
        let batch = Request::Batch(BatchRequest {
            kind: 0,
            statements: vec![
                BatchStatement {
                    target: BatchTarget::Query("INSERT INTO ks.t (k) VALUES (?)".to_string()),
                    values: Bytes::from_static(&[0, 1, 0, 0, 0, 1, b'x']),
                },
                BatchStatement {
                    target: BatchTarget::Prepared(Bytes::from_static(&[9, 9])),
                    values: Bytes::from_static(&[0, 0]),
                },
            ],
            tail: Bytes::from_static(&[0, 1, 0]),
        });
        let decoded = Request::decode(Opcode::Batch, batch.encode()).unwrap();
        assert_eq!(decoded, Some(batch));
    }

    #[test]
    fn test_clear_skip_metadata() {
        let params = Bytes::from_static(&[0, 1, 0x03, 0xAA]);
        assert_eq!(&clear_skip_metadata(4, params.clone())[..], &[0, 1, 0x01, 0xAA]);
        assert_eq!(clear_skip_metadata(1, params.clone()), params);
    }

    fn upper(_: usize, value: &[u8]) -> Option<Bytes> {
        Some(Bytes::from(value.to_ascii_uppercase()))
    }

    #[test]
    fn test_map_bound_values() {
        // consistency ONE, VALUES|PAGE_SIZE, three values, page size 100
        let mut w = BodyWriter::new();
        w.put_short(CONSISTENCY_ONE);
        w.put_u8(VALUES | 0x04);
        w.put_short(3);
        w.put_bytes(Some(b"ks"));
        w.put_int(-2);
        w.put_bytes(Some(b"t"));
        w.put_int(100);
        let params = w.finish();

        let mut seen = Vec::new();
        let mapped = map_bound_values(4, Opcode::Query, params, |index, value| {
            seen.push(index);
            (index == 0).then(|| Bytes::from(format!("x_{}", String::from_utf8_lossy(value))))
        })
        .unwrap();
        assert_eq!(seen, vec![0, 2]);

        let mut r = BodyReader::new(mapped);
        assert_eq!(r.read_short().unwrap(), CONSISTENCY_ONE);
        assert_eq!(r.read_u8().unwrap(), VALUES | 0x04);
        assert_eq!(r.read_short().unwrap(), 3);
        assert_eq!(r.read_bytes().unwrap(), Some(Bytes::from_static(b"x_ks")));
        assert_eq!(r.read_int().unwrap(), -2);
        assert_eq!(r.read_bytes().unwrap(), Some(Bytes::from_static(b"t")));
        assert_eq!(r.read_int().unwrap(), 100);
        assert!(r.is_empty());
    }

    #[test]
    fn test_map_bound_values_leaves_unbound_and_named_values() {
        let no_values = Bytes::from_static(&[0, 1, 0]);
        assert_eq!(
            map_bound_values(4, Opcode::Query, no_values.clone(), upper).unwrap(),
            no_values
        );

        let named = Bytes::from_static(&[0, 1, VALUES | NAMES_FOR_VALUES, 0, 1, 0, 1, b'k', 0, 0, 0, 1, b'v']);
        assert_eq!(map_bound_values(4, Opcode::Execute, named.clone(), upper).unwrap(), named);

        let v1_query = Bytes::from_static(&[0, 1]);
        assert_eq!(map_bound_values(1, Opcode::Query, v1_query.clone(), upper).unwrap(), v1_query);
    }

    #[test]
    fn test_map_bound_values_v1_execute() {
        // values come first, then the consistency
        let params = Bytes::from_static(&[0, 2, 0, 0, 0, 2, b'k', b's', 0xFF, 0xFF, 0xFF, 0xFF, 0, 1]);
        let mapped = map_bound_values(1, Opcode::Execute, params, upper).unwrap();
        assert_eq!(
            &mapped[..],
            &[0, 2, 0, 0, 0, 2, b'K', b'S', 0xFF, 0xFF, 0xFF, 0xFF, 0, 1]
        );
    }

    #[test]
    fn test_map_value_list_truncated() {
        let values = Bytes::from_static(&[0, 1, 0, 0, 0, 9, b'x']);
        assert!(matches!(map_value_list(values, upper), Err(WireError::Truncated(_))));
        let values = Bytes::from_static(&[0, 1, 0, 0, 0, 1, b'x']);
        assert_eq!(&map_value_list(values, upper).unwrap()[..], &[0, 1, 0, 0, 0, 1, b'X']);
    }

    #[test]
    fn test_response_envelope_order() {
        let envelope = ResponseEnvelope {
            tracing_id: Some([7; 16]),
            warnings: Some(vec!["careful".to_string()]),
            custom_payload: None,
        };
        let body = envelope.join(Bytes::from_static(b"rest"));
        let (decoded, rest) = ResponseEnvelope::split(envelope.flags(), body).unwrap();
        assert_eq!(decoded, envelope);
        assert_eq!(&rest[..], b"rest");
    }

    #[test]
    fn test_already_exists_detail() {
        let error = ErrorBody {
            code: error_code::ALREADY_EXISTS,
            message: "Cannot add existing keyspace \"foo\"".to_string(),
            detail: ErrorDetail::AlreadyExists {
                keyspace: "foo".to_string(),
                table: String::new(),
            },
        };
        let response = Response::Error(error);
        assert_eq!(Response::decode(Opcode::Error, 3, response.encode(3)).unwrap(), response);
    }

    #[test]
    fn test_function_failure_detail() {
        let response = Response::Error(ErrorBody {
            code: error_code::FUNCTION_FAILURE,
            message: "execution of 'ks.f[int]' failed".to_string(),
            detail: ErrorDetail::FunctionFailure {
                keyspace: "ks".to_string(),
                function: "f".to_string(),
                arg_types: vec!["int".to_string()],
            },
        });
        assert_eq!(Response::decode(Opcode::Error, 4, response.encode(4)).unwrap(), response);
    }

    #[test]
    fn test_oversized_row_count_is_a_truncation_error() {
        let mut w = BodyWriter::new();
        w.put_int(RESULT_ROWS);
        w.put_int(NO_METADATA);
        w.put_int(1);
        w.put_int(i32::MAX);
        w.put_int(-1);
        let result = Response::decode(Opcode::Result, 4, w.finish());
        assert!(matches!(result, Err(WireError::Truncated(_))));
    }
}
