//! Backend-to-client response translation.
//!
//! Every keyspace name in a response is mapped back to the tenant's logical
//! name. A name outside the tenant's namespace fails the whole response;
//! the session then answers with a generic server error instead of leaking
//! it.

use bytes::Bytes;
use cqlgate_rewrite::{MetadataVirtualizer, RelationName, RewriteError, TenantScope};

use crate::error::GatewayError;
use crate::protocol::{
    EVENT_STREAM, ErrorBody, ErrorDetail, Event, Frame, Opcode, Response, ResponseEnvelope,
    ResultBody, Rows, RowsMetadata, error_code,
};

/// Message sent when a response cannot be translated safely.
pub const UNTRANSLATABLE: &str = "Gateway could not translate backend response";

/// A keyspace selected by a forwarded `USE`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyspaceChange {
    pub physical: String,
    pub logical: String,
}

/// What the session learns from a translated response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseOutcome {
    /// Translated error message, if the backend returned an error.
    pub error: Option<String>,
    pub row_count: Option<u64>,
    /// Catalog rows hidden from the tenant.
    pub rows_filtered: u64,
    /// Physical relation of a rows result.
    pub relation: Option<RelationName>,
    pub keyspace: Option<KeyspaceChange>,
    pub prepared_id: Option<Bytes>,
}

pub struct ResponseTranslator<'a> {
    scope: TenantScope<'a>,
    virtualizer: &'a MetadataVirtualizer,
    version: u8,
}

impl<'a> ResponseTranslator<'a> {
    pub fn new(scope: TenantScope<'a>, virtualizer: &'a MetadataVirtualizer, version: u8) -> Self {
        Self {
            scope,
            virtualizer,
            version,
        }
    }

    /// Translate a backend response into the frame sent to the client on `stream`.
    ///
    /// `passthrough` marks statements the gateway forwarded unchanged; their
    /// syntax errors quote the client's own text and are left alone.
    pub fn translate(
        &self,
        frame: Frame,
        stream: i16,
        passthrough: bool,
    ) -> Result<(Frame, ResponseOutcome), GatewayError> {
        let opcode = frame.opcode();
        let (mut envelope, body) = ResponseEnvelope::split(frame.flags(), frame.body)?;
        if let Some(warnings) = envelope.warnings.as_mut() {
            for warning in warnings.iter_mut() {
                *warning = self.scope.strip(warning);
            }
        }

        let mut outcome = ResponseOutcome::default();
        let body = match opcode {
            Opcode::Result | Opcode::Error => {
                let mut response = Response::decode(opcode, self.version, body)?;
                match &mut response {
                    Response::Error(error) => self.translate_error(error, passthrough, &mut outcome)?,
                    Response::Result(result) => self.translate_result(result, &mut outcome)?,
                    _ => {}
                }
                response.encode(self.version)
            }
            _ => body,
        };

        let frame = Frame::response(self.version, stream, opcode, envelope.join(body))
            .with_flags(envelope.flags());
        Ok((frame, outcome))
    }

    fn keyspace(&self, physical: &str, context: &'static str) -> Result<String, RewriteError> {
        self.scope.logical_keyspace(physical, context)
    }

    fn translate_error(
        &self,
        error: &mut ErrorBody,
        passthrough: bool,
        outcome: &mut ResponseOutcome,
    ) -> Result<(), RewriteError> {
        if !(passthrough && error.code == error_code::SYNTAX_ERROR) {
            error.message = self.scope.strip(&error.message);
        }
        match &mut error.detail {
            ErrorDetail::AlreadyExists { keyspace, .. }
            | ErrorDetail::FunctionFailure { keyspace, .. } => {
                *keyspace = self.keyspace(keyspace, "error")?;
            }
            ErrorDetail::None | ErrorDetail::Unprepared { .. } | ErrorDetail::Raw(_) => {}
        }
        outcome.error = Some(error.message.clone());
        Ok(())
    }

    fn translate_result(
        &self,
        result: &mut ResultBody,
        outcome: &mut ResponseOutcome,
    ) -> Result<(), RewriteError> {
        match result {
            ResultBody::Void => {}
            ResultBody::Rows(rows) => self.translate_rows(rows, outcome)?,
            ResultBody::SetKeyspace(keyspace) => {
                let logical = self.keyspace(keyspace, "keyspace change")?;
                outcome.keyspace = Some(KeyspaceChange {
                    physical: std::mem::replace(keyspace, logical.clone()),
                    logical,
                });
            }
            ResultBody::Prepared(prepared) => {
                self.translate_metadata(&mut prepared.metadata)?;
                if let Some(metadata) = prepared.result_metadata.as_mut() {
                    self.translate_metadata(metadata)?;
                }
                outcome.prepared_id = Some(prepared.id.clone());
            }
            ResultBody::SchemaChange(change) => {
                change.keyspace = self.keyspace(&change.keyspace, "schema change")?;
            }
        }
        Ok(())
    }

    fn translate_rows(&self, rows: &mut Rows, outcome: &mut ResponseOutcome) -> Result<(), RewriteError> {
        let relation = rows
            .metadata
            .relation()
            .map(|spec| RelationName::new(&spec.keyspace, &spec.table));

        if let Some(relation) = relation.as_ref().filter(|r| self.virtualizer.is_protected(r)) {
            let columns: Vec<String> = rows
                .metadata
                .column_names()
                .into_iter()
                .map(str::to_string)
                .collect();
            let filtered = self.virtualizer.filter_rows(
                self.scope.namespace(),
                relation,
                &columns,
                std::mem::take(&mut rows.rows),
            );
            rows.rows = filtered.rows;
            outcome.rows_filtered = filtered.dropped as u64;
        }

        self.translate_metadata(&mut rows.metadata)?;
        outcome.row_count = Some(rows.rows.len() as u64);
        outcome.relation = relation;
        Ok(())
    }

    fn translate_metadata(&self, metadata: &mut RowsMetadata) -> Result<(), RewriteError> {
        if let Some(spec) = metadata.global_table_spec.as_mut() {
            spec.keyspace = self.keyspace(&spec.keyspace, "result metadata")?;
        }
        for column in &mut metadata.columns {
            if let Some(spec) = column.table.as_mut() {
                spec.keyspace = self.keyspace(&spec.keyspace, "result metadata")?;
            }
            column
                .data_type
                .try_map_keyspaces(&mut |ks: &str| self.keyspace(ks, "user type"))?;
        }
        Ok(())
    }
}

/// Translate a pushed event. `None` means the event concerns another
/// tenant and must not be delivered.
pub fn translate_event(
    scope: &TenantScope<'_>,
    version: u8,
    frame: Frame,
) -> Result<Option<Frame>, GatewayError> {
    let (_, body) = ResponseEnvelope::split(frame.flags(), frame.body)?;
    let mut response = Response::decode(Opcode::Event, version, body)?;

    if let Response::Event(Event::SchemaChange(change)) = &mut response {
        match scope.logical_keyspace(&change.keyspace, "schema event") {
            Ok(logical) => change.keyspace = logical,
            Err(RewriteError::ForeignIdentifier { .. }) => return Ok(None),
            Err(e) => return Err(e.into()),
        }
    }

    Ok(Some(Frame::response(
        version,
        EVENT_STREAM,
        Opcode::Event,
        response.encode(version),
    )))
}
