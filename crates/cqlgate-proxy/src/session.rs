//! One client connection.
//!
//! The read loop runs in the connection's task; responses go through an
//! mpsc channel to a writer task so the event forwarder can push frames on
//! the same socket.

use bytes::Bytes;
use cqlgate_audit::{AuditContext, AuditError, StatementRecord};
use cqlgate_core::Namespace;
use cqlgate_rewrite::{BoundName, IdentifierRewriter, RewrittenStatement, TenantScope};
use cqlgate_token::{GatewayCredentials, ResolvedTenant, TokenError};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::backend::{BackendConnection, BackendLogin, ConnectionSpec, decode_response};
use crate::error::{BackendError, WireError};
use crate::protocol::{
    BatchTarget, ErrorBody, Frame, FrameReader, MAX_VERSION, MIN_VERSION, Opcode, Request,
    RequestEnvelope, Response, clear_skip_metadata, error_code, flags, map_bound_values,
    map_value_list, response_frame,
};
use crate::proxy::GatewayContext;
use crate::translate::{ResponseTranslator, UNTRANSLATABLE, translate_event};

const OUTBOUND_QUEUE: usize = 128;

const BAD_CREDENTIALS: &str = "Provided username and/or password are incorrect";
const BACKEND_UNAVAILABLE: &str = "Backend unavailable";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Close,
}

/// Serve a client connection until it closes or the gateway shuts down.
pub(crate) async fn serve(
    context: Arc<GatewayContext>,
    socket: TcpStream,
    peer: SocketAddr,
    mut shutdown: watch::Receiver<bool>,
) {
    let (read_half, write_half) = socket.into_split();
    let (outbound, queue) = mpsc::channel(OUTBOUND_QUEUE);
    let writer = tokio::spawn(write_frames(write_half, queue));

    let max_frame_bytes = context.config.proxy.max_frame_bytes;
    let mut session = GatewaySession::new(context, peer, Responder { outbound });
    let mut reader = FrameReader::new(read_half, max_frame_bytes);

    loop {
        let next = tokio::select! {
            _ = shutdown.changed() => {
                tracing::debug!(connection_id = %session.connection_id, "Closing session for shutdown");
                break;
            }
            next = reader.read_frame() => next,
        };

        let flow = match next {
            Ok(Some(frame)) => session.handle(frame).await,
            Ok(None) => Flow::Close,
            Err(e) => session.reject_frame(e).await,
        };
        if flow == Flow::Close {
            break;
        }
    }

    session.close().await;
    if let Err(e) = writer.await {
        tracing::debug!(error = %e, "Writer task ended abnormally");
    }
}

async fn write_frames(mut writer: OwnedWriteHalf, mut queue: mpsc::Receiver<Bytes>) {
    while let Some(bytes) = queue.recv().await {
        if let Err(e) = writer.write_all(&bytes).await {
            tracing::debug!(error = %e, "Client write failed");
            return;
        }
    }
    let _ = writer.shutdown().await;
}

/// Sending half of the client socket.
#[derive(Clone)]
struct Responder {
    outbound: mpsc::Sender<Bytes>,
}

impl Responder {
    async fn send(&self, frame: Frame) {
        if self.outbound.send(frame.encode()).await.is_err() {
            tracing::debug!("Client writer is gone, dropping frame");
        }
    }

    async fn respond(&self, version: u8, stream: i16, response: Response) {
        self.send(response_frame(version, stream, &response)).await;
    }

    async fn error(&self, version: u8, stream: i16, code: i32, message: impl Into<String>) {
        self.respond(version, stream, Response::Error(ErrorBody::new(code, message)))
            .await;
    }
}

/// State of an authenticated session.
struct Authenticated {
    tenant: ResolvedTenant,
    principal: String,
    spec: ConnectionSpec,
    /// Logical keyspace selected by the client.
    keyspace: Option<String>,
    /// Prepared statement ids this session may execute, with the markers
    /// whose values name tenant objects.
    prepared: HashMap<Bytes, Vec<BoundName>>,
    /// Event types the client registered for.
    events: Vec<String>,
}

/// A statement ready to be forwarded.
struct Outbound {
    request: Request,
    action: String,
    original: Option<String>,
    rewritten: Option<String>,
    passthrough: bool,
    /// Bound names of a statement being prepared.
    bound_names: Vec<BoundName>,
}

enum LoginFailure {
    Rejected(String),
    /// The token registry could not be read.
    Registry(TokenError),
    Unavailable(BackendError),
}

impl From<TokenError> for LoginFailure {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::Registry(_) => Self::Registry(e),
            other => Self::Rejected(other.to_string()),
        }
    }
}

impl From<BackendError> for LoginFailure {
    fn from(e: BackendError) -> Self {
        if e.is_unavailable() {
            Self::Unavailable(e)
        } else {
            Self::Rejected(e.to_string())
        }
    }
}

struct GatewaySession {
    context: Arc<GatewayContext>,
    connection_id: String,
    audit: AuditContext,
    responder: Responder,
    version: Option<u8>,
    startup: Option<Vec<(String, String)>>,
    auth: Option<Authenticated>,
    event_forwarder: Option<JoinHandle<()>>,
    opened_at: Instant,
}

impl GatewaySession {
    fn new(context: Arc<GatewayContext>, peer: SocketAddr, responder: Responder) -> Self {
        let connection_id = Uuid::new_v4().to_string();
        tracing::debug!(connection_id = %connection_id, peer = %peer, "Session started");

        Self {
            context,
            audit: AuditContext::connection(connection_id.clone(), peer.ip().to_string()),
            connection_id,
            responder,
            version: None,
            startup: None,
            auth: None,
            event_forwarder: None,
            opened_at: Instant::now(),
        }
    }

    fn version(&self) -> u8 {
        self.version.unwrap_or(MAX_VERSION)
    }

    async fn protocol_error(&self, stream: i16, message: impl Into<String>) {
        self.responder
            .error(self.version(), stream, error_code::PROTOCOL_ERROR, message)
            .await;
    }

    /// Answer a frame that could not be read.
    async fn reject_frame(&mut self, error: WireError) -> Flow {
        match error {
            WireError::UnsupportedVersion { version, stream } => {
                tracing::debug!(version, "Client requested an unsupported protocol version");
                let reply = if version > MAX_VERSION { MAX_VERSION } else { MIN_VERSION };
                self.responder
                    .error(
                        reply,
                        stream,
                        error_code::PROTOCOL_ERROR,
                        format!(
                            "Invalid or unsupported protocol version ({version}); \
                             supported versions are {MIN_VERSION} to {MAX_VERSION}"
                        ),
                    )
                    .await;
                Flow::Close
            }
            WireError::UnknownOpcode { opcode, stream } => {
                self.protocol_error(stream, format!("Unknown opcode 0x{opcode:02x}"))
                    .await;
                Flow::Continue
            }
            WireError::FrameTooLarge { .. } => {
                self.protocol_error(0, error.to_string()).await;
                Flow::Close
            }
            other => {
                tracing::debug!(connection_id = %self.connection_id, error = %other, "Client stream ended");
                Flow::Close
            }
        }
    }

    async fn handle(&mut self, frame: Frame) -> Flow {
        let stream = frame.stream();
        let version = frame.version();

        match self.version {
            None => self.version = Some(version),
            Some(negotiated) if negotiated != version => {
                self.protocol_error(
                    stream,
                    format!("Protocol version changed from {negotiated} to {version}"),
                )
                .await;
                return Flow::Close;
            }
            Some(_) => {}
        }

        if frame.header.is_response() {
            self.protocol_error(stream, "Clients must not send responses").await;
            return Flow::Close;
        }
        if frame.header.has_flag(flags::COMPRESSION) {
            self.protocol_error(stream, "Compression is not supported").await;
            return Flow::Continue;
        }

        let frame_flags = frame.flags();
        let opcode = frame.opcode();
        let decoded = RequestEnvelope::split(frame_flags, frame.body)
            .and_then(|(envelope, body)| Ok((envelope, Request::decode(opcode, body)?)));
        let (envelope, request) = match decoded {
            Ok((envelope, Some(request))) => (envelope, request),
            Ok((_, None)) => {
                self.protocol_error(stream, format!("Unexpected {opcode:?} message"))
                    .await;
                return Flow::Continue;
            }
            Err(e) => {
                self.protocol_error(stream, format!("Malformed {opcode:?} message: {e}"))
                    .await;
                return Flow::Continue;
            }
        };

        match request {
            Request::Options => self.options(stream).await,
            Request::Startup { options } => self.startup(stream, options).await,
            Request::Credentials { entries } if version == 1 => {
                let user_token_length = self.context.namespace.user_token_length;
                let credentials = GatewayCredentials::from_map(
                    entries.iter().map(|(k, v)| (k.as_str(), v.as_str())),
                    user_token_length,
                );
                self.login(stream, credentials).await
            }
            Request::AuthResponse { token } if version >= 2 => {
                let user_token_length = self.context.namespace.user_token_length;
                let credentials = GatewayCredentials::from_sasl_plain(
                    token.as_deref().unwrap_or_default(),
                    user_token_length,
                );
                self.login(stream, credentials).await
            }
            Request::Credentials { .. } | Request::AuthResponse { .. } => {
                self.protocol_error(stream, format!("{opcode:?} is not valid in protocol v{version}"))
                    .await;
                Flow::Close
            }
            _ if self.auth.is_none() => {
                self.protocol_error(stream, "Authentication required before any statement")
                    .await;
                Flow::Close
            }
            Request::Register { events } => self.register(stream, events).await,
            request => self.statement(stream, frame_flags, envelope, request).await,
        }
    }

    async fn options(&self, stream: i16) -> Flow {
        let version = self.version();
        let backend = &self.context.config.backend;
        let max_frame_bytes = self.context.config.proxy.max_frame_bytes;

        let reply = async {
            let mut connection = BackendConnection::connect(backend, version, max_frame_bytes).await?;
            let frame = connection.send(Opcode::Options, 0, Bytes::new()).await?;
            decode_response(&frame)
        }
        .await;

        match reply {
            Ok(Response::Supported { mut options }) => {
                for (name, values) in options.iter_mut() {
                    if name.eq_ignore_ascii_case("COMPRESSION") {
                        values.clear();
                    }
                }
                self.responder
                    .respond(version, stream, Response::Supported { options })
                    .await;
                Flow::Continue
            }
            Ok(Response::Error(error)) => {
                self.responder.respond(version, stream, Response::Error(error)).await;
                Flow::Continue
            }
            Ok(other) => {
                tracing::warn!(opcode = ?other.opcode(), "Unexpected reply to OPTIONS");
                self.responder
                    .error(version, stream, error_code::SERVER_ERROR, UNTRANSLATABLE)
                    .await;
                Flow::Continue
            }
            Err(e) => {
                tracing::warn!(error = %e, "Backend unavailable for OPTIONS");
                self.responder
                    .error(version, stream, error_code::OVERLOADED, BACKEND_UNAVAILABLE)
                    .await;
                Flow::Close
            }
        }
    }

    async fn startup(&mut self, stream: i16, mut options: Vec<(String, String)>) -> Flow {
        if self.startup.is_some() || self.auth.is_some() {
            self.protocol_error(stream, "STARTUP was already received").await;
            return Flow::Continue;
        }

        let before = options.len();
        options.retain(|(name, _)| !name.eq_ignore_ascii_case("COMPRESSION"));
        if options.len() != before {
            tracing::debug!(connection_id = %self.connection_id, "Ignoring requested compression");
        }
        self.startup = Some(options);

        let authenticator = self.context.config.proxy.authenticator.clone();
        self.responder
            .respond(self.version(), stream, Response::Authenticate { authenticator })
            .await;
        Flow::Continue
    }

    async fn login(
        &mut self,
        stream: i16,
        credentials: Result<GatewayCredentials, TokenError>,
    ) -> Flow {
        let version = self.version();
        if self.auth.is_some() {
            self.protocol_error(stream, "Session is already authenticated").await;
            return Flow::Continue;
        }
        let Some(options) = self.startup.clone() else {
            self.protocol_error(stream, "Credentials received before STARTUP").await;
            return Flow::Close;
        };

        match self.authenticate(version, options, credentials).await {
            Ok(auth) => {
                self.audit = self
                    .audit
                    .clone()
                    .with_tenant(auth.tenant.record.owner_id.clone(), auth.principal.clone());
                tracing::info!(
                    connection_id = %self.connection_id,
                    tenant = %auth.tenant.record.owner_id,
                    principal = %auth.principal,
                    version,
                    "Session authenticated"
                );
                audited(self.context.audit.log_session_opened(&self.audit).await);

                self.auth = Some(auth);
                let response = if version == 1 {
                    Response::Ready
                } else {
                    Response::AuthSuccess { token: None }
                };
                self.responder.respond(version, stream, response).await;
                Flow::Continue
            }
            Err(LoginFailure::Unavailable(e)) => {
                tracing::warn!(connection_id = %self.connection_id, error = %e, "Backend unavailable during login");
                self.responder
                    .error(version, stream, error_code::OVERLOADED, BACKEND_UNAVAILABLE)
                    .await;
                Flow::Close
            }
            Err(LoginFailure::Rejected(reason)) => {
                tracing::warn!(connection_id = %self.connection_id, reason = %reason, "Authentication failed");
                self.refuse_login(stream, &reason).await
            }
            Err(LoginFailure::Registry(e)) => {
                tracing::error!(connection_id = %self.connection_id, error = %e, "Token registry unavailable during login");
                self.refuse_login(stream, &e.to_string()).await
            }
        }
    }

    /// Answer a failed login with the generic credentials error.
    async fn refuse_login(&self, stream: i16, reason: &str) -> Flow {
        audited(
            self.context
                .audit
                .log_authentication_failed(&self.audit, reason)
                .await,
        );
        self.responder
            .error(self.version(), stream, error_code::BAD_CREDENTIALS, BAD_CREDENTIALS)
            .await;
        Flow::Close
    }

    async fn authenticate(
        &self,
        version: u8,
        options: Vec<(String, String)>,
        credentials: Result<GatewayCredentials, TokenError>,
    ) -> Result<Authenticated, LoginFailure> {
        let credentials = credentials?;
        let tenant = self.context.resolver.resolve(&credentials.user_token).await?;

        let login = BackendLogin::new(
            tenant.namespace.physical(&credentials.principal),
            credentials.password,
        );
        let spec = ConnectionSpec::new(version, options).with_login(login);

        // The new connection then serves the first statement.
        self.context.pool.login(&spec).await?;

        Ok(Authenticated {
            tenant,
            principal: credentials.principal,
            spec,
            keyspace: None,
            prepared: HashMap::new(),
            events: Vec::new(),
        })
    }

    /// Rewrite a statement request for the backend.
    fn outbound(&self, auth: &Authenticated, request: Request) -> Result<Outbound, ErrorBody> {
        let version = self.version();
        let rewriter = &self.context.rewriter;
        let namespace = &auth.tenant.namespace;
        let keyspace = auth.keyspace.as_deref();

        match request {
            Request::Query { query, parameters } => {
                let rewritten = accepted(rewriter.rewrite_request(namespace, keyspace, &query))?;
                let parameters =
                    bind_names(rewriter, namespace, &rewritten.bound_names, parameters, |p, f| {
                        map_bound_values(version, Opcode::Query, p, f)
                    })?;
                Ok(Outbound {
                    action: rewritten
                        .verb()
                        .map(|v| v.as_str().to_string())
                        .unwrap_or_else(|| "QUERY".to_string()),
                    passthrough: rewritten.is_passthrough(),
                    request: Request::Query {
                        query: rewritten.text.clone(),
                        parameters: clear_skip_metadata(version, parameters),
                    },
                    original: Some(rewritten.original),
                    rewritten: Some(rewritten.text),
                    bound_names: Vec::new(),
                })
            }
            Request::Prepare { query, extra } => {
                let rewritten = accepted(rewriter.rewrite_request(namespace, keyspace, &query))?;
                Ok(Outbound {
                    action: "PREPARE".to_string(),
                    passthrough: rewritten.is_passthrough(),
                    request: Request::Prepare {
                        query: rewritten.text.clone(),
                        extra,
                    },
                    original: Some(rewritten.original),
                    rewritten: Some(rewritten.text),
                    bound_names: rewritten.bound_names,
                })
            }
            Request::Execute { id, parameters } => {
                let Some(names) = auth.prepared.get(&id) else {
                    return Err(ErrorBody::unprepared(id));
                };
                let parameters = bind_names(rewriter, namespace, names, parameters, |p, f| {
                    map_bound_values(version, Opcode::Execute, p, f)
                })?;
                Ok(Outbound {
                    action: "EXECUTE".to_string(),
                    passthrough: false,
                    request: Request::Execute {
                        id,
                        parameters: clear_skip_metadata(version, parameters),
                    },
                    original: None,
                    rewritten: None,
                    bound_names: Vec::new(),
                })
            }
            Request::Batch(mut batch) => {
                let mut originals = Vec::new();
                let mut rewrites = Vec::new();
                let mut passthrough = false;
                for statement in &mut batch.statements {
                    let names = match &mut statement.target {
                        BatchTarget::Query(query) => {
                            let rewritten =
                                accepted(rewriter.rewrite_request(namespace, keyspace, query))?;
                            passthrough |= rewritten.is_passthrough();
                            originals.push(rewritten.original);
                            rewrites.push(rewritten.text.clone());
                            *query = rewritten.text;
                            rewritten.bound_names
                        }
                        BatchTarget::Prepared(id) => match auth.prepared.get(id) {
                            Some(names) => names.clone(),
                            None => return Err(ErrorBody::unprepared(id.clone())),
                        },
                    };
                    let values = std::mem::take(&mut statement.values);
                    statement.values =
                        bind_names(rewriter, namespace, &names, values, |v, f| map_value_list(v, f))?;
                }
                Ok(Outbound {
                    action: "BATCH".to_string(),
                    passthrough,
                    request: Request::Batch(batch),
                    original: (!originals.is_empty()).then(|| originals.join("; ")),
                    rewritten: (!rewrites.is_empty()).then(|| rewrites.join("; ")),
                    bound_names: Vec::new(),
                })
            }
            other => Err(ErrorBody::new(
                error_code::PROTOCOL_ERROR,
                format!("Unexpected {:?} message", other.opcode()),
            )),
        }
    }

    async fn statement(
        &mut self,
        stream: i16,
        frame_flags: u8,
        envelope: RequestEnvelope,
        request: Request,
    ) -> Flow {
        let started = Instant::now();
        let version = self.version();
        let Some(auth) = self.auth.as_ref() else {
            return Flow::Close;
        };

        let outbound = match self.outbound(auth, request) {
            Ok(outbound) => outbound,
            Err(error) => {
                tracing::debug!(connection_id = %self.connection_id, code = error.code, "Statement refused");
                self.responder.respond(version, stream, Response::Error(error)).await;
                return Flow::Continue;
            }
        };

        let scope = TenantScope::new(&auth.tenant.namespace, &self.context.namespace);
        let physical_keyspace = auth.keyspace.as_deref().map(|k| scope.physical_keyspace(k));

        let mut connection = match self
            .context
            .pool
            .acquire(&auth.spec, physical_keyspace.as_deref())
            .await
        {
            Ok(connection) => connection,
            Err(BackendError::Rejected(error)) => {
                // The session keyspace could not be selected on a fresh connection.
                let message = scope.strip(&error.message);
                self.responder
                    .error(version, stream, error.code, message.clone())
                    .await;
                self.audit_failure(&outbound, started, &message).await;
                return Flow::Continue;
            }
            Err(e) => return self.backend_unavailable(stream, &e).await,
        };

        let body = envelope.join(outbound.request.encode());
        let opcode = outbound.request.opcode();
        let response = match connection
            .send(opcode, frame_flags & !flags::COMPRESSION, body)
            .await
        {
            Ok(response) => response,
            Err(e) => return self.backend_unavailable(stream, &e).await,
        };

        let translator = ResponseTranslator::new(scope, &self.context.virtualizer, version);
        let (frame, outcome) = match translator.translate(response, stream, outbound.passthrough) {
            Ok(translated) => translated,
            Err(e) => {
                // The connection may now hold state the gateway cannot name.
                drop(connection);
                tracing::error!(
                    connection_id = %self.connection_id,
                    action = %outbound.action,
                    error = %e,
                    "Refusing untranslatable backend response"
                );
                self.responder
                    .error(version, stream, error_code::SERVER_ERROR, UNTRANSLATABLE)
                    .await;
                self.audit_failure(&outbound, started, UNTRANSLATABLE).await;
                return Flow::Continue;
            }
        };

        if let Some(change) = &outcome.keyspace {
            connection.set_keyspace(Some(change.physical.clone()));
        }
        connection.release();
        self.responder.send(frame).await;

        if let Some(auth) = self.auth.as_mut() {
            if let Some(change) = outcome.keyspace.clone() {
                auth.keyspace = Some(change.logical);
            }
            if let Some(id) = outcome.prepared_id.clone() {
                auth.prepared.insert(id, outbound.bound_names.clone());
            }
        }

        let relation = outcome.relation.as_ref().map(ToString::to_string);
        let record = StatementRecord {
            action: &outbound.action,
            statement: outbound.original.as_deref(),
            rewritten: outbound.rewritten.as_deref(),
            relation: relation.as_deref(),
            duration_ms: started.elapsed().as_millis() as u64,
        };
        let result = match &outcome.error {
            Some(error) => {
                self.context
                    .audit
                    .log_statement_failed(&self.audit, record, error)
                    .await
            }
            None => {
                self.context
                    .audit
                    .log_statement_executed(&self.audit, record, outcome.row_count, outcome.rows_filtered)
                    .await
            }
        };
        audited(result);

        Flow::Continue
    }

    async fn audit_failure(&self, outbound: &Outbound, started: Instant, error: &str) {
        let record = StatementRecord {
            action: &outbound.action,
            statement: outbound.original.as_deref(),
            rewritten: outbound.rewritten.as_deref(),
            relation: None,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        audited(
            self.context
                .audit
                .log_statement_failed(&self.audit, record, error)
                .await,
        );
    }

    async fn backend_unavailable(&self, stream: i16, error: &BackendError) -> Flow {
        tracing::warn!(connection_id = %self.connection_id, error = %error, "Backend unavailable");
        self.responder
            .error(self.version(), stream, error_code::OVERLOADED, BACKEND_UNAVAILABLE)
            .await;
        Flow::Close
    }

    /// Subscribe the client to events through a dedicated backend connection.
    async fn register(&mut self, stream: i16, events: Vec<String>) -> Flow {
        let version = self.version();
        let Some(auth) = self.auth.as_mut() else {
            return Flow::Close;
        };
        for event in events {
            if !auth.events.contains(&event) {
                auth.events.push(event);
            }
        }

        let opened = open_event_connection(&self.context, version, auth).await;

        let connection = match opened {
            Ok(connection) => connection,
            Err(BackendError::Rejected(error)) => {
                let message = auth.tenant.namespace.strip_all(&error.message);
                self.responder.error(version, stream, error.code, message).await;
                return Flow::Continue;
            }
            Err(e) => return self.backend_unavailable(stream, &e).await,
        };

        if let Some(previous) = self.event_forwarder.take() {
            previous.abort();
        }
        tracing::debug!(connection_id = %self.connection_id, events = ?auth.events, "Registered for events");
        self.event_forwarder = Some(tokio::spawn(forward_events(
            connection,
            Arc::clone(&self.context),
            auth.tenant.clone(),
            self.responder.clone(),
        )));

        self.responder.respond(version, stream, Response::Ready).await;
        Flow::Continue
    }

    async fn close(mut self) {
        if let Some(forwarder) = self.event_forwarder.take() {
            forwarder.abort();
        }
        if self.auth.is_some() {
            let duration_ms = self.opened_at.elapsed().as_millis() as u64;
            audited(
                self.context
                    .audit
                    .log_session_closed(&self.audit, duration_ms)
                    .await,
            );
        }
        tracing::debug!(connection_id = %self.connection_id, "Session closed");
    }
}

/// A dedicated backend connection registered for the session's events.
async fn open_event_connection(
    context: &GatewayContext,
    version: u8,
    auth: &Authenticated,
) -> Result<BackendConnection, BackendError> {
    let mut connection = BackendConnection::open(
        &context.config.backend,
        version,
        context.config.proxy.max_frame_bytes,
        &auth.spec.options,
        auth.spec.login.as_ref(),
    )
    .await?;
    connection.register(&auth.events).await?;
    Ok(connection)
}

/// Relay backend events to the client, dropping other tenants' schema changes.
async fn forward_events(
    mut connection: BackendConnection,
    context: Arc<GatewayContext>,
    tenant: ResolvedTenant,
    responder: Responder,
) {
    let scope = TenantScope::new(&tenant.namespace, &context.namespace);
    let version = connection.version();
    loop {
        let frame = match connection.next_event().await {
            Ok(Some(frame)) if frame.opcode() == Opcode::Event => frame,
            Ok(Some(_)) => continue,
            Ok(None) => {
                tracing::debug!("Backend event connection closed");
                return;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Backend event connection failed");
                return;
            }
        };

        match translate_event(&scope, version, frame) {
            Ok(Some(frame)) => {
                if responder.outbound.send(frame.encode()).await.is_err() {
                    return;
                }
            }
            Ok(None) => tracing::trace!("Dropped event for another tenant"),
            Err(e) => tracing::warn!(error = %e, "Dropped untranslatable event"),
        }
    }
}

/// The statement, or the error a refused statement is answered with.
fn accepted(rewritten: RewrittenStatement) -> Result<RewrittenStatement, ErrorBody> {
    match &rewritten.rejection {
        Some(message) => Err(ErrorBody::new(error_code::INVALID, message.clone())),
        None => Ok(rewritten),
    }
}

/// Translate the bound values of catalog markers in `values` with `map`.
///
/// Without bound names the values are forwarded without being parsed.
fn bind_names<M>(
    rewriter: &IdentifierRewriter,
    namespace: &Namespace,
    names: &[BoundName],
    values: Bytes,
    map: M,
) -> Result<Bytes, ErrorBody>
where
    M: FnOnce(Bytes, &mut dyn FnMut(usize, &[u8]) -> Option<Bytes>) -> Result<Bytes, WireError>,
{
    if names.is_empty() {
        return Ok(values);
    }

    let mut translate = |index: usize, value: &[u8]| {
        let name = names.iter().find(|name| name.index == index)?;
        let value = std::str::from_utf8(value).ok()?;
        rewriter
            .physical_bound_value(namespace, *name, value)
            .map(Bytes::from)
    };
    map(values, &mut translate).map_err(|e| {
        ErrorBody::new(error_code::PROTOCOL_ERROR, format!("Malformed bound values: {e}"))
    })
}

fn audited(result: Result<(), AuditError>) {
    if let Err(e) = result {
        tracing::warn!(error = %e, "Failed to write audit event");
    }
}
