//! A single native protocol connection to the backend.

use bytes::Bytes;
use cqlgate_core::BackendConfig;
use cqlgate_token::GatewayCredentials;
use std::fmt;
use std::io;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::time::timeout;

use crate::error::BackendError;
use crate::protocol::{
    EVENT_STREAM, Frame, FrameReader, Opcode, Request, Response, ResponseEnvelope, ResultBody,
};

/// User name and password of a backend principal.
#[derive(Clone, PartialEq, Eq)]
pub struct BackendLogin {
    pub username: String,
    pub password: String,
}

impl BackendLogin {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for BackendLogin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendLogin")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

pub struct BackendConnection {
    reader: FrameReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    version: u8,
    /// Physical keyspace selected with `USE`.
    keyspace: Option<String>,
    next_stream: i16,
    request_timeout: Duration,
}

impl BackendConnection {
    /// Open a TCP connection without sending STARTUP.
    pub async fn connect(
        config: &BackendConfig,
        version: u8,
        max_frame_bytes: usize,
    ) -> Result<Self, BackendError> {
        let address = config.address();
        let stream = timeout(config.connect_timeout(), TcpStream::connect(&address))
            .await
            .map_err(|_| BackendError::Timeout("connect"))?
            .map_err(|source| BackendError::Connect {
                address: address.clone(),
                source,
            })?;
        stream.set_nodelay(true)?;

        let (read_half, write_half) = stream.into_split();
        tracing::trace!(address = %address, version, "Opened backend connection");

        Ok(Self {
            reader: FrameReader::new(read_half, max_frame_bytes),
            writer: write_half,
            version,
            keyspace: None,
            next_stream: 0,
            request_timeout: config.request_timeout(),
        })
    }

    /// Connect, send STARTUP and log in if the backend asks for it.
    pub async fn open(
        config: &BackendConfig,
        version: u8,
        max_frame_bytes: usize,
        options: &[(String, String)],
        login: Option<&BackendLogin>,
    ) -> Result<Self, BackendError> {
        let mut connection = Self::connect(config, version, max_frame_bytes).await?;
        connection.startup(options, login).await?;
        Ok(connection)
    }

    async fn startup(
        &mut self,
        options: &[(String, String)],
        login: Option<&BackendLogin>,
    ) -> Result<(), BackendError> {
        let startup = Request::Startup {
            options: options.to_vec(),
        };
        match self.call(&startup).await? {
            Response::Ready => Ok(()),
            Response::Authenticate { authenticator } => match login {
                Some(login) => self.authenticate(login).await,
                None => Err(BackendError::Unexpected(format!(
                    "backend requires authentication with {authenticator}"
                ))),
            },
            Response::Error(error) => Err(BackendError::Rejected(error)),
            other => Err(unexpected("STARTUP", &other)),
        }
    }

    async fn authenticate(&mut self, login: &BackendLogin) -> Result<(), BackendError> {
        let request = if self.version == 1 {
            Request::Credentials {
                entries: vec![
                    ("username".to_string(), login.username.clone()),
                    ("password".to_string(), login.password.clone()),
                ],
            }
        } else {
            Request::AuthResponse {
                token: Some(Bytes::from(GatewayCredentials::sasl_plain(
                    &login.username,
                    &login.password,
                ))),
            }
        };

        match self.call(&request).await? {
            Response::Ready | Response::AuthSuccess { .. } => {
                tracing::trace!(username = %login.username, "Backend login accepted");
                Ok(())
            }
            Response::Error(error) => Err(BackendError::Rejected(error)),
            Response::AuthChallenge { .. } => Err(BackendError::Unexpected(
                "multi-step SASL authentication is not supported".to_string(),
            )),
            other => Err(unexpected("authentication", &other)),
        }
    }

    fn allocate_stream(&mut self) -> i16 {
        let limit = if self.version >= 3 { i16::MAX } else { i8::MAX as i16 };
        let stream = self.next_stream;
        self.next_stream = if stream >= limit { 0 } else { stream + 1 };
        stream
    }

    /// Send a request body and wait for the response on the same stream.
    ///
    /// After an error the connection state is unknown and it must be dropped.
    pub async fn send(
        &mut self,
        opcode: Opcode,
        flags: u8,
        body: Bytes,
    ) -> Result<Frame, BackendError> {
        let stream = self.allocate_stream();
        let frame = Frame::request(self.version, stream, opcode, body).with_flags(flags);

        timeout(self.request_timeout, self.round_trip(frame))
            .await
            .map_err(|_| BackendError::Timeout("request"))?
    }

    async fn round_trip(&mut self, frame: Frame) -> Result<Frame, BackendError> {
        self.writer.write_all(&frame.encode()).await?;
        loop {
            let response = self.read().await?;
            if response.stream() == frame.stream() {
                return Ok(response);
            }
            tracing::trace!(
                stream = response.stream(),
                expected = frame.stream(),
                "Skipping unrelated backend frame"
            );
        }
    }

    async fn read(&mut self) -> Result<Frame, BackendError> {
        self.reader.read_frame().await?.ok_or_else(|| {
            BackendError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "backend closed the connection",
            ))
        })
    }

    /// Send a typed request and decode the response.
    pub async fn call(&mut self, request: &Request) -> Result<Response, BackendError> {
        let frame = self.send(request.opcode(), 0, request.encode()).await?;
        decode_response(&frame)
    }

    /// Select a physical keyspace.
    pub async fn use_keyspace(&mut self, physical: &str) -> Result<(), BackendError> {
        let query = format!("USE \"{}\"", physical.replace('"', "\"\""));
        match self.call(&Request::simple_query(self.version, query)).await? {
            Response::Result(ResultBody::SetKeyspace(_)) => {
                self.keyspace = Some(physical.to_string());
                Ok(())
            }
            Response::Error(error) => Err(BackendError::Rejected(error)),
            other => Err(unexpected("USE", &other)),
        }
    }

    /// Subscribe this connection to server events.
    pub async fn register(&mut self, events: &[String]) -> Result<(), BackendError> {
        let request = Request::Register {
            events: events.to_vec(),
        };
        match self.call(&request).await? {
            Response::Ready => Ok(()),
            Response::Error(error) => Err(BackendError::Rejected(error)),
            other => Err(unexpected("REGISTER", &other)),
        }
    }

    /// Wait for the next pushed event. `None` once the backend closes.
    pub async fn next_event(&mut self) -> Result<Option<Frame>, BackendError> {
        loop {
            match self.reader.read_frame().await? {
                Some(frame) if frame.stream() == EVENT_STREAM => return Ok(Some(frame)),
                Some(_) => continue,
                None => return Ok(None),
            }
        }
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn keyspace(&self) -> Option<&str> {
        self.keyspace.as_deref()
    }

    /// Record a keyspace change made by a forwarded `USE`.
    pub fn set_keyspace(&mut self, keyspace: Option<String>) {
        self.keyspace = keyspace;
    }
}

/// Decode a response frame, skipping its envelope.
pub fn decode_response(frame: &Frame) -> Result<Response, BackendError> {
    let (_, body) = ResponseEnvelope::split(frame.flags(), frame.body.clone())?;
    Ok(Response::decode(frame.opcode(), frame.version(), body)?)
}

fn unexpected(during: &str, response: &Response) -> BackendError {
    BackendError::Unexpected(format!("{:?} in reply to {during}", response.opcode()))
}
