//! Handshake state machine: register, rekey or reconnect until a session key
//! is held.

use std::fmt;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

use crate::config::{Identity, IdentityStore};
use crate::crypto::{Crypto, SessionKey};
use crate::error::{Error, Result};
use crate::network::Connection;
use crate::protocol::{ClientId, Request, RequestCode, Response, ResponseCode, MAX_TRIES};

/// Where the client stands with the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unregistered,
    Registering,
    /// Registered and holding a fresh session key
    Registered,
    /// Identity loaded from disk, not yet confirmed by the server
    HasIdentity,
    Reconnecting,
    /// Reconnected and holding a session key
    Connected,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Unregistered => "unregistered",
            SessionState::Registering => "registering",
            SessionState::Registered => "registered",
            SessionState::HasIdentity => "has identity",
            SessionState::Reconnecting => "reconnecting",
            SessionState::Connected => "connected",
        };
        f.write_str(name)
    }
}

pub struct Session<C> {
    name: String,
    client_id: ClientId,
    session_key: Option<SessionKey>,
    state: SessionState,
    crypto: C,
    store: IdentityStore,
}

impl<C: Crypto> Session<C> {
    /// A client that has never registered
    pub fn new(name: impl Into<String>, crypto: C, store: IdentityStore) -> Self {
        Self {
            name: name.into(),
            client_id: ClientId::default(),
            session_key: None,
            state: SessionState::Unregistered,
            crypto,
            store,
        }
    }

    /// A client resuming a saved identity
    pub fn from_identity(identity: Identity, mut crypto: C, store: IdentityStore) -> Result<Self> {
        crypto.load_private_key(&identity.private_key)?;
        Ok(Self {
            name: identity.name,
            client_id: identity.client_id,
            session_key: None,
            state: SessionState::HasIdentity,
            crypto,
            store,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn crypto(&self) -> &C {
        &self.crypto
    }

    /// Present once a handshake has completed
    pub fn session_key(&self) -> Option<&SessionKey> {
        self.session_key.as_ref()
    }

    pub fn is_established(&self) -> bool {
        matches!(
            self.state,
            SessionState::Registered | SessionState::Connected
        ) && self.session_key.is_some()
    }

    /// Reconnect with a saved identity, register otherwise
    pub async fn establish<S>(&mut self, conn: &mut Connection<S>) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        match self.state {
            SessionState::HasIdentity => self.reconnect(conn).await,
            _ => self.register(conn).await,
        }
    }

    /// Register the name, then exchange keys and persist the new identity
    pub async fn register<S>(&mut self, conn: &mut Connection<S>) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        info!(name = %self.name, "Registering with {}", conn.peer());
        self.state = SessionState::Registering;

        let request = Request::general(self.client_id, RequestCode::Registration, &self.name)?;
        let mut assigned = None;
        for attempt in 1..=MAX_TRIES {
            let response = exchange(conn, &request).await?;
            if response.code() == ResponseCode::SuccessfulRegistration {
                assigned = Some(response.client_id()?);
                break;
            }
            warn!(attempt, "Registration rejected with {}", response.code());
        }

        let Some(client_id) = assigned else {
            self.state = SessionState::Unregistered;
            return Err(Error::RegistrationFailed(MAX_TRIES));
        };
        self.client_id = client_id;
        self.state = SessionState::Registered;
        info!(client_id = %self.client_id, "Registered");

        self.send_public_key(conn).await?;
        self.persist()
    }

    /// Send a freshly generated public key and take the session key it buys
    pub async fn send_public_key<S>(&mut self, conn: &mut Connection<S>) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let public_key = self.crypto.generate_keypair()?;
        let request = Request::send_key(self.client_id, &self.name, &public_key)?;
        debug!("Public key generated");

        for attempt in 1..=MAX_TRIES {
            let response = exchange(conn, &request).await?;
            if response.code() == ResponseCode::PublicKeyReceived {
                self.adopt_session_key(response.encrypted_key()?)?;
                info!("Session key received");
                return Ok(());
            }
            warn!(attempt, "Public key rejected with {}", response.code());
        }

        Err(Error::KeyExchangeFailed(MAX_TRIES))
    }

    /// Resume a saved identity. A server that no longer knows us gets a fresh
    /// registration.
    pub async fn reconnect<S>(&mut self, conn: &mut Connection<S>) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        info!(name = %self.name, client_id = %self.client_id, "Reconnecting to {}", conn.peer());
        self.state = SessionState::Reconnecting;

        let request = Request::general(self.client_id, RequestCode::Reconnection, &self.name)?;
        for attempt in 1..=MAX_TRIES {
            let response = exchange(conn, &request).await?;
            match response.code() {
                ResponseCode::SuccessfulReconnection => {
                    self.adopt_session_key(response.encrypted_key()?)?;
                    self.state = SessionState::Connected;
                    info!("Reconnected");
                    return Ok(());
                }
                ResponseCode::ReconnectionFailed => {
                    warn!("Server does not recognize this client, registering again");
                    self.client_id = ClientId::default();
                    self.session_key = None;
                    return self.register(conn).await;
                }
                code => warn!(attempt, "Reconnection answered with {}", code),
            }
        }

        self.state = SessionState::HasIdentity;
        Err(Error::ReconnectionRefused(MAX_TRIES))
    }

    // Any previous key is dropped wholesale
    fn adopt_session_key(&mut self, encrypted: &[u8]) -> Result<()> {
        let key = self.crypto.decrypt_with_private_key(encrypted)?;
        self.session_key = Some(SessionKey::new(key)?);
        Ok(())
    }

    fn persist(&self) -> Result<()> {
        let identity = Identity {
            name: self.name.clone(),
            client_id: self.client_id,
            private_key: self.crypto.export_private_key()?,
        };
        self.store.save(&identity)?;
        info!(path = %self.store.path().display(), "Identity saved");
        Ok(())
    }
}

async fn exchange<S>(conn: &mut Connection<S>, request: &Request) -> Result<Response>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    conn.send_request(request).await?;
    Response::read(conn).await
}
