//! Connection handshake.
//!
//! Before any command may be sent the client walks the server through a fixed
//! sequence of [`Greeting`] exchanges:
//!
//! ```text
//! Client                                          Server
//!   |  -- STARTUP_MESSAGE {agent, name, db} -->      |
//!   |  <-- STARTUP_RESPONSE {method, ssl} ----------  |
//!   |  -- SSL_UPGRADE --> + TLS handshake            |  (only if ssl == REQUIRED)
//!   |  -- AUTHENTICATION {password} -->              |
//!   |  <-- AUTHENTICATION_OK ------------------------ |
//!   |  <-- MESSAGE_OPTION (zero or more) ------------ |
//!   |  <-- COMMAND_READY ---------------------------- |
//! ```
//!
//! The sequence is modelled as [`HandshakeState`]. Each state names the
//! [`Action`] it needs performed; the outcome is fed back as an [`Event`] to
//! compute the next state. Both steps are pure, [`perform`] does the I/O.
use std::fmt;

use log::{debug, info, trace, warn};
use thiserror::Error;

use super::{
    AuthMethod, Greeting, GreetingType,
    frame::{self, FrameReader},
    tls::{TlsError, TlsUpgrade},
    transport::{TransportError, TransportHandle},
};

#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("handshake failed: {reason}")]
    Failed { reason: String },
    #[error("unsupported authentication method {0}")]
    UnsupportedAuthMethod(String),
    #[error("TLS upgrade failed: {0}")]
    Tls(#[from] TlsError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeState {
    Initialized,
    WaitStartupResponse,
    UpgradeSsl,
    SendAuthentication,
    WaitAuthenticationResponse,
    ProcessReady,
    Finished,
    Error(String),
}

/// What the driver has to do to leave the current state.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Send(Greeting),
    Receive,
    /// Send the greeting, then replace the transport with a TLS stream.
    Upgrade(Greeting),
    Complete,
    Fail(String),
}

/// Outcome of an [`Action`].
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Sent,
    SendFailed(String),
    Received(Greeting),
    Upgraded,
}

/// Identity announced during the handshake.
#[derive(Clone, Copy)]
pub struct HandshakeParams<'a> {
    pub agent: &'a str,
    pub user: &'a str,
    pub password: &'a str,
    pub database: &'a str,
}

impl HandshakeState {
    pub fn action(&self, params: &HandshakeParams<'_>) -> Action {
        match self {
            HandshakeState::Initialized => {
                Action::Send(Greeting::startup(params.agent, params.user, params.database))
            }
            HandshakeState::UpgradeSsl => Action::Upgrade(Greeting::ssl_upgrade()),
            HandshakeState::SendAuthentication => {
                Action::Send(Greeting::authentication(params.password))
            }
            HandshakeState::WaitStartupResponse
            | HandshakeState::WaitAuthenticationResponse
            | HandshakeState::ProcessReady => Action::Receive,
            HandshakeState::Finished => Action::Complete,
            HandshakeState::Error(reason) => Action::Fail(reason.clone()),
        }
    }

    /// Computes the state that follows `event`.
    ///
    /// Protocol violations lead to [`HandshakeState::Error`]; only an
    /// authentication method the client cannot satisfy is reported directly.
    pub fn next(self, event: Event) -> Result<HandshakeState, HandshakeError> {
        use HandshakeState::*;

        let next = match (self, event) {
            (_, Event::SendFailed(reason)) => Error(reason),
            (Initialized, Event::Sent) => WaitStartupResponse,
            (WaitStartupResponse, Event::Received(greeting)) => {
                check_auth_method(&greeting)?;
                if greeting.requires_ssl() {
                    UpgradeSsl
                } else {
                    SendAuthentication
                }
            }
            (UpgradeSsl, Event::Upgraded) => SendAuthentication,
            (SendAuthentication, Event::Sent) => WaitAuthenticationResponse,
            (WaitAuthenticationResponse, Event::Received(greeting)) => {
                match greeting.kind() {
                    Some(GreetingType::AuthenticationOk) => ProcessReady,
                    other => Error(format!("expected AuthenticationOk, received {other:?}")),
                }
            }
            (ProcessReady, Event::Received(greeting)) => match greeting.kind() {
                Some(GreetingType::MessageOption) => ProcessReady,
                Some(GreetingType::CommandReady) => Finished,
                other => Error(format!("expected CommandReady, received {other:?}")),
            },
            (state, event) => Error(format!("unexpected {event:?} in state {state}")),
        };
        Ok(next)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, HandshakeState::Finished | HandshakeState::Error(_))
    }
}

impl fmt::Display for HandshakeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HandshakeState::Initialized => "initialized",
            HandshakeState::WaitStartupResponse => "wait-startup-response",
            HandshakeState::UpgradeSsl => "upgrade-ssl",
            HandshakeState::SendAuthentication => "send-authentication",
            HandshakeState::WaitAuthenticationResponse => "wait-authentication-response",
            HandshakeState::ProcessReady => "process-ready",
            HandshakeState::Finished => "finished",
            HandshakeState::Error(_) => "error",
        };
        f.write_str(name)
    }
}

/// A missing method means cleartext, which is the only one this client speaks.
fn check_auth_method(greeting: &Greeting) -> Result<(), HandshakeError> {
    let method = greeting
        .authentication
        .as_ref()
        .and_then(|auth| auth.auth_method());

    match method {
        None | Some(Ok(AuthMethod::CleartextPassword)) => Ok(()),
        Some(Ok(other)) => Err(HandshakeError::UnsupportedAuthMethod(format!("{other:?}"))),
        Some(Err(raw)) => Err(HandshakeError::UnsupportedAuthMethod(raw.to_string())),
    }
}

/// Something worth reporting while the handshake runs.
#[derive(Debug)]
pub enum HandshakeEvent<'a> {
    Transition {
        from: &'a HandshakeState,
        to: &'a HandshakeState,
    },
    Sent(&'a Greeting),
    Received(&'a Greeting),
    Upgraded,
}

/// Hook for watching a handshake without touching its logic.
pub trait HandshakeObserver {
    fn observe(&mut self, event: &HandshakeEvent<'_>);
}

impl<F: FnMut(&HandshakeEvent<'_>)> HandshakeObserver for F {
    fn observe(&mut self, event: &HandshakeEvent<'_>) {
        self(event)
    }
}

/// Default observer; reports through the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl HandshakeObserver for LogObserver {
    fn observe(&mut self, event: &HandshakeEvent<'_>) {
        match event {
            HandshakeEvent::Transition { from, to } => match to {
                HandshakeState::Error(reason) => warn!("handshake {from} -> error: {reason}"),
                HandshakeState::Finished => info!("handshake finished, ready for commands"),
                _ => trace!("handshake {from} -> {to}"),
            },
            HandshakeEvent::Sent(greeting) => debug!("sent greeting: {greeting:?}"),
            HandshakeEvent::Received(greeting) => debug!("received greeting: {greeting:?}"),
            HandshakeEvent::Upgraded => info!("transport upgraded to TLS"),
        }
    }
}

/// Runs the handshake to completion over `transport`.
///
/// Read failures and TLS failures abort immediately; everything else the state
/// machine rejects ends in [`HandshakeError::Failed`].
pub fn perform<U>(
    transport: &mut TransportHandle,
    frames: &mut FrameReader,
    params: &HandshakeParams<'_>,
    upgrader: &U,
    observer: &mut dyn HandshakeObserver,
) -> Result<(), HandshakeError>
where
    U: TlsUpgrade + ?Sized,
{
    let mut state = HandshakeState::Initialized;

    loop {
        let event = match state.action(params) {
            Action::Complete => return Ok(()),
            Action::Fail(reason) => return Err(HandshakeError::Failed { reason }),
            Action::Send(greeting) => send(transport, &greeting, observer),
            Action::Receive => {
                let greeting: Greeting = frames.read_message(transport.stream()?)?;
                observer.observe(&HandshakeEvent::Received(&greeting));
                Event::Received(greeting)
            }
            Action::Upgrade(greeting) => match send(transport, &greeting, observer) {
                Event::Sent => {
                    frames.reset();
                    transport.replace_with(|stream| upgrader.upgrade(stream))?;
                    observer.observe(&HandshakeEvent::Upgraded);
                    Event::Upgraded
                }
                failed => failed,
            },
        };

        let next = state.clone().next(event)?;
        observer.observe(&HandshakeEvent::Transition {
            from: &state,
            to: &next,
        });
        state = next;
    }
}

fn send(
    transport: &mut TransportHandle,
    greeting: &Greeting,
    observer: &mut dyn HandshakeObserver,
) -> Event {
    let res = transport
        .stream()
        .and_then(|stream| frame::write_message(stream, greeting));

    match res {
        Ok(()) => {
            observer.observe(&HandshakeEvent::Sent(greeting));
            Event::Sent
        }
        Err(e) => Event::SendFailed(format!("failed to send {:?}: {e}", greeting.kind())),
    }
}
