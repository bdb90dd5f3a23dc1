use thiserror::Error;

use crate::{
    clock::{is_time_synced, WallClock},
    command::{CommandBody, LockCommand},
    config::ApiConfig,
    signer::{Nonce, SignedRequest},
};

pub const CONTENT_TYPE_JSON: &str = "application/json; charset=utf8";

/// Status and body of one HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

#[derive(Debug, Error)]
#[error("{0}")]
pub struct TransportError(pub String);

/// Issues one HTTPS POST. Implemented per platform.
pub trait CommandTransport {
    fn post(
        &mut self,
        url: &str,
        headers: &[(&str, &str)],
        body: &[u8],
    ) -> Result<TransportResponse, TransportError>;
}

/// Reports whether the network link is usable.
pub trait LinkStatus {
    fn is_connected(&self) -> bool;
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("network link is down")]
    NotConnected,
    #[error("wall clock not synced (epoch {epoch_secs})")]
    ClockNotSynced { epoch_secs: i64 },
    #[error("transport failed: {0}")]
    Transport(#[from] TransportError),
    #[error("API rejected command with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },
}

impl DispatchError {
    /// Failures raised before any network I/O was attempted.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::NotConnected | Self::ClockNotSynced { .. })
    }
}

/// Sends lock/unlock commands: one signed POST per call, no retries.
pub struct Dispatcher<T> {
    api: ApiConfig,
    transport: T,
}

impl<T: CommandTransport> Dispatcher<T> {
    pub fn new(api: ApiConfig, transport: T) -> Self {
        Self { api, transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn dispatch<L, C>(
        &mut self,
        command: LockCommand,
        link: &L,
        clock: &C,
    ) -> Result<TransportResponse, DispatchError>
    where
        L: LinkStatus + ?Sized,
        C: WallClock + ?Sized,
    {
        self.dispatch_with_nonce(command, link, clock, Nonce::generate())
    }

    pub fn dispatch_with_nonce<L, C>(
        &mut self,
        command: LockCommand,
        link: &L,
        clock: &C,
        nonce: Nonce,
    ) -> Result<TransportResponse, DispatchError>
    where
        L: LinkStatus + ?Sized,
        C: WallClock + ?Sized,
    {
        if !link.is_connected() {
            return Err(DispatchError::NotConnected);
        }

        let now = clock.now_utc();
        if !is_time_synced(now.timestamp()) {
            return Err(DispatchError::ClockNotSynced {
                epoch_secs: now.timestamp(),
            });
        }

        let signed = SignedRequest::new(
            &self.api.token,
            &self.api.secret,
            now.timestamp_millis(),
            nonce,
        );
        let signed_headers = signed.headers();

        let mut headers: Vec<(&str, &str)> = Vec::with_capacity(signed_headers.len() + 1);
        headers.push(("Content-Type", CONTENT_TYPE_JSON));
        headers.extend(
            signed_headers
                .iter()
                .map(|(name, value)| (*name, value.as_str())),
        );

        let body = CommandBody::new(command).to_json();
        let url = self.api.commands_url();
        let response = self.transport.post(&url, &headers, body.as_bytes())?;

        if response.status == 200 {
            Ok(response)
        } else {
            Err(DispatchError::Rejected {
                status: response.status,
                body: response.body,
            })
        }
    }
}
