//! Fire-and-forget UDP pusher.
//!
//! # Responsibilities
//! - Encode an event and send it as one datagram
//! - Follow live changes of the configured target address
//!
//! # Design Decisions
//! - Uses a blocking std socket: a send is a single non-waiting syscall and
//!   the interceptors run on the caller's thread, async or not
//! - The target sits in an ArcSwap so a reload never races a send

use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::config::{PusherConfig, SharedConfig, SubscriptionId};
use crate::transport::{Event, Transport, TransportError};

/// Largest UDP payload over IPv4.
pub const MAX_DATAGRAM_BYTES: usize = 65_507;

pub struct Pusher {
    socket: UdpSocket,
    target: ArcSwap<SocketAddr>,
}

fn parse_target(config: &PusherConfig) -> Result<SocketAddr, TransportError> {
    config
        .target_address
        .parse()
        .map_err(|_| TransportError::Address(config.target_address.clone()))
}

impl Pusher {
    /// Bind an ephemeral local socket of the target's address family.
    pub fn new(config: &PusherConfig) -> Result<Self, TransportError> {
        let target = parse_target(config)?;
        let local = if target.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(local).map_err(TransportError::Bind)?;

        tracing::debug!(target = %target, "Pusher ready");
        Ok(Self {
            socket,
            target: ArcSwap::from_pointee(target),
        })
    }

    pub fn target(&self) -> SocketAddr {
        **self.target.load()
    }

    /// Point the pusher at a new collector address.
    pub fn retarget(&self, config: &PusherConfig) -> Result<(), TransportError> {
        let target = parse_target(config)?;
        if target != self.target() {
            tracing::info!(target = %target, "Pusher target changed");
            self.target.store(Arc::new(target));
        }
        Ok(())
    }

    /// Keep the target in sync with `shared`. Returns the subscription so the
    /// caller can stop following.
    pub fn follow(self: &Arc<Self>, shared: &SharedConfig) -> SubscriptionId {
        let pusher = Arc::downgrade(self);
        shared.subscribe(move |config| {
            if let Some(pusher) = pusher.upgrade() {
                if let Err(e) = pusher.retarget(&config.pusher) {
                    tracing::warn!(error = %e, "Ignoring invalid pusher target");
                }
            }
        })
    }
}

impl Transport for Pusher {
    fn push(&self, event: &Event) -> Result<(), TransportError> {
        let payload = event.encode()?;
        if payload.len() > MAX_DATAGRAM_BYTES {
            return Err(TransportError::Oversized(payload.len()));
        }
        self.socket
            .send_to(&payload, self.target())
            .map_err(TransportError::Send)?;
        Ok(())
    }
}
