//! Client → server messages.

use serde::{Deserialize, Serialize};

/// Message received from an observer's client.
///
/// Only liveness traffic is interpreted by the core; anything else is the transport's
/// business and should still be reported through
/// [`Registry::record_contact`](crate::Registry::record_contact).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Client-initiated probe; answered with a `pong`.
    Ping,
    /// Answer to a server `ping`.
    Pong,
}
