//! Session error types.

use hvac_wire::WireError;
use std::net::SocketAddr;
use thiserror::Error;

/// Errors raised while handling datagrams or building commands.
///
/// None of these are fatal: the engine logs them and drops the triggering
/// datagram or command.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Codec, cipher or envelope failure
    #[error(transparent)]
    Wire(#[from] WireError),

    /// A MAC already known to this engine was announced again
    #[error("device {0} is already registered")]
    DuplicateDeviceRegistration(String),

    /// Traffic or command for a controller that has not completed binding
    #[error("controller {0} is not bound")]
    UnboundController(String),

    /// Datagram from an address no discovered controller uses
    #[error("no controller session for {0}")]
    UnknownController(SocketAddr),

    /// MAC not present in the registry
    #[error("unknown device {0}")]
    UnknownDevice(String),

    /// Property has no representation in the device's protocol variant
    #[error("{property} is not supported by device {mac}")]
    UnsupportedProperty {
        /// Device MAC
        mac: String,
        /// Property name
        property: &'static str,
    },

    /// Binary command requested before the device reported any frame to edit
    #[error("device {0} has not reported a status frame yet")]
    NoStatusFrame(String),

    /// Socket send failed
    #[error("transport error: {0}")]
    Transport(String),

    /// Controller loop is gone
    #[error("controller loop has stopped")]
    ChannelClosed,
}
