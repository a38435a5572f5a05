//! stave daemon: workspace server, file watcher, and control socket.
//!
//! [`server`] is usable on its own inside any tokio runtime; [`run`] wires it
//! to a notify watcher and a unix-socket control channel.

mod error;
pub mod paths;
pub mod protocol;
mod runtime;
pub mod server;

pub use error::DaemonError;
pub use protocol::{
    request_classpath, request_status, request_stop, request_sync, request_units, send_request,
    DaemonRequest, DaemonResponse,
};
pub use runtime::{run, start_blocking};
pub use server::{start, ServerStatus, WorkspaceHandle};
