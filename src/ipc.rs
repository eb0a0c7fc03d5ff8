//! Frame streaming, the control daemon and its Unix-socket protocol.

pub mod dispatch;
pub mod pipeline;
pub mod runtime;
pub mod server;

pub use pipeline::{build_session, run_stream};
pub use server::{client_request, run_daemon};
