//! Connection management and the session supervisor.

pub mod controller;
pub mod session;

pub use controller::{ConnectionController, ConnectionState, Dialer, TcpDialer};
pub use session::{ScreenSession, SessionHandles};
