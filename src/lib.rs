//! Diagnosis portal client.
//!
//! Composes four pieces behind one [`shell::Application`]:
//!
//! - [`router`] resolves navigations through global and per-route guards,
//! - [`transport`] calls the diagnosis backend over HTTP,
//! - [`realtime`] keeps a Socket.IO channel open to the same host,
//! - [`session`] persists the login credential the guards read.

pub mod config;
pub mod logging;
pub mod realtime;
pub mod router;
pub mod session;
pub mod shell;
pub mod transport;

pub use config::PortalConfig;
pub use shell::{Application, ShellError};
