//! kiln dev server: routing, error mapping and response streaming.

pub mod server;

pub use server::{app, bind_addr, request_mode, run, DevServer, Mode, ServeError};
