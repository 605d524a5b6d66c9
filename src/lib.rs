//! fget library
//!
//! Length-prefixed single-file retrieval over TCP: a fixed worker pool
//! drains a mutex/condvar-guarded connection queue fed by one accept
//! loop, and each connection carries exactly one request/response
//! exchange.

pub mod cli;
pub mod client;
pub mod log;
pub mod logger;
pub mod pool;
pub mod protocol;
pub mod queue;
pub mod server;
pub mod wire;
