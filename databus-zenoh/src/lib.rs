//! Zenoh transport for databus.
//!
//! Serves `zenoh://host:port/` endpoints. Topic filters become key
//! expressions (`+` to `*`, `#` to `**`).
//!
//! Note: Zenoh requires a multi-thread Tokio runtime.

pub mod driver;
pub mod keyexpr;
pub mod session;

pub use driver::ZenohDriver;
