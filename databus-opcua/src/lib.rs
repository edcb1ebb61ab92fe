//! OPC-UA transport for databus.
//!
//! Topics map onto string-identified variable nodes in the namespace chosen
//! by the endpoint path (`opcua://host:4840/<index or namespace URI>/`).
//! Publishers write node values; subscribers monitor them.

pub mod driver;
pub mod node;
pub mod variant;

pub use driver::OpcUaDriver;
