//! MQTT transport for databus.
//!
//! Serves `mqtt://host:port/` and `mqtts://host:port/` endpoints through
//! [`rumqttc`]. Register it with the facade:
//!
//! ```ignore
//! let registry = DriverRegistry::new().with(MqttDriver::new(options));
//! ```

pub mod driver;
pub mod options;

pub use driver::MqttDriver;
