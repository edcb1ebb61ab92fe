//! Translation of databus settings into `rumqttc` client options.

use std::time::Duration;

use rumqttc::{MqttOptions, QoS, TlsConfiguration, Transport};

use databus_common::{ContextDescriptor, Endpoint, Error, Result, TransportOptions};

/// Schemes served by the MQTT driver.
pub const SCHEMES: &[&str] = &["mqtt", "mqtts"];

/// Lowest keep-alive the client accepts.
const MIN_KEEP_ALIVE: Duration = Duration::from_secs(5);

/// Map a numeric QoS level.
pub fn qos(level: u8) -> Result<QoS> {
    match level {
        0 => Ok(QoS::AtMostOnce),
        1 => Ok(QoS::AtLeastOnce),
        2 => Ok(QoS::ExactlyOnce),
        other => Err(Error::Config(format!(
            "mqtt.qos must be 0, 1 or 2 (got {})",
            other
        ))),
    }
}

/// Client identifier for a context: `<prefix>-<name>-<pub|sub>`.
///
/// Publisher and subscriber contexts sharing a name stay distinct so the
/// broker does not kick one off when the other connects.
pub fn client_id(prefix: &str, descriptor: &ContextDescriptor) -> String {
    let name: String = descriptor
        .name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!(
        "{}-{}-{}",
        prefix,
        name,
        descriptor.direction.as_str().to_ascii_lowercase()
    )
}

/// Build client options for `descriptor` connecting to `endpoint`.
pub fn build(
    descriptor: &ContextDescriptor,
    endpoint: &Endpoint,
    options: &TransportOptions,
) -> Result<MqttOptions> {
    let mut mqtt = MqttOptions::new(
        client_id(&options.mqtt.client_id, descriptor),
        endpoint.host(),
        endpoint.port(),
    );
    mqtt.set_keep_alive(Duration::from_secs(options.mqtt.keep_alive_secs).max(MIN_KEEP_ALIVE));
    mqtt.set_clean_session(options.mqtt.clean_session);

    if let Some(credentials) = &options.credentials {
        mqtt.set_credentials(&credentials.username, &credentials.password);
    }

    if endpoint.scheme() == "mqtts" {
        let tls = options.tls.as_ref().ok_or_else(|| {
            Error::Config("mqtts endpoints require a 'tls' section with at least 'ca_cert'".into())
        })?;
        let (ca, client_auth) = tls.load()?;
        mqtt.set_transport(Transport::tls_with_config(TlsConfiguration::Simple {
            ca,
            alpn: None,
            client_auth,
        }));
    }

    Ok(mqtt)
}
