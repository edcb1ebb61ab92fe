use zenoh::Session;

use databus_common::{ContextDescriptor, Direction, Endpoint, Error, Result, TransportOptions};

/// Zenoh locator for an endpoint, e.g. `tcp/10.0.0.5:7447`.
pub fn locator(endpoint: &Endpoint) -> String {
    format!("tcp/{}", endpoint.authority())
}

/// Build the session configuration for one context.
///
/// In `client` mode every context connects to the router at the endpoint.
/// In `peer` mode subscribers listen on the endpoint and publishers connect
/// to it, so a pair of contexts can talk without a router. Multicast
/// scouting is disabled: the endpoint is the only way in.
pub fn config(
    descriptor: &ContextDescriptor,
    endpoint: &Endpoint,
    options: &TransportOptions,
) -> Result<zenoh::Config> {
    let mut zenoh_config = zenoh::Config::default();
    let mode = options.zenoh.mode.as_str();

    let mode_str = match mode {
        "client" | "peer" => format!("\"{}\"", mode),
        other => {
            return Err(Error::Config(format!(
                "Invalid Zenoh mode: '{}'. Expected 'client' or 'peer'",
                other
            )));
        }
    };

    zenoh_config
        .insert_json5("mode", &mode_str)
        .map_err(|e| Error::Config(format!("Failed to set mode: {}", e)))?;

    zenoh_config
        .insert_json5("scouting/multicast/enabled", "false")
        .map_err(|e| Error::Config(format!("Failed to disable scouting: {}", e)))?;

    let endpoints = serde_json::to_string(&[locator(endpoint)])?;
    let key = if mode == "peer" && descriptor.direction == Direction::Subscriber {
        "listen/endpoints"
    } else {
        "connect/endpoints"
    };

    zenoh_config
        .insert_json5(key, &endpoints)
        .map_err(|e| Error::Config(format!("Failed to set {}: {}", key, e)))?;

    Ok(zenoh_config)
}

/// Open a session for `descriptor`, bounded by the connect timeout.
pub async fn connect(
    descriptor: &ContextDescriptor,
    endpoint: &Endpoint,
    options: &TransportOptions,
) -> Result<Session> {
    let zenoh_config = config(descriptor, endpoint, options)?;

    tracing::debug!(
        context = %descriptor.name,
        mode = %options.zenoh.mode,
        locator = %locator(endpoint),
        "Opening Zenoh session"
    );

    let timeout = options.connect_timeout();
    let session = match tokio::time::timeout(timeout, async { zenoh::open(zenoh_config).await }).await {
        Ok(Ok(session)) => session,
        Ok(Err(e)) => return Err(Error::connect(endpoint.to_string(), e)),
        Err(_) => {
            return Err(Error::connect(
                endpoint.to_string(),
                format!("no session within {:?}", timeout),
            ));
        }
    };

    tracing::info!(context = %descriptor.name, zid = %session.zid(), "Connected to Zenoh");

    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locator() {
        let endpoint = Endpoint::parse("zenoh://10.0.0.5:7447/").unwrap();
        assert_eq!(locator(&endpoint), "tcp/10.0.0.5:7447");
    }

    #[test]
    fn test_invalid_mode() {
        let descriptor = ContextDescriptor::publisher("sm", "zenoh://localhost:7447/");
        let endpoint = descriptor.validate().unwrap();
        let mut options = TransportOptions::default();
        options.zenoh.mode = "router".into();

        assert!(matches!(
            config(&descriptor, &endpoint, &options),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_peer_and_client_configs_build() {
        let sub = ContextDescriptor::subscriber("s", "zenoh://127.0.0.1:7447/");
        let publisher = ContextDescriptor::publisher("p", "zenoh://127.0.0.1:7447/");
        let endpoint = sub.validate().unwrap();

        let mut options = TransportOptions::default();
        assert!(config(&sub, &endpoint, &options).is_ok());

        options.zenoh.mode = "peer".into();
        assert!(config(&sub, &endpoint, &options).is_ok());
        assert!(config(&publisher, &endpoint, &options).is_ok());
    }
}
