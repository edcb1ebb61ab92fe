//! Endpoint and topic to OPC-UA address mapping.
//!
//! `opcua://plc01:4840/<namespace>/` connects to `opc.tcp://plc01:4840/`.
//! The namespace segment is either a numeric index or a namespace URI looked
//! up in the server's namespace array. Topic `T` addresses node `ns=<idx>;s=T`.

use opcua::types::NodeId;

use databus_common::{Endpoint, Error, Result};

/// Namespace selected by an endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamespaceRef {
    Index(u16),
    Uri(String),
}

impl NamespaceRef {
    /// Read the namespace from the first path segment of `endpoint`.
    pub fn from_endpoint(endpoint: &Endpoint) -> Result<Self> {
        let segment = endpoint.path().first().ok_or_else(|| {
            Error::bad_endpoint(
                endpoint.to_string(),
                "opcua endpoints need a namespace segment, e.g. opcua://host:4840/2/",
            )
        })?;

        if segment.bytes().all(|b| b.is_ascii_digit()) {
            segment
                .parse::<u16>()
                .map(NamespaceRef::Index)
                .map_err(|_| Error::bad_endpoint(endpoint.to_string(), "namespace index out of range"))
        } else {
            Ok(NamespaceRef::Uri(segment.clone()))
        }
    }

    /// Resolve against the server's namespace array.
    pub fn resolve(&self, namespaces: &[String]) -> std::result::Result<u16, String> {
        match self {
            NamespaceRef::Index(idx) => {
                if namespaces.is_empty() || usize::from(*idx) < namespaces.len() {
                    Ok(*idx)
                } else {
                    Err(format!(
                        "namespace index {} not present on server ({} namespaces)",
                        idx,
                        namespaces.len()
                    ))
                }
            }
            NamespaceRef::Uri(uri) => namespaces
                .iter()
                .position(|ns| ns == uri)
                .and_then(|idx| u16::try_from(idx).ok())
                .ok_or_else(|| format!("namespace '{}' not found on server", uri)),
        }
    }
}

/// `opc.tcp` URL of the server behind `endpoint`.
pub fn server_url(endpoint: &Endpoint) -> String {
    format!("opc.tcp://{}/", endpoint.authority())
}

/// Node addressed by `topic` in namespace `ns`.
pub fn node_id(ns: u16, topic: &str) -> NodeId {
    NodeId::new(ns, topic.to_string())
}
