//! Topic filter to key expression translation.
//!
//! Topic names are `/`-separated like Zenoh keys. MQTT-style wildcards map
//! to their Zenoh equivalents: `+` becomes `*` and `#` becomes `**`.

use zenoh::key_expr::OwnedKeyExpr;

use databus_common::{Error, Result};

/// Translate a topic name or filter into a validated key expression.
pub fn to_key_expr(topic: &str) -> Result<OwnedKeyExpr> {
    let key = topic
        .split('/')
        .map(|chunk| match chunk {
            "+" => "*",
            "#" => "**",
            other => other,
        })
        .collect::<Vec<_>>()
        .join("/");

    OwnedKeyExpr::autocanonize(key).map_err(|e| Error::invalid_topic(topic, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_topic() {
        assert_eq!(to_key_expr("sm/topic1").unwrap().as_str(), "sm/topic1");
    }

    #[test]
    fn test_wildcards() {
        assert_eq!(to_key_expr("line1/+/speed").unwrap().as_str(), "line1/*/speed");
        assert_eq!(to_key_expr("sm/#").unwrap().as_str(), "sm/**");
    }

    #[test]
    fn test_zenoh_reserved_characters_rejected() {
        assert!(to_key_expr("sm/$weird").is_err());
    }
}
