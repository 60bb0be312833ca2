//! Transport Addresses
//!
//! ```text
//! maltcp://10.0.0.5:1024/provider@routing
//! └────── root ────────┘└──┬───┘└──┬───┘
//!                       service  routing suffix
//! ```
//!
//! The root URI (up to and including the first service delimiter after the
//! authority) names a remote transport instance and keys its destination
//! channel. A numeric port makes the root a *server* address that can be
//! connected to; anything else in the port position is an opaque client
//! identifier that can only be answered over an already-open socket.

use std::fmt;
use thiserror::Error;

/// Separates the root URI from the service identifier
pub const SERVICE_DELIMITER: char = '/';

/// Separates the service identifier from the routing suffix
pub const ROUTING_DELIMITER: char = '@';

const SCHEME_SEPARATOR: &str = "://";

/// Address parsing failures
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("Address '{uri}' has no scheme separator")]
    MissingScheme { uri: String },

    #[error("Address '{uri}' has no port delimiter")]
    MissingPort { uri: String },

    #[error("Address '{uri}' has an empty host")]
    EmptyHost { uri: String },
}

/// Host and port (or client id) parsed out of a root URI
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authority<'a> {
    /// Connectable address
    Server { host: &'a str, port: u16 },
    /// Label-only address of a peer that does not listen
    Client { host: &'a str, id: &'a str },
}

/// Transport address string
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Uri(String);

impl Uri {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Root URI for a server transport
    pub fn server_root(scheme: &str, host: &str, port: u16) -> Self {
        Self(format!("{scheme}{SCHEME_SEPARATOR}{host}:{port}{SERVICE_DELIMITER}"))
    }

    /// Root URI for a non-listening transport identified by an opaque id
    pub fn client_root(scheme: &str, host: &str, id: &str) -> Self {
        Self(format!("{scheme}{SCHEME_SEPARATOR}{host}:{id}{SERVICE_DELIMITER}"))
    }

    /// Endpoint address under a transport root
    pub fn for_endpoint(root: &Uri, name: &str) -> Self {
        let root = root.root();
        Self(format!("{}{}", root.as_str(), name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Byte offset just past the authority, where the service part begins
    fn authority_end(&self) -> usize {
        let start = self
            .0
            .find(SCHEME_SEPARATOR)
            .map(|i| i + SCHEME_SEPARATOR.len())
            .unwrap_or(0);
        self.0[start..]
            .find(SERVICE_DELIMITER)
            .map(|i| start + i)
            .unwrap_or(self.0.len())
    }

    /// Root URI: everything up to and including the first service delimiter.
    ///
    /// An address without a service part gets the delimiter appended so the
    /// result is always usable as a destination key.
    pub fn root(&self) -> Uri {
        let end = self.authority_end();
        if end < self.0.len() {
            Uri(self.0[..=end].to_string())
        } else {
            Uri(format!("{}{}", self.0, SERVICE_DELIMITER))
        }
    }

    /// Whether this address is already a root URI
    pub fn is_root(&self) -> bool {
        self.authority_end() + 1 == self.0.len()
    }

    /// Endpoint identifier: the service part, cut at the routing delimiter
    /// when routing is supported.
    pub fn endpoint_id(&self, routing_supported: bool) -> &str {
        let end = self.authority_end();
        if end >= self.0.len() {
            return "";
        }
        let service = &self.0[end + 1..];
        if routing_supported {
            match service.find(ROUTING_DELIMITER) {
                Some(i) => &service[..i],
                None => service,
            }
        } else {
            service
        }
    }

    /// Routing suffix after the routing delimiter, if any
    pub fn routing_suffix(&self) -> Option<&str> {
        let end = self.authority_end();
        if end >= self.0.len() {
            return None;
        }
        let service = &self.0[end + 1..];
        service.find(ROUTING_DELIMITER).map(|i| &service[i + 1..])
    }

    /// Parse host and port/client id out of the authority
    pub fn authority(&self) -> Result<Authority<'_>, AddressError> {
        let start = self
            .0
            .find(SCHEME_SEPARATOR)
            .map(|i| i + SCHEME_SEPARATOR.len())
            .ok_or_else(|| AddressError::MissingScheme {
                uri: self.0.clone(),
            })?;
        let authority = &self.0[start..self.authority_end()];

        let (host, port) = authority
            .rsplit_once(':')
            .ok_or_else(|| AddressError::MissingPort {
                uri: self.0.clone(),
            })?;

        if host.is_empty() {
            return Err(AddressError::EmptyHost {
                uri: self.0.clone(),
            });
        }

        match port.parse::<u16>() {
            Ok(port) => Ok(Authority::Server { host, port }),
            Err(_) => Ok(Authority::Client { host, id: port }),
        }
    }

    /// Whether a socket can be actively opened towards this address
    pub fn is_connectable(&self) -> bool {
        matches!(self.authority(), Ok(Authority::Server { .. }))
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Uri {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Uri {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for Uri {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_extraction() {
        let uri = Uri::from("maltcp://10.0.0.5:1024/provider@route");
        assert_eq!(uri.root().as_str(), "maltcp://10.0.0.5:1024/");
        assert_eq!(uri.endpoint_id(true), "provider");
        assert_eq!(uri.endpoint_id(false), "provider@route");
        assert_eq!(uri.routing_suffix(), Some("route"));
        assert!(!uri.is_root());
        assert!(uri.root().is_root());
    }

    #[test]
    fn test_root_without_service_part() {
        let uri = Uri::from("maltcp://host:80");
        assert_eq!(uri.root().as_str(), "maltcp://host:80/");
        assert_eq!(uri.endpoint_id(true), "");
    }

    #[test]
    fn test_server_and_client_authority() {
        let server = Uri::from("maltcp://localhost:2024/svc");
        assert_eq!(
            server.authority(),
            Ok(Authority::Server {
                host: "localhost",
                port: 2024
            })
        );
        assert!(server.is_connectable());

        let client = Uri::from("maltcp://localhost:c3f9a1/svc");
        assert_eq!(
            client.authority(),
            Ok(Authority::Client {
                host: "localhost",
                id: "c3f9a1"
            })
        );
        assert!(!client.is_connectable());
    }

    #[test]
    fn test_missing_port_is_malformed() {
        let uri = Uri::from("proto://host-no-port");
        assert!(matches!(
            uri.authority(),
            Err(AddressError::MissingPort { .. })
        ));
        assert!(!uri.is_connectable());
    }

    #[test]
    fn test_missing_scheme_is_malformed() {
        let uri = Uri::from("host:80/svc");
        assert!(matches!(
            uri.authority(),
            Err(AddressError::MissingScheme { .. })
        ));
    }

    #[test]
    fn test_for_endpoint() {
        let root = Uri::server_root("maltcp", "127.0.0.1", 9000);
        assert_eq!(root.as_str(), "maltcp://127.0.0.1:9000/");
        let endpoint = Uri::for_endpoint(&root, "broker");
        assert_eq!(endpoint.as_str(), "maltcp://127.0.0.1:9000/broker");
        assert_eq!(endpoint.root(), root);
    }

    mod properties {
        use crate::address::Uri;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn root_is_stable(
                host in "[a-z0-9.]{1,12}",
                port in any::<u16>(),
                service in "[a-z/]{0,10}",
            ) {
                let uri = Uri::from(format!("maltcp://{host}:{port}/{service}"));
                let root = uri.root();
                prop_assert!(root.is_root());
                prop_assert_eq!(root.root(), root.clone());
                prop_assert_eq!(root.as_str(), format!("maltcp://{host}:{port}/"));
                prop_assert!(uri.is_connectable());
            }
        }
    }
}
