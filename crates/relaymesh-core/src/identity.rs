//! Node identity
//!
//! A [`NodeName`] is the key for everything in the mesh: routing table rows,
//! address book entries, and load table counters. Names are validated once
//! at construction so later lookups can treat them as opaque strings.

use std::borrow::Borrow;
use std::fmt::{self, Display};
use std::net::SocketAddr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::IdentityError;

/// Maximum length of a node name in bytes
pub const MAX_NODE_NAME_LEN: usize = 64;

/// Validated node name
///
/// Non-empty, at most [`MAX_NODE_NAME_LEN`] bytes, no whitespace or control
/// characters.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeName(String);

impl NodeName {
    /// Create a node name, validating its contents
    pub fn new(name: impl Into<String>) -> Result<Self, IdentityError> {
        let name = name.into();
        if name.is_empty() {
            return Err(IdentityError::Empty);
        }
        if name.len() > MAX_NODE_NAME_LEN {
            return Err(IdentityError::TooLong {
                len: name.len(),
                max: MAX_NODE_NAME_LEN,
            });
        }
        if let Some(c) = name.chars().find(|c| c.is_whitespace() || c.is_control()) {
            return Err(IdentityError::InvalidCharacter(c));
        }
        Ok(Self(name))
    }

    /// Get the name as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for NodeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for NodeName {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for NodeName {
    type Error = IdentityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<NodeName> for String {
    fn from(name: NodeName) -> Self {
        name.0
    }
}

impl AsRef<str> for NodeName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for NodeName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Identity of the local node: its name and where it listens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeIdentity {
    /// The node's name in the routing configuration
    pub name: NodeName,
    /// Address the node's transport listens on
    pub listen_addr: SocketAddr,
}

impl NodeIdentity {
    /// Create a new node identity
    pub fn new(name: NodeName, listen_addr: SocketAddr) -> Self {
        Self { name, listen_addr }
    }
}

impl Display for NodeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.listen_addr)
    }
}
