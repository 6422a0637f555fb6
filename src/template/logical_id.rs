use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;

use super::intrinsics;

/// Path components that carry no meaning in the human-readable part of an id
const HIDDEN_COMPONENTS: [&str; 2] = ["Resource", "Default"];

/// Number of hash characters appended to ids derived from nested paths
const HASH_LEN: usize = 8;

/// Template-unique key of a resource, derived from its construct path.
///
/// A single-component path ("WebACL") maps to itself. Nested paths
/// ("CalculatorMergerVPC/PublicSubnet1/Subnet") concatenate their components
/// and append the first 8 hex characters of the SHA-256 of the full path, so
/// two paths that concatenate to the same text still get distinct ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LogicalId(String);

impl LogicalId {
    pub fn from_path(path: &str) -> Self {
        let components: Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();

        if components.len() == 1 {
            return Self(remove_non_alphanumeric(components[0]));
        }

        let mut human = String::new();
        let mut previous: Option<&str> = None;
        for component in &components {
            if HIDDEN_COMPONENTS.contains(component) || previous == Some(*component) {
                continue;
            }
            human.push_str(&remove_non_alphanumeric(component));
            previous = Some(component);
        }

        Self(format!("{}{}", human, path_hash(&components.join("/"))))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `{"Ref": <id>}`
    pub fn reference(&self) -> Value {
        intrinsics::reference(&self.0)
    }

    /// `{"Fn::GetAtt": [<id>, attribute]}`
    pub fn attr(&self, attribute: &str) -> Value {
        intrinsics::get_att(&self.0, attribute)
    }
}

impl fmt::Display for LogicalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn remove_non_alphanumeric(s: &str) -> String {
    s.chars().filter(|c| c.is_ascii_alphanumeric()).collect()
}

fn path_hash(path: &str) -> String {
    let digest = Sha256::digest(path.as_bytes());
    digest
        .iter()
        .take(HASH_LEN / 2)
        .map(|b| format!("{:02X}", b))
        .collect()
}
