use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

/// Identity of a cluster node inside a partition
#[derive(
    Clone,
    Debug,
    Default,
    Decode,
    Encode,
    Deserialize,
    Serialize,
    PartialEq,
    PartialOrd,
    Ord,
    Eq,
    Hash,
)]
pub struct NodeName(String);

impl NodeName {
    pub fn new(name: String) -> Self {
        Self(name)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl From<&str> for NodeName {
    fn from(name: &str) -> Self {
        NodeName::new(name.to_string())
    }
}

impl From<String> for NodeName {
    fn from(name: String) -> Self {
        NodeName::new(name)
    }
}

impl std::fmt::Display for NodeName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_name_ordering() {
        let mut names = vec![NodeName::from("node-c"), NodeName::from("node-a")];
        names.sort();
        assert_eq!(names[0].as_str(), "node-a");
    }

    #[test]
    fn test_blank_node_name_is_empty() {
        assert!(NodeName::from("  ").is_empty());
        assert!(!NodeName::from("node-a").is_empty());
    }
}
