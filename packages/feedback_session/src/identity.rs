use serde::{Deserialize, Serialize};

/// Stable key correlating every message of one submission's live session.
///
/// The value is opaque to the core: it is only compared, hashed and embedded
/// in channel and finalize addresses.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubmissionId(String);

impl SubmissionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SubmissionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for SubmissionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<u64> for SubmissionId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_and_string_ids_compare_equal() {
        assert_eq!(SubmissionId::from(7u64), SubmissionId::from("7"));
    }

    #[test]
    fn serializes_as_bare_string() {
        let json = serde_json::to_value(SubmissionId::new("abc")).unwrap();
        assert_eq!(json, serde_json::json!("abc"));
    }

    #[test]
    fn display_is_raw_value() {
        assert_eq!(SubmissionId::new("sub-1").to_string(), "sub-1");
    }
}
