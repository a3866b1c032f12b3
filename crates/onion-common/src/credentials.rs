//! Cloud provider credential references
//!
//! The orchestrator never handles secrets directly. It carries an opaque
//! [`CredentialRef`] (a profile or secret name) that only the provider
//! client resolves.

use std::fmt;

use serde::{Deserialize, Serialize, Serializer};

/// Environment variable consulted first by [`CredentialRef::from_env`]
pub const CREDENTIAL_REF_ENV: &str = "ONION_CREDENTIAL_REF";

/// Fallback profile name when nothing is configured
pub const DEFAULT_CREDENTIAL_PROFILE: &str = "default";

/// Opaque handle to provider credentials
///
/// `Debug`, `Display` and `Serialize` are redacted so the handle can travel
/// through structured logs, error messages and JSON output without leaking.
/// Deserialization reads the plain string.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct CredentialRef(String);

impl CredentialRef {
    /// Wrap a profile or secret name
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    /// Resolve from the environment
    ///
    /// `ONION_CREDENTIAL_REF`, then `AWS_PROFILE`, then the `default` profile.
    pub fn from_env() -> Self {
        std::env::var(CREDENTIAL_REF_ENV)
            .or_else(|_| std::env::var("AWS_PROFILE"))
            .map(Self)
            .unwrap_or_else(|_| Self::new(DEFAULT_CREDENTIAL_PROFILE))
    }

    /// Raw reference, for provider clients only
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Whether the reference is empty
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl Default for CredentialRef {
    fn default() -> Self {
        Self::new(DEFAULT_CREDENTIAL_PROFILE)
    }
}

impl fmt::Debug for CredentialRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CredentialRef(<redacted>)")
    }
}

impl fmt::Display for CredentialRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

impl Serialize for CredentialRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("<redacted>")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_ref_is_redacted() {
        let creds = CredentialRef::new("prod-admin");
        assert_eq!(format!("{:?}", creds), "CredentialRef(<redacted>)");
        assert_eq!(creds.to_string(), "<redacted>");
        assert_eq!(creds.expose(), "prod-admin");
    }

    #[test]
    fn test_credential_ref_empty_detection() {
        assert!(CredentialRef::new("  ").is_empty());
        assert!(!CredentialRef::default().is_empty());
        assert_eq!(CredentialRef::default().expose(), DEFAULT_CREDENTIAL_PROFILE);
    }

    #[test]
    fn test_credential_ref_deserializes_from_plain_string() {
        let creds: CredentialRef = serde_json::from_str("\"ci-profile\"").unwrap();
        assert_eq!(creds.expose(), "ci-profile");
    }

    #[test]
    fn test_credential_ref_serializes_redacted() {
        let creds = CredentialRef::new("prod-admin");
        let value = serde_json::to_value(&creds).unwrap();
        assert_eq!(value, serde_json::json!("<redacted>"));
        assert!(!serde_json::to_string(&creds).unwrap().contains("prod-admin"));
    }
}
