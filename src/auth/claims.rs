//! Identity-provider token claims and profile resolution.
//!
//! Providers are inconsistent about which profile fields a session token
//! carries, so every field except `sub` is optional and resolution is an
//! explicit ordered fallback chain rather than ad-hoc probing at each
//! call site.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct IdentityClaims {
    /// Provider subject — the stable external user id.
    pub sub: String,
    /// Expiry is enforced by the verifier; kept here so malformed tokens
    /// without `exp` fail deserialization.
    #[allow(dead_code)]
    pub exp: i64,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub given_name: Option<String>,
    #[serde(default)]
    pub family_name: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

/// Profile fields after the fallback chain has been applied.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedProfile {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    /// Candidate username before uniqueness is enforced at reconcile time.
    pub username: String,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

impl IdentityClaims {
    /// True when the token carries any profile field beyond `sub`. When it
    /// doesn't, the caller may backfill from the provider's user API.
    pub fn has_profile_data(&self) -> bool {
        [
            &self.email,
            &self.given_name,
            &self.family_name,
            &self.name,
            &self.first_name,
            &self.last_name,
        ]
        .iter()
        .any(|f| non_empty(f).is_some())
    }

    /// Name resolution order: given/family name, then full name split on
    /// whitespace, then first/last. Username falls back through the
    /// resolved names, then the email prefix, then a subject-derived id.
    pub fn resolve(&self) -> ResolvedProfile {
        let (first, last) = if non_empty(&self.given_name).is_some()
            || non_empty(&self.family_name).is_some()
        {
            (
                non_empty(&self.given_name).unwrap_or("").to_string(),
                non_empty(&self.family_name).unwrap_or("").to_string(),
            )
        } else if let Some(full) = non_empty(&self.name) {
            let mut parts = full.split_whitespace();
            let first = parts.next().unwrap_or("").to_string();
            let last = parts.collect::<Vec<_>>().join(" ");
            (first, last)
        } else {
            (
                non_empty(&self.first_name).unwrap_or("").to_string(),
                non_empty(&self.last_name).unwrap_or("").to_string(),
            )
        };

        let email = non_empty(&self.email).unwrap_or("").to_string();

        let username = if !first.is_empty() && !last.is_empty() {
            format!(
                "{}{}",
                first.to_lowercase(),
                last.to_lowercase().replace(' ', "")
            )
        } else if !first.is_empty() {
            first.to_lowercase()
        } else if let Some(prefix) = email.split('@').next().filter(|p| !p.is_empty()) {
            prefix.to_string()
        } else {
            let head: String = self.sub.chars().take(8).collect();
            format!("user_{head}")
        };

        ResolvedProfile {
            email,
            first_name: first,
            last_name: last,
            username,
        }
    }

    /// Fill empty profile fields from the provider's user API response.
    pub fn merge_remote(&mut self, remote: RemoteProfile) {
        if non_empty(&self.email).is_none() {
            self.email = remote.primary_email();
        }
        if non_empty(&self.first_name).is_none() {
            self.first_name = remote.first_name;
        }
        if non_empty(&self.last_name).is_none() {
            self.last_name = remote.last_name;
        }
    }
}

/// Shape of the provider's `GET /users/{id}` management API response,
/// reduced to the fields the reconciler cares about.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteProfile {
    #[serde(default)]
    pub email_addresses: Vec<RemoteEmail>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteEmail {
    pub email_address: String,
}

impl RemoteProfile {
    fn primary_email(&self) -> Option<String> {
        self.email_addresses
            .first()
            .map(|e| e.email_address.clone())
            .filter(|e| !e.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(sub: &str) -> IdentityClaims {
        IdentityClaims {
            sub: sub.into(),
            exp: 0,
            email: None,
            given_name: None,
            family_name: None,
            name: None,
            first_name: None,
            last_name: None,
        }
    }

    #[test]
    fn test_given_family_name_wins() {
        let mut c = claims("user_abc");
        c.given_name = Some("Ada".into());
        c.family_name = Some("Lovelace".into());
        c.name = Some("Someone Else".into());
        c.first_name = Some("Nope".into());

        let p = c.resolve();
        assert_eq!(p.first_name, "Ada");
        assert_eq!(p.last_name, "Lovelace");
        assert_eq!(p.username, "adalovelace");
    }

    #[test]
    fn test_full_name_split() {
        let mut c = claims("user_abc");
        c.name = Some("Grace Brewster Hopper".into());

        let p = c.resolve();
        assert_eq!(p.first_name, "Grace");
        assert_eq!(p.last_name, "Brewster Hopper");
        assert_eq!(p.username, "gracebrewsterhopper");
    }

    #[test]
    fn test_first_last_fallback() {
        let mut c = claims("user_abc");
        c.first_name = Some("Alan".into());
        c.last_name = Some("Turing".into());

        let p = c.resolve();
        assert_eq!(p.first_name, "Alan");
        assert_eq!(p.username, "alanturing");
    }

    #[test]
    fn test_email_prefix_username() {
        let mut c = claims("user_abc");
        c.email = Some("kathleen@example.com".into());

        let p = c.resolve();
        assert_eq!(p.first_name, "");
        assert_eq!(p.username, "kathleen");
    }

    #[test]
    fn test_synthesized_username() {
        let c = claims("user_2abcdef12345");
        let p = c.resolve();
        assert_eq!(p.username, "user_user_2ab");
    }

    #[test]
    fn test_empty_strings_treated_as_absent() {
        let mut c = claims("user_abc");
        c.given_name = Some(String::new());
        c.name = Some("Single".into());

        let p = c.resolve();
        assert_eq!(p.first_name, "Single");
        assert_eq!(p.last_name, "");
        assert_eq!(p.username, "single");
    }

    #[test]
    fn test_has_profile_data() {
        let mut c = claims("user_abc");
        assert!(!c.has_profile_data());
        c.email = Some(String::new());
        assert!(!c.has_profile_data());
        c.email = Some("x@y.z".into());
        assert!(c.has_profile_data());
    }

    #[test]
    fn test_merge_remote_fills_only_gaps() {
        let mut c = claims("user_abc");
        c.first_name = Some("Kept".into());
        c.merge_remote(RemoteProfile {
            email_addresses: vec![RemoteEmail {
                email_address: "remote@example.com".into(),
            }],
            first_name: Some("Ignored".into()),
            last_name: Some("Filled".into()),
        });

        assert_eq!(c.email.as_deref(), Some("remote@example.com"));
        assert_eq!(c.first_name.as_deref(), Some("Kept"));
        assert_eq!(c.last_name.as_deref(), Some("Filled"));
    }
}
