//! Identity mapping between finding authors (emails), review-service
//! identities (guids), and messaging-platform recipient ids.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::config::PathsConfig;

fn load_map(path: &Path) -> HashMap<String, String> {
    let Ok(content) = fs::read_to_string(path) else {
        return HashMap::new();
    };
    serde_json::from_str(&content).unwrap_or_else(|e| {
        tracing::warn!(path = %path.display(), error = %e, "Identity map unreadable, treating as empty");
        HashMap::new()
    })
}

pub struct IdentityResolver {
    email_to_guid: HashMap<String, String>,
    email_to_platform_id: HashMap<String, String>,
}

impl IdentityResolver {
    pub fn load(paths: &PathsConfig) -> Self {
        Self {
            email_to_guid: load_map(&paths.email_to_guid),
            email_to_platform_id: load_map(&paths.email_to_platform_id),
        }
    }

    #[cfg(test)]
    pub fn from_maps(
        email_to_guid: HashMap<String, String>,
        email_to_platform_id: HashMap<String, String>,
    ) -> Self {
        Self {
            email_to_guid,
            email_to_platform_id,
        }
    }

    /// Review-service identity for a finding author. A missing mapping is an
    /// empty assignee, not an error.
    pub fn guid_for_email(&self, email: &str) -> Option<&str> {
        self.email_to_guid.get(email).map(String::as_str)
    }

    /// Reverse lookup over the email→guid map.
    pub fn email_for_guid(&self, guid: &str) -> Option<&str> {
        if guid.is_empty() {
            return None;
        }
        self.email_to_guid
            .iter()
            .find(|(_, mapped)| mapped.as_str() == guid)
            .map(|(email, _)| email.as_str())
    }

    pub fn platform_id_for_email(&self, email: &str) -> Option<&str> {
        self.email_to_platform_id.get(email).map(String::as_str)
    }

    /// Two-stage resolution: guid → email → messaging-platform id.
    pub fn platform_id_for_guid(&self, guid: &str) -> Option<&str> {
        let email = self.email_for_guid(guid)?;
        self.platform_id_for_email(email)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> IdentityResolver {
        let email_to_guid = HashMap::from([(
            "dev@example.com".to_string(),
            "guid-123".to_string(),
        )]);
        let email_to_platform_id = HashMap::from([(
            "dev@example.com".to_string(),
            "ou_abc".to_string(),
        )]);
        IdentityResolver::from_maps(email_to_guid, email_to_platform_id)
    }

    #[test]
    fn test_forward_and_reverse_lookup() {
        let r = resolver();
        assert_eq!(r.guid_for_email("dev@example.com"), Some("guid-123"));
        assert_eq!(r.email_for_guid("guid-123"), Some("dev@example.com"));
        assert_eq!(r.email_for_guid("guid-missing"), None);
        assert_eq!(r.email_for_guid(""), None);
    }

    #[test]
    fn test_two_stage_platform_resolution() {
        let r = resolver();
        assert_eq!(r.platform_id_for_guid("guid-123"), Some("ou_abc"));
        assert_eq!(r.platform_id_for_guid("guid-missing"), None);
    }

    #[test]
    fn test_missing_files_are_empty_maps() {
        let tmp = tempfile::tempdir().unwrap();
        let map = load_map(&tmp.path().join("nope.json"));
        assert!(map.is_empty());
    }
}
