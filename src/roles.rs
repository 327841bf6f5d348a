//! The static role table and the permission data attached to sessions and
//! tokens. Policy evaluation itself lives with the callers.

/// Returns the permissions granted by a single role.
///
/// Unknown roles grant nothing.
pub fn role_permissions(role: &str) -> &'static [&'static str] {
    match role {
        "admin" => &[
            "ca:view", "ca:create", "ca:update", "ca:rotate", "ca:delete",
            "cert:view", "cert:request", "cert:approve", "cert:revoke",
            "template:view", "template:create", "template:update",
            "audit:view", "audit:export",
        ],
        "security_officer" => &[
            "ca:view", "ca:rotate",
            "cert:view", "cert:approve", "cert:revoke",
            "template:view", "template:create", "template:update",
            "audit:view", "audit:export",
        ],
        "developer" => &["ca:view", "cert:view", "cert:request", "template:view"],
        "auditor" => &["ca:view", "cert:view", "template:view", "audit:view", "audit:export"],
        _ => &[],
    }
}

/// Flattens a role list into the deduplicated permission set it grants.
pub fn permissions_for_roles(roles: &[String]) -> Vec<String> {
    let mut permissions: Vec<String> = Vec::new();
    for role in roles {
        for permission in role_permissions(role) {
            if !permissions.iter().any(|p| p == permission) {
                permissions.push((*permission).to_string());
            }
        }
    }
    permissions
}
