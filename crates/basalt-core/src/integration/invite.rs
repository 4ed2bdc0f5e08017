//! OAuth2 links that add the bot to a guild.

use crate::foundation::{ApplicationId, Permissions};

const AUTHORIZE_URL: &str = "https://discord.com/api/oauth2/authorize";

/// Builds the authorization link for `application`.
///
/// Empty `permissions` and `scopes` are left out of the query.
pub fn invite_url(application: ApplicationId, permissions: Permissions, scopes: &[&str]) -> String {
    let mut link = format!("{AUTHORIZE_URL}?client_id={application}");
    if permissions.bits() != 0 {
        link.push_str(&format!("&permissions={}", permissions.bits()));
    }
    if !scopes.is_empty() {
        link.push_str("&scope=");
        link.push_str(&scopes.join("%20"));
    }
    link
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::Permission;

    const APP: ApplicationId = ApplicationId::new(1234);

    #[test]
    fn test_bare_link() {
        assert_eq!(
            invite_url(APP, Permissions::empty(), &[]),
            "https://discord.com/api/oauth2/authorize?client_id=1234"
        );
    }

    #[test]
    fn test_permissions_and_scopes() {
        let permissions = Permissions::empty()
            .with(Permission::KickMembers)
            .with(Permission::SendMessages);
        assert_eq!(
            invite_url(APP, permissions, &["bot", "applications.commands"]),
            "https://discord.com/api/oauth2/authorize?client_id=1234\
             &permissions=2050&scope=bot%20applications.commands"
        );
    }
}
