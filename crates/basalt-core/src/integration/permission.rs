//! Member permission resolution.

use crate::foundation::{Member, Permission};

/// Decides whether a member holds a permission.
///
/// The framework only ever asks this one question; how permissions are
/// resolved (channel overwrites, role hierarchy, a remote lookup) is up to the
/// implementation.
pub trait PermissionChecker: Send + Sync {
    fn has(&self, member: &Member, permission: Permission) -> bool;
}

/// Checks against the member's resolved permission bitfield.
///
/// `ADMINISTRATOR` implies every other permission.
#[derive(Debug, Clone, Copy, Default)]
pub struct BitfieldPermissionChecker;

impl PermissionChecker for BitfieldPermissionChecker {
    fn has(&self, member: &Member, permission: Permission) -> bool {
        member.permissions.contains(Permission::Administrator)
            || member.permissions.contains(permission)
    }
}

impl<F> PermissionChecker for F
where
    F: Fn(&Member, Permission) -> bool + Send + Sync,
{
    fn has(&self, member: &Member, permission: Permission) -> bool {
        self(member, permission)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::{Permissions, User};

    #[test]
    fn test_bitfield_checker() {
        let checker = BitfieldPermissionChecker;
        let member = Member::new(
            User::new(1, "mod"),
            Permissions::empty().with(Permission::KickMembers),
        );
        assert!(checker.has(&member, Permission::KickMembers));
        assert!(!checker.has(&member, Permission::BanMembers));
    }

    #[test]
    fn test_administrator_implies_all() {
        let checker = BitfieldPermissionChecker;
        let admin = Member::new(
            User::new(1, "admin"),
            Permissions::empty().with(Permission::Administrator),
        );
        assert!(Permission::ALL.iter().all(|p| checker.has(&admin, *p)));
    }

    #[test]
    fn test_closure_checker() {
        let deny_all = |_: &Member, _: Permission| false;
        let member = Member::new(User::new(1, "x"), Permissions::all());
        assert!(!deny_all.has(&member, Permission::SendMessages));
    }
}
