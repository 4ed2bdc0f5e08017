//! The bot owner set.

use std::collections::HashSet;

use parking_lot::RwLock;

use basalt_core::UserId;

/// Users allowed to run `owner_only` commands.
///
/// Filled from configuration, or fetched from the platform on ready when the
/// configuration names nobody.
#[derive(Debug, Default)]
pub struct OwnerSet {
    owners: RwLock<HashSet<UserId>>,
}

impl OwnerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, user: UserId) -> bool {
        self.owners.read().contains(&user)
    }

    /// Returns `true` if `user` was not already an owner.
    pub fn insert(&self, user: UserId) -> bool {
        self.owners.write().insert(user)
    }

    pub fn remove(&self, user: UserId) -> bool {
        self.owners.write().remove(&user)
    }

    /// Replaces the whole set.
    pub fn replace(&self, owners: impl IntoIterator<Item = UserId>) {
        *self.owners.write() = owners.into_iter().collect();
    }

    pub fn to_vec(&self) -> Vec<UserId> {
        let mut owners: Vec<_> = self.owners.read().iter().copied().collect();
        owners.sort();
        owners
    }

    pub fn len(&self) -> usize {
        self.owners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.read().is_empty()
    }
}

impl FromIterator<UserId> for OwnerSet {
    fn from_iter<I: IntoIterator<Item = UserId>>(iter: I) -> Self {
        Self {
            owners: RwLock::new(iter.into_iter().collect()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replace() {
        let owners: OwnerSet = [UserId::new(3), UserId::new(1)].into_iter().collect();
        assert!(owners.contains(UserId::new(1)));

        owners.replace([UserId::new(9)]);
        assert_eq!(owners.to_vec(), [UserId::new(9)]);
        assert!(!owners.insert(UserId::new(9)));
        assert!(owners.remove(UserId::new(9)));
        assert!(owners.is_empty());
    }
}
