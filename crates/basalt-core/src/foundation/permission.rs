//! Permission tokens and member permission bitfields.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single permission a guild member may hold.
///
/// Commands list the permissions they require by token; a member's effective
/// permissions are carried as a [`Permissions`] bitfield.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Permission {
    CreateInstantInvite,
    KickMembers,
    BanMembers,
    Administrator,
    ManageChannels,
    ManageGuild,
    AddReactions,
    ViewAuditLog,
    ViewChannel,
    SendMessages,
    ManageMessages,
    EmbedLinks,
    AttachFiles,
    MentionEveryone,
    ManageNicknames,
    ManageRoles,
    ManageWebhooks,
    ModerateMembers,
}

impl Permission {
    /// Every known permission, in bit order.
    pub const ALL: [Permission; 18] = [
        Self::CreateInstantInvite,
        Self::KickMembers,
        Self::BanMembers,
        Self::Administrator,
        Self::ManageChannels,
        Self::ManageGuild,
        Self::AddReactions,
        Self::ViewAuditLog,
        Self::ViewChannel,
        Self::SendMessages,
        Self::ManageMessages,
        Self::EmbedLinks,
        Self::AttachFiles,
        Self::MentionEveryone,
        Self::ManageNicknames,
        Self::ManageRoles,
        Self::ManageWebhooks,
        Self::ModerateMembers,
    ];

    /// The bit this permission occupies in a [`Permissions`] field.
    pub const fn bit(self) -> u64 {
        match self {
            Self::CreateInstantInvite => 1 << 0,
            Self::KickMembers => 1 << 1,
            Self::BanMembers => 1 << 2,
            Self::Administrator => 1 << 3,
            Self::ManageChannels => 1 << 4,
            Self::ManageGuild => 1 << 5,
            Self::AddReactions => 1 << 6,
            Self::ViewAuditLog => 1 << 7,
            Self::ViewChannel => 1 << 10,
            Self::SendMessages => 1 << 11,
            Self::ManageMessages => 1 << 13,
            Self::EmbedLinks => 1 << 14,
            Self::AttachFiles => 1 << 15,
            Self::MentionEveryone => 1 << 17,
            Self::ManageNicknames => 1 << 27,
            Self::ManageRoles => 1 << 28,
            Self::ManageWebhooks => 1 << 29,
            Self::ModerateMembers => 1 << 40,
        }
    }

    /// The wire token, e.g. `MANAGE_GUILD`.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CreateInstantInvite => "CREATE_INSTANT_INVITE",
            Self::KickMembers => "KICK_MEMBERS",
            Self::BanMembers => "BAN_MEMBERS",
            Self::Administrator => "ADMINISTRATOR",
            Self::ManageChannels => "MANAGE_CHANNELS",
            Self::ManageGuild => "MANAGE_GUILD",
            Self::AddReactions => "ADD_REACTIONS",
            Self::ViewAuditLog => "VIEW_AUDIT_LOG",
            Self::ViewChannel => "VIEW_CHANNEL",
            Self::SendMessages => "SEND_MESSAGES",
            Self::ManageMessages => "MANAGE_MESSAGES",
            Self::EmbedLinks => "EMBED_LINKS",
            Self::AttachFiles => "ATTACH_FILES",
            Self::MentionEveryone => "MENTION_EVERYONE",
            Self::ManageNicknames => "MANAGE_NICKNAMES",
            Self::ManageRoles => "MANAGE_ROLES",
            Self::ManageWebhooks => "MANAGE_WEBHOOKS",
            Self::ModerateMembers => "MODERATE_MEMBERS",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string is not a known permission token.
#[derive(Debug, Clone, Error)]
#[error("unknown permission token '{0}'")]
pub struct UnknownPermission(pub String);

impl FromStr for Permission {
    type Err = UnknownPermission;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownPermission(s.to_string()))
    }
}

/// A member's effective permissions as a bitfield.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permissions(u64);

impl Permissions {
    /// No permissions.
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Every known permission.
    pub fn all() -> Self {
        Self::ALL_BITS
    }

    const ALL_BITS: Self = {
        let mut bits = 0;
        let mut i = 0;
        while i < Permission::ALL.len() {
            bits |= Permission::ALL[i].bit();
            i += 1;
        }
        Self(bits)
    };

    /// Builds a field from raw bits; unknown bits are kept.
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    /// Returns the raw bits.
    pub const fn bits(self) -> u64 {
        self.0
    }

    /// Whether the exact bit for `permission` is set.
    pub const fn contains(self, permission: Permission) -> bool {
        self.0 & permission.bit() != 0
    }

    /// Sets the bit for `permission`.
    pub fn insert(&mut self, permission: Permission) {
        self.0 |= permission.bit();
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, permission: Permission) -> Self {
        self.insert(permission);
        self
    }

    /// Iterates the known permissions present in this field.
    pub fn iter(self) -> impl Iterator<Item = Permission> {
        Permission::ALL.into_iter().filter(move |p| self.contains(*p))
    }
}

impl FromIterator<Permission> for Permissions {
    fn from_iter<I: IntoIterator<Item = Permission>>(iter: I) -> Self {
        iter.into_iter().fold(Self::empty(), Self::with)
    }
}
