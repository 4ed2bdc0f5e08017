//! Invocation gates.
//!
//! Every gate is a pure check of a command definition against the invoking
//! interaction. [`evaluate`] runs them in a fixed order and stops at the
//! first [`Rejection`]:
//!
//! 1. owner
//! 2. guild
//! 3. cooldown
//! 4. permissions
//!
//! Rejections are not errors. The dispatcher turns them into lifecycle events.

use std::collections::BTreeSet;
use std::fmt;

use crate::command::CommandDefinition;
use crate::cooldown::CooldownTracker;
use crate::owners::OwnerSet;
use basalt_core::{CommandInteraction, Permission, PermissionChecker};

/// Why an invocation was stopped before `run`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// The command is owner-only and the invoker is not an owner.
    OwnerOnly,
    /// The command is guild-only and was invoked outside a guild.
    GuildOnly,
    /// The invoker is on cooldown for this command.
    Cooldown { seconds_left: u64 },
    /// The invoking member lacks these permissions.
    MissingPermissions(BTreeSet<Permission>),
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OwnerOnly => f.write_str("owner only"),
            Self::GuildOnly => f.write_str("guild only"),
            Self::Cooldown { seconds_left } => write!(f, "on cooldown for {seconds_left}s"),
            Self::MissingPermissions(missing) => {
                let names: Vec<_> = missing.iter().map(|p| p.as_str()).collect();
                write!(f, "missing permissions: {}", names.join(", "))
            }
        }
    }
}

/// Everything the gates read besides the interaction itself.
#[derive(Clone, Copy)]
pub struct Gates<'a> {
    pub owners: &'a OwnerSet,
    pub cooldowns: &'a CooldownTracker,
    pub permissions: &'a dyn PermissionChecker,
}

pub fn owner_gate(
    definition: &CommandDefinition,
    interaction: &CommandInteraction,
    owners: &OwnerSet,
) -> Result<(), Rejection> {
    if definition.owner_only && !owners.contains(interaction.user.id) {
        return Err(Rejection::OwnerOnly);
    }
    Ok(())
}

pub fn guild_gate(
    definition: &CommandDefinition,
    interaction: &CommandInteraction,
) -> Result<(), Rejection> {
    if definition.guild_only && interaction.guild.is_none() {
        return Err(Rejection::GuildOnly);
    }
    Ok(())
}

pub fn cooldown_gate(
    definition: &CommandDefinition,
    interaction: &CommandInteraction,
    cooldowns: &CooldownTracker,
) -> Result<(), Rejection> {
    match cooldowns.check(&definition.name, interaction.user.id) {
        Some(seconds_left) => Err(Rejection::Cooldown { seconds_left }),
        None => Ok(()),
    }
}

/// Checks `required_permissions` for guild-only commands.
///
/// Without a member every required permission is reported missing.
pub fn permission_gate(
    definition: &CommandDefinition,
    interaction: &CommandInteraction,
    checker: &dyn PermissionChecker,
) -> Result<(), Rejection> {
    if !definition.guild_only || definition.required_permissions.is_empty() {
        return Ok(());
    }

    let missing: BTreeSet<Permission> = match &interaction.member {
        Some(member) => definition
            .required_permissions
            .iter()
            .copied()
            .filter(|p| !checker.has(member, *p))
            .collect(),
        None => definition.required_permissions.clone(),
    };

    if missing.is_empty() {
        Ok(())
    } else {
        Err(Rejection::MissingPermissions(missing))
    }
}

/// Runs every gate in order.
pub fn evaluate(
    definition: &CommandDefinition,
    interaction: &CommandInteraction,
    gates: Gates<'_>,
) -> Result<(), Rejection> {
    owner_gate(definition, interaction, gates.owners)?;
    guild_gate(definition, interaction)?;
    cooldown_gate(definition, interaction, gates.cooldowns)?;
    permission_gate(definition, interaction, gates.permissions)
}
