//! Platform-side member and permission types.

use std::fmt;

use bitflags::bitflags;
use guildkeep_core::{RoleId, UserId};

bitflags! {
    /// Guild permission bits, numbered the way the gateway numbers them.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Permissions: u64 {
        /// Kick members.
        const KICK_MEMBERS = 1 << 1;
        /// Ban members.
        const BAN_MEMBERS = 1 << 2;
        /// Implies every other bit.
        const ADMINISTRATOR = 1 << 3;
        /// Edit guild settings.
        const MANAGE_GUILD = 1 << 5;
        /// Delete and pin others' messages.
        const MANAGE_MESSAGES = 1 << 13;
        /// Create and assign roles.
        const MANAGE_ROLES = 1 << 28;
        /// Time members out.
        const MODERATE_MEMBERS = 1 << 40;
    }
}

impl Permissions {
    /// Whether a holder of `self` may run something requiring `required`.
    #[must_use]
    pub fn satisfies(self, required: Permissions) -> bool {
        self.contains(Permissions::ADMINISTRATOR) || self.contains(required)
    }

    /// Bits of `required` that `self` lacks, empty when satisfied.
    #[must_use]
    pub fn missing(self, required: Permissions) -> Permissions {
        if self.satisfies(required) {
            Permissions::empty()
        } else {
            required.difference(self)
        }
    }

    /// Human-readable names, e.g. `"ManageGuild, BanMembers"`.
    #[must_use]
    pub fn describe(self) -> String {
        self.iter_names()
            .map(|(name, _)| {
                name.split('_')
                    .map(|word| {
                        let mut chars = word.chars();
                        match chars.next() {
                            Some(first) => first.to_string() + &chars.as_str().to_lowercase(),
                            None => String::new(),
                        }
                    })
                    .collect::<String>()
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// A guild member as the platform reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    /// User id.
    pub id: UserId,
    /// Username without discriminator.
    pub name: String,
    /// Four-digit discriminator.
    pub discriminator: u16,
    /// Whether the account is a bot.
    pub bot: bool,
    /// Roles currently held.
    pub roles: Vec<RoleId>,
    /// Effective guild permissions.
    pub permissions: Permissions,
}

impl Member {
    /// A plain human member with no roles.
    #[must_use]
    pub fn new(id: UserId, name: impl Into<String>, discriminator: u16) -> Self {
        Self {
            id,
            name: name.into(),
            discriminator,
            bot: false,
            roles: Vec::new(),
            permissions: Permissions::empty(),
        }
    }

    /// `name#0042`.
    #[must_use]
    pub fn tag(&self) -> String {
        format!("{}#{:04}", self.name, self.discriminator)
    }

    /// Whether `role` is held.
    #[must_use]
    pub fn has_role(&self, role: RoleId) -> bool {
        self.roles.contains(&role)
    }
}

/// A reference to a member typed by a user, before resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MemberRef {
    /// `<@123>`, `<@!123>` or a bare `123`.
    Id(UserId),
    /// `name#1234`.
    Tag {
        /// Username.
        name: String,
        /// Discriminator.
        discriminator: u16,
    },
}

impl fmt::Display for MemberRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "<@{id}>"),
            Self::Tag {
                name,
                discriminator,
            } => write!(f, "{name}#{discriminator:04}"),
        }
    }
}
