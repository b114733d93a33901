use std::fmt;

/// Rank a player holds inside a team.
///
/// Ranks are numbered from most to least authority: `Leader` is `0` and `Undefined` (not a
/// member) is `3`. The comparison helpers follow that inverted numbering, so
/// `Leader.highest_than(Officer)` holds while `Leader > Officer` would not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Founder; can disband and manage officers.
    Leader,
    /// Can invite and kick members.
    Officer,
    /// Regular member.
    Member,
    /// Not a member of the team.
    Undefined,
}

impl Role {
    /// Numeric rank, lower meaning more authority.
    pub fn rank(self) -> u8 {
        match self {
            Role::Leader => 0,
            Role::Officer => 1,
            Role::Member => 2,
            Role::Undefined => 3,
        }
    }

    /// True when `self` carries more authority than `other`.
    pub fn highest_than(self, other: Role) -> bool {
        self.rank() < other.rank()
    }

    /// True when `self` carries less authority than `other`.
    pub fn lowest_than(self, other: Role) -> bool {
        self.rank() > other.rank()
    }

    /// Persisted name of the role.
    pub fn name(self) -> &'static str {
        match self {
            Role::Leader => "Leader",
            Role::Officer => "Officer",
            Role::Member => "Member",
            Role::Undefined => "Unknown",
        }
    }

    /// Parse a persisted role name. Unknown names degrade to `Member`.
    pub fn from_name(name: &str) -> Role {
        match name {
            "Leader" => Role::Leader,
            "Officer" => Role::Officer,
            _ => Role::Member,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
