//! The role model.
//!
//! A user's role set holds two kinds of entries: *hierarchy tags* describing
//! organizational standing, and *link tags* remembering a foreign-system
//! identity (`github:octocat`, `wiki:42`). Both are persisted as plain text;
//! anything that does not parse is kept verbatim as [`RoleTag::Other`] and
//! never grants privilege.

pub mod store;

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

pub use store::{RoleStore, SetDiff};

// =============================================================================
// Hierarchy tags
// =============================================================================

/// Organizational standing, from most to least privileged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HierarchyTag {
    Admin,
    Officer,
    Lead,
    SpecialAdvisor,
    CurrentMember,
    Member,
    Alumni,
}

impl HierarchyTag {
    pub const ALL: [HierarchyTag; 7] = [
        HierarchyTag::Admin,
        HierarchyTag::Officer,
        HierarchyTag::Lead,
        HierarchyTag::SpecialAdvisor,
        HierarchyTag::CurrentMember,
        HierarchyTag::Member,
        HierarchyTag::Alumni,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            HierarchyTag::Admin => "admin",
            HierarchyTag::Officer => "officer",
            HierarchyTag::Lead => "lead",
            HierarchyTag::SpecialAdvisor => "special_advisor",
            HierarchyTag::CurrentMember => "current_member",
            HierarchyTag::Member => "member",
            HierarchyTag::Alumni => "alumni",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        HierarchyTag::ALL.into_iter().find(|t| t.as_str() == s)
    }

    /// Position in the hierarchy. Lead and special advisor share a rank.
    pub fn rank(self) -> u8 {
        match self {
            HierarchyTag::Admin => 6,
            HierarchyTag::Officer => 5,
            HierarchyTag::Lead | HierarchyTag::SpecialAdvisor => 4,
            HierarchyTag::CurrentMember => 3,
            HierarchyTag::Member => 2,
            HierarchyTag::Alumni => 1,
        }
    }

    pub fn outranks(self, other: HierarchyTag) -> bool {
        self.rank() > other.rank()
    }
}

impl fmt::Display for HierarchyTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Link tags
// =============================================================================

/// External systems whose identities are remembered as link tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkSystem {
    GitHub,
    Wiki,
}

impl LinkSystem {
    pub fn as_str(self) -> &'static str {
        match self {
            LinkSystem::GitHub => "github",
            LinkSystem::Wiki => "wiki",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "github" => Some(LinkSystem::GitHub),
            "wiki" => Some(LinkSystem::Wiki),
            _ => None,
        }
    }
}

/// A `(system, identifier)` pair recording a foreign account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LinkTag {
    pub system: LinkSystem,
    pub identifier: String,
}

impl LinkTag {
    pub fn new(system: LinkSystem, identifier: impl Into<String>) -> Self {
        Self {
            system,
            identifier: identifier.into(),
        }
    }

    pub fn github(login: impl Into<String>) -> Self {
        Self::new(LinkSystem::GitHub, login)
    }

    pub fn wiki(id: impl fmt::Display) -> Self {
        Self::new(LinkSystem::Wiki, id.to_string())
    }
}

impl fmt::Display for LinkTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.system.as_str(), self.identifier)
    }
}

// =============================================================================
// Role tags
// =============================================================================

/// One entry of a user's role set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RoleTag {
    Hierarchy(HierarchyTag),
    Link(LinkTag),
    /// A persisted string this version does not understand.
    Other(String),
}

impl RoleTag {
    pub fn parse(s: &str) -> Self {
        if let Some(tag) = HierarchyTag::parse(s) {
            return RoleTag::Hierarchy(tag);
        }
        if let Some((system, identifier)) = s.split_once(':')
            && let Some(system) = LinkSystem::parse(system)
            && !identifier.is_empty()
        {
            return RoleTag::Link(LinkTag::new(system, identifier));
        }
        RoleTag::Other(s.to_string())
    }

    /// The persisted text form.
    pub fn encode(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for RoleTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoleTag::Hierarchy(tag) => f.write_str(tag.as_str()),
            RoleTag::Link(link) => link.fmt(f),
            RoleTag::Other(raw) => f.write_str(raw),
        }
    }
}

impl From<HierarchyTag> for RoleTag {
    fn from(tag: HierarchyTag) -> Self {
        RoleTag::Hierarchy(tag)
    }
}

impl From<LinkTag> for RoleTag {
    fn from(link: LinkTag) -> Self {
        RoleTag::Link(link)
    }
}

// =============================================================================
// Role sets
// =============================================================================

/// A user's full role set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleSet {
    tags: BTreeSet<RoleTag>,
}

impl RoleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_strings<I, S>(raw: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        raw.into_iter().map(|s| RoleTag::parse(s.as_ref())).collect()
    }

    pub fn insert(&mut self, tag: impl Into<RoleTag>) -> bool {
        self.tags.insert(tag.into())
    }

    pub fn remove(&mut self, tag: &RoleTag) -> bool {
        self.tags.remove(tag)
    }

    pub fn contains(&self, tag: &RoleTag) -> bool {
        self.tags.contains(tag)
    }

    pub fn has(&self, tag: HierarchyTag) -> bool {
        self.tags.contains(&RoleTag::Hierarchy(tag))
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RoleTag> {
        self.tags.iter()
    }

    pub fn hierarchy(&self) -> impl Iterator<Item = HierarchyTag> + '_ {
        self.tags.iter().filter_map(|t| match t {
            RoleTag::Hierarchy(h) => Some(*h),
            _ => None,
        })
    }

    pub fn links(&self) -> impl Iterator<Item = &LinkTag> {
        self.tags.iter().filter_map(|t| match t {
            RoleTag::Link(l) => Some(l),
            _ => None,
        })
    }

    pub fn link_for(&self, system: LinkSystem) -> Option<&LinkTag> {
        self.links().find(|l| l.system == system)
    }

    /// Same set with its hierarchy tags replaced; link and unknown entries
    /// are carried over.
    pub fn with_hierarchy<I>(&self, hierarchy: I) -> RoleSet
    where
        I: IntoIterator<Item = HierarchyTag>,
    {
        let mut next: RoleSet = self
            .tags
            .iter()
            .filter(|t| !matches!(t, RoleTag::Hierarchy(_)))
            .cloned()
            .collect();
        for tag in hierarchy {
            next.insert(tag);
        }
        next
    }

    /// Persisted text form of every entry.
    pub fn encode(&self) -> BTreeSet<String> {
        self.tags.iter().map(RoleTag::encode).collect()
    }

    /// Hierarchy tag names, most privileged first. Used for the `roles` claim.
    pub fn hierarchy_names(&self) -> Vec<String> {
        let mut tags: Vec<HierarchyTag> = self.hierarchy().collect();
        tags.sort_by_key(|t| std::cmp::Reverse(t.rank()));
        tags.into_iter().map(|t| t.as_str().to_string()).collect()
    }

    pub fn is_admin(&self) -> bool {
        self.has(HierarchyTag::Admin)
    }

    pub fn is_officer(&self) -> bool {
        self.has(HierarchyTag::Officer)
    }

    pub fn is_lead(&self) -> bool {
        self.has(HierarchyTag::Lead)
    }

    pub fn is_special_advisor(&self) -> bool {
        self.has(HierarchyTag::SpecialAdvisor)
    }

    pub fn is_inner_circle(&self) -> bool {
        self.is_admin() || self.is_officer() || self.is_lead() || self.is_special_advisor()
    }

    pub fn is_current_member(&self) -> bool {
        self.has(HierarchyTag::CurrentMember)
    }

    pub fn is_member(&self) -> bool {
        self.has(HierarchyTag::Member)
    }

    pub fn is_alumni(&self) -> bool {
        self.has(HierarchyTag::Alumni)
    }

    /// Current member or alumni.
    pub fn has_standing(&self) -> bool {
        self.is_current_member() || self.is_alumni()
    }

    pub fn highest_role(&self) -> Option<HierarchyTag> {
        self.hierarchy().min_by_key(|t| std::cmp::Reverse(t.rank()))
    }
}

impl FromIterator<RoleTag> for RoleSet {
    fn from_iter<I: IntoIterator<Item = RoleTag>>(iter: I) -> Self {
        Self {
            tags: iter.into_iter().collect(),
        }
    }
}

impl FromIterator<HierarchyTag> for RoleSet {
    fn from_iter<I: IntoIterator<Item = HierarchyTag>>(iter: I) -> Self {
        iter.into_iter().map(RoleTag::Hierarchy).collect()
    }
}

impl<'a> IntoIterator for &'a RoleSet {
    type Item = &'a RoleTag;
    type IntoIter = std::collections::btree_set::Iter<'a, RoleTag>;

    fn into_iter(self) -> Self::IntoIter {
        self.tags.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hierarchy_link_and_unknown_tags() {
        assert_eq!(RoleTag::parse("admin"), RoleTag::Hierarchy(HierarchyTag::Admin));
        assert_eq!(
            RoleTag::parse("github:octocat"),
            RoleTag::Link(LinkTag::github("octocat"))
        );
        assert_eq!(RoleTag::parse("wiki:42"), RoleTag::Link(LinkTag::wiki(42)));
        assert_eq!(RoleTag::parse("github:"), RoleTag::Other("github:".into()));
        assert_eq!(RoleTag::parse("d_member"), RoleTag::Other("d_member".into()));
    }

    #[test]
    fn encode_matches_parse() {
        let roles = RoleSet::from_strings(["lead", "github:octocat", "legacy"]);
        assert_eq!(RoleSet::from_strings(roles.encode()), roles);
    }

    #[test]
    fn unknown_tags_grant_nothing() {
        let roles = RoleSet::from_strings(["administrator", "d_admin", "admin:1"]);
        assert!(!roles.is_admin());
        assert!(!roles.is_inner_circle());
        assert_eq!(roles.highest_role(), None);
    }

    #[test]
    fn inner_circle_covers_the_top_ranks() {
        for tag in [
            HierarchyTag::Admin,
            HierarchyTag::Officer,
            HierarchyTag::Lead,
            HierarchyTag::SpecialAdvisor,
        ] {
            let roles: RoleSet = [tag].into_iter().collect();
            assert!(roles.is_inner_circle(), "{tag} should be inner circle");
        }
        let roles: RoleSet = [HierarchyTag::CurrentMember].into_iter().collect();
        assert!(!roles.is_inner_circle());
    }

    #[test]
    fn highest_role_uses_rank() {
        let roles: RoleSet = [HierarchyTag::Alumni, HierarchyTag::Lead, HierarchyTag::Member]
            .into_iter()
            .collect();
        assert_eq!(roles.highest_role(), Some(HierarchyTag::Lead));
        assert!(HierarchyTag::Officer.outranks(HierarchyTag::Lead));
        assert!(!HierarchyTag::SpecialAdvisor.outranks(HierarchyTag::Lead));
    }

    #[test]
    fn with_hierarchy_keeps_links() {
        let roles = RoleSet::from_strings(["current_member", "lead", "github:octocat", "wiki:7"]);
        let next = roles.with_hierarchy([HierarchyTag::Alumni]);
        assert!(next.is_alumni());
        assert!(!next.is_current_member());
        assert!(!next.is_lead());
        assert_eq!(next.link_for(LinkSystem::GitHub), Some(&LinkTag::github("octocat")));
        assert_eq!(next.link_for(LinkSystem::Wiki), Some(&LinkTag::wiki(7)));
    }

    #[test]
    fn hierarchy_names_are_ordered_by_rank() {
        let roles = RoleSet::from_strings(["alumni", "officer", "github:x", "member"]);
        assert_eq!(roles.hierarchy_names(), vec!["officer", "member", "alumni"]);
    }
}
