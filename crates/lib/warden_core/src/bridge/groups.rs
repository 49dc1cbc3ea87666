//! Classification of chat-platform groups.

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, info};

use super::ChatGroup;
use crate::models::Subteam;
use crate::roles::HierarchyTag;

/// What a platform group means internally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupKind {
    Hierarchy(HierarchyTag),
    Subteam(Subteam),
    Bot,
}

/// Name patterns checked in order; the first match wins. `alumn` comes first
/// so an "Alumni Member" group is never read as an active member group.
const HIERARCHY_PATTERNS: [(&str, HierarchyTag); 6] = [
    ("alumn", HierarchyTag::Alumni),
    ("admin", HierarchyTag::Admin),
    ("officer", HierarchyTag::Officer),
    ("lead", HierarchyTag::Lead),
    ("advisor", HierarchyTag::SpecialAdvisor),
    ("member", HierarchyTag::CurrentMember),
];

/// Group id → meaning, built once from the platform's group list.
#[derive(Debug, Clone, Default)]
pub struct GroupTable {
    kinds: HashMap<String, GroupKind>,
    hierarchy_groups: BTreeMap<HierarchyTag, String>,
    subteams: Vec<Subteam>,
}

impl GroupTable {
    /// Classify every group. Groups matching neither a hierarchy pattern nor
    /// a configured subteam name are ignored.
    pub fn from_groups(groups: &[ChatGroup], subteam_names: &[String]) -> Self {
        let mut table = Self::default();
        for group in groups {
            let lower = group.name.to_lowercase();
            let kind = if let Some((_, tag)) = HIERARCHY_PATTERNS
                .iter()
                .find(|(pattern, _)| lower.contains(pattern))
            {
                table
                    .hierarchy_groups
                    .entry(*tag)
                    .or_insert_with(|| group.id.clone());
                GroupKind::Hierarchy(*tag)
            } else if lower.contains("bot") {
                GroupKind::Bot
            } else if let Some(name) = subteam_names
                .iter()
                .find(|n| !n.is_empty() && lower.contains(&n.to_lowercase()))
            {
                let subteam = Subteam {
                    id: group.id.clone(),
                    name: name.clone(),
                };
                table.subteams.push(subteam.clone());
                GroupKind::Subteam(subteam)
            } else {
                debug!(group = %group.name, "unmanaged chat group");
                continue;
            };
            table.kinds.insert(group.id.clone(), kind);
        }
        info!(
            hierarchy = table.hierarchy_groups.len(),
            subteams = table.subteams.len(),
            "chat group table built"
        );
        table
    }

    pub fn kind(&self, group_id: &str) -> Option<&GroupKind> {
        self.kinds.get(group_id)
    }

    /// The platform group carrying a hierarchy tag, if one exists.
    pub fn group_for(&self, tag: HierarchyTag) -> Option<&str> {
        self.hierarchy_groups.get(&tag).map(String::as_str)
    }

    pub fn subteams(&self) -> &[Subteam] {
        &self.subteams
    }

    pub fn is_bot_group(&self, group_id: &str) -> bool {
        matches!(self.kind(group_id), Some(GroupKind::Bot))
    }

    /// Hierarchy or subteam group. Bot and unknown groups are not managed.
    pub fn is_managed(&self, group_id: &str) -> bool {
        matches!(
            self.kind(group_id),
            Some(GroupKind::Hierarchy(_) | GroupKind::Subteam(_))
        )
    }

    pub fn hierarchy_of(&self, group_id: &str) -> Option<HierarchyTag> {
        match self.kind(group_id) {
            Some(GroupKind::Hierarchy(tag)) => Some(*tag),
            _ => None,
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// The guild layout used throughout the bridge and adapter tests.
    pub const GROUPS: [(&str, &str); 9] = [
        ("g-admin", "Admin"),
        ("g-officer", "Officer"),
        ("g-lead", "Team Lead"),
        ("g-member", "Member"),
        ("g-alumni", "Alumni"),
        ("g-bot", "Bots"),
        ("g-aero", "Aero"),
        ("g-chassis", "Chassis"),
        ("g-fun", "Movie Night"),
    ];

    pub fn groups() -> Vec<ChatGroup> {
        GROUPS
            .iter()
            .map(|(id, name)| ChatGroup {
                id: id.to_string(),
                name: name.to_string(),
            })
            .collect()
    }

    pub fn subteam_names() -> Vec<String> {
        vec!["Aero".to_string(), "Chassis".to_string()]
    }

    pub fn table() -> GroupTable {
        GroupTable::from_groups(&groups(), &subteam_names())
    }
}

#[cfg(test)]
mod tests {
    use super::testing::table;
    use super::*;

    #[test]
    fn classifies_by_name() {
        let table = table();
        assert_eq!(table.hierarchy_of("g-admin"), Some(HierarchyTag::Admin));
        assert_eq!(table.hierarchy_of("g-lead"), Some(HierarchyTag::Lead));
        assert_eq!(table.hierarchy_of("g-member"), Some(HierarchyTag::CurrentMember));
        assert_eq!(table.hierarchy_of("g-alumni"), Some(HierarchyTag::Alumni));
        assert!(table.is_bot_group("g-bot"));
        assert!(matches!(table.kind("g-aero"), Some(GroupKind::Subteam(s)) if s.name == "Aero"));
        assert!(table.kind("g-fun").is_none());
        assert_eq!(table.subteams().len(), 2);
    }

    #[test]
    fn alumni_pattern_wins_over_member() {
        let groups = vec![ChatGroup {
            id: "g1".into(),
            name: "Alumni Member".into(),
        }];
        let table = GroupTable::from_groups(&groups, &[]);
        assert_eq!(table.hierarchy_of("g1"), Some(HierarchyTag::Alumni));
        assert_eq!(table.group_for(HierarchyTag::Alumni), Some("g1"));
        assert_eq!(table.group_for(HierarchyTag::CurrentMember), None);
    }
}
