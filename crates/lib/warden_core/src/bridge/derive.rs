//! Pure role derivation from platform groups.

use std::collections::BTreeSet;

use super::groups::{GroupKind, GroupTable};
use crate::roles::HierarchyTag;

/// Tags an alumnus may not hold alongside [`HierarchyTag::Alumni`].
const EXCLUDED_BY_ALUMNI: [HierarchyTag; 3] = [
    HierarchyTag::CurrentMember,
    HierarchyTag::Lead,
    HierarchyTag::Officer,
];

/// Result of reading a member's platform groups.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Derivation {
    pub hierarchy: BTreeSet<HierarchyTag>,
    /// Subteam ids.
    pub subteams: BTreeSet<String>,
    /// Platform groups the member must lose (alumni correction).
    pub strip_groups: Vec<String>,
    /// Whether the member is a current member or an alumnus.
    pub standing: bool,
}

/// Derive hierarchy and subteams from a member's group ids.
///
/// An alumnus keeps no subteams and none of current-member, lead or officer;
/// the groups carrying those are listed in `strip_groups`. A member with
/// neither current-member nor alumni standing derives to nothing.
pub fn derive(table: &GroupTable, group_ids: &[String]) -> Derivation {
    let mut out = Derivation::default();
    for id in group_ids {
        match table.kind(id) {
            Some(GroupKind::Hierarchy(tag)) => {
                out.hierarchy.insert(*tag);
            }
            Some(GroupKind::Subteam(subteam)) => {
                out.subteams.insert(subteam.id.clone());
            }
            Some(GroupKind::Bot) | None => {}
        }
    }

    if out.hierarchy.contains(&HierarchyTag::Alumni) {
        for tag in EXCLUDED_BY_ALUMNI {
            out.hierarchy.remove(&tag);
        }
        out.strip_groups = group_ids
            .iter()
            .filter(|id| match table.kind(id) {
                Some(GroupKind::Subteam(_)) => true,
                Some(GroupKind::Hierarchy(tag)) => EXCLUDED_BY_ALUMNI.contains(tag),
                _ => false,
            })
            .cloned()
            .collect();
        out.subteams.clear();
    }

    out.standing = out.hierarchy.contains(&HierarchyTag::CurrentMember)
        || out.hierarchy.contains(&HierarchyTag::Alumni);
    if !out.standing {
        out.hierarchy.clear();
        out.subteams.clear();
    }
    out
}
