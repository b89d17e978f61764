use std::collections::HashSet;

use shared::{domain::MemberId, protocol::MemberRecord};

/// Returns the candidates whose id is not held by any of `members`, keeping
/// the candidates' order.
pub fn reconcile(members: &[MemberRecord], candidates: &[MemberRecord]) -> Vec<MemberRecord> {
    if members.is_empty() {
        return candidates.to_vec();
    }

    let assigned: HashSet<&MemberId> = members.iter().map(|m| &m.id).collect();
    candidates
        .iter()
        .filter(|c| !assigned.contains(&c.id))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records(ids: &[&str]) -> Vec<MemberRecord> {
        ids.iter().map(|id| MemberRecord::new(*id)).collect()
    }

    fn ids(rows: &[MemberRecord]) -> Vec<&str> {
        rows.iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn removes_assigned_identities() {
        let result = reconcile(&records(&["a"]), &records(&["a", "b"]));
        assert_eq!(ids(&result), vec!["b"]);
    }

    #[test]
    fn keeps_candidate_order() {
        let result = reconcile(&records(&["c", "a"]), &records(&["e", "a", "d", "c", "b"]));
        assert_eq!(ids(&result), vec!["e", "d", "b"]);
    }

    #[test]
    fn empty_members_returns_candidates_unchanged() {
        let candidates = vec![
            MemberRecord::new("u1").with_email("a@x.com"),
            MemberRecord::new("u2"),
        ];
        assert_eq!(reconcile(&[], &candidates), candidates);
    }

    #[test]
    fn empty_candidates_returns_empty() {
        assert!(reconcile(&records(&["a", "b"]), &[]).is_empty());
    }

    #[test]
    fn matches_on_identity_only() {
        let members = vec![MemberRecord::new("u1").with_email("a@x.com")];
        let candidates = vec![MemberRecord::new("u1"), MemberRecord::new("u2")];
        assert_eq!(ids(&reconcile(&members, &candidates)), vec!["u2"]);
    }

    #[test]
    fn disjoint_sets_pass_through() {
        let result = reconcile(&records(&["x", "y"]), &records(&["a", "b"]));
        assert_eq!(ids(&result), vec!["a", "b"]);
    }
}
