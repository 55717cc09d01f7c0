//! Pure tree operations over a flat set of records.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::models::{Record, ThreadMode};

/// Whether a record belongs to a reconstruction in the given mode.
pub fn belongs(record: &Record, mode: ThreadMode, author_id: &str, conversation_id: &str) -> bool {
    let same_conversation = record.conversation_id.as_deref() == Some(conversation_id)
        || record.id == conversation_id;
    match mode {
        ThreadMode::Thread => same_conversation && record.author_id == author_id,
        ThreadMode::Conversation => same_conversation,
    }
}

/// Select at most `limit` records, always keeping the author's records and
/// the records they directly reply to.
///
/// The must-include set may exceed `limit` on its own. The rest is filled in
/// by descending engagement, ties broken by id.
pub fn prioritize(candidates: Vec<Record>, author_id: &str, limit: usize) -> Vec<Record> {
    if candidates.len() <= limit {
        return candidates;
    }

    let parents: HashSet<String> = candidates
        .iter()
        .filter(|r| r.author_id == author_id)
        .filter_map(|r| r.in_reply_to_id.clone())
        .collect();

    let (mut selected, mut rest): (Vec<Record>, Vec<Record>) = candidates
        .into_iter()
        .partition(|r| r.author_id == author_id || parents.contains(&r.id));

    rest.sort_by(|a, b| {
        b.engagement()
            .cmp(&a.engagement())
            .then_with(|| a.id.cmp(&b.id))
    });

    let room = limit.saturating_sub(selected.len());
    selected.extend(rest.into_iter().take(room));
    selected
}

/// Depth of every node, given each node's parent within the set.
///
/// Roots (no parent, or a parent outside the map) sit at depth 0. Walks are
/// iterative and stop at cycles, so malformed reply data cannot loop.
pub fn depths(parent_of: &HashMap<String, Option<String>>) -> HashMap<String, u32> {
    let mut depth: HashMap<String, u32> = HashMap::with_capacity(parent_of.len());

    for start in parent_of.keys() {
        if depth.contains_key(start) {
            continue;
        }

        // Collect the unresolved chain from this node upwards.
        let mut chain: Vec<&str> = Vec::new();
        let mut on_chain: HashSet<&str> = HashSet::new();
        let mut current = start.as_str();
        let base = loop {
            if let Some(&d) = depth.get(current) {
                break Some(d);
            }
            if !on_chain.insert(current) {
                break None;
            }
            chain.push(current);
            match parent_of.get(current).and_then(|p| p.as_deref()) {
                Some(parent) if parent_of.contains_key(parent) => current = parent,
                _ => break None,
            }
        };

        // The topmost unresolved node is either a root or sits under `base`.
        let mut next = base.map_or(0, |d| d + 1);
        for id in chain.into_iter().rev() {
            depth.insert(id.to_string(), next);
            next += 1;
        }
    }

    depth
}

/// Sort records chronologically, placing each tombstone just before the
/// earliest record that replies to it.
pub fn sort_chronologically(records: &mut [Record], depth: &HashMap<String, u32>) {
    let mut first_child: HashMap<&str, DateTime<Utc>> = HashMap::new();
    for record in records.iter() {
        if let Some(parent) = record.in_reply_to_id.as_deref() {
            first_child
                .entry(parent)
                .and_modify(|t| *t = (*t).min(record.created_at))
                .or_insert(record.created_at);
        }
    }

    let keys: HashMap<String, DateTime<Utc>> = records
        .iter()
        .map(|r| {
            let at = if r.is_tombstone() {
                first_child
                    .get(r.id.as_str())
                    .copied()
                    .unwrap_or(r.created_at)
            } else {
                r.created_at
            };
            (r.id.clone(), at)
        })
        .collect();

    records.sort_by(|a, b| {
        keys[&a.id]
            .cmp(&keys[&b.id])
            .then_with(|| depth.get(&a.id).cmp(&depth.get(&b.id)))
            .then_with(|| a.id.cmp(&b.id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(minute: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(minute)
    }

    fn rec(id: &str, author: &str, parent: Option<&str>, minute: i64, likes: i64) -> Record {
        let mut r = Record::new(id, author, author, "", at(minute));
        r.conversation_id = Some("root".to_string());
        r.in_reply_to_id = parent.map(str::to_string);
        r.like_count = likes;
        r
    }

    #[test]
    fn test_prioritize_keeps_author_and_parents() {
        let mut candidates = vec![rec("root", "A", None, 0, 0)];
        for p in 0..10 {
            candidates.push(rec(&format!("p{}", p), "other", Some("root"), 1 + p, 0));
        }
        for i in 0..29 {
            let parent = format!("p{}", i % 10);
            candidates.push(rec(&format!("a{:02}", i), "A", Some(&parent), 20 + i, 0));
        }
        for i in 0..560 {
            candidates.push(rec(&format!("x{:03}", i), "crowd", Some("root"), 100 + i, i));
        }
        assert_eq!(candidates.len(), 600);

        let mut selected = prioritize(candidates, "A", 200);
        assert_eq!(selected.len(), 200);

        let ids: HashSet<&str> = selected.iter().map(|r| r.id.as_str()).collect();
        assert!(ids.contains("root"));
        assert!((0..10).all(|p| ids.contains(format!("p{}", p).as_str())));
        assert!((0..29).all(|i| ids.contains(format!("a{:02}", i).as_str())));
        // 160 slots left, filled by the most engaged crowd replies.
        assert!(ids.contains("x559"));
        assert!(ids.contains("x400"));
        assert!(!ids.contains("x399"));

        let depth = HashMap::new();
        sort_chronologically(&mut selected, &depth);
        assert!(selected
            .windows(2)
            .all(|w| w[0].created_at <= w[1].created_at));
    }

    #[test]
    fn test_prioritize_must_include_can_exceed_limit() {
        let mut candidates = vec![rec("root", "A", None, 0, 0)];
        for i in 0..5 {
            candidates.push(rec(&format!("a{}", i), "A", Some("root"), i + 1, 0));
        }
        candidates.push(rec("x", "B", Some("root"), 10, 100));
        let selected = prioritize(candidates, "A", 3);
        assert_eq!(selected.len(), 6);
        assert!(selected.iter().all(|r| r.author_id == "A"));
    }

    #[test]
    fn test_engagement_ties_break_on_id() {
        let candidates = vec![
            rec("root", "A", None, 0, 0),
            rec("b", "B", Some("root"), 1, 5),
            rec("a", "B", Some("root"), 2, 5),
        ];
        let selected = prioritize(candidates, "A", 2);
        let ids: Vec<&str> = selected.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["root", "a"]);
    }

    #[test]
    fn test_depths_chain_and_cycle() {
        let mut parents = HashMap::new();
        parents.insert("1".to_string(), None);
        parents.insert("2".to_string(), Some("1".to_string()));
        parents.insert("3".to_string(), Some("2".to_string()));
        parents.insert("4".to_string(), Some("missing".to_string()));
        parents.insert("x".to_string(), Some("y".to_string()));
        parents.insert("y".to_string(), Some("x".to_string()));

        let depth = depths(&parents);
        assert_eq!(depth["1"], 0);
        assert_eq!(depth["2"], 1);
        assert_eq!(depth["3"], 2);
        assert_eq!(depth["4"], 0);
        assert!(depth.contains_key("x") && depth.contains_key("y"));
    }

    #[test]
    fn test_deep_chain_does_not_recurse() {
        let mut parents = HashMap::new();
        parents.insert("0".to_string(), None);
        for i in 1..50_000u32 {
            parents.insert(i.to_string(), Some((i - 1).to_string()));
        }
        let depth = depths(&parents);
        assert_eq!(depth["49999"], 49_999);
    }

    #[test]
    fn test_tombstone_sorted_before_first_child() {
        let mut records = vec![
            rec("root", "A", None, 0, 0),
            rec("c", "A", Some("gone"), 5, 0),
            Record::tombstone("gone", Some("root".to_string()), crate::models::TombstoneReason::Deleted),
        ];
        let depth: HashMap<String, u32> = [("root", 0), ("gone", 1), ("c", 2)]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        sort_chronologically(&mut records, &depth);
        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["root", "gone", "c"]);
    }
}
