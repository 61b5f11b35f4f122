//! Similarity clustering of quota names.
//!
//! Quotas whose bracket-stripped names are within the similarity threshold
//! of a cluster's representative join that cluster. A cluster only becomes
//! a metric group once two members share more than two words; from then on
//! each member is emitted under the shared (common) name with a `kind`
//! label holding the words that set it apart.
//!
//! Clusters are kept in insertion order, so the same input always produces
//! the same groups.

use std::collections::HashSet;
use std::sync::LazyLock;

use quota_core::QuotaUsage;
use regex::Regex;

static BRACKETS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r" \(.*\)").expect("static regex"));

/// A quota placed in a cluster.
#[derive(Debug, Clone)]
pub struct Member {
    pub quota: QuotaUsage,
    /// Distinguishing words; empty until the cluster is promoted.
    pub kind: String,
    /// Similarity to the representative.
    pub similarity: f64,
}

/// One cluster. The first member is the representative.
#[derive(Debug, Clone)]
pub struct Group {
    pub members: Vec<Member>,
    /// Shared name; empty while the cluster is a singleton.
    pub common: String,
}

impl Group {
    fn new(quota: QuotaUsage) -> Self {
        Self {
            members: vec![Member {
                quota,
                kind: String::new(),
                similarity: 1.0,
            }],
            common: String::new(),
        }
    }

    pub fn representative(&self) -> &str {
        &self.members[0].quota.quota.quota_name
    }

    pub fn is_singleton(&self) -> bool {
        self.members.len() == 1
    }
}

/// Clusters a list of quotas by name similarity.
#[derive(Debug, Clone, Copy)]
pub struct Grouping {
    threshold: f64,
}

impl Grouping {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Cluster `quotas`.
    ///
    /// Returns every cluster (singletons included) and, in emission order,
    /// the `(group index, member index)` of each member promoted into a
    /// metric group.
    pub fn group(&self, quotas: &[QuotaUsage]) -> (Vec<Group>, Vec<(usize, usize)>) {
        let mut groups: Vec<Group> = Vec::new();
        let mut promoted: Vec<(usize, usize)> = Vec::new();
        let mut seen: HashSet<&str> = HashSet::new();

        for q in quotas {
            let name = q.quota.quota_name.as_str();
            if !seen.insert(name) {
                continue;
            }
            let stripped = remove_brackets(name);

            let mut placed = false;
            for (gi, group) in groups.iter_mut().enumerate() {
                let similarity =
                    strsim::normalized_levenshtein(&stripped, &remove_brackets(group.representative()));
                if similarity < self.threshold {
                    continue;
                }

                if group.is_singleton() {
                    let common = common(group.representative(), name);
                    if common.is_empty() || word_count(&common) <= 2 {
                        continue;
                    }
                    group.members.push(Member {
                        quota: q.clone(),
                        kind: String::new(),
                        similarity,
                    });
                    let (a, b) = (
                        group.members[0].quota.quota.quota_name.clone(),
                        group.members[1].quota.quota.quota_name.clone(),
                    );
                    group.members[0].kind = diff(&a, &b);
                    group.members[1].kind = diff(&b, &a);
                    group.common = common;
                    promoted.push((gi, 0));
                    promoted.push((gi, 1));
                } else {
                    if first_word(group.representative()) != first_word(name) {
                        continue;
                    }
                    let kind = diff(name, group.representative());
                    group.members.push(Member {
                        quota: q.clone(),
                        kind,
                        similarity,
                    });
                    promoted.push((gi, group.members.len() - 1));
                }
                placed = true;
                break;
            }

            if !placed {
                groups.push(Group::new(q.clone()));
            }
        }

        (groups, promoted)
    }
}

/// Remove a parenthetical suffix: `"A (x, y) B"` → `"A B"`.
pub fn remove_brackets(name: &str) -> String {
    BRACKETS.replace_all(name, "").into_owned()
}

/// Words of `a` that also occur in `b`, in `a`'s order. Empty when the
/// first words differ.
pub fn common(a: &str, b: &str) -> String {
    if first_word(a) != first_word(b) {
        return String::new();
    }
    let other: HashSet<&str> = b.split(' ').collect();
    a.split(' ')
        .filter(|w| other.contains(w))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Words of `a` that do not occur in `b`, in `a`'s order.
pub fn diff(a: &str, b: &str) -> String {
    let other: HashSet<&str> = b.split(' ').collect();
    a.split(' ')
        .filter(|w| !other.contains(w))
        .collect::<Vec<_>>()
        .join(" ")
}

fn first_word(s: &str) -> &str {
    s.split(' ').next().unwrap_or_default()
}

fn word_count(s: &str) -> usize {
    s.split(' ').count()
}
