use crate::link::{Link, similar_url};
use std::collections::HashSet;
use url::Url;

/// Deduplicated collection of discovered links.
///
/// Exact deduplication happens live through [`LinkSet::add`], the set's
/// only mutator; serialization goes through link records so the dedup
/// invariant cannot be bypassed. Similarity reduction is a separate,
/// post-hoc step ([`LinkSet::summarize`]). Iteration order is
/// unspecified.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinkSet {
    links: HashSet<Link>,
}

impl LinkSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a link unless it is a self-referential action or an exact
    /// duplicate of an existing one. Returns whether it was inserted.
    pub fn add(&mut self, link: Link) -> bool {
        if link.is_self_loop() {
            return false;
        }
        self.links.insert(link)
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn contains(&self, link: &Link) -> bool {
        self.links.contains(link)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Link> {
        self.links.iter()
    }

    /// Reduce the set to one representative per similarity class.
    ///
    /// Deterministic up to the similarity relation; which member of a
    /// class survives depends on iteration order and is unspecified.
    pub fn summarize(&self) -> LinkSet {
        let mut reduced = LinkSet::new();
        for link in &self.links {
            if !reduced.links.iter().any(|kept| kept.similar_to(link)) {
                reduced.links.insert(link.clone());
            }
        }
        reduced
    }

    /// Collapse all `from`/`to` endpoints into a similarity-deduplicated
    /// list for summary output. Degenerate targets are skipped.
    pub fn distinct_endpoints(&self) -> Vec<Url> {
        let mut endpoints: Vec<Url> = Vec::new();
        for link in &self.links {
            if !endpoints.iter().any(|u| similar_url(u, &link.from)) {
                endpoints.push(link.from.clone());
            }
            if let Some(to) = &link.to {
                if !endpoints.iter().any(|u| similar_url(u, to)) {
                    endpoints.push(to.clone());
                }
            }
        }
        endpoints
    }

    /// Set equality over similarity classes, for idempotence checks.
    pub fn same_classes_as(&self, other: &LinkSet) -> bool {
        self.links
            .iter()
            .all(|l| other.links.iter().any(|o| o.similar_to(l)))
            && other
                .links
                .iter()
                .all(|o| self.links.iter().any(|l| l.similar_to(o)))
    }
}

impl FromIterator<Link> for LinkSet {
    /// Collecting goes through [`LinkSet::add`] so the dedup invariant
    /// holds for deserialized records too.
    fn from_iter<I: IntoIterator<Item = Link>>(iter: I) -> Self {
        let mut set = LinkSet::new();
        for link in iter {
            set.add(link);
        }
        set
    }
}

impl IntoIterator for LinkSet {
    type Item = Link;
    type IntoIter = std::collections::hash_set::IntoIter<Link>;

    fn into_iter(self) -> Self::IntoIter {
        self.links.into_iter()
    }
}
