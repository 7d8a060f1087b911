/*
 * Responsibility
 * - Cache key layout: "<resource-type>:<id>[:<variant>]"
 * - The first segment names the region that owns the key
 * - InvalidationSet: every key a write must drop (own key, listings, parents)
 */
use std::collections::BTreeSet;

pub fn entity_key(kind: &str, id: &str) -> String {
    format!("{kind}:{id}")
}

/// A derived view of an entity, e.g. `project:5:tasks` (the project's task listing).
pub fn variant_key(kind: &str, id: &str, variant: &str) -> String {
    format!("{kind}:{id}:{variant}")
}

/// The collection listing of a resource type, e.g. `project:all`.
pub fn listing_key(kind: &str) -> String {
    format!("{kind}:all")
}

/// Region a key belongs to (its resource-type segment).
pub fn region_of(key: &str) -> &str {
    key.split(':').next().unwrap_or(key)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvalidationSet {
    keys: BTreeSet<String>,
}

impl InvalidationSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.keys.insert(key.into());
        self
    }

    pub fn entity(self, kind: &str, id: &str) -> Self {
        self.key(entity_key(kind, id))
    }

    pub fn variant(self, kind: &str, id: &str, variant: &str) -> Self {
        self.key(variant_key(kind, id, variant))
    }

    pub fn listing(self, kind: &str) -> Self {
        self.key(listing_key(kind))
    }

    pub fn extend(&mut self, other: InvalidationSet) {
        self.keys.extend(other.keys);
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_layout() {
        assert_eq!(entity_key("project", "5"), "project:5");
        assert_eq!(variant_key("project", "5", "tasks"), "project:5:tasks");
        assert_eq!(listing_key("task"), "task:all");
        assert_eq!(region_of("project:5:tasks"), "project");
        assert_eq!(region_of("project"), "project");
    }

    #[test]
    fn invalidation_set_deduplicates() {
        let set = InvalidationSet::new()
            .entity("task", "9")
            .entity("project", "5")
            .variant("project", "5", "tasks")
            .key("project:5");

        assert_eq!(set.len(), 3);
        assert_eq!(
            set.iter().collect::<Vec<_>>(),
            vec!["project:5", "project:5:tasks", "task:9"]
        );
    }
}
