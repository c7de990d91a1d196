//! Source spans of tree nodes.
//!
//! The tree itself carries no positions. The front end records a span per
//! [`NodeId`] while building the tree, then freezes the records into a
//! [`SpanMap`] that travels with the [`Program`](crate::Program).

use std::sync::Arc;

use settle_core::Span;

use crate::NodeId;

/// Collects spans in any order. A later record for the same node wins.
#[derive(Debug, Default)]
pub struct SpanMapBuilder {
    records: Vec<(NodeId, Span)>,
}

impl SpanMapBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: NodeId, span: Span) {
        self.records.push((id, span));
    }

    pub fn finish(mut self) -> SpanMap {
        // Stable sort keeps insertion order among equal ids; keep the last.
        self.records.sort_by_key(|&(id, _)| id);
        let mut frozen: Vec<(NodeId, Span)> = Vec::with_capacity(self.records.len());
        for record in self.records {
            match frozen.last_mut() {
                Some(last) if last.0 == record.0 => *last = record,
                _ => frozen.push(record),
            }
        }
        SpanMap {
            entries: frozen.into(),
        }
    }
}

impl FromIterator<(NodeId, Span)> for SpanMap {
    fn from_iter<I: IntoIterator<Item = (NodeId, Span)>>(iter: I) -> Self {
        SpanMapBuilder {
            records: iter.into_iter().collect(),
        }
        .finish()
    }
}

/// Frozen span table, sorted by node id. Clones share the entries.
#[derive(Clone, Debug, Default)]
pub struct SpanMap {
    entries: Arc<[(NodeId, Span)]>,
}

impl SpanMap {
    pub fn get(&self, id: NodeId) -> Option<Span> {
        self.entries
            .binary_search_by_key(&id, |&(node, _)| node)
            .ok()
            .map(|at| self.entries[at].1)
    }

    /// The node's span, or an empty span at offset 0 for unpositioned nodes.
    pub fn get_or_default(&self, id: NodeId) -> Span {
        self.get(id).unwrap_or_default()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl PartialEq for SpanMap {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.entries, &other.entries) || self.entries == other.entries
    }
}

impl Eq for SpanMap {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_after_unordered_inserts() {
        let mut builder = SpanMapBuilder::new();
        let late = NodeId::from_raw(10_001);
        let early = NodeId::from_raw(10_000);
        builder.insert(late, Span::new(30, 40));
        builder.insert(early, Span::new(10, 20));

        let spans = builder.finish();
        assert_eq!(spans.len(), 2);
        assert_eq!(spans.get(early), Some(Span::new(10, 20)));
        assert_eq!(spans.get(late), Some(Span::new(30, 40)));
        assert_eq!(spans.get(NodeId::from_raw(999)), None);
        assert!(spans.contains(early));
    }

    #[test]
    fn test_last_record_wins() {
        let id = NodeId::from_raw(42);
        let spans: SpanMap = [(id, Span::new(0, 1)), (id, Span::new(5, 9))]
            .into_iter()
            .collect();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans.get(id), Some(Span::new(5, 9)));
    }

    #[test]
    fn test_unpositioned_node_gets_empty_span() {
        let spans = SpanMap::default();
        assert!(spans.is_empty());
        assert_eq!(spans.get_or_default(NodeId::from_raw(7)), Span::new(0, 0));
    }
}
