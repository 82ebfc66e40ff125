/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Pending text-change cache.
//!
//! While the panel is hidden, edits made through a virtual editor surface
//! cannot be delivered. The host keeps at most one pending change per
//! editor identity, the latest overwriting the previous, and flushes the
//! lot on the next panel handshake.

use std::collections::HashMap;

use crate::sync::TextChangePayload;

#[derive(Debug, Default)]
pub struct TextChangeCache {
    pending: HashMap<String, TextChangePayload>,
}

impl TextChangeCache {
    /// Record a change for an editor surface, replacing any pending one.
    pub fn put(&mut self, doc_name: String, change: TextChangePayload) {
        self.pending.insert(doc_name, change);
    }

    /// Drain every pending change, ordered by editor identity for
    /// deterministic delivery.
    pub fn take_all(&mut self) -> Vec<TextChangePayload> {
        let mut entries: Vec<(String, TextChangePayload)> = self.pending.drain().collect();
        entries.sort_by(|(a, _), (b, _)| a.cmp(b));
        entries.into_iter().map(|(_, change)| change).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(id: &str, text: &str) -> TextChangePayload {
        TextChangePayload {
            id: id.to_string(),
            node_type: "text".to_string(),
            text: text.to_string(),
        }
    }

    #[test]
    fn test_latest_change_wins_per_doc() {
        let mut cache = TextChangeCache::default();
        cache.put("text-1.mdx".into(), change("1", "first"));
        cache.put("text-1.mdx".into(), change("1", "second"));

        let drained = cache.take_all();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].text, "second");
        assert!(cache.is_empty());
    }

    #[test]
    fn test_changes_for_distinct_docs_are_kept() {
        let mut cache = TextChangeCache::default();
        cache.put("text-2.mdx".into(), change("2", "b"));
        cache.put("text-1.mdx".into(), change("1", "a"));

        let drained = cache.take_all();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].id, "1");
        assert_eq!(drained[1].id, "2");
    }
}
