/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Virtual document naming.
//!
//! Long-form text editors and code-range editors are addressed by a
//! synthetic document name encoding `{type}-{id}` plus a kind-specific
//! suffix. Parsing is strict: a name that does not match the expected shape
//! came from outside the protocol and the caller no-ops on it.

/// What kind of editor surface a virtual document backs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VdocKind {
    /// Markdown-ish long-form text editor.
    Text,
    /// Interactive source-highlight session for a code node.
    CodeRange,
}

impl VdocKind {
    fn suffix(self) -> &'static str {
        match self {
            VdocKind::Text => ".mdx",
            VdocKind::CodeRange => ".code",
        }
    }
}

/// Build the document name for a node's editor surface, e.g.
/// `vdoc_name(VdocKind::Text, "text", "12")` -> `"text-12.mdx"`.
pub fn vdoc_name(kind: VdocKind, node_type: &str, id: &str) -> String {
    format!("{node_type}-{id}{}", kind.suffix())
}

/// Parse a document name back into `(node_type, id)`.
///
/// Requires the kind's suffix and exactly two hyphen-delimited parts; any
/// other shape returns `None`.
pub fn parse_vdoc_name(kind: VdocKind, name: &str) -> Option<(&str, &str)> {
    let stem = name.strip_suffix(kind.suffix())?;
    let mut parts = stem.split('-');
    let node_type = parts.next()?;
    let id = parts.next()?;
    if parts.next().is_some() || node_type.is_empty() || id.is_empty() {
        return None;
    }
    Some((node_type, id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_name_round_trip() {
        let name = vdoc_name(VdocKind::Text, "text", "12");
        assert_eq!(name, "text-12.mdx");
        assert_eq!(parse_vdoc_name(VdocKind::Text, &name), Some(("text", "12")));
    }

    #[test]
    fn test_code_name_round_trip() {
        let name = vdoc_name(VdocKind::CodeRange, "code", "3");
        assert_eq!(name, "code-3.code");
        assert_eq!(
            parse_vdoc_name(VdocKind::CodeRange, &name),
            Some(("code", "3"))
        );
    }

    #[test]
    fn test_parse_requires_expected_suffix() {
        assert!(parse_vdoc_name(VdocKind::Text, "text-12.code").is_none());
        assert!(parse_vdoc_name(VdocKind::CodeRange, "code-3.mdx").is_none());
        assert!(parse_vdoc_name(VdocKind::Text, "text-12").is_none());
    }

    #[test]
    fn test_parse_requires_exactly_two_parts() {
        assert!(parse_vdoc_name(VdocKind::Text, "text.mdx").is_none());
        assert!(parse_vdoc_name(VdocKind::Text, "a-b-c.mdx").is_none());
        assert!(parse_vdoc_name(VdocKind::Text, "-12.mdx").is_none());
        assert!(parse_vdoc_name(VdocKind::Text, "text-.mdx").is_none());
    }
}
