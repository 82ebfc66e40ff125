/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Tree layout engine.
//!
//! Positions every node of a note in 2D from the port-directed adjacency:
//! 1. Root discovery (left/top predecessors and group parents, memoized)
//! 2. Post-order subtree sizing (`tree_h` vertical extents, `col_w` column
//!    widths, group boxes from stacked members)
//! 3. Pre-order position assignment (x carried down vertical chains, y
//!    carried across horizontal rows)
//! 4. Relative-position normalization for group members
//! 5. Change detection so unchanged nodes survive untouched
//!
//! A graph with more than one root is returned unchanged with every root
//! reported; the caller surfaces it as "skip layout" instead of crashing.

use std::collections::{HashMap, HashSet};

use euclid::default::Point2D;
use log::warn;

use super::{Edge, Node, Note, NodeId, Port, parse_handle};

/// Spacing and default-size constants. Loaded from configuration, never
/// hardcoded at call sites.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutSettings {
    /// Horizontal gap between a node's column and its right (detail) child.
    pub gap_x: f32,
    /// Vertical gap between a node and its bottom (next) child.
    pub gap_y: f32,
    pub default_width: f32,
    pub default_height: f32,
    /// Inner horizontal padding of an expanded group box.
    pub group_pad_x: f32,
    /// Inner vertical padding of an expanded group box.
    pub group_pad_y: f32,
}

impl Default for LayoutSettings {
    fn default() -> Self {
        Self {
            gap_x: 100.0,
            gap_y: 50.0,
            default_width: 220.0,
            default_height: 100.0,
            group_pad_x: 16.0,
            group_pad_y: 24.0,
        }
    }
}

/// Output of a layout run.
#[derive(Debug, Clone)]
pub struct LayoutResult {
    /// The full node map; geometry rewritten only for `changed` nodes.
    pub node_map: HashMap<NodeId, Node>,
    /// All roots discovered. More than one means layout was skipped.
    pub root_ids: Vec<NodeId>,
    /// Ids whose position or size differs from the input, sorted.
    pub changed: Vec<NodeId>,
}

/// Per-node box metrics computed in the sizing pass.
#[derive(Debug, Clone, Copy, Default)]
struct BoxMetrics {
    w: f32,
    h: f32,
    /// Tallest vertical extent of this node, its right subtree, and its
    /// bottom-chain extension.
    tree_h: f32,
    /// Widest width needed by this node's vertical column.
    col_w: f32,
}

/// Adjacency over `(node, port)` pairs, built once per layout run.
struct Adjacency {
    incoming: HashMap<(NodeId, Port), NodeId>,
    outgoing: HashMap<(NodeId, Port), NodeId>,
}

impl Adjacency {
    fn build(edges: &[Edge]) -> Self {
        let mut incoming = HashMap::with_capacity(edges.len());
        let mut outgoing = HashMap::with_capacity(edges.len());
        for edge in edges {
            match parse_handle(&edge.target_handle) {
                Some((node, port)) => {
                    incoming.insert((node.to_string(), port), edge.source.clone());
                },
                None => warn!("Skipping edge {} with bad target handle", edge.id),
            }
            match parse_handle(&edge.source_handle) {
                Some((node, port)) => {
                    outgoing.insert((node.to_string(), port), edge.target.clone());
                },
                None => warn!("Skipping edge {} with bad source handle", edge.id),
            }
        }
        Self { incoming, outgoing }
    }

    fn pred(&self, node: &str, port: Port) -> Option<&NodeId> {
        self.incoming.get(&(node.to_string(), port))
    }

    fn succ(&self, node: &str, port: Port) -> Option<&NodeId> {
        self.outgoing.get(&(node.to_string(), port))
    }
}

struct LayoutCtx<'a> {
    note: &'a Note,
    settings: &'a LayoutSettings,
    adj: Adjacency,
    metrics: HashMap<NodeId, BoxMetrics>,
    /// Absolute positions resolved in the placement pass.
    abs: HashMap<NodeId, Point2D<f32>>,
    placed: HashSet<NodeId>,
}

/// Compute positions and sizes for every node reachable from the note's root.
pub fn layout(note: &Note, settings: &LayoutSettings) -> LayoutResult {
    let adj = Adjacency::build(&note.edges);
    let root_ids = find_roots(note, &adj);

    if root_ids.len() > 1 {
        // Malformed or disconnected graph: skip and report, never crash.
        warn!(
            "Layout skipped: {} roots found ({:?})",
            root_ids.len(),
            root_ids
        );
        return LayoutResult {
            node_map: note.node_map.clone(),
            root_ids,
            changed: Vec::new(),
        };
    }

    let mut ctx = LayoutCtx {
        note,
        settings,
        adj,
        metrics: HashMap::new(),
        abs: HashMap::new(),
        placed: HashSet::new(),
    };

    if let Some(root) = root_ids.first() {
        measure(&mut ctx, root);
        let origin = note
            .resolved_position(root)
            .unwrap_or_else(|| note.node(root).map(|n| n.position).unwrap_or_default());
        place(&mut ctx, root, origin);
    }

    finish(ctx, root_ids)
}

/// Find every root: a node with no left predecessor, no top predecessor,
/// and no group parent. Walks are memoized through `root_of`. A chain
/// member of a collapsed group walks up through its parent like any other
/// member, so it is never reported as a root itself.
fn find_roots(note: &Note, adj: &Adjacency) -> Vec<NodeId> {
    let mut ids: Vec<&NodeId> = note.node_map.keys().collect();
    ids.sort();

    let mut root_of: HashMap<NodeId, NodeId> = HashMap::new();
    let mut roots: Vec<NodeId> = Vec::new();

    for start in ids {
        let mut path: Vec<NodeId> = Vec::new();
        let mut cur = start.clone();
        let root = loop {
            if let Some(known) = root_of.get(&cur) {
                break known.clone();
            }
            path.push(cur.clone());
            let up = adj
                .pred(&cur, Port::Left)
                .or_else(|| adj.pred(&cur, Port::Top))
                .cloned()
                .or_else(|| note.node(&cur).and_then(|n| n.parent_id.clone()));
            match up {
                // Walks are acyclic by the cycle-check invariant; the length
                // guard keeps malformed input from looping forever.
                Some(next) if path.len() <= note.node_map.len() => cur = next,
                _ => break cur.clone(),
            }
        };
        for visited in path {
            root_of.insert(visited, root.clone());
        }
        if !roots.contains(&root) {
            roots.push(root);
        }
    }

    roots.sort();
    roots
}

/// A node's own box size: explicit overrides, else type defaults, else the
/// group-specific computation.
fn own_box(ctx: &mut LayoutCtx<'_>, id: &str) -> (f32, f32) {
    let Some(node) = ctx.note.node(id) else {
        return (ctx.settings.default_width, ctx.settings.default_height);
    };

    if node.is_group() {
        return group_box(ctx, id);
    }

    (
        node.width.unwrap_or(ctx.settings.default_width),
        node.height.unwrap_or(ctx.settings.default_height),
    )
}

/// Size of a group's box.
///
/// Expanded: members stacked top-to-bottom; each step reserves room for the
/// member's right subtree branching off mid-chain. Collapsed: the box is the
/// active step's own size. Empty chains clamp to padding-only.
fn group_box(ctx: &mut LayoutCtx<'_>, id: &str) -> (f32, f32) {
    let pad_x = ctx.settings.group_pad_x;
    let pad_y = ctx.settings.group_pad_y;
    let Some(node) = ctx.note.node(id) else {
        return (ctx.settings.default_width, ctx.settings.default_height);
    };
    let chain: Vec<NodeId> = node.chain().map(|c| c.to_vec()).unwrap_or_default();

    if node.render_as_group() {
        return match node.active_step().cloned() {
            Some(member) => {
                let m = measure(ctx, &member);
                (m.w, m.h)
            },
            None => (pad_x * 2.0, pad_y * 2.0),
        };
    }

    if chain.is_empty() {
        return (pad_x * 2.0, pad_y * 2.0);
    }

    let mut width: f32 = 0.0;
    let mut height: f32 = 0.0;
    for (i, member) in chain.iter().enumerate() {
        let m = measure(ctx, member);
        width = width.max(m.w);
        height += row_height(ctx, member, m);
        if i + 1 < chain.len() {
            height += ctx.settings.gap_y;
        }
    }
    (width + pad_x * 2.0, height + pad_y * 2.0)
}

/// Vertical room one node's row needs: its own height or the extent of the
/// subtree hanging off its right port, whichever is taller.
fn row_height(ctx: &mut LayoutCtx<'_>, id: &str, m: BoxMetrics) -> f32 {
    match ctx.adj.succ(id, Port::Right).cloned() {
        Some(right) => {
            let r = measure(ctx, &right);
            m.h.max(r.tree_h)
        },
        None => m.h,
    }
}

/// Post-order sizing. Memoized; children (right, bottom, chain members) are
/// measured before the node itself is finalized.
fn measure(ctx: &mut LayoutCtx<'_>, id: &str) -> BoxMetrics {
    if let Some(m) = ctx.metrics.get(id) {
        return *m;
    }
    // Seed with defaults to terminate on malformed self-referential graphs.
    ctx.metrics.insert(id.to_string(), BoxMetrics::default());

    let right = ctx.adj.succ(id, Port::Right).cloned();
    let bottom = ctx.adj.succ(id, Port::Bottom).cloned();

    let right_m = right.as_deref().map(|r| measure(ctx, r));
    let bottom_m = bottom.as_deref().map(|b| measure(ctx, b));

    let (w, h) = own_box(ctx, id);

    let mut tree_h = match right_m {
        Some(r) => h.max(r.tree_h),
        None => h,
    };
    if let Some(b) = bottom_m {
        tree_h += ctx.settings.gap_y + b.tree_h;
    }

    let col_w = match bottom_m {
        Some(b) => w.max(b.col_w),
        None => w,
    };

    let m = BoxMetrics { w, h, tree_h, col_w };
    ctx.metrics.insert(id.to_string(), m);
    m
}

/// Pre-order placement starting from a resolved absolute position.
fn place(ctx: &mut LayoutCtx<'_>, id: &str, at: Point2D<f32>) {
    if !ctx.placed.insert(id.to_string()) {
        return;
    }
    ctx.abs.insert(id.to_string(), at);

    let node = ctx.note.node(id).cloned();
    if let Some(node) = node.as_ref().filter(|n| n.is_group()) {
        if node.render_as_group() {
            // Collapsed: only the active step stands in for the chain, at
            // the group's own origin. Other members keep their positions.
            if let Some(step) = node.active_step().cloned() {
                place(ctx, &step, at);
            }
        } else if let Some(chain) = node.chain() {
            let chain: Vec<NodeId> = chain.to_vec();
            let mut cursor = Point2D::new(
                at.x + ctx.settings.group_pad_x,
                at.y + ctx.settings.group_pad_y,
            );
            for member in &chain {
                let m = measure(ctx, member);
                place(ctx, member, cursor);
                cursor.y += row_height(ctx, member, m) + ctx.settings.gap_y;
            }
        }
    }

    place_children(ctx, id);
}

/// Place the right and bottom successors of `id` from the carry rules: a
/// child's x comes from its top neighbor (else its left neighbor's column
/// plus the horizontal gap); its y comes from its left neighbor (else its
/// top neighbor's row plus the vertical gap). A node with both neighbors
/// waits until both are placed.
fn place_children(ctx: &mut LayoutCtx<'_>, id: &str) {
    for port in [Port::Right, Port::Bottom] {
        let Some(child) = ctx.adj.succ(id, port).cloned() else {
            continue;
        };
        try_place(ctx, &child);
    }
}

/// Place `child` once both of its predecessors are resolved; placing is
/// retried from whichever predecessor finishes last.
fn try_place(ctx: &mut LayoutCtx<'_>, child: &str) {
    // Inactive members of a collapsed chain keep their stored positions;
    // only the active step stands in for the chain.
    if ctx.note.suppressed_member(child) {
        return;
    }

    let top = ctx.adj.pred(child, Port::Top).cloned();
    let left = ctx.adj.pred(child, Port::Left).cloned();

    let resolved = |ctx: &LayoutCtx<'_>, pred: &Option<NodeId>| match pred {
        Some(p) => ctx.abs.contains_key(p.as_str()),
        None => true,
    };
    if !resolved(ctx, &top) || !resolved(ctx, &left) {
        return;
    }

    let mut x = 0.0;
    let mut y = 0.0;

    if let Some(top) = top.as_deref() {
        let top_pos = ctx.abs[top];
        let tm = ctx.metrics.get(top).copied().unwrap_or_default();
        x = top_pos.x;
        if left.is_none() {
            y = top_pos.y + row_height(ctx, top, tm) + ctx.settings.gap_y;
        }
    }
    if let Some(left) = left.as_deref() {
        let left_pos = ctx.abs[left];
        y = left_pos.y;
        if top.is_none() {
            let lm = ctx.metrics.get(left).copied().unwrap_or_default();
            x = left_pos.x + lm.col_w + ctx.settings.gap_x;
        }
    }

    place(ctx, child, Point2D::new(x, y));
}

/// Fold the computed geometry back into a node map, normalizing parented
/// nodes to parent-relative coordinates and recording what actually moved.
fn finish(ctx: LayoutCtx<'_>, root_ids: Vec<NodeId>) -> LayoutResult {
    let LayoutCtx {
        note,
        abs,
        metrics,
        ..
    } = ctx;

    let mut node_map = note.node_map.clone();
    let mut changed: Vec<NodeId> = Vec::new();

    let mut ids: Vec<NodeId> = abs.keys().cloned().collect();
    ids.sort();

    for id in ids {
        let Some(old) = node_map.get(&id).cloned() else {
            continue;
        };
        let absolute = abs[&id];

        // Parented nodes store positions relative to their parent's origin.
        let stored = match old.parent_id.as_deref().and_then(|p| abs.get(p)) {
            Some(parent_abs) => absolute - parent_abs.to_vector(),
            None => absolute,
        };

        let mut next = old.clone();
        next.position = stored;
        if next.is_group() {
            if let Some(m) = metrics.get(&id) {
                next.width = Some(m.w);
                next.height = Some(m.h);
            }
        }

        if next != old {
            changed.push(id.clone());
            node_map.insert(id, next);
        }
    }

    changed.sort();
    LayoutResult {
        node_map,
        root_ids,
        changed,
    }
}
