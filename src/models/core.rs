//! Score graph: an arena of typed nodes
//!
//! Nodes own their children; parent links and cross references (spanner
//! endpoints, tuplet membership) are plain [`ElementId`] handles whose
//! validity is checked against the arena on every lookup. A stale handle
//! yields `None`, never a dangling reference.

use super::elements::*;
use super::fraction::Fraction;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Ids at or above this value belong to layout-generated nodes
const GENERATED_BASE: u32 = 0x8000_0000;

/// Opaque handle to a node of the score graph
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ElementId(u32);

impl ElementId {
    /// Stable key for collaborators (unique for the node's lifetime)
    pub fn key(&self) -> u64 {
        self.0 as u64
    }

    pub fn from_key(key: u64) -> Option<ElementId> {
        u32::try_from(key).ok().map(ElementId)
    }

    /// Created by layout rather than by an edit
    pub fn is_generated(&self) -> bool {
        self.0 >= GENERATED_BASE
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_generated() {
            write!(f, "g{}", self.0 - GENERATED_BASE)
        } else {
            write!(f, "#{}", self.0)
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Node {
    pub id: ElementId,
    pub parent: Option<ElementId>,
    pub children: Vec<ElementId>,
    pub element: Element,
}

/// The element graph of one score
#[derive(Clone, Debug, PartialEq)]
pub struct Score {
    nodes: BTreeMap<ElementId, Node>,
    root: ElementId,
    next_id: u32,
    next_generated: u32,
}

impl Default for Score {
    fn default() -> Self {
        Self::new()
    }
}

impl Score {
    pub fn new() -> Self {
        let root = ElementId(0);
        let mut nodes = BTreeMap::new();
        nodes.insert(
            root,
            Node { id: root, parent: None, children: Vec::new(), element: Element::Score },
        );
        Self { nodes, root, next_id: 1, next_generated: GENERATED_BASE }
    }

    // ------------------------------------------------------------------
    // Arena primitives (crate-internal; edits go through undo::EditContext)
    // ------------------------------------------------------------------

    pub(crate) fn alloc_id(&mut self) -> ElementId {
        let id = ElementId(self.next_id);
        self.next_id += 1;
        id
    }

    pub(crate) fn id_watermark(&self) -> u32 {
        self.next_id
    }

    pub(crate) fn restore_id_watermark(&mut self, watermark: u32) {
        self.next_id = watermark;
    }

    /// Insert a detached subtree (preorder, first node is its root) under
    /// `parent` at child position `index`
    pub(crate) fn attach_subtree(&mut self, nodes: Vec<Node>, parent: ElementId, index: usize) {
        let Some(top) = nodes.first().map(|n| n.id) else {
            return;
        };
        for mut node in nodes {
            if node.id == top {
                node.parent = Some(parent);
            }
            self.nodes.insert(node.id, node);
        }
        if let Some(p) = self.nodes.get_mut(&parent) {
            let index = index.min(p.children.len());
            p.children.insert(index, top);
        }
    }

    /// Remove a subtree, returning its nodes in preorder plus its former
    /// parent and child position
    pub(crate) fn detach_subtree(&mut self, id: ElementId) -> Option<(Vec<Node>, ElementId, usize)> {
        let parent = self.nodes.get(&id)?.parent?;
        let index = self.nodes.get(&parent)?.children.iter().position(|c| *c == id)?;
        if let Some(p) = self.nodes.get_mut(&parent) {
            p.children.remove(index);
        }
        let order: Vec<ElementId> = self.descendants(id).collect();
        let mut removed = Vec::with_capacity(order.len());
        for nid in order {
            if let Some(node) = self.nodes.remove(&nid) {
                removed.push(node);
            }
        }
        Some((removed, parent, index))
    }

    /// Allocate a node for `element` and attach it at its canonical position
    pub(crate) fn push_child(&mut self, parent: ElementId, element: Element) -> ElementId {
        let index = self.insert_index(parent, &element);
        let id = self.alloc_id();
        self.attach_subtree(vec![Node { id, parent: Some(parent), children: Vec::new(), element }], parent, index);
        id
    }

    pub(crate) fn replace_element(&mut self, id: ElementId, element: Element) -> Option<Element> {
        let node = self.nodes.get_mut(&id)?;
        Some(std::mem::replace(&mut node.element, element))
    }

    pub(crate) fn element_mut(&mut self, id: ElementId) -> Option<&mut Element> {
        self.nodes.get_mut(&id).map(|n| &mut n.element)
    }

    /// Add a layout-generated node; ids restart from the reserved base after
    /// every [`Score::clear_generated`], so identical layouts give identical ids
    pub(crate) fn add_generated(&mut self, parent: ElementId, index: usize, element: Element) -> ElementId {
        let id = ElementId(self.next_generated);
        self.next_generated += 1;
        let node = Node { id, parent: Some(parent), children: Vec::new(), element };
        self.attach_subtree(vec![node], parent, index);
        id
    }

    pub(crate) fn clear_generated(&mut self) {
        let generated: Vec<ElementId> = self
            .nodes
            .keys()
            .filter(|id| id.is_generated())
            .copied()
            .collect();
        for id in generated {
            // children of a generated node are generated too
            if self.nodes.contains_key(&id) {
                self.detach_subtree(id);
            }
        }
        self.next_generated = GENERATED_BASE;
    }

    // ------------------------------------------------------------------
    // Read-only navigation
    // ------------------------------------------------------------------

    pub fn root(&self) -> ElementId {
        self.root
    }

    pub fn get(&self, id: ElementId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn contains(&self, id: ElementId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn element(&self, id: ElementId) -> Option<&Element> {
        self.nodes.get(&id).map(|n| &n.element)
    }

    pub fn kind(&self, id: ElementId) -> Option<ElementKind> {
        self.element(id).map(Element::kind)
    }

    pub fn parent(&self, id: ElementId) -> Option<ElementId> {
        self.nodes.get(&id).and_then(|n| n.parent)
    }

    pub fn children(&self, id: ElementId) -> &[ElementId] {
        self.nodes.get(&id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    /// Every live id, in id order (includes nodes unreachable from the root)
    pub fn ids(&self) -> impl Iterator<Item = ElementId> + '_ {
        self.nodes.keys().copied()
    }

    /// Depth-first, preorder traversal starting at `from`
    pub fn descendants(&self, from: ElementId) -> DepthFirst<'_> {
        let stack = if self.contains(from) { vec![from] } else { Vec::new() };
        DepthFirst { score: self, stack }
    }

    /// Nearest ancestor (or self) of the given kind
    pub fn ancestor_of_kind(&self, id: ElementId, kind: ElementKind) -> Option<ElementId> {
        let mut cur = Some(id);
        while let Some(c) = cur {
            if self.kind(c)? == kind {
                return Some(c);
            }
            cur = self.parent(c);
        }
        None
    }

    pub fn staves(&self) -> Vec<ElementId> {
        self.children_of_kind(self.root, ElementKind::Staff)
    }

    pub fn nstaves(&self) -> usize {
        self.staves().len()
    }

    pub fn ntracks(&self) -> usize {
        self.nstaves() * VOICES
    }

    /// Measures and frames in score order
    pub fn measure_bases(&self) -> Vec<ElementId> {
        self.children(self.root)
            .iter()
            .copied()
            .filter(|id| self.kind(*id).map_or(false, |k| k.is_measure_base()))
            .collect()
    }

    pub fn measures(&self) -> Vec<ElementId> {
        self.children_of_kind(self.root, ElementKind::Measure)
    }

    pub fn first_measure(&self) -> Option<ElementId> {
        self.measures().first().copied()
    }

    pub fn next_measure(&self, measure: ElementId) -> Option<ElementId> {
        let measures = self.measures();
        let pos = measures.iter().position(|m| *m == measure)?;
        measures.get(pos + 1).copied()
    }

    pub fn prev_measure(&self, measure: ElementId) -> Option<ElementId> {
        let measures = self.measures();
        let pos = measures.iter().position(|m| *m == measure)?;
        pos.checked_sub(1).and_then(|p| measures.get(p).copied())
    }

    pub fn measure_data(&self, measure: ElementId) -> Option<&MeasureData> {
        self.element(measure).and_then(Element::as_measure)
    }

    /// (measure, start tick) for every measure in order
    pub fn measure_ticks(&self) -> Vec<(ElementId, Fraction)> {
        let mut tick = Fraction::zero();
        let mut out = Vec::new();
        for m in self.measures() {
            out.push((m, tick));
            if let Some(md) = self.measure_data(m) {
                tick += md.len;
            }
        }
        out
    }

    pub fn measure_tick(&self, measure: ElementId) -> Option<Fraction> {
        self.measure_ticks().into_iter().find(|(m, _)| *m == measure).map(|(_, t)| t)
    }

    pub fn measure_end_tick(&self, measure: ElementId) -> Option<Fraction> {
        Some(self.measure_tick(measure)? + self.measure_data(measure)?.len)
    }

    pub fn end_tick(&self) -> Fraction {
        self.measures()
            .iter()
            .filter_map(|m| self.measure_data(*m).map(|d| d.len))
            .sum()
    }

    /// Measure containing `tick` (a tick on a barline belongs to the next measure)
    pub fn measure_at_tick(&self, tick: Fraction) -> Option<ElementId> {
        self.measure_ticks().into_iter().find_map(|(m, start)| {
            let len = self.measure_data(m)?.len;
            (tick >= start && tick < start + len).then_some(m)
        })
    }

    pub fn segments(&self, measure: ElementId) -> Vec<ElementId> {
        self.children_of_kind(measure, ElementKind::Segment)
    }

    pub fn segment_data(&self, segment: ElementId) -> Option<&SegmentData> {
        self.element(segment).and_then(Element::as_segment)
    }

    /// Absolute tick of a segment
    pub fn segment_tick(&self, segment: ElementId) -> Option<Fraction> {
        let measure = self.parent(segment)?;
        Some(self.measure_tick(measure)? + self.segment_data(segment)?.rtick)
    }

    /// Segment of the given type at an absolute tick within `measure`
    pub fn find_segment(&self, measure: ElementId, segment_type: SegmentType, tick: Fraction) -> Option<ElementId> {
        let rtick = tick - self.measure_tick(measure)?;
        self.find_segment_r(measure, segment_type, rtick)
    }

    /// Same as [`Score::find_segment`] with a measure-relative tick
    pub fn find_segment_r(&self, measure: ElementId, segment_type: SegmentType, rtick: Fraction) -> Option<ElementId> {
        self.segments(measure).into_iter().find(|s| {
            self.segment_data(*s)
                .map_or(false, |d| d.segment_type == segment_type && d.rtick == rtick)
        })
    }

    /// The element a segment holds for `track` (annotations excluded)
    pub fn segment_element(&self, segment: ElementId, track: usize) -> Option<ElementId> {
        self.children(segment).iter().copied().find(|c| {
            self.element(*c).map_or(false, |e| {
                e.kind() != ElementKind::Annotation && e.track() == Some(track)
            })
        })
    }

    pub fn segment_annotations(&self, segment: ElementId) -> Vec<ElementId> {
        self.children_of_kind(segment, ElementKind::Annotation)
    }

    /// Absolute start tick of a chord or rest
    pub fn chord_rest_tick(&self, cr: ElementId) -> Option<Fraction> {
        self.segment_tick(self.parent(cr)?)
    }

    /// Chord or rest starting at `tick` on `track`
    pub fn chord_rest_at(&self, tick: Fraction, track: usize) -> Option<ElementId> {
        let measure = self.measure_at_tick(tick)?;
        let segment = self.find_segment(measure, SegmentType::ChordRest, tick)?;
        let el = self.segment_element(segment, track)?;
        self.kind(el).filter(|k| k.is_chord_rest()).map(|_| el)
    }

    /// Chords and rests of a track inside a measure, in time order
    pub fn chord_rests_in_measure(&self, measure: ElementId, track: usize) -> Vec<ElementId> {
        self.segments(measure)
            .into_iter()
            .filter(|s| self.segment_data(*s).map_or(false, |d| d.segment_type == SegmentType::ChordRest))
            .filter_map(|s| self.segment_element(s, track))
            .filter(|e| self.kind(*e).map_or(false, |k| k.is_chord_rest()))
            .collect()
    }

    pub fn tuplets(&self, measure: ElementId) -> Vec<ElementId> {
        self.children_of_kind(measure, ElementKind::Tuplet)
    }

    pub fn tuplet_members(&self, tuplet: ElementId) -> Vec<ElementId> {
        let Some(measure) = self.parent(tuplet) else {
            return Vec::new();
        };
        self.descendants(measure)
            .filter(|id| {
                self.element(*id)
                    .and_then(Element::chord_rest)
                    .map_or(false, |cr| cr.tuplet == Some(tuplet))
            })
            .collect()
    }

    pub fn layout_breaks(&self, measure_base: ElementId) -> Vec<LayoutBreakKind> {
        self.children(measure_base)
            .iter()
            .filter_map(|c| match self.element(*c) {
                Some(Element::LayoutBreak(k)) => Some(*k),
                _ => None,
            })
            .collect()
    }

    pub fn has_layout_break(&self, measure_base: ElementId, kind: LayoutBreakKind) -> bool {
        self.layout_breaks(measure_base).contains(&kind)
    }

    pub fn spanners(&self) -> Vec<ElementId> {
        self.children_of_kind(self.root, ElementKind::Spanner)
    }

    /// Spanners using `element` as their start or end point
    pub fn spanners_referencing(&self, element: ElementId) -> Vec<ElementId> {
        self.spanners()
            .into_iter()
            .filter(|s| {
                self.element(*s).and_then(Element::as_spanner).map_or(false, |d| {
                    d.start_element == Some(element) || d.end_element == Some(element)
                })
            })
            .collect()
    }

    /// Time signature in effect on `staff_idx` at `measure` (explicit or inherited)
    pub fn timesig_at(&self, measure: ElementId, staff_idx: usize) -> Option<&super::timesig::TimeSig> {
        let measures = self.measures();
        let pos = measures.iter().position(|m| *m == measure)?;
        let track = staff2track(staff_idx);
        measures[..=pos].iter().rev().find_map(|m| {
            let seg = self.find_segment_r(*m, SegmentType::TimeSig, Fraction::zero())?;
            let el = self.segment_element(seg, track)?;
            self.element(el).and_then(Element::as_timesig)
        })
    }

    /// Measure carries an explicit (non-local) time signature
    pub fn has_global_timesig(&self, measure: ElementId) -> bool {
        self.find_segment_r(measure, SegmentType::TimeSig, Fraction::zero())
            .map_or(false, |seg| {
                self.children(seg).iter().any(|c| {
                    self.element(*c)
                        .and_then(Element::as_timesig)
                        .map_or(false, |ts| !ts.local)
                })
            })
    }

    /// Child position that keeps `parent`'s children in canonical order:
    /// segments by (tick, type) before tuplets before breaks; inside a
    /// segment, track elements by track before annotations; staves before
    /// measures and frames before spanners under the root
    pub(crate) fn insert_index(&self, parent: ElementId, element: &Element) -> usize {
        let rank = sibling_rank(element);
        let children = self.children(parent);
        children
            .iter()
            .position(|c| self.element(*c).map_or(false, |e| sibling_rank(e) > rank))
            .unwrap_or(children.len())
    }

    pub fn children_of_kind(&self, id: ElementId, kind: ElementKind) -> Vec<ElementId> {
        self.children(id)
            .iter()
            .copied()
            .filter(|c| self.kind(*c) == Some(kind))
            .collect()
    }
}

fn sibling_rank(element: &Element) -> (u8, Fraction, u8, usize) {
    let zero = Fraction::zero();
    match element {
        Element::Score => (0, zero, 0, 0),
        Element::Staff(_) => (0, zero, 0, 0),
        Element::Measure(_) | Element::Frame(_) => (1, zero, 0, 0),
        Element::Spanner(s) => (2, s.tick, 0, s.track),
        Element::Segment(s) => (0, s.rtick, s.segment_type as u8, 0),
        Element::Tuplet(t) => (1, zero, 0, t.track),
        Element::LayoutBreak(k) => (2, zero, *k as u8, 0),
        Element::TimeSig(ts) => (0, zero, 0, ts.track),
        Element::Clef(c) => (0, zero, 0, c.track),
        Element::Chord(cr) | Element::Rest(cr) => (0, zero, 0, cr.track),
        Element::Annotation(a) => (1, zero, 0, a.track),
        Element::Note(n) => (0, zero, 0, n.pitch as usize),
    }
}

/// Preorder iterator over a subtree
pub struct DepthFirst<'a> {
    score: &'a Score,
    stack: Vec<ElementId>,
}

impl<'a> Iterator for DepthFirst<'a> {
    type Item = ElementId;

    fn next(&mut self) -> Option<ElementId> {
        let id = self.stack.pop()?;
        self.stack.extend(self.score.children(id).iter().rev().copied());
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::builder::ScoreBuilder;

    #[test]
    fn test_new_score_has_root_only() {
        let score = Score::new();
        assert_eq!(score.len(), 1);
        assert!(score.is_empty());
        assert_eq!(score.kind(score.root()), Some(ElementKind::Score));
    }

    #[test]
    fn test_measure_ticks_are_cumulative() {
        let score = ScoreBuilder::new(1).measures(3, 3, 4).build();
        let ticks: Vec<Fraction> = score.measure_ticks().into_iter().map(|(_, t)| t).collect();
        assert_eq!(ticks, vec![Fraction::zero(), Fraction::new(3, 4), Fraction::new(3, 2)]);
        assert_eq!(score.end_tick(), Fraction::new(9, 4));
    }

    #[test]
    fn test_measure_at_tick_boundary_belongs_to_next() {
        let score = ScoreBuilder::new(1).measures(2, 4, 4).build();
        let measures = score.measures();
        assert_eq!(score.measure_at_tick(Fraction::new(1, 1)), Some(measures[1]));
        assert_eq!(score.measure_at_tick(Fraction::new(2, 1)), None);
    }

    #[test]
    fn test_stale_handle_is_none() {
        let mut score = ScoreBuilder::new(1).measures(2, 4, 4).build();
        let m = score.measures()[1];
        score.detach_subtree(m);
        assert!(score.element(m).is_none());
        assert!(score.children(m).is_empty());
        assert!(score.measure_tick(m).is_none());
        assert!(score.next_measure(m).is_none());
    }

    #[test]
    fn test_depth_first_is_preorder() {
        let score = ScoreBuilder::new(1).measures(1, 4, 4).build();
        let order: Vec<ElementKind> = score
            .descendants(score.root())
            .filter_map(|id| score.kind(id))
            .collect();
        assert_eq!(order[0], ElementKind::Score);
        let measure_pos = order.iter().position(|k| *k == ElementKind::Measure).unwrap();
        let segment_pos = order.iter().position(|k| *k == ElementKind::Segment).unwrap();
        assert!(measure_pos < segment_pos);
    }

    #[test]
    fn test_generated_ids_restart_after_clear() {
        let mut score = ScoreBuilder::new(1).measures(1, 4, 4).build();
        let m = score.first_measure().unwrap();
        let a = score.add_generated(m, 0, Element::LayoutBreak(LayoutBreakKind::Line));
        score.clear_generated();
        assert!(!score.contains(a));
        let b = score.add_generated(m, 0, Element::LayoutBreak(LayoutBreakKind::Line));
        assert_eq!(a, b);
        assert!(b.is_generated());
    }
}
