//! Courtesy time signatures at the end of systems
//!
//! When the measure starting the next system changes the signature, the
//! last measure of the current system gets a `TimeSigAnnounce` segment with
//! a copy for every staff that shows a signature there. A section break on
//! that measure, or on a frame before the next measure, suppresses it.

use super::layout::ScoreLayout;
use crate::models::*;

/// Add announce segments for every system end; returns how many were added
///
/// Copies follow the next measure's `TimeSig` segment staff by staff. A
/// global change has a signature on every staff, so every staff is
/// announced; a staff-local change is announced on its own staff only and
/// the other staves, whose signature does not change, get no copy.
pub fn add_courtesy_signatures(score: &mut Score, layout: &ScoreLayout) -> usize {
    let mut added = 0;
    let bases = score.measure_bases();

    for (i, m) in bases.iter().enumerate() {
        if score.kind(*m) != Some(ElementKind::Measure) || !layout.ends_system(*m) {
            continue;
        }
        if score.has_layout_break(*m, LayoutBreakKind::Section) {
            continue;
        }
        let mut next = None;
        let mut suppressed = false;
        for b in &bases[i + 1..] {
            match score.kind(*b) {
                Some(ElementKind::Measure) => {
                    next = Some(*b);
                    break;
                }
                Some(ElementKind::Frame) if score.has_layout_break(*b, LayoutBreakKind::Section) => {
                    suppressed = true;
                    break;
                }
                _ => {}
            }
        }
        let Some(next) = next.filter(|_| !suppressed) else {
            continue;
        };

        let copies: Vec<TimeSig> = match score.find_segment_r(next, SegmentType::TimeSig, Fraction::zero()) {
            Some(seg) => score
                .children(seg)
                .iter()
                .filter_map(|c| score.element(*c).and_then(Element::as_timesig))
                .map(|ts| TimeSig { courtesy: true, ..ts.clone() })
                .collect(),
            None => Vec::new(),
        };
        if copies.is_empty() {
            continue;
        }
        let Some(len) = score.measure_data(*m).map(|d| d.len) else {
            continue;
        };

        let segment = Element::Segment(SegmentData {
            segment_type: SegmentType::TimeSigAnnounce,
            rtick: len,
            x: 0.0,
        });
        let index = score.insert_index(*m, &segment);
        let seg = score.add_generated(*m, index, segment);
        for ts in copies {
            let element = Element::TimeSig(ts);
            let index = score.insert_index(seg, &element);
            score.add_generated(seg, index, element);
        }
        log::debug!("courtesy time signature at end of measure {}", m);
        added += 1;
    }
    added
}
