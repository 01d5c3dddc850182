//! Read-only planning of a measure rewrite
//!
//! Everything that can make a rewrite fail is decided here, before the
//! score is touched: the affected range, the sliced events of every track,
//! and where annotations, clefs, breaks and frames land afterwards.

use crate::errors::{EngravingError, Result};
use crate::models::*;
use std::collections::{BTreeMap, BTreeSet};

/// Measures affected by a signature change
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Range {
    pub measures: Vec<ElementId>,
    /// Measures plus the frames between them, contiguous in score order
    pub items: Vec<ElementId>,
    pub start: Fraction,
    pub end: Fraction,
    /// The range stops at a section break (on a measure or a frame)
    pub section_end: bool,
    /// First measure after a section boundary ending the range
    pub next_in_section: Option<ElementId>,
}

impl Range {
    pub fn len(&self) -> Fraction {
        self.end - self.start
    }
}

/// From `measure` up to the next explicit signature, the end of the
/// section or the end of the score
pub(crate) fn find_range(score: &Score, measure: ElementId) -> Result<Range> {
    let start = score
        .measure_tick(measure)
        .ok_or(EngravingError::InvalidReference(measure))?;
    let bases = score.measure_bases();
    let pos = bases
        .iter()
        .position(|b| *b == measure)
        .ok_or(EngravingError::InvalidReference(measure))?;

    let mut measures = vec![measure];
    let mut items = vec![measure];
    let mut pending_frames = Vec::new();
    let mut section_end = score.has_layout_break(measure, LayoutBreakKind::Section);
    let mut stop = pos;

    if !section_end {
        for (i, base) in bases.iter().enumerate().skip(pos + 1) {
            match score.kind(*base) {
                Some(ElementKind::Frame) => {
                    if score.has_layout_break(*base, LayoutBreakKind::Section) {
                        section_end = true;
                        stop = i;
                        break;
                    }
                    pending_frames.push(*base);
                }
                Some(ElementKind::Measure) => {
                    if score.has_global_timesig(*base) {
                        break;
                    }
                    items.append(&mut pending_frames);
                    items.push(*base);
                    measures.push(*base);
                    stop = i;
                    if score.has_layout_break(*base, LayoutBreakKind::Section) {
                        section_end = true;
                        break;
                    }
                }
                _ => {}
            }
        }
    }

    let next_in_section = if section_end {
        bases
            .iter()
            .skip(stop + 1)
            .find(|b| score.kind(**b) == Some(ElementKind::Measure))
            .copied()
    } else {
        None
    };

    let len: Fraction = measures
        .iter()
        .filter_map(|m| score.measure_data(*m).map(|d| d.len))
        .sum();

    Ok(Range { measures, items, start, end: start + len, section_end, next_in_section })
}

/// A chord or rest of a rewritten measure
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct NewChordRest {
    pub rtick: Fraction,
    pub track: usize,
    pub duration_type: TDuration,
    pub duration: Fraction,
    /// `None` for rests
    pub notes: Option<Vec<NoteData>>,
    /// Index into [`NewMeasure::tuplets`]
    pub tuplet: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub(crate) struct NewMeasure {
    pub chord_rests: Vec<NewChordRest>,
    pub tuplets: Vec<TupletData>,
    pub annotations: Vec<(Fraction, AnnotationData)>,
    pub clefs: Vec<(Fraction, ClefData)>,
    pub breaks: Vec<LayoutBreakKind>,
    pub barline: BarLineType,
    /// Frames re-inserted right after this measure
    pub frames_after: Vec<ElementId>,
}

/// Complete description of a rewrite, ready to apply
#[derive(Debug, Clone)]
pub(crate) struct Plan {
    pub range: Range,
    pub sig: TimeSigValue,
    pub measure_len: Fraction,
    pub measures: Vec<NewMeasure>,
}

impl Plan {
    pub fn new_end(&self) -> Fraction {
        self.range.start + self.measure_len * self.measures.len() as i64
    }
}

#[derive(Debug, Clone)]
struct CrEvent {
    tick: Fraction,
    len: Fraction,
    duration_type: TDuration,
    notes: Option<Vec<NoteData>>,
}

#[derive(Debug, Clone)]
enum Item {
    Single(CrEvent),
    Tuplet { tick: Fraction, len: Fraction, data: TupletData, members: Vec<CrEvent> },
}

/// Plan rewriting `range` into measures of `sig`
pub(crate) fn plan_rewrite(score: &Score, range: Range, sig: TimeSigValue) -> Result<Plan> {
    let measure_len = sig.duration();
    let count = range.len().div_ceil(measure_len).max(1) as usize;
    let mut measures: Vec<NewMeasure> = vec![NewMeasure::default(); count];
    let locate = |tick: Fraction| -> (usize, Fraction) {
        let k = ((tick - range.start).div_floor(measure_len).max(0) as usize).min(count - 1);
        (k, tick - range.start - measure_len * k as i64)
    };

    let anchors = spanner_anchors(score);
    for track in 0..score.ntracks() {
        for item in collect_track(score, &range, track, &anchors) {
            match item {
                Item::Tuplet { tick, len, data, members } => {
                    let (k, rtick) = locate(tick);
                    if rtick + len > measure_len {
                        return Err(EngravingError::RewriteRejected(format!(
                            "tuplet at {} on track {} would cross a barline of {}",
                            tick, track, sig
                        )));
                    }
                    let nm = &mut measures[k];
                    nm.tuplets.push(data);
                    let index = nm.tuplets.len() - 1;
                    for ev in members {
                        nm.chord_rests.push(NewChordRest {
                            rtick: ev.tick - range.start - measure_len * k as i64,
                            track,
                            duration_type: ev.duration_type,
                            duration: ev.len,
                            notes: ev.notes,
                            tuplet: Some(index),
                        });
                    }
                }
                Item::Single(ev) => slice_event(&mut measures, &range, measure_len, track, ev)?,
            }
        }
    }

    for track in (0..score.ntracks()).step_by(VOICES) {
        for nm in measures.iter_mut() {
            fill_gaps(nm, track, measure_len)?;
        }
    }

    for m in &range.measures {
        for seg in score.segments(*m) {
            let (Some(data), Some(tick)) = (score.segment_data(seg), score.segment_tick(seg)) else {
                continue;
            };
            match data.segment_type {
                SegmentType::ChordRest => {
                    for a in score.segment_annotations(seg) {
                        if let Some(Element::Annotation(ad)) = score.element(a) {
                            let (k, rtick) = locate(tick);
                            measures[k].annotations.push((rtick, ad.clone()));
                        }
                    }
                }
                SegmentType::Clef => {
                    for c in score.children(seg) {
                        if let Some(Element::Clef(cd)) = score.element(*c) {
                            let (k, rtick) = locate(tick);
                            measures[k].clefs.push((rtick, cd.clone()));
                        }
                    }
                }
                SegmentType::TimeSig | SegmentType::TimeSigAnnounce => {}
            }
        }
    }

    // breaks, barlines and frames follow the measure they were attached to
    let mut target = 0;
    for item in &range.items {
        match score.element(*item) {
            Some(Element::Measure(md)) => {
                let old_end = score.measure_tick(*item).unwrap_or(range.start) + md.len;
                target = ((old_end - range.start).div_ceil(measure_len) - 1).clamp(0, count as i64 - 1) as usize;
                let nm = &mut measures[target];
                for kind in score.layout_breaks(*item) {
                    if !nm.breaks.contains(&kind) {
                        nm.breaks.push(kind);
                    }
                }
                if md.end_barline != BarLineType::Normal {
                    nm.barline = md.end_barline;
                }
            }
            Some(Element::Frame(_)) => measures[target].frames_after.push(*item),
            _ => {}
        }
    }

    for nm in measures.iter_mut() {
        nm.chord_rests.sort_by(|a, b| (a.track, a.rtick).cmp(&(b.track, b.rtick)));
    }

    Ok(Plan { range, sig, measure_len, measures })
}

/// Chords and rests some spanner starts or ends on
fn spanner_anchors(score: &Score) -> BTreeSet<ElementId> {
    score
        .spanners()
        .into_iter()
        .filter_map(|s| score.element(s).and_then(Element::as_spanner))
        .flat_map(|d| [d.start_element, d.end_element])
        .flatten()
        .collect()
}

/// Events of one track in score order; adjacent plain rests are merged
/// unless the later one anchors a spanner
fn collect_track(score: &Score, range: &Range, track: usize, anchors: &BTreeSet<ElementId>) -> Vec<Item> {
    let mut items: Vec<Item> = Vec::new();
    let mut tuplets: BTreeMap<ElementId, usize> = BTreeMap::new();

    for m in &range.measures {
        for cr in score.chord_rests_in_measure(*m, track) {
            let (Some(el), Some(tick)) = (score.element(cr), score.chord_rest_tick(cr)) else {
                continue;
            };
            let Some(data) = el.chord_rest() else { continue };
            let notes = match el {
                Element::Chord(_) => Some(
                    score
                        .children(cr)
                        .iter()
                        .filter_map(|n| match score.element(*n) {
                            Some(Element::Note(nd)) => Some(nd.clone()),
                            _ => None,
                        })
                        .collect::<Vec<_>>(),
                ),
                _ => None,
            };
            let ev = CrEvent { tick, len: data.duration, duration_type: data.duration_type, notes };

            if let Some(tuplet) = data.tuplet {
                if let Some(idx) = tuplets.get(&tuplet) {
                    if let Some(Item::Tuplet { members, .. }) = items.get_mut(*idx) {
                        members.push(ev);
                    }
                    continue;
                }
                if let Some(Element::Tuplet(td)) = score.element(tuplet) {
                    let len = td
                        .len()
                        .unwrap_or_else(|| score.tuplet_members(tuplet).iter().filter_map(|c| score.element(*c).and_then(Element::chord_rest).map(|d| d.duration)).sum());
                    tuplets.insert(tuplet, items.len());
                    items.push(Item::Tuplet { tick, len, data: td.clone(), members: vec![ev] });
                    continue;
                }
            }

            if ev.notes.is_none() && !anchors.contains(&cr) {
                if let Some(Item::Single(prev)) = items.last_mut() {
                    if prev.notes.is_none() && prev.tick + prev.len == ev.tick {
                        prev.len += ev.len;
                        prev.duration_type = TDuration::measure();
                        continue;
                    }
                }
            }
            items.push(Item::Single(ev));
        }
    }
    items
}

/// Cut one event at the new barlines
fn slice_event(measures: &mut [NewMeasure], range: &Range, measure_len: Fraction, track: usize, ev: CrEvent) -> Result<()> {
    let end = ev.tick + ev.len;
    let mut a = ev.tick;
    while a < end {
        let k = (a - range.start).div_floor(measure_len).max(0) as usize;
        let Some(nm) = measures.get_mut(k) else { break };
        let bar_start = range.start + measure_len * k as i64;
        let bar_end = bar_start + measure_len;
        let b = end.min(bar_end);
        let whole = a == ev.tick && b == end;
        let last_fragment = b == end;

        match &ev.notes {
            None if a == bar_start && b == bar_end => nm.chord_rests.push(NewChordRest {
                rtick: a - bar_start,
                track,
                duration_type: TDuration::measure(),
                duration: measure_len,
                notes: None,
                tuplet: None,
            }),
            None => {
                let pieces = if whole && !ev.duration_type.is_measure() {
                    vec![ev.duration_type]
                } else {
                    decompose(b - a)?
                };
                push_pieces(nm, track, a - bar_start, &pieces, None);
            }
            Some(notes) => {
                let pieces = if whole { vec![ev.duration_type] } else { decompose(b - a)? };
                let tied: Vec<NoteData> = notes
                    .iter()
                    .map(|n| NoteData { pitch: n.pitch, tie_forward: true })
                    .collect();
                let mut rtick = a - bar_start;
                for (i, d) in pieces.iter().enumerate() {
                    let len = d.fraction().unwrap_or(b - a);
                    let final_piece = last_fragment && i + 1 == pieces.len();
                    nm.chord_rests.push(NewChordRest {
                        rtick,
                        track,
                        duration_type: *d,
                        duration: len,
                        notes: Some(if final_piece { notes.clone() } else { tied.clone() }),
                        tuplet: None,
                    });
                    rtick += len;
                }
            }
        }
        a = b;
    }
    Ok(())
}

fn decompose(len: Fraction) -> Result<Vec<TDuration>> {
    to_duration_list(len, 1).ok_or_else(|| {
        EngravingError::RewriteRejected(format!("length {} cannot be written with note values", len))
    })
}

fn push_pieces(nm: &mut NewMeasure, track: usize, rtick: Fraction, pieces: &[TDuration], notes: Option<Vec<NoteData>>) {
    let mut rtick = rtick;
    for d in pieces {
        let Some(len) = d.fraction() else { continue };
        nm.chord_rests.push(NewChordRest {
            rtick,
            track,
            duration_type: *d,
            duration: len,
            notes: notes.clone(),
            tuplet: None,
        });
        rtick += len;
    }
}

/// Keep the first voice of a staff free of holes
fn fill_gaps(nm: &mut NewMeasure, track: usize, measure_len: Fraction) -> Result<()> {
    let mut spans: Vec<(Fraction, Fraction)> = nm
        .chord_rests
        .iter()
        .filter(|c| c.track == track)
        .map(|c| (c.rtick, c.rtick + c.duration))
        .collect();
    spans.sort();

    if spans.is_empty() {
        nm.chord_rests.push(NewChordRest {
            rtick: Fraction::zero(),
            track,
            duration_type: TDuration::measure(),
            duration: measure_len,
            notes: None,
            tuplet: None,
        });
        return Ok(());
    }

    let mut cursor = Fraction::zero();
    let mut gaps = Vec::new();
    for (s, e) in spans {
        if s > cursor {
            gaps.push((cursor, s));
        }
        cursor = cursor.max(e);
    }
    if cursor < measure_len {
        gaps.push((cursor, measure_len));
    }
    for (s, e) in gaps {
        let pieces = decompose(e - s)?;
        push_pieces(nm, track, s, &pieces, None);
    }
    Ok(())
}
