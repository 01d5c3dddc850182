//! Fluent construction of scores
//!
//! Used by the file reader's tests, the WASM `new_score` entry point and
//! the integration suites. Content is written voice by voice, measure by
//! measure; voice 0 of every staff is kept full with rests.

use super::core::{ElementId, Node, Score};
use super::duration::{to_duration_list, DurationType, TDuration};
use super::elements::*;
use super::fraction::Fraction;
use super::timesig::{TimeSig, TimeSigType, TimeSigValue};

/// One event of a voice
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Chord(Vec<u8>, TDuration),
    Rest(TDuration),
    Tuplet { actual: u32, normal: u32, base: TDuration, pitches: Vec<u8> },
}

impl Event {
    pub fn note(pitch: u8, duration_type: DurationType) -> Self {
        Event::Chord(vec![pitch], TDuration::new(duration_type, 0))
    }

    pub fn dotted(pitch: u8, duration_type: DurationType) -> Self {
        Event::Chord(vec![pitch], TDuration::new(duration_type, 1))
    }

    pub fn rest(duration_type: DurationType) -> Self {
        Event::Rest(TDuration::new(duration_type, 0))
    }

    /// `pitches.len()` notes of `base` in the time of `normal`
    pub fn tuplet(actual: u32, normal: u32, base: DurationType, pitches: &[u8]) -> Self {
        Event::Tuplet { actual, normal, base: TDuration::new(base, 0), pitches: pitches.to_vec() }
    }
}

pub struct ScoreBuilder {
    score: Score,
    last_base: Option<ElementId>,
    last_sig: Option<TimeSig>,
}

impl ScoreBuilder {
    pub fn new(nstaves: usize) -> Self {
        let mut score = Score::new();
        for i in 0..nstaves.max(1) {
            let root = score.root();
            push(&mut score, root, Element::Staff(StaffData { name: format!("Staff {}", i + 1), lines: 5 }));
        }
        Self { score, last_base: None, last_sig: None }
    }

    /// Append `count` measures of `numerator/denominator`
    pub fn measures(self, count: usize, numerator: u32, denominator: u32) -> Self {
        let sig = TimeSig {
            track: 0,
            sig: TimeSigValue::new(numerator.max(1), denominator.max(1)),
            ts_type: TimeSigType::Normal,
            local: false,
            stretch: Fraction::from_integer(1),
            courtesy: false,
        };
        self.measures_with(count, sig)
    }

    /// Append measures under a fully specified signature (common time, cut time)
    pub fn measures_with(mut self, count: usize, sig: TimeSig) -> Self {
        for _ in 0..count {
            let first = self.score.first_measure().is_none();
            let changed = self.last_sig.as_ref().map_or(true, |last| !last.same_as(&sig));
            let root = self.score.root();
            let index = self.score.insert_index(root, &Element::Frame(FrameData { kind: FrameKind::VBox, size: 0.0 }));
            let measure = push_at(&mut self.score, root, index, Element::Measure(MeasureData::new(sig.sig)));
            let staves = self.score.nstaves();
            if first {
                let seg = self.segment(measure, SegmentType::Clef, Fraction::zero());
                for staff in 0..staves {
                    push(&mut self.score, seg, Element::Clef(ClefData { track: staff2track(staff), clef_type: ClefType::Treble }));
                }
            }
            if changed {
                let seg = self.segment(measure, SegmentType::TimeSig, Fraction::zero());
                for staff in 0..staves {
                    push(&mut self.score, seg, Element::TimeSig(sig.clone().with_track(staff2track(staff))));
                }
            }
            let seg = self.segment(measure, SegmentType::ChordRest, Fraction::zero());
            let len = sig.sig.duration();
            for staff in 0..staves {
                let rest = ChordRestData::new(staff2track(staff), TDuration::measure(), len);
                push(&mut self.score, seg, Element::Rest(rest));
            }
            self.last_sig = Some(sig.clone());
            self.last_base = Some(measure);
        }
        self
    }

    pub fn frame(mut self, kind: FrameKind) -> Self {
        let root = self.score.root();
        let element = Element::Frame(FrameData { kind, size: 10.0 });
        let index = self.score.insert_index(root, &element);
        self.last_base = Some(push_at(&mut self.score, root, index, element));
        self
    }

    /// Break after the measure or frame appended last
    pub fn layout_break(mut self, kind: LayoutBreakKind) -> Self {
        if let Some(base) = self.last_base {
            push(&mut self.score, base, Element::LayoutBreak(kind));
        }
        self
    }

    pub fn barline(mut self, barline: BarLineType) -> Self {
        if let Some(Element::Measure(m)) = self.last_base.and_then(|b| self.score.element_mut(b)) {
            m.end_barline = barline;
        }
        self
    }

    /// Replace the content of `track` in measure `measure_idx`
    pub fn voice(mut self, measure_idx: usize, track: usize, events: &[Event]) -> Self {
        let Some(measure) = self.score.measures().get(measure_idx).copied() else {
            log::warn!("builder: no measure {}", measure_idx);
            return self;
        };
        let Some(len) = self.score.measure_data(measure).map(|m| m.len) else {
            return self;
        };
        self.clear_track(measure, track);

        let mut rtick = Fraction::zero();
        for event in events {
            match event {
                Event::Chord(pitches, d) => {
                    let Some(dur) = d.fraction() else { continue };
                    if rtick + dur > len {
                        log::warn!("builder: event overflows measure {}", measure_idx);
                        break;
                    }
                    self.chord(measure, track, rtick, pitches, *d, dur, None);
                    rtick += dur;
                }
                Event::Rest(d) => {
                    let Some(dur) = d.fraction() else { continue };
                    if rtick + dur > len {
                        log::warn!("builder: event overflows measure {}", measure_idx);
                        break;
                    }
                    self.rest(measure, track, rtick, *d, dur, None);
                    rtick += dur;
                }
                Event::Tuplet { actual, normal, base, pitches } => {
                    let data = TupletData { track, actual: *actual, normal: *normal, base: *base };
                    let (Some(total), Some(base_len)) = (data.len(), base.fraction()) else { continue };
                    if rtick + total > len {
                        log::warn!("builder: tuplet overflows measure {}", measure_idx);
                        break;
                    }
                    let member = base_len * data.ratio();
                    let tuplet = push(&mut self.score, measure, Element::Tuplet(data));
                    for pitch in pitches {
                        self.chord(measure, track, rtick, &[*pitch], *base, member, Some(tuplet));
                        rtick += member;
                    }
                }
            }
        }

        if track % VOICES == 0 && rtick < len {
            if let Some(fill) = to_duration_list(len - rtick, 1) {
                for d in fill {
                    let Some(dur) = d.fraction() else { break };
                    self.rest(measure, track, rtick, d, dur, None);
                    rtick += dur;
                }
            }
        }
        self
    }

    /// Tie every note of the chord at `rtick` to the next chord
    pub fn tie(mut self, measure_idx: usize, track: usize, rtick: Fraction) -> Self {
        if let Some(chord) = self.chord_rest(measure_idx, track, rtick) {
            let notes: Vec<ElementId> = self.score.children(chord).to_vec();
            for note in notes {
                if let Some(Element::Note(n)) = self.score.element_mut(note) {
                    n.tie_forward = true;
                }
            }
        }
        self
    }

    pub fn annotation(mut self, measure_idx: usize, rtick: Fraction, track: usize, kind: AnnotationKind, text: &str) -> Self {
        let Some(measure) = self.score.measures().get(measure_idx).copied() else {
            return self;
        };
        let seg = self.segment(measure, SegmentType::ChordRest, rtick);
        push(&mut self.score, seg, Element::Annotation(AnnotationData { kind, track, text: text.to_string() }));
        self
    }

    /// Spanner between the chords/rests at (measure index, relative tick)
    pub fn spanner(mut self, kind: SpannerKind, track: usize, start: (usize, Fraction), end: (usize, Fraction)) -> Self {
        let (Some(s), Some(e)) = (self.abs_tick(start), self.abs_tick(end)) else {
            return self;
        };
        let data = SpannerData {
            kind,
            track,
            track2: track,
            tick: s,
            tick2: e,
            start_element: self.score.chord_rest_at(s, track),
            end_element: self.score.chord_rest_at(e, track),
        };
        let root = self.score.root();
        push(&mut self.score, root, Element::Spanner(data));
        self
    }

    pub fn build(self) -> Score {
        self.score
    }

    fn abs_tick(&self, (measure_idx, rtick): (usize, Fraction)) -> Option<Fraction> {
        let measure = self.score.measures().get(measure_idx).copied()?;
        Some(self.score.measure_tick(measure)? + rtick)
    }

    fn chord_rest(&self, measure_idx: usize, track: usize, rtick: Fraction) -> Option<ElementId> {
        self.score.chord_rest_at(self.abs_tick((measure_idx, rtick))?, track)
    }

    fn segment(&mut self, measure: ElementId, segment_type: SegmentType, rtick: Fraction) -> ElementId {
        if let Some(seg) = self.score.find_segment_r(measure, segment_type, rtick) {
            return seg;
        }
        push(&mut self.score, measure, Element::Segment(SegmentData { segment_type, rtick, x: 0.0 }))
    }

    #[allow(clippy::too_many_arguments)]
    fn chord(&mut self, measure: ElementId, track: usize, rtick: Fraction, pitches: &[u8], d: TDuration, dur: Fraction, tuplet: Option<ElementId>) {
        let seg = self.segment(measure, SegmentType::ChordRest, rtick);
        let mut data = ChordRestData::new(track, d, dur);
        data.tuplet = tuplet;
        let chord = push(&mut self.score, seg, Element::Chord(data));
        for pitch in pitches {
            push(&mut self.score, chord, Element::Note(NoteData { pitch: *pitch, tie_forward: false }));
        }
    }

    fn rest(&mut self, measure: ElementId, track: usize, rtick: Fraction, d: TDuration, dur: Fraction, tuplet: Option<ElementId>) {
        let seg = self.segment(measure, SegmentType::ChordRest, rtick);
        let mut data = ChordRestData::new(track, d, dur);
        data.tuplet = tuplet;
        push(&mut self.score, seg, Element::Rest(data));
    }

    fn clear_track(&mut self, measure: ElementId, track: usize) {
        for seg in self.score.segments(measure) {
            if let Some(cr) = self.score.segment_element(seg, track) {
                if self.score.kind(cr).map_or(false, |k| k.is_chord_rest()) {
                    self.score.detach_subtree(cr);
                }
            }
            if self.score.children(seg).is_empty() {
                self.score.detach_subtree(seg);
            }
        }
        for tuplet in self.score.tuplets(measure) {
            if self.score.element(tuplet).and_then(Element::track) == Some(track) {
                self.score.detach_subtree(tuplet);
            }
        }
    }
}

fn push(score: &mut Score, parent: ElementId, element: Element) -> ElementId {
    score.push_child(parent, element)
}

fn push_at(score: &mut Score, parent: ElementId, index: usize, element: Element) -> ElementId {
    let id = score.alloc_id();
    score.attach_subtree(vec![Node { id, parent: Some(parent), children: Vec::new(), element }], parent, index);
    id
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_measures_hold_measure_rests() {
        let score = ScoreBuilder::new(2).measures(2, 3, 4).build();
        let m = score.first_measure().unwrap();
        let rest = score.chord_rest_at(Fraction::zero(), 4).unwrap();
        let Some(Element::Rest(cr)) = score.element(rest) else { panic!("expected rest") };
        assert!(cr.duration_type.is_measure());
        assert_eq!(cr.duration, Fraction::new(3, 4));
        assert!(score.has_global_timesig(m));
        assert!(!score.has_global_timesig(score.next_measure(m).unwrap()));
    }

    #[test]
    fn test_voice_pads_with_rests() {
        let score = ScoreBuilder::new(1)
            .measures(1, 4, 4)
            .voice(0, 0, &[Event::note(60, DurationType::Quarter)])
            .build();
        let m = score.first_measure().unwrap();
        let crs = score.chord_rests_in_measure(m, 0);
        assert_eq!(crs.len(), 2);
        assert_eq!(score.kind(crs[1]), Some(ElementKind::Rest));
        assert_eq!(score.chord_rest_tick(crs[1]), Some(Fraction::new(1, 4)));
    }

    #[test]
    fn test_tuplet_members_share_handle() {
        let score = ScoreBuilder::new(1)
            .measures(1, 4, 4)
            .voice(0, 0, &[Event::tuplet(3, 2, DurationType::Half, &[60, 62, 64])])
            .build();
        let m = score.first_measure().unwrap();
        let tuplet = score.tuplets(m)[0];
        assert_eq!(score.tuplet_members(tuplet).len(), 3);
        let last = score.chord_rest_at(Fraction::new(2, 3), 0).unwrap();
        assert_eq!(score.element(last).and_then(Element::chord_rest).unwrap().tuplet, Some(tuplet));
    }

    #[test]
    fn test_spanner_resolves_endpoints() {
        let score = ScoreBuilder::new(1)
            .measures(2, 4, 4)
            .voice(0, 0, &[Event::note(60, DurationType::Whole)])
            .voice(1, 0, &[Event::note(62, DurationType::Whole)])
            .spanner(SpannerKind::Slur, 0, (0, Fraction::zero()), (1, Fraction::zero()))
            .build();
        let slur = score.spanners()[0];
        let start = score.chord_rest_at(Fraction::zero(), 0).unwrap();
        assert_eq!(score.spanners_referencing(start), vec![slur]);
    }
}
