//! Spanner diagnostics - detects dangling, stale and inverted spanners
//!
//! A spanner is healthy when both handles resolve to a chord or rest that
//! still starts at the stored tick on the stored track, and the end does not
//! precede the start.

use crate::models::{Element, Score, SpannerData, SpannerKind};
use crate::rewrite::spanners::tremolo_fits;

use super::{DiagnosticMark, DiagnosticSeverity};

/// Check every spanner of the score
pub fn analyze_spanners(score: &Score) -> Vec<DiagnosticMark> {
    let mut marks = Vec::new();

    for id in score.spanners() {
        let Some(data) = score.element(id).and_then(Element::as_spanner) else {
            continue;
        };
        let mark = |severity, kind: &str, message: String| {
            DiagnosticMark::new(id, data.tick, data.track, severity, kind, message).with_end(data.tick2)
        };

        if data.tick2 < data.tick {
            marks.push(mark(
                DiagnosticSeverity::Error,
                "spanner_inverted",
                format!("{} ends at {} before it starts at {}", data.kind.name(), data.tick2, data.tick),
            ));
        }

        let start_ok = endpoint_ok(score, data, true);
        let end_ok = endpoint_ok(score, data, false);
        if !start_ok {
            marks.push(mark(
                DiagnosticSeverity::Error,
                "spanner_dangling_start",
                format!("{} start does not resolve at {} track {}", data.kind.name(), data.tick, data.track),
            ));
        }
        if !end_ok {
            marks.push(mark(
                DiagnosticSeverity::Error,
                "spanner_dangling_end",
                format!("{} end does not resolve at {} track {}", data.kind.name(), data.tick2, data.track2),
            ));
        }

        if data.kind == SpannerKind::Tremolo && start_ok && end_ok {
            if let (Some(a), Some(b)) = (data.start_element, data.end_element) {
                if !tremolo_fits(score, a, b) {
                    marks.push(mark(
                        DiagnosticSeverity::Warning,
                        "tremolo_not_adjacent",
                        "Tremolo chords are not adjacent equal chords in one measure".to_string(),
                    ));
                }
            }
        }
    }

    marks
}

fn endpoint_ok(score: &Score, data: &SpannerData, start: bool) -> bool {
    let (handle, tick, track) = if start {
        (data.start_element, data.tick, data.track)
    } else {
        (data.end_element, data.tick2, data.track2)
    };
    let Some(el) = handle else {
        return false;
    };
    let live = score
        .element(el)
        .and_then(Element::chord_rest)
        .map_or(false, |cr| cr.track == track);
    live && score.chord_rest_tick(el) == Some(tick)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::*;

    fn slurred() -> Score {
        ScoreBuilder::new(1)
            .measures(2, 4, 4)
            .voice(0, 0, &[Event::note(60, DurationType::Half), Event::note(62, DurationType::Half)])
            .spanner(SpannerKind::Slur, 0, (0, Fraction::zero()), (0, Fraction::new(1, 2)))
            .build()
    }

    #[test]
    fn test_matched_slur() {
        assert!(analyze_spanners(&slurred()).is_empty());
    }

    #[test]
    fn test_dangling_end() {
        let mut score = slurred();
        let end = score.chord_rest_at(Fraction::new(1, 2), 0).unwrap();
        score.detach_subtree(end);
        let marks = analyze_spanners(&score);
        assert_eq!(marks.len(), 1);
        assert_eq!(marks[0].kind, "spanner_dangling_end");
    }

    #[test]
    fn test_inverted() {
        let mut score = slurred();
        let slur = score.spanners()[0];
        if let Some(Element::Spanner(s)) = score.element_mut(slur) {
            std::mem::swap(&mut s.tick, &mut s.tick2);
            std::mem::swap(&mut s.start_element, &mut s.end_element);
        }
        let kinds: Vec<String> = analyze_spanners(&score).into_iter().map(|m| m.kind).collect();
        assert_eq!(kinds, vec!["spanner_inverted".to_string()]);
    }

    #[test]
    fn test_tremolo_across_barline_is_flagged() {
        let score = ScoreBuilder::new(1)
            .measures(2, 4, 4)
            .voice(0, 0, &[Event::dotted(60, DurationType::Half), Event::note(62, DurationType::Quarter)])
            .voice(1, 0, &[Event::note(64, DurationType::Quarter)])
            .spanner(SpannerKind::Tremolo, 0, (0, Fraction::new(3, 4)), (1, Fraction::zero()))
            .build();
        let marks = analyze_spanners(&score);
        assert_eq!(marks.len(), 1);
        assert_eq!(marks[0].severity, DiagnosticSeverity::Warning);
    }
}
