//! Spanner repair after measures were rebuilt
//!
//! Endpoints are stored as absolute ticks plus weak element handles. After a
//! rewrite the ticks behind the range shift and the handles inside it point
//! to removed elements, so every spanner is resolved again by (track, tick).

use crate::errors::Result;
use crate::models::*;
use crate::undo::EditContext;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SpannerReport {
    pub updated: usize,
    pub removed: usize,
}

/// Re-resolve every spanner; ticks at or after `old_end` move by `delta`
pub(crate) fn repair_spanners(ctx: &mut EditContext<'_>, old_end: Fraction, delta: Fraction) -> Result<SpannerReport> {
    let mut report = SpannerReport::default();
    let shift = |t: Fraction| if t >= old_end { t + delta } else { t };

    for spanner in ctx.score().spanners() {
        let Some(old) = ctx.score().element(spanner).and_then(Element::as_spanner).cloned() else {
            continue;
        };
        let mut new = old.clone();
        new.tick = shift(old.tick);
        new.tick2 = shift(old.tick2);
        new.start_element = ctx.score().chord_rest_at(new.tick, new.track);
        new.end_element = ctx.score().chord_rest_at(new.tick2, new.track2);

        let keep = match (new.start_element, new.end_element) {
            (Some(a), Some(b)) => new.kind != SpannerKind::Tremolo || tremolo_fits(ctx.score(), a, b),
            _ => false,
        };
        if !keep {
            log::warn!("removing {} at {} after rewrite", old.kind.name(), old.tick);
            ctx.remove(spanner)?;
            report.removed += 1;
        } else if new != old {
            ctx.change(spanner, Element::Spanner(new))?;
            report.updated += 1;
        }
    }
    Ok(report)
}

/// A two-chord tremolo needs two equal, adjacent chords in one measure
pub fn tremolo_fits(score: &Score, first: ElementId, second: ElementId) -> bool {
    let (Some(Element::Chord(a)), Some(Element::Chord(b))) = (score.element(first), score.element(second)) else {
        return false;
    };
    let same_measure = score.ancestor_of_kind(first, ElementKind::Measure).is_some()
        && score.ancestor_of_kind(first, ElementKind::Measure) == score.ancestor_of_kind(second, ElementKind::Measure);
    let adjacent = match (score.chord_rest_tick(first), score.chord_rest_tick(second)) {
        (Some(t1), Some(t2)) => t1 + a.duration == t2,
        _ => false,
    };
    same_measure && adjacent && a.duration == b.duration
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tremolo_fits_adjacent_pair() {
        let score = ScoreBuilder::new(1)
            .measures(1, 4, 4)
            .voice(0, 0, &[Event::note(60, DurationType::Half), Event::note(64, DurationType::Half)])
            .build();
        let a = score.chord_rest_at(Fraction::zero(), 0).unwrap();
        let b = score.chord_rest_at(Fraction::new(1, 2), 0).unwrap();
        assert!(tremolo_fits(&score, a, b));
        assert!(!tremolo_fits(&score, b, a));
    }

    #[test]
    fn test_tremolo_rejects_rests_and_cross_measure() {
        let score = ScoreBuilder::new(1)
            .measures(2, 4, 4)
            .voice(0, 0, &[Event::rest(DurationType::Half), Event::note(60, DurationType::Half)])
            .voice(1, 0, &[Event::note(60, DurationType::Half)])
            .build();
        let rest = score.chord_rest_at(Fraction::zero(), 0).unwrap();
        let a = score.chord_rest_at(Fraction::new(1, 2), 0).unwrap();
        let b = score.chord_rest_at(Fraction::new(1, 1), 0).unwrap();
        assert!(!tremolo_fits(&score, rest, a));
        assert!(!tremolo_fits(&score, a, b));
    }
}
