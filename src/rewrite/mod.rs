//! Score rewriting for time-signature changes
//!
//! `add_time_sig` classifies the change (nothing to do, display re-tag,
//! staff-local signature or full rewrite) and runs it through an
//! [`EditContext`]. A full rewrite is planned on a read-only view first, so a
//! rejected edit never leaves a partial change behind.

mod plan;
pub mod spanners;

use crate::errors::{EngravingError, Result};
use crate::models::*;
use crate::undo::EditContext;
use plan::{find_range, plan_rewrite, Plan, Range};
use std::collections::HashMap;

/// What a signature change did to the score
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewriteOutcome {
    /// The signature was already in effect
    Unchanged,
    /// Same bar length; only signature elements and nominal values changed
    Retagged { measures: usize },
    /// Staff-local signature placed, no content touched
    Local,
    /// Measures rebuilt
    Rewritten { removed: usize, created: usize, spanners_removed: usize },
}

/// Place `timesig` at `measure`; global unless `local`, in which case only
/// staff `staff_idx` gets it
pub fn add_time_sig(
    ctx: &mut EditContext<'_>,
    measure: ElementId,
    staff_idx: usize,
    timesig: TimeSig,
    local: bool,
) -> Result<RewriteOutcome> {
    let score = ctx.score();
    let nominal = score
        .measure_data(measure)
        .map(|m| m.timesig)
        .ok_or(EngravingError::InvalidReference(measure))?;
    if staff_idx >= score.nstaves() {
        return Err(EngravingError::RewriteRejected(format!("no staff {}", staff_idx)));
    }
    // validates the display type against the value
    let timesig = TimeSig::new(timesig.sig, timesig.ts_type)?;

    if local {
        return add_local(ctx, measure, staff_idx, timesig, nominal);
    }

    let current = effective_timesig(score, measure, 0);
    let explicit = score.has_global_timesig(measure);
    if current.same_as(&timesig) && (explicit || score.prev_measure(measure).is_some()) {
        log::debug!("time signature {} already in effect", timesig.sig);
        return Ok(RewriteOutcome::Unchanged);
    }

    let range = find_range(score, measure)?;
    let restore = restore_target(score, &range, &current);

    if timesig.sig.duration() == nominal.duration()
        && range.measures.iter().all(|m| score.measure_data(*m).map_or(false, |d| d.timesig.duration() == nominal.duration()))
    {
        let outcome = retag(ctx, &range, Some(&timesig), timesig.sig)?;
        restore_signature(ctx, restore, &current)?;
        log::info!("re-tagged {} measure(s) as {}", range.measures.len(), timesig.sig);
        return Ok(outcome);
    }

    let plan = plan_rewrite(ctx.score(), range, timesig.sig).map_err(|e| {
        log::warn!("{}", e);
        e
    })?;
    let outcome = apply(ctx, plan, Some(&timesig))?;
    restore_signature(ctx, restore, &current)?;
    log::info!("rewrote measures to {}: {:?}", timesig.sig, outcome);
    Ok(outcome)
}

/// Remove the signature at `measure` so the preceding one continues
pub fn remove_time_sig(ctx: &mut EditContext<'_>, measure: ElementId) -> Result<RewriteOutcome> {
    let score = ctx.score();
    let prev = score.prev_measure(measure).ok_or_else(|| {
        EngravingError::RewriteRejected("the first time signature cannot be removed".to_string())
    })?;
    let Some(segment) = score.find_segment_r(measure, SegmentType::TimeSig, Fraction::zero()) else {
        return Ok(RewriteOutcome::Unchanged);
    };
    let previous = effective_timesig(score, prev, 0);
    let removed = effective_timesig(score, measure, 0);
    let nominal = score
        .measure_data(measure)
        .map(|m| m.timesig)
        .ok_or(EngravingError::InvalidReference(measure))?;

    let range = find_range(score, measure)?;
    let restore = restore_target(score, &range, &removed);

    let outcome = if previous.sig.duration() == nominal.duration() {
        ctx.remove(segment)?;
        retag(ctx, &range, None, previous.sig)?
    } else {
        let plan = plan_rewrite(ctx.score(), range, previous.sig)?;
        apply(ctx, plan, None)?
    };
    restore_signature(ctx, restore, &removed)?;
    log::info!("removed time signature {}, {} continues", removed.sig, previous.sig);
    Ok(outcome)
}

/// Add the break if absent, remove it otherwise; returns whether it is now set
pub fn toggle_layout_break(ctx: &mut EditContext<'_>, measure_base: ElementId, kind: LayoutBreakKind) -> Result<bool> {
    let score = ctx.score();
    if !score.kind(measure_base).map_or(false, |k| k.is_measure_base()) {
        return Err(EngravingError::InvalidReference(measure_base));
    }
    let existing = score
        .children(measure_base)
        .iter()
        .copied()
        .find(|c| score.element(*c) == Some(&Element::LayoutBreak(kind)));
    match existing {
        Some(id) => {
            ctx.remove(id)?;
            Ok(false)
        }
        None => {
            ctx.add(measure_base, Element::LayoutBreak(kind))?;
            Ok(true)
        }
    }
}

/// Signature in effect on a staff, falling back to the measure's nominal value
fn effective_timesig(score: &Score, measure: ElementId, staff_idx: usize) -> TimeSig {
    score.timesig_at(measure, staff_idx).cloned().unwrap_or_else(|| {
        let sig = score.measure_data(measure).map(|m| m.timesig).unwrap_or_default();
        TimeSig {
            track: 0,
            sig,
            ts_type: TimeSigType::Normal,
            local: false,
            stretch: Fraction::from_integer(1),
            courtesy: false,
        }
    })
}

/// Measure after a section boundary that needs the old signature restated
fn restore_target(score: &Score, range: &Range, current: &TimeSig) -> Option<ElementId> {
    let next = range.next_in_section?;
    if score.has_global_timesig(next) {
        return None;
    }
    let nominal = score.measure_data(next)?.timesig;
    nominal.identical(&current.sig).then_some(next)
}

fn restore_signature(ctx: &mut EditContext<'_>, target: Option<ElementId>, old: &TimeSig) -> Result<()> {
    let Some(measure) = target else {
        return Ok(());
    };
    log::debug!("restating {} after section break", old.sig);
    set_global_timesig(ctx, measure, old)
}

/// Put `timesig` on every staff of `measure`
fn set_global_timesig(ctx: &mut EditContext<'_>, measure: ElementId, timesig: &TimeSig) -> Result<()> {
    let segment = segment_for(ctx, measure, SegmentType::TimeSig, Fraction::zero())?;
    for staff in 0..ctx.score().nstaves() {
        let track = staff2track(staff);
        let mut ts = timesig.clone().with_track(track);
        ts.local = false;
        ts.courtesy = false;
        ts.stretch = Fraction::from_integer(1);
        match ctx.score().segment_element(segment, track) {
            Some(existing) => ctx.change(existing, Element::TimeSig(ts))?,
            None => {
                ctx.add(segment, Element::TimeSig(ts))?;
            }
        }
    }
    Ok(())
}

fn segment_for(ctx: &mut EditContext<'_>, measure: ElementId, segment_type: SegmentType, rtick: Fraction) -> Result<ElementId> {
    match ctx.score().find_segment_r(measure, segment_type, rtick) {
        Some(seg) => Ok(seg),
        None => ctx.add(measure, Element::Segment(SegmentData { segment_type, rtick, x: 0.0 })),
    }
}

fn add_local(ctx: &mut EditContext<'_>, measure: ElementId, staff_idx: usize, timesig: TimeSig, nominal: TimeSigValue) -> Result<RewriteOutcome> {
    let track = staff2track(staff_idx);
    let current = effective_timesig(ctx.score(), measure, staff_idx);
    if current.local && current.same_as(&timesig) {
        return Ok(RewriteOutcome::Unchanged);
    }
    let mut ts = timesig.with_track(track);
    ts.local = true;
    ts.stretch = nominal.duration() / ts.sig.duration();

    let segment = segment_for(ctx, measure, SegmentType::TimeSig, Fraction::zero())?;
    match ctx.score().segment_element(segment, track) {
        Some(existing) => ctx.change(existing, Element::TimeSig(ts))?,
        None => {
            ctx.add(segment, Element::TimeSig(ts))?;
        }
    }
    log::info!("local time signature on staff {}", staff_idx);
    Ok(RewriteOutcome::Local)
}

fn retag(ctx: &mut EditContext<'_>, range: &Range, timesig: Option<&TimeSig>, sig: TimeSigValue) -> Result<RewriteOutcome> {
    for m in &range.measures {
        ctx.modify(*m, |e| {
            if let Element::Measure(md) = e {
                md.timesig = sig;
            }
        })?;
    }
    if let (Some(ts), Some(first)) = (timesig, range.measures.first()) {
        set_global_timesig(ctx, *first, ts)?;
    }
    Ok(RewriteOutcome::Retagged { measures: range.measures.len() })
}

fn apply(ctx: &mut EditContext<'_>, plan: Plan, timesig: Option<&TimeSig>) -> Result<RewriteOutcome> {
    let root = ctx.score().root();
    let insert_at = ctx
        .score()
        .children(root)
        .iter()
        .position(|c| Some(c) == plan.range.items.first())
        .ok_or(EngravingError::InvalidReference(root))?;
    let old_end = plan.range.end;
    let delta = plan.new_end() - old_end;

    let mut frames: HashMap<ElementId, Vec<Node>> = HashMap::new();
    for item in &plan.range.items {
        let nodes = ctx.remove(*item)?;
        if nodes.first().map_or(false, |n| n.element.kind() == ElementKind::Frame) {
            frames.insert(*item, nodes);
        }
    }

    let mut index = insert_at;
    for (k, nm) in plan.measures.iter().enumerate() {
        let data = MeasureData {
            timesig: plan.sig,
            len: plan.measure_len,
            end_barline: nm.barline,
            x: 0.0,
            width: 0.0,
        };
        let measure = ctx.add_at(root, index, Element::Measure(data))?;
        index += 1;

        if let (0, Some(ts)) = (k, timesig) {
            set_global_timesig(ctx, measure, ts)?;
        }
        for (rtick, clef) in &nm.clefs {
            let seg = segment_for(ctx, measure, SegmentType::Clef, *rtick)?;
            ctx.add(seg, Element::Clef(clef.clone()))?;
        }
        let mut tuplets = Vec::with_capacity(nm.tuplets.len());
        for t in &nm.tuplets {
            tuplets.push(ctx.add(measure, Element::Tuplet(t.clone()))?);
        }
        for cr in &nm.chord_rests {
            let seg = segment_for(ctx, measure, SegmentType::ChordRest, cr.rtick)?;
            let mut data = ChordRestData::new(cr.track, cr.duration_type, cr.duration);
            data.tuplet = cr.tuplet.and_then(|i| tuplets.get(i).copied());
            match &cr.notes {
                Some(notes) => {
                    let chord = ctx.add(seg, Element::Chord(data))?;
                    for n in notes {
                        ctx.add(chord, Element::Note(n.clone()))?;
                    }
                }
                None => {
                    ctx.add(seg, Element::Rest(data))?;
                }
            }
        }
        for (rtick, annotation) in &nm.annotations {
            let seg = segment_for(ctx, measure, SegmentType::ChordRest, *rtick)?;
            ctx.add(seg, Element::Annotation(annotation.clone()))?;
        }
        for kind in &nm.breaks {
            ctx.add(measure, Element::LayoutBreak(*kind))?;
        }
        for frame in &nm.frames_after {
            if let Some(nodes) = frames.remove(frame) {
                ctx.add_subtree(root, index, nodes)?;
                index += 1;
            }
        }
    }

    let report = spanners::repair_spanners(ctx, old_end, delta)?;
    Ok(RewriteOutcome::Rewritten {
        removed: plan.range.measures.len(),
        created: plan.measures.len(),
        spanners_removed: report.removed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::undo::Command;

    fn run<F>(score: &mut Score, f: F) -> (Result<RewriteOutcome>, Command)
    where
        F: FnOnce(&mut EditContext<'_>) -> Result<RewriteOutcome>,
    {
        let mut cmd = Command::new("test", score);
        let result = f(&mut EditContext::new(score, &mut cmd));
        (result, cmd)
    }

    #[test]
    fn test_same_signature_is_noop() {
        let mut score = ScoreBuilder::new(1).measures(3, 4, 4).build();
        let m = score.measures()[1];
        let (result, cmd) = run(&mut score, |ctx| add_time_sig(ctx, m, 0, TimeSig::normal(4, 4).unwrap(), false));
        assert_eq!(result.unwrap(), RewriteOutcome::Unchanged);
        assert!(cmd.is_empty());
    }

    #[test]
    fn test_alla_breve_retag_keeps_ticks() {
        let mut score = ScoreBuilder::new(1)
            .measures(2, 4, 4)
            .voice(0, 0, &[Event::note(60, DurationType::Half), Event::note(62, DurationType::Half)])
            .build();
        let m = score.first_measure().unwrap();
        let ts = TimeSig::new(TimeSigValue::new(2, 2), TimeSigType::AllaBreve).unwrap();
        let (result, _) = run(&mut score, |ctx| add_time_sig(ctx, m, 0, ts, false));
        assert_eq!(result.unwrap(), RewriteOutcome::Retagged { measures: 2 });
        assert_eq!(score.measures().len(), 2);
        let second = score.chord_rest_at(Fraction::new(1, 2), 0).unwrap();
        assert_eq!(score.kind(second), Some(ElementKind::Chord));
        let ts = score.timesig_at(m, 0).unwrap();
        assert_eq!(ts.ts_type, TimeSigType::AllaBreve);
    }

    #[test]
    fn test_rewrite_to_three_four() {
        let mut score = ScoreBuilder::new(1).measures(4, 4, 4).build();
        let m = score.measures()[1];
        let (result, _) = run(&mut score, |ctx| add_time_sig(ctx, m, 0, TimeSig::normal(3, 4).unwrap(), false));
        assert_eq!(
            result.unwrap(),
            RewriteOutcome::Rewritten { removed: 3, created: 4, spanners_removed: 0 }
        );
        let measures = score.measures();
        assert_eq!(measures.len(), 5);
        assert_eq!(score.measure_data(measures[1]).unwrap().len, Fraction::new(3, 4));
        assert!(score.has_global_timesig(measures[1]));
        assert!(!score.has_global_timesig(measures[2]));
    }

    #[test]
    fn test_rejected_rewrite_leaves_score_untouched() {
        let mut score = ScoreBuilder::new(1)
            .measures(2, 4, 4)
            .voice(0, 0, &[Event::tuplet(3, 2, DurationType::Half, &[60, 62, 64])])
            .build();
        let before = score.clone();
        let m = score.first_measure().unwrap();
        let (result, cmd) = run(&mut score, |ctx| add_time_sig(ctx, m, 0, TimeSig::normal(3, 4).unwrap(), false));
        assert!(matches!(result, Err(EngravingError::RewriteRejected(_))));
        assert!(cmd.is_empty());
        assert_eq!(score, before);
    }

    #[test]
    fn test_local_signature_sets_stretch() {
        let mut score = ScoreBuilder::new(2).measures(3, 4, 4).build();
        let m = score.first_measure().unwrap();
        let (result, _) = run(&mut score, |ctx| add_time_sig(ctx, m, 1, TimeSig::normal(2, 4).unwrap(), true));
        assert_eq!(result.unwrap(), RewriteOutcome::Local);
        let ts = score.timesig_at(m, 1).unwrap();
        assert!(ts.local);
        assert_eq!(ts.stretch, Fraction::from_integer(2));
        assert_eq!(score.timesig_at(m, 0).unwrap().sig, TimeSigValue::new(4, 4));
        assert_eq!(score.measure_data(m).unwrap().len, Fraction::from_integer(1));
    }

    #[test]
    fn test_remove_first_signature_rejected() {
        let mut score = ScoreBuilder::new(1).measures(2, 4, 4).build();
        let m = score.first_measure().unwrap();
        let (result, _) = run(&mut score, |ctx| remove_time_sig(ctx, m));
        assert!(matches!(result, Err(EngravingError::RewriteRejected(_))));
    }

    #[test]
    fn test_remove_signature_rewrites_back() {
        let mut score = ScoreBuilder::new(1).measures(2, 4, 4).measures(3, 3, 4).build();
        let m = score.measures()[2];
        let (result, _) = run(&mut score, |ctx| remove_time_sig(ctx, m));
        assert!(matches!(result.unwrap(), RewriteOutcome::Rewritten { created: 3, .. }));
        for measure in score.measures() {
            assert_eq!(score.measure_data(measure).unwrap().timesig, TimeSigValue::new(4, 4));
        }
        assert!(!score.has_global_timesig(score.measures()[2]));
    }

    #[test]
    fn test_toggle_layout_break() {
        let mut score = ScoreBuilder::new(1).measures(2, 4, 4).build();
        let m = score.first_measure().unwrap();
        let mut cmd = Command::new("break", &score);
        let mut ctx = EditContext::new(&mut score, &mut cmd);
        assert!(toggle_layout_break(&mut ctx, m, LayoutBreakKind::Line).unwrap());
        assert!(!toggle_layout_break(&mut ctx, m, LayoutBreakKind::Line).unwrap());
        assert!(score.layout_breaks(m).is_empty());
    }
}
