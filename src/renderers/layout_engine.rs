//! Layout Engine - horizontal spacing, system and page breaking
//!
//! Takes the score graph, computes segment and measure positions, fills
//! systems greedily, breaks pages by height and finally regenerates the
//! courtesy signatures that depend on where systems end. All generated
//! nodes are discarded first, so a layout of the same graph always yields
//! the same graph and the same geometry.

use super::courtesy::add_courtesy_signatures;
use super::layout::*;
use crate::models::*;
use serde::{Deserialize, Serialize};

/// Configuration for layout calculations (staff spaces)
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct LayoutConfig {
    pub page_width: f64,
    pub page_height: f64,
    pub margin_left: f64,
    pub margin_right: f64,
    pub margin_top: f64,
    pub margin_bottom: f64,

    /// Height of one staff
    pub staff_height: f64,
    /// Gap between staves of one system
    pub staff_distance: f64,
    /// Gap between systems
    pub system_distance: f64,

    /// Space after a quarter note; other values scale with the square root
    pub note_distance: f64,
    pub min_note_distance: f64,

    pub clef_width: f64,
    pub timesig_width: f64,
    pub courtesy_width: f64,
    pub barline_width: f64,
    /// Clef and brace repeated at the start of every system
    pub system_header_width: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            page_width: 120.0,
            page_height: 170.0,
            margin_left: 8.0,
            margin_right: 8.0,
            margin_top: 8.0,
            margin_bottom: 8.0,
            staff_height: 4.0,
            staff_distance: 6.5,
            system_distance: 9.0,
            note_distance: 3.0,
            min_note_distance: 1.3,
            clef_width: 3.5,
            timesig_width: 3.0,
            courtesy_width: 3.5,
            barline_width: 1.0,
            system_header_width: 5.0,
        }
    }
}

impl LayoutConfig {
    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(text)
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn usable_width(&self) -> f64 {
        self.page_width - self.margin_left - self.margin_right
    }

    pub fn usable_height(&self) -> f64 {
        self.page_height - self.margin_top - self.margin_bottom
    }

    fn system_height(&self, nstaves: usize) -> f64 {
        let n = nstaves.max(1) as f64;
        n * self.staff_height + (n - 1.0) * self.staff_distance
    }
}

/// Part of the score whose horizontal spacing is recomputed
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum LayoutRegion {
    Whole,
    Ticks { start: Fraction, end: Fraction },
}

impl LayoutRegion {
    fn covers(&self, start: Fraction, end: Fraction) -> bool {
        match self {
            LayoutRegion::Whole => true,
            LayoutRegion::Ticks { start: s, end: e } => start < *e && end > *s,
        }
    }
}

/// Main layout engine
#[derive(Clone, Debug, Default)]
pub struct LayoutEngine {
    pub config: LayoutConfig,
}

enum Unit {
    Measure { id: ElementId, width: f64, courtesy: bool },
    HFrame { id: ElementId, width: f64 },
    VFrame { id: ElementId, height: f64 },
}

impl LayoutEngine {
    pub fn new(config: LayoutConfig) -> Self {
        Self { config }
    }

    /// Lay out the score. Horizontal spacing is recomputed for measures in
    /// `region`; breaking and courtesy signatures always cover the whole score.
    pub fn layout(&self, score: &mut Score, region: LayoutRegion) -> ScoreLayout {
        score.clear_generated();

        let units = self.measure_units(score, region);
        let layout = self.break_systems(score, &units);
        self.place_measures(score, &layout);

        let courtesy = add_courtesy_signatures(score, &layout);
        for seg in self.announce_segments(score) {
            let x = score
                .parent(seg)
                .and_then(|m| score.measure_data(m))
                .map(|d| d.width - self.config.barline_width - self.config.courtesy_width)
                .unwrap_or(0.0);
            if let Some(Element::Segment(sd)) = score.element_mut(seg) {
                sd.x = x.max(0.0);
            }
        }
        log::debug!(
            "layout: {} page(s), {} system(s), {} courtesy signature(s)",
            layout.page_count(),
            layout.system_count(),
            courtesy
        );
        layout
    }

    /// Space taken by a segment up to the next one
    fn segment_width(&self, segment_type: SegmentType, span: Fraction) -> f64 {
        match segment_type {
            SegmentType::Clef => self.config.clef_width,
            SegmentType::TimeSig => self.config.timesig_width,
            SegmentType::TimeSigAnnounce => 0.0,
            SegmentType::ChordRest => {
                let ratio = (span / Fraction::new(1, 4)).to_f64();
                (self.config.note_distance * ratio.sqrt()).max(self.config.min_note_distance)
            }
        }
    }

    /// Natural width of a measure; writes segment x when `write` is set
    fn space_measure(&self, score: &mut Score, measure: ElementId, write: bool) -> f64 {
        let Some(len) = score.measure_data(measure).map(|d| d.len) else {
            return 0.0;
        };
        let segments: Vec<(ElementId, SegmentType, Fraction)> = score
            .segments(measure)
            .into_iter()
            .filter_map(|s| score.segment_data(s).map(|d| (s, d.segment_type, d.rtick)))
            .collect();

        let mut x = 0.0;
        for (i, (seg, segment_type, rtick)) in segments.iter().enumerate() {
            let next_tick = segments[i + 1..]
                .iter()
                .find(|(_, t, r)| *t == SegmentType::ChordRest && r > rtick)
                .map(|(_, _, r)| *r)
                .unwrap_or(len);
            if write {
                if let Some(Element::Segment(sd)) = score.element_mut(*seg) {
                    sd.x = x;
                }
            }
            x += self.segment_width(*segment_type, next_tick - *rtick);
        }
        x + self.config.barline_width
    }

    fn measure_units(&self, score: &mut Score, region: LayoutRegion) -> Vec<Unit> {
        let starts: Vec<(ElementId, Fraction)> = score.measure_ticks();
        let mut units = Vec::new();
        for base in score.measure_bases() {
            match score.element(base).cloned() {
                Some(Element::Measure(md)) => {
                    let start = starts.iter().find(|(m, _)| *m == base).map(|(_, t)| *t).unwrap_or_default();
                    let write = region.covers(start, start + md.len);
                    let width = self.space_measure(score, base, write);
                    let courtesy = score
                        .next_measure(base)
                        .map_or(false, |n| score.find_segment_r(n, SegmentType::TimeSig, Fraction::zero()).is_some());
                    units.push(Unit::Measure { id: base, width, courtesy });
                }
                Some(Element::Frame(fd)) => match fd.kind {
                    FrameKind::HBox => units.push(Unit::HFrame { id: base, width: fd.size }),
                    FrameKind::VBox | FrameKind::TBox => units.push(Unit::VFrame { id: base, height: fd.size }),
                },
                _ => {}
            }
        }
        units
    }

    fn break_systems(&self, score: &Score, units: &[Unit]) -> ScoreLayout {
        let cfg = &self.config;
        let usable = cfg.usable_width();
        let system_height = cfg.system_height(score.nstaves());

        let mut systems: Vec<(SystemLayout, bool)> = Vec::new();
        let mut current = SystemLayout { height: system_height, ..Default::default() };
        let mut x = cfg.system_header_width;
        let mut page_break_after: Vec<bool> = Vec::new();

        let finish = |current: &mut SystemLayout, x: &mut f64, justify: bool, page_break: bool, systems: &mut Vec<(SystemLayout, bool)>, breaks: &mut Vec<bool>| {
            if current.items.is_empty() {
                if page_break {
                    if let Some(last) = breaks.last_mut() {
                        *last = true;
                    }
                }
                return;
            }
            current.width = *x;
            let done = std::mem::replace(current, SystemLayout { height: system_height, ..Default::default() });
            systems.push((done, justify));
            breaks.push(page_break);
            *x = cfg.system_header_width;
        };

        for unit in units {
            match unit {
                Unit::VFrame { id, height } => {
                    finish(&mut current, &mut x, true, false, &mut systems, &mut page_break_after);
                    let frame = SystemLayout {
                        height: *height,
                        width: usable,
                        is_frame: true,
                        items: vec![PlacedItem { id: *id, x: 0.0, width: usable }],
                        ..Default::default()
                    };
                    systems.push((frame, false));
                    page_break_after.push(score.has_layout_break(*id, LayoutBreakKind::Page));
                }
                Unit::Measure { id, width, .. } | Unit::HFrame { id, width } => {
                    let reserve = match unit {
                        Unit::Measure { courtesy: true, .. } => cfg.courtesy_width,
                        _ => 0.0,
                    };
                    if !current.items.is_empty() && x + width + reserve > usable {
                        finish(&mut current, &mut x, true, false, &mut systems, &mut page_break_after);
                    }
                    current.items.push(PlacedItem { id: *id, x, width: *width });
                    x += width;

                    let breaks = score.layout_breaks(*id);
                    if breaks.contains(&LayoutBreakKind::Section) {
                        finish(&mut current, &mut x, false, breaks.contains(&LayoutBreakKind::Page), &mut systems, &mut page_break_after);
                    } else if breaks.contains(&LayoutBreakKind::Page) {
                        finish(&mut current, &mut x, true, true, &mut systems, &mut page_break_after);
                    } else if breaks.contains(&LayoutBreakKind::Line) {
                        finish(&mut current, &mut x, true, false, &mut systems, &mut page_break_after);
                    }
                }
            }
            if let Unit::VFrame { id, .. } = unit {
                if score.has_layout_break(*id, LayoutBreakKind::Section) {
                    // a section ending in a frame leaves the previous system ragged
                    if let Some(pos) = systems.iter().rposition(|(s, _)| !s.is_frame) {
                        systems[pos].1 = false;
                    }
                }
            }
        }
        finish(&mut current, &mut x, false, false, &mut systems, &mut page_break_after);

        // stretch to full width
        for (system, justify) in systems.iter_mut() {
            if system.is_frame {
                continue;
            }
            let natural: f64 = system.items.iter().map(|i| i.width).sum();
            let target = usable - cfg.system_header_width;
            if *justify && natural > 0.0 && natural < target {
                let factor = target / natural;
                let mut x = cfg.system_header_width;
                for item in system.items.iter_mut() {
                    item.x = x;
                    item.width *= factor;
                    x += item.width;
                }
                system.width = x;
                system.justified = true;
            }
        }

        // pages
        let mut pages = vec![PageLayout::default()];
        let mut y = cfg.margin_top;
        let bottom = cfg.page_height - cfg.margin_bottom;
        for ((mut system, _), page_break) in systems.into_iter().zip(page_break_after) {
            let page_empty = pages.last().map_or(true, |p| p.systems.is_empty());
            if !page_empty && y + system.height > bottom {
                pages.push(PageLayout::default());
                y = cfg.margin_top;
            }
            system.y = y;
            y += system.height + cfg.system_distance;
            if let Some(page) = pages.last_mut() {
                page.systems.push(system);
            }
            if page_break {
                pages.push(PageLayout::default());
                y = cfg.margin_top;
            }
        }
        if pages.len() > 1 && pages.last().map_or(false, |p| p.systems.is_empty()) {
            pages.pop();
        }
        ScoreLayout { pages }
    }

    /// Store final x and width of every measure
    fn place_measures(&self, score: &mut Score, layout: &ScoreLayout) {
        for system in layout.systems() {
            for item in &system.items {
                if let Some(Element::Measure(md)) = score.element_mut(item.id) {
                    md.x = item.x;
                    md.width = item.width;
                }
            }
        }
    }

    fn announce_segments(&self, score: &Score) -> Vec<ElementId> {
        score
            .measures()
            .into_iter()
            .flat_map(|m| score.segments(m))
            .filter(|s| score.segment_data(*s).map_or(false, |d| d.segment_type == SegmentType::TimeSigAnnounce))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_yaml_partial() {
        let cfg = LayoutConfig::from_yaml("page_width: 200.0\nnote_distance: 4.0\n").unwrap();
        assert_eq!(cfg.page_width, 200.0);
        assert_eq!(cfg.note_distance, 4.0);
        assert_eq!(cfg.staff_height, LayoutConfig::default().staff_height);
    }

    #[test]
    fn test_config_from_json() {
        let cfg = LayoutConfig::from_json("{\"margin_left\": 2.0}").unwrap();
        assert_eq!(cfg.margin_left, 2.0);
        assert!(LayoutConfig::from_json("{\"margin_left\": \"wide\"}").is_err());
    }

    #[test]
    fn test_forced_line_break_ends_system() {
        let mut score = ScoreBuilder::new(1)
            .measures(1, 4, 4)
            .layout_break(LayoutBreakKind::Line)
            .measures(1, 4, 4)
            .build();
        let layout = LayoutEngine::default().layout(&mut score, LayoutRegion::Whole);
        assert_eq!(layout.system_count(), 2);
        let first = layout.systems().next().unwrap();
        assert!(first.justified);
    }

    #[test]
    fn test_many_measures_wrap_and_paginate() {
        let mut score = ScoreBuilder::new(2).measures(120, 4, 4).build();
        let layout = LayoutEngine::default().layout(&mut score, LayoutRegion::Whole);
        assert!(layout.system_count() > 1);
        assert!(layout.page_count() > 1);
        let usable = LayoutConfig::default().usable_width();
        for system in layout.systems() {
            assert!(system.width <= usable + 1e-9);
        }
    }

    #[test]
    fn test_layout_is_idempotent() {
        let mut score = ScoreBuilder::new(1)
            .measures(2, 4, 4)
            .layout_break(LayoutBreakKind::Line)
            .measures(2, 3, 4)
            .build();
        let engine = LayoutEngine::default();
        let first = engine.layout(&mut score, LayoutRegion::Whole);
        let snapshot = score.clone();
        let second = engine.layout(&mut score, LayoutRegion::Whole);
        assert_eq!(first, second);
        assert_eq!(score, snapshot);
    }

    #[test]
    fn test_segment_x_increases() {
        let mut score = ScoreBuilder::new(1)
            .measures(1, 4, 4)
            .voice(0, 0, &[Event::note(60, DurationType::Quarter), Event::note(62, DurationType::Half)])
            .build();
        LayoutEngine::default().layout(&mut score, LayoutRegion::Whole);
        let m = score.first_measure().unwrap();
        let xs: Vec<f64> = score.segments(m).iter().map(|s| score.segment_data(*s).unwrap().x).collect();
        assert!(xs.windows(2).all(|w| w[0] < w[1]));
    }
}
