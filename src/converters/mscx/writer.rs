//! Canonical `.mscx` writer
//!
//! Output depends only on the authored content of the graph: ids, layout
//! caches and layout-generated nodes are never written, and every value has
//! exactly one textual form. Saving a loaded file reproduces it byte for byte.

use crate::models::*;
use quick_xml::escape::escape;
use std::collections::HashMap;

pub const MSCX_VERSION: &str = "4.00";

/// Indenting XML string builder
struct MscxBuilder {
    buffer: String,
    depth: usize,
}

impl MscxBuilder {
    fn new() -> Self {
        Self { buffer: String::new(), depth: 0 }
    }

    fn indent(&mut self) {
        for _ in 0..self.depth {
            self.buffer.push_str("  ");
        }
    }

    fn tag(&mut self, name: &str, attrs: &[(&str, String)]) {
        self.buffer.push('<');
        self.buffer.push_str(name);
        for (key, value) in attrs {
            self.buffer.push_str(&format!(" {}=\"{}\"", key, escape(value.as_str())));
        }
    }

    fn open(&mut self, name: &str, attrs: &[(&str, String)]) {
        self.indent();
        self.tag(name, attrs);
        self.buffer.push_str(">\n");
        self.depth += 1;
    }

    fn close(&mut self, name: &str) {
        self.depth = self.depth.saturating_sub(1);
        self.indent();
        self.buffer.push_str(&format!("</{}>\n", name));
    }

    fn empty(&mut self, name: &str, attrs: &[(&str, String)]) {
        self.indent();
        self.tag(name, attrs);
        self.buffer.push_str("/>\n");
    }

    fn text(&mut self, name: &str, attrs: &[(&str, String)], text: &str) {
        self.indent();
        self.tag(name, attrs);
        self.buffer.push_str(&format!(">{}</{}>\n", escape(text), name));
    }
}

/// Serialize the authored content of `score`
pub fn write_score(score: &Score) -> String {
    let mut b = MscxBuilder::new();
    b.buffer.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    b.open("museScore", &[("version", MSCX_VERSION.to_string())]);
    b.open("Score", &[]);
    b.text("Division", &[], &DIVISION.to_string());

    for (i, staff) in score.staves().iter().enumerate() {
        if let Some(Element::Staff(sd)) = score.element(*staff) {
            b.open("Staff", &[("id", (i + 1).to_string())]);
            b.text("name", &[], &sd.name);
            b.text("lines", &[], &sd.lines.to_string());
            b.close("Staff");
        }
    }

    let mut tuplet_index: HashMap<ElementId, usize> = HashMap::new();
    for base in score.measure_bases() {
        if base.is_generated() {
            continue;
        }
        match score.element(base) {
            Some(Element::Measure(md)) => write_measure(&mut b, score, base, md, &mut tuplet_index),
            Some(Element::Frame(fd)) => {
                b.open(fd.kind.name(), &[("size", fd.size.to_string())]);
                write_breaks(&mut b, score, base);
                b.close(fd.kind.name());
            }
            _ => {}
        }
    }

    for spanner in score.spanners() {
        if let Some(Element::Spanner(sd)) = score.element(spanner) {
            b.empty(
                "Spanner",
                &[
                    ("type", sd.kind.name().to_string()),
                    ("track", sd.track.to_string()),
                    ("track2", sd.track2.to_string()),
                    ("tick", sd.tick.to_string()),
                    ("tick2", sd.tick2.to_string()),
                ],
            );
        }
    }

    b.close("Score");
    b.close("museScore");
    b.buffer
}

fn write_measure(b: &mut MscxBuilder, score: &Score, measure: ElementId, md: &MeasureData, tuplet_index: &mut HashMap<ElementId, usize>) {
    let mut attrs = vec![("timesig", md.timesig.to_string())];
    if md.irregular() {
        attrs.push(("len", md.len.to_string()));
    }
    if md.end_barline != BarLineType::Normal {
        attrs.push(("barline", md.end_barline.name().to_string()));
    }
    b.open("Measure", &attrs);

    let tuplets = score.tuplets(measure);
    for t in &tuplets {
        let next = tuplet_index.len();
        tuplet_index.insert(*t, next);
    }

    for seg in score.segments(measure) {
        let Some(sd) = score.segment_data(seg) else { continue };
        if seg.is_generated() || sd.segment_type == SegmentType::TimeSigAnnounce {
            continue;
        }
        b.open("Segment", &[("type", sd.segment_type.name().to_string()), ("tick", sd.rtick.to_string())]);
        for child in score.children(seg) {
            if let Some(el) = score.element(*child) {
                write_element(b, score, *child, el, tuplet_index);
            }
        }
        b.close("Segment");
    }

    for t in &tuplets {
        if let Some(Element::Tuplet(td)) = score.element(*t) {
            b.empty(
                "Tuplet",
                &[
                    ("id", tuplet_index.get(t).copied().unwrap_or_default().to_string()),
                    ("track", td.track.to_string()),
                    ("actual", td.actual.to_string()),
                    ("normal", td.normal.to_string()),
                    ("base", td.base.duration_type.name().to_string()),
                ],
            );
        }
    }
    write_breaks(b, score, measure);
    b.close("Measure");
}

fn write_breaks(b: &mut MscxBuilder, score: &Score, base: ElementId) {
    for kind in score.layout_breaks(base) {
        b.empty("LayoutBreak", &[("type", kind.name().to_string())]);
    }
}

fn chord_rest_attrs(cr: &ChordRestData, tuplet_index: &HashMap<ElementId, usize>) -> Vec<(&'static str, String)> {
    let mut attrs = vec![
        ("track", cr.track.to_string()),
        ("duration", cr.duration_type.duration_type.name().to_string()),
    ];
    if cr.duration_type.dots > 0 {
        attrs.push(("dots", cr.duration_type.dots.to_string()));
    }
    attrs.push(("len", cr.duration.to_string()));
    if let Some(idx) = cr.tuplet.and_then(|t| tuplet_index.get(&t)) {
        attrs.push(("tuplet", idx.to_string()));
    }
    attrs
}

fn write_element(b: &mut MscxBuilder, score: &Score, id: ElementId, el: &Element, tuplet_index: &HashMap<ElementId, usize>) {
    match el {
        Element::TimeSig(ts) if !ts.courtesy => {
            let mut attrs = vec![
                ("track", ts.track.to_string()),
                ("sig", ts.sig.to_string()),
                ("type", ts.ts_type.name().to_string()),
            ];
            if ts.local {
                attrs.push(("local", "1".to_string()));
                attrs.push(("stretch", ts.stretch.to_string()));
            }
            b.empty("TimeSig", &attrs);
        }
        Element::Clef(c) => b.empty("Clef", &[("track", c.track.to_string()), ("type", c.clef_type.name().to_string())]),
        Element::Rest(cr) => b.empty("Rest", &chord_rest_attrs(cr, tuplet_index)),
        Element::Chord(cr) => {
            b.open("Chord", &chord_rest_attrs(cr, tuplet_index));
            for n in score.children(id) {
                if let Some(Element::Note(nd)) = score.element(*n) {
                    let mut attrs = vec![("pitch", nd.pitch.to_string())];
                    if nd.tie_forward {
                        attrs.push(("tie", "1".to_string()));
                    }
                    b.empty("Note", &attrs);
                }
            }
            b.close("Chord");
        }
        Element::Annotation(a) => b.text(
            "Annotation",
            &[("kind", a.kind.name().to_string()), ("track", a.track.to_string())],
            &a.text,
        ),
        _ => {}
    }
}
