//! `.mscx` reader
//!
//! Rebuilds the element graph in canonical child order, then resolves
//! spanner endpoints by (track, tick).

use super::errors::MscxError;
use crate::models::*;
use roxmltree::{Document, Node as XmlNode};
use std::collections::{HashMap, HashSet};
use std::str::FromStr;

type Result<T> = std::result::Result<T, MscxError>;

fn get_child<'a, 'input>(node: XmlNode<'a, 'input>, name: &str) -> Option<XmlNode<'a, 'input>> {
    node.children().find(|n| n.has_tag_name(name))
}

fn get_child_text(node: XmlNode, name: &str) -> Option<String> {
    get_child(node, name).and_then(|n| n.text()).map(|s| s.to_string())
}

fn required_attr<'a>(node: XmlNode<'a, '_>, name: &str) -> Result<&'a str> {
    node.attribute(name)
        .ok_or_else(|| MscxError::MissingElement(format!("{}@{}", node.tag_name().name(), name)))
}

fn invalid(what: &str, value: &str) -> MscxError {
    MscxError::InvalidValue { what: what.to_string(), value: value.to_string() }
}

fn parse_attr<T: FromStr>(node: XmlNode, name: &str) -> Result<T> {
    let raw = required_attr(node, name)?;
    raw.parse().map_err(|_| invalid(name, raw))
}

fn parse_opt_attr<T: FromStr>(node: XmlNode, name: &str) -> Result<Option<T>> {
    match node.attribute(name) {
        Some(raw) => raw.parse().map(Some).map_err(|_| invalid(name, raw)),
        None => Ok(None),
    }
}

fn named<T>(node: XmlNode, attr: &str, from_name: impl Fn(&str) -> Option<T>) -> Result<T> {
    let raw = required_attr(node, attr)?;
    from_name(raw).ok_or_else(|| invalid(attr, raw))
}

fn parse_timesig_value(node: XmlNode, attr: &str) -> Result<TimeSigValue> {
    let raw = required_attr(node, attr)?;
    TimeSigValue::parse(raw).map_err(|_| invalid(attr, raw))
}

/// Parse an `.mscx` document into a fresh score
pub fn read_score(xml: &str) -> Result<Score> {
    let doc = Document::parse(xml)?;
    let root = doc.root_element();
    if !root.has_tag_name("museScore") {
        return Err(MscxError::MissingElement("museScore".to_string()));
    }
    let score_node = get_child(root, "Score").ok_or_else(|| MscxError::MissingElement("Score".to_string()))?;

    if let Some(division) = get_child_text(score_node, "Division") {
        if division.trim() != DIVISION.to_string() {
            return Err(invalid("Division", &division));
        }
    }

    let mut reader = MscxReader { score: Score::new(), tuplets: HashMap::new() };
    for node in score_node.children().filter(|n| n.is_element()) {
        match node.tag_name().name() {
            "Division" => {}
            "Staff" => reader.read_staff(node)?,
            "Measure" => reader.read_measure(node)?,
            "VBox" | "HBox" | "TBox" => reader.read_frame(node)?,
            "Spanner" => reader.read_spanner(node)?,
            other => log::warn!("mscx: skipping unknown element <{}>", other),
        }
    }

    if reader.score.staves().is_empty() {
        return Err(MscxError::Corrupt("score has no staves".to_string()));
    }
    reader.check_tracks()?;
    reader.resolve_spanners()?;
    log::info!(
        "mscx: read {} staves, {} measures, {} spanners",
        reader.score.nstaves(),
        reader.score.measures().len(),
        reader.score.spanners().len()
    );
    Ok(reader.score)
}

struct MscxReader {
    score: Score,
    /// File-level tuplet index to arena id
    tuplets: HashMap<usize, ElementId>,
}

impl MscxReader {
    fn read_staff(&mut self, node: XmlNode) -> Result<()> {
        let name = get_child_text(node, "name").unwrap_or_default();
        let lines_raw = get_child_text(node, "lines").unwrap_or_else(|| "5".to_string());
        let lines = lines_raw.trim().parse().map_err(|_| invalid("lines", &lines_raw))?;
        let root = self.score.root();
        self.score.push_child(root, Element::Staff(StaffData { name, lines }));
        Ok(())
    }

    fn read_frame(&mut self, node: XmlNode) -> Result<()> {
        let kind = FrameKind::from_name(node.tag_name().name())
            .ok_or_else(|| invalid("frame", node.tag_name().name()))?;
        let size: f64 = parse_attr(node, "size")?;
        let root = self.score.root();
        let frame = self.score.push_child(root, Element::Frame(FrameData { kind, size }));
        self.read_breaks(node, frame)
    }

    fn read_breaks(&mut self, node: XmlNode, base: ElementId) -> Result<()> {
        for b in node.children().filter(|n| n.has_tag_name("LayoutBreak")) {
            let kind = named(b, "type", LayoutBreakKind::from_name)?;
            self.score.push_child(base, Element::LayoutBreak(kind));
        }
        Ok(())
    }

    fn read_measure(&mut self, node: XmlNode) -> Result<()> {
        let timesig = parse_timesig_value(node, "timesig")?;
        let mut md = MeasureData::new(timesig);
        if let Some(len) = parse_opt_attr::<Fraction>(node, "len")? {
            if len.is_zero() || len.is_negative() {
                return Err(invalid("len", &len.to_string()));
            }
            md.len = len;
        }
        if let Some(raw) = node.attribute("barline") {
            md.end_barline = BarLineType::from_name(raw).ok_or_else(|| invalid("barline", raw))?;
        }
        let len = md.len;
        let root = self.score.root();
        let measure = self.score.push_child(root, Element::Measure(md));

        // tuplets first so chord/rest references resolve
        for t in node.children().filter(|n| n.has_tag_name("Tuplet")) {
            let index: usize = parse_attr(t, "id")?;
            let base = named(t, "base", DurationType::from_name)?;
            let data = TupletData {
                track: parse_attr(t, "track")?,
                actual: parse_attr(t, "actual")?,
                normal: parse_attr(t, "normal")?,
                base: TDuration::new(base, 0),
            };
            if data.actual == 0 || data.normal == 0 {
                return Err(MscxError::Corrupt(format!("tuplet {} has a zero ratio", index)));
            }
            let id = self.score.push_child(measure, Element::Tuplet(data));
            if self.tuplets.insert(index, id).is_some() {
                return Err(MscxError::Corrupt(format!("duplicate tuplet id {}", index)));
            }
        }

        for s in node.children().filter(|n| n.has_tag_name("Segment")) {
            let segment_type = named(s, "type", SegmentType::from_name)?;
            let rtick: Fraction = parse_attr(s, "tick")?;
            if rtick.is_negative() || rtick >= len {
                return Err(MscxError::Corrupt(format!("segment tick {} outside measure", rtick)));
            }
            let seg = self
                .score
                .push_child(measure, Element::Segment(SegmentData { segment_type, rtick, x: 0.0 }));
            for child in s.children().filter(|n| n.is_element()) {
                self.read_segment_child(child, seg)?;
            }
        }

        self.read_breaks(node, measure)
    }

    fn read_chord_rest(&self, node: XmlNode) -> Result<ChordRestData> {
        let duration_type = named(node, "duration", DurationType::from_name)?;
        let dots: u8 = parse_opt_attr(node, "dots")?.unwrap_or(0);
        let duration: Fraction = parse_attr(node, "len")?;
        let mut cr = ChordRestData::new(parse_attr(node, "track")?, TDuration::new(duration_type, dots), duration);
        if let Some(index) = parse_opt_attr::<usize>(node, "tuplet")? {
            let tuplet = self
                .tuplets
                .get(&index)
                .copied()
                .ok_or_else(|| MscxError::Corrupt(format!("unknown tuplet {}", index)))?;
            cr.tuplet = Some(tuplet);
        }
        Ok(cr)
    }

    fn read_segment_child(&mut self, node: XmlNode, seg: ElementId) -> Result<()> {
        let element = match node.tag_name().name() {
            "TimeSig" => {
                let sig = parse_timesig_value(node, "sig")?;
                let ts_type = named(node, "type", TimeSigType::from_name)?;
                let mut ts = TimeSig::new(sig, ts_type)
                    .map_err(|e| MscxError::Corrupt(e.to_string()))?
                    .with_track(parse_attr(node, "track")?);
                if node.attribute("local") == Some("1") {
                    ts.local = true;
                    ts.stretch = parse_attr(node, "stretch")?;
                }
                Element::TimeSig(ts)
            }
            "Clef" => Element::Clef(ClefData {
                track: parse_attr(node, "track")?,
                clef_type: named(node, "type", ClefType::from_name)?,
            }),
            "Rest" => Element::Rest(self.read_chord_rest(node)?),
            "Chord" => {
                let data = self.read_chord_rest(node)?;
                let chord = self.score.push_child(seg, Element::Chord(data));
                for n in node.children().filter(|n| n.has_tag_name("Note")) {
                    let note = NoteData { pitch: parse_attr(n, "pitch")?, tie_forward: n.attribute("tie") == Some("1") };
                    self.score.push_child(chord, Element::Note(note));
                }
                return Ok(());
            }
            "Annotation" => Element::Annotation(AnnotationData {
                kind: named(node, "kind", AnnotationKind::from_name)?,
                track: parse_attr(node, "track")?,
                text: node.text().unwrap_or_default().to_string(),
            }),
            other => {
                log::warn!("mscx: skipping unknown segment child <{}>", other);
                return Ok(());
            }
        };
        self.score.push_child(seg, element);
        Ok(())
    }

    fn read_spanner(&mut self, node: XmlNode) -> Result<()> {
        let data = SpannerData {
            kind: named(node, "type", SpannerKind::from_name)?,
            track: parse_attr(node, "track")?,
            track2: parse_attr(node, "track2")?,
            tick: parse_attr(node, "tick")?,
            tick2: parse_attr(node, "tick2")?,
            start_element: None,
            end_element: None,
        };
        if data.tick2 < data.tick {
            return Err(MscxError::Corrupt(format!(
                "{} ends at {} before its start {}",
                data.kind.name(),
                data.tick2,
                data.tick
            )));
        }
        let root = self.score.root();
        self.score.push_child(root, Element::Spanner(data));
        Ok(())
    }

    /// Every track exists, and a segment holds at most one element per
    /// track apart from annotations
    fn check_tracks(&self) -> Result<()> {
        let score = &self.score;
        let ntracks = score.ntracks();
        for id in score.descendants(score.root()) {
            let Some(el) = score.element(id) else { continue };
            let track2 = el.as_spanner().map(|d| d.track2);
            for track in el.track().into_iter().chain(track2) {
                if track >= ntracks {
                    return Err(MscxError::Corrupt(format!(
                        "{} on track {} but the score has {} tracks",
                        el.kind().name(),
                        track,
                        ntracks
                    )));
                }
            }
        }

        for m in score.measures() {
            for seg in score.segments(m) {
                let mut seen = HashSet::new();
                for c in score.children(seg) {
                    let Some(el) = score.element(*c).filter(|e| e.kind() != ElementKind::Annotation) else {
                        continue;
                    };
                    if let Some(track) = el.track().filter(|t| !seen.insert(*t)) {
                        return Err(MscxError::Corrupt(format!(
                            "two elements on track {} at {}",
                            track,
                            score.segment_tick(seg).unwrap_or_default()
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    fn resolve_spanners(&mut self) -> Result<()> {
        for id in self.score.spanners() {
            let Some(mut data) = self.score.element(id).and_then(Element::as_spanner).cloned() else {
                continue;
            };
            let start = self.score.chord_rest_at(data.tick, data.track);
            let end = self.score.chord_rest_at(data.tick2, data.track2);
            match (start, end) {
                (Some(s), Some(e)) => {
                    data.start_element = Some(s);
                    data.end_element = Some(e);
                    self.score.replace_element(id, Element::Spanner(data));
                }
                _ => {
                    return Err(MscxError::Corrupt(format!(
                        "{} at {} track {} has no endpoint",
                        data.kind.name(),
                        data.tick,
                        data.track
                    )))
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<museScore version="4.00">
  <Score>
    <Division>480</Division>
    <Staff id="1">
      <name>Flute</name>
      <lines>5</lines>
    </Staff>
    <Measure timesig="4/4">
      <Segment type="TimeSig" tick="0/1">
        <TimeSig track="0" sig="4/4" type="normal"/>
      </Segment>
      <Segment type="ChordRest" tick="0/1">
        <Rest track="0" duration="measure" len="1/1"/>
      </Segment>
    </Measure>
  </Score>
</museScore>
"#;

    #[test]
    fn test_read_minimal() {
        let score = read_score(MINIMAL).unwrap();
        assert_eq!(score.nstaves(), 1);
        assert_eq!(score.measures().len(), 1);
        let m = score.first_measure().unwrap();
        assert!(score.has_global_timesig(m));
        assert_eq!(score.chord_rests_in_measure(m, 0).len(), 1);
    }

    #[test]
    fn test_malformed_xml() {
        assert!(matches!(read_score("<museScore><Score>"), Err(MscxError::InvalidXml(_))));
    }

    #[test]
    fn test_missing_score() {
        let err = read_score("<museScore version=\"4.00\"/>").unwrap_err();
        assert_eq!(err, MscxError::MissingElement("Score".to_string()));
    }

    #[test]
    fn test_bad_duration_name() {
        let xml = MINIMAL.replace("duration=\"measure\"", "duration=\"longa\"");
        assert!(matches!(read_score(&xml), Err(MscxError::InvalidValue { .. })));
    }

    #[test]
    fn test_unresolved_spanner_is_corrupt() {
        let xml = MINIMAL.replace(
            "  </Score>",
            "    <Spanner type=\"Slur\" track=\"0\" track2=\"0\" tick=\"0/1\" tick2=\"1/2\"/>\n  </Score>",
        );
        assert!(matches!(read_score(&xml), Err(MscxError::Corrupt(_))));
    }

    const TWO_QUARTERS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<museScore version="4.00">
  <Score>
    <Division>480</Division>
    <Staff id="1">
      <name>Oboe</name>
      <lines>5</lines>
    </Staff>
    <Measure timesig="2/4">
      <Segment type="TimeSig" tick="0/1">
        <TimeSig track="0" sig="2/4" type="normal"/>
      </Segment>
      <Segment type="ChordRest" tick="0/1">
        <Chord track="0" duration="quarter" len="1/4">
          <Note pitch="72"/>
        </Chord>
      </Segment>
      <Segment type="ChordRest" tick="1/4">
        <Rest track="0" duration="quarter" len="1/4"/>
      </Segment>
    </Measure>
    <Spanner type="Slur" track="0" track2="0" tick="0/1" tick2="1/4"/>
  </Score>
</museScore>
"#;

    #[test]
    fn test_two_quarters_read() {
        let score = read_score(TWO_QUARTERS).unwrap();
        assert_eq!(score.spanners().len(), 1);
    }

    #[test]
    fn test_inverted_spanner_is_corrupt() {
        let xml = TWO_QUARTERS.replace("tick=\"0/1\" tick2=\"1/4\"", "tick=\"1/4\" tick2=\"0/1\"");
        let err = read_score(&xml).unwrap_err();
        assert!(matches!(&err, MscxError::Corrupt(msg) if msg.contains("before its start")), "{}", err);
    }

    #[test]
    fn test_track_outside_score_is_corrupt() {
        let xml = TWO_QUARTERS.replace("<Chord track=\"0\"", "<Chord track=\"9\"");
        let err = read_score(&xml).unwrap_err();
        assert!(matches!(&err, MscxError::Corrupt(msg) if msg.contains("track 9")), "{}", err);

        let xml = TWO_QUARTERS.replace("track2=\"0\"", "track2=\"4\"");
        assert!(matches!(read_score(&xml), Err(MscxError::Corrupt(_))));
    }

    #[test]
    fn test_second_voice_is_in_range() {
        let xml = TWO_QUARTERS.replace("<Rest track=\"0\"", "<Rest track=\"3\"");
        assert!(read_score(&xml).is_ok());
    }

    #[test]
    fn test_two_elements_on_one_track_is_corrupt() {
        let xml = TWO_QUARTERS.replace(
            "<Rest track=\"0\" duration=\"quarter\" len=\"1/4\"/>",
            "<Rest track=\"0\" duration=\"quarter\" len=\"1/4\"/>\n        <Rest track=\"0\" duration=\"quarter\" len=\"1/4\"/>",
        );
        let err = read_score(&xml).unwrap_err();
        assert!(matches!(&err, MscxError::Corrupt(msg) if msg.contains("two elements")), "{}", err);
    }
}
