//! Element payloads for the score graph
//!
//! The set of element kinds is closed: every node in the arena carries one
//! [`Element`] variant and is dispatched on by exhaustive `match`.

use super::duration::TDuration;
use super::fraction::Fraction;
use super::timesig::{TimeSig, TimeSigValue};
use super::core::ElementId;
use serde::{Deserialize, Serialize};

/// Voices per staff
pub const VOICES: usize = 4;

pub fn staff2track(staff_idx: usize) -> usize {
    staff_idx * VOICES
}

pub fn track2staff(track: usize) -> usize {
    track / VOICES
}

/// Discriminator for [`Element`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum ElementKind {
    Score = 0,
    Staff = 1,
    Measure = 2,
    Frame = 3,
    Segment = 4,
    TimeSig = 5,
    Clef = 6,
    Chord = 7,
    Rest = 8,
    Note = 9,
    Annotation = 10,
    Tuplet = 11,
    Spanner = 12,
    LayoutBreak = 13,
}

impl ElementKind {
    pub fn name(&self) -> &'static str {
        match self {
            ElementKind::Score => "Score",
            ElementKind::Staff => "Staff",
            ElementKind::Measure => "Measure",
            ElementKind::Frame => "Frame",
            ElementKind::Segment => "Segment",
            ElementKind::TimeSig => "TimeSig",
            ElementKind::Clef => "Clef",
            ElementKind::Chord => "Chord",
            ElementKind::Rest => "Rest",
            ElementKind::Note => "Note",
            ElementKind::Annotation => "Annotation",
            ElementKind::Tuplet => "Tuplet",
            ElementKind::Spanner => "Spanner",
            ElementKind::LayoutBreak => "LayoutBreak",
        }
    }

    pub fn is_chord_rest(&self) -> bool {
        matches!(self, ElementKind::Chord | ElementKind::Rest)
    }

    pub fn is_measure_base(&self) -> bool {
        matches!(self, ElementKind::Measure | ElementKind::Frame)
    }
}

// Serialized with both name and value so the UI can show and key on it
impl Serialize for ElementKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("ElementKind", 2)?;
        state.serialize_field("name", self.name())?;
        state.serialize_field("value", &(*self as u8))?;
        state.end()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BarLineType {
    #[default]
    Normal,
    Double,
    End,
    StartRepeat,
    EndRepeat,
    Dashed,
}

impl BarLineType {
    pub fn name(&self) -> &'static str {
        match self {
            BarLineType::Normal => "normal",
            BarLineType::Double => "double",
            BarLineType::End => "end",
            BarLineType::StartRepeat => "start-repeat",
            BarLineType::EndRepeat => "end-repeat",
            BarLineType::Dashed => "dashed",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let t = match name {
            "normal" => BarLineType::Normal,
            "double" => BarLineType::Double,
            "end" => BarLineType::End,
            "start-repeat" => BarLineType::StartRepeat,
            "end-repeat" => BarLineType::EndRepeat,
            "dashed" => BarLineType::Dashed,
            _ => return None,
        };
        Some(t)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaffData {
    pub name: String,
    pub lines: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasureData {
    /// Nominal signature in effect
    pub timesig: TimeSigValue,
    /// Actual length; differs from the nominal length for pickups
    pub len: Fraction,
    pub end_barline: BarLineType,
    /// Layout cache: x of the measure within its system
    #[serde(skip)]
    pub x: f64,
    #[serde(skip)]
    pub width: f64,
}

impl MeasureData {
    pub fn new(timesig: TimeSigValue) -> Self {
        Self {
            timesig,
            len: timesig.duration(),
            end_barline: BarLineType::Normal,
            x: 0.0,
            width: 0.0,
        }
    }

    pub fn irregular(&self) -> bool {
        self.len != self.timesig.duration()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameKind {
    VBox,
    HBox,
    TBox,
}

impl FrameKind {
    pub fn name(&self) -> &'static str {
        match self {
            FrameKind::VBox => "VBox",
            FrameKind::HBox => "HBox",
            FrameKind::TBox => "TBox",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "VBox" => Some(FrameKind::VBox),
            "HBox" => Some(FrameKind::HBox),
            "TBox" => Some(FrameKind::TBox),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameData {
    pub kind: FrameKind,
    /// Height for vertical frames, width for horizontal ones (staff spaces)
    pub size: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SegmentType {
    Clef,
    TimeSig,
    ChordRest,
    /// End-of-system preview of the next signature, created by layout
    TimeSigAnnounce,
}

impl SegmentType {
    pub fn name(&self) -> &'static str {
        match self {
            SegmentType::Clef => "Clef",
            SegmentType::TimeSig => "TimeSig",
            SegmentType::ChordRest => "ChordRest",
            SegmentType::TimeSigAnnounce => "TimeSigAnnounce",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Clef" => Some(SegmentType::Clef),
            "TimeSig" => Some(SegmentType::TimeSig),
            "ChordRest" => Some(SegmentType::ChordRest),
            "TimeSigAnnounce" => Some(SegmentType::TimeSigAnnounce),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentData {
    pub segment_type: SegmentType,
    /// Tick relative to the measure start
    pub rtick: Fraction,
    /// Layout cache: x relative to the measure
    #[serde(skip)]
    pub x: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClefType {
    Treble,
    Bass,
    Alto,
    Tenor,
    Percussion,
}

impl ClefType {
    pub fn name(&self) -> &'static str {
        match self {
            ClefType::Treble => "treble",
            ClefType::Bass => "bass",
            ClefType::Alto => "alto",
            ClefType::Tenor => "tenor",
            ClefType::Percussion => "percussion",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "treble" => Some(ClefType::Treble),
            "bass" => Some(ClefType::Bass),
            "alto" => Some(ClefType::Alto),
            "tenor" => Some(ClefType::Tenor),
            "percussion" => Some(ClefType::Percussion),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClefData {
    pub track: usize,
    pub clef_type: ClefType,
}

/// Shared data of chords and rests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChordRestData {
    pub track: usize,
    pub duration_type: TDuration,
    /// Actual length, including any tuplet scaling
    pub duration: Fraction,
    /// Weak link to the measure-owned tuplet this belongs to
    pub tuplet: Option<ElementId>,
}

impl ChordRestData {
    pub fn new(track: usize, duration_type: TDuration, duration: Fraction) -> Self {
        Self { track, duration_type, duration, tuplet: None }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteData {
    /// MIDI pitch
    pub pitch: u8,
    /// Tied to the same pitch in the next chord of the track
    pub tie_forward: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnnotationKind {
    StaffText,
    SystemText,
    Dynamic,
    RehearsalMark,
    Tempo,
    Fingering,
    Harmony,
}

impl AnnotationKind {
    pub fn name(&self) -> &'static str {
        match self {
            AnnotationKind::StaffText => "StaffText",
            AnnotationKind::SystemText => "SystemText",
            AnnotationKind::Dynamic => "Dynamic",
            AnnotationKind::RehearsalMark => "RehearsalMark",
            AnnotationKind::Tempo => "Tempo",
            AnnotationKind::Fingering => "Fingering",
            AnnotationKind::Harmony => "Harmony",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let k = match name {
            "StaffText" => AnnotationKind::StaffText,
            "SystemText" => AnnotationKind::SystemText,
            "Dynamic" => AnnotationKind::Dynamic,
            "RehearsalMark" => AnnotationKind::RehearsalMark,
            "Tempo" => AnnotationKind::Tempo,
            "Fingering" => AnnotationKind::Fingering,
            "Harmony" => AnnotationKind::Harmony,
            _ => return None,
        };
        Some(k)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationData {
    pub kind: AnnotationKind,
    pub track: usize,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TupletData {
    pub track: usize,
    /// Notes played in the time of `normal` notes of `base`
    pub actual: u32,
    pub normal: u32,
    pub base: TDuration,
}

impl TupletData {
    /// Ratio applied to the printed durations of the members
    pub fn ratio(&self) -> Fraction {
        Fraction::new(self.normal as i64, self.actual.max(1) as i64)
    }

    /// Total length the tuplet occupies
    pub fn len(&self) -> Option<Fraction> {
        self.base.fraction().map(|b| b * self.normal as i64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpannerKind {
    Slur,
    /// Two-chord tremolo between adjacent chords
    Tremolo,
    Hairpin,
    Ottava,
    Pedal,
}

impl SpannerKind {
    pub fn name(&self) -> &'static str {
        match self {
            SpannerKind::Slur => "Slur",
            SpannerKind::Tremolo => "Tremolo",
            SpannerKind::Hairpin => "Hairpin",
            SpannerKind::Ottava => "Ottava",
            SpannerKind::Pedal => "Pedal",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Slur" => Some(SpannerKind::Slur),
            "Tremolo" => Some(SpannerKind::Tremolo),
            "Hairpin" => Some(SpannerKind::Hairpin),
            "Ottava" => Some(SpannerKind::Ottava),
            "Pedal" => Some(SpannerKind::Pedal),
            _ => None,
        }
    }
}

/// Relation between a start and an end chord/rest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpannerData {
    pub kind: SpannerKind,
    pub track: usize,
    pub track2: usize,
    /// Absolute tick of the start element
    pub tick: Fraction,
    /// Absolute tick of the end element
    pub tick2: Fraction,
    pub start_element: Option<ElementId>,
    pub end_element: Option<ElementId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutBreakKind {
    Line,
    Page,
    Section,
}

impl LayoutBreakKind {
    pub fn name(&self) -> &'static str {
        match self {
            LayoutBreakKind::Line => "line",
            LayoutBreakKind::Page => "page",
            LayoutBreakKind::Section => "section",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "line" => Some(LayoutBreakKind::Line),
            "page" => Some(LayoutBreakKind::Page),
            "section" => Some(LayoutBreakKind::Section),
            _ => None,
        }
    }
}

/// Payload of an arena node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Element {
    Score,
    Staff(StaffData),
    Measure(MeasureData),
    Frame(FrameData),
    Segment(SegmentData),
    TimeSig(TimeSig),
    Clef(ClefData),
    Chord(ChordRestData),
    Rest(ChordRestData),
    Note(NoteData),
    Annotation(AnnotationData),
    Tuplet(TupletData),
    Spanner(SpannerData),
    LayoutBreak(LayoutBreakKind),
}

impl Element {
    pub fn kind(&self) -> ElementKind {
        match self {
            Element::Score => ElementKind::Score,
            Element::Staff(_) => ElementKind::Staff,
            Element::Measure(_) => ElementKind::Measure,
            Element::Frame(_) => ElementKind::Frame,
            Element::Segment(_) => ElementKind::Segment,
            Element::TimeSig(_) => ElementKind::TimeSig,
            Element::Clef(_) => ElementKind::Clef,
            Element::Chord(_) => ElementKind::Chord,
            Element::Rest(_) => ElementKind::Rest,
            Element::Note(_) => ElementKind::Note,
            Element::Annotation(_) => ElementKind::Annotation,
            Element::Tuplet(_) => ElementKind::Tuplet,
            Element::Spanner(_) => ElementKind::Spanner,
            Element::LayoutBreak(_) => ElementKind::LayoutBreak,
        }
    }

    /// Track for elements that live in one, `None` otherwise
    pub fn track(&self) -> Option<usize> {
        match self {
            Element::TimeSig(ts) => Some(ts.track),
            Element::Clef(c) => Some(c.track),
            Element::Chord(cr) | Element::Rest(cr) => Some(cr.track),
            Element::Annotation(a) => Some(a.track),
            Element::Tuplet(t) => Some(t.track),
            Element::Spanner(s) => Some(s.track),
            Element::Score
            | Element::Staff(_)
            | Element::Measure(_)
            | Element::Frame(_)
            | Element::Segment(_)
            | Element::Note(_)
            | Element::LayoutBreak(_) => None,
        }
    }

    pub fn chord_rest(&self) -> Option<&ChordRestData> {
        match self {
            Element::Chord(cr) | Element::Rest(cr) => Some(cr),
            _ => None,
        }
    }

    pub fn chord_rest_mut(&mut self) -> Option<&mut ChordRestData> {
        match self {
            Element::Chord(cr) | Element::Rest(cr) => Some(cr),
            _ => None,
        }
    }

    pub fn as_measure(&self) -> Option<&MeasureData> {
        match self {
            Element::Measure(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_segment(&self) -> Option<&SegmentData> {
        match self {
            Element::Segment(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_timesig(&self) -> Option<&TimeSig> {
        match self {
            Element::TimeSig(ts) => Some(ts),
            _ => None,
        }
    }

    pub fn as_spanner(&self) -> Option<&SpannerData> {
        match self {
            Element::Spanner(s) => Some(s),
            _ => None,
        }
    }

    /// One-line description used by diagnostics and the tree model
    pub fn describe(&self) -> String {
        match self {
            Element::Score => "Score".to_string(),
            Element::Staff(s) => format!("Staff '{}'", s.name),
            Element::Measure(m) => format!("Measure {} len {}", m.timesig, m.len),
            Element::Frame(f) => format!("{}", f.kind.name()),
            Element::Segment(s) => format!("Segment {} @{}", s.segment_type.name(), s.rtick),
            Element::TimeSig(ts) => {
                let mut d = format!("TimeSig {} {} track {}", ts.sig, ts.ts_type.name(), ts.track);
                if ts.local {
                    d.push_str(" local");
                }
                if ts.courtesy {
                    d.push_str(" courtesy");
                }
                d
            }
            Element::Clef(c) => format!("Clef {} track {}", c.clef_type.name(), c.track),
            Element::Chord(cr) => format!("Chord {} track {}", cr.duration, cr.track),
            Element::Rest(cr) => format!("Rest {} track {}", cr.duration, cr.track),
            Element::Note(n) => {
                if n.tie_forward {
                    format!("Note {} tied", n.pitch)
                } else {
                    format!("Note {}", n.pitch)
                }
            }
            Element::Annotation(a) => format!("{} '{}' track {}", a.kind.name(), a.text, a.track),
            Element::Tuplet(t) => format!("Tuplet {}:{} track {}", t.actual, t.normal, t.track),
            Element::Spanner(s) => format!("{} {}..{} track {}", s.kind.name(), s.tick, s.tick2, s.track),
            Element::LayoutBreak(k) => format!("LayoutBreak {}", k.name()),
        }
    }
}
