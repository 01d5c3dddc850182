//! Native `.mscx` score files
//!
//! Line-oriented XML with one canonical form per score, so that saving a
//! freshly loaded file reproduces its bytes exactly.

pub mod errors;
pub mod reader;
pub mod writer;

pub use errors::MscxError;
pub use reader::read_score;
pub use writer::{write_score, MSCX_VERSION};

use crate::models::Score;
use std::path::Path;

pub fn load_file(path: impl AsRef<Path>) -> Result<Score, MscxError> {
    let xml = std::fs::read_to_string(path.as_ref())?;
    log::debug!("mscx: loading {}", path.as_ref().display());
    read_score(&xml)
}

pub fn save_file(score: &Score, path: impl AsRef<Path>) -> Result<(), MscxError> {
    std::fs::write(path.as_ref(), write_score(score))?;
    log::debug!("mscx: saved {}", path.as_ref().display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::*;

    fn sample() -> Score {
        ScoreBuilder::new(2)
            .measures(2, 4, 4)
            .voice(
                0,
                0,
                &[
                    Event::note(60, DurationType::Half),
                    Event::tuplet(3, 2, DurationType::Eighth, &[62, 64, 65]),
                    Event::rest(DurationType::Quarter),
                ],
            )
            .voice(1, 4, &[Event::dotted(48, DurationType::Half), Event::note(50, DurationType::Quarter)])
            .tie(0, 0, Fraction::zero())
            .annotation(0, Fraction::zero(), 0, AnnotationKind::Dynamic, "p & <mf>")
            .spanner(SpannerKind::Slur, 0, (0, Fraction::zero()), (0, Fraction::new(1, 2)))
            .layout_break(LayoutBreakKind::Line)
            .frame(FrameKind::VBox)
            .measures(1, 3, 4)
            .barline(BarLineType::End)
            .build()
    }

    #[test]
    fn test_write_then_read_preserves_score() {
        let score = sample();
        let xml = write_score(&score);
        let loaded = read_score(&xml).unwrap();
        assert_eq!(write_score(&loaded), xml);
        assert_eq!(loaded.measures().len(), 3);
        assert_eq!(loaded.spanners().len(), 1);
    }

    #[test]
    fn test_escaped_text_survives() {
        let xml = write_score(&sample());
        assert!(xml.contains("p &amp; &lt;mf&gt;"));
        let loaded = read_score(&xml).unwrap();
        let text = loaded
            .ids()
            .filter_map(|id| match loaded.element(id) {
                Some(Element::Annotation(a)) => Some(a.text.clone()),
                _ => None,
            })
            .next();
        assert_eq!(text.as_deref(), Some("p & <mf>"));
    }

    #[test]
    fn test_generated_nodes_not_written() {
        let mut score = sample();
        let before = write_score(&score);
        let m = score.first_measure().unwrap();
        score.add_generated(m, 0, Element::LayoutBreak(LayoutBreakKind::Page));
        assert_eq!(write_score(&score), before);
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("score.mscx");
        let score = sample();
        save_file(&score, &path).unwrap();
        let loaded = load_file(&path).unwrap();
        assert_eq!(write_score(&loaded), std::fs::read_to_string(&path).unwrap());
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(load_file(dir.path().join("nope.mscx")), Err(MscxError::Io(_))));
    }
}
