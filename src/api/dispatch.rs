//! Named score actions
//!
//! UI layers address the engine through action names with JSON parameters.
//! [`ScoreDispatcher`] owns one [`MasterScore`] plus the selection and maps
//! each action onto a session call; every action completes synchronously.

use crate::errors::EngravingError;
use crate::master_score::MasterScore;
use crate::models::{ElementId, LayoutBreakKind, TimeSig, TimeSigType, TimeSigValue};
use crate::renderers::LayoutRegion;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

pub const ACTIONS: [&str; 9] = [
    "add-time-signature",
    "remove-time-signature",
    "toggle-layout-break",
    "start-cmd",
    "end-cmd",
    "undo",
    "redo",
    "layout",
    "select",
];

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DispatchError {
    #[error("unknown action: {0}")]
    UnknownAction(String),

    #[error("invalid parameters for {action}: {message}")]
    InvalidParams { action: String, message: String },

    #[error(transparent)]
    Engraving(#[from] EngravingError),
}

/// Receiver of named actions
pub trait ActionDispatcher {
    fn dispatch(&mut self, action: &str, params: Value) -> Result<Value, DispatchError>;
}

/// Measure or frame addressed either by position or by element key
#[derive(Debug, Default, Deserialize)]
struct Target {
    /// Index into the measures (frames excluded)
    measure: Option<usize>,
    /// Element key as reported by the tree model
    key: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct AddTimeSigParams {
    #[serde(flatten)]
    target: Target,
    sig: String,
    #[serde(default, rename = "type")]
    ts_type: Option<String>,
    #[serde(default)]
    staff: usize,
    #[serde(default)]
    local: bool,
}

#[derive(Debug, Deserialize)]
struct BreakParams {
    #[serde(flatten)]
    target: Target,
    kind: LayoutBreakKind,
}

#[derive(Debug, Deserialize)]
struct NameParams {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CountParams {
    #[serde(default = "one")]
    count: usize,
}

fn one() -> usize {
    1
}

#[derive(Debug, Deserialize)]
struct LayoutParams {
    #[serde(default)]
    region: Option<LayoutRegion>,
}

#[derive(Debug, Deserialize)]
struct SelectParams {
    key: Option<u64>,
    #[serde(default)]
    additive: bool,
}

pub struct ScoreDispatcher {
    master: MasterScore,
    selection: Vec<ElementId>,
}

impl ScoreDispatcher {
    pub fn new(master: MasterScore) -> Self {
        Self { master, selection: Vec::new() }
    }

    pub fn master(&self) -> &MasterScore {
        &self.master
    }

    pub fn master_mut(&mut self) -> &mut MasterScore {
        &mut self.master
    }

    pub fn selection(&self) -> &[ElementId] {
        &self.selection
    }

    fn params<T: for<'de> Deserialize<'de>>(action: &str, params: Value) -> Result<T, DispatchError> {
        // absent parameters behave like an empty object
        let params = if params.is_null() { json!({}) } else { params };
        serde_json::from_value(params).map_err(|e| DispatchError::InvalidParams {
            action: action.to_string(),
            message: e.to_string(),
        })
    }

    fn resolve(&self, action: &str, target: &Target) -> Result<ElementId, DispatchError> {
        let score = self.master.score();
        let id = match (target.key, target.measure) {
            (Some(key), _) => ElementId::from_key(key),
            (None, Some(index)) => score.measures().get(index).copied(),
            (None, None) => None,
        };
        id.filter(|id| score.kind(*id).map_or(false, |k| k.is_measure_base()))
            .ok_or_else(|| DispatchError::InvalidParams {
                action: action.to_string(),
                message: "no such measure".to_string(),
            })
    }

    fn time_sig(action: &str, p: &AddTimeSigParams) -> Result<TimeSig, DispatchError> {
        let invalid = |message: String| DispatchError::InvalidParams { action: action.to_string(), message };
        let value = TimeSigValue::parse(&p.sig).map_err(|e| invalid(e.to_string()))?;
        let ts_type = match &p.ts_type {
            Some(name) => TimeSigType::from_name(name).ok_or_else(|| invalid(format!("unknown type '{}'", name)))?,
            None => TimeSigType::Normal,
        };
        Ok(TimeSig::new(value, ts_type).map_err(EngravingError::from)?)
    }

    fn layout_summary(&self) -> Value {
        let layout = self.master.layout();
        json!({ "pages": layout.page_count(), "systems": layout.system_count() })
    }
}

impl ActionDispatcher for ScoreDispatcher {
    fn dispatch(&mut self, action: &str, params: Value) -> Result<Value, DispatchError> {
        log::debug!("dispatch {} {}", action, params);
        match action {
            "add-time-signature" => {
                let p: AddTimeSigParams = Self::params(action, params)?;
                let measure = self.resolve(action, &p.target)?;
                let ts = Self::time_sig(action, &p)?;
                let outcome = self.master.add_time_sig(measure, p.staff, ts, p.local)?;
                Ok(json!({ "outcome": format!("{:?}", outcome) }))
            }
            "remove-time-signature" => {
                let target: Target = Self::params(action, params)?;
                let measure = self.resolve(action, &target)?;
                let outcome = self.master.remove_time_sig(measure)?;
                Ok(json!({ "outcome": format!("{:?}", outcome) }))
            }
            "toggle-layout-break" => {
                let p: BreakParams = Self::params(action, params)?;
                let base = self.resolve(action, &p.target)?;
                let set = self.master.toggle_layout_break(base, p.kind)?;
                Ok(json!({ "set": set }))
            }
            "start-cmd" => {
                let p: NameParams = Self::params(action, params)?;
                self.master.start_cmd(p.name.as_deref().unwrap_or("Edit"))?;
                Ok(json!({ "state": self.master.state() }))
            }
            "end-cmd" => {
                let committed = self.master.end_cmd()?;
                Ok(json!({ "committed": committed }))
            }
            "undo" => {
                let p: CountParams = Self::params(action, params)?;
                let count = self.master.undo(p.count)?;
                self.selection.retain(|id| self.master.score().contains(*id));
                Ok(json!({ "count": count }))
            }
            "redo" => {
                let p: CountParams = Self::params(action, params)?;
                let count = self.master.redo(p.count)?;
                self.selection.retain(|id| self.master.score().contains(*id));
                Ok(json!({ "count": count }))
            }
            "layout" => {
                let p: LayoutParams = Self::params(action, params)?;
                self.master.relayout_region(p.region.unwrap_or(LayoutRegion::Whole));
                Ok(self.layout_summary())
            }
            "select" => {
                let p: SelectParams = Self::params(action, params)?;
                let id = p.key.and_then(ElementId::from_key);
                if let Some(id) = id.filter(|id| !self.master.score().contains(*id)) {
                    return Err(EngravingError::InvalidReference(id).into());
                }
                if !p.additive {
                    self.selection.clear();
                }
                if let Some(id) = id {
                    if !self.selection.contains(&id) {
                        self.selection.push(id);
                    }
                }
                let keys: Vec<u64> = self.selection.iter().map(|id| id.key()).collect();
                Ok(json!({ "selection": keys }))
            }
            other => Err(DispatchError::UnknownAction(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ScoreBuilder;

    fn dispatcher() -> ScoreDispatcher {
        ScoreDispatcher::new(MasterScore::new(ScoreBuilder::new(1).measures(4, 4, 4).build()))
    }

    #[test]
    fn test_unknown_action() {
        let mut d = dispatcher();
        assert_eq!(
            d.dispatch("transpose", Value::Null),
            Err(DispatchError::UnknownAction("transpose".to_string()))
        );
    }

    #[test]
    fn test_add_time_signature_by_index() {
        let mut d = dispatcher();
        let result = d
            .dispatch("add-time-signature", json!({ "measure": 1, "sig": "3/4" }))
            .unwrap();
        assert!(result["outcome"].as_str().unwrap().starts_with("Rewritten"));
        assert_eq!(d.master().score().measures().len(), 5);
        d.dispatch("undo", Value::Null).unwrap();
        assert_eq!(d.master().score().measures().len(), 4);
    }

    #[test]
    fn test_bad_params() {
        let mut d = dispatcher();
        let err = d.dispatch("add-time-signature", json!({ "measure": 0 })).unwrap_err();
        assert!(matches!(err, DispatchError::InvalidParams { .. }));
        let err = d.dispatch("toggle-layout-break", json!({ "measure": 9, "kind": "line" })).unwrap_err();
        assert!(matches!(err, DispatchError::InvalidParams { .. }));
    }

    #[test]
    fn test_command_actions() {
        let mut d = dispatcher();
        d.dispatch("start-cmd", json!({ "name": "breaks" })).unwrap();
        d.dispatch("toggle-layout-break", json!({ "measure": 0, "kind": "line" })).unwrap();
        d.dispatch("toggle-layout-break", json!({ "measure": 1, "kind": "line" })).unwrap();
        let ended = d.dispatch("end-cmd", Value::Null).unwrap();
        assert_eq!(ended["committed"], json!(true));
        let layout = d.dispatch("layout", Value::Null).unwrap();
        assert_eq!(layout["systems"], json!(3));
        assert_eq!(d.dispatch("undo", json!({ "count": 1 })).unwrap()["count"], json!(1));
    }

    #[test]
    fn test_select_additive() {
        let mut d = dispatcher();
        let measures = d.master().score().measures();
        d.dispatch("select", json!({ "key": measures[0].key() })).unwrap();
        let result = d
            .dispatch("select", json!({ "key": measures[1].key(), "additive": true }))
            .unwrap();
        assert_eq!(result["selection"], json!([measures[0].key(), measures[1].key()]));
        d.dispatch("select", json!({ "key": measures[2].key() })).unwrap();
        assert_eq!(d.selection(), &[measures[2]]);
    }

    #[test]
    fn test_select_stale_key_keeps_selection() {
        let mut d = dispatcher();
        let measures = d.master().score().measures();
        d.dispatch("select", json!({ "key": measures[1].key() })).unwrap();
        let removed = measures[3];
        d.dispatch("add-time-signature", json!({ "measure": 0, "sig": "2/4" })).unwrap();
        assert!(!d.master().score().contains(removed));

        let err = d.dispatch("select", json!({ "key": removed.key() })).unwrap_err();
        assert_eq!(err, DispatchError::Engraving(EngravingError::InvalidReference(removed)));
        assert_eq!(d.selection(), &[measures[1]]);
    }
}
