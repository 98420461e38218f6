//! Action dispatcher (component C4).
//!
//! Resolves a node's `action` config into a [`ActionKind`] plus resolved
//! arguments, delegating the actual side effect to the
//! [`crate::collaborators::InputBackend`] collaborator. Coordinate targets
//! (`Click.target`, `Swipe.begin`/`end`) accept the four forms described in
//! the node spec: boolean (recognition center), `[x,y]`/`[x,y,w,h]`, or a
//! string processed through the variable store.

use rand::Rng;
use serde_json::Value as Json;
use strum::{Display, EnumString};

use crate::expr::interpolate;
use crate::recognition::RecognitionResult;
use crate::variable::{Point, Rect, Value, VariableStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Default)]
#[strum(serialize_all = "PascalCase")]
pub enum ActionKind {
    #[default]
    DoNothing,
    Click,
    Swipe,
    Key,
    Text,
    StartApp,
    StopApp,
    StopTask,
    Command,
}

/// One of the four shapes a coordinate target field may take in JSON.
#[derive(Debug, Clone)]
enum Target {
    UseRecognition(bool),
    Coords(Vec<i64>),
    Text(String),
}

impl Target {
    fn parse(v: Option<&Json>) -> Self {
        match v {
            Some(Json::Bool(b)) => Self::UseRecognition(*b),
            Some(Json::String(s)) => Self::Text(s.clone()),
            Some(Json::Array(items)) => Self::Coords(items.iter().filter_map(Json::as_i64).collect()),
            _ => Self::UseRecognition(true),
        }
    }
}

fn offset_of(obj: &serde_json::Map<String, Json>, key: &str) -> [i64; 4] {
    obj.get(key)
        .and_then(Json::as_array)
        .map(|items| {
            let mut out = [0i64; 4];
            for (slot, item) in out.iter_mut().zip(items) {
                *slot = item.as_i64().unwrap_or(0);
            }
            out
        })
        .unwrap_or_default()
}

fn recognition_center(result: &RecognitionResult) -> Option<Point> {
    result.success.then(|| result.rect.center())
}

/// Resolves a target's coordinate set, optionally reading `%p`/`%r`
/// variables out of `store` for the string form. `is_swipe_end` selects the
/// rect's bottom-right corner instead of its center when a `%r` variable is
/// the only match for a string target. Randomized selection within a
/// rectangle draws from `rng`, the executor's seeded generator, so runs are
/// reproducible.
fn resolve_point(
    store: &mut VariableStore,
    rng: &mut impl Rng,
    target: &Target,
    result: &RecognitionResult,
    is_swipe_end: bool,
) -> Option<Point> {
    match target {
        Target::UseRecognition(true) => recognition_center(result),
        Target::UseRecognition(false) => None,
        Target::Coords(coords) if coords.len() >= 4 => {
            let (x, y, w, h) = (coords[0], coords[1], coords[2], coords[3]);
            if w == 0 && h == 0 {
                Some(Point::new(x, y))
            } else {
                let dx = if w > 0 { rng.gen_range(0..w) } else { 0 };
                let dy = if h > 0 { rng.gen_range(0..h) } else { 0 };
                Some(Point::new(x + dx, y + dy))
            }
        }
        Target::Coords(coords) if coords.len() >= 2 => Some(Point::new(coords[0], coords[1])),
        Target::Coords(_) => None,
        Target::Text(s) => resolve_point_from_text(store, s, result, is_swipe_end),
    }
}

fn resolve_point_from_text(
    store: &mut VariableStore,
    text: &str,
    result: &RecognitionResult,
    is_swipe_end: bool,
) -> Option<Point> {
    if !text.contains(['%', '[', '{']) {
        // No variable syntax at all: the spec's ambiguous "treat as node
        // name" fallback is deliberately rejected rather than silently
        // reusing the current recognition result (see DESIGN.md).
        return None;
    }

    let processed = interpolate(store, text);
    if let Some((x, y)) = parse_coord_pair(&processed) {
        return Some(Point::new(x, y));
    }

    if is_swipe_end {
        if let Some(name) = first_var_token(text, 'r') {
            if let Some(Value::Rect(rect)) = store.get(&name) {
                return Some(Point::new(rect.x2, rect.y2));
            }
        }
    }

    if let Some(name) = first_var_token(text, 'p') {
        if let Some(Value::Point(point)) = store.get(&name) {
            return Some(*point);
        }
    }

    None
}

/// Finds the first `%<prefix>name` token in `text`, e.g. `first_var_token(s,
/// 'p')` finds the first `%p...` reference.
fn first_var_token(text: &str, prefix: char) -> Option<String> {
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && text[i + 1..].starts_with(prefix) {
            let rest = &text[i + 1..];
            let len = 1 + rest
                .char_indices()
                .take_while(|&(idx, c)| idx == 0 || c.is_ascii_alphanumeric() || c == '_')
                .count();
            return Some(text[i..i + len].to_owned());
        }
        i += 1;
    }
    None
}

fn parse_coord_pair(s: &str) -> Option<(i64, i64)> {
    let (x, y) = s.trim().split_once(',')?;
    Some((x.trim().parse().ok()?, y.trim().parse().ok()?))
}

fn apply_offset(point: Point, rng: &mut impl Rng, offset: [i64; 4]) -> Point {
    let jitter_x = if offset[2] > 0 { rng.gen_range(0..offset[2]) } else { 0 };
    let jitter_y = if offset[3] > 0 { rng.gen_range(0..offset[3]) } else { 0 };
    Point::new(point.x + offset[0] + jitter_x, point.y + offset[1] + jitter_y)
}

/// Reason passed to [`crate::control::Control::stop`] by a `StopTask` action.
pub const STOP_TASK_REASON: &str = "Task stopped by StopTaskAction";

/// Outcome of resolving an action's arguments, ready for the input
/// collaborator or (for `StopTask`) the control surface.
#[derive(Debug, Clone)]
pub enum ResolvedArgs {
    None,
    Click { point: Point },
    Swipe { begin: Point, end: Point, duration_ms: u64 },
    Key { codes: Vec<i64> },
    Text { text: String },
    StartApp { package: String },
    StopApp { package: String },
    Command { exec: String, args: Vec<String>, detach: bool },
    StopTask { reason: &'static str },
}

/// A parsed action: the dispatch tag plus its static config, ready to be
/// resolved against a recognition result and the variable store.
#[derive(Debug, Clone)]
pub struct Action {
    pub kind: ActionKind,
    config: Json,
}

impl Action {
    /// Parses a node's `action` field, defaulting to `DoNothing` when
    /// absent, following the same string-or-object duality as recognition.
    #[must_use]
    pub fn parse(field: Option<&Json>) -> Self {
        match field {
            None => Self { kind: ActionKind::DoNothing, config: Json::Null },
            Some(Json::String(s)) => Self {
                kind: s.parse().unwrap_or_default(),
                config: Json::Null,
            },
            Some(obj @ Json::Object(map)) => {
                let kind = map
                    .get("type")
                    .and_then(Json::as_str)
                    .and_then(|s| s.parse().ok())
                    .unwrap_or_default();
                Self { kind, config: obj.clone() }
            }
            Some(_) => Self { kind: ActionKind::DoNothing, config: Json::Null },
        }
    }

    fn obj(&self) -> Option<&serde_json::Map<String, Json>> {
        self.config.as_object()
    }

    /// Resolves this action's arguments against the current recognition
    /// result and variable store. Mutation-bearing string fields (`Text`,
    /// `Command.args`) are run through `interpolate` here. `rng` is the
    /// executor's seeded generator, consulted for every randomized
    /// coordinate pick.
    pub fn resolve(
        &self,
        store: &mut VariableStore,
        rng: &mut impl Rng,
        result: &RecognitionResult,
    ) -> Option<ResolvedArgs> {
        match self.kind {
            ActionKind::DoNothing => Some(ResolvedArgs::None),
            ActionKind::Click => {
                let obj = self.obj();
                let target = Target::parse(obj.and_then(|o| o.get("target")));
                let offset = obj.map(|o| offset_of(o, "target_offset")).unwrap_or_default();
                let point = resolve_point(store, rng, &target, result, false)?;
                Some(ResolvedArgs::Click { point: apply_offset(point, rng, offset) })
            }
            ActionKind::Swipe => {
                let obj = self.obj();
                let begin_target = Target::parse(obj.and_then(|o| o.get("begin")));
                let end_target = Target::parse(obj.and_then(|o| o.get("end")));
                let begin_offset = obj.map(|o| offset_of(o, "begin_offset")).unwrap_or_default();
                let end_offset = obj.map(|o| offset_of(o, "end_offset")).unwrap_or_default();
                let duration_ms = obj.and_then(|o| o.get("duration")).and_then(Json::as_u64).unwrap_or(300);

                let begin = apply_offset(resolve_point(store, rng, &begin_target, result, false)?, rng, begin_offset);
                let end = apply_offset(resolve_point(store, rng, &end_target, result, true)?, rng, end_offset);

                record_swipe_variables(store, begin, end);
                Some(ResolvedArgs::Swipe { begin, end, duration_ms })
            }
            ActionKind::Key => {
                let codes = self
                    .obj()
                    .and_then(|o| o.get("key"))
                    .and_then(Json::as_array)
                    .map(|items| items.iter().filter_map(Json::as_i64).collect())
                    .unwrap_or_default();
                Some(ResolvedArgs::Key { codes })
            }
            ActionKind::Text => {
                let raw = self.obj().and_then(|o| o.get("text")).and_then(Json::as_str).unwrap_or_default();
                Some(ResolvedArgs::Text { text: interpolate(store, raw) })
            }
            ActionKind::StartApp => {
                let package = self.obj().and_then(|o| o.get("package")).and_then(Json::as_str).unwrap_or_default();
                Some(ResolvedArgs::StartApp { package: package.to_owned() })
            }
            ActionKind::StopApp => {
                let package = self.obj().and_then(|o| o.get("package")).and_then(Json::as_str).unwrap_or_default();
                Some(ResolvedArgs::StopApp { package: package.to_owned() })
            }
            ActionKind::Command => {
                let obj = self.obj();
                let exec = obj.and_then(|o| o.get("exec")).and_then(Json::as_str).unwrap_or_default();
                let args = obj
                    .and_then(|o| o.get("args"))
                    .and_then(Json::as_array)
                    .map(|items| {
                        items
                            .iter()
                            .filter_map(Json::as_str)
                            .map(|a| interpolate(store, a))
                            .collect()
                    })
                    .unwrap_or_default();
                let detach = obj.and_then(|o| o.get("detach")).and_then(Json::as_bool).unwrap_or(false);
                Some(ResolvedArgs::Command { exec: interpolate(store, exec), args, detach })
            }
            ActionKind::StopTask => Some(ResolvedArgs::StopTask { reason: STOP_TASK_REASON }),
        }
    }
}

/// Defines (or overwrites) the three well-known swipe-derived variables
/// after a successful swipe, creating them on first use.
fn record_swipe_variables(store: &mut VariableStore, begin: Point, end: Point) {
    let area = Rect::bounding(begin, end);
    ensure_point(store, "%pLastSwipeBegin", begin);
    ensure_point(store, "%pLastSwipeEnd", end);
    ensure_rect(store, "%rLastSwipeArea", area);
}

fn ensure_point(store: &mut VariableStore, name: &str, value: Point) {
    if store.get(name).is_none() {
        let _ = store.define(name, crate::variable::VarType::Point);
    }
    let _ = store.set(name, Value::Point(value));
}

fn ensure_rect(store: &mut VariableStore, name: &str, value: Rect) {
    if store.get(name).is_none() {
        let _ = store.define(name, crate::variable::VarType::Rect);
    }
    let _ = store.set(name, Value::Rect(value));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> VariableStore {
        VariableStore::new()
    }

    fn rng() -> rand_chacha::ChaCha8Rng {
        use rand::SeedableRng;
        rand_chacha::ChaCha8Rng::seed_from_u64(42)
    }

    fn success_result(rect: Rect) -> RecognitionResult {
        RecognitionResult { success: true, rect, score: 1.0, text: String::new() }
    }

    #[test]
    fn click_target_true_uses_recognition_center() {
        let action = Action::parse(Some(&serde_json::json!({"type": "Click", "target": true})));
        let mut s = store();
        let resolved = action.resolve(&mut s, &mut rng(), &success_result(Rect::new(0, 0, 10, 20))).unwrap();
        match resolved {
            ResolvedArgs::Click { point } => assert_eq!(point, Point::new(5, 10)),
            _ => panic!("expected Click"),
        }
    }

    #[test]
    fn click_target_fixed_point_array() {
        let action = Action::parse(Some(&serde_json::json!({"type": "Click", "target": [3, 4]})));
        let mut s = store();
        let resolved = action.resolve(&mut s, &mut rng(), &RecognitionResult::failure()).unwrap();
        match resolved {
            ResolvedArgs::Click { point } => assert_eq!(point, Point::new(3, 4)),
            _ => panic!("expected Click"),
        }
    }

    #[test]
    fn click_target_zero_size_rect_is_fixed_point() {
        let action = Action::parse(Some(&serde_json::json!({"type": "Click", "target": [3, 4, 0, 0]})));
        let mut s = store();
        let resolved = action.resolve(&mut s, &mut rng(), &RecognitionResult::failure()).unwrap();
        match resolved {
            ResolvedArgs::Click { point } => assert_eq!(point, Point::new(3, 4)),
            _ => panic!("expected Click"),
        }
    }

    #[test]
    fn click_target_string_point_variable() {
        let mut s = store();
        s.parse_definition("%pStart=100,200").unwrap();
        let action = Action::parse(Some(&serde_json::json!({"type": "Click", "target": "%pStart"})));
        let resolved = action.resolve(&mut s, &mut rng(), &RecognitionResult::failure()).unwrap();
        match resolved {
            ResolvedArgs::Click { point } => assert_eq!(point, Point::new(100, 200)),
            _ => panic!("expected Click"),
        }
    }

    #[test]
    fn click_target_plain_string_with_no_variable_syntax_fails() {
        let action = Action::parse(Some(&serde_json::json!({"type": "Click", "target": "SomeOtherNode"})));
        let mut s = store();
        assert!(action.resolve(&mut s, &mut rng(), &RecognitionResult::failure()).is_none());
    }

    #[test]
    fn swipe_records_derived_variables() {
        let mut s = store();
        let action = Action::parse(Some(
            &serde_json::json!({"type": "Swipe", "begin": [0, 0], "end": [10, 10]}),
        ));
        action.resolve(&mut s, &mut rng(), &RecognitionResult::failure()).unwrap();
        assert_eq!(s.get("%pLastSwipeBegin"), Some(&Value::Point(Point::new(0, 0))));
        assert_eq!(s.get("%pLastSwipeEnd"), Some(&Value::Point(Point::new(10, 10))));
        assert_eq!(s.get("%rLastSwipeArea"), Some(&Value::Rect(Rect::new(0, 0, 10, 10))));
    }

    #[test]
    fn swipe_end_string_uses_rect_bottom_right() {
        let mut s = store();
        s.parse_definition("%rArea=1,2,30,40").unwrap();
        let action = Action::parse(Some(
            &serde_json::json!({"type": "Swipe", "begin": [0, 0], "end": "%rArea"}),
        ));
        match action.resolve(&mut s, &mut rng(), &RecognitionResult::failure()).unwrap() {
            ResolvedArgs::Swipe { end, .. } => assert_eq!(end, Point::new(30, 40)),
            _ => panic!("expected Swipe"),
        }
    }

    #[test]
    fn stop_task_resolves_to_fixed_reason() {
        let action = Action::parse(Some(&serde_json::json!("StopTask")));
        let mut s = store();
        match action.resolve(&mut s, &mut rng(), &RecognitionResult::failure()).unwrap() {
            ResolvedArgs::StopTask { reason } => assert_eq!(reason, STOP_TASK_REASON),
            _ => panic!("expected StopTask"),
        }
    }

    #[test]
    fn text_action_interpolates_before_dispatch() {
        let mut s = store();
        s.parse_definition("%iK=5").unwrap();
        let action = Action::parse(Some(&serde_json::json!({"type": "Text", "text": "v=[%iK]"})));
        match action.resolve(&mut s, &mut rng(), &RecognitionResult::failure()).unwrap() {
            ResolvedArgs::Text { text } => assert_eq!(text, "v=5"),
            _ => panic!("expected Text"),
        }
    }
}
