//! Recognition dispatcher (component C3).
//!
//! Maps a node's `recognition` config (a bare string or a `{type, ...}`
//! object) to one of seven [`RecognitionKind`]s, builds the typed parameter
//! struct for that kind from the surrounding JSON, and — at call time —
//! delegates to the [`crate::collaborators::VisionBackend`] collaborator.
//! The node's `inverse` flag is applied here, uniformly, after the
//! collaborator returns; individual kinds never see it.

use regex::Regex;
use serde_json::Value as Json;
use strum::{Display, EnumString};

use crate::collaborators::VisionBackend;
use crate::variable::Rect;

/// The seven recognition strategies a node may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Default)]
#[strum(serialize_all = "PascalCase")]
pub enum RecognitionKind {
    #[default]
    DirectHit,
    TemplateMatch,
    FindColor,
    FindMultiColor,
    FindColorList,
    FindMultiColorList,
    #[strum(serialize = "OCR")]
    Ocr,
}

/// How candidate matches are ordered before `index` selects one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Default)]
#[strum(serialize_all = "PascalCase")]
pub enum OrderBy {
    #[default]
    Horizontal,
    Vertical,
    Score,
    Area,
}

/// Color-space a [`FindColorParams`] comparison is performed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Default)]
#[strum(serialize_all = "PascalCase")]
pub enum ColorMethod {
    #[default]
    Rgb,
    Hsv,
}

/// A region of interest plus the additive offset applied after it resolves.
#[derive(Debug, Clone, Copy, Default)]
pub struct Roi {
    pub rect: Option<[i64; 4]>,
    pub offset: Option<[i64; 4]>,
}

#[derive(Debug, Clone)]
pub struct FindColorParams {
    pub roi: Roi,
    pub color: String,
    pub method: ColorMethod,
    pub similarity: f64,
    pub connected: bool,
}

#[derive(Debug, Clone)]
pub struct FindMultiColorParams {
    pub roi: Roi,
    pub first_color: String,
    pub other_colors: Vec<(i64, i64, String)>,
    pub similarity: f64,
}

#[derive(Debug, Clone)]
pub struct TemplateMatchParams {
    pub roi: Roi,
    pub templates: Vec<String>,
    pub threshold: f64,
    pub order_by: OrderBy,
    pub index: i64,
    pub method: String,
}

impl TemplateMatchParams {
    /// Resolved from the spec's ambiguous 0.7/0.8 default — see the
    /// Open Questions resolution recorded in `DESIGN.md`.
    pub const DEFAULT_THRESHOLD: f64 = 0.7;
}

#[derive(Debug, Clone, Default)]
pub struct OcrParams {
    pub roi: Roi,
    pub expected: Vec<String>,
    pub replace: Vec<(String, String)>,
    pub order_by: OrderBy,
    pub index: i64,
    pub only_rec: bool,
    pub model: Option<String>,
}

/// The fully resolved, typed parameters for one recognition attempt.
#[derive(Debug, Clone)]
pub enum RecognitionParams {
    DirectHit,
    TemplateMatch(TemplateMatchParams),
    FindColor(FindColorParams),
    FindMultiColor(FindMultiColorParams),
    FindColorList(Vec<FindColorParams>),
    FindMultiColorList(Vec<FindMultiColorParams>),
    Ocr(OcrParams),
}

/// Result of one recognition attempt, pre-`inverse`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecognitionResult {
    pub success: bool,
    pub rect: Rect,
    pub score: f64,
    pub text: String,
}

impl RecognitionResult {
    #[must_use]
    pub fn failure() -> Self {
        Self::default()
    }
}

fn roi_from(obj: &serde_json::Map<String, Json>) -> Roi {
    Roi {
        rect: obj.get("roi").and_then(array4),
        offset: obj.get("roi_offset").and_then(array4),
    }
}

fn array4(v: &Json) -> Option<[i64; 4]> {
    let arr = v.as_array()?;
    if arr.len() != 4 {
        return None;
    }
    let mut out = [0i64; 4];
    for (slot, item) in out.iter_mut().zip(arr) {
        *slot = item.as_i64()?;
    }
    Some(out)
}

fn string_list(v: &Json) -> Vec<String> {
    match v {
        Json::String(s) => vec![s.clone()],
        Json::Array(items) => items.iter().filter_map(|i| i.as_str().map(str::to_owned)).collect(),
        _ => Vec::new(),
    }
}

fn parse_find_color(obj: &serde_json::Map<String, Json>) -> FindColorParams {
    FindColorParams {
        roi: roi_from(obj),
        color: obj.get("color").and_then(Json::as_str).unwrap_or_default().to_owned(),
        method: obj
            .get("method")
            .and_then(Json::as_str)
            .and_then(|s| s.parse().ok())
            .unwrap_or_default(),
        similarity: obj.get("similarity").and_then(Json::as_f64).unwrap_or(1.0),
        connected: obj.get("connected").and_then(Json::as_bool).unwrap_or(false),
    }
}

fn parse_find_multi_color(obj: &serde_json::Map<String, Json>) -> FindMultiColorParams {
    let other_colors = obj
        .get("other_colors")
        .and_then(Json::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    let t = item.as_array()?;
                    Some((t.first()?.as_i64()?, t.get(1)?.as_i64()?, t.get(2)?.as_str()?.to_owned()))
                })
                .collect()
        })
        .unwrap_or_default();
    FindMultiColorParams {
        roi: roi_from(obj),
        first_color: obj.get("first_color").and_then(Json::as_str).unwrap_or_default().to_owned(),
        other_colors,
        similarity: obj.get("similarity").and_then(Json::as_f64).unwrap_or(1.0),
    }
}

fn parse_template_match(obj: &serde_json::Map<String, Json>) -> TemplateMatchParams {
    let templates = obj
        .get("template")
        .map(string_list)
        .unwrap_or_default();
    TemplateMatchParams {
        roi: roi_from(obj),
        templates,
        threshold: obj
            .get("threshold")
            .and_then(Json::as_f64)
            .unwrap_or(TemplateMatchParams::DEFAULT_THRESHOLD),
        order_by: obj
            .get("order_by")
            .and_then(Json::as_str)
            .and_then(|s| s.parse().ok())
            .unwrap_or_default(),
        index: obj.get("index").and_then(Json::as_i64).unwrap_or(0),
        method: obj.get("method").and_then(Json::as_str).unwrap_or("Ccoeff").to_owned(),
    }
}

fn parse_ocr(obj: &serde_json::Map<String, Json>) -> OcrParams {
    let replace = obj
        .get("replace")
        .and_then(Json::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    let pair = item.as_array()?;
                    Some((pair.first()?.as_str()?.to_owned(), pair.get(1)?.as_str()?.to_owned()))
                })
                .collect()
        })
        .unwrap_or_default();
    OcrParams {
        roi: roi_from(obj),
        expected: obj.get("expected").map(string_list).unwrap_or_default(),
        replace,
        order_by: obj
            .get("order_by")
            .and_then(Json::as_str)
            .and_then(|s| s.parse().ok())
            .unwrap_or_default(),
        index: obj.get("index").and_then(Json::as_i64).unwrap_or(0),
        only_rec: obj.get("only_rec").and_then(Json::as_bool).unwrap_or(false),
        model: obj.get("model").and_then(Json::as_str).map(str::to_owned),
    }
}

/// A parsed recognition: the dispatch tag plus its resolved parameters.
#[derive(Debug, Clone)]
pub struct Recognition {
    pub kind: RecognitionKind,
    pub params: RecognitionParams,
    pub inverse: bool,
}

impl Recognition {
    /// Parses a node's `recognition` field, which may be absent (defaulting
    /// to `DirectHit`), a bare string, or an object with a `type` tag.
    #[must_use]
    pub fn parse(field: Option<&Json>) -> Self {
        let (kind, config): (RecognitionKind, Option<&serde_json::Map<String, Json>>) = match field {
            None => (RecognitionKind::DirectHit, None),
            Some(Json::String(s)) => (s.parse().unwrap_or_default(), None),
            Some(Json::Object(obj)) => {
                let kind = obj
                    .get("type")
                    .and_then(Json::as_str)
                    .and_then(|s| s.parse().ok())
                    .unwrap_or_default();
                (kind, Some(obj))
            }
            Some(_) => (RecognitionKind::DirectHit, None),
        };

        let params = match (kind, config) {
            (RecognitionKind::DirectHit, _) => RecognitionParams::DirectHit,
            (RecognitionKind::TemplateMatch, Some(obj)) => RecognitionParams::TemplateMatch(parse_template_match(obj)),
            (RecognitionKind::FindColor, Some(obj)) => RecognitionParams::FindColor(parse_find_color(obj)),
            (RecognitionKind::FindMultiColor, Some(obj)) => {
                RecognitionParams::FindMultiColor(parse_find_multi_color(obj))
            }
            (RecognitionKind::FindColorList, Some(obj)) => {
                let list = obj
                    .get("list")
                    .and_then(Json::as_array)
                    .map(|items| {
                        items
                            .iter()
                            .filter_map(Json::as_object)
                            .map(parse_find_color)
                            .collect()
                    })
                    .unwrap_or_default();
                RecognitionParams::FindColorList(list)
            }
            (RecognitionKind::FindMultiColorList, Some(obj)) => {
                let list = obj
                    .get("list")
                    .and_then(Json::as_array)
                    .map(|items| {
                        items
                            .iter()
                            .filter_map(Json::as_object)
                            .map(parse_find_multi_color)
                            .collect()
                    })
                    .unwrap_or_default();
                RecognitionParams::FindMultiColorList(list)
            }
            (RecognitionKind::Ocr, Some(obj)) => RecognitionParams::Ocr(parse_ocr(obj)),
            // Tag present but no object-shaped config (e.g. old string form
            // with missing node-level params): fall back to the kind's
            // zero-value parameters.
            (RecognitionKind::TemplateMatch, None) => RecognitionParams::TemplateMatch(parse_template_match(&empty())),
            (RecognitionKind::FindColor, None) => RecognitionParams::FindColor(parse_find_color(&empty())),
            (RecognitionKind::FindMultiColor, None) => {
                RecognitionParams::FindMultiColor(parse_find_multi_color(&empty()))
            }
            (RecognitionKind::FindColorList, None) => RecognitionParams::FindColorList(Vec::new()),
            (RecognitionKind::FindMultiColorList, None) => RecognitionParams::FindMultiColorList(Vec::new()),
            (RecognitionKind::Ocr, None) => RecognitionParams::Ocr(OcrParams::default()),
        };

        let inverse = config.and_then(|o| o.get("inverse")).and_then(Json::as_bool).unwrap_or(false);
        Self { kind, params, inverse }
    }

    /// Applies the uniform `inverse` flip to a collaborator's raw result.
    #[must_use]
    pub fn apply_inverse(&self, mut result: RecognitionResult) -> RecognitionResult {
        if self.inverse {
            result.success = !result.success;
        }
        result
    }

    /// `DirectHit` never calls the vision collaborator.
    #[must_use]
    pub fn is_direct_hit(&self) -> bool {
        matches!(self.kind, RecognitionKind::DirectHit)
    }

    /// Runs this recognition to completion against `vision`: `DirectHit`
    /// short-circuits, list variants scan their constituents for the first
    /// success, `TemplateMatch` tries each template in order, and `OCR`
    /// goes through `recognize_batch` followed by index-selection — the
    /// decomposition named in §4.3, which collaborators are not expected to
    /// perform themselves. `inverse` is applied last, uniformly.
    pub fn evaluate(&self, vision: &mut impl VisionBackend) -> RecognitionResult {
        let raw = match &self.params {
            RecognitionParams::DirectHit => RecognitionResult { success: true, ..RecognitionResult::default() },
            RecognitionParams::FindColor(_) | RecognitionParams::FindMultiColor(_) => vision.recognize(&self.params),
            RecognitionParams::FindColorList(list) => first_success(list.iter(), |item| {
                vision.recognize(&RecognitionParams::FindColor(item.clone()))
            }),
            RecognitionParams::FindMultiColorList(list) => first_success(list.iter(), |item| {
                vision.recognize(&RecognitionParams::FindMultiColor(item.clone()))
            }),
            RecognitionParams::TemplateMatch(params) if params.templates.len() > 1 => {
                first_success(params.templates.iter(), |template| {
                    vision.recognize(&RecognitionParams::TemplateMatch(TemplateMatchParams {
                        templates: vec![template.clone()],
                        ..params.clone()
                    }))
                })
            }
            RecognitionParams::TemplateMatch(_) => vision.recognize(&self.params),
            RecognitionParams::Ocr(params) => evaluate_ocr(params, vision),
        };
        self.apply_inverse(raw)
    }
}

/// Runs the OCR pipeline: recognize a batch, apply `replace` to each hit's
/// text, keep only hits matching `expected` (literal or regex, empty list
/// accepts everything), then `select_indexed` the survivors. When nothing
/// survives and `only_rec` is set, the unfiltered batch's selection is
/// returned anyway so the text is still available to the node's templates,
/// with `success` left `false`.
fn evaluate_ocr(params: &OcrParams, vision: &mut impl VisionBackend) -> RecognitionResult {
    let mut batch = vision.recognize_batch(params);
    for hit in &mut batch {
        for (from, to) in &params.replace {
            hit.text = hit.text.replace(from.as_str(), to.as_str());
        }
    }

    let filtered: Vec<RecognitionResult> =
        batch.iter().filter(|hit| hit.success && matches_expected(&hit.text, &params.expected)).cloned().collect();

    if let Some(hit) = select_indexed(filtered, params.order_by, params.index) {
        return hit;
    }

    if params.only_rec {
        let text = select_indexed(batch, params.order_by, params.index).map(|hit| hit.text).unwrap_or_default();
        return RecognitionResult { text, ..RecognitionResult::failure() };
    }

    RecognitionResult::failure()
}

fn matches_expected(text: &str, expected: &[String]) -> bool {
    expected.is_empty()
        || expected
            .iter()
            .any(|pattern| text == pattern || Regex::new(pattern).is_ok_and(|re| re.is_match(text)))
}

/// Tries each item in order, returning the first successful result; if none
/// succeed, the last attempt's (failing) result.
fn first_success<T>(items: impl Iterator<Item = T>, mut attempt: impl FnMut(T) -> RecognitionResult) -> RecognitionResult {
    let mut last = RecognitionResult::failure();
    for item in items {
        last = attempt(item);
        if last.success {
            return last;
        }
    }
    last
}

fn empty() -> serde_json::Map<String, Json> {
    serde_json::Map::new()
}

/// Selects one match from an ordered batch using `order_by` then `index`
/// (negative counts from the end), matching the OCR/TemplateMatch list
/// selection policy shared across recognition kinds.
#[must_use]
pub fn select_indexed(mut matches: Vec<RecognitionResult>, order_by: OrderBy, index: i64) -> Option<RecognitionResult> {
    match order_by {
        OrderBy::Horizontal => matches.sort_by(|a, b| a.rect.x1.cmp(&b.rect.x1)),
        OrderBy::Vertical => matches.sort_by(|a, b| a.rect.y1.cmp(&b.rect.y1)),
        OrderBy::Score => matches.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal)),
        OrderBy::Area => matches.sort_by_key(|m| {
            let area = (m.rect.x2 - m.rect.x1) * (m.rect.y2 - m.rect.y1);
            std::cmp::Reverse(area)
        }),
    }
    let len = matches.len() as i64;
    let idx = if index < 0 { len + index } else { index };
    if idx < 0 || idx >= len {
        return None;
    }
    matches.into_iter().nth(idx as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_string_recognition() {
        let field = Json::String("FindColor".to_owned());
        let r = Recognition::parse(Some(&field));
        assert_eq!(r.kind, RecognitionKind::FindColor);
    }

    #[test]
    fn parses_object_recognition_with_type_tag() {
        let field = serde_json::json!({"type": "OCR", "expected": ["a", "b"]});
        let r = Recognition::parse(Some(&field));
        assert_eq!(r.kind, RecognitionKind::Ocr);
        match r.params {
            RecognitionParams::Ocr(p) => assert_eq!(p.expected, vec!["a".to_owned(), "b".to_owned()]),
            _ => panic!("expected Ocr params"),
        }
    }

    #[test]
    fn missing_recognition_defaults_to_direct_hit() {
        let r = Recognition::parse(None);
        assert_eq!(r.kind, RecognitionKind::DirectHit);
        assert!(r.is_direct_hit());
    }

    #[test]
    fn inverse_flips_success() {
        let field = serde_json::json!({"type": "DirectHit", "inverse": true});
        let r = Recognition::parse(Some(&field));
        let result = r.apply_inverse(RecognitionResult { success: true, ..Default::default() });
        assert!(!result.success);
    }

    #[test]
    fn select_indexed_negative_counts_from_end() {
        let matches = vec![
            RecognitionResult { text: "a".into(), rect: Rect::new(0, 0, 1, 1), ..Default::default() },
            RecognitionResult { text: "b".into(), rect: Rect::new(2, 0, 3, 1), ..Default::default() },
            RecognitionResult { text: "c".into(), rect: Rect::new(4, 0, 5, 1), ..Default::default() },
        ];
        let picked = select_indexed(matches, OrderBy::Horizontal, -1).unwrap();
        assert_eq!(picked.text, "c");
    }

    #[test]
    fn select_indexed_out_of_range_is_none() {
        let matches = vec![RecognitionResult::default()];
        assert!(select_indexed(matches, OrderBy::Horizontal, 5).is_none());
    }

    /// Scripted [`VisionBackend`] for dispatch tests: `recognize` pops from
    /// a queue of outcomes keyed by call order, `recognize_batch` returns a
    /// fixed OCR batch regardless of input.
    struct ScriptedVision {
        calls: Vec<RecognitionResult>,
        batch: Vec<RecognitionResult>,
    }

    impl VisionBackend for ScriptedVision {
        fn recognize(&mut self, _params: &RecognitionParams) -> RecognitionResult {
            if self.calls.is_empty() {
                RecognitionResult::failure()
            } else {
                self.calls.remove(0)
            }
        }

        fn recognize_batch(&mut self, _params: &OcrParams) -> Vec<RecognitionResult> {
            self.batch.clone()
        }
    }

    fn hit(text: &str) -> RecognitionResult {
        RecognitionResult { success: true, text: text.to_owned(), ..Default::default() }
    }

    #[test]
    fn evaluate_direct_hit_never_calls_backend() {
        let r = Recognition::parse(None);
        let mut vision = ScriptedVision { calls: Vec::new(), batch: Vec::new() };
        assert!(r.evaluate(&mut vision).success);
    }

    #[test]
    fn evaluate_ocr_selects_by_index_from_batch() {
        let field = serde_json::json!({"type": "OCR", "index": -1});
        let r = Recognition::parse(Some(&field));
        let mut vision = ScriptedVision {
            calls: Vec::new(),
            batch: vec![
                RecognitionResult { text: "a".into(), rect: Rect::new(0, 0, 1, 1), success: true, ..Default::default() },
                RecognitionResult { text: "b".into(), rect: Rect::new(2, 0, 3, 1), success: true, ..Default::default() },
                RecognitionResult { text: "c".into(), rect: Rect::new(4, 0, 5, 1), success: true, ..Default::default() },
            ],
        };
        let result = r.evaluate(&mut vision);
        assert_eq!(result.text, "c");
    }

    #[test]
    fn evaluate_find_color_list_returns_first_success() {
        let field = serde_json::json!({
            "type": "FindColorList",
            "list": [{"color": "000000"}, {"color": "FFFFFF"}],
        });
        let r = Recognition::parse(Some(&field));
        let mut vision = ScriptedVision { calls: vec![RecognitionResult::failure(), hit("second")], batch: Vec::new() };
        let result = r.evaluate(&mut vision);
        assert!(result.success);
        assert_eq!(result.text, "second");
    }

    #[test]
    fn evaluate_template_match_tries_each_template_in_order() {
        let field = serde_json::json!({"type": "TemplateMatch", "template": ["a.png", "b.png"]});
        let r = Recognition::parse(Some(&field));
        let mut vision = ScriptedVision { calls: vec![RecognitionResult::failure(), hit("b.png")], batch: Vec::new() };
        let result = r.evaluate(&mut vision);
        assert!(result.success);
        assert_eq!(result.text, "b.png");
    }

    #[test]
    fn evaluate_ocr_filters_by_expected_before_selecting() {
        let field = serde_json::json!({"type": "OCR", "expected": ["confirm"]});
        let r = Recognition::parse(Some(&field));
        let mut vision = ScriptedVision {
            calls: Vec::new(),
            batch: vec![hit("cancel"), hit("confirm")],
        };
        let result = r.evaluate(&mut vision);
        assert!(result.success);
        assert_eq!(result.text, "confirm");
    }

    #[test]
    fn evaluate_ocr_applies_replace_before_matching_expected() {
        let field = serde_json::json!({"type": "OCR", "expected": ["OK"], "replace": [["confirm", "OK"]]});
        let r = Recognition::parse(Some(&field));
        let mut vision = ScriptedVision { calls: Vec::new(), batch: vec![hit("confirm")] };
        let result = r.evaluate(&mut vision);
        assert!(result.success);
        assert_eq!(result.text, "OK");
    }

    #[test]
    fn evaluate_ocr_expected_regex_set_matches() {
        let field = serde_json::json!({"type": "OCR", "expected": [r"^\d+$"]});
        let r = Recognition::parse(Some(&field));
        let mut vision = ScriptedVision { calls: Vec::new(), batch: vec![hit("abc"), hit("42")] };
        let result = r.evaluate(&mut vision);
        assert!(result.success);
        assert_eq!(result.text, "42");
    }

    #[test]
    fn evaluate_ocr_only_rec_returns_text_on_failed_match() {
        let field = serde_json::json!({"type": "OCR", "expected": ["never-matches"], "only_rec": true});
        let r = Recognition::parse(Some(&field));
        let mut vision = ScriptedVision { calls: Vec::new(), batch: vec![hit("whatever")] };
        let result = r.evaluate(&mut vision);
        assert!(!result.success);
        assert_eq!(result.text, "whatever");
    }

    #[test]
    fn evaluate_ocr_without_only_rec_returns_empty_text_on_failed_match() {
        let field = serde_json::json!({"type": "OCR", "expected": ["never-matches"]});
        let r = Recognition::parse(Some(&field));
        let mut vision = ScriptedVision { calls: Vec::new(), batch: vec![hit("whatever")] };
        let result = r.evaluate(&mut vision);
        assert!(!result.success);
        assert_eq!(result.text, "");
    }

    #[test]
    fn evaluate_applies_inverse_after_dispatch() {
        let field = serde_json::json!({"type": "FindColor", "color": "000000", "inverse": true});
        let r = Recognition::parse(Some(&field));
        let mut vision = ScriptedVision { calls: vec![hit("x")], batch: Vec::new() };
        assert!(!r.evaluate(&mut vision).success);
    }
}
