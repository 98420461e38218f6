//! Node model (component C5).
//!
//! A parsed, largely-immutable node: its recognition/action pair, successor
//! lists, condition, timing, and the `condition_process`-driven override
//! mechanism. The only mutable state after load is the pair of override
//! lists, which the executor clears at the start of every step on that
//! node (§4.5).

use serde_json::Value as Json;

use crate::action::Action;
use crate::recognition::Recognition;

const DEFAULT_TIMEOUT_MS: u64 = 20_000;
const DEFAULT_PRE_DELAY_MS: u64 = 200;
const DEFAULT_POST_DELAY_MS: u64 = 200;

/// One `condition_process.{true,false}` branch: the overrides and side
/// effects triggered when the node's condition evaluates to that value.
#[derive(Debug, Clone, Default)]
pub struct ConditionBranch {
    pub override_next: Vec<String>,
    pub override_interrupt: Vec<String>,
    pub var_operation: Option<String>,
    pub condition_log: Option<String>,
}

/// `condition_process: {true?: Branch, false?: Branch}`.
///
/// The original C++ source left the `false` branch's `override_next` /
/// `override_interrupt` unset at parse time (a stray optimization that
/// silently dropped the branch meant to fire on a failed condition); here
/// both branches are parsed and consulted symmetrically, matching what
/// spec.md's component design actually requires.
#[derive(Debug, Clone, Default)]
pub struct ConditionProcess {
    pub on_true: ConditionBranch,
    pub on_false: ConditionBranch,
}

impl ConditionProcess {
    fn branch(&self, condition_result: bool) -> &ConditionBranch {
        if condition_result {
            &self.on_true
        } else {
            &self.on_false
        }
    }
}

fn parse_branch(value: &Json) -> ConditionBranch {
    let Some(obj) = value.as_object() else {
        return ConditionBranch::default();
    };
    ConditionBranch {
        override_next: string_list(obj.get("override_next")),
        override_interrupt: string_list(obj.get("override_interrupt")),
        var_operation: obj.get("var_operation").and_then(Json::as_str).map(str::to_owned),
        condition_log: obj.get("condition_log").and_then(Json::as_str).map(str::to_owned),
    }
}

/// Coerces a `string | array<string> | absent` JSON field into a `Vec`,
/// per the "string coerces to a one-element list" rule used throughout
/// the document (§4.5).
fn string_list(value: Option<&Json>) -> Vec<String> {
    match value {
        Some(Json::String(s)) => vec![s.clone()],
        Some(Json::Array(items)) => items.iter().filter_map(Json::as_str).map(str::to_owned).collect(),
        _ => Vec::new(),
    }
}

/// A parsed node. Construct via [`Node::parse`]; the override lists are the
/// only fields the executor mutates afterward.
#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    pub recognition: Recognition,
    pub action: Action,
    pub next: Vec<String>,
    pub interrupt: Vec<String>,
    pub on_error: Vec<String>,
    pub var_definitions: Vec<String>,
    pub condition: Option<String>,
    pub condition_process: Option<ConditionProcess>,
    pub log_true: Option<String>,
    pub log_false: Option<String>,
    pub enabled: bool,
    pub timeout_ms: u64,
    pub pre_delay_ms: u64,
    pub post_delay_ms: u64,
    pub focus: bool,

    /// Cleared at the start of every step; populated by `apply_condition_process`.
    pub override_next: Vec<String>,
    pub override_interrupt: Vec<String>,
}

impl Node {
    /// Parses one node's JSON config. Unknown fields are ignored (§4.6); a
    /// missing `recognition`/`action` default to `DirectHit`/`DoNothing`.
    #[must_use]
    pub fn parse(name: &str, config: &Json) -> Self {
        let obj = config.as_object();

        let recognition = Recognition::parse(obj.and_then(|o| o.get("recognition")));
        let action = Action::parse(obj.and_then(|o| o.get("action")));

        let next = string_list(obj.and_then(|o| o.get("next")));
        let interrupt = string_list(obj.and_then(|o| o.get("interrupt")));
        let on_error = string_list(obj.and_then(|o| o.get("on_error")));
        let var_definitions = string_list(obj.and_then(|o| o.get("var")));

        let condition = obj
            .and_then(|o| o.get("condition"))
            .and_then(Json::as_str)
            .map(str::to_owned);

        let condition_process = obj.and_then(|o| o.get("condition_process")).and_then(Json::as_object).map(|cp| {
            ConditionProcess {
                on_true: cp.get("true").map(parse_branch).unwrap_or_default(),
                on_false: cp.get("false").map(parse_branch).unwrap_or_default(),
            }
        });

        let log_obj = obj.and_then(|o| o.get("log")).and_then(Json::as_object);
        let log_true = log_obj.and_then(|l| l.get("true")).and_then(Json::as_str).map(str::to_owned);
        let log_false = log_obj.and_then(|l| l.get("false")).and_then(Json::as_str).map(str::to_owned);

        let enabled = obj.and_then(|o| o.get("enabled")).and_then(Json::as_bool).unwrap_or(true);
        let timeout_ms = obj.and_then(|o| o.get("timeout")).and_then(Json::as_u64).unwrap_or(DEFAULT_TIMEOUT_MS);
        let pre_delay_ms = obj.and_then(|o| o.get("pre_delay")).and_then(Json::as_u64).unwrap_or(DEFAULT_PRE_DELAY_MS);
        let post_delay_ms =
            obj.and_then(|o| o.get("post_delay")).and_then(Json::as_u64).unwrap_or(DEFAULT_POST_DELAY_MS);
        let focus = obj.and_then(|o| o.get("focus")).and_then(Json::as_bool).unwrap_or(false);

        Self {
            name: name.to_owned(),
            recognition,
            action,
            next,
            interrupt,
            on_error,
            var_definitions,
            condition,
            condition_process,
            log_true,
            log_false,
            enabled,
            timeout_ms,
            pre_delay_ms,
            post_delay_ms,
            focus,
            override_next: Vec::new(),
            override_interrupt: Vec::new(),
        }
    }

    /// The successor list in effect for this step: the override list when
    /// non-empty, else the statically-configured list.
    #[must_use]
    pub fn effective_next(&self) -> &[String] {
        if self.override_next.is_empty() {
            &self.next
        } else {
            &self.override_next
        }
    }

    /// As [`Node::effective_next`], for `interrupt`.
    #[must_use]
    pub fn effective_interrupt(&self) -> &[String] {
        if self.override_interrupt.is_empty() {
            &self.interrupt
        } else {
            &self.override_interrupt
        }
    }

    /// Clears both override lists. Called at the start of every step on
    /// this node, before `apply_condition_process`.
    pub fn clear_overrides(&mut self) {
        self.override_next.clear();
        self.override_interrupt.clear();
    }

    /// Installs the override lists for `condition_result`'s branch. Returns
    /// that branch's `var_operation` and `condition_log`, left for the
    /// caller to run through the expression engine (this type has no
    /// access to the variable store).
    pub fn apply_condition_process(&mut self, condition_result: bool) -> (Option<String>, Option<String>) {
        let Some(cp) = &self.condition_process else {
            return (None, None);
        };
        let branch = cp.branch(condition_result);
        self.override_next = branch.override_next.clone();
        self.override_interrupt = branch.override_interrupt.clone();
        (branch.var_operation.clone(), branch.condition_log.clone())
    }

    /// The post-action log template for `success`, if configured.
    #[must_use]
    pub fn log_for(&self, success: bool) -> Option<&str> {
        if success {
            self.log_true.as_deref()
        } else {
            self.log_false.as_deref()
        }
    }
}
