#![doc = include_str!("../README.md")]

mod action;
mod collaborators;
mod control;
mod error;
mod executor;
mod expr;
mod graph;
mod node;
mod recognition;
mod variable;

pub use action::{Action, ActionKind, ResolvedArgs, STOP_TASK_REASON};
pub use collaborators::{
    Clock, CollectLogSink, FakeClock, InputBackend, LogSink, NoopInput, NoopVision, NullLogSink, SystemClock,
    VisionBackend,
};
pub use control::{Control, ExecutorState};
pub use error::{ExprError, LoadError, VariableError};
pub use executor::Executor;
pub use expr::{apply_mutation, evaluate_condition, interpolate};
pub use graph::{load, load_value, Graph};
pub use node::{ConditionBranch, ConditionProcess, Node};
pub use recognition::{
    select_indexed, ColorMethod, FindColorParams, FindMultiColorParams, OcrParams, OrderBy, Recognition,
    RecognitionKind, RecognitionParams, RecognitionResult, Roi, TemplateMatchParams,
};
pub use variable::{Point, Rect, VarType, VariableStore, Value};
