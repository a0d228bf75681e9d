//! Script sandbox bridge
//!
//! Transformation scripts are written in Rhai. A [`ScriptEngine`] is built
//! once with the standard package and the `helpers` module, each stage's
//! script is compiled once, and every matched fragment runs it with its own
//! [`ScriptContext`]. Values the script leaves in scope are read back as a
//! [`ScriptOutput`].
//!
//! Any compile or runtime failure is a [`ScriptError`](crate::ScriptError),
//! which aborts the run.

mod context;
mod engine;
pub mod helpers;
mod output;

pub use context::{ScriptContext, ScriptValue, FULL_HOMEPAGE_URL_VAR, HOMEPAGE_URL_VAR};
pub use engine::{CompiledScript, ScriptEngine, StageScripts};
pub use output::ScriptOutput;
