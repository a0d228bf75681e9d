use crate::config::ScraperDefinition;
use crate::script::context::{ScriptContext, ScriptValue, FULL_HOMEPAGE_URL_VAR, HOMEPAGE_URL_VAR};
use crate::script::helpers::{self, HELPERS_NAMESPACE};
use crate::script::ScriptOutput;
use crate::{ScriptError, ScriptResult};
use rhai::packages::{Package, StandardPackage};
use rhai::{Array, Dynamic, Engine, Module, Scope, AST};
use std::path::Path;
use std::sync::Arc;

const MAX_OPERATIONS: u64 = 5_000_000;
const MAX_CALL_LEVELS: usize = 32;
const MAX_STRING_SIZE: usize = 4 * 1024 * 1024;
const MAX_ARRAY_SIZE: usize = 100_000;
const MAX_MAP_SIZE: usize = 10_000;

/// The sandbox: a script engine with the standard package and the helper
/// module installed
///
/// The engine is configured completely inside the constructor and is
/// read-only afterwards; every compiled script shares it.
#[derive(Clone)]
pub struct ScriptEngine {
    engine: Arc<Engine>,
}

impl ScriptEngine {
    /// Engine with the built-in helper library
    pub fn new() -> Self {
        Self::with_helpers(helpers::build_module())
    }

    /// Engine with a caller-supplied helper module under `helpers::`
    pub fn with_helpers(helpers: Module) -> Self {
        let mut engine = Engine::new_raw();

        engine.register_global_module(StandardPackage::new().as_shared_module());
        engine.register_static_module(HELPERS_NAMESPACE, helpers.into());

        engine.set_max_operations(MAX_OPERATIONS);
        engine.set_max_call_levels(MAX_CALL_LEVELS);
        engine.set_max_expr_depths(64, 32);
        engine.set_max_string_size(MAX_STRING_SIZE);
        engine.set_max_array_size(MAX_ARRAY_SIZE);
        engine.set_max_map_size(MAX_MAP_SIZE);

        engine.on_print(|text| tracing::info!(target: "scene_scraper::script", "{}", text));
        engine.on_debug(|text, source, pos| {
            tracing::debug!(
                target: "scene_scraper::script",
                "{}:{} {}",
                source.unwrap_or("script"),
                pos,
                text
            )
        });

        Self {
            engine: Arc::new(engine),
        }
    }

    /// Reads and compiles a script file
    pub fn compile_file(&self, path: &Path) -> ScriptResult<CompiledScript> {
        let source = std::fs::read_to_string(path).map_err(|source| ScriptError::Read {
            path: path.display().to_string(),
            source,
        })?;
        self.compile_source(&path.display().to_string(), &source)
    }

    /// Compiles script source; `name` is used in error messages
    pub fn compile_source(&self, name: &str, source: &str) -> ScriptResult<CompiledScript> {
        let ast = self
            .engine
            .compile(source)
            .map_err(|e| ScriptError::Compile {
                path: name.to_string(),
                message: e.to_string(),
            })?;

        tracing::debug!("Compiled script {}", name);

        Ok(CompiledScript {
            name: name.to_string(),
            engine: Arc::clone(&self.engine),
            ast: Arc::new(ast),
        })
    }
}

impl Default for ScriptEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// A script compiled once per run and executed once per matched fragment
///
/// Each [`run`](CompiledScript::run) uses a fresh scope, so invocations
/// never see each other's bindings.
#[derive(Clone)]
pub struct CompiledScript {
    name: String,
    engine: Arc<Engine>,
    ast: Arc<AST>,
}

impl std::fmt::Debug for CompiledScript {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledScript")
            .field("name", &self.name)
            .finish()
    }
}

impl CompiledScript {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Binds the context, runs the script to completion and reads back
    /// its outputs
    pub fn run(&self, ctx: &ScriptContext) -> ScriptResult<ScriptOutput> {
        let mut scope = Scope::new();

        for (name, value) in ctx.vars() {
            tracing::trace!("Binding {} = {:?}", name, value);
            match value {
                ScriptValue::Text(text) => {
                    scope.push(name.to_string(), text.clone());
                }
                ScriptValue::List(items) => {
                    let array: Array = items.iter().cloned().map(Dynamic::from).collect();
                    scope.push(name.to_string(), array);
                }
            }
        }

        scope.push(HOMEPAGE_URL_VAR, ctx.homepage_url().to_string());
        scope.push(FULL_HOMEPAGE_URL_VAR, ctx.full_homepage_url().to_string());

        self.engine
            .run_ast_with_scope(&mut scope, &self.ast)
            .map_err(|e| ScriptError::Runtime {
                url: ctx.full_homepage_url().to_string(),
                message: format!("{} ({})", e, self.name),
            })?;

        ScriptOutput::from_scope(&scope)
    }
}

/// The compiled scripts of one run
#[derive(Debug, Clone)]
pub struct StageScripts {
    pub detail: CompiledScript,
    pub secondary: Option<CompiledScript>,
}

impl StageScripts {
    /// Compiles the detail script and, when the definition has a secondary
    /// stage, its script (resolved against the detail script's directory)
    pub fn load(
        engine: &ScriptEngine,
        definition: &ScraperDefinition,
        detail_path: &Path,
    ) -> ScriptResult<Self> {
        let detail = engine.compile_file(detail_path)?;

        let secondary = match definition.secondary_detail() {
            Some(stage) => {
                let dir = detail_path.parent().unwrap_or_else(|| Path::new("."));
                Some(engine.compile_file(&dir.join(&stage.script))?)
            }
            None => None,
        };

        Ok(Self { detail, secondary })
    }
}
