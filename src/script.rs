//! Script execution against per-request bindings.
//!
//! Compiles user scripts (from files or inline strings) through the
//! bounded [`CompileCache`], wraps file scripts with the runtime's
//! injected prelude, executes artifacts under a per-artifact lock, and
//! translates runtime failures back to user-visible source lines.

use crate::cache::CompileCache;
use crate::config::ScriptSettings;
use crate::error::ScriptError;
use crate::runtime::{Bindings, ResponseBehaviour, RuntimeContext, RuntimeError, ScriptRuntime};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, trace};

/// Gauge name for the current compiled-script cache entry count.
pub const METRIC_SCRIPT_CACHE_ENTRIES: &str = "script_cache_entries";

/// Receiver for engine gauges. An absent sink is simply never called.
pub trait MetricsSink {
    /// Record the current value of a named gauge.
    fn record_gauge(&self, name: &str, value: f64);
}

/// Script source with the runtime prelude injected ahead of it.
struct WrappedScript {
    source: String,
    prelude_lines: u32,
}

/// Prefix the prelude onto user source, recording how many injected lines
/// precede user line 1.
fn wrap_script(prelude: &str, source: &str) -> WrappedScript {
    if prelude.is_empty() {
        return WrappedScript {
            source: source.to_string(),
            prelude_lines: 0,
        };
    }
    let mut wrapped = prelude.to_string();
    if !wrapped.ends_with('\n') {
        wrapped.push('\n');
    }
    let prelude_lines = wrapped.matches('\n').count() as u32;
    wrapped.push_str(source);
    WrappedScript {
        source: wrapped,
        prelude_lines,
    }
}

/// The reusable output of compiling script source.
pub struct CompiledScript<A> {
    artifact: A,
    /// Count of injected lines preceding user source
    prelude_lines: u32,
    /// When compilation completed
    compiled_at: DateTime<Utc>,
    /// Artifacts are not assumed reentrant; executions are serialized
    run_lock: Mutex<()>,
}

impl<A> CompiledScript<A> {
    /// When this artifact was compiled.
    pub fn compiled_at(&self) -> DateTime<Utc> {
        self.compiled_at
    }

    /// Count of injected lines preceding user source.
    pub fn prelude_lines(&self) -> u32 {
        self.prelude_lines
    }
}

/// Subtract the prelude offset from a runtime-reported line, flooring at
/// the first user line.
fn user_line(reported: Option<u32>, prelude_lines: u32) -> Option<u32> {
    reported.map(|line| line.saturating_sub(prelude_lines).max(1))
}

/// Drives script compilation and execution for mock responses.
///
/// Generic over the embedded [`ScriptRuntime`]; owns the process-lifetime
/// compiled-script cache. Safe to share across request workers.
pub struct ScriptEngine<R: ScriptRuntime> {
    runtime: R,
    cache: CompileCache<CompiledScript<R::Artifact>, ScriptError>,
    precompile: bool,
}

impl<R: ScriptRuntime> ScriptEngine<R> {
    /// Create an engine over the given runtime, sized per configuration.
    pub fn new(runtime: R, settings: &ScriptSettings) -> Self {
        Self {
            runtime,
            cache: CompileCache::new(settings.cache_entries),
            precompile: settings.precompile,
        }
    }

    /// Current compiled-script cache entry count (read-only gauge).
    pub fn cache_entries(&self) -> usize {
        self.cache.len()
    }

    /// Report engine gauges to a metrics sink.
    pub fn report_metrics(&self, sink: &dyn MetricsSink) {
        sink.record_gauge(METRIC_SCRIPT_CACHE_ENTRIES, self.cache.len() as f64);
    }

    /// Warm the cache for a file-backed script ahead of the request path.
    /// No-op unless precompilation is enabled; behaviour is otherwise
    /// identical to lazy compilation on first execution.
    pub fn init_script(&self, script_file: &Path) -> Result<(), ScriptError> {
        if self.precompile {
            debug!(script = %script_file.display(), "Precompiling script");
            self.compiled_file_script(script_file)?;
        }
        Ok(())
    }

    /// Warm the cache for an inline script.
    pub fn init_inline_script(&self, script_id: &str, script_code: &str) -> Result<(), ScriptError> {
        if self.precompile {
            debug!(script_id = %script_id, "Precompiling inline script");
            self.compiled_inline_script(script_id, script_code)?;
        }
        Ok(())
    }

    /// Execute a file-backed script and return the response behaviour it
    /// built. The script is compiled on first reference (keyed by its
    /// absolute path) and wrapped with the runtime's prelude.
    pub fn execute_script(
        &self,
        script_file: &Path,
        runtime_context: RuntimeContext,
    ) -> Result<ResponseBehaviour, ScriptError> {
        trace!(script = %script_file.display(), "Executing script file");

        let script_id = script_identity(script_file);
        let compiled = self.compiled_file_script(script_file)?;
        let bindings = Bindings::with_dsl(runtime_context, &script_id);

        {
            let _serialized = compiled.run_lock.lock();
            self.runtime
                .execute(&compiled.artifact, &bindings)
                .map_err(|e| execution_error(&script_id, e, compiled.prelude_lines))?;
        }
        Ok(bindings.into_response())
    }

    /// Execute an inline script and interpret its final value as a
    /// boolean. Any non-boolean result is `false`. Inline scripts carry no
    /// prelude and no convenience surface.
    pub fn eval_inline_script(
        &self,
        script_id: &str,
        script_code: &str,
        runtime_context: RuntimeContext,
    ) -> Result<bool, ScriptError> {
        trace!(script_id = %script_id, "Executing inline script");

        let compiled = self.compiled_inline_script(script_id, script_code)?;
        let bindings = Bindings::plain(runtime_context, script_id);

        let _serialized = compiled.run_lock.lock();
        let result = self
            .runtime
            .execute(&compiled.artifact, &bindings)
            .map_err(|e| execution_error(script_id, e, 0))?;
        Ok(matches!(result, serde_json::Value::Bool(true)))
    }

    fn compiled_file_script(
        &self,
        script_file: &Path,
    ) -> Result<std::sync::Arc<CompiledScript<R::Artifact>>, ScriptError> {
        let script_id = script_identity(script_file);
        self.cache
            .get_or_compile(&script_id, || {
                trace!(script = %script_file.display(), "Compiling script file");
                let compile_start = Instant::now();

                let source = std::fs::read_to_string(script_file).map_err(|e| {
                    ScriptError::Internal {
                        script_id: script_id.clone(),
                        message: format!("failed to read script source: {e}"),
                    }
                })?;
                let wrapped = wrap_script(self.runtime.prelude(), &source);

                let artifact = self.runtime.compile(&wrapped.source).map_err(|e| {
                    ScriptError::Compile {
                        script_id: script_id.clone(),
                        line: user_line(e.line, wrapped.prelude_lines),
                        message: e.message,
                    }
                })?;

                debug!(
                    script = %script_file.display(),
                    elapsed_ms = compile_start.elapsed().as_millis() as u64,
                    "Script compiled"
                );
                Ok(CompiledScript {
                    artifact,
                    prelude_lines: wrapped.prelude_lines,
                    compiled_at: Utc::now(),
                    run_lock: Mutex::new(()),
                })
            })
            .map_err(|e| (*e).clone())
    }

    fn compiled_inline_script(
        &self,
        script_id: &str,
        script_code: &str,
    ) -> Result<std::sync::Arc<CompiledScript<R::Artifact>>, ScriptError> {
        self.cache
            .get_or_compile(script_id, || {
                trace!(script_id = %script_id, "Compiling inline script");
                let artifact =
                    self.runtime
                        .compile(script_code)
                        .map_err(|e| ScriptError::Compile {
                            script_id: script_id.to_string(),
                            line: e.line,
                            message: e.message,
                        })?;
                Ok(CompiledScript {
                    artifact,
                    prelude_lines: 0,
                    compiled_at: Utc::now(),
                    run_lock: Mutex::new(()),
                })
            })
            .map_err(|e| (*e).clone())
    }
}

/// Cache identity for a file-backed script. Callers supply absolute paths;
/// the identity is the path's textual form.
fn script_identity(script_file: &Path) -> String {
    script_file.to_string_lossy().into_owned()
}

fn execution_error(script_id: &str, error: RuntimeError, prelude_lines: u32) -> ScriptError {
    ScriptError::Execution {
        script_id: script_id.to_string(),
        line: user_line(error.line, prelude_lines),
        message: error.message,
    }
}
