//! Script error kinds surfaced to the mock-response pipeline.

use thiserror::Error;

/// Failure raised while compiling or executing a user script.
///
/// Line numbers are user-visible: any line reported by the underlying
/// runtime has the injected prelude offset already subtracted, so file
/// and inline script errors both point at user-authored lines.
#[derive(Debug, Clone, Error)]
pub enum ScriptError {
    /// The script source failed to compile. Fatal to the triggering
    /// invocation only; the cache retries compilation on the next call.
    #[error("failed to compile script: {script_id}{}: {message}", format_line(.line))]
    Compile {
        /// Script identity (file path or inline id)
        script_id: String,
        /// User-visible source line, when derivable
        line: Option<u32>,
        /// Failure detail from the runtime
        message: String,
    },

    /// The compiled artifact raised during evaluation. The artifact
    /// remains cached and usable for subsequent invocations.
    #[error("script execution terminated abnormally: {script_id}{}: {message}", format_line(.line))]
    Execution {
        /// Script identity (file path or inline id)
        script_id: String,
        /// User-visible source line, when derivable
        line: Option<u32>,
        /// Failure detail from the runtime
        message: String,
    },

    /// Any other unexpected fault, such as I/O reading script source.
    #[error("script engine failure: {script_id}: {message}")]
    Internal {
        /// Script identity (file path or inline id)
        script_id: String,
        /// Original cause, preserved for diagnostics
        message: String,
    },
}

impl ScriptError {
    /// The identity of the script this error relates to.
    pub fn script_id(&self) -> &str {
        match self {
            ScriptError::Compile { script_id, .. }
            | ScriptError::Execution { script_id, .. }
            | ScriptError::Internal { script_id, .. } => script_id,
        }
    }

    /// The user-visible source line, when the runtime reported one.
    pub fn line(&self) -> Option<u32> {
        match self {
            ScriptError::Compile { line, .. } | ScriptError::Execution { line, .. } => *line,
            ScriptError::Internal { .. } => None,
        }
    }
}

fn format_line(line: &Option<u32>) -> String {
    line.map(|l| format!(" (line {l})")).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_line_when_present() {
        let error = ScriptError::Execution {
            script_id: "/scripts/response.js".to_string(),
            line: Some(7),
            message: "oops".to_string(),
        };
        let rendered = error.to_string();
        assert!(rendered.contains("/scripts/response.js"));
        assert!(rendered.contains("line 7"));
        assert!(rendered.contains("oops"));
    }

    #[test]
    fn test_display_omits_line_when_absent() {
        let error = ScriptError::Compile {
            script_id: "anon-1".to_string(),
            line: None,
            message: "bad token".to_string(),
        };
        assert!(!error.to_string().contains("line"));
    }
}
