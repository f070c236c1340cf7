use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WarningKind {
    DynamicDispatch,
    ExecEval,
    AttributeRebinding,
    Decorator,
    Metaclass,
    BrokenReference,
    ParseError,
    DetectorFailed,
}

impl WarningKind {
    /// The config pattern-type name used by suppression rules. Only the
    /// dynamic-pattern kinds are suppressible (§6 pattern-type name set).
    pub fn suppression_key(self) -> Option<&'static str> {
        match self {
            WarningKind::DynamicDispatch => Some("dynamic_dispatch"),
            WarningKind::ExecEval => Some("exec_eval"),
            WarningKind::AttributeRebinding => Some("attribute_rebinding"),
            WarningKind::Decorator => Some("decorator"),
            WarningKind::Metaclass => Some("metaclass"),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

/// A structured warning for a pattern that could not be statically
/// resolved, or an operational event (broken reference, parse failure)
/// that callers may want to inspect or filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Warning {
    pub kind: WarningKind,
    pub file: String,
    pub line: u32,
    pub severity: Severity,
    pub pattern: String,
    pub message: String,
    pub timestamp: f64,
    pub explanation: Option<String>,
    pub column: Option<u32>,
    pub metadata: HashMap<String, String>,
    pub is_test_module: bool,
}

impl Warning {
    pub fn new(
        kind: WarningKind,
        file: impl Into<String>,
        line: u32,
        pattern: impl Into<String>,
        message: impl Into<String>,
        timestamp: f64,
    ) -> Self {
        let file = file.into();
        let is_test_module = is_test_module_path(&file);
        Self {
            kind,
            file,
            line,
            severity: Severity::Warning,
            pattern: pattern.into(),
            message: message.into(),
            timestamp,
            explanation: None,
            column: None,
            metadata: HashMap::new(),
            is_test_module,
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_explanation(mut self, explanation: impl Into<String>) -> Self {
        self.explanation = Some(explanation.into());
        self
    }

    pub fn with_column(mut self, column: u32) -> Self {
        self.column = Some(column);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A file counts as a "test module" if any path component looks like a
/// test directory/file, matching the classifier callers use to filter
/// warnings from test code separately from production code.
fn is_test_module_path(file: &str) -> bool {
    std::path::Path::new(file).components().any(|c| {
        let s = c.as_os_str().to_string_lossy();
        s == "tests" || s == "test" || s.starts_with("test_") || s.ends_with("_test.py")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_test_modules() {
        let w = Warning::new(
            WarningKind::ExecEval,
            "tests/test_foo.py",
            1,
            "exec",
            "uses exec()",
            0.0,
        );
        assert!(w.is_test_module);
    }

    #[test]
    fn non_test_modules_not_classified() {
        let w = Warning::new(WarningKind::ExecEval, "pkg/mod.py", 1, "exec", "uses exec()", 0.0);
        assert!(!w.is_test_module);
    }

    #[test]
    fn suppression_key_only_for_dynamic_patterns() {
        assert_eq!(WarningKind::Decorator.suppression_key(), Some("decorator"));
        assert_eq!(WarningKind::BrokenReference.suppression_key(), None);
    }
}
