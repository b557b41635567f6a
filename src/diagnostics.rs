/*
Copyright 2025 The SN/X Project Developers

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

//! Diagnostic model: codes, severities, source spans, related-info chains and
//! the append-only collector shared by the whole pipeline.

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Info => write!(f, "info"),
        }
    }
}

/// Source region: 1-based, inclusive start, exclusive end column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SourceSpan {
    pub start_line: usize,
    pub start_col: usize,
    pub end_line: usize,
    pub end_col: usize,
}

impl SourceSpan {
    pub fn new(start_line: usize, start_col: usize, end_line: usize, end_col: usize) -> Self {
        SourceSpan {
            start_line,
            start_col,
            end_line,
            end_col,
        }
    }
}

impl fmt::Display for SourceSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start_line == self.end_line {
            write!(f, "{}:{}-{}", self.start_line, self.start_col, self.end_col)
        } else {
            write!(
                f,
                "{}:{}-{}:{}",
                self.start_line, self.start_col, self.end_line, self.end_col
            )
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelatedInfo {
    pub message: String,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub code: String,
    pub message: String,
    pub severity: Severity,
    pub span: SourceSpan,
    pub related: Vec<RelatedInfo>,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {} at {}",
            self.code, self.severity, self.message, self.span
        )?;
        for r in &self.related {
            write!(f, "\n  - {} at {}", r.message, r.span)?;
        }
        Ok(())
    }
}

/// Append-only diagnostic sink. Remembers the first error reported on each
/// source line so that later errors on the same line can point back at it
/// instead of reading as independent problems.
#[derive(Debug, Default)]
pub struct DiagnosticCollector {
    diagnostics: Vec<Diagnostic>,
    line_primary: HashMap<usize, usize>,
}

impl DiagnosticCollector {
    pub fn new() -> Self {
        DiagnosticCollector::default()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    pub fn has_warnings(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Warning)
    }

    pub fn add(
        &mut self,
        code: &str,
        message: String,
        severity: Severity,
        span: SourceSpan,
        related: Vec<RelatedInfo>,
    ) {
        self.diagnostics.push(Diagnostic {
            code: code.to_string(),
            message,
            severity,
            span,
            related,
        });
    }

    pub fn add_error(&mut self, code: &str, message: String, span: SourceSpan) {
        self.add(code, message, Severity::Error, span, Vec::new());
    }

    pub fn add_error_with_related(
        &mut self,
        code: &str,
        message: String,
        span: SourceSpan,
        related: Vec<RelatedInfo>,
    ) {
        self.add(code, message, Severity::Error, span, related);
    }

    pub fn add_warning(&mut self, code: &str, message: String, span: SourceSpan) {
        self.add(code, message, Severity::Warning, span, Vec::new());
    }

    /// Adds an error attributed to a source line. The first error on a line
    /// becomes that line's primary; every later error on the same line gets a
    /// related-info entry pointing back at the primary.
    pub fn add_line_error(&mut self, line: usize, code: &str, message: String, span: SourceSpan) {
        let related = match self.line_primary.get(&line) {
            Some(&idx) => {
                let primary = &self.diagnostics[idx];
                vec![RelatedInfo {
                    message: format!(
                        "this error may be a consequence of the earlier error ({}) on the same line",
                        primary.code
                    ),
                    span: primary.span,
                }]
            }
            None => Vec::new(),
        };
        self.add(code, message, Severity::Error, span, related);
        self.line_primary
            .entry(line)
            .or_insert(self.diagnostics.len() - 1);
    }

    pub fn line_primary(&self, line: usize) -> Option<&Diagnostic> {
        self.line_primary.get(&line).map(|&idx| &self.diagnostics[idx])
    }
}
