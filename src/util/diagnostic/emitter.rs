//! Plain-text issue renderer

use super::{Issue, Severity};

/// Emitter configuration
#[derive(Debug, Clone)]
pub struct EmitterConfig {
    /// Whether to include warnings
    pub show_warnings: bool,
    /// Whether to append a summary line
    pub show_summary: bool,
}

impl Default for EmitterConfig {
    fn default() -> Self {
        Self {
            show_warnings: true,
            show_summary: true,
        }
    }
}

/// Text issue renderer
#[derive(Debug, Clone, Default)]
pub struct TextEmitter {
    config: EmitterConfig,
}

impl TextEmitter {
    /// Create a renderer with the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a renderer with a custom configuration
    pub fn with_config(config: EmitterConfig) -> Self {
        Self { config }
    }

    /// Render a single issue
    pub fn render(
        &self,
        issue: &Issue,
    ) -> String {
        let source = if issue.source.is_empty() {
            "<office>"
        } else {
            issue.source.as_str()
        };
        format!(
            "{}[{}]: {}\n  --> {} ({})\n",
            issue.severity, issue.code, issue.message, source, issue.kind
        )
    }

    /// Render every issue followed by a summary
    pub fn render_all<'a>(
        &self,
        issues: impl IntoIterator<Item = &'a Issue>,
    ) -> String {
        let mut output = String::new();
        let mut errors = 0;
        let mut warnings = 0;

        for issue in issues {
            match issue.severity {
                Severity::Error => errors += 1,
                Severity::Warning => {
                    warnings += 1;
                    if !self.config.show_warnings {
                        continue;
                    }
                }
            }
            output.push_str(&self.render(issue));
        }

        if self.config.show_summary {
            if errors > 0 {
                output.push_str(&format!(
                    "error: office not built due to {} error(s); {} warning(s) emitted\n",
                    errors, warnings
                ));
            } else if warnings > 0 {
                output.push_str(&format!("warning: {} warning(s) emitted\n", warnings));
            }
        }

        output
    }
}
