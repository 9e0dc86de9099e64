//! Diagnostic severities, the engine that maps and filters them, and the
//! text client that renders them to stderr.
use std::{collections::HashMap, io, path::Path};

use anyhow::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

use crate::{lexer::SourceLocation, source::SourceManager};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Ignored,
    Note,
    Warning,
    Error,
    Fatal,
}

impl Severity {
    fn label(self) -> &'static str {
        match self {
            Self::Ignored => "ignored",
            Self::Note => "note",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Fatal => "fatal error",
        }
    }

    fn color(self) -> Option<Color> {
        match self {
            Self::Ignored => None,
            Self::Note => Some(Color::Cyan),
            Self::Warning => Some(Color::Yellow),
            Self::Error | Self::Fatal => Some(Color::Red),
        }
    }
}

macro_rules! diag_codes {
    ($($variant:ident => ($name:literal, $severity:ident)),+ $(,)?) => {
        /// Every diagnostic kind the front end can produce.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum DiagCode {
            $($variant),+
        }

        impl DiagCode {
            pub const ALL: &'static [DiagCode] = &[$(DiagCode::$variant),+];

            /// The name used by `-W` options and `[-W...]` suffixes.
            pub fn name(self) -> &'static str {
                match self {
                    $(DiagCode::$variant => $name),+
                }
            }

            pub fn default_severity(self) -> Severity {
                match self {
                    $(DiagCode::$variant => Severity::$severity),+
                }
            }

            pub fn from_name(name: &str) -> Option<DiagCode> {
                match name {
                    $($name => Some(DiagCode::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

diag_codes! {
    // Preprocessor and lexer.
    CouldNotOpenIncludeFile => ("missing-include", Error),
    ExpectedIncludeFileName => ("expected-include-name", Error),
    IncludeDepthExceeded => ("include-depth", Fatal),
    UnknownDirective => ("unknown-directive", Error),
    ExpectedMacroName => ("expected-macro-name", Error),
    ExpectedMacroArgs => ("expected-macro-args", Error),
    RecursiveMacro => ("recursive-macro", Error),
    UnexpectedConditionalDirective => ("unexpected-conditional", Error),
    // Parser.
    ExpectedMember => ("expected-member", Error),
    ExpectedToken => ("expected-token", Error),
    MaxParseDepthExceeded => ("max-parse-depth", Fatal),
    // Compilation.
    UnknownModule => ("unknown-module", Error),
    DuplicateDefinition => ("duplicate-definition", Warning),
    BadProceduralForce => ("bad-procedural-force", Warning),
    StaticInitializerMustBeExplicit => ("static-init-must-be-explicit", Warning),
    ImplicitConvert => ("implicit-convert", Warning),
    BadFinishNum => ("bad-finish-num", Warning),
    NonstandardSysFunc => ("nonstandard-sys-func", Warning),
    NonstandardForeach => ("nonstandard-foreach", Warning),
    NonstandardDist => ("nonstandard-dist", Warning),
    IndexOOB => ("index-oob", Warning),
    RangeOOB => ("range-oob", Warning),
    RangeWidthOOB => ("range-width-oob", Warning),
    ImplicitNamedPortTypeMismatch => ("implicit-named-port-type-mismatch", Warning),
    SplitDistWeightOp => ("split-dist-weight-op", Warning),
    UnusedDefinition => ("unused-definition", Ignored),
    MaxInstanceDepthExceeded => ("max-instance-depth", Error),
    NoTopModules => ("no-top-modules", Warning),
    // Driver.
    UnknownWarningOption => ("unknown-warning-option", Warning),
}

impl DiagCode {
    /// Whether the code is warning-like by default, i.e. eligible for the
    /// `[-Wname]` suffix and for blanket warning controls.
    fn is_warning_kind(self) -> bool {
        matches!(self.default_severity(), Severity::Warning | Severity::Ignored)
    }
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub code: DiagCode,
    pub message: String,
    pub location: Option<SourceLocation>,
    /// Macro name when the offending token came out of an expansion.
    pub expanded_from: Option<String>,
}

impl Diagnostic {
    pub fn new(code: DiagCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            location: None,
            expanded_from: None,
        }
    }

    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }

    pub fn from_macro(mut self, name: Option<String>) -> Self {
        self.expanded_from = name;
        self
    }
}

/// An in-source `pragma diagnostic` severity change, effective from its
/// location to the end of the buffer (or a matching pop).
#[derive(Debug, Clone)]
pub struct PragmaMapping {
    pub location: SourceLocation,
    pub action: PragmaAction,
}

#[derive(Debug, Clone)]
pub enum PragmaAction {
    Set(DiagCode, Severity),
    Push,
    Pop,
}

/// Which pieces of a rendered diagnostic to show. All on by default.
#[derive(Debug, Clone, Copy)]
pub struct DisplayOptions {
    pub show_column: bool,
    pub show_location: bool,
    pub show_source_line: bool,
    pub show_option_name: bool,
    pub show_include_stack: bool,
    pub show_macro_expansion: bool,
    pub show_hierarchy: bool,
}

impl Default for DisplayOptions {
    fn default() -> Self {
        Self {
            show_column: true,
            show_location: true,
            show_source_line: true,
            show_option_name: true,
            show_include_stack: true,
            show_macro_expansion: true,
            show_hierarchy: true,
        }
    }
}

pub struct DiagnosticEngine {
    severities: HashMap<DiagCode, Severity>,
    warnings_as_errors: bool,
    ignore_globs: Vec<Glob>,
    ignore_set: GlobSet,
    ignore_macro_globs: Vec<Glob>,
    ignore_macro_set: GlobSet,
    pragma_mappings: Vec<PragmaMapping>,
    error_limit: usize,
    errors: usize,
    warnings: usize,
    limit_note_emitted: bool,
    pub display: DisplayOptions,
    pub color: ColorChoice,
}

impl Default for DiagnosticEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl DiagnosticEngine {
    pub fn new() -> Self {
        Self {
            severities: HashMap::new(),
            warnings_as_errors: false,
            ignore_globs: Vec::new(),
            ignore_set: GlobSet::empty(),
            ignore_macro_globs: Vec::new(),
            ignore_macro_set: GlobSet::empty(),
            pragma_mappings: Vec::new(),
            error_limit: 20,
            errors: 0,
            warnings: 0,
            limit_note_emitted: false,
            display: DisplayOptions::default(),
            color: ColorChoice::Auto,
        }
    }

    /// Resets all severities back to their compiled defaults.
    pub fn set_default_warnings(&mut self) {
        self.severities.clear();
        self.warnings_as_errors = false;
    }

    pub fn set_severity(&mut self, code: DiagCode, severity: Severity) {
        self.severities.insert(code, severity);
    }

    pub fn severity(&self, code: DiagCode) -> Severity {
        let base = self
            .severities
            .get(&code)
            .copied()
            .unwrap_or_else(|| code.default_severity());
        if base == Severity::Warning && self.warnings_as_errors {
            Severity::Error
        } else {
            base
        }
    }

    pub fn set_error_limit(&mut self, limit: usize) {
        self.error_limit = limit;
    }

    pub fn error_count(&self) -> usize {
        self.errors
    }

    pub fn warning_count(&self) -> usize {
        self.warnings
    }

    /// Applies a list of `-W` directives in order. Returns diagnostics for
    /// directives that don't name a known warning.
    pub fn set_warning_options(&mut self, options: &[String]) -> Vec<Diagnostic> {
        let mut diags = Vec::new();
        for option in options {
            match option.as_str() {
                "error" => self.warnings_as_errors = true,
                "no-error" => self.warnings_as_errors = false,
                "none" => {
                    for &code in DiagCode::ALL {
                        if code.is_warning_kind() {
                            self.set_severity(code, Severity::Ignored);
                        }
                    }
                }
                "everything" => {
                    for &code in DiagCode::ALL {
                        if code.is_warning_kind() {
                            self.set_severity(code, Severity::Warning);
                        }
                    }
                }
                _ => {
                    let result = if let Some(name) = option.strip_prefix("error=") {
                        DiagCode::from_name(name).map(|code| self.set_severity(code, Severity::Error))
                    } else if let Some(name) = option.strip_prefix("no-error=") {
                        DiagCode::from_name(name)
                            .map(|code| self.set_severity(code, Severity::Warning))
                    } else if let Some(name) = option.strip_prefix("no-") {
                        DiagCode::from_name(name)
                            .map(|code| self.set_severity(code, Severity::Ignored))
                    } else {
                        DiagCode::from_name(option)
                            .map(|code| self.set_severity(code, Severity::Warning))
                    };
                    if result.is_none() {
                        diags.push(Diagnostic::new(
                            DiagCode::UnknownWarningOption,
                            format!("unknown warning option '-W{}'", option),
                        ));
                    }
                }
            }
        }
        diags
    }

    pub fn add_ignore_path(&mut self, pattern: &str) -> Result<()> {
        self.ignore_globs.push(Glob::new(pattern)?);
        self.ignore_set = build_set(&self.ignore_globs)?;
        Ok(())
    }

    pub fn add_ignore_macro_path(&mut self, pattern: &str) -> Result<()> {
        self.ignore_macro_globs.push(Glob::new(pattern)?);
        self.ignore_macro_set = build_set(&self.ignore_macro_globs)?;
        Ok(())
    }

    pub fn add_pragma_mappings(&mut self, mappings: Vec<PragmaMapping>) {
        self.pragma_mappings.extend(mappings);
    }

    /// The severity a diagnostic at `location` resolves to, after in-source
    /// pragma regions are taken into account.
    fn effective_severity(&self, code: DiagCode, location: Option<SourceLocation>) -> Severity {
        let Some(location) = location else {
            return self.severity(code);
        };

        // Replay the pragma stack of the diagnostic's buffer up to its line.
        let mut stack: Vec<HashMap<DiagCode, Severity>> = vec![HashMap::new()];
        for mapping in &self.pragma_mappings {
            let at = mapping.location;
            if at.buffer != location.buffer || at.line > location.line {
                continue;
            }
            match &mapping.action {
                PragmaAction::Push => stack.push(HashMap::new()),
                PragmaAction::Pop => {
                    if stack.len() > 1 {
                        stack.pop();
                    }
                }
                PragmaAction::Set(code, severity) => {
                    if let Some(top) = stack.last_mut() {
                        top.insert(*code, *severity);
                    }
                }
            }
        }
        for map in stack.iter().rev() {
            if let Some(&severity) = map.get(&code) {
                return severity;
            }
        }
        self.severity(code)
    }

    /// Issues one diagnostic: resolves severity, applies suppression paths
    /// and the error limit, and renders survivors to `out`.
    pub fn issue_to(
        &mut self,
        diag: &Diagnostic,
        sm: &SourceManager,
        out: &mut dyn WriteColor,
    ) -> io::Result<()> {
        let severity = self.effective_severity(diag.code, diag.location);
        if severity == Severity::Ignored {
            return Ok(());
        }

        if matches!(severity, Severity::Note | Severity::Warning) {
            if let Some(location) = diag.location {
                let path = sm.path(location.buffer);
                if self.ignore_set.is_match(&path) {
                    log::debug!("suppressing {} in ignored path {:?}", diag.code.name(), path);
                    return Ok(());
                }
                if diag.expanded_from.is_some() && self.ignore_macro_set.is_match(&path) {
                    return Ok(());
                }
            }
        }

        match severity {
            Severity::Warning => self.warnings += 1,
            Severity::Error | Severity::Fatal => {
                if self.error_limit > 0 && self.errors >= self.error_limit {
                    if !self.limit_note_emitted {
                        self.limit_note_emitted = true;
                        writeln!(out, "note: too many errors emitted, stopping now")?;
                    }
                    return Ok(());
                }
                self.errors += 1;
            }
            _ => {}
        }

        self.render(diag, severity, sm, out)
    }

    pub fn issue(&mut self, diag: &Diagnostic, sm: &SourceManager) {
        let stream = StandardStream::stderr(self.color);
        let mut lock = stream.lock();
        self.issue_to(diag, sm, &mut lock)
            .expect("failed to write to stderr");
    }

    pub fn issue_all(&mut self, diags: &[Diagnostic], sm: &SourceManager) {
        let stream = StandardStream::stderr(self.color);
        let mut lock = stream.lock();
        for diag in diags {
            self.issue_to(diag, sm, &mut lock)
                .expect("failed to write to stderr");
        }
    }

    fn render(
        &self,
        diag: &Diagnostic,
        severity: Severity,
        sm: &SourceManager,
        out: &mut dyn WriteColor,
    ) -> io::Result<()> {
        if let Some(location) = diag.location {
            if self.display.show_include_stack {
                let mut stack = Vec::new();
                let mut current = sm.included_from(location.buffer);
                while let Some(at) = current {
                    stack.push(at);
                    current = sm.included_from(at.buffer);
                }
                for at in stack.into_iter().rev() {
                    writeln!(
                        out,
                        "in file included from {}:{}:",
                        sm.path(at.buffer).display(),
                        at.line
                    )?;
                }
            }
            if self.display.show_location {
                if self.display.show_column {
                    write!(
                        out,
                        "{}:{}:{}: ",
                        sm.path(location.buffer).display(),
                        location.line,
                        location.column
                    )?;
                } else {
                    write!(out, "{}:{}: ", sm.path(location.buffer).display(), location.line)?;
                }
            }
        }

        out.set_color(
            ColorSpec::new()
                .set_fg(severity.color())
                .set_bold(severity >= Severity::Error),
        )?;
        write!(out, "{}:", severity.label())?;
        out.reset()?;
        write!(out, " {}", diag.message)?;
        if self.display.show_option_name && diag.code.is_warning_kind() {
            write!(out, " [-W{}]", diag.code.name())?;
        }
        writeln!(out)?;

        if let Some(location) = diag.location {
            if self.display.show_source_line {
                if let Some(line) = sm.line_text(location.buffer, location.line) {
                    writeln!(out, "{}", line)?;
                    let caret_at = (location.column as usize).saturating_sub(1);
                    writeln!(out, "{}^", " ".repeat(caret_at))?;
                }
            }
        }
        if self.display.show_macro_expansion {
            if let Some(name) = &diag.expanded_from {
                writeln!(out, "note: expanded from macro '{}'", name)?;
            }
        }
        Ok(())
    }
}

fn build_set(globs: &[Glob]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for glob in globs {
        builder.add(glob.clone());
    }
    Ok(builder.build()?)
}

/// Checks whether a path pattern should match everything beneath it, i.e.
/// the user named a directory rather than a glob.
pub fn directory_pattern(path: &Path) -> String {
    if path.is_dir() {
        format!("{}/**", path.display())
    } else {
        path.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_round_trip_through_reset() {
        let mut engine = DiagnosticEngine::new();
        engine.set_severity(DiagCode::ImplicitConvert, Severity::Ignored);
        assert_eq!(engine.severity(DiagCode::ImplicitConvert), Severity::Ignored);
        engine.set_default_warnings();
        assert_eq!(engine.severity(DiagCode::ImplicitConvert), Severity::Warning);
    }

    #[test]
    fn warning_options_take_final_precedence() {
        let mut engine = DiagnosticEngine::new();
        engine.set_severity(DiagCode::IndexOOB, Severity::Error);
        let diags = engine.set_warning_options(&["no-index-oob".to_string()]);
        assert!(diags.is_empty());
        assert_eq!(engine.severity(DiagCode::IndexOOB), Severity::Ignored);
    }

    #[test]
    fn unknown_warning_option_reports() {
        let mut engine = DiagnosticEngine::new();
        let diags = engine.set_warning_options(&["bogus-warning".to_string()]);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, DiagCode::UnknownWarningOption);
        assert!(diags[0].message.contains("'-Wbogus-warning'"));
    }

    #[test]
    fn werror_promotes_and_demotes() {
        let mut engine = DiagnosticEngine::new();
        engine.set_warning_options(&["error".to_string()]);
        assert_eq!(engine.severity(DiagCode::ImplicitConvert), Severity::Error);
        engine.set_warning_options(&["no-error".to_string()]);
        assert_eq!(engine.severity(DiagCode::ImplicitConvert), Severity::Warning);
    }
}
