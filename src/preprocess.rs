//! The preprocessor: takes the raw token streams produced by the lexer and
//! performs include resolution, macro definition and expansion, and
//! conditional compilation.
use std::collections::{HashMap, VecDeque};

use crate::{
    diag::{DiagCode, Diagnostic, PragmaAction, PragmaMapping, Severity},
    lexer::{self, SourceLocation, Token, TokenKind, Trivia, TriviaKind},
    options::PreprocessorOptions,
    source::{BufferId, SourceManager},
};

pub type MacroTable = HashMap<String, MacroDef>;

#[derive(Debug, Clone)]
pub struct MacroDef {
    pub name: String,
    /// The formal argument tokens, parentheses and commas included, with
    /// their original trivia. `None` for object-like macros.
    pub formals: Option<Vec<Token>>,
    pub body: Vec<Token>,
    pub location: SourceLocation,
}

impl MacroDef {
    fn formal_names(&self) -> Vec<&str> {
        self.formals
            .as_deref()
            .unwrap_or_default()
            .iter()
            .filter(|t| t.kind == TokenKind::Identifier)
            .map(|t| t.text.as_str())
            .collect()
    }
}

/// State of one `ifdef arm, following the usual three-way scheme: a taken
/// arm, a not-yet-taken arm, or a conditional whose arm was already taken.
enum Defcond {
    Done,
    Enabled,
    Disabled,
}

struct Stream {
    tokens: Vec<Token>,
    pos: usize,
}

/// Directives that are not interpreted here and survive into the
/// preprocessed output when directive emission is on.
const PASSTHROUGH_DIRECTIVES: &[&str] = &[
    "timescale",
    "default_nettype",
    "resetall",
    "celldefine",
    "endcelldefine",
    "line",
    "unconnected_drive",
    "nounconnected_drive",
];

pub struct Preprocessor<'a> {
    sm: &'a SourceManager,
    options: &'a PreprocessorOptions,
    /// Stack of input streams; tokens come from the topmost until it runs
    /// out. Sources must be pushed in reverse of the desired emission
    /// order.
    streams: Vec<Stream>,
    lookahead: VecDeque<Token>,
    expansion: Vec<Token>,
    macros: MacroTable,
    macro_order: Vec<String>,
    defcond: Vec<Defcond>,
    diagnostics: Vec<Diagnostic>,
    pragma_mappings: Vec<PragmaMapping>,
    /// Trivia carried over from consumed directives and popped streams,
    /// prepended to the next emitted token.
    pending_trivia: Vec<Trivia>,
    /// Expansions performed since the last token was emitted; bounds
    /// runaway recursive macros.
    expansion_steps: usize,
    emit_directives: bool,
    last_location: Option<SourceLocation>,
}

impl<'a> Preprocessor<'a> {
    pub fn new(sm: &'a SourceManager, options: &'a PreprocessorOptions) -> Self {
        Self::with_macros(sm, options, MacroTable::new())
    }

    /// Creates a preprocessor whose macro table starts out as a copy of
    /// `inherited`, for library units that inherit user macros.
    pub fn with_macros(
        sm: &'a SourceManager,
        options: &'a PreprocessorOptions,
        inherited: MacroTable,
    ) -> Self {
        let mut pp = Self {
            sm,
            options,
            streams: Vec::new(),
            lookahead: VecDeque::new(),
            expansion: Vec::new(),
            macro_order: inherited.keys().cloned().collect(),
            macros: inherited,
            defcond: Vec::new(),
            diagnostics: Vec::new(),
            pragma_mappings: Vec::new(),
            pending_trivia: Vec::new(),
            expansion_steps: 0,
            emit_directives: false,
            last_location: None,
        };
        pp.macro_order.sort_unstable();
        pp.apply_predefines();
        pp
    }

    /// Makes passthrough directives (`timescale and friends) come out of
    /// `next` instead of being swallowed. Used by preprocess-only mode.
    pub fn keep_directives(&mut self, keep: bool) {
        self.emit_directives = keep;
    }

    fn apply_predefines(&mut self) {
        if !self.options.predefines.is_empty() {
            let mut text = String::new();
            for define in &self.options.predefines {
                let (name, value) = match define.split_once('=') {
                    Some((name, value)) => (name, value),
                    None => (define.as_str(), "1"),
                };
                text.push_str(&format!("`define {} {}\n", name, value));
            }
            let id = self.sm.add_text(&self.options.predefine_source, text);
            self.push_source(id);
            // Drain the synthetic buffer so the definitions land in the
            // macro table before any real source is seen.
            while !self.next().is_eof() {}
            self.pending_trivia.clear();
            self.last_location = None;
        }
        for undef in &self.options.undefines {
            self.macros.remove(undef);
            self.macro_order.retain(|name| name != undef);
        }
    }

    /// Pushes a source buffer onto the stream stack. The buffer pushed
    /// last is emitted first.
    pub fn push_source(&mut self, id: BufferId) {
        let buffer = self.sm.buffer(id);
        let tokens = lexer::lex(&buffer.text, id);
        self.streams.push(Stream { tokens, pos: 0 });
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    pub fn take_pragma_mappings(&mut self) -> Vec<PragmaMapping> {
        std::mem::take(&mut self.pragma_mappings)
    }

    /// The currently defined macros, in definition order.
    pub fn defined_macros(&self) -> Vec<&MacroDef> {
        self.macro_order
            .iter()
            .filter_map(|name| self.macros.get(name))
            .collect()
    }

    pub fn macro_table(&self) -> &MacroTable {
        &self.macros
    }

    fn error(&mut self, code: DiagCode, message: String, location: SourceLocation) {
        self.diagnostics.push(Diagnostic::new(code, message).at(location));
    }

    fn is_inactive(&self) -> bool {
        !matches!(self.defcond.last(), Some(Defcond::Enabled) | None)
    }

    fn pull(&mut self) -> Option<Token> {
        if let Some(token) = self.expansion.pop() {
            return Some(token);
        }
        loop {
            let stream = self.streams.last_mut()?;
            let token = stream.tokens[stream.pos].clone();
            stream.pos += 1;
            if token.is_eof() {
                self.pending_trivia.extend(token.trivia);
                self.streams.pop();
                continue;
            }
            self.last_location = Some(token.location);
            return Some(token);
        }
    }

    fn raw_next(&mut self) -> Option<Token> {
        if let Some(token) = self.lookahead.pop_front() {
            return Some(token);
        }
        self.pull()
    }

    fn peek_raw(&mut self) -> Option<&Token> {
        if self.lookahead.is_empty() {
            if let Some(token) = self.pull() {
                self.lookahead.push_back(token);
            }
        }
        self.lookahead.front()
    }

    /// Consumes the remaining tokens on the directive's source line and
    /// returns them.
    fn consume_line(&mut self, at: SourceLocation) -> Vec<Token> {
        let mut tokens = Vec::new();
        while let Some(token) = self.peek_raw() {
            if token.location.buffer != at.buffer || token.location.line != at.line {
                break;
            }
            tokens.push(self.raw_next().expect("peeked token vanished"));
        }
        tokens
    }

    fn eof_token(&mut self) -> Token {
        Token {
            kind: TokenKind::EndOfFile,
            text: String::new(),
            trivia: std::mem::take(&mut self.pending_trivia),
            location: self
                .last_location
                .unwrap_or_else(|| SourceLocation::new(BufferId::new(0), 1, 1)),
            expanded_from: None,
        }
    }

    /// Produces the next token of preprocessed output, ending in an
    /// end-of-file sentinel.
    pub fn next(&mut self) -> Token {
        loop {
            let Some(mut token) = self.raw_next() else {
                return self.eof_token();
            };
            if !self.pending_trivia.is_empty() {
                let mut trivia = std::mem::take(&mut self.pending_trivia);
                trivia.append(&mut token.trivia);
                token.trivia = trivia;
            }

            if token.kind == TokenKind::Directive {
                if let Some(emit) = self.handle_directive(token) {
                    return emit;
                }
                continue;
            }
            if self.is_inactive() {
                continue;
            }
            self.expansion_steps = 0;
            return token;
        }
    }

    fn handle_directive(&mut self, token: Token) -> Option<Token> {
        let name = token.text.trim_start_matches('`').to_owned();
        let at = token.location;

        if self.options.ignore_directives.contains(&name) {
            self.consume_line(at);
            self.pending_trivia.extend(token.trivia);
            return None;
        }

        match name.as_str() {
            "include" => self.handle_include(token),
            "define" => self.handle_define(token),
            "undef" => {
                let arg = self.raw_next();
                self.pending_trivia.extend(token.trivia);
                if self.is_inactive() {
                    return None;
                }
                match arg {
                    Some(arg) if arg.kind == TokenKind::Identifier => {
                        self.macros.remove(&arg.text);
                        self.macro_order.retain(|name| name != &arg.text);
                    }
                    _ => self.error(
                        DiagCode::ExpectedMacroName,
                        "expected macro name after `undef".to_owned(),
                        at,
                    ),
                }
                None
            }
            "undefineall" => {
                self.pending_trivia.extend(token.trivia);
                if !self.is_inactive() {
                    self.macros.clear();
                    self.macro_order.clear();
                }
                None
            }
            "ifdef" | "ifndef" | "elsif" | "else" | "endif" => {
                self.handle_conditional(&name, token)
            }
            "pragma" => self.handle_pragma(token),
            _ if PASSTHROUGH_DIRECTIVES.contains(&name.as_str()) => {
                let args = self.consume_line(at);
                if self.is_inactive() {
                    self.pending_trivia.extend(token.trivia);
                    return None;
                }
                if self.emit_directives {
                    for arg in args.into_iter().rev() {
                        self.lookahead.push_front(arg);
                    }
                    return Some(token);
                }
                self.pending_trivia.extend(token.trivia);
                None
            }
            _ => {
                if self.is_inactive() {
                    return None;
                }
                if self.macros.contains_key(&name) {
                    self.expand_macro(&name, token);
                } else {
                    self.error(
                        DiagCode::UnknownDirective,
                        format!("unknown macro or compiler directive '`{}'", name),
                        at,
                    );
                    self.pending_trivia.extend(token.trivia);
                }
                None
            }
        }
    }

    fn handle_include(&mut self, token: Token) -> Option<Token> {
        let at = token.location;
        self.pending_trivia.extend(token.trivia);
        let Some(name_token) = self.raw_next() else {
            self.error(
                DiagCode::ExpectedIncludeFileName,
                "expected filename after `include".to_owned(),
                at,
            );
            return None;
        };

        let (filename, is_system) = match name_token.kind {
            TokenKind::StringLiteral => {
                (name_token.text.trim_matches('"').to_owned(), false)
            }
            TokenKind::Symbol if name_token.text == "<" => {
                let mut filename = String::new();
                loop {
                    match self.raw_next() {
                        Some(tok) if tok.text == ">" => break,
                        Some(tok) => filename.push_str(&tok.text),
                        None => {
                            self.error(
                                DiagCode::ExpectedIncludeFileName,
                                "expected '>' to close `include filename".to_owned(),
                                at,
                            );
                            return None;
                        }
                    }
                }
                (filename, true)
            }
            _ => {
                self.error(
                    DiagCode::ExpectedIncludeFileName,
                    "expected filename in double quotes or angle brackets after `include"
                        .to_owned(),
                    at,
                );
                return None;
            }
        };

        if self.is_inactive() {
            return None;
        }
        if self.streams.len() >= self.options.max_include_depth {
            self.error(
                DiagCode::IncludeDepthExceeded,
                format!("exceeded maximum include depth of {}", self.options.max_include_depth),
                at,
            );
            return None;
        }

        let includer = self.sm.buffer(at.buffer);
        let includer_dir = includer.path.parent().map(|p| p.to_path_buf());
        let Some(found) = self.sm.resolve_include(&filename, includer_dir.as_deref(), is_system)
        else {
            self.error(
                DiagCode::CouldNotOpenIncludeFile,
                format!("could not open include file \"{}\"", filename),
                at,
            );
            return None;
        };

        match self.sm.load_file(&found, includer.library.clone(), Some(at)) {
            Ok(id) => self.push_source(id),
            Err(err) => self.error(
                DiagCode::CouldNotOpenIncludeFile,
                format!("{:#}", err),
                at,
            ),
        }
        None
    }

    fn handle_define(&mut self, token: Token) -> Option<Token> {
        let at = token.location;
        self.pending_trivia.extend(token.trivia);

        let name = match self.raw_next() {
            Some(tok) if tok.kind == TokenKind::Identifier => tok,
            _ => {
                self.error(
                    DiagCode::ExpectedMacroName,
                    "expected macro name after `define".to_owned(),
                    at,
                );
                return None;
            }
        };

        // A formal argument list only exists when the parenthesis hugs the
        // macro name; `define FOO (a) is an object-like macro whose body
        // starts with "(a)".
        let mut formals = None;
        if matches!(self.peek_raw(), Some(tok) if tok.text == "(" && tok.trivia.is_empty()) {
            let mut tokens = vec![self.raw_next().expect("peeked token vanished")];
            loop {
                match self.raw_next() {
                    Some(tok) => {
                        let done = tok.text == ")";
                        tokens.push(tok);
                        if done {
                            break;
                        }
                    }
                    None => {
                        self.error(
                            DiagCode::ExpectedMacroArgs,
                            "expected closing parenthesis in macro definition".to_owned(),
                            at,
                        );
                        return None;
                    }
                }
            }
            formals = Some(tokens);
        }

        // The body runs to the first newline not escaped by a backslash.
        let mut body: Vec<Token> = Vec::new();
        loop {
            let Some(peeked) = self.peek_raw() else { break };
            if peeked.location.buffer != at.buffer {
                break;
            }
            let has_newline = peeked
                .trivia
                .iter()
                .any(|t| t.kind == TriviaKind::Whitespace && t.text.contains('\n'));
            if has_newline {
                if body.last().map_or(false, |b| b.text == "\\") {
                    body.pop();
                } else {
                    break;
                }
            }
            body.push(self.raw_next().expect("peeked token vanished"));
        }

        if self.is_inactive() {
            return None;
        }
        if !self.macros.contains_key(&name.text) {
            self.macro_order.push(name.text.clone());
        }
        self.macros.insert(
            name.text.clone(),
            MacroDef {
                name: name.text,
                formals,
                body,
                location: at,
            },
        );
        None
    }

    fn handle_conditional(&mut self, name: &str, token: Token) -> Option<Token> {
        let at = token.location;
        self.pending_trivia.extend(token.trivia);

        match name {
            "ifdef" | "ifndef" | "elsif" => {
                let macro_name = match self.raw_next() {
                    Some(tok) if tok.kind == TokenKind::Identifier => tok.text,
                    _ => {
                        self.error(
                            DiagCode::ExpectedMacroName,
                            format!("expected macro name after `{}", name),
                            at,
                        );
                        return None;
                    }
                };
                let exists = self.macros.contains_key(&macro_name);

                // A conditional nested in an inactive region can never
                // activate, no matter what its macro says.
                let parent_inactive = match name {
                    "elsif" => false,
                    _ => self.is_inactive(),
                };
                match name {
                    "ifdef" => self.defcond.push(if parent_inactive {
                        Defcond::Done
                    } else if exists {
                        Defcond::Enabled
                    } else {
                        Defcond::Disabled
                    }),
                    "ifndef" => self.defcond.push(if parent_inactive {
                        Defcond::Done
                    } else if exists {
                        Defcond::Disabled
                    } else {
                        Defcond::Enabled
                    }),
                    "elsif" => match self.defcond.pop() {
                        Some(Defcond::Done) | Some(Defcond::Enabled) => {
                            self.defcond.push(Defcond::Done);
                        }
                        Some(Defcond::Disabled) => self.defcond.push(if exists {
                            Defcond::Enabled
                        } else {
                            Defcond::Disabled
                        }),
                        None => self.error(
                            DiagCode::UnexpectedConditionalDirective,
                            "found `elsif without a preceding `ifdef or `ifndef".to_owned(),
                            at,
                        ),
                    },
                    _ => unreachable!(),
                }
            }
            "else" => match self.defcond.pop() {
                Some(Defcond::Disabled) => self.defcond.push(Defcond::Enabled),
                Some(Defcond::Enabled) | Some(Defcond::Done) => self.defcond.push(Defcond::Done),
                None => self.error(
                    DiagCode::UnexpectedConditionalDirective,
                    "found `else without a preceding `ifdef or `ifndef".to_owned(),
                    at,
                ),
            },
            "endif" => {
                if self.defcond.pop().is_none() {
                    self.error(
                        DiagCode::UnexpectedConditionalDirective,
                        "found `endif without a preceding `ifdef or `ifndef".to_owned(),
                        at,
                    );
                }
            }
            _ => unreachable!(),
        }
        None
    }

    fn handle_pragma(&mut self, token: Token) -> Option<Token> {
        let at = token.location;
        let args = self.consume_line(at);
        if self.is_inactive() {
            self.pending_trivia.extend(token.trivia);
            return None;
        }

        if args.first().map(|t| t.text.as_str()) == Some("diagnostic") {
            let action = args.get(1).map(|t| t.text.as_str());
            let target = args.get(2).map(|t| {
                t.text.trim_matches('"').trim_start_matches("-W").to_owned()
            });
            let mapping = match (action, target) {
                (Some("push"), _) => Some(PragmaAction::Push),
                (Some("pop"), _) => Some(PragmaAction::Pop),
                (Some(level @ ("ignore" | "warn" | "error")), Some(name)) => {
                    match DiagCode::from_name(&name) {
                        Some(code) => {
                            let severity = match level {
                                "ignore" => Severity::Ignored,
                                "warn" => Severity::Warning,
                                _ => Severity::Error,
                            };
                            Some(PragmaAction::Set(code, severity))
                        }
                        None => {
                            self.error(
                                DiagCode::UnknownWarningOption,
                                format!("unknown warning in diagnostic pragma: '{}'", name),
                                at,
                            );
                            None
                        }
                    }
                }
                _ => None,
            };
            if let Some(action) = mapping {
                self.pragma_mappings.push(PragmaMapping {
                    location: at,
                    action,
                });
            }
        }

        if self.emit_directives {
            for arg in args.into_iter().rev() {
                self.lookahead.push_front(arg);
            }
            return Some(token);
        }
        self.pending_trivia.extend(token.trivia);
        None
    }

    fn expand_macro(&mut self, name: &str, token: Token) {
        self.expansion_steps += 1;
        if token.expanded_from.as_deref() == Some(name) || self.expansion_steps > 4096 {
            self.error(
                DiagCode::RecursiveMacro,
                format!("expansion of macro '{}' is recursive", name),
                token.location,
            );
            return;
        }
        let def = self.macros[name].clone();
        let formal_names: Vec<String> =
            def.formal_names().iter().map(|s| s.to_string()).collect();

        let mut actuals: HashMap<String, Vec<Token>> = HashMap::new();
        if !formal_names.is_empty() {
            match self.raw_next() {
                Some(tok) if tok.text == "(" => {}
                _ => {
                    self.error(
                        DiagCode::ExpectedMacroArgs,
                        format!("expected arguments for macro '{}'", name),
                        token.location,
                    );
                    return;
                }
            }

            let mut formals = formal_names.iter();
            let mut current: Vec<Token> = Vec::new();
            let mut nesting = 0usize;
            loop {
                let Some(tok) = self.raw_next() else {
                    self.error(
                        DiagCode::ExpectedMacroArgs,
                        format!("unterminated argument list for macro '{}'", name),
                        token.location,
                    );
                    return;
                };
                match tok.text.as_str() {
                    "," if nesting == 0 => {
                        let Some(formal) = formals.next() else {
                            self.error(
                                DiagCode::ExpectedMacroArgs,
                                format!("too many arguments for macro '{}'", name),
                                token.location,
                            );
                            return;
                        };
                        actuals.insert(formal.clone(), std::mem::take(&mut current));
                    }
                    ")" if nesting == 0 => {
                        let Some(formal) = formals.next() else {
                            self.error(
                                DiagCode::ExpectedMacroArgs,
                                format!("too many arguments for macro '{}'", name),
                                token.location,
                            );
                            return;
                        };
                        actuals.insert(formal.clone(), std::mem::take(&mut current));
                        break;
                    }
                    "(" => {
                        nesting += 1;
                        current.push(tok);
                    }
                    ")" => {
                        nesting -= 1;
                        current.push(tok);
                    }
                    _ => current.push(tok),
                }
            }
        }

        let mut replacement: Vec<Token> = Vec::new();
        for body_token in &def.body {
            if body_token.kind == TokenKind::Identifier {
                if let Some(actual) = actuals.get(&body_token.text) {
                    for (i, tok) in actual.iter().enumerate() {
                        let mut tok = tok.clone();
                        if i == 0 {
                            let mut trivia = body_token.trivia.clone();
                            trivia.extend(tok.trivia);
                            tok.trivia = trivia;
                        }
                        replacement.push(tok);
                    }
                    continue;
                }
            }
            replacement.push(body_token.clone());
        }

        for (i, tok) in replacement.iter_mut().enumerate() {
            if i == 0 {
                // The expansion sits where the invocation sat; its leading
                // trivia replaces whatever spacing the definition carried.
                tok.trivia = token.trivia.clone();
            }
            tok.expanded_from = Some(name.to_owned());
        }
        self.expansion.extend(replacement.into_iter().rev());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::CliOptions;

    fn preprocess(files: &[(&str, &str)], defines: &[&str]) -> (String, Vec<Diagnostic>) {
        let sm = SourceManager::new();
        let mut ids = Vec::new();
        for (name, text) in files {
            ids.push(sm.add_text(name, *text));
        }
        let mut cli = CliOptions::default();
        cli.defines = defines.iter().map(|s| s.to_string()).collect();
        let (bag, errors) = cli.create_option_bag();
        assert!(errors.is_empty());

        let mut pp = Preprocessor::new(&sm, &bag.preprocessor);
        for &id in ids.iter().rev() {
            pp.push_source(id);
        }
        let mut out = String::new();
        loop {
            let token = pp.next();
            token.write_to(&mut out, true);
            if token.is_eof() {
                break;
            }
        }
        (out, pp.take_diagnostics())
    }

    #[test]
    fn define_and_expand() {
        let (out, diags) = preprocess(&[("t.sv", "`define FOO 42\nwire w = `FOO;\n")], &[]);
        assert!(diags.is_empty());
        assert_eq!(out, "\nwire w = 42;\n");
    }

    #[test]
    fn macro_with_arguments() {
        let (out, diags) = preprocess(
            &[("t.sv", "`define ADD(a,b) (a + b)\nassign x = `ADD(1, 2);\n")],
            &[],
        );
        assert!(diags.is_empty());
        assert_eq!(out, "\nassign x = (1 +  2);\n");
    }

    #[test]
    fn conditionals_select_arms() {
        let text = "`ifdef FOO\na\n`elsif BAR\nb\n`else\nc\n`endif\n";
        let (out, diags) = preprocess(&[("t.sv", text)], &["BAR"]);
        assert!(diags.is_empty());
        assert_eq!(out.trim(), "b");

        let (out, _) = preprocess(&[("t.sv", text)], &[]);
        assert_eq!(out.trim(), "c");

        let (out, _) = preprocess(&[("t.sv", text)], &["FOO", "BAR"]);
        assert_eq!(out.trim(), "a");
    }

    #[test]
    fn nested_disabled_conditionals_stay_disabled() {
        let text = "`ifdef FOO\n`ifdef BAR\nx\n`else\ny\n`endif\n`endif\nz\n";
        let (out, diags) = preprocess(&[("t.sv", text)], &["BAR"]);
        assert!(diags.is_empty());
        assert_eq!(out.trim(), "z");
    }

    #[test]
    fn unknown_directive_reports() {
        let (_, diags) = preprocess(&[("t.sv", "`bogus\n")], &[]);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, DiagCode::UnknownDirective);
    }

    #[test]
    fn undef_removes_definition() {
        let (_, diags) = preprocess(
            &[("t.sv", "`define FOO 1\n`undef FOO\n`FOO\n")],
            &[],
        );
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, DiagCode::UnknownDirective);
    }

    #[test]
    fn predefines_come_from_the_command_line() {
        let (out, diags) = preprocess(&[("t.sv", "wire w = `WIDTH;\n")], &["WIDTH=8"]);
        assert!(diags.is_empty());
        assert_eq!(out, "wire w = 8;\n");
    }

    #[test]
    fn sources_emit_in_push_reverse_order() {
        let (out, diags) = preprocess(&[("a.sv", "a\n"), ("b.sv", "b\n")], &[]);
        assert!(diags.is_empty());
        assert_eq!(out, "a\nb\n");
    }

    #[test]
    fn line_continuation_extends_macro_body() {
        let (out, diags) = preprocess(
            &[("t.sv", "`define FOO 1 + \\\n2\nx = `FOO;\n")],
            &[],
        );
        assert!(diags.is_empty());
        assert!(out.contains("1 +\n2"));
    }

    #[test]
    fn recursive_macros_are_caught() {
        let (_, diags) = preprocess(&[("t.sv", "`define X `X\n`X\n")], &[]);
        assert!(diags.iter().any(|d| d.code == DiagCode::RecursiveMacro));

        let text = "`define A `B\n`define B `A\n`A\n";
        let (_, diags) = preprocess(&[("t.sv", text)], &[]);
        assert!(diags.iter().any(|d| d.code == DiagCode::RecursiveMacro));
    }

    #[test]
    fn macros_report_in_definition_order() {
        let sm = SourceManager::new();
        let id = sm.add_text("t.sv", "`define B 2\n`define A 1\n");
        let cli = CliOptions::default();
        let (bag, _) = cli.create_option_bag();
        let mut pp = Preprocessor::new(&sm, &bag.preprocessor);
        pp.push_source(id);
        while !pp.next().is_eof() {}
        let names: Vec<_> = pp.defined_macros().iter().map(|m| m.name.clone()).collect();
        assert_eq!(names, vec!["B".to_owned(), "A".to_owned()]);
    }
}
