//! Parsing of preprocessed token streams into per-unit syntax trees. The
//! parser recognizes design units, their instantiations, and the handful
//! of declaration shapes the compilation checks care about; anything it
//! cannot place produces a diagnostic.
use crate::{
    diag::{DiagCode, Diagnostic, PragmaMapping},
    lexer::{SourceLocation, Token, TokenKind},
    options::OptionBag,
    preprocess::{MacroTable, Preprocessor},
    source::{BufferId, SourceManager},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefinitionKind {
    Module,
    Interface,
    Package,
    Program,
}

impl DefinitionKind {
    fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "module" => Some(Self::Module),
            "interface" => Some(Self::Interface),
            "package" => Some(Self::Package),
            "program" => Some(Self::Program),
            _ => None,
        }
    }

    fn end_keyword(self) -> &'static str {
        match self {
            Self::Module => "endmodule",
            Self::Interface => "endinterface",
            Self::Package => "endpackage",
            Self::Program => "endprogram",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Instantiation {
    pub definition: String,
    pub instance: String,
    pub location: SourceLocation,
}

#[derive(Debug, Clone)]
pub struct Definition {
    pub kind: DefinitionKind,
    pub name: String,
    pub location: SourceLocation,
    pub instantiations: Vec<Instantiation>,
    pub enum_typedefs: Vec<String>,
    /// Locations where an integer literal initializes a variable of an
    /// enum typedef type.
    pub enum_conversions: Vec<SourceLocation>,
}

#[derive(Debug)]
pub struct SyntaxTree {
    pub buffers: Vec<BufferId>,
    pub definitions: Vec<Definition>,
    pub is_library: bool,
    pub diagnostics: Vec<Diagnostic>,
    pub pragma_mappings: Vec<PragmaMapping>,
}

pub struct ParsedUnit {
    pub tree: SyntaxTree,
    pub macros: MacroTable,
}

/// Preprocesses and parses one compilation unit. All buffers share a
/// single macro table; the unit is a library unit when every buffer
/// belongs to a library.
pub fn parse_unit(
    sm: &SourceManager,
    buffers: &[BufferId],
    bag: &OptionBag,
    inherited: Option<MacroTable>,
) -> ParsedUnit {
    let mut pp = match inherited {
        Some(macros) => Preprocessor::with_macros(sm, &bag.preprocessor, macros),
        None => Preprocessor::new(sm, &bag.preprocessor),
    };
    for &id in buffers.iter().rev() {
        pp.push_source(id);
    }

    let mut tokens = Vec::new();
    loop {
        let token = pp.next();
        let done = token.is_eof();
        tokens.push(token);
        if done {
            break;
        }
    }

    let mut diagnostics = pp.take_diagnostics();
    let pragma_mappings = pp.take_pragma_mappings();
    let macros = pp.macro_table().clone();

    let is_library = !buffers.is_empty()
        && buffers.iter().all(|&id| sm.buffer(id).library.is_some());

    let mut parser = Parser {
        tokens,
        pos: 0,
        diagnostics: &mut diagnostics,
        max_depth: bag.parser.max_recursion_depth,
    };
    let definitions = parser.parse_top();

    ParsedUnit {
        tree: SyntaxTree {
            buffers: buffers.to_vec(),
            definitions,
            is_library,
            diagnostics,
            pragma_mappings,
        },
        macros,
    }
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    diagnostics: &'a mut Vec<Diagnostic>,
    max_depth: usize,
}

impl Parser<'_> {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn at_eof(&self) -> bool {
        self.peek().is_eof()
    }

    fn bump(&mut self) -> Token {
        let token = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn error(&mut self, code: DiagCode, message: impl Into<String>, location: SourceLocation) {
        let token = &self.tokens[self.pos.min(self.tokens.len() - 1)];
        self.diagnostics.push(
            Diagnostic::new(code, message)
                .at(location)
                .from_macro(token.expanded_from.clone()),
        );
    }

    fn skip_past_semi(&mut self) {
        while !self.at_eof() {
            if self.bump().text == ";" {
                return;
            }
        }
    }

    /// Skips a balanced `(...)` group, assuming the opener is next.
    fn skip_parens(&mut self) {
        if self.peek().text != "(" {
            return;
        }
        let mut nesting = 0usize;
        while !self.at_eof() {
            let token = self.bump();
            match token.text.as_str() {
                "(" => nesting += 1,
                ")" => {
                    nesting -= 1;
                    if nesting == 0 {
                        return;
                    }
                }
                _ => {}
            }
        }
    }

    fn parse_top(&mut self) -> Vec<Definition> {
        let mut definitions = Vec::new();
        while !self.at_eof() {
            let token = self.peek().clone();
            match token.kind {
                TokenKind::Keyword => {
                    if let Some(kind) = DefinitionKind::from_keyword(&token.text) {
                        self.bump();
                        if let Some(def) = self.parse_definition(kind, token.location) {
                            definitions.push(def);
                        }
                    } else {
                        // $unit-scope declarations, imports, typedefs.
                        self.skip_past_semi();
                    }
                }
                TokenKind::Symbol if token.text == ";" => {
                    self.bump();
                }
                _ => {
                    self.error(
                        DiagCode::ExpectedMember,
                        "expected a module, interface, package, or program",
                        token.location,
                    );
                    self.bump();
                    self.skip_past_semi();
                }
            }
        }
        definitions
    }

    fn parse_definition(
        &mut self,
        kind: DefinitionKind,
        location: SourceLocation,
    ) -> Option<Definition> {
        let name = match self.peek().kind {
            TokenKind::Identifier => self.bump().text,
            _ => {
                self.error(
                    DiagCode::ExpectedToken,
                    format!("expected identifier after '{}'", keyword_of(kind)),
                    self.peek().location,
                );
                self.skip_past_semi();
                return None;
            }
        };
        // Parameter ports and the port list run to the header semicolon.
        self.skip_past_semi();

        let mut def = Definition {
            kind,
            name,
            location,
            instantiations: Vec::new(),
            enum_typedefs: Vec::new(),
            enum_conversions: Vec::new(),
        };

        let mut block_depth = 0usize;
        loop {
            if self.at_eof() {
                self.error(
                    DiagCode::ExpectedToken,
                    format!("expected '{}'", kind.end_keyword()),
                    self.peek().location,
                );
                break;
            }
            let token = self.peek().clone();
            match token.kind {
                TokenKind::Keyword if token.text == kind.end_keyword() => {
                    self.bump();
                    break;
                }
                TokenKind::Keyword if token.text == "typedef" => self.parse_typedef(&mut def),
                TokenKind::Keyword => {
                    match token.text.as_str() {
                        "begin" => {
                            block_depth += 1;
                            if block_depth > self.max_depth {
                                self.error(
                                    DiagCode::MaxParseDepthExceeded,
                                    format!(
                                        "exceeded maximum parse depth of {}",
                                        self.max_depth
                                    ),
                                    token.location,
                                );
                                return Some(def);
                            }
                            self.bump();
                        }
                        "end" => {
                            block_depth = block_depth.saturating_sub(1);
                            self.bump();
                        }
                        // Keywords that close or continue a construct on
                        // their own, with no trailing semicolon.
                        "else" | "endcase" | "endfunction" | "endtask" | "endgenerate"
                        | "generate" | "fork" | "join" | "join_any" | "join_none" => {
                            self.bump();
                        }
                        _ => self.skip_past_semi(),
                    }
                }
                TokenKind::Identifier => self.parse_identifier_statement(&mut def),
                TokenKind::SystemName => self.skip_past_semi(),
                TokenKind::Symbol => match token.text.as_str() {
                    ";" => {
                        self.bump();
                    }
                    "#" | "@" | "{" | "(" | ":" | "[" => self.skip_past_semi(),
                    _ => {
                        self.error(DiagCode::ExpectedMember, "expected member", token.location);
                        self.bump();
                        self.skip_past_semi();
                    }
                },
                _ => {
                    self.error(DiagCode::ExpectedMember, "expected member", token.location);
                    self.bump();
                    self.skip_past_semi();
                }
            }
        }
        Some(def)
    }

    fn parse_typedef(&mut self, def: &mut Definition) {
        self.bump();
        let is_enum = self.peek().text == "enum";
        let mut last_ident = None;
        while !self.at_eof() {
            let token = self.bump();
            if token.text == ";" {
                break;
            }
            if token.kind == TokenKind::Identifier {
                last_ident = Some(token.text);
            }
        }
        if is_enum {
            if let Some(name) = last_ident {
                log::trace!("recorded enum typedef '{}'", name);
                def.enum_typedefs.push(name);
            }
        }
    }

    /// A statement that starts with an identifier is either an
    /// instantiation, a declaration using a user-defined type, or a plain
    /// expression statement.
    fn parse_identifier_statement(&mut self, def: &mut Definition) {
        let type_name = self.bump();
        if self.peek().text == "#" {
            self.bump();
            self.skip_parens();
        }

        if self.peek().kind != TokenKind::Identifier {
            // Expression statement such as an assignment; nothing to do.
            self.skip_past_semi();
            return;
        }
        let second = self.bump();

        match self.peek().text.as_str() {
            "(" => {
                self.skip_parens();
                def.instantiations.push(Instantiation {
                    definition: type_name.text,
                    instance: second.text,
                    location: type_name.location,
                });
                self.skip_past_semi();
            }
            "=" => {
                self.bump();
                let init = self.peek().clone();
                if init.kind == TokenKind::Number
                    && def.enum_typedefs.iter().any(|t| t == &type_name.text)
                {
                    def.enum_conversions.push(init.location);
                }
                self.skip_past_semi();
            }
            _ => self.skip_past_semi(),
        }
    }
}

fn keyword_of(kind: DefinitionKind) -> &'static str {
    match kind {
        DefinitionKind::Module => "module",
        DefinitionKind::Interface => "interface",
        DefinitionKind::Package => "package",
        DefinitionKind::Program => "program",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::CliOptions;

    fn parse(text: &str) -> SyntaxTree {
        let sm = SourceManager::new();
        let id = sm.add_text("test.sv", text);
        let (bag, errors) = CliOptions::default().create_option_bag();
        assert!(errors.is_empty());
        parse_unit(&sm, &[id], &bag, None).tree
    }

    #[test]
    fn parses_module_names() {
        let tree = parse("module m; endmodule\nmodule top; endmodule\n");
        let names: Vec<_> = tree.definitions.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["m", "top"]);
        assert!(tree.diagnostics.is_empty());
    }

    #[test]
    fn records_instantiations() {
        let tree = parse(
            "module leaf; endmodule\n\
             module top;\n  leaf u0 ();\n  leaf #(.W(4)) u1 (.a(1));\nendmodule\n",
        );
        assert_eq!(tree.definitions[1].instantiations.len(), 2);
        assert_eq!(tree.definitions[1].instantiations[0].definition, "leaf");
        assert_eq!(tree.definitions[1].instantiations[1].instance, "u1");
    }

    #[test]
    fn detects_enum_initializer_conversions() {
        let tree = parse(
            "module m;\n\
             typedef enum logic [1:0] { A, B } state_t;\n\
             state_t s = 1;\n\
             state_t t = A;\n\
             endmodule\n",
        );
        assert_eq!(tree.definitions[0].enum_typedefs, vec!["state_t"]);
        assert_eq!(tree.definitions[0].enum_conversions.len(), 1);
    }

    #[test]
    fn invalid_member_produces_diagnostic() {
        let tree = parse("module m;\n= ;\nwire w;\nendmodule\n");
        assert_eq!(tree.diagnostics.len(), 1);
        assert_eq!(tree.diagnostics[0].code, DiagCode::ExpectedMember);
    }

    #[test]
    fn missing_end_keyword_reports() {
        let tree = parse("module m;\nwire w;\n");
        assert!(tree
            .diagnostics
            .iter()
            .any(|d| d.code == DiagCode::ExpectedToken && d.message.contains("endmodule")));
    }

    #[test]
    fn ordinary_behavioral_code_is_clean() {
        let tree = parse(
            "module m(input wire clk);\n\
             reg [7:0] count;\n\
             always @(posedge clk) begin\n\
             if (count == 8'hFF) begin\n\
             count <= 0;\n\
             end else begin\n\
             count <= count + 1;\n\
             end\n\
             end\n\
             initial $display(\"hello\");\n\
             endmodule\n",
        );
        assert!(tree.diagnostics.is_empty(), "{:?}", tree.diagnostics);
    }
}
