//! The driver: glues the command-line parser, source loader, diagnostic
//! engine, preprocessor, and compilation together into the three
//! top-level modes.
use std::{
    io::{self, Write},
    path::Path,
};

use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

use crate::{
    cli::{CommandLine, FileAction, ParseOptions, ParseState},
    compile::Compilation,
    diag::{directory_pattern, DiagnosticEngine, Severity},
    obfuscate::Obfuscator,
    options::{self, OptionBag, DEFAULT_ERROR_LIMIT},
    preprocess::Preprocessor,
    source::{SourceLoader, SourceManager},
    syntax::{self, SyntaxTree},
};

/// Owns every service a compilation session needs and sequences the
/// phases: parse arguments, validate options, acquire sources, run a
/// mode. Each phase returns a success boolean; the caller short-circuits
/// on failure.
#[derive(Default)]
pub struct Driver {
    pub cmd_line: CommandLine,
    pub state: ParseState,
    pub source_manager: SourceManager,
    pub loader: SourceLoader,
    pub engine: DiagnosticEngine,
    bag: Option<OptionBag>,
    any_failed_loads: bool,
}

impl Driver {
    pub fn new() -> Self {
        Self {
            loader: SourceLoader::new(),
            ..Self::default()
        }
    }

    /// Parses one argument string (process arguments are expected to be
    /// joined by the caller). Command files encountered along the way are
    /// processed recursively. Returns false if any argument errors or
    /// failed file loads were recorded.
    pub fn parse_command_line(&mut self, args: &str, opts: ParseOptions) -> bool {
        self.cmd_line.parse(args, opts, &mut self.state);
        self.cmd_line.errors().is_empty() && !self.state.any_failed_files
    }

    /// The validated option bag. Panics if called before a successful
    /// `process_options`.
    pub fn options(&self) -> &OptionBag {
        self.bag.as_ref().expect("process_options must succeed first")
    }

    /// Validates all parsed options, builds the option bag, and
    /// configures the source manager, loader, and diagnostic engine.
    /// Cross-option violations are printed as single-line errors and fail
    /// the phase before any source is loaded.
    pub fn process_options(&mut self) -> bool {
        // Color policy: an explicit flag wins, otherwise each stream
        // enables color when it is a capable terminal.
        self.engine.color = if self.state.options.color_diagnostics == Some(true) {
            ColorChoice::Always
        } else {
            ColorChoice::Auto
        };

        let (bag, errors) = self.state.options.create_option_bag();
        if !errors.is_empty() {
            for error in &errors {
                eprintln!("error: {}", error);
            }
            return false;
        }

        for dir in &self.state.options.include_dirs {
            if !self.source_manager.add_user_directory(Path::new(dir)) {
                eprintln!("warning: include directory '{}' does not exist", dir);
            }
        }
        for dir in &self.state.options.system_dirs {
            if !self.source_manager.add_system_directory(Path::new(dir)) {
                eprintln!("warning: include directory '{}' does not exist", dir);
            }
        }
        for dir in &self.state.options.library_dirs {
            let path = Path::new(dir);
            if path.is_dir() {
                self.loader.add_search_directories([path.to_path_buf()]);
            } else {
                eprintln!("warning: library directory '{}' does not exist", dir);
            }
        }
        self.loader
            .add_search_extensions(self.state.options.library_exts.iter().cloned());
        for ext in &self.state.options.exclude_exts {
            self.loader.add_excluded_extension(ext);
        }
        for action in &self.state.file_actions {
            match action {
                FileAction::AddFiles { pattern, base } => {
                    self.loader.add_files(pattern, base.as_deref());
                }
                FileAction::AddLibraryFile { pattern, base } => {
                    self.loader.add_library_files("work", pattern, base.as_deref());
                }
            }
        }

        let opts = &self.state.options;
        self.engine.display.show_column = opts.diag_column.unwrap_or(true);
        self.engine.display.show_location = opts.diag_location.unwrap_or(true);
        self.engine.display.show_source_line = opts.diag_source.unwrap_or(true);
        self.engine.display.show_option_name = opts.diag_option.unwrap_or(true);
        self.engine.display.show_include_stack = opts.diag_include_stack.unwrap_or(true);
        self.engine.display.show_macro_expansion = opts.diag_macro_expansion.unwrap_or(true);
        self.engine.display.show_hierarchy = opts.diag_hierarchy.unwrap_or(true);
        self.engine
            .set_error_limit(opts.error_limit.unwrap_or(DEFAULT_ERROR_LIMIT));

        self.engine.set_default_warnings();
        options::apply_severity_overrides(&mut self.engine, self.state.options.is_vcs_compat());

        for path in &self.state.options.suppress_warnings_paths {
            let pattern = canonical_suppression_pattern(path);
            if let Err(err) = self.engine.add_ignore_path(&pattern) {
                eprintln!("warning: invalid suppression path '{}': {:#}", path, err);
            }
        }
        for path in &self.state.options.suppress_macro_warnings_paths {
            let pattern = canonical_suppression_pattern(path);
            if let Err(err) = self.engine.add_ignore_macro_path(&pattern) {
                eprintln!("warning: invalid suppression path '{}': {:#}", path, err);
            }
        }

        // User -W options run last so they can downgrade any promotion
        // made above; anything they complain about is issued right away.
        let warning_diags = self
            .engine
            .set_warning_options(&self.state.options.warning_options);
        if !warning_diags.is_empty() {
            self.engine.issue_all(&warning_diags, &self.source_manager);
        }

        self.bag = Some(bag);
        true
    }

    fn load_sources(&mut self) -> Vec<crate::source::BufferId> {
        let (buffers, errors) = self.loader.load_sources(&self.source_manager);
        for error in errors {
            eprintln!("{}", error);
            self.any_failed_loads = true;
        }
        buffers
    }

    /// Preprocess-only mode: emits the preprocessed token stream to
    /// `out`. Diagnostics are buffered; if any of them is an error the
    /// full report goes to stderr and nothing is emitted.
    pub fn run_preprocessor(
        &mut self,
        include_comments: bool,
        include_directives: bool,
        obfuscate: bool,
        fixed_seed: bool,
        out: &mut impl Write,
    ) -> bool {
        let bag = self.bag.clone().expect("process_options must succeed first");
        let buffers = self.load_sources();
        if self.any_failed_loads {
            return false;
        }

        let mut pp = Preprocessor::new(&self.source_manager, &bag.preprocessor);
        pp.keep_directives(include_directives);
        for &id in buffers.iter().rev() {
            pp.push_source(id);
        }

        let mut obfuscator = obfuscate.then(|| Obfuscator::new(fixed_seed));
        let mut output = String::new();
        loop {
            let mut token = pp.next();
            if let Some(obfuscator) = obfuscator.as_mut() {
                obfuscator.rewrite(&mut token);
            }
            token.write_to(&mut output, include_comments);
            if token.is_eof() {
                break;
            }
        }

        let diags = pp.take_diagnostics();
        let failed = diags
            .iter()
            .any(|d| self.engine.severity(d.code) >= Severity::Error);
        self.engine.issue_all(&diags, &self.source_manager);
        if failed {
            return false;
        }

        out.write_all(output.as_bytes())
            .expect("failed to write preprocessed output");
        true
    }

    /// Report-macros mode: runs the preprocessor to end of input, then
    /// prints every defined macro's signature and body.
    pub fn report_macros(&mut self, out: &mut impl Write) -> bool {
        let bag = self.bag.clone().expect("process_options must succeed first");
        let buffers = self.load_sources();
        if self.any_failed_loads {
            return false;
        }

        let mut pp = Preprocessor::new(&self.source_manager, &bag.preprocessor);
        for &id in buffers.iter().rev() {
            pp.push_source(id);
        }
        while !pp.next().is_eof() {}

        for def in pp.defined_macros() {
            let mut line = def.name.clone();
            for token in def.formals.as_deref().unwrap_or_default() {
                token.write_to(&mut line, true);
            }
            // Keep the body readable even when its first token sat flush
            // against the definition.
            let flush_body = def.body.first().map_or(false, |t| t.trivia.is_empty());
            if flush_body {
                line.push(' ');
            }
            for token in &def.body {
                token.write_to(&mut line, true);
            }
            writeln!(out, "{}", line.trim_end()).expect("failed to write macro report");
        }

        let diags = pp.take_diagnostics();
        let failed = diags
            .iter()
            .any(|d| self.engine.severity(d.code) >= Severity::Error);
        self.engine.issue_all(&diags, &self.source_manager);
        !failed
    }

    /// Loads and parses all sources (in parallel when configured),
    /// applies in-source pragma severity mappings, and issues the
    /// buffered per-file diagnostics in input order.
    pub fn parse_all_sources(&mut self) -> (Vec<SyntaxTree>, bool) {
        let bag = self.bag.clone().expect("process_options must succeed first");
        let (trees, errors) = self.loader.load_and_parse_sources(&self.source_manager, &bag);
        for error in errors {
            eprintln!("{}", error);
            self.any_failed_loads = true;
        }

        for tree in &trees {
            self.engine.add_pragma_mappings(tree.pragma_mappings.clone());
        }
        for tree in &trees {
            self.engine.issue_all(&tree.diagnostics, &self.source_manager);
        }
        (trees, !self.any_failed_loads)
    }

    /// Binds the parsed trees into a compilation, pulling in missing
    /// modules from the library search path until a fixed point.
    pub fn create_compilation(&mut self, trees: &[SyntaxTree]) -> Compilation {
        let bag = self.bag.clone().expect("process_options must succeed first");
        let mut compilation = Compilation::new(bag.compilation.clone());
        for tree in trees {
            compilation.add_tree(tree);
        }

        loop {
            let mut found_any = false;
            for name in compilation.missing_module_names() {
                let Some(found) = self.loader.search_for_module(&name, &self.source_manager)
                else {
                    continue;
                };
                let unit = syntax::parse_unit(&self.source_manager, &[found.buffer], &bag, None);
                self.engine
                    .add_pragma_mappings(unit.tree.pragma_mappings.clone());
                self.engine
                    .issue_all(&unit.tree.diagnostics, &self.source_manager);
                compilation.add_tree(&unit.tree);
                found_any = true;
            }
            if !found_any {
                break;
            }
        }

        compilation.elaborate();
        compilation
    }

    /// Reports the elaborated design: the top-level unit list (unless
    /// quiet), all compilation diagnostics, and the build summary.
    pub fn report_compilation(&mut self, compilation: &mut Compilation, quiet: bool) -> bool {
        let stdout = StandardStream::stdout(self.engine.color);
        let mut stdout = stdout.lock();

        if !quiet {
            writeln!(stdout, "Top level design units:").expect("failed to write to stdout");
            for top in compilation.top_modules() {
                writeln!(stdout, "    {}", top).expect("failed to write to stdout");
            }
            writeln!(stdout).expect("failed to write to stdout");
        }

        let diags = compilation.take_diagnostics();
        self.engine.issue_all(&diags, &self.source_manager);

        let errors = self.engine.error_count();
        let warnings = self.engine.warning_count();
        let succeeded = errors == 0 && !self.any_failed_loads;
        write_summary(&mut stdout, succeeded, errors, warnings)
            .expect("failed to write to stdout");
        succeeded
    }

    pub fn has_files(&self) -> bool {
        self.loader.has_files()
    }
}

fn canonical_suppression_pattern(path: &str) -> String {
    match Path::new(path).canonicalize() {
        Ok(canonical) => directory_pattern(&canonical),
        Err(_) => path.to_owned(),
    }
}

fn plural(count: usize) -> &'static str {
    if count == 1 {
        ""
    } else {
        "s"
    }
}

fn write_summary(
    out: &mut dyn WriteColor,
    succeeded: bool,
    errors: usize,
    warnings: usize,
) -> io::Result<()> {
    let (label, color) = if succeeded {
        ("Build succeeded", Color::Green)
    } else {
        ("Build failed", Color::Red)
    };
    out.set_color(ColorSpec::new().set_fg(Some(color)).set_bold(true))?;
    write!(out, "{}:", label)?;
    out.reset()?;
    writeln!(
        out,
        " {} error{}, {} warning{}",
        errors,
        plural(errors),
        warnings,
        plural(warnings)
    )
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    fn driver_for(args: &str) -> Driver {
        let mut driver = Driver::new();
        let ok = driver.parse_command_line(
            args,
            ParseOptions {
                ignore_program_name: true,
                ..ParseOptions::default()
            },
        );
        assert!(ok, "argument errors: {:?}", driver.cmd_line.errors());
        driver
    }

    #[test]
    fn preprocess_mode_emits_output() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let src = dir.path().join("t.sv");
        fs::write(&src, "`define W 4\nwire [`W-1:0] x;\n")?;

        let mut driver = driver_for(&src.display().to_string());
        assert!(driver.process_options());
        let mut out = Vec::new();
        assert!(driver.run_preprocessor(false, false, false, false, &mut out));
        assert_eq!(String::from_utf8(out)?, "\nwire [4-1:0] x;\n");
        Ok(())
    }

    #[test]
    fn preprocess_mode_suppresses_output_on_error() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let src = dir.path().join("t.sv");
        fs::write(&src, "`bogus_directive\nwire x;\n")?;

        let mut driver = driver_for(&src.display().to_string());
        assert!(driver.process_options());
        let mut out = Vec::new();
        assert!(!driver.run_preprocessor(false, false, false, false, &mut out));
        assert!(out.is_empty());
        Ok(())
    }

    #[test]
    fn macro_report_formats_signature_and_body() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let src = dir.path().join("t.sv");
        fs::write(&src, "`define ADD(a, b) a + b\n`define FLUSH(x)x\n`define PLAIN 42\n")?;

        let mut driver = driver_for(&src.display().to_string());
        assert!(driver.process_options());
        let mut out = Vec::new();
        assert!(driver.report_macros(&mut out));
        let text = String::from_utf8(out)?;
        assert_eq!(text, "ADD(a, b) a + b\nFLUSH(x) x\nPLAIN 42\n");
        Ok(())
    }

    #[test]
    fn compilation_round_trip_finds_tops() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let src = dir.path().join("design.sv");
        fs::write(
            &src,
            "module leaf; endmodule\nmodule top; leaf u0 (); endmodule\n",
        )?;

        let mut driver = driver_for(&src.display().to_string());
        assert!(driver.process_options());
        let (trees, ok) = driver.parse_all_sources();
        assert!(ok);
        let mut compilation = driver.create_compilation(&trees);
        assert!(driver.report_compilation(&mut compilation, true));
        assert_eq!(compilation.top_modules(), ["top".to_owned()]);
        Ok(())
    }

    #[test]
    fn library_search_path_resolves_missing_modules() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let libdir = dir.path().join("lib");
        fs::create_dir(&libdir)?;
        fs::write(libdir.join("helper.v"), "module helper; endmodule\n")?;
        let src = dir.path().join("top.sv");
        fs::write(&src, "module top; helper u (); endmodule\n")?;

        let mut driver = driver_for(&format!("-y {} {}", libdir.display(), src.display()));
        assert!(driver.process_options());
        let (trees, ok) = driver.parse_all_sources();
        assert!(ok);
        let mut compilation = driver.create_compilation(&trees);
        assert!(driver.report_compilation(&mut compilation, true));
        assert_eq!(driver.engine.error_count(), 0);
        Ok(())
    }
}
