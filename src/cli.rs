//! The option schema and the command-line parser: shell-style
//! tokenization, vendor-command rules, option binding with duplicate
//! policies, and nested command files.
use std::{
    env, fs,
    path::{Path, PathBuf},
};

use regex::Regex;

use crate::options::{CliOptions, DEFAULT_MAX_INCLUDE_DEPTH};

fn static_regex(re: &'static str) -> Regex {
    Regex::new(re).expect("invalid hardcoded regex")
}

/// How a single `parse` invocation treats its input.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParseOptions {
    /// Substitute `$NAME` and `${NAME}` in tokens.
    pub expand_env_vars: bool,
    /// When set, the first token is parsed normally instead of being
    /// taken for the program name.
    pub ignore_program_name: bool,
    /// Allow `#` line comments and `/* */` block comments.
    pub support_comments: bool,
    /// Silently drop the second occurrence of a scalar option instead of
    /// reporting an error.
    pub ignore_duplicates: bool,
}

impl ParseOptions {
    /// The options command files are always parsed with.
    fn command_file() -> Self {
        Self {
            expand_env_vars: true,
            ignore_program_name: true,
            support_comments: true,
            ignore_duplicates: true,
        }
    }
}

/// A file-ish thing encountered during parsing, applied to the source
/// loader once parsing is complete, in encounter order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileAction {
    AddFiles {
        pattern: String,
        base: Option<PathBuf>,
    },
    AddLibraryFile {
        pattern: String,
        base: Option<PathBuf>,
    },
}

/// Mutable state threaded through a parse: the raw option values, the
/// ordered file actions, and the resolution base directory that `-F`
/// command files establish for their relative paths.
#[derive(Debug, Default)]
pub struct ParseState {
    pub options: CliOptions,
    pub file_actions: Vec<FileAction>,
    pub base: Option<PathBuf>,
    pub depth: usize,
    pub any_failed_files: bool,
    pub help_requested: bool,
    pub version_requested: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OptionKind {
    Flag,
    Single,
    List,
    CommandFile { relative_to_file: bool },
    LibraryFile,
    Help,
    Version,
}

struct OptionDef {
    /// Comma-separated spellings, canonical name first. `+name` spellings
    /// match the vendor plus-form.
    names: &'static str,
    value: Option<&'static str>,
    help: &'static str,
    is_file_path: bool,
    kind: OptionKind,
}

impl OptionDef {
    fn canonical(&self) -> &'static str {
        self.names.split(',').next().expect("names is never empty")
    }

    fn matches(&self, spelling: &str) -> bool {
        self.names.split(',').any(|name| name == spelling)
    }

    fn wants_value(&self) -> bool {
        !matches!(
            self.kind,
            OptionKind::Flag | OptionKind::Help | OptionKind::Version
        )
    }
}

const fn opt(
    names: &'static str,
    value: Option<&'static str>,
    help: &'static str,
    is_file_path: bool,
    kind: OptionKind,
) -> OptionDef {
    OptionDef {
        names,
        value,
        help,
        is_file_path,
        kind,
    }
}

#[rustfmt::skip]
const SCHEMA: &[OptionDef] = &[
    opt("-h,--help", None, "Display available options", false, OptionKind::Help),
    opt("--version", None, "Display version information and exit", false, OptionKind::Version),

    opt("-I,--include-directory,+incdir", Some("<dir>"), "Additional include search paths", true, OptionKind::List),
    opt("--isystem", Some("<dir>"), "Additional system include search paths", true, OptionKind::List),

    opt("-y,--libdir", Some("<dir>"), "Library search paths, which will be searched for missing modules", true, OptionKind::List),
    opt("-Y,--libext", Some("<ext>"), "Additional library file extensions to search", false, OptionKind::List),
    opt("-v", Some("<filename>"), "Library files, which are separate compilation units where modules are not automatically instantiated", true, OptionKind::LibraryFile),
    opt("--exclude-ext", Some("<ext>"), "Exclude provided source files with these extensions", false, OptionKind::List),

    opt("-D,--define-macro,+define", Some("<macro>=<value>"), "Define <macro> to <value> (or 1 if <value> omitted) in all source files", false, OptionKind::List),
    opt("-U,--undefine-macro", Some("<macro>"), "Undefine macro name at the start of all source files", false, OptionKind::List),
    opt("--max-include-depth", Some("<depth>"), "Maximum depth of nested include files allowed", false, OptionKind::Single),
    opt("--libraries-inherit-macros", None, "If true, library files will inherit macro definitions from the primary source files", false, OptionKind::Flag),
    opt("--ignore-directive", Some("<directive>"), "Ignore this preprocessor directive and all its arguments, to the end of the line", false, OptionKind::List),

    opt("--cmd-ignore", Some("<vendor_cmd>,<N>"), "Define rule to ignore vendor command <vendor_cmd> with its subsequent <N> parameters", false, OptionKind::List),
    opt("--cmd-rename", Some("<vendor_cmd>,<canonical>"), "Define rule to rename vendor command <vendor_cmd> into existing <canonical> command", false, OptionKind::List),

    opt("--max-parse-depth", Some("<depth>"), "Maximum depth of nested language constructs allowed", false, OptionKind::Single),
    opt("--max-lexer-errors", Some("<count>"), "Maximum number of errors that can occur during lexing before the rest of the file is skipped", false, OptionKind::Single),
    opt("-j,--threads", Some("<count>"), "The number of threads to use to parallelize parsing", false, OptionKind::Single),

    opt("--max-hierarchy-depth", Some("<depth>"), "Maximum depth of the design hierarchy", false, OptionKind::Single),
    opt("--max-generate-steps", Some("<steps>"), "Maximum number of steps that can occur during generate block evaluation", false, OptionKind::Single),
    opt("--max-constexpr-depth", Some("<depth>"), "Maximum depth of recursive function calls in constant expressions", false, OptionKind::Single),
    opt("--max-constexpr-steps", Some("<steps>"), "Maximum number of steps that can occur when evaluating a constant expression", false, OptionKind::Single),
    opt("--constexpr-backtrace-limit", Some("<limit>"), "Maximum number of frames to show when printing a constant evaluation backtrace", false, OptionKind::Single),
    opt("--max-instance-array", Some("<limit>"), "Maximum number of instances allowed in a single instance array", false, OptionKind::Single),

    opt("--compat", Some("vcs"), "Attempt to increase compatibility with the specified tool", false, OptionKind::Single),
    opt("-T,--timing", Some("min|typ|max"), "Select which value to consider in min:typ:max expressions", false, OptionKind::Single),
    opt("--timescale", Some("<base>/<precision>"), "Default time scale to use for design elements that don't specify one explicitly", false, OptionKind::Single),
    opt("--allow-use-before-declare", None, "Don't issue an error for use of names before their declarations", false, OptionKind::Flag),
    opt("--ignore-unknown-modules", None, "Don't issue an error for instantiations of unknown modules", false, OptionKind::Flag),
    opt("--relax-enum-conversions", None, "Allow all integral types to convert implicitly to enum types", false, OptionKind::Flag),
    opt("--allow-hierarchical-const", None, "Allow hierarchical references in constant expressions", false, OptionKind::Flag),
    opt("--allow-dup-initial-drivers", None, "Allow signals driven in an always_comb or always_ff block to also be driven by initial blocks", false, OptionKind::Flag),
    opt("--strict-driver-checking", None, "Perform strict driver checking, which currently means disabling procedural 'for' loop unrolling", false, OptionKind::Flag),
    opt("--lint-only", None, "Only perform linting of code, don't try to elaborate a full hierarchy", false, OptionKind::Flag),
    opt("--top", Some("<name>"), "One or more top-level modules to instantiate (instead of figuring it out automatically)", false, OptionKind::List),
    opt("-G", Some("<name>=<value>"), "One or more parameter overrides to apply when instantiating top-level modules", false, OptionKind::List),

    opt("-W", Some("<warning>"), "Control the specified warning", false, OptionKind::List),
    opt("--color-diagnostics", None, "Always print diagnostics in color; if this option is unset, colors will be enabled if a color-capable terminal is detected", false, OptionKind::Flag),
    opt("--diag-column", None, "Show column numbers in diagnostic output", false, OptionKind::Flag),
    opt("--diag-location", None, "Show location information in diagnostic output", false, OptionKind::Flag),
    opt("--diag-source", None, "Show source line and caret in diagnostic output", false, OptionKind::Flag),
    opt("--diag-option", None, "Show option names in diagnostic output", false, OptionKind::Flag),
    opt("--diag-include-stack", None, "Show include stacks in diagnostic output", false, OptionKind::Flag),
    opt("--diag-macro-expansion", None, "Show macro expansion backtraces in diagnostic output", false, OptionKind::Flag),
    opt("--diag-hierarchy", None, "Show hierarchy locations in diagnostic output", false, OptionKind::Flag),
    opt("--error-limit", Some("<limit>"), "Limit on the number of errors that will be printed. Setting this to zero will disable the limit", false, OptionKind::Single),
    opt("--suppress-warnings", Some("<filename>"), "One or more paths in which to suppress warnings", true, OptionKind::List),
    opt("--suppress-macro-warnings", Some("<filename>"), "One or more paths in which to suppress warnings that originate in macro expansions", true, OptionKind::List),

    opt("--single-unit", None, "Treat all input files as a single compilation unit", false, OptionKind::Flag),
    opt("-f", Some("<filename>"), "One or more command files containing additional program options. Paths in the file are considered relative to the current directory", true, OptionKind::CommandFile { relative_to_file: false }),
    opt("-F", Some("<filename>"), "One or more command files containing additional program options. Paths in the file are considered relative to the file itself", true, OptionKind::CommandFile { relative_to_file: true }),

    opt("-E,--preprocess", None, "Only run the preprocessor (and print preprocessed files to stdout)", false, OptionKind::Flag),
    opt("--macros-only", None, "Print a list of found macros and exit", false, OptionKind::Flag),
    opt("--obfuscate", None, "Randomize identifiers in the preprocessed output", false, OptionKind::Flag),
    opt("--fixed-seed", None, "Use a fixed seed when obfuscating identifiers, for reproducible output", false, OptionKind::Flag),
    opt("--comments", None, "Include comments in preprocessed output", false, OptionKind::Flag),
    opt("--directives", None, "Include compiler directives in preprocessed output", false, OptionKind::Flag),
    opt("-q,--quiet", None, "Suppress non-essential output", false, OptionKind::Flag),
];

enum Applied {
    Ok,
    Duplicate,
    Error(String),
}

fn set_scalar<T>(slot: &mut Option<T>, value: T) -> Applied {
    if slot.is_some() {
        Applied::Duplicate
    } else {
        *slot = Some(value);
        Applied::Ok
    }
}

fn set_number(slot: &mut Option<usize>, canonical: &str, value: &str) -> Applied {
    match value.parse() {
        Ok(number) => set_scalar(slot, number),
        Err(_) => Applied::Error(format!(
            "invalid value '{}' for {} option, expected a number",
            value, canonical
        )),
    }
}

/// The command-line parser. Accumulates errors across nested parses;
/// `errors` is the single place the driver reads them back from.
#[derive(Default)]
pub struct CommandLine {
    errors: Vec<String>,
}

impl CommandLine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Parses one argument string, binding values into `state`.
    pub fn parse(&mut self, arg_string: &str, opts: ParseOptions, state: &mut ParseState) {
        let mut tokens = tokenize(arg_string, opts);
        if !opts.ignore_program_name && !tokens.is_empty() {
            tokens.remove(0);
        }

        let mut iter = tokens.into_iter();
        while let Some(mut token) = iter.next() {
            if token.is_empty() {
                continue;
            }
            if opts.expand_env_vars {
                token = expand_env_vars(&token);
            }

            if let Some(skip) = match_ignore_rule(&token, &state.options) {
                log::debug!("ignoring vendor command {:?} (+{} args)", token, skip);
                for _ in 0..skip {
                    iter.next();
                }
                continue;
            }
            if let Some(renamed) = match_rename_rule(&token, &state.options) {
                log::debug!("renaming vendor command {:?} to {:?}", token, renamed);
                token = renamed;
            }

            self.parse_token(token, &mut iter, opts, state);
        }
    }

    fn parse_token(
        &mut self,
        token: String,
        iter: &mut impl Iterator<Item = String>,
        opts: ParseOptions,
        state: &mut ParseState,
    ) {
        if let Some(rest) = token.strip_prefix("--") {
            if rest.is_empty() {
                return;
            }
            let (name, attached) = match rest.split_once('=') {
                Some((name, value)) => (format!("--{}", name), Some(value.to_owned())),
                None => (token.clone(), None),
            };
            match find_def(&name) {
                Some(def) => self.bind(def, &name, attached, iter, opts, state),
                None => self
                    .errors
                    .push(format!("unknown command line argument '{}'", token)),
            }
        } else if token.starts_with('+') {
            let mut parts = token[1..].split('+');
            let name = format!("+{}", parts.next().unwrap_or_default());
            let values: Vec<&str> = parts.collect();
            match find_def(&name) {
                Some(def) => {
                    if !def.wants_value() {
                        if values.is_empty() {
                            self.bind(def, &name, None, iter, opts, state);
                        } else {
                            self.errors
                                .push(format!("unexpected value for argument '{}'", name));
                        }
                    } else if values.is_empty() {
                        self.errors
                            .push(format!("no value provided for argument '{}'", name));
                    } else {
                        for value in values {
                            self.bind(def, &name, Some(value.to_owned()), iter, opts, state);
                        }
                    }
                }
                None => self
                    .errors
                    .push(format!("unknown command line argument '{}'", token)),
            }
        } else if token.starts_with('-') && token.len() > 1 {
            let name = token[..2].to_owned();
            let rest = &token[2..];
            match find_def(&name) {
                Some(def) => {
                    let attached = if rest.is_empty() {
                        None
                    } else if let Some(value) = rest.strip_prefix('=') {
                        Some(value.to_owned())
                    } else {
                        Some(rest.to_owned())
                    };
                    if !def.wants_value() && attached.is_some() {
                        self.errors
                            .push(format!("unknown command line argument '{}'", token));
                    } else {
                        self.bind(def, &name, attached, iter, opts, state);
                    }
                }
                None => self
                    .errors
                    .push(format!("unknown command line argument '{}'", token)),
            }
        } else {
            // Positional arguments are source file patterns.
            state.file_actions.push(FileAction::AddFiles {
                pattern: token,
                base: state.base.clone(),
            });
        }
    }

    fn bind(
        &mut self,
        def: &OptionDef,
        spelling: &str,
        attached: Option<String>,
        iter: &mut impl Iterator<Item = String>,
        opts: ParseOptions,
        state: &mut ParseState,
    ) {
        let canonical = def.canonical();

        if !def.wants_value() {
            let flag_value = match attached.as_deref() {
                None => true,
                Some(text) => match parse_bool(text) {
                    Some(value) => value,
                    None => {
                        self.errors.push(format!(
                            "invalid value '{}' for boolean argument '{}'",
                            text, spelling
                        ));
                        return;
                    }
                },
            };
            let applied = match def.kind {
                OptionKind::Help => {
                    state.help_requested = true;
                    Applied::Ok
                }
                OptionKind::Version => {
                    state.version_requested = true;
                    Applied::Ok
                }
                _ => apply_flag(&mut state.options, canonical, flag_value),
            };
            self.finish_apply(applied, spelling, opts);
            return;
        }

        let value = match attached {
            Some(value) => value,
            None => match iter.next() {
                Some(value) => value,
                None => {
                    self.errors
                        .push(format!("no value provided for argument '{}'", spelling));
                    return;
                }
            },
        };
        // File-name values always get environment expansion, even when
        // the surrounding parse doesn't do it for ordinary tokens.
        let value = if opts.expand_env_vars || def.is_file_path {
            expand_env_vars(&value)
        } else {
            value
        };

        // File-path values resolve against the active base directory;
        // canonicalization is deferred to validation.
        let value = if def.is_file_path {
            resolve_against_base(&value, state.base.as_deref())
        } else {
            value
        };

        match def.kind {
            OptionKind::CommandFile { relative_to_file } => {
                self.load_command_file(&value, relative_to_file, state);
            }
            OptionKind::LibraryFile => {
                state.file_actions.push(FileAction::AddLibraryFile {
                    pattern: value,
                    base: state.base.clone(),
                });
            }
            _ => {
                let applied = apply_value(&mut state.options, canonical, &value);
                self.finish_apply(applied, spelling, opts);
            }
        }
    }

    fn finish_apply(&mut self, applied: Applied, spelling: &str, opts: ParseOptions) {
        match applied {
            Applied::Ok => {}
            Applied::Duplicate => {
                if !opts.ignore_duplicates {
                    self.errors.push(format!("duplicate argument '{}'", spelling));
                }
            }
            Applied::Error(message) => self.errors.push(message),
        }
    }

    /// Reads and re-parses a `-f`/`-F` command file. `-F` additionally
    /// switches the resolution base directory to the file's parent for
    /// the duration of the nested parse.
    fn load_command_file(
        &mut self,
        path_str: &str,
        relative_to_file: bool,
        state: &mut ParseState,
    ) {
        let max_depth = state
            .options
            .max_include_depth
            .unwrap_or(DEFAULT_MAX_INCLUDE_DEPTH);
        if state.depth >= max_depth {
            self.errors
                .push(format!("command file include depth exceeded: '{}'", path_str));
            state.any_failed_files = true;
            return;
        }

        let path = Path::new(path_str);
        let canonical = match path.canonicalize() {
            Ok(canonical) => canonical,
            Err(_) => {
                self.errors
                    .push(format!("unable to find or open file '{}'", path_str));
                state.any_failed_files = true;
                return;
            }
        };
        let text = match fs::read_to_string(&canonical) {
            Ok(text) => text,
            Err(_) => {
                self.errors
                    .push(format!("unable to find or open file '{}'", path_str));
                state.any_failed_files = true;
                return;
            }
        };
        log::debug!("processing command file {:?}", canonical);

        let saved_base = state.base.clone();
        if relative_to_file {
            state.base = canonical.parent().map(Path::to_path_buf);
        }
        state.depth += 1;
        self.parse(&text, ParseOptions::command_file(), state);
        state.depth -= 1;
        state.base = saved_base;
    }

    /// Renders the option summary shown by `--help`.
    pub fn write_help(&self, out: &mut String) {
        out.push_str("USAGE: svdrive [options] <files...>\n\nOPTIONS:\n");
        for def in SCHEMA {
            let mut line = String::from("  ");
            line.push_str(&def.names.replace(',', ", "));
            if let Some(value) = def.value {
                line.push(' ');
                line.push_str(value);
            }
            if line.len() < 34 {
                line.push_str(&" ".repeat(34 - line.len()));
            } else {
                line.push('\n');
                line.push_str(&" ".repeat(34));
            }
            line.push_str(def.help);
            line.push('\n');
            out.push_str(&line);
        }
    }
}

fn find_def(spelling: &str) -> Option<&'static OptionDef> {
    SCHEMA.iter().find(|def| def.matches(spelling))
}

fn parse_bool(text: &str) -> Option<bool> {
    match text {
        "true" | "True" | "1" | "on" => Some(true),
        "false" | "False" | "0" | "off" => Some(false),
        _ => None,
    }
}

fn match_ignore_rule(token: &str, options: &CliOptions) -> Option<usize> {
    for (pattern, arg_count) in &options.vendor_ignore {
        if token == pattern {
            return Some(*arg_count);
        }
        // A +xyz rule also matches any +xyz+... spelling, which carries
        // its values inline and so consumes no following tokens.
        if pattern.starts_with('+') && token.starts_with(&format!("{}+", pattern)) {
            return Some(0);
        }
    }
    None
}

fn match_rename_rule(token: &str, options: &CliOptions) -> Option<String> {
    for (vendor, canonical) in &options.vendor_rename {
        if token == vendor {
            return Some(canonical.clone());
        }
        if vendor.starts_with('+') && token.starts_with(&format!("{}+", vendor)) {
            return Some(format!("{}{}", canonical, &token[vendor.len()..]));
        }
    }
    None
}

fn apply_flag(options: &mut CliOptions, canonical: &str, value: bool) -> Applied {
    let slot = match canonical {
        "--libraries-inherit-macros" => &mut options.libraries_inherit_macros,
        "--allow-use-before-declare" => &mut options.allow_use_before_declare,
        "--ignore-unknown-modules" => &mut options.ignore_unknown_modules,
        "--relax-enum-conversions" => &mut options.relax_enum_conversions,
        "--allow-hierarchical-const" => &mut options.allow_hierarchical_const,
        "--allow-dup-initial-drivers" => &mut options.allow_dup_initial_drivers,
        "--strict-driver-checking" => &mut options.strict_driver_checking,
        "--lint-only" => &mut options.lint_only,
        "--color-diagnostics" => &mut options.color_diagnostics,
        "--diag-column" => &mut options.diag_column,
        "--diag-location" => &mut options.diag_location,
        "--diag-source" => &mut options.diag_source,
        "--diag-option" => &mut options.diag_option,
        "--diag-include-stack" => &mut options.diag_include_stack,
        "--diag-macro-expansion" => &mut options.diag_macro_expansion,
        "--diag-hierarchy" => &mut options.diag_hierarchy,
        "--single-unit" => &mut options.single_unit,
        "-E" => &mut options.preprocess,
        "--macros-only" => &mut options.macros_only,
        "--obfuscate" => &mut options.obfuscate,
        "--fixed-seed" => &mut options.fixed_seed,
        "--comments" => &mut options.include_comments,
        "--directives" => &mut options.include_directives,
        "-q" => &mut options.quiet,
        _ => unreachable!("flag option '{}' missing from apply table", canonical),
    };
    set_scalar(slot, value)
}

fn apply_value(options: &mut CliOptions, canonical: &str, value: &str) -> Applied {
    match canonical {
        "-I" => options.include_dirs.push(value.to_owned()),
        "--isystem" => options.system_dirs.push(value.to_owned()),
        "-y" => options.library_dirs.push(value.to_owned()),
        "-Y" => options.library_exts.push(value.to_owned()),
        "--exclude-ext" => {
            options.exclude_exts.insert(value.to_owned());
        }
        "-D" => options.defines.push(value.to_owned()),
        "-U" => options.undefines.push(value.to_owned()),
        "--max-include-depth" => {
            return set_number(&mut options.max_include_depth, canonical, value)
        }
        "--ignore-directive" => {
            options.ignore_directives.insert(value.to_owned());
        }
        "--cmd-ignore" => {
            let parsed = value
                .split_once(',')
                .and_then(|(vendor, count)| Some((vendor, count.parse::<usize>().ok()?)));
            match parsed {
                Some((vendor, count)) => options.vendor_ignore.push((vendor.to_owned(), count)),
                None => {
                    return Applied::Error(format!(
                        "invalid format for --cmd-ignore argument: '{}', expected '<vendor_cmd>,<N>'",
                        value
                    ))
                }
            }
        }
        "--cmd-rename" => match value.split_once(',') {
            Some((vendor, canonical_name)) => options
                .vendor_rename
                .push((vendor.to_owned(), canonical_name.to_owned())),
            None => {
                return Applied::Error(format!(
                    "invalid format for --cmd-rename argument: '{}', expected '<vendor_cmd>,<canonical>'",
                    value
                ))
            }
        },
        "--max-parse-depth" => return set_number(&mut options.max_parse_depth, canonical, value),
        "--max-lexer-errors" => return set_number(&mut options.max_lexer_errors, canonical, value),
        "-j" => return set_number(&mut options.num_threads, canonical, value),
        "--max-hierarchy-depth" => {
            return set_number(&mut options.max_hierarchy_depth, canonical, value)
        }
        "--max-generate-steps" => {
            return set_number(&mut options.max_generate_steps, canonical, value)
        }
        "--max-constexpr-depth" => {
            return set_number(&mut options.max_constexpr_depth, canonical, value)
        }
        "--max-constexpr-steps" => {
            return set_number(&mut options.max_constexpr_steps, canonical, value)
        }
        "--constexpr-backtrace-limit" => {
            return set_number(&mut options.constexpr_backtrace_limit, canonical, value)
        }
        "--max-instance-array" => {
            return set_number(&mut options.max_instance_array, canonical, value)
        }
        "--compat" => return set_scalar(&mut options.compat, value.to_owned()),
        "-T" => return set_scalar(&mut options.min_typ_max, value.to_owned()),
        "--timescale" => return set_scalar(&mut options.timescale, value.to_owned()),
        "--top" => {
            options.top_modules.insert(value.to_owned());
        }
        "-G" => {
            if !value.contains('=') {
                return Applied::Error(format!(
                    "invalid format for -G argument: '{}', expected '<name>=<value>'",
                    value
                ));
            }
            options.param_overrides.push(value.to_owned());
        }
        "-W" => options.warning_options.push(value.to_owned()),
        "--error-limit" => return set_number(&mut options.error_limit, canonical, value),
        "--suppress-warnings" => options.suppress_warnings_paths.push(value.to_owned()),
        "--suppress-macro-warnings" => {
            options.suppress_macro_warnings_paths.push(value.to_owned());
        }
        _ => unreachable!("value option '{}' missing from apply table", canonical),
    }
    Applied::Ok
}

fn resolve_against_base(value: &str, base: Option<&Path>) -> String {
    match base {
        Some(base) if !Path::new(value).is_absolute() => base.join(value).display().to_string(),
        _ => value.to_owned(),
    }
}

/// Splits an argument string on whitespace, honoring quotes, backslash
/// escapes, and (for command files) comments.
fn tokenize(input: &str, opts: ParseOptions) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut chars = input.chars().peekable();

    fn flush(current: &mut String, in_token: &mut bool, tokens: &mut Vec<String>) {
        if *in_token {
            tokens.push(std::mem::take(current));
            *in_token = false;
        }
    }

    while let Some(c) = chars.next() {
        match c {
            c if c.is_whitespace() => flush(&mut current, &mut in_token, &mut tokens),
            '#' if opts.support_comments => {
                flush(&mut current, &mut in_token, &mut tokens);
                while let Some(&next) = chars.peek() {
                    if next == '\n' {
                        break;
                    }
                    chars.next();
                }
            }
            '/' if opts.support_comments && chars.peek() == Some(&'*') => {
                flush(&mut current, &mut in_token, &mut tokens);
                chars.next();
                let mut prev = '\0';
                for next in chars.by_ref() {
                    if prev == '*' && next == '/' {
                        break;
                    }
                    prev = next;
                }
            }
            '"' | '\'' => {
                in_token = true;
                for next in chars.by_ref() {
                    if next == c {
                        break;
                    }
                    current.push(next);
                }
            }
            '\\' => {
                in_token = true;
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            _ => {
                in_token = true;
                current.push(c);
            }
        }
    }
    flush(&mut current, &mut in_token, &mut tokens);
    tokens
}

/// Expands `$NAME` and `${NAME}` references from the process environment.
/// Unset variables expand to nothing.
pub fn expand_env_vars(input: &str) -> String {
    if !input.contains('$') {
        return input.to_owned();
    }
    let re = static_regex(r"\$(\w+)|\$\{([^}]+)\}");
    re.replace_all(input, |captures: &regex::Captures<'_>| {
        let name = captures
            .get(1)
            .or_else(|| captures.get(2))
            .expect("regex has exactly two alternates")
            .as_str();
        env::var(name).unwrap_or_default()
    })
    .into_owned()
}

/// Joins pre-split process arguments back into a parseable string,
/// quoting anything the tokenizer would otherwise split or mangle.
pub fn join_args(args: impl IntoIterator<Item = String>) -> String {
    let mut out = String::new();
    for arg in args {
        if !out.is_empty() {
            out.push(' ');
        }
        if arg.is_empty() || arg.contains(|c: char| c.is_whitespace() || c == '"' || c == '\\') {
            out.push('"');
            for c in arg.chars() {
                if c == '"' || c == '\\' {
                    out.push('\\');
                }
                out.push(c);
            }
            out.push('"');
        } else {
            out.push_str(&arg);
        }
    }
    out
}
