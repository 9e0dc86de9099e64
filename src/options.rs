//! The typed option bag handed to downstream services, and the validation
//! that builds it from raw command-line values.
use std::{
    collections::BTreeSet,
    fmt::{self, Display, Formatter},
    str::FromStr,
};

use anyhow::{bail, Error};
use regex::Regex;

use crate::diag::{DiagCode, DiagnosticEngine, Severity};

fn static_regex(re: &'static str) -> Regex {
    Regex::new(re).expect("invalid hardcoded regex")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MinTypMax {
    Min,
    #[default]
    Typ,
    Max,
}

impl FromStr for MinTypMax {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "min" => Self::Min,
            "typ" => Self::Typ,
            "max" => Self::Max,
            _ => bail!("invalid value for timing option: '{}'", s),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Seconds,
    Milliseconds,
    Microseconds,
    Nanoseconds,
    Picoseconds,
    Femtoseconds,
}

impl TimeUnit {
    /// Power-of-ten exponent relative to one second.
    fn exponent(self) -> i8 {
        match self {
            Self::Seconds => 0,
            Self::Milliseconds => -3,
            Self::Microseconds => -6,
            Self::Nanoseconds => -9,
            Self::Picoseconds => -12,
            Self::Femtoseconds => -15,
        }
    }

    fn suffix(self) -> &'static str {
        match self {
            Self::Seconds => "s",
            Self::Milliseconds => "ms",
            Self::Microseconds => "us",
            Self::Nanoseconds => "ns",
            Self::Picoseconds => "ps",
            Self::Femtoseconds => "fs",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeScaleValue {
    pub magnitude: u16,
    pub unit: TimeUnit,
}

impl TimeScaleValue {
    fn exponent(self) -> i8 {
        let mag = match self.magnitude {
            1 => 0,
            10 => 1,
            _ => 2,
        };
        self.unit.exponent() + mag
    }
}

impl FromStr for TimeScaleValue {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let re = static_regex(r"^(1|10|100)\s*(s|ms|us|ns|ps|fs)$");
        let captures = match re.captures(s.trim()) {
            Some(captures) => captures,
            None => bail!("invalid time scale value: '{}'", s),
        };
        let magnitude = captures[1].parse().expect("regex restricts magnitude");
        let unit = match &captures[2] {
            "s" => TimeUnit::Seconds,
            "ms" => TimeUnit::Milliseconds,
            "us" => TimeUnit::Microseconds,
            "ns" => TimeUnit::Nanoseconds,
            "ps" => TimeUnit::Picoseconds,
            "fs" => TimeUnit::Femtoseconds,
            _ => unreachable!("regex restricts units"),
        };
        Ok(Self { magnitude, unit })
    }
}

impl Display for TimeScaleValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.magnitude, self.unit.suffix())
    }
}

/// A `base/precision` pair as written in `--timescale` or a `timescale
/// directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeScale {
    pub base: TimeScaleValue,
    pub precision: TimeScaleValue,
}

impl FromStr for TimeScale {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (base, precision) = match s.split_once('/') {
            Some(parts) => parts,
            None => bail!("invalid value for timescale option: '{}'", s),
        };
        let base: TimeScaleValue = base.parse()?;
        let precision: TimeScaleValue = precision.parse()?;
        if precision.exponent() > base.exponent() {
            bail!("timescale precision must be at least as precise as the base unit");
        }
        Ok(Self { base, precision })
    }
}

impl Display for TimeScale {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.precision)
    }
}

#[derive(Debug, Clone)]
pub struct SourceOptions {
    pub num_threads: usize,
    pub single_unit: bool,
    pub lint_only: bool,
    pub libraries_inherit_macros: bool,
}

#[derive(Debug, Clone)]
pub struct PreprocessorOptions {
    pub predefines: Vec<String>,
    pub undefines: Vec<String>,
    pub predefine_source: String,
    pub max_include_depth: usize,
    pub ignore_directives: BTreeSet<String>,
}

#[derive(Debug, Clone)]
pub struct LexerOptions {
    pub max_errors: usize,
}

#[derive(Debug, Clone)]
pub struct ParserOptions {
    pub max_recursion_depth: usize,
}

#[derive(Debug, Clone)]
pub struct CompilationOptions {
    pub max_instance_depth: usize,
    pub max_generate_steps: usize,
    pub max_constexpr_depth: usize,
    pub max_constexpr_steps: usize,
    pub max_constexpr_backtrace: usize,
    pub max_instance_array: usize,
    pub error_limit: usize,
    pub suppress_unused: bool,
    pub script_mode: bool,
    pub lint_mode: bool,
    pub allow_hierarchical_const: bool,
    pub allow_dup_initial_drivers: bool,
    pub relax_enum_conversions: bool,
    pub strict_driver_checking: bool,
    pub ignore_unknown_modules: bool,
    pub allow_use_before_declare: bool,
    pub top_modules: BTreeSet<String>,
    pub param_overrides: Vec<String>,
    pub min_typ_max: MinTypMax,
    pub default_time_scale: Option<TimeScale>,
}

/// The immutable bag of configuration consumed by downstream services.
/// Built once by option validation; only read afterwards.
#[derive(Debug, Clone)]
pub struct OptionBag {
    pub source: SourceOptions,
    pub preprocessor: PreprocessorOptions,
    pub lexer: LexerOptions,
    pub parser: ParserOptions,
    pub compilation: CompilationOptions,
}

pub const DEFAULT_ERROR_LIMIT: usize = 20;
pub const DEFAULT_MAX_INCLUDE_DEPTH: usize = 1024;

/// Raw values bound by the command-line parser. Scalars are `Option` so
/// that validation can tell "explicitly set" apart from "defaulted".
#[derive(Debug, Default)]
pub struct CliOptions {
    pub include_dirs: Vec<String>,
    pub system_dirs: Vec<String>,
    pub library_dirs: Vec<String>,
    pub library_exts: Vec<String>,
    pub exclude_exts: BTreeSet<String>,

    pub defines: Vec<String>,
    pub undefines: Vec<String>,
    pub max_include_depth: Option<usize>,
    pub libraries_inherit_macros: Option<bool>,
    pub ignore_directives: BTreeSet<String>,

    pub max_parse_depth: Option<usize>,
    pub max_lexer_errors: Option<usize>,
    pub num_threads: Option<usize>,

    pub max_hierarchy_depth: Option<usize>,
    pub max_generate_steps: Option<usize>,
    pub max_constexpr_depth: Option<usize>,
    pub max_constexpr_steps: Option<usize>,
    pub constexpr_backtrace_limit: Option<usize>,
    pub max_instance_array: Option<usize>,

    pub compat: Option<String>,
    pub min_typ_max: Option<String>,
    pub timescale: Option<String>,
    pub allow_use_before_declare: Option<bool>,
    pub ignore_unknown_modules: Option<bool>,
    pub relax_enum_conversions: Option<bool>,
    pub allow_hierarchical_const: Option<bool>,
    pub allow_dup_initial_drivers: Option<bool>,
    pub strict_driver_checking: Option<bool>,
    pub lint_only: Option<bool>,
    pub top_modules: BTreeSet<String>,
    pub param_overrides: Vec<String>,

    pub warning_options: Vec<String>,
    pub color_diagnostics: Option<bool>,
    pub diag_column: Option<bool>,
    pub diag_location: Option<bool>,
    pub diag_source: Option<bool>,
    pub diag_option: Option<bool>,
    pub diag_include_stack: Option<bool>,
    pub diag_macro_expansion: Option<bool>,
    pub diag_hierarchy: Option<bool>,
    pub error_limit: Option<usize>,
    pub suppress_warnings_paths: Vec<String>,
    pub suppress_macro_warnings_paths: Vec<String>,

    pub single_unit: Option<bool>,

    pub preprocess: Option<bool>,
    pub macros_only: Option<bool>,
    pub obfuscate: Option<bool>,
    pub fixed_seed: Option<bool>,
    pub include_comments: Option<bool>,
    pub include_directives: Option<bool>,
    pub quiet: Option<bool>,

    pub vendor_ignore: Vec<(String, usize)>,
    pub vendor_rename: Vec<(String, String)>,
}

impl CliOptions {
    /// Validates cross-option invariants and materializes the option bag.
    /// Pure with respect to the parsed values: no filesystem access, no
    /// mutation of `self`. Returns the bag plus any validation errors; the
    /// bag is only meaningful when the error list is empty.
    pub fn create_option_bag(&self) -> (OptionBag, Vec<String>) {
        let mut errors = Vec::new();

        // Compatibility profile first, so that explicit fine-grained
        // options still win over its defaults.
        let mut allow_hierarchical_const = self.allow_hierarchical_const;
        let mut allow_use_before_declare = self.allow_use_before_declare;
        let mut relax_enum_conversions = self.relax_enum_conversions;
        match self.compat.as_deref() {
            None => {}
            Some("vcs") => {
                allow_hierarchical_const.get_or_insert(true);
                allow_use_before_declare.get_or_insert(true);
                relax_enum_conversions.get_or_insert(true);
            }
            Some(other) => {
                errors.push(format!("invalid value for compat option: '{}'", other));
            }
        }

        let min_typ_max = match self.min_typ_max.as_deref() {
            None => MinTypMax::default(),
            Some(value) => value.parse().unwrap_or_else(|err: Error| {
                errors.push(err.to_string());
                MinTypMax::default()
            }),
        };

        let default_time_scale = match self.timescale.as_deref() {
            None => None,
            Some(value) => match value.parse::<TimeScale>() {
                Ok(scale) => Some(scale),
                Err(err) => {
                    errors.push(err.to_string());
                    None
                }
            },
        };

        if self.libraries_inherit_macros == Some(true) && self.single_unit != Some(true) {
            errors.push(
                "--single-unit must be set when --libraries-inherit-macros is used".to_owned(),
            );
        }

        let lint_only = self.lint_only.unwrap_or(false);
        let ignore_unknown_modules = match self.ignore_unknown_modules {
            Some(explicit) => explicit,
            None => lint_only,
        };

        let user_error_limit = self.error_limit.unwrap_or(DEFAULT_ERROR_LIMIT);

        let bag = OptionBag {
            source: SourceOptions {
                num_threads: self.num_threads.unwrap_or(0),
                single_unit: self.single_unit.unwrap_or(false),
                lint_only,
                libraries_inherit_macros: self.libraries_inherit_macros.unwrap_or(false),
            },
            preprocessor: PreprocessorOptions {
                predefines: self.defines.clone(),
                undefines: self.undefines.clone(),
                predefine_source: "<command-line>".to_owned(),
                max_include_depth: self.max_include_depth.unwrap_or(DEFAULT_MAX_INCLUDE_DEPTH),
                ignore_directives: self.ignore_directives.clone(),
            },
            lexer: LexerOptions {
                max_errors: self.max_lexer_errors.unwrap_or(64),
            },
            parser: ParserOptions {
                max_recursion_depth: self.max_parse_depth.unwrap_or(1024),
            },
            compilation: CompilationOptions {
                max_instance_depth: self.max_hierarchy_depth.unwrap_or(128),
                max_generate_steps: self.max_generate_steps.unwrap_or(131072),
                max_constexpr_depth: self.max_constexpr_depth.unwrap_or(128),
                max_constexpr_steps: self.max_constexpr_steps.unwrap_or(100000),
                max_constexpr_backtrace: self.constexpr_backtrace_limit.unwrap_or(10),
                max_instance_array: self.max_instance_array.unwrap_or(65535),
                // Each fatal error can surface as both a parse and an
                // elaboration diagnostic, so the compilation gets twice
                // the user-facing limit.
                error_limit: user_error_limit * 2,
                suppress_unused: lint_only,
                script_mode: false,
                lint_mode: lint_only,
                allow_hierarchical_const: allow_hierarchical_const.unwrap_or(false),
                allow_dup_initial_drivers: self.allow_dup_initial_drivers.unwrap_or(false),
                relax_enum_conversions: relax_enum_conversions.unwrap_or(false),
                strict_driver_checking: self.strict_driver_checking.unwrap_or(false),
                ignore_unknown_modules,
                allow_use_before_declare: allow_use_before_declare.unwrap_or(false),
                top_modules: self.top_modules.clone(),
                param_overrides: self.param_overrides.clone(),
                min_typ_max,
                default_time_scale,
            },
        };

        (bag, errors)
    }

    pub fn is_vcs_compat(&self) -> bool {
        self.compat.as_deref() == Some("vcs")
    }
}

/// Applies the driver's severity policy to a freshly defaulted engine:
/// mandatory overrides first, then either the vcs-compat ignores or the
/// standard promotions. User `-W` options run after this so they always
/// take final precedence.
pub fn apply_severity_overrides(engine: &mut DiagnosticEngine, vcs_compat: bool) {
    engine.set_severity(DiagCode::DuplicateDefinition, Severity::Error);
    engine.set_severity(DiagCode::BadProceduralForce, Severity::Error);

    if vcs_compat {
        for code in [
            DiagCode::StaticInitializerMustBeExplicit,
            DiagCode::ImplicitConvert,
            DiagCode::BadFinishNum,
            DiagCode::NonstandardSysFunc,
            DiagCode::NonstandardForeach,
            DiagCode::NonstandardDist,
        ] {
            engine.set_severity(code, Severity::Ignored);
        }
    } else {
        for code in [
            DiagCode::IndexOOB,
            DiagCode::RangeOOB,
            DiagCode::RangeWidthOOB,
            DiagCode::ImplicitNamedPortTypeMismatch,
            DiagCode::SplitDistWeightOp,
        ] {
            engine.set_severity(code, Severity::Error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bag_building_is_deterministic() {
        let mut options = CliOptions::default();
        options.defines.push("FOO=1".to_owned());
        options.num_threads = Some(4);
        let (first, errors_first) = options.create_option_bag();
        let (second, errors_second) = options.create_option_bag();
        assert!(errors_first.is_empty() && errors_second.is_empty());
        assert_eq!(format!("{:?}", first), format!("{:?}", second));
    }

    #[test]
    fn inherit_macros_requires_single_unit() {
        let mut options = CliOptions::default();
        options.libraries_inherit_macros = Some(true);
        let (_, errors) = options.create_option_bag();
        assert_eq!(
            errors,
            vec!["--single-unit must be set when --libraries-inherit-macros is used".to_owned()]
        );

        options.single_unit = Some(true);
        let (_, errors) = options.create_option_bag();
        assert!(errors.is_empty());
    }

    #[test]
    fn unknown_compat_profile_is_rejected() {
        let mut options = CliOptions::default();
        options.compat = Some("foo".to_owned());
        let (_, errors) = options.create_option_bag();
        assert_eq!(errors, vec!["invalid value for compat option: 'foo'".to_owned()]);
    }

    #[test]
    fn vcs_compat_defaults_are_idempotent_and_overridable() {
        let mut options = CliOptions::default();
        options.compat = Some("vcs".to_owned());
        options.relax_enum_conversions = Some(false);
        let (first, errors) = options.create_option_bag();
        assert!(errors.is_empty());
        assert!(first.compilation.allow_hierarchical_const);
        assert!(first.compilation.allow_use_before_declare);
        assert!(!first.compilation.relax_enum_conversions);

        // Applying the profile again changes nothing.
        let (second, _) = options.create_option_bag();
        assert_eq!(format!("{:?}", first), format!("{:?}", second));
    }

    #[test]
    fn error_limit_doubles_into_the_compilation() {
        let options = CliOptions::default();
        let (bag, _) = options.create_option_bag();
        assert_eq!(bag.compilation.error_limit, DEFAULT_ERROR_LIMIT * 2);

        let mut options = CliOptions::default();
        options.error_limit = Some(0);
        let (bag, _) = options.create_option_bag();
        assert_eq!(bag.compilation.error_limit, 0);
    }

    #[test]
    fn lint_only_implies_suppression_defaults() {
        let mut options = CliOptions::default();
        options.lint_only = Some(true);
        let (bag, _) = options.create_option_bag();
        assert!(bag.compilation.suppress_unused);
        assert!(bag.compilation.lint_mode);
        assert!(bag.compilation.ignore_unknown_modules);

        options.ignore_unknown_modules = Some(false);
        let (bag, _) = options.create_option_bag();
        assert!(!bag.compilation.ignore_unknown_modules);
    }

    #[test]
    fn timing_selector_accepts_only_min_typ_max() {
        for (value, ok) in [("min", true), ("typ", true), ("max", true), ("typical", false)] {
            let mut options = CliOptions::default();
            options.min_typ_max = Some(value.to_owned());
            let (_, errors) = options.create_option_bag();
            assert_eq!(errors.is_empty(), ok, "value {:?}", value);
        }
    }

    #[test]
    fn timescale_grammar() {
        assert!("1ns/1ps".parse::<TimeScale>().is_ok());
        assert!("10 us / 100 ns".parse::<TimeScale>().is_ok());
        assert!("1ps/1ns".parse::<TimeScale>().is_err());
        assert!("2ns/1ps".parse::<TimeScale>().is_err());
        assert!("1ns".parse::<TimeScale>().is_err());
        let scale: TimeScale = "100us/1ns".parse().expect("valid timescale");
        assert_eq!(scale.to_string(), "100us/1ns");
    }

    #[test]
    fn severity_pipeline_matches_composition() {
        // setDefaultWarnings ⊕ mandatory ⊕ promotions ⊕ user options.
        let mut engine = DiagnosticEngine::new();
        engine.set_default_warnings();
        apply_severity_overrides(&mut engine, false);
        assert_eq!(engine.severity(DiagCode::DuplicateDefinition), Severity::Error);
        assert_eq!(engine.severity(DiagCode::IndexOOB), Severity::Error);

        // The user can downgrade any promotion afterwards.
        engine.set_warning_options(&["no-error=index-oob".to_string()]);
        assert_eq!(engine.severity(DiagCode::IndexOOB), Severity::Warning);

        let mut vcs = DiagnosticEngine::new();
        vcs.set_default_warnings();
        apply_severity_overrides(&mut vcs, true);
        assert_eq!(vcs.severity(DiagCode::ImplicitConvert), Severity::Ignored);
        assert_eq!(vcs.severity(DiagCode::IndexOOB), Severity::Warning);
    }
}
