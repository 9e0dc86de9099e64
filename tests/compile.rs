mod common;

use anyhow::Result;
use assert_fs::{prelude::*, NamedTempFile, TempDir};
use indoc::indoc;
use predicates::prelude::*;

#[test]
fn include_resolves_and_reports_top_instance() -> Result<()> {
    common::builder()
        .search_dir("-I", [("x.vh", "module m; endmodule\n")])?
        .named_source("src.v", "`include \"x.vh\"\n")?
        .command()
        .assert()
        .success()
        .stdout(
            predicate::str::contains("Top level design units:")
                .and(predicate::str::contains("    m\n"))
                .and(predicate::str::contains(
                    "Build succeeded: 0 errors, 0 warnings",
                )),
        );
    Ok(())
}

#[test]
fn inherit_macros_requires_single_unit() -> Result<()> {
    common::builder()
        .arg("--libraries-inherit-macros")
        .source_file("module m; endmodule\n")?
        .command()
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "--single-unit must be set when --libraries-inherit-macros is used",
        ))
        // Validation fails before any source is loaded or reported on.
        .stdout(predicate::str::contains("Build").not());
    Ok(())
}

#[test]
fn vcs_compat_ignores_implicit_enum_conversions() -> Result<()> {
    let source = indoc! {"
        module m;
        typedef enum logic [1:0] { A, B } state_t;
        state_t s = 1;
        endmodule
    "};

    common::builder()
        .arg("--compat")
        .arg("vcs")
        .source_file(source)?
        .command()
        .assert()
        .success()
        .stdout(predicate::str::contains("Build succeeded: 0 errors, 0 warnings"))
        .stderr(predicate::str::contains("implicit conversion").not());

    // Without the compat profile the conversion is a warning.
    common::builder()
        .source_file(source)?
        .command()
        .assert()
        .success()
        .stdout(predicate::str::contains("Build succeeded: 0 errors, 1 warning\n"))
        .stderr(predicate::str::contains("implicit conversion"));
    Ok(())
}

#[test]
fn invalid_compat_value_is_rejected() -> Result<()> {
    common::builder()
        .arg("--compat")
        .arg("foo")
        .source_file("module m; endmodule\n")?
        .command()
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value for compat option: 'foo'"));
    Ok(())
}

#[test]
fn error_limit_zero_reports_every_error() -> Result<()> {
    let mut source = String::from("module t;\n");
    for _ in 0..50 {
        source.push_str("= ;\n");
    }
    source.push_str("endmodule\n");

    common::builder()
        .arg("--error-limit")
        .arg("0")
        .source_file(&source)?
        .command()
        .assert()
        .failure()
        .stdout(predicate::str::contains("Build failed: 50 errors, 0 warnings"));
    Ok(())
}

#[test]
fn library_file_modules_are_not_auto_instantiated() -> Result<()> {
    let lib = NamedTempFile::new("lib.v")?;
    lib.write_str("module spare; endmodule\n")?;

    common::builder()
        .arg("-v")
        .arg(&lib.path().display().to_string())
        .source_file("module top; endmodule\n")?
        .command()
        .assert()
        .success()
        .stdout(
            predicate::str::contains("    top\n")
                .and(predicate::str::contains("spare").not()),
        );
    Ok(())
}

#[test]
fn library_search_path_supplies_missing_modules() -> Result<()> {
    common::builder()
        .search_dir("-y", [("helper.v", "module helper; endmodule\n")])?
        .source_file("module top; helper u0 (); endmodule\n")?
        .command()
        .assert()
        .success()
        .stdout(predicate::str::contains("Build succeeded: 0 errors, 0 warnings"));
    Ok(())
}

#[test]
fn unknown_module_fails_unless_ignored() -> Result<()> {
    let source = "module top; ghost u0 (); endmodule\n";

    common::builder()
        .source_file(source)?
        .command()
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown module 'ghost'"));

    common::builder()
        .arg("--ignore-unknown-modules")
        .source_file(source)?
        .command()
        .assert()
        .success();

    // --lint-only defaults ignore-unknown-modules to true.
    common::builder()
        .arg("--lint-only")
        .source_file(source)?
        .command()
        .assert()
        .success();
    Ok(())
}

#[test]
fn single_unit_shares_macros_across_files() -> Result<()> {
    let defines = "`define WIDTH 4\nmodule a; endmodule\n";
    let uses = "module b; wire [`WIDTH-1:0] w; endmodule\n";

    common::builder()
        .arg("--single-unit")
        .named_source("a.sv", defines)?
        .named_source("b.sv", uses)?
        .command()
        .assert()
        .success();

    // In separate compilation units the macro is unknown in b.sv.
    common::builder()
        .named_source("a.sv", defines)?
        .named_source("b.sv", uses)?
        .command()
        .assert()
        .failure()
        .stderr(predicate::str::contains("`WIDTH"));
    Ok(())
}

#[test]
fn libraries_inherit_macros_when_asked() -> Result<()> {
    let lib = NamedTempFile::new("lib.v")?;
    lib.write_str("module spare; wire [`WIDTH-1:0] w; endmodule\n")?;

    common::builder()
        .arg("--single-unit")
        .arg("--libraries-inherit-macros")
        .arg("-v")
        .arg(&lib.path().display().to_string())
        .source_file("`define WIDTH 4\nmodule top; endmodule\n")?
        .command()
        .assert()
        .success();
    Ok(())
}

#[test]
fn explicit_top_module_selection() -> Result<()> {
    common::builder()
        .arg("--top")
        .arg("leaf")
        .source_file("module leaf; endmodule\nmodule top; leaf u0 (); endmodule\n")?
        .command()
        .assert()
        .success()
        .stdout(predicate::str::contains("    leaf\n"));
    Ok(())
}

#[test]
fn quiet_suppresses_the_top_listing() -> Result<()> {
    common::builder()
        .arg("-q")
        .source_file("module m; endmodule\n")?
        .command()
        .assert()
        .success()
        .stdout(
            predicate::str::contains("Top level design units").not().and(
                predicate::str::contains("Build succeeded: 0 errors, 0 warnings"),
            ),
        );
    Ok(())
}

#[test]
fn warning_options_can_downgrade_promotions() -> Result<()> {
    // duplicate-definition is promoted to an error by default...
    let source = "module m; endmodule\nmodule m; endmodule\n";
    common::builder()
        .source_file(source)?
        .command()
        .assert()
        .failure()
        .stderr(predicate::str::contains("duplicate definition of 'm'"));

    // ...but user -W options run last and win.
    common::builder()
        .arg("-Wno-duplicate-definition")
        .source_file(source)?
        .command()
        .assert()
        .success();
    Ok(())
}

#[test]
fn pragma_diagnostic_regions_change_severities() -> Result<()> {
    common::builder()
        .source_file(indoc! {"
            module m;
            typedef enum logic [1:0] { A, B } state_t;
            `pragma diagnostic ignore \"-Wimplicit-convert\"
            state_t s = 1;
            endmodule
        "})?
        .command()
        .assert()
        .success()
        .stdout(predicate::str::contains("Build succeeded: 0 errors, 0 warnings"));
    Ok(())
}

#[test]
fn suppress_warnings_by_path() -> Result<()> {
    let dir = TempDir::new()?;
    let src = dir.child("noisy.sv");
    src.write_str(indoc! {"
        module m;
        typedef enum logic [1:0] { A, B } state_t;
        state_t s = 1;
        endmodule
    "})?;

    common::command()
        .arg("--suppress-warnings")
        .arg(dir.path())
        .arg(src.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Build succeeded: 0 errors, 0 warnings"));
    Ok(())
}
