mod common;

use anyhow::Result;
use assert_fs::{prelude::*, TempDir};
use predicates::prelude::*;

#[test]
fn invoking_help() {
    common::command()
        .arg("-h")
        .assert()
        .success()
        .stdout(predicate::str::contains("USAGE: svdrive"));

    common::command()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--include-directory"));
}

#[test]
fn invoking_version() {
    common::command()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("svdrive"));
}

#[test]
fn no_input_files() {
    common::command()
        .assert()
        .failure()
        .stderr(predicate::str::contains("no input files"));
}

#[test]
fn missing_source_file() {
    common::command()
        .arg("definitely/not/here.sv")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unable to find or open file"));
}

#[test]
fn unknown_argument_fails() {
    common::command()
        .arg("--frobnicate")
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "unknown command line argument '--frobnicate'",
        ));
}

#[test]
fn command_file_paths_resolve_against_the_file() -> Result<()> {
    // -F makes paths inside the command file relative to the file's own
    // directory, no matter where the tool is invoked from.
    let dir = TempDir::new()?;
    let nested = dir.child("path/to");
    nested.create_dir_all()?;
    nested.child("foo.v").write_str("module foo; endmodule\n")?;
    nested.child("cmd.f").write_str("foo.v\n")?;

    common::command()
        .arg("-F")
        .arg(nested.child("cmd.f").path())
        .assert()
        .success()
        .stdout(predicate::str::contains("    foo\n"));

    // With -f the same file resolves against the invocation directory
    // and the source is not found.
    common::command()
        .arg("-f")
        .arg(nested.child("cmd.f").path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("unable to find or open file"));
    Ok(())
}

#[test]
fn excluded_extensions_are_skipped() -> Result<()> {
    let dir = TempDir::new()?;
    dir.child("a.sv").write_str("module a; endmodule\n")?;
    dir.child("junk.txt").write_str("this is not verilog ;\n")?;

    common::command()
        .arg("--exclude-ext")
        .arg("txt")
        .arg(dir.child("a.sv").path())
        .arg(dir.child("junk.txt").path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Build succeeded"));
    Ok(())
}

#[test]
fn vendor_commands_can_be_ignored() -> Result<()> {
    let dir = TempDir::new()?;
    dir.child("a.sv").write_str("module a; endmodule\n")?;

    common::command()
        .arg("--cmd-ignore")
        .arg("+notimingchecks,0")
        .arg("+notimingchecks")
        .arg(dir.child("a.sv").path())
        .assert()
        .success();
    Ok(())
}
