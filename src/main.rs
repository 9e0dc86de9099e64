use std::{env, io, process};

use anyhow::Result;
use clap::Parser;
use log::error;

use svdrive::{
    cli::{self, ParseOptions},
    Driver,
};

/// Thin shell over the driver's own argument parser: every token,
/// hyphenated or not, is collected verbatim and handed to the schema
/// parser, which understands vendor spellings like `+incdir+` that a
/// conventional flag parser cannot.
#[derive(Debug, Parser)]
#[command(
    name = "svdrive",
    about = "SystemVerilog compiler driver",
    disable_help_flag = true,
    disable_version_flag = true
)]
struct Cli {
    #[arg(allow_hyphen_values = true, trailing_var_arg = true)]
    args: Vec<String>,
}

fn try_main() -> Result<bool> {
    let cli = Cli::parse();
    let mut driver = Driver::new();

    let arg_string = cli::join_args(cli.args);
    let parse_ok = driver.parse_command_line(
        &arg_string,
        ParseOptions {
            // clap already consumed the program name.
            ignore_program_name: true,
            ..ParseOptions::default()
        },
    );

    if driver.state.help_requested {
        let mut help = String::new();
        driver.cmd_line.write_help(&mut help);
        print!("{}", help);
        return Ok(true);
    }
    if driver.state.version_requested {
        println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
        return Ok(true);
    }

    for error in driver.cmd_line.errors() {
        eprintln!("error: {}", error);
    }
    if !parse_ok {
        return Ok(false);
    }
    if !driver.process_options() {
        return Ok(false);
    }
    if !driver.has_files() {
        eprintln!("error: no input files");
        return Ok(false);
    }

    let opts = &driver.state.options;
    let quiet = opts.quiet.unwrap_or(false);
    if opts.preprocess.unwrap_or(false) {
        let include_comments = opts.include_comments.unwrap_or(false);
        let include_directives = opts.include_directives.unwrap_or(false);
        let obfuscate = opts.obfuscate.unwrap_or(false);
        let fixed_seed = opts.fixed_seed.unwrap_or(false);
        let stdout = io::stdout();
        return Ok(driver.run_preprocessor(
            include_comments,
            include_directives,
            obfuscate,
            fixed_seed,
            &mut stdout.lock(),
        ));
    }
    if opts.macros_only.unwrap_or(false) {
        let stdout = io::stdout();
        return Ok(driver.report_macros(&mut stdout.lock()));
    }

    let (trees, parse_ok) = driver.parse_all_sources();
    let mut compilation = driver.create_compilation(&trees);
    let report_ok = driver.report_compilation(&mut compilation, quiet);
    Ok(parse_ok && report_ok)
}

fn main() {
    let mut builder = env_logger::builder();
    if env::var_os("RUST_LOG_VERBOSE").is_some() {
        builder.format_timestamp_millis();
    } else {
        builder
            .format_level(true)
            .format_module_path(false)
            .format_target(false)
            .format_timestamp(None);
    }
    builder.init();

    match try_main() {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(err) => {
            error!("{:#}", err);
            process::exit(1);
        }
    }
}
