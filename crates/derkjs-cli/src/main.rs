use std::env;
use std::fs;
use std::process::ExitCode;

use derkjs::{DerkRun, Program, RunConfig, StdPrint, VmError};

fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();
    let parsed = match parse_args(&args) {
        Ok(parsed) => parsed,
        Err(message) => {
            eprintln!("error: {message}");
            eprintln!("usage: derkjs <script.djsb> [polyfill.djsb] [--gc-threshold N]");
            return ExitCode::FAILURE;
        }
    };

    let script = match read_image(&parsed.script) {
        Ok(program) => program,
        Err(message) => {
            eprintln!("error: {message}");
            return ExitCode::FAILURE;
        }
    };

    let mut run = DerkRun::new(script);
    if let Some(path) = &parsed.polyfill {
        match read_image(path) {
            Ok(program) => run = run.with_polyfill(program),
            Err(message) => {
                eprintln!("error: {message}");
                return ExitCode::FAILURE;
            }
        }
    }
    let mut config = RunConfig::new();
    if let Some(threshold) = parsed.gc_threshold {
        config = config.gc_threshold(threshold);
    }

    match run.with_config(config).run(&mut StdPrint) {
        Ok(_) => ExitCode::SUCCESS,
        Err(error) => {
            report(&error);
            ExitCode::from(error.code().exit_code())
        }
    }
}

struct CliArgs {
    script: String,
    polyfill: Option<String>,
    gc_threshold: Option<usize>,
}

fn parse_args(args: &[String]) -> Result<CliArgs, String> {
    let mut script = None;
    let mut polyfill = None;
    let mut gc_threshold = None;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--gc-threshold" => {
                let value = args.get(i + 1).ok_or("--gc-threshold requires a value")?;
                gc_threshold = Some(value.parse::<usize>().map_err(|_| "invalid --gc-threshold value")?);
                i += 2;
            }
            path if script.is_none() => {
                script = Some(path.to_owned());
                i += 1;
            }
            path if polyfill.is_none() => {
                polyfill = Some(path.to_owned());
                i += 1;
            }
            extra => return Err(format!("unexpected argument: {extra}")),
        }
    }
    Ok(CliArgs {
        script: script.ok_or("missing script path")?,
        polyfill,
        gc_threshold,
    })
}

fn read_image(path: &str) -> Result<Program, String> {
    let bytes = fs::read(path).map_err(|e| format!("cannot read {path}: {e}"))?;
    postcard::from_bytes(&bytes).map_err(|e| format!("{path} is not a valid program image: {e}"))
}

/// One line per error to stderr, matching the VM taxonomy.
fn report(error: &VmError) {
    eprintln!("{error}");
}
