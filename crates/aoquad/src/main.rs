mod cli;
mod exit;
mod paths;
mod run;

use std::process::ExitCode;

fn main() -> ExitCode {
    let args = cli::parse();
    match run::run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(exit::code_for(&err))
        }
    }
}
