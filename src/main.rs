//! gh-pmu - bulk field updates for GitHub Projects

use std::process::ExitCode;

fn main() -> ExitCode {
    if let Err(e) = gh_pmu::cli::run() {
        eprintln!("Error: {:#}", e);
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
