use std::process::ExitCode;

fn main() -> ExitCode {
    rxalt_cli::run()
}
