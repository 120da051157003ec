use std::process::ExitCode;

fn main() -> ExitCode {
    tawar_cli::run()
}
