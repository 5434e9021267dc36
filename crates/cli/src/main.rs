use std::process::ExitCode;

fn main() -> ExitCode {
    metabot_cli::run()
}
