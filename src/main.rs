use std::process::ExitCode;

fn main() -> ExitCode {
    papercast_lib::run()
}
