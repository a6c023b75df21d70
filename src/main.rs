use std::process::ExitCode;

fn main() -> ExitCode {
    es_provision::run()
}
