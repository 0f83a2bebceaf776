fn main() -> std::process::ExitCode {
    busterm_lib::run()
}
