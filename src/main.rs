fn main() -> std::process::ExitCode {
    electron_bootstrap::run()
}
