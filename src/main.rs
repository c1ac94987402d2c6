fn main() {
    if let Err(e) = padbridge_lib::run() {
        padbridge_lib::report_fatal(&e);
        std::process::exit(1);
    }
}
