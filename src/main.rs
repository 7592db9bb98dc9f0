fn main() {
    if let Err(err) = dance_coach_lib::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
