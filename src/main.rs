fn main() {
    if let Err(err) = colayout::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
