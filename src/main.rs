fn main() {
    let args: Vec<String> = std::env::args().collect();
    if let Err(err) = diku::run(&args) {
        eprintln!("diku: {}", err);
        std::process::exit(1);
    }
}
