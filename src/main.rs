use colored::Colorize;

fn main() {
    if let Err(err) = oaps::cli::run() {
        eprintln!("{} {err:#}", "error:".red());
        std::process::exit(1);
    }
}
