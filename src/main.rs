//! docvault CLI binary.
//!
//! All logic lives in the library; main only maps the result to a
//! process exit code.

fn main() {
    if let Err(code) = docvault::cli::run() {
        std::process::exit(code.as_i32());
    }
}
