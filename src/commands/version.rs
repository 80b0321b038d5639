//! `devrig version`: prints the binary's own version.

pub fn run() {
    println!("devrig {}", env!("CARGO_PKG_VERSION"));
}
