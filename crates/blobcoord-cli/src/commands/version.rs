//! Version command.

pub fn run() {
    println!("coordinatord {}", env!("CARGO_PKG_VERSION"));
}
