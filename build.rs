use std::env;

fn main() {
    let target = env::var("TARGET").unwrap();

    // Host builds only run the simulated register tests
    if !target.contains("avr") {
        return;
    }

    println!("cargo:rustc-link-arg=-mmcu=atmega328p");
}
