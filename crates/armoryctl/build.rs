// Build script for armoryctl - embeds version at compile time

fn main() {
    // Release builds set ARMORY_VERSION; local builds use Cargo.toml
    let version =
        std::env::var("ARMORY_VERSION").unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string());

    println!("cargo:rustc-env=ARMORY_VERSION={}", version);
    println!("cargo:rerun-if-changed=Cargo.toml");
    println!("cargo:rerun-if-env-changed=ARMORY_VERSION");
}
