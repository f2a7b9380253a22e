use std::env;
use std::fs;
use std::path::PathBuf;

fn main() {
    // Put the linker script where `-Tlink.x` can find it.
    let out = PathBuf::from(env::var_os("OUT_DIR").expect("OUT_DIR not set"));
    fs::copy("link.x", out.join("link.x")).expect("failed to copy link.x");
    println!("cargo:rustc-link-search={}", out.display());
    println!("cargo:rerun-if-changed=link.x");
    println!("cargo:rerun-if-changed=build.rs");
}
