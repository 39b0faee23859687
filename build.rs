fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Logged at startup
    let now = chrono::Utc::now();
    println!("cargo:rustc-env=BUILD_DATE={}", now.format("%Y-%m-%d"));
}
