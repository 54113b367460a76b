fn main() {
    // Declare the cfgs Tauri normally emits so headless builds that skip
    // `tauri_build::build()` still pass `check-cfg`.
    println!("cargo:rustc-check-cfg=cfg(desktop)");
    println!("cargo:rustc-check-cfg=cfg(mobile)");

    // `tauri_build::build()` needs the `tauri` crate compiled in (it reads
    // env vars like `DEP_TAURI_DEV` that the crate's build exports). The
    // default feature set builds the core library only, so the helper runs
    // just for `--features app` builds.
    if std::env::var_os("CARGO_FEATURE_APP").is_some() {
        tauri_build::build()
    }
}
