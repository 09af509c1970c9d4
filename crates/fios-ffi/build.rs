use std::env;
use std::path::PathBuf;

fn main() {
    println!("cargo:rerun-if-changed=src/");

    let Ok(crate_dir) = env::var("CARGO_MANIFEST_DIR") else {
        println!("cargo:warning=CARGO_MANIFEST_DIR not set, skipping C header");
        return;
    };
    let package_name = env::var("CARGO_PKG_NAME").unwrap_or_else(|_| "fios-ffi".to_string());

    let include_dir = target_dir(&crate_dir);
    if let Err(e) = std::fs::create_dir_all(&include_dir) {
        println!("cargo:warning=Cannot create {}: {e}", include_dir.display());
        return;
    }
    let output_file = include_dir.join(format!("{}.h", package_name.replace('-', "_")));

    let generated = cbindgen::Builder::new()
        .with_crate(&crate_dir)
        .with_language(cbindgen::Language::C)
        .with_pragma_once(true)
        .with_documentation(true)
        .with_include_guard("FIOS_FFI_H")
        .generate();

    match generated {
        Ok(bindings) => {
            bindings.write_to_file(&output_file);
            println!("cargo:warning=Generated C header: {}", output_file.display());
        }
        // A header failure must not break the library build itself.
        Err(e) => println!("cargo:warning=Unable to generate C header: {e}"),
    }
}

fn target_dir(crate_dir: &str) -> PathBuf {
    if let Ok(target) = env::var("CARGO_TARGET_DIR") {
        PathBuf::from(target).join("include")
    } else {
        PathBuf::from(crate_dir).join("../../target").join("include")
    }
}
