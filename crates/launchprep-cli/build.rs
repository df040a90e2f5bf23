use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Native payloads compiled into the binary. Each one is copied from the
/// directory named by `LAUNCHPREP_EMBED_DIR`; a missing file is embedded as
/// an empty payload, which the binary treats as "not bundled".
const PAYLOADS: &[&str] = &[
    "launcher_core.dll",
    "vcruntime140.dll",
    "vcruntime140_1.dll",
    "msvcp140.dll",
    "PreLoader.dll",
    "PeEditor.exe",
];

fn main() {
    let out_dir = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR is set by cargo"));
    let embed_dir = env::var_os("LAUNCHPREP_EMBED_DIR").map(PathBuf::from);

    for name in PAYLOADS {
        let target = out_dir.join(name);
        match embed_dir.as_deref().map(|dir| dir.join(name)) {
            Some(source) if source.is_file() => {
                fs::copy(&source, &target).unwrap_or_else(|e| {
                    panic!("Failed to copy {}: {}", source.display(), e)
                });
                println!("cargo:rerun-if-changed={}", source.display());
            }
            source => {
                if let Some(source) = source {
                    println!(
                        "cargo:warning={} not found, building without it",
                        source.display()
                    );
                }
                write_empty(&target);
            }
        }
    }

    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed=LAUNCHPREP_EMBED_DIR");
}

fn write_empty(target: &Path) {
    fs::write(target, []).unwrap_or_else(|e| panic!("Failed to write {}: {}", target.display(), e));
}
