//! Link OpenBLAS when the `use_openblas` backend is selected.

use std::path::PathBuf;

/// Directories that may hold `libopenblas`, taken from colon-separated environment paths and the
/// usual system prefixes.
#[cfg_attr(not(feature = "use_openblas"), allow(dead_code))]
fn link_search_paths() -> Vec<PathBuf> {
    let separator = if cfg!(windows) { ';' } else { ':' };
    let env_roots = ["REST_EXT_DIR", "LD_LIBRARY_PATH", "DYLD_LIBRARY_PATH"]
        .into_iter()
        .filter_map(|key| std::env::var(key).ok())
        .flat_map(|paths| paths.split(separator).map(PathBuf::from).collect::<Vec<_>>());
    let system_roots = ["/usr", "/usr/local", "/opt"].into_iter().map(PathBuf::from);

    env_roots
        .chain(system_roots)
        .flat_map(|root| ["", "lib", "lib64", "lib/x86_64-linux-gnu"].map(|lib| root.join(lib)))
        .filter(|path| !path.as_os_str().is_empty() && path.is_dir())
        .collect()
}

fn main() {
    println!("cargo:rerun-if-env-changed=REST_EXT_DIR");

    #[cfg(feature = "use_openblas")]
    {
        for path in link_search_paths() {
            println!("cargo:rustc-link-search=native={}", path.display());
        }
        println!("cargo:rustc-link-lib=openblas");
        println!("cargo:rustc-link-lib=gomp");
    }
}
