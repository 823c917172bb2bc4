use std::env;

// Prints the necessary cargo link commands for the native client library.
fn main() {
    let prefix = env_prefix();
    println!("cargo:rerun-if-env-changed={}_LIB_DIR", prefix);
    println!("cargo:rerun-if-env-changed={}_LIB_NAME", prefix);
    if cfg!(target_os = "windows") {
        println!("cargo:rerun-if-env-changed=PATH");
    }

    let link_lib = env::var(format!("{}_LIB_NAME", prefix)).unwrap_or_else(|_| link_lib().to_string());
    println!("cargo:rustc-link-lib=dylib={}", link_lib);

    // Allow users to specify where to find the library. Otherwise we just output
    // the link-lib request and hope that the library exists on the system paths.
    if let Ok(dir) = env::var(format!("{}_LIB_DIR", prefix)) {
        println!("cargo:rustc-link-search=native={}", dir);
    }
}

fn env_prefix() -> &'static str {
    "LIBSQL_BRIDGE"
}

fn link_lib() -> &'static str {
    "sql_php_client"
}
