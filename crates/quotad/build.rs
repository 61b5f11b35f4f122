use std::process::Command;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-env-changed=AQE_COMMIT");
    println!("cargo:rerun-if-env-changed=AQE_BUILD_DATE");
    println!("cargo:rerun-if-env-changed=RUSTC");

    let rustc = std::env::var("RUSTC").unwrap_or_else(|_| "rustc".to_string());
    let version = Command::new(rustc)
        .arg("--version")
        .output()
        .ok()
        .filter(|out| out.status.success())
        .and_then(|out| String::from_utf8(out.stdout).ok())
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| "unknown".to_string());
    println!("cargo:rustc-env=AQE_RUSTC_VERSION={version}");

    if let Ok(date) = std::env::var("AQE_BUILD_DATE") {
        println!("cargo:rustc-env=AQE_BUILD_DATE={date}");
    }
    Ok(())
}
