#[cfg(windows)]
fn main() {
    let mut res = winres::WindowsResource::new();

    if std::path::Path::new("icon.ico").exists() {
        res.set_icon("icon.ico");
    }

    let version = env!("CARGO_PKG_VERSION");

    res.set("ProductName", "Cache Upload")
        .set("FileDescription", "Chunked file uploader for the OOMOL remote cache")
        .set("OriginalFilename", "cache-upload.exe")
        .set("FileVersion", version)
        .set("ProductVersion", version);

    if let Err(e) = res.compile() {
        eprintln!("Warning: Failed to set Windows resource metadata: {e}");
    }
}

#[cfg(not(windows))]
fn main() {
    // No-op for non-Windows builds
}
