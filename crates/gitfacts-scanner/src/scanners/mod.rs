//! Built-in scanners.

pub mod cargo;
pub mod dockerfile;
pub mod files;
pub mod golang;
pub mod npm;

use crate::scanner::Scanner;

/// Every built-in scanner, in dispatch order.
pub fn all_scanners() -> Vec<Box<dyn Scanner>> {
    vec![
        Box::new(files::FileMetaScanner),
        Box::new(dockerfile::DockerfileScanner),
        Box::new(golang::GoModScanner),
        Box::new(npm::PackageJsonScanner),
        Box::new(npm::PackageLockScanner),
        Box::new(cargo::CargoManifestScanner),
    ]
}

/// Decode a blob as UTF-8, replacing invalid sequences.
pub(crate) fn text(bytes: Vec<u8>) -> String {
    String::from_utf8(bytes).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}
