//! Synthetic package manifest.
//!
//! The installer writes a throwaway SwiftPM package whose single
//! dynamic-library product depends on everything the user requested.
//! Tools version 5.5 is new enough to allow branch-based dependency
//! specifications.

use sjk_types::PackageRequest;

/// Name of the synthesized package, its product, and its target.
pub const PACKAGE_NAME: &str = "jupyterInstalledPackages";

/// File name of the (intentionally empty) target source.
pub const DUMMY_SOURCE: &str = "jupyterInstalledPackages.swift";

/// Contents of the dummy target source.
#[must_use]
pub fn dummy_source() -> &'static str {
    "// intentionally blank\n"
}

/// Renders `Package.swift` for the requested dependencies.
#[must_use]
pub fn render(requests: &[PackageRequest]) -> String {
    let mut dependencies = String::new();
    let mut products = String::new();
    for request in requests {
        dependencies.push_str(&format!("        {},\n", request.spec));
        for product in &request.products {
            let quoted = serde_json::to_string(product).unwrap_or_else(|_| format!("\"{product}\""));
            products.push_str(&format!("        {quoted},\n"));
        }
    }

    format!(
        "// swift-tools-version:5.5\n\
         import PackageDescription\n\
         let package = Package(\n\
         \x20   name: \"{PACKAGE_NAME}\",\n\
         \x20   products: [\n\
         \x20       .library(\n\
         \x20           name: \"{PACKAGE_NAME}\",\n\
         \x20           type: .dynamic,\n\
         \x20           targets: [\"{PACKAGE_NAME}\"]),\n\
         \x20   ],\n\
         \x20   dependencies: [\n{dependencies}\x20   ],\n\
         \x20   targets: [\n\
         \x20       .target(\n\
         \x20           name: \"{PACKAGE_NAME}\",\n\
         \x20           dependencies: [\n{products}\x20           ],\n\
         \x20           path: \".\",\n\
         \x20           sources: [\"{DUMMY_SOURCE}\"]),\n\
         \x20   ])\n"
    )
}

/// Human-readable summary of the requested packages for the install
/// banner.
#[must_use]
pub fn describe(requests: &[PackageRequest]) -> String {
    let mut out = String::new();
    for request in requests {
        out.push_str(&format!("\t{}\n", request.spec));
        for product in &request.products {
            out.push_str(&format!("\t\t{product}\n"));
        }
    }
    out
}
