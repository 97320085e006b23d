/// Vehicle Registry - composable vehicle records with derived history ownership
///
/// This is the root crate that provides workspace-level documentation.
/// Actual implementation is in the subcrates:
/// - `vehicle-registry-core`: Vehicle collections, MOT history collections and the
///   composability index
/// - `vehicle-registry-cli`: Scenario runner that drives a ledger from a JSON command file

/// Returns the version of the package.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
