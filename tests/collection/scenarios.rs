//! BDD scenarios for diagnostics collection.

use rstest_bdd_macros::scenario;

use super::test_helpers::{CollectionContext, collection_context};

#[scenario(
    path = "tests/features/collection.feature",
    name = "Copy a file from every host"
)]
fn scenario_copy_from_every_host(collection_context: CollectionContext) {
    let _ = collection_context;
}

#[scenario(
    path = "tests/features/collection.feature",
    name = "Isolate an unreachable host"
)]
fn scenario_isolate_unreachable_host(collection_context: CollectionContext) {
    let _ = collection_context;
}

#[scenario(
    path = "tests/features/collection.feature",
    name = "Export environment to later commands"
)]
fn scenario_export_environment(collection_context: CollectionContext) {
    let _ = collection_context;
}

#[scenario(
    path = "tests/features/collection.feature",
    name = "Reject configuration after the first action"
)]
fn scenario_reject_late_configuration(collection_context: CollectionContext) {
    let _ = collection_context;
}
