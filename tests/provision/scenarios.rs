//! BDD scenarios for the provisioning workflow.

use rstest_bdd_macros::scenario;

use super::test_helpers::{ProvisionContext, provision_context};

#[scenario(
    path = "tests/features/provision.feature",
    name = "Provision, prepare and register a new volume"
)]
fn scenario_provision_volume(provision_context: ProvisionContext) {
    drop(provision_context);
}

#[scenario(
    path = "tests/features/provision.feature",
    name = "Give up when the volume never becomes available"
)]
fn scenario_create_timeout(provision_context: ProvisionContext) {
    drop(provision_context);
}

#[scenario(
    path = "tests/features/provision.feature",
    name = "Give up when the attached device never appears"
)]
fn scenario_attach_timeout(provision_context: ProvisionContext) {
    drop(provision_context);
}

#[scenario(
    path = "tests/features/provision.feature",
    name = "Give up when the attachment is never released"
)]
fn scenario_detach_timeout(provision_context: ProvisionContext) {
    drop(provision_context);
}

#[scenario(
    path = "tests/features/provision.feature",
    name = "Report a volume the cluster only partly accepted"
)]
fn scenario_partial_registration(provision_context: ProvisionContext) {
    drop(provision_context);
}
