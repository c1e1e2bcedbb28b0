//! BDD step definitions for the provisioning workflow.

use cinder_pv::test_support::SnapshotNamespace;
use cinder_pv::{ManifestKind, ProvisionState, VolumeStatus};
use rstest_bdd_macros::{given, then, when};
use tokio::runtime::Builder;

use super::test_helpers::{DEVICE_ENTRY, ProvisionContext};

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("assertion failed: {0}")]
    Assertion(String),
}

#[given("a ready provisioning run")]
fn ready_run(provision_context: &ProvisionContext) {
    provision_context.device_appears.set(true);
}

#[given("the volume becomes available after \"{probes}\" status probes")]
fn available_after(provision_context: &ProvisionContext, probes: usize) {
    let statuses = std::iter::repeat_n(VolumeStatus::Creating, probes)
        .chain(std::iter::once(VolumeStatus::Available));
    provision_context.cloud.report_statuses(statuses);
}

#[given("the volume never becomes available")]
fn never_available(provision_context: &ProvisionContext) {
    provision_context
        .cloud
        .report_statuses([VolumeStatus::Creating]);
}

#[given("the attached device never appears")]
fn device_never_appears(provision_context: &ProvisionContext) {
    provision_context.device_appears.set(false);
}

#[given("the attachment is never released")]
fn attachment_never_released(provision_context: &ProvisionContext) {
    provision_context.cloud.attachment_never_clears();
}

#[given("the cluster rejects the claim")]
fn cluster_rejects_claim(provision_context: &ProvisionContext) {
    provision_context
        .registrar
        .fail_kind(ManifestKind::PersistentVolumeClaim);
}

#[given("each wait is limited to \"{secs}\" seconds")]
fn wait_limit(provision_context: &ProvisionContext, secs: u64) {
    provision_context.timeout_secs.set(secs);
}

#[when("I provision the volume")]
fn provision_volume(provision_context: &ProvisionContext) -> Result<(), StepError> {
    let runtime = Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .map_err(|err| StepError::Assertion(err.to_string()))?;
    if provision_context.device_appears.get() {
        provision_context
            .cloud
            .attach_creates_device(&provision_context.namespace, DEVICE_ENTRY);
    }

    let provisioner = provision_context.provisioner();
    let result = runtime.block_on(async move { provisioner.execute().await });
    provision_context.outcome.replace(Some(result));
    Ok(())
}

#[then("provisioning succeeds")]
fn provisioning_succeeds(provision_context: &ProvisionContext) -> Result<(), StepError> {
    match provision_context.outcome.borrow().as_ref() {
        Some(Ok(_)) => Ok(()),
        Some(Err(err)) => Err(StepError::Assertion(format!(
            "expected success, got failure: {err}"
        ))),
        None => Err(StepError::Assertion(String::from("missing outcome"))),
    }
}

#[then("provisioning fails with \"{reason}\"")]
fn provisioning_fails(
    provision_context: &ProvisionContext,
    reason: String,
) -> Result<(), StepError> {
    let outcome = provision_context.outcome.borrow();
    let Some(Err(err)) = outcome.as_ref() else {
        return Err(StepError::Assertion(String::from(
            "expected failure outcome",
        )));
    };
    if err.reason() == reason {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected reason {reason}, got {}",
            err.reason()
        )))
    }
}

#[then("\"{count}\" manifests are submitted")]
fn manifests_submitted(
    provision_context: &ProvisionContext,
    count: usize,
) -> Result<(), StepError> {
    let submitted = provision_context.registrar.submitted().len();
    if submitted == count {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {count} manifests, got {submitted}"
        )))
    }
}

#[then("the device is formatted as \"{filesystem}\"")]
fn device_formatted(
    provision_context: &ProvisionContext,
    filesystem: String,
) -> Result<(), StepError> {
    let expected_program = format!("mkfs.{filesystem}");
    let expected_path = format!("/dev/disk/by-id/{DEVICE_ENTRY}");
    let invocations = provision_context.runner.invocations();
    let formatted = invocations.iter().any(|invocation| {
        let command = invocation.command_string();
        invocation.program == expected_program && command.contains(&expected_path)
    });
    if formatted {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {expected_program} on {expected_path}, got {invocations:?}"
        )))
    }
}

#[then("the device is never formatted")]
fn device_not_formatted(provision_context: &ProvisionContext) -> Result<(), StepError> {
    let invocations = provision_context.runner.invocations();
    if invocations.is_empty() {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "no commands should run, got {invocations:?}"
        )))
    }
}

#[then("the volume is never attached")]
fn volume_not_attached(provision_context: &ProvisionContext) -> Result<(), StepError> {
    let calls = provision_context.cloud.calls();
    if calls.attach == 0 && attached_device_absent(&provision_context.namespace)? {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "volume should not be attached, got {calls:?}"
        )))
    }
}

#[then("the final state is \"{state}\"")]
fn final_state(provision_context: &ProvisionContext, state: String) -> Result<(), StepError> {
    let outcome = provision_context.outcome.borrow();
    let Some(Ok(result)) = outcome.as_ref() else {
        return Err(StepError::Assertion(String::from(
            "expected successful outcome",
        )));
    };
    let last = result.history.last().map(ProvisionState::to_string);
    if last.as_deref() == Some(state.as_str()) {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected final state {state}, got {last:?}"
        )))
    }
}

fn attached_device_absent(namespace: &SnapshotNamespace) -> Result<bool, StepError> {
    use cinder_pv::DeviceNamespace;

    let entries = namespace
        .entries()
        .map_err(|err| StepError::Assertion(err.to_string()))?;
    Ok(!entries.iter().any(|entry| entry == DEVICE_ENTRY))
}
