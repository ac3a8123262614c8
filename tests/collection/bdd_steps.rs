//! BDD step definitions for diagnostics collection.

use std::fs::read_to_string;

use crashd::paths::sanitize;
use crashd::{ActionOutcome, DefaultsError, RunError};
use rstest_bdd_macros::{given, then, when};
use tokio::runtime::Runtime;

use super::test_helpers::{CollectionContext, RunOutcome};

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("assertion failed: {0}")]
    Assertion(String),
}

#[given("a script targeting hosts \"{hosts}\"")]
fn script_targeting_hosts(mut collection_context: CollectionContext, hosts: String) -> CollectionContext {
    collection_context.hosts = hosts.split_whitespace().map(str::to_owned).collect();
    collection_context.push_line(format!("FROM {hosts}"));
    collection_context
}

#[given("every host holds \"{path}\" containing \"{contents}\"")]
fn every_host_holds(
    mut collection_context: CollectionContext,
    path: String,
    contents: String,
) -> CollectionContext {
    collection_context.files.push((path, contents));
    collection_context
}

#[given("host \"{host}\" is unreachable")]
fn host_is_unreachable(mut collection_context: CollectionContext, host: String) -> CollectionContext {
    collection_context.unreachable.push(host);
    collection_context
}

#[given("the script copies \"{path}\"")]
fn script_copies(mut collection_context: CollectionContext, path: String) -> CollectionContext {
    collection_context.push_line(format!("COPY {path}"));
    collection_context
}

#[given("the script captures \"{command}\"")]
fn script_captures(mut collection_context: CollectionContext, command: String) -> CollectionContext {
    collection_context.push_line(format!("CAPTURE {command}"));
    collection_context
}

#[given("the script sets environment \"{pair}\"")]
fn script_sets_env(mut collection_context: CollectionContext, pair: String) -> CollectionContext {
    collection_context.push_line(format!("ENV {pair}"));
    collection_context
}

#[given("the script sets workdir \"{path}\"")]
fn script_sets_workdir(mut collection_context: CollectionContext, path: String) -> CollectionContext {
    collection_context.push_line(format!("WORKDIR {path}"));
    collection_context
}

#[when("I run the script")]
fn run_script(mut collection_context: CollectionContext) -> Result<CollectionContext, StepError> {
    let runtime = Runtime::new().map_err(|err| StepError::Assertion(err.to_string()))?;
    collection_context.outcome = Some(collection_context.run(&runtime));
    Ok(collection_context)
}

fn outcomes(collection_context: &CollectionContext) -> Result<Vec<ActionOutcome>, StepError> {
    match collection_context.outcome.as_ref() {
        Some(RunOutcome::Completed { results, .. }) => Ok(results
            .iter()
            .flat_map(|result| result.result.outcomes().iter().cloned())
            .collect()),
        Some(RunOutcome::Rejected { error, .. }) => {
            Err(StepError::Assertion(format!("run failed: {error}")))
        }
        None => Err(StepError::Assertion(String::from("script was not run"))),
    }
}

fn outcome_for(collection_context: &CollectionContext, host: &str) -> Result<ActionOutcome, StepError> {
    outcomes(collection_context)?
        .into_iter()
        .find(|outcome| outcome.resource == host)
        .ok_or_else(|| StepError::Assertion(format!("no outcome for {host}")))
}

#[then("every host reports success in declaration order")]
fn every_host_succeeds(collection_context: &CollectionContext) -> Result<(), StepError> {
    let found = outcomes(collection_context)?;
    let resources: Vec<&str> = found.iter().map(|outcome| outcome.resource.as_str()).collect();
    if resources != collection_context.hosts {
        return Err(StepError::Assertion(format!(
            "expected outcomes for {:?}, got {resources:?}",
            collection_context.hosts
        )));
    }
    match found.iter().find(|outcome| !outcome.is_success()) {
        Some(failed) => Err(StepError::Assertion(format!("unexpected failure: {failed:?}"))),
        None => Ok(()),
    }
}

#[then("the artifact \"{path}\" from \"{host}\" contains \"{contents}\"")]
fn artifact_contains(
    collection_context: &CollectionContext,
    path: String,
    host: String,
    contents: String,
) -> Result<(), StepError> {
    let artifact = collection_context.workdir.join(sanitize(&host)).join(&path);
    let found = read_to_string(&artifact)
        .map_err(|err| StepError::Assertion(format!("read {artifact}: {err}")))?;
    if found.contains(&contents) {
        Ok(())
    } else {
        Err(StepError::Assertion(format!("{artifact} holds {found:?}")))
    }
}

#[then("host \"{host}\" reports a failure")]
fn host_reports_failure(collection_context: &CollectionContext, host: String) -> Result<(), StepError> {
    let outcome = outcome_for(collection_context, &host)?;
    if outcome.is_success() || !outcome.result.is_empty() {
        return Err(StepError::Assertion(format!("expected failure, got {outcome:?}")));
    }
    Ok(())
}

#[then("host \"{host}\" reports success")]
fn host_reports_success(collection_context: &CollectionContext, host: String) -> Result<(), StepError> {
    let outcome = outcome_for(collection_context, &host)?;
    if outcome.is_success() {
        Ok(())
    } else {
        Err(StepError::Assertion(format!("expected success, got {outcome:?}")))
    }
}

#[then("host \"{host}\" ran \"{command}\"")]
fn host_ran(
    collection_context: &CollectionContext,
    host: String,
    command: String,
) -> Result<(), StepError> {
    let Some(RunOutcome::Completed { commands, .. }) = collection_context.outcome.as_ref() else {
        return Err(StepError::Assertion(String::from("script did not complete")));
    };
    if commands.iter().any(|(resource, ran)| *resource == host && *ran == command) {
        Ok(())
    } else {
        Err(StepError::Assertion(format!("commands run: {commands:?}")))
    }
}

#[then("the run is rejected because \"{setting}\" is frozen")]
fn run_is_rejected(collection_context: &CollectionContext, setting: String) -> Result<(), StepError> {
    match collection_context.outcome.as_ref() {
        Some(RunOutcome::Rejected {
            error:
                RunError::Defaults {
                    source: DefaultsError::Frozen { setting: found },
                    ..
                },
            ..
        }) if *found == setting => Ok(()),
        other => Err(StepError::Assertion(format!(
            "expected frozen {setting}, got {other:?}"
        ))),
    }
}

#[then("no host was contacted")]
fn no_host_contacted(collection_context: &CollectionContext) -> Result<(), StepError> {
    let contacted = collection_context
        .outcome
        .as_ref()
        .map(RunOutcome::contacted)
        .ok_or_else(|| StepError::Assertion(String::from("script was not run")))?;
    if contacted.is_empty() {
        Ok(())
    } else {
        Err(StepError::Assertion(format!("contacted {contacted:?}")))
    }
}
