//! Unit tests for the SSH-backed session provider.

use std::time::Duration;

use camino::Utf8Path;
use rstest::{fixture, rstest};

use super::*;
use crate::resource::{HostListProvider, Provider, SshConfig};
use crate::test_support::ScriptedRunner;

#[fixture]
fn resource() -> HostResource {
    let ssh = SshConfig {
        username: String::from("ops"),
        port: 22,
        private_key_path: Some(String::from("/keys/id_ed25519")),
        max_retries: 3,
        timeout: Duration::from_secs(7),
    };
    HostListProvider::new(["node-a:2200"], ssh)
        .resolve()
        .expect("host should resolve")
        .into_iter()
        .next()
        .expect("one resource")
}

#[fixture]
fn runner() -> ScriptedRunner {
    ScriptedRunner::new()
}

fn provider(runner: &ScriptedRunner) -> SshSessionProvider<ScriptedRunner> {
    SshSessionProvider::new(SshTooling::default(), runner.clone())
}

#[rstest]
#[tokio::test]
async fn connect_probes_with_resource_options(resource: HostResource, runner: ScriptedRunner) {
    runner.push_success();
    provider(&runner)
        .connect(&resource)
        .await
        .expect("probe should succeed");

    let invocations = runner.invocations();
    let probe = invocations.first().expect("probe invocation");
    assert_eq!(probe.program, "ssh");
    assert_eq!(probe.limit, Duration::from_secs(7));
    assert_eq!(
        probe.command_string(),
        "ssh -p 2200 -i /keys/id_ed25519 -o BatchMode=yes -o StrictHostKeyChecking=no \
         -o UserKnownHostsFile=/dev/null -o ConnectTimeout=7 ops@node-a true"
    );
}

#[rstest]
#[tokio::test]
async fn connect_reports_client_failures_as_transient(
    resource: HostResource,
    runner: ScriptedRunner,
) {
    runner.push_output(Some(255), "", "ssh: connect to host node-a port 2200: Connection refused");
    let Err(err) = provider(&runner).connect(&resource).await else {
        panic!("refused connection should fail");
    };
    assert!(err.is_transient(), "unexpected error: {err}");
    assert!(err.to_string().contains("Connection refused"), "{err}");
}

#[rstest]
#[tokio::test]
async fn connect_propagates_timeouts(resource: HostResource, runner: ScriptedRunner) {
    runner.push_error(SessionError::Timeout {
        operation: String::from("ssh"),
        seconds: 7,
    });
    let Err(err) = provider(&runner).connect(&resource).await else {
        panic!("timeout should fail");
    };
    assert!(err.is_transient());
}

#[rstest]
#[tokio::test]
async fn missing_client_binary_is_permanent(resource: HostResource, runner: ScriptedRunner) {
    let Err(err) = provider(&runner).connect(&resource).await else {
        panic!("spawn failure should fail");
    };
    assert!(matches!(err, SessionError::Spawn { .. }));
    assert!(!err.is_transient());
}

#[rstest]
#[tokio::test]
async fn list_parses_matches_one_per_line(resource: HostResource, runner: ScriptedRunner) {
    runner.push_success();
    runner.push_output(Some(0), "bar/a.txt\nbar/b.txt\n", "");
    let session = provider(&runner).connect(&resource).await.expect("connect");

    let matches = session.list("bar/*.txt").await.expect("listing");
    assert_eq!(matches, ["bar/a.txt", "bar/b.txt"]);

    let invocations = runner.invocations();
    let listing = invocations.get(1).and_then(|call| call.last_arg());
    assert_eq!(
        listing.as_deref(),
        Some("for f in bar/*.txt; do [ -e \"$f\" ] && printf '%s\\n' \"$f\"; done; true")
    );
}

#[rstest]
#[tokio::test]
async fn list_with_no_matches_is_empty(resource: HostResource, runner: ScriptedRunner) {
    runner.push_success();
    runner.push_success();
    let session = provider(&runner).connect(&resource).await.expect("connect");
    assert!(session.list("/var/log/*.gz").await.expect("listing").is_empty());
}

#[test]
fn listing_command_escapes_shell_syntax() {
    assert_eq!(
        ssh::listing_command("logs/$(reboot)*"),
        "for f in logs/\\$\\(reboot\\)*; do [ -e \"$f\" ] && printf '%s\\n' \"$f\"; done; true"
    );
}

#[rstest]
#[case(false, "scp -P 2200 -i /keys/id_ed25519 -o BatchMode=yes -o StrictHostKeyChecking=no -o UserKnownHostsFile=/dev/null -o ConnectTimeout=7 -r ops@node-a:/var/log/syslog /tmp/out/syslog")]
#[case(true, "scp -P 2200 -i /keys/id_ed25519 -o BatchMode=yes -o StrictHostKeyChecking=no -o UserKnownHostsFile=/dev/null -o ConnectTimeout=7 -C -r ops@node-a:/var/log/syslog /tmp/out/syslog")]
#[tokio::test]
async fn fetch_builds_scp_invocation(
    resource: HostResource,
    runner: ScriptedRunner,
    #[case] compress: bool,
    #[case] expected: &str,
) {
    runner.push_success();
    runner.push_success();
    let session = provider(&runner).connect(&resource).await.expect("connect");
    session
        .fetch("/var/log/syslog", Utf8Path::new("/tmp/out/syslog"), compress)
        .await
        .expect("fetch");

    let invocations = runner.invocations();
    let transfer = invocations.get(1).expect("scp invocation");
    assert_eq!(transfer.command_string(), expected);
}

#[rstest]
#[case(false, "/var/log/my app/out (1).log", "ops@node-a:/var/log/my app/out (1).log")]
#[case(true, "/var/log/my app/out (1).log", "ops@node-a:'/var/log/my app/out (1).log'")]
#[case(true, "~/logs/a b.txt", "ops@node-a:~/'logs/a b.txt'")]
#[case(true, "/var/log/syslog", "ops@node-a:/var/log/syslog")]
#[tokio::test]
async fn fetch_quotes_remote_path_only_for_legacy_protocol(
    resource: HostResource,
    runner: ScriptedRunner,
    #[case] legacy: bool,
    #[case] remote: &str,
    #[case] expected: &str,
) {
    runner.push_success();
    runner.push_success();
    let tooling = SshTooling {
        legacy_scp_protocol: legacy,
        ..SshTooling::default()
    };
    let session = SshSessionProvider::new(tooling, runner.clone())
        .connect(&resource)
        .await
        .expect("connect");
    session
        .fetch(remote, Utf8Path::new("/tmp/out/file"), false)
        .await
        .expect("fetch");

    let invocations = runner.invocations();
    let transfer = invocations.get(1).expect("scp invocation");
    let args = transfer
        .args
        .iter()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect::<Vec<_>>();
    assert_eq!(args.iter().rev().nth(1).map(String::as_str), Some(expected));
    assert_eq!(args.iter().any(|arg| arg == "-O"), legacy);
}

#[rstest]
#[tokio::test]
async fn fetch_failure_is_permanent(resource: HostResource, runner: ScriptedRunner) {
    runner.push_success();
    runner.push_output(Some(1), "", "scp: /nope: No such file or directory");
    let session = provider(&runner).connect(&resource).await.expect("connect");
    let err = session
        .fetch("/nope", Utf8Path::new("/tmp/out/nope"), false)
        .await
        .expect_err("missing path should fail");
    assert!(matches!(err, SessionError::Transfer { ref path, .. } if path == "/nope"));
    assert!(!err.is_transient());
}

#[rstest]
#[tokio::test]
async fn run_returns_remote_exit_status(resource: HostResource, runner: ScriptedRunner) {
    runner.push_success();
    runner.push_output(Some(3), "partial", "boom");
    let session = provider(&runner).connect(&resource).await.expect("connect");
    let output = session.run("uptime").await.expect("run");
    assert_eq!(output.code, Some(3));
    assert_eq!(output.stdout, "partial");
}

#[test]
fn ipv6_hosts_are_bracketed_for_scp() {
    let ssh = SshConfig::default();
    let resource = HostListProvider::new(["[fe80::1]"], ssh)
        .resolve()
        .expect("v6 host should resolve")
        .into_iter()
        .next()
        .expect("one resource");
    let runner = ScriptedRunner::new();
    runner.push_success();
    runner.push_success();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime");
    runtime.block_on(async {
        let session = provider(&runner).connect(&resource).await.expect("connect");
        session
            .fetch("a.txt", Utf8Path::new("/tmp/a.txt"), false)
            .await
            .expect("fetch");
    });
    let invocations = runner.invocations();
    let spec = invocations
        .get(1)
        .and_then(|call| call.args.iter().rev().nth(1))
        .map(|arg| arg.to_string_lossy().into_owned());
    assert_eq!(spec.as_deref(), Some("root@[fe80::1]:a.txt"));
}

#[test]
fn expand_tilde_only_touches_own_home() {
    let home = std::env::var("HOME").expect("HOME should be set");
    assert_eq!(expand_tilde("~/.ssh/id_rsa"), format!("{home}/.ssh/id_rsa"));
    assert_eq!(expand_tilde("~"), home);
    assert_eq!(expand_tilde("~ops/.ssh/id_rsa"), "~ops/.ssh/id_rsa");
    assert_eq!(expand_tilde("/keys/id"), "/keys/id");
}

#[test]
fn transient_classification() {
    let connect = SessionError::Connect {
        host: String::from("a"),
        message: String::from("refused"),
    };
    let listing = SessionError::Listing {
        pattern: String::from("*"),
        message: String::from("denied"),
    };
    assert!(connect.is_transient());
    assert!(!listing.is_transient());
}
