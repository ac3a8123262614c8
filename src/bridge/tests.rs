//! Builtin adaptation tests, including the `copy_from` call shapes scripts
//! rely on.

use camino::Utf8PathBuf;
use rstest::{fixture, rstest};
use tempfile::TempDir;

use super::*;
use crate::executor::{ConcurrencyPolicy, RetryPolicy};
use crate::paths::sanitize;
use crate::test_support::FakeSessionProvider;

struct Harness {
    _dir: TempDir,
    workdir: Utf8PathBuf,
    context: ScriptContext<FakeSessionProvider>,
}

fn harness(provider: FakeSessionProvider) -> Harness {
    let dir = TempDir::new().expect("temp dir");
    let workdir = Utf8PathBuf::from_path_buf(dir.path().join("crashd")).expect("utf8 temp dir");
    let defaults = Defaults::new(workdir.clone(), SshConfig::default());
    let executor = FanOutExecutor::new(provider, ConcurrencyPolicy::Sequential)
        .with_retry_policy(RetryPolicy::immediate());
    Harness {
        _dir: dir,
        workdir,
        context: ScriptContext::new(defaults, executor),
    }
}

#[fixture]
fn two_hosts() -> FakeSessionProvider {
    ["127.0.0.1", "localhost"]
        .into_iter()
        .fold(FakeSessionProvider::new(), |fake, host| {
            fake.with_file(host, "foo.txt", "foo")
                .with_file(host, "bar/bar.txt", "bar")
                .with_file(host, "bar/baz.txt", "baz")
        })
}

fn ssh_args() -> Arguments {
    Arguments::new()
        .kwarg("username", "ops")
        .kwarg("port", 22_i64)
        .kwarg("private_key_path", "~/.ssh/id_rsa")
}

async fn resources_for(context: &mut ScriptContext<FakeSessionProvider>, hosts: &[&str]) -> Value {
    let ssh = context
        .call("ssh_config", ssh_args())
        .await
        .expect("ssh_config");
    let hosts_value = hosts.iter().map(|host| Value::from(*host)).collect::<Vec<_>>();
    let provider = context
        .call(
            "host_list_provider",
            Arguments::new().kwarg("hosts", hosts_value).kwarg("ssh_config", ssh),
        )
        .await
        .expect("host_list_provider");
    context
        .call("resources", Arguments::new().kwarg("provider", provider))
        .await
        .expect("resources")
}

fn field<'a>(value: &'a Value, name: &str) -> &'a str {
    value
        .attr(name)
        .and_then(Value::as_str)
        .unwrap_or_else(|| panic!("missing field {name} in {value:?}"))
}

#[rstest]
#[tokio::test]
async fn copy_from_single_default_resource_returns_struct(two_hosts: FakeSessionProvider) {
    let mut h = harness(two_hosts);
    let resources = resources_for(&mut h.context, &["127.0.0.1"]).await;
    h.context
        .call("set_defaults", Arguments::new().arg(resources))
        .await
        .expect("set_defaults");

    let result = h
        .context
        .call("copy_from", Arguments::new().kwarg("path", "foo.txt"))
        .await
        .expect("copy_from");

    let expected = h.workdir.join(sanitize("127.0.0.1")).join("foo.txt");
    assert_eq!(field(&result, "resource"), "127.0.0.1");
    assert_eq!(field(&result, "err"), "");
    assert_eq!(field(&result, "result"), expected.as_str());
}

#[rstest]
#[case(true)]
#[case(false)]
#[tokio::test]
async fn copy_from_compress_keeps_destination(
    two_hosts: FakeSessionProvider,
    #[case] compress: bool,
) {
    let mut h = harness(two_hosts.clone());
    let resources = resources_for(&mut h.context, &["127.0.0.1"]).await;

    let result = h
        .context
        .call(
            "copy_from",
            Arguments::new()
                .kwarg("path", "foo.txt")
                .kwarg("resources", resources)
                .kwarg("compress", compress),
        )
        .await
        .expect("copy_from");

    let expected = h.workdir.join("127.0.0.1").join("foo.txt");
    assert_eq!(field(&result, "result"), expected.as_str());
    assert!(two_hosts.fetches().iter().all(|fetch| fetch.compress == compress));
}

#[rstest]
#[tokio::test]
async fn copy_from_many_resources_returns_ordered_list(two_hosts: FakeSessionProvider) {
    let mut h = harness(two_hosts);
    let resources = resources_for(&mut h.context, &["127.0.0.1", "localhost"]).await;

    let result = h
        .context
        .call(
            "copy_from",
            Arguments::new().arg("bar/*.txt").arg(resources),
        )
        .await
        .expect("copy_from");

    let items = result.as_list().expect("list result");
    assert_eq!(items.len(), 2);
    for (item, host) in items.iter().zip(["127.0.0.1", "localhost"]) {
        let dir = h.workdir.join(sanitize(host)).join("bar");
        assert_eq!(field(item, "resource"), host);
        assert_eq!(field(item, "result"), dir.as_str());
        assert_eq!(std::fs::read_dir(&dir).expect("dir").count(), 2);
    }
}

#[rstest]
#[tokio::test]
async fn copy_from_without_resources_fails(two_hosts: FakeSessionProvider) {
    let mut h = harness(two_hosts);
    let err = h
        .context
        .call("copy_from", Arguments::new().kwarg("path", "foo.txt"))
        .await
        .expect_err("no resources configured");
    assert_eq!(err, BridgeError::NoResources { builtin: "copy_from" });
}

#[rstest]
#[tokio::test]
async fn set_defaults_after_first_action_is_rejected(two_hosts: FakeSessionProvider) {
    let mut h = harness(two_hosts);
    let resources = resources_for(&mut h.context, &["127.0.0.1"]).await;
    h.context
        .call("set_defaults", Arguments::new().kwarg("resources", resources))
        .await
        .expect("set_defaults");
    h.context
        .call("copy_from", Arguments::new().kwarg("path", "foo.txt"))
        .await
        .expect("copy_from");

    let err = h
        .context
        .call("set_defaults", Arguments::new().arg("/elsewhere"))
        .await
        .expect_err("defaults are frozen");
    assert_eq!(
        err,
        BridgeError::Defaults(DefaultsError::Frozen { setting: "workdir" })
    );
}

#[rstest]
#[tokio::test]
async fn set_defaults_ssh_config_flows_into_providers(two_hosts: FakeSessionProvider) {
    let mut h = harness(two_hosts);
    let ssh = h
        .context
        .call("ssh_config", ssh_args().kwarg("max_retries", 2_i64))
        .await
        .expect("ssh_config");
    h.context
        .call("set_defaults", Arguments::new().kwarg("ssh_config", ssh))
        .await
        .expect("set_defaults");

    let provider = h
        .context
        .call("host_list_provider", Arguments::new().arg("node-a"))
        .await
        .expect("provider");
    let Value::Provider(list) = provider else {
        panic!("expected provider, got {provider:?}");
    };
    assert_eq!(list.ssh().username, "ops");
    assert_eq!(list.ssh().max_retries, 2);
    assert_eq!(h.context.defaults().ssh().username, "ops");
}

#[rstest]
#[case(Value::from("2222"), 2222)]
#[case(Value::from(" 2200 "), 2200)]
#[case(Value::Int(2022), 2022)]
#[tokio::test]
async fn ssh_config_accepts_numeric_strings_for_port(
    two_hosts: FakeSessionProvider,
    #[case] port: Value,
    #[case] expected: u16,
) {
    let mut h = harness(two_hosts);
    let value = h
        .context
        .call(
            "ssh_config",
            Arguments::new()
                .kwarg("username", "ops")
                .kwarg("port", port)
                .kwarg("max_retries", "4"),
        )
        .await
        .expect("ssh_config");
    let Value::SshConfig(config) = value else {
        panic!("expected ssh_config, got {value:?}");
    };
    assert_eq!(config.port, expected);
    assert_eq!(config.max_retries, 4);
}

#[rstest]
#[case("ssh_config", Arguments::new().kwarg("port", 0_i64), "port")]
#[case("ssh_config", Arguments::new().kwarg("port", "http"), "port")]
#[case("ssh_config", Arguments::new().kwarg("port", "70000"), "port")]
#[case("ssh_config", Arguments::new().kwarg("username", true), "username")]
#[case("host_list_provider", Arguments::new().kwarg("hosts", 5_i64), "hosts")]
#[case("resources", Arguments::new().arg("nope"), "provider")]
#[case("copy_from", Arguments::new().kwarg("compress", "yes"), "compress")]
#[tokio::test]
async fn invalid_arguments_name_the_parameter(
    two_hosts: FakeSessionProvider,
    #[case] builtin: &str,
    #[case] args: Arguments,
    #[case] param: &str,
) {
    let mut h = harness(two_hosts);
    let err = h.context.call(builtin, args).await.expect_err("invalid");
    let BridgeError::InvalidArgument { name, .. } = err else {
        panic!("expected InvalidArgument, got {err:?}");
    };
    assert_eq!(name, param);
}

#[rstest]
#[tokio::test]
async fn unexpected_and_unknown_calls_are_rejected(two_hosts: FakeSessionProvider) {
    let mut h = harness(two_hosts);
    let extra = h
        .context
        .call("ssh_config", Arguments::new().kwarg("password", "hunter2"))
        .await
        .expect_err("unexpected kwarg");
    assert!(matches!(extra, BridgeError::UnexpectedArgument { ref name, .. } if name == "password"));

    let missing = h
        .context
        .call("host_list_provider", Arguments::new())
        .await
        .expect_err("hosts required");
    assert_eq!(
        missing,
        BridgeError::MissingArgument {
            builtin: "host_list_provider",
            name: "hosts",
        }
    );

    let unknown = h
        .context
        .call("kube_config", Arguments::new())
        .await
        .expect_err("unknown builtin");
    assert!(matches!(unknown, BridgeError::UnknownBuiltin { .. }));
}

#[rstest]
#[tokio::test]
async fn resources_propagates_resolution_errors(two_hosts: FakeSessionProvider) {
    let mut h = harness(two_hosts);
    let provider = h
        .context
        .call(
            "host_list_provider",
            Arguments::new().kwarg("hosts", vec!["ok-host", "bad host"]),
        )
        .await
        .expect("provider");
    let err = h
        .context
        .call("resources", Arguments::new().arg(provider))
        .await
        .expect_err("malformed host");
    assert!(matches!(
        err,
        BridgeError::Resource(ResourceError::MalformedAddress { .. })
    ));
}
