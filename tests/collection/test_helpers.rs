//! Shared fixtures for collection BDD scenarios.

use std::sync::Arc;
use std::time::Duration;

use camino::Utf8PathBuf;
use crashd::test_support::FakeSessionProvider;
use crashd::{
    ConcurrencyPolicy, Defaults, FanOutExecutor, RetryPolicy, RunError, Script,
    ScriptActionResult, ScriptRunner, SshConfig,
};
use rstest::fixture;
use tempfile::TempDir;
use tokio::runtime::Runtime;

/// What a scenario observed after running its script.
#[derive(Clone, Debug)]
pub enum RunOutcome {
    Completed {
        results: Vec<ScriptActionResult>,
        commands: Vec<(String, String)>,
        contacted: Vec<String>,
    },
    Rejected {
        error: RunError,
        contacted: Vec<String>,
    },
}

impl RunOutcome {
    /// Hosts that saw at least one connection attempt.
    pub fn contacted(&self) -> &[String] {
        match self {
            Self::Completed { contacted, .. } | Self::Rejected { contacted, .. } => contacted,
        }
    }
}

#[derive(Clone, Debug)]
pub struct CollectionContext {
    pub hosts: Vec<String>,
    pub files: Vec<(String, String)>,
    pub unreachable: Vec<String>,
    pub lines: Vec<String>,
    pub workdir: Utf8PathBuf,
    pub outcome: Option<RunOutcome>,
    _tmp: Arc<TempDir>,
}

impl CollectionContext {
    pub fn push_line(&mut self, line: String) {
        self.lines.push(line);
    }

    /// Script text accumulated by the steps so far.
    pub fn source(&self) -> String {
        let mut source = self.lines.join("\n");
        source.push('\n');
        source
    }

    /// Remote hosts seeded with the scenario's files and failures.
    fn provider(&self) -> FakeSessionProvider {
        let seeded = self.hosts.iter().fold(FakeSessionProvider::new(), |fake, host| {
            self.files
                .iter()
                .fold(fake, |with, (path, contents)| with.with_file(host, path, contents))
        });
        self.unreachable
            .iter()
            .fold(seeded, |fake, host| fake.with_unreachable(host))
    }

    /// Runs the accumulated script against fresh fake hosts.
    pub fn run(&self, runtime: &Runtime) -> RunOutcome {
        let script =
            Script::parse(&self.source()).unwrap_or_else(|err| panic!("scenario script: {err}"));
        let provider = self.provider();
        let ssh = SshConfig {
            max_retries: 2,
            timeout: Duration::from_millis(250),
            ..SshConfig::default()
        };
        let executor = FanOutExecutor::new(provider.clone(), ConcurrencyPolicy::from_limit(4))
            .with_retry_policy(RetryPolicy::immediate());
        let runner = ScriptRunner::new(Defaults::new(self.workdir.clone(), ssh), executor);
        let result = runtime.block_on(runner.execute(&script));

        let contacted = self
            .hosts
            .iter()
            .filter(|host| provider.connect_attempts(host) > 0)
            .cloned()
            .collect();
        match result {
            Ok(results) => RunOutcome::Completed {
                results,
                commands: provider.commands_run(),
                contacted,
            },
            Err(error) => RunOutcome::Rejected { error, contacted },
        }
    }
}

#[fixture]
pub fn collection_context() -> CollectionContext {
    let tmp = TempDir::new().unwrap_or_else(|err| panic!("create workdir temp directory: {err}"));
    let workdir = Utf8PathBuf::from_path_buf(tmp.path().join("crashd"))
        .unwrap_or_else(|path| panic!("workdir should be UTF-8: {}", path.display()));
    CollectionContext {
        hosts: Vec::new(),
        files: Vec::new(),
        unreachable: Vec::new(),
        lines: Vec::new(),
        workdir,
        outcome: None,
        _tmp: Arc::new(tmp),
    }
}
