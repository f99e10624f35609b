//! Shared utilities for scheduler integration tests.
//!
//! [`FakeLauncher`] stands in for the downloader binary: each URL gets a
//! scripted [`Behavior`] (output lines, files written to the scratch dir,
//! exit code, whether to hold until released). It records every invocation
//! and the peak number of simultaneously running processes.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use mediadl_core::relocate::MoveRetry;
use mediadl_core::{
    AppConfig, ArchiveStore, Database, DownloadError, FileRelocator, Invocation, ProcessLauncher,
    ProcessOutput, QueueEvent, QueueScheduler, RelocationSettings, RuleStore, RunningProcess,
};
use tempfile::TempDir;
use tokio::sync::{Notify, broadcast};

/// What the fake tool does for one URL.
#[derive(Debug, Clone)]
pub struct Behavior {
    /// Output lines; `{scratch}` is replaced with the task's scratch dir.
    pub lines: Vec<String>,
    /// Files created in the scratch dir at launch: `(name, contents)`.
    pub files: Vec<(String, String)>,
    pub code: i32,
    /// Block after the lines until [`FakeLauncher::release`] or a kill.
    pub hold: bool,
    /// Whether a `--simulate` probe succeeds.
    pub probe_ok: bool,
    /// Block the probe until [`FakeLauncher::release_probe`].
    pub probe_hold: bool,
    /// Block `--dump-single-json` until [`FakeLauncher::release_metadata`].
    pub metadata_hold: bool,
    /// JSON printed for `--dump-single-json`.
    pub metadata: Option<String>,
}

impl Behavior {
    /// Writes `name` plus an info.json sidecar and exits 0.
    pub fn succeed(name: &str, sidecar: &str) -> Self {
        let stem = Path::new(name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            lines: vec![
                "[youtube] abc: Downloading webpage".to_string(),
                format!("[download] Destination: {{scratch}}/{name}"),
                "[download]  42.0% of 10.00MiB at 1.00MiB/s ETA 00:05".to_string(),
                "[download] 100% of 10.00MiB in 00:00:10".to_string(),
            ],
            files: vec![
                (name.to_string(), "media bytes".to_string()),
                (format!("{stem}.info.json"), sidecar.to_string()),
            ],
            code: 0,
            hold: false,
            probe_ok: true,
            probe_hold: false,
            metadata_hold: false,
            metadata: None,
        }
    }

    /// Prints `error` and exits 1.
    pub fn fail(error: &str) -> Self {
        Self {
            lines: vec![format!("ERROR: {error}")],
            files: Vec::new(),
            code: 1,
            hold: false,
            probe_ok: true,
            probe_hold: false,
            metadata_hold: false,
            metadata: None,
        }
    }

    #[must_use]
    pub fn held(mut self) -> Self {
        self.hold = true;
        self
    }

    #[must_use]
    pub fn unsupported(mut self) -> Self {
        self.probe_ok = false;
        self
    }

    #[must_use]
    pub fn probe_held(mut self) -> Self {
        self.probe_hold = true;
        self
    }

    #[must_use]
    pub fn metadata_held(mut self) -> Self {
        self.metadata_hold = true;
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, json: &str) -> Self {
        self.metadata = Some(json.to_string());
        self
    }
}

/// Scripted stand-in for the downloader binary.
pub struct FakeLauncher {
    behaviors: Mutex<HashMap<String, Behavior>>,
    gates: Mutex<HashMap<String, Arc<Notify>>>,
    launches: Mutex<Vec<Invocation>>,
    outputs: Mutex<Vec<Invocation>>,
    answered: Mutex<Vec<Invocation>>,
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl Default for FakeLauncher {
    fn default() -> Self {
        Self {
            behaviors: Mutex::new(HashMap::new()),
            gates: Mutex::new(HashMap::new()),
            launches: Mutex::new(Vec::new()),
            outputs: Mutex::new(Vec::new()),
            answered: Mutex::new(Vec::new()),
            active: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl FakeLauncher {
    pub fn script(&self, url: &str, behavior: Behavior) {
        self.behaviors
            .lock()
            .unwrap()
            .insert(url.to_string(), behavior);
    }

    fn behavior(&self, url: &str) -> Behavior {
        self.behaviors
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .unwrap_or_else(|| Behavior::succeed("unscripted.mp4", "{}"))
    }

    fn gate(&self, url: &str) -> Arc<Notify> {
        Arc::clone(
            self.gates
                .lock()
                .unwrap()
                .entry(url.to_string())
                .or_default(),
        )
    }

    /// Lets a held process for `url` exit.
    pub fn release(&self, url: &str) {
        self.gate(url).notify_one();
    }

    /// Lets a held probe for `url` answer.
    pub fn release_probe(&self, url: &str) {
        self.gate(&format!("probe:{url}")).notify_one();
    }

    /// Lets a held metadata dump for `url` answer.
    pub fn release_metadata(&self, url: &str) {
        self.gate(&format!("meta:{url}")).notify_one();
    }

    /// Run-to-completion invocations that have returned.
    pub fn answered(&self) -> Vec<Invocation> {
        self.answered.lock().unwrap().clone()
    }

    /// URLs of every streaming launch, in launch order.
    pub fn launched_urls(&self) -> Vec<String> {
        self.launches
            .lock()
            .unwrap()
            .iter()
            .map(|i| i.url.clone())
            .collect()
    }

    pub fn launches(&self) -> Vec<Invocation> {
        self.launches.lock().unwrap().clone()
    }

    /// Every run-to-completion invocation (probes, metadata, listings).
    pub fn outputs(&self) -> Vec<Invocation> {
        self.outputs.lock().unwrap().clone()
    }

    pub fn peak_running(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Directory the tool was told to write into: `-o <dir>/<template>` for the
/// media tool, `-d <dir>` for the gallery tool.
fn scratch_dir_of(invocation: &Invocation) -> Option<PathBuf> {
    let value_after = |flag: &str| {
        let pos = invocation.args.iter().position(|a| a == flag)?;
        invocation.args.get(pos + 1).map(PathBuf::from)
    };
    if let Some(template) = value_after("-o") {
        return template.parent().map(Path::to_path_buf);
    }
    value_after("-d")
}

#[async_trait]
impl ProcessLauncher for FakeLauncher {
    async fn launch(
        &self,
        invocation: &Invocation,
    ) -> Result<Box<dyn RunningProcess>, DownloadError> {
        self.launches.lock().unwrap().push(invocation.clone());
        let behavior = self.behavior(&invocation.url);

        let scratch = scratch_dir_of(invocation).unwrap_or_default();
        std::fs::create_dir_all(&scratch).unwrap();
        for (name, contents) in &behavior.files {
            std::fs::write(scratch.join(name), contents).unwrap();
        }
        let scratch_text = scratch.display().to_string();
        let lines = behavior
            .lines
            .iter()
            .map(|l| l.replace("{scratch}", &scratch_text))
            .collect();

        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        Ok(Box::new(FakeProcess {
            lines,
            code: behavior.code,
            gate: behavior.hold.then(|| self.gate(&invocation.url)),
            killed: AtomicBool::new(false),
            finished: false,
            active: Arc::clone(&self.active),
        }))
    }

    async fn output(&self, invocation: &Invocation) -> Result<ProcessOutput, DownloadError> {
        self.outputs.lock().unwrap().push(invocation.clone());
        let output = self.answer(invocation).await;
        self.answered.lock().unwrap().push(invocation.clone());
        Ok(output)
    }
}

impl FakeLauncher {
    async fn answer(&self, invocation: &Invocation) -> ProcessOutput {
        if invocation.has_arg("--list-extractors") {
            return ProcessOutput {
                code: Some(0),
                stdout: "youtube\nvimeo\nsoundcloud\n".to_string(),
                stderr: String::new(),
            };
        }
        let behavior = self.behavior(&invocation.url);
        if invocation.has_arg("--dump-single-json") {
            if behavior.metadata_hold {
                self.gate(&format!("meta:{}", invocation.url))
                    .notified()
                    .await;
            }
            return match behavior.metadata {
                Some(json) => ProcessOutput {
                    code: Some(0),
                    stdout: json,
                    stderr: String::new(),
                },
                None => ProcessOutput {
                    code: Some(1),
                    stdout: String::new(),
                    stderr: "ERROR: no metadata scripted".to_string(),
                },
            };
        }
        if behavior.probe_hold {
            self.gate(&format!("probe:{}", invocation.url))
                .notified()
                .await;
        }
        if behavior.probe_ok {
            ProcessOutput {
                code: Some(0),
                ..ProcessOutput::default()
            }
        } else {
            ProcessOutput {
                code: Some(1),
                stdout: String::new(),
                stderr: format!("ERROR: Unsupported URL: {}", invocation.url),
            }
        }
    }
}

struct FakeProcess {
    lines: VecDeque<String>,
    code: i32,
    gate: Option<Arc<Notify>>,
    killed: AtomicBool,
    finished: bool,
    active: Arc<AtomicUsize>,
}

impl FakeProcess {
    fn finish(&mut self) {
        if !self.finished {
            self.finished = true;
            self.active.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for FakeProcess {
    fn drop(&mut self) {
        self.finish();
    }
}

#[async_trait]
impl RunningProcess for FakeProcess {
    async fn next_line(&mut self) -> Option<String> {
        if let Some(line) = self.lines.pop_front() {
            return Some(line);
        }
        if let Some(gate) = self.gate.take() {
            if !self.killed.load(Ordering::SeqCst) {
                gate.notified().await;
            }
        }
        None
    }

    async fn kill(&mut self) -> Result<(), DownloadError> {
        self.killed.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn wait(&mut self) -> Result<Option<i32>, DownloadError> {
        self.finish();
        if self.killed.load(Ordering::SeqCst) {
            Ok(None)
        } else {
            Ok(Some(self.code))
        }
    }
}

/// A scheduler over temp directories, an in-memory archive and a fake tool.
pub struct Harness {
    pub scheduler: QueueScheduler,
    pub launcher: Arc<FakeLauncher>,
    pub archive: ArchiveStore,
    pub rules: Arc<RuleStore>,
    pub config: AppConfig,
    pub events: broadcast::Receiver<QueueEvent>,
    _temp: TempDir,
}

impl Harness {
    pub async fn new(max_concurrency: u8) -> Self {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let config = AppConfig {
            completed_dir: temp.path().join("completed"),
            scratch_dir: Some(temp.path().join("scratch")),
            state_dir: temp.path().join("state"),
            max_concurrency,
            ..AppConfig::default()
        };
        std::fs::create_dir_all(&config.completed_dir).unwrap();
        std::fs::create_dir_all(&config.state_dir).unwrap();

        let launcher = Arc::new(FakeLauncher::default());
        let archive = ArchiveStore::new(
            Database::new_in_memory()
                .await
                .expect("Failed to create database"),
        );
        let rules = Arc::new(RuleStore::new(config.rules_path()));
        let relocator = FileRelocator::new(Arc::clone(&rules)).with_settings(RelocationSettings {
            stability_timeout: Duration::from_secs(2),
            poll_interval: Duration::from_millis(10),
            move_retry: MoveRetry {
                attempts: 2,
                step: Duration::from_millis(10),
            },
            working_dir: None,
        });
        let scheduler = QueueScheduler::new(
            config.clone(),
            Arc::clone(&launcher) as Arc<dyn ProcessLauncher>,
            Arc::new(archive.clone()),
            Arc::new(relocator),
        );
        let events = scheduler.subscribe();
        Self {
            scheduler,
            launcher,
            archive,
            rules,
            config,
            events,
            _temp: temp,
        }
    }

    /// Next event matching `pred`, failing the test after five seconds.
    pub async fn expect_event(&mut self, pred: impl Fn(&QueueEvent) -> bool) -> QueueEvent {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let event = self.events.recv().await.expect("event stream closed");
                if pred(&event) {
                    return event;
                }
            }
        })
        .await
        .expect("timed out waiting for event")
    }

    /// Waits for the queue to go idle, then returns every buffered event.
    pub async fn drain_until_idle(&mut self) -> Vec<QueueEvent> {
        tokio::time::timeout(Duration::from_secs(5), self.scheduler.wait_idle())
            .await
            .expect("queue did not go idle");
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    /// Polls until `cond` holds, failing the test after five seconds.
    pub async fn wait_for(&self, cond: impl Fn(&QueueScheduler) -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !cond(&self.scheduler) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }
}
