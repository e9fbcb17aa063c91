//! Pipeline driver for the transcription worker.
//!
//! Each iteration pulls one task from the shared inbox into the local work
//! list, processes every pending work-list line, and publishes the results.
//! The loop stops at the iteration cap or when the inbox has nothing left to
//! give; the driver then drains (publishes leftovers, runs the collector).
//!
//! ```text
//! Idle -> Pulling -> Processing -> Publishing -> Idle
//!            |
//!            +-- empty --> Draining -> Terminal
//! ```

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fs2::FileExt;
use tracing::{debug, error, info, instrument, warn};

use super::error::QueueError;
use super::publisher::{collect, publish, publish_pending};
use super::repository::QueueRepository;
use super::retry::{retry, RetryPolicy};
use super::selector::{take_next, Selection, SelectionPolicy};
use super::worklist::{DispositionLog, WorkList};
use crate::adapters::{
    AudioLinkResolver, BilibiliClient, DownloadOutcome, HttpDownloader, ResumableDownloader,
    Transcriber, VideoLookup, VideoMetadataProvider, WhisperTranscriber,
};
use crate::config::QueueConfig;
use crate::domain::{artifact_stem, ArtifactSet, Disposition, Task, TaskMetadata};

/// Downloaded audio inside the temp directory
pub const AUDIO_FILE: &str = "audio.mp3";

/// Metadata written next to the audio
pub const AUDIO_METADATA_FILE: &str = "audio.json";

/// Lock file guarding the temp directory and work list
pub const LOCK_FILE: &str = ".sttq.lock";

/// External services the driver depends on
#[derive(Clone)]
pub struct Collaborators {
    pub metadata: Arc<dyn VideoMetadataProvider>,
    pub links: Arc<dyn AudioLinkResolver>,
    pub downloader: Arc<dyn ResumableDownloader>,
    pub transcriber: Arc<dyn Transcriber>,
}

impl Collaborators {
    /// Default HTTP and whisper-backed collaborators
    pub fn from_config(config: &QueueConfig) -> Result<Self, QueueError> {
        let client = Arc::new(BilibiliClient::with_api_base(
            config.api_base.clone(),
            config.network_timeout(),
        )?);
        let downloader = HttpDownloader::new(client.http().clone());

        let mut transcriber = WhisperTranscriber::new(config.transcriber.binary.clone())
            .with_args(config.transcriber.args.clone());
        if let Some(secs) = config.transcriber.timeout_seconds {
            transcriber = transcriber.with_timeout(std::time::Duration::from_secs(secs));
        }

        Ok(Self {
            metadata: client.clone(),
            links: client,
            downloader: Arc::new(downloader),
            transcriber: Arc::new(transcriber),
        })
    }
}

/// Where the driver is in its loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Idle,
    Pulling,
    Processing,
    Publishing,
    Draining,
    Terminal,
}

/// Per-run knobs (usually from the config, overridden on the command line)
#[derive(Debug, Clone, PartialEq)]
pub struct DriveOptions {
    pub policy: SelectionPolicy,
    /// 0 runs until the inbox is drained
    pub max_iterations: u32,
    /// Seconds; 0 disables the too-long check
    pub max_duration: u64,
    pub collect_on_drain: bool,
}

impl DriveOptions {
    pub fn from_config(config: &QueueConfig) -> Self {
        Self {
            policy: SelectionPolicy::Fifo,
            max_iterations: config.max_iterations,
            max_duration: config.max_duration,
            collect_on_drain: config.collect_on_drain,
        }
    }
}

/// Summary of one [`Driver::run`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DriveReport {
    /// Iterations that pulled a task
    pub iterations: u32,
    /// Task identity and disposition, in processing order
    pub dispositions: Vec<(String, Disposition)>,
    /// Files pushed to the outbox
    pub published: usize,
    /// Files collected from the outbox
    pub collected: usize,
    /// True when the loop stopped on an empty inbox
    pub drained: bool,
    /// Tasks left in the inbox when none matched the duration bound
    pub unmatched: Option<usize>,
}

impl DriveReport {
    pub fn count(&self, disposition: Disposition) -> usize {
        self.dispositions
            .iter()
            .filter(|(_, d)| *d == disposition)
            .count()
    }
}

/// Exclusive lock on the worker's scratch directory.
///
/// Released when dropped.
#[derive(Debug)]
pub struct RunLock {
    _file: File,
}

impl RunLock {
    pub fn acquire(dir: &Path) -> Result<Self, QueueError> {
        fs::create_dir_all(dir)?;
        let path = dir.join(LOCK_FILE);
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&path)?;

        file.try_lock_exclusive()
            .map_err(|_| QueueError::Busy(format!("{} is held by another worker", path.display())))?;
        debug!(lock = %path.display(), "Run lock acquired");

        Ok(Self { _file: file })
    }
}

/// Result of processing one task
#[derive(Debug, Clone, PartialEq)]
pub struct TaskOutcome {
    pub disposition: Disposition,
    /// Artifacts written to the output directory (empty unless `Ok`)
    pub artifacts: Vec<PathBuf>,
}

impl TaskOutcome {
    fn finished(disposition: Disposition) -> Self {
        Self {
            disposition,
            artifacts: Vec::new(),
        }
    }
}

/// Turns one task line into result artifacts
pub struct TaskProcessor {
    collaborators: Collaborators,
    temp_dir: PathBuf,
    output_dir: PathBuf,
    retry: RetryPolicy,
}

impl TaskProcessor {
    pub fn new(
        collaborators: Collaborators,
        temp_dir: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            collaborators,
            temp_dir: temp_dir.into(),
            output_dir: output_dir.into(),
            retry,
        }
    }

    pub fn audio_path(&self) -> PathBuf {
        self.temp_dir.join(AUDIO_FILE)
    }

    fn scratch_files(&self) -> Vec<PathBuf> {
        let audio = self.audio_path();
        let mut files = vec![audio.clone(), self.temp_dir.join(AUDIO_METADATA_FILE)];
        files.extend(ArtifactSet::beside(&audio).into_paths());
        files
    }

    /// Remove audio, metadata and transcriber output left in the temp directory
    pub fn clear_scratch(&self) {
        for path in self.scratch_files() {
            match fs::remove_file(&path) {
                Ok(()) => debug!(file = %path.display(), "Removed temp file"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(file = %path.display(), error = %e, "Failed to remove temp file"),
            }
        }
    }

    /// Process one task; never fails, every error becomes a disposition
    #[instrument(skip(self, task), fields(task = %task.identity()))]
    pub async fn process(&self, task: &Task, max_duration: u64) -> TaskOutcome {
        self.clear_scratch();

        let outcome = match self.try_process(task, max_duration).await {
            Ok(outcome) => outcome,
            Err(e) => {
                let disposition = classify(&e);
                error!(task = %task.identity(), error = %e, %disposition, "Task processing failed");
                TaskOutcome::finished(disposition)
            }
        };

        self.clear_scratch();
        outcome
    }

    async fn try_process(&self, task: &Task, max_duration: u64) -> Result<TaskOutcome, QueueError> {
        let metadata = match self.metadata_for(task).await? {
            Ok(metadata) => metadata,
            Err(disposition) => return Ok(TaskOutcome::finished(disposition)),
        };

        if metadata.is_exclusive() {
            info!(task = %task.identity(), "Supporter-only video, skipping");
            return Ok(TaskOutcome::finished(Disposition::Excluded));
        }

        if let Some(duration) = metadata.duration {
            if max_duration > 0 && duration > max_duration {
                info!(task = %task.identity(), duration, max_duration, "Video too long, skipping");
                return Ok(TaskOutcome::finished(Disposition::TooLong));
            }
        }

        let Some(cid) = metadata.cid else {
            warn!(task = %task.identity(), "Metadata has no stream id");
            return Ok(TaskOutcome::finished(Disposition::Error));
        };

        let Some(url) = self.resolve_link(&metadata.bvid, cid).await? else {
            warn!(task = %task.identity(), "No usable audio stream");
            return Ok(TaskOutcome::finished(Disposition::Error));
        };

        fs::create_dir_all(&self.temp_dir)?;
        let audio = self.audio_path();
        self.download(&url, &audio).await?;
        fs::write(
            self.temp_dir.join(AUDIO_METADATA_FILE),
            serde_json::to_string_pretty(&metadata)?,
        )?;

        let produced = self
            .collaborators
            .transcriber
            .run(&audio)
            .await
            .map_err(QueueError::from)?;

        let artifacts = self.store_artifacts(&produced, &artifact_stem(&metadata))?;
        info!(task = %task.identity(), files = artifacts.len(), "Task transcribed");

        Ok(TaskOutcome {
            disposition: Disposition::Ok,
            artifacts,
        })
    }

    /// Metadata carried by the line, or looked up by video id.
    ///
    /// The inner `Err` is a final disposition reached without an error.
    async fn metadata_for(
        &self,
        task: &Task,
    ) -> Result<Result<TaskMetadata, Disposition>, QueueError> {
        if let Some(metadata) = task.metadata() {
            if metadata.cid.is_some() {
                return Ok(Ok(metadata.clone()));
            }
        }

        let Some(bvid) = task.bvid() else {
            warn!(line = %task.line(), "No video id in task line");
            return Ok(Err(Disposition::Error));
        };

        let provider = &self.collaborators.metadata;
        let id = bvid.as_str();
        let lookup = retry(&self.retry, &format!("look up {}", bvid), move || async move {
            provider.get_video(id).await.map_err(QueueError::from)
        })
        .await?;

        Ok(match lookup {
            VideoLookup::Found(found) => Ok(found),
            VideoLookup::NotFound(reason) => {
                warn!(%bvid, %reason, "Video not found");
                Err(Disposition::Error)
            }
            VideoLookup::Forbidden(reason) => {
                info!(%bvid, %reason, "Video is not downloadable");
                Err(Disposition::Excluded)
            }
            VideoLookup::Pending(reason) => {
                info!(%bvid, %reason, "Video under review, keeping task for later");
                Err(Disposition::Failed)
            }
        })
    }

    async fn resolve_link(&self, bvid: &str, cid: u64) -> Result<Option<String>, QueueError> {
        let resolver = &self.collaborators.links;
        retry(&self.retry, &format!("resolve audio for {}", bvid), move || async move {
            resolver.resolve(bvid, cid).await.map_err(QueueError::from)
        })
        .await
        .map(|url| url.filter(|u| !u.is_empty()))
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<u64, QueueError> {
        let downloader = &self.collaborators.downloader;
        retry(&self.retry, "download audio", move || async move {
            match downloader.fetch(url, dest).await {
                Ok(DownloadOutcome::Completed { bytes, resumed }) => {
                    info!(bytes, resumed, "Audio downloaded");
                    Ok(bytes)
                }
                Ok(DownloadOutcome::Failed { reason }) => Err(QueueError::TransientNetwork(reason)),
                Err(e) => Err(QueueError::from(e)),
            }
        })
        .await
    }

    fn store_artifacts(&self, produced: &ArtifactSet, stem: &str) -> Result<Vec<PathBuf>, QueueError> {
        fs::create_dir_all(&self.output_dir)?;
        let target = ArtifactSet::in_dir(&self.output_dir, stem);
        for (from, to) in produced.paths().iter().zip(target.paths()) {
            fs::copy(from, to)?;
        }
        Ok(target.into_paths())
    }
}

/// Map a processing error onto a disposition.
///
/// Network trouble, local disk errors and exhausted budgets keep the task
/// for a later run; everything else is a permanent error.
pub fn classify(err: &QueueError) -> Disposition {
    match err {
        QueueError::ExhaustedRetries { .. } | QueueError::Io(_) => Disposition::Failed,
        e if e.is_retryable() => Disposition::Failed,
        _ => Disposition::Error,
    }
}

/// Runs the pull/process/publish loop against one queue repository
pub struct Driver {
    repo: QueueRepository,
    processor: TaskProcessor,
    worklist: WorkList,
    log: DispositionLog,
    sync_retry: RetryPolicy,
    temp_dir: PathBuf,
    output_dir: PathBuf,
    collect_dir: PathBuf,
    state: DriverState,
}

impl Driver {
    pub fn new(config: &QueueConfig, repo: QueueRepository, collaborators: Collaborators) -> Self {
        Self {
            repo,
            processor: TaskProcessor::new(
                collaborators,
                &config.temp_directory,
                &config.output_directory,
                config.retry.clone(),
            ),
            worklist: WorkList::new(&config.dst_file),
            log: DispositionLog::new(config.disposition_dir()),
            sync_retry: config.sync_retry.clone(),
            temp_dir: config.temp_directory.clone(),
            output_dir: config.output_directory.clone(),
            collect_dir: config.collect_directory.clone(),
            state: DriverState::Idle,
        }
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn repository(&self) -> &QueueRepository {
        &self.repo
    }

    fn enter(&mut self, state: DriverState) {
        debug!(from = ?self.state, to = ?state, "Driver state change");
        self.state = state;
    }

    /// Run until the iteration cap or until the inbox yields nothing
    #[instrument(skip(self, options), fields(policy = ?options.policy, max_iterations = options.max_iterations))]
    pub async fn run(&mut self, options: &DriveOptions) -> Result<DriveReport, QueueError> {
        let _lock = RunLock::acquire(&self.temp_dir)?;
        let mut report = DriveReport::default();
        let mut failed_this_run: HashSet<String> = HashSet::new();

        loop {
            if options.max_iterations > 0 && report.iterations >= options.max_iterations {
                info!(iterations = report.iterations, "Iteration cap reached");
                break;
            }

            self.enter(DriverState::Pulling);
            let selection = take_next(&self.repo, &self.sync_retry, &options.policy, &self.worklist).await?;
            match selection {
                Selection::Selected { .. } => {}
                Selection::NoMatch { pending } => {
                    info!(pending, "Nothing selectable under the current policy");
                    report.unmatched = Some(pending);
                    break;
                }
                Selection::QueueEmpty => {
                    report.drained = true;
                    break;
                }
            }
            report.iterations += 1;

            self.enter(DriverState::Processing);
            let artifacts = self
                .process_pending(options, &mut report, &mut failed_this_run)
                .await?;

            self.enter(DriverState::Publishing);
            report.published += publish(&self.repo, &self.sync_retry, &artifacts).await?;
            self.enter(DriverState::Idle);
        }

        self.enter(DriverState::Draining);
        report.published += publish_pending(&self.repo, &self.sync_retry, &self.output_dir).await?;
        if options.collect_on_drain {
            report.collected = collect(&self.repo, &self.sync_retry, &self.collect_dir)
                .await?
                .len();
        }

        self.enter(DriverState::Terminal);
        info!(
            iterations = report.iterations,
            processed = report.dispositions.len(),
            published = report.published,
            collected = report.collected,
            drained = report.drained,
            unmatched = ?report.unmatched,
            "Driver finished"
        );
        Ok(report)
    }

    /// Process a snapshot of the work list, skipping lines that already
    /// failed during this run
    async fn process_pending(
        &self,
        options: &DriveOptions,
        report: &mut DriveReport,
        failed_this_run: &mut HashSet<String>,
    ) -> Result<Vec<PathBuf>, QueueError> {
        let snapshot = self.worklist.pending()?;
        let mut artifacts = Vec::new();

        for task in snapshot {
            if failed_this_run.contains(task.line()) {
                debug!(task = %task.identity(), "Already failed in this run, leaving for later");
                continue;
            }

            info!(task = %task.identity(), "Processing task");
            let outcome = self.processor.process(&task, options.max_duration).await;
            self.finish(&task, outcome.disposition)?;

            if outcome.disposition == Disposition::Failed {
                failed_this_run.insert(task.line().to_string());
            }
            report.dispositions.push((task.identity(), outcome.disposition));
            artifacts.extend(outcome.artifacts);
        }

        Ok(artifacts)
    }

    fn finish(&self, task: &Task, disposition: Disposition) -> Result<(), QueueError> {
        self.log.record(disposition, task)?;
        if !disposition.keeps_task() {
            self.worklist.remove(task)?;
        }
        info!(task = %task.identity(), %disposition, "Task finished");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::CollaboratorError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::TempDir;

    struct FakeMetadata {
        lookup: VideoLookup,
        calls: AtomicU32,
    }

    #[async_trait]
    impl VideoMetadataProvider for FakeMetadata {
        async fn get_video(&self, _bvid: &str) -> Result<VideoLookup, CollaboratorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.lookup.clone())
        }
    }

    struct FakeLinks(Option<String>);

    #[async_trait]
    impl AudioLinkResolver for FakeLinks {
        async fn resolve(&self, _bvid: &str, _cid: u64) -> Result<Option<String>, CollaboratorError> {
            Ok(self.0.clone())
        }
    }

    /// Fails `failures` times with a transient error, then writes the file
    struct FakeDownloader {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl ResumableDownloader for FakeDownloader {
        async fn fetch(&self, _url: &str, dest: &Path) -> Result<DownloadOutcome, CollaboratorError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                return Err(CollaboratorError::Transient("connection reset".into()));
            }
            std::fs::write(dest, b"audio")?;
            Ok(DownloadOutcome::Completed {
                bytes: 5,
                resumed: false,
            })
        }
    }

    struct FakeTranscriber {
        fail: bool,
    }

    #[async_trait]
    impl Transcriber for FakeTranscriber {
        fn name(&self) -> &str {
            "fake"
        }

        async fn run(&self, audio_path: &Path) -> Result<ArtifactSet, CollaboratorError> {
            if self.fail {
                return Err(CollaboratorError::Tool {
                    tool: "fake".into(),
                    message: "exit 1".into(),
                });
            }
            let set = ArtifactSet::beside(audio_path);
            for path in set.paths() {
                std::fs::write(path, "transcript")?;
            }
            Ok(set)
        }
    }

    fn found(duration: u64) -> VideoLookup {
        let mut metadata = TaskMetadata::new("BV1GJ411x7h7");
        metadata.cid = Some(7);
        metadata.title = Some("a/b:c".into());
        metadata.owner = Some("up".into());
        metadata.duration = Some(duration);
        metadata.pubdate = Some(1_700_000_000);
        VideoLookup::Found(metadata)
    }

    struct Setup {
        temp: TempDir,
        processor: TaskProcessor,
        metadata: Arc<FakeMetadata>,
    }

    fn setup(lookup: VideoLookup, download_failures: u32, transcribe_fails: bool) -> Setup {
        let temp = TempDir::new().unwrap();
        let metadata = Arc::new(FakeMetadata {
            lookup,
            calls: AtomicU32::new(0),
        });
        let collaborators = Collaborators {
            metadata: metadata.clone(),
            links: Arc::new(FakeLinks(Some("https://cdn/audio.m4s".into()))),
            downloader: Arc::new(FakeDownloader {
                failures: download_failures,
                calls: AtomicU32::new(0),
            }),
            transcriber: Arc::new(FakeTranscriber {
                fail: transcribe_fails,
            }),
        };
        let processor = TaskProcessor::new(
            collaborators,
            temp.path().join("tmp"),
            temp.path().join("output"),
            RetryPolicy::new(3, 0),
        );
        Setup {
            temp,
            processor,
            metadata,
        }
    }

    fn raw_task() -> Task {
        Task::parse_line("https://www.bilibili.com/video/BV1GJ411x7h7").unwrap()
    }

    #[tokio::test]
    async fn test_successful_task_writes_named_artifacts() {
        let s = setup(found(600), 1, false);
        let outcome = s.processor.process(&raw_task(), 0).await;

        assert_eq!(outcome.disposition, Disposition::Ok);
        assert_eq!(outcome.artifacts.len(), 3);
        for path in &outcome.artifacts {
            assert!(path.exists());
            let name = path.file_name().unwrap().to_string_lossy();
            assert!(name.contains("[up][a_b_c][BV1GJ411x7h7]"), "{}", name);
        }

        // scratch files are gone
        assert!(!s.processor.audio_path().exists());
        assert!(!s.temp.path().join("tmp").join(AUDIO_METADATA_FILE).exists());
    }

    #[tokio::test]
    async fn test_json_task_with_stream_id_skips_lookup() {
        let s = setup(found(600), 0, false);
        let task = Task::parse_line(
            r#"{"bvid":"BV1GJ411x7h7","cid":7,"title":"t","owner":"o","duration":60}"#,
        )
        .unwrap();

        let outcome = s.processor.process(&task, 0).await;
        assert_eq!(outcome.disposition, Disposition::Ok);
        assert_eq!(s.metadata.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_too_long() {
        let s = setup(found(4000), 0, false);
        let outcome = s.processor.process(&raw_task(), 3600).await;
        assert_eq!(outcome.disposition, Disposition::TooLong);
        assert!(outcome.artifacts.is_empty());
    }

    #[tokio::test]
    async fn test_lookup_answers_map_to_dispositions() {
        let cases = [
            (VideoLookup::NotFound("gone".into()), Disposition::Error),
            (VideoLookup::Forbidden("upower".into()), Disposition::Excluded),
            (VideoLookup::Pending("review".into()), Disposition::Failed),
        ];
        for (lookup, expected) in cases {
            let s = setup(lookup, 0, false);
            assert_eq!(s.processor.process(&raw_task(), 0).await.disposition, expected);
        }
    }

    #[tokio::test]
    async fn test_exclusive_json_task() {
        let s = setup(found(60), 0, false);
        let task =
            Task::parse_line(r#"{"bvid":"BV1GJ411x7h7","cid":7,"status":"upower"}"#).unwrap();
        assert_eq!(
            s.processor.process(&task, 0).await.disposition,
            Disposition::Excluded
        );
    }

    #[tokio::test]
    async fn test_exhausted_download_is_failed() {
        let s = setup(found(60), 10, false);
        let outcome = s.processor.process(&raw_task(), 0).await;
        assert_eq!(outcome.disposition, Disposition::Failed);
    }

    #[tokio::test]
    async fn test_transcriber_failure_is_error() {
        let s = setup(found(60), 0, true);
        let outcome = s.processor.process(&raw_task(), 0).await;
        assert_eq!(outcome.disposition, Disposition::Error);
        assert!(!s.processor.audio_path().exists());
    }

    #[tokio::test]
    async fn test_line_without_video_id_is_error() {
        let s = setup(found(60), 0, false);
        let task = Task::parse_line("https://example.com/not-a-video").unwrap();
        assert_eq!(s.processor.process(&task, 0).await.disposition, Disposition::Error);
    }

    #[test]
    fn test_classify() {
        assert_eq!(
            classify(&QueueError::ExhaustedRetries {
                operation: "x".into(),
                attempts: 3,
                last_error: "y".into()
            }),
            Disposition::Failed
        );
        assert_eq!(
            classify(&QueueError::TransientNetwork("reset".into())),
            Disposition::Failed
        );
        assert_eq!(
            classify(&QueueError::ExternalTool {
                tool: "whisper".into(),
                message: "exit 1".into()
            }),
            Disposition::Error
        );
        assert_eq!(
            classify(&QueueError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "no space left on device"
            ))),
            Disposition::Failed
        );
    }

    #[test]
    fn test_run_lock_is_exclusive() {
        let temp = TempDir::new().unwrap();
        let first = RunLock::acquire(temp.path()).unwrap();
        assert!(matches!(RunLock::acquire(temp.path()), Err(QueueError::Busy(_))));
        drop(first);
        assert!(RunLock::acquire(temp.path()).is_ok());
    }

    #[test]
    fn test_report_counts() {
        let report = DriveReport {
            dispositions: vec![
                ("a".into(), Disposition::Ok),
                ("b".into(), Disposition::Failed),
                ("c".into(), Disposition::Ok),
            ],
            ..Default::default()
        };
        assert_eq!(report.count(Disposition::Ok), 2);
        assert_eq!(report.count(Disposition::TooLong), 0);
    }
}
