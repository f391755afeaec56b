//! Directory-level coverage build.
//!
//! Replays every declaration file under a directory into one
//! [`SchemaTreeCache`], then applies grants and computes coverage.
//! A failing declaration is recorded and skipped. The build aborts on
//! problems with the inputs as a whole, and on a declaration whose failure
//! invalidates the run (a discriminator variant without a schema).

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::cache::SchemaTreeCache;
use crate::error::{BuildError, DeclarationError};
use crate::grant::load_grants;
use crate::loader::collect_json_files;
use crate::tfschema::TfSchema;

/// Inputs of a coverage build.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Directory or URL the declarations' Swagger paths are relative to.
    pub swagger_base: String,
    /// Directory of declaration files.
    pub tf_schema_dir: PathBuf,
    /// Optional grant directory.
    pub grant_dir: Option<PathBuf>,
    /// Number of worker threads replaying declarations.
    pub jobs: usize,
}

impl BuildOptions {
    pub fn new(swagger_base: impl Into<String>, tf_schema_dir: impl Into<PathBuf>) -> Self {
        Self {
            swagger_base: swagger_base.into(),
            tf_schema_dir: tf_schema_dir.into(),
            grant_dir: None,
            jobs: 1,
        }
    }

    pub fn grant_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.grant_dir = Some(dir.into());
        self
    }

    pub fn jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }
}

/// A declaration file that could not be replayed.
#[derive(Debug)]
pub struct FileFailure {
    pub path: PathBuf,
    pub error: DeclarationError,
}

impl FileFailure {
    /// See [`DeclarationError::aborts_run`].
    pub fn aborts_run(&self) -> bool {
        self.error.aborts_run()
    }
}

/// Result of a coverage build.
#[derive(Debug)]
pub struct BuildOutcome {
    pub cache: SchemaTreeCache,
    /// Declaration files replayed, failed ones included.
    pub files: usize,
    /// Failed declaration files, in path order.
    pub failures: Vec<FileFailure>,
}

/// Build coverage with a fresh cache.
///
/// # Errors
///
/// Returns `BuildError::Aborted` for a declaration whose failure aborts the
/// run, and other `BuildError`s if the declaration directory is unreadable,
/// grants cannot be loaded or applied, or coverage cannot be computed.
pub fn build_coverage(options: &BuildOptions) -> Result<BuildOutcome, BuildError> {
    build_coverage_with(SchemaTreeCache::new(), options)
}

/// Build coverage into `cache`.
pub fn build_coverage_with(
    cache: SchemaTreeCache,
    options: &BuildOptions,
) -> Result<BuildOutcome, BuildError> {
    std::fs::read_dir(&options.tf_schema_dir).map_err(|source| BuildError::TfSchemaDir {
        path: options.tf_schema_dir.clone(),
        source,
    })?;

    let files = collect_json_files(&options.tf_schema_dir);
    tracing::debug!(
        files = files.len(),
        jobs = options.jobs,
        dir = %options.tf_schema_dir.display(),
        "replaying declarations"
    );

    let mut failures = replay_all(&cache, &options.swagger_base, &files, options.jobs);
    failures.sort_by(|a, b| a.path.cmp(&b.path));
    if let Some(idx) = failures.iter().position(FileFailure::aborts_run) {
        let failure = failures.swap_remove(idx);
        return Err(BuildError::Aborted {
            path: failure.path,
            source: failure.error,
        });
    }

    if let Some(grant_dir) = &options.grant_dir {
        let grant = load_grants(grant_dir)?;
        cache.grant(&grant).map_err(BuildError::ApplyGrant)?;
    }

    cache
        .calc_coverage()
        .map_err(|(schema, source)| BuildError::Coverage {
            schema: schema.to_string(),
            source,
        })?;

    Ok(BuildOutcome {
        cache,
        files: files.len(),
        failures,
    })
}

/// Replay `files`, stopping every worker once a failure aborts the run.
fn replay_all(
    cache: &SchemaTreeCache,
    swagger_base: &str,
    files: &[PathBuf],
    jobs: usize,
) -> Vec<FileFailure> {
    let aborted = AtomicBool::new(false);
    let replay_chunk = |chunk: &[PathBuf]| -> Vec<FileFailure> {
        let mut failures = Vec::new();
        for path in chunk {
            if aborted.load(Ordering::Relaxed) {
                break;
            }
            if let Err(failure) = replay_file(cache, swagger_base, path) {
                if failure.aborts_run() {
                    tracing::warn!(file = %path.display(), "declaration aborts the build");
                    aborted.store(true, Ordering::Relaxed);
                }
                failures.push(failure);
            }
        }
        failures
    };

    if jobs <= 1 || files.len() <= 1 {
        return replay_chunk(files);
    }

    let chunk_size = (files.len() + jobs - 1) / jobs;
    let replay_chunk = &replay_chunk;
    std::thread::scope(|scope| {
        let workers: Vec<_> = files
            .chunks(chunk_size)
            .map(|chunk| scope.spawn(move || replay_chunk(chunk)))
            .collect();
        workers
            .into_iter()
            .flat_map(|worker| match worker.join() {
                Ok(failures) => failures,
                Err(panic) => std::panic::resume_unwind(panic),
            })
            .collect()
    })
}

/// Load, validate and replay one declaration file.
pub fn replay_file(
    cache: &SchemaTreeCache,
    swagger_base: &str,
    path: &Path,
) -> Result<(), FileFailure> {
    let fail = |error: DeclarationError| FileFailure {
        path: path.to_path_buf(),
        error,
    };

    let schema = TfSchema::load(path).map_err(fail)?;
    schema.validate().map_err(fail)?;
    tracing::debug!(
        file = %path.display(),
        schema = %schema.name,
        links = schema.link_count(),
        "linking declaration"
    );
    schema.link_swagger(cache, swagger_base).map_err(|error| {
        tracing::debug!(file = %path.display(), %error, "declaration failed");
        fail(error)
    })
}
