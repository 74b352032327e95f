//! Bounded parallel batch conversion.
//!
//! [`convert_all`] runs independent conversions on a dedicated [`rayon`]
//! pool sized by the caller. Every job owns its [`MediaSource`], so
//! workers share nothing but the run settings.

use rayon::{
    ThreadPoolBuilder,
    iter::{IntoParallelIterator, ParallelIterator},
};

use crate::{
    error::ReelcutError,
    options::{ConversionOptions, RunOptions},
    pipeline::{ConversionResult, convert},
    source::MediaSource,
};

/// One conversion of a batch.
#[derive(Debug)]
pub struct ConversionJob {
    /// The source, exclusively owned by this job.
    pub source: MediaSource,
    /// What to produce.
    pub options: ConversionOptions,
}

impl ConversionJob {
    /// Pair a source with its options.
    pub fn new(source: MediaSource, options: ConversionOptions) -> Self {
        Self { source, options }
    }
}

/// Convert every job with at most `max_parallel` conversions in flight.
///
/// Results are returned in job order; one failing job does not stop the
/// others. Cancelling `run`'s token cancels every job still running.
///
/// # Errors
///
/// Returns [`ReelcutError::InvalidArgument`] if `max_parallel` is 0 and an
/// I/O error if the worker pool cannot be created.
///
/// # Example
///
/// ```no_run
/// use reelcut::{ConversionJob, ConversionOptions, MediaSource, OutputFormat, RunOptions, convert_all};
///
/// let jobs = ["a.mp4", "b.mp4", "c.mp4"]
///     .into_iter()
///     .map(|path| {
///         let source = MediaSource::open(path)?;
///         Ok(ConversionJob::new(source, ConversionOptions::new(OutputFormat::WebM)))
///     })
///     .collect::<Result<Vec<_>, reelcut::ReelcutError>>()?;
/// for result in convert_all(jobs, 2, &RunOptions::default())? {
///     println!("{}", result?.filename);
/// }
/// # Ok::<(), reelcut::ReelcutError>(())
/// ```
pub fn convert_all(
    jobs: Vec<ConversionJob>,
    max_parallel: usize,
    run: &RunOptions,
) -> Result<Vec<Result<ConversionResult, ReelcutError>>, ReelcutError> {
    if max_parallel == 0 {
        return Err(ReelcutError::invalid("max_parallel must be at least 1"));
    }
    let pool = ThreadPoolBuilder::new()
        .num_threads(max_parallel)
        .thread_name(|index| format!("reelcut-worker-{index}"))
        .build()
        .map_err(|error| ReelcutError::Io(std::io::Error::other(error.to_string())))?;

    log::info!(
        "Converting {} jobs with up to {max_parallel} in parallel",
        jobs.len()
    );
    let results = pool.install(|| {
        jobs.into_par_iter()
            .map(|mut job| convert(&mut job.source, &job.options, run))
            .collect()
    });
    Ok(results)
}
