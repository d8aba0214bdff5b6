use crate::cascade::domain::cascade_model::CascadeModel;
use crate::cascade::domain::classifier_evaluator::ClassifierEvaluator;
use crate::cascade::domain::feature_scaler::{FeatureScaler, ScaledCascade};
use crate::cascade::domain::integral_image::IntegralImage;
use crate::detection::domain::detection_parameters::DetectionParameters;
use crate::detection::domain::result_set::ResultSet;
use crate::detection::domain::scan_backend::ScanBackend;
use crate::detection::domain::scan_plan::{ScanLevel, ScanPlan};
use crate::shared::constants::DEFAULT_WORKERS;
use crate::shared::error::DetectionError;
use crate::shared::frame::Frame;
use crate::shared::region::Region;

/// Host reference scanner in f64.
///
/// With more than one worker, whole pyramid levels are handed out over a
/// channel and the per-level hits are put back in plan order, so the result
/// is identical for every worker count.
pub struct SequentialBackend {
    workers: usize,
}

impl SequentialBackend {
    pub fn new() -> Self {
        Self::with_workers(DEFAULT_WORKERS)
    }

    pub fn with_workers(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }
}

impl Default for SequentialBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ScanBackend for SequentialBackend {
    fn name(&self) -> &'static str {
        "sequential"
    }

    fn scan(
        &self,
        frame: &Frame,
        cascade: &CascadeModel,
        params: &DetectionParameters,
    ) -> Result<ResultSet, DetectionError> {
        let plan = ScanPlan::build(frame, cascade, params)?;
        let integral = IntegralImage::from_frame(frame);

        let per_level = if self.workers == 1 || plan.levels().len() < 2 {
            let mut scratch = ScaledCascade::new();
            plan.levels()
                .iter()
                .map(|level| scan_level(level, cascade, &integral, &mut scratch))
                .collect::<Result<Vec<_>, _>>()?
        } else {
            scan_levels_parallel(&plan, cascade, &integral, self.workers)?
        };

        Ok(per_level.into_iter().flatten().collect())
    }
}

fn scan_level(
    level: &ScanLevel,
    cascade: &CascadeModel,
    integral: &IntegralImage,
    scratch: &mut ScaledCascade,
) -> Result<Vec<Region>, DetectionError> {
    FeatureScaler::scale_into(cascade, level.window, level.scale_weight, scratch)?;

    let mut hits = Vec::new();
    for row in 0..level.rows {
        for col in 0..level.cols {
            let region = level.region_at(col, row);
            if ClassifierEvaluator::evaluate_window(scratch, integral, region.x, region.y)
                .is_accepted()
            {
                hits.push(region);
            }
        }
    }
    log::debug!(
        "Level {} ({}x{}, step {}): {}/{} windows accepted",
        level.index,
        level.window.width,
        level.window.height,
        level.step,
        hits.len(),
        level.position_count()
    );
    Ok(hits)
}

fn scan_levels_parallel(
    plan: &ScanPlan,
    cascade: &CascadeModel,
    integral: &IntegralImage,
    workers: usize,
) -> Result<Vec<Vec<Region>>, DetectionError> {
    let levels = plan.levels();
    let (job_tx, job_rx) = crossbeam_channel::unbounded::<&ScanLevel>();
    let (hit_tx, hit_rx) = crossbeam_channel::unbounded::<LevelHits>();
    for level in levels {
        // receiver is alive until the scope below ends
        let _ = job_tx.send(level);
    }
    drop(job_tx);

    let panicked = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..workers.min(levels.len()))
            .map(|_| {
                let job_rx = job_rx.clone();
                let hit_tx = hit_tx.clone();
                scope.spawn(move || {
                    let mut scratch = ScaledCascade::new();
                    for level in job_rx {
                        let hits = scan_level(level, cascade, integral, &mut scratch);
                        if hit_tx.send((level.index, hits)).is_err() {
                            break;
                        }
                    }
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join())
            .filter(Result::is_err)
            .count()
    });
    drop(hit_tx);

    if panicked > 0 {
        return Err(DetectionError::WorkerFailure(format!(
            "{panicked} scan worker(s) panicked"
        )));
    }
    merge_level_hits(levels.len(), hit_rx)
}

type LevelHits = (usize, Result<Vec<Region>, DetectionError>);

/// Put per-level results back in plan order. Every level must be reported
/// exactly once.
fn merge_level_hits(
    level_count: usize,
    results: impl IntoIterator<Item = LevelHits>,
) -> Result<Vec<Vec<Region>>, DetectionError> {
    let mut per_level: Vec<Option<Result<Vec<Region>, DetectionError>>> =
        (0..level_count).map(|_| None).collect();
    for (index, hits) in results {
        if let Some(slot) = per_level.get_mut(index) {
            *slot = Some(hits);
        }
    }
    per_level
        .into_iter()
        .enumerate()
        .map(|(index, hits)| {
            hits.unwrap_or_else(|| {
                Err(DetectionError::WorkerFailure(format!(
                    "level {index} was never scanned"
                )))
            })
        })
        .collect()
}
