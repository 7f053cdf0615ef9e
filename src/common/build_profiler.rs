use std::time::Duration;
#[cfg(feature = "profile")]
use std::time::Instant;

#[cfg(feature = "profile")]
use log::debug;

/// Phases of one hierarchy build, in execution order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BuildStage {
    /// Reference generation over the scene's motion blurred geometry.
    PrimRefs,
    /// Size estimation and arena preparation.
    Allocate,
    /// The binned SAH recursion, including node and leaf creation.
    Build,
    /// Installing the arenas into the hierarchy.
    Finalize,
}

impl BuildStage {
    pub const ALL: [BuildStage; 4] = [
        BuildStage::PrimRefs,
        BuildStage::Allocate,
        BuildStage::Build,
        BuildStage::Finalize,
    ];

    pub fn name(self) -> &'static str {
        match self {
            BuildStage::PrimRefs => "primrefs",
            BuildStage::Allocate => "allocate",
            BuildStage::Build => "build",
            BuildStage::Finalize => "finalize",
        }
    }
}

#[cfg(feature = "profile")]
type StageTimes = [Option<Duration>; BuildStage::ALL.len()];

/// Stage timings of hierarchy builds.
///
/// Timings of a running build stay pending until [`commit`](Self::commit); an aborted build is
/// [`discard`](Self::discard)ed and the last completed build keeps reporting its timings.
/// Only active with the `profile` feature; otherwise stages run untimed and nothing is reported.
#[derive(Debug, Default)]
pub struct BuildProfiler {
    #[cfg(feature = "profile")]
    pending: StageTimes,
    #[cfg(feature = "profile")]
    last: StageTimes,
}

impl BuildProfiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `run` as part of `stage` of the current build.
    pub fn time<T>(&mut self, stage: BuildStage, run: impl FnOnce() -> T) -> T {
        #[cfg(feature = "profile")]
        let start = Instant::now();
        let result = run();
        #[cfg(feature = "profile")]
        {
            let slot = &mut self.pending[stage as usize];
            *slot = Some(slot.unwrap_or_default() + start.elapsed());
        }
        #[cfg(not(feature = "profile"))]
        let _ = stage;
        result
    }

    /// Time `stage` took in the last completed build.
    pub fn get(&self, stage: BuildStage) -> Option<Duration> {
        #[cfg(feature = "profile")]
        {
            self.last[stage as usize]
        }
        #[cfg(not(feature = "profile"))]
        {
            let _ = stage;
            None
        }
    }

    /// Sum over the stages of the last completed build.
    pub fn total(&self) -> Duration {
        BuildStage::ALL.iter().filter_map(|&stage| self.get(stage)).sum()
    }

    /// Publishes the timings of the current build of `label`, replacing those of the previous one.
    pub fn commit(&mut self, label: &str) {
        #[cfg(feature = "profile")]
        {
            self.last = std::mem::take(&mut self.pending);
            for stage in BuildStage::ALL {
                if let Some(time) = self.last[stage as usize] {
                    debug!("{label}: {} took {:.3} ms", stage.name(), time.as_secs_f64() * 1000.0);
                }
            }
        }
        #[cfg(not(feature = "profile"))]
        let _ = label;
    }

    /// Drops the timings of an unfinished build.
    pub fn discard(&mut self) {
        #[cfg(feature = "profile")]
        {
            self.pending = StageTimes::default();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_passes_result_through() {
        let mut profiler = BuildProfiler::new();
        assert_eq!(profiler.time(BuildStage::Build, || 7), 7);
        assert_eq!(profiler.get(BuildStage::Build), None, "uncommitted stages are not reported");
        profiler.commit("test");
        assert_eq!(profiler.get(BuildStage::PrimRefs), None);
        #[cfg(feature = "profile")]
        assert!(profiler.get(BuildStage::Build).is_some());
        #[cfg(not(feature = "profile"))]
        assert_eq!(profiler.total(), Duration::ZERO);
    }

    #[test]
    fn test_discard_keeps_last_completed_build() {
        let mut profiler = BuildProfiler::new();
        profiler.time(BuildStage::Build, || ());
        profiler.commit("first");
        let first = profiler.get(BuildStage::Build);

        profiler.time(BuildStage::PrimRefs, || ());
        profiler.time(BuildStage::Build, || std::thread::sleep(Duration::from_millis(2)));
        profiler.discard();
        assert_eq!(profiler.get(BuildStage::Build), first);
        assert_eq!(profiler.get(BuildStage::PrimRefs), None);

        profiler.commit("empty");
        assert_eq!(profiler.get(BuildStage::Build), None);
    }
}
