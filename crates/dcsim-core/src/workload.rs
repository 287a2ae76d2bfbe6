//! Workload and DR-request input files (JSON).
//!
//! Input is validated here, before the clock starts. The simulation
//! itself never sees malformed jobs.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::Tick;
use crate::config::SimConfig;
use crate::error::{SimError, SimResult};
use crate::request::DrRequest;

/// One job of the workload trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    pub id: String,
    pub nodes: u32,
    /// Steps at `frequency`.
    pub duration: i64,
    pub frequency: f64,
    #[serde(default)]
    pub job_class: usize,
    pub submission: Tick,
    /// Traced start; also the initial planned start.
    pub start: Tick,
    /// Derived through the SLA model when absent.
    #[serde(default)]
    pub deadline: Option<Tick>,
}

/// The full workload: a JSON array of job specs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkloadSpec {
    pub jobs: Vec<JobSpec>,
}

impl WorkloadSpec {
    pub fn from_json_str(content: &str) -> SimResult<Self> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn validate(&self, config: &SimConfig) -> SimResult<()> {
        let classes = config.models.power_classes.len();
        let capacity = config.cluster.capacity;
        let mut seen = HashSet::new();

        for job in &self.jobs {
            let fail = |reason: &str| Err(SimError::InvalidWorkload(format!("job {}: {reason}", job.id)));
            if !seen.insert(job.id.as_str()) {
                return fail("duplicate id");
            }
            if job.nodes == 0 {
                return fail("requests no nodes");
            }
            if job.nodes > capacity {
                return fail("requests more nodes than the cluster has");
            }
            if job.duration <= 0 {
                return fail("duration must be positive");
            }
            if job.frequency <= 0.0 {
                return fail("frequency must be positive");
            }
            if job.job_class >= classes {
                return fail("unknown job class");
            }
            if job.submission < 0 || job.start < job.submission {
                return fail("start precedes submission");
            }
        }
        Ok(())
    }
}

/// Read and validate a workload file.
pub fn load_workload(path: &Path, config: &SimConfig) -> SimResult<WorkloadSpec> {
    let content = read(path)?;
    let workload = WorkloadSpec::from_json_str(&content)?;
    workload.validate(config)?;
    Ok(workload)
}

/// Read and validate a DR request file (a JSON array of requests).
pub fn load_requests(path: &Path) -> SimResult<Vec<DrRequest>> {
    let content = read(path)?;
    let requests: Vec<DrRequest> = serde_json::from_str(&content)?;
    validate_requests(&requests)?;
    Ok(requests)
}

pub fn validate_requests(requests: &[DrRequest]) -> SimResult<()> {
    for (i, r) in requests.iter().enumerate() {
        if r.timestamp < 0 || r.window <= 0 || r.power_delta < 0.0 || !r.power_delta.is_finite() {
            return Err(SimError::InvalidWorkload(format!(
                "DR request {i}: needs timestamp ≥ 0, window > 0 and a finite delta ≥ 0"
            )));
        }
    }
    Ok(())
}

fn read(path: &Path) -> SimResult<String> {
    std::fs::read_to_string(path).map_err(|source| SimError::Io {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Direction;

    const WORKLOAD: &str = r#"[
        {"id": "a", "nodes": 2, "duration": 10, "frequency": 2.7, "submission": 0, "start": 0},
        {"id": "b", "nodes": 1, "duration": 5, "frequency": 2.7, "job_class": 1,
         "submission": 3, "start": 4, "deadline": 50}
    ]"#;

    #[test]
    fn parses_job_array() {
        let workload = WorkloadSpec::from_json_str(WORKLOAD).unwrap();
        assert_eq!(workload.jobs.len(), 2);
        assert_eq!(workload.jobs[0].deadline, None);
        assert_eq!(workload.jobs[1].job_class, 1);
        workload.validate(&SimConfig::default()).unwrap();
    }

    #[test]
    fn rejects_duplicate_ids() {
        let mut workload = WorkloadSpec::from_json_str(WORKLOAD).unwrap();
        workload.jobs[1].id = "a".to_string();
        let err = workload.validate(&SimConfig::default()).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn rejects_oversized_job() {
        let mut config = SimConfig::default();
        config.cluster.capacity = 1;
        let workload = WorkloadSpec::from_json_str(WORKLOAD).unwrap();
        assert!(workload.validate(&config).is_err());
    }

    #[test]
    fn loads_requests_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("requests.json");
        std::fs::write(
            &path,
            r#"[{"timestamp": 60, "power_delta": 12.5, "direction": "positive", "window": 30, "compensation": 4.0}]"#,
        )
        .unwrap();
        let requests = load_requests(&path).unwrap();
        assert_eq!(requests[0].direction, Direction::Decrease);
        assert_eq!(requests[0].window, 30);
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_requests(Path::new("/nonexistent/requests.json")).unwrap_err();
        assert!(matches!(err, SimError::Io { .. }));
    }
}
