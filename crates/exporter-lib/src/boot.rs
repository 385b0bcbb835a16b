//! Pod boot duration
//!
//! Boot duration is the time between the pod's recorded start and the first
//! container (in status order) reaching the running state.

use crate::models::PodSnapshot;
use chrono::{DateTime, Utc};

/// Started-at instant of the first running container, if any
pub fn first_container_started_at(pod: &PodSnapshot) -> Option<DateTime<Utc>> {
    pod.container_statuses
        .iter()
        .find_map(|c| c.running_started_at)
}

/// Seconds from pod start to the first running container
///
/// `None` when the pod has no start time or no container is running yet.
pub fn boot_duration_secs(pod: &PodSnapshot) -> Option<f64> {
    let start = pod.start_time?;
    let started_at = first_container_started_at(pod)?;

    let micros = (started_at - start).num_microseconds()?;
    Some(micros as f64 / 1_000_000.0)
}
