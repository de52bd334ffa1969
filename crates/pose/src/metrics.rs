use opentelemetry::{
    global,
    metrics::{Counter, Histogram},
};

/// Pipeline instruments. Recording is a no-op until a meter provider is
/// installed (see `common::TelemetryGuard`).
#[derive(Clone)]
pub struct PipelineMetrics {
    pub detect_duration: Histogram<f64>,
    pub persons_detected: Counter<u64>,
    pub persons_emitted: Counter<u64>,
    pub persons_rejected: Counter<u64>,
    pub landmark_failures: Counter<u64>,
}

impl PipelineMetrics {
    pub fn new(meter_name: &'static str) -> Self {
        let meter = global::meter(meter_name);
        let latency_buckets = [
            0.005, 0.01, 0.02, 0.03, 0.05, 0.075, 0.1, 0.15, 0.2, 0.3, 0.5, 0.75, 1.0, 2.0,
        ];

        Self {
            detect_duration: meter
                .f64_histogram("pose_detect_duration_seconds")
                .with_description("Time to process one image (detection + landmarks)")
                .with_unit("s")
                .with_boundaries(latency_buckets.to_vec())
                .build(),
            persons_detected: meter
                .u64_counter("pose_persons_detected_total")
                .with_description("Person boxes returned by the detector stage")
                .build(),
            persons_emitted: meter
                .u64_counter("pose_persons_emitted_total")
                .with_description("Poses returned to callers")
                .build(),
            persons_rejected: meter
                .u64_counter("pose_persons_rejected_total")
                .with_description("Persons dropped for a low landmark score")
                .build(),
            landmark_failures: meter
                .u64_counter("pose_landmark_failures_total")
                .with_description("Landmark crops that failed and fell back to box only")
                .build(),
        }
    }
}
