use serde::Serialize;

#[derive(Debug, Default, Clone, Serialize)]
pub struct DiagnosticLog {
    pub scene: String,
    pub total_steps: usize,
    pub step_metrics: StepMetricsCollection,
}

impl DiagnosticLog {
    pub fn push(&mut self, step_metrics: StepMetrics) {
        self.step_metrics.push(step_metrics);
        self.total_steps += 1;
    }
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct StepMetricsCollection {
    pub global_time: Vec<f32>,
    pub active_agent_count: Vec<usize>,
    pub time_index: Vec<f64>,
    pub time_neighbors: Vec<f64>,
    pub time_behavior: Vec<f64>,
    pub time_model: Vec<f64>,
    pub time_commit: Vec<f64>,
}

impl StepMetricsCollection {
    pub fn push(&mut self, metrics: StepMetrics) {
        self.global_time.push(metrics.global_time);
        self.active_agent_count.push(metrics.active_agent_count);
        self.time_index.push(metrics.time_index);
        self.time_neighbors.push(metrics.time_neighbors);
        self.time_behavior.push(metrics.time_behavior);
        self.time_model.push(metrics.time_model);
        self.time_commit.push(metrics.time_commit);
    }
}

/// Wall-clock timings (seconds) of one simulation step.
#[derive(Debug, Default, Clone, Serialize)]
pub struct StepMetrics {
    pub step: u64,
    pub global_time: f32,
    /// Agents not yet in a final state.
    pub active_agent_count: usize,
    pub time_index: f64,
    pub time_neighbors: f64,
    pub time_behavior: f64,
    pub time_model: f64,
    pub time_commit: f64,
}
