use insights_core::Scenario;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub forecast_horizon_days: u32,
    pub scenarios: Vec<Scenario>,
    /// Per-session progress channel size.
    pub progress_channel_capacity: usize,
    /// Dish appeal below this score is reported as a visual gap.
    pub visual_gap_threshold: f64,
    /// Persist the session after recording a missing-input skip.
    pub persist_skips: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            forecast_horizon_days: 30,
            scenarios: vec![
                Scenario::new("baseline", 1.0),
                Scenario::new("optimistic", 1.15),
                Scenario::new("pessimistic", 0.85),
            ],
            progress_channel_capacity: events::DEFAULT_CHANNEL_CAPACITY,
            visual_gap_threshold: 0.6,
            persist_skips: true,
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_forecast_horizon(mut self, days: u32) -> Self {
        self.forecast_horizon_days = days.max(1);
        self
    }

    pub fn with_scenarios(mut self, scenarios: Vec<Scenario>) -> Self {
        if !scenarios.is_empty() {
            self.scenarios = scenarios;
        }
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.progress_channel_capacity = capacity.max(1);
        self
    }

    pub fn with_visual_gap_threshold(mut self, threshold: f64) -> Self {
        self.visual_gap_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    pub fn with_persist_skips(mut self, persist: bool) -> Self {
        self.persist_skips = persist;
        self
    }
}
