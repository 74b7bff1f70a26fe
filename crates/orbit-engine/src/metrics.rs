//! Run timing and throughput metrics

use std::time::Duration;

use orbit_core::ApiUsage;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Success,
    FlaggedForRetry,
    Error,
}

/// Timing and outcome of one batch request
#[derive(Debug, Clone, Serialize)]
pub struct BatchMetrics {
    pub batch: u32,
    /// 0 for the first pass, then one per retry round
    pub round: u32,
    pub ideas: usize,
    pub status: BatchStatus,
    pub total_secs: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_secs: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_secs: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<ApiUsage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens_per_second: Option<f64>,
    pub payload_bytes: usize,
    pub processed_ideas: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BatchMetrics {
    pub fn new(batch: u32, round: u32, ideas: usize) -> Self {
        Self {
            batch,
            round,
            ideas,
            status: BatchStatus::Error,
            total_secs: 0.0,
            api_secs: None,
            processing_secs: None,
            usage: None,
            tokens_per_second: None,
            payload_bytes: 0,
            processed_ideas: 0,
            error: None,
        }
    }
}

/// Wall-clock time spent in each phase of a run
#[derive(Debug, Clone, Copy, Default)]
pub struct PhaseTimes {
    pub load: Duration,
    pub processing: Duration,
    pub retries: Duration,
    pub saving: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct RunMetrics {
    pub batches: Vec<BatchMetrics>,
    pub phases: PhaseTimes,
    pub total: Duration,
}

#[derive(Debug, Clone, Serialize)]
pub struct PhaseSummary {
    pub seconds: f64,
    pub percentage: f64,
    pub formatted: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSummary {
    pub total_seconds: f64,
    pub formatted: String,
    pub loading: PhaseSummary,
    pub processing: PhaseSummary,
    pub retries: PhaseSummary,
    pub saving: PhaseSummary,
    pub total_ideas: usize,
    pub processed_ideas: usize,
    pub success_rate: f64,
    pub ideas_per_second: f64,
    pub tokens_per_second: f64,
    pub api: ApiTotals,
    pub batches: Vec<BatchMetrics>,
}

/// Sums over every request that returned usage
#[derive(Debug, Clone, Default, Serialize)]
pub struct ApiTotals {
    pub requests: usize,
    pub failed_requests: usize,
    pub api_seconds: f64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub payload_bytes: usize,
}

impl RunMetrics {
    pub fn record(&mut self, batch: BatchMetrics) {
        self.batches.push(batch);
    }

    pub fn api_totals(&self) -> ApiTotals {
        let mut totals = ApiTotals::default();
        for batch in &self.batches {
            totals.requests += 1;
            totals.payload_bytes += batch.payload_bytes;
            totals.api_seconds += batch.api_secs.unwrap_or(0.0);
            if batch.status == BatchStatus::Error {
                totals.failed_requests += 1;
            }
            if let Some(usage) = batch.usage {
                totals.prompt_tokens += usage.prompt_tokens;
                totals.completion_tokens += usage.completion_tokens;
                totals.total_tokens += usage.total_tokens;
            }
        }
        totals
    }

    pub fn summary(&self, total_ideas: usize, processed_ideas: usize) -> MetricsSummary {
        let total_secs = self.total.as_secs_f64();
        let phase = |duration: Duration| PhaseSummary {
            seconds: duration.as_secs_f64(),
            percentage: percentage(duration.as_secs_f64(), total_secs),
            formatted: format_duration(duration),
        };
        let api = self.api_totals();

        MetricsSummary {
            total_seconds: total_secs,
            formatted: format_duration(self.total),
            loading: phase(self.phases.load),
            processing: phase(self.phases.processing),
            retries: phase(self.phases.retries),
            saving: phase(self.phases.saving),
            total_ideas,
            processed_ideas,
            success_rate: percentage(processed_ideas as f64, total_ideas as f64),
            ideas_per_second: per_second(processed_ideas as f64, total_secs),
            tokens_per_second: per_second(api.total_tokens as f64, total_secs),
            api,
            batches: self.batches.clone(),
        }
    }
}

fn percentage(part: f64, whole: f64) -> f64 {
    if whole > 0.0 { part / whole * 100.0 } else { 0.0 }
}

fn per_second(amount: f64, secs: f64) -> f64 {
    if secs > 0.0 { amount / secs } else { 0.0 }
}

/// Human-readable duration: `1d 2h 3m 4s`, `2h 3m 4s`, `3m 4s` or `4.25s`
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let days = total / 86_400;
    let hours = (total % 86_400) / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;

    if days > 0 {
        format!("{days}d {hours}h {minutes}m {seconds}s")
    } else if hours > 0 {
        format!("{hours}h {minutes}m {seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{:.2}s", duration.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(4250)), "4.25s");
        assert_eq!(format_duration(Duration::from_secs(184)), "3m 4s");
        assert_eq!(format_duration(Duration::from_secs(7384)), "2h 3m 4s");
        assert_eq!(format_duration(Duration::from_secs(93_784)), "1d 2h 3m 4s");
    }

    #[test]
    fn test_summary_percentages() {
        let mut metrics = RunMetrics {
            total: Duration::from_secs(10),
            ..Default::default()
        };
        metrics.phases.processing = Duration::from_secs(5);

        let mut ok = BatchMetrics::new(1, 0, 4);
        ok.status = BatchStatus::Success;
        ok.usage = Some(ApiUsage::new(80, 20));
        metrics.record(ok);
        metrics.record(BatchMetrics::new(2, 0, 4));

        let summary = metrics.summary(8, 4);
        assert_eq!(summary.processing.percentage, 50.0);
        assert_eq!(summary.success_rate, 50.0);
        assert_eq!(summary.tokens_per_second, 10.0);
        assert_eq!(summary.api.failed_requests, 1);
        assert_eq!(summary.api.total_tokens, 100);
    }

    #[test]
    fn test_empty_run_has_no_division_by_zero() {
        let summary = RunMetrics::default().summary(0, 0);
        assert_eq!(summary.success_rate, 0.0);
        assert_eq!(summary.ideas_per_second, 0.0);
    }
}
