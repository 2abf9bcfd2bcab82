use opentelemetry::{
    KeyValue,
    metrics::{Counter, Histogram, Meter, MeterProvider},
};
use opentelemetry_sdk::metrics::SdkMeterProvider;
use std::time::Duration;
use tracing::info;

/// Metrics instruments shared by the request pipeline
#[derive(Clone)]
pub struct AppObservability {
    pub meter: Meter,
    provider: SdkMeterProvider,

    pub cache_lookups: Counter<u64>,
    pub transforms: Counter<u64>,
    pub transform_duration: Histogram<f64>,
    pub not_found_fallbacks: Counter<u64>,
    pub population_writes: Counter<u64>,
}

impl AppObservability {
    /// Build a local meter provider; no exporter is attached here
    pub fn new(service_name: &'static str) -> Self {
        let provider = SdkMeterProvider::builder().build();
        let meter = provider.meter(service_name);
        info!("OpenTelemetry metrics configured for {}", service_name);
        Self::build_with_instruments(provider, meter)
    }

    fn build_with_instruments(provider: SdkMeterProvider, meter: Meter) -> Self {
        let cache_lookups = meter
            .u64_counter("cache_lookups_total")
            .with_description("Cache lookups by tier and result")
            .build();
        let transforms = meter
            .u64_counter("transforms_total")
            .with_description("Artifact productions by outcome")
            .build();
        let transform_duration = meter
            .f64_histogram("transform_duration_seconds")
            .with_description("Time spent producing an artifact")
            .build();
        let not_found_fallbacks = meter
            .u64_counter("not_found_fallbacks_total")
            .with_description("Requests served with the placeholder image")
            .build();
        let population_writes = meter
            .u64_counter("cache_population_writes_total")
            .with_description("Cache population writes by tier and outcome")
            .build();

        Self {
            meter,
            provider,
            cache_lookups,
            transforms,
            transform_duration,
            not_found_fallbacks,
            population_writes,
        }
    }

    pub fn record_cache_lookup(&self, tier: &'static str, hit: bool) {
        self.cache_lookups.add(
            1,
            &[
                KeyValue::new("tier", tier),
                KeyValue::new("result", if hit { "hit" } else { "miss" }),
            ],
        );
    }

    pub fn record_transform(&self, outcome: &'static str, elapsed: Duration) {
        self.transforms
            .add(1, &[KeyValue::new("outcome", outcome)]);
        self.transform_duration
            .record(elapsed.as_secs_f64(), &[KeyValue::new("outcome", outcome)]);
    }

    pub fn record_not_found(&self, template: &str) {
        self.not_found_fallbacks
            .add(1, &[KeyValue::new("template", template.to_string())]);
    }

    pub fn record_population(&self, tier: &'static str, outcome: &'static str) {
        self.population_writes.add(
            1,
            &[KeyValue::new("tier", tier), KeyValue::new("outcome", outcome)],
        );
    }

    /// Flush and stop the meter provider
    pub fn shutdown(&self) {
        if let Err(e) = self.provider.shutdown() {
            tracing::debug!("Meter provider shutdown: {}", e);
        }
    }
}

impl std::fmt::Debug for AppObservability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppObservability").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instruments_record_without_exporter() {
        let observability = AppObservability::new("image-resizer-test");
        observability.record_cache_lookup("local", true);
        observability.record_transform("ok", Duration::from_millis(12));
        observability.record_not_found("custom-w100");
        observability.record_population("remote", "unchanged");
        observability.shutdown();
    }
}
