//! Metrics and tracing helpers.
//!
//! With the `metrics` feature, [`METRICS`] holds the OpenTelemetry
//! instruments exported through a Prometheus registry: relation fetches,
//! dependent saves, aborted units of work and raw query timings. With the
//! `tracing` feature, [`tracing_helpers`] builds the spans wrapped around
//! resolution, persistence and query execution.

#[cfg(feature = "metrics")]
pub use self::prometheus_metrics::{RelationMetrics, METRICS};

#[cfg(feature = "metrics")]
mod prometheus_metrics {
    use once_cell::sync::Lazy;
    use opentelemetry::metrics::{Counter, Histogram, MeterProvider};
    use opentelemetry::KeyValue;
    use opentelemetry_sdk::metrics::SdkMeterProvider;
    use prometheus::{Registry, TextEncoder};
    use std::time::Duration;

    pub static METRICS: Lazy<RelationMetrics> = Lazy::new(RelationMetrics::init);

    pub struct RelationMetrics {
        registry: Registry,
        _provider: SdkMeterProvider,
        pub fetches_total: Counter<u64>,
        pub fetch_duration: Histogram<f64>,
        pub fetch_errors_total: Counter<u64>,
        pub dependent_saves_total: Counter<u64>,
        pub aborts_total: Counter<u64>,
        pub queries_total: Counter<u64>,
        pub query_duration: Histogram<f64>,
        pub query_errors_total: Counter<u64>,
    }

    impl RelationMetrics {
        pub fn init() -> Self {
            let registry = Registry::new();
            let exporter = opentelemetry_prometheus::exporter()
                .with_registry(registry.clone())
                .build()
                .expect("failed to build prometheus exporter");
            let provider = SdkMeterProvider::builder().with_reader(exporter).build();
            let meter = provider.meter("lifeguard_arrays");

            let fetches_total = meter
                .u64_counter("lifeguard_relation_fetches_total")
                .with_description("Batch fetches issued while resolving relations")
                .build();
            let fetch_duration = meter
                .f64_histogram("lifeguard_relation_fetch_duration_seconds")
                .with_description("Duration of relation batch fetches")
                .build();
            let fetch_errors_total = meter
                .u64_counter("lifeguard_relation_fetch_errors_total")
                .with_description("Relation batch fetches that failed")
                .build();
            let dependent_saves_total = meter
                .u64_counter("lifeguard_dependent_saves_total")
                .with_description("Records saved as a consequence of a relation mutation")
                .build();
            let aborts_total = meter
                .u64_counter("lifeguard_unit_of_work_aborts_total")
                .with_description("Units of work aborted by a failed dependent save")
                .build();
            let queries_total = meter
                .u64_counter("lifeguard_queries_total")
                .with_description("Total queries executed")
                .build();
            let query_duration = meter
                .f64_histogram("lifeguard_query_duration_seconds")
                .with_description("Duration of queries")
                .build();
            let query_errors_total = meter
                .u64_counter("lifeguard_query_errors_total")
                .with_description("Queries that returned an error")
                .build();

            Self {
                registry,
                _provider: provider,
                fetches_total,
                fetch_duration,
                fetch_errors_total,
                dependent_saves_total,
                aborts_total,
                queries_total,
                query_duration,
                query_errors_total,
            }
        }

        pub fn record_fetch(&self, entity: &str, elapsed: Duration) {
            let attrs = [KeyValue::new("entity", entity.to_string())];
            self.fetches_total.add(1, &attrs);
            self.fetch_duration.record(elapsed.as_secs_f64(), &attrs);
        }

        pub fn record_fetch_error(&self, entity: &str) {
            self.fetch_errors_total
                .add(1, &[KeyValue::new("entity", entity.to_string())]);
        }

        pub fn record_dependent_save(&self, relation: &str) {
            self.dependent_saves_total
                .add(1, &[KeyValue::new("relation", relation.to_string())]);
        }

        pub fn record_abort(&self, relation: &str) {
            self.aborts_total
                .add(1, &[KeyValue::new("relation", relation.to_string())]);
        }

        pub fn record_query_duration(&self, elapsed: Duration) {
            self.queries_total.add(1, &[]);
            self.query_duration.record(elapsed.as_secs_f64(), &[]);
        }

        pub fn record_query_error(&self) {
            self.query_errors_total.add(1, &[]);
        }

        /// Prometheus text exposition of everything recorded so far
        pub fn render(&self) -> String {
            TextEncoder::new()
                .encode_to_string(&self.registry.gather())
                .unwrap_or_else(|e| {
                    log::warn!("failed to encode metrics: {e}");
                    String::new()
                })
        }
    }
}

#[cfg(feature = "tracing")]
pub mod tracing_helpers {
    use tracing::Span;

    /// Span around one `Resolver::resolve` call
    pub fn resolve_span(entity: &str, relation: &str, owners: usize) -> Span {
        tracing::debug_span!("relation.resolve", entity, relation, owners)
    }

    /// Span around one `MutationCoordinator::persist` call
    pub fn persist_span(entity: &str) -> Span {
        tracing::debug_span!("relation.persist", entity)
    }

    pub fn execute_query_span(query: &str) -> Span {
        tracing::debug_span!("db.query", db.system = "postgresql", db.statement = query)
    }

    pub fn begin_span(depth: usize) -> Span {
        tracing::debug_span!("db.unit_of_work.begin", depth)
    }

    pub fn commit_span(depth: usize) -> Span {
        tracing::debug_span!("db.unit_of_work.commit", depth)
    }

    pub fn rollback_span(depth: usize) -> Span {
        tracing::debug_span!("db.unit_of_work.rollback", depth)
    }

    /// Install a bare registry as the global subscriber (for applications
    /// that have none); returns false when one is already set
    pub fn install_registry() -> bool {
        tracing::subscriber::set_global_default(tracing_subscriber::registry()).is_ok()
    }
}

#[cfg(all(test, feature = "metrics"))]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_recorded_fetch_is_rendered() {
        METRICS.record_fetch("tags", Duration::from_millis(3));
        METRICS.record_abort("tags");
        let text = METRICS.render();
        assert!(text.contains("lifeguard_relation_fetches_total"), "got {text}");
        assert!(text.contains("lifeguard_unit_of_work_aborts_total"), "got {text}");
    }
}
