use anyhow::{Context, Result};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::{Sampler, SdkTracerProvider};
use opentelemetry_sdk::Resource;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

pub const DEFAULT_SERVICE_NAME: &str = "arena-server";

/// Span export settings. Export is off unless an endpoint is configured.
#[derive(Clone, Debug, PartialEq)]
pub struct Telemetry {
    pub endpoint: Option<String>,
    pub service_name: String,
    /// Fraction of traces kept, within `0.0..=1.0`.
    pub sampling_rate: f64,
}

impl Telemetry {
    /// Read `OTEL_EXPORTER_OTLP_ENDPOINT`, `OTEL_SERVICE_NAME` and
    /// `OTEL_SAMPLING_RATE` through `lookup`. Blank values count as unset.
    pub fn from_env(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let sampling_rate = var("OTEL_SAMPLING_RATE")
            .and_then(|value| value.parse::<f64>().ok())
            .filter(|rate| rate.is_finite())
            .map_or(1.0, |rate| rate.clamp(0.0, 1.0));
        Self {
            endpoint: var("OTEL_EXPORTER_OTLP_ENDPOINT"),
            service_name: var("OTEL_SERVICE_NAME")
                .unwrap_or_else(|| DEFAULT_SERVICE_NAME.to_string()),
            sampling_rate,
        }
    }

    fn provider(&self, endpoint: &str) -> Result<SdkTracerProvider> {
        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_http()
            .with_endpoint(endpoint)
            .build()
            .context("failed to build OTLP exporter")?;
        let resource = Resource::builder_empty()
            .with_attributes([KeyValue::new("service.name", self.service_name.clone())])
            .build();
        Ok(SdkTracerProvider::builder()
            .with_sampler(Sampler::TraceIdRatioBased(self.sampling_rate))
            .with_resource(resource)
            .with_batch_exporter(exporter)
            .build())
    }

    /// Install the global subscriber: formatted logs at `level`, plus span
    /// export when an endpoint is set.
    pub fn init(&self, level: tracing::Level) -> Result<()> {
        let filter = LevelFilter::from_level(level);
        let Some(endpoint) = self.endpoint.as_deref() else {
            tracing_subscriber::fmt().with_max_level(filter).init();
            return Ok(());
        };

        let provider = self.provider(endpoint)?;
        let tracer = provider.tracer(DEFAULT_SERVICE_NAME);
        opentelemetry::global::set_tracer_provider(provider);
        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().with_filter(filter))
            .with(tracing_opentelemetry::layer().with_tracer(tracer))
            .init();
        Ok(())
    }
}
