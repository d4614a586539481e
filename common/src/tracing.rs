use opentelemetry::trace::TracerProvider;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::error::OTelSdkResult;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::SdkTracerProvider;
use opentelemetry_sdk::trace::SpanData;
use opentelemetry_sdk::trace::SpanExporter;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use url::Url;

/// Where the formatted logs are written
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Stream {
    Stderr,
    Stdout,
}

/// Identifies the service towards an OpenTelemetry collector
#[derive(Debug, Clone)]
pub struct Telemetry {
    pub service_name: String,
    pub endpoint: Url,
}

#[derive(Debug)]
pub struct TracingConfig {
    pub stream: Stream,
    /// Level used for every target not matched by `RUST_LOG` or `directives`
    pub log_level: LevelFilter,
    /// Extra filtering directives, applied on top of `RUST_LOG`
    pub directives: Vec<Directive>,
    /// Spans are only exported when set
    pub telemetry: Option<Telemetry>,
}

/// Span exporter dropping everything it receives
///
/// Used when telemetry is disabled, and in tests. `opentelemetry_sdk` ships one
/// behind its 'testing' feature, which pulls far too many dependencies.
#[derive(Debug, Default)]
pub struct NoopSpanExporter;

impl SpanExporter for NoopSpanExporter {
    fn export(&self, _: Vec<SpanData>) -> impl std::future::Future<Output = OTelSdkResult> + Send {
        std::future::ready(Ok(()))
    }
}

fn env_filter(log_level: LevelFilter, directives: Vec<Directive>) -> EnvFilter {
    let filter = EnvFilter::builder()
        .with_default_directive(log_level.into())
        .from_env_lossy();
    directives
        .into_iter()
        .fold(filter, |filter, directive| filter.add_directive(directive))
}

/// Builds the subscriber used by every Flora command
///
/// Spans are handed to `exporter` in background batches when telemetry is enabled.
pub fn create_tracing_subscriber<T: SpanExporter + 'static>(
    TracingConfig {
        stream,
        log_level,
        directives,
        telemetry,
    }: TracingConfig,
    exporter: T,
) -> impl tracing::Subscriber {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .pretty()
        .with_file(true)
        .with_line_number(false);
    let fmt_layer = match stream {
        Stream::Stderr => fmt_layer.with_writer(std::io::stderr).boxed(),
        Stream::Stdout => fmt_layer.boxed(),
    };

    let telemetry_layer = telemetry.map(|Telemetry { service_name, .. }| {
        let resource = Resource::builder()
            .with_service_name(service_name.clone())
            .build();
        let tracer = SdkTracerProvider::builder()
            .with_resource(resource)
            .with_batch_exporter(exporter)
            .build()
            .tracer(service_name);
        opentelemetry::global::set_text_map_propagator(TraceContextPropagator::new());
        tracing_opentelemetry::OpenTelemetryLayer::new(tracer)
    });

    tracing_subscriber::registry()
        .with(telemetry_layer)
        .with(env_filter(log_level, directives))
        .with(fmt_layer)
}
