use clap::Args;
use clap::ValueEnum;
use common::tracing::Telemetry;
use educe::Educe;
use tracing_subscriber::filter::Directive;
use url::Url;

const DEFAULT_OTLP_ENDPOINT: &str = "http://localhost:4317";

#[derive(Args, Debug, Educe, Clone)]
#[educe(Default)]
pub struct TelemetryConfig {
    /// Where spans are sent
    #[educe(Default = TelemetryKind::None)]
    #[arg(long, env = "FLORA_TELEMETRY_KIND", default_value_t)]
    pub telemetry_kind: TelemetryKind,
    #[educe(Default = "flora".into())]
    #[arg(long, env = "FLORA_SERVICE_NAME", default_value = "flora")]
    pub service_name: String,
    /// gRPC endpoint of the OTLP collector
    #[educe(Default = Url::parse(DEFAULT_OTLP_ENDPOINT).expect("default endpoint is a valid URL"))]
    #[arg(long, env = "FLORA_TELEMETRY_ENDPOINT", default_value = DEFAULT_OTLP_ENDPOINT)]
    pub telemetry_endpoint: Url,
    /// Comma separated log filtering directives, such as `flora_models=debug,tower_http=trace`
    #[educe(Default = Vec::new())]
    #[arg(long = "log", env = "FLORA_LOG", value_delimiter = ',')]
    pub log_directives: Vec<Directive>,
}

impl TelemetryConfig {
    /// The collector description, `None` when telemetry is disabled
    pub fn telemetry(&self) -> Option<Telemetry> {
        match self.telemetry_kind {
            TelemetryKind::None => None,
            TelemetryKind::Opentelemetry => Some(Telemetry {
                service_name: self.service_name.clone(),
                endpoint: self.telemetry_endpoint.clone(),
            }),
        }
    }
}

#[derive(Default, ValueEnum, Debug, Clone, Copy, PartialEq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum TelemetryKind {
    #[default]
    None,
    Opentelemetry,
}
