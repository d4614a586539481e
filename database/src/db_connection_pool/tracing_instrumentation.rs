use diesel::connection::Instrumentation;
use diesel::connection::InstrumentationEvent;

/// Forwards diesel query events to `tracing`
#[derive(Debug, Default)]
pub(super) struct TracingInstrumentation;

impl Instrumentation for TracingInstrumentation {
    fn on_connection_event(&mut self, event: InstrumentationEvent<'_>) {
        match event {
            InstrumentationEvent::StartQuery { query, .. } => {
                tracing::trace!(%query, "executing query");
            }
            InstrumentationEvent::FinishQuery {
                query,
                error: Some(error),
                ..
            } => {
                tracing::debug!(%query, %error, "query failed");
            }
            _ => {}
        }
    }
}
