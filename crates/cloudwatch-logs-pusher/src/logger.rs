//! Custom tracing formatter for agent logs.
//!
//! Prefixes every log line with `CWL_AGENT` so agent output is easy to
//! separate from application logs when both land in the same stream.
//!
//! # Format
//!
//! ```text
//! CWL_AGENT | LEVEL | [span_name{span_fields}:] message {event_fields}
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use cloudwatch_logs_pusher::{config::Config, logger};
//!
//! let config = Config::from_env();
//! logger::init(&config);
//! ```

use std::fmt;

use tracing_core::{Event, Subscriber};
use tracing_subscriber::fmt::{
    format::{self, FormatEvent, FormatFields},
    FmtContext, FormattedFields,
};
use tracing_subscriber::registry::LookupSpan;

use crate::config::Config;

/// Log formatter that prefixes messages with `CWL_AGENT`.
///
/// Active spans are included from root to leaf, with their fields in curly
/// braces, giving hierarchical context for nested operations.
#[derive(Debug, Clone, Copy)]
pub struct Formatter;

impl<S, N> FormatEvent<S, N> for Formatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();
        write!(&mut writer, "CWL_AGENT | {} | ", metadata.level())?;

        if let Some(scope) = ctx.event_scope() {
            for span in scope.from_root() {
                write!(writer, "{}", span.name())?;

                // Span fields were formatted during `new_span` and stored in
                // the span's extensions by the `fmt` layer.
                let ext = span.extensions();
                let fields = &ext
                    .get::<FormattedFields<N>>()
                    .expect("will never be `None`");

                if !fields.is_empty() {
                    write!(writer, "{{{fields}}}")?;
                }
                write!(writer, ": ")?;
            }
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}

/// Installs the global subscriber with the agent formatter at the configured
/// level. Logs (rather than fails) when a subscriber is already installed.
pub fn init(config: &Config) {
    let subscriber = tracing_subscriber::fmt()
        .event_format(Formatter)
        .with_max_level(config.log_level.as_level_filter())
        .finish();

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        tracing::debug!("Global tracing subscriber already installed");
    }
}
