//! Line-oriented event formatters
//!
//! JSON output uses the `tracing-subscriber` json layer directly; the two
//! human readable layouts are produced by [`LineFormatter`].

use std::fmt;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::{self, FormatEvent, FormatFields};
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::registry::LookupSpan;

/// Which human readable layout a [`LineFormatter`] writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineStyle {
    /// `YYYY-MM-DD HH:MM:SS | LEVEL | target | message`
    Full,
    /// `[LEVEL] message`
    Compact,
}

/// Formatter for the text and compact log formats.
///
/// # Example Output
/// ```text
/// 2026-01-15 10:30:45 | INFO  | bittensor_apy::cache | Cache refreshed
/// [WARN] Serving stale value after refresh failure
/// ```
#[derive(Debug, Clone, Copy)]
pub struct LineFormatter {
    style: LineStyle,
}

impl LineFormatter {
    pub const fn full() -> Self {
        Self {
            style: LineStyle::Full,
        }
    }

    pub const fn compact() -> Self {
        Self {
            style: LineStyle::Compact,
        }
    }

    pub fn style(&self) -> LineStyle {
        self.style
    }
}

impl<S, N> FormatEvent<S, N> for LineFormatter
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
        let meta = event.metadata();
        match self.style {
            LineStyle::Full => write!(
                writer,
                "{} | {} | {} | ",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                level_label(*meta.level()),
                meta.target()
            )?,
            LineStyle::Compact => write!(writer, "[{}] ", level_label(*meta.level()).trim_end())?,
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Level name padded to a fixed width of five
pub(crate) fn level_label(level: Level) -> &'static str {
    match level {
        Level::TRACE => "TRACE",
        Level::DEBUG => "DEBUG",
        Level::INFO => "INFO ",
        Level::WARN => "WARN ",
        Level::ERROR => "ERROR",
    }
}
