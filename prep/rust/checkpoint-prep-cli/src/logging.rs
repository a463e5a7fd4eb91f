//! Console output for the prep tool: one line per event, with a level icon.

use owo_colors::OwoColorize;
use std::fmt;
use std::io::IsTerminal;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::{self, FormatEvent, FormatFields};
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::registry::LookupSpan;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogStyle {
    /// Icon and message only.
    Compact,
    #[default]
    Pretty,
    /// Adds span names and file:line.
    Verbose,
}

impl std::str::FromStr for LogStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "verbose" => Ok(Self::Verbose),
            _ => Err(format!("invalid log style '{s}', expected compact, pretty or verbose")),
        }
    }
}

fn level_icon(level: Level) -> &'static str {
    match level {
        Level::TRACE => "·",
        Level::DEBUG => "●",
        Level::INFO => "✓",
        Level::WARN => "⚠",
        Level::ERROR => "✕",
    }
}

pub struct ConsoleFormatter<T> {
    timer: T,
    use_ansi: bool,
    style: LogStyle,
}

impl<T> ConsoleFormatter<T> {
    pub fn new(timer: T, style: LogStyle) -> Self {
        Self { timer, use_ansi: std::io::stderr().is_terminal(), style }
    }

    fn write_level(&self, writer: &mut format::Writer<'_>, level: Level) -> fmt::Result {
        let label = match self.style {
            LogStyle::Compact => level_icon(level).to_string(),
            _ => format!("{} {:<5}", level_icon(level), level.as_str()),
        };
        if !self.use_ansi {
            return write!(writer, "{label}");
        }
        match level {
            Level::TRACE => write!(writer, "{}", label.dimmed()),
            Level::DEBUG => write!(writer, "{}", label.blue()),
            Level::INFO => write!(writer, "{}", label.green()),
            Level::WARN => write!(writer, "{}", label.yellow()),
            Level::ERROR => write!(writer, "{}", label.red().bold()),
        }
    }
}

impl<S, N, T> FormatEvent<S, N> for ConsoleFormatter<T>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
    T: FormatTime,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let meta = event.metadata();
        self.timer.format_time(&mut writer)?;
        write!(writer, " ")?;
        self.write_level(&mut writer, *meta.level())?;

        if self.style == LogStyle::Verbose {
            if let Some(scope) = ctx.event_scope() {
                for span in scope.from_root() {
                    write!(writer, " {}:", span.name())?;
                }
            }
            if let (Some(file), Some(line)) = (meta.file(), meta.line()) {
                let file = file.rsplit('/').next().unwrap_or(file);
                write!(writer, " {file}:{line}")?;
            }
        }

        write!(writer, " ")?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}
