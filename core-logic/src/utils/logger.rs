use chrono::Local;
use nu_ansi_term::{Color, Style};
use std::fmt;
use tracing::{Event, Level, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    filter::Targets,
    fmt::{format::Writer, FmtContext, FormatEvent, FormatFields, FormattedFields},
    prelude::*,
    registry::LookupSpan,
    Layer,
};

/// Target for per-contract outcome lines; always shown on the console.
pub const RESULT_TARGET: &str = "crawl_result";

/// Installs the global subscriber: an hourly rolling file under `logs/` and
/// a colored console. `verbose` lowers both default levels so pool and retry
/// chatter becomes visible.
///
/// The returned guard flushes the file writer and must outlive the run.
pub fn setup_logger(verbose: bool) -> WorkerGuard {
    std::fs::create_dir_all("logs").ok();

    let file_appender = tracing_appender::rolling::hourly("logs", "crawler");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let (file_default, console_default) = if verbose {
        (Level::DEBUG, Level::INFO)
    } else {
        (Level::INFO, Level::WARN)
    };

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .event_format(FileFormatter)
        .with_filter(
            Targets::new()
                .with_target(RESULT_TARGET, Level::INFO)
                .with_default(file_default),
        );

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stdout)
        .with_ansi(true)
        .event_format(TerminalFormatter)
        .with_filter(
            Targets::new()
                .with_target(RESULT_TARGET, Level::INFO)
                .with_default(console_default),
        );

    // A second call (tests) keeps the first subscriber
    let _ = tracing_subscriber::registry()
        .with(file_layer)
        .with(console_layer)
        .try_init();

    guard
}

struct MessageVisitor {
    message: String,
}

impl tracing::field::Visit for MessageVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        }
    }
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        }
    }
}

fn event_message(event: &Event<'_>) -> String {
    let mut visitor = MessageVisitor {
        message: String::new(),
    };
    event.record(&mut visitor);
    visitor.message
}

/// Fields of the innermost span, e.g. `contract=0xabc`
fn span_context<S, N>(ctx: &FmtContext<'_, S, N>) -> Option<String>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    let span = ctx.lookup_current()?;
    let extensions = span.extensions();
    let fields = extensions.get::<FormattedFields<N>>()?;
    if fields.is_empty() {
        None
    } else {
        Some(fields.to_string())
    }
}

fn paint_status(msg: String) -> String {
    let green = Style::new().fg(Color::LightGreen).bold();
    let red = Style::new().fg(Color::LightRed).bold();
    let yellow = Style::new().fg(Color::Yellow).bold();

    if msg.contains("COMPLETED") {
        msg.replace("COMPLETED", &green.paint("COMPLETED").to_string())
    } else if msg.contains("FAILED") {
        msg.replace("FAILED", &red.paint("FAILED").to_string())
    } else if msg.contains("IN_PROGRESS") {
        msg.replace("IN_PROGRESS", &yellow.paint("IN_PROGRESS").to_string())
    } else {
        msg
    }
}

pub struct TerminalFormatter;

impl<S, N> FormatEvent<S, N> for TerminalFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let level = *event.metadata().level();
        if level == Level::WARN {
            write!(writer, "{} ", Color::Yellow.paint("WARN"))?;
        } else if level == Level::ERROR {
            write!(writer, "{} ", Color::Red.paint("ERROR"))?;
        }
        if let Some(context) = span_context(ctx) {
            write!(writer, "{} ", Style::new().dimmed().paint(format!("[{}]", context)))?;
        }
        writeln!(writer, "{}", paint_status(event_message(event)))
    }
}

pub struct FileFormatter;

impl<S, N> FormatEvent<S, N> for FileFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
        write!(writer, "{} [{}] ", timestamp, event.metadata().level())?;
        if let Some(context) = span_context(ctx) {
            write!(writer, "[{}] ", context)?;
        }
        writeln!(writer, "{}", event_message(event))
    }
}
