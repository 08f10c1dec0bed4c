use anyhow::{Result, anyhow};
use http::StatusCode;
use time::OffsetDateTime;
use tracing_subscriber::{EnvFilter, fmt};

use crate::cli::LogFormat;

const DEFAULT_FILTER: &str = "info";

pub fn init_logger(format: LogFormat) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    match format {
        LogFormat::Json => fmt::fmt()
            .with_env_filter(filter)
            .json()
            .with_current_span(false)
            .with_span_list(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .try_init()
            .map_err(|err| anyhow!(err))?,
        LogFormat::Text => fmt::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .try_init()
            .map_err(|err| anyhow!(err))?,
    }

    Ok(())
}

/// One line per intercepted request, recording which strategy ran and where
/// the response actually came from.
#[derive(Debug, Clone)]
pub struct FetchLogEvent {
    pub method: String,
    pub path: String,
    pub destination: String,
    pub strategy: String,
    pub cache: Option<String>,
    pub decision: String,
    pub status: u16,
}

#[derive(Debug)]
pub struct FetchLogBuilder {
    event: FetchLogEvent,
}

impl FetchLogBuilder {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            event: FetchLogEvent {
                method: method.into(),
                path: path.into(),
                destination: String::new(),
                strategy: String::new(),
                cache: None,
                decision: String::from("UNKNOWN"),
                status: 0,
            },
        }
    }

    pub fn destination(mut self, destination: impl Into<String>) -> Self {
        self.event.destination = destination.into();
        self
    }

    pub fn strategy(mut self, strategy: impl Into<String>) -> Self {
        self.event.strategy = strategy.into();
        self
    }

    pub fn cache(mut self, cache: impl Into<String>) -> Self {
        self.event.cache = Some(cache.into());
        self
    }

    pub fn decision(mut self, decision: impl Into<String>) -> Self {
        self.event.decision = decision.into();
        self
    }

    pub fn status(mut self, status: StatusCode) -> Self {
        self.event.status = status.as_u16();
        self
    }

    pub fn build(self) -> FetchLogEvent {
        self.event
    }

    pub fn log(self) {
        log_fetch(self.build());
    }
}

pub fn log_fetch(event: FetchLogEvent) {
    let FetchLogEvent {
        method,
        path,
        destination,
        strategy,
        cache,
        decision,
        status,
    } = event;

    let now = OffsetDateTime::now_utc();
    let (year, month, day) = now.to_calendar_date();
    let (hour, minute, second) = now.to_hms();
    let millisecond = now.millisecond();
    let month_number: u8 = month.into();
    let ts = format!(
        "{year:04}-{month:02}-{day:02}T{hour:02}:{minute:02}:{second:02}.{millisecond:03}Z",
        month = month_number
    );

    let cache_field = cache.as_deref();

    tracing::info!(
        target = "fetch_log",
        ts,
        method,
        path,
        destination,
        strategy,
        cache = cache_field,
        decision,
        status
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::{Arc, Mutex};
    use tracing_subscriber::fmt::MakeWriter;

    #[derive(Clone)]
    struct BufferWriter {
        buf: Arc<Mutex<Vec<u8>>>,
    }

    impl Write for BufferWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.buf.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for BufferWriter {
        type Writer = BufferWriter;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn strip_ansi(input: &str) -> String {
        let mut out = String::with_capacity(input.len());
        let mut chars = input.chars().peekable();
        while let Some(ch) = chars.next() {
            if ch == '\x1b' && chars.peek() == Some(&'[') {
                chars.next();
                for next in chars.by_ref() {
                    if next == 'm' {
                        break;
                    }
                }
                continue;
            }
            out.push(ch);
        }
        out
    }

    #[test]
    fn fetch_log_includes_strategy_and_decision() {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let writer = BufferWriter {
            buf: buffer.clone(),
        };
        let subscriber = tracing_subscriber::fmt()
            .with_writer(writer)
            .with_target(false)
            .without_time()
            .compact()
            .finish();

        let event = FetchLogBuilder::new("GET", "/news.html")
            .destination("document")
            .strategy("network_first")
            .cache("v3-dynamic")
            .decision("CACHE_FALLBACK")
            .status(StatusCode::OK)
            .build();

        tracing::subscriber::with_default(subscriber, || {
            log_fetch(event);
        });

        let output = String::from_utf8(buffer.lock().unwrap().clone()).unwrap();
        let output = strip_ansi(&output);
        assert!(
            output.contains("strategy=\"network_first\""),
            "missing strategy in output: {output}"
        );
        assert!(
            output.contains("decision=\"CACHE_FALLBACK\""),
            "missing decision in output: {output}"
        );
        assert!(
            output.contains("cache=\"v3-dynamic\""),
            "missing cache in output: {output}"
        );
    }
}
