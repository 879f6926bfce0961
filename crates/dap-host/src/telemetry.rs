//! Log output for hosts embedding the transport.
//!
//! The transport only emits `tracing` events under `dap_host::*` targets;
//! where they go is the host's choice. [`initialise`] installs a global
//! stderr subscriber once per process. [`subscriber`] builds the same
//! subscriber over any writer so a host can scope it with
//! [`tracing::subscriber::with_default`] or route adapter diagnostics into
//! its own sink.

use std::io::{self, IsTerminal};

use once_cell::sync::OnceCell;
use tracing::Subscriber;
use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::{self, MakeWriter, time::UtcTime};

use crate::settings::{HostSettings, LogFormat};

static INSTALLED: OnceCell<LogFormat> = OnceCell::new();

/// Boxed subscriber returned by [`subscriber`].
pub type BoxedSubscriber = Box<dyn Subscriber + Send + Sync>;

/// Proof that the global subscriber is in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelemetryHandle {
    format: LogFormat,
}

impl TelemetryHandle {
    /// Format chosen by the first successful [`initialise`] call.
    #[must_use]
    pub const fn format(&self) -> LogFormat {
        self.format
    }
}

/// Errors encountered while configuring log output.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// The configured filter expression does not parse.
    #[error("invalid log filter {filter:?}: {message}")]
    Filter {
        /// The rejected expression.
        filter: String,
        /// Parser diagnostic.
        message: String,
    },
    /// Another global subscriber was installed first.
    #[error("failed to install log subscriber: {0}")]
    Subscriber(#[from] SetGlobalDefaultError),
}

/// Installs the global stderr subscriber on first use.
///
/// Later calls leave the global state alone and report the format that was
/// installed, so every transport owner may call this. Output goes to stderr
/// because an adapter's stdout is reserved for protocol frames.
///
/// # Errors
///
/// Returns [`TelemetryError::Filter`] for an unparsable filter and
/// [`TelemetryError::Subscriber`] if a foreign subscriber is already global.
pub fn initialise(settings: &HostSettings) -> Result<TelemetryHandle, TelemetryError> {
    let format = INSTALLED.get_or_try_init(|| {
        let ansi = settings.log_format == LogFormat::Compact && io::stderr().is_terminal();
        let installed = build(settings, io::stderr, ansi)?;
        tracing::subscriber::set_global_default(installed)?;
        Ok::<_, TelemetryError>(settings.log_format)
    })?;
    Ok(TelemetryHandle { format: *format })
}

/// Builds the configured subscriber over `writer` without installing it.
///
/// # Errors
///
/// Returns [`TelemetryError::Filter`] for an unparsable filter.
pub fn subscriber<W>(settings: &HostSettings, writer: W) -> Result<BoxedSubscriber, TelemetryError>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    build(settings, writer, false)
}

fn build<W>(settings: &HostSettings, writer: W, ansi: bool) -> Result<BoxedSubscriber, TelemetryError>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let filter = EnvFilter::try_new(&settings.log_filter).map_err(|error| TelemetryError::Filter {
        filter: settings.log_filter.clone(),
        message: error.to_string(),
    })?;

    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(true)
        .with_writer(writer)
        .with_ansi(ansi)
        .with_timer(UtcTime::rfc_3339());

    Ok(match settings.log_format {
        LogFormat::Json => Box::new(builder.json().flatten_event(true).finish()),
        LogFormat::Compact => Box::new(builder.compact().finish()),
    })
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    use rstest::rstest;

    use super::*;
    use crate::framing::Framer;
    use crate::notify::Notifier;
    use crate::pending::PendingRequests;
    use crate::router::Router;

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Capture {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().expect("capture poisoned")).into_owned()
        }
    }

    impl Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().expect("capture poisoned").extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn settings(filter: &str, format: LogFormat) -> HostSettings {
        HostSettings {
            log_filter: filter.to_owned(),
            log_format: format,
            ..HostSettings::default()
        }
    }

    fn router() -> Router {
        Router::new(Arc::new(PendingRequests::new()), Arc::new(Notifier::new()))
    }

    #[rstest]
    fn json_output_carries_router_target_and_fields() {
        let capture = Capture::default();
        let sink = capture.clone();
        let built = subscriber(&settings("dap_host=debug", LogFormat::Json), move || sink.clone())
            .expect("build failed");

        tracing::subscriber::with_default(built, || router().route(b"{not json"));

        let output = capture.text();
        assert!(output.contains(r#""target":"dap_host::router""#), "{output}");
        assert!(output.contains("failed to decode adapter message"), "{output}");
        assert!(output.contains(r#""body_bytes":9"#), "{output}");
    }

    #[rstest]
    fn filter_scopes_output_by_module_target() {
        let capture = Capture::default();
        let sink = capture.clone();
        let built = subscriber(
            &settings("dap_host::framing=warn", LogFormat::Compact),
            move || sink.clone(),
        )
        .expect("build failed");

        tracing::subscriber::with_default(built, || {
            let mut framer = Framer::new();
            let frames: Vec<_> = framer.feed(b"content-length: 2\r\n\r\nok").collect();
            router().route_frame(frames.into_iter().next().expect("one frame"));
        });

        let output = capture.text();
        assert!(output.contains("dap_host::framing"), "{output}");
        assert!(!output.contains("dap_host::router"), "{output}");
    }

    #[rstest]
    fn rejects_malformed_filter() {
        let result = subscriber(&settings("dap_host=verbose", LogFormat::Json), io::sink);

        assert!(matches!(
            result,
            Err(TelemetryError::Filter { ref filter, .. }) if filter == "dap_host=verbose"
        ));
    }
}
