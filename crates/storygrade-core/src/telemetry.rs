//! Tracing setup for storygrade binaries.
//!
//! Log lines always go to stderr, in both text and JSON form: the CLI prints
//! rubrics and reports as JSON on stdout and the two streams must not mix.

use tracing::{Level, Subscriber};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

/// Install the global subscriber. `RUST_LOG` wins over `level`; later calls
/// are no-ops.
pub fn init_tracing(json: bool, level: Level) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    log_subscriber(json, filter, std::io::stderr).try_init().ok();
}

/// Build the storygrade subscriber around any writer.
fn log_subscriber<W>(
    json: bool,
    filter: EnvFilter,
    writer: W,
) -> impl Subscriber + Send + Sync + 'static
where
    W: for<'w> MakeWriter<'w> + Clone + Send + Sync + 'static,
{
    let json_layer = json.then(|| {
        fmt::layer()
            .with_target(false)
            .json()
            .with_writer(writer.clone())
    });
    let text_layer = (!json).then(|| fmt::layer().with_target(false).with_writer(writer));

    Registry::default()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Captured {
        fn lines(&self) -> Vec<String> {
            String::from_utf8(self.0.lock().unwrap().clone())
                .unwrap()
                .lines()
                .map(str::to_string)
                .collect()
        }
    }

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'w> MakeWriter<'w> for Captured {
        type Writer = Captured;

        fn make_writer(&'w self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn init_twice_is_harmless() {
        init_tracing(false, Level::WARN);
        init_tracing(true, Level::DEBUG);
        tracing::warn!("still logging");
    }

    #[test]
    fn json_lines_go_to_the_given_writer() {
        let sink = Captured::default();
        let subscriber = log_subscriber(true, EnvFilter::new("info"), sink.clone());

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(report = "enabled weights sum to 90, expected 100", "merged rubric is not valid");
            tracing::debug!("filtered out");
        });

        let lines = sink.lines();
        assert_eq!(lines.len(), 1);
        let line: serde_json::Value = serde_json::from_str(&lines[0]).unwrap();
        assert_eq!(line["level"], "WARN");
        assert_eq!(line["fields"]["message"], "merged rubric is not valid");
    }

    #[test]
    fn text_lines_go_to_the_given_writer() {
        let sink = Captured::default();
        let subscriber = log_subscriber(false, EnvFilter::new("info"), sink.clone());

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(story_key = "ECOM-1", "evaluation.rated");
        });

        let lines = sink.lines();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("evaluation.rated"));
        assert!(serde_json::from_str::<serde_json::Value>(&lines[0]).is_err());
    }
}
