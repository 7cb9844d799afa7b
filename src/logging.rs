// Copyright (c) 2025 ADBC Drivers Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Logging setup for the CloudFetch pipeline.
//!
//! The pipeline only emits `tracing` events. [`init_logging`] installs a
//! subscriber for applications that have none; an explicit level wins over
//! `RUST_LOG`, which wins over the `warn` default.

use std::fs::OpenOptions;
use std::sync::OnceLock;
use tracing_subscriber::fmt::{self, time::SystemTime, writer::BoxMakeWriter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_TARGET: &str = "databricks_cloudfetch";

static LOGGING_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Where and how verbosely the pipeline logs.
#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    /// `off`, `error`, `warn`, `info`, `debug` or `trace`, any case.
    pub level: Option<String>,
    /// Append to this file instead of stderr.
    pub file: Option<String>,
}

impl LogConfig {
    fn is_off(&self) -> bool {
        self.level
            .as_deref()
            .is_some_and(|level| level.eq_ignore_ascii_case("off"))
    }

    fn filter(&self) -> EnvFilter {
        match self.level {
            Some(ref level) => EnvFilter::new(format!("{}={}", LOG_TARGET, level.to_lowercase())),
            None => EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("{}=warn", LOG_TARGET))),
        }
    }

    /// Log file writer, or stderr when no file is set or it cannot be opened.
    /// The flag tells whether ANSI colors suit the target.
    fn writer(&self) -> (BoxMakeWriter, bool) {
        let Some(ref path) = self.file else {
            return (BoxMakeWriter::new(std::io::stderr), true);
        };

        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => (BoxMakeWriter::new(file), false),
            Err(e) => {
                eprintln!(
                    "databricks-cloudfetch: cannot open log file {}, using stderr: {}",
                    path, e
                );
                (BoxMakeWriter::new(std::io::stderr), true)
            }
        }
    }
}

/// Install the process-wide subscriber.
///
/// Only the first call has an effect. An already installed global subscriber
/// is kept.
pub fn init_logging(config: &LogConfig) {
    LOGGING_INITIALIZED.get_or_init(|| {
        if config.is_off() {
            return;
        }

        let (writer, ansi) = config.writer();
        let layer = fmt::layer()
            .with_writer(writer)
            .with_ansi(ansi)
            .with_target(false)
            .with_timer(SystemTime);

        // Err means a global subscriber exists
        let _ = tracing_subscriber::registry()
            .with(config.filter())
            .with(layer)
            .try_init();
    });
}
