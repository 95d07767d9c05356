//! Audit handlers
//!
//! A handler binds one formatter to one transport and owns the failure
//! accounting for that destination. Its transport, formatter and tracker sit
//! behind a single async lock, so an administrative recycle arriving during a
//! delivery waits for that delivery to finish instead of racing it.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;

use super::config::{Destination, HandlerConfig};
use super::failure_tracker::{FailureOutcome, FailureTracker, HandlerState};
use super::formatter::AuditFormatter;
use super::record::AuditRecord;
use super::syslog::{default_hostname, SyslogHeader};
use super::transport::{self, Transport, WriteOutcome};
use crate::error::Result;

/// A transport together with the envelope its messages need
pub struct Endpoint {
    transport: Box<dyn Transport>,
    header: Option<SyslogHeader>,
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("transport", &self.transport.describe())
            .field("header", &self.header)
            .finish()
    }
}

impl Endpoint {
    /// Build the endpoint for a configured destination
    ///
    /// Syslog destinations get a syslog header; files get the formatter's
    /// output as is.
    pub fn open(destination: &Destination) -> Result<Self> {
        let transport = transport::open(destination)?;
        let header = match destination {
            Destination::File(_) => None,
            Destination::Syslog(syslog) => Some(SyslogHeader::new(
                syslog.syslog_format,
                syslog.facility,
                syslog.app_name.clone(),
                syslog.hostname.clone().unwrap_or_else(default_hostname),
                syslog.max_length,
                syslog.truncate,
            )),
        };
        Ok(Self { transport, header })
    }

    /// An endpoint over an arbitrary transport
    pub fn new(transport: Box<dyn Transport>, header: Option<SyslogHeader>) -> Self {
        Self { transport, header }
    }
}

/// Result of a single delivery attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Written to the destination
    Written,
    /// Not attempted because the handler is disabled
    Skipped,
    /// Attempted and failed; counted against the threshold
    Failed,
}

/// Live failure counters, exposed by read-resource with runtime values
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct HandlerRuntime {
    /// Failures since the last reset
    pub failure_count: u32,
    /// Configured threshold
    pub max_failure_count: u32,
    /// Whether deliveries are suspended until recycle
    pub disabled_due_to_failure: bool,
    /// Most recent failure since the last reset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

struct HandlerInner {
    formatter: Arc<dyn AuditFormatter>,
    endpoint: Endpoint,
    tracker: FailureTracker,
}

/// A named formatter + transport pair with independent failure tracking
pub struct AuditHandler {
    name: String,
    inner: Mutex<HandlerInner>,
}

impl std::fmt::Debug for AuditHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditHandler").field("name", &self.name).finish()
    }
}

impl AuditHandler {
    /// Create a handler from its configuration
    ///
    /// No resource is opened until the first delivery.
    pub fn from_config(config: &HandlerConfig, formatter: Arc<dyn AuditFormatter>) -> Result<Self> {
        config.validate()?;
        let endpoint = Endpoint::open(&config.destination)?;
        Ok(Self::new(
            &config.name,
            formatter,
            endpoint,
            config.max_failure_count,
        ))
    }

    /// Create a handler over an endpoint
    pub fn new(
        name: &str,
        formatter: Arc<dyn AuditFormatter>,
        endpoint: Endpoint,
        max_failure_count: u32,
    ) -> Self {
        Self {
            name: name.to_string(),
            inner: Mutex::new(HandlerInner {
                formatter,
                endpoint,
                tracker: FailureTracker::new(name, max_failure_count),
            }),
        }
    }

    /// Handler name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Format and write one record
    ///
    /// Failures are absorbed into the failure count; nothing is returned to
    /// the caller beyond the outcome.
    pub async fn deliver(&self, record: &AuditRecord) -> Delivery {
        let mut inner = self.inner.lock().await;
        let HandlerInner {
            formatter,
            endpoint,
            tracker,
        } = &mut *inner;

        if tracker.is_disabled() {
            tracing::trace!(handler = %self.name, "Skipping disabled audit handler");
            return Delivery::Skipped;
        }

        let payload = match formatter.format(record) {
            Ok(payload) => payload,
            Err(e) => {
                tracker.record_failure(&format!("formatting failed: {}", e));
                return self.after_failure(endpoint, tracker).await;
            }
        };
        let message = match &endpoint.header {
            Some(header) => header.wrap(record, &payload),
            None => payload,
        };

        match endpoint.transport.write(message.as_bytes()).await {
            Ok(WriteOutcome::Written) => Delivery::Written,
            Ok(WriteOutcome::Reconnected) => {
                tracker.record_reconnect();
                Delivery::Written
            }
            Err(e) => {
                tracker.record_failure(&format!("{}: {}", endpoint.transport.describe(), e));
                self.after_failure(endpoint, tracker).await
            }
        }
    }

    async fn after_failure(&self, endpoint: &mut Endpoint, tracker: &FailureTracker) -> Delivery {
        if tracker.is_disabled() {
            endpoint.transport.close().await;
        }
        Delivery::Failed
    }

    /// Reset failure accounting and force the transport to reopen
    pub async fn recycle(&self) {
        let mut inner = self.inner.lock().await;
        if let Err(e) = inner.endpoint.transport.recycle().await {
            tracing::warn!(
                handler = %self.name,
                "Transport recycle incomplete: {}",
                e
            );
        }
        inner.tracker.recycle();
    }

    /// Release the transport's resource
    pub async fn close(&self) {
        let mut inner = self.inner.lock().await;
        inner.endpoint.transport.close().await;
    }

    /// Use a different formatter for subsequent records
    pub async fn set_formatter(&self, formatter: Arc<dyn AuditFormatter>) {
        self.inner.lock().await.formatter = formatter;
    }

    /// Change the failure threshold
    pub async fn set_max_failure_count(&self, max_failure_count: u32) {
        let mut inner = self.inner.lock().await;
        if inner.tracker.set_max_failure_count(max_failure_count) == Some(FailureOutcome::Disabled) {
            inner.endpoint.transport.close().await;
        }
    }

    /// Swap in a new endpoint; failure accounting starts over
    pub async fn replace_endpoint(&self, endpoint: Endpoint) {
        let mut inner = self.inner.lock().await;
        inner.endpoint.transport.close().await;
        tracing::info!(
            handler = %self.name,
            from = %inner.endpoint.transport.describe(),
            to = %endpoint.transport.describe(),
            "Audit handler destination replaced"
        );
        inner.endpoint = endpoint;
        inner.tracker.recycle();
    }

    /// Current failure counters
    pub async fn runtime(&self) -> HandlerRuntime {
        let inner = self.inner.lock().await;
        HandlerRuntime {
            failure_count: inner.tracker.failure_count(),
            max_failure_count: inner.tracker.max_failure_count(),
            disabled_due_to_failure: inner.tracker.state() == HandlerState::Disabled,
            last_error: inner.tracker.last_error().map(str::to_string),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::formatter::{JsonFormatter, JsonFormatterOptions};
    use crate::audit::syslog::{SyslogFacility, SyslogFormat};
    use crate::error::TransportError;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;

    /// Shared view of what a scripted transport did
    #[derive(Default)]
    struct Script {
        /// Results for upcoming writes; empty means succeed
        results: VecDeque<std::result::Result<WriteOutcome, ()>>,
        written: Vec<String>,
        attempts: usize,
        closes: usize,
        recycles: usize,
    }

    struct ScriptedTransport(Arc<StdMutex<Script>>);

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn write(
            &mut self,
            message: &[u8],
        ) -> std::result::Result<WriteOutcome, TransportError> {
            let mut script = self.0.lock().unwrap();
            script.attempts += 1;
            match script.results.pop_front().unwrap_or(Ok(WriteOutcome::Written)) {
                Ok(outcome) => {
                    script
                        .written
                        .push(String::from_utf8_lossy(message).into_owned());
                    Ok(outcome)
                }
                Err(()) => Err(TransportError::Io(std::io::Error::other("scripted failure"))),
            }
        }

        async fn close(&mut self) {
            self.0.lock().unwrap().closes += 1;
        }

        async fn recycle(&mut self) -> std::result::Result<(), TransportError> {
            self.0.lock().unwrap().recycles += 1;
            Ok(())
        }

        fn describe(&self) -> String {
            "scripted".to_string()
        }
    }

    fn compact_formatter() -> Arc<dyn AuditFormatter> {
        Arc::new(
            JsonFormatter::new(JsonFormatterOptions {
                compact: true,
                include_date: false,
                ..Default::default()
            })
            .unwrap(),
        )
    }

    fn handler(max_failure_count: u32) -> (AuditHandler, Arc<StdMutex<Script>>) {
        let script = Arc::new(StdMutex::new(Script::default()));
        let endpoint = Endpoint::new(Box::new(ScriptedTransport(script.clone())), None);
        let handler = AuditHandler::new("scripted", compact_formatter(), endpoint, max_failure_count);
        (handler, script)
    }

    fn record() -> AuditRecord {
        AuditRecord::core(vec![serde_json::json!({"operation": "add"})], false, true)
    }

    fn fail(script: &Arc<StdMutex<Script>>, n: usize) {
        let mut script = script.lock().unwrap();
        for _ in 0..n {
            script.results.push_back(Err(()));
        }
    }

    #[tokio::test]
    async fn test_three_failures_disable_then_recycle_restores() {
        let (handler, script) = handler(3);
        fail(&script, 3);

        for _ in 0..3 {
            assert_eq!(handler.deliver(&record()).await, Delivery::Failed);
        }
        let runtime = handler.runtime().await;
        assert_eq!(runtime.failure_count, 3);
        assert!(runtime.disabled_due_to_failure);
        assert_eq!(script.lock().unwrap().closes, 1);

        // Fourth write is skipped without touching the transport
        assert_eq!(handler.deliver(&record()).await, Delivery::Skipped);
        assert_eq!(script.lock().unwrap().attempts, 3);
        assert_eq!(handler.runtime().await.failure_count, 3);

        handler.recycle().await;
        let runtime = handler.runtime().await;
        assert_eq!(runtime.failure_count, 0);
        assert!(!runtime.disabled_due_to_failure);
        assert_eq!(script.lock().unwrap().recycles, 1);

        assert_eq!(handler.deliver(&record()).await, Delivery::Written);
        assert_eq!(handler.runtime().await.failure_count, 0);
        assert_eq!(script.lock().unwrap().written.len(), 1);
    }

    #[tokio::test]
    async fn test_success_does_not_reset_count() {
        let (handler, script) = handler(5);
        fail(&script, 2);
        handler.deliver(&record()).await;
        handler.deliver(&record()).await;

        assert_eq!(handler.deliver(&record()).await, Delivery::Written);
        assert_eq!(handler.runtime().await.failure_count, 2);

        fail(&script, 1);
        handler.deliver(&record()).await;
        assert_eq!(handler.runtime().await.failure_count, 3);
    }

    #[tokio::test]
    async fn test_reconnect_resets_count() {
        let (handler, script) = handler(5);
        fail(&script, 2);
        handler.deliver(&record()).await;
        handler.deliver(&record()).await;

        script
            .lock()
            .unwrap()
            .results
            .push_back(Ok(WriteOutcome::Reconnected));
        assert_eq!(handler.deliver(&record()).await, Delivery::Written);

        let runtime = handler.runtime().await;
        assert_eq!(runtime.failure_count, 0);
        assert!(!runtime.disabled_due_to_failure);
    }

    #[tokio::test]
    async fn test_unlimited_failures() {
        let (handler, script) = handler(0);
        fail(&script, 25);
        for _ in 0..25 {
            assert_eq!(handler.deliver(&record()).await, Delivery::Failed);
        }
        let runtime = handler.runtime().await;
        assert_eq!(runtime.failure_count, 25);
        assert!(!runtime.disabled_due_to_failure);
    }

    #[tokio::test]
    async fn test_lowering_threshold_disables_and_closes() {
        let (handler, script) = handler(10);
        fail(&script, 2);
        handler.deliver(&record()).await;
        handler.deliver(&record()).await;

        handler.set_max_failure_count(2).await;
        assert!(handler.runtime().await.disabled_due_to_failure);
        assert_eq!(script.lock().unwrap().closes, 1);

        handler.set_max_failure_count(3).await;
        assert!(!handler.runtime().await.disabled_due_to_failure);
        assert_eq!(handler.deliver(&record()).await, Delivery::Written);
    }

    #[tokio::test]
    async fn test_syslog_envelope_applied() {
        let script = Arc::new(StdMutex::new(Script::default()));
        let header = SyslogHeader::new(
            SyslogFormat::Rfc3164,
            SyslogFacility::LocalUse0,
            "app",
            "host",
            None,
            false,
        );
        let endpoint = Endpoint::new(Box::new(ScriptedTransport(script.clone())), Some(header));
        let handler = AuditHandler::new("syslog", compact_formatter(), endpoint, 10);

        handler.deliver(&record()).await;
        let written = script.lock().unwrap().written[0].clone();
        // local-use-0 (16) * 8 + notice (5)
        assert!(written.starts_with("<133>"));
        assert!(written.ends_with('}'));
    }

    #[tokio::test]
    async fn test_replace_endpoint_resets_state() {
        let (handler, script) = handler(1);
        fail(&script, 1);
        handler.deliver(&record()).await;
        assert!(handler.runtime().await.disabled_due_to_failure);

        let fresh = Arc::new(StdMutex::new(Script::default()));
        let endpoint = Endpoint::new(Box::new(ScriptedTransport(fresh.clone())), None);
        handler.replace_endpoint(endpoint).await;

        assert!(!handler.runtime().await.disabled_due_to_failure);
        assert_eq!(handler.deliver(&record()).await, Delivery::Written);
        assert_eq!(fresh.lock().unwrap().written.len(), 1);
    }
}
