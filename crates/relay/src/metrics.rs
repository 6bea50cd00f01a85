use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, OnceLock, PoisonError,
    },
};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct EndpointMetricKey {
    endpoint: String,
    method: String,
}

pub struct RelayMetrics {
    request_duration_count: Mutex<HashMap<EndpointMetricKey, u64>>,
    request_duration_sum_ms: Mutex<HashMap<EndpointMetricKey, u64>>,
    request_errors_total: Mutex<HashMap<EndpointMetricKey, u64>>,
    request_rate_total: Mutex<HashMap<EndpointMetricKey, u64>>,
    stomp_frames_total: Mutex<HashMap<String, u64>>,
    connects_rejected_total: AtomicU64,
    events_published_total: AtomicU64,
    events_delivered_total: AtomicU64,
    events_acked_total: AtomicU64,
    events_redelivered_total: AtomicU64,
    events_expired_total: AtomicU64,
    connected_sessions: AtomicU64,
    pending_deliveries: AtomicU64,
}

static GLOBAL_METRICS: OnceLock<Arc<RelayMetrics>> = OnceLock::new();

impl Default for RelayMetrics {
    fn default() -> Self {
        Self {
            request_duration_count: Mutex::new(HashMap::new()),
            request_duration_sum_ms: Mutex::new(HashMap::new()),
            request_errors_total: Mutex::new(HashMap::new()),
            request_rate_total: Mutex::new(HashMap::new()),
            stomp_frames_total: Mutex::new(HashMap::new()),
            connects_rejected_total: AtomicU64::new(0),
            events_published_total: AtomicU64::new(0),
            events_delivered_total: AtomicU64::new(0),
            events_acked_total: AtomicU64::new(0),
            events_redelivered_total: AtomicU64::new(0),
            events_expired_total: AtomicU64::new(0),
            connected_sessions: AtomicU64::new(0),
            pending_deliveries: AtomicU64::new(0),
        }
    }
}

pub fn set_global_metrics(metrics: Arc<RelayMetrics>) {
    let _ = GLOBAL_METRICS.set(metrics);
}

fn global_metrics() -> Option<&'static Arc<RelayMetrics>> {
    GLOBAL_METRICS.get()
}

pub fn record_connect_rejected() {
    if let Some(metrics) = global_metrics() {
        metrics.connects_rejected_total.fetch_add(1, Ordering::Relaxed);
    }
}

pub fn record_event_published() {
    if let Some(metrics) = global_metrics() {
        metrics.events_published_total.fetch_add(1, Ordering::Relaxed);
    }
}

pub fn record_event_delivered() {
    if let Some(metrics) = global_metrics() {
        metrics.events_delivered_total.fetch_add(1, Ordering::Relaxed);
    }
}

pub fn record_event_acked() {
    if let Some(metrics) = global_metrics() {
        metrics.events_acked_total.fetch_add(1, Ordering::Relaxed);
    }
}

pub fn record_event_redelivered() {
    if let Some(metrics) = global_metrics() {
        metrics.events_redelivered_total.fetch_add(1, Ordering::Relaxed);
    }
}

pub fn record_event_expired() {
    if let Some(metrics) = global_metrics() {
        metrics.events_expired_total.fetch_add(1, Ordering::Relaxed);
    }
}

pub fn set_pending_deliveries(value: usize) {
    if let Some(metrics) = global_metrics() {
        metrics.set_pending_deliveries(value);
    }
}

impl RelayMetrics {
    pub fn record_http_request(&self, method: &str, path: &str, status_code: u16, latency_ms: u64) {
        let key = EndpointMetricKey {
            endpoint: normalize_endpoint(path),
            method: method.to_ascii_uppercase(),
        };

        increment_counter(&self.request_rate_total, &key, 1);
        increment_counter(&self.request_duration_sum_ms, &key, latency_ms);
        increment_counter(&self.request_duration_count, &key, 1);
        if status_code >= 400 {
            increment_counter(&self.request_errors_total, &key, 1);
        }
    }

    pub fn record_inbound_frame(&self, command: &str) {
        let mut guard = lock(&self.stomp_frames_total);
        let value = guard.entry(command.to_ascii_uppercase()).or_insert(0);
        *value = value.saturating_add(1);
    }

    pub fn set_connected_sessions(&self, value: usize) {
        self.connected_sessions.store(value as u64, Ordering::Relaxed);
    }

    pub fn set_pending_deliveries(&self, value: usize) {
        self.pending_deliveries.store(value as u64, Ordering::Relaxed);
    }

    pub fn render_prometheus(&self) -> String {
        let mut output = String::new();

        output.push_str("# HELP relay_request_rate_total Total HTTP requests by endpoint.\n");
        output.push_str("# TYPE relay_request_rate_total counter\n");
        append_counter_lines(&mut output, "relay_request_rate_total", &self.request_rate_total);

        output.push_str(
            "# HELP relay_request_errors_total Total HTTP error responses by endpoint.\n",
        );
        output.push_str("# TYPE relay_request_errors_total counter\n");
        append_counter_lines(&mut output, "relay_request_errors_total", &self.request_errors_total);

        output.push_str("# HELP relay_request_duration_ms_sum Sum of HTTP request latency in milliseconds by endpoint.\n");
        output.push_str("# TYPE relay_request_duration_ms_sum counter\n");
        append_counter_lines(
            &mut output,
            "relay_request_duration_ms_sum",
            &self.request_duration_sum_ms,
        );

        output.push_str("# HELP relay_request_duration_ms_count Count of HTTP request latency samples by endpoint.\n");
        output.push_str("# TYPE relay_request_duration_ms_count counter\n");
        append_counter_lines(
            &mut output,
            "relay_request_duration_ms_count",
            &self.request_duration_count,
        );

        output.push_str("# HELP relay_stomp_frames_total Inbound STOMP frames by command.\n");
        output.push_str("# TYPE relay_stomp_frames_total counter\n");
        append_command_lines(&mut output, &self.stomp_frames_total);

        for (name, help, value) in [
            (
                "relay_connects_rejected_total",
                "STOMP CONNECT frames rejected for an invalid access token.",
                &self.connects_rejected_total,
            ),
            ("relay_events_published_total", "Live events accepted over REST.", &self.events_published_total),
            ("relay_events_delivered_total", "MESSAGE frames sent to sessions.", &self.events_delivered_total),
            ("relay_events_acked_total", "Deliveries settled by a client ACK.", &self.events_acked_total),
            ("relay_events_redelivered_total", "Deliveries resent after the ack timeout.", &self.events_redelivered_total),
            ("relay_events_expired_total", "Deliveries dropped after the last attempt.", &self.events_expired_total),
        ] {
            append_scalar(&mut output, name, help, "counter", value.load(Ordering::Relaxed));
        }

        append_scalar(
            &mut output,
            "relay_connected_sessions",
            "Sessions currently bound to a user.",
            "gauge",
            self.connected_sessions.load(Ordering::Relaxed),
        );
        append_scalar(
            &mut output,
            "relay_pending_deliveries",
            "Deliveries awaiting acknowledgement.",
            "gauge",
            self.pending_deliveries.load(Ordering::Relaxed),
        );

        output
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn normalize_endpoint(path: &str) -> String {
    if path.is_empty() {
        return "/".to_string();
    }

    let mut normalized_segments = Vec::new();
    for segment in path.split('/').filter(|segment| !segment.is_empty()) {
        if uuid::Uuid::parse_str(segment).is_ok() {
            normalized_segments.push("{uuid}".to_string());
            continue;
        }

        if segment.chars().all(|character| character.is_ascii_digit()) {
            normalized_segments.push("{number}".to_string());
            continue;
        }

        normalized_segments.push(segment.to_string());
    }

    if normalized_segments.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", normalized_segments.join("/"))
    }
}

fn increment_counter(
    map: &Mutex<HashMap<EndpointMetricKey, u64>>,
    key: &EndpointMetricKey,
    delta: u64,
) {
    let mut guard = lock(map);
    let value = guard.entry(key.clone()).or_insert(0);
    *value = value.saturating_add(delta);
}

fn append_counter_lines(
    output: &mut String,
    metric_name: &str,
    map: &Mutex<HashMap<EndpointMetricKey, u64>>,
) {
    let guard = lock(map);
    let mut entries: Vec<_> = guard.iter().collect();
    entries.sort_by(|(left_key, _), (right_key, _)| {
        left_key
            .method
            .cmp(&right_key.method)
            .then_with(|| left_key.endpoint.cmp(&right_key.endpoint))
    });

    for (key, value) in entries {
        output.push_str(&format!(
            "{metric_name}{{method=\"{}\",endpoint=\"{}\"}} {value}\n",
            escape_label_value(&key.method),
            escape_label_value(&key.endpoint),
        ));
    }
}

fn append_command_lines(output: &mut String, map: &Mutex<HashMap<String, u64>>) {
    let guard = lock(map);
    let mut entries: Vec<_> = guard.iter().collect();
    entries.sort_by(|(left, _), (right, _)| left.cmp(right));

    for (command, value) in entries {
        output.push_str(&format!(
            "relay_stomp_frames_total{{command=\"{}\"}} {value}\n",
            escape_label_value(command),
        ));
    }
}

fn append_scalar(output: &mut String, name: &str, help: &str, kind: &str, value: u64) {
    output.push_str(&format!("# HELP {name} {help}\n# TYPE {name} {kind}\n{name} {value}\n"));
}

fn escape_label_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\n', "\\n").replace('"', "\\\"")
}
