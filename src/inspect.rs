//! Summary and filtering of exported flows.

use flowtap_flow_store::FlowRecord;
use serde::Serialize;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowSummary {
    pub total: usize,
    /// Network records with status >= 400.
    pub failed: usize,
    /// Mean over records with a non-zero duration, rounded to whole milliseconds.
    pub avg_duration_ms: u64,
}

impl FlowSummary {
    pub fn of(records: &[FlowRecord]) -> Self {
        let network = records.iter().filter_map(FlowRecord::as_network);
        let mut failed = 0usize;
        let mut timed = 0u64;
        let mut duration_sum = 0u64;
        for record in network {
            if record.is_failure() {
                failed += 1;
            }
            if record.duration_ms > 0 {
                timed += 1;
                duration_sum += record.duration_ms;
            }
        }
        let avg_duration_ms = if timed == 0 {
            0
        } else {
            (duration_sum as f64 / timed as f64).round() as u64
        };
        Self {
            total: records.len(),
            failed,
            avg_duration_ms,
        }
    }
}

/// Viewer-style filter. UI records pass unless a method or status filter is set.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FlowFilter {
    /// Case-insensitive substring of the request URL.
    pub url: Option<String>,
    pub method: Option<String>,
    /// Compared against the response status as text.
    pub status: Option<String>,
}

impl FlowFilter {
    pub fn new(url: Option<String>, method: Option<String>, status: Option<String>) -> Self {
        let clean = |value: Option<String>| {
            value
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        Self {
            url: clean(url).map(|value| value.to_lowercase()),
            method: clean(method),
            status: clean(status),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.url.is_none() && self.method.is_none() && self.status.is_none()
    }

    pub fn matches(&self, record: &FlowRecord) -> bool {
        let Some(record) = record.as_network() else {
            return self.method.is_none() && self.status.is_none();
        };
        if let Some(query) = &self.url {
            if !record.request.url.to_lowercase().contains(query.as_str()) {
                return false;
            }
        }
        if let Some(method) = &self.method {
            if &record.request.method != method {
                return false;
            }
        }
        if let Some(status) = &self.status {
            let actual = record
                .status()
                .map(|status| status.to_string())
                .unwrap_or_default();
            if &actual != status {
                return false;
            }
        }
        true
    }

    pub fn apply<'a>(&self, records: &'a [FlowRecord]) -> Vec<&'a FlowRecord> {
        records.iter().filter(|record| self.matches(record)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use flowtap_flow_store::{
        BodyEncoding, InitialScreenRecord, NetworkRecord, RequestMeta, ResponseMeta,
    };

    fn network(step: u64, method: &str, url: &str, status: Option<i64>, duration_ms: u64) -> FlowRecord {
        FlowRecord::Network(NetworkRecord {
            step,
            request: RequestMeta {
                url: url.into(),
                method: method.into(),
                post_data: None,
                headers: None,
            },
            page_url: None,
            response: status.map(|status| ResponseMeta {
                status,
                headers: None,
                mime_type: None,
            }),
            body: None,
            body_encoding: BodyEncoding::Text,
            error_text: None,
            duration_ms,
            timestamp: Utc::now(),
            screenshot: None,
        })
    }

    fn initial_screen() -> FlowRecord {
        FlowRecord::InitialScreen(InitialScreenRecord {
            step: 1,
            route: "https://shop/".into(),
            timestamp: Utc::now(),
            screenshot: None,
        })
    }

    fn sample() -> Vec<FlowRecord> {
        vec![
            initial_screen(),
            network(1, "GET", "https://shop/api/Cart", Some(200), 10),
            network(2, "POST", "https://shop/api/order", Some(500), 0),
            network(3, "GET", "https://shop/api/user", None, 25),
        ]
    }

    #[test]
    fn summary_counts_failures_and_averages_timed_records() {
        let summary = FlowSummary::of(&sample());
        assert_eq!(summary.total, 4);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.avg_duration_ms, 18);
    }

    #[test]
    fn summary_of_empty_flow_is_zero() {
        assert_eq!(FlowSummary::of(&[]), FlowSummary::default());
    }

    #[test]
    fn url_filter_is_case_insensitive_and_keeps_ui_records() {
        let records = sample();
        let filter = FlowFilter::new(Some("CART".into()), None, None);
        let matched = filter.apply(&records);
        assert_eq!(matched.len(), 2);
        assert!(matched[0].is_ui());
    }

    #[test]
    fn method_or_status_filter_hides_ui_records() {
        let records = sample();
        let by_method = FlowFilter::new(None, Some("GET".into()), None);
        assert_eq!(by_method.apply(&records).len(), 2);

        let by_status = FlowFilter::new(None, None, Some("500".into()));
        let matched = by_status.apply(&records);
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].as_network().map(|record| record.step), Some(2));
    }

    #[test]
    fn blank_filters_are_ignored() {
        let filter = FlowFilter::new(Some("  ".into()), Some(String::new()), None);
        assert!(filter.is_empty());
        assert_eq!(filter.apply(&sample()).len(), 4);
    }
}
