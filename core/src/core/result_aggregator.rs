use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::sync::mpsc;

use crate::core::request::{Parameter, RequestDescriptor};
use crate::core::{Certainty, Delivery, RequestType};
use crate::error::Result;
use crate::SinkRef;

/// Evidence that one attack string executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanFinding {
    pub certainty: Certainty,
    pub message: String,
    pub parameter: String,
    pub delivery: Delivery,
    pub attack: String,
}

/// Outcome of the reflection check: every parameter, split by whether it
/// came back in the rendered page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReflectionCheck {
    pub params_reflected: Vec<Parameter>,
    pub params_other: Vec<Parameter>,
}

impl From<&RequestDescriptor> for ReflectionCheck {
    fn from(descriptor: &RequestDescriptor) -> Self {
        Self {
            params_reflected: descriptor.params_reflected.clone(),
            params_other: descriptor.params_other.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AssessmentResults {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reflection_check: Option<ReflectionCheck>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xss_scan: Option<Vec<ScanFinding>>,
}

/// The JSON document written at the end of an assessment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssessmentReport {
    pub request_url_root: String,
    pub request_type: RequestType,
    pub results: AssessmentResults,
}

impl AssessmentReport {
    pub fn new(request_type: RequestType, request_url_root: &str) -> Self {
        Self {
            request_url_root: request_url_root.to_string(),
            request_type,
            results: AssessmentResults::default(),
        }
    }

    pub fn findings(&self) -> &[ScanFinding] {
        self.results.xss_scan.as_deref().unwrap_or(&[])
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

/// `XssMap_Results_<YYYYmmdd-HHMMSS>.json`, stamped with local time.
pub fn default_output_filename() -> String {
    chrono::Local::now()
        .format("XssMap_Results_%Y%m%d-%H%M%S.json")
        .to_string()
}

/// Collects findings from concurrent attack workers and reports them.
pub struct ResultAggregator;

impl ResultAggregator {
    /// Drains `receiver` until every sender is dropped.
    ///
    /// Each finding arrives tagged with the sequence number of the attack
    /// that produced it; the returned list is ordered by that number so the
    /// output does not depend on completion order.
    pub async fn run(
        mut receiver: mpsc::Receiver<(usize, ScanFinding)>,
        sink: SinkRef,
    ) -> Vec<ScanFinding> {
        let mut tagged = Vec::new();

        while let Some((seq, finding)) = receiver.recv().await {
            sink.on_finding(&finding);
            tagged.push((seq, finding));
        }

        // stable, so evidence order within one attack is kept
        tagged.sort_by_key(|(seq, _)| *seq);
        tagged.into_iter().map(|(_, finding)| finding).collect()
    }

    pub fn report_summary(findings: &[ScanFinding], sink: &SinkRef) {
        if findings.is_empty() {
            sink.on_log("success", "[+] No XSS findings.");
            return;
        }

        let certain = findings
            .iter()
            .filter(|f| f.certainty == Certainty::Certain)
            .count();
        sink.on_log(
            "warn",
            &format!(
                "[+] {} finding(s) discovered ({} certain, {} probable)",
                findings.len(),
                certain,
                findings.len() - certain
            ),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::probe::probe_get_request;
    use crate::{AssessmentEventSink, SilentSink};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct RecordingSink {
        logs: Mutex<Vec<String>>,
        findings: Mutex<usize>,
    }

    impl AssessmentEventSink for RecordingSink {
        fn on_log(&self, _level: &str, message: &str) {
            self.logs.lock().unwrap().push(message.to_string());
        }
        fn on_finding(&self, _finding: &ScanFinding) {
            *self.findings.lock().unwrap() += 1;
        }
        fn on_progress(&self, _phase: &str, _current: usize, _total: usize) {}
    }

    fn finding(certainty: Certainty, parameter: &str) -> ScanFinding {
        ScanFinding {
            certainty,
            message: "Indicated via alert: \"1\"".to_string(),
            parameter: parameter.to_string(),
            delivery: Delivery::Url,
            attack: "alert(1)".to_string(),
        }
    }

    #[test]
    fn test_report_omits_phases_that_did_not_run() {
        let report = AssessmentReport::new(RequestType::Get, "http://site/x");
        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["request_url_root"], "http://site/x");
        assert_eq!(json["request_type"], "GET");
        assert_eq!(json["results"], serde_json::json!({}));
    }

    #[test]
    fn test_report_serializes_reflection_and_findings() {
        let descriptor = probe_get_request("http://site/x?a=1&b=2");
        let mut report = AssessmentReport::new(RequestType::Get, &descriptor.root_url);
        report.results.reflection_check = Some(ReflectionCheck::from(&descriptor));
        report.results.xss_scan = Some(vec![finding(Certainty::Certain, "a")]);

        let json = serde_json::to_value(&report).unwrap();
        let other = &json["results"]["reflection_check"]["params_other"];
        assert_eq!(other.as_array().unwrap().len(), 2);
        assert_eq!(other[0]["name"], "a");
        assert_eq!(
            json["results"]["xss_scan"][0],
            serde_json::json!({
                "certainty": "CERTAIN",
                "message": "Indicated via alert: \"1\"",
                "parameter": "a",
                "delivery": "url",
                "attack": "alert(1)",
            })
        );
    }

    #[test]
    fn test_write_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        let report = AssessmentReport::new(RequestType::Post, "http://s/f");
        report.write_to(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"request_type\": \"POST\""));
    }

    #[test]
    fn test_default_output_filename_shape() {
        let name = default_output_filename();
        assert!(name.starts_with("XssMap_Results_"));
        assert!(name.ends_with(".json"));
        assert_eq!(name.len(), "XssMap_Results_20240101-120000.json".len());
    }

    #[tokio::test]
    async fn test_aggregator_orders_by_sequence() {
        let (tx, rx) = mpsc::channel(8);
        tx.send((2, finding(Certainty::Probable, "c"))).await.unwrap();
        tx.send((0, finding(Certainty::Certain, "a"))).await.unwrap();
        tx.send((1, finding(Certainty::Certain, "b"))).await.unwrap();
        drop(tx);

        let findings = ResultAggregator::run(rx, SilentSink::new_ref()).await;
        let names: Vec<&str> = findings.iter().map(|f| f.parameter.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_each_finding_is_shown_once() {
        let recorder = Arc::new(RecordingSink::default());
        let sink: SinkRef = recorder.clone();

        let (tx, rx) = mpsc::channel(4);
        tx.send((0, finding(Certainty::Certain, "a"))).await.unwrap();
        tx.send((1, finding(Certainty::Probable, "b"))).await.unwrap();
        drop(tx);

        let findings = ResultAggregator::run(rx, Arc::clone(&sink)).await;
        ResultAggregator::report_summary(&findings, &sink);

        assert_eq!(*recorder.findings.lock().unwrap(), 2);
        let logs = recorder.logs.lock().unwrap();
        assert_eq!(*logs, vec!["[+] 2 finding(s) discovered (1 certain, 1 probable)".to_string()]);
    }
}
