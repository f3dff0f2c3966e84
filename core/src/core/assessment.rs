use log::info;
use std::sync::Arc;

use crate::config::AssessmentConfig;
use crate::core::probe::probe_request;
use crate::core::reflection::ReflectionChecker;
use crate::core::request::validate_request;
use crate::core::result_aggregator::{AssessmentReport, ReflectionCheck, ResultAggregator};
use crate::core::scanner::XssScanner;
use crate::error::Result;
use crate::render::{PhantomRenderClient, RenderServiceRef};
use crate::utils::payloads::PayloadCatalog;
use crate::utils::TriggerFactory;
use crate::SinkRef;

/// Which phases an assessment runs, selected by `do_reflect` / `do_xss`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssessmentMode {
    /// Extraction only; a legal no-op.
    ExtractOnly,
    ReflectOnly,
    /// Reflection check, then verification of the reflected parameters.
    ReflectAndScan,
    /// Every parameter is attacked with the whole catalog.
    ScanOnly,
}

impl AssessmentMode {
    pub fn from_flags(do_reflect: bool, do_xss: bool) -> Self {
        match (do_reflect, do_xss) {
            (false, false) => AssessmentMode::ExtractOnly,
            (true, false) => AssessmentMode::ReflectOnly,
            (true, true) => AssessmentMode::ReflectAndScan,
            (false, true) => AssessmentMode::ScanOnly,
        }
    }
}

/// Runs one assessment of one request from validation to report.
pub struct XssMap {
    config: AssessmentConfig,
    render: RenderServiceRef,
    catalog: Arc<PayloadCatalog>,
    sink: SinkRef,
}

impl XssMap {
    pub fn new(config: AssessmentConfig, render: RenderServiceRef, sink: SinkRef) -> Self {
        Self {
            config,
            render,
            catalog: Arc::new(PayloadCatalog::builtin()),
            sink,
        }
    }

    /// Builds an assessment backed by the HTTP render client at
    /// `config.render_address`.
    pub fn from_config(config: AssessmentConfig, sink: SinkRef) -> Result<Self> {
        let client = PhantomRenderClient::new(&config.render_address, config.render_timeout)?;
        Ok(Self::new(config, Arc::new(client), sink))
    }

    pub fn mode(&self) -> AssessmentMode {
        AssessmentMode::from_flags(self.config.do_reflect, self.config.do_xss)
    }

    pub async fn run(&self) -> Result<AssessmentReport> {
        let config = &self.config;
        config.check()?;
        validate_request(config.request_type, &config.request_url, config.request_body.as_deref())?;

        let descriptor = probe_request(
            config.request_type,
            &config.request_url,
            config.request_body.as_deref(),
        );
        let mode = self.mode();

        info!(
            "Assessing {} {} ({} parameter(s), mode {:?})",
            descriptor.request_type,
            descriptor.root_url,
            descriptor.param_count(),
            mode
        );

        let mut report = AssessmentReport::new(descriptor.request_type, &descriptor.root_url);
        let mut factory = TriggerFactory::new();

        if mode == AssessmentMode::ExtractOnly {
            self.sink.on_log(
                "info",
                "[*] Reflection and XSS checks both disabled, reporting extracted parameters only.",
            );
            report.results.reflection_check = Some(ReflectionCheck::from(&descriptor));
            return Ok(report);
        }

        self.render.ensure_available().await?;

        let to_scan = if mode == AssessmentMode::ScanOnly {
            descriptor.into_wildcard()
        } else {
            self.sink.on_progress("Checking parameter reflection", 0, 0);
            let checked = ReflectionChecker::new(Arc::clone(&self.render))
                .with_headers(config.headers.clone())
                .with_cookies(config.cookies.clone())
                .run(descriptor, &mut factory)
                .await?;

            report.results.reflection_check = Some(ReflectionCheck::from(&checked));
            for param in &checked.params_reflected {
                let contexts: Vec<&str> = param.reflected_contexts.iter().map(|c| c.as_str()).collect();
                self.sink.on_log(
                    "success",
                    &format!(
                        "[+] Parameter '{}' ({}) reflected in: {}",
                        param.name,
                        param.delivery,
                        contexts.join(", ")
                    ),
                );
            }

            if mode == AssessmentMode::ReflectOnly {
                return Ok(report);
            }
            if checked.params_reflected.is_empty() {
                self.sink
                    .on_log("info", "[*] No reflected parameters, skipping XSS verification.");
                return Ok(report);
            }
            checked
        };

        let summary = XssScanner::new(
            Arc::clone(&self.render),
            Arc::clone(&self.catalog),
            Arc::clone(&self.sink),
        )
        .with_concurrency(config.effective_concurrency())
        .with_headers(config.headers.clone())
        .with_cookies(config.cookies.clone())
        .run(&to_scan, &mut factory)
        .await;

        if summary.failed_attacks > 0 {
            self.sink.on_log(
                "warn",
                &format!(
                    "[!] {} of {} attack(s) could not be rendered",
                    summary.failed_attacks, summary.attacks_sent
                ),
            );
        }
        ResultAggregator::report_summary(&summary.findings, &self.sink);

        report.results.xss_scan = Some(summary.findings);
        Ok(report)
    }
}
