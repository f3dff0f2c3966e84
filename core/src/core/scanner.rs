use futures::{stream, StreamExt};
use log::{debug, info, warn};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::core::request::{Parameter, RequestDescriptor};
use crate::core::result_aggregator::{ResultAggregator, ScanFinding};
use crate::core::Certainty;
use crate::render::{RenderRequest, RenderServiceRef, RenderedPage};
use crate::utils::payloads::PayloadCatalog;
use crate::utils::TriggerFactory;
use crate::SinkRef;

/// Upper bound on attacks in flight, whatever the caller asks for.
pub const MAX_CONCURRENCY: usize = 256;

/// One payload applied to one parameter, ready to send.
#[derive(Debug, Clone)]
pub struct Attack {
    /// Position in planning order; findings are reported in this order.
    pub sequence: usize,
    pub parameter: Parameter,
    pub payload_id: u32,
    pub trigger: String,
    pub attack: String,
    pub request: RenderRequest,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub findings: Vec<ScanFinding>,
    pub attacks_sent: usize,
    pub failed_attacks: usize,
}

/// Builds every attack for the reflected parameters of `descriptor`.
///
/// A payload is applied to a given parameter at most once, even when it
/// matches several of that parameter's contexts. Each attack gets its own
/// numeric trigger.
pub fn plan_attacks(
    descriptor: &RequestDescriptor,
    catalog: &PayloadCatalog,
    factory: &mut TriggerFactory,
    headers: &BTreeMap<String, String>,
    cookies: &BTreeMap<String, String>,
) -> Vec<Attack> {
    let mut attacks = Vec::new();

    for target in &descriptor.params_reflected {
        let mut applied: HashSet<u32> = HashSet::new();

        for context in &target.reflected_contexts {
            for payload in catalog.payloads_for(*context) {
                if !applied.insert(payload.id) {
                    continue;
                }

                let trigger = factory.next_xss_trigger();
                let attack = payload.attack(&trigger);

                let (url, body) = descriptor.reconstruct(|p| {
                    if p.position == target.position {
                        attack.clone()
                    } else {
                        p.value.clone()
                    }
                });

                let request = RenderRequest::new(descriptor.request_type, url, body)
                    .with_headers(headers)
                    .with_cookies(cookies);

                attacks.push(Attack {
                    sequence: attacks.len(),
                    parameter: target.clone(),
                    payload_id: payload.id,
                    trigger,
                    attack,
                    request,
                });
            }
        }
    }

    attacks
}

/// Looks for an attack's trigger in the rendered page's side effects.
///
/// Alerts are direct proof of execution. Errors and console output only
/// suggest it. Every matching entry yields its own finding.
pub fn verify_attack(page: &RenderedPage, attack: &Attack) -> Vec<ScanFinding> {
    let trigger = attack.trigger.as_str();
    let evidence = [
        (Certainty::Certain, "alert", &page.alerts),
        (Certainty::Probable, "execution error", &page.errors),
        (Certainty::Probable, "console message", &page.console_messages),
    ];

    evidence
        .iter()
        .flat_map(|(certainty, source, entries)| {
            entries
                .iter()
                .filter(move |entry| entry.contains(trigger))
                .map(move |entry| ScanFinding {
                    certainty: *certainty,
                    message: format!("Indicated via {}: \"{}\"", source, entry),
                    parameter: attack.parameter.name.clone(),
                    delivery: attack.parameter.delivery,
                    attack: attack.attack.clone(),
                })
        })
        .collect()
}

/// Sends context-matched payloads through the render service and collects
/// execution evidence.
pub struct XssScanner {
    render: RenderServiceRef,
    catalog: Arc<PayloadCatalog>,
    sink: SinkRef,
    concurrency: usize,
    headers: BTreeMap<String, String>,
    cookies: BTreeMap<String, String>,
}

impl XssScanner {
    pub fn new(render: RenderServiceRef, catalog: Arc<PayloadCatalog>, sink: SinkRef) -> Self {
        Self {
            render,
            catalog,
            sink,
            concurrency: 1,
            headers: BTreeMap::new(),
            cookies: BTreeMap::new(),
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.clamp(1, MAX_CONCURRENCY);
        self
    }

    pub fn with_headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_cookies(mut self, cookies: BTreeMap<String, String>) -> Self {
        self.cookies = cookies;
        self
    }

    pub fn plan(&self, descriptor: &RequestDescriptor, factory: &mut TriggerFactory) -> Vec<Attack> {
        plan_attacks(descriptor, &self.catalog, factory, &self.headers, &self.cookies)
    }

    /// Runs every planned attack with at most `concurrency` in flight.
    ///
    /// A failed render skips that attack only.
    pub async fn run(&self, descriptor: &RequestDescriptor, factory: &mut TriggerFactory) -> ScanSummary {
        let attacks = self.plan(descriptor, factory);
        let total = attacks.len();

        if total == 0 {
            info!("No payloads apply to the reflected contexts, nothing to verify");
            self.sink.on_log("info", "[*] No applicable payloads for the reflected contexts.");
            return ScanSummary::default();
        }

        info!(
            "Verifying {} attack(s) across {} parameter(s) with concurrency {}",
            total,
            descriptor.params_reflected.len(),
            self.concurrency
        );
        self.sink.on_progress("Verifying XSS payloads", 0, total);

        let (tx, rx) = mpsc::channel::<(usize, ScanFinding)>(self.concurrency.saturating_mul(4));
        let render = Arc::clone(&self.render);
        let sink = Arc::clone(&self.sink);
        let concurrency = self.concurrency;

        let workers = async move {
            let failed = stream::iter(attacks)
                .map(|attack| {
                    let render = Arc::clone(&render);
                    async move {
                        debug!(
                            "Attack #{} payload {} on {}: {}",
                            attack.sequence, attack.payload_id, attack.parameter.name, attack.attack
                        );
                        let outcome = render.render(&attack.request).await;
                        (attack, outcome)
                    }
                })
                .buffer_unordered(concurrency)
                .fold(0usize, |failed, (attack, outcome)| {
                    let tx = tx.clone();
                    let sink = Arc::clone(&sink);
                    async move {
                        match outcome {
                            Ok(page) => {
                                for finding in verify_attack(&page, &attack) {
                                    if tx.send((attack.sequence, finding)).await.is_err() {
                                        break;
                                    }
                                }
                                failed
                            }
                            Err(e) => {
                                warn!(
                                    "Render failed for payload {} on parameter {}: {}",
                                    attack.payload_id, attack.parameter.name, e
                                );
                                sink.on_log(
                                    "warn",
                                    &format!(
                                        "[!] Skipping payload {} on '{}': {}",
                                        attack.payload_id, attack.parameter.name, e
                                    ),
                                );
                                failed + 1
                            }
                        }
                    }
                })
                .await;
            drop(tx);
            failed
        };

        let (failed_attacks, findings) =
            tokio::join!(workers, ResultAggregator::run(rx, Arc::clone(&self.sink)));

        self.sink.on_progress("Verifying XSS payloads", total, total);
        info!(
            "XSS verification done: {} finding(s), {} of {} attack(s) failed",
            findings.len(),
            failed_attacks,
            total
        );

        ScanSummary {
            findings,
            attacks_sent: total,
            failed_attacks,
        }
    }
}
