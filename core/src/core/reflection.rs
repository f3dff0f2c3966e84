//! Reflection checking: probe every parameter with a unique trigger, render
//! the page once, and classify where each trigger came back.

use log::{debug, info};
use regex::Regex;
use scraper::node::Node;
use scraper::Html;
use std::collections::{BTreeMap, BTreeSet};

use crate::core::request::RequestDescriptor;
use crate::core::ContextKind;
use crate::error::{Result, XssMapError};
use crate::render::{RenderRequest, RenderServiceRef, RenderedPage};
use crate::utils::TriggerFactory;

/// DOM event-handler attributes whose values execute as script.
pub const EVENT_HANDLER_ATTRIBUTES: &[&str] = &[
    // mouse
    "onclick", "oncontextmenu", "ondblclick", "onmousedown", "onmouseenter", "onmouseleave",
    "onmousemove", "onmouseover", "onmouseout", "onmouseup", "onmousewheel", "onwheel",
    // keyboard
    "onkeydown", "onkeypress", "onkeyup",
    // window / frame / history
    "onabort", "onbeforeunload", "onerror", "onhashchange", "onload", "onpageshow",
    "onpagehide", "onresize", "onscroll", "onunload", "onafterprint", "onbeforeprint",
    "onpopstate", "onstorage", "ononline", "onoffline", "onmessage", "onopen", "onshow",
    "ontoggle",
    // form
    "onblur", "onchange", "onfocus", "onfocusin", "onfocusout", "oninput", "oninvalid",
    "onreset", "onsearch", "onselect", "onsubmit",
    // drag and drop
    "ondrag", "ondragend", "ondragenter", "ondragleave", "ondragover", "ondragstart", "ondrop",
    // clipboard
    "oncopy", "oncut", "onpaste",
    // media
    "oncanplay", "oncanplaythrough", "ondurationchange", "onemptied", "onended",
    "onloadeddata", "onloadedmetadata", "onloadstart", "onpause", "onplay", "onplaying",
    "onprogress", "onratechange", "onseeked", "onseeking", "onstalled", "onsuspend",
    "ontimeupdate", "onvolumechange", "onwaiting",
    // touch
    "ontouchcancel", "ontouchend", "ontouchmove", "ontouchstart",
];

pub fn is_event_handler(attribute: &str) -> bool {
    EVENT_HANDLER_ATTRIBUTES
        .iter()
        .any(|h| h.eq_ignore_ascii_case(attribute))
}

/// One context kind and how many times the trigger matched it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextMatch {
    pub kind: ContextKind,
    pub count: usize,
}

/// Every context a single trigger was found in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerReport {
    pub trigger: String,
    pub contexts: Vec<ContextMatch>,
}

impl TriggerReport {
    pub fn kinds(&self) -> BTreeSet<ContextKind> {
        self.contexts.iter().map(|c| c.kind).collect()
    }
}

#[derive(Default)]
struct ContextCounter {
    counts: BTreeMap<ContextKind, usize>,
}

impl ContextCounter {
    fn add(&mut self, kind: ContextKind, n: usize) {
        if n > 0 {
            *self.counts.entry(kind).or_insert(0) += n;
        }
    }

    fn hit(&mut self, kind: ContextKind, matched: bool) {
        self.add(kind, usize::from(matched));
    }

    fn into_matches(self) -> Vec<ContextMatch> {
        self.counts
            .into_iter()
            .map(|(kind, count)| ContextMatch { kind, count })
            .collect()
    }
}

/// Counts quoted JS string literals in `script` that contain `trigger`.
///
/// Returns `(single_quoted, double_quoted)`. Quotes may be escaped with a
/// backslash inside the literal.
pub fn count_js_string_literals(script: &str, trigger: &str) -> (usize, usize) {
    let escaped = regex::escape(trigger);
    let single = format!(r#"'(?:[^'\\]|\\.)*{}(?:[^'\\]|\\.)*'"#, escaped);
    let double = format!(r#""(?:[^"\\]|\\.)*{}(?:[^"\\]|\\.)*""#, escaped);

    let count = |pattern: &str| match Regex::new(pattern) {
        Ok(re) => re.find_iter(script).count(),
        Err(e) => {
            debug!("Skipping JS literal scan for trigger {}: {}", trigger, e);
            0
        }
    };

    (count(&single), count(&double))
}

/// Classifies where `trigger` appears in an already-parsed document.
fn analyze_trigger(document: &Html, page: &RenderedPage, trigger: &str) -> Vec<ContextMatch> {
    let lowered = trigger.to_ascii_lowercase();
    let mut counter = ContextCounter::default();
    let mut sq_total = 0;
    let mut dq_total = 0;

    for node in document.tree.nodes() {
        let element = match node.value().as_element() {
            Some(el) => el,
            None => continue,
        };
        let name = element.name();

        counter.hit(ContextKind::NodeName, name.starts_with(&lowered));

        let mut attr_name = false;
        let mut any_value = false;
        let mut id_value = false;
        let mut class_value = false;
        let mut style_value = false;
        let mut on_value = false;

        for (attr, value) in element.attrs() {
            if attr.eq_ignore_ascii_case(trigger) {
                attr_name = true;
            }
            if value.contains(trigger) {
                any_value = true;
                match attr {
                    "id" => id_value = true,
                    "class" => class_value = true,
                    "style" => style_value = true,
                    a if is_event_handler(a) => on_value = true,
                    _ => {}
                }
            }
        }

        counter.hit(ContextKind::AttributeName, attr_name);
        counter.hit(ContextKind::AttributeValue, any_value);
        counter.hit(ContextKind::IdAttrib, id_value);
        counter.hit(ContextKind::ClassAttrib, class_value);
        counter.hit(ContextKind::StyleAttrib, style_value);
        counter.hit(ContextKind::OnAttrib, on_value);

        let text: String = node
            .children()
            .filter_map(|child| child.value().as_text().map(|t| &**t))
            .collect();
        let in_text = text.contains(trigger);
        counter.hit(ContextKind::Text, in_text);

        let in_comment = node.children().any(|child| match child.value() {
            Node::Comment(comment) => comment.contains(trigger),
            _ => false,
        });
        counter.hit(ContextKind::Comment, in_comment);

        if in_text && name == "style" {
            counter.hit(ContextKind::Style, true);
        }

        if in_text && name == "script" {
            counter.hit(ContextKind::JsNode, true);
            let (sq, dq) = count_js_string_literals(&text, trigger);
            sq_total += sq;
            dq_total += dq;
        }
    }

    counter.add(ContextKind::JsSingleQuote, sq_total);
    counter.add(ContextKind::JsDoubleQuote, dq_total);

    let side_channel = |entries: &[String]| entries.iter().filter(|e| e.contains(trigger)).count();
    counter.add(ContextKind::JsError, side_channel(&page.errors));
    counter.add(ContextKind::JsConsole, side_channel(&page.console_messages));
    counter.add(ContextKind::JsPrompt, side_channel(&page.prompts));
    counter.add(ContextKind::JsConfirm, side_channel(&page.confirms));

    counter.into_matches()
}

/// Runs every context query for every trigger.
///
/// Only triggers with at least one matching context are reported, in the
/// order they were given.
pub fn analyze_rendered_page(page: &RenderedPage, triggers: &[&str]) -> Vec<TriggerReport> {
    let document = Html::parse_document(&page.html);

    triggers
        .iter()
        .map(|trigger| TriggerReport {
            trigger: trigger.to_string(),
            contexts: analyze_trigger(&document, page, trigger),
        })
        .filter(|report| !report.contexts.is_empty())
        .collect()
}

/// Moves every parameter named by a report from `params_other` into
/// `params_reflected`, recording the union of its contexts.
///
/// The reflected set is computed first and both collections are rebuilt in
/// one pass. A report whose trigger matches no parameter, or more than one,
/// is a correlation failure.
pub fn apply_reflections(
    descriptor: RequestDescriptor,
    reports: &[TriggerReport],
) -> Result<RequestDescriptor> {
    let mut reflected: BTreeMap<usize, BTreeSet<ContextKind>> = BTreeMap::new();

    for report in reports.iter().filter(|r| !r.contexts.is_empty()) {
        let owners: Vec<usize> = descriptor
            .params_other
            .iter()
            .enumerate()
            .filter(|(_, p)| p.trigger.as_deref() == Some(report.trigger.as_str()))
            .map(|(idx, _)| idx)
            .collect();

        match owners.as_slice() {
            [idx] => reflected.entry(*idx).or_default().extend(report.kinds()),
            [] => {
                return Err(XssMapError::Correlation {
                    trigger: report.trigger.clone(),
                    reason: "no unreflected parameter carries this trigger".to_string(),
                })
            }
            many => {
                return Err(XssMapError::Correlation {
                    trigger: report.trigger.clone(),
                    reason: format!("trigger is shared by {} parameters", many.len()),
                })
            }
        }
    }

    let RequestDescriptor {
        request_type,
        root_url,
        body,
        params_other,
        mut params_reflected,
    } = descriptor;

    let mut still_other = Vec::with_capacity(params_other.len());
    for (idx, mut param) in params_other.into_iter().enumerate() {
        match reflected.remove(&idx) {
            Some(contexts) => {
                param.reflected_contexts.extend(contexts);
                params_reflected.push(param);
            }
            None => still_other.push(param),
        }
    }

    Ok(RequestDescriptor {
        request_type,
        root_url,
        body,
        params_other: still_other,
        params_reflected,
    })
}

/// Single-pass, stateless classification of a rendered probe page using the
/// triggers already assigned to `params_other`.
pub fn classify(descriptor: RequestDescriptor, page: &RenderedPage) -> Result<RequestDescriptor> {
    let triggers: Vec<String> = descriptor
        .params_other
        .iter()
        .filter_map(|p| p.trigger.clone())
        .collect();
    let trigger_refs: Vec<&str> = triggers.iter().map(String::as_str).collect();

    let reports = analyze_rendered_page(page, &trigger_refs);
    for report in &reports {
        debug!(
            "Trigger {} reflected in: {}",
            report.trigger,
            report
                .contexts
                .iter()
                .map(|c| format!("{}x{}", c.kind, c.count))
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    apply_reflections(descriptor, &reports)
}

/// Gives every unreflected parameter without a trigger a fresh alphabetic
/// one. Triggers already present are kept and reserved.
pub fn assign_triggers(descriptor: &mut RequestDescriptor, factory: &mut TriggerFactory) {
    for trigger in descriptor.params_other.iter().filter_map(|p| p.trigger.as_deref()) {
        factory.reserve(trigger);
    }
    for param in descriptor.params_other.iter_mut().filter(|p| p.trigger.is_none()) {
        param.trigger = Some(factory.next_reflect_trigger());
    }
}

/// Builds the probe request: each triggered parameter carries its trigger
/// as its value, everything else keeps its current value.
pub fn build_probe_request(descriptor: &RequestDescriptor) -> RenderRequest {
    let (url, body) = descriptor.reconstruct(|p| match (&p.trigger, p.reflected_contexts.is_empty()) {
        (Some(trigger), true) => trigger.clone(),
        _ => p.value.clone(),
    });
    RenderRequest::new(descriptor.request_type, url, body)
}

/// Drives one reflection check against the render service.
pub struct ReflectionChecker {
    render: RenderServiceRef,
    headers: BTreeMap<String, String>,
    cookies: BTreeMap<String, String>,
}

impl ReflectionChecker {
    pub fn new(render: RenderServiceRef) -> Self {
        Self {
            render,
            headers: BTreeMap::new(),
            cookies: BTreeMap::new(),
        }
    }

    pub fn with_headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_cookies(mut self, cookies: BTreeMap<String, String>) -> Self {
        self.cookies = cookies;
        self
    }

    pub async fn run(
        &self,
        mut descriptor: RequestDescriptor,
        factory: &mut TriggerFactory,
    ) -> Result<RequestDescriptor> {
        if descriptor.params_other.is_empty() {
            info!("No parameters to probe for reflection");
            return Ok(descriptor);
        }

        assign_triggers(&mut descriptor, factory);

        let request = build_probe_request(&descriptor)
            .with_headers(&self.headers)
            .with_cookies(&self.cookies);

        info!(
            "Probing {} parameter(s) for reflection via {} {}",
            descriptor.params_other.len(),
            request.method,
            request.url
        );

        let page = self.render.render(&request).await?;
        let classified = classify(descriptor, &page)?;

        info!(
            "Reflection check done: {} reflected, {} not reflected",
            classified.params_reflected.len(),
            classified.params_other.len()
        );

        Ok(classified)
    }
}
