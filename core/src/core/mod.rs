pub mod assessment;
pub mod probe;
pub mod reflection;
pub mod request;
pub mod result_aggregator;
pub mod scanner;

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::XssMapError;

/// Structural or script location in which a trigger was observed.
///
/// Declaration order is the order in which the reflection checker runs its
/// queries, so a `BTreeSet<ContextKind>` iterates in detection order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ContextKind {
    #[serde(rename = "nodename")]
    NodeName,
    #[serde(rename = "attributename")]
    AttributeName,
    #[serde(rename = "attributevalue")]
    AttributeValue,
    #[serde(rename = "text")]
    Text,
    #[serde(rename = "comment")]
    Comment,
    #[serde(rename = "style")]
    Style,
    #[serde(rename = "idattrib")]
    IdAttrib,
    #[serde(rename = "classattrib")]
    ClassAttrib,
    #[serde(rename = "styleattrib")]
    StyleAttrib,
    #[serde(rename = "jsnode")]
    JsNode,
    #[serde(rename = "jssinglequote")]
    JsSingleQuote,
    #[serde(rename = "jsdoublequote")]
    JsDoubleQuote,
    #[serde(rename = "onattrib")]
    OnAttrib,
    #[serde(rename = "js_error")]
    JsError,
    #[serde(rename = "js_console")]
    JsConsole,
    #[serde(rename = "js_prompt")]
    JsPrompt,
    #[serde(rename = "js_confirm")]
    JsConfirm,
    /// Wildcard used when reflection checking is skipped; matches every payload.
    #[serde(rename = "general")]
    General,
}

impl ContextKind {
    pub const ALL: [ContextKind; 18] = [
        ContextKind::NodeName,
        ContextKind::AttributeName,
        ContextKind::AttributeValue,
        ContextKind::Text,
        ContextKind::Comment,
        ContextKind::Style,
        ContextKind::IdAttrib,
        ContextKind::ClassAttrib,
        ContextKind::StyleAttrib,
        ContextKind::JsNode,
        ContextKind::JsSingleQuote,
        ContextKind::JsDoubleQuote,
        ContextKind::OnAttrib,
        ContextKind::JsError,
        ContextKind::JsConsole,
        ContextKind::JsPrompt,
        ContextKind::JsConfirm,
        ContextKind::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContextKind::NodeName => "nodename",
            ContextKind::AttributeName => "attributename",
            ContextKind::AttributeValue => "attributevalue",
            ContextKind::Text => "text",
            ContextKind::Comment => "comment",
            ContextKind::Style => "style",
            ContextKind::IdAttrib => "idattrib",
            ContextKind::ClassAttrib => "classattrib",
            ContextKind::StyleAttrib => "styleattrib",
            ContextKind::JsNode => "jsnode",
            ContextKind::JsSingleQuote => "jssinglequote",
            ContextKind::JsDoubleQuote => "jsdoublequote",
            ContextKind::OnAttrib => "onattrib",
            ContextKind::JsError => "js_error",
            ContextKind::JsConsole => "js_console",
            ContextKind::JsPrompt => "js_prompt",
            ContextKind::JsConfirm => "js_confirm",
            ContextKind::General => "general",
        }
    }
}

impl std::fmt::Display for ContextKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContextKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ContextKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown context kind '{}'", s))
    }
}

/// Confidence level attached to an XSS finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Certainty {
    /// The verification call itself fired (`alert`).
    Certain,
    /// Only indirect evidence: an error or console message carried the trigger.
    Probable,
}

impl std::fmt::Display for Certainty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Certainty::Certain => write!(f, "CERTAIN"),
            Certainty::Probable => write!(f, "PROBABLE"),
        }
    }
}

/// Channel through which a parameter reaches the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Delivery {
    Url,
    Body,
}

impl std::fmt::Display for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Delivery::Url => write!(f, "url"),
            Delivery::Body => write!(f, "body"),
        }
    }
}

impl FromStr for Delivery {
    type Err = XssMapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "url" => Ok(Delivery::Url),
            "body" => Ok(Delivery::Body),
            other => Err(XssMapError::UnsupportedDelivery(other.to_string())),
        }
    }
}

/// HTTP method of the request under assessment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RequestType {
    #[default]
    Get,
    Post,
}

impl std::fmt::Display for RequestType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestType::Get => write!(f, "GET"),
            RequestType::Post => write!(f, "POST"),
        }
    }
}

impl FromStr for RequestType {
    type Err = XssMapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(RequestType::Get),
            "POST" => Ok(RequestType::Post),
            _ => Err(XssMapError::UnsupportedMethod(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_kind_round_trips_through_labels() {
        for kind in ContextKind::ALL {
            assert_eq!(kind.as_str().parse::<ContextKind>().unwrap(), kind);
        }
        assert!("nonsense".parse::<ContextKind>().is_err());
    }

    #[test]
    fn test_context_kind_serializes_to_label() {
        let json = serde_json::to_string(&ContextKind::JsSingleQuote).unwrap();
        assert_eq!(json, "\"jssinglequote\"");
        let json = serde_json::to_string(&ContextKind::JsError).unwrap();
        assert_eq!(json, "\"js_error\"");
    }

    #[test]
    fn test_delivery_rejects_unknown_channel() {
        assert_eq!("url".parse::<Delivery>().unwrap(), Delivery::Url);
        assert_eq!("body".parse::<Delivery>().unwrap(), Delivery::Body);
        let err = "header".parse::<Delivery>().unwrap_err();
        assert!(matches!(err, XssMapError::UnsupportedDelivery(ref d) if d == "header"));
    }

    #[test]
    fn test_request_type_parsing() {
        assert_eq!("get".parse::<RequestType>().unwrap(), RequestType::Get);
        assert_eq!("POST".parse::<RequestType>().unwrap(), RequestType::Post);
        let err = "PUT".parse::<RequestType>().unwrap_err();
        assert!(matches!(err, XssMapError::UnsupportedMethod(_)));
    }

    #[test]
    fn test_certainty_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&Certainty::Certain).unwrap(), "\"CERTAIN\"");
        assert_eq!(serde_json::to_string(&Certainty::Probable).unwrap(), "\"PROBABLE\"");
    }
}
