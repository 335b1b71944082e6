//! Model routing: map a free-text message (plus an optional explicit model
//! choice) to exactly one [`ModelId`].
//!
//! The router is a pure function. It never fails: every input string lands in
//! some branch, with Claude as the fall-through for general questions.

pub mod keywords;

use crate::models::{ModelId, ModelSelection};

/// Input to a single routing decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingRequest<'a> {
    pub text: &'a str,
    pub selection: ModelSelection,
}

impl<'a> RoutingRequest<'a> {
    pub fn auto(text: &'a str) -> Self {
        Self {
            text,
            selection: ModelSelection::Auto,
        }
    }
}

/// Outcome of a routing decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutingDecision {
    pub model: ModelId,
}

/// Decide which model should handle a request.
///
/// An explicit non-auto selection always wins, with no validation against the
/// text. Otherwise classification runs in fixed priority order: image intent
/// first (artistic sub-keywords pick NanoBanana, realistic images go to
/// Gemini), then code intent (explain -> Claude, generate -> Copilot,
/// optimize -> DeepSeek, otherwise Claude), then Claude for everything else.
pub fn route(request: &RoutingRequest) -> RoutingDecision {
    if let ModelSelection::Fixed(model) = request.selection {
        return RoutingDecision { model };
    }

    let text = request.text.to_lowercase();

    if keywords::matches_any(&text, keywords::IMAGE) {
        let model = if keywords::matches_any(&text, keywords::ARTISTIC) {
            ModelId::NanoBanana
        } else {
            ModelId::Gemini
        };
        return RoutingDecision { model };
    }

    if keywords::matches_any(&text, keywords::CODE) {
        let model = if keywords::matches_any(&text, keywords::CODE_EXPLAIN) {
            ModelId::Claude
        } else if keywords::matches_any(&text, keywords::CODE_GENERATE) {
            ModelId::Copilot
        } else if keywords::matches_any(&text, keywords::CODE_OPTIMIZE) {
            ModelId::DeepSeek
        } else {
            ModelId::Claude
        };
        return RoutingDecision { model };
    }

    RoutingDecision {
        model: ModelId::Claude,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route_auto(text: &str) -> ModelId {
        route(&RoutingRequest::auto(text)).model
    }

    #[test]
    fn test_realistic_image_request() {
        assert_eq!(
            route_auto("Generate an image of a cyberpunk city"),
            ModelId::Gemini
        );
    }

    #[test]
    fn test_artistic_image_request() {
        assert_eq!(
            route_auto("Create an artistic painting of a forest"),
            ModelId::NanoBanana
        );
    }

    #[test]
    fn test_code_explanation_goes_to_claude() {
        assert_eq!(
            route_auto("Explain why this algorithm is O(n log n)"),
            ModelId::Claude
        );
    }

    #[test]
    fn test_code_generation_goes_to_copilot() {
        assert_eq!(
            route_auto("Write a function to reverse a string"),
            ModelId::Copilot
        );
    }

    #[test]
    fn test_code_optimization_goes_to_deepseek() {
        assert_eq!(route_auto("Optimize this SQL query"), ModelId::DeepSeek);
    }

    #[test]
    fn test_no_keywords_defaults_to_claude() {
        assert_eq!(route_auto("What's the weather today?"), ModelId::Claude);
    }

    #[test]
    fn test_bare_code_keyword_defaults_to_claude() {
        assert_eq!(route_auto("there is a bug in my parser"), ModelId::Claude);
    }

    #[test]
    fn test_explicit_selection_wins_over_text() {
        let request = RoutingRequest {
            text: "Generate an image",
            selection: ModelSelection::Fixed(ModelId::DeepSeek),
        };
        assert_eq!(route(&request).model, ModelId::DeepSeek);
    }

    #[test]
    fn test_auto_sentinel_lets_router_decide() {
        let request = RoutingRequest {
            text: "draw me a logo",
            selection: ModelSelection::Auto,
        };
        assert_eq!(route(&request).model, ModelId::Gemini);
    }

    #[test]
    fn test_image_takes_priority_over_code() {
        // Contains both "picture" and "debug": image class is checked first.
        assert_eq!(
            route_auto("debug the code that renders this picture"),
            ModelId::Gemini
        );
    }

    #[test]
    fn test_create_is_image_unless_code_context_only() {
        // "create" is in both the image list and the code-generate sublist;
        // image priority means it routes to an image model on its own.
        assert_eq!(route_auto("create a landing page mockup"), ModelId::Gemini);
    }

    #[test]
    fn test_matching_is_case_insensitive() {
        assert_eq!(route_auto("EXPLAIN THIS ALGORITHM"), ModelId::Claude);
        assert_eq!(route_auto("An ARTISTIC Illustration"), ModelId::NanoBanana);
    }

    #[test]
    fn test_empty_input_defaults_to_claude() {
        assert_eq!(route_auto(""), ModelId::Claude);
    }

    #[test]
    fn test_routing_is_deterministic() {
        let request = RoutingRequest::auto("review and improve this class");
        assert_eq!(route(&request), route(&request));
        assert_eq!(route(&request).model, ModelId::DeepSeek);
    }

    #[test]
    fn test_explain_beats_generate_within_code() {
        // Both "explain" and "write" present; explanation sub-class is
        // checked first within the code branch.
        assert_eq!(
            route_auto("explain the function, then help me rewrite it... actually just explain why the code fails"),
            ModelId::Claude
        );
    }
}
