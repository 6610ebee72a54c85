//! `llm_model` and `llm_intent`

use crate::ir::{Construct, ConstructKind, LlmIntentSpec, LlmModelSpec, PiiPolicy};
use crate::parser::lines::Line;
use crate::parser::{Header, Parser};

pub(super) fn model(p: &mut Parser, header: &Header, line: &Line) -> Option<Construct> {
    let mut provider = None;
    let mut model_id = None;
    let mut tier = None;
    let mut max_tokens = None;
    for child in &line.children {
        let Some((key, mut value)) = child.entry() else {
            p.unknown_key(header, child);
            continue;
        };
        match key.lexeme.as_str() {
            "provider" => provider = p.take(value.word_value("provider")),
            "model_id" => model_id = p.take(value.text_value("model id")),
            "tier" => tier = p.take(value.word_value("tier")),
            "max_tokens" => max_tokens = p.take(value.number_value("max tokens")),
            _ => p.unknown_key(header, child),
        }
    }

    if provider.is_none() {
        p.missing_key(header, "provider");
    }
    if model_id.is_none() {
        p.missing_key(header, "model_id");
    }
    Some(Construct::LlmModel(LlmModelSpec {
        name: header.name.clone(),
        title: header.title.clone(),
        provider: provider?,
        model_id: model_id?,
        tier,
        max_tokens,
        span: header.span.clone(),
    }))
}

pub(super) fn intent(p: &mut Parser, header: &Header, line: &Line) -> Option<Construct> {
    let mut model = None;
    let mut prompt = None;
    let mut output_schema = None;
    let mut timeout = None;
    let mut pii = PiiPolicy::default();
    for child in &line.children {
        let Some((key, mut value)) = child.entry() else {
            p.unknown_key(header, child);
            continue;
        };
        match key.lexeme.as_str() {
            "model" => model = p.take(value.reference(ConstructKind::LlmModel)),
            "prompt" => prompt = p.take(value.string_value("prompt")),
            "output_schema" => output_schema = p.take(value.reference(ConstructKind::Message)),
            "timeout" => timeout = p.take(value.duration_value()),
            "pii" => {
                if let Some(policy) = p.take(value.choice("pii policy", PiiPolicy::parse)) {
                    pii = policy;
                }
            }
            _ => p.unknown_key(header, child),
        }
    }

    if model.is_none() {
        p.missing_key(header, "model");
    }
    if prompt.is_none() {
        p.missing_key(header, "prompt");
    }
    Some(Construct::LlmIntent(LlmIntentSpec {
        name: header.name.clone(),
        title: header.title.clone(),
        model: model?,
        prompt: prompt?,
        output_schema,
        timeout,
        pii,
        span: header.span.clone(),
    }))
}

#[cfg(test)]
mod tests {
    use super::super::tests::{codes, parse, parse_one};
    use super::*;
    use crate::diagnostics::DiagnosticCode;

    #[test]
    fn test_llm_model() {
        let source = "llm_model fast \"Fast model\":\n  provider: anthropic\n  model_id: \"model-small\"\n  tier: fast\n  max_tokens: 1024\n";
        let Construct::LlmModel(m) = parse_one(source) else {
            panic!("expected llm_model");
        };
        assert_eq!(m.provider, "anthropic");
        assert_eq!(m.model_id, "model-small");
        assert_eq!(m.max_tokens, Some(1024));
    }

    #[test]
    fn test_llm_intent() {
        let source = "llm_intent summarize \"Summarize invoice\":\n  model: fast\n  prompt: \"Summarize {{ input }}\"\n  output_schema: InvoiceSent\n  timeout: 30s\n  pii: redact\n";
        let Construct::LlmIntent(i) = parse_one(source) else {
            panic!("expected llm_intent");
        };
        assert_eq!(i.model.kind, ConstructKind::LlmModel);
        assert_eq!(i.prompt, "Summarize {{ input }}");
        assert_eq!(i.output_schema.map(|r| r.kind), Some(ConstructKind::Message));
        assert_eq!(i.pii, PiiPolicy::Redact);
    }

    #[test]
    fn test_intent_requires_model_and_prompt() {
        let (fragment, diags) = parse("llm_intent i:\n  pii: block\n");
        assert_eq!(codes(&diags), vec![DiagnosticCode::MissingKey, DiagnosticCode::MissingKey]);
        assert_eq!(fragment.rejected[0].kind, ConstructKind::LlmIntent);
    }
}
