//! Completion request bodies and token accounting on responses.

use serde_json::{json, Value};

use crate::plan::{CompletionApi, LoadPlan, LoadSettings};

/// Body for one HTTP request carrying `plan.batch` prompts.
pub fn completion_body(settings: &LoadSettings, plan: &LoadPlan) -> Value {
    let prompt = if plan.batch <= 1 {
        Value::String(settings.prompt.clone())
    } else {
        Value::Array(vec![Value::String(settings.prompt.clone()); plan.batch as usize])
    };

    match settings.api {
        CompletionApi::LlamaCpp => json!({
            "prompt": prompt,
            "n_predict": settings.n_predict,
            "cache_prompt": false,
            "stream": false,
        }),
        CompletionApi::OpenAi => json!({
            "model": plan.model,
            "prompt": prompt,
            "max_tokens": settings.n_predict,
            "stream": false,
        }),
    }
}

/// Tokens generated according to a response body.
///
/// Accepts a single completion object or an array of them (llama.cpp answers
/// multi-prompt requests with an array). Returns `None` when any completion
/// lacks a recognisable count or the counts overflow `u64`, which the
/// driver treats as a malformed payload.
pub fn count_tokens(body: &Value) -> Option<u64> {
    match body {
        Value::Array(items) if !items.is_empty() => {
            items
                .iter()
                .try_fold(0u64, |acc, item| acc.checked_add(object_tokens(item)?))
        }
        Value::Object(_) => object_tokens(body),
        _ => None,
    }
}

fn object_tokens(obj: &Value) -> Option<u64> {
    obj.get("tokens_predicted")
        .and_then(Value::as_u64)
        .or_else(|| obj.pointer("/usage/completion_tokens").and_then(Value::as_u64))
        .or_else(|| obj.pointer("/timings/predicted_n").and_then(Value::as_u64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lt_types::ParameterPoint;

    fn plan(batch: u32) -> LoadPlan {
        LoadPlan::for_point("qwen", &ParameterPoint::new(1, 1, batch, 1), 4)
    }

    #[test]
    fn single_prompt_is_a_string() {
        let body = completion_body(&LoadSettings::default(), &plan(1));
        assert!(body["prompt"].is_string());
        assert_eq!(body["n_predict"], 128);
        assert_eq!(body["cache_prompt"], false);
    }

    #[test]
    fn batched_prompts_are_an_array() {
        let settings = LoadSettings {
            api: CompletionApi::OpenAi,
            ..Default::default()
        };
        let body = completion_body(&settings, &plan(8));
        assert_eq!(body["prompt"].as_array().unwrap().len(), 8);
        assert_eq!(body["model"], "qwen");
        assert_eq!(body["max_tokens"], 128);
    }

    #[test]
    fn counts_llama_cpp_and_openai_shapes() {
        assert_eq!(count_tokens(&json!({"content": "x", "tokens_predicted": 42})), Some(42));
        assert_eq!(
            count_tokens(&json!({"choices": [], "usage": {"completion_tokens": 7}})),
            Some(7)
        );
        assert_eq!(
            count_tokens(&json!({"timings": {"predicted_n": 9}})),
            Some(9)
        );
        assert_eq!(
            count_tokens(&json!([{"tokens_predicted": 3}, {"tokens_predicted": 5}])),
            Some(8)
        );
    }

    #[test]
    fn malformed_payloads_have_no_count() {
        assert_eq!(count_tokens(&json!({"content": "no counts here"})), None);
        assert_eq!(count_tokens(&json!([{"tokens_predicted": 3}, {}])), None);
        assert_eq!(count_tokens(&json!([])), None);
        assert_eq!(count_tokens(&json!("text")), None);
    }

    #[test]
    fn overflowing_counts_are_malformed() {
        let body = json!([{"tokens_predicted": u64::MAX}, {"tokens_predicted": 1}]);
        assert_eq!(count_tokens(&body), None);
    }
}
