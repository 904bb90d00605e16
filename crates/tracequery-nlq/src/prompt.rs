//! Prompt assembly for search parameter extraction.
//!
//! The output must be byte-stable for a given query: small local models are
//! sensitive to any drift in instructions or example formatting.

const SYSTEM_INSTRUCTIONS: &str = r#"You are a Jaeger trace query parameter extractor.
Convert the user's trace search request into a single line of JSON.

RULES:
1. Output exactly one line of JSON and nothing else. No markdown, no explanations.
2. Use only these fields: service, operation, tags, minDuration, maxDuration, error, limit.
3. Omit any field the query does not mention.
4. Never invent service names, operation names, or tag values that are not in the query.
5. Durations use a number followed by a unit: ns, us, ms, s, m, h (e.g. "500ms", "2s", "1m30s").
6. "tags" is an object of string keys to string values (e.g. {"http.status_code":"500"}).
7. "error" is true for failed/error traces and false for successful traces.
8. "limit" is an integer between 1 and 1000."#;

/// Worked examples shown to the model, as (query, expected output) pairs.
const FEW_SHOT_EXAMPLES: &[(&str, &str)] = &[
    (
        "Show me 500 errors from payment-service taking more than 2 seconds",
        r#"{"service":"payment-service","tags":{"http.status_code":"500"},"minDuration":"2s","error":true}"#,
    ),
    (
        "Find slow traces for checkout operation, latency above 1s, limit 50",
        r#"{"operation":"checkout","minDuration":"1s","limit":50}"#,
    ),
    (
        "auth-service errors",
        r#"{"service":"auth-service","error":true}"#,
    ),
    (
        "traces between 100ms and 5s where user.id is 12345",
        r#"{"tags":{"user.id":"12345"},"minDuration":"100ms","maxDuration":"5s"}"#,
    ),
];

/// Build the full prompt for `user_query`.
///
/// Callers are expected to have trimmed and checked the query for emptiness.
pub fn build_prompt(user_query: &str) -> String {
    let mut out = String::with_capacity(1024 + user_query.len());
    out.push_str(SYSTEM_INSTRUCTIONS);
    out.push_str("\n\nEXAMPLES:\n");
    for (query, output) in FEW_SHOT_EXAMPLES {
        out.push_str(&format!("Query: {}\nOutput: {output}\n\n", quote(query)));
    }
    out.push_str(&format!("Query: {}\nOutput:", quote(user_query)));
    out
}

fn quote(query: &str) -> String {
    format!("\"{}\"", query.replace('\\', "\\\\").replace('"', "\\\""))
}
