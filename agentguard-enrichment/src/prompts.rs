//! Fixed prompts and forced tool schema for deep attack-pattern triage (§4.7).

use agentguard_analyzer::ToolDefinition;
use agentguard_core::Event;
use serde_json::json;

pub const SYSTEM_PROMPT: &str = "You are a security analyst performing deep forensic triage on a \
tool invocation that an upstream guardrail already flagged as BLOCK or REVIEW. Classify the attack \
pattern it most closely resembles, if any, and assess your confidence and the likelihood this is a \
false positive. You must call the report_enrichment_insight tool with your assessment; do not \
respond in free text.";

/// Name of the tool the enrichment client forces via `tool_choice`.
pub const ENRICH_TOOL_NAME: &str = "report_enrichment_insight";

const ATTACK_PATTERNS: &[&str] = &[
    "credential_exfiltration",
    "data_exfiltration",
    "prompt_injection",
    "goal_hijacking",
    "memory_poisoning",
    "privilege_escalation",
    "lateral_movement",
    "reconnaissance",
    "none",
];

const SEVERITIES: &[&str] = &["low", "medium", "high", "critical"];

/// JSON schema for the forced tool call.
pub fn enrichment_tool() -> ToolDefinition {
    ToolDefinition {
        name: ENRICH_TOOL_NAME.to_string(),
        description: "Report a structured deep-triage insight for a flagged action.".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "attack_pattern": {
                    "type": "string",
                    "enum": ATTACK_PATTERNS,
                    "description": "The attack pattern this action most closely resembles, or 'none'."
                },
                "confidence": {
                    "type": "number",
                    "minimum": 0.0,
                    "maximum": 1.0,
                    "description": "Confidence in the attack_pattern classification."
                },
                "severity": {
                    "type": "string",
                    "enum": SEVERITIES,
                    "description": "Severity of the flagged action if the classification is correct."
                },
                "summary": {
                    "type": "string",
                    "description": "A short human-readable summary of the finding."
                },
                "recommended_action": {
                    "type": "string",
                    "description": "What a human operator should do next."
                },
                "false_positive_likelihood": {
                    "type": "number",
                    "minimum": 0.0,
                    "maximum": 1.0,
                    "description": "Likelihood this flag is a false positive."
                }
            },
            "required": [
                "attack_pattern",
                "confidence",
                "severity",
                "summary",
                "recommended_action",
                "false_positive_likelihood"
            ]
        }),
    }
}

/// Build the user-turn prompt embedding the flagged event.
pub fn build_triage_prompt(event: &Event) -> String {
    let event_json = serde_json::to_string_pretty(event)
        .unwrap_or_else(|_| "{\"error\": \"event did not serialize\"}".to_string());
    format!(
        "Flagged event:\n{event_json}\n\n\
         Classify this event by calling {ENRICH_TOOL_NAME}."
    )
}
