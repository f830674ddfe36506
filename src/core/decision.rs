// src/core/decision.rs
use crate::types::Side;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Long,
    Short,
    Hold,
    Close,
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "long" => Ok(Action::Long),
            "short" => Ok(Action::Short),
            "hold" => Ok(Action::Hold),
            "close" => Ok(Action::Close),
            other => Err(format!("unknown action '{}'", other)),
        }
    }
}

/// One advisory decision, parsed once at the collaborator boundary.
///
/// `leverage` keeps whatever number the advisor asked for, even if it is out
/// of range; the router is the one that rejects it.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub action: Action,
    pub leverage: Option<u32>,
    pub trade_amount_usd: Decimal, // margin request, zero when absent
    pub reasoning: String,
}

impl Decision {
    pub fn hold(reasoning: impl Into<String>) -> Self {
        Self {
            action: Action::Hold,
            leverage: None,
            trade_amount_usd: Decimal::ZERO,
            reasoning: reasoning.into(),
        }
    }

    pub fn close(reasoning: impl Into<String>) -> Self {
        Self {
            action: Action::Close,
            ..Self::hold(reasoning)
        }
    }

    pub fn open(side: Side, leverage: u32, trade_amount_usd: Decimal) -> Self {
        let action = match side {
            Side::Long => Action::Long,
            Side::Short => Action::Short,
        };
        Self {
            action,
            leverage: Some(leverage),
            trade_amount_usd,
            reasoning: String::new(),
        }
    }

    /// Parses a command string such as `"long 25x"`, `"short 40"` or `"hold"`.
    /// Returns `None` when the action word is not recognised.
    pub fn from_command(
        command: &str,
        trade_amount_usd: Decimal,
        reasoning: impl Into<String>,
    ) -> Option<Self> {
        let mut parts = command.split_whitespace();
        let action = parts.next()?.parse::<Action>().ok()?;
        let leverage = parts.next().and_then(parse_leverage);
        Some(Self {
            action,
            leverage,
            trade_amount_usd,
            reasoning: reasoning.into(),
        })
    }

    /// Interprets a raw advisor reply. Anything that cannot be understood
    /// becomes a zero-size hold.
    pub fn from_response_text(text: &str) -> Self {
        let json = match extract_object(text).and_then(|s| serde_json::from_str::<Value>(s).ok())
        {
            Some(v) => v,
            None => {
                warn!("Could not decode advisor reply as JSON: '{}'. Defaulting to hold.", text);
                return Self::hold("unparsable advisor reply");
            }
        };

        let command = json.get("command").and_then(Value::as_str).unwrap_or("hold");
        let reasoning = json
            .get("reasoning")
            .and_then(Value::as_str)
            .unwrap_or("No reasoning provided.");
        let amount = json
            .get("trade_amount_usd")
            .and_then(decimal_from_json)
            .unwrap_or(Decimal::ZERO);

        let Some(mut decision) = Self::from_command(command, amount, reasoning) else {
            warn!("Invalid command from advisor: '{}'. Defaulting to hold.", command);
            return Self::hold("unknown advisor command");
        };

        if decision.leverage.is_none() && command.split_whitespace().nth(1).is_none() {
            decision.leverage = json.get("leverage").and_then(leverage_from_json);
        }
        decision
    }
}

/// `"25x"`, `"25X"` or `"25"`.
fn parse_leverage(token: &str) -> Option<u32> {
    let digits = token.trim_end_matches(|c| c == 'x' || c == 'X');
    digits.parse::<u32>().ok()
}

fn leverage_from_json(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
        Value::String(s) => parse_leverage(s.trim()),
        _ => None,
    }
}

fn decimal_from_json(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => match n.as_i64() {
            Some(i) => Some(Decimal::from(i)),
            None => n.as_f64().and_then(Decimal::from_f64),
        },
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        _ => None,
    }
}

/// Outermost `{...}` span, so replies wrapped in prose or code fences still parse.
fn extract_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn parses_command_with_leverage_suffix() {
        let d = Decision::from_response_text(
            r#"{"reasoning": "strong trend", "command": "long 25x", "trade_amount_usd": 200}"#,
        );
        assert_eq!(d.action, Action::Long);
        assert_eq!(d.leverage, Some(25));
        assert_eq!(d.trade_amount_usd, dec!(200));
        assert_eq!(d.reasoning, "strong trend");
    }

    #[test]
    fn command_is_case_insensitive_and_suffix_optional_x() {
        let d = Decision::from_command("SHORT 40", dec!(50), "").unwrap();
        assert_eq!(d.action, Action::Short);
        assert_eq!(d.leverage, Some(40));
    }

    #[test]
    fn out_of_range_leverage_is_kept_for_the_router() {
        let d = Decision::from_command("long 75x", dec!(10), "").unwrap();
        assert_eq!(d.leverage, Some(75));
    }

    #[test]
    fn garbage_suffix_leaves_leverage_unset() {
        let d = Decision::from_response_text(
            r#"{"command": "long lots", "trade_amount_usd": 100, "leverage": 20}"#,
        );
        assert_eq!(d.action, Action::Long);
        assert_eq!(d.leverage, None);
    }

    #[test]
    fn leverage_field_is_used_when_command_has_no_suffix() {
        let d = Decision::from_response_text(
            r#"{"command": "short", "trade_amount_usd": "75.5", "leverage": "30x"}"#,
        );
        assert_eq!(d.action, Action::Short);
        assert_eq!(d.leverage, Some(30));
        assert_eq!(d.trade_amount_usd, dec!(75.5));
    }

    #[test]
    fn malformed_json_defaults_to_hold() {
        for text in ["not json at all", "{\"command\": \"long 25x\"", "", "}{"] {
            let d = Decision::from_response_text(text);
            assert_eq!(d.action, Action::Hold);
            assert_eq!(d.trade_amount_usd, Decimal::ZERO);
        }
    }

    #[test]
    fn unknown_command_defaults_to_hold() {
        let d = Decision::from_response_text(
            r#"{"command": "buy 25x", "trade_amount_usd": 300, "reasoning": "yolo"}"#,
        );
        assert_eq!(d, Decision::hold("unknown advisor command"));
    }

    #[test]
    fn fenced_reply_is_accepted() {
        let text = "Here you go:\n```json\n{\"command\": \"close\", \"trade_amount_usd\": 0}\n```";
        let d = Decision::from_response_text(text);
        assert_eq!(d.action, Action::Close);
        assert_eq!(d.reasoning, "No reasoning provided.");
    }

    #[test]
    fn missing_command_is_hold() {
        let d = Decision::from_response_text(r#"{"reasoning": "unsure"}"#);
        assert_eq!(d.action, Action::Hold);
        assert_eq!(d.reasoning, "unsure");
    }

    #[test]
    fn non_numeric_amount_becomes_zero() {
        let d = Decision::from_response_text(
            r#"{"command": "long 10x", "trade_amount_usd": "a lot"}"#,
        );
        assert_eq!(d.trade_amount_usd, Decimal::ZERO);
        assert_eq!(d.leverage, Some(10));
    }
}
