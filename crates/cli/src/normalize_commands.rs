//! Offline normalizer run over a captured webhook body.

use std::path::PathBuf;

use {
    anyhow::{Context, Result},
    clap::Args,
    serde_json::{Value, json},
    switchboard_messages::{MESSAGES_UPSERT, canonical_event_name, normalize},
};

#[derive(Args)]
pub struct NormalizeArgs {
    /// Instance the payload was delivered for. Defaults to the envelope's
    /// `instance` field.
    #[arg(long)]
    instance: Option<String>,
    /// Path to a JSON webhook body.
    file: PathBuf,
}

pub fn handle_normalize(args: &NormalizeArgs) -> Result<()> {
    let raw = std::fs::read_to_string(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    let envelope: Value = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not valid JSON", args.file.display()))?;

    let (report, accepted) = run(args.instance.as_deref(), &envelope);
    println!("{}", serde_json::to_string_pretty(&report)?);
    if !accepted {
        std::process::exit(1);
    }
    Ok(())
}

/// Returns the printed report and whether the payload normalized.
fn run(instance: Option<&str>, envelope: &Value) -> (Value, bool) {
    let instance = instance
        .map(str::to_string)
        .or_else(|| {
            envelope
                .get("instance")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_default();

    if let Some(event) = envelope.get("event").and_then(Value::as_str)
        && canonical_event_name(event) != MESSAGES_UPSERT
    {
        return (
            json!({ "accepted": false, "reason": "not_a_message_event", "event": event }),
            false,
        );
    }

    match normalize(&instance, envelope) {
        Ok((message, shape)) => (
            json!({ "accepted": true, "shape": shape.as_str(), "message": message }),
            true,
        ),
        Err(rejection) => (
            json!({
                "accepted": false,
                "reason": rejection.reason(),
                "detail": rejection.to_string(),
            }),
            false,
        ),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_falls_back_to_envelope() {
        let envelope = json!({
            "event": "MESSAGES_UPSERT",
            "instance": "front-desk",
            "data": {
                "key": {"remoteJid": "5511987654321@s.whatsapp.net", "fromMe": false, "id": "A1"},
                "message": {"conversation": "oi"},
                "messageTimestamp": 1_717_000_000
            }
        });
        let (report, accepted) = run(None, &envelope);
        assert!(accepted);
        assert_eq!(report["message"]["instanceName"], "front-desk");
        assert_eq!(report["message"]["phoneNumber"], "5511987654321");
    }

    #[test]
    fn other_events_are_reported() {
        let (report, accepted) = run(
            Some("front-desk"),
            &json!({"event": "connection.update", "data": {}}),
        );
        assert!(!accepted);
        assert_eq!(report["reason"], "not_a_message_event");
    }

    #[test]
    fn rejection_carries_reason() {
        let (report, accepted) = run(Some("front-desk"), &json!({"data": {"foo": 1}}));
        assert!(!accepted);
        assert_eq!(report["reason"], "unrecognized_shape");
    }
}
