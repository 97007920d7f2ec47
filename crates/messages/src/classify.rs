//! Message-type decision table.
//!
//! Keyed by which sub-field of the provider's `message` object is populated.
//! Both the webhook normalizer and the fan-out payload builder go through
//! [`classify`]; there is no second copy of this table.

use serde_json::Value;

use crate::MessageType;

/// Wrapper envelopes whose inner `message` carries the real content.
const WRAPPERS: &[&str] = &[
    "ephemeralMessage",
    "viewOnceMessage",
    "viewOnceMessageV2",
    "documentWithCaptionMessage",
];

const MAX_UNWRAP_DEPTH: usize = 4;

/// Media variants in table order.
const MEDIA: &[(&str, MessageType)] = &[
    ("imageMessage", MessageType::Image),
    ("videoMessage", MessageType::Video),
    ("audioMessage", MessageType::Audio),
    ("documentMessage", MessageType::Document),
    ("stickerMessage", MessageType::Sticker),
];

/// Outcome of classifying one provider `message` object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classified {
    pub message_type: MessageType,
    pub content: String,
    pub media_url: Option<String>,
    pub caption: Option<String>,
}

/// Classify a provider `message` object.
///
/// Unknown structures fall back to `text` with the object serialized as content.
#[must_use]
pub fn classify(message: &Value) -> Classified {
    let inner = unwrap(message);
    // Provider-side media storage puts a resolved URL next to the variant.
    let stored_url = non_empty_str(message.get("mediaUrl"))
        .or_else(|| non_empty_str(inner.get("mediaUrl")));

    if let Some(text) = inner.get("conversation").and_then(Value::as_str) {
        return text_message(text);
    }
    if let Some(text) = inner
        .get("extendedTextMessage")
        .and_then(|m| m.get("text"))
        .and_then(Value::as_str)
    {
        return text_message(text);
    }

    for (field, message_type) in MEDIA {
        let Some(media) = inner.get(*field).filter(|m| m.is_object()) else {
            continue;
        };
        let caption = non_empty_str(media.get("caption"));
        let content = match message_type {
            MessageType::Image | MessageType::Video | MessageType::Document => caption.clone(),
            _ => None,
        }
        .or_else(|| {
            (*message_type == MessageType::Document)
                .then(|| non_empty_str(media.get("fileName")))
                .flatten()
        })
        .unwrap_or_else(|| message_type.placeholder().to_string());

        return Classified {
            message_type: *message_type,
            content,
            media_url: stored_url.or_else(|| non_empty_str(media.get("url"))),
            caption,
        };
    }

    Classified {
        message_type: MessageType::Text,
        content: inner.to_string(),
        media_url: None,
        caption: None,
    }
}

fn text_message(text: &str) -> Classified {
    Classified {
        message_type: MessageType::Text,
        content: text.to_string(),
        media_url: None,
        caption: None,
    }
}

/// Peel wrapper envelopes, bounded so hostile nesting cannot loop.
fn unwrap(message: &Value) -> &Value {
    let mut current = message;
    for _ in 0..MAX_UNWRAP_DEPTH {
        let next = WRAPPERS.iter().find_map(|w| {
            current
                .get(*w)
                .and_then(|wrapper| wrapper.get("message"))
                .filter(|m| m.is_object())
        });
        match next {
            Some(inner) => current = inner,
            None => break,
        }
    }
    current
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use {super::*, serde_json::json};

    #[test]
    fn conversation_is_text() {
        let c = classify(&json!({"conversation": "oi"}));
        assert_eq!(c.message_type, MessageType::Text);
        assert_eq!(c.content, "oi");
        assert!(c.media_url.is_none());
    }

    #[test]
    fn extended_text_is_text() {
        let c = classify(&json!({"extendedTextMessage": {"text": "see https://x.y"}}));
        assert_eq!(c.message_type, MessageType::Text);
        assert_eq!(c.content, "see https://x.y");
    }

    #[test]
    fn image_with_caption() {
        let c = classify(&json!({
            "imageMessage": {"url": "https://mmg.example/img", "caption": "pool view"}
        }));
        assert_eq!(c.message_type, MessageType::Image);
        assert_eq!(c.content, "pool view");
        assert_eq!(c.caption.as_deref(), Some("pool view"));
        assert_eq!(c.media_url.as_deref(), Some("https://mmg.example/img"));
    }

    #[test]
    fn image_without_caption_uses_placeholder() {
        let c = classify(&json!({"imageMessage": {"mimetype": "image/jpeg"}}));
        assert_eq!(c.content, "[Image]");
        assert!(c.caption.is_none());
    }

    #[test]
    fn stored_media_url_wins_over_variant_url() {
        let c = classify(&json!({
            "videoMessage": {"url": "https://mmg.example/enc"},
            "mediaUrl": "https://bucket.example/video.mp4"
        }));
        assert_eq!(c.message_type, MessageType::Video);
        assert_eq!(c.media_url.as_deref(), Some("https://bucket.example/video.mp4"));
        assert_eq!(c.content, "[Video]");
    }

    #[test]
    fn audio_ignores_caption_for_content() {
        let c = classify(&json!({"audioMessage": {"ptt": true}}));
        assert_eq!(c.message_type, MessageType::Audio);
        assert_eq!(c.content, "[Audio]");
    }

    #[test]
    fn document_falls_back_to_file_name() {
        let c = classify(&json!({"documentMessage": {"fileName": "invoice.pdf"}}));
        assert_eq!(c.message_type, MessageType::Document);
        assert_eq!(c.content, "invoice.pdf");

        let c = classify(&json!({"documentMessage": {}}));
        assert_eq!(c.content, "[Document]");
    }

    #[test]
    fn document_with_caption_wrapper_is_unwrapped() {
        let c = classify(&json!({
            "documentWithCaptionMessage": {
                "message": {"documentMessage": {"fileName": "a.pdf", "caption": "contract"}}
            }
        }));
        assert_eq!(c.message_type, MessageType::Document);
        assert_eq!(c.content, "contract");
    }

    #[test]
    fn ephemeral_wrapper_is_unwrapped() {
        let c = classify(&json!({
            "ephemeralMessage": {"message": {"extendedTextMessage": {"text": "hidden"}}}
        }));
        assert_eq!(c.content, "hidden");
    }

    #[test]
    fn sticker() {
        let c = classify(&json!({"stickerMessage": {"url": "https://mmg.example/s"}}));
        assert_eq!(c.message_type, MessageType::Sticker);
        assert_eq!(c.content, "[Sticker]");
    }

    #[test]
    fn unknown_shape_falls_back_to_serialized_text() {
        let raw = json!({"locationMessage": {"degreesLatitude": -23.5}});
        let c = classify(&raw);
        assert_eq!(c.message_type, MessageType::Text);
        assert_eq!(c.content, raw.to_string());
    }
}
