//! Provider JID helpers.
//!
//! A JID looks like `5511999999999@s.whatsapp.net`, `5511999999999:12@s.whatsapp.net`
//! (multi-device), `120363025246125888@g.us` (group) or `status@broadcast`.

/// Keep only ASCII digits.
#[must_use]
pub fn sanitize_digits(input: &str) -> String {
    input.chars().filter(char::is_ascii_digit).collect()
}

/// Extract the phone number from a JID: strip the `@…` suffix and any
/// `:device` part, then keep digits. Returns `None` when nothing is left.
#[must_use]
pub fn phone_from_jid(jid: &str) -> Option<String> {
    let user = jid.split('@').next().unwrap_or_default();
    let user = user.split(':').next().unwrap_or_default();
    let digits = sanitize_digits(user);
    (!digits.is_empty()).then_some(digits)
}
