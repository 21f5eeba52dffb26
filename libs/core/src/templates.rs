use std::{fmt, str::FromStr};

use serde_json::json;

use crate::{Attachment, AttachmentType, MessageContent};

/// Named attachment templates the bot can send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateKind {
    /// Asks the client for an e-mail address so an agent can follow up.
    Email,
}

impl TemplateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateKind::Email => "email",
        }
    }

    pub fn content(&self) -> MessageContent {
        MessageContent::Attachment(template_attachment(*self))
    }
}

impl fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TemplateKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(TemplateKind::Email),
            other => Err(format!("unknown template `{other}`")),
        }
    }
}

/// ```
/// use hdesk_core::{AttachmentType, TemplateKind, template_attachment};
///
/// let attachment = template_attachment(TemplateKind::Email);
/// assert_eq!(attachment.kind, AttachmentType::Template);
/// assert_eq!(attachment.payload["templateType"], "email");
/// ```
pub fn template_attachment(kind: TemplateKind) -> Attachment {
    Attachment {
        kind: AttachmentType::Template,
        payload: json!({ "templateType": kind.as_str() }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_template_content() {
        let content = TemplateKind::Email.content();
        assert_eq!(
            serde_json::to_value(&content).unwrap(),
            json!({"attachment": {"type": "template", "payload": {"templateType": "email"}}})
        );
        assert_eq!("email".parse::<TemplateKind>(), Ok(TemplateKind::Email));
        assert!("sms".parse::<TemplateKind>().is_err());
    }
}
