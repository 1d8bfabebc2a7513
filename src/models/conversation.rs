//! Conversation (room) record

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

use super::Role;

/// Shared record for one consultation room.
///
/// Each language field is owned by its role: only that participant writes
/// it, the other side only reads it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub last_active: Option<DateTime<Utc>>,
    pub conversation_name: Option<String>,
    pub doctor_language: Option<String>,
    pub patient_language: Option<String>,
}

impl Conversation {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Stored language for `role`, if that participant has written one.
    pub fn language_of(&self, role: Role) -> Option<&str> {
        let lang = match role {
            Role::Doctor => self.doctor_language.as_deref(),
            Role::Patient => self.patient_language.as_deref(),
        };
        lang.filter(|l| !l.is_empty())
    }

    /// Name for listings, falling back to a short id prefix.
    pub fn display_name(&self) -> String {
        match self.conversation_name.as_deref() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => {
                let prefix: String = self.id.chars().take(4).collect();
                format!("Consultation {}", prefix)
            }
        }
    }

    /// Merge a patch into the record. `now` is the store's clock.
    pub fn apply(&mut self, patch: &ConversationPatch, now: DateTime<Utc>) {
        if patch.touch {
            // lastActive never moves backwards, even if the store clock does.
            self.last_active = Some(match self.last_active {
                Some(prev) if prev > now => prev,
                _ => now,
            });
        }

        if self.conversation_name.is_none() {
            if let Some(ref name) = patch.conversation_name {
                self.conversation_name = Some(name.clone());
            }
        }

        if let Some(ref field) = patch.language {
            let slot = match field.role {
                Role::Doctor => &mut self.doctor_language,
                Role::Patient => &mut self.patient_language,
            };
            *slot = Some(field.code.clone());
        }
    }
}

/// One role's language preference inside a patch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageField {
    pub role: Role,
    pub code: String,
}

/// Partial update merged into a conversation.
///
/// Patches only carry fields that are either idempotent (`touch`), write-once
/// (`conversation_name`) or owned by the writer (`language`), so concurrent
/// writers never need to read the record first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationPatch {
    #[serde(default)]
    pub touch: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<LanguageField>,
}

impl ConversationPatch {
    /// Refresh `lastActive` only.
    pub fn touch() -> Self {
        Self {
            touch: true,
            ..Self::default()
        }
    }

    /// Patch written when a participant opens a room.
    pub fn visit(role: Role, language: &str, name: String) -> Self {
        Self {
            touch: true,
            conversation_name: Some(name),
            language: Some(LanguageField {
                role,
                code: language.to_string(),
            }),
        }
    }
}

/// Default room label, e.g. "Consultation - Oct 15, 14:03".
pub fn default_conversation_name(now: DateTime<Local>) -> String {
    format!("Consultation - {}", now.format("%b %-d, %H:%M"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_language_writes_do_not_clobber_other_role() {
        let now = Utc::now();
        let mut conv = Conversation::new("room");
        conv.apply(&ConversationPatch::visit(Role::Doctor, "en", "A".into()), now);
        conv.apply(&ConversationPatch::visit(Role::Patient, "es", "B".into()), now);
        conv.apply(&ConversationPatch::touch(), now);

        assert_eq!(conv.language_of(Role::Doctor), Some("en"));
        assert_eq!(conv.language_of(Role::Patient), Some("es"));
    }

    #[test]
    fn test_conversation_name_set_once() {
        let now = Utc::now();
        let mut conv = Conversation::new("room");
        conv.apply(&ConversationPatch::visit(Role::Doctor, "en", "first".into()), now);
        conv.apply(&ConversationPatch::visit(Role::Patient, "hi", "second".into()), now);
        assert_eq!(conv.conversation_name.as_deref(), Some("first"));
    }

    #[test]
    fn test_last_active_is_monotonic() {
        let now = Utc::now();
        let mut conv = Conversation::new("room");
        conv.apply(&ConversationPatch::touch(), now);
        conv.apply(&ConversationPatch::touch(), now - Duration::seconds(30));
        assert_eq!(conv.last_active, Some(now));
    }

    #[test]
    fn test_display_name_fallback() {
        let conv = Conversation::new("abcdef-123");
        assert_eq!(conv.display_name(), "Consultation abcd");
    }

    #[test]
    fn test_default_conversation_name_format() {
        let at = Local.with_ymd_and_hms(2026, 3, 7, 9, 5, 0).unwrap();
        assert_eq!(default_conversation_name(at), "Consultation - Mar 7, 09:05");
    }

    #[test]
    fn test_camel_case_wire_format() {
        let mut conv = Conversation::new("r1");
        conv.patient_language = Some("fr".into());
        let json = serde_json::to_value(&conv).unwrap();
        assert_eq!(json["patientLanguage"], "fr");
        assert!(json.get("lastActive").is_some());
    }
}
