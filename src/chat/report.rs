//! Consultation summary and its plain-text report.

use chrono::NaiveDate;

use crate::gateway::{enrich, Gateway};
use crate::models::{Message, Summary, TranscriptLine};

/// Ask the gateway for a clinical summary of `messages`.
///
/// Only sender role and original text are sent. A failed call yields
/// [`Summary::unavailable`].
pub async fn summarize(gateway: &dyn Gateway, messages: &[Message]) -> Summary {
    let transcript: Vec<TranscriptLine> = messages.iter().map(TranscriptLine::from).collect();
    enrich::summarize(gateway, &transcript)
        .await
        .unwrap_or_else(|_| Summary::unavailable())
}

fn bullets(items: &[String]) -> String {
    if items.is_empty() {
        return "- None".to_string();
    }
    items
        .iter()
        .map(|i| format!("- {}", i))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render the copyable "MEDICAL SUMMARY" document.
pub fn render_report(summary: &Summary, date: NaiveDate) -> String {
    format!(
        "MEDICAL SUMMARY\n\
         Date: {}\n\
         \n\
         SUMMARY:\n\
         {}\n\
         \n\
         SYMPTOMS:\n\
         {}\n\
         \n\
         DIAGNOSES:\n\
         {}\n\
         \n\
         MEDICATIONS:\n\
         {}\n\
         \n\
         FOLLOW-UP:\n\
         {}",
        date.format("%-m/%-d/%Y"),
        summary.summary.trim(),
        bullets(&summary.symptoms),
        bullets(&summary.diagnoses),
        bullets(&summary.medications),
        bullets(&summary.followups),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::enrich::testing::FakeGateway;
    use crate::models::{MessageKind, Role};
    use chrono::Utc;

    #[test]
    fn test_report_layout() {
        let summary = Summary {
            summary: "Patient reports a dry cough.".into(),
            symptoms: vec!["cough".into(), "fatigue".into()],
            diagnoses: vec![],
            medications: vec!["honey".into()],
            followups: vec![],
        };
        let date = NaiveDate::from_ymd_opt(2026, 10, 5).unwrap();
        let report = render_report(&summary, date);

        let expected = "MEDICAL SUMMARY\nDate: 10/5/2026\n\nSUMMARY:\nPatient reports a dry cough.\n\n\
SYMPTOMS:\n- cough\n- fatigue\n\nDIAGNOSES:\n- None\n\nMEDICATIONS:\n- honey\n\nFOLLOW-UP:\n- None";
        assert_eq!(report, expected);
    }

    #[tokio::test]
    async fn test_summarize_sends_only_role_and_original_text() {
        let gw = FakeGateway::working();
        let messages = vec![Message {
            id: "m0".into(),
            seq: 0,
            timestamp: Utc::now(),
            sender_role: Role::Patient,
            original_text: "Me duele el pecho".into(),
            translated_text: Some("My chest hurts".into()),
            language: "es".into(),
            kind: MessageKind::Text,
        }];

        let summary = summarize(&gw, &messages).await;
        assert_eq!(summary.summary, "1 lines");

        let sent = gw.summarized.lock().unwrap().clone();
        assert_eq!(
            sent,
            vec![TranscriptLine {
                sender_role: Role::Patient,
                original_text: "Me duele el pecho".into(),
            }]
        );
    }

    #[tokio::test]
    async fn test_summarize_degrades() {
        let gw = FakeGateway::broken();
        assert!(summarize(&gw, &[]).await.is_unavailable());
    }
}
