use chrono::SecondsFormat;

use crate::platform::{ChannelMetadata, CitedMessage, PreviewEmbed};

/// Map a cited message to its preview. Only the first attachment is used as
/// the image, whatever its type. The body is not truncated.
pub fn build_preview(msg: &CitedMessage, channel: &ChannelMetadata, color: u32) -> PreviewEmbed {
    PreviewEmbed {
        author_name: msg.author_name.clone(),
        author_avatar_url: msg.author_avatar_url.clone(),
        body: msg.body.clone(),
        timestamp_rfc3339: msg.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
        source_channel_name: channel.name.clone(),
        image_url: msg.attachment_urls.first().cloned(),
        color,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn message(attachments: &[&str]) -> CitedMessage {
        CitedMessage {
            author_name: "alice".to_string(),
            author_avatar_url: "https://cdn.discordapp.com/avatars/1/a.png".to_string(),
            body: "hi".to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 3, 9, 12, 30, 5).unwrap(),
            attachment_urls: attachments.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn channel() -> ChannelMetadata {
        ChannelMetadata {
            id: "2".to_string(),
            name: "general".to_string(),
            is_restricted: false,
        }
    }

    #[test]
    fn test_maps_fields() {
        let embed = build_preview(&message(&[]), &channel(), 0x7fffff);
        assert_eq!(embed.author_name, "alice");
        assert_eq!(
            embed.author_avatar_url,
            "https://cdn.discordapp.com/avatars/1/a.png"
        );
        assert_eq!(embed.body, "hi");
        assert_eq!(embed.source_channel_name, "general");
        assert_eq!(embed.timestamp_rfc3339, "2024-03-09T12:30:05Z");
        assert_eq!(embed.image_url, None);
        assert_eq!(embed.color, 0x7fffff);
    }

    #[test]
    fn test_first_attachment_becomes_image() {
        let embed = build_preview(
            &message(&["https://cdn/a.txt", "https://cdn/b.png"]),
            &channel(),
            0,
        );
        assert_eq!(embed.image_url.as_deref(), Some("https://cdn/a.txt"));
    }

    #[test]
    fn test_long_body_not_truncated() {
        let mut msg = message(&[]);
        msg.body = "x".repeat(10_000);
        let embed = build_preview(&msg, &channel(), 0);
        assert_eq!(embed.body.len(), 10_000);
    }
}
