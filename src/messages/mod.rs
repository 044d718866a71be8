//! Conversation-to-wire message preparation.
//!
//! Text-only models get plain string content and attachments are dropped.
//! Multimodal models get OpenAI content-part arrays, with image attachments
//! run through the [`crate::media`] processor and inlined as data URLs.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::endpoints::wire::ChatMessage;
use crate::endpoints::{EndpointError, EndpointMessage};
use crate::media::ImageProcessor;

pub(crate) fn prepare_messages_with_files(
    messages: &[EndpointMessage],
    processor: &ImageProcessor,
    multimodal: bool,
) -> Result<Vec<ChatMessage>, EndpointError> {
    messages
        .iter()
        .map(|message| prepare_message(message, processor, multimodal))
        .collect()
}

fn prepare_message(
    message: &EndpointMessage,
    processor: &ImageProcessor,
    multimodal: bool,
) -> Result<ChatMessage, EndpointError> {
    if !multimodal || message.files.is_empty() {
        if !message.files.is_empty() {
            debug!(
                count = message.files.len(),
                "dropping attachments, model is not multimodal"
            );
        }
        return Ok(ChatMessage::text(message.role.as_str(), &message.content));
    }

    let mut parts: Vec<Value> = vec![json!({"type": "text", "text": message.content})];
    for file in &message.files {
        let is_image = file
            .mime
            .parse::<mime::Mime>()
            .is_ok_and(|parsed| parsed.type_() == mime::IMAGE);
        if !is_image {
            warn!(file = %file.name, mime = %file.mime, "skipping non-image attachment");
            continue;
        }
        let bytes = BASE64.decode(file.data.as_bytes()).map_err(|_| {
            EndpointError::InvalidRequest(format!("attachment {}: invalid base64", file.name))
        })?;
        let image = processor.process(&bytes, &file.mime).map_err(|err| {
            EndpointError::InvalidRequest(format!("attachment {}: {err}", file.name))
        })?;
        parts.push(json!({"type": "image_url", "image_url": {"url": image.data_url()}}));
    }

    Ok(ChatMessage {
        role: message.role.as_str().to_owned(),
        content: Value::Array(parts),
    })
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::endpoints::{MessageFile, MessageRole};
    use crate::media::ImageProcessorOptions;

    fn png_base64() -> String {
        let image =
            DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 8, Rgba([0, 0, 255, 255])));
        let mut buffer = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .unwrap();
        BASE64.encode(buffer)
    }

    fn with_file(mime: &str, data: String) -> EndpointMessage {
        EndpointMessage {
            role: MessageRole::User,
            content: "look at this".to_owned(),
            files: vec![MessageFile {
                name: "photo.png".to_owned(),
                mime: mime.to_owned(),
                data,
            }],
        }
    }

    fn processor() -> ImageProcessor {
        ImageProcessor::new(ImageProcessorOptions::default())
    }

    #[test]
    fn text_only_models_get_plain_strings() {
        let prepared = prepare_messages_with_files(
            &[with_file("image/png", png_base64())],
            &processor(),
            false,
        )
        .unwrap();
        assert_eq!(prepared[0].content, Value::String("look at this".to_owned()));
    }

    #[test]
    fn multimodal_without_files_stays_a_string() {
        let prepared = prepare_messages_with_files(
            &[EndpointMessage::new(MessageRole::User, "hello")],
            &processor(),
            true,
        )
        .unwrap();
        assert_eq!(prepared[0].content, Value::String("hello".to_owned()));
    }

    #[test]
    fn image_attachments_become_content_parts() {
        let prepared = prepare_messages_with_files(
            &[with_file("image/png", png_base64())],
            &processor(),
            true,
        )
        .unwrap();

        let parts = prepared[0].content.as_array().unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0], json!({"type": "text", "text": "look at this"}));
        assert_eq!(parts[1]["type"], json!("image_url"));
        let url = parts[1]["image_url"]["url"].as_str().unwrap();
        assert!(url.starts_with("data:image/"));
    }

    #[test]
    fn non_image_attachments_are_skipped() {
        let prepared = prepare_messages_with_files(
            &[with_file("application/pdf", BASE64.encode(b"%PDF-1.4"))],
            &processor(),
            true,
        )
        .unwrap();

        let parts = prepared[0].content.as_array().unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0]["type"], json!("text"));
    }

    #[test]
    fn invalid_base64_names_the_attachment() {
        let result = prepare_messages_with_files(
            &[with_file("image/png", "not!!base64".to_owned())],
            &processor(),
            true,
        );
        match result {
            Err(EndpointError::InvalidRequest(message)) => {
                assert!(message.contains("photo.png"));
            }
            other => panic!("expected InvalidRequest, got {other:?}"),
        }
    }

    #[test]
    fn roles_are_preserved() {
        let prepared = prepare_messages_with_files(
            &[
                EndpointMessage::new(MessageRole::System, "be kind"),
                EndpointMessage::new(MessageRole::User, "hi"),
                EndpointMessage::new(MessageRole::Assistant, "hello"),
            ],
            &processor(),
            true,
        )
        .unwrap();
        let roles: Vec<&str> = prepared.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["system", "user", "assistant"]);
    }
}
