use anyhow::Result;
use base64::{engine::general_purpose, Engine as _};
use image::ImageFormat;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

pub mod config;
pub mod openai;
pub mod web;

pub use config::Config;
pub use openai::OpenAiClient;

pub const SYSTEM_PROMPT: &str = concat!(
    "You are an AI that extracts structured data from invoice forms. ",
    "Given an image of an invoice and a template with data types, return the populated JSON. ",
    "If some field values are unfulfilled leave them blank."
);

/// Prompt hint sent to the model. Not valid JSON and never checked against the reply.
pub const JSON_FORMAT_TEMPLATE: &str = r#"
{
  "invoice_no": "string",
  "status": "yes/no",
  "supplier": "string",
  "invoice_date": "MM/dd/yyyy",
  "payment_terms": "string",
  "payment_due_date": "MM/dd/yyyy",
  "delivery_receipt_no": "string",
  "delivery_receipt_date": "MM/dd/yyyy",
  "eta": "MM/dd/yyyy",
  "currency": "string",
  "shipping_detail": "string",
  "remarks": "string",
  "items": [
    {
      "po_number": "string",
      "material": "string",
      "price": float,
      "discount": float,
      "qty_ordered": int,
      "qty_invoiced": int,
      "qty_delivered": int,
      "amount": float
    }
  ]
}
"#;

/// File extensions offered by the upload form.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp"];

/// Base64-encoded image ready to be attached to a chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInput {
    pub data: String,
    pub media_type: &'static str,
}

impl ImageInput {
    /// Encodes `bytes`, sniffing the media type from the content.
    ///
    /// Anything that is not recognizably jpeg, webp or gif is labelled `image/png`.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let media_type = match image::guess_format(bytes) {
            Ok(ImageFormat::Jpeg) => "image/jpeg",
            Ok(ImageFormat::WebP) => "image/webp",
            Ok(ImageFormat::Gif) => "image/gif",
            _ => "image/png",
        };

        Self {
            data: general_purpose::STANDARD.encode(bytes),
            media_type,
        }
    }

    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.media_type, self.data)
    }

    /// Size of the encoded payload, for logging.
    pub fn encoded_len(&self) -> usize {
        self.data.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageUrl {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: MessageContent,
}

/// The message list sent for one invoice image.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionRequest {
    pub messages: Vec<ChatMessage>,
}

impl ExtractionRequest {
    pub fn new(image: &ImageInput) -> Self {
        let messages = vec![
            ChatMessage {
                role: Role::System,
                content: MessageContent::Text(SYSTEM_PROMPT.to_string()),
            },
            ChatMessage {
                role: Role::User,
                content: MessageContent::Text(format!(
                    "Here is the template with data types:\n{JSON_FORMAT_TEMPLATE}"
                )),
            },
            ChatMessage {
                role: Role::User,
                content: MessageContent::Parts(vec![ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: image.data_url(),
                    },
                }]),
            },
        ];

        Self { messages }
    }
}

/// Sends one invoice image to the model and returns its reply untouched.
pub async fn extract(client: &OpenAiClient, image: &ImageInput) -> Result<String> {
    tracing::info!(
        media_type = image.media_type,
        encoded_bytes = image.encoded_len(),
        model = client.model(),
        "extracting invoice data"
    );

    let request = ExtractionRequest::new(image);
    client.complete(&request).await
}

/// Logs go to stderr at INFO unless `RUST_LOG` says otherwise.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();
}
