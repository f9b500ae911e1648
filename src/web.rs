//! Single-page upload surface and the JSON analysis endpoint.

use crate::{extract, ImageInput, OpenAiClient, IMAGE_EXTENSIONS};
use axum::{
    body::Bytes,
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose, Engine as _};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::{path::Path, sync::Arc};

/// Name of the multipart field carrying the invoice image.
pub const UPLOAD_FIELD: &str = "invoice";

const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub client: Arc<OpenAiClient>,
}

#[derive(Deserialize)]
struct InvoiceRequest {
    image: String,
}

#[derive(Serialize)]
struct AnalysisResponse {
    result: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/extract", post(extract_upload))
        .route("/analyze", post(analyze_invoice))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}

async fn index() -> Html<String> {
    Html(render_page(&Output::Empty))
}

async fn extract_upload(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    let upload = match read_upload(&mut multipart).await {
        Ok(upload) => upload,
        Err(err) => return err.into_response(),
    };

    // Nothing chosen in the file picker: show the bare form.
    let Some(bytes) = upload else {
        return Html(render_page(&Output::Empty)).into_response();
    };

    let image = ImageInput::from_bytes(&bytes);
    match extract(&state.client, &image).await {
        Ok(text) => Html(render_page(&Output::Extracted {
            image: &image,
            text: &text,
        }))
        .into_response(),
        Err(err) => {
            tracing::error!("extraction failed: {err:#}");
            let message = format!("{err:#}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Html(render_page(&Output::Failed { message: &message })),
            )
                .into_response()
        }
    }
}

async fn read_upload(multipart: &mut Multipart) -> Result<Option<Bytes>, MultipartError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        match field.file_name() {
            Some(name) if has_image_extension(name) => {}
            Some("") | None => continue,
            Some(name) => {
                tracing::warn!("ignoring upload {name:?}: not an accepted image type");
                continue;
            }
        }
        let data = field.bytes().await?;
        if !data.is_empty() {
            return Ok(Some(data));
        }
    }

    Ok(None)
}

fn has_image_extension(file_name: &str) -> bool {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|accepted| accepted.eq_ignore_ascii_case(ext))
        })
}

#[axum::debug_handler]
async fn analyze_invoice(
    State(state): State<AppState>,
    Json(payload): Json<InvoiceRequest>,
) -> Result<Json<AnalysisResponse>, StatusCode> {
    let image_data = general_purpose::STANDARD
        .decode(&payload.image)
        .map_err(|_| StatusCode::BAD_REQUEST)?;
    if image_data.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let image = ImageInput::from_bytes(&image_data);
    match extract(&state.client, &image).await {
        Ok(result) => Ok(Json(AnalysisResponse { result })),
        Err(err) => {
            tracing::error!("extraction failed: {err:#}");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

enum Output<'a> {
    Empty,
    Extracted { image: &'a ImageInput, text: &'a str },
    Failed { message: &'a str },
}

fn render_page(output: &Output<'_>) -> String {
    let accept = IMAGE_EXTENSIONS.iter().map(|ext| format!(".{ext}")).join(",");

    let body = match output {
        Output::Empty => String::new(),
        Output::Extracted { image, text } => format!(
            concat!(
                "<figure><img src=\"{src}\" alt=\"Uploaded Invoice\" style=\"max-width:100%\">",
                "<figcaption>Uploaded Invoice</figcaption></figure>\n",
                "<p class=\"success\">Data Extracted</p>\n",
                "<pre><code class=\"language-json\">{text}</code></pre>\n",
            ),
            src = image.data_url(),
            text = escape_html(text),
        ),
        Output::Failed { message } => format!(
            "<p class=\"error\">Extraction failed: {}</p>\n",
            escape_html(message)
        ),
    };

    format!(
        concat!(
            "<!DOCTYPE html>\n",
            "<html lang=\"en\">\n",
            "<head><meta charset=\"utf-8\"><title>Invoice to JSON</title></head>\n",
            "<body>\n",
            "<h1>OCR Invoice to JSON</h1>\n",
            "<form method=\"post\" action=\"/extract\" enctype=\"multipart/form-data\">\n",
            "<label>Upload an invoice image ",
            "<input type=\"file\" name=\"{field}\" accept=\"{accept}\"></label>\n",
            "<button type=\"submit\">Extract</button>\n",
            "</form>\n",
            "{body}",
            "</body>\n",
            "</html>\n",
        ),
        field = UPLOAD_FIELD,
        accept = accept,
        body = body,
    )
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}
