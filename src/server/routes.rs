//! API route handlers
//!
//! Request validation, persistence, and response marshalling. The
//! handlers own every filesystem decision; the adapter and compositor
//! only ever see in-memory images.

use super::AppContext;
use crate::compositor::{composite_backdrop, parse_hex_color, Backdrop};
use crate::engine::{encode_png, Engine};
use crate::storage::MediaStore;
use axum::{
    body::Body,
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use serde::Deserialize;
use std::io::Write;
use std::path::PathBuf;
use tokio_util::io::ReaderStream;
use uuid::Uuid;

/// Content types accepted for uploads
const ALLOWED_IMAGE_TYPES: [&str; 3] = ["image/jpeg", "image/png", "image/webp"];

/// Archive name used for batch downloads
const BATCH_ARCHIVE_NAME: &str = "cutout-batch-results.zip";

/// An uploaded file part, buffered as the chunks it arrived in
struct UploadedFile {
    file_name: Option<String>,
    chunks: Vec<Bytes>,
}

impl UploadedFile {
    fn contents(&self) -> Vec<u8> {
        self.chunks.concat()
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

async fn read_file_field(
    mut field: axum::extract::multipart::Field<'_>,
) -> Result<UploadedFile, Response> {
    let file_name = field.file_name().map(ToString::to_string);
    let mut chunks = Vec::new();
    loop {
        match field.chunk().await {
            Ok(Some(chunk)) => chunks.push(chunk),
            Ok(None) => break,
            Err(e) => {
                return Err(error_response(
                    StatusCode::BAD_REQUEST,
                    &format!("Malformed multipart body: {e}"),
                ))
            },
        }
    }
    Ok(UploadedFile { file_name, chunks })
}

/// Handle image upload and background removal
///
/// Accepts multipart form data with an `image` file and an optional
/// `engine` choice; responds with the result image URL or an error.
pub async fn upload_image(State(ctx): State<AppContext>, mut multipart: Multipart) -> Response {
    let mut engine_raw: Option<String> = None;
    let mut upload: Option<UploadedFile> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    &format!("Malformed multipart body: {e}"),
                )
            },
        };
        match field.name() {
            Some("image") => {
                // Content type is checked before any bytes are buffered or
                // written, so rejected uploads never touch the disk.
                let content_type = field.content_type().map(ToString::to_string);
                if !content_type
                    .as_deref()
                    .is_some_and(|ct| ALLOWED_IMAGE_TYPES.contains(&ct))
                {
                    return error_response(
                        StatusCode::BAD_REQUEST,
                        "Invalid file type. Please upload JPEG, PNG, or WebP images.",
                    );
                }
                match read_file_field(field).await {
                    Ok(file) => upload = Some(file),
                    Err(response) => return response,
                }
            },
            Some("engine") => match field.text().await {
                Ok(text) => engine_raw = Some(text),
                Err(e) => {
                    return error_response(
                        StatusCode::BAD_REQUEST,
                        &format!("Malformed multipart body: {e}"),
                    )
                },
            },
            _ => {},
        }
    }

    let Some(upload) = upload else {
        return error_response(StatusCode::BAD_REQUEST, "No image uploaded");
    };

    let engine = match engine_raw.as_deref() {
        None => Engine::default(),
        Some(raw) => match raw.parse::<Engine>() {
            Ok(engine) => engine,
            Err(_) => return error_response(StatusCode::BAD_REQUEST, "Invalid engine choice"),
        },
    };

    if let Err(e) = ctx.store.ensure_dirs() {
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string());
    }

    let file_id = Uuid::new_v4();
    let upload_name = MediaStore::upload_filename(&file_id, upload.file_name.as_deref());
    let result_name = MediaStore::result_filename(&file_id);

    if let Err(e) = ctx.store.write_upload(&upload_name, &upload.chunks).await {
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string());
    }

    // From here on any failure is a processing failure; the upload stays
    // on disk for the retention sweep.
    let image = match image::load_from_memory(&upload.contents()) {
        Ok(image) => image,
        Err(e) => {
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &format!("Processing failed: {e}"),
            )
        },
    };

    let foreground = match ctx.remover.process(&image, engine).await {
        Ok(foreground) => foreground,
        Err(e) => {
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &format!("Processing failed: {e}"),
            )
        },
    };

    let encoded = match encode_png(&foreground) {
        Ok(encoded) => encoded,
        Err(e) => {
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &format!("Processing failed: {e}"),
            )
        },
    };
    let result_path = ctx.store.results_dir().join(&result_name);
    if let Err(e) = tokio::fs::write(&result_path, &encoded).await {
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            &format!("Processing failed: {e}"),
        );
    }

    tracing::info!(engine = %engine, result = %result_name, "Background removed");

    Json(serde_json::json!({
        "success": true,
        "original_url": format!("/media/uploads/{upload_name}"),
        "result_url": format!("/media/results/{result_name}"),
        "filename": result_name,
    }))
    .into_response()
}

/// Apply a background color or image to a processed foreground
pub async fn composite_image(State(ctx): State<AppContext>, mut multipart: Multipart) -> Response {
    let mut filename: Option<String> = None;
    let mut color: Option<String> = None;
    let mut bg_upload: Option<UploadedFile> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    &format!("Malformed multipart body: {e}"),
                )
            },
        };
        match field.name() {
            Some("filename") => match field.text().await {
                Ok(text) => filename = Some(text),
                Err(e) => {
                    return error_response(
                        StatusCode::BAD_REQUEST,
                        &format!("Malformed multipart body: {e}"),
                    )
                },
            },
            Some("color") => match field.text().await {
                Ok(text) => color = Some(text),
                Err(e) => {
                    return error_response(
                        StatusCode::BAD_REQUEST,
                        &format!("Malformed multipart body: {e}"),
                    )
                },
            },
            Some("bg_image") => match read_file_field(field).await {
                Ok(file) => bg_upload = Some(file),
                Err(response) => return response,
            },
            _ => {},
        }
    }

    let Some(filename) = filename.filter(|name| !name.is_empty()) else {
        return error_response(StatusCode::BAD_REQUEST, "Filename required");
    };

    let source_path = match ctx.store.resolve_result(&filename) {
        Ok(path) => path,
        Err(e) => return e.into_response(),
    };

    let composite_name = MediaStore::composite_filename(&filename);

    let foreground_bytes = match tokio::fs::read(&source_path).await {
        Ok(bytes) => bytes,
        Err(e) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    };
    let foreground = match image::load_from_memory(&foreground_bytes) {
        Ok(image) => image,
        Err(e) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    };

    // Uploaded backdrops take a detour through a temp file under uploads/,
    // deleted best-effort after a successful composite. On error paths the
    // retention sweep collects it.
    let mut temp_path: Option<PathBuf> = None;
    let backdrop = if let Some(bg) = &bg_upload {
        if let Err(e) = ctx.store.ensure_dirs() {
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string());
        }
        let temp_name = MediaStore::backdrop_filename(bg.file_name.as_deref());
        match ctx.store.write_upload(&temp_name, &bg.chunks).await {
            Ok(path) => temp_path = Some(path),
            Err(e) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
        }
        match image::load_from_memory(&bg.contents()) {
            Ok(image) => Backdrop::Image(image),
            Err(e) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
        }
    } else if let Some(color) = color.filter(|c| !c.is_empty()) {
        match parse_hex_color(&color) {
            Ok(rgb) => Backdrop::Color(rgb),
            Err(e) => return e.into_response(),
        }
    } else {
        Backdrop::None
    };

    let composite = match composite_backdrop(&foreground, &backdrop) {
        Ok(composite) => composite,
        Err(e) => return e.into_response(),
    };

    let encoded = match encode_png(&composite) {
        Ok(encoded) => encoded,
        Err(e) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    };
    let composite_path = ctx.store.results_dir().join(&composite_name);
    if let Err(e) = tokio::fs::write(&composite_path, &encoded).await {
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string());
    }

    if let Some(path) = temp_path {
        if let Err(e) = tokio::fs::remove_file(&path).await {
            tracing::debug!("Failed to delete temp backdrop {}: {e}", path.display());
        }
    }

    tracing::info!(result = %composite_name, "Composite created");

    Json(serde_json::json!({
        "success": true,
        "result_url": format!("/media/results/{composite_name}"),
        "filename": composite_name,
    }))
    .into_response()
}

#[derive(Debug, Deserialize)]
struct BatchZipRequest {
    #[serde(default)]
    filenames: Vec<String>,
}

/// Create and return a ZIP archive of multiple processed images
///
/// Listed files that do not exist are skipped without error.
pub async fn download_batch_zip(State(ctx): State<AppContext>, body: Bytes) -> Response {
    let request: BatchZipRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    };

    if request.filenames.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "No files specified");
    }

    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default();

    for filename in &request.filenames {
        let Ok(path) = ctx.store.resolve_result(filename) else {
            continue;
        };
        let contents = match tokio::fs::read(&path).await {
            Ok(contents) => contents,
            Err(_) => continue,
        };
        if let Err(e) = writer.start_file(filename.as_str(), options) {
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string());
        }
        if let Err(e) = writer.write_all(&contents) {
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string());
        }
    }

    let archive = match writer.finish() {
        Ok(cursor) => cursor.into_inner(),
        Err(e) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    };

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{BATCH_ARCHIVE_NAME}\""),
            ),
        ],
        archive,
    )
        .into_response()
}

/// Download a single processed image as an attachment
pub async fn download_result(
    State(ctx): State<AppContext>,
    Path(filename): Path<String>,
) -> Response {
    let path = match ctx.store.resolve_result(&filename) {
        Ok(path) => path,
        Err(e) => return e.into_response(),
    };

    let file = match tokio::fs::File::open(&path).await {
        Ok(file) => file,
        Err(_) => return error_response(StatusCode::NOT_FOUND, "File not found"),
    };

    let body = Body::from_stream(ReaderStream::new(file));
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "image/png".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        body,
    )
        .into_response()
}
