//! Upload validation and blob-storage key layout for scan videos and models.

use crate::error::CoreError;
use crate::types::{JobId, Timestamp, UserId};

/// Video container formats accepted for scanning.
pub const SUPPORTED_VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "webm", "avi", "mkv"];

/// Default upper bound on an uploaded video (500 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 500 * 1024 * 1024;

/// Longest sanitized filename kept in a storage key.
const MAX_SANITIZED_LEN: usize = 100;

/// Prefix for raw video objects.
pub const VIDEO_PREFIX: &str = "videos";

/// Prefix for published model objects.
pub const MODEL_PREFIX: &str = "models";

/// Validate an uploaded video's name and size.
///
/// Returns the lower-cased extension on success.
pub fn validate_video(filename: &str, size_bytes: u64, max_bytes: u64) -> Result<String, CoreError> {
    if filename.trim().is_empty() {
        return Err(CoreError::Validation("Video filename is required".into()));
    }

    let ext = match filename.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => ext.to_lowercase(),
        _ => String::new(),
    };
    if !SUPPORTED_VIDEO_EXTENSIONS.contains(&ext.as_str()) {
        return Err(CoreError::Validation(format!(
            "Unsupported video format '.{ext}'. Supported: {}",
            SUPPORTED_VIDEO_EXTENSIONS
                .iter()
                .map(|e| format!(".{e}"))
                .collect::<Vec<_>>()
                .join(", ")
        )));
    }

    if size_bytes == 0 {
        return Err(CoreError::Validation("Video file is empty".into()));
    }
    if size_bytes > max_bytes {
        return Err(CoreError::Validation(format!(
            "Video file is too large ({size_bytes} bytes, limit {max_bytes} bytes)"
        )));
    }

    Ok(ext)
}

/// Reduce a user-supplied filename to a safe storage-key component.
///
/// Path separators and anything outside `[A-Za-z0-9._-]` become `_`,
/// leading dots are stripped and the result is capped in length.
pub fn sanitize_filename(filename: &str) -> String {
    let base = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename);

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let trimmed = cleaned.trim_start_matches('.');
    let mut out: String = trimmed.chars().take(MAX_SANITIZED_LEN).collect();
    if out.is_empty() {
        out.push_str("video");
    }
    out
}

/// Per-user, collision-resistant key for a raw video.
///
/// `videos/{user_id}/{unix_ts}_{job_id}_{sanitized_filename}`
pub fn video_storage_key(user_id: UserId, job_id: JobId, filename: &str, now: Timestamp) -> String {
    format!(
        "{VIDEO_PREFIX}/{user_id}/{}_{job_id}_{}",
        now.timestamp(),
        sanitize_filename(filename)
    )
}

/// Key for a job's published model artifact.
///
/// `models/{user_id}/{job_id}/{artifact_name}`
pub fn model_storage_key(user_id: UserId, job_id: JobId, artifact_name: &str) -> String {
    format!(
        "{MODEL_PREFIX}/{user_id}/{job_id}/{}",
        sanitize_filename(artifact_name)
    )
}

/// MIME type for a stored object, by extension.
pub fn content_type_for(filename: &str) -> &'static str {
    let ext = filename
        .rsplit_once('.')
        .map(|(_, e)| e.to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "avi" => "video/x-msvideo",
        "mkv" => "video/x-matroska",
        "ply" => "application/octet-stream",
        "glb" => "model/gltf-binary",
        "obj" => "model/obj",
        _ => "application/octet-stream",
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::TimeZone;
    use uuid::Uuid;

    use super::*;

    #[test]
    fn accepts_supported_extension_case_insensitive() {
        assert_eq!(validate_video("Room.MP4", 10, 100).unwrap(), "mp4");
        assert_eq!(validate_video("clip.webm", 10, 100).unwrap(), "webm");
    }

    #[test]
    fn rejects_unsupported_or_missing_extension() {
        assert_matches!(validate_video("notes.txt", 10, 100), Err(CoreError::Validation(_)));
        assert_matches!(validate_video("noext", 10, 100), Err(CoreError::Validation(_)));
        assert_matches!(validate_video(".mp4", 10, 100), Err(CoreError::Validation(_)));
        assert_matches!(validate_video("  ", 10, 100), Err(CoreError::Validation(_)));
    }

    #[test]
    fn rejects_empty_and_oversized_files() {
        assert_matches!(validate_video("a.mp4", 0, 100), Err(CoreError::Validation(_)));
        assert_matches!(validate_video("a.mp4", 101, 100), Err(CoreError::Validation(msg)) if msg.contains("too large"));
        assert!(validate_video("a.mp4", 100, 100).is_ok());
    }

    #[test]
    fn sanitize_strips_paths_and_odd_characters() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\videos\\my scan (1).mp4"), "my_scan__1_.mp4");
        assert_eq!(sanitize_filename("...hidden.mov"), "hidden.mov");
        assert_eq!(sanitize_filename("???"), "___");
        assert_eq!(sanitize_filename(""), "video");
    }

    #[test]
    fn sanitize_caps_length() {
        let long = format!("{}.mp4", "a".repeat(300));
        assert_eq!(sanitize_filename(&long).len(), 100);
    }

    #[test]
    fn video_key_is_user_scoped_and_unique_per_job() {
        let user = Uuid::new_v4();
        let now = chrono::Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let a = video_storage_key(user, Uuid::new_v4(), "scan.mp4", now);
        let b = video_storage_key(user, Uuid::new_v4(), "scan.mp4", now);
        assert!(a.starts_with(&format!("videos/{user}/{}_", now.timestamp())));
        assert!(a.ends_with("_scan.mp4"));
        assert_ne!(a, b);
    }

    #[test]
    fn model_key_layout() {
        let user = Uuid::new_v4();
        let job = Uuid::new_v4();
        assert_eq!(
            model_storage_key(user, job, "final_mesh.ply"),
            format!("models/{user}/{job}/final_mesh.ply")
        );
    }

    #[test]
    fn content_types() {
        assert_eq!(content_type_for("x.MOV"), "video/quicktime");
        assert_eq!(content_type_for("mesh.ply"), "application/octet-stream");
        assert_eq!(content_type_for("unknown"), "application/octet-stream");
    }
}
