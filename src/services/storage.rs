//! Public download URLs for generated report artifacts.

/// Resolve the URL a user can download a generated report from.
///
/// The audit backend reports either an absolute URL or a path inside the
/// storage bucket. Paths are turned into Supabase public-object URLs:
/// `{base}/storage/v1/object/public/{bucket}/{path}`.
pub fn public_url(storage_base: &str, bucket: &str, pdf_ref: &str) -> Option<String> {
    let pdf_ref = pdf_ref.trim();
    if pdf_ref.is_empty() {
        return None;
    }

    if pdf_ref.starts_with("https://") || pdf_ref.starts_with("http://") {
        return Some(pdf_ref.to_string());
    }

    let path = pdf_ref.trim_start_matches('/');
    // Backends sometimes include the bucket name in the stored path.
    let path = path
        .strip_prefix(bucket)
        .and_then(|rest| rest.strip_prefix('/'))
        .unwrap_or(path);

    Some(format!(
        "{}/storage/v1/object/public/{}/{}",
        storage_base.trim_end_matches('/'),
        bucket,
        path
    ))
}
