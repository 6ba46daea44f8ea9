use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};

/// `Content-Disposition` value for a download: a quoted ASCII fallback plus the
/// RFC 5987 UTF-8 form.
pub fn attachment_disposition(file_name: &str) -> String {
    let ascii_filename = file_name
        .chars()
        .filter(|c| c.is_ascii() && !c.is_control() && *c != '"' && *c != '\\' && *c != ';')
        .collect::<String>();
    let fallback_filename = if ascii_filename.trim().is_empty() {
        "file"
    } else {
        ascii_filename.as_str()
    };

    let encoded_filename = utf8_percent_encode(file_name, NON_ALPHANUMERIC).to_string();

    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback_filename, encoded_filename
    )
}
