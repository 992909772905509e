//! Session code format: `P{NNN}S{NNN}`.

use regex::Regex;
use std::sync::OnceLock;

fn patient_code_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"P(\d{3})").expect("valid regex"))
}

/// Render `P###S###` from a patient ordinal and a per-patient
/// sequential session index (both 1-indexed).
pub fn format_session_code(patient_ordinal: u32, session_ordinal: u32) -> String {
    format!("P{patient_ordinal:03}S{session_ordinal:03}")
}

/// Path-derived metadata fallback: scan a filename/path for a `P###`
/// patient code when no explicit patient id is supplied.
pub fn extract_patient_code_from_path(path: &str) -> Option<String> {
    patient_code_re().captures(path).map(|c| format!("P{}", &c[1]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_zero_padded_code() {
        assert_eq!(format_session_code(7, 1), "P007S001");
        assert_eq!(format_session_code(123, 45), "P123S045");
    }

    #[test]
    fn extracts_patient_code_from_filename() {
        assert_eq!(
            extract_patient_code_from_path("uploads/P042/session_2024.c3d"),
            Some("P042".to_string())
        );
        assert_eq!(extract_patient_code_from_path("uploads/no_code_here.c3d"), None);
    }
}
