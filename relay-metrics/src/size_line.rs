//! Fixed grammar of the size record written for every copied object:
//!
//! ```text
//! Total size of <key>: <bytes> bytes
//! ```
//!
//! The key may contain spaces; the byte count is always the second to last
//! token and the unit the last, which is what `SIZE_LINE_PATTERN` relies on.

/// Filter pattern extracting the byte count from a size line.
pub const SIZE_LINE_PATTERN: &str = r#"[info=Total, ..., size_value, unit="bytes"]"#;

/// Field of `SIZE_LINE_PATTERN` holding the byte count.
pub const SIZE_VALUE_FIELD: &str = "size_value";

pub fn format_size_line(subject: &str, bytes: u64) -> String {
    format!("Total size of {}: {} bytes", subject, bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_line_layout() {
        assert_eq!(
            format_size_line("temp.txt", 4096),
            "Total size of temp.txt: 4096 bytes"
        );
        assert_eq!(
            format_size_line("my report.txt", 0),
            "Total size of my report.txt: 0 bytes"
        );
    }
}
