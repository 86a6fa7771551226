//! Minimal single-font PDF generation for plain text.
//!
//! Keeps text attachments and rendered emails self-contained without a
//! browser engine. Output is a complete PDF 1.4 document: one page,
//! Helvetica, correct xref offsets.

const PAGE_WIDTH: f32 = 612.0;
const PAGE_HEIGHT: f32 = 792.0;
const MARGIN: f32 = 72.0;
const FONT_SIZE: f32 = 11.0;
const LEADING: f32 = 14.0;
const MAX_LINES: usize = 48;
const MAX_LINE_CHARS: usize = 95;

/// Render plain text into PDF bytes.
#[must_use]
pub fn text_to_pdf_bytes(text: &str) -> Vec<u8> {
    let mut content = String::new();
    content.push_str(&format!(
        "BT /F1 {FONT_SIZE} Tf {MARGIN} {} Td {LEADING} TL\n",
        PAGE_HEIGHT - MARGIN
    ));
    for line in wrap_lines(text) {
        content.push_str(&format!("({}) Tj T*\n", escape_pdf_text(&line)));
    }
    content.push_str("ET\n");

    let objects = [
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
        format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {PAGE_WIDTH} {PAGE_HEIGHT}] \
             /Resources << /Font << /F1 << /Type /Font /Subtype /Type1 \
             /BaseFont /Helvetica >> >> >> /Contents 4 0 R >>"
        ),
        format!("<< /Length {} >>\nstream\n{content}endstream", content.len()),
    ];

    let mut out: Vec<u8> = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n{body}\nendobj\n", i + 1).as_bytes());
    }

    let xref_offset = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n", objects.len() + 1).as_bytes());
    out.extend_from_slice(b"0000000000 65535 f \n");
    for offset in offsets {
        out.extend_from_slice(format!("{offset:010} 00000 n \n").as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref_offset}\n%%EOF\n",
            objects.len() + 1
        )
        .as_bytes(),
    );
    out
}

fn wrap_lines(text: &str) -> Vec<String> {
    let mut lines = Vec::new();
    for raw in text.lines() {
        if raw.is_empty() {
            lines.push(String::new());
            continue;
        }
        let chars: Vec<char> = raw.chars().collect();
        for chunk in chars.chunks(MAX_LINE_CHARS) {
            lines.push(chunk.iter().collect());
        }
    }
    lines.truncate(MAX_LINES);
    lines
}

fn escape_pdf_text(line: &str) -> String {
    let mut escaped = String::with_capacity(line.len());
    for ch in line.chars() {
        match ch {
            '(' => escaped.push_str("\\("),
            ')' => escaped.push_str("\\)"),
            '\\' => escaped.push_str("\\\\"),
            c if c.is_ascii() && !c.is_ascii_control() => escaped.push(c),
            // Non-ASCII falls back to '?' rather than emitting bytes the
            // standard font cannot encode.
            _ => escaped.push('?'),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_is_a_pdf() {
        let bytes = text_to_pdf_bytes("Hello, archive!");
        assert!(bytes.starts_with(b"%PDF"));
        assert!(bytes.ends_with(b"%%EOF\n"));
    }

    #[test]
    fn text_appears_in_content_stream() {
        let bytes = text_to_pdf_bytes("FindMeInside");
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains("FindMeInside"));
    }

    #[test]
    fn parens_and_backslashes_are_escaped() {
        let bytes = text_to_pdf_bytes("a(b)c\\d");
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains("a\\(b\\)c\\\\d"));
    }

    #[test]
    fn xref_offsets_point_at_objects() {
        let bytes = text_to_pdf_bytes("offsets");
        let text = String::from_utf8_lossy(&bytes);
        let xref_pos = text.find("xref\n").unwrap();
        // First object offset from the xref table matches "1 0 obj".
        let table = &text[xref_pos..];
        let first_entry = table.lines().nth(3).unwrap();
        let offset: usize = first_entry[..10].parse().unwrap();
        assert!(text[offset..].starts_with("1 0 obj"));
    }

    #[test]
    fn long_input_is_bounded() {
        let long: String = "line\n".repeat(500);
        let bytes = text_to_pdf_bytes(&long);
        // One page only, bounded line count.
        assert!(bytes.len() < 16 * 1024);
    }
}
