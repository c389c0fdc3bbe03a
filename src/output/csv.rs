//! CSV export of accumulated records
//!
//! One row per comment; a post without comments still gets one row with the
//! comment columns left empty. Fields are quoted per RFC 4180 and rows end
//! with CRLF.

use crate::model::ExtractedRecord;
use crate::output::OutputResult;
use std::path::Path;

/// Column header of the export
pub const CSV_HEADER: [&str; 9] = [
    "Target",
    "Poster ID",
    "Poster Name",
    "Date",
    "Time",
    "Post Content",
    "Commenter ID",
    "Commenter Name",
    "Comment Text",
];

/// Serializes records to CSV bytes
pub fn records_to_csv(records: &[ExtractedRecord]) -> Vec<u8> {
    let mut out = String::new();
    push_row(&mut out, CSV_HEADER.iter().copied());

    for record in records {
        let post = [
            record.target_id.as_str(),
            record.poster_id.as_str(),
            record.poster_name.as_str(),
            record.date.as_str(),
            record.time.as_str(),
            record.content.as_str(),
        ];

        if record.comments.is_empty() {
            push_row(&mut out, post.iter().copied().chain(["", "", ""]));
        } else {
            for comment in &record.comments {
                push_row(
                    &mut out,
                    post.iter().copied().chain([
                        comment.commenter_id.as_str(),
                        comment.commenter_name.as_str(),
                        comment.text.as_str(),
                    ]),
                );
            }
        }
    }

    out.into_bytes()
}

/// Writes the CSV export to `path`
///
/// # Returns
///
/// * `Ok(usize)` - Number of bytes written
/// * `Err(OutputError)` - Failed to write the file
pub fn write_csv(path: &Path, records: &[ExtractedRecord]) -> OutputResult<usize> {
    let bytes = records_to_csv(records);
    std::fs::write(path, &bytes)?;
    Ok(bytes.len())
}

fn push_row<'a>(out: &mut String, fields: impl Iterator<Item = &'a str>) {
    for (i, field) in fields.enumerate() {
        if i > 0 {
            out.push(',');
        }
        push_field(out, field);
    }
    out.push_str("\r\n");
}

fn push_field(out: &mut String, field: &str) {
    if field.contains([',', '"', '\r', '\n']) {
        out.push('"');
        out.push_str(&field.replace('"', "\"\""));
        out.push('"');
    } else {
        out.push_str(field);
    }
}
