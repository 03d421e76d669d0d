//! Plain text wire protocol. Client statements are `'\0'`-terminated;
//! responses are pipe-delimited rows, one per line, a `'\0'` terminator per
//! statement, and a trailing status line: `SUCCESS`, `FAILURE`, or
//! `<code> > <detail>`.

use columnar::Chunk;
use common::DbError;

/// Ends every client message and every server response.
pub const MESSAGE_DELIMITER: u8 = 0;

/// Separator between columns of one row.
pub const COLUMN_SEPARATOR: &str = " | ";

/// Longest accepted statement, in bytes.
pub const MAX_STATEMENT_LEN: usize = 8192;

/// Render the header row of column names.
pub fn format_header(schema: &[String]) -> String {
    schema.join(COLUMN_SEPARATOR)
}

/// Render a chunk's rows, one line each.
pub fn format_chunk(chunk: &Chunk) -> String {
    let mut out = String::new();
    for row in 0..chunk.rows() {
        let line = (0..chunk.column_num())
            .map(|pos| chunk.get_value(pos, row).to_string())
            .collect::<Vec<_>>()
            .join(COLUMN_SEPARATOR);
        out.push_str(&line);
        out.push('\n');
    }
    out
}

/// The trailing status line for a successful statement.
pub fn success_line() -> &'static str {
    "SUCCESS\n"
}

/// The trailing status line for a failed statement:
/// `<code-name> > <human message>`.
pub fn failure_line(err: &DbError) -> String {
    format!("{} > {}\n", err.code_name(), err)
}

/// Extract the next `'\0'`-terminated statement from a receive buffer.
/// Returns the statement text and consumes it (and its terminator) from the
/// buffer.
pub fn take_statement(buffer: &mut Vec<u8>) -> Result<Option<String>, DbError> {
    let end = match buffer.iter().position(|&b| b == MESSAGE_DELIMITER) {
        Some(end) => end,
        None if buffer.len() > MAX_STATEMENT_LEN => {
            return Err(DbError::TooLong(format!(
                "statement exceeds {MAX_STATEMENT_LEN} bytes"
            )))
        }
        None => return Ok(None),
    };
    let raw: Vec<u8> = buffer.drain(..=end).collect();
    let text = String::from_utf8_lossy(&raw[..end]).into_owned();
    Ok(Some(text))
}
