//! Quote-aware CSV parsing and markdown table rendering for spreadsheet pages.

/// Parse CSV text into rows of fields.
///
/// A `"` toggles quoting; `""` inside quotes is a literal quote. Outside
/// quotes `,` ends a field and `\r`, `\r\n` or `\n` ends a row. A trailing row
/// without a terminator is still emitted. Unbalanced quotes never fail, the
/// remainder of the input simply stays quoted.
pub fn parse_csv(text: &str) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => row.push(std::mem::take(&mut field)),
            '\r' | '\n' if !in_quotes => {
                if c == '\r' && chars.peek() == Some(&'\n') {
                    chars.next();
                }
                row.push(std::mem::take(&mut field));
                rows.push(std::mem::take(&mut row));
            }
            _ => field.push(c),
        }
    }

    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        rows.push(row);
    }
    rows
}

fn escape_cell(cell: &str) -> String {
    cell.trim().replace('|', "\\|")
}

/// Render parsed rows as a pipe table; row 0 is the header. Data rows are
/// padded or cut to the header width.
pub fn render_markdown_table(rows: &[Vec<String>]) -> String {
    let Some((header, body)) = rows.split_first() else {
        return String::new();
    };
    let width = header.len();
    let mut out = String::new();

    let header_cells: Vec<String> = header.iter().map(|c| escape_cell(c)).collect();
    out.push_str(&format!("| {} |\n", header_cells.join(" | ")));
    out.push_str(&format!("| {} |\n", vec!["---"; width].join(" | ")));

    for row in body {
        let mut cells: Vec<String> = row.iter().take(width).map(|c| escape_cell(c)).collect();
        cells.resize(width, String::new());
        out.push_str(&format!("| {} |\n", cells.join(" | ")));
    }
    out
}

/// Parse and render in one step.
pub fn csv_to_markdown(text: &str) -> String {
    render_markdown_table(&parse_csv(text))
}
