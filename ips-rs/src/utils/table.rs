//! Record table rendering

use prettytable::{Cell, Row, Table};

/// Create a record table with centered bold headers
pub fn create_table(headers: Vec<&str>) -> Table {
    let mut table = Table::new();
    table.set_format(*prettytable::format::consts::FORMAT_NO_LINESEP_WITH_TITLE);

    let header_cells: Vec<Cell> = headers
        .into_iter()
        .map(|h| Cell::new(h).style_spec("bc"))
        .collect();
    table.set_titles(Row::new(header_cells));

    table
}

/// Add a row, right-aligning numeric and offset columns
///
/// Hex dumps and labels stay left-aligned so byte columns line up.
pub fn add_table_row(table: &mut Table, cells: Vec<String>) {
    let row_cells: Vec<Cell> = cells
        .into_iter()
        .map(|s| {
            let spec = if is_numeric(&s) { "r" } else { "l" };
            Cell::new(&s).style_spec(spec)
        })
        .collect();
    table.add_row(Row::new(row_cells));
}

fn is_numeric(cell: &str) -> bool {
    match cell.strip_prefix("0x") {
        Some(hex) => !hex.is_empty() && hex.chars().all(|c| c.is_ascii_hexdigit()),
        None => !cell.is_empty() && cell.chars().all(|c| c.is_ascii_digit()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_rows() {
        let mut table = create_table(vec!["#", "Offset"]);
        add_table_row(&mut table, vec!["0".to_string(), "0x000010".to_string()]);
        assert_eq!(table.len(), 1);

        let rendered = table.to_string();
        assert!(rendered.contains("0x000010"));
    }

    #[test]
    fn test_numeric_cells() {
        assert!(is_numeric("42"));
        assert!(is_numeric("0x00FFEE"));
        assert!(!is_numeric("0x"));
        assert!(!is_numeric("AA BB"));
        assert!(!is_numeric("Literal"));
        assert!(!is_numeric(""));
    }
}
