//! Table rendering for command output

use onion_cluster::{InstanceRecord, TerminateEntry};

/// Render rows as a column-aligned table with headers
pub fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let num_cols = headers.len();
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate().take(num_cols) {
            widths[i] = widths[i].max(cell.len());
        }
    }

    let render_row = |cells: Vec<&str>| -> String {
        let line: Vec<String> = cells
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                let w = widths.get(i).copied().unwrap_or(0);
                format!("{:<width$}", cell, width = w)
            })
            .collect();
        line.join("  ").trim_end().to_string()
    };

    let mut out = render_row(headers.to_vec());
    for row in rows {
        out.push('\n');
        out.push_str(&render_row(row.iter().map(String::as_str).collect()));
    }
    out
}

/// Print rows as a column-aligned table with headers
pub fn print_table(headers: &[&str], rows: &[Vec<String>]) {
    println!("{}", render_table(headers, rows));
}

fn or_dash(value: &str) -> String {
    if value.is_empty() {
        "-".to_string()
    } else {
        value.to_string()
    }
}

/// One row per instance record
pub fn record_rows(records: &[InstanceRecord]) -> Vec<Vec<String>> {
    records
        .iter()
        .map(|r| {
            vec![
                r.name.clone(),
                r.role.to_string(),
                r.ordinal.to_string(),
                r.state().to_string(),
                or_dash(&r.instance_id),
                r.error().map(|e| e.message.clone()).unwrap_or_else(|| "-".to_string()),
            ]
        })
        .collect()
}

/// Headers matching [`record_rows`]
pub const RECORD_HEADERS: &[&str] = &["NAME", "ROLE", "ORDINAL", "STATE", "INSTANCE ID", "ERROR"];

/// One row per terminate entry
pub fn terminate_rows(entries: &[TerminateEntry]) -> Vec<Vec<String>> {
    entries
        .iter()
        .map(|e| {
            let detail = match (e.skip_reason, e.record.error()) {
                (Some(reason), _) => reason.to_string(),
                (None, Some(err)) => err.message.clone(),
                (None, None) => "-".to_string(),
            };
            vec![
                e.record.name.clone(),
                or_dash(&e.record.instance_id),
                e.disposition.to_string(),
                detail,
            ]
        })
        .collect()
}

/// Headers matching [`terminate_rows`]
pub const TERMINATE_HEADERS: &[&str] = &["NAME", "INSTANCE ID", "RESULT", "DETAIL"];
