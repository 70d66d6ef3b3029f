use migrator_core::Outcome;

/// Print the result trail of an up/down/redo run.
pub fn print_outcomes(outcomes: &[Outcome]) {
    let rows: Vec<Vec<String>> = outcomes
        .iter()
        .map(|o| vec![o.name.clone(), format!("status: {}", o.status)])
        .collect();
    print!("{}", render(&rows));
}

/// Print one line per migration file with its version and apply date.
pub fn print_status(outcomes: &[Outcome]) {
    let rows: Vec<Vec<String>> = outcomes
        .iter()
        .map(|o| {
            vec![
                o.name.clone(),
                format!("status: {}", o.status),
                format!("version: {}", o.version_label()),
                format!("date: {}", o.applied_at_label()),
            ]
        })
        .collect();
    print!("{}", render(&rows));
}

/// Pad every column to its widest cell and join with ` | `.
fn render(rows: &[Vec<String>]) -> String {
    let columns = rows.iter().map(Vec::len).max().unwrap_or(0);
    let mut widths = vec![0; columns];
    for row in rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    for row in rows {
        let line: Vec<String> = row
            .iter()
            .zip(&widths)
            .map(|(cell, &w)| format!("{cell:<w$}"))
            .collect();
        out.push_str(line.join(" | ").trim_end());
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn columns_are_aligned() {
        let table = render(&[
            row(&["2024_01_01_000000_init.sql", "status: migrate ok"]),
            row(&["a.sql", "status: down ok"]),
        ]);
        assert_eq!(
            table,
            "2024_01_01_000000_init.sql | status: migrate ok\n\
             a.sql                      | status: down ok\n"
        );
    }

    #[test]
    fn empty_trail_prints_nothing() {
        assert_eq!(render(&[]), "");
    }
}
