//! Output formatting for the REPL.
//!
//! Values are shown the way the engine's own console prints them: `[1] ...`
//! for scalars and vectors, a labelled grid for matrices.

use rbridge_kernel::{Matrix, Scalar, ValueType, Variable};

/// Format a single number the way the engine prints it.
pub fn format_number(v: f64) -> String {
    if v.is_nan() {
        "NaN".to_string()
    } else if v == f64::INFINITY {
        "Inf".to_string()
    } else if v == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else {
        v.to_string()
    }
}

/// Format a scalar with the console's `[1]` prefix.
pub fn format_scalar(value: &Scalar) -> String {
    let text = match value {
        Scalar::Bool(true) => "TRUE".to_string(),
        Scalar::Bool(false) => "FALSE".to_string(),
        Scalar::Long(n) => n.to_string(),
        Scalar::Double(d) => format_number(*d),
    };
    format!("[1] {text}")
}

/// Format a vector on one line.
pub fn format_vector(values: &Matrix) -> String {
    if values.is_empty() {
        return "numeric(0)".to_string();
    }
    let mut line = String::from("[1]");
    for v in values.column_major() {
        line.push(' ');
        line.push_str(&format_number(v));
    }
    line
}

/// Format a matrix as a right-aligned grid with `[r,]` and `[,c]` labels.
pub fn format_matrix(m: &Matrix) -> String {
    if m.is_empty() {
        return format!("<{} x {} matrix>", m.rows(), m.cols());
    }

    let row_labels: Vec<String> = (1..=m.rows()).map(|r| format!("[{r},]")).collect();
    let label_width = row_labels.iter().map(String::len).max().unwrap_or(0);

    let columns: Vec<(String, Vec<String>)> = (0..m.cols())
        .map(|c| {
            let cells = (0..m.rows())
                .map(|r| format_number(m.get(r, c).unwrap_or(f64::NAN)))
                .collect();
            (format!("[,{}]", c + 1), cells)
        })
        .collect();
    let widths: Vec<usize> = columns
        .iter()
        .map(|(header, cells)| {
            cells
                .iter()
                .map(String::len)
                .chain(std::iter::once(header.len()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let mut lines = Vec::with_capacity(m.rows() + 1);
    let mut header = " ".repeat(label_width);
    for ((title, _), &width) in columns.iter().zip(&widths) {
        header.push_str(&format!(" {title:>width$}"));
    }
    lines.push(header);

    for (r, label) in row_labels.iter().enumerate() {
        let mut line = format!("{label:<label_width$}");
        for ((_, cells), &width) in columns.iter().zip(&widths) {
            line.push_str(&format!(" {:>width$}", cells[r]));
        }
        lines.push(line);
    }
    lines.join("\n")
}

/// One `name  type` line per variable.
pub fn format_variables(vars: &[Variable]) -> String {
    if vars.is_empty() {
        return "(no variables)".to_string();
    }
    let width = vars.iter().map(|v| v.name.len()).max().unwrap_or(0);
    vars.iter()
        .map(|v| {
            let ty = if v.ty == ValueType::Unknown { "(unbound)" } else { v.ty.as_str() };
            format!("{:<width$}  {}", v.name, ty)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_follow_console_spelling() {
        assert_eq!(format_number(1.0), "1");
        assert_eq!(format_number(0.25), "0.25");
        assert_eq!(format_number(f64::NAN), "NaN");
        assert_eq!(format_number(f64::NEG_INFINITY), "-Inf");
    }

    #[test]
    fn scalars_have_index_prefix() {
        assert_eq!(format_scalar(&Scalar::Bool(false)), "[1] FALSE");
        assert_eq!(format_scalar(&Scalar::Long(-3)), "[1] -3");
        assert_eq!(format_scalar(&Scalar::Double(2.5)), "[1] 2.5");
    }

    #[test]
    fn matrix_grid() {
        let m = Matrix::from_rows(vec![vec![1.0, 20.0], vec![3.5, 4.0]]).unwrap();
        assert_eq!(
            format_matrix(&m),
            "     [,1] [,2]\n[1,]    1   20\n[2,]  3.5    4"
        );
    }

    #[test]
    fn empty_values() {
        assert_eq!(format_vector(&Matrix::column(vec![])), "numeric(0)");
        assert_eq!(format_variables(&[]), "(no variables)");
    }

    #[test]
    fn variable_listing_aligns_names() {
        let vars = vec![
            Variable::new("a", ValueType::Double),
            Variable::new("long_name", ValueType::Matrix),
            Variable::unbound("rb_tmp_1"),
        ];
        insta::assert_snapshot!(format_variables(&vars), @r"
        a          double
        long_name  matrix
        rb_tmp_1   (unbound)
        ");
    }
}
