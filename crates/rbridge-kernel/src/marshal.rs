//! Vector and matrix marshaling.
//!
//! Small values are written inline as `c(...)`. Values above the spooling
//! threshold are written to a temp file, one token per whitespace-separated
//! position, and the engine reads them back with `scan(...)`. The caller
//! owns the returned path and must register it for deletion.
//!
//! Elements always travel in column-major order to match `byrow=FALSE`.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use rbridge_types::Matrix;

use crate::error::{BridgeError, BridgeResult};
use crate::literal::{decode_token, encode_element};
use crate::protocol::quote;

/// How a vector or matrix literal is sized and laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarshalOptions {
    /// Spool to a file when the element count is strictly above this.
    pub spool_threshold: usize,
    /// Inline lists break the line after this many elements.
    pub elements_per_line: usize,
}

impl Default for MarshalOptions {
    fn default() -> Self {
        Self {
            spool_threshold: 20,
            elements_per_line: 10,
        }
    }
}

/// A literal ready to splice into a statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatrixLiteral {
    pub text: String,
    /// Temp file the literal reads from, if it was spooled.
    pub spooled: Option<PathBuf>,
}

/// Emit a matrix (or vector, when `as_vector`) literal.
///
/// Matrices are wrapped in `matrix(...,nrow=M,ncol=N,byrow=FALSE)`; vectors
/// are the bare list. Spooled files are created in `spool_dir`.
pub fn matrix_literal(
    matrix: &Matrix,
    as_vector: bool,
    options: &MarshalOptions,
    spool_dir: &Path,
) -> BridgeResult<MatrixLiteral> {
    if as_vector {
        matrix.check_vector()?;
    } else {
        matrix.check_shape_survives()?;
    }

    let (list, spooled) = if matrix.len() > options.spool_threshold {
        let path = spool(matrix, spool_dir)
            .map_err(|e| BridgeError::io("spooling values to a temp file", e))?;
        (scan_expr(&path, matrix.len()), Some(path))
    } else {
        (
            inline_list(matrix.column_major(), matrix.is_integer(), options.elements_per_line),
            None,
        )
    };

    let text = if as_vector {
        list
    } else {
        format!(
            "matrix({},nrow={},ncol={},byrow=FALSE)",
            list,
            matrix.rows(),
            matrix.cols()
        )
    };

    Ok(MatrixLiteral { text, spooled })
}

/// `c(v1,v2,...)` with a newline after every `per_line` elements.
pub fn inline_list(values: impl Iterator<Item = f64>, integer: bool, per_line: usize) -> String {
    let mut out = String::from("c(");
    let mut count = 0usize;
    for v in values {
        if count > 0 {
            out.push(',');
            if per_line > 0 && count % per_line == 0 {
                out.push('\n');
            }
        }
        out.push_str(&encode_element(v, integer));
        count += 1;
    }
    if count == 0 {
        return "numeric(0)".to_string();
    }
    out.push(')');
    out
}

/// Read exactly `count` numbers from a spooled file.
pub fn scan_expr(path: &Path, count: usize) -> String {
    format!(
        "scan({},n={},quiet=TRUE)",
        quote(&path.to_string_lossy()),
        count
    )
}

/// Write the elements to a fresh file in `dir` and keep it on disk.
pub fn spool(matrix: &Matrix, dir: &Path) -> std::io::Result<PathBuf> {
    let mut file = tempfile::Builder::new()
        .prefix("spool-")
        .suffix(".txt")
        .tempfile_in(dir)?;

    {
        let mut writer = BufWriter::new(file.as_file_mut());
        write_tokens(&mut writer, matrix)?;
        writer.flush()?;
    }

    let (_, path) = file.keep().map_err(|e| e.error)?;
    tracing::trace!(path = %path.display(), elements = matrix.len(), "spooled values");
    Ok(path)
}

fn write_tokens(writer: &mut BufWriter<&mut File>, matrix: &Matrix) -> std::io::Result<()> {
    for (i, v) in matrix.column_major().enumerate() {
        if i > 0 {
            writer.write_all(if i % 10 == 0 { b"\n" } else { b" " })?;
        }
        writer.write_all(encode_element(v, matrix.is_integer()).as_bytes())?;
    }
    writer.write_all(b"\n")
}

/// Parse a `write.table` dump into a matrix.
///
/// Blank lines are skipped. Every row must have the same number of columns.
pub fn parse_table<S: AsRef<str>>(lines: &[S]) -> BridgeResult<Matrix> {
    let mut data = Vec::new();
    let mut rows = 0usize;
    let mut cols: Option<usize> = None;
    let mut integer = true;

    for line in lines {
        let line = line.as_ref();
        if line.trim().is_empty() {
            continue;
        }

        let mut width = 0usize;
        for raw in line.split_whitespace() {
            let token = decode_token(raw)
                .ok_or_else(|| BridgeError::decode(line, format!("bad element {:?}", raw)))?;
            integer &= raw.trim_matches('"').parse::<i64>().is_ok();
            data.push(token.as_f64());
            width += 1;
        }

        match cols {
            None => cols = Some(width),
            Some(expected) if expected != width => {
                return Err(BridgeError::decode(
                    line,
                    format!("row {} has {} columns, expected {}", rows, width, expected),
                ));
            }
            Some(_) => {}
        }
        rows += 1;
    }

    let cols = cols.unwrap_or(0);
    let matrix = Matrix::new(rows, cols, data)?;
    Ok(matrix.with_integer(integer && rows > 0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rbridge_types::ShapeError;

    fn options() -> MarshalOptions {
        MarshalOptions::default()
    }

    #[test]
    fn small_matrix_is_inline_column_major() {
        let m = Matrix::new(2, 2, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let lit = matrix_literal(&m, false, &options(), dir.path()).unwrap();
        assert_eq!(lit.text, "matrix(c(1.0,3.0,2.0,4.0),nrow=2,ncol=2,byrow=FALSE)");
        assert!(lit.spooled.is_none());
    }

    #[test]
    fn inline_lists_wrap_lines() {
        let text = inline_list((1..=12).map(f64::from), true, 5);
        assert_eq!(text, "c(1,2,3,4,5,\n6,7,8,9,10,\n11,12)");
    }

    #[test]
    fn empty_list_is_numeric_zero() {
        assert_eq!(inline_list(std::iter::empty(), false, 10), "numeric(0)");
    }

    #[test]
    fn vector_must_have_vector_shape() {
        let m = Matrix::from_fn(3, 3, |r, c| (r * 3 + c) as f64).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let err = matrix_literal(&m, true, &options(), dir.path()).unwrap_err();
        assert!(matches!(err, BridgeError::Shape(_)));
    }

    #[test]
    fn vector_is_bare_list() {
        let v = Matrix::column(vec![1.5, f64::NAN, f64::INFINITY]);
        let dir = tempfile::tempdir().unwrap();
        let lit = matrix_literal(&v, true, &options(), dir.path()).unwrap();
        assert_eq!(lit.text, "c(1.5,NaN,Inf)");
    }

    #[test]
    fn large_matrix_is_spooled() {
        let m = Matrix::from_fn(10, 10, |r, c| (r * 10 + c) as f64).unwrap().with_integer(true);
        let dir = tempfile::tempdir().unwrap();
        let lit = matrix_literal(&m, false, &options(), dir.path()).unwrap();

        let path = lit.spooled.expect("should spool");
        assert!(path.starts_with(dir.path()));
        assert!(lit.text.starts_with("matrix(scan("));
        assert!(lit.text.contains(",n=100,quiet=TRUE),nrow=10,ncol=10,byrow=FALSE)"));

        let content = std::fs::read_to_string(&path).unwrap();
        let tokens: Vec<&str> = content.split_whitespace().collect();
        assert_eq!(tokens.len(), 100);
        // Column-major: second token is row 1, column 0
        assert_eq!(tokens[0], "0");
        assert_eq!(tokens[1], "10");
    }

    #[test]
    fn threshold_is_exclusive() {
        let dir = tempfile::tempdir().unwrap();
        let opts = MarshalOptions {
            spool_threshold: 4,
            elements_per_line: 10,
        };
        let four = Matrix::from_fn(2, 2, |_, _| 1.0).unwrap();
        assert!(matrix_literal(&four, false, &opts, dir.path()).unwrap().spooled.is_none());
        let five = Matrix::row(vec![1.0; 5]);
        assert!(matrix_literal(&five, true, &opts, dir.path()).unwrap().spooled.is_some());
    }

    #[test]
    fn parse_table_builds_rows() {
        let lines = ["1 2 3", "4 5 6", ""];
        let m = parse_table(&lines).unwrap();
        assert_eq!(m.rows(), 2);
        assert_eq!(m.cols(), 3);
        assert_eq!(m.as_slice(), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert!(m.is_integer());
    }

    #[test]
    fn parse_table_decodes_specials() {
        let lines = ["TRUE NaN", "-Inf 0.5"];
        let m = parse_table(&lines).unwrap();
        assert_eq!(m.get(0, 0), Some(1.0));
        assert!(m.get(0, 1).unwrap().is_nan());
        assert_eq!(m.get(1, 0), Some(f64::NEG_INFINITY));
        assert!(!m.is_integer());
    }

    #[test]
    fn parse_table_rejects_ragged_rows() {
        let err = parse_table(&["1 2", "3"]).unwrap_err();
        assert!(matches!(err, BridgeError::Decode { .. }));
    }

    #[test]
    fn parse_table_rejects_garbage() {
        let err = parse_table(&["1 two"]).unwrap_err();
        assert!(err.to_string().contains("bad element"));
    }

    #[test]
    fn empty_dimension_matrix_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let flat = Matrix::new(3, 0, vec![]).unwrap();
        let err = matrix_literal(&flat, false, &options(), dir.path()).unwrap_err();
        assert!(matches!(
            err,
            BridgeError::Shape(ShapeError::EmptyDimension { rows: 3, cols: 0 })
        ));
        let none = Matrix::new(0, 0, vec![]).unwrap();
        let lit = matrix_literal(&none, false, &options(), dir.path()).unwrap();
        assert_eq!(lit.text, "matrix(numeric(0),nrow=0,ncol=0,byrow=FALSE)");
    }

    #[test]
    fn parse_empty_table() {
        let lines: [&str; 0] = [];
        let m = parse_table(&lines).unwrap();
        assert!(m.is_empty());
    }
}
