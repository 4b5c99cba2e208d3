//! Wire commands.
//!
//! Every command is one or more `;`-terminated statements on a single line.
//!
//! | Purpose | Command | Reply |
//! |---------|---------|-------|
//! | assignment | `name<-expr;` | none |
//! | fence | `exists("name");` | one line |
//! | scalar read | `cat(name);cat('\n');` | one non-blank line |
//! | table read | `write.table(name,...);print("mark");` | rows, then the marker |
//! | raw script | `script` then `print("mark");` | any lines, then the marker |
//! | disposal | `rm("name");` | none |
//! | shutdown | `q();` | none |

use std::sync::LazyLock;

use regex::Regex;

static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[A-Za-z]|\.[A-Za-z._])[A-Za-z0-9._]*$|^\.$").expect("valid identifier regex")
});

const RESERVED: &[&str] = &[
    "if", "else", "repeat", "while", "function", "for", "next", "break", "TRUE", "FALSE", "NULL",
    "Inf", "NaN", "NA", "in",
];

/// Whether `name` is usable as an engine variable name.
pub fn is_valid_name(name: &str) -> bool {
    IDENTIFIER.is_match(name) && !RESERVED.contains(&name)
}

/// Double-quoted string literal.
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Prefix of an assignment statement.
pub fn assign_prefix(name: &str) -> String {
    format!("{}<-", name)
}

pub fn fence(name: &str) -> String {
    format!("exists({});", quote(name))
}

pub fn scalar_probe(name: &str) -> String {
    format!("cat({});cat('\\n');", name)
}

pub fn table_dump(name: &str, marker: &str) -> String {
    format!(
        "write.table({},row.names=FALSE,col.names=FALSE);{}",
        name,
        end_mark(marker)
    )
}

pub fn end_mark(marker: &str) -> String {
    format!("print({});", quote(marker))
}

pub fn dispose(name: &str) -> String {
    format!("rm({});", quote(name))
}

pub const QUIT: &str = "q();";
