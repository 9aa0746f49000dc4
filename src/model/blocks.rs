//! Splitting model text into `$BLOCK` sections and reading the simple
//! `name = value` and name-list blocks.

use crate::error::ModelError;

/// One `$NAME` section of a model file
#[derive(Debug, Clone)]
pub(crate) struct RawBlock {
    /// Upper-cased block name without the `$`
    pub name: String,
    /// 1-based line of the `$NAME` marker
    pub line: usize,
    /// Text after the marker, including the rest of the marker line
    pub body: String,
}

impl RawBlock {
    /// Line number of a byte offset into `body`
    pub fn line_of(&self, offset: usize) -> usize {
        let offset = offset.min(self.body.len());
        self.line
            + self.body.as_bytes()[..offset]
                .iter()
                .filter(|&&b| b == b'\n')
                .count()
    }
}

/// Blank out `//` comments, keeping byte offsets and line breaks intact
pub(crate) fn strip_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for (i, line) in text.split('\n').enumerate() {
        if i > 0 {
            out.push('\n');
        }
        match line.find("//") {
            Some(idx) => {
                out.push_str(&line[..idx]);
                out.extend(std::iter::repeat(' ').take(line.len() - idx));
            }
            None => out.push_str(line),
        }
    }
    out
}

pub(crate) fn split_blocks(text: &str) -> Result<Vec<RawBlock>, ModelError> {
    let mut blocks: Vec<RawBlock> = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let lineno = idx + 1;
        let trimmed = line.trim_start();
        if let Some(rest) = trimmed.strip_prefix('$') {
            let name_len = rest
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(rest.len());
            if name_len == 0 {
                return Err(ModelError::syntax(lineno, "missing block name after '$'"));
            }
            let name = rest[..name_len].to_ascii_uppercase();
            let mut body = rest[name_len..].to_string();
            body.push('\n');
            blocks.push(RawBlock {
                name,
                line: lineno,
                body,
            });
        } else if let Some(current) = blocks.last_mut() {
            current.body.push_str(line);
            current.body.push('\n');
        } else if !strip_comments(line).trim().is_empty() {
            return Err(ModelError::syntax(
                lineno,
                "text outside of a block; expected a '$' block marker",
            ));
        }
    }
    Ok(blocks)
}

pub(crate) fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn is_separator(b: u8) -> bool {
    b.is_ascii_whitespace() || b == b','
}

/// Read `name = value` pairs separated by commas and/or whitespace
pub(crate) fn parse_assignments(block: &RawBlock) -> Result<Vec<(String, f64)>, ModelError> {
    let body = strip_comments(&block.body);
    let bytes = body.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;

    let skip_ws = |mut i: usize| {
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        i
    };

    loop {
        while i < bytes.len() && is_separator(bytes[i]) {
            i += 1;
        }
        if i >= bytes.len() {
            break;
        }

        let start = i;
        while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
            i += 1;
        }
        let name = &body[start..i];
        if !is_identifier(name) {
            return Err(ModelError::syntax(
                block.line_of(start),
                format!("expected a name in ${}", block.name),
            ));
        }

        i = skip_ws(i);
        if i >= bytes.len() || bytes[i] != b'=' {
            return Err(ModelError::syntax(
                block.line_of(i),
                format!("expected '=' after '{}' in ${}", name, block.name),
            ));
        }
        i = skip_ws(i + 1);

        let vstart = i;
        while i < bytes.len() && !is_separator(bytes[i]) {
            i += 1;
        }
        let raw = &body[vstart..i];
        let value: f64 = raw.parse().map_err(|_| {
            ModelError::syntax(
                block.line_of(vstart),
                format!("invalid number '{}' for '{}' in ${}", raw, name, block.name),
            )
        })?;
        out.push((name.to_string(), value));
    }
    Ok(out)
}

/// Read a list of names separated by commas and/or whitespace
pub(crate) fn parse_names(block: &RawBlock) -> Result<Vec<String>, ModelError> {
    let body = strip_comments(&block.body);
    let mut out = Vec::new();
    let mut offset = 0;
    for piece in body.split(|c: char| c.is_ascii() && is_separator(c as u8)) {
        if !piece.is_empty() && !is_identifier(piece) {
            return Err(ModelError::syntax(
                block.line_of(offset),
                format!("invalid name '{}' in ${}", piece, block.name),
            ));
        }
        if !piece.is_empty() {
            out.push(piece.to_string());
        }
        // Each separator is one byte wide
        offset += piece.len() + 1;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(name: &str, body: &str) -> RawBlock {
        RawBlock {
            name: name.to_string(),
            line: 1,
            body: body.to_string(),
        }
    }

    #[test]
    fn test_split_blocks_keeps_marker_line_content() {
        let text = "$PARAM CL=1, VC=20\n$ODE\n\ndxdt_A = -A;\n";
        let blocks = split_blocks(text).unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].name, "PARAM");
        assert_eq!(blocks[0].body.trim(), "CL=1, VC=20");
        assert_eq!(blocks[1].name, "ODE");
        assert_eq!(blocks[1].line, 2);
        assert_eq!(blocks[1].body.trim(), "dxdt_A = -A;");
    }

    #[test]
    fn test_block_names_are_case_insensitive() {
        let blocks = split_blocks("$param a = 1\n  $Table\n").unwrap();
        assert_eq!(blocks[0].name, "PARAM");
        assert_eq!(blocks[1].name, "TABLE");
    }

    #[test]
    fn test_leading_comments_are_allowed() {
        assert!(split_blocks("// header\n\n$PARAM A=1\n").is_ok());
        let err = split_blocks("junk\n$PARAM A=1\n").unwrap_err();
        assert!(matches!(err, ModelError::Syntax { line: 1, .. }));
    }

    #[test]
    fn test_strip_comments_preserves_offsets() {
        let text = "a = 1; // note\nb = 2;";
        let stripped = strip_comments(text);
        assert_eq!(stripped.len(), text.len());
        assert_eq!(stripped.find('b'), text.find('b'));
        assert!(!stripped.contains("note"));
    }

    #[test]
    fn test_parse_assignments_mixed_separators() {
        let b = block("PARAM", "  KA = 0.5, CL = 1\n VC=10 Q=2,VP=2e1 // comment\n");
        let values = parse_assignments(&b).unwrap();
        assert_eq!(
            values,
            vec![
                ("KA".to_string(), 0.5),
                ("CL".to_string(), 1.0),
                ("VC".to_string(), 10.0),
                ("Q".to_string(), 2.0),
                ("VP".to_string(), 20.0),
            ]
        );
    }

    #[test]
    fn test_parse_assignments_negative_value() {
        let b = block("PARAM", "E0 = -1.5");
        assert_eq!(parse_assignments(&b).unwrap(), vec![("E0".to_string(), -1.5)]);
    }

    #[test]
    fn test_parse_assignments_errors() {
        let missing_eq = block("PARAM", "CL 1");
        assert!(matches!(
            parse_assignments(&missing_eq),
            Err(ModelError::Syntax { .. })
        ));
        let bad_number = block("INIT", "\nDEPOT = abc");
        match parse_assignments(&bad_number) {
            Err(ModelError::Syntax { line, message }) => {
                assert_eq!(line, 2);
                assert!(message.contains("abc"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_parse_names() {
        let b = block("CMT", " GUT CENT\n PERIPH,EFFECT\n");
        assert_eq!(
            parse_names(&b).unwrap(),
            vec!["GUT", "CENT", "PERIPH", "EFFECT"]
        );
        let bad = block("CMT", "GUT 2CENT");
        assert!(parse_names(&bad).is_err());
    }
}
