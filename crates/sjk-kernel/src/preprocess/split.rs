//! Shell-like argument splitting for magic directives.
//!
//! Supports single quotes (literal), double quotes (backslash
//! escapes), and backslash escapes outside quotes. Unterminated
//! quotes are errors.

/// Splits `input` into shell-like tokens.
pub fn split(input: &str) -> Result<Vec<String>, String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut chars = input.chars();

    #[derive(PartialEq)]
    enum Mode {
        Plain,
        Single,
        Double,
    }
    let mut mode = Mode::Plain;

    while let Some(ch) = chars.next() {
        match mode {
            Mode::Plain => match ch {
                '\'' => {
                    mode = Mode::Single;
                    in_token = true;
                }
                '"' => {
                    mode = Mode::Double;
                    in_token = true;
                }
                '\\' => match chars.next() {
                    Some(escaped) => {
                        current.push(escaped);
                        in_token = true;
                    }
                    None => return Err("trailing backslash".to_string()),
                },
                c if c.is_whitespace() => {
                    if in_token {
                        tokens.push(std::mem::take(&mut current));
                        in_token = false;
                    }
                }
                c => {
                    current.push(c);
                    in_token = true;
                }
            },
            Mode::Single => match ch {
                '\'' => mode = Mode::Plain,
                c => current.push(c),
            },
            Mode::Double => match ch {
                '"' => mode = Mode::Plain,
                '\\' => match chars.next() {
                    Some(escaped @ ('"' | '\\')) => current.push(escaped),
                    Some(other) => {
                        current.push('\\');
                        current.push(other);
                    }
                    None => return Err("trailing backslash".to_string()),
                },
                c => current.push(c),
            },
        }
    }

    if mode != Mode::Plain {
        return Err("unterminated quote".to_string());
    }
    if in_token {
        tokens.push(current);
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_words() {
        assert_eq!(split("a bc  d").unwrap(), vec!["a", "bc", "d"]);
        assert!(split("   ").unwrap().is_empty());
    }

    #[test]
    fn quotes_group_and_strip() {
        assert_eq!(
            split(r#".package(url: "https://x.git", from: "1.0") Foo"#).unwrap(),
            vec![".package(url:", "https://x.git,", "from:", "1.0)", "Foo"]
        );
        assert_eq!(split(r#""a b" c"#).unwrap(), vec!["a b", "c"]);
        assert_eq!(split("'a \"b\"' c").unwrap(), vec!["a \"b\"", "c"]);
    }

    #[test]
    fn escapes() {
        assert_eq!(split(r"a\ b c").unwrap(), vec!["a b", "c"]);
        assert_eq!(split(r#""a \" b""#).unwrap(), vec![r#"a " b"#]);
    }

    #[test]
    fn unterminated_quote_is_an_error() {
        assert!(split("\"open").is_err());
        assert!(split("'open").is_err());
        assert!(split("trail\\").is_err());
    }
}
