/// Strip comments and collapse whitespace in captured SQL text.
///
/// Block comments (`/* ... */`) and line comments (`-- ...`, `# ...`) are
/// removed outside of quoted text, every whitespace run becomes a single
/// space and the result is trimmed. Applying it twice yields the same text.
pub fn normalize(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();
    let mut quote: Option<char> = None;
    let mut pending_space = false;

    while let Some(ch) = chars.next() {
        if let Some(q) = quote {
            if ch.is_whitespace() {
                pending_space = true;
                continue;
            }
            flush_space(&mut out, &mut pending_space);
            out.push(ch);
            if ch == '\\' && q != '`' {
                if let Some(escaped) = chars.next() {
                    out.push(escaped);
                }
            } else if ch == q {
                // doubled quote stays inside the literal
                if chars.peek() == Some(&q) {
                    out.push(q);
                    chars.next();
                } else {
                    quote = None;
                }
            }
            continue;
        }

        match ch {
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut previous = '\0';
                for c in chars.by_ref() {
                    if previous == '*' && c == '/' {
                        break;
                    }
                    previous = c;
                }
                pending_space = true;
            }
            '-' if chars.peek() == Some(&'-') => {
                skip_line(&mut chars);
                pending_space = true;
            }
            '#' => {
                skip_line(&mut chars);
                pending_space = true;
            }
            c if c.is_whitespace() => pending_space = true,
            '\'' | '"' | '`' => {
                flush_space(&mut out, &mut pending_space);
                quote = Some(ch);
                out.push(ch);
            }
            _ => {
                flush_space(&mut out, &mut pending_space);
                out.push(ch);
            }
        }
    }

    out
}

fn flush_space(out: &mut String, pending_space: &mut bool) {
    if *pending_space && !out.is_empty() {
        out.push(' ');
    }
    *pending_space = false;
}

fn skip_line(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) {
    for c in chars.by_ref() {
        if c == '\n' {
            break;
        }
    }
}
