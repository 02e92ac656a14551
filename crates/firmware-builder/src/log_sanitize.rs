//! Makes toolchain output safe to echo: escape sequences and control
//! characters are dropped and long lines are capped.

const MAX_LINE_CHARS: usize = 512;

#[derive(Clone, Copy)]
enum Escape {
    Start,
    Csi,
    // OSC, DCS, SOS, PM and APC run until BEL or ESC '\'.
    String { bel_ends: bool },
    StringEsc { bel_ends: bool },
}

pub fn sanitize_log_line(input: &str) -> String {
    let mut out = String::with_capacity(input.len().min(MAX_LINE_CHARS));
    let mut esc: Option<Escape> = None;
    let mut kept = 0usize;

    for c in input.chars() {
        if let Some(state) = esc {
            esc = match (state, c) {
                (Escape::Start, '[') => Some(Escape::Csi),
                (Escape::Start, ']') => Some(Escape::String { bel_ends: true }),
                (Escape::Start, 'P' | 'X' | '^' | '_') => Some(Escape::String { bel_ends: false }),
                (Escape::Start, _) => None,
                (Escape::Csi, '@'..='~') => None,
                (Escape::Csi, _) => Some(Escape::Csi),
                (Escape::String { bel_ends: true }, '\x07') => None,
                (Escape::String { bel_ends }, '\x1b') => Some(Escape::StringEsc { bel_ends }),
                (Escape::String { bel_ends }, _) => Some(Escape::String { bel_ends }),
                (Escape::StringEsc { .. }, '\\') => None,
                (Escape::StringEsc { bel_ends }, '\x1b') => Some(Escape::StringEsc { bel_ends }),
                (Escape::StringEsc { bel_ends }, _) => Some(Escape::String { bel_ends }),
            };
            continue;
        }

        match c {
            '\x1b' => esc = Some(Escape::Start),
            '\t' => {
                out.push(' ');
                kept += 1;
            }
            c if c.is_control() || is_bidi_control(c) => {}
            c => {
                out.push(c);
                kept += 1;
            }
        }

        if kept >= MAX_LINE_CHARS {
            out.push_str(" ...[truncated]");
            break;
        }
    }

    out
}

fn is_bidi_control(c: char) -> bool {
    matches!(c, '\u{061C}' | '\u{200E}' | '\u{200F}')
        || ('\u{202A}'..='\u{202E}').contains(&c)
        || ('\u{2066}'..='\u{2069}').contains(&c)
}

/// The last `max_lines` non-blank sanitized lines of captured process output.
pub fn output_tail(raw: &[u8], max_lines: usize) -> Vec<String> {
    let text = String::from_utf8_lossy(raw);
    let mut lines = text
        .lines()
        .map(sanitize_log_line)
        .filter(|l| !l.trim().is_empty())
        .collect::<Vec<_>>();
    if lines.len() > max_lines {
        lines.drain(..lines.len() - max_lines);
    }
    lines
}
