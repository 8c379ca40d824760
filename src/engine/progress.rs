//! Progress extraction from diagnostic lines.

/// Return the last percentage token in `line`, if any.
///
/// Accepts `42%`, `42.5%`, `[ 7%]` style tokens. Values outside 0..=100 are
/// ignored.
pub fn parse_progress(line: &str) -> Option<f32> {
    let bytes = line.as_bytes();
    let mut found = None;

    for (i, &b) in bytes.iter().enumerate() {
        if b != b'%' {
            continue;
        }
        let mut start = i;
        while start > 0 && (bytes[start - 1].is_ascii_digit() || bytes[start - 1] == b'.') {
            start -= 1;
        }
        if start == i {
            continue;
        }
        if let Ok(value) = line[start..i].parse::<f32>()
            && (0.0..=100.0).contains(&value)
        {
            found = Some(value);
        }
    }

    found
}
