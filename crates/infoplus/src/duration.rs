/// Parse an ISO-8601 duration into whole seconds.
///
/// The feed emits delays as durations ("PT2M30S") and may prefix a minus
/// sign for negative delays ("-PT1M"). Year and month components have no
/// fixed length in seconds and are rejected.
pub fn parse_duration_seconds(text: &str) -> Option<i64> {
    let text = text.trim();
    let (negative, rest) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let rest = rest.strip_prefix('P')?;
    let (date_part, time_part) = match rest.split_once('T') {
        Some((date, time)) => (date, Some(time)),
        None => (rest, None),
    };

    let mut seconds = accumulate(date_part, &[('W', 604_800), ('D', 86_400)])?;
    if let Some(time_part) = time_part {
        seconds += accumulate(time_part, &[('H', 3_600), ('M', 60), ('S', 1)])?;
    }

    Some(if negative { -seconds } else { seconds })
}

/// Sum one duration component group ("2M30S") given its unit letters.
fn accumulate(part: &str, units: &[(char, i64)]) -> Option<i64> {
    let mut total = 0i64;
    let mut number = String::new();
    for c in part.chars() {
        if c.is_ascii_digit() || c == '.' || c == ',' {
            number.push(c);
            continue;
        }
        let unit = units.iter().find(|(letter, _)| *letter == c)?.1;
        let value: f64 = number.replace(',', ".").parse().ok()?;
        total += (value * unit as f64) as i64;
        number.clear();
    }
    // trailing digits without a unit letter
    if !number.is_empty() {
        return None;
    }
    Some(total)
}
