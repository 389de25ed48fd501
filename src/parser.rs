use crate::error::{EmsError, Result};

/// One parsed line of the event-management command language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Create { event_id: u32, rows: usize, cols: usize },
    Reserve { event_id: u32, coords: Vec<(usize, usize)> },
    Show { event_id: u32 },
    List,
    Wait { delay_ms: u64, thread_id: Option<u32> },
    Barrier,
    Help,
    Empty,
    Eoc,
}

/// Tokenizes one line of input into a `Command`. Comments (`#...`) and
/// blank lines parse to `Command::Empty`; anything whose first keyword
/// doesn't match is a `ParseError`, matching the original's
/// `cleanup`-then-`CMD_INVALID` behavior (skip to end of line, report, move
/// on).
pub fn parse_line(line: &str) -> Result<Command> {
    let trimmed = line.trim_end_matches(['\n', '\r']);
    let trimmed_start = trimmed.trim_start();

    if trimmed_start.is_empty() {
        return Ok(Command::Empty);
    }
    if trimmed_start.starts_with('#') {
        return Ok(Command::Empty);
    }

    let mut words = trimmed_start.split_whitespace();
    let keyword = words.next().unwrap_or("");

    match keyword {
        "CREATE" => parse_create(words),
        "RESERVE" => parse_reserve(trimmed_start),
        "SHOW" => parse_show(words),
        "LIST" => {
            ensure_no_more(words)?;
            Ok(Command::List)
        }
        "WAIT" => parse_wait(words),
        "BARRIER" => {
            ensure_no_more(words)?;
            Ok(Command::Barrier)
        }
        "HELP" => {
            ensure_no_more(words)?;
            Ok(Command::Help)
        }
        other => Err(EmsError::ParseError(format!("unrecognized command '{}'", other))),
    }
}

fn ensure_no_more<'a>(mut words: impl Iterator<Item = &'a str>) -> Result<()> {
    if words.next().is_some() {
        return Err(EmsError::ParseError("trailing tokens after command".into()));
    }
    Ok(())
}

fn parse_uint(word: Option<&str>, what: &str) -> Result<u32> {
    word.and_then(|w| w.parse::<u32>().ok())
        .ok_or_else(|| EmsError::ParseError(format!("expected an unsigned integer for {}", what)))
}

fn parse_create<'a>(mut words: impl Iterator<Item = &'a str>) -> Result<Command> {
    let event_id = parse_uint(words.next(), "event_id")?;
    let rows = parse_uint(words.next(), "rows")? as usize;
    let cols = parse_uint(words.next(), "cols")? as usize;
    ensure_no_more(words)?;
    Ok(Command::Create { event_id, rows, cols })
}

fn parse_show<'a>(mut words: impl Iterator<Item = &'a str>) -> Result<Command> {
    let event_id = parse_uint(words.next(), "event_id")?;
    ensure_no_more(words)?;
    Ok(Command::Show { event_id })
}

fn parse_wait<'a>(mut words: impl Iterator<Item = &'a str>) -> Result<Command> {
    let delay_ms = words
        .next()
        .and_then(|w| w.parse::<u64>().ok())
        .ok_or_else(|| EmsError::ParseError("expected an unsigned integer for delay_ms".into()))?;
    let thread_id = match words.next() {
        Some(w) => Some(w.parse::<u32>().map_err(|_| EmsError::ParseError("invalid thread_id".into()))?),
        None => None,
    };
    ensure_no_more(words)?;
    Ok(Command::Wait { delay_ms, thread_id })
}

/// `RESERVE <event_id> [(<x>,<y>) ...]` — coordinates are parenthesized
/// pairs, space-separated.
fn parse_reserve(rest: &str) -> Result<Command> {
    let rest = rest.strip_prefix("RESERVE").unwrap().trim_start();
    let mut parts = rest.splitn(2, char::is_whitespace);
    let event_id = parse_uint(parts.next().filter(|s| !s.is_empty()), "event_id")?;
    let coord_str = parts.next().unwrap_or("").trim();

    let mut coords = Vec::new();
    for token in coord_str.split_whitespace() {
        let inner = token
            .strip_prefix('(')
            .and_then(|s| s.strip_suffix(')'))
            .ok_or_else(|| EmsError::ParseError(format!("malformed coordinate '{}'", token)))?;
        let mut nums = inner.split(',');
        let x = nums
            .next()
            .and_then(|n| n.parse::<usize>().ok())
            .ok_or_else(|| EmsError::ParseError(format!("malformed coordinate '{}'", token)))?;
        let y = nums
            .next()
            .and_then(|n| n.parse::<usize>().ok())
            .ok_or_else(|| EmsError::ParseError(format!("malformed coordinate '{}'", token)))?;
        if nums.next().is_some() {
            return Err(EmsError::ParseError(format!("malformed coordinate '{}'", token)));
        }
        coords.push((x, y));
    }

    Ok(Command::Reserve { event_id, coords })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_create() {
        assert_eq!(
            parse_line("CREATE 1 2 3").unwrap(),
            Command::Create { event_id: 1, rows: 2, cols: 3 }
        );
    }

    #[test]
    fn parses_reserve_with_coords() {
        assert_eq!(
            parse_line("RESERVE 1 (1,1) (1,2)").unwrap(),
            Command::Reserve { event_id: 1, coords: vec![(1, 1), (1, 2)] }
        );
    }

    #[test]
    fn parses_reserve_with_no_coords() {
        assert_eq!(parse_line("RESERVE 1").unwrap(), Command::Reserve { event_id: 1, coords: vec![] });
    }

    #[test]
    fn parses_show_list_barrier_help() {
        assert_eq!(parse_line("SHOW 4").unwrap(), Command::Show { event_id: 4 });
        assert_eq!(parse_line("LIST").unwrap(), Command::List);
        assert_eq!(parse_line("BARRIER").unwrap(), Command::Barrier);
        assert_eq!(parse_line("HELP").unwrap(), Command::Help);
    }

    #[test]
    fn parses_wait_broadcast_and_targeted() {
        assert_eq!(parse_line("WAIT 100").unwrap(), Command::Wait { delay_ms: 100, thread_id: None });
        assert_eq!(parse_line("WAIT 100 2").unwrap(), Command::Wait { delay_ms: 100, thread_id: Some(2) });
    }

    #[test]
    fn blank_and_comment_lines_are_empty() {
        assert_eq!(parse_line("").unwrap(), Command::Empty);
        assert_eq!(parse_line("   ").unwrap(), Command::Empty);
        assert_eq!(parse_line("# a comment").unwrap(), Command::Empty);
    }

    #[test]
    fn unknown_keyword_is_a_parse_error() {
        assert!(matches!(parse_line("FROBNICATE"), Err(EmsError::ParseError(_))));
    }

    #[test]
    fn malformed_coordinate_is_a_parse_error() {
        assert!(matches!(parse_line("RESERVE 1 (1)"), Err(EmsError::ParseError(_))));
    }
}
