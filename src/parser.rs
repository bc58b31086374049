use nom::{
    branch::alt,
    bytes::complete::{tag_no_case, take_until, take_while1, take_while_m_n},
    character::complete::{char, digit1, multispace0, multispace1},
    combinator::{all_consuming, eof, map, map_res, opt, recognize, rest},
    multi::separated_list0,
    sequence::{delimited, preceded, terminated, tuple},
    IResult,
};

use crate::model::{RecordId, ReleaseDate};

/// One line of the console language. Dimension names stay raw here and are
/// resolved (and rejected) by the filter layer.
#[derive(Debug, PartialEq, Clone)]
pub enum Command {
    Range { dimension: String, lo: f64, hi: f64 },
    Select { dimension: String, labels: Vec<String> },
    Toggle { dimension: String, label: String },
    Reset { dimension: Option<String> },
    Hover { id: RecordId },
    HoverLabel { dimension: String, label: String },
    Unhover,
    Pick { id: RecordId },
    PickName { name: String },
    Find { prefix: String },
    Rank { id: RecordId },
    Show { dimension: Option<String> },
    Bars { dimension: String },
    Tags,
    Top { sort: Option<String> },
    Scatter,
    Help,
    Exit,
}

// --- BASIC PARSERS ---

fn parse_float(input: &str) -> IResult<&str, f64> {
    map_res(
        recognize(tuple((opt(char('-')), digit1, opt(tuple((char('.'), digit1)))))),
        |s: &str| s.parse::<f64>(),
    )(input)
}

fn parse_id(input: &str) -> IResult<&str, RecordId> {
    map_res(digit1, |s: &str| s.parse::<RecordId>())(input)
}

fn parse_quoted_string(input: &str) -> IResult<&str, String> {
    let (input, _) = char('"')(input)?;
    let (input, content) = take_until("\"")(input)?;
    let (input, _) = char('"')(input)?;
    Ok((input, content.to_string()))
}

fn parse_word(input: &str) -> IResult<&str, String> {
    map(
        take_while1(|c: char| c.is_alphanumeric() || c == '_' || c == '-'),
        |s: &str| s.to_string(),
    )(input)
}

/// Quoted, or everything up to the next comma.
fn parse_label(input: &str) -> IResult<&str, String> {
    alt((
        parse_quoted_string,
        map(take_while1(|c: char| c != ',' && c != '"'), |s: &str| s.trim().to_string()),
    ))(input)
}

/// Quoted, or the rest of the line.
fn parse_trailing_text(input: &str) -> IResult<&str, String> {
    alt((parse_quoted_string, map(rest, |s: &str| s.trim().to_string())))(input)
}

// --- HELPERS ---
fn ws<'a, F, O, E: nom::error::ParseError<&'a str>>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O, E>
where F: FnMut(&'a str) -> IResult<&'a str, O, E> {
    delimited(multispace0, inner, multispace0)
}

fn tag_ci(t: &'static str) -> impl FnMut(&str) -> IResult<&str, &str> {
    move |input| tag_no_case(t)(input)
}

fn keyword(t: &'static str) -> impl FnMut(&str) -> IResult<&str, &str> {
    move |input| terminated(tag_ci(t), alt((multispace1, eof)))(input)
}

// --- COMMAND PARSERS ---

fn parse_range(input: &str) -> IResult<&str, Command> {
    let (input, _) = keyword("RANGE")(input)?;
    let (input, dimension) = ws(parse_word)(input)?;
    let (input, _) = opt(ws(char('[')))(input)?;
    let (input, lo) = parse_float(input)?;
    let (input, _) = tuple((multispace0, opt(char(',')), multispace0))(input)?;
    let (input, hi) = parse_float(input)?;
    let (input, _) = opt(ws(char(']')))(input)?;
    Ok((input, Command::Range { dimension, lo, hi }))
}

fn parse_select(input: &str) -> IResult<&str, Command> {
    let (input, _) = keyword("SELECT")(input)?;
    let (input, dimension) = ws(parse_word)(input)?;
    let (input, labels) = separated_list0(ws(char(',')), ws(parse_label))(input)?;
    let labels = labels.into_iter().filter(|l| !l.is_empty()).collect();
    Ok((input, Command::Select { dimension, labels }))
}

fn parse_toggle(input: &str) -> IResult<&str, Command> {
    let (input, _) = keyword("TOGGLE")(input)?;
    let (input, dimension) = ws(parse_word)(input)?;
    let (input, label) = parse_trailing_text(input)?;
    Ok((input, Command::Toggle { dimension, label }))
}

fn parse_reset(input: &str) -> IResult<&str, Command> {
    let (input, _) = keyword("RESET")(input)?;
    let (input, dimension) = opt(ws(parse_word))(input)?;
    Ok((input, Command::Reset { dimension }))
}

fn parse_hover(input: &str) -> IResult<&str, Command> {
    let (input, _) = keyword("HOVER")(input)?;
    alt((
        map(terminated(ws(parse_id), eof), |id| Command::Hover { id }),
        map(tuple((ws(parse_word), parse_trailing_text)), |(dimension, label)| {
            Command::HoverLabel { dimension, label }
        }),
    ))(input)
}

fn parse_unhover(input: &str) -> IResult<&str, Command> {
    let (input, _) = keyword("UNHOVER")(input)?;
    Ok((input, Command::Unhover))
}

fn parse_pick(input: &str) -> IResult<&str, Command> {
    let (input, _) = keyword("PICK")(input)?;
    alt((
        map(terminated(ws(parse_id), eof), |id| Command::Pick { id }),
        map(parse_trailing_text, |name| Command::PickName { name }),
    ))(input)
}

fn parse_find(input: &str) -> IResult<&str, Command> {
    let (input, _) = keyword("FIND")(input)?;
    let (input, prefix) = parse_trailing_text(input)?;
    Ok((input, Command::Find { prefix }))
}

fn parse_rank(input: &str) -> IResult<&str, Command> {
    let (input, _) = keyword("RANK")(input)?;
    let (input, id) = ws(parse_id)(input)?;
    Ok((input, Command::Rank { id }))
}

fn parse_show(input: &str) -> IResult<&str, Command> {
    let (input, _) = keyword("SHOW")(input)?;
    let (input, dimension) = opt(ws(parse_word))(input)?;
    Ok((input, Command::Show { dimension }))
}

fn parse_bars(input: &str) -> IResult<&str, Command> {
    let (input, _) = keyword("BARS")(input)?;
    let (input, dimension) = ws(parse_word)(input)?;
    Ok((input, Command::Bars { dimension }))
}

fn parse_top(input: &str) -> IResult<&str, Command> {
    let (input, _) = keyword("TOP")(input)?;
    let (input, sort) = opt(preceded(opt(ws(tag_ci("BY"))), ws(parse_word)))(input)?;
    Ok((input, Command::Top { sort }))
}

fn parse_bare(input: &str) -> IResult<&str, Command> {
    alt((
        map(keyword("TAGS"), |_| Command::Tags),
        map(keyword("SCATTER"), |_| Command::Scatter),
        map(keyword("HELP"), |_| Command::Help),
        map(alt((keyword("EXIT"), keyword("QUIT"))), |_| Command::Exit),
    ))(input)
}

pub fn parse_command(input: &str) -> Result<Command, String> {
    let input = input.trim();
    let result = alt((
        parse_range,
        parse_select,
        parse_toggle,
        parse_reset,
        parse_hover,
        parse_unhover,
        parse_pick,
        parse_find,
        parse_rank,
        parse_show,
        parse_bars,
        parse_top,
        parse_bare,
    ))(input);

    match result {
        Ok((remainder, cmd)) => {
            if !remainder.trim().is_empty() {
                return Err(format!("Unexpected tokens at end: '{}'", remainder));
            }
            Ok(cmd)
        },
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            let context = if e.input.chars().count() > 20 {
                format!("{}...", e.input.chars().take(20).collect::<String>())
            } else {
                e.input.to_string()
            };
            Err(format!("Invalid syntax near: '{}'", context))
        },
        Err(nom::Err::Incomplete(_)) => Err("Incomplete command.".to_string()),
    }
}

// --- DATES ---

fn digits(n: usize) -> impl FnMut(&str) -> IResult<&str, &str> {
    move |input| take_while_m_n(n, n, |c: char| c.is_ascii_digit())(input)
}

fn iso_date(input: &str) -> IResult<&str, (i32, u8, u8)> {
    let (input, year) = map_res(digits(4), |s: &str| s.parse::<i32>())(input)?;
    let (input, _) = char('-')(input)?;
    let (input, month) = map_res(digits(2), |s: &str| s.parse::<u8>())(input)?;
    let (input, _) = char('-')(input)?;
    let (input, day) = map_res(digits(2), |s: &str| s.parse::<u8>())(input)?;
    Ok((input, (year, month, day)))
}

fn days_in_month(year: i32, month: u8) -> u8 {
    match month {
        2 if (year % 4 == 0 && year % 100 != 0) || year % 400 == 0 => 29,
        2 => 28,
        4 | 6 | 9 | 11 => 30,
        _ => 31,
    }
}

/// Strict `YYYY-MM-DD`.
pub fn parse_iso_date(input: &str) -> Option<ReleaseDate> {
    let (_, (year, month, day)) = all_consuming(iso_date)(input.trim()).ok()?;
    if !(1..=12).contains(&month) || day == 0 || day > days_in_month(year, month) {
        return None;
    }
    Some(ReleaseDate { year, month, day })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ranges_with_or_without_brackets() {
        assert_eq!(
            parse_command("range price 150 1000"),
            Ok(Command::Range { dimension: "price".into(), lo: 150.0, hi: 1000.0 })
        );
        assert_eq!(
            parse_command("RANGE Rating [50, 100]"),
            Ok(Command::Range { dimension: "Rating".into(), lo: 50.0, hi: 100.0 })
        );
        assert_eq!(
            parse_command("RANGE time -1.5 2.25"),
            Ok(Command::Range { dimension: "time".into(), lo: -1.5, hi: 2.25 })
        );
    }

    #[test]
    fn parses_label_lists() {
        assert_eq!(
            parse_command("SELECT mode Single-player, \"Shared/Split Screen\", Online Co-op"),
            Ok(Command::Select {
                dimension: "mode".into(),
                labels: vec!["Single-player".into(), "Shared/Split Screen".into(), "Online Co-op".into()],
            })
        );
        assert_eq!(
            parse_command("select os"),
            Ok(Command::Select { dimension: "os".into(), labels: vec![] })
        );
    }

    #[test]
    fn hover_distinguishes_ids_from_labels() {
        assert_eq!(parse_command("HOVER 42"), Ok(Command::Hover { id: 42 }));
        assert_eq!(
            parse_command("hover genre RPG"),
            Ok(Command::HoverLabel { dimension: "genre".into(), label: "RPG".into() })
        );
        assert_eq!(parse_command("unhover"), Ok(Command::Unhover));
    }

    #[test]
    fn pick_accepts_id_or_name() {
        assert_eq!(parse_command("PICK 7"), Ok(Command::Pick { id: 7 }));
        assert_eq!(
            parse_command("pick \"Hollow Knight\""),
            Ok(Command::PickName { name: "Hollow Knight".into() })
        );
        assert_eq!(parse_command("find hol"), Ok(Command::Find { prefix: "hol".into() }));
    }

    #[test]
    fn parses_views_and_bare_commands() {
        assert_eq!(parse_command("show"), Ok(Command::Show { dimension: None }));
        assert_eq!(parse_command("SHOW genre"), Ok(Command::Show { dimension: Some("genre".into()) }));
        assert_eq!(parse_command("bars mode"), Ok(Command::Bars { dimension: "mode".into() }));
        assert_eq!(parse_command("top by price"), Ok(Command::Top { sort: Some("price".into()) }));
        assert_eq!(parse_command("TOP"), Ok(Command::Top { sort: None }));
        assert_eq!(parse_command("reset"), Ok(Command::Reset { dimension: None }));
        assert_eq!(parse_command("RESET year"), Ok(Command::Reset { dimension: Some("year".into()) }));
        assert_eq!(parse_command("quit"), Ok(Command::Exit));
        assert_eq!(parse_command("tags"), Ok(Command::Tags));
    }

    #[test]
    fn rejects_garbage_and_trailing_tokens() {
        assert!(parse_command("explode everything").is_err());
        assert!(parse_command("RANK 3 4").is_err());
        assert!(parse_command("RANGE price 1").is_err());
    }

    #[test]
    fn iso_dates_are_strict() {
        assert_eq!(parse_iso_date("2020-02-29"), Some(ReleaseDate { year: 2020, month: 2, day: 29 }));
        assert_eq!(parse_iso_date("2019-02-29"), None);
        assert_eq!(parse_iso_date("2019-13-01"), None);
        assert_eq!(parse_iso_date("2019-6-1"), None);
        assert_eq!(parse_iso_date("2019-06-01T00:00"), None);
    }
}
